//! Alignment of the authoritative and physical snapshots
//!
//! [`MergedDatabase::new`] pairs tables and fields by case-insensitive name
//! ("first match wins") and produces one ordered sequence per level:
//!
//! - tables keep the authoritative order; physical-only tables are placed by a
//!   sorted insert on their case-folded name;
//! - fields keep the authoritative order; physical-only fields are placed right
//!   after the most recent physical field that already had an entry, or first
//!   when there is none yet.
//!
//! The merge is a pure function of the two snapshots. Replacing either
//! snapshot means building a new `MergedDatabase`.

use std::collections::{HashMap, HashSet};

use crate::schema::types::{Database, Field, Side, Table};
use crate::utils::naming::{fold_case, names_match};

/// Folded name to index of its first occurrence
fn name_index<'a, T: 'a>(items: &'a [T], name: impl Fn(&'a T) -> &'a str) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        index.entry(fold_case(name(item))).or_insert(position);
    }
    index
}

/// A field as seen from both sides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedField {
    pub name: String,
    pub authoritative: Option<Field>,
    pub physical: Option<Field>,
}

impl MergedField {
    pub fn new(authoritative: Option<Field>, physical: Option<Field>) -> Self {
        let name = authoritative
            .as_ref()
            .or(physical.as_ref())
            .map(|f| f.name.clone())
            .unwrap_or_default();

        Self {
            name,
            authoritative,
            physical,
        }
    }

    /// The field definition on one side
    pub fn on(&self, side: Side) -> Option<&Field> {
        match side {
            Side::Authoritative => self.authoritative.as_ref(),
            Side::Physical => self.physical.as_ref(),
        }
    }

    /// Present on both sides with identical properties
    pub fn properties_same(&self) -> bool {
        match (&self.authoritative, &self.physical) {
            (Some(a), Some(p)) => a.same_as(p),
            _ => false,
        }
    }

    /// One-sided, or present on both with differing properties
    pub fn differs(&self) -> bool {
        !self.properties_same()
    }

    pub fn same_in_both(&self) -> bool {
        self.authoritative.is_some() && self.physical.is_some()
    }

    pub fn authoritative_only(&self) -> bool {
        self.authoritative.is_some() && self.physical.is_none()
    }

    pub fn physical_only(&self) -> bool {
        self.authoritative.is_none() && self.physical.is_some()
    }
}

/// A table as seen from both sides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTable {
    pub name: String,
    pub authoritative: Option<Table>,
    pub physical: Option<Table>,
    pub fields: Vec<MergedField>,
}

impl MergedTable {
    pub fn new(authoritative: Option<&Table>, physical: Option<&Table>) -> Self {
        let name = authoritative
            .or(physical)
            .map(|t| t.name.clone())
            .unwrap_or_default();

        let fields = match (authoritative, physical) {
            (Some(a), Some(p)) => Self::align_fields(a, p),
            (Some(a), None) => a
                .fields
                .iter()
                .map(|f| MergedField::new(Some(f.clone()), None))
                .collect(),
            (None, Some(p)) => p
                .fields
                .iter()
                .map(|f| MergedField::new(None, Some(f.clone())))
                .collect(),
            (None, None) => Vec::new(),
        };

        Self {
            name,
            authoritative: authoritative.cloned(),
            physical: physical.cloned(),
            fields,
        }
    }

    fn align_fields(authoritative: &Table, physical: &Table) -> Vec<MergedField> {
        let physical_index = name_index(&physical.fields, |f| f.name.as_str());

        let mut fields: Vec<MergedField> = authoritative
            .fields
            .iter()
            .map(|field| {
                let matched = physical_index
                    .get(&fold_case(&field.name))
                    .map(|&i| physical.fields[i].clone());
                MergedField::new(Some(field.clone()), matched)
            })
            .collect();

        // Merged position of the last physical field that already had an entry
        let mut anchor: Option<usize> = None;

        for field in &physical.fields {
            match fields.iter().position(|m| names_match(&m.name, &field.name)) {
                Some(position) => anchor = Some(position),
                None => {
                    let insert_at = anchor.map_or(0, |a| a + 1).min(fields.len());
                    fields.insert(insert_at, MergedField::new(None, Some(field.clone())));
                    anchor = Some(insert_at);
                }
            }
        }

        fields
    }

    /// The table definition on one side
    pub fn on(&self, side: Side) -> Option<&Table> {
        match side {
            Side::Authoritative => self.authoritative.as_ref(),
            Side::Physical => self.physical.as_ref(),
        }
    }

    /// Present on exactly one side. Tables carry no properties of their own,
    /// so field-level differences are counted separately.
    pub fn differs(&self) -> bool {
        !self.same_in_both()
    }

    pub fn same_in_both(&self) -> bool {
        self.authoritative.is_some() && self.physical.is_some()
    }

    pub fn authoritative_only(&self) -> bool {
        self.authoritative.is_some() && self.physical.is_none()
    }

    pub fn physical_only(&self) -> bool {
        self.authoritative.is_none() && self.physical.is_some()
    }
}

/// Both snapshots aligned table by table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDatabase {
    pub tables: Vec<MergedTable>,
    pub authoritative: Database,
    pub physical: Database,
}

impl MergedDatabase {
    /// Align two snapshots
    pub fn new(authoritative: Database, physical: Database) -> Self {
        let physical_index = name_index(&physical.tables, |t| t.name.as_str());

        let mut tables: Vec<MergedTable> = authoritative
            .tables
            .iter()
            .map(|table| {
                let matched = physical_index
                    .get(&fold_case(&table.name))
                    .map(|&i| &physical.tables[i]);
                MergedTable::new(Some(table), matched)
            })
            .collect();

        let mut represented: HashSet<String> = tables.iter().map(|t| fold_case(&t.name)).collect();

        for table in &physical.tables {
            let key = fold_case(&table.name);
            if represented.contains(&key) {
                continue;
            }

            let position = tables
                .binary_search_by(|m| fold_case(&m.name).cmp(&key))
                .unwrap_or_else(|insert_at| insert_at);
            tables.insert(position, MergedTable::new(None, Some(table)));
            represented.insert(key);
        }

        tracing::debug!(
            authoritative = %authoritative.name,
            physical = %physical.name,
            tables = tables.len(),
            "Merged schema snapshots"
        );

        Self {
            tables,
            authoritative,
            physical,
        }
    }

    /// The snapshot for one side
    pub fn database(&self, side: Side) -> &Database {
        match side {
            Side::Authoritative => &self.authoritative,
            Side::Physical => &self.physical,
        }
    }

    /// Merged table by case-insensitive name
    pub fn table(&self, name: &str) -> Option<&MergedTable> {
        self.tables.iter().find(|t| names_match(&t.name, name))
    }
}
