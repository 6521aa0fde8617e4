//! Type definitions for the canonical schema model
//!
//! Both sides of a comparison are described with these types. Snapshots are
//! built once per run and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::naming::names_match;

/// One of the two schema descriptions being reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The model definitions, source of truth for the desired schema
    Authoritative,
    /// The live database
    Physical,
}

impl Side {
    /// The other side
    pub fn opposite(self) -> Side {
        match self {
            Side::Authoritative => Side::Physical,
            Side::Physical => Side::Authoritative,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Authoritative => f.write_str("authoritative"),
            Side::Physical => f.write_str("physical"),
        }
    }
}

/// A logical column type, e.g. `string(255)` or `int`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
    pub max_length: Option<u32>,
}

impl DataType {
    /// Create a logical type; the name is case-normalized
    pub fn new(name: &str, max_length: Option<u32>) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            max_length,
        }
    }

    /// Identical name and length
    pub fn same_as(&self, other: &DataType) -> bool {
        self.name == other.name && self.max_length == other.max_length
    }

    pub fn is_string(&self) -> bool {
        self.name == "string"
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_length {
            Some(length) => write!(f, "{}({})", self.name, length),
            None => f.write_str(&self.name),
        }
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub primary_key: bool,
    pub unique: bool,
    pub required: bool,
}

impl Field {
    /// Create a nullable, non-key field
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            primary_key: false,
            unique: false,
            required: false,
        }
    }

    /// Mark the field as part of the primary key. Key fields are always required.
    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        if primary_key {
            self.required = true;
        }
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set whether the field is required; ignored for key fields
    pub fn required(mut self, required: bool) -> Self {
        self.required = required || self.primary_key;
        self
    }

    /// Compare every reconciled property. Names match case-insensitively.
    pub fn same_as(&self, other: &Field) -> bool {
        names_match(&self.name, &other.name)
            && self.data_type.same_as(&other.data_type)
            && self.primary_key == other.primary_key
            && self.unique == other.unique
            && self.required == other.required
    }

    /// Compare the column definition alone; key and unique flags are
    /// reconciled per table
    pub fn same_column(&self, other: &Field) -> bool {
        self.data_type.same_as(&other.data_type) && self.required == other.required
    }
}

/// A table with its fields in declared order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Table {
    /// Create a new table with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field append
    pub fn with_field(mut self, field: Field) -> Self {
        self.add_field(field);
        self
    }

    /// Add a field to the end of the table
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// First field whose name matches case-insensitively
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| names_match(&f.name, name))
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.primary_key)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.unique)
    }
}

/// A complete schema snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    pub tables: Vec<Table>,
}

impl Database {
    /// Create a new empty database snapshot
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: Vec::new(),
        }
    }

    /// Builder-style table append
    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Add a table to the end of the snapshot
    pub fn add_table(&mut self, table: Table) {
        self.tables.push(table);
    }

    /// First table whose name matches case-insensitively
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| names_match(&t.name, name))
    }
}

/// The live side of a comparison, plus whether the database exists at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalSnapshot {
    pub database: Database,
    pub exists: bool,
}

impl PhysicalSnapshot {
    /// Snapshot of a database that has not been created yet
    pub fn missing(name: &str) -> Self {
        Self {
            database: Database::new(name),
            exists: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_fields_are_always_required() {
        let field = Field::new("id", DataType::new("int", None))
            .primary_key(true)
            .required(false);

        assert!(field.primary_key);
        assert!(field.required);
    }

    #[test]
    fn data_type_names_are_case_normalized() {
        let declared = DataType::new("DateTime", None);
        let introspected = DataType::new("datetime", None);

        assert!(declared.same_as(&introspected));
        assert!(!DataType::new("string", Some(50)).same_as(&DataType::new("string", Some(60))));
        assert_eq!(DataType::new("string", Some(50)).to_string(), "string(50)");
    }

    #[test]
    fn field_comparison_ignores_name_case_only() {
        let a = Field::new("Email", DataType::new("string", Some(255))).required(true);
        let b = Field::new("email", DataType::new("string", Some(255))).required(true);
        let c = b.clone().unique(true);

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(a.same_column(&c));
        assert!(!a.same_column(&b.clone().required(false)));
    }

    #[test]
    fn table_lookup_is_case_insensitive() {
        let db = Database::new("shop").with_table(
            Table::new("Orders").with_field(Field::new("Id", DataType::new("int", None))),
        );

        let table = db.table("orders").expect("table should match");
        assert!(table.field("ID").is_some());
        assert!(db.table("customers").is_none());
    }
}
