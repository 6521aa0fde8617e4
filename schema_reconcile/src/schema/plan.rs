//! Change plan synthesis
//!
//! Turns a [`MergedDatabase`] and a [`Direction`] into an ordered list of
//! abstract [`Operation`]s. Per table the order is fixed:
//!
//! 1. a one-sided table is created or dropped as a whole, nothing else;
//! 2. fields of shared tables are added, dropped or altered in merged order;
//! 3. one primary key change aggregating every differing key flag;
//! 4. one unique index change aggregating every differing unique flag.
//!
//! Destructive operations (dropping tables, fields, or primary key columns)
//! only appear when the direction permits deletes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::merge::{MergedDatabase, MergedTable};
use crate::schema::types::{Database, Field, Side, Table};
use crate::utils::naming::names_match;

/// Which side is the source of truth for a run, and whether deletes are allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Compare only
    #[default]
    Preview,
    /// Copy the physical schema into the model definitions
    ToAuthoritative,
    /// Copy the model definitions to the database, keeping physical-only entities
    ToPhysical,
    /// Copy the model definitions to the database, dropping physical-only entities
    ToPhysicalWithDeletes,
}

impl Direction {
    pub fn all() -> [Direction; 4] {
        [
            Direction::Preview,
            Direction::ToAuthoritative,
            Direction::ToPhysical,
            Direction::ToPhysicalWithDeletes,
        ]
    }

    /// The side that changes
    pub fn target(self) -> Option<Side> {
        match self {
            Direction::Preview => None,
            Direction::ToAuthoritative => Some(Side::Authoritative),
            Direction::ToPhysical | Direction::ToPhysicalWithDeletes => Some(Side::Physical),
        }
    }

    /// The side copied from
    pub fn source(self) -> Option<Side> {
        self.target().map(Side::opposite)
    }

    /// Copying to the models mirrors the database exactly, so it always deletes
    pub fn allows_deletes(self) -> bool {
        matches!(
            self,
            Direction::ToAuthoritative | Direction::ToPhysicalWithDeletes
        )
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::Preview => "<-> preview differences",
            Direction::ToAuthoritative => "<-- copy to models",
            Direction::ToPhysical => "--> copy to database (no deletes)",
            Direction::ToPhysicalWithDeletes => "--> copy to database (including deletes)",
        };
        f.write_str(label)
    }
}

/// Aggregated primary key change for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyChange {
    pub table: String,
    /// Fields that become key columns
    pub add: Vec<Field>,
    /// Fields that stop being key columns
    pub drop: Vec<Field>,
    /// The complete key after the change, in table order
    pub keys: Vec<String>,
    /// The target keeps an existing key that has to be dropped first
    pub replaces_existing: bool,
    /// Set when exactly one field is added to the key
    pub auto_increment: Option<Field>,
}

/// Aggregated unique index change for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndexChange {
    pub table: String,
    pub add: Vec<String>,
    pub drop: Vec<String>,
}

/// One abstract schema change against the target side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateOrUseDatabase {
        name: String,
        exists: bool,
    },
    CreateTable(Table),
    DropTable {
        table: String,
    },
    AddField {
        table: String,
        field: Field,
        /// Field to insert after; `None` inserts at the start of the table
        after: Option<String>,
    },
    DropField {
        table: String,
        field: String,
    },
    AlterField {
        table: String,
        field: Field,
    },
    AlterPrimaryKey(PrimaryKeyChange),
    AlterUniqueIndex(UniqueIndexChange),
}

impl Operation {
    /// The table this operation touches
    pub fn table(&self) -> Option<&str> {
        match self {
            Operation::CreateOrUseDatabase { .. } => None,
            Operation::CreateTable(table) => Some(&table.name),
            Operation::DropTable { table }
            | Operation::AddField { table, .. }
            | Operation::DropField { table, .. }
            | Operation::AlterField { table, .. } => Some(table),
            Operation::AlterPrimaryKey(change) => Some(&change.table),
            Operation::AlterUniqueIndex(change) => Some(&change.table),
        }
    }

    /// Removes tables, fields or key columns from the target
    pub fn is_destructive(&self) -> bool {
        match self {
            Operation::DropTable { .. } | Operation::DropField { .. } => true,
            Operation::AlterPrimaryKey(change) => !change.drop.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateOrUseDatabase { name, exists: true } => write!(f, "use database {name}"),
            Operation::CreateOrUseDatabase { name, exists: false } => {
                write!(f, "create database {name}")
            }
            Operation::CreateTable(table) => write!(f, "create table {}", table.name),
            Operation::DropTable { table } => write!(f, "drop table {table}"),
            Operation::AddField {
                table,
                field,
                after: Some(after),
            } => write!(f, "add field {table}.{} after {after}", field.name),
            Operation::AddField {
                table,
                field,
                after: None,
            } => write!(f, "add field {table}.{} first", field.name),
            Operation::DropField { table, field } => write!(f, "drop field {table}.{field}"),
            Operation::AlterField { table, field } => {
                write!(f, "alter field {table}.{} to {}", field.name, field.data_type)
            }
            Operation::AlterPrimaryKey(change) => {
                write!(f, "set primary key of {} to ({})", change.table, change.keys.join(", "))
            }
            Operation::AlterUniqueIndex(change) => write!(
                f,
                "unique index on {}: add ({}) drop ({})",
                change.table,
                change.add.join(", "),
                change.drop.join(", ")
            ),
        }
    }
}

/// Ordered operations for one direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePlan {
    pub direction: Direction,
    pub operations: Vec<Operation>,
}

impl ChangePlan {
    /// Build the plan for `direction`. `physical_exists` tells whether the
    /// physical database has to be created first.
    pub fn synthesize(merged: &MergedDatabase, direction: Direction, physical_exists: bool) -> Self {
        let (source, target) = match (direction.source(), direction.target()) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                return Self {
                    direction,
                    operations: Vec::new(),
                }
            }
        };

        let mut planner = TablePlanner {
            source,
            target,
            deletes: direction.allows_deletes(),
            operations: Vec::new(),
        };
        for table in &merged.tables {
            planner.plan_table(table);
        }
        let mut operations = planner.operations;

        if target == Side::Physical && (!physical_exists || !operations.is_empty()) {
            operations.insert(
                0,
                Operation::CreateOrUseDatabase {
                    name: merged.physical.name.clone(),
                    exists: physical_exists,
                },
            );
        }

        let plan = Self {
            direction,
            operations,
        };
        tracing::debug!(
            direction = ?direction,
            operations = plan.len(),
            destructive = plan.destructive_count(),
            "Synthesized change plan"
        );
        plan
    }

    /// The side the plan changes
    pub fn target(&self) -> Option<Side> {
        self.direction.target()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn destructive_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_destructive()).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    /// Apply the operations to an in-memory snapshot of the target side
    pub fn simulate(&self, database: &Database) -> Database {
        let mut database = database.clone();

        for operation in &self.operations {
            match operation {
                Operation::CreateOrUseDatabase { .. } => {}
                Operation::CreateTable(table) => {
                    if database.table(&table.name).is_none() {
                        database.add_table(table.clone());
                    }
                }
                Operation::DropTable { table } => {
                    database.tables.retain(|t| !names_match(&t.name, table));
                }
                Operation::AddField {
                    table,
                    field,
                    after,
                } => {
                    if let Some(table) = table_mut(&mut database, table) {
                        let position = after
                            .as_ref()
                            .and_then(|after| {
                                table.fields.iter().position(|f| names_match(&f.name, after))
                            })
                            .map_or(0, |p| p + 1);
                        table.fields.insert(position, field.clone());
                    }
                }
                Operation::DropField { table, field } => {
                    if let Some(table) = table_mut(&mut database, table) {
                        table.fields.retain(|f| !names_match(&f.name, field));
                    }
                }
                Operation::AlterField { table, field } => {
                    if let Some(existing) = table_mut(&mut database, table)
                        .and_then(|t| t.fields.iter_mut().find(|f| names_match(&f.name, &field.name)))
                    {
                        *existing = field.clone();
                    }
                }
                Operation::AlterPrimaryKey(change) => {
                    if let Some(table) = table_mut(&mut database, &change.table) {
                        for field in &mut table.fields {
                            let key = change.keys.iter().any(|k| names_match(k, &field.name));
                            field.primary_key = key;
                            field.required |= key;
                        }
                    }
                }
                Operation::AlterUniqueIndex(change) => {
                    if let Some(table) = table_mut(&mut database, &change.table) {
                        for field in &mut table.fields {
                            if change.add.iter().any(|n| names_match(n, &field.name)) {
                                field.unique = true;
                            } else if change.drop.iter().any(|n| names_match(n, &field.name)) {
                                field.unique = false;
                            }
                        }
                    }
                }
            }
        }

        database
    }
}

impl<'a> IntoIterator for &'a ChangePlan {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

fn table_mut<'a>(database: &'a mut Database, name: &str) -> Option<&'a mut Table> {
    database.tables.iter_mut().find(|t| names_match(&t.name, name))
}

/// Per-table planning state
struct TablePlanner {
    source: Side,
    target: Side,
    deletes: bool,
    operations: Vec<Operation>,
}

impl TablePlanner {
    fn plan_table(&mut self, table: &MergedTable) {
        match (table.on(self.source), table.on(self.target)) {
            (Some(source), None) => {
                tracing::debug!(table = %source.name, "Table missing on target, creating");
                self.operations.push(Operation::CreateTable(source.clone()));
            }
            (None, Some(target)) => {
                if self.deletes {
                    tracing::debug!(table = %target.name, "Table missing on source, dropping");
                    self.operations.push(Operation::DropTable {
                        table: target.name.clone(),
                    });
                }
            }
            (Some(_), Some(target)) => {
                let name = target.name.clone();
                self.plan_fields(&name, table);
                self.plan_primary_key(&name, table);
                self.plan_unique_index(&name, table);
            }
            (None, None) => {}
        }
    }

    fn plan_fields(&mut self, table_name: &str, table: &MergedTable) {
        // Nearest preceding field that exists on the target when the next
        // operation runs
        let mut anchor: Option<String> = None;

        for merged in &table.fields {
            match (merged.on(self.source), merged.on(self.target)) {
                (Some(source), None) => {
                    self.operations.push(Operation::AddField {
                        table: table_name.to_string(),
                        field: source.clone(),
                        after: anchor.clone(),
                    });
                    anchor = Some(source.name.clone());
                }
                (None, Some(target)) => {
                    if self.deletes {
                        self.operations.push(Operation::DropField {
                            table: table_name.to_string(),
                            field: target.name.clone(),
                        });
                    } else {
                        anchor = Some(target.name.clone());
                    }
                }
                (Some(source), Some(target)) => {
                    if !source.same_column(target) {
                        self.operations.push(Operation::AlterField {
                            table: table_name.to_string(),
                            field: source.clone(),
                        });
                    }
                    anchor = Some(target.name.clone());
                }
                (None, None) => {}
            }
        }
    }

    fn plan_primary_key(&mut self, table_name: &str, table: &MergedTable) {
        let mut add = Vec::new();
        let mut drop = Vec::new();
        let mut keys = Vec::new();
        let mut replaces_existing = false;

        for merged in &table.fields {
            let source = merged.on(self.source);
            let target = merged.on(self.target);
            let source_key = source.map_or(false, |f| f.primary_key);
            let target_key = target.map_or(false, |f| f.primary_key);

            if let (Some(field), false) = (source.filter(|_| source_key), target_key) {
                add.push(field.clone());
            }
            if let (Some(field), false) = (target.filter(|_| target_key), source_key) {
                if self.deletes {
                    drop.push(field.clone());
                }
            }

            if source_key || (target_key && !self.deletes) {
                keys.push(merged.name.clone());
            }
            if target_key && (source.is_some() || !self.deletes) {
                replaces_existing = true;
            }
        }

        if add.is_empty() && drop.is_empty() {
            return;
        }

        // Only a sole key column may auto-increment
        let auto_increment = match (add.as_slice(), keys.len()) {
            ([only], 1) => Some(only.clone()),
            _ => None,
        };

        self.operations.push(Operation::AlterPrimaryKey(PrimaryKeyChange {
            table: table_name.to_string(),
            add,
            drop,
            keys,
            replaces_existing,
            auto_increment,
        }));
    }

    fn plan_unique_index(&mut self, table_name: &str, table: &MergedTable) {
        let mut add = Vec::new();
        let mut drop = Vec::new();

        for merged in &table.fields {
            let source = merged.on(self.source);
            let target = merged.on(self.target);
            let source_unique = source.map_or(false, |f| f.unique);
            let target_unique = target.map_or(false, |f| f.unique);

            if source_unique && !target_unique {
                add.push(merged.name.clone());
            }
            // Target-only fields keep their index or lose it with the column
            if target_unique && !source_unique && source.is_some() {
                if let Some(field) = target {
                    drop.push(field.name.clone());
                }
            }
        }

        if add.is_empty() && drop.is_empty() {
            return;
        }

        self.operations.push(Operation::AlterUniqueIndex(UniqueIndexChange {
            table: table_name.to_string(),
            add,
            drop,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::DataType;
    use pretty_assertions::assert_eq;

    fn int(name: &str) -> Field {
        Field::new(name, DataType::new("int", None)).required(true)
    }

    fn text(name: &str) -> Field {
        Field::new(name, DataType::new("string", Some(255)))
    }

    fn table(name: &str, fields: Vec<Field>) -> Table {
        fields.into_iter().fold(Table::new(name), Table::with_field)
    }

    fn plan(authoritative: Database, physical: Database, direction: Direction) -> ChangePlan {
        let merged = MergedDatabase::new(authoritative, physical);
        ChangePlan::synthesize(&merged, direction, true)
    }

    fn describe(plan: &ChangePlan) -> Vec<String> {
        plan.iter().map(ToString::to_string).collect()
    }

    fn orders() -> Table {
        table(
            "orders",
            vec![int("id").primary_key(true), text("name").required(true)],
        )
    }

    #[test]
    fn identical_snapshots_produce_empty_plans() {
        let db = Database::new("shop").with_table(orders());

        for direction in Direction::all() {
            let plan = plan(db.clone(), db.clone(), direction);
            assert!(plan.is_empty(), "{direction:?} produced {:?}", plan.operations);
        }
    }

    #[test]
    fn preview_never_plans_anything() {
        let plan = plan(
            Database::new("models").with_table(orders()),
            Database::new("shop"),
            Direction::Preview,
        );
        assert!(plan.is_empty());
        assert_eq!(plan.target(), None);
    }

    #[test]
    fn missing_database_is_created_first() {
        let merged = MergedDatabase::new(
            Database::new("models").with_table(orders()),
            Database::new("shop"),
        );
        let plan = ChangePlan::synthesize(&merged, Direction::ToPhysical, false);

        assert_eq!(
            plan.operations,
            vec![
                Operation::CreateOrUseDatabase {
                    name: "shop".to_string(),
                    exists: false,
                },
                Operation::CreateTable(orders()),
            ]
        );
    }

    #[test]
    fn one_sided_tables_are_dropped_only_with_deletes() {
        let authoritative = Database::new("models").with_table(orders());
        let physical = Database::new("shop")
            .with_table(orders())
            .with_table(table("audit", vec![int("id")]));

        let keep = plan(authoritative.clone(), physical.clone(), Direction::ToPhysical);
        assert!(keep.is_empty());

        let delete = plan(authoritative, physical, Direction::ToPhysicalWithDeletes);
        assert_eq!(describe(&delete), vec!["use database shop", "drop table audit"]);
        assert_eq!(delete.destructive_count(), 1);
    }

    #[test]
    fn added_fields_anchor_on_the_previous_surviving_field() {
        let authoritative = Database::new("models").with_table(table(
            "orders",
            vec![int("id").primary_key(true), text("a"), text("b"), text("name")],
        ));
        let physical = Database::new("shop").with_table(table(
            "orders",
            vec![int("id").primary_key(true), text("old"), text("name")],
        ));

        let plan = plan(authoritative, physical, Direction::ToPhysicalWithDeletes);
        assert_eq!(
            describe(&plan),
            vec![
                "use database shop",
                "drop field orders.old",
                "add field orders.a after id",
                "add field orders.b after a",
            ]
        );
    }

    #[test]
    fn kept_physical_fields_anchor_additions() {
        let authoritative = Database::new("models")
            .with_table(table("orders", vec![int("id"), text("note")]));
        let physical = Database::new("shop")
            .with_table(table("orders", vec![int("id"), text("legacy")]));

        let plan = plan(authoritative, physical, Direction::ToPhysical);
        assert_eq!(
            describe(&plan),
            vec!["use database shop", "add field orders.note after legacy"]
        );
    }

    #[test]
    fn field_added_before_everything_has_no_anchor() {
        let authoritative =
            Database::new("models").with_table(table("orders", vec![int("tenant"), int("id")]));
        let physical = Database::new("shop").with_table(table("orders", vec![int("id")]));

        let plan = plan(authoritative, physical, Direction::ToPhysical);
        assert!(matches!(
            &plan.operations[1],
            Operation::AddField { after: None, field, .. } if field.name == "tenant"
        ));
    }

    #[test]
    fn primary_key_promotion_adds_key_and_auto_increment() {
        let authoritative = Database::new("models").with_table(table(
            "orders",
            vec![int("x").primary_key(true), text("name")],
        ));
        let physical =
            Database::new("shop").with_table(table("orders", vec![int("x"), text("name")]));

        let plan = plan(authoritative, physical, Direction::ToPhysical);
        let changes: Vec<&PrimaryKeyChange> = plan
            .iter()
            .filter_map(|op| match op {
                Operation::AlterPrimaryKey(change) => Some(change),
                _ => None,
            })
            .collect();

        assert_eq!(changes.len(), 1);
        let change = changes[0];
        assert_eq!(change.add, vec![int("x").primary_key(true)]);
        assert!(change.drop.is_empty());
        assert_eq!(change.keys, vec!["x".to_string()]);
        assert!(!change.replaces_existing);
        assert_eq!(change.auto_increment, Some(int("x").primary_key(true)));
    }

    #[test]
    fn primary_key_drops_require_deletes() {
        let authoritative = Database::new("models").with_table(table(
            "links",
            vec![int("a"), int("b").primary_key(true)],
        ));
        let physical = Database::new("shop").with_table(table(
            "links",
            vec![int("a").primary_key(true), int("b")],
        ));

        let keep = plan(authoritative.clone(), physical.clone(), Direction::ToPhysical);
        let Some(Operation::AlterPrimaryKey(change)) = keep.operations.last() else {
            panic!("expected a primary key change, got {:?}", keep.operations);
        };
        assert!(change.drop.is_empty());
        assert_eq!(change.keys, vec!["a".to_string(), "b".to_string()]);
        assert!(change.replaces_existing);
        assert!(!keep.operations.last().unwrap().is_destructive());

        let replace = plan(authoritative, physical, Direction::ToPhysicalWithDeletes);
        let Some(Operation::AlterPrimaryKey(change)) = replace.operations.last() else {
            panic!("expected a primary key change, got {:?}", replace.operations);
        };
        assert_eq!(change.drop.len(), 1);
        assert_eq!(change.keys, vec!["b".to_string()]);
    }

    #[test]
    fn only_a_sole_key_column_auto_increments() {
        let authoritative = Database::new("models").with_table(table(
            "links",
            vec![int("a").primary_key(true), int("b").primary_key(true)],
        ));
        let physical = Database::new("shop").with_table(table(
            "links",
            vec![int("a").primary_key(true), int("b")],
        ));

        let plan = plan(authoritative, physical, Direction::ToPhysical);
        assert_eq!(describe(&plan).len(), 2, "{:?}", plan.operations);
        let Some(Operation::AlterPrimaryKey(change)) = plan.operations.last() else {
            panic!("expected a primary key change, got {:?}", plan.operations);
        };
        assert_eq!(change.add, vec![int("b").primary_key(true)]);
        assert_eq!(change.keys, vec!["a".to_string(), "b".to_string()]);
        assert!(change.replaces_existing);
        assert_eq!(change.auto_increment, None);
    }

    #[test]
    fn flag_only_differences_do_not_alter_the_column() {
        let authoritative = Database::new("models").with_table(table(
            "users",
            vec![int("id").primary_key(true), text("email").unique(true)],
        ));
        let physical = Database::new("shop")
            .with_table(table("users", vec![int("id"), text("email")]));

        let plan = plan(authoritative, physical, Direction::ToPhysical);
        assert!(plan.iter().all(|op| !matches!(op, Operation::AlterField { .. })));
        assert!(matches!(plan.operations[1], Operation::AlterPrimaryKey(_)));
        assert!(matches!(plan.operations[2], Operation::AlterUniqueIndex(_)));
    }

    #[test]
    fn unique_flags_are_aggregated_per_table() {
        let authoritative = Database::new("models").with_table(table(
            "users",
            vec![int("id"), text("email").unique(true), text("login")],
        ));
        let physical = Database::new("shop").with_table(table(
            "users",
            vec![int("id"), text("email"), text("login").unique(true), text("old").unique(true)],
        ));

        let plan = plan(authoritative, physical, Direction::ToPhysicalWithDeletes);
        let Some(Operation::AlterUniqueIndex(change)) = plan.operations.last() else {
            panic!("expected a unique index change, got {:?}", plan.operations);
        };
        assert_eq!(change.add, vec!["email".to_string()]);
        assert_eq!(change.drop, vec!["login".to_string()]);
    }

    #[test]
    fn copying_to_models_mirrors_the_database() {
        let authoritative = Database::new("models")
            .with_table(orders())
            .with_table(table("drafts", vec![int("id")]));
        let physical = Database::new("shop")
            .with_table(orders())
            .with_table(table("audit", vec![int("id")]));

        let plan = plan(authoritative, physical, Direction::ToAuthoritative);
        assert_eq!(plan.target(), Some(Side::Authoritative));
        assert_eq!(describe(&plan), vec!["create table audit", "drop table drafts"]);
    }

    #[test]
    fn simulated_plans_converge_in_both_directions() {
        let authoritative = Database::new("models")
            .with_table(table(
                "orders",
                vec![
                    int("id").primary_key(true),
                    text("customer").required(true),
                    text("email").unique(true),
                ],
            ))
            .with_table(table("invoices", vec![int("id").primary_key(true)]));
        let physical = Database::new("shop")
            .with_table(table(
                "orders",
                vec![int("ref").primary_key(true), int("id"), text("legacy"), text("email")],
            ))
            .with_table(table("audit", vec![int("id")]));

        for direction in [Direction::ToPhysicalWithDeletes, Direction::ToAuthoritative] {
            let merged = MergedDatabase::new(authoritative.clone(), physical.clone());
            let plan = ChangePlan::synthesize(&merged, direction, true);

            let converged = match direction.target() {
                Some(Side::Physical) => {
                    MergedDatabase::new(authoritative.clone(), plan.simulate(&physical))
                }
                _ => MergedDatabase::new(plan.simulate(&authoritative), physical.clone()),
            };
            assert_eq!(converged.difference_count(false), 0, "{direction:?}");
        }
    }
}
