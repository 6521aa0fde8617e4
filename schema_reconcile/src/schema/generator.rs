//! Statement generator
//!
//! Renders a [`ChangePlan`] into SQL statements for a physical backend.

use crate::db::connection::Backend;
use crate::error::{Error, Result};
use crate::schema::mapping::{MySqlTypeMapper, TypeMapper};
use crate::schema::plan::{ChangePlan, Operation, PrimaryKeyChange, UniqueIndexChange};
use crate::schema::types::{Field, Side, Table};
use crate::utils::naming::format_sql_identifier;

/// Renders abstract operations into backend statements
pub trait StatementGenerator: Send + Sync {
    /// The backend the statements are written for
    fn backend(&self) -> Backend;

    /// Render every operation of a plan, in order.
    ///
    /// Rendering is all-or-nothing: when one operation fails, no statements
    /// are returned.
    fn generate(&self, plan: &ChangePlan) -> Result<Vec<String>>;
}

/// MySQL / MariaDB statement generator
#[derive(Debug, Clone, Default)]
pub struct MySqlGenerator<M: TypeMapper = MySqlTypeMapper> {
    mapper: M,
}

impl MySqlGenerator {
    /// Create a generator with the standard MySQL type mapping
    pub fn new() -> Self {
        Self {
            mapper: MySqlTypeMapper::new(),
        }
    }
}

impl<M: TypeMapper> MySqlGenerator<M> {
    /// Create a generator with a custom type mapper
    pub fn with_mapper(mapper: M) -> Self {
        Self { mapper }
    }

    fn name(&self, name: &str) -> String {
        format_sql_identifier(name, Backend::MySql)
    }

    fn names<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> String {
        names
            .into_iter()
            .map(|name| self.name(name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `` `name` TYPE NOT NULL `` with an optional auto-increment marker.
    /// String columns never auto-increment.
    fn column_definition(&self, field: &Field, auto_increment: bool) -> Result<String> {
        let native = self.mapper.to_native(&field.data_type)?;
        let nullability = if field.required { "NOT NULL" } else { "NULL" };
        let auto_increment = auto_increment && !field.data_type.is_string();

        Ok(format!(
            "{} {} {}{}",
            self.name(&field.name),
            native,
            nullability,
            if auto_increment { " AUTO_INCREMENT" } else { "" }
        ))
    }

    fn render(&self, operation: &Operation, statements: &mut Vec<String>) -> Result<()> {
        match operation {
            Operation::CreateOrUseDatabase { name, exists } => {
                if !exists {
                    statements.push(format!("CREATE DATABASE {}", self.name(name)));
                }
                statements.push(format!("USE {}", self.name(name)));
            }
            Operation::CreateTable(table) => statements.push(self.create_table(table)?),
            Operation::DropTable { table } => {
                statements.push(format!("DROP TABLE {}", self.name(table)));
            }
            Operation::AddField {
                table,
                field,
                after,
            } => {
                let position = match after {
                    Some(after) => format!("AFTER {}", self.name(after)),
                    None => "FIRST".to_string(),
                };
                statements.push(format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    self.name(table),
                    self.column_definition(field, false)?,
                    position
                ));
            }
            Operation::DropField { table, field } => {
                statements.push(format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    self.name(table),
                    self.name(field)
                ));
            }
            Operation::AlterField { table, field } => {
                statements.push(format!(
                    "ALTER TABLE {} MODIFY COLUMN {}",
                    self.name(table),
                    self.column_definition(field, false)?
                ));
            }
            Operation::AlterPrimaryKey(change) => self.alter_primary_key(change, statements)?,
            Operation::AlterUniqueIndex(change) => self.alter_unique_index(change, statements),
        }

        Ok(())
    }

    fn create_table(&self, table: &Table) -> Result<String> {
        let keys: Vec<&Field> = table.primary_keys().collect();
        let auto_increment = match keys.as_slice() {
            [only] => Some(only.name.as_str()),
            _ => None,
        };

        let mut definitions = table
            .fields
            .iter()
            .map(|field| self.column_definition(field, Some(field.name.as_str()) == auto_increment))
            .collect::<Result<Vec<_>>>()?;

        if !keys.is_empty() {
            definitions.push(format!(
                "PRIMARY KEY ({})",
                self.names(keys.iter().map(|f| f.name.as_str()))
            ));
        }

        let unique: Vec<&str> = table.unique_fields().map(|f| f.name.as_str()).collect();
        if !unique.is_empty() {
            definitions.push(format!("UNIQUE ({})", self.names(unique)));
        }

        Ok(format!(
            "CREATE TABLE {} ({})",
            self.name(&table.name),
            definitions.join(", ")
        ))
    }

    fn alter_primary_key(&self, change: &PrimaryKeyChange, statements: &mut Vec<String>) -> Result<()> {
        let mut clauses = Vec::new();
        if change.replaces_existing {
            clauses.push("DROP PRIMARY KEY".to_string());
        }
        if !change.keys.is_empty() {
            clauses.push(format!(
                "ADD PRIMARY KEY ({})",
                self.names(change.keys.iter().map(String::as_str))
            ));
        }

        // Dropped key columns may have taken the whole key with them
        if clauses.is_empty() {
            return Ok(());
        }

        statements.push(format!(
            "ALTER TABLE {} {}",
            self.name(&change.table),
            clauses.join(", ")
        ));

        if let Some(field) = change
            .auto_increment
            .as_ref()
            .filter(|f| change.keys.len() == 1 && !f.data_type.is_string())
        {
            statements.push(format!(
                "ALTER TABLE {} MODIFY COLUMN {}",
                self.name(&change.table),
                self.column_definition(field, true)?
            ));
        }

        Ok(())
    }

    fn alter_unique_index(&self, change: &UniqueIndexChange, statements: &mut Vec<String>) {
        if !change.add.is_empty() {
            statements.push(format!(
                "ALTER TABLE {} ADD UNIQUE INDEX ({})",
                self.name(&change.table),
                self.names(change.add.iter().map(String::as_str))
            ));
        }

        // MySQL names a single-column index after its column
        for field in &change.drop {
            statements.push(format!(
                "DROP INDEX {} ON {}",
                self.name(field),
                self.name(&change.table)
            ));
        }
    }
}

impl<M: TypeMapper> StatementGenerator for MySqlGenerator<M> {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    fn generate(&self, plan: &ChangePlan) -> Result<Vec<String>> {
        if plan.target() != Some(Side::Physical) {
            return Err(Error::ConfigError(format!(
                "Cannot render statements for direction {:?}; only plans targeting the database produce SQL",
                plan.direction
            )));
        }

        let mut statements = Vec::with_capacity(plan.len());
        for operation in plan {
            self.render(operation, &mut statements)?;
        }

        tracing::debug!(
            operations = plan.len(),
            statements = statements.len(),
            "Rendered change plan"
        );

        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::merge::MergedDatabase;
    use crate::schema::plan::Direction;
    use crate::schema::types::{DataType, Database};
    use pretty_assertions::assert_eq;

    fn int(name: &str) -> Field {
        Field::new(name, DataType::new("int", None)).required(true)
    }

    fn string(name: &str, length: Option<u32>) -> Field {
        Field::new(name, DataType::new("string", length))
    }

    fn generate(operations: Vec<Operation>) -> Result<Vec<String>> {
        MySqlGenerator::new().generate(&ChangePlan {
            direction: Direction::ToPhysical,
            operations,
        })
    }

    #[test]
    fn creates_tables_with_inline_keys() {
        let table = Table::new("Orders")
            .with_field(int("Id").primary_key(true))
            .with_field(string("name", Some(255)).required(true))
            .with_field(string("email", Some(120)).unique(true));

        let statements = generate(vec![Operation::CreateTable(table)]).unwrap();
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE `orders` (`id` INT(11) NOT NULL AUTO_INCREMENT, \
                 `name` VARCHAR(255) NOT NULL, `email` VARCHAR(120) NULL, \
                 PRIMARY KEY (`id`), UNIQUE (`email`))"
                    .to_string()
            ]
        );
    }

    #[test]
    fn composite_and_string_keys_never_auto_increment() {
        let composite = Table::new("links")
            .with_field(int("a").primary_key(true))
            .with_field(int("b").primary_key(true));
        let keyed_by_code = Table::new("countries").with_field(string("code", Some(2)).primary_key(true));

        let statements = generate(vec![
            Operation::CreateTable(composite),
            Operation::CreateTable(keyed_by_code),
        ])
        .unwrap();

        assert!(statements.iter().all(|s| !s.contains("AUTO_INCREMENT")));
        assert_eq!(
            statements[1],
            "CREATE TABLE `countries` (`code` VARCHAR(2) NOT NULL, PRIMARY KEY (`code`))"
        );
    }

    #[test]
    fn renders_field_operations() {
        let statements = generate(vec![
            Operation::CreateOrUseDatabase {
                name: "shop".to_string(),
                exists: false,
            },
            Operation::AddField {
                table: "orders".to_string(),
                field: string("name", Some(255)).required(true),
                after: Some("id".to_string()),
            },
            Operation::AddField {
                table: "orders".to_string(),
                field: int("tenant"),
                after: None,
            },
            Operation::DropField {
                table: "orders".to_string(),
                field: "name".to_string(),
            },
            Operation::AlterField {
                table: "orders".to_string(),
                field: string("name", Some(255)).required(true),
            },
            Operation::DropTable {
                table: "orders".to_string(),
            },
        ])
        .unwrap();

        assert_eq!(
            statements,
            vec![
                "CREATE DATABASE `shop`",
                "USE `shop`",
                "ALTER TABLE `orders` ADD COLUMN `name` VARCHAR(255) NOT NULL AFTER `id`",
                "ALTER TABLE `orders` ADD COLUMN `tenant` INT(11) NOT NULL FIRST",
                "ALTER TABLE `orders` DROP COLUMN `name`",
                "ALTER TABLE `orders` MODIFY COLUMN `name` VARCHAR(255) NOT NULL",
                "DROP TABLE `orders`",
            ]
        );
    }

    #[test]
    fn primary_key_promotion_marks_auto_increment() {
        let id = int("id").primary_key(true);
        let statements = generate(vec![Operation::AlterPrimaryKey(PrimaryKeyChange {
            table: "orders".to_string(),
            add: vec![id.clone()],
            drop: vec![],
            keys: vec!["id".to_string()],
            replaces_existing: false,
            auto_increment: Some(id),
        })])
        .unwrap();

        assert_eq!(
            statements,
            vec![
                "ALTER TABLE `orders` ADD PRIMARY KEY (`id`)",
                "ALTER TABLE `orders` MODIFY COLUMN `id` INT(11) NOT NULL AUTO_INCREMENT",
            ]
        );
    }

    #[test]
    fn primary_key_replacement_drops_existing_key_first() {
        let statements = generate(vec![Operation::AlterPrimaryKey(PrimaryKeyChange {
            table: "orders".to_string(),
            add: vec![string("code", Some(8)).primary_key(true)],
            drop: vec![int("id")],
            keys: vec!["code".to_string()],
            replaces_existing: true,
            auto_increment: Some(string("code", Some(8)).primary_key(true)),
        })])
        .unwrap();

        assert_eq!(
            statements,
            vec!["ALTER TABLE `orders` DROP PRIMARY KEY, ADD PRIMARY KEY (`code`)"]
        );
    }

    #[test]
    fn extending_a_kept_key_does_not_auto_increment() {
        let merged = MergedDatabase::new(
            Database::new("models").with_table(
                Table::new("links")
                    .with_field(int("a").primary_key(true))
                    .with_field(int("b").primary_key(true)),
            ),
            Database::new("shop").with_table(
                Table::new("links")
                    .with_field(int("a").primary_key(true))
                    .with_field(int("b")),
            ),
        );
        let plan = ChangePlan::synthesize(&merged, Direction::ToPhysical, true);

        let statements = MySqlGenerator::new().generate(&plan).unwrap();
        assert_eq!(
            statements,
            vec![
                "USE `shop`",
                "ALTER TABLE `links` DROP PRIMARY KEY, ADD PRIMARY KEY (`a`, `b`)",
            ]
        );
    }

    #[test]
    fn composite_key_changes_skip_auto_increment() {
        let b = int("b").primary_key(true);
        let statements = generate(vec![Operation::AlterPrimaryKey(PrimaryKeyChange {
            table: "links".to_string(),
            add: vec![b.clone()],
            drop: vec![],
            keys: vec!["a".to_string(), "b".to_string()],
            replaces_existing: true,
            auto_increment: Some(b),
        })])
        .unwrap();

        assert_eq!(
            statements,
            vec!["ALTER TABLE `links` DROP PRIMARY KEY, ADD PRIMARY KEY (`a`, `b`)"]
        );
    }

    #[test]
    fn unique_changes_add_one_index_and_drop_each_field() {
        let statements = generate(vec![Operation::AlterUniqueIndex(UniqueIndexChange {
            table: "users".to_string(),
            add: vec!["Email".to_string(), "login".to_string()],
            drop: vec!["nick".to_string()],
        })])
        .unwrap();

        assert_eq!(
            statements,
            vec![
                "ALTER TABLE `users` ADD UNIQUE INDEX (`email`, `login`)",
                "DROP INDEX `nick` ON `users`",
            ]
        );
    }

    #[test]
    fn unmappable_type_produces_no_statements() {
        let merged = MergedDatabase::new(
            Database::new("models").with_table(
                Table::new("orders")
                    .with_field(int("id").primary_key(true))
                    .with_field(Field::new("ref", DataType::new("guid", None))),
            ),
            Database::new("shop"),
        );
        let plan = ChangePlan::synthesize(&merged, Direction::ToPhysical, true);

        let error = MySqlGenerator::new().generate(&plan).unwrap_err();
        assert!(matches!(error, Error::TypeMappingError(ref name) if name == "guid"));
    }

    #[test]
    fn only_physical_plans_render() {
        let plan = ChangePlan {
            direction: Direction::ToAuthoritative,
            operations: vec![],
        };

        assert!(matches!(
            MySqlGenerator::new().generate(&plan),
            Err(Error::ConfigError(_))
        ));
        assert_eq!(MySqlGenerator::new().backend(), Backend::MySql);
    }
}
