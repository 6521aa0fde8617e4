//! Database schema analyzer
//!
//! Introspects the physical database into a [`PhysicalSnapshot`].

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::{FromRow, MySql, Pool};

use crate::db::connection::DatabaseConnection;
use crate::error::Result;
use crate::schema::mapping::{MySqlTypeMapper, TypeMapper};
use crate::schema::types::{Database, Field, PhysicalSnapshot, Table};

/// Default number of column queries in flight
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Produces the physical schema snapshot
#[async_trait]
pub trait PhysicalSchemaProvider: Send + Sync {
    /// Load the snapshot; a missing database yields an empty snapshot
    /// with `exists = false`
    async fn load(&self) -> Result<PhysicalSnapshot>;
}

/// Per-backend introspection
#[async_trait]
trait Analyzer {
    /// Analyze one database
    async fn analyze_schema(&self, database_name: &str) -> Result<PhysicalSnapshot>;

    /// Analyze table definitions, in table name order
    async fn analyze_tables(&self, schema: &str) -> Result<Vec<Table>>;
}

/// Schema analyzer for database schema introspection
#[derive(Debug, Clone)]
pub struct SchemaAnalyzer {
    connection: DatabaseConnection,
    database_name: String,
    concurrency: usize,
}

impl SchemaAnalyzer {
    /// Create a new schema analyzer for the named database
    pub fn new(connection: DatabaseConnection, database_name: &str) -> Self {
        Self {
            connection,
            database_name: database_name.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Limit the number of concurrent column queries
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Analyze the current database schema
    pub async fn analyze(&self) -> Result<PhysicalSnapshot> {
        match &self.connection {
            DatabaseConnection::MySql(pool) => {
                MySqlAnalyzer {
                    pool,
                    mapper: MySqlTypeMapper::new(),
                    concurrency: self.concurrency,
                }
                .analyze_schema(&self.database_name)
                .await
            }
        }
    }
}

#[async_trait]
impl PhysicalSchemaProvider for SchemaAnalyzer {
    async fn load(&self) -> Result<PhysicalSnapshot> {
        self.analyze().await
    }
}

#[derive(FromRow)]
struct SchemaRow {
    schema_name: String,
}

#[derive(FromRow)]
struct TableRow {
    table_name: String,
}

/// One row of `information_schema.COLUMNS`
#[derive(Debug, Clone, FromRow)]
pub struct ColumnRow {
    pub column_name: String,
    /// Full type text, e.g. `int(11) unsigned`
    pub column_type: String,
    /// `YES` or `NO`
    pub is_nullable: String,
    /// `PRI`, `UNI`, `MUL` or empty
    pub column_key: String,
}

impl ColumnRow {
    /// Convert to a canonical field through `mapper`
    pub fn to_field(&self, mapper: &dyn TypeMapper) -> Result<Field> {
        let data_type = mapper.to_logical(&self.column_type)?;
        let key = self.column_key.trim().to_uppercase();

        Ok(Field::new(&self.column_name, data_type)
            .primary_key(key == "PRI")
            .unique(key == "UNI")
            .required(self.is_nullable.eq_ignore_ascii_case("NO")))
    }
}

/// MySQL schema analyzer
struct MySqlAnalyzer<'a> {
    pool: &'a Pool<MySql>,
    mapper: MySqlTypeMapper,
    concurrency: usize,
}

impl<'a> MySqlAnalyzer<'a> {
    async fn analyze_columns(&self, schema: &str, table_name: String) -> Result<Table> {
        // information_schema columns are binary strings on some servers
        let sql = r#"
            SELECT CAST(COLUMN_NAME AS CHAR) AS column_name,
                   CAST(COLUMN_TYPE AS CHAR) AS column_type,
                   CAST(IS_NULLABLE AS CHAR) AS is_nullable,
                   CAST(COLUMN_KEY AS CHAR) AS column_key
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let column_rows = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(schema)
            .bind(&table_name)
            .fetch_all(self.pool)
            .await?;

        let fields = column_rows
            .iter()
            .map(|row| row.to_field(&self.mapper))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(table = %table_name, columns = fields.len(), "Analyzed table");

        Ok(Table {
            name: table_name,
            fields,
        })
    }
}

#[async_trait]
impl<'a> Analyzer for MySqlAnalyzer<'a> {
    async fn analyze_schema(&self, database_name: &str) -> Result<PhysicalSnapshot> {
        let sql = r#"
            SELECT CAST(SCHEMA_NAME AS CHAR) AS schema_name
            FROM information_schema.SCHEMATA
            WHERE LOWER(SCHEMA_NAME) = LOWER(?)
        "#;

        let schema = sqlx::query_as::<_, SchemaRow>(sql)
            .bind(database_name)
            .fetch_optional(self.pool)
            .await?;

        let Some(schema) = schema else {
            tracing::info!(database = %database_name, "Physical database does not exist");
            return Ok(PhysicalSnapshot::missing(database_name));
        };

        let tables = self.analyze_tables(&schema.schema_name).await?;
        tracing::info!(database = %schema.schema_name, tables = tables.len(), "Analyzed physical schema");

        Ok(PhysicalSnapshot {
            database: Database {
                name: schema.schema_name,
                tables,
            },
            exists: true,
        })
    }

    async fn analyze_tables(&self, schema: &str) -> Result<Vec<Table>> {
        let sql = r#"
            SELECT CAST(TABLE_NAME AS CHAR) AS table_name
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let table_rows = sqlx::query_as::<_, TableRow>(sql)
            .bind(schema)
            .fetch_all(self.pool)
            .await?;

        // `buffered` keeps table order while queries overlap
        stream::iter(table_rows)
            .map(|row| self.analyze_columns(schema, row.table_name))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}
