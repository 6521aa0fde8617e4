//! Model registry
//!
//! Discovers model documents and turns them into the authoritative schema
//! snapshot. Model documents are declarative table definitions written in
//! TOML, JSON or YAML:
//!
//! ```toml
//! context = "ShopContext"
//!
//! [[tables]]
//! name = "orders"
//! primary_key = ["id"]
//!
//! [tables.fields.id]
//! type = "int"
//!
//! [tables.fields.email]
//! type = "string"
//! max_length = 255
//! required = true
//! unique = true
//! ```
//!
//! Fields keep their declaration order.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ModelsConfig;
use crate::error::{Error, Result};
use crate::schema::types::{DataType, Database, Field, Table};
use crate::utils::naming::names_match;

/// Database name used when no document declares a context
pub const DEFAULT_CONTEXT: &str = "default";

/// Produces the authoritative schema snapshot
#[async_trait]
pub trait SchemaSourceProvider: Send + Sync {
    /// Load the snapshot, with tables and fields in declared order
    async fn load(&self) -> Result<Database>;

    /// Replace the definitions with `database`
    async fn store(&self, _database: &Database) -> Result<()> {
        Err(Error::ConfigError(
            "The model source is read-only".to_string(),
        ))
    }
}

/// One model document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableDocument>,
}

/// A table declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDocument {
    pub name: String,
    /// Table-level composite key declaration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    /// Table-level unique declaration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<String>,
    #[serde(default)]
    pub fields: IndexMap<String, FieldDocument>,
}

/// A field declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDocument {
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub key: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TableDocument {
    /// Build the canonical table, applying table-level key and unique lists
    pub fn to_table(&self) -> Result<Table> {
        for listed in self.primary_key.iter().chain(&self.unique) {
            if !self.fields.keys().any(|name| names_match(name, listed)) {
                return Err(Error::ConfigError(format!(
                    "Table {} lists undeclared field {}",
                    self.name, listed
                )));
            }
        }

        let listed = |list: &[String], name: &str| list.iter().any(|l| names_match(l, name));

        let fields = self
            .fields
            .iter()
            .map(|(name, doc)| {
                Field::new(name, DataType::new(&doc.data_type, doc.max_length))
                    .primary_key(doc.key || listed(&self.primary_key, name))
                    .unique(doc.unique || listed(&self.unique, name))
                    .required(doc.required)
            })
            .collect();

        Ok(Table {
            name: self.name.clone(),
            fields,
        })
    }

    /// Declaration for a canonical table, flags kept on the fields
    pub fn from_table(table: &Table) -> Self {
        let fields = table
            .fields
            .iter()
            .map(|field| {
                let doc = FieldDocument {
                    data_type: field.data_type.name.clone(),
                    max_length: field.data_type.max_length,
                    key: field.primary_key,
                    unique: field.unique,
                    required: field.required && !field.primary_key,
                };
                (field.name.clone(), doc)
            })
            .collect();

        Self {
            name: table.name.clone(),
            primary_key: Vec::new(),
            unique: Vec::new(),
            fields,
        }
    }
}

/// Supported document formats, by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Toml,
    Json,
    Yaml,
}

impl DocumentFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "toml" => Some(DocumentFormat::Toml),
            "json" => Some(DocumentFormat::Json),
            "yaml" | "yml" => Some(DocumentFormat::Yaml),
            _ => None,
        }
    }

    fn parse(self, content: &str) -> Result<ModelDocument> {
        let document = match self {
            DocumentFormat::Toml => toml::from_str(content)?,
            DocumentFormat::Json => serde_json::from_str(content)?,
            DocumentFormat::Yaml => serde_yaml::from_str(content)?,
        };
        Ok(document)
    }
}

/// Registry of model documents
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    config: ModelsConfig,
}

impl ModelRegistry {
    /// Create a new model registry
    pub fn new(config: &ModelsConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Document paths in pattern order, then path order
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let exclude_paths = self.config.exclude_paths.clone().unwrap_or_default();
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for pattern in &self.config.paths {
            let entries = glob::glob(pattern)
                .map_err(|e| Error::ConfigError(format!("Invalid model path pattern {}: {}", pattern, e)))?;

            for entry in entries {
                let path = entry.map_err(|e| Error::IoError(e.into_error()))?;

                if exclude_paths.iter().any(|exclude| path.starts_with(exclude)) {
                    continue;
                }
                if !path.is_file() || DocumentFormat::from_path(&path).is_none() {
                    continue;
                }
                if seen.insert(path.clone()) {
                    found.push(path);
                }
            }
        }

        Ok(found)
    }

    /// Parse one document
    pub fn read_document(path: &Path) -> Result<ModelDocument> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!("Unsupported model document: {}", path.display()))
        })?;
        let content = fs::read_to_string(path)?;

        format.parse(&content).map_err(|e| match e {
            Error::SerializationError(message) => {
                Error::SerializationError(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Documents making up the definition set. A written `write_to`
    /// document replaces the discovered ones.
    pub fn sources(&self) -> Result<Vec<PathBuf>> {
        if let Some(path) = self.config.write_to.as_deref().map(PathBuf::from) {
            if path.is_file() {
                tracing::debug!(path = %path.display(), "Using written model definitions");
                return Ok(vec![path]);
            }
        }

        self.discover()
    }

    /// Build the authoritative snapshot from every source document of the
    /// selected context
    pub fn load_database(&self) -> Result<Database> {
        let paths = self.sources()?;
        if paths.is_empty() {
            return Err(Error::ConfigError(format!(
                "No model definitions found in {}",
                self.config.paths.join(", ")
            )));
        }

        let mut documents = Vec::with_capacity(paths.len());
        for path in &paths {
            tracing::debug!(path = %path.display(), "Reading model document");
            documents.push(Self::read_document(path)?);
        }

        let context = self.select_context(&documents)?;
        let mut database = Database::new(context.as_deref().unwrap_or(DEFAULT_CONTEXT));

        for document in &documents {
            let selected = match (&document.context, &context) {
                (Some(declared), Some(wanted)) => names_match(declared, wanted),
                _ => true,
            };
            if !selected {
                continue;
            }
            for table in &document.tables {
                database.add_table(table.to_table()?);
            }
        }

        tracing::info!(
            context = %database.name,
            documents = documents.len(),
            tables = database.tables.len(),
            "Loaded model definitions"
        );
        Ok(database)
    }

    /// The context to load. Documents without a context belong to every context.
    fn select_context(&self, documents: &[ModelDocument]) -> Result<Option<String>> {
        let mut contexts: Vec<&str> = Vec::new();
        for declared in documents.iter().filter_map(|d| d.context.as_deref()) {
            if !contexts.iter().any(|c| names_match(c, declared)) {
                contexts.push(declared);
            }
        }

        match &self.config.context {
            Some(wanted) => contexts
                .iter()
                .find(|c| names_match(c, wanted))
                .map(|c| Some(c.to_string()))
                .ok_or_else(|| {
                    Error::ConfigError(format!("Model context {} was not found", wanted))
                }),
            None => match contexts.as_slice() {
                [] => Ok(None),
                [only] => Ok(Some(only.to_string())),
                _ => Err(Error::ConfigError(format!(
                    "Several model contexts found ({}); set models.context to choose one",
                    contexts.join(", ")
                ))),
            },
        }
    }

    /// Write `database` as a single TOML document to `models.write_to`
    pub fn store_database(&self, database: &Database) -> Result<()> {
        let path = self.config.write_to.as_ref().ok_or_else(|| {
            Error::ConfigError("models.write_to is not set; nowhere to write the models".to_string())
        })?;
        let path = Path::new(path);

        let document = ModelDocument {
            context: (database.name != DEFAULT_CONTEXT).then(|| database.name.clone()),
            tables: database.tables.iter().map(TableDocument::from_table).collect(),
        };
        let content = toml::to_string(&document)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;

        tracing::info!(path = %path.display(), tables = database.tables.len(), "Wrote model definitions");
        Ok(())
    }
}

#[async_trait]
impl SchemaSourceProvider for ModelRegistry {
    async fn load(&self) -> Result<Database> {
        self.load_database()
    }

    async fn store(&self, database: &Database) -> Result<()> {
        self.store_database(database)
    }
}
