//! schema_reconcile: keeps model definitions and a live database schema in step
//!
//! Both schemas are loaded into one canonical model, aligned table by table
//! and field by field, and the differences turned into an ordered change plan
//! for a chosen direction. Plans targeting the database are rendered as SQL
//! and executed or written to a script; plans targeting the models are
//! written back as model documents.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;
pub mod utils;

use serde::Serialize;

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::{Backend, DatabaseConnection};
pub use error::{Error, Result};
pub use models::registry::{ModelRegistry, SchemaSourceProvider};
pub use schema::analyzer::{PhysicalSchemaProvider, SchemaAnalyzer};
pub use schema::generator::{MySqlGenerator, StatementGenerator};
pub use schema::merge::MergedDatabase;
pub use schema::plan::{ChangePlan, Direction, Operation};

use db::executor::SqlExecutor;
use schema::diff::{available_directions, DifferenceSummary};
use schema::types::{Database, Side};
use utils::naming::check_identifier_conflicts;

/// Load the configuration file, set up logging and connect
pub async fn init(config_path: &str) -> Result<SyncClient> {
    let config = config::load_from_file(config_path)?;
    utils::logging::init_logging(config.logging.as_ref())?;
    SyncClient::connect(config).await
}

/// Both snapshots aligned, as of one comparison
#[derive(Debug, Clone)]
pub struct Comparison {
    pub merged: MergedDatabase,
    /// Whether the physical database exists yet
    pub physical_exists: bool,
}

impl Comparison {
    pub fn difference_count(&self) -> usize {
        self.merged.difference_count(false)
    }

    pub fn summary(&self) -> DifferenceSummary {
        self.merged.summary()
    }

    /// Directions worth offering for this comparison
    pub fn available_directions(&self) -> Vec<Direction> {
        available_directions(&self.merged)
    }
}

/// Outcome of one [`SyncClient::sync`] run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// The direction actually used
    pub direction: Direction,
    pub differences: usize,
    pub operations: usize,
    /// Rendered statements, for plans targeting the database
    pub statements: Vec<String>,
    /// Whether the target was changed
    pub applied: bool,
}

/// The main client tying the schema sources to the planner
pub struct SyncClient {
    config: Config,
    models: Box<dyn SchemaSourceProvider>,
    physical: Box<dyn PhysicalSchemaProvider>,
    generator: Box<dyn StatementGenerator>,
    executor: Option<SqlExecutor>,
}

impl SyncClient {
    /// Connect to the configured database server and use the model registry
    pub async fn connect(config: Config) -> Result<Self> {
        let backend = Backend::detect(&config.database)?;

        let connection = DatabaseConnection::connect(&config.database)
            .await
            .map_err(|e| Error::source_read(Side::Physical, e))?;
        let analyzer = SchemaAnalyzer::new(connection.clone(), &config.database.name)
            .with_concurrency(
                config
                    .database
                    .introspection_concurrency
                    .unwrap_or(schema::analyzer::DEFAULT_CONCURRENCY),
            );

        tracing::info!(%backend, database = %config.database.name, "Connected to database server");

        Ok(Self {
            models: Box::new(ModelRegistry::new(&config.models)),
            physical: Box::new(analyzer),
            generator: Self::generator_for(backend),
            executor: Some(SqlExecutor::new(connection)),
            config,
        })
    }

    /// Use caller-supplied schema sources and no live connection.
    ///
    /// Plans can be rendered and written to a script, or applied to the
    /// model side, but not executed.
    pub fn with_providers(
        config: Config,
        models: impl SchemaSourceProvider + 'static,
        physical: impl PhysicalSchemaProvider + 'static,
    ) -> Result<Self> {
        let backend = Backend::detect(&config.database)?;

        Ok(Self {
            config,
            models: Box::new(models),
            physical: Box::new(physical),
            generator: Self::generator_for(backend),
            executor: None,
        })
    }

    fn generator_for(backend: Backend) -> Box<dyn StatementGenerator> {
        match backend {
            Backend::MySql => Box::new(MySqlGenerator::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load both snapshots and align them. Always recomputed.
    pub async fn compare(&self) -> Result<Comparison> {
        let authoritative = self
            .models
            .load()
            .await
            .map_err(|e| Error::source_read(Side::Authoritative, e))?;
        let snapshot = self
            .physical
            .load()
            .await
            .map_err(|e| Error::source_read(Side::Physical, e))?;

        self.check_names(Side::Authoritative, &authoritative)?;
        self.check_names(Side::Physical, &snapshot.database)?;

        let merged = MergedDatabase::new(authoritative, snapshot.database);
        let summary = merged.summary();
        tracing::info!(
            differences = summary.total(),
            deletes = summary.physical_only(),
            physical_exists = snapshot.exists,
            "Compared schemas"
        );

        Ok(Comparison {
            merged,
            physical_exists: snapshot.exists,
        })
    }

    /// Names differing only by case pair unpredictably
    fn check_names(&self, side: Side, database: &Database) -> Result<()> {
        let tables = check_identifier_conflicts(database.tables.iter().map(|t| t.name.as_str()), true);
        let fields = database.tables.iter().find_map(|table| {
            check_identifier_conflicts(table.fields.iter().map(|f| f.name.as_str()), true)
        });

        if let Some((first, second)) = tables.or(fields) {
            if self.config.sync.strict_names {
                return Err(Error::NameCollision {
                    side,
                    first,
                    second,
                });
            }
            tracing::warn!(%side, %first, %second, "Names differ only by case; pairing is unreliable");
        }

        Ok(())
    }

    /// Build the change plan for a comparison
    pub fn plan(&self, comparison: &Comparison, direction: Direction) -> ChangePlan {
        let plan = ChangePlan::synthesize(&comparison.merged, direction, comparison.physical_exists);

        for operation in plan.iter().filter(|op| op.is_destructive()) {
            tracing::warn!(%operation, "Destructive operation planned");
        }
        tracing::info!(
            ?direction,
            operations = plan.len(),
            destructive = plan.destructive_count(),
            "Planned changes"
        );

        plan
    }

    /// Render a plan targeting the database; nothing is returned on failure
    pub fn render(&self, plan: &ChangePlan) -> Result<Vec<String>> {
        self.generator.generate(plan)
    }

    /// Execute rendered statements in order
    pub async fn apply(&self, statements: &[String]) -> Result<usize> {
        let executor = self.executor.as_ref().ok_or_else(|| {
            Error::ConfigError("No database connection; cannot apply statements".to_string())
        })?;

        executor.execute_batch(statements).await
    }

    /// Run [`SyncClient::sync`] in the configured `sync.direction`
    pub async fn run(&self) -> Result<SyncReport> {
        self.sync(self.config.sync.direction).await
    }

    /// Complete workflow: compare, plan, then render and apply, write a
    /// script, or store the models, depending on direction and configuration
    pub async fn sync(&self, direction: Direction) -> Result<SyncReport> {
        let comparison = self.compare().await?;

        let direction = if !comparison.physical_exists && direction != Direction::Preview {
            if direction != Direction::ToPhysical {
                tracing::info!(requested = ?direction, "Physical database missing; copying models to the database");
            }
            Direction::ToPhysical
        } else {
            direction
        };

        let differences = comparison.difference_count();
        let plan = self.plan(&comparison, direction);
        let mut report = SyncReport {
            direction,
            differences,
            operations: plan.len(),
            statements: Vec::new(),
            applied: false,
        };

        if plan.is_empty() {
            if direction != Direction::Preview {
                tracing::info!("Schemas are already in sync");
            }
            return Ok(report);
        }

        match plan.target() {
            Some(Side::Physical) => {
                report.statements = self.render(&plan)?;

                if let Some(path) = self.config.script_file() {
                    db::script::write_script(path, &report.statements)?;
                } else if self.config.sync.dry_run {
                    for (i, statement) in report.statements.iter().enumerate() {
                        tracing::info!(statement = i + 1, sql = %statement, "Statement (dry run)");
                    }
                } else {
                    self.apply(&report.statements).await?;
                    report.applied = true;
                }
            }
            Some(Side::Authoritative) => {
                let updated = plan.simulate(&comparison.merged.authoritative);

                if self.config.sync.dry_run {
                    for operation in plan.iter() {
                        tracing::info!(%operation, "Model change (dry run)");
                    }
                } else {
                    self.models.store(&updated).await?;
                    report.applied = true;
                }
            }
            None => {}
        }

        Ok(report)
    }
}
