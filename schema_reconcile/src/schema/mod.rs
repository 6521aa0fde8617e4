//! Schema module
//!
//! The canonical schema model and everything computed from it: alignment,
//! difference classification, change planning, type mapping and statement
//! generation, plus introspection of the physical side.

pub mod analyzer;
pub mod diff;
pub mod generator;
pub mod mapping;
pub mod merge;
pub mod plan;
pub mod types;

// Re-export key types
pub use analyzer::{PhysicalSchemaProvider, SchemaAnalyzer};
pub use diff::{available_directions, DifferenceSummary};
pub use generator::{MySqlGenerator, StatementGenerator};
pub use mapping::{MySqlTypeMapper, TypeMapper};
pub use merge::{MergedDatabase, MergedField, MergedTable};
pub use plan::{ChangePlan, Direction, Operation, PrimaryKeyChange, UniqueIndexChange};
pub use types::{DataType, Database, Field, PhysicalSnapshot, Side, Table};
