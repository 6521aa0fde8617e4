//! Models module
//!
//! The authoritative side: model documents and their discovery.

pub mod registry;

// Re-export key types
pub use registry::{
    FieldDocument, ModelDocument, ModelRegistry, SchemaSourceProvider, TableDocument,
    DEFAULT_CONTEXT,
};
