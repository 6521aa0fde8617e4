//! Utilities
//!
//! Helpers shared across the library.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use logging::init_logging;
pub use naming::{
    check_identifier_conflicts, fold_case, format_sql_identifier, names_match,
    normalize_identifier, quote_identifier,
};
