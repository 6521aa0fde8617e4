//! Database module
//!
//! Connections, statement execution and script output for the physical side.

pub mod connection;
pub mod executor;
pub mod script;

// Re-export key types
pub use connection::{Backend, DatabaseConnection};
pub use executor::SqlExecutor;
pub use script::{script_block, write_script};
