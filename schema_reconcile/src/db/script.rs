//! Script output
//!
//! Writes rendered statements as a SQL script instead of executing them.

use chrono::Utc;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Join statements into one block, each terminated by `;`
pub fn script_block(statements: &[String]) -> String {
    if statements.is_empty() {
        return String::new();
    }
    format!("{};", statements.join(";\n"))
}

/// Write statements to `path` with a timestamped header, creating parent directories
pub fn write_script(path: impl AsRef<Path>, statements: &[String]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let content = format!(
        "-- Generated by schema_reconcile at {}\n{}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        script_block(statements)
    );
    fs::write(path, content)?;

    tracing::info!(path = %path.display(), statements = statements.len(), "Wrote SQL script");
    Ok(())
}
