//! Database connection handling
//!
//! Backend detection and pooled connections to the physical database.

use sqlx::{mysql::MySqlPoolOptions, MySql, Pool};
use std::fmt;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Supported physical backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// MySQL and MariaDB
    MySql,
}

impl Backend {
    /// Work out the backend from configuration before anything connects.
    ///
    /// An explicit driver wins; otherwise the url scheme decides, and a bare
    /// url on the MySQL default port is taken as MySQL.
    pub fn detect(config: &DatabaseConfig) -> Result<Self> {
        if let Some(driver) = &config.driver {
            return match driver.to_lowercase().as_str() {
                "mysql" | "mariadb" => Ok(Backend::MySql),
                other => Err(Error::ConfigError(format!("Unsupported database driver: {}", other))),
            };
        }

        let url = config.url.to_lowercase();
        let scheme = url.split_once("://").map(|(scheme, _)| scheme);

        match scheme {
            Some("mysql") | Some("mariadb") => Ok(Backend::MySql),
            Some(other) => Err(Error::ConfigError(format!("Unsupported database scheme: {}", other))),
            None if url.contains(":3306") || url.contains("port=3306") => Ok(Backend::MySql),
            None => Err(Error::ConfigError(format!(
                "Cannot determine the database backend from url: {}",
                config.url
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::MySql => f.write_str("mysql"),
        }
    }
}

/// A pooled connection to the physical database server
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    MySql(Pool<MySql>),
}

impl DatabaseConnection {
    /// Connect to the server named by the configuration.
    ///
    /// The url addresses the server, not the database, so that a missing
    /// database can still be created.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let backend = Backend::detect(config)?;
        let pool_size = config.pool_size.unwrap_or(5);
        let timeout_seconds = config.timeout_seconds.unwrap_or(30);

        tracing::debug!(%backend, pool_size, timeout_seconds, "Connecting to database server");

        match backend {
            Backend::MySql => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(Duration::from_secs(timeout_seconds))
                    .connect(&config.url)
                    .await?;

                Ok(DatabaseConnection::MySql(pool))
            }
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            DatabaseConnection::MySql(_) => Backend::MySql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn database(driver: Option<&str>, url: &str) -> DatabaseConfig {
        DatabaseConfig {
            driver: driver.map(str::to_string),
            url: url.to_string(),
            name: "shop".to_string(),
            pool_size: None,
            timeout_seconds: None,
            introspection_concurrency: None,
        }
    }

    #[rstest]
    #[case(Some("mysql"), "postgres://localhost")]
    #[case(Some("MariaDB"), "localhost")]
    #[case(None, "mysql://root@localhost:3306")]
    #[case(None, "mariadb://db.internal")]
    #[case(None, "server=localhost;port=3306;user=root")]
    #[case(None, "localhost:3306")]
    fn detects_mysql(#[case] driver: Option<&str>, #[case] url: &str) {
        assert_eq!(Backend::detect(&database(driver, url)).unwrap(), Backend::MySql);
    }

    #[rstest]
    #[case(Some("sqlite"), "mysql://localhost")]
    #[case(None, "postgres://localhost:5432")]
    #[case(None, "localhost:5432")]
    fn rejects_other_backends(#[case] driver: Option<&str>, #[case] url: &str) {
        assert!(matches!(
            Backend::detect(&database(driver, url)),
            Err(Error::ConfigError(_))
        ));
    }
}
