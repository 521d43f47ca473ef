//! Action connectors for weaver.
//!
//! Each connector implements [`weaver_workflow::ActionConnector`] for one
//! action subtype:
//!
//! - [`HttpConnector`]: `http_request` over reqwest
//! - [`FileConnector`]: `file_operation` confined to a base directory
//! - [`PostgresConnector`]: `database_query` over a sqlx pool
//!
//! Email delivery has no bundled connector; hosts register their own for
//! `send_email`.

pub mod database;
pub mod file;
pub mod http;

pub use database::PostgresConnector;
pub use file::FileConnector;
pub use http::HttpConnector;

use std::path::PathBuf;
use std::sync::Arc;
use weaver_workflow::{ActionSubtype, ConnectorRegistry};

/// Builds a registry with the bundled connectors.
///
/// File operations are rooted at `file_root`. Database queries are only
/// registered when a pool is given.
#[must_use]
pub fn standard_registry(
    file_root: impl Into<PathBuf>,
    database: Option<sqlx::PgPool>,
) -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new()
        .with(ActionSubtype::HttpRequest, Arc::new(HttpConnector::new()))
        .with(ActionSubtype::FileOperation, Arc::new(FileConnector::new(file_root)));
    if let Some(pool) = database {
        registry.register(ActionSubtype::DatabaseQuery, Arc::new(PostgresConnector::new(pool)));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_without_database() {
        let registry = standard_registry("/tmp", None);
        assert!(registry.get(ActionSubtype::HttpRequest).is_some());
        assert!(registry.get(ActionSubtype::FileOperation).is_some());
        assert!(registry.get(ActionSubtype::DatabaseQuery).is_none());
        assert!(registry.get(ActionSubtype::SendEmail).is_none());
    }
}
