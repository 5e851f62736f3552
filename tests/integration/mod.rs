//! Integration tests for the query probe.

pub mod export_test;
pub mod pipeline_test;
pub mod query_test;
pub mod streaming_test;

use iot_query_probe::config::ConnectionConfig;
use iot_query_probe::db::PgSession;

/// Helper to get test database URL from environment.
pub fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to open a test session.
pub async fn get_test_session() -> Option<PgSession> {
    let url = get_test_database_url()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    PgSession::connect(&config).await.ok()
}

/// Helper to get the connection config of the test database.
pub fn get_test_connection() -> Option<ConnectionConfig> {
    ConnectionConfig::from_connection_string(&get_test_database_url()?).ok()
}
