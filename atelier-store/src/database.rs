use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use atelier_core::{StoreError, StoreResult};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Enum columns are stored as their serde names
pub(crate) fn encode<T: Serialize>(value: &T) -> StoreResult<String> {
    match serde_json::to_value(value).map_err(StoreError::backend)? {
        Value::String(s) => Ok(s),
        other => Err(StoreError::backend(format!("expected a string-encoded enum, got {}", other))),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> StoreResult<T> {
    serde_json::from_value(Value::String(raw.to_string())).map_err(StoreError::backend)
}

pub(crate) fn decode_opt<T: DeserializeOwned>(raw: Option<&str>) -> StoreResult<Option<T>> {
    raw.map(decode).transpose()
}

pub(crate) fn encode_opt<T: Serialize>(value: Option<&T>) -> StoreResult<Option<String>> {
    value.map(encode).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::{AssignmentStatus, DisputeStatus};

    #[test]
    fn test_enum_codec_uses_serde_names() {
        assert_eq!(encode(&AssignmentStatus::Shortlisted).unwrap(), "shortlisted");
        assert_eq!(encode(&DisputeStatus::ResponseRequired).unwrap(), "RESPONSE_REQUIRED");
        let status: DisputeStatus = decode("CLOSED").unwrap();
        assert_eq!(status, DisputeStatus::Closed);
        assert!(decode::<AssignmentStatus>("bogus").is_err());
    }
}
