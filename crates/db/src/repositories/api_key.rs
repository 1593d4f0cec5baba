use chatty_core::chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use chatty_core::ApiKeyStatus;

use super::{ApiKeyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApiKeyRepository {
    pool: DbPool,
}

impl SqlApiKeyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ApiKeyRepository for SqlApiKeyRepository {
    async fn current(&self) -> Result<Option<ApiKeyStatus>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                openai_api_key,
                is_valid,
                last_validated
             FROM api_key
             ORDER BY last_validated DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(status_from_row).transpose()
    }

    async fn replace(&self, status: &ApiKeyStatus) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM api_key").execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO api_key (id, openai_api_key, is_valid, last_validated)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&status.id)
        .bind(&status.openai_api_key)
        .bind(status.is_valid)
        .bind(status.last_validated.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn status_from_row(row: SqliteRow) -> Result<ApiKeyStatus, RepositoryError> {
    Ok(ApiKeyStatus {
        id: row.try_get("id")?,
        openai_api_key: row.try_get("openai_api_key")?,
        is_valid: row.try_get("is_valid")?,
        last_validated: parse_timestamp("last_validated", row.try_get("last_validated")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
