use chrono::Utc;
use quiz_core::model::{SessionKey, SessionRecord};
use sqlx::Row;

use super::SqliteSessionStore;
use crate::repository::{SessionStore, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, key: SessionKey) -> Result<Option<SessionRecord>, StorageError> {
        let row = sqlx::query("SELECT record FROM sessions WHERE key = ?1")
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let text: String = row.try_get("record").map_err(ser)?;
        serde_json::from_str(&text).map(Some).map_err(ser)
    }

    async fn put(&self, key: SessionKey, record: &SessionRecord) -> Result<(), StorageError> {
        let text = serde_json::to_string(record).map_err(ser)?;
        sqlx::query(
            r"
                INSERT INTO sessions (key, record, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    record = excluded.record,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(key.to_string())
        .bind(text)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn delete(&self, key: SessionKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM sessions WHERE key = ?1")
            .bind(key.to_string())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
