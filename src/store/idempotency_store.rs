use sqlx::{SqliteConnection, SqlitePool};

use crate::clock::Micros;
use crate::error::StorageError;

/// A response body exactly as it was first sent for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse(String);

impl StoredResponse {
    pub fn new(body: String) -> Self {
        Self(body)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Outcome of trying to claim a key inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This transaction owns the key and must commit a response for it.
    Claimed,
    /// Another request already committed a response under the key.
    Taken,
}

/// Maps client idempotency keys to the response first produced for them.
#[derive(Clone)]
pub struct IdempotencyStore {
    pool: SqlitePool,
}

impl IdempotencyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Committed response for `key`, if any.
    pub async fn lookup(&self, key: &str) -> Result<Option<StoredResponse>, StorageError> {
        let body: Option<String> = sqlx::query_scalar(
            "SELECT response_json FROM idempotency_keys WHERE key = ? AND response_json IS NOT NULL",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(body.map(StoredResponse))
    }

    /// Reserve `key` for the current transaction.
    ///
    /// SQLite admits a single writer, so if another transaction holds an
    /// uncommitted claim on the same key this blocks (up to the busy
    /// timeout) until that transaction finishes, then reports `Taken`.
    pub async fn claim(
        &self,
        conn: &mut SqliteConnection,
        key: &str,
        now: Micros,
    ) -> Result<Claim, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, response_json, created_at_us)
            VALUES (?, NULL, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(if result.rows_affected() > 0 {
            Claim::Claimed
        } else {
            Claim::Taken
        })
    }

    /// Get-or-create the response for `key`.
    ///
    /// Fills in a claimed row, or inserts a fresh one. If a response is
    /// already stored it is left untouched. Returns whatever is stored once
    /// the statement completes, which is the winner's response on a race.
    pub async fn commit(
        &self,
        conn: &mut SqliteConnection,
        key: &str,
        response: StoredResponse,
        now: Micros,
    ) -> Result<StoredResponse, StorageError> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, response_json, created_at_us)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET response_json = excluded.response_json
            WHERE idempotency_keys.response_json IS NULL
            "#,
        )
        .bind(key)
        .bind(response.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let stored: String =
            sqlx::query_scalar("SELECT response_json FROM idempotency_keys WHERE key = ?")
                .bind(key)
                .fetch_one(&mut *conn)
                .await?;

        Ok(StoredResponse(stored))
    }
}
