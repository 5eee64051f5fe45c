use sqlx::{SqliteConnection, SqlitePool};

use crate::clock::Micros;
use crate::error::StorageError;
use crate::models::{Event, Op};

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    entity_type: String,
    entity_id: String,
    op: String,
    version: i64,
    updated_at_us: i64,
}

impl TryFrom<EventRow> for Event {
    type Error = StorageError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let op = Op::parse(&row.op)
            .ok_or_else(|| StorageError::InvalidRow(format!("event {}: unknown op {}", row.id, row.op)))?;
        Ok(Event {
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            op,
            version: row.version,
            updated_at: row.updated_at_us,
        })
    }
}

/// Append-only log of accepted mutations.
#[derive(Clone)]
pub struct EventLog {
    pool: SqlitePool,
}

impl EventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert one event. No dedup and no check against prior state.
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        entity_type: &str,
        entity_id: &str,
        op: Op,
        version: i64,
        updated_at: Micros,
    ) -> Result<Event, StorageError> {
        let id = sqlx::query(
            r#"
            INSERT INTO events (entity_type, entity_id, op, version, updated_at_us)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(op.as_str())
        .bind(version)
        .bind(updated_at)
        .execute(conn)
        .await?
        .last_insert_rowid();

        Ok(Event {
            id,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            op,
            version,
            updated_at,
        })
    }

    /// All events strictly after `cursor`, ordered by timestamp then insertion.
    ///
    /// A pure read: calling again with the same cursor yields the same
    /// sequence, extended by anything committed since.
    pub async fn list_since(&self, cursor: Micros) -> Result<Vec<Event>, StorageError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, entity_type, entity_id, op, version, updated_at_us
            FROM events
            WHERE updated_at_us > ?
            ORDER BY updated_at_us ASC, id ASC
            "#,
        )
        .bind(cursor)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Event::try_from).collect()
    }
}
