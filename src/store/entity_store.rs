use sqlx::sqlite::SqliteExecutor;
use sqlx::{SqliteConnection, SqlitePool};

use crate::clock::Micros;
use crate::error::StorageError;
use crate::models::{Fields, Note};

/// Maximum page size for the listing surface.
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(sqlx::FromRow)]
struct NoteRow {
    id: String,
    fields: String,
    version: i64,
    updated_at_us: i64,
}

impl TryFrom<NoteRow> for Note {
    type Error = StorageError;

    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        Ok(Note {
            fields: serde_json::from_str(&row.fields)?,
            id: row.id,
            version: row.version,
            updated_at: row.updated_at_us,
        })
    }
}

/// Current-value note records.
#[derive(Clone)]
pub struct EntityStore {
    pool: SqlitePool,
}

impl EntityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Note>, StorageError> {
        Self::fetch(&self.pool, id).await
    }

    /// Read a note through any executor, e.g. an open transaction.
    pub async fn fetch<'e, E>(executor: E, id: &str) -> Result<Option<Note>, StorageError>
    where
        E: SqliteExecutor<'e>,
    {
        let row = sqlx::query_as::<_, NoteRow>(
            "SELECT id, fields, version, updated_at_us FROM notes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        row.map(Note::try_from).transpose()
    }

    /// Insert a new note at version 1.
    pub async fn create(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        fields: Fields,
        now: Micros,
    ) -> Result<Note, StorageError> {
        let note = Note {
            id: id.to_string(),
            fields,
            version: 1,
            updated_at: now,
        };

        sqlx::query("INSERT INTO notes (id, fields, version, updated_at_us) VALUES (?, ?, ?, ?)")
            .bind(&note.id)
            .bind(serde_json::to_string(&note.fields)?)
            .bind(note.version)
            .bind(note.updated_at)
            .execute(conn)
            .await?;

        Ok(note)
    }

    /// Overwrite a note with the state at `new_version`.
    ///
    /// The write only lands if the stored version is exactly `new_version - 1`.
    /// Callers hold the per-entity lock, so a miss means another writer
    /// bypassed it.
    pub async fn update(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        fields: Fields,
        new_version: i64,
        now: Micros,
    ) -> Result<Note, StorageError> {
        let result = sqlx::query(
            "UPDATE notes SET fields = ?, version = ?, updated_at_us = ? WHERE id = ? AND version = ?",
        )
        .bind(serde_json::to_string(&fields)?)
        .bind(new_version)
        .bind(now)
        .bind(id)
        .bind(new_version - 1)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::StaleWrite {
                id: id.to_string(),
                expected: new_version - 1,
            });
        }

        Ok(Note {
            id: id.to_string(),
            fields,
            version: new_version,
            updated_at: now,
        })
    }

    /// Search and page through notes, most recently updated first.
    /// Returns the page and the total number of matches.
    pub async fn list(
        &self,
        query: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Note>, i64), StorageError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = (page.max(1) - 1).saturating_mul(limit);
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        const FILTER: &str = r#"
            ?1 IS NULL
            OR id LIKE ?1 ESCAPE '\'
            OR json_extract(fields, '$.title') LIKE ?1 ESCAPE '\'
            OR json_extract(fields, '$.content') LIKE ?1 ESCAPE '\'
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM notes WHERE {FILTER}"))
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            r#"
            SELECT id, fields, version, updated_at_us
            FROM notes
            WHERE {FILTER}
            ORDER BY updated_at_us DESC, id ASC
            LIMIT ?2 OFFSET ?3
            "#
        ))
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let notes = rows
            .into_iter()
            .map(Note::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((notes, total))
    }
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
