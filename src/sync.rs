use std::sync::Arc;

use crate::clock::{format_timestamp, parse_cursor, Clock};
use crate::error::StorageError;
use crate::models::{SyncResponse, NOTE_ENTITY_TYPE};
use crate::store::Stores;

/// Answers "what changed since cursor X".
///
/// The feed is latest-state-per-event: every event past the cursor yields
/// the entity's *current* snapshot, so a note changed twice shows up twice
/// with the same (newest) data. It is not a replay of historical versions.
pub struct CursorService {
    stores: Stores,
    clock: Arc<Clock>,
}

impl CursorService {
    pub fn new(stores: Stores, clock: Arc<Clock>) -> Self {
        Self { stores, clock }
    }

    /// Changes after `cursor`, plus the cursor to send next time.
    ///
    /// An empty or unparseable cursor means the beginning of time. The next
    /// cursor is stamped after the log has been read and does not depend on
    /// the clock's drift check, so only a storage failure makes this fail.
    pub async fn get_changes(&self, cursor: Option<&str>) -> Result<SyncResponse, StorageError> {
        let since = parse_cursor(cursor.unwrap_or_default());
        let events = self.stores.events.list_since(since).await?;

        let mut changes = Vec::with_capacity(events.len());
        for event in &events {
            if event.entity_type != NOTE_ENTITY_TYPE {
                continue;
            }
            match self.stores.entities.get(&event.entity_id).await? {
                Some(note) => changes.push(note.to_change(event)),
                None => {
                    tracing::debug!(entity_id = %event.entity_id, "Skipping event for missing note");
                }
            }
        }

        let next_cursor = format_timestamp(self.clock.cursor());
        Ok(SyncResponse {
            changes,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::setup_test_db;
    use crate::reconciler::Reconciler;
    use crate::models::MutationRequest;

    struct Harness {
        pool: sqlx::SqlitePool,
        clock: Arc<Clock>,
        reconciler: Reconciler,
        sync: CursorService,
    }

    async fn setup() -> Harness {
        let pool = setup_test_db().await;
        let stores = Stores::new(pool.clone());
        let clock = Arc::new(Clock::new());
        Harness {
            reconciler: Reconciler::new(pool.clone(), stores.clone(), clock.clone()),
            sync: CursorService::new(stores, clock.clone()),
            clock,
            pool,
        }
    }

    async fn mutate(h: &Harness, key: &str, id: &str, title: &str, base_version: i64) {
        let request = MutationRequest {
            entity_type: NOTE_ENTITY_TYPE.to_string(),
            entity_id: id.to_string(),
            patch: [("title".to_string(), title.to_string())].into(),
            base_version,
            intent_type: None,
            ts: None,
            retries: None,
        };
        h.reconciler.apply_mutation(key, &request).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_feed() {
        let h = setup().await;

        let response = h.sync.get_changes(None).await.unwrap();
        assert!(response.changes.is_empty());
        assert!(parse_cursor(&response.next_cursor) > 0);
    }

    #[tokio::test]
    async fn test_bad_cursor_means_epoch() {
        let h = setup().await;
        mutate(&h, "k1", "n1", "a", 0).await;

        for cursor in [None, Some(""), Some("yesterday")] {
            let response = h.sync.get_changes(cursor).await.unwrap();
            assert_eq!(response.changes.len(), 1);
            assert_eq!(response.changes[0].id, "n1");
        }
    }

    #[tokio::test]
    async fn test_next_cursor_excludes_delivered_events() {
        let h = setup().await;
        mutate(&h, "k1", "n1", "a", 0).await;
        mutate(&h, "k2", "n2", "b", 0).await;

        let first = h.sync.get_changes(None).await.unwrap();
        assert_eq!(first.changes.len(), 2);

        let second = h.sync.get_changes(Some(&first.next_cursor)).await.unwrap();
        assert!(second.changes.is_empty());

        mutate(&h, "k3", "n1", "c", 1).await;
        let third = h.sync.get_changes(Some(&second.next_cursor)).await.unwrap();
        assert_eq!(third.changes.len(), 1);
        assert_eq!(third.changes[0].id, "n1");
        assert_eq!(third.changes[0].version, 2);
    }

    #[tokio::test]
    async fn test_feed_emits_current_state_per_event() {
        let h = setup().await;
        mutate(&h, "k1", "n1", "first", 0).await;
        mutate(&h, "k2", "n1", "second", 1).await;

        let response = h.sync.get_changes(None).await.unwrap();
        assert_eq!(response.changes.len(), 2);
        for change in &response.changes {
            assert_eq!(change.version, 2);
            assert_eq!(change.data["title"], "second");
        }
    }

    #[tokio::test]
    async fn test_missing_entity_is_skipped() {
        let h = setup().await;
        mutate(&h, "k1", "n1", "a", 0).await;
        mutate(&h, "k2", "n2", "b", 0).await;

        sqlx::query("DELETE FROM notes WHERE id = 'n1'")
            .execute(&h.pool)
            .await
            .unwrap();

        let response = h.sync.get_changes(None).await.unwrap();
        assert_eq!(response.changes.len(), 1);
        assert_eq!(response.changes[0].id, "n2");
    }

    #[tokio::test]
    async fn test_changes_ordered_by_commit() {
        let h = setup().await;
        mutate(&h, "k1", "b", "x", 0).await;
        mutate(&h, "k2", "a", "x", 0).await;
        mutate(&h, "k3", "b", "y", 1).await;

        let response = h.sync.get_changes(None).await.unwrap();
        let ids: Vec<&str> = response.changes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_sync_succeeds_after_wall_clock_steps_back() {
        let h = setup().await;
        mutate(&h, "k1", "n1", "a", 0).await;

        // Last issued timestamp two minutes ahead of wall time.
        h.clock.advance_to(crate::clock::wall_clock_micros() + 120_000_000);

        let response = h.sync.get_changes(Some("")).await.unwrap();
        assert_eq!(response.changes.len(), 1);

        let next = parse_cursor(&response.next_cursor);
        for change in &response.changes {
            assert!(next > parse_cursor(&change.updated_at));
        }

        let again = h.sync.get_changes(Some(&response.next_cursor)).await.unwrap();
        assert!(again.changes.is_empty());
        assert!(parse_cursor(&again.next_cursor) > next);
    }
}
