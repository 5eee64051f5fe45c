//! SQLite-backed stores. Writes take a `&mut SqliteConnection` so the
//! reconciler can run them inside one transaction.

pub mod entity_store;
pub mod event_log;
pub mod idempotency_store;

pub use entity_store::EntityStore;
pub use event_log::EventLog;
pub use idempotency_store::{Claim, IdempotencyStore, StoredResponse};

use sqlx::SqlitePool;

/// The three stores over one database.
#[derive(Clone)]
pub struct Stores {
    pub entities: EntityStore,
    pub events: EventLog,
    pub idempotency: IdempotencyStore,
}

impl Stores {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            entities: EntityStore::new(pool.clone()),
            events: EventLog::new(pool.clone()),
            idempotency: IdempotencyStore::new(pool),
        }
    }
}
