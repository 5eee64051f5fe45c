use sqlx::SqlitePool;
use std::sync::Arc;

use crate::clock::Clock;
use crate::reconciler::Reconciler;
use crate::store::Stores;
use crate::sync::CursorService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub stores: Stores,
    pub reconciler: Arc<Reconciler>,
    pub sync: Arc<CursorService>,
}

impl AppState {
    pub fn new(pool: SqlitePool, clock: Clock) -> Self {
        let clock = Arc::new(clock);
        let stores = Stores::new(pool.clone());
        Self {
            reconciler: Arc::new(Reconciler::new(pool.clone(), stores.clone(), clock.clone())),
            sync: Arc::new(CursorService::new(stores.clone(), clock)),
            stores,
            pool,
        }
    }
}
