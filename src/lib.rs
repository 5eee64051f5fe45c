pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod locks;
pub mod models;
pub mod reconciler;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
pub mod validation;

pub use clock::Clock;
pub use config::Config;
pub use db::{init_pool, run_migrations};
pub use error::{MutationError, StorageError, ValidationError};
pub use models::{ChangeRecord, MutationOutcome, MutationRequest, Note, SyncResponse};
pub use reconciler::{MutationReply, Reconciler};
pub use routes::create_router;
pub use state::AppState;
pub use store::Stores;
pub use sync::CursorService;
