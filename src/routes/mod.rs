pub mod health;
pub mod mutations;
pub mod notes;
pub mod sync;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(sync::routes())
        .merge(mutations::routes())
        .merge(notes::routes())
        .merge(health::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
