pub mod admin;
pub mod credits;
pub mod events;
pub mod squares;
pub mod webhooks;
pub mod ws;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(events::routes())
        .merge(credits::routes())
        .merge(squares::routes())
        .merge(admin::routes())
        .merge(webhooks::routes())
        .merge(ws::routes())
}
