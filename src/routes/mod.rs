pub mod ads;
pub mod auth;
pub mod comments;
pub mod users;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full HTTP surface, ready to serve.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(ads::router())
        .merge(comments::router())
        .merge(users::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
