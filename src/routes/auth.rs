use axum::routing::post;
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/token/login/", post(handlers::login))
        .route("/auth/token/logout/", post(handlers::logout))
}
