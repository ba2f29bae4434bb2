use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::{password, session};
use crate::db::models::User;
use crate::error::{AppError, AppResult, FieldErrors};
use crate::extractors::{CurrentUser, JsonBody, PathParams, QueryParams};
use crate::market::access::{ensure_user_permitted, Action};
use crate::market::domain::ProfilePatch;
use crate::market::listing::{
    ListParams, ListRequest, Page, PageLinks, USER_ORDERING, USER_PAGE_SIZE,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list))
        .route(
            "/users/me/",
            get(me).put(update_me).patch(update_me).delete(delete_me),
        )
        .route("/users/set_password/", post(set_password))
        .route(
            "/users/{user_id}/",
            get(retrieve)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct SetPasswordRequest {
    pub new_password: Option<String>,
    pub re_new_password: Option<String>,
    pub current_password: Option<String>,
}

async fn load(state: &AppState, user_id: i64) -> AppResult<User> {
    state.users.get(user_id).await?.ok_or(AppError::NotFound)
}

async fn apply_profile(state: &AppState, user_id: i64, patch: ProfilePatch) -> AppResult<User> {
    let changes = patch.validate()?;
    let user = state.users.update_profile(user_id, &changes).await?;
    tracing::info!(user_id, "Profile updated");
    Ok(user)
}

async fn remove(state: &AppState, user_id: i64) -> AppResult<StatusCode> {
    state.users.delete(user_id).await?;
    tracing::info!(user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /users/ - admins see everyone, others only themselves
async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    links: PageLinks,
    QueryParams(params): QueryParams<ListParams>,
) -> AppResult<Json<Page<User>>> {
    let request = ListRequest::parse(&params, USER_PAGE_SIZE, &USER_ORDERING)?;
    let only = (!user.role.is_privileged()).then_some(user.id);
    let (users, total) = state.users.list(only, &request).await?;
    Ok(Json(Page::new(users, total, &request.page, &links)))
}

/// GET /users/me/
async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    Ok(Json(load(&state, user.id).await?))
}

/// PUT|PATCH /users/me/
async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(patch): JsonBody<ProfilePatch>,
) -> AppResult<Json<User>> {
    Ok(Json(apply_profile(&state, user.id, patch).await?))
}

/// DELETE /users/me/
async fn delete_me(State(state): State<AppState>, user: CurrentUser) -> AppResult<StatusCode> {
    remove(&state, user.id).await
}

/// GET /users/{user_id}/
async fn retrieve(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(user_id): PathParams<i64>,
) -> AppResult<Json<User>> {
    ensure_user_permitted(&user, Action::Read, user_id)?;
    Ok(Json(load(&state, user_id).await?))
}

/// PUT|PATCH /users/{user_id}/
async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(user_id): PathParams<i64>,
    JsonBody(patch): JsonBody<ProfilePatch>,
) -> AppResult<Json<User>> {
    ensure_user_permitted(&user, Action::Write, user_id)?;
    Ok(Json(apply_profile(&state, user_id, patch).await?))
}

/// DELETE /users/{user_id}/
async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(user_id): PathParams<i64>,
) -> AppResult<StatusCode> {
    ensure_user_permitted(&user, Action::Delete, user_id)?;
    remove(&state, user_id).await
}

/// POST /users/set_password/ - every existing token is revoked on success
async fn set_password(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(req): JsonBody<SetPasswordRequest>,
) -> AppResult<StatusCode> {
    let account = load(&state, user.id).await?;

    let mut errors = FieldErrors::new();
    let new_password = errors.require("new_password", req.new_password);
    let re_new_password = errors.require("re_new_password", req.re_new_password);
    let current_password = errors.require("current_password", req.current_password);
    errors.into_result()?;

    let mut errors = FieldErrors::new();
    if !password::verify(&current_password, &account.password_hash) {
        errors.add("current_password", "Invalid password.");
    }
    if new_password != re_new_password {
        errors.add("non_field_errors", "The two password fields didn't match.");
    }
    password::check_into(&mut errors, "new_password", &new_password, &account.email);
    errors.into_result()?;

    let hash = password::hash(&new_password)?;
    state.users.set_password(user.id, &hash).await?;
    let revoked = session::delete_user_sessions(&state.db, user.id)?;
    tracing::info!(user_id = user.id, revoked, "Password changed");

    Ok(StatusCode::NO_CONTENT)
}
