use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, patch};
use axum::{Json, Router};

use crate::db::models::Comment;
use crate::error::AppResult;
use crate::extractors::{CurrentUser, JsonBody, PathParams, QueryParams};
use crate::market::access::{ensure_comment_permitted, Action};
use crate::market::domain::{CommentPatch, NewComment};
use crate::market::listing::{
    ListParams, ListRequest, Page, PageLinks, COMMENT_ORDERING, COMMENT_PAGE_SIZE,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ads/{ad_id}/comments/", get(list).post(create))
        .route("/ads/{ad_id}/comments/{comment_id}/", get(retrieve))
        .route(
            "/ads/{ad_id}/comments/update/{comment_id}/",
            patch(update),
        )
        .route(
            "/ads/{ad_id}/comments/delete/{comment_id}/",
            delete(destroy),
        )
}

/// Resolves the nested comment and checks the caller may act on it.
async fn resolve(
    state: &AppState,
    user: &CurrentUser,
    action: Action,
    ad_id: i64,
    comment_id: i64,
) -> AppResult<Comment> {
    let comment = state.comments.resolve(ad_id, comment_id).await?;
    tracing::debug!(ad_id, comment_id, "Resolved comment");
    ensure_comment_permitted(user, action, ad_id, &comment)?;
    Ok(comment)
}

/// GET /ads/{ad_id}/comments/
async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
    links: PageLinks,
    PathParams(ad_id): PathParams<i64>,
    QueryParams(params): QueryParams<ListParams>,
) -> AppResult<Json<Page<Comment>>> {
    let request = ListRequest::parse(&params, COMMENT_PAGE_SIZE, &COMMENT_ORDERING)?;
    let (comments, total) = state.comments.list_for_ad(ad_id, &request).await?;
    Ok(Json(Page::new(comments, total, &request.page, &links)))
}

/// POST /ads/{ad_id}/comments/
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(ad_id): PathParams<i64>,
    JsonBody(body): JsonBody<NewComment>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let text = body.validate()?;
    let comment = state.comments.create(ad_id, user.id, &text).await?;
    tracing::info!(ad_id, comment_id = comment.id, author_id = user.id, "Comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /ads/{ad_id}/comments/{comment_id}/
async fn retrieve(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams((ad_id, comment_id)): PathParams<(i64, i64)>,
) -> AppResult<Json<Comment>> {
    let comment = resolve(&state, &user, Action::Read, ad_id, comment_id).await?;
    Ok(Json(comment))
}

/// PATCH /ads/{ad_id}/comments/update/{comment_id}/
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams((ad_id, comment_id)): PathParams<(i64, i64)>,
    JsonBody(body): JsonBody<CommentPatch>,
) -> AppResult<Json<Comment>> {
    resolve(&state, &user, Action::Write, ad_id, comment_id).await?;

    let text = body.validate()?;
    let comment = state
        .comments
        .update(ad_id, comment_id, text.as_deref())
        .await?;
    tracing::info!(ad_id, comment_id, user_id = user.id, "Comment updated");
    Ok(Json(comment))
}

/// DELETE /ads/{ad_id}/comments/delete/{comment_id}/
async fn destroy(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams((ad_id, comment_id)): PathParams<(i64, i64)>,
) -> AppResult<StatusCode> {
    resolve(&state, &user, Action::Delete, ad_id, comment_id).await?;

    state.comments.delete(ad_id, comment_id).await?;
    tracing::info!(ad_id, comment_id, user_id = user.id, "Comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
