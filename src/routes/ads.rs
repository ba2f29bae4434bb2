use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};

use crate::db::models::Ad;
use crate::error::{AppError, AppResult, FieldErrors};
use crate::extractors::{CurrentUser, JsonBody, PathParams, QueryParams};
use crate::market::access::{ensure_permitted, Action};
use crate::market::domain::{AdPatch, NewAd};
use crate::market::listing::{
    AdFilter, AdSearchParams, ListParams, ListRequest, Page, PageLinks, AD_ORDERING, AD_PAGE_SIZE,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ads/", get(list))
        .route("/ads/create/", post(create))
        .route("/ads/me/", get(list_mine))
        .route("/ads/{ad_id}/", get(retrieve))
        .route("/ads/update/{ad_id}/", patch(update))
        .route("/ads/delete/{ad_id}/", delete(destroy))
}

/// Parses paging, ordering and search together so every bad parameter is
/// reported at once.
fn parse_query(
    params: &ListParams,
    search: &AdSearchParams,
) -> Result<(ListRequest, AdFilter), FieldErrors> {
    match (
        ListRequest::parse(params, AD_PAGE_SIZE, &AD_ORDERING),
        AdFilter::parse(search),
    ) {
        (Ok(request), Ok(filter)) => Ok((request, filter)),
        (request, filter) => {
            let mut errors = FieldErrors::new();
            if let Err(e) = request {
                errors.merge(e);
            }
            if let Err(e) = filter {
                errors.merge(e);
            }
            Err(errors)
        }
    }
}

async fn list_page(
    state: &AppState,
    links: &PageLinks,
    request: ListRequest,
    filter: AdFilter,
) -> AppResult<Json<Page<Ad>>> {
    let (ads, total) = state.ads.list(&filter, &request).await?;
    Ok(Json(Page::new(ads, total, &request.page, links)))
}

async fn load(state: &AppState, ad_id: i64) -> AppResult<Ad> {
    state.ads.get(ad_id).await?.ok_or(AppError::NotFound)
}

/// GET /ads/
async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
    links: PageLinks,
    QueryParams(params): QueryParams<ListParams>,
    QueryParams(search): QueryParams<AdSearchParams>,
) -> AppResult<Json<Page<Ad>>> {
    let (request, filter) = parse_query(&params, &search)?;
    list_page(&state, &links, request, filter).await
}

/// GET /ads/me/
async fn list_mine(
    State(state): State<AppState>,
    user: CurrentUser,
    links: PageLinks,
    QueryParams(params): QueryParams<ListParams>,
    QueryParams(search): QueryParams<AdSearchParams>,
) -> AppResult<Json<Page<Ad>>> {
    let (request, filter) = parse_query(&params, &search)?;
    list_page(&state, &links, request, filter.authored_by(user.id)).await
}

/// POST /ads/create/ - the author is always the caller
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(body): JsonBody<NewAd>,
) -> AppResult<(StatusCode, Json<Ad>)> {
    let draft = body.validate()?;
    let ad = state.ads.create(user.id, &draft).await?;
    tracing::info!(ad_id = ad.id, author_id = user.id, "Ad created");
    Ok((StatusCode::CREATED, Json(ad)))
}

/// GET /ads/{ad_id}/
async fn retrieve(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(ad_id): PathParams<i64>,
) -> AppResult<Json<Ad>> {
    let ad = load(&state, ad_id).await?;
    ensure_permitted(Some(&user), Action::Read, &ad)?;
    Ok(Json(ad))
}

/// PATCH /ads/update/{ad_id}/
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(ad_id): PathParams<i64>,
    JsonBody(body): JsonBody<AdPatch>,
) -> AppResult<Json<Ad>> {
    let ad = load(&state, ad_id).await?;
    ensure_permitted(Some(&user), Action::Write, &ad)?;

    let changes = body.validate()?;
    let ad = state.ads.update(ad_id, &changes).await?;
    tracing::info!(ad_id, user_id = user.id, "Ad updated");
    Ok(Json(ad))
}

/// DELETE /ads/delete/{ad_id}/
async fn destroy(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(ad_id): PathParams<i64>,
) -> AppResult<StatusCode> {
    let ad = load(&state, ad_id).await?;
    ensure_permitted(Some(&user), Action::Delete, &ad)?;

    state.ads.delete(ad_id).await?;
    tracing::info!(ad_id, user_id = user.id, "Ad deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_are_merged() {
        let params = ListParams {
            page: Some("zero".into()),
            ordering: Some("colour".into()),
            ..Default::default()
        };
        let search = AdSearchParams {
            price_gte: Some("cheap".into()),
            ..Default::default()
        };
        let errors = parse_query(&params, &search).unwrap_err();
        assert!(errors.get("page").is_some());
        assert!(errors.get("ordering").is_some());
        assert_eq!(errors.get("price__gte"), Some(&["Enter a number.".to_string()][..]));
    }

    #[test]
    fn clean_query_parses() {
        let search = AdSearchParams {
            title: Some("bike".into()),
            ..Default::default()
        };
        let (request, filter) = parse_query(&ListParams::default(), &search).unwrap();
        assert_eq!(request.page.number, 1);
        assert_eq!(request.page.size, 4);
        assert_eq!(filter.title.as_deref(), Some("bike"));
    }
}
