use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::{header, HeaderMap};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::auth::session;
use crate::db::models::Role;
use crate::error::AppError;
use crate::market::listing::PageLinks;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

/// Extractor that requires authentication.
/// Returns 401 if no valid token is presented.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)?;
        session::lookup_session(&state.db, token)?.ok_or(AppError::InvalidToken)
    }
}

/// Bearer token from `Authorization: Token <key>` or `Authorization: Bearer <key>`.
pub fn extract_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthenticated)?;

    let mut split = value.trim().splitn(2, ' ');
    let scheme = split.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::Unauthenticated);
    }
    match split.next().map(str::trim) {
        Some(token) if !token.is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(AppError::InvalidToken),
    }
}

/// JSON body whose rejections render as `{"detail": ...}` like every other error.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError::BadRequest(format!(
                "JSON parse error - {}",
                rejection.body_text()
            ))),
        }
    }
}

/// Path parameters. A segment that does not parse names no resource, so it
/// is a 404 rather than axum's plain-text 400.
pub struct PathParams<T>(pub T);

impl<T, S> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(PathParams(value)),
            Err(rejection) => {
                tracing::debug!(path = %parts.uri.path(), %rejection, "Unmatched path parameters");
                Err(AppError::NotFound)
            }
        }
    }
}

/// Query string whose rejections render as `{"detail": ...}`.
pub struct QueryParams<T>(pub T);

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(QueryParams(value)),
            Err(rejection) => Err(AppError::BadRequest(format!(
                "Invalid query string - {}",
                rejection.body_text()
            ))),
        }
    }
}

/// Absolute links for paginated responses: the configured public URL when
/// set, otherwise the request's Host.
impl FromRequestParts<AppState> for PageLinks {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let base = match state.config.server.public_url {
            Some(ref url) => url.clone(),
            None => {
                let host = parts
                    .headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .unwrap_or("localhost");
                format!("http://{host}")
            }
        };
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        PageLinks::new(&base, path_and_query)
            .map_err(|_| AppError::BadRequest("Invalid Host header.".into()))
    }
}
