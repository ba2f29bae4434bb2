use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::{password, session};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::extractors::{extract_token, CurrentUser, JsonBody};
use crate::state::AppState;

// -- Request / response types --

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

fn login_failed() -> AppError {
    FieldErrors::single("non_field_errors", "Unable to log in with provided credentials.").into()
}

// -- Handlers --

/// POST /auth/token/login/ - exchange credentials for a token
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let mut errors = FieldErrors::new();
    let email = errors.require("email", req.email);
    let password = errors.require("password", req.password);
    errors.into_result()?;

    let user = match state.users.find_by_email(&email).await? {
        Some(user) if user.is_active && password::verify(&password, &user.password_hash) => user,
        _ => {
            tracing::warn!("Failed login attempt for {}", email);
            return Err(login_failed());
        }
    };

    let auth_token = session::create_session(&state.db, user.id, state.config.auth.token_hours)?;
    tracing::info!(user_id = user.id, "Issued auth token");

    Ok(Json(TokenResponse { auth_token }))
}

/// POST /auth/token/logout/ - revoke the presented token
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let token = extract_token(&headers)?;
    session::delete_session(&state.db, token)?;
    tracing::info!(user_id = user.id, "Revoked auth token");
    Ok(StatusCode::NO_CONTENT)
}
