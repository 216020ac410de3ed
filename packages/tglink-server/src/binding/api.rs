//! Binding HTTP endpoints.
//!
//! - `POST /api/auth/tg/bind/start`     (auth) issue a binding token
//! - `GET  /api/auth/tg/bind/status`    poll a token, `?token=...`
//! - `POST /api/auth/tg/bind/confirm`   called by the update poller
//! - `GET  /api/auth/tg/bind/bot-name`  (auth) bot handle for the UI
//! - `GET  /api/user/me`                (auth) binding summary
//!
//! Every response uses the `{error, code, data}` envelope; the HTTP status
//! mirrors `code`.
//!
//! The confirm route carries no credential of its own. It must only be
//! reachable by the poller (same host or internal network).

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::service::{AccountBinding, BindStatus, ConfirmRequest, StartResponse, StatusResponse};
use crate::auth::AuthUser;
use crate::error::BindError;
use crate::state::AppState;

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub error: String,
    pub code: u16,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Json<Self> {
        Json(Self {
            error: String::new(),
            code: 200,
            data: Some(data),
        })
    }
}

fn envelope<T: Serialize>(error: &BindError, data: Option<T>) -> Response {
    let code = error.code();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ApiResponse {
            error: error.to_string(),
            code,
            data,
        }),
    )
        .into_response()
}

impl IntoResponse for BindError {
    fn into_response(self) -> Response {
        match &self {
            BindError::Entropy(detail)
            | BindError::Lifetime(detail)
            | BindError::AccountUpdate(detail)
            | BindError::Database(detail) => {
                tracing::error!(error = %self, detail = detail.as_str(), "Request failed");
            }
            _ => {}
        }
        envelope::<()>(&self, None)
    }
}

// ── Routes ───────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/tg/bind/start", post(start))
        .route("/api/auth/tg/bind/status", get(status))
        .route("/api/auth/tg/bind/confirm", post(confirm))
        .route("/api/auth/tg/bind/bot-name", get(bot_name))
        .route("/api/user/me", get(me))
}

/// Query parameters for the status endpoint.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub token: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /api/auth/tg/bind/start
pub async fn start(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<StartResponse>>, BindError> {
    let response = state.binding.start(user.account_id).await?;
    Ok(ApiResponse::success(response))
}

/// GET /api/auth/tg/bind/status?token=...
///
/// Unknown and expired tokens answer 404 but still carry `{bound: false}`.
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, BindError> {
    let token = query.token.unwrap_or_default();
    let response = match state.binding.status(&token).await? {
        BindStatus::NotFound => envelope(
            &BindError::NotFound,
            Some(StatusResponse {
                bound: false,
                telegram_id: None,
            }),
        ),
        BindStatus::Pending => ApiResponse::success(StatusResponse {
            bound: false,
            telegram_id: None,
        })
        .into_response(),
        BindStatus::Bound(telegram_id) => ApiResponse::success(StatusResponse {
            bound: true,
            telegram_id: Some(telegram_id),
        })
        .into_response(),
    };
    Ok(response)
}

/// POST /api/auth/tg/bind/confirm
/// Body: { "token": "...", "telegram_id": "..." }
pub async fn confirm(
    State(state): State<AppState>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, BindError> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Rejected confirm body");
        BindError::InvalidRequest
    })?;
    state.binding.confirm(&request).await?;
    Ok(ApiResponse::success(json!({ "ok": true })))
}

/// GET /api/auth/tg/bind/bot-name
pub async fn bot_name(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Json<ApiResponse<serde_json::Value>> {
    let name = state.binding.bot_name().await.unwrap_or_default();
    ApiResponse::success(json!({ "bot_name": name }))
}

/// GET /api/user/me
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<AccountBinding>>, BindError> {
    let binding = state
        .binding
        .account_binding(user.account_id, &user.email)
        .await?;
    Ok(ApiResponse::success(binding))
}
