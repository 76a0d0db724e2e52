//! Authorisation redirects relayed by the operator's browser.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentRedirect {
    pub code: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub id_token: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRedirect {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRedirect {
    pub error: String,
    #[serde(default)]
    pub error_description: String,
    #[serde(default)]
    pub state: String,
}

pub(super) async fn fragment_ok(
    State(state): State<AppState>,
    Json(body): Json<FragmentRedirect>,
) -> ApiResult<Json<FragmentRedirect>> {
    state
        .journey
        .collect_token(&body.code, &body.state, &body.scope)
        .await?;
    Ok(Json(body))
}

pub(super) async fn query_ok(
    State(state): State<AppState>,
    Json(body): Json<QueryRedirect>,
) -> ApiResult<Json<QueryRedirect>> {
    state.journey.collect_token(&body.code, &body.state, "").await?;
    Ok(Json(body))
}

pub(super) async fn error(
    State(state): State<AppState>,
    Json(body): Json<ErrorRedirect>,
) -> Json<ErrorRedirect> {
    state
        .journey
        .record_token_error(&body.state, &body.error, &body.error_description)
        .await;
    Json(body)
}
