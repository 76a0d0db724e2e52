use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use fcs_core::journey::PendingConsent;
use fcs_core::version::VersionInfo;
use fcs_core::{JourneyConfig, SpecificationTestCases};
use serde_json::Value;

pub(super) async fn set_discovery_model(
    State(state): State<AppState>,
    Json(doc): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    state.journey.set_discovery_model(&doc).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

pub(super) async fn set_config(
    State(state): State<AppState>,
    Json(config): Json<JourneyConfig>,
) -> ApiResult<(StatusCode, Json<JourneyConfig>)> {
    state.journey.set_config(config.clone()).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

pub(super) async fn test_cases(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<SpecificationTestCases>>> {
    let cases = state.journey.test_cases().await?;
    Ok(Json(cases.to_vec()))
}

pub(super) async fn consents(State(state): State<AppState>) -> ApiResult<Json<Vec<PendingConsent>>> {
    Ok(Json(state.journey.pending_consents().await?))
}

pub(super) async fn version(State(state): State<AppState>) -> ApiResult<Json<VersionInfo>> {
    Ok(Json(state.version.check().await?))
}
