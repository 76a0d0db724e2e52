//! Report export and archive import.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use fcs_core::report::{ExportReport, ExportRequest};
use fcs_core::JourneyError;
use fcs_evidence::{EvidenceArchive, EvidenceWriter};
use serde_json::{json, Value};
use std::io::Cursor;
use tracing::info;

const ARCHIVE_FIELD: &str = "report";

pub(super) async fn export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<Json<ExportReport>> {
    Ok(Json(state.journey.export(request).await?))
}

pub(super) async fn export_archive(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<impl IntoResponse> {
    let report = state.journey.export(request).await?;
    let discovery = state
        .journey
        .discovery()
        .await
        .ok_or(JourneyError::DiscoveryNotSet)?;

    let mut archive = Vec::new();
    let manifest = EvidenceWriter::new(&mut archive).finish(&discovery, &report)?;
    info!(files = manifest.files.len(), bytes = archive.len(), "report archive exported");

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"report.zip\"",
            ),
        ],
        archive,
    ))
}

pub(super) async fn import_review(multipart: Multipart) -> ApiResult<Json<ExportReport>> {
    let archive = read_archive(multipart).await?;
    Ok(Json(archive.report().clone()))
}

/// Install the archived discovery so the same run can be repeated.
pub(super) async fn import_rerun(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let archive = read_archive(multipart).await?;
    let discovery = state
        .journey
        .set_discovery_model(archive.discovery())
        .await?;
    info!(name = %discovery.discovery_model.name, "discovery imported for rerun");
    Ok(Json(json!({ "discovery": discovery })))
}

async fn read_archive(mut multipart: Multipart) -> ApiResult<EvidenceArchive> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(ARCHIVE_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok(EvidenceArchive::open(Cursor::new(bytes))?);
    }
    Err(ApiError::BadRequest(format!(
        "multipart field '{ARCHIVE_FIELD}' is required"
    )))
}
