//! HTTP routes under `/api`.

mod evidence;
mod journey;
mod redirect;
mod run;

use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn app(state: AppState) -> Router {
    let http_trace = state.http_trace;

    let compressed = Router::new()
        .route("/api/ping", get(ping))
        .route("/api/discovery-model", post(journey::set_discovery_model))
        .route("/api/config/global", post(journey::set_config))
        .route("/api/test-cases", get(journey::test_cases))
        .route("/api/consents", get(journey::consents))
        .route("/api/run", post(run::start).delete(run::stop))
        .route("/api/run/ws", get(run::stream))
        .route("/api/redirect/fragment/ok", post(redirect::fragment_ok))
        .route("/api/redirect/query/ok", post(redirect::query_ok))
        .route("/api/redirect/error", post(redirect::error))
        .route("/api/version", get(journey::version))
        .layer(CompressionLayer::new());

    // binary payloads stay uncompressed
    let uncompressed = Router::new()
        .route("/api/export", post(evidence::export))
        .route("/api/export/archive", post(evidence::export_archive))
        .route("/api/import/review", post(evidence::import_review))
        .route("/api/import/rerun", post(evidence::import_rerun))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let router = compressed.merge(uncompressed).with_state(state);
    if http_trace {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

async fn ping() -> StatusCode {
    StatusCode::OK
}
