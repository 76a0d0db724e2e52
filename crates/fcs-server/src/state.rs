use fcs_core::version::VersionChecker;
use fcs_core::Journey;
use std::sync::Arc;

/// Shared by every handler; one journey per server process.
#[derive(Clone)]
pub struct AppState {
    pub journey: Arc<Journey>,
    pub version: Arc<VersionChecker>,
    /// Enables per-request tracing of the API itself.
    pub http_trace: bool,
}

impl AppState {
    pub fn new(journey: Journey, version: VersionChecker) -> Self {
        Self {
            journey: Arc::new(journey),
            version: Arc::new(version),
            http_trace: false,
        }
    }

    pub fn with_http_trace(mut self, enabled: bool) -> Self {
        self.http_trace = enabled;
        self
    }
}
