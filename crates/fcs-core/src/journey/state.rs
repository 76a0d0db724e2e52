use crate::config::{Certificates, JourneyConfig};
use crate::discovery::Discovery;
use crate::engine::{RunEvent, TestCaseResult};
use crate::model::SpecificationTestCases;
use crate::permissions::SpecConsentRequirements;
use crate::report::AcquiredTokenSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Where a session stands; derived from what the journey holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Fresh,
    ConfigSet,
    DiscoverySet,
    CasesGenerated,
    TokensAcquired,
    Running,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Session events other than case results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JourneyEvent {
    AcquiredToken(AcquiredTokenSummary),
    TokenError {
        state: String,
        error: String,
        #[serde(default)]
        description: String,
    },
}

pub(crate) struct CollectedToken {
    pub access_token: String,
    pub summary: AcquiredTokenSummary,
}

#[derive(Default)]
pub(crate) struct State {
    pub config: Option<JourneyConfig>,
    pub certificates: Option<Certificates>,
    pub discovery: Option<Discovery>,
    pub plan: Option<Arc<Vec<SpecificationTestCases>>>,
    pub consents: Vec<SpecConsentRequirements>,
    pub tokens: BTreeMap<String, CollectedToken>,
    pub events: Vec<JourneyEvent>,
    pub results: Vec<TestCaseResult>,
    pub cancel: Option<CancellationToken>,
    pub finished: bool,
    /// Bumped whenever the discovery is replaced.
    pub epoch: u64,
    /// Handover slot of a subscriber waiting for the next run.
    pub subscriber: Option<oneshot::Sender<mpsc::Receiver<RunEvent>>>,
    /// Receiver for a run started without a subscriber.
    pub pending_stream: Option<mpsc::Receiver<RunEvent>>,
}

impl State {
    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn bundle_names(&self) -> impl Iterator<Item = &str> {
        self.consents
            .iter()
            .flat_map(|s| s.named_permissions.iter().map(|b| b.name.as_str()))
    }

    pub fn missing_tokens(&self) -> Vec<String> {
        self.bundle_names()
            .filter(|name| !self.tokens.contains_key(*name))
            .map(str::to_string)
            .collect()
    }

    pub fn phase(&self) -> Phase {
        if self.is_running() {
            Phase::Running
        } else if self.finished {
            Phase::Finished
        } else if self.plan.is_some() {
            if self.missing_tokens().is_empty() {
                Phase::TokensAcquired
            } else {
                Phase::CasesGenerated
            }
        } else if self.discovery.is_some() {
            Phase::DiscoverySet
        } else if self.config.is_some() {
            Phase::ConfigSet
        } else {
            Phase::Fresh
        }
    }

    /// Drop everything derived from the discovery.
    pub fn clear_downstream(&mut self) {
        self.epoch += 1;
        self.plan = None;
        self.consents.clear();
        self.tokens.clear();
        self.results.clear();
        self.finished = false;
        self.pending_stream = None;
    }

    pub fn plan_len(&self) -> usize {
        self.plan
            .as_ref()
            .map(|p| p.iter().map(|s| s.test_cases.len()).sum())
            .unwrap_or(0)
    }
}
