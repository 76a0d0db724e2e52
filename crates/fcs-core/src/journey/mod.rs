//! The conformance session: discovery → config → generation → tokens →
//! run → report.
//!
//! A [`Journey`] owns all derived state behind one session-wide lock.
//! Operations check their precondition against the current [`Phase`] and
//! fail with [`JourneyError::WrongPhase`] otherwise. Re-setting the
//! discovery clears every downstream artifact.

mod state;
mod stream;

pub use state::{JourneyEvent, Phase};
pub use stream::ResultStream;

use crate::conditionality::{ConditionalityCatalogue, StaticCatalogue};
use crate::config::{Certificates, ConfigError, JourneyConfig};
use crate::context::Context;
use crate::discovery::{Discovery, DiscoveryError, DiscoveryValidator, Validation, ValidationFailure};
use crate::engine::{RunPolicy, Runner, TestCaseResult};
use crate::generator::{GenerationError, Generator};
use crate::model::SpecificationTestCases;
use crate::oauth::{authorization_url, OAuthClient, TokenError, TokenExchanger, TokenRequest};
use crate::permissions::{PermissionTable, SpecConsentRequirements};
use crate::report::{AcquiredTokenSummary, ExportReport, ExportRequest, ExportRequestInvalid};
use crate::signing::{DetachedJwsSigner, RequestSigner, SigningError};
use crate::specification::SpecRegistry;
use crate::swagger::{SchemaError, SwaggerLoader, SwaggerSource};
use crate::transport::{ReqwestTransportFactory, TransportError, TransportFactory};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use state::{CollectedToken, State};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_SWAGGER_CACHE: u64 = 16;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum JourneyError {
    #[error("discovery model is invalid")]
    Validation(Vec<ValidationFailure>),

    #[error("discovery model not set")]
    DiscoveryNotSet,

    #[error("test cases not generated")]
    CasesNotSet,

    #[error("cannot {operation} in phase {phase}")]
    WrongPhase { operation: &'static str, phase: Phase },

    #[error("test run already in progress")]
    AlreadyRunning,

    #[error("tokens not collected for: {}", .0.join(", "))]
    TokensPending(Vec<String>),

    #[error("no consent bundle named '{0}'")]
    UnknownConsent(String),

    #[error("discovery model replaced during {0}")]
    Superseded(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Export(#[from] ExportRequestInvalid),

    #[error("packaged data is corrupt: {0}")]
    Internal(String),
}

impl JourneyError {
    /// HTTP status for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Discovery(_) | Self::Internal(_) | Self::Schema(_) | Self::Transport(_) => 500,
            Self::Generation(GenerationError::Schema(_)) => 500,
            Self::Token(TokenError::Network(_)) => 500,
            _ => 400,
        }
    }
}

/// Collaborators a journey is built from; tests substitute their own.
#[derive(Clone)]
pub struct JourneyDeps {
    pub catalogue: Arc<dyn ConditionalityCatalogue>,
    pub registry: Arc<SpecRegistry>,
    pub permissions: Arc<PermissionTable>,
    pub swagger: Arc<dyn SwaggerSource>,
    pub transports: Arc<dyn TransportFactory>,
    pub tokens: Arc<dyn TokenExchanger>,
    pub policy: RunPolicy,
    pub http_timeout: Duration,
}

impl JourneyDeps {
    /// Packaged catalogues with network-backed collaborators.
    pub fn builtin() -> Result<Self, JourneyError> {
        Self::with_settings(DEFAULT_SWAGGER_CACHE, DEFAULT_HTTP_TIMEOUT, RunPolicy::default())
    }

    pub fn with_settings(
        swagger_cache: u64,
        http_timeout: Duration,
        policy: RunPolicy,
    ) -> Result<Self, JourneyError> {
        let internal = |e: serde_json::Error| JourneyError::Internal(e.to_string());
        Ok(Self {
            catalogue: Arc::new(StaticCatalogue::builtin().map_err(internal)?),
            registry: Arc::new(SpecRegistry::builtin().map_err(internal)?),
            permissions: Arc::new(PermissionTable::builtin().map_err(internal)?),
            swagger: Arc::new(SwaggerLoader::new(swagger_cache, http_timeout)?),
            transports: Arc::new(ReqwestTransportFactory),
            tokens: Arc::new(
                OAuthClient::new(http_timeout).map_err(|e| JourneyError::Internal(e.to_string()))?,
            ),
            policy,
            http_timeout,
        })
    }
}

/// A consent bundle still waiting for its token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConsent {
    pub name: String,
    pub specification: String,
    pub permissions: Vec<String>,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
}

pub struct Journey {
    deps: JourneyDeps,
    state: Mutex<State>,
}

impl Journey {
    pub fn new(deps: JourneyDeps) -> Self {
        Self {
            deps,
            state: Mutex::new(State::default()),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase()
    }

    /// Replace the configuration; certificate material is validated first.
    pub async fn set_config(&self, config: JourneyConfig) -> Result<(), JourneyError> {
        let mut state = self.state.lock().await;
        if state.is_running() {
            return Err(wrong_phase("set config", &state));
        }
        let certificates = config.validate()?;
        info!(client_id = %config.client_id, "journey config set");
        state.config = Some(config);
        state.certificates = Some(certificates);
        Ok(())
    }

    pub async fn set_certificates(
        &self,
        signing_private: &str,
        signing_public: &str,
        transport_private: &str,
        transport_public: &str,
    ) -> Result<(), JourneyError> {
        let mut state = self.state.lock().await;
        if state.is_running() {
            return Err(wrong_phase("set certificates", &state));
        }
        let algorithm = state
            .certificates
            .as_ref()
            .map_or(Algorithm::PS256, |c| c.algorithm);
        state.certificates = Some(Certificates::parse(
            signing_private,
            signing_public,
            transport_private,
            transport_public,
            algorithm,
        )?);
        Ok(())
    }

    /// Validate and install a discovery document, clearing generated cases,
    /// tokens and results.
    pub async fn set_discovery_model(&self, doc: &Value) -> Result<Discovery, JourneyError> {
        let validation =
            DiscoveryValidator::new(self.deps.catalogue.as_ref(), &self.deps.registry).validate(doc)?;
        let discovery = match validation {
            Validation::Valid(d) => d,
            Validation::Invalid(failures) => {
                info!(failures = failures.len(), "discovery model rejected");
                return Err(JourneyError::Validation(failures));
            }
        };

        let mut state = self.state.lock().await;
        if state.is_running() {
            return Err(wrong_phase("set discovery model", &state));
        }
        self.deps.swagger.invalidate();
        state.clear_downstream();
        state.discovery = Some(discovery.clone());
        info!(name = %discovery.discovery_model.name, "discovery model set");
        Ok(discovery)
    }

    pub async fn discovery(&self) -> Option<Discovery> {
        self.state.lock().await.discovery.clone()
    }

    /// Generated test cases; generated on first call, cached afterwards.
    ///
    /// Swagger documents are fetched without holding the session lock; a
    /// discovery replaced in the meantime discards the result.
    pub async fn test_cases(&self) -> Result<Arc<Vec<SpecificationTestCases>>, JourneyError> {
        let (discovery, epoch) = {
            let state = self.state.lock().await;
            if let Some(plan) = &state.plan {
                return Ok(plan.clone());
            }
            let mut discovery = state.discovery.clone().ok_or(JourneyError::DiscoveryNotSet)?;
            if let Some(config) = &state.config {
                for item in &mut discovery.discovery_model.discovery_items {
                    item.resource_ids
                        .extend(config.resource_ids.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            (discovery, state.epoch)
        };

        let generated = Generator::new(
            &self.deps.registry,
            self.deps.swagger.as_ref(),
            &self.deps.permissions,
        )
        .generate_plan(&discovery)
        .await?;

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            warn!("discovery model replaced during generation; plan discarded");
            return Err(JourneyError::Superseded("test case generation"));
        }
        // a concurrent caller installed its plan first
        if let Some(plan) = &state.plan {
            return Ok(plan.clone());
        }
        let plan = Arc::new(generated.test_cases);
        state.plan = Some(plan.clone());
        state.consents = generated.consents;
        state.tokens.clear();
        Ok(plan)
    }

    pub async fn consent_requirements(&self) -> Result<Vec<SpecConsentRequirements>, JourneyError> {
        let state = self.state.lock().await;
        if state.plan.is_none() {
            return Err(JourneyError::CasesNotSet);
        }
        Ok(state.consents.clone())
    }

    /// Bundles without a token, with the PSU authorisation URL when the
    /// config carries an authorisation endpoint.
    pub async fn pending_consents(&self) -> Result<Vec<PendingConsent>, JourneyError> {
        let state = self.state.lock().await;
        if state.plan.is_none() {
            return Err(JourneyError::CasesNotSet);
        }
        let config = state.config.clone().unwrap_or_default();
        Ok(state
            .consents
            .iter()
            .flat_map(|spec| {
                spec.named_permissions
                    .iter()
                    .map(move |b| (spec.identifier.clone(), b))
            })
            .filter(|(_, b)| !state.tokens.contains_key(&b.name))
            .map(|(specification, b)| PendingConsent {
                name: b.name.clone(),
                specification,
                permissions: b.code_set.permissions.clone(),
                scopes: b.code_set.scopes.clone(),
                authorization_url: authorization_url(
                    &config.authorization_endpoint,
                    &config.client_id,
                    &config.redirect_url,
                    &b.code_set.scopes,
                    &b.name,
                ),
            })
            .collect())
    }

    /// Exchange `code` for the bundle named by `state_name`.
    pub async fn collect_token(
        &self,
        code: &str,
        state_name: &str,
        scope: &str,
    ) -> Result<AcquiredTokenSummary, JourneyError> {
        let (config, plan) = {
            let state = self.state.lock().await;
            let plan = state.plan.clone().ok_or(JourneyError::CasesNotSet)?;
            if !state.bundle_names().any(|n| n == state_name) {
                return Err(JourneyError::UnknownConsent(state_name.to_string()));
            }
            let config = state.config.clone().ok_or_else(|| {
                TokenError::NotConfigured("journey config not set".to_string())
            })?;
            (config, plan)
        };

        // lock released across the exchange
        let exchanged = self
            .deps
            .tokens
            .exchange(&TokenRequest {
                token_endpoint: &config.token_endpoint,
                client_id: &config.client_id,
                client_secret: &config.client_secret,
                redirect_url: &config.redirect_url,
                code,
                scope,
            })
            .await;

        let mut state = self.state.lock().await;
        // the consent was granted for `plan`; a regenerated plan reuses bundle names
        if !state.plan.as_ref().is_some_and(|p| Arc::ptr_eq(p, &plan)) {
            warn!(consent = state_name, "test plan replaced during token exchange; token dropped");
            return Err(JourneyError::Superseded("token exchange"));
        }
        let token = match exchanged {
            Ok(t) => t,
            Err(e) => {
                warn!(consent = state_name, error = %e, "token exchange failed");
                state.events.push(JourneyEvent::TokenError {
                    state: state_name.to_string(),
                    error: "token_exchange_failed".to_string(),
                    description: e.to_string(),
                });
                return Err(e.into());
            }
        };
        let summary = AcquiredTokenSummary {
            name: state_name.to_string(),
            expires_in: token.expires_in,
            acquired_at: chrono::Utc::now(),
        };
        state.tokens.insert(
            state_name.to_string(),
            CollectedToken {
                access_token: token.access_token,
                summary: summary.clone(),
            },
        );
        state.events.push(JourneyEvent::AcquiredToken(summary.clone()));
        info!(consent = state_name, remaining = state.missing_tokens().len(), "token collected");
        Ok(summary)
    }

    /// Record an authorisation failure reported through the redirect.
    pub async fn record_token_error(&self, state_name: &str, error: &str, description: &str) {
        warn!(consent = state_name, error, description, "authorisation failed");
        self.state.lock().await.events.push(JourneyEvent::TokenError {
            state: state_name.to_string(),
            error: error.to_string(),
            description: description.to_string(),
        });
    }

    pub async fn all_tokens_collected(&self) -> bool {
        let state = self.state.lock().await;
        state.plan.is_some() && state.missing_tokens().is_empty()
    }

    /// Start the run in the background and return immediately.
    pub async fn run_tests(self: &Arc<Self>) -> Result<(), JourneyError> {
        let mut state = self.state.lock().await;
        if state.is_running() {
            return Err(JourneyError::AlreadyRunning);
        }
        let plan = state.plan.clone().ok_or(JourneyError::CasesNotSet)?;
        let missing = state.missing_tokens();
        if !missing.is_empty() {
            return Err(JourneyError::TokensPending(missing));
        }

        let transport = self
            .deps
            .transports
            .build(state.certificates.as_ref(), self.deps.http_timeout)?;
        let signer = match (&state.config, &state.certificates) {
            (Some(config), Some(certs)) => Some(Arc::new(DetachedJwsSigner::new(
                certs.signing_key.clone(),
                certs.algorithm,
                &config.signing_kid,
                &config.issuer,
                config.non_ob_directory,
                &config.trust_anchor,
            )?) as Arc<dyn RequestSigner>),
            _ => None,
        };

        let mut context = Context::new();
        if let Some(config) = &state.config {
            config.seed_context(&mut context);
        }
        for (name, token) in &state.tokens {
            context.put(name.clone(), token.access_token.clone());
        }

        // room for every result plus `Ended`: the runner never drops a frame
        // while the consumer is alive
        let (sender, stream) = mpsc::channel(state.plan_len() + 1);
        match state.subscriber.take() {
            Some(waiting) => {
                if let Err(stream) = waiting.send(stream) {
                    state.pending_stream = Some(stream);
                }
            }
            None => state.pending_stream = Some(stream),
        }

        let runner = Runner {
            transport,
            signer,
            swagger: self.deps.swagger.clone(),
            permissions: self.deps.permissions.clone(),
            policy: self.deps.policy.clone(),
        };
        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());
        state.finished = false;
        state.results.clear();
        drop(state);

        let journey = Arc::clone(self);
        tokio::spawn(async move {
            let summary = runner.run(&plan, context, sender, cancel).await;
            let mut state = journey.state.lock().await;
            state.results = summary.results;
            state.cancel = None;
            state.finished = true;
        });
        info!("test run scheduled");
        Ok(())
    }

    /// Signal cancellation; a no-op when nothing is running.
    pub async fn stop_test_run(&self) {
        if let Some(cancel) = &self.state.lock().await.cancel {
            info!("stopping test run");
            cancel.cancel();
        }
    }

    /// The live result stream. Subscribing before a run waits for that run
    /// to start; subscribing after a run started takes over its channel. A
    /// later subscriber replaces a waiting one.
    pub async fn subscribe(&self) -> ResultStream {
        let mut state = self.state.lock().await;
        if let Some(rx) = state.pending_stream.take() {
            return ResultStream::live(rx);
        }
        let (handover, waiting) = oneshot::channel();
        state.subscriber = Some(handover);
        ResultStream::waiting(waiting)
    }

    pub async fn results(&self) -> Vec<TestCaseResult> {
        self.state.lock().await.results.clone()
    }

    pub async fn events(&self) -> Vec<JourneyEvent> {
        self.state.lock().await.events.clone()
    }

    pub async fn export(&self, request: ExportRequest) -> Result<ExportReport, JourneyError> {
        request.validate()?;
        let state = self.state.lock().await;
        if state.is_running() {
            return Err(wrong_phase("export", &state));
        }
        let tokens = state.tokens.values().map(|t| t.summary.clone()).collect();
        Ok(ExportReport::new(request, state.results.clone(), tokens))
    }
}

fn wrong_phase(operation: &'static str, state: &State) -> JourneyError {
    JourneyError::WrongPhase {
        operation,
        phase: state.phase(),
    }
}
