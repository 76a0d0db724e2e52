//! Session lifecycle: discovery, config, generation, tokens, run, export.

use async_trait::async_trait;
use fcs_core::journey::JourneyEvent;
use fcs_core::oauth::{TokenError, TokenExchanger, TokenRequest, TokenResponse};
use fcs_core::report::ExportRequest;
use fcs_core::swagger::{MemorySwaggerSource, SchemaError, SwaggerDoc};
use fcs_core::transport::ReqwestTransportFactory;
use fcs_core::{
    Journey, JourneyConfig, JourneyDeps, JourneyError, PermissionTable, Phase, ResultStream,
    RunEvent, RunPolicy, SpecRegistry, StaticCatalogue, SwaggerSource,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCOUNTS_SCHEMA: &str =
    "https://raw.githubusercontent.com/OpenBankingUK/read-write-api-specs/v3.1.0/dist/account-info-swagger.json";

#[derive(Default)]
struct StubTokens {
    delay: Duration,
}

#[async_trait]
impl TokenExchanger for StubTokens {
    async fn exchange(&self, request: &TokenRequest<'_>) -> Result<TokenResponse, TokenError> {
        tokio::time::sleep(self.delay).await;
        if request.code == "denied" {
            return Err(TokenError::Rejected {
                status: 400,
                body: r#"{"error":"invalid_grant"}"#.to_string(),
            });
        }
        Ok(TokenResponse {
            access_token: format!("at-{}", request.code),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: Some(request.scope.to_string()),
            id_token: None,
        })
    }
}

/// Delays every document load, standing in for a slow schema host.
struct SlowSwagger {
    inner: MemorySwaggerSource,
    delay: Duration,
}

#[async_trait]
impl SwaggerSource for SlowSwagger {
    async fn load(&self, url: &str) -> Result<Arc<SwaggerDoc>, SchemaError> {
        tokio::time::sleep(self.delay).await;
        self.inner.load(url).await
    }

    fn invalidate(&self) {}
}

fn swagger() -> MemorySwaggerSource {
    let raw: Value =
        serde_json::from_str(include_str!("fixtures/account-info-swagger.json")).unwrap();
    MemorySwaggerSource::new()
        .with_document(ACCOUNTS_SCHEMA, raw)
        .unwrap()
}

fn journey_with(swagger: Arc<dyn SwaggerSource>, tokens: StubTokens) -> Arc<Journey> {
    let deps = JourneyDeps {
        catalogue: Arc::new(StaticCatalogue::builtin().unwrap()),
        registry: Arc::new(SpecRegistry::builtin().unwrap()),
        permissions: Arc::new(PermissionTable::builtin().unwrap()),
        swagger,
        transports: Arc::new(ReqwestTransportFactory),
        tokens: Arc::new(tokens),
        policy: RunPolicy::default(),
        http_timeout: Duration::from_secs(10),
    };
    Arc::new(Journey::new(deps))
}

fn journey() -> Arc<Journey> {
    journey_with(Arc::new(swagger()), StubTokens::default())
}

fn config() -> JourneyConfig {
    serde_json::from_value(json!({
        "signing_private": include_str!("fixtures/signing.key"),
        "signing_public": include_str!("fixtures/signing.pem"),
        "transport_private": include_str!("fixtures/transport.key"),
        "transport_public": include_str!("fixtures/transport.pem"),
        "client_id": "8672384e-9a33-439f-8924-67bb14340d71",
        "client_secret": "secret",
        "token_endpoint": "https://as.aspsp.example/token",
        "authorization_endpoint": "https://as.aspsp.example/authorize",
        "redirect_url": "https://127.0.0.1:8443/conformancesuite/callback",
        "x_fapi_financial_id": "0015800001041RHAAY",
        "issuer": "https://as.aspsp.example",
        "signing_kid": "kid-1"
    }))
    .unwrap()
}

fn discovery(base: &str) -> Value {
    let mut doc: Value = serde_json::from_str(include_str!("fixtures/discovery.json")).unwrap();
    doc["discoveryModel"]["discoveryItems"][0]["resourceBaseUri"] = json!(base);
    doc
}

fn export_request() -> ExportRequest {
    ExportRequest {
        implementer: "Ozone Bank".into(),
        authorised_by: "A. Tester".into(),
        job_title: "QA".into(),
        has_agreed: true,
    }
}

async fn drain(mut rx: ResultStream) -> Vec<RunEvent> {
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        let ended = frame == RunEvent::Ended;
        frames.push(frame);
        if ended {
            break;
        }
    }
    frames
}

async fn wait_for_phase(journey: &Journey, phase: Phase) {
    for _ in 0..500 {
        if journey.phase().await == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("journey never reached {phase}");
}

/// Ready to run: config, discovery, cases and every bundle token.
async fn ready(journey: &Journey, base: &str) {
    journey.set_config(config()).await.unwrap();
    journey.set_discovery_model(&discovery(base)).await.unwrap();
    journey.test_cases().await.unwrap();
    for consent in journey.pending_consents().await.unwrap() {
        journey
            .collect_token("code", &consent.name, "openid accounts")
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn invalid_discovery_returns_all_failures_as_bad_request() {
    let j = journey();
    let err = j.set_discovery_model(&json!({})).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    match err {
        JourneyError::Validation(failures) => assert_eq!(failures.len(), 5),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(j.phase().await, Phase::Fresh);
}

#[tokio::test]
async fn generation_is_memoised_until_discovery_changes() {
    let j = journey();
    assert!(matches!(
        j.test_cases().await,
        Err(JourneyError::DiscoveryNotSet)
    ));

    j.set_discovery_model(&discovery("https://rs.aspsp.example"))
        .await
        .unwrap();
    assert_eq!(j.phase().await, Phase::DiscoverySet);

    let first = j.test_cases().await.unwrap();
    let again = j.test_cases().await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(j.phase().await, Phase::CasesGenerated);

    j.set_discovery_model(&discovery("https://rs.aspsp.example"))
        .await
        .unwrap();
    assert!(matches!(
        j.consent_requirements().await,
        Err(JourneyError::CasesNotSet)
    ));
    let regenerated = j.test_cases().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &regenerated));
    assert_eq!(*first, *regenerated);
}

#[tokio::test]
async fn config_resource_ids_override_discovery() {
    let j = journey();
    let mut c = config();
    c.resource_ids
        .insert("AccountId".to_string(), "acc-from-config".to_string());
    j.set_config(c).await.unwrap();
    j.set_discovery_model(&discovery("https://rs.aspsp.example"))
        .await
        .unwrap();

    let plan = j.test_cases().await.unwrap();
    assert!(plan[0]
        .test_cases
        .iter()
        .any(|c| c.input.endpoint == "/accounts/acc-from-config/balances"));
}

#[tokio::test]
async fn bad_certificate_is_rejected_and_nothing_stored() {
    let j = journey();
    let mut c = config();
    c.transport_public = "-----BEGIN CERTIFICATE-----\n%%%\n-----END CERTIFICATE-----".into();
    let err = j.set_config(c).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(j.phase().await, Phase::Fresh);
}

#[tokio::test]
async fn tokens_gate_the_run() {
    let j = journey();
    j.set_config(config()).await.unwrap();
    j.set_discovery_model(&discovery("https://rs.aspsp.example"))
        .await
        .unwrap();
    j.test_cases().await.unwrap();

    let pending = j.pending_consents().await.unwrap();
    assert_eq!(pending.len(), 1);
    let consent = &pending[0];
    assert_eq!(consent.name, "to1001");
    assert_eq!(consent.specification, "account-transaction-v3.1");
    assert!(consent.permissions.contains(&"ReadAccountsBasic".to_string()));
    let url = url::Url::parse(consent.authorization_url.as_deref().unwrap()).unwrap();
    assert!(url.query_pairs().any(|(k, v)| k == "state" && v == "to1001"));

    match j.run_tests().await {
        Err(JourneyError::TokensPending(missing)) => assert_eq!(missing, vec!["to1001"]),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!j.all_tokens_collected().await);

    assert!(matches!(
        j.collect_token("code", "to9999", "openid").await,
        Err(JourneyError::UnknownConsent(_))
    ));
    assert!(matches!(
        j.collect_token("denied", "to1001", "openid accounts").await,
        Err(JourneyError::Token(TokenError::Rejected { status: 400, .. }))
    ));

    let summary = j
        .collect_token("abc", "to1001", "openid accounts")
        .await
        .unwrap();
    assert_eq!(summary.expires_in, Some(3600));
    assert!(j.all_tokens_collected().await);
    assert_eq!(j.phase().await, Phase::TokensAcquired);
    assert!(j.pending_consents().await.unwrap().is_empty());

    let events = j.events().await;
    assert!(matches!(&events[0], JourneyEvent::TokenError { state, .. } if state == "to1001"));
    assert!(matches!(&events[1], JourneyEvent::AcquiredToken(s) if s.name == "to1001"));
}

#[tokio::test]
async fn full_run_streams_results_and_exports() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"Data": {"Account": []}}))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let j = journey();
    ready(&j, &server.uri()).await;
    let planned = j.test_cases().await.unwrap()[0].test_cases.len();

    let rx = j.subscribe().await;
    j.run_tests().await.unwrap();
    assert!(matches!(
        j.run_tests().await,
        Err(JourneyError::AlreadyRunning)
    ));
    assert!(matches!(
        j.set_discovery_model(&discovery(&server.uri())).await,
        Err(JourneyError::WrongPhase { phase: Phase::Running, .. })
    ));

    let frames = drain(rx).await;
    assert_eq!(frames.len(), planned + 1);
    assert_eq!(frames.last(), Some(&RunEvent::Ended));

    wait_for_phase(&j, Phase::Finished).await;
    let results = j.results().await;
    assert_eq!(results.len(), planned);
    let accounts = results
        .iter()
        .find(|r| {
            r.request
                .as_ref()
                .is_some_and(|q| q.url.ends_with("/accounts") && q.headers["Authorization"] == "Bearer at-code")
        })
        .unwrap();
    assert!(accounts.pass, "{:?}", accounts.fail);

    assert!(j.export(ExportRequest { has_agreed: false, ..export_request() }).await.is_err());
    let report = j.export(export_request()).await.unwrap();
    assert_eq!(report.results.len(), planned);
    assert_eq!(report.tokens[0].name, "to1001");
    // consent cases carry no client token without a client-credentials block
    assert!(!report.has_passed);
}

#[tokio::test]
async fn stop_cancels_the_in_flight_case() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let j = journey();
    ready(&j, &server.uri()).await;
    let planned = j.test_cases().await.unwrap()[0].test_cases.len();

    j.run_tests().await.unwrap();
    let rx = j.subscribe().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    j.stop_test_run().await;

    let frames = drain(rx).await;
    assert!(frames.len() <= planned);
    let last = match &frames[frames.len() - 2] {
        RunEvent::Result(r) => r,
        other => panic!("unexpected frame {other:?}"),
    };
    assert_eq!(last.fail.as_ref().unwrap().message, "Skipped: Cancelled");
    let earlier_skips = frames[..frames.len() - 2]
        .iter()
        .filter(|f| matches!(f, RunEvent::Result(r) if r.fail.as_ref().is_some_and(|x| x.is_skip())))
        .count();
    assert_eq!(earlier_skips, 0);

    wait_for_phase(&j, Phase::Finished).await;
    assert_eq!(j.results().await.len(), frames.len() - 1);
}

#[tokio::test]
async fn redirect_errors_are_recorded() {
    let j = journey();
    j.record_token_error("to1001", "access_denied", "user cancelled").await;
    assert_eq!(
        j.events().await,
        vec![JourneyEvent::TokenError {
            state: "to1001".into(),
            error: "access_denied".into(),
            description: "user cancelled".into(),
        }]
    );
}

/// Discovery whose custom block fetches a client-credentials token first.
fn discovery_with_client_credentials(base: &str) -> Value {
    let mut doc = discovery(base);
    doc["discoveryModel"]["customTests"] = json!([{
        "@id": "#ct0001",
        "name": "ClientCredential Grant",
        "replaceParameters": {
            "token_endpoint": format!("{base}/as/token"),
            "client_id": "8672384e-9a33-439f-8924-67bb14340d71"
        },
        "sequence": [{
            "@id": "#ct0001",
            "name": "Client Credentials Grant",
            "input": {
                "method": "POST",
                "endpoint": "${token_endpoint}",
                "headers": {"Content-Type": "application/x-www-form-urlencoded"},
                "body": "grant_type=client_credentials&scope=accounts&client_id=${client_id}"
            },
            "expect": {
                "statusCode": 200,
                "matches": [{"json": "token_type", "value": "Bearer"}]
            },
            "contextPut": [{"name": "access_token", "json": "access_token"}]
        }]
    }]);
    doc
}

async fn mount_conforming_bank(server: &MockServer) {
    let consent = json!({"Data": {"ConsentId": "aac-42", "Status": "AwaitingAuthorisation"}});
    Mock::given(method("POST"))
        .and(path("/as/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "client-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/account-access-consents"))
        .and(header("authorization", "Bearer client-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(consent.clone()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/account-access-consents/aac-42"))
        .and(header("authorization", "Bearer client-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(consent))
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/account-access-consents/aac-42"))
        .and(header("authorization", "Bearer client-token"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/accounts"))
        .and(header("authorization", "Bearer at-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Data": {"Account": [{"AccountId": "500000000000000000000001", "Currency": "GBP"}]}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/accounts/500000000000000000000001"))
        .and(header("authorization", "Bearer at-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Data": {"Account": [{"AccountId": "500000000000000000000001", "Currency": "GBP"}]}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/accounts/500000000000000000000001/balances"))
        .and(header("authorization", "Bearer at-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Data": {"Balance": [{"Amount": {"Amount": "10.00", "Currency": "GBP"}}]}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn client_credentials_block_feeds_the_consent_cases() {
    let server = MockServer::start().await;
    mount_conforming_bank(&server).await;

    let j = journey();
    j.set_config(config()).await.unwrap();
    j.set_discovery_model(&discovery_with_client_credentials(&server.uri()))
        .await
        .unwrap();
    let plan = j.test_cases().await.unwrap();
    assert_eq!(plan[0].test_cases[0].id, "#ct0001");
    for consent in j.pending_consents().await.unwrap() {
        j.collect_token("code", &consent.name, "openid accounts")
            .await
            .unwrap();
    }
    let planned: usize = plan.iter().map(|s| s.test_cases.len()).sum();

    let rx = j.subscribe().await;
    j.run_tests().await.unwrap();
    let frames = drain(rx).await;
    assert_eq!(frames.len(), planned + 1);
    wait_for_phase(&j, Phase::Finished).await;

    let results = j.results().await;
    for r in &results {
        assert!(r.pass, "{} failed: {:?}", r.id, r.fail);
    }
    let consent = results
        .iter()
        .find(|r| {
            r.request.as_ref().is_some_and(|q| {
                q.method == "POST" && q.url.ends_with("/account-access-consents")
            })
        })
        .unwrap();
    assert_eq!(
        consent.request.as_ref().unwrap().headers["Authorization"],
        "Bearer client-token"
    );

    let report = j.export(export_request()).await.unwrap();
    assert_eq!(report.results.len(), planned);
    assert!(report.has_passed);
}

#[tokio::test]
async fn token_granted_for_a_replaced_plan_is_dropped() {
    let j = journey_with(
        Arc::new(swagger()),
        StubTokens {
            delay: Duration::from_millis(300),
        },
    );
    j.set_config(config()).await.unwrap();
    j.set_discovery_model(&discovery("https://rs-a.aspsp.example"))
        .await
        .unwrap();
    j.test_cases().await.unwrap();

    let exchange = {
        let j = Arc::clone(&j);
        tokio::spawn(async move {
            j.collect_token("code-for-plan-a", "to1001", "openid accounts")
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    j.set_discovery_model(&discovery("https://rs-b.aspsp.example"))
        .await
        .unwrap();
    j.test_cases().await.unwrap();

    let outcome = exchange.await.unwrap();
    assert!(matches!(outcome, Err(JourneyError::Superseded(_))), "{outcome:?}");
    assert!(!j.all_tokens_collected().await);
    assert_eq!(j.phase().await, Phase::CasesGenerated);
    assert_eq!(j.pending_consents().await.unwrap()[0].name, "to1001");
}

#[tokio::test]
async fn generation_does_not_hold_the_session() {
    let j = journey_with(
        Arc::new(SlowSwagger {
            inner: swagger(),
            delay: Duration::from_millis(500),
        }),
        StubTokens::default(),
    );
    j.set_discovery_model(&discovery("https://rs.aspsp.example"))
        .await
        .unwrap();

    let generation = {
        let j = Arc::clone(&j);
        tokio::spawn(async move { j.test_cases().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let phase = tokio::time::timeout(Duration::from_millis(200), j.phase())
        .await
        .expect("session lock held during generation");
    assert_eq!(phase, Phase::DiscoverySet);

    assert!(generation.await.unwrap().is_ok());
    assert_eq!(j.phase().await, Phase::CasesGenerated);
}

#[tokio::test]
async fn generation_for_a_replaced_discovery_is_discarded() {
    let j = journey_with(
        Arc::new(SlowSwagger {
            inner: swagger(),
            delay: Duration::from_millis(300),
        }),
        StubTokens::default(),
    );
    j.set_discovery_model(&discovery("https://rs-a.aspsp.example"))
        .await
        .unwrap();

    let generation = {
        let j = Arc::clone(&j);
        tokio::spawn(async move { j.test_cases().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    j.set_discovery_model(&discovery("https://rs-b.aspsp.example"))
        .await
        .unwrap();

    assert!(matches!(
        generation.await.unwrap(),
        Err(JourneyError::Superseded(_))
    ));
    assert_eq!(j.phase().await, Phase::DiscoverySet);
    let plan = j.test_cases().await.unwrap();
    assert!(plan[0].test_cases[0]
        .context
        .get("baseurl")
        .is_some_and(|b| b.starts_with("https://rs-b")));
}

#[tokio::test]
async fn early_subscriber_receives_every_frame_of_a_large_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    // subscribed before any plan exists
    let j = journey();
    let rx = j.subscribe().await;

    let mut doc = discovery(&server.uri());
    let sequence: Vec<Value> = (1..=300)
        .map(|n| {
            json!({
                "@id": format!("#ct{n:04}"),
                "name": "Ping",
                "input": {"method": "GET", "endpoint": format!("{}/ping/{n}", server.uri())},
                "expect": {"statusCode": 200}
            })
        })
        .collect();
    doc["discoveryModel"]["customTests"] =
        json!([{"@id": "#ct0000", "name": "Ping block", "sequence": sequence}]);

    j.set_config(config()).await.unwrap();
    j.set_discovery_model(&doc).await.unwrap();
    let plan = j.test_cases().await.unwrap();
    for consent in j.pending_consents().await.unwrap() {
        j.collect_token("code", &consent.name, "openid accounts")
            .await
            .unwrap();
    }
    let planned: usize = plan.iter().map(|s| s.test_cases.len()).sum();
    assert!(planned > 300);

    j.run_tests().await.unwrap();
    // consumer reads nothing until the run is over
    wait_for_phase(&j, Phase::Finished).await;
    let frames = drain(rx).await;
    assert_eq!(frames.len(), planned + 1);
    assert_eq!(frames.last(), Some(&RunEvent::Ended));
}
