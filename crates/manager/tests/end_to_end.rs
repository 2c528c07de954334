//! Full runs from a document on disk against a mock PagerDuty endpoint.

use std::io::Write;
use std::time::Duration;

use serde_json::json;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pagerduty::ApiConfig;
use pd_manager::{
    reconcile_file, spawn_deadline, ConfigError, Phase, ReconcileError, ReconcileOptions,
    Reconciliation, State,
};

// =============================================================================
// Test Helpers
// =============================================================================

const FLINTSTONES: &str = r##"{
    "default_timezone": "Australia/Melbourne",
    "teams": [{
        "name": "Flintstones",
        "description": "Quarry operations",
        "slack": "#bedrock",
        "members": [
            {"name": "Fred", "email": "fred@x.com", "role": "lead"},
            {"name": "Barney", "email": "barney@x.com", "role": "member"}
        ],
        "services": [{"name": "quarry-api", "dashboard": "https://grafana.example.com/d/quarry"}]
    }]
}"##;

const FLINTSTONES_INVALID: &str = r#"{
    "default_timezone": "Australia/Melbourne",
    "teams": [{
        "name": "Flintstones",
        "members": [
            {"name": "Fred", "email": "fred@x.com", "role": "lead"},
            {"name": "Wilma", "email": "wilma@x.com", "role": "manager"}
        ]
    }]
}"#;

fn write_doc(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn api_for(server: &MockServer) -> ApiConfig {
    ApiConfig::new("test-token").with_base_url(server.uri())
}

async fn run_against(
    server: &MockServer,
    doc: &str,
    cancel: CancellationToken,
) -> Result<Reconciliation, ReconcileError> {
    let file = write_doc(doc);
    reconcile_file(
        file.path(),
        &api_for(server),
        ReconcileOptions::default().with_concurrency(1),
        cancel,
    )
    .await
}

async fn mount_list(server: &MockServer, list_path: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_create(server: &MockServer, create_path: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(create_path))
        .respond_with(ResponseTemplate::new(201).set_body_json(body))
        .mount(server)
        .await;
}

async fn requests_with_method(server: &MockServer, verb: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == verb)
        .map(|r| r.url.path().to_string())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_invalid_role_fails_before_any_request() {
    let server = MockServer::start().await;

    let err = run_against(&server, FLINTSTONES_INVALID, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ReconcileError::Config(ConfigError::InvalidRole { member, role, .. }) => {
            assert_eq!(member, "Wilma");
            assert_eq!(role, "manager");
        }
        other => panic!("expected invalid role, got {other:?}"),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_document_is_read_error() {
    let server = MockServer::start().await;

    let err = reconcile_file(
        "/nonexistent/org.json".as_ref(),
        &api_for(&server),
        ReconcileOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ReconcileError::Config(ConfigError::Read { .. })));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fresh_account_is_built_in_order() {
    let server = MockServer::start().await;

    mount_list(&server, "/teams", json!({"teams": []})).await;
    mount_list(&server, "/users", json!({"users": []})).await;
    mount_list(&server, "/schedules", json!({"schedules": []})).await;
    mount_list(&server, "/escalation_policies", json!({"escalation_policies": []})).await;
    mount_list(&server, "/services", json!({"services": []})).await;
    mount_list(&server, "/teams/PTEAM/members", json!({"members": [], "more": false})).await;

    mount_create(&server, "/teams", json!({"team": {"id": "PTEAM"}})).await;
    mount_create(&server, "/users", json!({"user": {"id": "PUSER"}})).await;
    mount_create(&server, "/schedules", json!({"schedule": {"id": "PSCHED"}})).await;
    mount_create(
        &server,
        "/escalation_policies",
        json!({"escalation_policy": {"id": "PPOL"}}),
    )
    .await;
    mount_create(&server, "/services", json!({"service": {"id": "PSVC"}})).await;

    Mock::given(method("PUT"))
        .and(path("/teams/PTEAM/users/PUSER"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let outcome = run_against(&server, FLINTSTONES, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.state, State::ServicesSynced);
    assert_eq!(
        requests_with_method(&server, "POST").await,
        vec![
            "/teams",
            "/users",
            "/users",
            "/schedules",
            "/escalation_policies",
            "/services",
            "/services"
        ]
    );

    let services = outcome.report.phase(Phase::Services).unwrap();
    assert_eq!(services.created, vec!["quarry-api", "oncall-bedrock"]);

    let requests = server.received_requests().await.unwrap();
    let policy_post = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path() == "/escalation_policies")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&policy_post.body).unwrap();
    let rules = &body["escalation_policy"]["escalation_rules"];
    assert_eq!(rules[0]["targets"][0]["id"], "PSCHED");
    assert_eq!(rules[1]["targets"][0]["id"], "PUSER");
    assert_eq!(rules[2]["targets"], json!([]));
}

#[tokio::test]
async fn test_existing_account_makes_no_writes() {
    let server = MockServer::start().await;

    mount_list(&server, "/teams", json!({"teams": [{"id": "PTEAM", "name": "Flintstones"}]})).await;
    mount_list(&server, "/users", json!({"users": [{"id": "PUSER"}]})).await;
    mount_list(
        &server,
        "/teams/PTEAM/members",
        json!({"members": [{"user": {"id": "PUSER"}, "role": "manager"}]}),
    )
    .await;
    mount_list(&server, "/schedules", json!({"schedules": [{"id": "PSCHED"}]})).await;
    mount_list(
        &server,
        "/escalation_policies",
        json!({"escalation_policies": [{"id": "PPOL"}]}),
    )
    .await;
    mount_list(&server, "/services", json!({"services": [{"id": "PSVC"}]})).await;

    let outcome = run_against(&server, FLINTSTONES, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.report.writes_total(), 0);
    assert!(requests_with_method(&server, "POST").await.is_empty());
    assert!(requests_with_method(&server, "PUT").await.is_empty());
}

#[tokio::test]
async fn test_server_error_stops_the_run() {
    let server = MockServer::start().await;

    mount_list(&server, "/teams", json!({"teams": [{"id": "PTEAM", "name": "Flintstones"}]})).await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = run_against(&server, FLINTSTONES, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Users));
    let gets = requests_with_method(&server, "GET").await;
    assert!(!gets.iter().any(|p| p == "/schedules"));
}

#[tokio::test]
async fn test_deadline_cancels_slow_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"teams": []}))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let deadline = spawn_deadline(cancel.clone(), Duration::from_millis(100));

    let err = run_against(&server, FLINTSTONES, cancel).await.unwrap_err();
    deadline.await.unwrap();

    assert!(err.is_cancelled());
    assert_eq!(err.phase(), Some(Phase::Teams));
}
