//! Session agent driving the HTTP transport against a mock server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tandem_auth::{
    DeviceClass, DeviceFingerprint, LongLivedCredential, ShortLivedCredential, SubjectId,
};
use tandem_client::{
    AgentConfig, AgentStatus, ClientError, HttpTransport, MemoryTokenStore, ReauthReason,
    SessionAgent, StoredSession, TokenStore,
};
use time::OffsetDateTime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn expiring_session(server: &str) -> StoredSession {
    StoredSession {
        server: server.to_string(),
        subject_id: SubjectId::from(42),
        device_class: DeviceClass::parse("web").unwrap(),
        device_fingerprint: DeviceFingerprint::parse("fp-a").unwrap(),
        slc: ShortLivedCredential::new("slc-old"),
        llc: LongLivedCredential::new("llc-1"),
        slc_expires_at: OffsetDateTime::now_utc() + time::Duration::minutes(2),
    }
}

fn agent(server: &MockServer, tokens: Arc<MemoryTokenStore>) -> SessionAgent {
    tokens.save(&expiring_session(&server.uri())).unwrap();
    SessionAgent::new(
        AgentConfig {
            retry_delay: Duration::from_millis(10),
            ..AgentConfig::default()
        },
        Arc::new(HttpTransport::new(&server.uri())),
        tokens,
    )
    .unwrap()
}

#[tokio::test]
async fn concurrent_requests_trigger_one_http_refresh() {
    let server = MockServer::start().await;
    let expires = OffsetDateTime::now_utc() + time::Duration::minutes(15);
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(100))
                .set_body_json(json!({
                    "slc": "slc-new",
                    "token_type": "Bearer",
                    "slc_ttl": 900,
                    "slc_expires_at": expires
                        .format(&time::format_description::well_known::Rfc3339)
                        .unwrap(),
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(MemoryTokenStore::new());
    let agent = agent(&server, tokens.clone());

    let calls: Vec<_> = (0..5)
        .map(|_| {
            let agent = agent.clone();
            tokio::spawn(async move { agent.ensure_fresh().await })
        })
        .collect();
    for call in calls {
        assert_eq!(call.await.unwrap().unwrap().as_str(), "slc-new");
    }

    assert_eq!(tokens.load().unwrap().unwrap().slc.as_str(), "slc-new");
    assert!(!agent.is_expiring_soon());
}

#[tokio::test]
async fn invalid_refresh_credential_forces_reauthentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "refresh_token_invalid",
            "message": "refresh credential is invalid",
            "retryable": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(MemoryTokenStore::new());
    let agent = agent(&server, tokens.clone());

    let err = agent.ensure_fresh().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::ReauthRequired(ReauthReason::Rejected { ref code }) if code == "refresh_token_invalid"
    ));
    assert_eq!(agent.status(), AgentStatus::Failed);
    assert!(tokens.load().unwrap().is_none());
}

#[tokio::test]
async fn server_outage_is_retried_then_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": "store_unavailable",
            "message": "credential store unavailable",
            "retryable": true
        })))
        .expect(3)
        .mount(&server)
        .await;

    let agent = agent(&server, Arc::new(MemoryTokenStore::new()));
    let err = agent.ensure_fresh().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::ReauthRequired(ReauthReason::RetriesExhausted)
    ));
}
