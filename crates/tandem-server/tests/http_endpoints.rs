//! HTTP tests against a real listener on an ephemeral port.

use reqwest::StatusCode;
use serde_json::{Value, json};
use tandem_server::config::UserEntry;
use tandem_server::verifier::hash_password;
use tandem_server::{AppConfig, build_app};

const SECRET: &str = "0123456789abcdef0123456789abcdef";

async fn start_server() -> String {
    let mut cfg = AppConfig::default();
    cfg.auth.signing.secret = Some(SECRET.into());
    cfg.auth.admin_subjects = vec!["1".into()];
    cfg.users = vec![
        UserEntry {
            username: "alice".into(),
            subject_id: "42".into(),
            password_hash: hash_password("alice-pass").unwrap(),
        },
        UserEntry {
            username: "root".into(),
            subject_id: "1".into(),
            password_hash: hash_password("root-pass").unwrap(),
        },
    ];
    cfg.validate().unwrap();

    let app = build_app(&cfg).await.unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{addr}")
}

async fn login(base: &str, user: &str, password: &str, class: &str, fp: &str) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("{base}/auth/login"))
        .header("x-device-class", class)
        .header("x-device-fingerprint", fp)
        .json(&json!({"username": user, "password": password}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    resp.json().await.unwrap()
}

async fn whoami(base: &str, slc: &str, class: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("{base}/auth/session"))
        .bearer_auth(slc)
        .header("x-device-class", class)
        .send()
        .await
        .unwrap()
}

async fn refresh(base: &str, llc: &str, class: &str, fp: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/auth/refresh"))
        .header("x-refresh-token", llc)
        .header("x-device-class", class)
        .header("x-device-fingerprint", fp)
        .json(&json!({"subject_id": "42"}))
        .send()
        .await
        .unwrap()
}

fn str_of<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap()
}

#[tokio::test]
async fn test_login_refresh_walkthrough() {
    let base = start_server().await;

    let session = login(&base, "alice", "alice-pass", "web", "fp-a").await;
    let slc1 = str_of(&session, "slc").to_string();
    let llc1 = str_of(&session, "llc").to_string();
    assert_eq!(session["slc_ttl"], 900);
    assert_eq!(session["llc_ttl"], 604_800);

    let resp = whoami(&base, &slc1, "web").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["subject_id"], "42");

    let resp = refresh(&base, &llc1, "web", "fp-a").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let slc2 = str_of(&body, "slc").to_string();

    let resp = whoami(&base, &slc1, "web").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key("www-authenticate"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "credential_revoked");
    assert_eq!(body["retryable"], false);

    assert_eq!(whoami(&base, &slc2, "web").await.status(), StatusCode::OK);

    let resp = refresh(&base, &llc1, "web", "fp-b").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "device_mismatch");
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let base = start_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/auth/login"))
        .header("x-device-class", "web")
        .header("x-device-fingerprint", "fp-a")
        .json(&json!({"username": "alice", "password": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_platform_mismatch() {
    let base = start_server().await;
    let session = login(&base, "alice", "alice-pass", "web", "fp-a").await;

    let resp = whoami(&base, str_of(&session, "slc"), "mobile-ios").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "platform_mismatch");
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let base = start_server().await;
    let session = login(&base, "alice", "alice-pass", "web", "fp-a").await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .post(format!("{base}/auth/logout"))
            .header("x-refresh-token", str_of(&session, "llc"))
            .header("x-device-class", "web")
            .json(&json!({"subject_id": "42"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    let resp = whoami(&base, str_of(&session, "slc"), "web").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_force_revoke() {
    let base = start_server().await;
    let web = login(&base, "alice", "alice-pass", "web", "fp-a").await;
    let phone = login(&base, "alice", "alice-pass", "mobile-ios", "fp-phone").await;
    let admin = login(&base, "root", "root-pass", "web", "fp-admin").await;
    let client = reqwest::Client::new();

    // Non-admins are refused
    let resp = client
        .post(format!("{base}/auth/admin/revoke"))
        .bearer_auth(str_of(&web, "slc"))
        .header("x-device-class", "web")
        .json(&json!({"subject_id": "42"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .get(format!("{base}/auth/admin/sessions/42"))
        .bearer_auth(str_of(&admin, "slc"))
        .header("x-device-class", "web")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sessions"].as_array().unwrap().len(), 2);

    let resp = client
        .post(format!("{base}/auth/admin/revoke"))
        .bearer_auth(str_of(&admin, "slc"))
        .header("x-device-class", "web")
        .json(&json!({"subject_id": "42"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["revoked"], json!(["mobile-ios", "web"]));

    assert_eq!(
        whoami(&base, str_of(&web, "slc"), "web").await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        whoami(&base, str_of(&phone, "slc"), "mobile-ios").await.status(),
        StatusCode::UNAUTHORIZED
    );
    // The admin's own session is untouched
    assert_eq!(
        whoami(&base, str_of(&admin, "slc"), "web").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_healthz() {
    let base = start_server().await;
    let resp = reqwest::get(format!("{base}/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
