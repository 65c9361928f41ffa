//! Integration tests for the Redis credential store.
//!
//! Tests use testcontainers to spin up a real Redis instance.

use std::sync::Arc;
use std::time::Duration;

use tandem_auth::{
    AuthConfig, AuthError, CredentialStore, DeviceClass, DeviceFingerprint, LoginRequest,
    SessionKey, SessionService, StoreKey, SubjectId,
};
use tandem_auth_redis::{RedisConfig, RedisCredentialStore};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

/// Each test gets its own prefix so they can share the container.
async fn store() -> RedisCredentialStore {
    let config = RedisConfig {
        enabled: true,
        url: get_redis_url().await,
        key_prefix: format!("test-{}:", uuid::Uuid::new_v4()),
        ..RedisConfig::default()
    };
    RedisCredentialStore::connect(&config)
        .await
        .expect("connect to redis")
}

fn session_key(subject: &str) -> SessionKey {
    SessionKey::new(
        SubjectId::parse(subject).unwrap(),
        DeviceClass::parse("web").unwrap(),
    )
}

#[tokio::test]
async fn test_get_set_delete() {
    let store = store().await;
    let key = StoreKey::Mirror(session_key("1"));

    assert_eq!(store.get(&key).await.unwrap(), None);

    store
        .set(&key, b"value", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(b"value".to_vec()));

    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_entries_expire() {
    let store = store().await;
    let key = StoreKey::Mirror(session_key("2"));

    store
        .set(&key, b"value", Duration::from_millis(100))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_compare_and_swap() {
    let store = store().await;
    let key = StoreKey::Lock(session_key("3"));
    let ttl = Duration::from_secs(60);

    // Absent -> value
    assert!(store.compare_and_swap(&key, None, Some(b"a"), ttl).await.unwrap());
    // Absent expected but present
    assert!(!store.compare_and_swap(&key, None, Some(b"b"), ttl).await.unwrap());
    // Wrong expected value
    assert!(!store.compare_and_swap(&key, Some(b"x"), Some(b"b"), ttl).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), Some(b"a".to_vec()));

    assert!(store.compare_and_swap(&key, Some(b"a"), Some(b"b"), ttl).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), Some(b"b".to_vec()));

    // Value -> deleted
    assert!(store.compare_and_swap(&key, Some(b"b"), None, ttl).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_ping() {
    let store = store().await;
    store.ping().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_redis_fails_to_connect() {
    let config = RedisConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".to_string(),
        timeout_ms: 200,
        ..RedisConfig::default()
    };
    assert!(RedisCredentialStore::connect(&config).await.is_err());
}

#[tokio::test]
async fn test_session_service_over_redis() {
    let mut config = AuthConfig::default();
    config.signing.secret = Some("0123456789abcdef0123456789abcdef".to_string());
    let service = SessionService::from_config(config, Arc::new(store().await)).unwrap();

    let web = DeviceClass::parse("web").unwrap();
    let login = || LoginRequest {
        subject_id: SubjectId::parse("42").unwrap(),
        device_class: web.clone(),
        device_fingerprint: DeviceFingerprint::parse("fp-a").unwrap(),
        origin_address: None,
    };

    let first = service.login(login()).await.unwrap();
    let second = service.login(login()).await.unwrap();

    let err = service
        .validate_request(first.slc.as_str(), &web, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::CredentialRevoked));
    assert!(
        service
            .validate_request(second.slc.as_str(), &web, None)
            .await
            .is_ok()
    );
}
