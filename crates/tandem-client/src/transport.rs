//! HTTP calls to the session endpoints.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use tandem_auth::http::login::LoginResponse;
use tandem_auth::http::refresh::RefreshResponse;
use tandem_auth::middleware::ErrorBody;
use tandem_auth::{DeviceClass, DeviceFingerprint, LongLivedCredential, ShortLivedCredential};
use time::OffsetDateTime;

use crate::credentials::StoredSession;
use crate::error::ClientError;

/// Outcome of a successful refresh.
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub slc: ShortLivedCredential,
    pub slc_expires_at: OffsetDateTime,
    /// Replacement long-lived credential when the server rotates it.
    pub llc: Option<LongLivedCredential>,
}

/// Server calls the session agent depends on.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Exchanges the session's long-lived credential for a new short-lived one.
    async fn refresh(&self, session: &StoredSession) -> Result<Refreshed, ClientError>;

    /// Ends the session on the server.
    async fn logout(&self, session: &StoredSession) -> Result<(), ClientError>;
}

/// Header names, matching the server's transport configuration.
#[derive(Debug, Clone)]
pub struct HeaderNames {
    pub refresh: String,
    pub device_class: String,
    pub fingerprint: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            refresh: "x-refresh-token".to_string(),
            device_class: "x-device-class".to_string(),
            fingerprint: "x-device-fingerprint".to_string(),
        }
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SubjectBody<'a> {
    subject_id: &'a str,
}

/// `reqwest`-based transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderNames,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_headers(base_url, HeaderNames::default())
    }

    pub fn with_headers(base_url: &str, headers: HeaderNames) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Logs in with a username and password.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        device_class: DeviceClass,
        device_fingerprint: DeviceFingerprint,
    ) -> Result<StoredSession, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .header(&self.headers.device_class, device_class.as_str())
            .header(&self.headers.fingerprint, device_fingerprint.as_str())
            .json(&LoginBody { username, password })
            .send()
            .await?;

        let login: LoginResponse = parse_json(resp).await?;
        Ok(StoredSession {
            server: self.base_url.clone(),
            subject_id: login.subject_id,
            device_class,
            device_fingerprint,
            slc: login.slc,
            llc: login.llc,
            slc_expires_at: login.slc_expires_at,
        })
    }

    /// Reports whether the server and its credential store are up.
    pub async fn health(&self) -> Result<(u16, String), ClientError> {
        let resp = self.http.get(self.url("/healthz")).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok((status, body))
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn refresh(&self, session: &StoredSession) -> Result<Refreshed, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/refresh"))
            .header(&self.headers.refresh, session.llc.as_str())
            .header(&self.headers.device_class, session.device_class.as_str())
            .header(
                &self.headers.fingerprint,
                session.device_fingerprint.as_str(),
            )
            .json(&SubjectBody {
                subject_id: session.subject_id.as_str(),
            })
            .send()
            .await?;

        let refreshed: RefreshResponse = parse_json(resp).await?;
        Ok(Refreshed {
            slc: refreshed.slc,
            slc_expires_at: refreshed.slc_expires_at,
            llc: refreshed.llc,
        })
    }

    async fn logout(&self, session: &StoredSession) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/logout"))
            .bearer_auth(session.slc.as_str())
            .header(&self.headers.refresh, session.llc.as_str())
            .header(&self.headers.device_class, session.device_class.as_str())
            .json(&SubjectBody {
                subject_id: session.subject_id.as_str(),
            })
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(error_from(resp).await)
        }
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    if !resp.status().is_success() {
        return Err(error_from(resp).await);
    }
    resp.json()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

/// Maps an error response onto a [`ClientError`].
///
/// The `retryable` flag of the envelope wins; without an envelope any 5xx
/// is treated as transient.
async fn error_from(resp: Response) -> ClientError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(envelope) if envelope.retryable => ClientError::Unavailable {
            message: envelope.message,
        },
        Ok(envelope) => ClientError::Rejected {
            code: envelope.error,
            message: envelope.message,
        },
        Err(_) if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
            ClientError::Unavailable {
                message: format!("HTTP {status}"),
            }
        }
        Err(_) => ClientError::Rejected {
            code: format!("http_{}", status.as_u16()),
            message: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_auth::SubjectId;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(server: &str) -> StoredSession {
        StoredSession {
            server: server.to_string(),
            subject_id: SubjectId::from(42),
            device_class: DeviceClass::parse("web").unwrap(),
            device_fingerprint: DeviceFingerprint::parse("fp-a").unwrap(),
            slc: ShortLivedCredential::new("slc-1"),
            llc: LongLivedCredential::new("llc-1"),
            slc_expires_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_refresh_sends_device_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("x-refresh-token", "llc-1"))
            .and(header("x-device-class", "web"))
            .and(header("x-device-fingerprint", "fp-a"))
            .and(body_json(serde_json::json!({"subject_id": "42"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "slc": "slc-2",
                "token_type": "Bearer",
                "slc_ttl": 900,
                "slc_expires_at": "2023-11-14T22:28:20Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri());
        let refreshed = transport.refresh(&session(&server.uri())).await.unwrap();
        assert_eq!(refreshed.slc.as_str(), "slc-2");
        assert!(refreshed.llc.is_none());
    }

    #[tokio::test]
    async fn test_terminal_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "device_mismatch",
                "message": "device mismatch",
                "retryable": false
            })))
            .mount(&server)
            .await;

        let err = HttpTransport::new(&server.uri())
            .refresh(&session(&server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("device_mismatch"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_store_outage_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": "store_unavailable",
                "message": "credential store unavailable",
                "retryable": true
            })))
            .mount(&server)
            .await;

        let err = HttpTransport::new(&server.uri())
            .refresh(&session(&server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_bare_gateway_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = HttpTransport::new(&server.uri())
            .refresh(&session(&server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_login_builds_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(header("x-device-class", "web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "subject_id": "42",
                "slc": "slc-1",
                "llc": "llc-1",
                "token_type": "Bearer",
                "slc_ttl": 900,
                "llc_ttl": 604800,
                "slc_expires_at": "2023-11-14T22:28:20Z"
            })))
            .mount(&server)
            .await;

        let session = HttpTransport::new(&server.uri())
            .login(
                "alice",
                "secret",
                DeviceClass::parse("web").unwrap(),
                DeviceFingerprint::parse("fp-a").unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(session.subject_id, SubjectId::from(42));
        assert_eq!(session.llc.as_str(), "llc-1");
        assert_eq!(session.server, server.uri());
    }

    #[tokio::test]
    async fn test_logout_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .and(header("authorization", "Bearer slc-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        HttpTransport::new(&server.uri())
            .logout(&session(&server.uri()))
            .await
            .unwrap();
    }
}
