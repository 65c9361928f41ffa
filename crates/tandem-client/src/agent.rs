//! Client-side session agent.
//!
//! The agent owns the local copy of the session and keeps the short-lived
//! credential fresh:
//!
//! - More than `refresh_threshold` left: the cached credential is returned.
//! - Inside the threshold: one refresh runs, every concurrent caller awaits it.
//! - Expired, refused by the server, or out of retries: credentials are
//!   cleared, [`AgentEvent::ReauthRequired`] is broadcast and further calls
//!   fail until [`SessionAgent::install`] is called with a new login.
//!
//! The refresh itself runs on a spawned task, so a caller that gives up
//! waiting cannot leave the agent stuck in `Refreshing`.

use std::sync::{Arc, Mutex, MutexGuard};

use tandem_auth::{Clock, ShortLivedCredential, SystemClock};
use time::{Duration, OffsetDateTime};
use tokio::sync::{broadcast, watch};

use crate::config::AgentConfig;
use crate::credentials::{StoredSession, TokenStore};
use crate::error::{ClientError, ReauthReason};
use crate::transport::{Refreshed, SessionTransport};

/// Observable agent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Idle,
    Refreshing,
    Failed,
}

/// Notifications for the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// A new short-lived credential was stored.
    Refreshed { expires_at: OffsetDateTime },
    /// The session is gone; prompt for a new login.
    ReauthRequired { reason: ReauthReason },
}

type Outcome = Option<Result<ShortLivedCredential, ClientError>>;

enum State {
    Idle,
    Refreshing(watch::Receiver<Outcome>),
    Failed(ReauthReason),
}

struct Shared {
    session: Option<StoredSession>,
    state: State,
    /// Bumped whenever the session is replaced or dropped, so a refresh
    /// started for an older session cannot overwrite a newer one.
    generation: u64,
}

struct Inner {
    config: AgentConfig,
    transport: Arc<dyn SessionTransport>,
    tokens: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    shared: Mutex<Shared>,
    events: broadcast::Sender<AgentEvent>,
}

enum Step {
    Ready(ShortLivedCredential),
    Wait(watch::Receiver<Outcome>),
}

/// Keeps one device's session alive.
#[derive(Clone)]
pub struct SessionAgent {
    inner: Arc<Inner>,
}

impl SessionAgent {
    /// Creates an agent, picking up any session saved in `tokens`.
    pub fn new(
        config: AgentConfig,
        transport: Arc<dyn SessionTransport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        Self::with_clock(config, transport, tokens, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AgentConfig,
        transport: Arc<dyn SessionTransport>,
        tokens: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ClientError> {
        let session = tokens.load()?;
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport,
                tokens,
                clock,
                shared: Mutex::new(Shared {
                    session,
                    state: State::Idle,
                    generation: 0,
                }),
                events,
            }),
        })
    }

    /// Subscribes to agent events.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> AgentStatus {
        match self.inner.lock().state {
            State::Idle => AgentStatus::Idle,
            State::Refreshing(_) => AgentStatus::Refreshing,
            State::Failed(_) => AgentStatus::Failed,
        }
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<StoredSession> {
        self.inner.lock().session.clone()
    }

    /// Time until the cached short-lived credential expires. Negative once
    /// it has expired.
    pub fn time_left(&self) -> Option<Duration> {
        let now = self.inner.clock.now();
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.slc_expires_at - now)
    }

    /// Whether the next [`ensure_fresh`](Self::ensure_fresh) will refresh.
    pub fn is_expiring_soon(&self) -> bool {
        self.time_left()
            .is_some_and(|left| left <= self.inner.config.refresh_threshold)
    }

    /// Installs a freshly logged-in session and leaves the `Failed` state.
    pub fn install(&self, session: StoredSession) -> Result<(), ClientError> {
        self.inner.tokens.save(&session)?;
        let mut shared = self.inner.lock();
        shared.generation += 1;
        shared.session = Some(session);
        shared.state = State::Idle;
        Ok(())
    }

    /// Returns a short-lived credential, refreshing it first when it is
    /// inside the refresh threshold.
    pub async fn ensure_fresh(&self) -> Result<ShortLivedCredential, ClientError> {
        self.acquire(false).await
    }

    /// Refreshes now regardless of the time left, joining a refresh that is
    /// already running.
    pub async fn force_refresh(&self) -> Result<ShortLivedCredential, ClientError> {
        self.acquire(true).await
    }

    /// Ends the session locally and on the server.
    ///
    /// Local state is cleared even if the server cannot be reached.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let session = {
            let mut shared = self.inner.lock();
            shared.generation += 1;
            shared.state = State::Idle;
            shared.session.take()
        };
        self.inner.tokens.clear()?;

        if let Some(session) = session
            && let Err(e) = self.inner.transport.logout(&session).await
        {
            tracing::warn!(error = %e, "server logout failed, local credentials cleared");
        }
        Ok(())
    }

    async fn acquire(&self, force: bool) -> Result<ShortLivedCredential, ClientError> {
        let mut rx = match self.begin(force)? {
            Step::Ready(slc) => return Ok(slc),
            Step::Wait(rx) => rx,
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        if let Some(result) = outcome {
            return result;
        }

        // The refresh task died without reporting
        let mut shared = self.inner.lock();
        if let State::Refreshing(current) = &shared.state
            && current.same_channel(&rx)
        {
            shared.state = State::Idle;
        }
        Err(ClientError::Network("refresh task ended unexpectedly".into()))
    }

    fn begin(&self, force: bool) -> Result<Step, ClientError> {
        let mut shared = self.inner.lock();
        match &shared.state {
            State::Failed(reason) => return Err(ClientError::ReauthRequired(reason.clone())),
            State::Refreshing(rx) => return Ok(Step::Wait(rx.clone())),
            State::Idle => {}
        }

        let session = shared
            .session
            .clone()
            .ok_or(ClientError::NotAuthenticated)?;

        let left = session.slc_expires_at - self.inner.clock.now();
        if !left.is_positive() {
            tracing::info!(subject_id = %session.subject_id, "short-lived credential expired");
            self.inner.fail(&mut shared, ReauthReason::Expired);
            return Err(ClientError::ReauthRequired(ReauthReason::Expired));
        }
        if !force && left > self.inner.config.refresh_threshold {
            return Ok(Step::Ready(session.slc));
        }

        let (tx, rx) = watch::channel(None);
        shared.state = State::Refreshing(rx.clone());
        let generation = shared.generation;
        drop(shared);

        tracing::debug!(
            subject_id = %session.subject_id,
            device_class = %session.device_class,
            seconds_left = left.whole_seconds(),
            "starting refresh"
        );
        tokio::spawn(run_refresh(Arc::clone(&self.inner), session, generation, tx));
        Ok(Step::Wait(rx))
    }
}

async fn run_refresh(
    inner: Arc<Inner>,
    session: StoredSession,
    generation: u64,
    tx: watch::Sender<Outcome>,
) {
    let result = inner.refresh_with_retries(&session).await;
    let outcome = inner.complete(session, generation, result);
    // Nobody waiting is fine
    let _ = tx.send(Some(outcome));
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn refresh_with_retries(
        &self,
        session: &StoredSession,
    ) -> Result<Refreshed, ClientError> {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 1;

        loop {
            let result = tokio::time::timeout(
                self.config.attempt_timeout,
                self.transport.refresh(session),
            )
            .await
            .unwrap_or(Err(ClientError::Timeout));

            match result {
                Ok(refreshed) => return Ok(refreshed),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "refresh attempt failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn complete(
        &self,
        mut session: StoredSession,
        generation: u64,
        result: Result<Refreshed, ClientError>,
    ) -> Result<ShortLivedCredential, ClientError> {
        let mut shared = self.lock();
        if shared.generation != generation {
            tracing::debug!("session replaced during refresh, discarding result");
            return result.map(|refreshed| refreshed.slc);
        }

        match result {
            Ok(refreshed) => {
                session.slc = refreshed.slc.clone();
                session.slc_expires_at = refreshed.slc_expires_at;
                if let Some(llc) = refreshed.llc {
                    session.llc = llc;
                }
                if let Err(e) = self.tokens.save(&session) {
                    tracing::warn!(error = %e, "failed to persist refreshed credentials");
                }

                tracing::info!(
                    subject_id = %session.subject_id,
                    device_class = %session.device_class,
                    expires_at = %refreshed.slc_expires_at,
                    "session refreshed"
                );
                shared.session = Some(session);
                shared.state = State::Idle;
                let _ = self.events.send(AgentEvent::Refreshed {
                    expires_at: refreshed.slc_expires_at,
                });
                Ok(refreshed.slc)
            }
            Err(e) => {
                let reason = if e.is_transient() {
                    ReauthReason::RetriesExhausted
                } else {
                    ReauthReason::Rejected {
                        code: e.code().unwrap_or("client_error").to_string(),
                    }
                };
                tracing::warn!(error = %e, reason = %reason, "refresh failed");
                self.fail(&mut shared, reason.clone());
                Err(ClientError::ReauthRequired(reason))
            }
        }
    }

    fn fail(&self, shared: &mut Shared, reason: ReauthReason) {
        shared.session = None;
        shared.state = State::Failed(reason.clone());
        shared.generation += 1;
        if let Err(e) = self.tokens.clear() {
            tracing::warn!(error = %e, "failed to clear stored credentials");
        }
        let _ = self.events.send(AgentEvent::ReauthRequired { reason });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use tandem_auth::{
        DeviceClass, DeviceFingerprint, LongLivedCredential, ManualClock, SubjectId,
    };

    use super::*;
    use crate::credentials::MemoryTokenStore;

    struct ScriptedTransport {
        clock: Arc<ManualClock>,
        calls: AtomicUsize,
        logouts: AtomicUsize,
        delay: StdDuration,
        script: Mutex<VecDeque<Result<Refreshed, ClientError>>>,
    }

    impl ScriptedTransport {
        fn new(clock: Arc<ManualClock>) -> Self {
            Self {
                clock,
                calls: AtomicUsize::new(0),
                logouts: AtomicUsize::new(0),
                delay: StdDuration::ZERO,
                script: Mutex::new(VecDeque::new()),
            }
        }

        fn with_delay(mut self, delay: StdDuration) -> Self {
            self.delay = delay;
            self
        }

        fn then(self, result: Result<Refreshed, ClientError>) -> Self {
            self.script.lock().unwrap().push_back(result);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionTransport for ScriptedTransport {
        async fn refresh(&self, _session: &StoredSession) -> Result<Refreshed, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(Refreshed {
                    slc: ShortLivedCredential::new(format!("slc-{n}")),
                    slc_expires_at: self.clock.now() + Duration::minutes(15),
                    llc: None,
                })
            })
        }

        async fn logout(&self, _session: &StoredSession) -> Result<(), ClientError> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn start() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        ))
    }

    fn session_expiring_in(clock: &ManualClock, left: Duration) -> StoredSession {
        StoredSession {
            server: "http://localhost:8080".into(),
            subject_id: SubjectId::from(42),
            device_class: DeviceClass::parse("web").unwrap(),
            device_fingerprint: DeviceFingerprint::parse("fp-a").unwrap(),
            slc: ShortLivedCredential::new("slc-0"),
            llc: LongLivedCredential::new("llc-0"),
            slc_expires_at: clock.now() + left,
        }
    }

    fn config() -> AgentConfig {
        AgentConfig {
            retry_delay: StdDuration::from_millis(10),
            attempt_timeout: StdDuration::from_millis(500),
            ..AgentConfig::default()
        }
    }

    fn agent(
        clock: &Arc<ManualClock>,
        transport: &Arc<ScriptedTransport>,
        tokens: &Arc<MemoryTokenStore>,
        left: Duration,
    ) -> SessionAgent {
        tokens.save(&session_expiring_in(clock, left)).unwrap();
        SessionAgent::with_clock(
            config(),
            transport.clone(),
            tokens.clone(),
            clock.clone(),
        )
        .unwrap()
    }

    fn unavailable() -> ClientError {
        ClientError::Unavailable {
            message: "store".into(),
        }
    }

    #[tokio::test]
    async fn test_fresh_credential_is_returned_without_refresh() {
        let clock = start();
        let transport = Arc::new(ScriptedTransport::new(clock.clone()));
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(14));

        let slc = agent.ensure_fresh().await.unwrap();
        assert_eq!(slc.as_str(), "slc-0");
        assert_eq!(transport.calls(), 0);
        assert!(!agent.is_expiring_soon());
    }

    #[tokio::test]
    async fn test_refresh_inside_threshold_persists_and_notifies() {
        let clock = start();
        let transport = Arc::new(ScriptedTransport::new(clock.clone()));
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(5));
        let mut events = agent.subscribe();

        assert!(agent.is_expiring_soon());
        let slc = agent.ensure_fresh().await.unwrap();
        assert_eq!(slc.as_str(), "slc-1");
        assert_eq!(agent.status(), AgentStatus::Idle);
        assert_eq!(tokens.load().unwrap().unwrap().slc.as_str(), "slc-1");
        assert_eq!(agent.time_left(), Some(Duration::minutes(15)));
        assert!(matches!(
            events.recv().await.unwrap(),
            AgentEvent::Refreshed { .. }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let clock = start();
        let transport = Arc::new(
            ScriptedTransport::new(clock.clone()).with_delay(StdDuration::from_millis(50)),
        );
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(5));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let agent = agent.clone();
            handles.push(tokio::spawn(async move { agent.ensure_fresh().await }));
        }

        for handle in handles {
            let slc = handle.await.unwrap().unwrap();
            assert_eq!(slc.as_str(), "slc-1");
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_credential_fails_without_refresh() {
        let clock = start();
        let transport = Arc::new(ScriptedTransport::new(clock.clone()));
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::ZERO);
        let mut events = agent.subscribe();

        let err = agent.ensure_fresh().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::ReauthRequired(ReauthReason::Expired)
        ));
        assert_eq!(transport.calls(), 0);
        assert_eq!(agent.status(), AgentStatus::Failed);
        assert!(tokens.load().unwrap().is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            AgentEvent::ReauthRequired {
                reason: ReauthReason::Expired
            }
        );

        // Refused until a new login
        assert!(agent.ensure_fresh().await.is_err());
        agent
            .install(session_expiring_in(&clock, Duration::minutes(15)))
            .unwrap();
        assert_eq!(agent.status(), AgentStatus::Idle);
        assert!(agent.ensure_fresh().await.is_ok());
    }

    #[tokio::test]
    async fn test_terminal_rejection_is_not_retried() {
        let clock = start();
        let transport = Arc::new(ScriptedTransport::new(clock.clone()).then(Err(
            ClientError::Rejected {
                code: "device_mismatch".into(),
                message: "device mismatch".into(),
            },
        )));
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(5));

        let err = agent.ensure_fresh().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::ReauthRequired(ReauthReason::Rejected { ref code }) if code == "device_mismatch"
        ));
        assert_eq!(transport.calls(), 1);
        assert_eq!(agent.status(), AgentStatus::Failed);
        assert!(agent.session().is_none());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let clock = start();
        let transport = Arc::new(
            ScriptedTransport::new(clock.clone())
                .then(Err(unavailable()))
                .then(Err(ClientError::Network("reset".into()))),
        );
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(5));

        let slc = agent.ensure_fresh().await.unwrap();
        assert_eq!(slc.as_str(), "slc-3");
        assert_eq!(transport.calls(), 3);
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let clock = start();
        let transport = Arc::new(
            ScriptedTransport::new(clock.clone())
                .then(Err(unavailable()))
                .then(Err(unavailable()))
                .then(Err(unavailable())),
        );
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(5));

        let err = agent.ensure_fresh().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::ReauthRequired(ReauthReason::RetriesExhausted)
        ));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let clock = start();
        let transport = Arc::new(
            ScriptedTransport::new(clock.clone()).with_delay(StdDuration::from_millis(200)),
        );
        let tokens = Arc::new(MemoryTokenStore::new());
        tokens
            .save(&session_expiring_in(&clock, Duration::minutes(5)))
            .unwrap();
        let agent = SessionAgent::with_clock(
            AgentConfig {
                max_retries: 0,
                attempt_timeout: StdDuration::from_millis(20),
                ..config()
            },
            transport.clone(),
            tokens.clone(),
            clock.clone(),
        )
        .unwrap();

        let err = agent.ensure_fresh().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::ReauthRequired(ReauthReason::RetriesExhausted)
        ));
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_stall_refresh() {
        let clock = start();
        let transport = Arc::new(
            ScriptedTransport::new(clock.clone()).with_delay(StdDuration::from_millis(50)),
        );
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(5));

        let abandoned = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.ensure_fresh().await })
        };
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        abandoned.abort();

        let slc = agent.ensure_fresh().await.unwrap();
        assert_eq!(slc.as_str(), "slc-1");
        assert_eq!(transport.calls(), 1);
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_force_refresh_ignores_threshold() {
        let clock = start();
        let transport = Arc::new(ScriptedTransport::new(clock.clone()));
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(14));

        let slc = agent.force_refresh().await.unwrap();
        assert_eq!(slc.as_str(), "slc-1");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_rotated_llc_is_kept() {
        let clock = start();
        let transport = Arc::new(ScriptedTransport::new(clock.clone()).then(Ok(Refreshed {
            slc: ShortLivedCredential::new("slc-r"),
            slc_expires_at: clock.now() + Duration::minutes(15),
            llc: Some(LongLivedCredential::new("llc-r")),
        })));
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(5));

        agent.ensure_fresh().await.unwrap();
        assert_eq!(agent.session().unwrap().llc.as_str(), "llc-r");
    }

    #[tokio::test]
    async fn test_logout_clears_local_state() {
        let clock = start();
        let transport = Arc::new(ScriptedTransport::new(clock.clone()));
        let tokens = Arc::new(MemoryTokenStore::new());
        let agent = agent(&clock, &transport, &tokens, Duration::minutes(14));

        agent.logout().await.unwrap();
        assert_eq!(transport.logouts.load(Ordering::SeqCst), 1);
        assert!(tokens.load().unwrap().is_none());
        assert!(matches!(
            agent.ensure_fresh().await,
            Err(ClientError::NotAuthenticated)
        ));

        // Second logout has nothing to send
        agent.logout().await.unwrap();
        assert_eq!(transport.logouts.load(Ordering::SeqCst), 1);
    }
}
