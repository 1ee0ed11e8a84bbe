//! Single-flight MediaServer session.
//!
//! The session holds at most one token. A login runs on its own task and
//! every caller that arrives while it is in flight awaits the same shared
//! handle. The task commits its outcome into the state when it completes, so
//! dropping any waiter, including the one that started it, never stalls the
//! login for later callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{Clock, HttpClient, HttpMethod, HttpRequest, SystemClock};
use core_runtime::config::MediaServerConfig;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AuthError, Result};
use crate::types::{AuthSession, LoginRequest, LoginResponse};

/// Header carrying client identity and, once logged in, the token.
pub const AUTHORIZATION_HEADER: &str = "X-Emby-Authorization";

const LOGIN_PATH: &str = "/Users/AuthenticateByName";

type SharedLogin = Shared<BoxFuture<'static, Result<AuthSession>>>;

enum SessionState {
    Empty,
    Ready(AuthSession),
    LoggingIn { generation: u64, login: SharedLogin },
}

/// Process-wide MediaServer token manager.
pub struct MediaServerSession {
    config: MediaServerConfig,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    device_id: String,
    state: Arc<Mutex<SessionState>>,
    generation: AtomicU64,
}

impl MediaServerSession {
    pub fn new(config: MediaServerConfig, http: Arc<dyn HttpClient>) -> Self {
        Self::with_clock(config, http, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: MediaServerConfig,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            http,
            clock,
            device_id: Uuid::new_v4().to_string(),
            state: Arc::new(Mutex::new(SessionState::Empty)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MediaServerConfig {
        &self.config
    }

    /// Base URL without trailing slash, if configured.
    pub fn base_url(&self) -> Option<&str> {
        self.config.base_url()
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured() && self.config.has_credentials()
    }

    /// Stable per-process device identifier sent with every request.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns a valid token, logging in if none is cached.
    ///
    /// At most one login is in flight at any time. Failures are not cached:
    /// the next call starts a fresh attempt.
    pub async fn get_token(&self) -> Result<String> {
        Ok(self.session().await?.token)
    }

    /// Like [`get_token`](Self::get_token) but returns the whole session.
    pub async fn session(&self) -> Result<AuthSession> {
        let login = {
            let mut state = self.state.lock().await;
            match &*state {
                SessionState::Ready(session) if !session.is_expired(self.clock.now()) => {
                    return Ok(session.clone());
                }
                SessionState::LoggingIn { login, .. } => {
                    debug!("Joining in-flight MediaServer login");
                    login.clone()
                }
                _ => {
                    let request = self.login_request()?;
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let login = self.start_login(generation, request);
                    *state = SessionState::LoggingIn {
                        generation,
                        login: login.clone(),
                    };
                    login
                }
            }
        };

        login.await
    }

    /// Token currently cached, without triggering a login.
    pub async fn current_token(&self) -> Option<String> {
        match &*self.state.lock().await {
            SessionState::Ready(session) if !session.is_expired(self.clock.now()) => {
                Some(session.token.clone())
            }
            _ => None,
        }
    }

    /// Drops the cached token if it is still `stale_token`.
    ///
    /// A token refreshed by a concurrent caller is left in place, as is a
    /// login already in flight.
    pub async fn invalidate(&self, stale_token: &str) {
        let mut state = self.state.lock().await;
        if let SessionState::Ready(session) = &*state {
            if session.token == stale_token {
                info!("Invalidating rejected MediaServer token");
                *state = SessionState::Empty;
            }
        }
    }

    /// Builds the `X-Emby-Authorization` value, with the token when given.
    pub fn authorization_header(&self, token: Option<&str>) -> String {
        let mut header = format!(
            "MediaBrowser Client=\"{}\", Device=\"{}\", DeviceId=\"{}\", Version=\"{}\"",
            self.config.client_name,
            self.config.device_name,
            self.device_id,
            self.config.client_version
        );
        if let Some(token) = token {
            header.push_str(&format!(", Token=\"{}\"", token));
        }
        header
    }

    fn login_request(&self) -> Result<HttpRequest> {
        let base_url = self.config.base_url().ok_or_else(|| {
            AuthError::NotConfigured("MEDIASERVER_URL is not set".to_string())
        })?;
        let (Some(username), Some(password)) = (
            self.config.username.as_deref().filter(|u| !u.is_empty()),
            self.config.password.as_deref(),
        ) else {
            return Err(AuthError::NotConfigured(
                "MediaServer credentials are not set".to_string(),
            ));
        };

        let body = LoginRequest {
            username,
            pw: password,
        };

        HttpRequest::new(HttpMethod::Post, format!("{}{}", base_url, LOGIN_PATH))
            .header(AUTHORIZATION_HEADER, self.authorization_header(None))
            .header("Accept", "application/json")
            .timeout(self.config.login_timeout)
            .json(&body)
            .map_err(|e| AuthError::LoginFailed {
                status: None,
                reason: e.to_string(),
            })
    }

    fn start_login(&self, generation: u64, request: HttpRequest) -> SharedLogin {
        let http = Arc::clone(&self.http);
        let clock = Arc::clone(&self.clock);
        let state = Arc::clone(&self.state);
        let token_ttl = self.config.token_ttl;
        let login_timeout = self.config.login_timeout;

        // Spawned so the exchange finishes even when every waiter is dropped.
        let task = tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                let outcome = match timeout(login_timeout, login(http.as_ref(), request)).await {
                    Ok(result) => result,
                    Err(_) => Err(AuthError::Timeout(login_timeout)),
                }
                .map(|response| {
                    let issued_at = clock.now();
                    AuthSession {
                        token: response.access_token,
                        user_id: response.user.map(|user| user.id),
                        issued_at,
                        expires_at: token_ttl.map(|ttl| issued_at + ttl_to_chrono(ttl)),
                    }
                });

                commit(&state, generation, outcome.as_ref().ok().cloned()).await;
                outcome
            }
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "MediaServer login task did not complete");
                    commit(&state, generation, None).await;
                    Err(AuthError::LoginFailed {
                        status: None,
                        reason: format!("login task did not complete: {}", e),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Stores a login outcome unless a newer login has replaced `generation`.
async fn commit(state: &Mutex<SessionState>, generation: u64, session: Option<AuthSession>) {
    let mut guard = state.lock().await;
    let current = matches!(
        &*guard,
        SessionState::LoggingIn { generation: g, .. } if *g == generation
    );
    if current {
        *guard = match session {
            Some(session) => SessionState::Ready(session),
            None => SessionState::Empty,
        };
    }
}

#[instrument(skip_all, fields(url = %request.url))]
async fn login(http: &dyn HttpClient, request: HttpRequest) -> Result<LoginResponse> {
    debug!("Logging in to MediaServer");

    let response = http.execute(request).await.map_err(|e| {
        warn!(error = %e, "MediaServer login request failed");
        AuthError::from(e)
    })?;

    if !response.is_success() {
        warn!(status = response.status, "MediaServer rejected login");
        return Err(AuthError::LoginFailed {
            status: Some(response.status),
            reason: format!("server responded with status {}", response.status),
        });
    }

    let parsed: LoginResponse = response.json().map_err(|e| AuthError::LoginFailed {
        status: Some(response.status),
        reason: e.to_string(),
    })?;

    if parsed.access_token.is_empty() {
        return Err(AuthError::LoginFailed {
            status: Some(response.status),
            reason: "empty access token".to_string(),
        });
    }

    info!("MediaServer login succeeded");
    Ok(parsed)
}

fn ttl_to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpResponse};
    use bytes::Bytes;
    use chrono::{DateTime, Utc};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    /// Replays scripted login outcomes and counts calls.
    struct ScriptedHttp {
        calls: AtomicUsize,
        delay: Duration,
        script: StdMutex<VecDeque<std::result::Result<HttpResponse, BridgeError>>>,
        fallback_token: String,
    }

    impl ScriptedHttp {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                script: StdMutex::new(VecDeque::new()),
                fallback_token: "token-default".to_string(),
            }
        }

        fn then(self, outcome: std::result::Result<HttpResponse, BridgeError>) -> Self {
            self.script.lock().unwrap().push_back(outcome);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn ok_login(token: &str) -> std::result::Result<HttpResponse, BridgeError> {
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(format!(
                r#"{{"AccessToken":"{}","User":{{"Id":"user-1"}}}}"#,
                token
            )),
        })
    }

    fn status(code: u16) -> std::result::Result<HttpResponse, BridgeError> {
        Ok(HttpResponse {
            status: code,
            headers: HashMap::new(),
            body: Bytes::new(),
        })
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn execute(
            &self,
            request: HttpRequest,
        ) -> bridge_traits::error::Result<HttpResponse> {
            assert!(request.url.ends_with(LOGIN_PATH));
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| ok_login(&self.fallback_token))
        }
    }

    struct FixedClock(StdMutex<DateTime<Utc>>);

    impl FixedClock {
        fn advance(&self, by: chrono::Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn config() -> MediaServerConfig {
        MediaServerConfig::new("http://media.local/").with_credentials("dj", "secret")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_login() {
        let http = Arc::new(ScriptedHttp::new(Duration::from_millis(100)).then(ok_login("abc")));
        let session = Arc::new(MediaServerSession::new(config(), http.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let session = Arc::clone(&session);
            handles.push(tokio::spawn(async move { session.get_token().await }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "abc");
        }
        assert_eq!(http.calls(), 1);

        assert_eq!(session.get_token().await.unwrap(), "abc");
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_failure() {
        let http = Arc::new(ScriptedHttp::new(Duration::from_millis(100)).then(status(401)));
        let session = Arc::new(MediaServerSession::new(config(), http.clone()));

        let a = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.get_token().await }
        });
        let b = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.get_token().await }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(matches!(a, Err(AuthError::LoginFailed { status: Some(401), .. })));
        assert_eq!(a, b);
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let http = Arc::new(
            ScriptedHttp::new(Duration::ZERO)
                .then(status(500))
                .then(ok_login("second")),
        );
        let session = MediaServerSession::new(config(), http.clone());

        assert!(session.get_token().await.is_err());
        assert_eq!(session.current_token().await, None);
        assert_eq!(session.get_token().await.unwrap(), "second");
        assert_eq!(http.calls(), 2);
    }

    #[tokio::test]
    async fn test_not_configured_makes_no_request() {
        let http = Arc::new(ScriptedHttp::new(Duration::ZERO));

        let no_url = MediaServerSession::new(MediaServerConfig::default(), http.clone());
        assert!(matches!(
            no_url.get_token().await,
            Err(AuthError::NotConfigured(_))
        ));

        let no_credentials =
            MediaServerSession::new(MediaServerConfig::new("http://media.local"), http.clone());
        assert!(!no_credentials.is_configured());
        assert!(matches!(
            no_credentials.get_token().await,
            Err(AuthError::NotConfigured(_))
        ));

        assert_eq!(http.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_only_clears_matching_token() {
        let http = Arc::new(
            ScriptedHttp::new(Duration::ZERO)
                .then(ok_login("first"))
                .then(ok_login("second")),
        );
        let session = MediaServerSession::new(config(), http.clone());

        let first = session.get_token().await.unwrap();
        session.invalidate(&first).await;
        let second = session.get_token().await.unwrap();
        assert_eq!(second, "second");

        // A late invalidation carrying the old token leaves the new one alone
        session.invalidate(&first).await;
        assert_eq!(session.current_token().await.as_deref(), Some("second"));
        assert_eq!(http.calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_login() {
        let clock = Arc::new(FixedClock(StdMutex::new(Utc::now())));
        let http = Arc::new(
            ScriptedHttp::new(Duration::ZERO)
                .then(ok_login("first"))
                .then(ok_login("second")),
        );
        let session = MediaServerSession::with_clock(
            config().with_token_ttl(Duration::from_secs(3600)),
            http.clone(),
            clock.clone(),
        );

        assert_eq!(session.get_token().await.unwrap(), "first");
        clock.advance(chrono::Duration::minutes(30));
        assert_eq!(session.get_token().await.unwrap(), "first");
        clock.advance(chrono::Duration::minutes(31));
        assert_eq!(session.get_token().await.unwrap(), "second");
        assert_eq!(http.calls(), 2);
    }

    #[tokio::test]
    async fn test_login_timeout() {
        let http = Arc::new(ScriptedHttp::new(Duration::from_secs(5)));
        let session = MediaServerSession::new(
            config().with_login_timeout(Duration::from_millis(50)),
            http,
        );

        assert_eq!(
            session.get_token().await,
            Err(AuthError::Timeout(Duration::from_millis(50)))
        );
    }

    #[tokio::test]
    async fn test_transport_error_maps_to_network() {
        let http = Arc::new(
            ScriptedHttp::new(Duration::ZERO)
                .then(Err(BridgeError::OperationFailed("connection refused".into()))),
        );
        let session = MediaServerSession::new(config(), http);

        assert!(matches!(
            session.get_token().await,
            Err(AuthError::Network(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_waiter_does_not_cancel_login() {
        let http = Arc::new(ScriptedHttp::new(Duration::from_millis(100)).then(ok_login("abc")));
        let session = Arc::new(MediaServerSession::new(config(), http.clone()));

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.get_token().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        first.abort();

        assert_eq!(session.get_token().await.unwrap(), "abc");
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_login_completes_after_only_waiter_is_dropped() {
        let http = Arc::new(ScriptedHttp::new(Duration::from_millis(100)).then(ok_login("abc")));
        let session = Arc::new(MediaServerSession::new(
            config().with_login_timeout(Duration::from_millis(500)),
            http.clone(),
        ));

        let only = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.get_token().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        only.abort();

        // Nobody is awaiting the login; wait past its deadline.
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(session.current_token().await.as_deref(), Some("abc"));
        assert_eq!(session.get_token().await, Ok("abc".to_string()));
        assert_eq!(http.calls(), 1);
    }

    #[test]
    fn test_authorization_header_format() {
        let http = Arc::new(ScriptedHttp::new(Duration::ZERO));
        let session = MediaServerSession::new(config(), http);

        let anonymous = session.authorization_header(None);
        assert!(anonymous.starts_with("MediaBrowser Client=\"Mixdeck\""));
        assert!(anonymous.contains(&format!("DeviceId=\"{}\"", session.device_id())));
        assert!(!anonymous.contains("Token="));

        let authorized = session.authorization_header(Some("abc"));
        assert!(authorized.ends_with(", Token=\"abc\""));
    }
}
