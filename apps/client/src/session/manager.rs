//! SessionManager: the single path from feature code to the backend.
//!
//! RULE: feature clients never build HTTP requests themselves. Every call goes
//! through `SessionManager::request`, which owns credential attachment,
//! refresh, 401 handling and error normalization.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{Duration, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, Endpoints};
use crate::errors::ClientError;
use crate::models::user::UserProfile;
use crate::session::endpoints::{EndpointKind, EndpointPolicy};
use crate::session::identity::{
    choose_method, ActiveIdentity, AuthMethod, FederatedSession, IdentitySignals, SignInEvent,
    SignInLog,
};
use crate::session::response::{extract_error_message, parse_body};
use crate::session::token::{decode_claims, is_placeholder, is_token_expired_at};
use crate::storage::{keys, Change, SessionStore};

// ────────────────────────────────────────────────────────────────────────────
// Request / response types
// ────────────────────────────────────────────────────────────────────────────

/// Method, extra headers and JSON body for one backend call.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn post_empty() -> Self {
        Self {
            method: Method::POST,
            ..Self::default()
        }
    }

    pub fn put(body: Value) -> Self {
        Self {
            method: Method::PUT,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends a URL-encoded query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// Access/refresh pair as issued by login, registration, federated exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Reads tokens from the top level of a body or from a nested `data` object.
    pub fn from_body(body: &Value) -> Option<Self> {
        let source = match body.get("data") {
            Some(data) if data.get("access_token").is_some() => data,
            _ => body,
        };
        let access_token = source
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())?
            .to_string();
        let refresh_token = source
            .get("refresh_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Some(Self {
            access_token,
            refresh_token,
        })
    }
}

struct Reply {
    status: u16,
    body: Value,
}

// ────────────────────────────────────────────────────────────────────────────
// SessionManager
// ────────────────────────────────────────────────────────────────────────────

/// Owns token storage, expiry checks, refresh and the per-request
/// credential decision. Share it as `Arc<SessionManager>`.
pub struct SessionManager {
    http: Client,
    base_url: String,
    endpoints: Endpoints,
    policy: EndpointPolicy,
    store: Arc<dyn SessionStore>,
    freshness: Duration,
    /// Bumped on every clear and every new sign-in. A refresh that started
    /// under an older generation must not act on its result.
    generation: AtomicU64,
    /// Serializes token writes against clears.
    write_lock: tokio::sync::Mutex<()>,
    /// Held for the whole of a refresh so only one is in flight.
    refresh_lock: tokio::sync::Mutex<()>,
    sign_ins: Mutex<SignInLog>,
    federated: RwLock<Option<FederatedSession>>,
}

impl SessionManager {
    pub fn new(config: &Config, store: Arc<dyn SessionStore>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        let freshness = Duration::from_std(config.identity_freshness)
            .map_err(|e| ClientError::Config(format!("identity freshness out of range: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            endpoints: config.endpoints.clone(),
            policy: EndpointPolicy::from_endpoints(&config.endpoints),
            store,
            freshness,
            generation: AtomicU64::new(0),
            write_lock: tokio::sync::Mutex::new(()),
            refresh_lock: tokio::sync::Mutex::new(()),
            sign_ins: Mutex::new(SignInLog::new()),
            federated: RwLock::new(None),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    // ── token storage ─────────────────────────────────────────────────────

    /// Stored access token, falling back to the legacy key. Placeholder tokens read as absent.
    pub async fn access_token(&self) -> Result<Option<String>, ClientError> {
        let token = match self.store.get(keys::ACCESS_TOKEN).await? {
            Some(token) => Some(token),
            None => self.store.get(keys::LEGACY_TOKEN).await?,
        };
        Ok(token.filter(|t| !t.is_empty() && !is_placeholder(t)))
    }

    pub async fn refresh_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self
            .store
            .get(keys::REFRESH_TOKEN)
            .await?
            .filter(|t| !t.is_empty() && !is_placeholder(t)))
    }

    /// Replaces the stored pair in one store write. Without a refresh token the
    /// previous one is removed, so a pair is never mixed across logins.
    ///
    /// Counts as a session change: a refresh started before this write
    /// discards its outcome.
    pub async fn store_tokens(&self, pair: &TokenPair) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().await;
        self.bump_generation();
        self.write_pair(pair).await
    }

    async fn write_pair(&self, pair: &TokenPair) -> Result<(), ClientError> {
        let mut changes = vec![
            Change::Set(keys::ACCESS_TOKEN, &pair.access_token),
            Change::Remove(keys::LEGACY_TOKEN),
        ];
        changes.push(match &pair.refresh_token {
            Some(refresh) => Change::Set(keys::REFRESH_TOKEN, refresh),
            None => Change::Remove(keys::REFRESH_TOKEN),
        });
        self.store.batch(&changes).await?;
        debug!("Stored new token pair (refresh: {})", pair.refresh_token.is_some());
        Ok(())
    }

    pub async fn cached_profile(&self) -> Result<Option<UserProfile>, ClientError> {
        let Some(raw) = self.store.get(keys::USER_PROFILE).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Ok(UserProfile::from_backend(&value)),
            Err(e) => {
                warn!("Ignoring unreadable cached profile: {e}");
                Ok(None)
            }
        }
    }

    pub async fn cache_profile(&self, profile: &UserProfile) -> Result<(), ClientError> {
        let raw = serde_json::to_string(profile)?;
        self.store.set(keys::USER_PROFILE, &raw).await
    }

    /// True when an access token is stored, expired or not.
    pub async fn is_authenticated(&self) -> Result<bool, ClientError> {
        Ok(self.access_token().await?.is_some())
    }

    /// Removes every session key in one store operation. Idempotent.
    pub async fn clear_session(&self) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().await;
        let generation = self.bump_generation();
        self.store.remove_all(&keys::SESSION_KEYS).await?;
        info!("Session cleared (generation {generation})");
        Ok(())
    }

    async fn clear_if_unchanged(&self, generation: u64) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().await;
        if self.generation() != generation {
            return Ok(());
        }
        let generation = self.bump_generation();
        self.store.remove_all(&keys::SESSION_KEYS).await?;
        info!("Session cleared (generation {generation})");
        Ok(())
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Local half of a logout: clears storage, forgets sign-in history and the
    /// federated session.
    pub async fn end_session(&self) -> Result<(), ClientError> {
        self.clear_session().await?;
        self.lock_sign_ins().clear();
        *self
            .federated
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }

    // ── tokens on the wire ────────────────────────────────────────────────

    /// A non-expired access token, refreshing once if the stored one expired.
    /// `Ok(None)` means "send without credentials". Advisory for one request only.
    ///
    /// Concurrent callers share one refresh: whoever waits on the refresh lock
    /// re-reads storage first and uses the token the winner stored.
    pub async fn get_valid_access_token(&self) -> Result<Option<String>, ClientError> {
        if let Some(token) = self.fresh_access_token().await? {
            return Ok(Some(token));
        }
        if self.access_token().await?.is_none() {
            return Ok(None);
        }

        let _flight = self.refresh_lock.lock().await;
        let Some(token) = self.access_token().await? else {
            return Ok(None);
        };
        if !is_token_expired_at(&token, Utc::now()) {
            debug!("Access token was refreshed by a concurrent request");
            return Ok(Some(token));
        }

        debug!("Access token expired, attempting refresh");
        match self.refresh_in_flight().await {
            Ok(token) if !is_token_expired_at(&token, Utc::now()) => Ok(Some(token)),
            Ok(_) => {
                warn!("Refresh returned a token that is already expired");
                Ok(None)
            }
            Err(ClientError::Storage(e)) => Err(ClientError::Storage(e)),
            Err(e) => {
                // A sign-in that landed during the refresh wins over its outcome.
                if let Some(token) = self.fresh_access_token().await? {
                    return Ok(Some(token));
                }
                warn!("Refresh failed: {e}");
                Ok(None)
            }
        }
    }

    async fn fresh_access_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self
            .access_token()
            .await?
            .filter(|t| !is_token_expired_at(t, Utc::now())))
    }

    /// Mints a new access token from the stored refresh token.
    /// Every failure clears the session before it is returned, unless the
    /// session changed (clear or new sign-in) while the call was out.
    pub async fn refresh_access_token(&self) -> Result<String, ClientError> {
        let _flight = self.refresh_lock.lock().await;
        self.refresh_in_flight().await
    }

    /// Refresh body. Callers hold `refresh_lock`.
    async fn refresh_in_flight(&self) -> Result<String, ClientError> {
        let generation = self.generation();
        let refresh = self.refresh_token().await?;
        let Some(refresh) = refresh.filter(|t| refresh_token_usable(t)) else {
            self.clear_if_unchanged(generation).await?;
            return Err(ClientError::RefreshFailed(
                "no usable refresh token".to_string(),
            ));
        };

        let refresh_path = self.endpoints.refresh.clone();
        let outcome = self
            .send(&refresh_path, &RequestOptions::post_empty(), Some(&refresh))
            .await
            .and_then(|reply| {
                if (200..300).contains(&reply.status) {
                    TokenPair::from_body(&reply.body).ok_or_else(|| {
                        ClientError::Decode("refresh response has no access_token".to_string())
                    })
                } else {
                    Err(ClientError::Backend {
                        message: extract_error_message(&reply.body, reply.status),
                        status: reply.status,
                    })
                }
            });

        let _guard = self.write_lock.lock().await;
        if self.generation() != generation {
            warn!("Session changed while a refresh was in flight; discarding result");
            return Err(ClientError::RefreshFailed(
                "session changed during refresh".to_string(),
            ));
        }

        match outcome {
            Ok(mut pair) => {
                // A backend that does not rotate keeps the current refresh token.
                if pair.refresh_token.is_none() {
                    pair.refresh_token = Some(refresh);
                }
                self.write_pair(&pair).await?;
                info!("Access token refreshed");
                Ok(pair.access_token)
            }
            Err(e) => {
                let generation = self.bump_generation();
                self.store.remove_all(&keys::SESSION_KEYS).await?;
                info!("Session cleared after failed refresh (generation {generation})");
                Err(ClientError::RefreshFailed(e.to_string()))
            }
        }
    }

    /// Issues one backend call.
    ///
    /// Protected endpoints get a bearer token when one can be obtained; when
    /// none can, the call still goes out and the backend's 401 decides.
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let kind = self.policy.classify(endpoint);
        let bearer = match kind {
            EndpointKind::Public => None,
            EndpointKind::Protected => self.get_valid_access_token().await?,
        };
        if kind == EndpointKind::Protected && bearer.is_none() {
            debug!("No usable access token for {endpoint}; sending without credentials");
        }

        let reply = self.send(endpoint, &options, bearer.as_deref()).await?;

        if reply.status == 401 {
            self.clear_session().await?;
            return Err(match (kind, bearer.is_some()) {
                (EndpointKind::Public, _) => ClientError::InvalidCredentials,
                (EndpointKind::Protected, true) => ClientError::AuthExpired,
                (EndpointKind::Protected, false) => ClientError::AuthenticationRequired,
            });
        }

        if !(200..300).contains(&reply.status) {
            let message = extract_error_message(&reply.body, reply.status);
            warn!(
                "{} {} failed with {}: {}",
                options.method, endpoint, reply.status, message
            );
            return Err(ClientError::Backend {
                message,
                status: reply.status,
            });
        }

        Ok(reply.body)
    }

    async fn send(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        bearer: Option<&str>,
    ) -> Result<Reply, ClientError> {
        let url = build_url(&self.base_url, endpoint);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::Validation(format!("invalid header name '{name}'")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ClientError::Validation(format!("invalid value for header '{name}'")))?;
            headers.insert(name, value);
        }
        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::Validation("token is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = self
            .http
            .request(options.method.clone(), &url)
            .headers(headers);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        debug!("{} {}", options.method, url);
        let response = builder.send().await.map_err(|e| {
            warn!("{} {} did not complete: {e}", options.method, url);
            ClientError::from(e)
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;

        Ok(Reply {
            status,
            body: parse_body(content_type.as_deref(), &text),
        })
    }

    // ── identity ──────────────────────────────────────────────────────────

    fn lock_sign_ins(&self) -> MutexGuard<'_, SignInLog> {
        self.sign_ins
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn federated_session(&self) -> Option<FederatedSession> {
        self.federated
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Records an explicit sign-in happening now. Every sign-in path calls this.
    pub async fn record_sign_in(&self, method: AuthMethod) -> Result<(), ClientError> {
        self.record_event(SignInEvent {
            method,
            at: Utc::now(),
        })
        .await
    }

    async fn record_event(&self, event: SignInEvent) -> Result<(), ClientError> {
        let is_latest = {
            let mut log = self.lock_sign_ins();
            log.push(event);
            log.latest() == Some(event)
        };
        if is_latest {
            let marker = serde_json::to_string(&event)?;
            self.store.set(keys::AUTH_METHOD, &marker).await?;
        }
        debug!("Recorded {} sign-in at {}", event.method, event.at);
        Ok(())
    }

    /// Entry point for the identity provider's state-change callback.
    ///
    /// A newly seen session, or a known one reporting a later sign-in, is logged
    /// as a federated sign-in at the provider's reported time, so a restored
    /// session does not look fresh.
    pub async fn observe_federated(
        &self,
        session: Option<FederatedSession>,
    ) -> Result<(), ClientError> {
        let newly_seen = {
            let mut current = self
                .federated
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let newly_seen = match (&*current, &session) {
                (_, None) => None,
                (Some(prev), Some(next))
                    if prev.uid == next.uid && next.last_sign_in <= prev.last_sign_in =>
                {
                    None
                }
                (_, Some(next)) => Some(next.last_sign_in.unwrap_or_else(Utc::now)),
            };
            *current = session;
            newly_seen
        };

        match newly_seen {
            Some(at) => {
                info!("Federated session observed");
                self.record_event(SignInEvent {
                    method: AuthMethod::Federated,
                    at,
                })
                .await
            }
            None => Ok(()),
        }
    }

    /// Last-used-method marker from storage. An unreadable marker reads as absent.
    async fn persisted_marker(&self) -> Result<Option<SignInEvent>, ClientError> {
        let Some(raw) = self.store.get(keys::AUTH_METHOD).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(event) => Ok(Some(event)),
            Err(e) => {
                warn!("Ignoring unreadable sign-in marker: {e}");
                Ok(None)
            }
        }
    }

    /// Decides who is signed in. See [`choose_method`] for the policy.
    ///
    /// A stored access token that is expired and cannot be refreshed is purged.
    pub async fn resolve_active_identity(&self) -> Result<ActiveIdentity, ClientError> {
        let now = Utc::now();
        let access = self.access_token().await?;
        let refresh_ok = self
            .refresh_token()
            .await?
            .is_some_and(|t| refresh_token_usable(&t));
        let access_fresh = access
            .as_deref()
            .is_some_and(|t| !is_token_expired_at(t, now));
        let local_present = access.is_some() && (access_fresh || refresh_ok);

        let federated = self.federated_session();

        let (mut latest_event, mut last_local_event, mut last_federated_event) = {
            let log = self.lock_sign_ins();
            (
                log.latest(),
                log.latest_for(AuthMethod::Local).map(|e| e.at),
                log.latest_for(AuthMethod::Federated).map(|e| e.at),
            )
        };
        if latest_event.is_none() {
            if let Some(marker) = self.persisted_marker().await? {
                latest_event = Some(marker);
                match marker.method {
                    AuthMethod::Local => last_local_event = Some(marker.at),
                    AuthMethod::Federated => last_federated_event = Some(marker.at),
                }
            }
        }

        let signals = IdentitySignals {
            now,
            freshness: self.freshness,
            latest_event,
            last_local_event,
            last_federated_event,
            local_present,
            local_issued_at: access
                .as_deref()
                .and_then(decode_claims)
                .and_then(|c| c.issued_at()),
            federated_present: federated.is_some(),
            federated_last_sign_in: federated.as_ref().and_then(|f| f.last_sign_in),
        };

        let identity = match (choose_method(&signals), federated) {
            (Some(AuthMethod::Federated), Some(session)) => ActiveIdentity::Federated {
                profile: session.profile(),
            },
            (Some(AuthMethod::Local), _) => ActiveIdentity::Local {
                profile: self.cached_profile().await?,
            },
            _ => {
                if access.is_some() && !local_present {
                    info!("Purging stale local session");
                    self.clear_session().await?;
                }
                ActiveIdentity::None
            }
        };

        debug!("Active identity: {:?}", identity.method());
        Ok(identity)
    }
}

/// A refresh token is usable unless it is a placeholder or a readable JWT
/// whose `exp` has passed. Opaque tokens are the backend's to judge.
fn refresh_token_usable(token: &str) -> bool {
    if is_placeholder(token) {
        return false;
    }
    match decode_claims(token).and_then(|c| c.exp) {
        Some(exp) => Utc::now().timestamp() < exp,
        None => true,
    }
}

fn build_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = endpoint.trim();
    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}
