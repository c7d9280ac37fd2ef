//! "Who is signed in" when a federated provider session and a local JWT
//! session can both exist.
//!
//! Every sign-in path records a [`SignInEvent`]. The event log is the
//! authority; provider metadata and token `iat` are only consulted when no
//! event is known for a method (typically right after a restart).

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::user::{email_local_part, UserProfile};

const LOG_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Federated,
    Local,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Federated => write!(f, "federated"),
            AuthMethod::Local => write!(f, "local"),
        }
    }
}

/// One explicit sign-in action. Also the persisted last-used-method marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInEvent {
    pub method: AuthMethod,
    pub at: DateTime<Utc>,
}

/// Bounded log of recent sign-in events, ordered by time.
#[derive(Debug, Default)]
pub struct SignInLog {
    events: VecDeque<SignInEvent>,
}

impl SignInLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts in time order; providers may report a sign-in older than events
    /// already logged. The oldest event is dropped at capacity.
    pub fn push(&mut self, event: SignInEvent) {
        let position = self
            .events
            .iter()
            .rposition(|e| e.at <= event.at)
            .map_or(0, |i| i + 1);
        self.events.insert(position, event);
        if self.events.len() > LOG_CAPACITY {
            self.events.pop_front();
        }
    }

    pub fn latest(&self) -> Option<SignInEvent> {
        self.events.back().copied()
    }

    pub fn latest_for(&self, method: AuthMethod) -> Option<SignInEvent> {
        self.events.iter().rev().find(|e| e.method == method).copied()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Identity state owned by the external sign-in provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedSession {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub last_sign_in: Option<DateTime<Utc>>,
}

impl FederatedSession {
    pub fn profile(&self) -> UserProfile {
        let email = self.email.clone().unwrap_or_default();
        let name = self
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email_local_part(&email));
        UserProfile {
            name,
            email,
            avatar: None,
            is_new_user: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveIdentity {
    None,
    Federated { profile: UserProfile },
    /// The cached profile may be missing until the first profile fetch.
    Local { profile: Option<UserProfile> },
}

impl ActiveIdentity {
    pub fn method(&self) -> Option<AuthMethod> {
        match self {
            ActiveIdentity::None => None,
            ActiveIdentity::Federated { .. } => Some(AuthMethod::Federated),
            ActiveIdentity::Local { .. } => Some(AuthMethod::Local),
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            ActiveIdentity::None => None,
            ActiveIdentity::Federated { profile } => Some(profile),
            ActiveIdentity::Local { profile } => profile.as_ref(),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        !matches!(self, ActiveIdentity::None)
    }
}

/// Everything the resolution policy looks at, captured at one instant.
#[derive(Debug, Clone)]
pub struct IdentitySignals {
    pub now: DateTime<Utc>,
    pub freshness: Duration,
    pub latest_event: Option<SignInEvent>,
    pub last_local_event: Option<DateTime<Utc>>,
    pub last_federated_event: Option<DateTime<Utc>>,
    /// A non-expired local access token is stored.
    pub local_present: bool,
    pub local_issued_at: Option<DateTime<Utc>>,
    pub federated_present: bool,
    pub federated_last_sign_in: Option<DateTime<Utc>>,
}

impl IdentitySignals {
    fn present(&self, method: AuthMethod) -> bool {
        match method {
            AuthMethod::Federated => self.federated_present,
            AuthMethod::Local => self.local_present,
        }
    }
}

/// Picks the active method.
///
/// 1. A sign-in event younger than the freshness window wins outright, as long
///    as its credential is present. This masks provider clock skew right after
///    an explicit sign-in.
/// 2. With both credentials present, the more recent of the two sign-in times
///    wins. Each side's time is its latest logged event, else the token `iat`
///    or the provider's last-sign-in. If either side has no time, local wins.
/// 3. A single present credential wins; none gives `None`.
pub fn choose_method(signals: &IdentitySignals) -> Option<AuthMethod> {
    if let Some(event) = signals.latest_event {
        let age = signals.now.signed_duration_since(event.at);
        if age >= Duration::zero() && age < signals.freshness && signals.present(event.method) {
            return Some(event.method);
        }
    }

    match (signals.local_present, signals.federated_present) {
        (true, true) => {
            let local_at = signals.last_local_event.or(signals.local_issued_at);
            let federated_at = signals
                .last_federated_event
                .or(signals.federated_last_sign_in);
            match (local_at, federated_at) {
                (Some(local), Some(federated)) if federated > local => {
                    Some(AuthMethod::Federated)
                }
                _ => Some(AuthMethod::Local),
            }
        }
        (true, false) => Some(AuthMethod::Local),
        (false, true) => Some(AuthMethod::Federated),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn signals() -> IdentitySignals {
        IdentitySignals {
            now: at(100),
            freshness: Duration::milliseconds(800),
            latest_event: None,
            last_local_event: None,
            last_federated_event: None,
            local_present: false,
            local_issued_at: None,
            federated_present: false,
            federated_last_sign_in: None,
        }
    }

    #[test]
    fn test_nothing_present_is_none() {
        assert_eq!(choose_method(&signals()), None);
    }

    #[test]
    fn test_single_credential_wins() {
        let mut s = signals();
        s.local_present = true;
        assert_eq!(choose_method(&s), Some(AuthMethod::Local));

        let mut s = signals();
        s.federated_present = true;
        assert_eq!(choose_method(&s), Some(AuthMethod::Federated));
    }

    #[test]
    fn test_fresh_event_beats_skewed_provider_clock() {
        let mut s = signals();
        s.local_present = true;
        s.federated_present = true;
        s.last_local_event = Some(at(100));
        s.latest_event = Some(SignInEvent {
            method: AuthMethod::Local,
            at: at(100),
        });
        // Provider clock runs ahead and reports a later sign-in.
        s.federated_last_sign_in = Some(at(130));
        assert_eq!(choose_method(&s), Some(AuthMethod::Local));
    }

    #[test]
    fn test_fresh_event_without_credential_is_ignored() {
        let mut s = signals();
        s.local_present = true;
        s.latest_event = Some(SignInEvent {
            method: AuthMethod::Federated,
            at: at(100),
        });
        assert_eq!(choose_method(&s), Some(AuthMethod::Local));
    }

    #[test]
    fn test_logged_events_decide_when_both_present() {
        let mut s = signals();
        s.local_present = true;
        s.federated_present = true;
        s.last_local_event = Some(at(10));
        s.last_federated_event = Some(at(20));
        assert_eq!(choose_method(&s), Some(AuthMethod::Federated));

        s.last_local_event = Some(at(30));
        assert_eq!(choose_method(&s), Some(AuthMethod::Local));
    }

    #[test]
    fn test_falls_back_to_iat_and_provider_time() {
        let mut s = signals();
        s.local_present = true;
        s.federated_present = true;
        s.local_issued_at = Some(at(5));
        s.federated_last_sign_in = Some(at(50));
        assert_eq!(choose_method(&s), Some(AuthMethod::Federated));
    }

    #[test]
    fn test_uncomputable_comparison_defaults_to_local() {
        let mut s = signals();
        s.local_present = true;
        s.federated_present = true;
        s.federated_last_sign_in = Some(at(50));
        assert_eq!(choose_method(&s), Some(AuthMethod::Local));
    }

    #[test]
    fn test_log_is_bounded_and_tracks_latest_per_method() {
        let mut log = SignInLog::new();
        log.push(SignInEvent {
            method: AuthMethod::Federated,
            at: at(0),
        });
        for i in 1..=LOG_CAPACITY as i64 {
            log.push(SignInEvent {
                method: AuthMethod::Local,
                at: at(i),
            });
        }
        assert_eq!(log.len(), LOG_CAPACITY);
        assert_eq!(log.latest_for(AuthMethod::Federated), None);
        assert_eq!(log.latest().unwrap().at, at(LOG_CAPACITY as i64));
    }

    #[test]
    fn test_log_orders_late_arrivals_by_time() {
        let mut log = SignInLog::new();
        log.push(SignInEvent {
            method: AuthMethod::Local,
            at: at(50),
        });
        log.push(SignInEvent {
            method: AuthMethod::Federated,
            at: at(10),
        });
        assert_eq!(log.latest().unwrap().method, AuthMethod::Local);
        assert_eq!(log.latest_for(AuthMethod::Federated).unwrap().at, at(10));
    }

    #[test]
    fn test_federated_profile_falls_back_to_email() {
        let session = FederatedSession {
            uid: "g-1".into(),
            email: Some("ada@example.com".into()),
            display_name: None,
            email_verified: true,
            last_sign_in: None,
        };
        assert_eq!(session.profile().name, "ada");
    }
}
