use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// OAuth token pair as persisted in the credential record.
///
/// Field names follow the camelCase layout of existing token files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    /// Lifetime in seconds, counted from `obtainment_timestamp`
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Unix epoch milliseconds
    #[serde(default)]
    pub obtainment_timestamp: i64,
}

impl AccessToken {
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_in.map(|secs| {
            let lifetime_ms = i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000);
            self.obtainment_timestamp.saturating_add(lifetime_ms)
        })
    }
}

/// Access credential: either a bare bearer string or a structured, refreshable token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Credential {
    Bearer(String),
    Structured(AccessToken),
}

impl Credential {
    pub fn access_token(&self) -> &str {
        match self {
            Credential::Bearer(token) => token,
            Credential::Structured(token) => &token.access_token,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Credential::Bearer(_) => None,
            Credential::Structured(token) => token.refresh_token.as_deref(),
        }
    }

    /// Expiry instant in epoch milliseconds. Bearer strings carry none.
    pub fn expires_at(&self) -> Option<i64> {
        match self {
            Credential::Bearer(_) => None,
            Credential::Structured(token) => token.expires_at(),
        }
    }

    /// A structured token is valid only while its expiry lies strictly in the
    /// future; a missing expiry counts as expired. Bearer strings never expire
    /// from our point of view.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self {
            Credential::Bearer(_) => false,
            Credential::Structured(token) => match token.expires_at() {
                Some(expires_at) => expires_at <= now_ms,
                None => true,
            },
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// True when a known expiry falls within `window` from now (or already passed).
    pub fn expires_within(&self, window: Duration) -> bool {
        match self.expires_at() {
            Some(expires_at) => expires_at.saturating_sub(now_millis()) <= window.as_millis() as i64,
            None => false,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.access_token().trim().is_empty()
    }

    /// Short form safe for logs and terminal output.
    pub fn masked(&self) -> String {
        let token = self.access_token();
        let visible: String = token.chars().take(4).collect();
        if token.chars().count() <= 4 {
            "****".to_string()
        } else {
            format!("{}****", visible)
        }
    }
}

impl From<AccessToken> for Credential {
    fn from(token: AccessToken) -> Self {
        Credential::Structured(token)
    }
}

/// Persisted credential document for one integration identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default)]
    pub current: Option<Credential>,
    #[serde(default)]
    pub previous: Vec<Credential>,
}

impl CredentialRecord {
    /// Makes `next` the current credential. The superseded one moves to the
    /// head of `previous`, which is truncated to `history_limit` when set.
    pub fn rotate(&mut self, next: Credential, history_limit: Option<usize>) {
        if let Some(old) = self.current.take() {
            self.previous.insert(0, old);
        }
        if let Some(limit) = history_limit {
            self.previous.truncate(limit);
        }
        self.current = Some(next);
    }
}

/// Result of [`crate::ports::CredentialStore::credential_file_exists`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialFileProbe {
    pub exists: bool,
    pub location: PathBuf,
}

/// What `set_credential` did with the offered credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialUpdate {
    /// Stored in memory and written to the record
    Persisted,
    /// Stored in memory only, as requested
    InMemory,
    /// Stored in memory; writing the record failed
    PersistFailed,
    /// Expired or without expiry; nothing changed
    Rejected,
}

impl CredentialUpdate {
    pub fn is_accepted(self) -> bool {
        !matches!(self, CredentialUpdate::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Bot,
    Listener,
}

impl ServiceName {
    pub const ALL: [ServiceName; 2] = [ServiceName::Bot, ServiceName::Listener];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceName::Bot => "bot",
            ServiceName::Listener => "listener",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ServiceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bot" => Ok(ServiceName::Bot),
            "listener" => Ok(ServiceName::Listener),
            other => Err(format!("unknown service '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    #[default]
    Stopped,
    StoppedNoCredential,
    StoppedInvalidCredential,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: RunStatus,
    pub reason: Option<String>,
}

impl ServiceStatus {
    pub fn new(status: RunStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

/// Point-in-time view of every service's run state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub bot: ServiceStatus,
    pub listener: ServiceStatus,
}

impl StatusSnapshot {
    pub fn get(&self, service: ServiceName) -> &ServiceStatus {
        match service {
            ServiceName::Bot => &self.bot,
            ServiceName::Listener => &self.listener,
        }
    }

    pub(crate) fn set(&mut self, service: ServiceName, status: ServiceStatus) {
        match service {
            ServiceName::Bot => self.bot = status,
            ServiceName::Listener => self.listener = status,
        }
    }

    pub fn all_running(&self) -> bool {
        ServiceName::ALL.iter().all(|s| self.get(*s).is_running())
    }
}

/// In-process request to start or stop one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Start(ServiceName),
    Stop(ServiceName),
}

impl Intent {
    pub fn service(self) -> ServiceName {
        match self {
            Intent::Start(service) | Intent::Stop(service) => service,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Start(service) => write!(f, "{}:start", service),
            Intent::Stop(service) => write!(f, "{}:stop", service),
        }
    }
}

/// Payload for the "went live" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoLiveNotice {
    pub broadcaster_name: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn structured(expires_in: Option<u64>, obtained: i64) -> Credential {
        Credential::Structured(AccessToken {
            access_token: "abcdef123".to_string(),
            refresh_token: Some("refresh".to_string()),
            scope: vec!["chat:read".to_string()],
            expires_in,
            obtainment_timestamp: obtained,
        })
    }

    #[test]
    fn test_bearer_never_expires() {
        let cred = Credential::Bearer("token".to_string());
        assert!(!cred.is_expired_at(i64::MAX));
        assert_eq!(cred.expires_at(), None);
        assert_eq!(cred.refresh_token(), None);
    }

    #[rstest]
    #[case(Some(3600), 0, 3_599_999, false)]
    #[case(Some(3600), 0, 3_600_000, true)]
    #[case(Some(3600), 0, 4_000_000, true)]
    #[case(None, 0, 0, true)]
    fn test_structured_expiry(
        #[case] expires_in: Option<u64>,
        #[case] obtained: i64,
        #[case] now: i64,
        #[case] expired: bool,
    ) {
        assert_eq!(structured(expires_in, obtained).is_expired_at(now), expired);
    }

    #[test]
    fn test_expires_within() {
        let soon = structured(Some(60), now_millis());
        assert!(soon.expires_within(Duration::from_secs(12 * 60 * 60)));

        let later = structured(Some(48 * 60 * 60), now_millis());
        assert!(!later.expires_within(Duration::from_secs(12 * 60 * 60)));

        assert!(!Credential::Bearer("x".to_string()).expires_within(Duration::from_secs(1)));
    }

    #[test]
    fn test_untagged_credential_deserialization() {
        let bearer: Credential = serde_json::from_str(r#""plain-token""#).unwrap();
        assert_eq!(bearer, Credential::Bearer("plain-token".to_string()));

        let structured: Credential = serde_json::from_str(
            r#"{"accessToken":"abc","refreshToken":"def","scope":["chat:read"],"expiresIn":14400,"obtainmentTimestamp":1700000000000}"#,
        )
        .unwrap();
        assert_eq!(structured.access_token(), "abc");
        assert_eq!(structured.refresh_token(), Some("def"));
        assert_eq!(structured.expires_at(), Some(1_700_000_000_000 + 14_400_000));
    }

    #[test]
    fn test_record_rotation_orders_history_newest_first() {
        let mut record = CredentialRecord::default();
        let c1 = Credential::Bearer("one".to_string());
        let c2 = Credential::Bearer("two".to_string());
        let c3 = Credential::Bearer("three".to_string());

        record.rotate(c1.clone(), None);
        assert!(record.previous.is_empty());

        record.rotate(c2.clone(), None);
        record.rotate(c3.clone(), None);

        assert_eq!(record.current, Some(c3));
        assert_eq!(record.previous, vec![c2, c1]);
    }

    #[test]
    fn test_record_rotation_respects_history_limit() {
        let mut record = CredentialRecord::default();
        for i in 0..5 {
            record.rotate(Credential::Bearer(format!("t{}", i)), Some(2));
        }
        assert_eq!(record.current, Some(Credential::Bearer("t4".to_string())));
        assert_eq!(
            record.previous,
            vec![
                Credential::Bearer("t3".to_string()),
                Credential::Bearer("t2".to_string())
            ]
        );
    }

    #[test]
    fn test_masked_hides_token() {
        assert_eq!(Credential::Bearer("abcdef123".to_string()).masked(), "abcd****");
        assert_eq!(Credential::Bearer("abc".to_string()).masked(), "****");
    }

    #[test]
    fn test_well_formed() {
        assert!(Credential::Bearer("x".to_string()).is_well_formed());
        assert!(!Credential::Bearer("  ".to_string()).is_well_formed());
    }

    #[rstest]
    #[case(Intent::Start(ServiceName::Bot), "bot:start")]
    #[case(Intent::Stop(ServiceName::Bot), "bot:stop")]
    #[case(Intent::Start(ServiceName::Listener), "listener:start")]
    #[case(Intent::Stop(ServiceName::Listener), "listener:stop")]
    fn test_intent_display(#[case] intent: Intent, #[case] expected: &str) {
        assert_eq!(intent.to_string(), expected);
    }

    #[test]
    fn test_service_name_parse() {
        assert_eq!("Bot".parse::<ServiceName>().unwrap(), ServiceName::Bot);
        assert_eq!("listener".parse::<ServiceName>().unwrap(), ServiceName::Listener);
        assert!("overlay".parse::<ServiceName>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let status = ServiceStatus::new(RunStatus::StoppedNoCredential, "missing");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "STOPPED_NO_CREDENTIAL");
        assert_eq!(json["reason"], "missing");
    }
}
