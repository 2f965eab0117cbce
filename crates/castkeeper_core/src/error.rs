use thiserror::Error;

use crate::entities::ServiceName;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no access token provided")]
    NoCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("credential is expired")]
    ExpiredCredential,

    #[error("{0} is already running and can't be started twice")]
    AlreadyRunning(ServiceName),

    #[error("{0} isn't running and therefore can't be stopped")]
    NotRunning(ServiceName),

    #[error("{0} is already starting")]
    StartInFlight(ServiceName),

    #[error("no user registered with the auth provider")]
    UserNotRegistered,

    #[error("credential storage error: {0}")]
    CredentialStorage(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response from server: {0}")]
    InvalidServerResponse(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("platform client error: {0}")]
    Client(String),

    #[error("intent channel closed")]
    ChannelClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_string() {
        let err: Error = String::from("test error").into();
        if let Error::Other(msg) = err {
            assert_eq!(msg, "test error");
        } else {
            panic!("Expected Error::Other");
        }
    }

    #[test]
    fn test_error_from_str() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(msg) if msg == "test error"));
    }

    #[test]
    fn test_error_display_variants() {
        assert_eq!(Error::NoCredential.to_string(), "no access token provided");
        assert_eq!(Error::ExpiredCredential.to_string(), "credential is expired");
        assert_eq!(
            Error::AlreadyRunning(ServiceName::Listener).to_string(),
            "listener is already running and can't be started twice"
        );
        assert_eq!(
            Error::NotRunning(ServiceName::Bot).to_string(),
            "bot isn't running and therefore can't be stopped"
        );
        assert_eq!(
            Error::StartInFlight(ServiceName::Bot).to_string(),
            "bot is already starting"
        );
        assert_eq!(
            Error::Refresh("invalid refresh token".to_string()).to_string(),
            "token refresh failed: invalid refresh token"
        );
        assert_eq!(Error::ChannelClosed.to_string(), "intent channel closed");
    }
}
