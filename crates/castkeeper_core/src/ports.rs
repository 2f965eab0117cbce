use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::auth_provider::RefreshingAuthProvider;
use crate::entities::{
    AccessToken, Credential, CredentialFileProbe, CredentialUpdate, GoLiveNotice,
};
use crate::error::Error;

// ============================================================================
// Credential Ports
// ============================================================================

/// Owner of the current access credential and its persisted history.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// In-memory credential; never an expired or malformed stored one
    fn get_credential(&self) -> Option<Credential>;

    /// Replace the current credential. Malformed credentials and expired
    /// structured tokens are rejected without error, leaving the current one
    /// in place; persistence failures degrade to memory-only.
    async fn set_credential(&self, credential: Credential, persist: bool) -> CredentialUpdate;

    /// Pure existence probe for the backing record
    fn credential_file_exists(&self) -> CredentialFileProbe;

    /// Superseded credentials, most recent first
    async fn history(&self) -> Result<Vec<Credential>, Error>;
}

/// OAuth endpoints of the streaming platform
#[async_trait]
pub trait OauthClient: Send + Sync {
    /// URL the operator opens to grant the declared scopes
    fn authorize_url(&self) -> Result<String, Error>;

    /// Exchange an authorization code for a token pair
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, Error>;

    /// Trade a refresh token for a new token pair
    async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, Error>;
}

// ============================================================================
// Platform Client Ports
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub channel: String,
    pub user_name: String,
    pub user_display_name: String,
    pub text: String,
}

/// Lifecycle callbacks raised by a chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Connected,
    Disconnected {
        manually: bool,
        reason: Option<String>,
    },
    AuthenticationSuccess,
    AuthenticationFailure {
        text: String,
        retry_count: u32,
    },
    Message(ChatMessage),
}

/// Chat connection for one set of channels
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn connect(&self) -> Result<(), Error>;
    async fn disconnect(&self) -> Result<(), Error>;
    async fn say(&self, channel: &str, text: &str) -> Result<(), Error>;
    async fn reply(&self, channel: &str, reply_to: &str, text: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait ChatClientFactory: Send + Sync {
    /// Build a client authenticating through `auth`. Lifecycle callbacks are
    /// delivered on `events` for as long as the client lives.
    async fn create(
        &self,
        auth: Arc<RefreshingAuthProvider>,
        channels: Vec<String>,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<Arc<dyn ChatClient>, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    ChannelFollow,
    StreamOnline,
    StreamOffline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub title: String,
    pub thumbnail_url: Option<String>,
}

/// Callbacks raised by the live-event subscription client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    UserSocketConnect {
        user_id: String,
    },
    UserSocketDisconnect {
        user_id: String,
        error: Option<String>,
    },
    ChannelFollow {
        user_name: String,
    },
    StreamOnline {
        broadcaster_name: String,
        stream: Option<StreamInfo>,
    },
    StreamOffline {
        broadcaster_name: String,
    },
}

/// Live-event subscription client (websocket transport)
#[async_trait]
pub trait EventSubClient: Send + Sync {
    /// Drop subscriptions left over from earlier sessions
    async fn delete_all_subscriptions(&self) -> Result<(), Error>;
    async fn subscribe(&self, kind: SubscriptionKind, broadcaster_id: &str) -> Result<(), Error>;
    async fn start(&self) -> Result<(), Error>;
    async fn stop(&self) -> Result<(), Error>;
}

#[async_trait]
pub trait EventSubClientFactory: Send + Sync {
    async fn create(
        &self,
        auth: Arc<RefreshingAuthProvider>,
        events: mpsc::UnboundedSender<PlatformEvent>,
    ) -> Result<Arc<dyn EventSubClient>, Error>;
}

/// Outbound notification sink for go-live announcements
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_live(&self, notice: &GoLiveNotice) -> Result<(), Error>;
}
