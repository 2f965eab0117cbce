//! In-memory port implementations shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::auth_provider::RefreshingAuthProvider;
use crate::entities::{
    now_millis, AccessToken, Credential, CredentialFileProbe, CredentialRecord, CredentialUpdate,
    GoLiveNotice, RunStatus, ServiceName,
};
use crate::error::Error;
use crate::ports::{
    ChatClient, ChatClientFactory, ChatEvent, CredentialStore, EventSubClient,
    EventSubClientFactory, Notifier, OauthClient, PlatformEvent, SubscriptionKind,
};
use crate::status::StatusRegistry;

pub fn valid_token(access: &str) -> AccessToken {
    AccessToken {
        access_token: access.to_string(),
        refresh_token: Some(format!("refresh-{}", access)),
        scope: vec!["chat:read".to_string()],
        expires_in: Some(4 * 60 * 60),
        obtainment_timestamp: now_millis(),
    }
}

pub fn expired_token(access: &str) -> AccessToken {
    AccessToken {
        expires_in: Some(60),
        obtainment_timestamp: now_millis() - 10 * 60 * 1000,
        ..valid_token(access)
    }
}

/// Poll until `service` reports `status`, giving up after about a second.
pub async fn wait_for_status(
    registry: &StatusRegistry,
    service: ServiceName,
    status: RunStatus,
) -> bool {
    for _ in 0..200 {
        if registry.status_of(service).status == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    current: RwLock<Option<Credential>>,
    record: Mutex<CredentialRecord>,
    writes: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(credential: Credential) -> Self {
        let store = Self::default();
        *store.current.write().unwrap() = Some(credential);
        store
    }

    pub fn persisted_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    fn get_credential(&self) -> Option<Credential> {
        self.current.read().unwrap().clone()
    }

    async fn set_credential(&self, credential: Credential, persist: bool) -> CredentialUpdate {
        if !credential.is_well_formed() || credential.is_expired() {
            return CredentialUpdate::Rejected;
        }
        *self.current.write().unwrap() = Some(credential.clone());
        if persist {
            self.record.lock().unwrap().rotate(credential, None);
            self.writes.fetch_add(1, Ordering::SeqCst);
            CredentialUpdate::Persisted
        } else {
            CredentialUpdate::InMemory
        }
    }

    fn credential_file_exists(&self) -> CredentialFileProbe {
        CredentialFileProbe {
            exists: self.persisted_writes() > 0,
            location: "memory".into(),
        }
    }

    async fn history(&self) -> Result<Vec<Credential>, Error> {
        Ok(self.record.lock().unwrap().previous.clone())
    }
}

pub struct FakeOauthClient {
    refresh_result: Mutex<Result<AccessToken, String>>,
    refresh_calls: AtomicUsize,
}

impl FakeOauthClient {
    pub fn new() -> Self {
        Self {
            refresh_result: Mutex::new(Err("refresh not configured".to_string())),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_refresh_result(&self, result: Result<AccessToken, String>) {
        *self.refresh_result.lock().unwrap() = result;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OauthClient for FakeOauthClient {
    fn authorize_url(&self) -> Result<String, Error> {
        Ok("https://auth.example/authorize".to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessToken, Error> {
        Ok(valid_token(code))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<AccessToken, Error> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_result
            .lock()
            .unwrap()
            .clone()
            .map_err(Error::Authentication)
    }
}

/// How a fake chat client answers `connect`.
#[derive(Debug, Clone)]
pub enum ChatBehavior {
    AuthSucceeds,
    AuthFails(String),
    Silent,
}

pub struct FakeChatClient {
    events: mpsc::UnboundedSender<ChatEvent>,
    behavior: ChatBehavior,
    said: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatClient for FakeChatClient {
    async fn connect(&self) -> Result<(), Error> {
        let _ = self.events.send(ChatEvent::Connected);
        match &self.behavior {
            ChatBehavior::AuthSucceeds => {
                let _ = self.events.send(ChatEvent::AuthenticationSuccess);
            }
            ChatBehavior::AuthFails(text) => {
                let _ = self.events.send(ChatEvent::AuthenticationFailure {
                    text: text.clone(),
                    retry_count: 1,
                });
            }
            ChatBehavior::Silent => {}
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Error> {
        let _ = self.events.send(ChatEvent::Disconnected {
            manually: true,
            reason: None,
        });
        Ok(())
    }

    async fn say(&self, channel: &str, text: &str) -> Result<(), Error> {
        self.said
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }

    async fn reply(&self, channel: &str, _reply_to: &str, text: &str) -> Result<(), Error> {
        self.say(channel, text).await
    }
}

pub struct FakeChatFactory {
    behavior: ChatBehavior,
    created: AtomicUsize,
    clients: Mutex<Vec<Arc<FakeChatClient>>>,
}

impl FakeChatFactory {
    pub fn new(behavior: ChatBehavior) -> Self {
        Self {
            behavior,
            created: AtomicUsize::new(0),
            clients: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Inject a callback as if the live client raised it.
    pub fn emit(&self, event: ChatEvent) {
        if let Some(client) = self.clients.lock().unwrap().last() {
            let _ = client.events.send(event);
        }
    }

    pub fn said(&self) -> Vec<(String, String)> {
        self.clients
            .lock()
            .unwrap()
            .last()
            .map(|c| c.said.lock().unwrap().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatClientFactory for FakeChatFactory {
    async fn create(
        &self,
        _auth: Arc<RefreshingAuthProvider>,
        _channels: Vec<String>,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<Arc<dyn ChatClient>, Error> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let client = Arc::new(FakeChatClient {
            events,
            behavior: self.behavior.clone(),
            said: Mutex::new(Vec::new()),
        });
        self.clients.lock().unwrap().push(client.clone());
        Ok(client)
    }
}

pub struct FakeEventSubClient {
    events: mpsc::UnboundedSender<PlatformEvent>,
    user_id: String,
    subscriptions: Mutex<Vec<(SubscriptionKind, String)>>,
    cleared: AtomicUsize,
}

#[async_trait]
impl EventSubClient for FakeEventSubClient {
    async fn delete_all_subscriptions(&self) -> Result<(), Error> {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, kind: SubscriptionKind, broadcaster_id: &str) -> Result<(), Error> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((kind, broadcaster_id.to_string()));
        Ok(())
    }

    async fn start(&self) -> Result<(), Error> {
        let _ = self.events.send(PlatformEvent::UserSocketConnect {
            user_id: self.user_id.clone(),
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        let _ = self.events.send(PlatformEvent::UserSocketDisconnect {
            user_id: self.user_id.clone(),
            error: None,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeEventSubFactory {
    created: AtomicUsize,
    clients: Mutex<Vec<Arc<FakeEventSubClient>>>,
}

impl FakeEventSubFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn emit(&self, event: PlatformEvent) {
        if let Some(client) = self.clients.lock().unwrap().last() {
            let _ = client.events.send(event);
        }
    }

    pub fn subscriptions(&self) -> Vec<(SubscriptionKind, String)> {
        self.clients
            .lock()
            .unwrap()
            .last()
            .map(|c| c.subscriptions.lock().unwrap().clone())
            .unwrap_or_default()
    }

    pub fn cleared(&self) -> usize {
        self.clients
            .lock()
            .unwrap()
            .last()
            .map(|c| c.cleared.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventSubClientFactory for FakeEventSubFactory {
    async fn create(
        &self,
        _auth: Arc<RefreshingAuthProvider>,
        events: mpsc::UnboundedSender<PlatformEvent>,
    ) -> Result<Arc<dyn EventSubClient>, Error> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let client = Arc::new(FakeEventSubClient {
            events,
            user_id: "4242".to_string(),
            subscriptions: Mutex::new(Vec::new()),
            cleared: AtomicUsize::new(0),
        });
        self.clients.lock().unwrap().push(client.clone());
        Ok(client)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<GoLiveNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<GoLiveNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_live(&self, notice: &GoLiveNotice) -> Result<(), Error> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}
