//! Refreshing auth provider and the process-wide adapter around it.
//!
//! [`RefreshingAuthProvider`] hands out access tokens to the platform clients
//! and refreshes structured tokens shortly before they expire. Interested
//! parties register a [`RefreshListener`] to learn about rotated tokens and
//! failed refreshes.
//!
//! [`AuthProviderAdapter`] builds the provider once, wires its refresh
//! callbacks to the [`CredentialStore`], and registers the stored credential
//! as the active user.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::PlatformSettings;
use crate::entities::Credential;
use crate::error::Error;
use crate::ports::{CredentialStore, OauthClient};

/// Tokens expiring within this window are refreshed before use.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Callbacks fired after every refresh attempt.
#[async_trait]
pub trait RefreshListener: Send + Sync {
    async fn on_refresh(&self, user_id: &str, credential: &Credential);
    async fn on_refresh_failure(&self, user_id: &str, error: &Error);
}

#[derive(Debug, Clone)]
struct RegisteredUser {
    user_id: String,
    credential: Credential,
}

pub struct RefreshingAuthProvider {
    oauth: Arc<dyn OauthClient>,
    scopes: Vec<String>,
    // Held across the refresh request so concurrent callers share one refresh
    user: Mutex<Option<RegisteredUser>>,
    listeners: RwLock<Vec<Arc<dyn RefreshListener>>>,
}

impl RefreshingAuthProvider {
    pub fn new(oauth: Arc<dyn OauthClient>, scopes: Vec<String>) -> Self {
        Self {
            oauth,
            scopes,
            user: Mutex::new(None),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn on_refresh(&self, listener: Arc<dyn RefreshListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Register `credential` as the active user, replacing any earlier one.
    ///
    /// An expired token is only accepted when it can still be refreshed.
    #[instrument(skip(self, credential))]
    pub async fn add_user(&self, user_id: &str, credential: Credential) -> Result<(), Error> {
        if !credential.is_well_formed() {
            return Err(Error::InvalidCredential("empty access token".to_string()));
        }
        if credential.is_expired() && credential.refresh_token().is_none() {
            return Err(Error::ExpiredCredential);
        }

        *self.user.lock().await = Some(RegisteredUser {
            user_id: user_id.to_string(),
            credential,
        });
        info!(user_id = %user_id, "registered user with auth provider");
        Ok(())
    }

    pub async fn has_user(&self, user_id: &str) -> bool {
        self.user
            .lock()
            .await
            .as_ref()
            .is_some_and(|user| user.user_id == user_id)
    }

    pub async fn current_credential(&self) -> Option<Credential> {
        self.user
            .lock()
            .await
            .as_ref()
            .map(|user| user.credential.clone())
    }

    /// Access token for the registered user, refreshed first when it is
    /// about to expire and a refresh token is available.
    pub async fn access_token(&self) -> Result<String, Error> {
        let mut guard = self.user.lock().await;
        let user = guard.as_mut().ok_or(Error::UserNotRegistered)?;

        let needs_refresh = user.credential.refresh_token().is_some()
            && (user.credential.is_expired() || user.credential.expires_within(REFRESH_MARGIN));
        if !needs_refresh {
            return Ok(user.credential.access_token().to_string());
        }

        let refreshed = self.refresh_locked(user).await?;
        Ok(refreshed.access_token().to_string())
    }

    /// Force a refresh of the registered user's token.
    pub async fn refresh(&self) -> Result<Credential, Error> {
        let mut guard = self.user.lock().await;
        let user = guard.as_mut().ok_or(Error::UserNotRegistered)?;
        self.refresh_locked(user).await
    }

    async fn refresh_locked(&self, user: &mut RegisteredUser) -> Result<Credential, Error> {
        let Some(refresh_token) = user.credential.refresh_token().map(str::to_string) else {
            let error = Error::Refresh("credential has no refresh token".to_string());
            self.notify_failure(&user.user_id, &error).await;
            return Err(error);
        };

        debug!(user_id = %user.user_id, "refreshing access token");

        match self.oauth.refresh(&refresh_token).await {
            Ok(token) => {
                let credential = Credential::Structured(token);
                user.credential = credential.clone();
                self.notify_refresh(&user.user_id, &credential).await;
                Ok(credential)
            }
            Err(e) => {
                // Last-known-good credential stays in place
                let error = Error::Refresh(e.to_string());
                self.notify_failure(&user.user_id, &error).await;
                Err(error)
            }
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn RefreshListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn notify_refresh(&self, user_id: &str, credential: &Credential) {
        for listener in self.listeners() {
            listener.on_refresh(user_id, credential).await;
        }
    }

    async fn notify_failure(&self, user_id: &str, error: &Error) {
        for listener in self.listeners() {
            listener.on_refresh_failure(user_id, error).await;
        }
    }
}

/// Forwards rotated tokens into the credential store.
struct CredentialForwarder {
    store: Arc<dyn CredentialStore>,
}

#[async_trait]
impl RefreshListener for CredentialForwarder {
    async fn on_refresh(&self, user_id: &str, credential: &Credential) {
        info!(user_id = %user_id, "access token for user was refreshed");
        let outcome = self.store.set_credential(credential.clone(), true).await;
        debug!(?outcome, "forwarded refreshed credential");
    }

    async fn on_refresh_failure(&self, user_id: &str, error: &Error) {
        warn!(user_id = %user_id, error = %error, "couldn't refresh the access token");
    }
}

/// Process-scoped owner of the single [`RefreshingAuthProvider`].
pub struct AuthProviderAdapter {
    store: Arc<dyn CredentialStore>,
    oauth: Arc<dyn OauthClient>,
    scopes: Vec<String>,
    user_id: String,
    instance: OnceLock<Arc<RefreshingAuthProvider>>,
}

impl AuthProviderAdapter {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        oauth: Arc<dyn OauthClient>,
        platform: &PlatformSettings,
    ) -> Self {
        Self {
            store,
            oauth,
            scopes: platform.scopes.clone(),
            user_id: platform.channel_id.clone(),
            instance: OnceLock::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The shared provider, constructed on first use.
    pub fn get_instance(&self) -> Arc<RefreshingAuthProvider> {
        self.instance
            .get_or_init(|| {
                let provider = Arc::new(RefreshingAuthProvider::new(
                    self.oauth.clone(),
                    self.scopes.clone(),
                ));
                provider.on_refresh(Arc::new(CredentialForwarder {
                    store: self.store.clone(),
                }));
                debug!(scopes = ?self.scopes, "constructed refreshing auth provider");
                provider
            })
            .clone()
    }

    /// Register `credential` as the active user. Fails when there is nothing
    /// usable to register.
    pub async fn add_user(&self, credential: Option<Credential>) -> Result<(), Error> {
        let credential = credential.ok_or(Error::NoCredential)?;
        self.get_instance().add_user(&self.user_id, credential).await
    }

    /// Make sure the provider authenticates with the store's current
    /// credential, registering it when missing or replaced.
    pub async fn ensure_user(&self) -> Result<(), Error> {
        let provider = self.get_instance();
        let stored = self.store.get_credential();

        if provider.has_user(&self.user_id).await {
            let active = provider.current_credential().await;
            if stored.is_none() || stored == active {
                return Ok(());
            }
        }

        self.add_user(stored).await
    }
}
