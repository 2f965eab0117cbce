use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub platform: PlatformSettings,
    pub credentials: CredentialSettings,
    pub bot: BotSettings,
    pub listener: ListenerSettings,
    pub reconnect: ReconnectSettings,
    pub server: ServerSettings,
    pub log_level: String,
}

/// Application identity registered with the streaming platform.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PlatformSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Channel login name the bot joins
    pub channel: String,
    /// Broadcaster id; also the integration identity the credential belongs to
    pub channel_id: String,
    pub auth_url: String,
    pub token_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CredentialSettings {
    /// Directory holding the record; the project data dir when unset
    pub location: Option<PathBuf>,
    pub file_name: String,
    /// Cap on superseded credentials kept in the record
    pub history_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BotSettings {
    pub prefix: String,
    pub reconnect: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ListenerSettings {
    pub reconnect: bool,
    pub discord_webhook_url: Option<String>,
    /// Discord role mentioned in the go-live notice
    pub notify_role: Option<String>,
    pub stream_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ReconnectSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Service start/stop endpoints are disabled without it
    pub admin_password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platform: PlatformSettings::default(),
            credentials: CredentialSettings::default(),
            bot: BotSettings::default(),
            listener: ListenerSettings::default(),
            reconnect: ReconnectSettings::default(),
            server: ServerSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:8090/auth/callback".to_string(),
            scopes: vec![
                "chat:read".to_string(),
                "chat:edit".to_string(),
                "moderator:read:followers".to_string(),
            ],
            channel: String::new(),
            channel_id: String::new(),
            auth_url: "https://id.twitch.tv/oauth2/authorize".to_string(),
            token_url: "https://id.twitch.tv/oauth2/token".to_string(),
        }
    }
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            location: None,
            file_name: "tokens.json".to_string(),
            history_limit: None,
        }
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            reconnect: false,
        }
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            reconnect: true,
            discord_webhook_url: None,
            notify_role: None,
            stream_url: None,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            max_attempts: 5,
        }
    }
}

impl ReconnectSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            admin_password: None,
        }
    }
}
