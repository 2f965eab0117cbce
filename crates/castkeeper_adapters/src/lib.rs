pub mod configuration;
pub mod control_server;
pub mod credentials;
pub mod network;
pub mod notifier;
pub mod oauth;
pub mod telemetry;

// Re-exports for convenience
pub use control_server::ControlServer;
pub use credentials::FileCredentialStore;
pub use notifier::DiscordWebhookNotifier;
pub use oauth::TwitchOauthClient;
