use std::path::PathBuf;

use castkeeper_core::config::Settings;
use config::{Config, Environment, File};
use directories::ProjectDirs;

pub fn get_configuration_with_paths(
    current_dir_path: Option<PathBuf>,
    system_config_dir_path: Option<PathBuf>,
) -> Result<Settings, config::ConfigError> {
    let config_directory = current_dir_path.unwrap_or_else(|| {
        std::env::current_dir()
            .map(|p| p.join("config"))
            .unwrap_or_else(|_| PathBuf::from("config"))
    });

    let system_config_dir = if let Some(path) = system_config_dir_path {
        path
    } else {
        ProjectDirs::from("com", "castkeeper", "castkeeper")
            .map(|d| d.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("config"))
    };

    let settings = Config::builder()
        // Platform endpoints and requested scopes
        .set_default("platform.redirect_uri", "http://localhost:8090/auth/callback")?
        .set_default(
            "platform.scopes",
            vec!["chat:read", "chat:edit", "moderator:read:followers"],
        )?
        .set_default("platform.auth_url", "https://id.twitch.tv/oauth2/authorize")?
        .set_default("platform.token_url", "https://id.twitch.tv/oauth2/token")?
        .set_default("credentials.file_name", "tokens.json")?
        // Service behavior
        .set_default("bot.prefix", "!")?
        .set_default("bot.reconnect", false)?
        .set_default("listener.reconnect", true)?
        .set_default("reconnect.base_delay_ms", 1000)?
        .set_default("reconnect.max_delay_ms", 60_000)?
        .set_default("reconnect.max_attempts", 5)?
        // Control surface
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8090)?
        .set_default("log_level", "info")?
        .add_source(File::from(system_config_dir.join("config.toml")).required(false))
        .add_source(File::from(config_directory.join("config.toml")).required(false))
        .add_source(
            Environment::with_prefix("CASTKEEPER")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    get_configuration_with_paths(None, None)
}
