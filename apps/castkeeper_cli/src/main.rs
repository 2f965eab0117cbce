use std::path::PathBuf;
use std::sync::Arc;

use castkeeper_adapters::{configuration, telemetry, FileCredentialStore, TwitchOauthClient};
use castkeeper_core::auth_provider::AuthProviderAdapter;
use castkeeper_core::config::Settings;
use castkeeper_core::entities::{now_millis, Credential, CredentialUpdate};
use castkeeper_core::ports::{CredentialStore, OauthClient};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use tracing::error;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the URL that grants the configured scopes
    LoginUrl,

    /// Exchange an authorization code and store the resulting token
    Exchange {
        /// Code from the OAuth redirect
        #[arg(short, long)]
        code: String,
    },

    /// Store an access token (bearer string or token JSON)
    SetToken {
        /// Token to store; prompted for when omitted
        #[arg(short, long)]
        token: Option<String>,

        /// Replace an existing credential without asking
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    /// Show where the credential lives and what it holds
    Show,

    /// List superseded credentials, newest first
    History,

    /// Refresh the stored token now
    Refresh,
}

fn get_config_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "castkeeper", "castkeeper")
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("~/.config"))
                .join("castkeeper")
        })
}

/// Accepts either token JSON or a bare bearer string.
fn parse_credential(raw: &str) -> anyhow::Result<Credential> {
    let raw = raw.trim();
    let credential = if raw.starts_with('{') {
        serde_json::from_str::<Credential>(raw)
            .map_err(|e| anyhow::anyhow!("token JSON is malformed: {}", e))?
    } else {
        Credential::Bearer(raw.to_string())
    };

    if !credential.is_well_formed() {
        anyhow::bail!("access token is empty");
    }
    Ok(credential)
}

fn describe_expiry(credential: &Credential) -> String {
    match credential {
        Credential::Bearer(_) => "never (bearer token)".to_string(),
        Credential::Structured(_) => match credential.expires_at() {
            None => "unknown".to_string(),
            Some(at) => {
                let remaining_min = at.saturating_sub(now_millis()) / 60_000;
                if remaining_min <= 0 {
                    "expired".to_string()
                } else {
                    format!("in {}h {}m", remaining_min / 60, remaining_min % 60)
                }
            }
        },
    }
}

fn report_update(update: CredentialUpdate) {
    match update {
        CredentialUpdate::Persisted => println!("Access token saved."),
        CredentialUpdate::InMemory => println!("Access token kept in memory only."),
        CredentialUpdate::PersistFailed => {
            println!("Access token could not be written to disk; see the log for details.")
        }
        CredentialUpdate::Rejected => println!("Access token rejected: it is already expired."),
    }
}

async fn open_store(settings: &Settings) -> Arc<FileCredentialStore> {
    Arc::new(FileCredentialStore::open(&settings.credentials).await)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _guard = telemetry::init_subscriber("castkeeper", "info");

    let settings = match configuration::get_configuration() {
        Ok(s) => s,
        Err(e) => {
            error!(?e, "failed to load configuration");
            return Err(anyhow::anyhow!("configuration loading failed"));
        }
    };

    let cli = Cli::parse();

    match &cli.command {
        Commands::LoginUrl => {
            let oauth = TwitchOauthClient::new(&settings.platform)?;
            println!("{}", oauth.authorize_url()?);
        }

        Commands::Exchange { code } => {
            let oauth = TwitchOauthClient::new(&settings.platform)?;
            let store = open_store(&settings).await;

            println!("Exchanging authorization code...");
            let token = oauth.exchange_code(code).await?;
            let credential = Credential::Structured(token);
            println!("- Token: {}", credential.masked());
            println!("- Expires: {}", describe_expiry(&credential));

            report_update(store.set_credential(credential, true).await);
        }

        Commands::SetToken { token, yes } => {
            let store = open_store(&settings).await;

            let raw = match token {
                Some(t) => t.clone(),
                None => rpassword::prompt_password("Access token: ")?,
            };
            let credential = parse_credential(&raw)?;

            if let Some(existing) = store.get_credential() {
                let replace = *yes
                    || Confirm::new()
                        .with_prompt(format!("Replace the stored token {}?", existing.masked()))
                        .default(false)
                        .interact()?;
                if !replace {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            report_update(store.set_credential(credential, true).await);
        }

        Commands::Show => {
            let store = open_store(&settings).await;
            let probe = store.credential_file_exists();

            println!("Config directory: {}", get_config_dir().display());
            println!("Log directory: {}", telemetry::log_dir().display());
            println!(
                "Credential file: {} ({})",
                probe.location.display(),
                if probe.exists { "present" } else { "missing" }
            );

            match store.get_credential() {
                Some(credential) => {
                    println!("Current token: {}", credential.masked());
                    println!("- Expires: {}", describe_expiry(&credential));
                    println!(
                        "- Refreshable: {}",
                        if credential.refresh_token().is_some() { "yes" } else { "no" }
                    );
                }
                None => println!("No usable access token stored."),
            }
        }

        Commands::History => {
            let store = open_store(&settings).await;
            let history = store.history().await?;

            if history.is_empty() {
                println!("No superseded tokens.");
            } else {
                println!("Superseded tokens ({}):", history.len());
                for (i, credential) in history.iter().enumerate() {
                    println!(
                        "{:>3}. {} (expiry: {})",
                        i + 1,
                        credential.masked(),
                        describe_expiry(credential)
                    );
                }
            }
        }

        Commands::Refresh => {
            let store = open_store(&settings).await;
            let oauth = Arc::new(TwitchOauthClient::new(&settings.platform)?);
            let auth = AuthProviderAdapter::new(store.clone(), oauth, &settings.platform);

            auth.add_user(store.get_credential()).await?;

            println!("Refreshing access token...");
            // The adapter's refresh listener writes the new token to the store
            let credential = auth.get_instance().refresh().await?;
            println!("- Token: {}", credential.masked());
            println!("- Expires: {}", describe_expiry(&credential));
        }
    }

    Ok(())
}
