use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use castkeeper_core::config::CredentialSettings;
use castkeeper_core::entities::{
    Credential, CredentialFileProbe, CredentialRecord, CredentialUpdate,
};
use castkeeper_core::ports::CredentialStore;
use castkeeper_core::Error;
use directories::ProjectDirs;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// JSON-file credential store holding one record per integration identity.
pub struct FileCredentialStore {
    path: PathBuf,
    history_limit: Option<usize>,
    current: RwLock<Option<Credential>>,
    // Held across the memory swap and the record write so both see
    // rotations in the same order
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Open the store at the configured location, seeding the in-memory
    /// credential from the record when it is still usable.
    pub async fn open(settings: &CredentialSettings) -> Self {
        let dir = settings.location.clone().unwrap_or_else(default_data_dir);
        Self::open_at(dir.join(&settings.file_name), settings.history_limit).await
    }

    pub async fn open_at(path: PathBuf, history_limit: Option<usize>) -> Self {
        let current = match load_record(&path).await {
            Ok(record) => usable(record.current),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "couldn't read credential record");
                None
            }
        };

        Self {
            path,
            history_limit,
            current: RwLock::new(current),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotate `credential` into the record file. Callers hold `write_lock`.
    async fn persist(&self, credential: Credential) -> Result<(), Error> {
        let mut record = match load_record(&self.path).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "existing credential record unreadable, starting a new one");
                CredentialRecord::default()
            }
        };
        record.rotate(credential, self.history_limit);
        save_record(&self.path, &record).await
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "castkeeper", "castkeeper")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Drop a stored credential that can't be used any more.
fn usable(credential: Option<Credential>) -> Option<Credential> {
    let credential = credential?;
    if !credential.is_well_formed() {
        warn!("discarding malformed stored credential");
        return None;
    }
    if credential.is_expired() {
        warn!(
            expires_at_ms = credential.expires_at(),
            "discarding expired stored credential"
        );
        return None;
    }
    Some(credential)
}

async fn load_record(path: &Path) -> Result<CredentialRecord, Error> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(CredentialRecord::default());
    }

    let content = fs::read_to_string(path).await?;
    serde_json::from_str(&content)
        .map_err(|e| Error::CredentialStorage(format!("failed to parse credential record: {}", e)))
}

/// Write the whole record to a sibling temp file, then rename it over the
/// original so readers never see a partial document.
async fn save_record(path: &Path, record: &CredentialRecord) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(record).map_err(|e| {
        Error::CredentialStorage(format!("failed to serialize credential record: {}", e))
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    fn get_credential(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    #[instrument(skip(self, credential), fields(token = %credential.masked()))]
    async fn set_credential(&self, credential: Credential, persist: bool) -> CredentialUpdate {
        if !credential.is_well_formed() {
            warn!("refusing to store a malformed access token");
            return CredentialUpdate::Rejected;
        }
        if credential.is_expired() {
            warn!(
                expires_at_ms = credential.expires_at(),
                "refusing to store an expired access token"
            );
            return CredentialUpdate::Rejected;
        }

        let _guard = self.write_lock.lock().await;

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(credential.clone());

        if !persist {
            debug!("credential updated in memory");
            return CredentialUpdate::InMemory;
        }

        match self.persist(credential).await {
            Ok(()) => {
                info!(path = %self.path.display(), "credential saved");
                CredentialUpdate::Persisted
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "couldn't save credential, keeping it in memory only"
                );
                CredentialUpdate::PersistFailed
            }
        }
    }

    fn credential_file_exists(&self) -> CredentialFileProbe {
        CredentialFileProbe {
            exists: self.path.is_file(),
            location: self.path.clone(),
        }
    }

    async fn history(&self) -> Result<Vec<Credential>, Error> {
        Ok(load_record(&self.path).await?.previous)
    }
}
