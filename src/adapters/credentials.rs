use crate::domain::model::{CredentialRegistry, UserCredentialEntry};
use crate::domain::ports::CredentialStore;
use crate::utils::error::{Result, SurveyError};
use chrono::Local;
use std::fs;
use std::path::PathBuf;

pub const USERS_CACHE_FNAME: &str = "reg.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddUserOutcome {
    Added,
    Updated,
    AlreadyExists,
}

/// User registry kept as a single JSON file. Every mutation reads the whole
/// file and rewrites it; concurrent writers are not supported.
#[derive(Debug, Clone)]
pub struct JsonCredentialStore {
    dir: PathBuf,
}

impl JsonCredentialStore {
    /// Opens the registry under `dir`, creating the directory and an empty
    /// registry file if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { dir: dir.into() };
        if !store.registry_path().exists() {
            fs::create_dir_all(&store.dir)?;
            store.save(&CredentialRegistry::new())?;
            tracing::debug!("Created user registry at {}", store.registry_path().display());
        }
        Ok(store)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.dir.join(USERS_CACHE_FNAME)
    }

    fn load(&self) -> Result<CredentialRegistry> {
        match fs::read(self.registry_path()) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(CredentialRegistry::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CredentialRegistry::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, registry: &CredentialRegistry) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.registry_path(), serde_json::to_vec(registry)?)?;
        Ok(())
    }

    pub fn add_user(&self, username: &str, token: &str, force_update: bool) -> Result<AddUserOutcome> {
        let mut registry = self.load()?;
        let exists = registry.contains_key(username);

        if exists && !force_update {
            tracing::warn!(
                "User {} already exists in cache. Use update-user to replace the token.",
                username
            );
            return Ok(AddUserOutcome::AlreadyExists);
        }

        registry.insert(
            username.to_string(),
            UserCredentialEntry {
                access_token: token.to_string(),
                registered_at: Local::now().naive_local(),
            },
        );
        self.save(&registry)?;

        Ok(if exists {
            AddUserOutcome::Updated
        } else {
            AddUserOutcome::Added
        })
    }

    /// Returns whether the user was present.
    pub fn remove_user(&self, username: &str) -> Result<bool> {
        let mut registry = self.load()?;
        let removed = registry.shift_remove(username).is_some();
        self.save(&registry)?;
        Ok(removed)
    }

    /// Deletes the registry file; later reads see an empty registry.
    pub fn purge(&self) -> Result<()> {
        match fs::remove_file(self.registry_path()) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    pub fn entry(&self, username: &str) -> Result<UserCredentialEntry> {
        self.load()?
            .shift_remove(username)
            .ok_or_else(|| SurveyError::NotFound {
                username: username.to_string(),
            })
    }
}

impl CredentialStore for JsonCredentialStore {
    fn load_token(&self, username: &str) -> Result<String> {
        self.entry(username).map(|entry| entry.access_token)
    }

    fn list_users(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }
}
