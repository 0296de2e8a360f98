use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum UserStoreError {
    #[error("Username already exists: {0}")]
    DuplicateUser(String),

    #[error("Username must not be empty")]
    EmptyUsername,

    #[error("User store {} could not be read; refusing to overwrite it", .0.display())]
    Unreadable(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not serialize user store: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Hex-encoded SHA-256 of the password.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Username -> password-hash store. The pipeline never touches it; only the
/// CLI gate in `main` does.
pub trait UserStore {
    /// Fails with `DuplicateUser` when the username is taken.
    fn create_user(&mut self, username: &str, password: &str) -> Result<(), UserStoreError>;

    fn verify_user(&self, username: &str, password: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: HashMap<String, String>,
}

impl UserStore for MemoryUserStore {
    fn create_user(&mut self, username: &str, password: &str) -> Result<(), UserStoreError> {
        if username.trim().is_empty() {
            return Err(UserStoreError::EmptyUsername);
        }
        if self.users.contains_key(username) {
            return Err(UserStoreError::DuplicateUser(username.to_string()));
        }
        self.users.insert(username.to_string(), hash_password(password));
        Ok(())
    }

    fn verify_user(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|stored| *stored == hash_password(password))
    }
}

/// JSON-file backed store, `{ "username": "sha256-hex" }`.
pub struct FileUserStore {
    inner: MemoryUserStore,
    path: PathBuf,
    /// False when the file exists but could not be read or parsed.
    writable: bool,
}

impl FileUserStore {
    /// Load from `path`. A missing file starts an empty store. An unreadable or
    /// unparseable one also reads as empty, but is never written over.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let parsed = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str::<HashMap<String, String>>(&s).map_err(|e| e.to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.to_string()),
        };
        let (users, writable) = match parsed {
            Ok(map) => (map, true),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not load user store, opening read-only");
                (HashMap::new(), false)
            }
        };
        Self { inner: MemoryUserStore { users }, path, writable }
    }

    // tmp + rename so a crash never leaves a half-written file
    fn save(&self) -> Result<(), UserStoreError> {
        if !self.writable {
            return Err(UserStoreError::Unreadable(self.path.clone()));
        }
        let contents = serde_json::to_string_pretty(&self.inner.users)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl UserStore for FileUserStore {
    fn create_user(&mut self, username: &str, password: &str) -> Result<(), UserStoreError> {
        if !self.writable {
            return Err(UserStoreError::Unreadable(self.path.clone()));
        }
        self.inner.create_user(username, password)?;
        if let Err(e) = self.save() {
            self.inner.users.remove(username);
            return Err(e);
        }
        info!(username, "user registered");
        Ok(())
    }

    fn verify_user(&self, username: &str, password: &str) -> bool {
        self.inner.verify_user(username, password)
    }
}
