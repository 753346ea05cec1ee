//! User account store.
//!
//! The session core consumes this through the [`UserStore`] trait:
//! `exists`/`load`/`save`. The default implementation is a content-addressed
//! file store: each account record lives at `<dir>/<hex sha256(name)>.json`,
//! so account names never touch the filesystem namespace directly.
//! Passwords are stored as salted SHA-256 verifiers and compared in
//! constant time.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// The authenticated identity attached to a session after login/register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub name: String,
    pub email: String,
}

/// Store failures surfaced to flow handlers. `AlreadyExists` and
/// `InvalidCredentials` are user-facing outcomes; `Io` and `Corrupt` are
/// storage faults.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account already exists")]
    AlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt account record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// The account store interface consumed by the session core.
///
/// `save` must be at-most-once per name: concurrent registration attempts
/// for the same name may see at most one success.
pub trait UserStore: Send + Sync {
    fn exists(&self, name: &str) -> bool;
    fn load(&self, name: &str, password: &str) -> Result<UserIdentity, StoreError>;
    fn save(&self, user: &UserIdentity, password: &str) -> Result<(), StoreError>;
}

/// On-disk account record. The verifier is `sha256(salt || password)`.
#[derive(Debug, Serialize, Deserialize)]
struct AccountRecord {
    name: String,
    email: String,
    salt: String,
    verifier: String,
}

/// Content-addressed file-backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Record path for an account name: hex sha256 of the name.
    fn record_path(&self, name: &str) -> PathBuf {
        let digest = Sha256::digest(name.as_bytes());
        self.dir.join(format!("{}.json", hex(&digest)))
    }
}

impl UserStore for FileStore {
    fn exists(&self, name: &str) -> bool {
        self.record_path(name).exists()
    }

    fn load(&self, name: &str, password: &str) -> Result<UserIdentity, StoreError> {
        let contents = match std::fs::read_to_string(self.record_path(name)) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::InvalidCredentials)
            }
            Err(e) => return Err(e.into()),
        };
        let record: AccountRecord = serde_json::from_str(&contents)?;
        let verifier = hex(&derive_verifier(&record.salt, password));
        if !bool::from(verifier.as_bytes().ct_eq(record.verifier.as_bytes())) {
            return Err(StoreError::InvalidCredentials);
        }
        Ok(UserIdentity {
            name: record.name,
            email: record.email,
        })
    }

    fn save(&self, user: &UserIdentity, password: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;

        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = hex(&salt_bytes);
        let record = AccountRecord {
            name: user.name.clone(),
            email: user.email.clone(),
            salt: salt.clone(),
            verifier: hex(&derive_verifier(&salt, password)),
        };

        // create_new gives the at-most-one-create-per-name guarantee:
        // the second of two racing registrations fails with AlreadyExists.
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.record_path(&user.name))
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists)
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(serde_json::to_string_pretty(&record)?.as_bytes())?;
        Ok(())
    }
}

fn derive_verifier(salt: &str, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        use std::fmt::Write as _;
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// In-memory store for tests and ephemeral servers. Accounts vanish when
/// the process exits.
#[derive(Default)]
pub struct MemoryStore {
    accounts: parking_lot::RwLock<HashMap<String, (UserIdentity, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account directly, bypassing registration. Test convenience.
    pub fn insert(&self, name: &str, email: &str, password: &str) {
        let identity = UserIdentity {
            name: name.to_string(),
            email: email.to_string(),
        };
        self.accounts
            .write()
            .insert(name.to_string(), (identity, password.to_string()));
    }
}

impl UserStore for MemoryStore {
    fn exists(&self, name: &str) -> bool {
        self.accounts.read().contains_key(name)
    }

    fn load(&self, name: &str, password: &str) -> Result<UserIdentity, StoreError> {
        let accounts = self.accounts.read();
        let (identity, stored) = accounts.get(name).ok_or(StoreError::InvalidCredentials)?;
        if !bool::from(stored.as_bytes().ct_eq(password.as_bytes())) {
            return Err(StoreError::InvalidCredentials);
        }
        Ok(identity.clone())
    }

    fn save(&self, user: &UserIdentity, password: &str) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&user.name) {
            return Err(StoreError::AlreadyExists);
        }
        accounts.insert(user.name.clone(), (user.clone(), password.to_string()));
        Ok(())
    }
}

/// Default on-disk location for account records.
pub fn default_users_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join("sockterm")
        .join("users")
}
