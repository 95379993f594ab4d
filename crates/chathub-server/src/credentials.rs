//! Persistent username → salted-hash credential store.
//!
//! Mirrors the registry's own locking discipline (§4.2 of the design):
//! every mutation is serialised by a single lock and the full user map
//! is rewritten to disk before the lock is released. The store's lock
//! is never the registry's lock — components must not hold the
//! registry lock while calling into this one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::settings::ServerSettings;

/// Why `register` refused a new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    NameTaken,
    NameTooShort,
    NameTooLong,
    PasswordTooShort,
}

impl RegisterError {
    /// The short, client-facing reason string sent in `REG_FAIL:<reason>`.
    pub fn reason(self) -> &'static str {
        match self {
            Self::NameTaken => "Имя уже занято",
            Self::NameTooShort => "Имя должно быть 2-32 символов",
            Self::NameTooLong => "Имя должно быть 2-32 символов",
            Self::PasswordTooShort => "Пароль минимум 4 символа",
        }
    }
}

/// Why `verify` refused a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    NotFound,
    BadPassword,
}

impl VerifyError {
    pub fn reason(self) -> &'static str {
        match self {
            Self::NotFound => "Пользователь не найден",
            Self::BadPassword => "Неверный пароль",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    password_hash: String,
    created_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserFile {
    #[serde(default)]
    users: HashMap<String, UserRecord>,
}

/// Username → salted-hash map, persisted as JSON.
pub struct CredentialStore {
    path: PathBuf,
    users: Mutex<HashMap<String, UserRecord>>,
    min_username_len: usize,
    max_username_len: usize,
    min_password_len: usize,
}

impl CredentialStore {
    /// Load the store from `path`, tolerating a missing or corrupt file
    /// by starting empty (the file is created on the first mutation).
    /// Username/password length limits are taken from `settings` (§6:
    /// these are configurable, not baked in).
    pub fn load(path: impl Into<PathBuf>, settings: &ServerSettings) -> Self {
        let path = path.into();
        let users = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<UserFile>(&contents) {
                Ok(file) => file.users,
                Err(e) => {
                    warn!(path = %path.display(), "corrupt credential file, starting empty: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            users: Mutex::new(users),
            min_username_len: settings.min_username_len,
            max_username_len: settings.max_username_len,
            min_password_len: settings.min_password_len,
        }
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn register(&self, name: &str, password: &str) -> Result<(), RegisterError> {
        let char_count = name.chars().count();
        if char_count < self.min_username_len {
            return Err(RegisterError::NameTooShort);
        }
        if char_count > self.max_username_len {
            return Err(RegisterError::NameTooLong);
        }
        if password.len() < self.min_password_len {
            return Err(RegisterError::PasswordTooShort);
        }

        let mut users = self.users.lock().unwrap();
        if users.contains_key(name) {
            return Err(RegisterError::NameTaken);
        }

        users.insert(
            name.to_string(),
            UserRecord {
                password_hash: hash_password(password, None),
                created_at: Utc::now().to_rfc3339(),
            },
        );
        self.persist(&users);
        Ok(())
    }

    pub fn verify(&self, name: &str, password: &str) -> Result<(), VerifyError> {
        let users = self.users.lock().unwrap();
        let record = users.get(name).ok_or(VerifyError::NotFound)?;
        if verify_password(password, &record.password_hash) {
            Ok(())
        } else {
            Err(VerifyError::BadPassword)
        }
    }

    fn persist(&self, users: &HashMap<String, UserRecord>) {
        let file = UserFile {
            users: users.clone(),
        };
        match serde_json::to_string_pretty(&file) {
            Ok(json) => {
                if let Err(e) = write_atomic(&self.path, json.as_bytes()) {
                    warn!(path = %self.path.display(), "failed to persist credential store: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize credential store: {}", e),
        }
    }
}

/// Hash `password` with `salt` (a fresh random 16-byte salt if `None`),
/// returning `<salt-hex>$<hash-hex>`.
fn hash_password(password: &str, salt: Option<&str>) -> String {
    let salt_hex = match salt {
        Some(s) => s.to_string(),
        None => {
            let mut salt_bytes = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut salt_bytes);
            to_hex(&salt_bytes)
        }
    };

    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    format!("{salt_hex}${}", to_hex(&digest))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").unwrap();
    }
    out
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Some((salt, _)) = stored_hash.split_once('$') else {
        return false;
    };
    hash_password(password, Some(salt)) == stored_hash
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)
}
