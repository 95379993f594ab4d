//! Persistent, ordered channel registry.
//!
//! Insertion order is the iteration order, and it survives restarts — a
//! freshly created store seeds itself with a single permanent `General`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::settings::ServerSettings;

pub const GENERAL_CHANNEL: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    Empty,
    TooLong,
    AlreadyExists,
}

impl CreateError {
    pub fn reason(self) -> &'static str {
        match self {
            Self::Empty => "Имя канала не может быть пустым",
            Self::TooLong => "Имя канала максимум 32 символа",
            Self::AlreadyExists => "Канал уже существует",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteError {
    NotFound,
    Permanent,
}

impl DeleteError {
    pub fn reason(self) -> &'static str {
        match self {
            Self::NotFound => "Канал не найден",
            Self::Permanent => "Нельзя удалить постоянный канал",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChannelRecord {
    name: String,
    permanent: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChannelFile {
    #[serde(default)]
    channels: Vec<ChannelRecord>,
}

/// Ordered list of channels, persisted as JSON.
pub struct ChannelRegistry {
    path: PathBuf,
    channels: Mutex<Vec<ChannelRecord>>,
    max_channel_name_len: usize,
}

impl ChannelRegistry {
    /// Load the registry from `path`. If the file is missing, corrupt, or
    /// empty, it is (re)seeded with a single permanent `General` channel.
    /// The channel-name length cap is taken from `settings` (§6: it is
    /// configurable, not baked in).
    pub fn load(path: impl Into<PathBuf>, settings: &ServerSettings) -> Self {
        let path = path.into();
        let mut channels = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<ChannelFile>(&contents) {
                Ok(file) => file.channels,
                Err(e) => {
                    warn!(path = %path.display(), "corrupt channel file, reseeding: {}", e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        let registry = Self {
            path,
            channels: Mutex::new(Vec::new()),
            max_channel_name_len: settings.max_channel_name_len,
        };

        if channels.is_empty() {
            channels.push(ChannelRecord {
                name: GENERAL_CHANNEL.to_string(),
                permanent: true,
            });
            registry.persist(&channels);
        }
        *registry.channels.lock().unwrap() = channels;
        registry
    }

    pub fn list(&self) -> Vec<String> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.channels.lock().unwrap().iter().any(|c| c.name == name)
    }

    pub fn create(&self, name: &str) -> Result<(), CreateError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CreateError::Empty);
        }
        if name.chars().count() > self.max_channel_name_len {
            return Err(CreateError::TooLong);
        }

        let mut channels = self.channels.lock().unwrap();
        if channels.iter().any(|c| c.name == name) {
            return Err(CreateError::AlreadyExists);
        }

        channels.push(ChannelRecord {
            name: name.to_string(),
            permanent: false,
        });
        self.persist(&channels);
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), DeleteError> {
        let mut channels = self.channels.lock().unwrap();
        let Some(idx) = channels.iter().position(|c| c.name == name) else {
            return Err(DeleteError::NotFound);
        };
        if channels[idx].permanent {
            return Err(DeleteError::Permanent);
        }
        channels.remove(idx);
        self.persist(&channels);
        Ok(())
    }

    fn persist(&self, channels: &[ChannelRecord]) {
        let file = ChannelFile {
            channels: channels.to_vec(),
        };
        match serde_json::to_string_pretty(&file) {
            Ok(json) => {
                if let Err(e) = write_atomic(&self.path, json.as_bytes()) {
                    warn!(path = %self.path.display(), "failed to persist channel registry: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize channel registry: {}", e),
        }
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)
}
