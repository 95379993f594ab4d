use std::path::Path;

use serde::{Deserialize, Serialize};

/// Runtime tunables that aren't identity-bearing enough to belong in
/// `ServerConfig` — loaded from JSON, reloadable in spirit even though
/// nothing currently watches the file for changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_min_username_len")]
    pub min_username_len: usize,

    #[serde(default = "default_max_username_len")]
    pub max_username_len: usize,

    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,

    #[serde(default = "default_max_channel_name_len")]
    pub max_channel_name_len: usize,

    /// Largest accepted `total_payload_length` on the voice plane.
    #[serde(default = "default_max_voice_frame")]
    pub max_voice_frame: u32,

    /// Largest accepted voice-handshake username, in bytes.
    #[serde(default = "default_max_voice_handshake")]
    pub max_voice_handshake: usize,
}

fn default_min_username_len() -> usize {
    2
}
fn default_max_username_len() -> usize {
    32
}
fn default_min_password_len() -> usize {
    4
}
fn default_max_channel_name_len() -> usize {
    32
}
fn default_max_voice_frame() -> u32 {
    65_536
}
fn default_max_voice_handshake() -> usize {
    1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            min_username_len: default_min_username_len(),
            max_username_len: default_max_username_len(),
            min_password_len: default_min_password_len(),
            max_channel_name_len: default_max_channel_name_len(),
            max_voice_frame: default_max_voice_frame(),
            max_voice_handshake: default_max_voice_handshake(),
        }
    }
}

impl ServerSettings {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_values() {
        let settings = ServerSettings::default();
        assert_eq!(settings.min_username_len, 2);
        assert_eq!(settings.max_username_len, 32);
        assert_eq!(settings.min_password_len, 4);
        assert_eq!(settings.max_channel_name_len, 32);
        assert_eq!(settings.max_voice_frame, 65_536);
    }

    #[test]
    fn settings_json_deserialization() {
        let json = r#"{
            "min_username_len": 3,
            "max_username_len": 16,
            "min_password_len": 8,
            "max_channel_name_len": 64,
            "max_voice_frame": 32768,
            "max_voice_handshake": 512
        }"#;
        let settings: ServerSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.min_username_len, 3);
        assert_eq!(settings.max_voice_frame, 32_768);
        assert_eq!(settings.max_voice_handshake, 512);
    }

    #[test]
    fn settings_json_partial_uses_defaults() {
        let json = r#"{"max_channels_unused": true}"#;
        let settings: ServerSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.min_username_len, 2);
        assert_eq!(settings.max_voice_frame, 65_536);
    }
}
