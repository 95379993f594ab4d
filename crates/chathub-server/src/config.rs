use serde::Deserialize;

/// Server configuration, loaded from a TOML file and overridable by CLI
/// flags (see `main.rs`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind both listeners on (default "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port for the text control plane.
    #[serde(default = "default_text_port")]
    pub text_port: u16,

    /// TCP port for the voice data plane.
    #[serde(default = "default_voice_port")]
    pub voice_port: u16,

    /// Path to the persisted credential store.
    #[serde(default = "default_users_file")]
    pub users_file: String,

    /// Path to the persisted channel registry.
    #[serde(default = "default_channels_file")]
    pub channels_file: String,

    /// Path to the runtime settings file (see `settings.rs`). Optional —
    /// when absent, built-in defaults apply.
    pub settings_file: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_text_port() -> u16 {
    5557
}

fn default_voice_port() -> u16 {
    5556
}

fn default_users_file() -> String {
    "users.json".into()
}

fn default_channels_file() -> String {
    "channels.json".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            text_port: default_text_port(),
            voice_port: default_voice_port(),
            users_file: default_users_file(),
            channels_file: default_channels_file(),
            settings_file: None,
        }
    }
}
