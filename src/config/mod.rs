pub mod actions;
pub mod key;
pub mod keybindings;
pub mod loader;
pub mod resolver;

use std::path::PathBuf;
use std::time::Duration;

pub use actions::Action;
use keybindings::KeybindingsConfig;
pub use loader::load;
pub use resolver::KeyResolver;
use serde::{Deserialize, Serialize};

use crate::provider::CloudProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    pub name: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            name: "Catppuccin Mocha".to_string(),
        }
    }
}

/// Provider defaults. Command-line flags and environment variables win.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider: CloudProvider,
    pub region: String,
    pub profile: Option<String>,
    pub gcp_project: Option<String>,
    pub gcp_location: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: CloudProvider::Aws,
            region: "us-east-1".to_string(),
            profile: None,
            gcp_project: None,
            gcp_location: "us-central1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub poll_interval_ms: u64,
    /// How far before "now" a new session starts reading.
    pub lookback_secs: u64,
    pub buffer_capacity: usize,
}

impl StreamingConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            lookback_secs: 60,
            buffer_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub limit: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self { limit: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub keybindings: KeybindingsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}
