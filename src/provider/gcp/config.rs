use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, error};

/// The parts of a gcloud CLI configuration lazyfn cares about.
#[derive(Debug, Default, Deserialize)]
pub struct GcloudConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub core: GcloudCoreConfig,
    #[serde(default)]
    pub compute: GcloudComputeConfig,
    #[serde(default)]
    pub functions: GcloudFunctionsConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct GcloudCoreConfig {
    pub account: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GcloudComputeConfig {
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GcloudFunctionsConfig {
    pub region: Option<String>,
}

impl GcloudConfig {
    /// Region for Cloud Functions, preferring the functions-specific setting.
    pub fn region(&self) -> Option<&str> {
        self.functions
            .region
            .as_deref()
            .or(self.compute.region.as_deref())
    }
}

/// Location of gcloud's configuration directory.
///
///  - Linux/Mac: `~/.config/gcloud`
///  - Windows: `%APPDATA%\gcloud`
fn gcloud_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    let base = dirs::home_dir().map(|dir| dir.join(".config"));

    #[cfg(not(target_os = "macos"))]
    let base = dirs::config_dir();

    base.map(|dir| dir.join("gcloud"))
}

/// Load the currently active gcloud configuration, if any.
pub fn active_gcloud_config() -> Option<GcloudConfig> {
    let Some(dir) = gcloud_dir() else {
        error!("Could not determine config directory for gcloud config");
        return None;
    };
    load_active_config(&dir)
}

/// Read `active_config` in `dir` and parse the named configuration.
pub fn load_active_config(dir: &Path) -> Option<GcloudConfig> {
    let active = fs::read_to_string(dir.join("active_config"))
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|_| "default".to_string());

    let path = dir
        .join("configurations")
        .join(format!("config_{active}"));
    debug!(path = %path.display(), "Reading active gcloud configuration");

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            debug!(path = %path.display(), %err, "No active gcloud configuration");
            return None;
        }
    };

    match serini::from_str::<GcloudConfig>(&content) {
        Ok(mut config) => {
            config.name = active;
            debug!(name = %config.name, project = ?config.core.project, "Discovered gcloud config");
            Some(config)
        }
        Err(err) => {
            error!(path = %path.display(), %err, "Failed to parse gcloud config file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_active_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("configurations")).unwrap();
        fs::write(dir.path().join("active_config"), "work\n").unwrap();
        fs::write(
            dir.path().join("configurations").join("config_work"),
            "[core]\naccount = dev@example.com\nproject = acme-prod\n\n[compute]\nregion = europe-west1\n",
        )
        .unwrap();

        let config = load_active_config(dir.path()).unwrap();
        assert_eq!(config.name, "work");
        assert_eq!(config.core.project.as_deref(), Some("acme-prod"));
        assert_eq!(config.region(), Some("europe-west1"));
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_active_config(dir.path()).is_none());
    }
}
