use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;

use crate::config::AppConfig;

const CONFIG_DIR: &str = "lazyfn";
const CONFIG_FILE: &str = "config.toml";

pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(CONFIG_DIR))
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Load the user config, falling back to defaults when there is none.
pub fn load() -> color_eyre::Result<AppConfig> {
    let Some(path) = config_path() else {
        tracing::debug!("No config directory found, using defaults");
        return Ok(AppConfig::default());
    };
    load_from(&path)
}

pub fn load_from(path: &Path) -> color_eyre::Result<AppConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .wrap_err_with(|| format!("Invalid config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.streaming.buffer_capacity, 1000);
        assert_eq!(config.logs.limit, 200);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
            download_dir = "/tmp/fns"

            [provider]
            provider = "gcp"
            gcp_project = "acme"

            [streaming]
            poll_interval_ms = 500
            "#,
        )
        .unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.download_dir, Some(PathBuf::from("/tmp/fns")));
        assert_eq!(config.provider.gcp_project.as_deref(), Some("acme"));
        assert_eq!(config.streaming.poll_interval_ms, 500);
        assert_eq!(config.streaming.lookback_secs, 60);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "streaming = 3").unwrap();
        assert!(load_from(&path).is_err());
    }
}
