use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;
use crate::provider::CloudProvider;

#[derive(Parser, Debug, Default)]
#[command(
    name = "lazyfn",
    version,
    about = "Terminal dashboard for AWS Lambda and Google Cloud Functions"
)]
pub struct Args {
    /// Cloud provider to browse [default: aws]
    #[arg(long, env = "CLOUD_PROVIDER", value_enum)]
    pub provider: Option<CloudProvider>,

    /// AWS region [default: us-east-1]
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// AWS CLI profile
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// GCP project (falls back to the active gcloud configuration)
    #[arg(long, env = "GCP_PROJECT")]
    pub gcp_project: Option<String>,

    /// GCP location [default: us-central1]
    #[arg(long, env = "GCP_LOCATION")]
    pub gcp_location: Option<String>,

    /// Environment label shown in the header [default: dev]
    #[arg(long = "env", env = "STAGE")]
    pub environment: Option<String>,

    /// Where downloaded function code is extracted [default: ./downloads]
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Log level for the log file (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Overlay values given on the command line or in the environment.
    pub fn apply(&self, config: &mut AppConfig) {
        let provider = &mut config.provider;
        if let Some(p) = self.provider {
            provider.provider = p;
        }
        if let Some(region) = &self.region {
            provider.region.clone_from(region);
        }
        if self.profile.is_some() {
            provider.profile.clone_from(&self.profile);
        }
        if self.gcp_project.is_some() {
            provider.gcp_project.clone_from(&self.gcp_project);
        }
        if let Some(location) = &self.gcp_location {
            provider.gcp_location.clone_from(location);
        }
        if self.environment.is_some() {
            config.environment.clone_from(&self.environment);
        }
        if self.download_dir.is_some() {
            config.download_dir.clone_from(&self.download_dir);
        }
    }

    pub fn log_filter(&self) -> &str {
        if self.verbose { "debug" } else { &self.log_level }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse() {
        let args = Args::try_parse_from([
            "lazyfn",
            "--provider",
            "gcp",
            "--gcp-project",
            "demo-project",
            "--env",
            "prod",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.provider, Some(CloudProvider::Gcp));
        assert_eq!(args.gcp_project.as_deref(), Some("demo-project"));
        assert_eq!(args.environment.as_deref(), Some("prod"));
        assert_eq!(args.log_filter(), "debug");
    }

    #[test]
    fn test_flags_override_file_values_only_when_given() {
        let mut config = AppConfig::default();
        config.provider.region = "eu-central-1".to_string();
        config.environment = Some("staging".to_string());

        let args = Args {
            profile: Some("ops".to_string()),
            log_level: "info".to_string(),
            ..Args::default()
        };
        args.apply(&mut config);
        assert_eq!(config.provider.region, "eu-central-1");
        assert_eq!(config.provider.profile.as_deref(), Some("ops"));
        assert_eq!(config.environment.as_deref(), Some("staging"));

        let args = Args {
            region: Some("ap-south-1".to_string()),
            provider: Some(CloudProvider::Gcp),
            ..Args::default()
        };
        args.apply(&mut config);
        assert_eq!(config.provider.region, "ap-south-1");
        assert_eq!(config.provider.provider, CloudProvider::Gcp);
    }
}
