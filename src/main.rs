use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::config::AppConfig;
use crate::provider::aws::AwsProvider;
use crate::provider::gcp::GcpProvider;
use crate::provider::{CloudProvider, FunctionProvider};
use crate::state::Settings;
use crate::ui::SessionInfo;

mod app;
mod archive;
mod cli;
mod commands;
mod config;
mod input;
mod message;
mod model;
mod provider;
mod search;
mod state;
mod stream;
mod theme;
mod tui;
mod ui;
mod update;

const DEFAULT_ENVIRONMENT: &str = "dev";
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = cli::Args::parse();
    let _guard = initialize_logging(args.log_filter())?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting lazyfn");

    let mut config = config::load()?;
    args.apply(&mut config);

    let (provider, session) = connect(&config)?;
    info!(
        provider = %session.provider,
        region = %session.region,
        environment = %session.environment,
        "Provider ready"
    );

    let download_root = config
        .download_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR));
    let settings = Settings::from_config(&config, download_root);

    let mut app = App::new(provider, &config, settings, session);
    app.run().await
}

/// Build the backend for the configured provider.
fn connect(config: &AppConfig) -> Result<(Arc<dyn FunctionProvider>, SessionInfo)> {
    let settings = &config.provider;
    let environment = config
        .environment
        .clone()
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

    match settings.provider {
        CloudProvider::Aws => {
            let provider = AwsProvider::new(&settings.region, settings.profile.as_deref());
            let session = SessionInfo {
                provider: CloudProvider::Aws,
                region: settings.region.clone(),
                environment,
            };
            Ok((Arc::new(provider), session))
        }
        CloudProvider::Gcp => {
            let (project, location) = match &settings.gcp_project {
                Some(project) => (project.clone(), settings.gcp_location.clone()),
                None => {
                    // Take project and region together from the active gcloud configuration.
                    let gcloud = provider::gcp::config::active_gcloud_config().unwrap_or_default();
                    let project = gcloud.core.project.clone().ok_or_else(|| {
                        eyre!(
                            "No GCP project configured: pass --gcp-project, set GCP_PROJECT, \
                             or run `gcloud config set project`"
                        )
                    })?;
                    let location = gcloud
                        .region()
                        .map_or_else(|| settings.gcp_location.clone(), str::to_string);
                    info!(config = %gcloud.name, %project, "Using active gcloud configuration");
                    (project, location)
                }
            };
            let session = SessionInfo {
                provider: CloudProvider::Gcp,
                region: location.clone(),
                environment,
            };
            Ok((Arc::new(GcpProvider::new(project, location)), session))
        }
    }
}

fn initialize_logging(default_level: &str) -> Result<WorkerGuard> {
    let directory = dirs::data_local_dir().map_or_else(
        || PathBuf::from("logs"),
        |path| path.join("lazyfn").join("logs"),
    );
    std::fs::create_dir_all(&directory)?;

    let file_appender = tracing_appender::rolling::daily(&directory, "lazyfn.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .init();

    Ok(guard)
}
