//! Cloud provider backends.
//!
//! Every backend implements [`FunctionProvider`]; the rest of the application
//! only ever talks to `Arc<dyn FunctionProvider>`.

pub mod aws;
pub mod cli;
pub mod gcp;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use serde::{Deserialize, Serialize};

use crate::archive;
use crate::model::{ArchiveRef, FunctionMetrics, FunctionSummary, LogEntry, SourceLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Gcp,
}

impl CloudProvider {
    /// Human-readable display name for the provider.
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Gcp => "GCP",
        }
    }

    /// Short lowercase identifier for the provider.
    pub const fn id(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
        }
    }

    /// Name of the functions product on this provider.
    pub const fn service_name(&self) -> &'static str {
        match self {
            Self::Aws => "Lambda",
            Self::Gcp => "Cloud Functions",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// How far back the static log view reads.
pub const STATIC_LOG_WINDOW_HOURS: i64 = 24;

/// Capability set shared by all cloud backends.
///
/// Every call returns a `Result`; backends never panic on provider errors.
#[async_trait]
pub trait FunctionProvider: Send + Sync {
    fn provider(&self) -> CloudProvider;

    fn region(&self) -> &str;

    /// AWS account id, or the GCP project id.
    async fn account_id(&self) -> Result<String>;

    async fn list_functions(&self) -> Result<Vec<FunctionSummary>>;

    async fn get_function(&self, name: &str) -> Result<FunctionSummary>;

    /// Human-readable description of the function's code and configuration.
    async fn get_function_code(&self, name: &str) -> Result<String>;

    async fn source_location(&self, name: &str) -> Result<SourceLocation>;

    async fn fetch_archive(&self, archive: &ArchiveRef) -> Result<Vec<u8>>;

    /// Up to `limit` of the newest entries at or after `since`, oldest first.
    async fn log_entries(
        &self,
        name: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LogEntry>>;

    async fn get_function_metrics(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FunctionMetrics>;

    /// Formatted log lines from the last 24 hours.
    async fn get_function_logs(&self, name: &str, limit: usize) -> Result<Vec<String>> {
        let since = Utc::now() - Duration::hours(STATIC_LOG_WINDOW_HOURS);
        let entries = self.log_entries(name, since, limit).await?;
        if entries.is_empty() {
            return Ok(vec![format!(
                "No logs found for function: {name} (last {STATIC_LOG_WINDOW_HOURS} hours)"
            )]);
        }
        Ok(entries.iter().map(LogEntry::format_line).collect())
    }

    /// Fetch the function's source into `dest`, replacing what is there.
    ///
    /// `dest` is created before the source is resolved, so it exists even when
    /// the source type cannot be downloaded.
    async fn download_function_code(&self, name: &str, dest: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dest)
            .await
            .wrap_err_with(|| format!("Failed to create {}", dest.display()))?;

        match self.source_location(name).await? {
            SourceLocation::Archive(archive_ref) => {
                tracing::info!(function = name, source = %archive_ref, "Downloading source archive");
                let bytes = self.fetch_archive(&archive_ref).await?;
                let dest = dest.to_path_buf();
                let written =
                    tokio::task::spawn_blocking(move || archive::extract_zip(&bytes, &dest))
                        .await??;
                tracing::info!(function = name, files = written, "Extracted source archive");
                Ok(())
            }
            SourceLocation::Repository { url, deployed_url } => {
                let text = archive::clone_instructions(&url, deployed_url.as_deref());
                tokio::fs::write(dest.join(archive::CLONE_INSTRUCTIONS_FILE), text).await?;
                tracing::info!(function = name, %url, "Wrote clone instructions");
                Ok(())
            }
            SourceLocation::Unsupported(reason) => bail!(reason),
        }
    }
}

/// GET `url` and return the body, failing on non-2xx responses.
pub(crate) async fn http_get_bytes(
    http: &reqwest::Client,
    url: reqwest::Url,
    bearer: Option<&str>,
) -> Result<Vec<u8>> {
    let mut request = http.get(url.clone());
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .wrap_err("Archive download failed")?
        .error_for_status()
        .wrap_err_with(|| format!("Archive download rejected for {}", url.path()))?;
    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
pub mod testing {
    //! Scriptable in-memory provider for tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeProvider {
        pub functions: Vec<FunctionSummary>,
        pub source: Option<SourceLocation>,
        pub archive: Vec<u8>,
        /// Each `log_entries` call pops the next batch; an empty queue yields nothing.
        pub log_batches: Mutex<VecDeque<Result<Vec<LogEntry>>>>,
        pub log_calls: Mutex<Vec<DateTime<Utc>>>,
    }

    impl FakeProvider {
        pub fn with_functions(names: &[&str]) -> Self {
            Self {
                functions: names
                    .iter()
                    .map(|name| FunctionSummary {
                        name: (*name).to_string(),
                        runtime: "python3.12".to_string(),
                        memory_mb: 128,
                        timeout_secs: 3,
                        ..FunctionSummary::default()
                    })
                    .collect(),
                ..Self::default()
            }
        }

        pub fn push_logs(&self, batch: Result<Vec<LogEntry>>) {
            self.log_batches.lock().unwrap().push_back(batch);
        }
    }

    #[async_trait]
    impl FunctionProvider for FakeProvider {
        fn provider(&self) -> CloudProvider {
            CloudProvider::Aws
        }

        fn region(&self) -> &str {
            "us-east-1"
        }

        async fn account_id(&self) -> Result<String> {
            Ok("123456789012".to_string())
        }

        async fn list_functions(&self) -> Result<Vec<FunctionSummary>> {
            Ok(self.functions.clone())
        }

        async fn get_function(&self, name: &str) -> Result<FunctionSummary> {
            match self.functions.iter().find(|f| f.name == name) {
                Some(function) => Ok(function.clone()),
                None => bail!("function {name} not found"),
            }
        }

        async fn get_function_code(&self, name: &str) -> Result<String> {
            Ok(format!("code for {name}"))
        }

        async fn source_location(&self, name: &str) -> Result<SourceLocation> {
            match &self.source {
                Some(source) => Ok(source.clone()),
                None => bail!("no downloadable source found for function {name}"),
            }
        }

        async fn fetch_archive(&self, _archive: &ArchiveRef) -> Result<Vec<u8>> {
            Ok(self.archive.clone())
        }

        async fn log_entries(
            &self,
            _name: &str,
            since: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<LogEntry>> {
            self.log_calls.lock().unwrap().push(since);
            self.log_batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn get_function_metrics(
            &self,
            name: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<FunctionMetrics> {
            Ok(FunctionMetrics {
                function_name: name.to_string(),
                start,
                end,
                series: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::testing::FakeProvider;
    use super::*;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_empty_logs_message() {
        let provider = FakeProvider::default();
        let lines = provider.get_function_logs("fn-a", 200).await.unwrap();
        assert_eq!(
            lines,
            vec!["No logs found for function: fn-a (last 24 hours)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unsupported_source_still_creates_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fn-b");
        let provider = FakeProvider {
            source: Some(SourceLocation::Unsupported(
                "source upload URL type not supported for direct download".to_string(),
            )),
            ..FakeProvider::default()
        };

        let err = provider
            .download_function_code("fn-b", &dest)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
        assert!(dest.is_dir());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_archive_source_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fn-a");
        let provider = FakeProvider {
            source: Some(SourceLocation::Archive(ArchiveRef::Url(
                "https://example.com/a.zip".to_string(),
            ))),
            archive: zip_with(&[("main.py", "print('hi')"), ("lib/util.py", "x = 1")]),
            ..FakeProvider::default()
        };

        provider.download_function_code("fn-a", &dest).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.join("lib/util.py")).unwrap(),
            "x = 1"
        );
    }

    #[tokio::test]
    async fn test_repository_source_writes_instructions() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider {
            source: Some(SourceLocation::Repository {
                url: "https://source.developers.google.com/p/x/r/repo".to_string(),
                deployed_url: None,
            }),
            ..FakeProvider::default()
        };

        provider
            .download_function_code("fn-a", dir.path())
            .await
            .unwrap();
        let text =
            std::fs::read_to_string(dir.path().join(archive::CLONE_INSTRUCTIONS_FILE)).unwrap();
        assert!(text.contains("Repository URL: https://source.developers.google.com/p/x/r/repo"));
    }
}
