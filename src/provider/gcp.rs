//! Google Cloud Functions backend, driven through the `gcloud` CLI.
//!
//! Listing, describing and log reads go through `gcloud`; archive downloads
//! and Cloud Monitoring queries use the REST APIs with a bearer token minted by
//! `gcloud auth print-access-token`.

pub mod config;

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail, eyre};
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::Value;

use crate::model::{
    ArchiveRef, FunctionMetrics, FunctionSummary, LogEntry, MetricPoint, MetricSeries,
    SourceLocation,
};
use crate::provider::cli::CliRunner;
use crate::provider::{CloudProvider, FunctionProvider, http_get_bytes};

const MONITORING_URL: &str = "https://monitoring.googleapis.com/v3";
const STORAGE_URL: &str = "https://storage.googleapis.com/storage/v1/b/";
const ALIGNMENT_PERIOD: &str = "300s";

struct MetricQuery {
    metric_type: &'static str,
    name: &'static str,
    aligner: &'static str,
    unit: &'static str,
    description: &'static str,
    /// Multiplier applied to raw values to reach `unit`.
    scale: f64,
}

const METRICS: &[MetricQuery] = &[
    MetricQuery {
        metric_type: "cloudfunctions.googleapis.com/function/execution_count",
        name: "Executions",
        aligner: "ALIGN_SUM",
        unit: "count",
        description: "Function executions",
        scale: 1.0,
    },
    MetricQuery {
        metric_type: "cloudfunctions.googleapis.com/function/execution_times",
        name: "Execution time",
        aligner: "ALIGN_PERCENTILE_50",
        unit: "ms",
        description: "Median execution time",
        scale: 1e-6,
    },
    MetricQuery {
        metric_type: "cloudfunctions.googleapis.com/function/user_memory_bytes",
        name: "Memory",
        aligner: "ALIGN_PERCENTILE_50",
        unit: "MB",
        description: "Median memory usage",
        scale: 1.0 / (1024.0 * 1024.0),
    },
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CloudFunction {
    name: String,
    description: Option<String>,
    entry_point: Option<String>,
    runtime: Option<String>,
    available_memory_mb: Option<u32>,
    /// Duration string such as `"60s"`.
    timeout: Option<String>,
    update_time: Option<String>,
    service_account_email: Option<String>,
    environment_variables: BTreeMap<String, String>,
    source_archive_url: Option<String>,
    source_repository: Option<SourceRepository>,
    source_upload_url: Option<String>,
    https_trigger: Option<HttpsTrigger>,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SourceRepository {
    url: String,
    deployed_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HttpsTrigger {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcloudLogEntry {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    text_payload: Option<String>,
    #[serde(default)]
    json_payload: Option<Value>,
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TimeSeriesResponse {
    time_series: Vec<TimeSeries>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimeSeries {
    points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct Point {
    interval: Interval,
    value: TypedValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Interval {
    end_time: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TypedValue {
    /// int64 values are JSON strings.
    int64_value: Option<String>,
    double_value: Option<f64>,
    distribution_value: Option<Distribution>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Distribution {
    mean: Option<f64>,
}

impl TypedValue {
    fn as_f64(&self) -> Option<f64> {
        self.double_value
            .or_else(|| self.int64_value.as_deref().and_then(|v| v.parse().ok()))
            .or_else(|| self.distribution_value.as_ref().and_then(|d| d.mean))
    }
}

/// `projects/p/locations/l/functions/name` -> `name`.
fn short_name(full: &str) -> &str {
    full.rsplit('/').next().unwrap_or(full)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_timeout_secs(timeout: Option<&str>) -> u32 {
    timeout
        .and_then(|t| t.trim_end_matches('s').parse::<f64>().ok())
        .map_or(0, |secs| secs.round() as u32)
}

impl CloudFunction {
    fn to_summary(&self, region: &str) -> FunctionSummary {
        FunctionSummary {
            name: short_name(&self.name).to_string(),
            runtime: self.runtime.clone().unwrap_or_default(),
            memory_mb: self.available_memory_mb.unwrap_or_default(),
            timeout_secs: parse_timeout_secs(self.timeout.as_deref()),
            handler: self.entry_point.clone().unwrap_or_default(),
            last_modified: self.update_time.clone().unwrap_or_default(),
            resource_id: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            role: self.service_account_email.clone().unwrap_or_default(),
            environment: self.environment_variables.clone(),
            region: region.to_string(),
        }
    }

    fn source_location(&self, name: &str) -> SourceLocation {
        if let Some(url) = self.source_archive_url.as_deref().filter(|u| !u.is_empty()) {
            return match ArchiveRef::parse_gcs(url) {
                Some(archive) => SourceLocation::Archive(archive),
                None => SourceLocation::Unsupported(format!("unrecognized archive URL: {url}")),
            };
        }
        if let Some(repo) = &self.source_repository {
            return SourceLocation::Repository {
                url: repo.url.clone(),
                deployed_url: repo.deployed_url.clone().filter(|u| !u.is_empty()),
            };
        }
        if self.source_upload_url.as_deref().is_some_and(|u| !u.is_empty()) {
            return SourceLocation::Unsupported(
                "source upload URL type not supported for direct download".to_string(),
            );
        }
        SourceLocation::Unsupported(format!("no downloadable source found for function {name}"))
    }
}

impl GcloudLogEntry {
    fn into_entry(self) -> LogEntry {
        let message = self.text_payload.unwrap_or_else(|| match self.json_payload {
            Some(Value::Object(map)) => match map.get("message") {
                Some(Value::String(message)) => message.clone(),
                _ => Value::Object(map).to_string(),
            },
            Some(other) => other.to_string(),
            None => String::new(),
        });
        let mut entry = LogEntry::new(
            self.timestamp,
            self.severity.unwrap_or_else(|| "DEFAULT".to_string()),
            message,
        );
        entry.labels = self.labels;
        entry
    }
}

pub struct GcpProvider {
    cli: CliRunner,
    http: reqwest::Client,
    project: String,
    location: String,
}

impl GcpProvider {
    pub fn new(project: impl Into<String>, location: impl Into<String>) -> Self {
        let project = project.into();
        Self {
            cli: CliRunner::new("gcloud")
                .with_global_arg("--project")
                .with_global_arg(project.clone())
                .with_global_arg("--format")
                .with_global_arg("json"),
            http: reqwest::Client::new(),
            project,
            location: location.into(),
        }
    }

    async fn describe(&self, name: &str) -> Result<CloudFunction> {
        self.cli
            .json(&["functions", "describe", name, "--region", &self.location])
            .await
    }

    async fn access_token(&self) -> Result<String> {
        let token = CliRunner::new(self.cli.program())
            .output(&["auth", "print-access-token"])
            .await?;
        Ok(token.trim().to_string())
    }

    async fn metric_series(
        &self,
        function: &str,
        query: &MetricQuery,
        start: &str,
        end: &str,
        token: &str,
    ) -> Result<MetricSeries> {
        let filter = format!(
            r#"metric.type="{}" AND resource.labels.function_name="{function}""#,
            query.metric_type
        );
        let url = format!("{MONITORING_URL}/projects/{}/timeSeries", self.project);
        let response: TimeSeriesResponse = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("filter", filter.as_str()),
                ("interval.startTime", start),
                ("interval.endTime", end),
                ("aggregation.alignmentPeriod", ALIGNMENT_PERIOD),
                ("aggregation.perSeriesAligner", query.aligner),
            ])
            .send()
            .await?
            .error_for_status()
            .wrap_err_with(|| format!("Cloud Monitoring rejected {} query", query.name))?
            .json()
            .await?;

        let points = response
            .time_series
            .iter()
            .flat_map(|series| &series.points)
            .filter_map(|p| {
                p.value.as_f64().map(|value| MetricPoint {
                    timestamp: p.interval.end_time,
                    value: value * query.scale,
                })
            });
        Ok(MetricSeries::new(
            query.name,
            query.unit,
            query.description,
            points,
        ))
    }
}

fn write_code_info(info: &mut String, function: &CloudFunction, name: &str) {
    let _ = writeln!(info, "━━━ Code Information ━━━\n");
    let _ = writeln!(info, "Runtime: {}", function.runtime.as_deref().unwrap_or("-"));
    let _ = writeln!(
        info,
        "Entry Point: {}\n",
        function.entry_point.as_deref().unwrap_or("-")
    );

    let _ = writeln!(info, "━━━ Source ━━━\n");
    match function.source_location(name) {
        SourceLocation::Archive(archive) => {
            let _ = writeln!(info, "Source Type: Cloud Storage archive");
            let _ = writeln!(info, "Archive URL: {archive}");
        }
        SourceLocation::Repository { url, deployed_url } => {
            let _ = writeln!(info, "Source Type: Cloud Source Repository");
            let _ = writeln!(info, "Repository URL: {url}");
            if let Some(deployed) = deployed_url {
                let _ = writeln!(info, "Deployed URL: {deployed}");
            }
        }
        SourceLocation::Unsupported(reason) => {
            let _ = writeln!(info, "Source not downloadable: {reason}");
        }
    }

    let _ = writeln!(info, "\n━━━ Configuration ━━━\n");
    let _ = writeln!(
        info,
        "Memory: {} MB",
        function.available_memory_mb.unwrap_or_default()
    );
    let _ = writeln!(info, "Timeout: {}", function.timeout.as_deref().unwrap_or("-"));
    if let Some(status) = &function.status {
        let _ = writeln!(info, "Status: {status}");
    }
    if let Some(url) = function.https_trigger.as_ref().and_then(|t| t.url.as_deref()) {
        let _ = writeln!(info, "Trigger URL: {url}");
    }

    if !function.environment_variables.is_empty() {
        let _ = writeln!(info, "\n━━━ Environment Variables ━━━\n");
        for (key, value) in &function.environment_variables {
            let _ = writeln!(info, "{key}={value}");
        }
    }
}

#[async_trait]
impl FunctionProvider for GcpProvider {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Gcp
    }

    fn region(&self) -> &str {
        &self.location
    }

    async fn account_id(&self) -> Result<String> {
        Ok(self.project.clone())
    }

    async fn list_functions(&self) -> Result<Vec<FunctionSummary>> {
        let functions: Vec<CloudFunction> = self
            .cli
            .json(&["functions", "list", "--regions", &self.location])
            .await?;
        tracing::info!(count = functions.len(), project = %self.project, "Listed Cloud Functions");
        Ok(functions
            .iter()
            .map(|f| f.to_summary(&self.location))
            .collect())
    }

    async fn get_function(&self, name: &str) -> Result<FunctionSummary> {
        Ok(self.describe(name).await?.to_summary(&self.location))
    }

    async fn get_function_code(&self, name: &str) -> Result<String> {
        let function = self.describe(name).await?;
        let mut info = String::new();
        write_code_info(&mut info, &function, name);
        Ok(info)
    }

    async fn source_location(&self, name: &str) -> Result<SourceLocation> {
        Ok(self.describe(name).await?.source_location(name))
    }

    async fn fetch_archive(&self, archive: &ArchiveRef) -> Result<Vec<u8>> {
        let ArchiveRef::Gcs { bucket, object } = archive else {
            bail!("unsupported archive reference for GCP: {archive}");
        };
        let mut url = reqwest::Url::parse(STORAGE_URL)?;
        url.path_segments_mut()
            .map_err(|()| eyre!("Invalid storage URL"))?
            .pop_if_empty()
            .push(bucket)
            .push("o")
            .push(object);
        url.query_pairs_mut().append_pair("alt", "media");

        let token = self.access_token().await?;
        http_get_bytes(&self.http, url, Some(&token)).await
    }

    async fn log_entries(
        &self,
        name: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let filter = format!(
            r#"resource.type="cloud_function" AND resource.labels.function_name="{name}" AND timestamp>="{}""#,
            since.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        let limit = limit.to_string();
        let raw: Vec<GcloudLogEntry> = self
            .cli
            .json(&["logging", "read", &filter, "--limit", &limit, "--order", "desc"])
            .await?;

        let mut entries: Vec<LogEntry> = raw.into_iter().map(GcloudLogEntry::into_entry).collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    async fn get_function_metrics(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FunctionMetrics> {
        let token = self.access_token().await?;
        let start_text = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_text = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let series = try_join_all(
            METRICS
                .iter()
                .map(|q| self.metric_series(name, q, &start_text, &end_text, &token)),
        )
        .await
        .wrap_err_with(|| format!("Failed to fetch Cloud Monitoring metrics for {name}"))?;

        Ok(FunctionMetrics {
            function_name: name.to_string(),
            start,
            end,
            series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(json: &str) -> CloudFunction {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_describe_to_summary() {
        let f = function(
            r#"{
                "name": "projects/acme/locations/us-central1/functions/resize-images",
                "runtime": "nodejs20",
                "entryPoint": "resize",
                "availableMemoryMb": 256,
                "timeout": "60s",
                "updateTime": "2024-04-01T12:00:00Z",
                "serviceAccountEmail": "acme@appspot.gserviceaccount.com",
                "environmentVariables": {"BUCKET": "images"}
            }"#,
        );
        let summary = f.to_summary("us-central1");
        assert_eq!(summary.name, "resize-images");
        assert_eq!(summary.memory_mb, 256);
        assert_eq!(summary.timeout_secs, 60);
        assert_eq!(summary.handler, "resize");
        assert_eq!(
            summary.resource_id,
            "projects/acme/locations/us-central1/functions/resize-images"
        );
    }

    #[test]
    fn test_source_location_variants() {
        let archive = function(r#"{"name": "f", "sourceArchiveUrl": "gs://bucket/src/f.zip"}"#);
        assert_eq!(
            archive.source_location("f"),
            SourceLocation::Archive(ArchiveRef::Gcs {
                bucket: "bucket".to_string(),
                object: "src/f.zip".to_string(),
            })
        );

        let repo = function(
            r#"{"name": "f", "sourceRepository": {"url": "https://source.developers.google.com/x", "deployedUrl": ""}}"#,
        );
        assert_eq!(
            repo.source_location("f"),
            SourceLocation::Repository {
                url: "https://source.developers.google.com/x".to_string(),
                deployed_url: None,
            }
        );

        let upload = function(r#"{"name": "f", "sourceUploadUrl": "https://upload"}"#);
        assert_eq!(
            upload.source_location("f"),
            SourceLocation::Unsupported(
                "source upload URL type not supported for direct download".to_string()
            )
        );

        let nothing = function(r#"{"name": "f"}"#);
        assert_eq!(
            nothing.source_location("f"),
            SourceLocation::Unsupported("no downloadable source found for function f".to_string())
        );
    }

    #[test]
    fn test_log_payloads() {
        let raw: Vec<GcloudLogEntry> = serde_json::from_str(
            r#"[
                {"timestamp": "2024-04-01T12:00:01.5Z", "severity": "ERROR", "textPayload": "boom"},
                {"timestamp": "2024-04-01T12:00:00Z", "jsonPayload": {"message": "structured"}},
                {"timestamp": "2024-04-01T12:00:02Z", "severity": "INFO", "jsonPayload": {"n": 1}}
            ]"#,
        )
        .unwrap();
        let entries: Vec<_> = raw.into_iter().map(GcloudLogEntry::into_entry).collect();
        assert_eq!(entries[0].message, "boom");
        assert_eq!(entries[1].message, "structured");
        assert_eq!(entries[1].severity, "DEFAULT");
        assert_eq!(entries[2].message, r#"{"n":1}"#);
    }

    #[test]
    fn test_typed_values() {
        let response: TimeSeriesResponse = serde_json::from_str(
            r#"{"timeSeries": [{"points": [
                {"interval": {"endTime": "2024-04-01T12:05:00Z"}, "value": {"int64Value": "7"}},
                {"interval": {"endTime": "2024-04-01T12:00:00Z"}, "value": {"doubleValue": 1.5}},
                {"interval": {"endTime": "2024-04-01T11:55:00Z"}, "value": {"distributionValue": {"mean": 2.0}}}
            ]}]}"#,
        )
        .unwrap();
        let values: Vec<_> = response.time_series[0]
            .points
            .iter()
            .filter_map(|p| p.value.as_f64())
            .collect();
        assert_eq!(values, vec![7.0, 1.5, 2.0]);
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout_secs(Some("540s")), 540);
        assert_eq!(parse_timeout_secs(Some("3.5s")), 4);
        assert_eq!(parse_timeout_secs(None), 0);
    }
}
