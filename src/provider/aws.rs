//! AWS Lambda backend, driven through the `aws` CLI.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use futures::future::try_join_all;
use serde::Deserialize;

use crate::model::{
    ArchiveRef, FunctionMetrics, FunctionSummary, LogEntry, MetricPoint, MetricSeries,
    SourceLocation,
};
use crate::provider::cli::CliRunner;
use crate::provider::{CloudProvider, FunctionProvider, http_get_bytes};

/// CloudWatch aggregation period for metric queries.
const METRIC_PERIOD_SECS: u32 = 300;

struct MetricQuery {
    name: &'static str,
    statistic: &'static str,
    unit: &'static str,
    description: &'static str,
}

const METRICS: &[MetricQuery] = &[
    MetricQuery {
        name: "Invocations",
        statistic: "Sum",
        unit: "count",
        description: "Number of function invocations",
    },
    MetricQuery {
        name: "Duration",
        statistic: "Average",
        unit: "ms",
        description: "Average execution duration",
    },
    MetricQuery {
        name: "Errors",
        statistic: "Sum",
        unit: "count",
        description: "Invocations that resulted in a function error",
    },
    MetricQuery {
        name: "Throttles",
        statistic: "Sum",
        unit: "count",
        description: "Throttled invocation requests",
    },
    MetricQuery {
        name: "ConcurrentExecutions",
        statistic: "Maximum",
        unit: "count",
        description: "Peak concurrently running instances",
    },
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListFunctionsOutput {
    #[serde(default)]
    functions: Vec<FunctionConfiguration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct FunctionConfiguration {
    function_name: String,
    runtime: Option<String>,
    memory_size: Option<u32>,
    timeout: Option<u32>,
    handler: Option<String>,
    last_modified: Option<String>,
    function_arn: Option<String>,
    description: Option<String>,
    role: Option<String>,
    environment: Option<EnvironmentResponse>,
    package_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnvironmentResponse {
    #[serde(default)]
    variables: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetFunctionOutput {
    configuration: FunctionConfiguration,
    code: Option<CodeLocation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CodeLocation {
    repository_type: Option<String>,
    location: Option<String>,
    image_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterLogEventsOutput {
    #[serde(default)]
    events: Vec<FilteredLogEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilteredLogEvent {
    timestamp: i64,
    message: String,
    #[serde(default)]
    log_stream_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricStatisticsOutput {
    #[serde(default)]
    datapoints: Vec<Datapoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Datapoint {
    timestamp: DateTime<Utc>,
    sum: Option<f64>,
    average: Option<f64>,
    maximum: Option<f64>,
}

impl Datapoint {
    fn value(&self, statistic: &str) -> Option<f64> {
        match statistic {
            "Sum" => self.sum,
            "Average" => self.average,
            "Maximum" => self.maximum,
            _ => None,
        }
    }
}

impl FunctionConfiguration {
    fn into_summary(self, region: &str) -> FunctionSummary {
        FunctionSummary {
            name: self.function_name,
            runtime: self.runtime.unwrap_or_default(),
            memory_mb: self.memory_size.unwrap_or_default(),
            timeout_secs: self.timeout.unwrap_or_default(),
            handler: self.handler.unwrap_or_default(),
            last_modified: self.last_modified.unwrap_or_default(),
            resource_id: self.function_arn.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            role: self.role.unwrap_or_default(),
            environment: self.environment.map(|e| e.variables).unwrap_or_default(),
            region: region.to_string(),
        }
    }
}

/// Lambda log lines carry no structured severity; guess it from the text.
fn infer_severity(message: &str) -> &'static str {
    let upper = message.to_uppercase();
    if upper.contains("ERROR") || upper.contains("EXCEPTION") || upper.contains("TRACEBACK") {
        "ERROR"
    } else if upper.contains("WARN") {
        "WARNING"
    } else if upper.contains("DEBUG") {
        "DEBUG"
    } else {
        "INFO"
    }
}

fn log_entry(event: FilteredLogEvent) -> Option<LogEntry> {
    let timestamp = Utc.timestamp_millis_opt(event.timestamp).single()?;
    let mut entry = LogEntry::new(timestamp, infer_severity(&event.message), event.message);
    if let Some(stream) = event.log_stream_name {
        entry.labels.insert("log_stream".to_string(), stream);
    }
    Some(entry)
}

fn source_location(code: Option<CodeLocation>, package_type: Option<&str>) -> SourceLocation {
    let code = code.unwrap_or_default();
    if package_type == Some("Image") || code.repository_type.as_deref() == Some("ECR") {
        return SourceLocation::Unsupported(format!(
            "container image functions cannot be downloaded ({})",
            code.image_uri.as_deref().unwrap_or("image")
        ));
    }
    match code.location {
        Some(url) if !url.is_empty() => SourceLocation::Archive(ArchiveRef::Url(url)),
        _ => SourceLocation::Unsupported("code location not available".to_string()),
    }
}

pub struct AwsProvider {
    cli: CliRunner,
    http: reqwest::Client,
    region: String,
}

impl AwsProvider {
    pub fn new(region: impl Into<String>, profile: Option<&str>) -> Self {
        let region = region.into();
        let mut cli = CliRunner::new("aws")
            .with_global_arg("--region")
            .with_global_arg(region.clone())
            .with_global_arg("--output")
            .with_global_arg("json");
        if let Some(profile) = profile {
            cli = cli.with_global_arg("--profile").with_global_arg(profile);
        }
        Self {
            cli,
            http: reqwest::Client::new(),
            region,
        }
    }

    async fn get_function_raw(&self, name: &str) -> Result<GetFunctionOutput> {
        self.cli
            .json(&["lambda", "get-function", "--function-name", name])
            .await
    }

    async fn metric_series(
        &self,
        function: &str,
        query: &MetricQuery,
        start: &str,
        end: &str,
    ) -> Result<MetricSeries> {
        let dimensions = format!("Name=FunctionName,Value={function}");
        let period = METRIC_PERIOD_SECS.to_string();
        let output: MetricStatisticsOutput = self
            .cli
            .json(&[
                "cloudwatch",
                "get-metric-statistics",
                "--namespace",
                "AWS/Lambda",
                "--metric-name",
                query.name,
                "--dimensions",
                &dimensions,
                "--start-time",
                start,
                "--end-time",
                end,
                "--period",
                &period,
                "--statistics",
                query.statistic,
            ])
            .await?;

        let points = output.datapoints.iter().filter_map(|d| {
            d.value(query.statistic).map(|value| MetricPoint {
                timestamp: d.timestamp,
                value,
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

#[async_trait]
impl FunctionProvider for AwsProvider {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Aws
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn account_id(&self) -> Result<String> {
        let identity: CallerIdentity = self.cli.json(&["sts", "get-caller-identity"]).await?;
        Ok(identity.account)
    }

    async fn list_functions(&self) -> Result<Vec<FunctionSummary>> {
        let output: ListFunctionsOutput = self.cli.json(&["lambda", "list-functions"]).await?;
        tracing::info!(count = output.functions.len(), "Listed Lambda functions");
        Ok(output
            .functions
            .into_iter()
            .map(|f| f.into_summary(&self.region))
            .collect())
    }

    async fn get_function(&self, name: &str) -> Result<FunctionSummary> {
        let config: FunctionConfiguration = self
            .cli
            .json(&["lambda", "get-function-configuration", "--function-name", name])
            .await?;
        Ok(config.into_summary(&self.region))
    }

    async fn get_function_code(&self, name: &str) -> Result<String> {
        let output = self.get_function_raw(name).await?;
        let config = &output.configuration;
        let mut info = String::new();
        let _ = writeln!(info, "━━━ Code Information ━━━\n");
        let _ = writeln!(info, "Runtime: {}", config.runtime.as_deref().unwrap_or("-"));
        let _ = writeln!(info, "Handler: {}", config.handler.as_deref().unwrap_or("-"));
        let _ = writeln!(
            info,
            "Package Type: {}\n",
            config.package_type.as_deref().unwrap_or("Zip")
        );
        let _ = writeln!(
            info,
            "Memory: {} MB",
            config.memory_size.unwrap_or_default()
        );
        let _ = writeln!(info, "Timeout: {}s\n", config.timeout.unwrap_or_default());

        if let Some(env) = config.environment.as_ref().filter(|e| !e.variables.is_empty()) {
            let _ = writeln!(info, "━━━ Environment Variables ━━━\n");
            for (key, value) in &env.variables {
                let _ = writeln!(info, "{key}={value}");
            }
            info.push('\n');
        }

        let package_type = config.package_type.clone();
        let _ = writeln!(info, "━━━ Source ━━━\n");
        match source_location(output.code, package_type.as_deref()) {
            SourceLocation::Archive(archive) => {
                let _ = writeln!(info, "Source Type: Deployment package (S3)");
                let _ = writeln!(info, "Location: {archive}");
                let _ = writeln!(
                    info,
                    "\nDownload the package from the function list to browse its files."
                );
            }
            SourceLocation::Repository { url, .. } => {
                let _ = writeln!(info, "Repository: {url}");
            }
            SourceLocation::Unsupported(reason) => {
                let _ = writeln!(info, "Source not downloadable: {reason}");
            }
        }
        Ok(info)
    }

    async fn source_location(&self, name: &str) -> Result<SourceLocation> {
        let output = self.get_function_raw(name).await?;
        let package_type = output.configuration.package_type.clone();
        Ok(source_location(output.code, package_type.as_deref()))
    }

    async fn fetch_archive(&self, archive: &ArchiveRef) -> Result<Vec<u8>> {
        match archive {
            ArchiveRef::Url(url) => {
                let url = reqwest::Url::parse(url).wrap_err("Invalid code location URL")?;
                http_get_bytes(&self.http, url, None).await
            }
            ArchiveRef::Gcs { .. } => bail!("Cloud Storage archives are not reachable from AWS"),
        }
    }

    async fn log_entries(
        &self,
        name: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let group = format!("/aws/lambda/{name}");
        let start = since.timestamp_millis().to_string();
        let result: Result<FilterLogEventsOutput> = self
            .cli
            .json(&[
                "logs",
                "filter-log-events",
                "--log-group-name",
                &group,
                "--start-time",
                &start,
            ])
            .await;

        let output = match result {
            Ok(output) => output,
            // The group only exists after the first invocation.
            Err(err) if err.to_string().contains("ResourceNotFoundException") => {
                tracing::debug!(group, "Log group does not exist yet");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut entries: Vec<LogEntry> = output.events.into_iter().filter_map(log_entry).collect();
        entries.sort_by_key(|e| e.timestamp);
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }

    async fn get_function_metrics(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FunctionMetrics> {
        let start_text = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_text = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let series = try_join_all(
            METRICS
                .iter()
                .map(|query| self.metric_series(name, query, &start_text, &end_text)),
        )
        .await
        .wrap_err_with(|| format!("Failed to fetch CloudWatch metrics for {name}"))?;

        Ok(FunctionMetrics {
            function_name: name.to_string(),
            start,
            end,
            series,
        })
    }
}
