//! Domain models for lazyfn.
//!
//! These types are what the providers hand back to the UI:
//! - [`FunctionSummary`] - one deployed function and its configuration
//! - [`LogEntry`] - a single structured log line
//! - [`MetricSeries`] / [`FunctionMetrics`] - time series for the metrics view
//! - [`SourceLocation`] - where a function's packaged source can be fetched from
//!
//! Everything here is immutable once received; a refresh replaces values wholesale.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};

/// Timestamp format used for every human-readable log line.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A deployed serverless function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionSummary {
    /// Unique within a provider + region scope.
    pub name: String,
    pub runtime: String,
    pub memory_mb: u32,
    pub timeout_secs: u32,
    pub handler: String,
    /// Provider-native format, displayed verbatim.
    pub last_modified: String,
    /// ARN on AWS, fully-qualified resource name on GCP.
    pub resource_id: String,
    pub description: String,
    pub role: String,
    pub environment: BTreeMap<String, String>,
    pub region: String,
}

impl FunctionSummary {
    /// Labelled fields shown at the top of the detail view, in order.
    pub fn detail_fields(&self) -> [(&'static str, String); 10] {
        [
            ("Name", self.name.clone()),
            ("Runtime", self.runtime.clone()),
            ("Handler", self.handler.clone()),
            ("Memory", format!("{} MB", self.memory_mb)),
            ("Timeout", format!("{} seconds", self.timeout_secs)),
            ("Last Modified", self.last_modified.clone()),
            ("Region", self.region.clone()),
            ("Resource", self.resource_id.clone()),
            ("Role", self.role.clone()),
            ("Description", self.description.clone()),
        ]
    }

    /// Lines in the detail view: the fields, a blank line, the environment
    /// header, then one line per variable.
    pub fn detail_line_count(&self) -> usize {
        self.detail_fields().len() + 2 + self.environment.len()
    }
}

impl fmt::Display for FunctionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A single log entry produced by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: String,
    pub message: String,
    pub labels: HashMap<String, String>,
}

impl LogEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        severity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            severity: severity.into(),
            message: message.into(),
            labels: HashMap::new(),
        }
    }

    /// Render as `[YYYY-MM-DD HH:MM:SS] SEVERITY: message`.
    pub fn format_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format(LOG_TIMESTAMP_FORMAT),
            self.severity,
            self.message.trim_end()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A named metric time series.
///
/// Points are always time-ascending and finite; [`MetricSeries::new`] enforces
/// both so renderers never have to.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub name: String,
    pub unit: String,
    pub description: String,
    points: Vec<MetricPoint>,
}

impl MetricSeries {
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        description: impl Into<String>,
        points: impl IntoIterator<Item = MetricPoint>,
    ) -> Self {
        let mut points: Vec<MetricPoint> =
            points.into_iter().filter(|p| p.value.is_finite()).collect();
        points.sort_by_key(|p| p.timestamp);
        Self {
            name: name.into(),
            unit: unit.into(),
            description: description.into(),
            points,
        }
    }

    pub fn points(&self) -> &[MetricPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    pub fn min(&self) -> Option<f64> {
        self.points.iter().map(|p| p.value).reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.points.iter().map(|p| p.value).reduce(f64::max)
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let sum: f64 = self.points.iter().map(|p| p.value).sum();
        Some(sum / self.points.len() as f64)
    }
}

/// All metric series fetched for one function over one time window.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionMetrics {
    pub function_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub series: Vec<MetricSeries>,
}

impl FunctionMetrics {
    pub fn has_data(&self) -> bool {
        self.series.iter().any(|s| !s.is_empty())
    }
}

/// A fetchable archive of a function's packaged source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveRef {
    /// Plain (typically presigned) HTTPS URL.
    Url(String),
    /// Cloud Storage object.
    Gcs { bucket: String, object: String },
}

impl ArchiveRef {
    /// Parse a `gs://bucket/path/to/object` URL.
    pub fn parse_gcs(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("gs://")?;
        let (bucket, object) = rest.split_once('/')?;
        if bucket.is_empty() || object.is_empty() {
            return None;
        }
        Some(Self::Gcs {
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }
}

impl fmt::Display for ArchiveRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Presigned URLs carry credentials in the query string.
            Self::Url(url) => write!(f, "{}", url.split('?').next().unwrap_or(url)),
            Self::Gcs { bucket, object } => write!(f, "gs://{bucket}/{object}"),
        }
    }
}

/// Where a function's source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Archive(ArchiveRef),
    Repository {
        url: String,
        deployed_url: Option<String>,
    },
    /// The reason is shown to the user verbatim.
    Unsupported(String),
}
