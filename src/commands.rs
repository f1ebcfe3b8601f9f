//! Background task dispatch.
//!
//! The state machine describes work as [`TaskRequest`]s; the [`Dispatcher`]
//! runs each one on its own tokio task and reports back with exactly one
//! [`TaskCompletion`], whether the work succeeded, failed or was cancelled.
//! Which completions still matter is decided by the [`TaskLedger`], which
//! lives in the application state.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use color_eyre::Result;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::message::AppEvent;
use crate::model::{FunctionMetrics, FunctionSummary};
use crate::provider::FunctionProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ListFunctions,
    AccountId,
    FunctionDetail,
    FunctionCode,
    FunctionLogs,
    FunctionMetrics,
    DownloadCode,
    CodeFiles,
}

impl TaskKind {
    /// Tasks whose result only matters while their view is on screen.
    pub const fn is_view_owned(self) -> bool {
        matches!(
            self,
            Self::FunctionDetail
                | Self::FunctionCode
                | Self::FunctionLogs
                | Self::FunctionMetrics
                | Self::CodeFiles
        )
    }
}

/// Deduplication key: at most one request per key is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub kind: TaskKind,
    pub target: Option<String>,
}

impl TaskKey {
    pub const fn global(kind: TaskKind) -> Self {
        Self { kind, target: None }
    }

    pub fn for_function(kind: TaskKind, function: impl Into<String>) -> Self {
        Self {
            kind,
            target: Some(function.into()),
        }
    }
}

/// A unit of background work. Carries copies of every input it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ListFunctions,
    AccountId,
    FunctionDetail { function: String },
    FunctionCode { function: String },
    FunctionLogs { function: String, limit: usize },
    /// The window ends at dispatch time.
    FunctionMetrics { function: String, window: Duration },
    DownloadCode { function: String, root: PathBuf },
    CodeFiles { function: String, dir: PathBuf },
}

impl Operation {
    pub fn key(&self) -> TaskKey {
        match self {
            Self::ListFunctions => TaskKey::global(TaskKind::ListFunctions),
            Self::AccountId => TaskKey::global(TaskKind::AccountId),
            Self::FunctionDetail { function } => {
                TaskKey::for_function(TaskKind::FunctionDetail, function)
            }
            Self::FunctionCode { function } => TaskKey::for_function(TaskKind::FunctionCode, function),
            Self::FunctionLogs { function, .. } => {
                TaskKey::for_function(TaskKind::FunctionLogs, function)
            }
            Self::FunctionMetrics { function, .. } => {
                TaskKey::for_function(TaskKind::FunctionMetrics, function)
            }
            Self::DownloadCode { function, .. } => {
                TaskKey::for_function(TaskKind::DownloadCode, function)
            }
            Self::CodeFiles { function, .. } => TaskKey::for_function(TaskKind::CodeFiles, function),
        }
    }

    /// Human-readable name for status display.
    pub fn name(&self) -> String {
        match self {
            Self::ListFunctions => "Loading functions".to_string(),
            Self::AccountId => "Resolving account".to_string(),
            Self::FunctionDetail { function } => format!("Loading details for {function}"),
            Self::FunctionCode { function } => format!("Loading code info for {function}"),
            Self::FunctionLogs { function, .. } => format!("Loading logs for {function}"),
            Self::FunctionMetrics { function, .. } => format!("Loading metrics for {function}"),
            Self::DownloadCode { function, .. } => format!("Downloading code for {function}"),
            Self::CodeFiles { function, .. } => format!("Reading code files for {function}"),
        }
    }

    async fn execute(self, provider: Arc<dyn FunctionProvider>) -> Result<TaskOutcome> {
        Ok(match self {
            Self::ListFunctions => TaskOutcome::FunctionsListed(provider.list_functions().await?),
            Self::AccountId => TaskOutcome::AccountResolved(provider.account_id().await?),
            Self::FunctionDetail { function } => {
                TaskOutcome::FunctionDetail(provider.get_function(&function).await?)
            }
            Self::FunctionCode { function } => {
                TaskOutcome::CodeInfo(provider.get_function_code(&function).await?)
            }
            Self::FunctionLogs { function, limit } => {
                TaskOutcome::Logs(provider.get_function_logs(&function, limit).await?)
            }
            Self::FunctionMetrics { function, window } => {
                let end = Utc::now();
                let metrics = provider
                    .get_function_metrics(&function, end - window, end)
                    .await?;
                TaskOutcome::Metrics(metrics)
            }
            Self::DownloadCode { function, root } => {
                let dest = archive::function_dir(&root, &function)?;
                provider.download_function_code(&function, &dest).await?;
                TaskOutcome::Downloaded(dest)
            }
            Self::CodeFiles { function, dir } => {
                let text = tokio::task::spawn_blocking(move || {
                    archive::read_code_files(&dir, &function)
                })
                .await??;
                TaskOutcome::CodeFiles(text)
            }
        })
    }
}

/// Result of a task, delivered as data.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    FunctionsListed(Vec<FunctionSummary>),
    AccountResolved(String),
    FunctionDetail(FunctionSummary),
    CodeInfo(String),
    Logs(Vec<String>),
    Metrics(FunctionMetrics),
    Downloaded(PathBuf),
    CodeFiles(String),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub id: RequestId,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskCompletion {
    pub id: RequestId,
    pub key: TaskKey,
    pub outcome: TaskOutcome,
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{:?}({target})", self.kind),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

/// Tracks which request is current for each [`TaskKey`].
///
/// Completions for requests no longer in the ledger are stale and must be
/// dropped by the caller.
#[derive(Debug, Default)]
pub struct TaskLedger {
    next_id: u64,
    in_flight: HashMap<TaskKey, RequestId>,
}

impl TaskLedger {
    /// Register `operation`, or return `None` if its key is already in flight.
    pub fn issue(&mut self, operation: Operation) -> Option<TaskRequest> {
        let key = operation.key();
        if self.in_flight.contains_key(&key) {
            tracing::debug!(%key, "Request already in flight");
            return None;
        }
        self.next_id += 1;
        let id = RequestId(self.next_id);
        self.in_flight.insert(key, id);
        Some(TaskRequest { id, operation })
    }

    /// Retire a completion. Returns `true` if it is the current request for its key.
    pub fn settle(&mut self, completion: &TaskCompletion) -> bool {
        if self.in_flight.get(&completion.key) == Some(&completion.id) {
            self.in_flight.remove(&completion.key);
            true
        } else {
            false
        }
    }

    /// Forget the request for `key`, returning its id for cancellation.
    pub fn forget(&mut self, key: &TaskKey) -> Option<RequestId> {
        self.in_flight.remove(key)
    }

    /// Forget every view-owned request, returning their ids for cancellation.
    pub fn cancel_view_tasks(&mut self) -> Vec<RequestId> {
        let mut cancelled = Vec::new();
        self.in_flight.retain(|key, id| {
            if key.kind.is_view_owned() {
                cancelled.push(*id);
                false
            } else {
                true
            }
        });
        cancelled.sort();
        cancelled
    }

    pub fn is_in_flight(&self, kind: TaskKind) -> bool {
        self.in_flight.keys().any(|k| k.kind == kind)
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Spawns [`TaskRequest`]s and keeps their cancellation handles.
pub struct Dispatcher {
    provider: Arc<dyn FunctionProvider>,
    events: UnboundedSender<AppEvent>,
    running: HashMap<RequestId, CancellationToken>,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn FunctionProvider>, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            provider,
            events,
            running: HashMap::new(),
        }
    }

    pub fn spawn(&mut self, request: TaskRequest) {
        let TaskRequest { id, operation } = request;
        let key = operation.key();
        let name = operation.name();
        let cancel = CancellationToken::new();
        self.running.insert(id, cancel.clone());

        let provider = self.provider.clone();
        let events = self.events.clone();
        tracing::debug!(request = id.0, task = %name, "Spawning task");
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => TaskOutcome::Cancelled,
                result = operation.execute(provider) => result.unwrap_or_else(|err| {
                    tracing::warn!(request = id.0, task = %name, error = %format!("{err:#}"), "Task failed");
                    TaskOutcome::Failed(format!("{err:#}"))
                }),
            };
            let _ = events.send(AppEvent::Task(TaskCompletion { id, key, outcome }));
        });
    }

    pub fn abort(&mut self, id: RequestId) {
        if let Some(cancel) = self.running.remove(&id) {
            tracing::debug!(request = id.0, "Cancelling task");
            cancel.cancel();
        }
    }

    /// Drop the handle of a request that has reported back.
    pub fn finished(&mut self, id: RequestId) {
        self.running.remove(&id);
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    pub fn shutdown(&mut self) {
        for (_, cancel) in self.running.drain() {
            cancel.cancel();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::model::SourceLocation;
    use crate::provider::testing::FakeProvider;

    fn completion(id: u64, key: TaskKey) -> TaskCompletion {
        TaskCompletion {
            id: RequestId(id),
            key,
            outcome: TaskOutcome::Cancelled,
        }
    }

    #[test]
    fn test_ledger_dedupes_same_key() {
        let mut ledger = TaskLedger::default();
        let first = ledger
            .issue(Operation::FunctionCode {
                function: "fn-a".to_string(),
            })
            .unwrap();
        assert!(ledger
            .issue(Operation::FunctionCode {
                function: "fn-a".to_string()
            })
            .is_none());
        // A different target is independent.
        assert!(ledger
            .issue(Operation::FunctionCode {
                function: "fn-b".to_string()
            })
            .is_some());

        assert!(ledger.settle(&completion(
            first.id.0,
            TaskKey::for_function(TaskKind::FunctionCode, "fn-a")
        )));
        assert!(ledger
            .issue(Operation::FunctionCode {
                function: "fn-a".to_string()
            })
            .is_some());
    }

    #[test]
    fn test_cancelled_view_tasks_are_stale() {
        let mut ledger = TaskLedger::default();
        let list = ledger.issue(Operation::ListFunctions).unwrap();
        let logs = ledger
            .issue(Operation::FunctionLogs {
                function: "fn-a".to_string(),
                limit: 200,
            })
            .unwrap();

        assert_eq!(ledger.cancel_view_tasks(), vec![logs.id]);
        assert!(!ledger.settle(&completion(logs.id.0, logs.operation.key())));
        assert!(ledger.settle(&completion(list.id.0, list.operation.key())));
        assert!(ledger.is_idle());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ledger = TaskLedger::default();
        let a = ledger.issue(Operation::ListFunctions).unwrap();
        let b = ledger.issue(Operation::AccountId).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_exactly_one_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = Arc::new(FakeProvider::with_functions(&["fn-a", "fn-b"]));
        let mut dispatcher = Dispatcher::new(provider, tx);
        let mut ledger = TaskLedger::default();

        let request = ledger.issue(Operation::ListFunctions).unwrap();
        let id = request.id;
        dispatcher.spawn(request);

        let Some(AppEvent::Task(done)) = rx.recv().await else {
            panic!("expected a task completion");
        };
        assert_eq!(done.id, id);
        match &done.outcome {
            TaskOutcome::FunctionsListed(functions) => assert_eq!(functions.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        dispatcher.finished(id);
        assert_eq!(dispatcher.running(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_errors_are_delivered_as_data() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new(Arc::new(FakeProvider::default()), tx);
        let mut ledger = TaskLedger::default();

        dispatcher.spawn(
            ledger
                .issue(Operation::FunctionDetail {
                    function: "ghost".to_string(),
                })
                .unwrap(),
        );

        let Some(AppEvent::Task(done)) = rx.recv().await else {
            panic!("expected a task completion");
        };
        assert_eq!(
            done.outcome,
            TaskOutcome::Failed("function ghost not found".to_string())
        );
    }

    #[tokio::test]
    async fn test_aborted_task_reports_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new(Arc::new(FakeProvider::default()), tx);
        let mut ledger = TaskLedger::default();

        let request = ledger.issue(Operation::AccountId).unwrap();
        let id = request.id;
        dispatcher.spawn(request);
        dispatcher.abort(id);

        let Some(AppEvent::Task(done)) = rx.recv().await else {
            panic!("expected a task completion");
        };
        assert_eq!(done.outcome, TaskOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_download_then_read_files() {
        let root = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = FakeProvider {
            source: Some(SourceLocation::Unsupported(
                "source upload URL type not supported for direct download".to_string(),
            )),
            ..FakeProvider::default()
        };
        let mut dispatcher = Dispatcher::new(Arc::new(provider), tx);
        let mut ledger = TaskLedger::default();

        dispatcher.spawn(
            ledger
                .issue(Operation::DownloadCode {
                    function: "fn-b".to_string(),
                    root: root.path().to_path_buf(),
                })
                .unwrap(),
        );
        let Some(AppEvent::Task(done)) = rx.recv().await else {
            panic!("expected a task completion");
        };
        assert!(matches!(done.outcome, TaskOutcome::Failed(ref m) if m.contains("not supported")));
        assert!(root.path().join("fn-b").is_dir());
    }
}
