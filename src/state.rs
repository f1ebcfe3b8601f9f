//! Application state. Only the event loop holds a mutable reference.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use chrono::Duration;

use crate::commands::TaskLedger;
use crate::config::AppConfig;
use crate::input::{EditBuffer, LineInput};
use crate::model::{FunctionMetrics, FunctionSummary};
use crate::search::filter_indices;
use crate::stream::SessionId;

/// Rows taken by everything that is not the main content pane.
const CHROME_ROWS: u16 = 14;
const MIN_CONTENT_ROWS: u16 = 5;
/// Width of the list columns, in percent of the usable width.
const COLUMN_PERCENT: [u16; 5] = [35, 15, 12, 12, 26];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    List,
    Detail,
    Logs,
    Code,
    CodeFiles,
    Metrics,
}

impl View {
    pub const fn title(self) -> &'static str {
        match self {
            Self::List => "Functions",
            Self::Detail => "Details",
            Self::Logs => "Logs",
            Self::Code => "Code",
            Self::CodeFiles => "Code Files",
            Self::Metrics => "Metrics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Filter,
    Command,
}

/// The full function list plus the filtered view of it.
///
/// `filtered` holds indices into `all` and is rebuilt whenever either the
/// list or the filter changes, so it never points into a replaced list.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    all: Vec<FunctionSummary>,
    filtered: Vec<usize>,
    cursor: usize,
}

impl FunctionRegistry {
    /// Replace the whole list, keeping the cursor on the same function if it survived.
    pub fn replace(&mut self, functions: Vec<FunctionSummary>, filter: &str) {
        let previous = self.selected().map(|f| f.name.clone());
        self.all = functions;
        self.filtered = filter_indices(&self.all, filter);
        self.cursor = previous
            .and_then(|name| self.visible().position(|f| f.name == name))
            .unwrap_or(0);
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filtered = filter_indices(&self.all, filter);
        self.cursor = 0;
    }

    pub fn all(&self) -> &[FunctionSummary] {
        &self.all
    }

    pub fn visible(&self) -> impl Iterator<Item = &FunctionSummary> {
        self.filtered.iter().map(|&i| &self.all[i])
    }

    pub fn visible_len(&self) -> usize {
        self.filtered.len()
    }

    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected(&self) -> Option<&FunctionSummary> {
        self.filtered.get(self.cursor).map(|&i| &self.all[i])
    }

    pub fn find(&self, name: &str) -> Option<&FunctionSummary> {
        self.all.iter().find(|f| f.name == name)
    }

    pub fn move_by(&mut self, delta: isize) {
        let last = self.filtered.len().saturating_sub(1);
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }

    pub fn first(&mut self) {
        self.cursor = 0;
    }

    pub fn last(&mut self) {
        self.cursor = self.filtered.len().saturating_sub(1);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    Idle,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> Loadable<T> {
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Bounded line buffer for live logs; the oldest lines fall off the front.
#[derive(Debug)]
pub struct LogPanel {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogPanel {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Which log buffer the Logs view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Static,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStream {
    pub session: SessionId,
    pub function: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub kind: StatusKind,
    pub text: String,
}

/// Dimensions derived from the terminal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutState {
    pub width: u16,
    pub height: u16,
    pub columns: [u16; 5],
    pub content_height: u16,
}

impl LayoutState {
    pub fn compute(width: u16, height: u16) -> Self {
        let usable = u32::from(width.saturating_sub(4));
        let columns = COLUMN_PERCENT.map(|pct| {
            u16::try_from(usable * u32::from(pct) / 100).unwrap_or(u16::MAX)
        });
        Self {
            width,
            height,
            columns,
            content_height: height.saturating_sub(CHROME_ROWS).max(MIN_CONTENT_ROWS),
        }
    }
}

/// Fixed parameters copied out of the configuration at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_limit: usize,
    pub metrics_window: Duration,
    pub download_root: PathBuf,
    pub stream_buffer: usize,
}

impl Settings {
    pub fn from_config(config: &AppConfig, download_root: PathBuf) -> Self {
        Self {
            log_limit: config.logs.limit,
            metrics_window: Duration::hours(1),
            download_root,
            stream_buffer: config.streaming.buffer_capacity,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_limit: 200,
            metrics_window: Duration::hours(1),
            download_root: PathBuf::from("downloads"),
            stream_buffer: 1000,
        }
    }
}

/// Scroll offset meaning "pinned to the bottom"; renderers clamp it.
pub const SCROLL_BOTTOM: u16 = u16::MAX;

pub struct AppState {
    pub view: View,
    pub mode: InputMode,
    pub registry: FunctionRegistry,
    pub active_filter: Option<String>,
    /// Buffer for the filter and command prompts.
    pub prompt: LineInput,
    /// Name of the function the current view is about. Always re-resolved
    /// through the registry, never held as an index.
    pub selected: Option<String>,

    pub detail: Option<FunctionSummary>,
    pub code: Loadable<String>,
    pub code_files: Loadable<String>,
    pub metrics: Loadable<FunctionMetrics>,
    pub logs: Loadable<Vec<String>>,
    pub live_logs: LogPanel,
    pub log_source: LogSource,
    pub stream: Option<ActiveStream>,
    pub(crate) next_session: u64,
    pub editor: Option<EditBuffer>,

    pub status: Option<Status>,
    pub account: Option<String>,
    /// Functions whose code was downloaded successfully this session.
    pub downloads: HashMap<String, PathBuf>,
    pub layout: LayoutState,
    pub scroll: u16,
    pub ledger: TaskLedger,
    pub settings: Settings,
}

impl AppState {
    pub fn new(settings: Settings, width: u16, height: u16) -> Self {
        Self {
            view: View::List,
            mode: InputMode::Normal,
            registry: FunctionRegistry::default(),
            active_filter: None,
            prompt: LineInput::default(),
            selected: None,
            detail: None,
            code: Loadable::Idle,
            code_files: Loadable::Idle,
            metrics: Loadable::Idle,
            logs: Loadable::Idle,
            live_logs: LogPanel::new(settings.stream_buffer),
            log_source: LogSource::Static,
            stream: None,
            next_session: 0,
            editor: None,
            status: None,
            account: None,
            downloads: HashMap::new(),
            layout: LayoutState::compute(width, height),
            scroll: 0,
            ledger: TaskLedger::default(),
            settings,
        }
    }

    /// The registry is still being fetched.
    pub fn is_loading(&self) -> bool {
        self.ledger
            .is_in_flight(crate::commands::TaskKind::ListFunctions)
    }

    /// Anything at all is running in the background.
    pub fn is_busy(&self) -> bool {
        !self.ledger.is_idle()
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.status = Some(Status {
            kind: StatusKind::Info,
            text: text.into(),
        });
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.status = Some(Status {
            kind: StatusKind::Error,
            text: text.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn functions(names: &[&str]) -> Vec<FunctionSummary> {
        names
            .iter()
            .map(|n| FunctionSummary {
                name: (*n).to_string(),
                ..FunctionSummary::default()
            })
            .collect()
    }

    #[test]
    fn test_registry_replace_keeps_cursor_on_same_function() {
        let mut registry = FunctionRegistry::default();
        registry.replace(functions(&["a", "b", "c"]), "");
        registry.move_by(2);
        assert_eq!(registry.selected().unwrap().name, "c");

        registry.replace(functions(&["c", "d"]), "");
        assert_eq!(registry.selected().unwrap().name, "c");

        registry.replace(functions(&["x"]), "");
        assert_eq!(registry.cursor(), 0);
        assert_eq!(registry.selected().unwrap().name, "x");
    }

    #[test]
    fn test_registry_cursor_bounds() {
        let mut registry = FunctionRegistry::default();
        registry.move_by(5);
        assert_eq!(registry.cursor(), 0);
        assert!(registry.selected().is_none());

        registry.replace(functions(&["a", "b", "c"]), "");
        registry.move_by(10);
        assert_eq!(registry.cursor(), 2);
        registry.move_by(-10);
        assert_eq!(registry.cursor(), 0);
        registry.last();
        assert_eq!(registry.selected().unwrap().name, "c");
    }

    #[test]
    fn test_filter_is_subset_of_registry() {
        let mut registry = FunctionRegistry::default();
        registry.replace(functions(&["alpha", "beta", "gamma"]), "");
        registry.set_filter("MM");
        let visible: Vec<_> = registry.visible().map(|f| f.name.as_str()).collect();
        assert_eq!(visible, vec!["gamma"]);
        assert_eq!(registry.all().len(), 3);

        registry.replace(functions(&["delta"]), "mm");
        assert_eq!(registry.visible_len(), 0);
        assert!(registry.selected().is_none());
    }

    #[test]
    fn test_log_panel_is_bounded() {
        let mut panel = LogPanel::new(3);
        for i in 0..5 {
            panel.push(format!("line {i}"));
        }
        let lines: Vec<_> = panel.lines().cloned().collect();
        assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_layout_fractions() {
        let layout = LayoutState::compute(104, 40);
        assert_eq!(layout.columns, [35, 15, 12, 12, 26]);
        assert_eq!(layout.content_height, 26);

        let tiny = LayoutState::compute(2, 3);
        assert_eq!(tiny.columns, [0; 5]);
        assert_eq!(tiny.content_height, MIN_CONTENT_ROWS);
    }
}
