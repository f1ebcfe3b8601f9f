//! The state machine: `(state, event) -> effects`.
//!
//! Nothing here blocks or touches the outside world. Work that would is
//! returned as [`Effect`]s for the runtime to carry out, and comes back later
//! as an ordinary [`AppEvent`].

use crossterm::event::KeyEvent;

use crate::commands::{Operation, TaskCompletion, TaskKey, TaskKind, TaskOutcome};
use crate::config::{Action, KeyResolver};
use crate::input::{EditBuffer, LineEvent, LineInput};
use crate::message::{AppEvent, Effect};
use crate::model::FunctionSummary;
use crate::search::{Command, parse_command};
use crate::state::{
    ActiveStream, AppState, InputMode, LayoutState, Loadable, LogSource, SCROLL_BOTTOM, View,
};
use crate::stream::{SessionId, StreamItem, StreamUpdate};

pub const STREAM_STOPPED_LINE: &str = "⏹️  Log streaming stopped";

/// Issue the startup fetches.
pub fn init(state: &mut AppState) -> Vec<Effect> {
    let mut effects = Vec::new();
    spawn(state, Operation::ListFunctions, &mut effects);
    spawn(state, Operation::AccountId, &mut effects);
    effects
}

pub fn update(state: &mut AppState, event: AppEvent, keys: &KeyResolver) -> Vec<Effect> {
    let mut effects = Vec::new();
    match event {
        AppEvent::Key(key) => handle_key(state, key, keys, &mut effects),
        AppEvent::Resize(width, height) => state.layout = LayoutState::compute(width, height),
        AppEvent::Tick => {}
        AppEvent::Task(completion) => handle_completion(state, completion, &mut effects),
        AppEvent::Stream(update) => handle_stream(state, update, &mut effects),
        AppEvent::Quit => effects.push(Effect::Quit),
    }
    effects
}

fn spawn(state: &mut AppState, operation: Operation, effects: &mut Vec<Effect>) -> bool {
    match state.ledger.issue(operation) {
        Some(request) => {
            effects.push(Effect::Spawn(request));
            true
        }
        None => false,
    }
}

fn handle_key(state: &mut AppState, key: KeyEvent, keys: &KeyResolver, effects: &mut Vec<Effect>) {
    match state.mode {
        InputMode::Filter => handle_filter_key(state, key),
        InputMode::Command => handle_command_key(state, key, effects),
        InputMode::Normal if state.editor.is_some() => handle_editor_key(state, key, keys),
        InputMode::Normal => {
            if let Some(action) = keys.resolve(&key) {
                handle_action(state, action, keys, effects);
            }
        }
    }
}

fn handle_filter_key(state: &mut AppState, key: KeyEvent) {
    match state.prompt.handle_key(key) {
        LineEvent::Edited => state.registry.set_filter(state.prompt.value()),
        LineEvent::Submitted(value) => {
            let value = value.trim().to_string();
            state.active_filter = (!value.is_empty()).then_some(value);
            state.mode = InputMode::Normal;
        }
        LineEvent::Cancelled => {
            state.active_filter = None;
            state.registry.set_filter("");
            state.mode = InputMode::Normal;
        }
        LineEvent::Ignored => {}
    }
}

fn handle_command_key(state: &mut AppState, key: KeyEvent, effects: &mut Vec<Effect>) {
    match state.prompt.handle_key(key) {
        LineEvent::Submitted(value) => {
            state.mode = InputMode::Normal;
            state.prompt = LineInput::default();
            match parse_command(&value) {
                Some(Command::Quit) => effects.push(Effect::Quit),
                Some(Command::Refresh) => refresh(state, effects),
                None => tracing::debug!(command = %value, "Ignoring unknown command"),
            }
        }
        LineEvent::Cancelled => {
            state.mode = InputMode::Normal;
            state.prompt = LineInput::default();
        }
        LineEvent::Edited | LineEvent::Ignored => {}
    }
}

fn handle_editor_key(state: &mut AppState, key: KeyEvent, keys: &KeyResolver) {
    if keys.matches(&key, Action::SaveEdit) {
        if let Some(editor) = state.editor.take() {
            state.code = Loadable::Ready(editor.text());
            state.info("Changes saved (local only, nothing was deployed)");
        }
    } else if keys.matches(&key, Action::Back) {
        state.editor = None;
        state.info("Edit cancelled");
    } else if let Some(editor) = state.editor.as_mut() {
        editor.handle_key(key);
    }
}

fn handle_action(state: &mut AppState, action: Action, keys: &KeyResolver, effects: &mut Vec<Effect>) {
    if let Some(step) = scroll_step(state, action) {
        apply_scroll(state, step);
        return;
    }

    match (state.view, action) {
        (View::List, Action::Quit) => effects.push(Effect::Quit),
        (View::List, Action::Back) => {
            if state.active_filter.take().is_some() {
                state.registry.set_filter("");
            }
        }
        (View::List, Action::Select) => enter_detail(state, effects),
        (View::List, Action::Refresh) => refresh(state, effects),
        (View::List, Action::Logs) => {
            if let Some(name) = cursor_function(state) {
                enter_logs(state, name, effects);
            }
        }
        (View::List, Action::Code) => {
            if let Some(name) = cursor_function(state) {
                enter_code(state, name, effects);
            }
        }
        (View::List, Action::Metrics) => {
            if let Some(name) = cursor_function(state) {
                enter_metrics(state, name, effects);
            }
        }
        (View::List, Action::Download) => start_download(state, effects),
        (View::List, Action::Filter) => {
            state.prompt = LineInput::with_value(state.active_filter.clone().unwrap_or_default());
            state.mode = InputMode::Filter;
        }
        (View::List, Action::Command) => {
            state.prompt = LineInput::default();
            state.mode = InputMode::Command;
        }

        (View::Logs, Action::Logs) => {
            if let Some(name) = state.selected.clone() {
                enter_logs(state, name, effects);
            }
        }
        (View::Logs, Action::ToggleStream) => toggle_stream(state, keys, effects),

        (View::Code, Action::ViewFiles) => view_code_files(state, effects),
        (View::Code, Action::ToggleEdit) => match state.code.ready() {
            Some(text) => {
                state.editor = Some(EditBuffer::new(text));
                state.info(format!(
                    "Editing: {} to save, {} to cancel",
                    keys.display(Action::SaveEdit),
                    keys.display(Action::Back)
                ));
            }
            None => state.error("Code information is not loaded yet"),
        },

        (View::Metrics, Action::Metrics) => {
            if let Some(name) = state.selected.clone() {
                enter_metrics(state, name, effects);
            }
        }

        (View::CodeFiles, Action::Back) => {
            cancel_task(state, TaskKind::CodeFiles, effects);
            state.code_files = Loadable::Idle;
            state.view = View::Code;
            state.scroll = 0;
        }
        (_, Action::Back) => return_to_list(state, effects),

        _ => {}
    }
}

enum Scroll {
    By(i32),
    Top,
    Bottom,
}

fn scroll_step(state: &AppState, action: Action) -> Option<Scroll> {
    let page = i32::from(state.layout.content_height.max(1));
    Some(match action {
        Action::Up => Scroll::By(-1),
        Action::Down => Scroll::By(1),
        Action::PageUp => Scroll::By(-page),
        Action::PageDown => Scroll::By(page),
        Action::Home => Scroll::Top,
        Action::End => Scroll::Bottom,
        _ => return None,
    })
}

fn apply_scroll(state: &mut AppState, step: Scroll) {
    if state.view == View::List {
        match step {
            Scroll::By(delta) => state.registry.move_by(delta as isize),
            Scroll::Top => state.registry.first(),
            Scroll::Bottom => state.registry.last(),
        }
        return;
    }

    let max = max_scroll(state);
    let current = if state.scroll == SCROLL_BOTTOM {
        max
    } else {
        state.scroll.min(max)
    };
    state.scroll = match step {
        Scroll::By(delta) => {
            let delta = i16::try_from(delta).unwrap_or(if delta < 0 { i16::MIN } else { i16::MAX });
            current.saturating_add_signed(delta).min(max)
        }
        Scroll::Top => 0,
        Scroll::Bottom => SCROLL_BOTTOM,
    };
}

/// Lines of scrollable text in the current view.
fn content_lines(state: &AppState) -> usize {
    let text_lines = |text: &Loadable<String>| text.ready().map_or(0, |t| t.lines().count());
    match state.view {
        View::Logs => match state.log_source {
            LogSource::Live => state.live_logs.len(),
            LogSource::Static => state.logs.ready().map_or(0, Vec::len),
        },
        View::Code => text_lines(&state.code),
        View::CodeFiles => text_lines(&state.code_files),
        View::Detail => state.detail.as_ref().map_or(0, FunctionSummary::detail_line_count),
        View::List | View::Metrics => 0,
    }
}

fn max_scroll(state: &AppState) -> u16 {
    let visible = usize::from(state.layout.content_height);
    let overflow = content_lines(state).saturating_sub(visible);
    u16::try_from(overflow).unwrap_or(SCROLL_BOTTOM - 1)
}

fn cursor_function(state: &AppState) -> Option<String> {
    state.registry.selected().map(|f| f.name.clone())
}

fn enter_detail(state: &mut AppState, effects: &mut Vec<Effect>) {
    let Some(function) = state.registry.selected().cloned() else {
        return;
    };
    state.view = View::Detail;
    state.scroll = 0;
    state.selected = Some(function.name.clone());
    spawn(
        state,
        Operation::FunctionDetail {
            function: function.name.clone(),
        },
        effects,
    );
    state.detail = Some(function);
}

fn enter_logs(state: &mut AppState, function: String, effects: &mut Vec<Effect>) {
    stop_stream(state, effects);
    state.view = View::Logs;
    state.scroll = 0;
    state.log_source = LogSource::Static;
    state.live_logs.clear();
    state.selected = Some(function.clone());
    let issued = spawn(
        state,
        Operation::FunctionLogs {
            function,
            limit: state.settings.log_limit,
        },
        effects,
    );
    if issued {
        state.logs = Loadable::Loading;
    }
}

fn enter_code(state: &mut AppState, function: String, effects: &mut Vec<Effect>) {
    state.view = View::Code;
    state.scroll = 0;
    state.editor = None;
    state.selected = Some(function.clone());
    if spawn(state, Operation::FunctionCode { function }, effects) {
        state.code = Loadable::Loading;
    }
}

fn enter_metrics(state: &mut AppState, function: String, effects: &mut Vec<Effect>) {
    state.view = View::Metrics;
    state.scroll = 0;
    state.selected = Some(function.clone());
    let window = state.settings.metrics_window;
    if spawn(state, Operation::FunctionMetrics { function, window }, effects) {
        state.metrics = Loadable::Loading;
    }
}

fn view_code_files(state: &mut AppState, effects: &mut Vec<Effect>) {
    let Some(function) = state.selected.clone() else {
        return;
    };
    let Some(dir) = state.downloads.get(&function).cloned() else {
        state.error(format!(
            "No downloaded code for {function}: download first (press w on the function list)"
        ));
        return;
    };
    state.view = View::CodeFiles;
    state.scroll = 0;
    if spawn(state, Operation::CodeFiles { function, dir }, effects) {
        state.code_files = Loadable::Loading;
    }
}

fn start_download(state: &mut AppState, effects: &mut Vec<Effect>) {
    let Some(function) = cursor_function(state) else {
        return;
    };
    let root = state.settings.download_root.clone();
    if spawn(
        state,
        Operation::DownloadCode {
            function: function.clone(),
            root,
        },
        effects,
    ) {
        state.info(format!("Downloading code for {function}..."));
    } else {
        state.info(format!("Download already in progress for {function}"));
    }
}

fn refresh(state: &mut AppState, effects: &mut Vec<Effect>) {
    if spawn(state, Operation::ListFunctions, effects) {
        state.info("Refreshing functions...");
    }
}

fn toggle_stream(state: &mut AppState, keys: &KeyResolver, effects: &mut Vec<Effect>) {
    if state.stream.is_some() {
        stop_stream(state, effects);
        state.live_logs.push(STREAM_STOPPED_LINE);
        return;
    }
    let Some(function) = state.selected.clone() else {
        return;
    };

    state.next_session += 1;
    let session = SessionId(state.next_session);
    state.live_logs.clear();
    state.live_logs.push(format!(
        "🔴 Streaming logs for {function} (real-time) - Press '{}' to stop",
        keys.display(Action::ToggleStream)
    ));
    state.log_source = LogSource::Live;
    state.scroll = SCROLL_BOTTOM;
    state.stream = Some(ActiveStream {
        session,
        function: function.clone(),
    });
    effects.push(Effect::StartStream { session, function });
}

/// Cancel the active stream, if any. Later updates from it are ignored.
fn stop_stream(state: &mut AppState, effects: &mut Vec<Effect>) {
    if let Some(stream) = state.stream.take() {
        effects.push(Effect::StopStream(stream.session));
    }
}

fn cancel_task(state: &mut AppState, kind: TaskKind, effects: &mut Vec<Effect>) {
    if let Some(function) = state.selected.clone() {
        let key = TaskKey::for_function(kind, function);
        if let Some(id) = state.ledger.forget(&key) {
            effects.push(Effect::Abort(id));
        }
    }
}

fn return_to_list(state: &mut AppState, effects: &mut Vec<Effect>) {
    stop_stream(state, effects);
    effects.extend(state.ledger.cancel_view_tasks().into_iter().map(Effect::Abort));
    state.view = View::List;
    state.scroll = 0;
    state.selected = None;
    state.editor = None;
    state.detail = None;
    state.code = Loadable::Idle;
    state.code_files = Loadable::Idle;
    state.metrics = Loadable::Idle;
    state.logs = Loadable::Idle;
    state.live_logs.clear();
    state.log_source = LogSource::Static;
}

fn handle_completion(state: &mut AppState, completion: TaskCompletion, effects: &mut Vec<Effect>) {
    if !state.ledger.settle(&completion) {
        tracing::debug!(request = completion.id.0, key = %completion.key, "Dropping stale task result");
        return;
    }

    let TaskCompletion { key, outcome, .. } = completion;
    let target = key.target.unwrap_or_default();
    let on_screen = |state: &AppState, view: View| showing(state, view, &target);

    match (key.kind, outcome) {
        (_, TaskOutcome::Cancelled) => {}

        (TaskKind::ListFunctions, TaskOutcome::FunctionsListed(functions)) => {
            let count = functions.len();
            let filter = current_filter(state).to_string();
            state.registry.replace(functions, &filter);
            state.info(format!("Loaded {count} functions"));
            tracing::info!(count, "Function registry replaced");
            drop_stale_selection(state, effects);
        }
        (TaskKind::ListFunctions, TaskOutcome::Failed(message)) => {
            state.error(format!("Failed to list functions: {message}"));
        }

        (TaskKind::AccountId, TaskOutcome::AccountResolved(account)) => {
            state.account = Some(account);
        }
        (TaskKind::AccountId, TaskOutcome::Failed(message)) => {
            tracing::warn!(error = %message, "Could not resolve account id");
            state.error(format!("Failed to resolve account: {message}"));
        }

        (TaskKind::FunctionDetail, TaskOutcome::FunctionDetail(function)) => {
            if on_screen(state, View::Detail) {
                state.detail = Some(function);
            }
        }
        (TaskKind::FunctionDetail, TaskOutcome::Failed(message)) => {
            if on_screen(state, View::Detail) {
                state.error(format!("Failed to refresh {target}: {message}"));
            }
        }

        (TaskKind::FunctionCode, TaskOutcome::CodeInfo(text)) => {
            if on_screen(state, View::Code) {
                state.code = Loadable::Ready(text);
            }
        }
        (TaskKind::FunctionCode, TaskOutcome::Failed(message)) => {
            if on_screen(state, View::Code) {
                state.code = Loadable::Failed(message);
            }
        }

        (TaskKind::FunctionLogs, TaskOutcome::Logs(lines)) => {
            if on_screen(state, View::Logs) {
                state.logs = Loadable::Ready(lines);
            }
        }
        (TaskKind::FunctionLogs, TaskOutcome::Failed(message)) => {
            if on_screen(state, View::Logs) {
                state.logs = Loadable::Failed(message);
            }
        }

        (TaskKind::FunctionMetrics, TaskOutcome::Metrics(metrics)) => {
            if on_screen(state, View::Metrics) {
                state.metrics = Loadable::Ready(metrics);
            }
        }
        (TaskKind::FunctionMetrics, TaskOutcome::Failed(message)) => {
            if on_screen(state, View::Metrics) {
                state.metrics = Loadable::Failed(message);
            }
        }

        (TaskKind::DownloadCode, TaskOutcome::Downloaded(dir)) => {
            state.info(format!("Code for {target} downloaded to {}", dir.display()));
            state.downloads.insert(target.clone(), dir);
        }
        (TaskKind::DownloadCode, TaskOutcome::Failed(message)) => {
            state.error(format!("Download failed for {target}: {message}"));
        }

        (TaskKind::CodeFiles, TaskOutcome::CodeFiles(text)) => {
            if on_screen(state, View::CodeFiles) {
                state.code_files = Loadable::Ready(text);
            }
        }
        (TaskKind::CodeFiles, TaskOutcome::Failed(message)) => {
            if on_screen(state, View::CodeFiles) {
                state.code_files = Loadable::Failed(message);
            }
        }

        (kind, outcome) => {
            tracing::warn!(?kind, ?outcome, "Unexpected task outcome");
        }
    }
}

fn showing(state: &AppState, view: View, function: &str) -> bool {
    state.view == view && state.selected.as_deref() == Some(function)
}

/// After a registry replacement, leave any view whose function disappeared.
fn drop_stale_selection(state: &mut AppState, effects: &mut Vec<Effect>) {
    if state.view == View::List {
        return;
    }
    let Some(name) = state.selected.clone() else {
        return;
    };
    if state.registry.find(&name).is_none() {
        tracing::info!(function = %name, "Selected function no longer exists");
        return_to_list(state, effects);
        state.error(format!("Function {name} no longer exists"));
    }
}

/// The filter the visible list should follow: the prompt while it is being
/// typed, the committed filter otherwise.
fn current_filter(state: &AppState) -> &str {
    if state.mode == InputMode::Filter {
        state.prompt.value()
    } else {
        state.active_filter.as_deref().unwrap_or_default()
    }
}

fn handle_stream(state: &mut AppState, update: StreamUpdate, effects: &mut Vec<Effect>) {
    let current = state.stream.as_ref().map(|s| s.session);
    if current != Some(update.session) {
        tracing::trace!(session = update.session.0, "Dropping update from stale stream");
        return;
    }

    match update.item {
        StreamItem::Entries(entries) => {
            for entry in &entries {
                state.live_logs.push(entry.format_line());
            }
        }
        StreamItem::Failed(message) => {
            stop_stream(state, effects);
            state.live_logs.push(format!("❌ Stream error: {message}"));
            state.error(format!("Log stream stopped: {message}"));
        }
    }
}
