use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use super::{Chrome, truncate_str};
use crate::config::{Action, KeyResolver};
use crate::state::{AppState, InputMode, View};
use crate::theme::Theme;

const LOGO: &[&str] = &[
    r"   __                 ",
    r"  / /  __ _ _____   _ ",
    r" / /  / _` |_  / | | |",
    r"/ /__| (_| |/ /| |_| |",
    r"\____/\__,_/___|\__, |",
    r"        fn      |___/ ",
    r"                      ",
];

const STATUS_WIDTH: u16 = 42;
const LOGO_WIDTH: u16 = 24;

pub struct Hint {
    pub key: String,
    pub description: &'static str,
}

impl Hint {
    fn new(key: impl Into<String>, description: &'static str) -> Self {
        Self {
            key: key.into(),
            description,
        }
    }

    fn action(keys: &KeyResolver, action: Action, description: &'static str) -> Self {
        Self::new(keys.display(action), description)
    }
}

pub fn render(frame: &mut Frame, area: Rect, state: &AppState, chrome: &Chrome<'_>) {
    let theme = chrome.theme;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(theme.border_type)
        .border_style(Style::default().fg(theme.border()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [status, hints, logo] = Layout::horizontal([
        Constraint::Length(STATUS_WIDTH),
        Constraint::Min(20),
        Constraint::Length(LOGO_WIDTH),
    ])
    .areas(inner);

    render_status_info(frame, status, state, chrome);
    render_hints(frame, hints, theme, &hints_for(state, chrome.keys));
    render_logo(frame, logo, theme);
}

fn render_status_info(frame: &mut Frame, area: Rect, state: &AppState, chrome: &Chrome<'_>) {
    let theme = chrome.theme;
    let session = chrome.session;
    let w = usize::from(area.width);
    let label = Style::default().fg(theme.overlay1);
    let value = Style::default().fg(theme.text);

    let functions = if state.active_filter.is_some() || state.mode == InputMode::Filter {
        format!("{}/{}", state.registry.visible_len(), state.registry.all().len())
    } else {
        state.registry.all().len().to_string()
    };

    let lines = vec![
        Line::from(Span::styled(
            truncate_str(&breadcrumb(state), w),
            Style::default()
                .fg(theme.lavender)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        status_line(
            "provider",
            &format!(
                "{} ({})",
                session.provider.display_name(),
                session.provider.service_name()
            ),
            w,
            label,
            Style::default().fg(theme.blue),
        ),
        status_line(
            "account",
            state.account.as_deref().unwrap_or("resolving..."),
            w,
            label,
            value,
        ),
        status_line("region", &session.region, w, label, value),
        status_line("env", &session.environment, w, label, value),
        status_line("functions", &functions, w, label, value),
    ];
    frame.render_widget(Paragraph::new(lines), area);
}

/// `Functions > name > View`, naming the function the view is about.
pub fn breadcrumb(state: &AppState) -> String {
    match (&state.view, &state.selected) {
        (View::List, _) | (_, None) => View::List.title().to_string(),
        (View::CodeFiles, Some(name)) => format!(
            "{} > {name} > {} > {}",
            View::List.title(),
            View::Code.title(),
            View::CodeFiles.title()
        ),
        (view, Some(name)) => format!("{} > {name} > {}", View::List.title(), view.title()),
    }
}

fn hints_for(state: &AppState, keys: &KeyResolver) -> Vec<Hint> {
    if state.mode != InputMode::Normal {
        return vec![Hint::new("Enter", "Apply"), Hint::new("Esc", "Cancel")];
    }
    if state.editor.is_some() {
        return vec![
            Hint::action(keys, Action::SaveEdit, "Save (local)"),
            Hint::action(keys, Action::Back, "Exit edit (discard)"),
            Hint::new("arrows", "Move"),
        ];
    }

    let scroll = Hint::new(
        format!("{}/{}", keys.display(Action::Up), keys.display(Action::Down)),
        "Scroll",
    );
    match state.view {
        View::List => vec![
            Hint::action(keys, Action::Select, "Details"),
            Hint::action(keys, Action::Logs, "Logs"),
            Hint::action(keys, Action::Code, "Code"),
            Hint::action(keys, Action::Metrics, "Metrics"),
            Hint::action(keys, Action::Download, "Download"),
            Hint::action(keys, Action::Filter, "Filter"),
            Hint::action(keys, Action::Command, "Command"),
            Hint::action(keys, Action::Refresh, "Refresh"),
            Hint::action(keys, Action::Quit, "Quit"),
        ],
        View::Logs => vec![
            Hint::action(
                keys,
                Action::ToggleStream,
                if state.stream.is_some() {
                    "Stop stream"
                } else {
                    "Live stream"
                },
            ),
            Hint::action(keys, Action::Logs, "Reload"),
            scroll,
            Hint::action(keys, Action::Back, "Back"),
        ],
        View::Code => vec![
            Hint::action(keys, Action::ViewFiles, "View files"),
            Hint::action(keys, Action::ToggleEdit, "Edit (Esc exits)"),
            scroll,
            Hint::action(keys, Action::Back, "Back"),
        ],
        View::Metrics => vec![
            Hint::action(keys, Action::Metrics, "Reload"),
            Hint::action(keys, Action::Back, "Back"),
        ],
        View::Detail | View::CodeFiles => vec![scroll, Hint::action(keys, Action::Back, "Back")],
    }
}

fn render_hints(frame: &mut Frame, area: Rect, theme: &Theme, hints: &[Hint]) {
    if hints.is_empty() || area.height == 0 {
        return;
    }

    // Align the separators in each column regardless of key length.
    let max_key_w = hints.iter().map(|h| h.key.chars().count()).max().unwrap_or(1);
    let max_desc_w = hints.iter().map(|h| h.description.len()).max().unwrap_or(1);
    let col_width = u16::try_from(max_key_w + 3 + max_desc_w + 2).unwrap_or(u16::MAX);
    let num_cols = usize::from((area.width / col_width).max(1));
    let num_rows = usize::from(area.height);

    let mut columns: Vec<Vec<Line>> = vec![Vec::new(); num_cols];
    for (i, hint) in hints.iter().enumerate() {
        let col = i / num_rows;
        if col >= num_cols {
            break;
        }
        columns[col].push(Line::from(vec![
            Span::styled(
                format!("{:>max_key_w$}", hint.key),
                Style::default().fg(theme.peach),
            ),
            Span::styled(" │ ", Style::default().fg(theme.surface2)),
            Span::styled(hint.description, Style::default().fg(theme.subtext0)),
        ]));
    }

    let areas = Layout::horizontal(vec![Constraint::Length(col_width); num_cols]).split(area);
    for (lines, col_area) in columns.into_iter().zip(areas.iter()) {
        frame.render_widget(Paragraph::new(lines), *col_area);
    }
}

fn render_logo(frame: &mut Frame, area: Rect, theme: &Theme) {
    let style = Style::default().fg(theme.mauve).add_modifier(Modifier::BOLD);
    let lines: Vec<Line> = LOGO.iter().map(|l| Line::from(Span::styled(*l, style))).collect();
    frame.render_widget(Paragraph::new(lines), area);
}

/// `     label value`, label right-aligned.
fn status_line<'a>(
    label: &'a str,
    value: &str,
    max_width: usize,
    label_style: Style,
    value_style: Style,
) -> Line<'a> {
    const LABEL_W: usize = 10;
    let available = max_width.saturating_sub(LABEL_W + 1);
    Line::from(vec![
        Span::styled(format!("{label:>LABEL_W$}"), label_style),
        Span::raw(" "),
        Span::styled(truncate_str(value, available), value_style),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Settings;

    #[test]
    fn test_breadcrumb_names_function() {
        let mut state = AppState::new(Settings::default(), 80, 24);
        assert_eq!(breadcrumb(&state), "Functions");
        state.view = View::Logs;
        state.selected = Some("orders".to_string());
        assert_eq!(breadcrumb(&state), "Functions > orders > Logs");
        state.view = View::CodeFiles;
        assert_eq!(breadcrumb(&state), "Functions > orders > Code > Code Files");
    }

    #[test]
    fn test_editor_hints_name_the_exit_key() {
        let mut state = AppState::new(Settings::default(), 80, 24);
        state.view = View::Code;
        let keys = KeyResolver::default();
        let edit = hints_for(&state, &keys);
        assert!(edit.iter().any(|h| h.description == "Edit (Esc exits)"));

        state.editor = Some(crate::input::EditBuffer::new("fn main() {}"));
        let hints = hints_for(&state, &keys);
        let exit = hints.iter().find(|h| h.description.starts_with("Exit edit")).unwrap();
        assert_eq!(exit.key, keys.display(Action::Back));
        assert!(hints.iter().all(|h| h.description != "Edit (Esc exits)"));
    }

    #[test]
    fn test_hints_follow_keybindings() {
        let state = AppState::new(Settings::default(), 80, 24);
        let hints = hints_for(&state, &KeyResolver::default());
        let filter = hints.iter().find(|h| h.description == "Filter").unwrap();
        assert_eq!(filter.key, "\\");
    }
}
