//! Rendering. Everything here reads [`AppState`] and draws it; nothing
//! mutates application state.

mod prompt;
mod spinner;
mod status_bar;
mod views;

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

pub use spinner::Spinner;

use crate::config::KeyResolver;
use crate::provider::CloudProvider;
use crate::state::{AppState, InputMode, StatusKind};
use crate::theme::Theme;

/// Height of the status bar, borders included.
const STATUS_BAR_HEIGHT: u16 = 9;
const PROMPT_HEIGHT: u16 = 3;

/// Session facts shown in the status bar that never change while running.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub provider: CloudProvider,
    pub region: String,
    pub environment: String,
}

pub struct Chrome<'a> {
    pub theme: &'a Theme,
    pub keys: &'a KeyResolver,
    pub session: &'a SessionInfo,
}

pub fn render(frame: &mut Frame, state: &AppState, chrome: &Chrome<'_>, spinner: &mut Spinner) {
    let prompt_height = if state.mode == InputMode::Normal {
        0
    } else {
        PROMPT_HEIGHT
    };
    let [header, body, prompt_area, footer] = Layout::vertical([
        Constraint::Length(STATUS_BAR_HEIGHT),
        Constraint::Min(3),
        Constraint::Length(prompt_height),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    status_bar::render(frame, header, state, chrome);
    views::render(frame, body, state, chrome.theme);
    if state.mode != InputMode::Normal {
        prompt::render(frame, prompt_area, state, chrome.theme);
    }
    render_footer(frame, footer, state, chrome.theme, spinner);
}

fn render_footer(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme, spinner: &mut Spinner) {
    let busy_width = if state.is_busy() { 24 } else { 0 };
    let [message, busy] =
        Layout::horizontal([Constraint::Min(10), Constraint::Length(busy_width)]).areas(area);

    if let Some(status) = &state.status {
        let color = match status.kind {
            StatusKind::Info => theme.sky,
            StatusKind::Error => theme.red,
        };
        let line = Line::from(vec![
            Span::raw(" "),
            Span::styled(status.text.as_str(), Style::default().fg(color)),
        ]);
        frame.render_widget(Paragraph::new(line), message);
    }

    if state.is_busy() {
        let label = if state.is_loading() {
            "Loading functions"
        } else {
            "Working"
        };
        spinner.render(frame, busy, theme, label);
    }
}

/// First visible line for a scroll request, clamped so the last page stays full.
pub(crate) fn scroll_offset(requested: u16, total_lines: usize, viewport: u16) -> u16 {
    let max = total_lines.saturating_sub(usize::from(viewport));
    let max = u16::try_from(max).unwrap_or(u16::MAX);
    requested.min(max)
}

/// Truncate to `max_width` characters, marking the cut with "...".
pub(crate) fn truncate_str(s: &str, max_width: usize) -> String {
    if s.chars().count() <= max_width {
        s.to_string()
    } else if max_width > 3 {
        let kept: String = s.chars().take(max_width - 3).collect();
        format!("{kept}...")
    } else {
        s.chars().take(max_width).collect()
    }
}

#[cfg(test)]
mod tests {
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    use super::*;
    use crate::model::FunctionSummary;
    use crate::state::Settings;

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(ratatui::buffer::Cell::symbol)
            .collect()
    }

    fn draw(state: &AppState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        let theme = Theme::default();
        let keys = KeyResolver::default();
        let session = SessionInfo {
            provider: CloudProvider::Aws,
            region: "eu-west-1".to_string(),
            environment: "dev".to_string(),
        };
        let chrome = Chrome {
            theme: &theme,
            keys: &keys,
            session: &session,
        };
        let mut spinner = Spinner::default();
        terminal
            .draw(|frame| render(frame, state, &chrome, &mut spinner))
            .unwrap();
        buffer_text(&terminal)
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("payment-handler", 10), "payment...");
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("héllo", 2), "hé");
    }

    #[test]
    fn test_scroll_offset_clamps() {
        assert_eq!(scroll_offset(u16::MAX, 50, 10), 40);
        assert_eq!(scroll_offset(5, 50, 10), 5);
        assert_eq!(scroll_offset(5, 3, 10), 0);
    }

    #[test]
    fn test_list_renders_functions_and_session() {
        let mut state = AppState::new(Settings::default(), 120, 40);
        state.registry.replace(
            vec![FunctionSummary {
                name: "orders-api".to_string(),
                runtime: "python3.12".to_string(),
                memory_mb: 256,
                ..FunctionSummary::default()
            }],
            "",
        );
        state.account = Some("123456789012".to_string());
        let text = draw(&state);
        assert!(text.contains("orders-api"));
        assert!(text.contains("python3.12"));
        assert!(text.contains("eu-west-1"));
        assert!(text.contains("123456789012"));
    }

    #[test]
    fn test_empty_registry_message() {
        let state = AppState::new(Settings::default(), 120, 40);
        assert!(draw(&state).contains("No functions found"));
    }
}
