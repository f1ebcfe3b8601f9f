use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::state::{AppState, InputMode};
use crate::theme::Theme;

/// Draw the filter or command prompt with a block cursor.
pub fn render(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let (label, prefix, placeholder) = match state.mode {
        InputMode::Filter => ("Filter", "/", "name, runtime or description"),
        InputMode::Command => ("Command", ":", "q to quit, r to refresh"),
        InputMode::Normal => return,
    };

    let value = state.prompt.value();
    let input_style = Style::default().fg(theme.text);
    let cursor_style = Style::default()
        .fg(theme.base)
        .bg(theme.text)
        .add_modifier(Modifier::BOLD);

    let mut spans = vec![Span::styled(prefix, Style::default().fg(theme.peach))];
    if value.is_empty() {
        spans.push(Span::styled(" ", cursor_style));
        spans.push(Span::styled(placeholder, Style::default().fg(theme.overlay0)));
    } else {
        let cursor = state.prompt.cursor();
        let before: String = value.chars().take(cursor).collect();
        let at = value.chars().nth(cursor).unwrap_or(' ');
        let after: String = value.chars().skip(cursor + 1).collect();
        spans.push(Span::styled(before, input_style));
        spans.push(Span::styled(at.to_string(), cursor_style));
        spans.push(Span::styled(after, input_style));
    }

    let block = Block::default()
        .title(format!(" {label} (Enter to confirm, Esc to cancel) "))
        .title_style(theme.title())
        .borders(Borders::ALL)
        .border_type(theme.border_type)
        .border_style(Style::default().fg(theme.border_focused()))
        .style(Style::default().bg(theme.base));

    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}
