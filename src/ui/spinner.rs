use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::style::Style;
use throbber_widgets_tui::WhichUse::Spin;
use throbber_widgets_tui::{BRAILLE_SIX, Throbber, ThrobberState};

use crate::theme::Theme;

/// Busy indicator shown in the footer while background work is running.
#[derive(Default)]
pub struct Spinner {
    state: ThrobberState,
}

impl Spinner {
    /// Advance one frame; called on every tick.
    pub fn tick(&mut self) {
        self.state.calc_next();
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect, theme: &Theme, label: &str) {
        let throbber = Throbber::default()
            .throbber_set(BRAILLE_SIX)
            .use_type(Spin)
            .throbber_style(Style::default().fg(theme.lavender))
            .style(Style::default().fg(theme.subtext1))
            .label(label.to_string());

        // Glyph, a space, then the label.
        let width = u16::try_from(label.chars().count() + 2).unwrap_or(area.width);
        let area = area.centered(Constraint::Length(width.min(area.width)), Constraint::Length(1));
        frame.render_stateful_widget(throbber, area, &mut self.state);
    }
}
