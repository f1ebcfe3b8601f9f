//! The main content pane, one renderer per [`View`].

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Sparkline, Table, TableState, Wrap};

use super::{scroll_offset, truncate_str};
use crate::input::EditBuffer;
use crate::model::{FunctionMetrics, FunctionSummary, MetricSeries};
use crate::state::{AppState, Loadable, LogSource, View};
use crate::theme::Theme;

const HEADERS: [&str; 5] = ["Name", "Runtime", "Memory", "Timeout", "Last Modified"];

pub fn render(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    match state.view {
        View::List => render_list(frame, area, state, theme),
        View::Detail => render_detail(frame, area, state, theme),
        View::Logs => render_logs(frame, area, state, theme),
        View::Code => match &state.editor {
            Some(editor) => render_editor(frame, area, state, editor, theme),
            None => render_text(frame, area, state, &state.code, "code information", theme),
        },
        View::CodeFiles => render_text(frame, area, state, &state.code_files, "code files", theme),
        View::Metrics => render_metrics(frame, area, state, theme),
    }
}

fn block<'a>(title: String, theme: &Theme) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(theme.border_type)
        .border_style(Style::default().fg(theme.border()))
        .title(title)
        .title_style(theme.title())
}

fn view_title(state: &AppState) -> String {
    match &state.selected {
        Some(name) => format!(" {}: {name} ", state.view.title()),
        None => format!(" {} ", state.view.title()),
    }
}

fn message(frame: &mut Frame, area: Rect, block: Block<'_>, text: String, style: Style) {
    frame.render_widget(
        Paragraph::new(text).style(style).wrap(Wrap { trim: false }).block(block),
        area,
    );
}

fn render_list(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let registry = &state.registry;
    let title = match &state.active_filter {
        Some(filter) => format!(
            " Functions ({}/{}) filter: {filter} ",
            registry.visible_len(),
            registry.all().len()
        ),
        None => format!(" Functions ({}) ", registry.all().len()),
    };
    let block = block(title, theme);

    if registry.visible_len() == 0 {
        let text = if state.is_loading() && registry.all().is_empty() {
            "Loading functions...".to_string()
        } else if registry.all().is_empty() {
            "No functions found".to_string()
        } else {
            format!("No functions match '{}'", state.prompt.value())
        };
        message(frame, area, block, text, Style::default().fg(theme.overlay1));
        return;
    }

    let widths = state.layout.columns;
    let header = Row::new(HEADERS.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(theme.header()).add_modifier(Modifier::BOLD))
    }))
    .style(Style::default().bg(theme.surface0));

    let rows = registry.visible().map(|f| {
        Row::new(function_cells(f, &widths)).style(Style::default().fg(theme.text))
    });

    let table = Table::new(rows, widths.map(Constraint::Length))
        .header(header)
        .block(block)
        .row_highlight_style(
            Style::default()
                .bg(theme.selection_bg())
                .fg(theme.lavender)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    let mut table_state = TableState::default().with_selected(Some(registry.cursor()));
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn function_cells(f: &FunctionSummary, widths: &[u16; 5]) -> Vec<Cell<'static>> {
    let fit = |text: &str, i: usize| truncate_str(text, usize::from(widths[i]));
    vec![
        Cell::from(fit(&f.name, 0)),
        Cell::from(fit(&f.runtime, 1)),
        Cell::from(fit(&format!("{} MB", f.memory_mb), 2)),
        Cell::from(fit(&format!("{}s", f.timeout_secs), 3)),
        Cell::from(fit(&f.last_modified, 4)),
    ]
}

fn render_detail(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let block = block(view_title(state), theme);
    let Some(function) = &state.detail else {
        message(frame, area, block, "No function selected".to_string(), Style::default());
        return;
    };

    let lines = detail_lines(function, theme);
    let viewport = area.height.saturating_sub(2);
    let offset = scroll_offset(state.scroll, lines.len(), viewport);
    frame.render_widget(Paragraph::new(lines).block(block).scroll((offset, 0)), area);
}

fn detail_lines(function: &FunctionSummary, theme: &Theme) -> Vec<Line<'static>> {
    let label = Style::default().fg(theme.overlay1);
    let value = Style::default().fg(theme.text);

    let mut lines: Vec<Line> = function
        .detail_fields()
        .into_iter()
        .map(|(name, text)| {
            Line::from(vec![
                Span::styled(format!("{name:>14}  "), label),
                Span::styled(text, value),
            ])
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("Environment Variables ({})", function.environment.len()),
        Style::default().fg(theme.header()).add_modifier(Modifier::BOLD),
    )));
    lines.extend(function.environment.iter().map(|(k, v)| {
        Line::from(vec![
            Span::styled(format!("  {k}"), Style::default().fg(theme.teal)),
            Span::styled(" = ", label),
            Span::styled(v.clone(), value),
        ])
    }));
    lines
}

fn render_logs(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let title = match (&state.log_source, &state.stream) {
        (LogSource::Live, Some(_)) => format!("{}(live) ", view_title(state)),
        (LogSource::Live, None) => format!("{}(stream ended) ", view_title(state)),
        (LogSource::Static, _) => view_title(state),
    };
    let block = block(title, theme);

    let lines: Vec<&String> = match state.log_source {
        LogSource::Live => state.live_logs.lines().collect(),
        LogSource::Static => match &state.logs {
            Loadable::Ready(lines) => lines.iter().collect(),
            other => {
                loadable_message(frame, area, block, other, "logs", theme);
                return;
            }
        },
    };
    render_lines(frame, area, block, &lines, state.scroll, |line| theme.log_line(line));
}

fn render_text(
    frame: &mut Frame,
    area: Rect,
    state: &AppState,
    content: &Loadable<String>,
    what: &str,
    theme: &Theme,
) {
    let block = block(view_title(state), theme);
    let Loadable::Ready(text) = content else {
        loadable_message(frame, area, block, content, what, theme);
        return;
    };
    let lines: Vec<&str> = text.lines().collect();
    let style = Style::default().fg(theme.text);
    render_lines(frame, area, block, &lines, state.scroll, |_| style);
}

fn loadable_message<T>(
    frame: &mut Frame,
    area: Rect,
    block: Block<'_>,
    content: &Loadable<T>,
    what: &str,
    theme: &Theme,
) {
    let (text, color) = match content {
        Loadable::Idle | Loadable::Ready(_) => (String::new(), theme.text),
        Loadable::Loading => (format!("Loading {what}..."), theme.overlay1),
        Loadable::Failed(err) => (format!("Failed to load {what}: {err}"), theme.red),
    };
    message(frame, area, block, text, Style::default().fg(color));
}

fn render_lines<S: AsRef<str>>(
    frame: &mut Frame,
    area: Rect,
    block: Block<'_>,
    lines: &[S],
    scroll: u16,
    style: impl Fn(&str) -> Style,
) {
    let viewport = area.height.saturating_sub(2);
    let offset = usize::from(scroll_offset(scroll, lines.len(), viewport));
    let visible: Vec<Line> = lines
        .iter()
        .skip(offset)
        .take(usize::from(viewport))
        .map(|line| {
            let line = line.as_ref();
            Line::styled(line.to_string(), style(line))
        })
        .collect();
    frame.render_widget(Paragraph::new(visible).block(block), area);
}

fn render_editor(frame: &mut Frame, area: Rect, state: &AppState, editor: &EditBuffer, theme: &Theme) {
    let marker = if editor.is_dirty() { " [modified]" } else { "" };
    let block = block(format!("{}(editing){marker} ", view_title(state)), theme)
        .border_style(Style::default().fg(theme.border_focused()));

    let viewport = usize::from(area.height.saturating_sub(2));
    let (row, col) = editor.cursor();
    // Keep the cursor row on screen.
    let offset = row.saturating_sub(viewport.saturating_sub(1));
    let text = Style::default().fg(theme.text);
    let cursor = Style::default().fg(theme.base).bg(theme.text);

    let lines: Vec<Line> = editor
        .lines()
        .iter()
        .enumerate()
        .skip(offset)
        .take(viewport)
        .map(|(i, line)| {
            if i != row {
                return Line::styled(line.clone(), text);
            }
            let before: String = line.chars().take(col).collect();
            let at = line.chars().nth(col).unwrap_or(' ');
            let after: String = line.chars().skip(col + 1).collect();
            Line::from(vec![
                Span::styled(before, text),
                Span::styled(at.to_string(), cursor),
                Span::styled(after, text),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_metrics(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let outer = block(view_title(state), theme);
    let metrics = match &state.metrics {
        Loadable::Ready(metrics) => metrics,
        other => {
            loadable_message(frame, area, outer, other, "metrics", theme);
            return;
        }
    };
    if !metrics.has_data() {
        let text = format!(
            "No metrics data available for {} between {} and {}",
            metrics.function_name,
            metrics.start.format("%H:%M"),
            metrics.end.format("%H:%M UTC")
        );
        message(frame, area, outer, text, Style::default().fg(theme.overlay1));
        return;
    }

    let inner = outer.inner(area);
    frame.render_widget(outer, area);
    let rows = Layout::vertical(vec![Constraint::Ratio(1, metric_count(metrics)); metrics.series.len()])
        .split(inner);
    for (series, row) in metrics.series.iter().zip(rows.iter()) {
        render_series(frame, *row, series, theme);
    }
}

fn metric_count(metrics: &FunctionMetrics) -> u32 {
    u32::try_from(metrics.series.len().max(1)).unwrap_or(1)
}

/// `min / max / avg / latest` for a series, with its unit.
pub(crate) fn series_summary(series: &MetricSeries) -> String {
    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    format!(
        "min {}  max {}  avg {}  latest {} {}",
        fmt(series.min()),
        fmt(series.max()),
        fmt(series.average()),
        fmt(series.latest()),
        series.unit
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sparkline_data(series: &MetricSeries) -> Vec<u64> {
    // Scaled so fractional values still show relative height.
    series
        .points()
        .iter()
        .map(|p| (p.value.max(0.0) * 100.0).round() as u64)
        .collect()
}

fn render_series(frame: &mut Frame, area: Rect, series: &MetricSeries, theme: &Theme) {
    let title = Line::from(vec![
        Span::styled(format!(" {} ", series.name), theme.title()),
        Span::styled(
            format!("{} ", truncate_str(&series.description, 40)),
            Style::default().fg(theme.overlay1),
        ),
    ]);
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(theme.surface1))
        .title(title)
        .title_bottom(Line::styled(
            series_summary(series),
            Style::default().fg(theme.subtext0),
        ));

    if series.is_empty() {
        message(frame, area, block, "No data points".to_string(), Style::default().fg(theme.overlay0));
        return;
    }
    let sparkline = Sparkline::default()
        .block(block)
        .data(sparkline_data(series))
        .style(Style::default().fg(theme.green));
    frame.render_widget(sparkline, area);
}
