use catppuccin::PALETTE;
use ratatui::style::{Color, Style};
use ratatui::widgets::BorderType;

const fn rgb(c: &catppuccin::Color) -> Color {
    Color::Rgb(c.rgb.r, c.rgb.g, c.rgb.b)
}

/// Colors used by the dashboard, resolved from a Catppuccin flavor.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub base: Color,
    pub surface0: Color,
    pub surface1: Color,
    pub surface2: Color,
    pub overlay0: Color,
    pub overlay1: Color,
    pub text: Color,
    pub subtext0: Color,
    pub subtext1: Color,

    pub mauve: Color,
    pub lavender: Color,
    pub peach: Color,
    pub red: Color,
    pub yellow: Color,
    pub green: Color,
    pub blue: Color,
    pub sky: Color,
    pub teal: Color,

    pub border_type: BorderType,
}

impl Theme {
    const fn from_flavor(flavor: &catppuccin::Flavor) -> Self {
        let c = &flavor.colors;
        Self {
            base: rgb(&c.base),
            surface0: rgb(&c.surface0),
            surface1: rgb(&c.surface1),
            surface2: rgb(&c.surface2),
            overlay0: rgb(&c.overlay0),
            overlay1: rgb(&c.overlay1),
            text: rgb(&c.text),
            subtext0: rgb(&c.subtext0),
            subtext1: rgb(&c.subtext1),
            mauve: rgb(&c.mauve),
            lavender: rgb(&c.lavender),
            peach: rgb(&c.peach),
            red: rgb(&c.red),
            yellow: rgb(&c.yellow),
            green: rgb(&c.green),
            blue: rgb(&c.blue),
            sky: rgb(&c.sky),
            teal: rgb(&c.teal),
            border_type: BorderType::Rounded,
        }
    }

    #[must_use]
    pub fn catppuccin_mocha() -> Self {
        Self::from_flavor(&PALETTE.mocha)
    }

    #[must_use]
    pub fn catppuccin_macchiato() -> Self {
        Self::from_flavor(&PALETTE.macchiato)
    }

    #[must_use]
    pub fn catppuccin_frappe() -> Self {
        Self::from_flavor(&PALETTE.frappe)
    }

    #[must_use]
    pub fn catppuccin_latte() -> Self {
        Self::from_flavor(&PALETTE.latte)
    }

    #[must_use]
    pub const fn border(&self) -> Color {
        self.surface1
    }

    #[must_use]
    pub const fn border_focused(&self) -> Color {
        self.lavender
    }

    #[must_use]
    pub const fn header(&self) -> Color {
        self.yellow
    }

    #[must_use]
    pub const fn selection_bg(&self) -> Color {
        self.surface1
    }

    #[must_use]
    pub fn title(&self) -> Style {
        Style::default()
            .fg(self.mauve)
            .add_modifier(ratatui::style::Modifier::BOLD)
    }

    /// Color for a log line, keyed on the severity it carries.
    #[must_use]
    pub fn log_line(&self, line: &str) -> Style {
        let color = if line.starts_with("❌") || line.contains("] ERROR") || line.contains("] CRITICAL")
        {
            self.red
        } else if line.contains("] WARNING") || line.contains("] WARN") {
            self.yellow
        } else if line.contains("] DEBUG") {
            self.overlay1
        } else if line.starts_with("🔴") || line.starts_with("⏹") {
            self.peach
        } else {
            self.text
        };
        Style::default().fg(color)
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::catppuccin_mocha()
    }
}

const THEMES: &[(&str, fn() -> Theme)] = &[
    ("Catppuccin Mocha", Theme::catppuccin_mocha),
    ("Catppuccin Macchiato", Theme::catppuccin_macchiato),
    ("Catppuccin Frappé", Theme::catppuccin_frappe),
    ("Catppuccin Latte", Theme::catppuccin_latte),
];

/// Look up a theme by its configured name, falling back to Mocha.
pub fn theme_from_name(name: &str) -> Theme {
    THEMES
        .iter()
        .find(|(theme, _)| theme.eq_ignore_ascii_case(name))
        .map_or_else(
            || {
                tracing::warn!(theme = name, "Unknown theme, using default");
                Theme::default()
            },
            |(_, build)| build(),
        )
}
