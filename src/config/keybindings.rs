use crossterm::event::KeyCode;
use serde::{Deserialize, Serialize};

use crate::config::key::{Key, KeyBinding};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalKeybindings {
    pub quit: KeyBinding,
    pub back: KeyBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationKeybindings {
    pub up: KeyBinding,
    pub down: KeyBinding,
    pub page_up: KeyBinding,
    pub page_down: KeyBinding,
    pub home: KeyBinding,
    pub end: KeyBinding,
    pub select: KeyBinding,
}

/// Keys active on the function list (and reused by the views they open).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionKeybindings {
    pub refresh: KeyBinding,
    pub logs: KeyBinding,
    pub code: KeyBinding,
    pub metrics: KeyBinding,
    pub download: KeyBinding,
    pub filter: KeyBinding,
    pub command: KeyBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogKeybindings {
    pub stream: KeyBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeKeybindings {
    pub view_files: KeyBinding,
    pub toggle_edit: KeyBinding,
    pub save_edit: KeyBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeybindingsConfig {
    pub global: GlobalKeybindings,
    pub navigation: NavigationKeybindings,
    pub functions: FunctionKeybindings,
    pub logs: LogKeybindings,
    pub code: CodeKeybindings,
}

impl Default for GlobalKeybindings {
    fn default() -> Self {
        Self {
            quit: Key::char('q').into(),
            back: Key::new(KeyCode::Esc).into(),
        }
    }
}

impl Default for NavigationKeybindings {
    fn default() -> Self {
        Self {
            up: vec![Key::char('k'), Key::new(KeyCode::Up)].into(),
            down: vec![Key::char('j'), Key::new(KeyCode::Down)].into(),
            page_up: Key::new(KeyCode::PageUp).into(),
            page_down: Key::new(KeyCode::PageDown).into(),
            home: vec![Key::char('g'), Key::new(KeyCode::Home)].into(),
            end: vec![Key::char('G'), Key::new(KeyCode::End)].into(),
            select: Key::new(KeyCode::Enter).into(),
        }
    }
}

impl Default for FunctionKeybindings {
    fn default() -> Self {
        Self {
            refresh: Key::char('r').into(),
            logs: Key::char('l').into(),
            code: Key::char('c').into(),
            metrics: Key::char('m').into(),
            download: Key::char('w').into(),
            filter: Key::char('\\').into(),
            command: Key::char(':').into(),
        }
    }
}

impl Default for LogKeybindings {
    fn default() -> Self {
        Self {
            stream: Key::char('s').into(),
        }
    }
}

impl Default for CodeKeybindings {
    fn default() -> Self {
        Self {
            view_files: Key::char('v').into(),
            toggle_edit: Key::char('e').into(),
            save_edit: Key::with_ctrl(KeyCode::Char('s')).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: KeybindingsConfig = toml::from_str(
            r#"
            [functions]
            download = "d"
            "#,
        )
        .unwrap();

        assert_eq!(config.functions.download, Key::char('d').into());
        assert_eq!(config.functions.logs, Key::char('l').into());
        assert_eq!(config.logs.stream, Key::char('s').into());
    }
}
