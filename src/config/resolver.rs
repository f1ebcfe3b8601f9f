use std::sync::Arc;

use crossterm::event::KeyEvent;

use crate::config::actions::Action;
use crate::config::key::KeyBinding;
use crate::config::keybindings::KeybindingsConfig;

/// Maps raw key events onto logical [`Action`]s using the configured bindings.
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    pub keybindings: Arc<KeybindingsConfig>,
}

impl KeyResolver {
    pub const fn new(keybindings: Arc<KeybindingsConfig>) -> Self {
        Self { keybindings }
    }

    fn binding(&self, action: Action) -> &KeyBinding {
        let kb = &self.keybindings;
        match action {
            Action::Quit => &kb.global.quit,
            Action::Back => &kb.global.back,
            Action::Up => &kb.navigation.up,
            Action::Down => &kb.navigation.down,
            Action::PageUp => &kb.navigation.page_up,
            Action::PageDown => &kb.navigation.page_down,
            Action::Home => &kb.navigation.home,
            Action::End => &kb.navigation.end,
            Action::Select => &kb.navigation.select,
            Action::Refresh => &kb.functions.refresh,
            Action::Logs => &kb.functions.logs,
            Action::Code => &kb.functions.code,
            Action::Metrics => &kb.functions.metrics,
            Action::Download => &kb.functions.download,
            Action::Filter => &kb.functions.filter,
            Action::Command => &kb.functions.command,
            Action::ToggleStream => &kb.logs.stream,
            Action::ViewFiles => &kb.code.view_files,
            Action::ToggleEdit => &kb.code.toggle_edit,
            Action::SaveEdit => &kb.code.save_edit,
        }
    }

    pub fn matches(&self, event: &KeyEvent, action: Action) -> bool {
        self.binding(action).matches(event)
    }

    /// First action bound to `event`, in [`Action::ALL`] order.
    pub fn resolve(&self, event: &KeyEvent) -> Option<Action> {
        Action::ALL
            .into_iter()
            .find(|&action| self.matches(event, action))
    }

    pub fn display(&self, action: Action) -> String {
        self.binding(action).display()
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyModifiers};

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_default_bindings_resolve() {
        let resolver = KeyResolver::default();
        assert_eq!(resolver.resolve(&key(KeyCode::Char('q'))), Some(Action::Quit));
        assert_eq!(resolver.resolve(&key(KeyCode::Esc)), Some(Action::Back));
        assert_eq!(resolver.resolve(&key(KeyCode::Char('\\'))), Some(Action::Filter));
        assert_eq!(resolver.resolve(&key(KeyCode::Char(':'))), Some(Action::Command));
        assert_eq!(resolver.resolve(&key(KeyCode::Char('w'))), Some(Action::Download));
        assert_eq!(resolver.resolve(&key(KeyCode::Down)), Some(Action::Down));
        assert_eq!(resolver.resolve(&key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_save_combo_wins_over_stream_key() {
        let resolver = KeyResolver::default();
        let ctrl_s = KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL);
        assert_eq!(resolver.resolve(&ctrl_s), Some(Action::SaveEdit));
        assert_eq!(
            resolver.resolve(&key(KeyCode::Char('s'))),
            Some(Action::ToggleStream)
        );
    }

    #[test]
    fn test_display_joins_alternatives() {
        let resolver = KeyResolver::default();
        assert_eq!(resolver.display(Action::Up), "k/↑");
        assert_eq!(resolver.display(Action::SaveEdit), "ctrl+s");
    }
}
