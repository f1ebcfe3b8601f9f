//! Editable text buffers: the one-line filter/command prompt and the
//! multi-line code editor.
//!
//! Cursors are counted in characters, not bytes.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What a key did to a [`LineInput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Edited,
    Submitted(String),
    Cancelled,
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineInput {
    value: String,
    cursor: usize,
}

fn byte_index(s: &str, char_index: usize) -> usize {
    s.char_indices().nth(char_index).map_or(s.len(), |(i, _)| i)
}

impl LineInput {
    pub fn with_value(value: impl Into<String>) -> Self {
        let value = value.into();
        let cursor = value.chars().count();
        Self { value, cursor }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    fn len(&self) -> usize {
        self.value.chars().count()
    }

    fn insert_char(&mut self, c: char) {
        let at = byte_index(&self.value, self.cursor);
        self.value.insert(at, c);
        self.cursor += 1;
    }

    fn delete_char_before_cursor(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let at = byte_index(&self.value, self.cursor);
            self.value.remove(at);
        }
    }

    fn delete_char_at_cursor(&mut self) {
        if self.cursor < self.len() {
            let at = byte_index(&self.value, self.cursor);
            self.value.remove(at);
        }
    }

    fn delete_word_before_cursor(&mut self) {
        let chars: Vec<char> = self.value.chars().collect();
        let mut pos = self.cursor;
        while pos > 0 && chars[pos - 1] == ' ' {
            pos -= 1;
        }
        while pos > 0 && chars[pos - 1] != ' ' {
            pos -= 1;
        }
        let start = byte_index(&self.value, pos);
        let end = byte_index(&self.value, self.cursor);
        self.value.drain(start..end);
        self.cursor = pos;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> LineEvent {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => LineEvent::Submitted(self.value.clone()),
            (KeyCode::Esc, _) => LineEvent::Cancelled,

            (KeyCode::Backspace, KeyModifiers::ALT) | (KeyCode::Char('w'), KeyModifiers::CONTROL) => {
                self.delete_word_before_cursor();
                LineEvent::Edited
            }
            (KeyCode::Backspace, _) => {
                self.delete_char_before_cursor();
                LineEvent::Edited
            }
            (KeyCode::Delete, _) => {
                self.delete_char_at_cursor();
                LineEvent::Edited
            }
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.value.clear();
                self.cursor = 0;
                LineEvent::Edited
            }

            (KeyCode::Left, _) => {
                self.cursor = self.cursor.saturating_sub(1);
                LineEvent::Ignored
            }
            (KeyCode::Right, _) => {
                self.cursor = (self.cursor + 1).min(self.len());
                LineEvent::Ignored
            }
            (KeyCode::Home, _) | (KeyCode::Char('a'), KeyModifiers::CONTROL) => {
                self.cursor = 0;
                LineEvent::Ignored
            }
            (KeyCode::End, _) | (KeyCode::Char('e'), KeyModifiers::CONTROL) => {
                self.cursor = self.len();
                LineEvent::Ignored
            }

            (KeyCode::Char(c), KeyModifiers::NONE | KeyModifiers::SHIFT) => {
                self.insert_char(c);
                LineEvent::Edited
            }
            _ => LineEvent::Ignored,
        }
    }
}

/// Multi-line buffer for in-place code edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    lines: Vec<String>,
    row: usize,
    col: usize,
    dirty: bool,
}

const TAB: &str = "    ";

impl EditBuffer {
    pub fn new(text: &str) -> Self {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        Self {
            lines,
            row: 0,
            col: 0,
            dirty: false,
        }
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub const fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn line_len(&self, row: usize) -> usize {
        self.lines[row].chars().count()
    }

    fn clamp_col(&mut self) {
        self.col = self.col.min(self.line_len(self.row));
    }

    fn insert_str(&mut self, s: &str) {
        let line = &mut self.lines[self.row];
        let at = byte_index(line, self.col);
        line.insert_str(at, s);
        self.col += s.chars().count();
        self.dirty = true;
    }

    fn split_line(&mut self) {
        let line = &mut self.lines[self.row];
        let at = byte_index(line, self.col);
        let rest = line.split_off(at);
        self.row += 1;
        self.col = 0;
        self.lines.insert(self.row, rest);
        self.dirty = true;
    }

    fn backspace(&mut self) {
        if self.col > 0 {
            self.col -= 1;
            let line = &mut self.lines[self.row];
            let at = byte_index(line, self.col);
            line.remove(at);
            self.dirty = true;
        } else if self.row > 0 {
            let current = self.lines.remove(self.row);
            self.row -= 1;
            self.col = self.line_len(self.row);
            self.lines[self.row].push_str(&current);
            self.dirty = true;
        }
    }

    fn delete(&mut self) {
        if self.col < self.line_len(self.row) {
            let line = &mut self.lines[self.row];
            let at = byte_index(line, self.col);
            line.remove(at);
            self.dirty = true;
        } else if self.row + 1 < self.lines.len() {
            let next = self.lines.remove(self.row + 1);
            self.lines[self.row].push_str(&next);
            self.dirty = true;
        }
    }

    /// Apply an editing key. Returns `false` for keys the editor does not use.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match (key.code, key.modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE | KeyModifiers::SHIFT) => {
                let mut buf = [0; 4];
                self.insert_str(c.encode_utf8(&mut buf));
            }
            (KeyCode::Tab, _) => self.insert_str(TAB),
            (KeyCode::Enter, _) => self.split_line(),
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => {
                if self.col > 0 {
                    self.col -= 1;
                } else if self.row > 0 {
                    self.row -= 1;
                    self.col = self.line_len(self.row);
                }
            }
            (KeyCode::Right, _) => {
                if self.col < self.line_len(self.row) {
                    self.col += 1;
                } else if self.row + 1 < self.lines.len() {
                    self.row += 1;
                    self.col = 0;
                }
            }
            (KeyCode::Up, _) => {
                self.row = self.row.saturating_sub(1);
                self.clamp_col();
            }
            (KeyCode::Down, _) => {
                self.row = (self.row + 1).min(self.lines.len() - 1);
                self.clamp_col();
            }
            (KeyCode::Home, _) => self.col = 0,
            (KeyCode::End, _) => self.col = self.line_len(self.row),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_str(input: &mut LineInput, s: &str) {
        for c in s.chars() {
            input.handle_key(press(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_line_input_editing() {
        let mut input = LineInput::default();
        type_str(&mut input, "payment");
        assert_eq!(input.handle_key(press(KeyCode::Backspace)), LineEvent::Edited);
        assert_eq!(input.value(), "paymen");

        input.handle_key(press(KeyCode::Home));
        input.handle_key(press(KeyCode::Delete));
        assert_eq!(input.value(), "aymen");
        assert_eq!(
            input.handle_key(press(KeyCode::Enter)),
            LineEvent::Submitted("aymen".to_string())
        );
        assert_eq!(input.handle_key(press(KeyCode::Esc)), LineEvent::Cancelled);
    }

    #[test]
    fn test_line_input_multibyte() {
        let mut input = LineInput::with_value("héllo");
        input.handle_key(press(KeyCode::Left));
        input.handle_key(press(KeyCode::Left));
        input.handle_key(press(KeyCode::Left));
        input.handle_key(press(KeyCode::Backspace));
        assert_eq!(input.value(), "hllo");
        assert_eq!(input.cursor(), 1);
    }

    #[test]
    fn test_delete_word() {
        let mut input = LineInput::with_value("fn list  ");
        input.handle_key(KeyEvent::new(KeyCode::Backspace, KeyModifiers::ALT));
        assert_eq!(input.value(), "fn ");
    }

    #[test]
    fn test_edit_buffer_split_and_join() {
        let mut buffer = EditBuffer::new("def handler():\n    return 1");
        buffer.handle_key(press(KeyCode::End));
        buffer.handle_key(press(KeyCode::Enter));
        buffer.handle_key(press(KeyCode::Tab));
        for c in "pass".chars() {
            buffer.handle_key(press(KeyCode::Char(c)));
        }
        assert_eq!(buffer.text(), "def handler():\n    pass\n    return 1");
        assert!(buffer.is_dirty());

        buffer.handle_key(press(KeyCode::Home));
        buffer.handle_key(press(KeyCode::Backspace));
        assert_eq!(buffer.text(), "def handler():    pass\n    return 1");
        assert_eq!(buffer.cursor(), (0, 14));
    }

    #[test]
    fn test_edit_buffer_cursor_clamps() {
        let mut buffer = EditBuffer::new("long line here\nx");
        buffer.handle_key(press(KeyCode::End));
        buffer.handle_key(press(KeyCode::Down));
        assert_eq!(buffer.cursor(), (1, 1));
        buffer.handle_key(press(KeyCode::Down));
        assert_eq!(buffer.cursor(), (1, 1));
        assert!(!buffer.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL)));
        assert!(!buffer.is_dirty());
    }
}
