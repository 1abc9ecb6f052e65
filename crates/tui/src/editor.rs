use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EditMode {
    Insert,
    Normal,
}

/// A multi-line text buffer with a byte-offset cursor that always sits on a
/// char boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EditorBuffer {
    text: String,
    cursor: usize,
    vim: bool,
    mode: EditMode,
}

impl EditorBuffer {
    pub(crate) fn new(text: impl Into<String>, vim: bool) -> Self {
        Self {
            text: text.into(),
            cursor: 0,
            vim,
            mode: if vim { EditMode::Normal } else { EditMode::Insert },
        }
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn mode(&self) -> EditMode {
        self.mode
    }

    pub(crate) fn set_vim(&mut self, vim: bool) {
        self.vim = vim;
        self.mode = if vim { EditMode::Normal } else { EditMode::Insert };
    }

    /// Zero-based line and char column of the cursor.
    pub(crate) fn cursor_position(&self) -> (usize, usize) {
        let head = &self.text[..self.cursor];
        let line = head.matches('\n').count();
        let column = head[self.line_start()..].chars().count();
        (line, column)
    }

    /// Applies a key. Returns `true` when the text changed.
    pub(crate) fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.mode {
            EditMode::Insert => self.handle_insert_key(key),
            EditMode::Normal => self.handle_normal_key(key),
        }
    }

    /// Replaces the `len` bytes before the cursor with `replacement`.
    pub(crate) fn replace_before_cursor(&mut self, len: usize, replacement: &str) {
        let start = self.cursor.saturating_sub(len);
        if !self.text.is_char_boundary(start) {
            return;
        }
        self.text.replace_range(start..self.cursor, replacement);
        self.cursor = start + replacement.len();
    }

    fn handle_insert_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
            return false;
        }
        match key.code {
            KeyCode::Char(character) => {
                self.insert(character);
                true
            }
            KeyCode::Enter => {
                self.insert('\n');
                true
            }
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete_forward(),
            KeyCode::Esc => {
                if self.vim {
                    self.mode = EditMode::Normal;
                    if self.cursor > self.line_start() {
                        self.cursor = self.previous_boundary();
                    }
                }
                false
            }
            other => {
                self.move_cursor(other);
                false
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('x') {
            return self.delete_forward();
        }
        match key.code {
            KeyCode::Char('i') => self.mode = EditMode::Insert,
            KeyCode::Char('a') => {
                self.cursor = self.next_boundary();
                self.mode = EditMode::Insert;
            }
            KeyCode::Char('h') => self.move_cursor(KeyCode::Left),
            KeyCode::Char('j') => self.move_cursor(KeyCode::Down),
            KeyCode::Char('k') => self.move_cursor(KeyCode::Up),
            KeyCode::Char('l') => self.move_cursor(KeyCode::Right),
            KeyCode::Char('0') => self.move_cursor(KeyCode::Home),
            KeyCode::Char('$') => self.move_cursor(KeyCode::End),
            other => self.move_cursor(other),
        }
        false
    }

    fn move_cursor(&mut self, code: KeyCode) {
        match code {
            KeyCode::Left => self.cursor = self.previous_boundary(),
            KeyCode::Right => self.cursor = self.next_boundary(),
            KeyCode::Home => self.cursor = self.line_start(),
            KeyCode::End => self.cursor = self.line_end(),
            KeyCode::Up => self.move_vertically(false),
            KeyCode::Down => self.move_vertically(true),
            _ => {}
        }
    }

    fn insert(&mut self, character: char) {
        self.text.insert(self.cursor, character);
        self.cursor += character.len_utf8();
    }

    fn backspace(&mut self) -> bool {
        let start = self.previous_boundary();
        if start == self.cursor {
            return false;
        }
        self.text.replace_range(start..self.cursor, "");
        self.cursor = start;
        true
    }

    fn delete_forward(&mut self) -> bool {
        let end = self.next_boundary();
        if end == self.cursor {
            return false;
        }
        self.text.replace_range(self.cursor..end, "");
        true
    }

    fn previous_boundary(&self) -> usize {
        self.text[..self.cursor]
            .chars()
            .next_back()
            .map_or(self.cursor, |character| self.cursor - character.len_utf8())
    }

    fn next_boundary(&self) -> usize {
        self.text[self.cursor..]
            .chars()
            .next()
            .map_or(self.cursor, |character| self.cursor + character.len_utf8())
    }

    fn line_start(&self) -> usize {
        line_start_at(&self.text, self.cursor)
    }

    fn line_end(&self) -> usize {
        line_end_at(&self.text, self.cursor)
    }

    fn move_vertically(&mut self, down: bool) {
        let (_, column) = self.cursor_position();
        let target_start = if down {
            let end = self.line_end();
            if end == self.text.len() {
                return;
            }
            end + 1
        } else {
            let start = self.line_start();
            if start == 0 {
                return;
            }
            line_start_at(&self.text, start - 1)
        };
        let target_end = line_end_at(&self.text, target_start);
        self.cursor = self.text[target_start..target_end]
            .char_indices()
            .nth(column)
            .map_or(target_end, |(offset, _)| target_start + offset);
    }
}

fn line_start_at(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map_or(0, |index| index + 1)
}

fn line_end_at(text: &str, offset: usize) -> usize {
    text[offset..]
        .find('\n')
        .map_or(text.len(), |index| offset + index)
}
