//! Key event contract (spec.md §4.6): a terminal-agnostic key description
//! and the closed set of editing commands it can resolve to.
//!
//! Deliberately decoupled from any terminal-event crate -- see `DESIGN.md`
//! for why `crossterm` is not a dependency here. The host adapter is
//! responsible for translating its terminal library's own key event type
//! into a [`KeyEvent`] before calling [`HostAdapter::handle_key`].

/// A single non-printable key, independent of any specific terminal crate's
/// encoding of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    Tab,
    Esc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { shift: false, ctrl: false, alt: false };

    pub fn ctrl() -> Self {
        Modifiers { ctrl: true, ..Self::NONE }
    }

    pub fn alt() -> Self {
        Modifiers { alt: true, ..Self::NONE }
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

/// A host-decoded key press: a code plus modifier flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(code: KeyCode, modifiers: Modifiers) -> Self {
        Self { code, modifiers }
    }

    pub fn plain(code: KeyCode) -> Self {
        Self { code, modifiers: Modifiers::NONE }
    }

    pub fn char(c: char) -> Self {
        Self { code: KeyCode::Char(c), modifiers: Modifiers::NONE }
    }
}

/// The closed set of commands the emacs-style input mode resolves a
/// [`KeyEvent`] to (spec.md §4.5.1/§4.6). Vim-mode key resolution is
/// stateful (pending operator/count) and lives in [`crate::host::HostAdapter`]
/// rather than this static table, since it depends on more than one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    InsertChar(char),
    InsertNewline,
    Backspace,
    Delete,
    DeleteWordLeft,
    DeleteWordRight,
    KillLineRight,
    KillLineLeft,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    MoveWordLeft,
    MoveWordRight,
    MoveHome,
    MoveEnd,
    Undo,
    Redo,
    OpenExternalEditor,
    Noop,
}

/// Resolve a plain (emacs-style) key event to a command. This is the
/// default mapping a host not running vim mode uses directly; a vim-mode
/// host instead feeds raw [`KeyEvent`]s through its own modal dispatcher
/// and only falls back to this table in insert mode.
pub fn resolve_emacs(event: KeyEvent) -> Command {
    use KeyCode::*;
    let m = event.modifiers;
    match (event.code, m.ctrl, m.alt) {
        (Char(c), false, false) => Command::InsertChar(c),
        (Enter, _, false) => Command::InsertNewline,
        (Backspace, false, false) => Command::Backspace,
        (Backspace, _, true) => Command::DeleteWordLeft,
        (Delete, false, false) => Command::Delete,
        (Delete, _, true) => Command::DeleteWordRight,
        (Char('w'), true, _) => Command::DeleteWordLeft,
        (Char('k'), true, _) => Command::KillLineRight,
        (Char('u'), true, _) => Command::KillLineLeft,
        (Char('z'), true, _) => Command::Undo,
        (Char('y'), true, _) => Command::Redo,
        (Char('x'), true, _) => Command::OpenExternalEditor,
        (Left, _, true) => Command::MoveWordLeft,
        (Right, _, true) => Command::MoveWordRight,
        (Left, _, false) => Command::MoveLeft,
        (Right, _, false) => Command::MoveRight,
        (Up, _, _) => Command::MoveUp,
        (Down, _, _) => Command::MoveDown,
        (Home, _, _) => Command::MoveHome,
        (End, _, _) => Command::MoveEnd,
        _ => Command::Noop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_char_inserts() {
        assert_eq!(resolve_emacs(KeyEvent::char('a')), Command::InsertChar('a'));
    }

    #[test]
    fn ctrl_w_deletes_word_left() {
        assert_eq!(resolve_emacs(KeyEvent::new(KeyCode::Char('w'), Modifiers::ctrl())), Command::DeleteWordLeft);
    }

    #[test]
    fn alt_backspace_deletes_word_left() {
        assert_eq!(resolve_emacs(KeyEvent::new(KeyCode::Backspace, Modifiers::alt())), Command::DeleteWordLeft);
    }

    #[test]
    fn unmapped_key_is_noop() {
        assert_eq!(resolve_emacs(KeyEvent::plain(KeyCode::Tab)), Command::Noop);
    }
}
