//! Keyboard event types.
//!
//! ringnav defines its own key event types rather than exposing crossterm's
//! directly, so hosts with other event sources can construct events by hand.
//! `From` conversions are provided for crossterm's native events.

use crossterm::event as ct;

/// Key codes relevant to navigation.
///
/// Anything the engine does not route is folded into [`KeyCode::Other`] and
/// reported as ignored, so the host's own handlers still see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A printable character.
    Char(char),
    /// Enter / Return.
    Enter,
    /// Tab.
    Tab,
    /// Shift+Tab (crossterm reports this as a distinct code).
    BackTab,
    /// Escape.
    Esc,
    /// Backspace.
    Backspace,
    /// Arrow up.
    Up,
    /// Arrow down.
    Down,
    /// Arrow left.
    Left,
    /// Arrow right.
    Right,
    /// Any other key; never routed by the engine.
    Other,
}

/// Modifier key state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyModifiers {
    /// Control key held.
    pub ctrl: bool,
    /// Shift key held.
    pub shift: bool,
    /// Alt/Option key held.
    pub alt: bool,
}

impl KeyModifiers {
    /// No modifiers held.
    pub const NONE: Self = Self {
        ctrl: false,
        shift: false,
        alt: false,
    };

    /// Shift only.
    pub const SHIFT: Self = Self {
        ctrl: false,
        shift: true,
        alt: false,
    };

    /// Control only.
    pub const CTRL: Self = Self {
        ctrl: true,
        shift: false,
        alt: false,
    };
}

/// A single key press as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// The key that was pressed.
    pub code: KeyCode,
    /// Modifier state at press time.
    pub modifiers: KeyModifiers,
}

impl KeyEvent {
    /// Create a key event with no modifiers.
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::NONE,
        }
    }

    /// Create a key event with the given modifiers.
    pub const fn with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    /// Plain Enter (no modifiers).
    pub fn is_enter(&self) -> bool {
        self.code == KeyCode::Enter && !self.modifiers.shift
    }

    /// Shift+Enter.
    pub fn is_shift_enter(&self) -> bool {
        self.code == KeyCode::Enter && self.modifiers.shift
    }

    /// Tab moving backward: either BackTab or Shift+Tab.
    pub fn is_back_tab(&self) -> bool {
        self.code == KeyCode::BackTab || (self.code == KeyCode::Tab && self.modifiers.shift)
    }

    /// Tab moving forward.
    pub fn is_forward_tab(&self) -> bool {
        self.code == KeyCode::Tab && !self.modifiers.shift
    }
}

impl From<ct::KeyCode> for KeyCode {
    fn from(code: ct::KeyCode) -> Self {
        match code {
            ct::KeyCode::Char(c) => Self::Char(c),
            ct::KeyCode::Enter => Self::Enter,
            ct::KeyCode::Tab => Self::Tab,
            ct::KeyCode::BackTab => Self::BackTab,
            ct::KeyCode::Esc => Self::Esc,
            ct::KeyCode::Backspace => Self::Backspace,
            ct::KeyCode::Up => Self::Up,
            ct::KeyCode::Down => Self::Down,
            ct::KeyCode::Left => Self::Left,
            ct::KeyCode::Right => Self::Right,
            _ => Self::Other,
        }
    }
}

impl From<ct::KeyModifiers> for KeyModifiers {
    fn from(mods: ct::KeyModifiers) -> Self {
        Self {
            ctrl: mods.contains(ct::KeyModifiers::CONTROL),
            shift: mods.contains(ct::KeyModifiers::SHIFT),
            alt: mods.contains(ct::KeyModifiers::ALT),
        }
    }
}

impl From<ct::KeyEvent> for KeyEvent {
    fn from(event: ct::KeyEvent) -> Self {
        Self {
            code: event.code.into(),
            modifiers: event.modifiers.into(),
        }
    }
}

/// Result of offering a key event to the engine.
///
/// [`EventResult::Consumed`] means "default prevented and propagation
/// stopped": the host must not run its own handling for this event.
/// [`EventResult::Ignored`] means native behavior proceeds untouched; this is
/// how the navigation-chrome carve-out is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    /// The engine handled the event; the host must not.
    Consumed,
    /// The engine did not claim the event.
    Ignored,
}

impl EventResult {
    /// True if the event was consumed.
    pub const fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_classification() {
        let enter = KeyEvent::new(KeyCode::Enter);
        assert!(enter.is_enter());
        assert!(!enter.is_shift_enter());

        let shift_enter = KeyEvent::with_modifiers(KeyCode::Enter, KeyModifiers::SHIFT);
        assert!(shift_enter.is_shift_enter());
        assert!(!shift_enter.is_enter());
    }

    #[test]
    fn test_back_tab_both_encodings() {
        // Some terminals report Shift+Tab as BackTab, others as Tab+SHIFT.
        assert!(KeyEvent::new(KeyCode::BackTab).is_back_tab());
        assert!(KeyEvent::with_modifiers(KeyCode::Tab, KeyModifiers::SHIFT).is_back_tab());
        assert!(!KeyEvent::new(KeyCode::Tab).is_back_tab());
        assert!(KeyEvent::new(KeyCode::Tab).is_forward_tab());
    }

    #[test]
    fn test_crossterm_conversion() {
        let ct_event = ct::KeyEvent::new(ct::KeyCode::Enter, ct::KeyModifiers::SHIFT);
        let event = KeyEvent::from(ct_event);
        assert_eq!(event.code, KeyCode::Enter);
        assert!(event.modifiers.shift);
        assert!(!event.modifiers.ctrl);
    }

    #[test]
    fn test_unknown_keys_fold_to_other() {
        let ct_event = ct::KeyEvent::new(ct::KeyCode::F(5), ct::KeyModifiers::NONE);
        assert_eq!(KeyEvent::from(ct_event).code, KeyCode::Other);
    }
}
