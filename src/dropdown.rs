//! Per-field dropdown sub-controller.
//!
//! Each searchable-select field owns one [`DropdownController`]: a two-state
//! machine (`Closed`/`Open`) with a clamped highlight index over the caller's
//! option list. Opening is Enter-only: arrow keys on a closed dropdown do
//! nothing, a deliberate choice so tabbing across a form never reveals
//! options by accident.
//!
//! The option list is whatever the caller last supplied. Printable keys typed
//! while open accumulate in a query buffer, but the engine does not filter
//! the list itself: the observed production behavior renders every option
//! regardless of typed text, leaving filtering to the caller.
//!
//! Popup positioning is presentational: the controller recomputes its anchor
//! rectangle when it opens and on viewport scroll/resize *while open*, via a
//! caller-supplied provider. A closed controller never recomputes; the
//! "listener" stops with the popup.

use crate::events::{KeyCode, KeyEvent};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Popup anchor rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnchorRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width of the field the popup aligns to.
    pub width: u32,
    /// Height of the field.
    pub height: u32,
}

/// Caller-supplied anchor computation (the field's current bounding box).
pub type AnchorProvider = Arc<dyn Fn() -> AnchorRect + Send + Sync>;

/// What a key event did to the dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropdownReply {
    /// The dropdown opened (highlight reset to 0).
    Opened,
    /// The highlight moved to this index.
    Highlighted(usize),
    /// Enter confirmed a selection and the dropdown closed.
    ///
    /// `None` when there was nothing to confirm (empty option list); the
    /// dropdown still closes and navigation still advances.
    Confirmed(Option<String>),
    /// The dropdown closed without confirming (Escape/Tab).
    ClosedWithoutSelection,
    /// A printable key edited the query buffer.
    Typed,
    /// The event is not the dropdown's to handle.
    NotHandled,
}

#[derive(Default)]
struct DropdownInner {
    open: bool,
    highlight: usize,
    options: Vec<String>,
    query: String,
    anchor: Option<AnchorRect>,
}

/// State machine for one searchable-select field.
#[derive(Default)]
pub struct DropdownController {
    inner: Mutex<DropdownInner>,
    anchor_provider: RwLock<Option<AnchorProvider>>,
}

impl DropdownController {
    /// Create a closed controller with no options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a closed controller with an initial option list.
    pub fn with_options(options: Vec<String>) -> Self {
        let ctl = Self::new();
        ctl.set_options(options);
        ctl
    }

    /// Replace the option list; clamps the highlight if open.
    pub fn set_options(&self, options: Vec<String>) {
        let mut inner = self.inner.lock();
        inner.options = options;
        if inner.open && !inner.options.is_empty() {
            inner.highlight = inner.highlight.min(inner.options.len() - 1);
        } else {
            inner.highlight = 0;
        }
    }

    /// Install the anchor-rect provider.
    pub fn set_anchor_provider<F>(&self, f: F)
    where
        F: Fn() -> AnchorRect + Send + Sync + 'static,
    {
        *self.anchor_provider.write() = Some(Arc::new(f));
    }

    /// True while the popup is open.
    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Current highlight index (meaningful only while open).
    pub fn highlight(&self) -> usize {
        self.inner.lock().highlight
    }

    /// Text typed while open.
    pub fn query(&self) -> String {
        self.inner.lock().query.clone()
    }

    /// Last computed anchor rectangle, if any.
    pub fn anchor(&self) -> Option<AnchorRect> {
        self.inner.lock().anchor
    }

    /// Number of options currently supplied.
    pub fn option_count(&self) -> usize {
        self.inner.lock().options.len()
    }

    fn compute_anchor(&self) -> Option<AnchorRect> {
        self.anchor_provider.read().as_ref().map(|f| f())
    }

    /// Open the popup: highlight 0, fresh anchor.
    pub fn open(&self) {
        let anchor = self.compute_anchor();
        let mut inner = self.inner.lock();
        inner.open = true;
        inner.highlight = 0;
        inner.anchor = anchor;
    }

    /// Close the popup and reset highlight and query.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.open = false;
        inner.highlight = 0;
        inner.query.clear();
        inner.anchor = None;
    }

    /// Force-close from a global event (outside click, window blur).
    ///
    /// Identical to [`close`](Self::close); named separately so call sites
    /// read as what they are.
    pub fn force_close(&self) {
        self.close();
    }

    /// Recompute the anchor after a viewport scroll/resize.
    ///
    /// No-op while closed.
    pub fn viewport_changed(&self) {
        let mut inner = self.inner.lock();
        if !inner.open {
            return;
        }
        drop(inner);
        let anchor = self.compute_anchor();
        inner = self.inner.lock();
        if inner.open {
            inner.anchor = anchor;
        }
    }

    /// Offer a key event to the controller.
    pub fn handle_key(&self, event: &KeyEvent) -> DropdownReply {
        let mut inner = self.inner.lock();

        if !inner.open {
            // Enter-only opening; arrows on a closed dropdown change nothing.
            if event.code == KeyCode::Enter && !event.modifiers.shift {
                drop(inner);
                self.open();
                return DropdownReply::Opened;
            }
            return DropdownReply::NotHandled;
        }

        match event.code {
            KeyCode::Down => {
                if !inner.options.is_empty() {
                    inner.highlight = (inner.highlight + 1).min(inner.options.len() - 1);
                }
                DropdownReply::Highlighted(inner.highlight)
            }
            KeyCode::Up => {
                inner.highlight = inner.highlight.saturating_sub(1);
                DropdownReply::Highlighted(inner.highlight)
            }
            // Shift+Enter while open confirms like plain Enter; reversing
            // inside an open popup has no defined meaning.
            KeyCode::Enter => {
                let value = inner.options.get(inner.highlight).cloned();
                inner.open = false;
                inner.highlight = 0;
                inner.query.clear();
                inner.anchor = None;
                DropdownReply::Confirmed(value)
            }
            KeyCode::Esc | KeyCode::Tab | KeyCode::BackTab => {
                inner.open = false;
                inner.highlight = 0;
                inner.query.clear();
                inner.anchor = None;
                DropdownReply::ClosedWithoutSelection
            }
            KeyCode::Char(c) => {
                inner.query.push(c);
                DropdownReply::Typed
            }
            KeyCode::Backspace => {
                inner.query.pop();
                DropdownReply::Typed
            }
            _ => DropdownReply::NotHandled,
        }
    }
}
