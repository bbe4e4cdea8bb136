//! The Enter / Shift+Enter state machine.
//!
//! Enter is overloaded to mean "confirm this field and move on": plain Enter
//! walks forward through the ordered ring of focusable elements, Shift+Enter
//! walks backward, and both wrap at the ends: a continuous ring, not a
//! bounded list. The terminal element of the ring (typically the row's
//! Add/Update control) is special: pressing Enter on it clicks it and wraps
//! focus back to the first element, closing the entry loop.
//!
//! The machine is a pure decision function over a ring slice. It never moves
//! focus, clicks, or defers anything itself; it returns a [`NavDecision`] and
//! the keyboard manager executes it. That keeps the same machine usable for
//! both a registry scope and a modal's focusable snapshot; the caller just
//! swaps the slice.
//!
//! Dropdown fields are resolved by the caller before this machine runs (an
//! open dropdown consumes Enter as a selection-confirm, a closed one opens);
//! by the time `decide` sees an element, it is a plain input or a button.

use crate::classify::{is_navigation_chrome, is_primary_action, is_secondary_action};
use crate::element::ElementHandle;
use crate::events::KeyEvent;
use std::sync::Arc;

/// Caller-supplied validation hook, consulted before forward advances only.
///
/// Returns `true` when the field's current value is acceptable. Reversal
/// never validates: it must always be possible to step backward to fix an
/// earlier field.
pub type Validator = Arc<dyn Fn(&ElementHandle) -> bool + Send + Sync>;

/// What the keyboard manager should do with an Enter-family key event.
#[derive(Clone)]
pub enum NavDecision {
    /// Navbar carve-out: do not intercept, let native behavior proceed.
    PassThrough,
    /// Move focus to this element now.
    FocusTo(ElementHandle),
    /// Click the terminal action, then (deferred, after the click's
    /// re-render settles) wrap focus back to the ring's first element.
    ClickAndWrap {
        /// The terminal action to click.
        action: ElementHandle,
        /// First element of the ring, focused as a deferred action.
        wrap_to: Option<ElementHandle>,
    },
    /// Click a non-terminal primary action; focus stays put.
    ClickOnly(ElementHandle),
    /// Validator rejected the current field: consume the event, keep focus,
    /// raise the validation-failure signal.
    ValidationBlocked(ElementHandle),
    /// Event is consumed but nothing happens (secondary actions, or a
    /// focused element unknown to the ring).
    Consumed,
    /// Not an Enter-family event; the machine does not apply.
    Ignored,
}

impl std::fmt::Debug for NavDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PassThrough => write!(f, "PassThrough"),
            Self::FocusTo(el) => write!(f, "FocusTo({})", el.key()),
            Self::ClickAndWrap { action, wrap_to } => write!(
                f,
                "ClickAndWrap({} -> {:?})",
                action.key(),
                wrap_to.as_ref().map(|el| el.key().to_string())
            ),
            Self::ClickOnly(el) => write!(f, "ClickOnly({})", el.key()),
            Self::ValidationBlocked(el) => write!(f, "ValidationBlocked({})", el.key()),
            Self::Consumed => write!(f, "Consumed"),
            Self::Ignored => write!(f, "Ignored"),
        }
    }
}

/// Decide how an Enter-family key event acts on `current` within `ring`.
///
/// `ring` is the ordered focus sequence currently in effect: a scope's
/// resolved entries, or the top modal's focusable snapshot.
pub fn decide(
    ring: &[ElementHandle],
    current: &ElementHandle,
    event: &KeyEvent,
    validator: Option<&Validator>,
) -> NavDecision {
    if !event.is_enter() && !event.is_shift_enter() {
        return NavDecision::Ignored;
    }

    // Deliberate carve-out: the app's top menu keeps native key semantics.
    if is_navigation_chrome(current) {
        return NavDecision::PassThrough;
    }

    // From here on the event is always hijacked (default-prevented), even
    // when it turns out there is nowhere to go.
    let Some(idx) = ring.iter().position(|el| el.key() == current.key()) else {
        return NavDecision::Consumed;
    };

    if event.is_shift_enter() {
        // Reverse: wrap position 1 to the last, never validate.
        let len = ring.len();
        return NavDecision::FocusTo(ring[(idx + len - 1) % len].clone());
    }

    if is_primary_action(current) {
        if idx + 1 == ring.len() {
            // Terminal commit control: click, then close the loop.
            return NavDecision::ClickAndWrap {
                action: current.clone(),
                wrap_to: ring.first().cloned(),
            };
        }
        return NavDecision::ClickOnly(current.clone());
    }

    if is_secondary_action(current) {
        // Cancel/Print/Delete-style buttons must never be triggered by
        // habitual Enter-pressing.
        return NavDecision::Consumed;
    }

    // Plain field advancing forward: gate on the validator first.
    if let Some(validate) = validator {
        if !validate(current) {
            return NavDecision::ValidationBlocked(current.clone());
        }
    }

    NavDecision::FocusTo(ring[(idx + 1) % ring.len()].clone())
}
