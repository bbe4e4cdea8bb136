//! Deterministic Enter-key focus navigation for data-entry UIs.
//!
//! In high-speed tabular entry (ledgers, invoices, trade logs), the mouse is
//! a throughput bottleneck: the operator's hands stay on the keyboard and
//! Enter means "confirm this field and move on". This crate is the engine
//! behind that contract. It owns no rendering and no terminal I/O: the host
//! UI registers its focusable elements, forwards raw key events, and applies
//! the focus/click/close effects the engine decides on.
//!
//! The moving parts:
//!
//! - [`registry::FocusRegistry`]: ordered, scope-partitioned catalog of
//!   focusable elements, held by weak reference so unmounted elements drop
//!   out lazily.
//! - [`classify`]: predicates over live element state (focusable? primary
//!   action? navbar chrome?), re-evaluated on every event.
//! - [`dropdown::DropdownController`]: per-field searchable-select state
//!   (open/highlight/query/anchor), Enter-to-open, Enter-to-confirm.
//! - [`navigator`]: the Enter/Shift+Enter machine, a continuous ring with a
//!   single terminal commit action that clicks and wraps.
//! - [`modal::ModalStack`]: stacked focus traps with Tab-boundary wrap and
//!   focus restoration on close.
//! - [`manager::KeyboardManager`]: ties it together behind one
//!   `handle_key` entry point with fixed routing priority: modal > open
//!   dropdown > field ring > pass-through.
//!
//! # Example
//!
//! ```
//! use ringnav::prelude::*;
//!
//! let manager = KeyboardManager::new();
//!
//! // The host registers its entry row, in sequence order.
//! let item = Element::new("item", Role::Input).handle();
//! let qty = Element::new("qty", Role::Input).handle();
//! let add = Element::new("add", Role::PrimaryButton).handle();
//! manager.registry().register(&item, 1, "entry");
//! manager.registry().register(&qty, 2, "entry");
//! manager.registry().register(&add, 3, "entry");
//! manager.activate_scope("entry", true);
//!
//! // Enter confirms the field and advances.
//! let result = manager.handle_key(&KeyEvent::new(KeyCode::Enter));
//! assert_eq!(result, EventResult::Consumed);
//! assert_eq!(manager.focused().unwrap().key(), "qty");
//! ```
//!
//! Every key-handler path is synchronous and panic-free. Focus moves that
//! must wait for a re-render (after a click or a dropdown confirm) are
//! queued; the host drains them with
//! [`KeyboardManager::flush_deferred`](manager::KeyboardManager::flush_deferred)
//! once per event-loop turn.

pub mod classify;
pub mod dropdown;
pub mod element;
pub mod events;
pub mod manager;
pub mod modal;
pub mod navigator;
pub mod registry;

pub use dropdown::{AnchorRect, DropdownController, DropdownReply};
pub use element::{Element, ElementFlags, ElementHandle, ElementKey, Role, Scope, GLOBAL_SCOPE};
pub use events::{EventResult, KeyCode, KeyEvent, KeyModifiers};
pub use manager::{dispatch_key_event, installed_manager, KeyboardManager, ManagerState};
pub use modal::{ModalId, ModalSession, ModalStack};
pub use navigator::{NavDecision, Validator};
pub use registry::{FocusRegistry, ResolvedEntry, SequenceError};

/// Convenience re-exports for host applications.
pub mod prelude {
    pub use crate::dropdown::{DropdownController, DropdownReply};
    pub use crate::element::{Element, ElementFlags, ElementHandle, Role};
    pub use crate::events::{EventResult, KeyCode, KeyEvent, KeyModifiers};
    pub use crate::manager::{dispatch_key_event, KeyboardManager};
    pub use crate::modal::ModalSession;
    pub use crate::registry::FocusRegistry;
}
