//! Modal focus trapping.
//!
//! When a modal dialog is active, navigation is confined to the modal's own
//! focusable descendants: Tab at the last wraps to the first, Shift+Tab at
//! the first wraps to the last, Enter rings over the snapshot instead of the
//! form scope, and Escape invokes the caller's close callback. On close, the
//! element focused before the modal opened is restored, if it still exists.
//!
//! Sessions stack. Only the top of the stack ever owns Tab/Escape/Enter;
//! closing the top reveals the session beneath it unchanged (its snapshot and
//! previous-focus record were never deactivated).
//!
//! The stack itself never moves focus. It answers "what should be focused";
//! the keyboard manager performs the move, so there is exactly one place in
//! the engine that touches focus state.

use crate::classify::is_valid_focus_target;
use crate::element::{Callback, ElementHandle, WeakElement};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// Identifier for one open modal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModalId(u64);

/// One active modal's focus-trap state.
pub struct ModalSession {
    id: ModalId,
    /// Ordered focusable descendants, captured at activation.
    snapshot: SmallVec<[WeakElement; 8]>,
    /// Element focused immediately before the modal opened.
    previous_focus: Option<WeakElement>,
    on_close: Option<Callback>,
    close_on_escape: bool,
    close_on_outside_click: bool,
}

impl ModalSession {
    /// Build a session over the modal's focusable descendants, in order.
    pub fn new(focusables: &[ElementHandle]) -> Self {
        Self {
            id: ModalId(0),
            snapshot: focusables.iter().map(Arc::downgrade).collect(),
            previous_focus: None,
            on_close: None,
            close_on_escape: true,
            close_on_outside_click: false,
        }
    }

    /// Record the element to restore focus to on close.
    pub fn previous_focus(mut self, element: &ElementHandle) -> Self {
        self.previous_focus = Some(Arc::downgrade(element));
        self
    }

    /// Fill in the restore target from the manager's focus slot, unless the
    /// caller already recorded one explicitly.
    pub(crate) fn default_previous_focus(&mut self, element: &ElementHandle) {
        if self.previous_focus.is_none() {
            self.previous_focus = Some(Arc::downgrade(element));
        }
    }

    /// Set the close callback, invoked on Escape (and outside click when
    /// enabled). The caller owns actually unmounting the modal.
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Whether Escape closes the modal (default: yes).
    pub fn close_on_escape(mut self, yes: bool) -> Self {
        self.close_on_escape = yes;
        self
    }

    /// Whether a click outside the modal closes it (default: no, to avoid
    /// accidental data loss in entry-heavy dialogs).
    pub fn close_on_outside_click(mut self, yes: bool) -> Self {
        self.close_on_outside_click = yes;
        self
    }

    /// The session id (assigned when pushed).
    pub const fn id(&self) -> ModalId {
        self.id
    }

    /// Live, currently-valid focusables from the snapshot, in order.
    ///
    /// Dead references and elements that have since become invalid targets
    /// (disabled, hidden) are filtered out fresh on every call: a stale
    /// snapshot may miss at most one render's worth of mutation, never crash.
    pub fn focusables(&self) -> Vec<ElementHandle> {
        self.snapshot
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|el| is_valid_focus_target(el))
            .collect()
    }

    /// First focusable in the trap, if any.
    pub fn first_focusable(&self) -> Option<ElementHandle> {
        self.focusables().into_iter().next()
    }

    /// The focusable after `key`, wrapping last→first.
    ///
    /// Falls back to the first focusable when `key` is not in the trap
    /// (focus was somewhere unexpected; pull it inside the boundary).
    pub fn next_after(&self, key: &str) -> Option<ElementHandle> {
        let ring = self.focusables();
        if ring.is_empty() {
            return None;
        }
        match ring.iter().position(|el| el.key() == key) {
            Some(idx) => ring.into_iter().cycle().nth(idx + 1),
            None => ring.into_iter().next(),
        }
    }

    /// The focusable before `key`, wrapping first→last.
    pub fn prev_before(&self, key: &str) -> Option<ElementHandle> {
        let ring = self.focusables();
        if ring.is_empty() {
            return None;
        }
        match ring.iter().position(|el| el.key() == key) {
            Some(idx) => {
                let len = ring.len();
                ring.into_iter().nth((idx + len - 1) % len)
            }
            None => ring.into_iter().last(),
        }
    }

    /// True if `key` belongs to the trap's live snapshot.
    pub fn contains(&self, key: &str) -> bool {
        self.focusables().iter().any(|el| el.key() == key)
    }

    /// Element to restore focus to, if it is still mounted.
    pub fn restore_target(&self) -> Option<ElementHandle> {
        self.previous_focus.as_ref().and_then(Weak::upgrade)
    }

    /// Whether Escape should close this modal.
    pub const fn closes_on_escape(&self) -> bool {
        self.close_on_escape
    }

    /// Whether an outside click should close this modal.
    pub const fn closes_on_outside_click(&self) -> bool {
        self.close_on_outside_click
    }

    /// Clone of the close callback, so the manager can invoke it after
    /// releasing the stack lock. The callback is expected to call back into
    /// the manager (typically `close_modal`).
    pub(crate) fn close_callback(&self) -> Option<Callback> {
        self.on_close.clone()
    }

    /// Replace the snapshot after the modal's content mutated.
    pub fn refresh(&mut self, focusables: &[ElementHandle]) {
        self.snapshot = focusables.iter().map(Arc::downgrade).collect();
    }
}

/// Stack of active modal sessions; only the top is authoritative.
#[derive(Default)]
pub struct ModalStack {
    stack: RwLock<Vec<ModalSession>>,
    next_id: AtomicU64,
}

impl ModalStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a session, assigning it a unique id.
    pub fn push(&self, mut session: ModalSession) -> ModalId {
        let id = ModalId(self.next_id.fetch_add(1, Ordering::SeqCst));
        session.id = id;
        self.stack.write().push(session);
        id
    }

    /// Pop the top session, if any.
    pub fn pop(&self) -> Option<ModalSession> {
        self.stack.write().pop()
    }

    /// Remove a session by id from anywhere in the stack.
    ///
    /// Idempotent: unknown ids are ignored.
    pub fn remove(&self, id: ModalId) -> Option<ModalSession> {
        let mut stack = self.stack.write();
        let idx = stack.iter().position(|s| s.id == id)?;
        Some(stack.remove(idx))
    }

    /// True while at least one modal is open.
    pub fn is_active(&self) -> bool {
        !self.stack.read().is_empty()
    }

    /// Number of stacked sessions.
    pub fn depth(&self) -> usize {
        self.stack.read().len()
    }

    /// Run `f` against the top session, if any.
    pub fn with_top<R>(&self, f: impl FnOnce(&ModalSession) -> R) -> Option<R> {
        self.stack.read().last().map(f)
    }

    /// Refresh the snapshot of the session with `id`.
    pub fn refresh_snapshot(&self, id: ModalId, focusables: &[ElementHandle]) {
        let mut stack = self.stack.write();
        if let Some(session) = stack.iter_mut().find(|s| s.id == id) {
            session.refresh(focusables);
        }
    }

    /// Drop every session without restoring focus (teardown path).
    pub fn clear(&self) {
        self.stack.write().clear();
    }
}
