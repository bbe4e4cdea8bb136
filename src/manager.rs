//! The keyboard manager: single entry point for key events.
//!
//! The host captures raw key events (one listener, at its outermost
//! boundary) and forwards each one to [`KeyboardManager::handle_key`], which
//! routes it with a fixed priority:
//!
//! 1. an active modal session owns the event,
//! 2. else an open dropdown on the focused field,
//! 3. else the Enter/Shift+Enter ring of the active scope,
//! 4. else the event passes through untouched.
//!
//! Exactly one controller handles an event. The returned
//! [`EventResult`](crate::events::EventResult) tells the host whether to
//! suppress native handling (`Consumed`) or let it proceed (`Ignored`).
//!
//! Focus moves that follow a click or a dropdown confirm are not executed
//! inside the key handler: the click may re-render and re-register the very
//! elements being targeted. They are queued as deferred actions and executed
//! by [`KeyboardManager::flush_deferred`], which the host calls once per
//! event-loop turn after rendering settles. Every deferred action re-resolves
//! its target at flush time and no-ops when the target has unmounted.
//!
//! A process-wide dispatch slot holds at most one installed manager, so the
//! host's single listener can stay a free function:
//!
//! ```
//! use ringnav::manager::{dispatch_key_event, KeyboardManager};
//! use ringnav::events::{KeyCode, KeyEvent};
//! use std::sync::Arc;
//!
//! let manager = Arc::new(KeyboardManager::new());
//! manager.initialize();
//! let _ = dispatch_key_event(&KeyEvent::new(KeyCode::Enter));
//! manager.destroy();
//! ```

use crate::classify::is_dropdown_field;
use crate::dropdown::{DropdownController, DropdownReply};
use crate::element::{ChangeCallback, ElementHandle, ElementKey, Scope, WeakElement, GLOBAL_SCOPE};
use crate::events::{EventResult, KeyCode, KeyEvent};
use crate::modal::{ModalId, ModalSession, ModalStack};
use crate::navigator::{self, NavDecision, Validator};
use crate::registry::FocusRegistry;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

// ==================== Global dispatch slot ====================

/// At most one manager receives dispatched events at a time.
/// Held weakly so a dropped manager never pins its state alive.
static ACTIVE_MANAGER: RwLock<Option<Weak<KeyboardManager>>> = RwLock::new(None);

/// Dispatch a key event to the installed manager, if any.
///
/// Returns `Ignored` when no manager is installed (or the installed one has
/// been dropped), so the host's native handling proceeds.
pub fn dispatch_key_event(event: &KeyEvent) -> EventResult {
    let manager = ACTIVE_MANAGER.read().as_ref().and_then(Weak::upgrade);
    match manager {
        Some(m) => m.handle_key(event),
        None => EventResult::Ignored,
    }
}

/// The currently installed manager, if one is alive.
pub fn installed_manager() -> Option<Arc<KeyboardManager>> {
    ACTIVE_MANAGER.read().as_ref().and_then(Weak::upgrade)
}

// ==================== Deferred actions ====================

/// Focus work postponed until after the current event's render settles.
enum DeferredAction {
    /// Wrap to sequence position 1 of a scope (terminal-click loop).
    FocusFirst(Scope),
    /// Advance past `key` (post-confirm advance). Resolved at flush time so
    /// a re-registered ring is honored.
    AdvanceFrom(ElementKey, Scope),
    /// Advance past `key` inside the top modal's snapshot.
    AdvanceInModal(ElementKey),
    /// Focus one specific element if it is still mounted (modal paths).
    Focus(WeakElement),
}

// ==================== Manager state ====================

/// Debug snapshot of the manager's moving parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerState {
    /// Number of stacked modal sessions.
    pub modal_depth: usize,
    /// Number of registered dropdown controllers.
    pub dropdown_count: usize,
    /// Number of live registry scopes.
    pub scope_count: usize,
    /// Key of the element the manager believes is focused.
    pub focused_key: Option<String>,
    /// Scope the Enter ring currently runs over.
    pub active_scope: String,
    /// Whether this manager occupies the dispatch slot.
    pub installed: bool,
    /// Deferred actions waiting for the next flush.
    pub pending_deferred: usize,
}

/// Central keyboard-navigation service.
///
/// Owns the focus registry, the modal stack, the per-field dropdown
/// controllers, the active-focus slot, and the deferred-action queue.
/// Construct once per application shell, `initialize()` it into the dispatch
/// slot, and `destroy()` it on teardown.
#[derive(Default)]
pub struct KeyboardManager {
    registry: FocusRegistry,
    modals: ModalStack,
    dropdowns: RwLock<FxHashMap<ElementKey, Arc<DropdownController>>>,
    focused: RwLock<Option<WeakElement>>,
    active_scope: RwLock<Scope>,
    deferred: Mutex<SmallVec<[DeferredAction; 4]>>,
    validator: RwLock<Option<Validator>>,
    on_validation_error: RwLock<Option<ChangeCallback>>,
    on_selection_complete: RwLock<Option<ChangeCallback>>,
}

impl KeyboardManager {
    /// Create a manager with an empty registry and the global scope active.
    pub fn new() -> Self {
        let manager = Self::default();
        *manager.active_scope.write() = Scope::from(GLOBAL_SCOPE);
        manager
    }

    // ==================== Lifecycle ====================

    /// Install this manager into the process-wide dispatch slot.
    ///
    /// Idempotent: installing the same manager twice is a no-op. Installing
    /// over a different live manager detaches that one first.
    pub fn initialize(self: &Arc<Self>) {
        let mut slot = ACTIVE_MANAGER.write();
        if let Some(existing) = slot.as_ref() {
            if Weak::ptr_eq(existing, &Arc::downgrade(self)) {
                trace!("keyboard manager already installed");
                return;
            }
            if existing.upgrade().is_some() {
                debug!("detaching previously installed keyboard manager");
            }
        }
        *slot = Some(Arc::downgrade(self));
    }

    /// Tear down: clear every map and queue, and vacate the dispatch slot if
    /// this manager holds it. Safe to call more than once.
    pub fn destroy(self: &Arc<Self>) {
        {
            let mut slot = ACTIVE_MANAGER.write();
            let holds_slot = slot
                .as_ref()
                .is_some_and(|w| Weak::ptr_eq(w, &Arc::downgrade(self)));
            if holds_slot {
                *slot = None;
            }
        }
        self.registry.clear();
        self.modals.clear();
        self.dropdowns.write().clear();
        self.deferred.lock().clear();
        *self.focused.write() = None;
    }

    /// Whether this manager currently occupies the dispatch slot.
    pub fn is_installed(self: &Arc<Self>) -> bool {
        ACTIVE_MANAGER
            .read()
            .as_ref()
            .is_some_and(|w| Weak::ptr_eq(w, &Arc::downgrade(self)))
    }

    // ==================== Configuration ====================

    /// Set the forward-advance validator (see [`Validator`]).
    pub fn set_validator(&self, validator: Validator) {
        *self.validator.write() = Some(validator);
    }

    /// Remove the validator; forward advances become unconditional.
    pub fn clear_validator(&self) {
        *self.validator.write() = None;
    }

    /// Callback fired with the failing field's key when validation blocks a
    /// forward advance.
    pub fn set_on_validation_error<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_validation_error.write() = Some(Arc::new(f));
    }

    /// Callback fired with the field's key after a dropdown selection is
    /// confirmed (before the deferred advance runs).
    pub fn set_on_selection_complete<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_selection_complete.write() = Some(Arc::new(f));
    }

    // ==================== Accessors ====================

    /// The focus registry.
    pub fn registry(&self) -> &FocusRegistry {
        &self.registry
    }

    /// The element the manager believes is focused, if still mounted.
    pub fn focused(&self) -> Option<ElementHandle> {
        self.focused.read().as_ref().and_then(Weak::upgrade)
    }

    /// The scope the Enter ring currently runs over.
    pub fn active_scope(&self) -> Scope {
        self.active_scope.read().clone()
    }

    // ==================== Focus ====================

    /// Move focus to `element`, notifying blur and focus callbacks.
    ///
    /// The host also calls this when focus moves by pointer, so the
    /// manager's focus slot tracks reality.
    pub fn set_focus(&self, element: &ElementHandle) {
        if let Some(prev) = self.focused() {
            if prev.key() == element.key() {
                return;
            }
            self.blur(&prev);
        }
        *self.focused.write() = Some(Arc::downgrade(element));
        element.gain_focus();
    }

    /// Drop the focus slot without focusing anything else.
    pub fn clear_focus(&self) {
        if let Some(prev) = self.focused() {
            self.blur(&prev);
        }
        *self.focused.write() = None;
    }

    /// Blur an element; a dropdown field never stays open past its blur.
    fn blur(&self, element: &ElementHandle) {
        element.lose_focus();
        if let Some(controller) = self.dropdown(element.key()) {
            controller.force_close();
        }
    }

    /// Switch the active scope, validating its numbering and optionally
    /// focusing sequence position 1.
    ///
    /// A malformed sequence is reported but not fatal: traversal falls back
    /// to the registry's stable sorted order.
    pub fn activate_scope(&self, scope: &str, auto_focus: bool) {
        if let Err(err) = self.registry.validate_scope(scope) {
            warn!(scope, %err, "focus sequence malformed; using sorted order");
        }
        *self.active_scope.write() = Scope::from(scope);
        if auto_focus {
            if let Some(first) = self.registry.first(scope) {
                self.set_focus(&first.element);
            }
        }
    }

    // ==================== Dropdowns ====================

    /// Attach a dropdown controller to the field with `key`.
    pub fn register_dropdown(&self, key: impl Into<ElementKey>, controller: Arc<DropdownController>) {
        self.dropdowns.write().insert(key.into(), controller);
    }

    /// Detach the controller for `key`. Idempotent.
    pub fn unregister_dropdown(&self, key: &str) {
        self.dropdowns.write().remove(key);
    }

    /// The controller attached to `key`, if any.
    pub fn dropdown(&self, key: &str) -> Option<Arc<DropdownController>> {
        self.dropdowns.read().get(key).cloned()
    }

    // ==================== Modals ====================

    /// Activate a modal session: record the element to restore, push the
    /// session, and focus the first focusable in its snapshot (if any).
    pub fn open_modal(&self, mut session: ModalSession) -> ModalId {
        if let Some(current) = self.focused() {
            session.default_previous_focus(&current);
        }
        let first = session.first_focusable();
        let id = self.modals.push(session);
        if let Some(el) = first {
            self.set_focus(&el);
        }
        id
    }

    /// Deactivate a modal session and restore focus to the element recorded
    /// at open time, if it is still mounted. Idempotent.
    pub fn close_modal(&self, id: ModalId) {
        let Some(session) = self.modals.remove(id) else {
            return;
        };
        match session.restore_target() {
            Some(prev) => self.set_focus(&prev),
            None => self.clear_focus(),
        }
    }

    /// Recompute a session's focusable snapshot after its content changed.
    pub fn refresh_modal(&self, id: ModalId, focusables: &[ElementHandle]) {
        self.modals.refresh_snapshot(id, focusables);
    }

    /// The modal stack's depth.
    pub fn modal_depth(&self) -> usize {
        self.modals.depth()
    }

    // ==================== Event routing ====================

    /// Route one key event. Single entry point; never panics.
    pub fn handle_key(&self, event: &KeyEvent) -> EventResult {
        if self.modals.is_active() {
            return self.handle_modal_key(event);
        }

        let focused = match self.current_focus() {
            Some(el) => el,
            None => return EventResult::Ignored,
        };

        if let Some(result) = self.route_dropdown(&focused, event, false) {
            return result;
        }

        let scope = self.active_scope();
        let ring: Vec<ElementHandle> = self
            .registry
            .ordered_entries(&scope)
            .into_iter()
            .map(|e| e.element)
            .collect();
        self.run_navigator(&ring, &focused, event, &scope)
    }

    /// Execute all queued deferred actions.
    ///
    /// Called by the host once per event-loop turn, after rendering settles.
    /// Idempotent: a second flush in the same turn finds an empty queue, and
    /// every action no-ops when its target has unmounted.
    pub fn flush_deferred(&self) {
        let actions = std::mem::take(&mut *self.deferred.lock());
        for action in actions {
            match action {
                DeferredAction::FocusFirst(scope) => {
                    if let Some(first) = self.registry.first(&scope) {
                        self.set_focus(&first.element);
                    }
                }
                DeferredAction::AdvanceFrom(key, scope) => {
                    if let Some(next) = self.registry.next(&key, &scope) {
                        self.set_focus(&next.element);
                    }
                }
                DeferredAction::AdvanceInModal(key) => {
                    if let Some(Some(next)) = self.modals.with_top(|s| s.next_after(&key)) {
                        self.set_focus(&next);
                    }
                }
                DeferredAction::Focus(weak) => {
                    if let Some(el) = weak.upgrade() {
                        self.set_focus(&el);
                    } else {
                        trace!("deferred focus target unmounted; skipping");
                    }
                }
            }
        }
    }

    // ==================== Global listener analogs ====================

    /// Window lost focus: force-close every open dropdown.
    pub fn notify_window_blur(&self) {
        for controller in self.dropdowns.read().values() {
            controller.force_close();
        }
    }

    /// Pointer pressed on `target` (`None` for empty space): close every
    /// open dropdown not owned by the target, and close the top modal when
    /// it is configured to close on outside clicks.
    pub fn notify_pointer_down(&self, target: Option<&str>) {
        for (key, controller) in self.dropdowns.read().iter() {
            if target != Some(key.as_str()) {
                controller.force_close();
            }
        }
        // Clone the callback out before invoking it: the host may close the
        // modal from inside it, which takes the stack lock.
        let close = self.modals.with_top(|session| {
            let outside = !target.is_some_and(|t| session.contains(t));
            if session.closes_on_outside_click() && outside {
                session.close_callback()
            } else {
                None
            }
        });
        if let Some(Some(cb)) = close {
            trace!("modal close requested by outside click");
            cb();
        }
    }

    /// Viewport scrolled or resized: open dropdowns recompute their anchor.
    pub fn notify_viewport_change(&self) {
        for controller in self.dropdowns.read().values() {
            controller.viewport_changed();
        }
    }

    /// Debug snapshot of the manager's moving parts.
    pub fn state(self: &Arc<Self>) -> ManagerState {
        ManagerState {
            modal_depth: self.modals.depth(),
            dropdown_count: self.dropdowns.read().len(),
            scope_count: self.registry.scope_count(),
            focused_key: self.focused().map(|el| el.key().to_string()),
            active_scope: self.active_scope().to_string(),
            installed: self.is_installed(),
            pending_deferred: self.deferred.lock().len(),
        }
    }

    // ==================== Internals ====================

    /// Focused element, dropping a stale slot lazily.
    fn current_focus(&self) -> Option<ElementHandle> {
        let upgraded = self.focused.read().as_ref().and_then(Weak::upgrade);
        if upgraded.is_none() && self.focused.read().is_some() {
            trace!("focused element unmounted; clearing focus slot");
            *self.focused.write() = None;
        }
        upgraded
    }

    /// Dropdown routing for the focused field. Returns `None` when the event
    /// is not a dropdown concern and should fall through to the ring.
    ///
    /// `in_modal` selects which ring the post-confirm advance resolves
    /// against at flush time.
    fn route_dropdown(
        &self,
        focused: &ElementHandle,
        event: &KeyEvent,
        in_modal: bool,
    ) -> Option<EventResult> {
        if !is_dropdown_field(focused) {
            return None;
        }
        let controller = self.dropdown(focused.key())?;

        if !controller.is_open() {
            // Only plain Enter opens; arrows and Shift+Enter fall through.
            if event.is_enter() {
                let _ = controller.handle_key(event);
                return Some(EventResult::Consumed);
            }
            return None;
        }

        match controller.handle_key(event) {
            DropdownReply::Confirmed(selected) => {
                if let Some(value) = &selected {
                    focused.change(value);
                }
                let cb = self.on_selection_complete.read().clone();
                if let Some(cb) = cb {
                    cb(focused.key());
                }
                // Shift+Enter confirms and stops; only plain Enter schedules
                // the advance to the next field.
                if event.is_enter() {
                    let action = if in_modal {
                        DeferredAction::AdvanceInModal(ElementKey::from(focused.key()))
                    } else {
                        DeferredAction::AdvanceFrom(
                            ElementKey::from(focused.key()),
                            self.active_scope(),
                        )
                    };
                    self.deferred.lock().push(action);
                }
                Some(EventResult::Consumed)
            }
            DropdownReply::ClosedWithoutSelection => {
                // Escape stops here; Tab closes the list but lets the host's
                // native tab order proceed.
                if event.code == KeyCode::Esc {
                    Some(EventResult::Consumed)
                } else {
                    Some(EventResult::Ignored)
                }
            }
            DropdownReply::Opened | DropdownReply::Highlighted(_) | DropdownReply::Typed => {
                Some(EventResult::Consumed)
            }
            DropdownReply::NotHandled => None,
        }
    }

    /// Run the Enter machine over `ring` and execute its decision.
    fn run_navigator(
        &self,
        ring: &[ElementHandle],
        focused: &ElementHandle,
        event: &KeyEvent,
        wrap_scope: &str,
    ) -> EventResult {
        let validator = self.validator.read().clone();
        match navigator::decide(ring, focused, event, validator.as_ref()) {
            NavDecision::PassThrough | NavDecision::Ignored => EventResult::Ignored,
            NavDecision::FocusTo(el) => {
                self.set_focus(&el);
                EventResult::Consumed
            }
            NavDecision::ClickAndWrap { action, wrap_to: _ } => {
                action.click();
                self.deferred
                    .lock()
                    .push(DeferredAction::FocusFirst(Scope::from(wrap_scope)));
                EventResult::Consumed
            }
            NavDecision::ClickOnly(el) => {
                el.click();
                EventResult::Consumed
            }
            NavDecision::ValidationBlocked(el) => {
                let cb = self.on_validation_error.read().clone();
                if let Some(cb) = cb {
                    cb(el.key());
                }
                EventResult::Consumed
            }
            NavDecision::Consumed => EventResult::Consumed,
        }
    }

    /// Key routing while a modal session is on top.
    fn handle_modal_key(&self, event: &KeyEvent) -> EventResult {
        let focused = self.current_focus();

        // Dropdowns exist inside modals too; they keep first claim.
        if let Some(focused) = &focused {
            if let Some(result) = self.route_dropdown(focused, event, true) {
                // A Tab that closed the list still belongs to the trap below;
                // there is no native tab order to hand back to inside a modal.
                if result.is_consumed() || !(event.is_forward_tab() || event.is_back_tab()) {
                    return result;
                }
            }
        }

        if event.code == KeyCode::Esc {
            // Escape is owned by the modal whether or not it closes on it.
            // The callback runs with the stack lock released: the host is
            // free to call `close_modal` from inside it.
            let close = self.modals.with_top(|session| {
                if session.closes_on_escape() {
                    session.close_callback()
                } else {
                    None
                }
            });
            if let Some(Some(cb)) = close {
                cb();
            }
            return EventResult::Consumed;
        }

        if event.is_forward_tab() || event.is_back_tab() {
            let target = self.modals.with_top(|session| {
                let current = focused.as_ref().map(|el| el.key().to_string());
                match (&current, event.is_forward_tab()) {
                    (Some(key), true) => session.next_after(key),
                    (Some(key), false) => session.prev_before(key),
                    (None, _) => session.first_focusable(),
                }
            });
            if let Some(Some(el)) = target {
                self.set_focus(&el);
            }
            return EventResult::Consumed;
        }

        if event.is_enter() || event.is_shift_enter() {
            let Some(focused) = focused else {
                // Pull focus inside the trap on the next Enter.
                if let Some(Some(first)) = self.modals.with_top(ModalSession::first_focusable) {
                    self.set_focus(&first);
                }
                return EventResult::Consumed;
            };
            let ring = self
                .modals
                .with_top(ModalSession::focusables)
                .unwrap_or_default();
            let validator = self.validator.read().clone();
            return match navigator::decide(&ring, &focused, event, validator.as_ref()) {
                NavDecision::PassThrough | NavDecision::Ignored => EventResult::Ignored,
                NavDecision::FocusTo(el) => {
                    self.set_focus(&el);
                    EventResult::Consumed
                }
                NavDecision::ClickAndWrap { action, wrap_to } => {
                    action.click();
                    if let Some(first) = wrap_to {
                        self.deferred
                            .lock()
                            .push(DeferredAction::Focus(Arc::downgrade(&first)));
                    }
                    EventResult::Consumed
                }
                NavDecision::ClickOnly(el) => {
                    el.click();
                    EventResult::Consumed
                }
                NavDecision::ValidationBlocked(el) => {
                    let cb = self.on_validation_error.read().clone();
                    if let Some(cb) = cb {
                        cb(el.key());
                    }
                    EventResult::Consumed
                }
                NavDecision::Consumed => EventResult::Consumed,
            };
        }

        // Everything else (typing into modal inputs) stays native.
        EventResult::Ignored
    }
}

impl std::fmt::Debug for KeyboardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyboardManager")
            .field("modal_depth", &self.modals.depth())
            .field("dropdown_count", &self.dropdowns.read().len())
            .field("active_scope", &self.active_scope())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::element::{Element, Role};
    use crate::events::KeyModifiers;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn enter() -> KeyEvent {
        KeyEvent::new(KeyCode::Enter)
    }

    fn shift_enter() -> KeyEvent {
        KeyEvent::with_modifiers(KeyCode::Enter, KeyModifiers::SHIFT)
    }

    /// Registers a typical entry row: three inputs then the Add button.
    fn entry_form(manager: &KeyboardManager) -> Vec<ElementHandle> {
        let els = vec![
            Element::new("item", Role::Input).handle(),
            Element::new("qty", Role::Input).handle(),
            Element::new("rate", Role::Input).handle(),
            Element::new("add", Role::PrimaryButton).handle(),
        ];
        for (i, el) in els.iter().enumerate() {
            assert!(manager.registry().register(el, (i + 1) as u32, "entry"));
        }
        manager.activate_scope("entry", false);
        els
    }

    #[test]
    fn test_enter_walks_the_ring() {
        let manager = KeyboardManager::new();
        let els = entry_form(&manager);
        manager.set_focus(&els[0]);

        assert!(manager.handle_key(&enter()).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "qty");
        assert!(manager.handle_key(&enter()).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "rate");
    }

    #[test]
    fn test_shift_enter_reverses_and_wraps() {
        let manager = KeyboardManager::new();
        let els = entry_form(&manager);
        manager.set_focus(&els[0]);

        assert!(manager.handle_key(&shift_enter()).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "add");
    }

    #[test]
    fn test_terminal_click_wraps_after_flush() {
        let manager = KeyboardManager::new();
        let els = entry_form(&manager);

        let clicks = Arc::new(AtomicUsize::new(0));
        let c = clicks.clone();
        els[3].set_on_click(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        manager.set_focus(&els[3]);
        assert!(manager.handle_key(&enter()).is_consumed());
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        // Focus has not moved yet; the wrap is deferred.
        assert_eq!(manager.focused().unwrap().key(), "add");

        manager.flush_deferred();
        assert_eq!(manager.focused().unwrap().key(), "item");

        // A second flush is a no-op.
        manager.flush_deferred();
        assert_eq!(manager.focused().unwrap().key(), "item");
    }

    #[test]
    fn test_validation_blocks_forward_only() {
        let manager = KeyboardManager::new();
        let els = entry_form(&manager);
        manager.set_focus(&els[1]);

        manager.set_validator(Arc::new(|el| el.key() != "qty"));
        let errors = Arc::new(AtomicUsize::new(0));
        let e = errors.clone();
        manager.set_on_validation_error(move |_key| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        assert!(manager.handle_key(&enter()).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "qty");
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        // Backing out of the invalid field always works.
        assert!(manager.handle_key(&shift_enter()).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "item");
    }

    #[test]
    fn test_navbar_passes_through() {
        let manager = KeyboardManager::new();
        let menu = Element::new("menu-home", Role::Input).navbar().handle();
        assert!(manager.registry().register(&menu, 1, "entry"));
        manager.activate_scope("entry", false);
        manager.set_focus(&menu);

        assert_eq!(manager.handle_key(&enter()), EventResult::Ignored);
    }

    #[test]
    fn test_no_focus_means_no_interception() {
        let manager = KeyboardManager::new();
        entry_form(&manager);
        assert_eq!(manager.handle_key(&enter()), EventResult::Ignored);
    }

    #[test]
    fn test_dropdown_open_confirm_advance() {
        let manager = KeyboardManager::new();
        let els = entry_form(&manager);

        // "item" becomes a dropdown field.
        let item = Element::new("item", Role::Dropdown).handle();
        manager.registry().unregister("item");
        assert!(manager.registry().register(&item, 1, "entry"));
        // qty/rate/add from the original row stay mounted.
        let _row = els;

        let picked = Arc::new(parking_lot::Mutex::new(String::new()));
        let p = picked.clone();
        item.set_on_change(move |value| {
            *p.lock() = value.to_string();
        });
        let controller = Arc::new(DropdownController::with_options(vec![
            "Steel".into(),
            "Copper".into(),
        ]));
        manager.register_dropdown("item", controller.clone());
        manager.set_focus(&item);

        // First Enter opens, never selects.
        assert!(manager.handle_key(&enter()).is_consumed());
        assert!(controller.is_open());
        assert!(picked.lock().is_empty());

        // Highlight the second option, confirm.
        assert!(manager
            .handle_key(&KeyEvent::new(KeyCode::Down))
            .is_consumed());
        assert!(manager.handle_key(&enter()).is_consumed());
        assert!(!controller.is_open());
        assert_eq!(*picked.lock(), "Copper");

        // The advance to qty happens on flush, not inside the handler.
        assert_eq!(manager.focused().unwrap().key(), "item");
        manager.flush_deferred();
        assert_eq!(manager.focused().unwrap().key(), "qty");
    }

    #[test]
    fn test_closed_dropdown_ignores_arrows() {
        let manager = KeyboardManager::new();
        let dd = Element::new("acct", Role::Dropdown).handle();
        assert!(manager.registry().register(&dd, 1, "entry"));
        manager.activate_scope("entry", false);
        let controller = Arc::new(DropdownController::with_options(vec!["A".into()]));
        manager.register_dropdown("acct", controller.clone());
        manager.set_focus(&dd);

        assert_eq!(
            manager.handle_key(&KeyEvent::new(KeyCode::Down)),
            EventResult::Ignored
        );
        assert!(!controller.is_open());
    }

    #[test]
    fn test_blur_closes_open_dropdown() {
        let manager = KeyboardManager::new();
        let dd = Element::new("acct", Role::Dropdown).handle();
        let other = Element::new("memo", Role::Input).handle();
        assert!(manager.registry().register(&dd, 1, "entry"));
        assert!(manager.registry().register(&other, 2, "entry"));
        manager.activate_scope("entry", false);
        let controller = Arc::new(DropdownController::with_options(vec!["A".into()]));
        manager.register_dropdown("acct", controller.clone());
        manager.set_focus(&dd);

        manager.handle_key(&enter());
        assert!(controller.is_open());

        // Focus moving elsewhere never leaves the list hanging open.
        manager.set_focus(&other);
        assert!(!controller.is_open());
    }

    #[test]
    fn test_escape_closes_dropdown_without_selection() {
        let manager = KeyboardManager::new();
        let dd = Element::new("acct", Role::Dropdown).handle();
        assert!(manager.registry().register(&dd, 1, "entry"));
        manager.activate_scope("entry", false);
        let controller = Arc::new(DropdownController::with_options(vec!["A".into()]));
        manager.register_dropdown("acct", controller.clone());
        manager.set_focus(&dd);

        manager.handle_key(&enter());
        assert!(controller.is_open());
        assert!(manager
            .handle_key(&KeyEvent::new(KeyCode::Esc))
            .is_consumed());
        assert!(!controller.is_open());
        // No deferred advance was queued.
        manager.flush_deferred();
        assert_eq!(manager.focused().unwrap().key(), "acct");
    }

    #[test]
    fn test_modal_owns_tab_and_escape() {
        let manager = KeyboardManager::new();
        let els = entry_form(&manager);
        manager.set_focus(&els[0]);

        let modal_els = vec![
            Element::new("m-name", Role::Input).handle(),
            Element::new("m-save", Role::PrimaryButton).handle(),
        ];
        let closed = Arc::new(AtomicUsize::new(0));
        let c = closed.clone();
        let id = manager.open_modal(ModalSession::new(&modal_els).on_close(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        // Opening focused the first trap element.
        assert_eq!(manager.focused().unwrap().key(), "m-name");

        // Tab wraps inside the trap.
        assert!(manager.handle_key(&KeyEvent::new(KeyCode::Tab)).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "m-save");
        assert!(manager.handle_key(&KeyEvent::new(KeyCode::Tab)).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "m-name");

        // Enter rings over the snapshot, not the form scope.
        assert!(manager.handle_key(&enter()).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "m-save");

        // Escape requests close; the host then closes and focus restores.
        assert!(manager.handle_key(&KeyEvent::new(KeyCode::Esc)).is_consumed());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        manager.close_modal(id);
        assert_eq!(manager.focused().unwrap().key(), "item");
    }

    #[test]
    fn test_modal_restore_skips_unmounted_opener() {
        let manager = KeyboardManager::new();
        let opener = Element::new("open-btn", Role::Input).handle();
        assert!(manager.registry().register(&opener, 1, "entry"));
        manager.activate_scope("entry", false);
        manager.set_focus(&opener);

        let modal_els = vec![Element::new("m-field", Role::Input).handle()];
        let id = manager.open_modal(ModalSession::new(&modal_els));

        manager.registry().unregister("open-btn");
        drop(opener);

        manager.close_modal(id);
        assert!(manager.focused().is_none());
    }

    #[test]
    fn test_escape_close_callback_may_close_the_modal() {
        let manager = Arc::new(KeyboardManager::new());
        let opener = Element::new("open-btn", Role::Input).handle();
        assert!(manager.registry().register(&opener, 1, "entry"));
        manager.activate_scope("entry", false);
        manager.set_focus(&opener);

        // The host's on_close calls straight back into close_modal, the way
        // a real dialog component unmounts itself.
        let id_slot = Arc::new(parking_lot::Mutex::new(None::<ModalId>));
        let modal_els = vec![Element::new("m-field", Role::Input).handle()];
        let (weak, slot) = (Arc::downgrade(&manager), id_slot.clone());
        let id = manager.open_modal(ModalSession::new(&modal_els).on_close(move || {
            if let (Some(m), Some(id)) = (weak.upgrade(), *slot.lock()) {
                m.close_modal(id);
            }
        }));
        *id_slot.lock() = Some(id);

        assert!(manager.handle_key(&KeyEvent::new(KeyCode::Esc)).is_consumed());
        assert_eq!(manager.modal_depth(), 0);
        assert_eq!(manager.focused().unwrap().key(), "open-btn");
    }

    #[test]
    fn test_outside_click_close_callback_may_close_the_modal() {
        let manager = Arc::new(KeyboardManager::new());
        let id_slot = Arc::new(parking_lot::Mutex::new(None::<ModalId>));
        let modal_els = vec![Element::new("m-field", Role::Input).handle()];
        let (weak, slot) = (Arc::downgrade(&manager), id_slot.clone());
        let session = ModalSession::new(&modal_els)
            .close_on_outside_click(true)
            .on_close(move || {
                if let (Some(m), Some(id)) = (weak.upgrade(), *slot.lock()) {
                    m.close_modal(id);
                }
            });
        let id = manager.open_modal(session);
        *id_slot.lock() = Some(id);

        manager.notify_pointer_down(None);
        assert_eq!(manager.modal_depth(), 0);
    }

    #[test]
    fn test_validation_error_callback_may_reconfigure_the_manager() {
        let manager = Arc::new(KeyboardManager::new());
        let els = entry_form(&manager);
        manager.set_focus(&els[1]);

        manager.set_validator(Arc::new(|el| el.key() != "qty"));
        // A one-shot error handler: from inside the key handler it clears
        // the validator and replaces itself.
        let weak = Arc::downgrade(&manager);
        manager.set_on_validation_error(move |_key| {
            if let Some(m) = weak.upgrade() {
                m.clear_validator();
                m.set_on_validation_error(|_key| {});
            }
        });

        assert!(manager.handle_key(&enter()).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "qty");
        assert!(manager.handle_key(&enter()).is_consumed());
        assert_eq!(manager.focused().unwrap().key(), "rate");
    }

    #[test]
    fn test_dropdown_confirm_inside_modal_advances_in_trap() {
        let manager = KeyboardManager::new();
        entry_form(&manager);

        let picker = Element::new("m-category", Role::Dropdown).handle();
        let note = Element::new("m-note", Role::Input).handle();
        let controller = Arc::new(DropdownController::with_options(vec!["Expense".into()]));
        manager.register_dropdown("m-category", controller.clone());
        manager.open_modal(ModalSession::new(&[picker.clone(), note.clone()]));
        assert_eq!(manager.focused().unwrap().key(), "m-category");

        manager.handle_key(&enter());
        assert!(controller.is_open());
        manager.handle_key(&enter());
        assert!(!controller.is_open());

        // The advance resolves against the modal snapshot, not the form.
        manager.flush_deferred();
        assert_eq!(manager.focused().unwrap().key(), "m-note");
    }

    #[test]
    fn test_tab_on_open_dropdown_stays_in_trap() {
        let manager = KeyboardManager::new();
        let picker = Element::new("m-category", Role::Dropdown).handle();
        let note = Element::new("m-note", Role::Input).handle();
        let controller = Arc::new(DropdownController::with_options(vec!["Expense".into()]));
        manager.register_dropdown("m-category", controller.clone());
        manager.open_modal(ModalSession::new(&[picker.clone(), note.clone()]));

        manager.handle_key(&enter());
        assert!(controller.is_open());

        // Tab closes the list and then moves inside the trap.
        assert!(manager.handle_key(&KeyEvent::new(KeyCode::Tab)).is_consumed());
        assert!(!controller.is_open());
        assert_eq!(manager.focused().unwrap().key(), "m-note");
    }

    #[test]
    fn test_typing_inside_modal_stays_native() {
        let manager = KeyboardManager::new();
        let modal_els = vec![Element::new("m-field", Role::Input).handle()];
        manager.open_modal(ModalSession::new(&modal_els));
        assert_eq!(
            manager.handle_key(&KeyEvent::new(KeyCode::Char('x'))),
            EventResult::Ignored
        );
    }

    #[test]
    fn test_pointer_down_closes_foreign_dropdowns() {
        let manager = KeyboardManager::new();
        let a = Arc::new(DropdownController::with_options(vec!["1".into()]));
        let b = Arc::new(DropdownController::with_options(vec!["2".into()]));
        manager.register_dropdown("a", a.clone());
        manager.register_dropdown("b", b.clone());
        a.open();
        b.open();

        manager.notify_pointer_down(Some("a"));
        assert!(a.is_open());
        assert!(!b.is_open());

        manager.notify_window_blur();
        assert!(!a.is_open());
    }

    #[test]
    fn test_activate_scope_autofocus() {
        let manager = KeyboardManager::new();
        let _els = entry_form(&manager);
        manager.activate_scope("entry", true);
        assert_eq!(manager.focused().unwrap().key(), "item");
    }

    #[test]
    #[serial]
    fn test_dispatch_slot_install_and_destroy() {
        let manager = Arc::new(KeyboardManager::new());
        let els = vec![Element::new("f", Role::Input).handle()];
        assert!(manager.registry().register(&els[0], 1, "entry"));
        manager.activate_scope("entry", false);
        manager.set_focus(&els[0]);

        manager.initialize();
        assert!(manager.is_installed());
        // Idempotent.
        manager.initialize();
        assert!(manager.is_installed());

        assert!(dispatch_key_event(&enter()).is_consumed());

        manager.destroy();
        assert!(!manager.is_installed());
        assert_eq!(dispatch_key_event(&enter()), EventResult::Ignored);
        // Safe to destroy twice.
        manager.destroy();
    }

    #[test]
    #[serial]
    fn test_second_manager_detaches_first() {
        let first = Arc::new(KeyboardManager::new());
        let second = Arc::new(KeyboardManager::new());
        first.initialize();
        second.initialize();
        assert!(!first.is_installed());
        assert!(second.is_installed());
        second.destroy();
    }

    #[test]
    #[serial]
    fn test_state_snapshot() {
        let manager = Arc::new(KeyboardManager::new());
        entry_form(&manager);
        manager.register_dropdown("item", Arc::new(DropdownController::new()));

        let state = manager.state();
        assert_eq!(state.dropdown_count, 1);
        assert_eq!(state.scope_count, 1);
        assert_eq!(state.modal_depth, 0);
        assert_eq!(state.active_scope, "entry");
        assert!(!state.installed);
        assert_eq!(state.pending_deferred, 0);
    }
}
