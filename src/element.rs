//! Element handles: the view layer's side of the contract.
//!
//! The view layer owns every participating UI node and hands the engine an
//! [`ElementHandle`] (an `Arc`). The engine (registry, modal trap, manager)
//! only ever stores [`WeakElement`] references: elements may unmount at any
//! time, and a dead weak reference is simply dropped on the next traversal.
//!
//! Attributes that change at runtime (disabled, hidden, excluded) live behind
//! atomic flags so the classifier can read them fresh on every key event.
//!
//! # Example
//!
//! ```
//! use ringnav::element::{Element, Role};
//!
//! let qty = Element::new("qty", Role::Input)
//!     .on_focus(|| { /* highlight the field */ })
//!     .handle();
//!
//! qty.set_disabled(true);
//! assert!(qty.is_disabled());
//! ```

use bitflags::bitflags;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

/// Compact string alias for element keys and scope names.
pub type ElementKey = smartstring::alias::String;

/// Scope identifier; `"global"` when a form declares none.
pub type Scope = smartstring::alias::String;

/// The scope entries fall into when unscoped.
pub const GLOBAL_SCOPE: &str = "global";

/// Navigation role of an element.
///
/// Fixed at construction; runtime-variable state (disabled, hidden) lives in
/// [`ElementFlags`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Plain text/numeric input; Enter advances past it.
    #[default]
    Input,
    /// Searchable-select field with an attached dropdown controller.
    Dropdown,
    /// The form's primary/submit action; Enter activates it.
    PrimaryButton,
    /// Secondary or destructive action; never Enter-activated.
    SecondaryButton,
    /// Non-interactive element; registered only for completeness.
    Static,
}

impl Role {
    /// True for button roles.
    pub const fn is_action(&self) -> bool {
        matches!(self, Self::PrimaryButton | Self::SecondaryButton)
    }

    /// Human-readable role name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Dropdown => "dropdown",
            Self::PrimaryButton => "primary-button",
            Self::SecondaryButton => "secondary-button",
            Self::Static => "static",
        }
    }
}

bitflags! {
    /// Runtime attribute flags, mutable by the view layer at any time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ElementFlags: u8 {
        /// Element is disabled and not a valid focus target.
        const DISABLED = 1 << 0;
        /// Element is hidden from view.
        const HIDDEN = 1 << 1;
        /// Explicitly excluded from navigation (menu items, tabs, ...).
        const EXCLUDED = 1 << 2;
        /// Part of the navigation chrome; Enter is never hijacked here.
        const NAVBAR = 1 << 3;
        /// Opted out of focus entirely (`tabindex="-1"` analog).
        const NO_TAB = 1 << 4;
    }
}

/// Zero-argument callback slot.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Value-change callback; receives the confirmed option.
pub type ChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// One participating UI element.
///
/// Constructed by the view layer, converted to an [`ElementHandle`] with
/// [`Element::handle`]. All mutation goes through `&self` so handles can be
/// shared freely.
pub struct Element {
    key: ElementKey,
    role: Role,
    flags: AtomicU8,
    grid: RwLock<Option<(u16, u16)>>,
    focused: AtomicBool,
    on_click: RwLock<Option<Callback>>,
    on_focus: RwLock<Option<Callback>>,
    on_blur: RwLock<Option<Callback>>,
    on_change: RwLock<Option<ChangeCallback>>,
}

/// Shared, view-layer-owned element handle.
pub type ElementHandle = Arc<Element>;

/// Non-owning element reference held by the engine.
pub type WeakElement = Weak<Element>;

impl Element {
    /// Create a new element with the given key and role.
    pub fn new(key: impl Into<ElementKey>, role: Role) -> Self {
        Self {
            key: key.into(),
            role,
            flags: AtomicU8::new(0),
            grid: RwLock::new(None),
            focused: AtomicBool::new(false),
            on_click: RwLock::new(None),
            on_focus: RwLock::new(None),
            on_blur: RwLock::new(None),
            on_change: RwLock::new(None),
        }
    }

    /// Set initial flags.
    pub fn flags(self, flags: ElementFlags) -> Self {
        self.flags.store(flags.bits(), Ordering::SeqCst);
        self
    }

    /// Mark as navigation chrome (builder form).
    pub fn navbar(self) -> Self {
        self.set_navbar(true);
        self
    }

    /// Set grid coordinates used for row-then-column ordering ties.
    pub fn grid(self, row: u16, col: u16) -> Self {
        *self.grid.write() = Some((row, col));
        self
    }

    /// Set the click callback (builder form).
    pub fn on_click<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_click.write() = Some(Arc::new(f));
        self
    }

    /// Set the focus-gained callback (builder form).
    pub fn on_focus<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_focus.write() = Some(Arc::new(f));
        self
    }

    /// Set the focus-lost callback (builder form).
    pub fn on_blur<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_blur.write() = Some(Arc::new(f));
        self
    }

    /// Set the value-change callback (builder form).
    pub fn on_change<F>(self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_change.write() = Some(Arc::new(f));
        self
    }

    /// Finish construction, producing a shared handle.
    pub fn handle(self) -> ElementHandle {
        Arc::new(self)
    }

    /// The element's stable key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The element's navigation role.
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Current attribute flags, read fresh.
    pub fn current_flags(&self) -> ElementFlags {
        ElementFlags::from_bits_truncate(self.flags.load(Ordering::SeqCst))
    }

    /// Grid coordinates, if declared.
    pub fn grid_position(&self) -> Option<(u16, u16)> {
        *self.grid.read()
    }

    fn set_flag(&self, flag: ElementFlags, on: bool) {
        let mut bits = self.flags.load(Ordering::SeqCst);
        loop {
            let next = if on {
                bits | flag.bits()
            } else {
                bits & !flag.bits()
            };
            match self
                .flags
                .compare_exchange(bits, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return,
                Err(actual) => bits = actual,
            }
        }
    }

    /// Toggle the disabled flag.
    pub fn set_disabled(&self, disabled: bool) {
        self.set_flag(ElementFlags::DISABLED, disabled);
    }

    /// Toggle the hidden flag.
    pub fn set_hidden(&self, hidden: bool) {
        self.set_flag(ElementFlags::HIDDEN, hidden);
    }

    /// Toggle the excluded-from-navigation flag.
    pub fn set_excluded(&self, excluded: bool) {
        self.set_flag(ElementFlags::EXCLUDED, excluded);
    }

    /// Toggle the navigation-chrome flag.
    pub fn set_navbar(&self, navbar: bool) {
        self.set_flag(ElementFlags::NAVBAR, navbar);
    }

    /// Toggle the focus opt-out flag.
    pub fn set_no_tab(&self, no_tab: bool) {
        self.set_flag(ElementFlags::NO_TAB, no_tab);
    }

    /// True if currently disabled.
    pub fn is_disabled(&self) -> bool {
        self.current_flags().contains(ElementFlags::DISABLED)
    }

    /// True if currently hidden.
    pub fn is_hidden(&self) -> bool {
        self.current_flags().contains(ElementFlags::HIDDEN)
    }

    /// True if this element currently holds focus.
    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    /// Replace the click callback after construction.
    pub fn set_on_click<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_click.write() = Some(Arc::new(f));
    }

    /// Replace the value-change callback after construction.
    pub fn set_on_change<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_change.write() = Some(Arc::new(f));
    }

    // --- engine-side operations ---
    // These fire the view layer's callbacks; clone the Arc out of the slot
    // first so a callback can re-enter the element without deadlocking.

    /// Mark focused and fire `on_focus`.
    pub(crate) fn gain_focus(&self) {
        self.focused.store(true, Ordering::SeqCst);
        let cb = self.on_focus.read().clone();
        if let Some(cb) = cb {
            cb();
        }
    }

    /// Mark blurred and fire `on_blur`.
    pub(crate) fn lose_focus(&self) {
        self.focused.store(false, Ordering::SeqCst);
        let cb = self.on_blur.read().clone();
        if let Some(cb) = cb {
            cb();
        }
    }

    /// Activate the element (fire `on_click`).
    pub(crate) fn click(&self) {
        let cb = self.on_click.read().clone();
        if let Some(cb) = cb {
            cb();
        }
    }

    /// Deliver a confirmed value (fire `on_change`).
    pub(crate) fn change(&self, value: &str) {
        let cb = self.on_change.read().clone();
        if let Some(cb) = cb {
            cb(value);
        }
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("key", &self.key)
            .field("role", &self.role.name())
            .field("flags", &self.current_flags())
            .field("focused", &self.is_focused())
            .finish()
    }
}
