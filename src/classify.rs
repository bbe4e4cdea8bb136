//! Element classification predicates.
//!
//! Pure, side-effect-free answers to "what is this element right now":
//! valid focus target, primary action, secondary/danger action, navigation
//! chrome, dropdown field. Attributes change dynamically (the view layer
//! toggles disabled state, dropdowns open and close), so every predicate
//! reads the element's flags fresh; nothing here is cached across events.

use crate::element::{Element, ElementFlags, Role};

/// True if the element can currently receive focus from the engine.
///
/// Disabled, hidden, focus-opted-out, and explicitly excluded elements are
/// all rejected, as are `Static` elements.
pub fn is_valid_focus_target(element: &Element) -> bool {
    if element.role() == Role::Static {
        return false;
    }
    let flags = element.current_flags();
    !flags.intersects(
        ElementFlags::DISABLED | ElementFlags::HIDDEN | ElementFlags::EXCLUDED | ElementFlags::NO_TAB,
    )
}

/// True for the form's primary/submit action.
///
/// Enter on a primary action activates it; a disabled primary is not
/// activatable and classifies false.
pub fn is_primary_action(element: &Element) -> bool {
    element.role() == Role::PrimaryButton && !element.is_disabled()
}

/// True for secondary or destructive actions (Cancel, Print, Delete).
///
/// These must never be Enter-activated implicitly.
pub fn is_secondary_action(element: &Element) -> bool {
    element.role() == Role::SecondaryButton
}

/// True if the element is part of the navigation chrome.
///
/// Such elements keep native Enter behavior; the engine never intercepts
/// events targeting them.
pub fn is_navigation_chrome(element: &Element) -> bool {
    element.current_flags().contains(ElementFlags::NAVBAR)
}

/// True for searchable-select fields.
pub fn is_dropdown_field(element: &Element) -> bool {
    element.role() == Role::Dropdown
}
