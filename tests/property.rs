//! Property-based tests for ringnav.
//!
//! Uses proptest to find edge cases automatically through randomized testing.

use proptest::prelude::*;
use ringnav::{
    Element, ElementHandle, EventResult, KeyCode, KeyEvent, KeyModifiers, KeyboardManager, Role,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn enter() -> KeyEvent {
    KeyEvent::new(KeyCode::Enter)
}

fn shift_enter() -> KeyEvent {
    KeyEvent::with_modifiers(KeyCode::Enter, KeyModifiers::SHIFT)
}

/// Build a scope of `n` inputs followed by one terminal primary action,
/// registered at positions 1..=n+1.
fn ring_of(manager: &KeyboardManager, n: usize) -> (Vec<ElementHandle>, Arc<AtomicUsize>) {
    let clicks = Arc::new(AtomicUsize::new(0));
    let c = clicks.clone();

    let mut els: Vec<ElementHandle> = (0..n)
        .map(|i| Element::new(format!("field-{i}"), Role::Input).handle())
        .collect();
    els.push(
        Element::new("commit", Role::PrimaryButton)
            .on_click(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .handle(),
    );
    for (i, el) in els.iter().enumerate() {
        assert!(manager.registry().register(el, (i + 1) as u32, "ring"));
    }
    manager.activate_scope("ring", false);
    (els, clicks)
}

// ============================================================================
// Ring closure
// ============================================================================

proptest! {
    /// Pressing Enter from position 1 visits every position exactly once and
    /// returns to position 1 after the terminal action fires.
    #[test]
    fn forward_cycle_is_a_closed_ring(n in 1usize..24) {
        let manager = KeyboardManager::new();
        let (els, clicks) = ring_of(&manager, n);
        manager.set_focus(&els[0]);

        let mut visited = vec![els[0].key().to_string()];
        for _ in 0..n {
            prop_assert_eq!(manager.handle_key(&enter()), EventResult::Consumed);
            visited.push(manager.focused().unwrap().key().to_string());
        }

        // Every position seen exactly once, ending on the terminal action.
        let mut unique = visited.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), n + 1);
        prop_assert_eq!(visited.last().unwrap().as_str(), "commit");

        // Enter on the terminal clicks and, after the flush, wraps to 1.
        prop_assert_eq!(manager.handle_key(&enter()), EventResult::Consumed);
        prop_assert_eq!(clicks.load(Ordering::SeqCst), 1);
        manager.flush_deferred();
        let focused = manager.focused().unwrap();
        prop_assert_eq!(focused.key(), "field-0");
    }

    /// Shift+Enter visits the same positions in exact reverse order and
    /// never fires the terminal click.
    #[test]
    fn reverse_cycle_is_the_mirror_image(n in 1usize..24) {
        let manager = KeyboardManager::new();
        let (els, clicks) = ring_of(&manager, n);
        manager.set_focus(&els[0]);

        let mut reverse_visited = Vec::new();
        for _ in 0..=n {
            prop_assert_eq!(manager.handle_key(&shift_enter()), EventResult::Consumed);
            reverse_visited.push(manager.focused().unwrap().key().to_string());
        }

        // From position 1 the reverse walk is the element list backwards,
        // ending where it started.
        let expected: Vec<String> = els.iter().rev().map(|el| el.key().to_string()).collect();
        prop_assert_eq!(reverse_visited, expected);
        prop_assert_eq!(clicks.load(Ordering::SeqCst), 0);
    }

    /// From any starting position, one Enter followed by one Shift+Enter
    /// returns focus to where it started (away from the terminal, where
    /// Enter clicks instead of moving).
    #[test]
    fn forward_then_reverse_is_identity(n in 2usize..24, start in 0usize..24) {
        let manager = KeyboardManager::new();
        let (els, _clicks) = ring_of(&manager, n);
        let start = start % n; // stay off the terminal action
        manager.set_focus(&els[start]);

        manager.handle_key(&enter());
        manager.handle_key(&shift_enter());
        let focused = manager.focused().unwrap();
        prop_assert_eq!(focused.key(), els[start].key());
    }

    /// Registry traversal is total: next() and previous() resolve for every
    /// registered key, in both directions, regardless of scope size.
    #[test]
    fn registry_wrap_never_dead_ends(n in 1usize..32, steps in 1usize..128) {
        let manager = KeyboardManager::new();
        let (els, _clicks) = ring_of(&manager, n);

        let mut key = els[0].key().to_string();
        for step in 0..steps {
            let entry = if step % 3 == 0 {
                manager.registry().previous(&key, "ring")
            } else {
                manager.registry().next(&key, "ring")
            };
            let entry = entry.expect("ring traversal always resolves");
            key = entry.key.to_string();
        }
    }
}
