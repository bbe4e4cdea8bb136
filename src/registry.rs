//! The focus registry: the sole source of ordering truth.
//!
//! An ordered, scoped catalog of every element participating in Enter-ring
//! navigation. Entries hold weak references only: the view layer owns element
//! lifetime, and entries whose element has unmounted are dropped lazily on the
//! next traversal rather than requiring a teardown hook on every unmount path.
//!
//! Traversal order within a scope is `(row, column, sequence_position)`
//! ascending, stable for equal keys. `next`/`previous` wrap around at both
//! ends: the ring has no ends, only a terminal action control.

use crate::classify::is_valid_focus_target;
use crate::element::{ElementHandle, ElementKey, Role, Scope, WeakElement, GLOBAL_SCOPE};
use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// A registered element plus its navigation metadata.
#[derive(Clone)]
pub struct FocusEntry {
    /// Stable identifier, unique within the scope.
    pub key: ElementKey,
    /// Non-owning reference to the live element.
    pub element: WeakElement,
    /// 1-based position in the scope's traversal ring.
    pub sequence_position: u32,
    /// Enclosing logical form, or [`GLOBAL_SCOPE`].
    pub scope: Scope,
    /// Role snapshot taken at registration (roles are fixed per element).
    pub role: Role,
}

/// A traversal-ready entry: the weak reference has been upgraded.
#[derive(Clone)]
pub struct ResolvedEntry {
    /// Stable identifier.
    pub key: ElementKey,
    /// Live element handle.
    pub element: ElementHandle,
    /// 1-based sequence position.
    pub sequence_position: u32,
}

/// Sequence-numbering defects detected by [`FocusRegistry::validate_scope`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SequenceError {
    /// Two entries claim the same position.
    #[error("scope {scope:?}: duplicate sequence position {position}")]
    Duplicate {
        /// The offending scope.
        scope: String,
        /// The duplicated position.
        position: u32,
    },
    /// The numbering skips a position.
    #[error("scope {scope:?}: sequence gap, expected {expected} but found {found}")]
    Gap {
        /// The offending scope.
        scope: String,
        /// The position the contiguous ring requires next.
        expected: u32,
        /// The position actually present.
        found: u32,
    },
}

/// Ordered, scoped catalog of navigable elements.
///
/// All operations take `&self`; the registry is safe to mutate while a
/// traversal is in flight (missing keys are tolerated, never fatal).
#[derive(Default)]
pub struct FocusRegistry {
    scopes: RwLock<FxHashMap<Scope, IndexMap<ElementKey, FocusEntry>>>,
}

impl FocusRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update an entry for `element` in `scope`.
    ///
    /// Elements that fail the classifier's valid-focus-target predicate at
    /// registration time are rejected (no-op, returns `false`). The check is
    /// repeated per event anyway, so a later flag change is still honored;
    /// this gate only keeps permanently non-focusable elements out.
    pub fn register(
        &self,
        element: &ElementHandle,
        sequence_position: u32,
        scope: impl Into<Scope>,
    ) -> bool {
        let scope = scope.into();
        if !is_valid_focus_target(element) {
            trace!(key = element.key(), "register rejected: not a valid focus target");
            return false;
        }

        let entry = FocusEntry {
            key: element.key().into(),
            element: std::sync::Arc::downgrade(element),
            sequence_position,
            scope: scope.clone(),
            role: element.role(),
        };

        self.scopes
            .write()
            .entry(scope)
            .or_default()
            .insert(entry.key.clone(), entry);
        true
    }

    /// Register into the global scope.
    pub fn register_global(&self, element: &ElementHandle, sequence_position: u32) -> bool {
        self.register(element, sequence_position, GLOBAL_SCOPE)
    }

    /// Remove an entry by key, from whichever scope holds it.
    ///
    /// Safe to call multiple times; unknown keys are ignored.
    pub fn unregister(&self, key: &str) {
        let mut scopes = self.scopes.write();
        for entries in scopes.values_mut() {
            entries.shift_remove(key);
        }
        scopes.retain(|_, entries| !entries.is_empty());
    }

    /// Drop every entry in a scope.
    pub fn clear_scope(&self, scope: &str) {
        self.scopes.write().remove(scope);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.scopes.write().clear();
    }

    /// Entries of `scope` in authoritative traversal order.
    ///
    /// Sorted by `(row, column, sequence_position)` ascending; the sort is
    /// stable, so duplicated positions tie-break by registration order. Dead
    /// weak references encountered here are dropped from the registry.
    pub fn ordered_entries(&self, scope: &str) -> Vec<ResolvedEntry> {
        let mut stale: Vec<ElementKey> = Vec::new();
        let mut resolved: Vec<(u16, u16, u32, ResolvedEntry)> = Vec::new();

        {
            let scopes = self.scopes.read();
            let Some(entries) = scopes.get(scope) else {
                return Vec::new();
            };
            for entry in entries.values() {
                match entry.element.upgrade() {
                    Some(element) => {
                        let (row, col) = element.grid_position().unwrap_or((0, 0));
                        resolved.push((
                            row,
                            col,
                            entry.sequence_position,
                            ResolvedEntry {
                                key: entry.key.clone(),
                                element,
                                sequence_position: entry.sequence_position,
                            },
                        ));
                    }
                    None => stale.push(entry.key.clone()),
                }
            }
        }

        if !stale.is_empty() {
            debug!(scope, count = stale.len(), "dropping stale focus entries");
            let mut scopes = self.scopes.write();
            if let Some(entries) = scopes.get_mut(scope) {
                for key in &stale {
                    entries.shift_remove(key.as_str());
                }
            }
        }

        resolved.sort_by_key(|(row, col, seq, _)| (*row, *col, *seq));
        resolved.into_iter().map(|(_, _, _, e)| e).collect()
    }

    /// First entry of a scope in traversal order.
    pub fn first(&self, scope: &str) -> Option<ResolvedEntry> {
        self.ordered_entries(scope).into_iter().next()
    }

    /// Last entry of a scope in traversal order (the terminal control).
    pub fn last(&self, scope: &str) -> Option<ResolvedEntry> {
        self.ordered_entries(scope).into_iter().last()
    }

    /// The entry immediately after `key`, wrapping last→first.
    ///
    /// `None` when the scope is empty or `key` is unknown; callers treat both
    /// as a no-op, not an error.
    pub fn next(&self, key: &str, scope: &str) -> Option<ResolvedEntry> {
        let ring = self.ordered_entries(scope);
        let idx = ring.iter().position(|e| e.key == key)?;
        let next = (idx + 1) % ring.len();
        ring.into_iter().nth(next)
    }

    /// The entry immediately before `key`, wrapping first→last.
    pub fn previous(&self, key: &str, scope: &str) -> Option<ResolvedEntry> {
        let ring = self.ordered_entries(scope);
        let idx = ring.iter().position(|e| e.key == key)?;
        let prev = (idx + ring.len() - 1) % ring.len();
        ring.into_iter().nth(prev)
    }

    /// Check the 1-based contiguous numbering invariant for a scope.
    ///
    /// An empty or unknown scope passes. Traversal does not depend on this
    /// check (a violated scope degrades to the stable sorted order), but
    /// callers should run it at scope activation and surface the diagnostic.
    pub fn validate_scope(&self, scope: &str) -> Result<(), SequenceError> {
        let mut positions: Vec<u32> = {
            let scopes = self.scopes.read();
            match scopes.get(scope) {
                Some(entries) => entries.values().map(|e| e.sequence_position).collect(),
                None => return Ok(()),
            }
        };
        positions.sort_unstable();

        let mut expected = 1u32;
        for found in positions {
            if found == expected {
                expected += 1;
            } else if found < expected {
                return Err(SequenceError::Duplicate {
                    scope: scope.to_string(),
                    position: found,
                });
            } else {
                return Err(SequenceError::Gap {
                    scope: scope.to_string(),
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Number of live scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.read().len()
    }

    /// Number of entries registered in a scope (including not-yet-swept
    /// stale ones).
    pub fn len(&self, scope: &str) -> usize {
        self.scopes.read().get(scope).map_or(0, IndexMap::len)
    }

    /// True if the scope has no entries.
    pub fn is_empty(&self, scope: &str) -> bool {
        self.len(scope) == 0
    }
}
