//! Transient per-session selection state and the caller-side decision rules.
//!
//! Selection is never persisted and never shared across folders or users:
//! it lives for the viewing session and is dropped (or cleared) after a
//! successful decision call. The accept-all-pending fallback is deliberately
//! implemented here, outside the store, so the store's `decide` contract
//! stays unambiguous: it always acts on exactly the ids it is given.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{Decision, DecisionAction};

/// Checkbox state per `(document, version)`, scoped to one client session.
#[derive(Debug, Default, Clone)]
pub struct SelectionState {
    checked: HashMap<(String, i32), HashMap<Uuid, bool>>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the checkbox for one recommendation id. Absent keys default to
    /// unchecked, so the first toggle checks the box.
    pub fn toggle(&mut self, document: &str, version: i32, id: Uuid) {
        let entry = self
            .checked
            .entry((document.to_string(), version))
            .or_default()
            .entry(id)
            .or_insert(false);
        *entry = !*entry;
    }

    /// Drop the selection for one document version. Called after a
    /// successful decision call, when the checked ids have gone stale.
    pub fn clear(&mut self, document: &str, version: i32) {
        self.checked.remove(&(document.to_string(), version));
    }

    /// Currently checked ids for a document version, sorted for determinism.
    pub fn selected_ids(&self, document: &str, version: i32) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .checked
            .get(&(document.to_string(), version))
            .map(|m| m.iter().filter(|(_, &on)| on).map(|(id, _)| *id).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn is_empty(&self, document: &str, version: i32) -> bool {
        self.selected_ids(document, version).is_empty()
    }
}

/// Resolve an explicit user action plus the current selection into the id
/// sets a decision call should carry.
///
/// Product rule, preserved exactly: with nothing checked, Accept means
/// "accept every pending item" while Reject is a no-op. Reject never
/// defaults to "all".
pub fn effective_decision(
    action: DecisionAction,
    selected: &[Uuid],
    pending: &[Uuid],
) -> Decision {
    match action {
        DecisionAction::Accept => {
            if selected.is_empty() {
                Decision::accept(pending.to_vec())
            } else {
                Decision::accept(selected.to_vec())
            }
        }
        DecisionAction::Reject => {
            if selected.is_empty() {
                Decision::empty()
            } else {
                Decision::reject(selected.to_vec())
            }
        }
    }
}
