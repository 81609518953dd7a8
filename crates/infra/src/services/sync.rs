//! Set-replacement planning shared by every association sync.
//!
//! The planner is pure: it turns a current and a desired id set into the
//! removals and additions that take one to the other. Stores never see it.

use std::collections::BTreeSet;

use serde::Serialize;

/// Rows to delete and rows to insert so that `current` becomes `desired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan<T: Ord> {
    pub removals: BTreeSet<T>,
    pub additions: BTreeSet<T>,
}

impl<T> SyncPlan<T>
where
    T: Ord + Copy,
{
    /// Plan the change from `current` to `desired`. Duplicates collapse.
    pub fn between(
        current: impl IntoIterator<Item = T>,
        desired: impl IntoIterator<Item = T>,
    ) -> Self {
        let current: BTreeSet<T> = current.into_iter().collect();
        let desired: BTreeSet<T> = desired.into_iter().collect();

        Self {
            removals: current.difference(&desired).copied().collect(),
            additions: desired.difference(&current).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }

    /// Apply the plan to a set (removals first, then additions).
    pub fn apply(&self, current: &BTreeSet<T>) -> BTreeSet<T> {
        let mut next: BTreeSet<T> = current.difference(&self.removals).copied().collect();
        next.extend(self.additions.iter().copied());
        next
    }
}

/// What a sync actually changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> SyncReport<T> {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<T: Ord> From<SyncPlan<T>> for SyncReport<T> {
    fn from(plan: SyncPlan<T>) -> Self {
        Self {
            added: plan.additions.into_iter().collect(),
            removed: plan.removals.into_iter().collect(),
        }
    }
}
