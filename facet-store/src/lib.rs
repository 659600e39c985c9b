//! FACET Store - Normalized Entity Storage
//!
//! Keyed record storage with a per-entity field-coverage mask, named
//! ordered id lists, and a per-entity change-notification registry.
//! `merge` is the single mutation funnel: every write (fetch result,
//! optimistic write, rollback) goes through it, keeping mask and
//! subscription invariants centralized.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use facet_core::{merge_fields, EntityId, FieldMask, Record};

// ============================================================================
// COVERAGE TYPES
// ============================================================================

/// What a merge claims to have fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageClaim {
    /// The whole entity was fetched; the mask becomes full.
    Full,
    /// Only the given dotted paths were fetched.
    Paths(Vec<String>),
}

impl CoverageClaim {
    /// Build a claim from an optional path set (`None` means everything).
    pub fn from_select<I, S>(select: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match select {
            None => CoverageClaim::Full,
            Some(paths) => CoverageClaim::Paths(
                paths.into_iter().map(|p| p.as_ref().to_string()).collect(),
            ),
        }
    }
}

/// Result of asking which requested paths an entity is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    /// The entity is wholly unknown; everything must be fetched.
    All,
    /// The listed paths are not yet covered. Empty means satisfied.
    Paths(Vec<String>),
}

impl Missing {
    /// Whether the selection is fully covered already.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Missing::Paths(paths) if paths.is_empty())
    }
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Pre-mutation image of one entity: record plus coverage mask.
///
/// `None` components mean the entity did not exist; restoring such a
/// snapshot removes the entity again.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    record: Option<Record>,
    mask: Option<FieldMask>,
}

/// Pre-mutation image of one named list.
#[derive(Debug, Clone, Default)]
pub struct ListSnapshot {
    ids: Option<Vec<EntityId>>,
}

// ============================================================================
// SUBSCRIPTIONS
// ============================================================================

/// Change listener invoked synchronously after every merge of its entity.
pub type Listener = Box<dyn Fn() + Send + Sync>;

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ============================================================================
// STORE
// ============================================================================

/// The entity store.
///
/// Exclusively owned by the client that created it; readers never mutate.
#[derive(Default)]
pub struct Store {
    records: HashMap<EntityId, Record>,
    coverage: HashMap<EntityId, FieldMask>,
    lists: HashMap<String, Vec<EntityId>>,
    subscriptions: HashMap<EntityId, Vec<(SubscriptionId, Listener)>>,
    next_subscription: u64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the raw record for an entity, if any.
    pub fn read(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Whether the entity exists at all.
    pub fn has(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// The coverage mask for an entity, if it has one.
    pub fn coverage(&self, id: &str) -> Option<&FieldMask> {
        self.coverage.get(id)
    }

    /// Merge a partial record into the entity and widen its mask.
    ///
    /// New fields overwrite old ones; unfetched fields are untouched, so
    /// partial fetches compose. Subscribers are notified synchronously
    /// afterwards, in merge order.
    pub fn merge(&mut self, id: &str, partial: Record, claim: CoverageClaim) {
        let base = self.records.entry(id.to_string()).or_default();
        merge_fields(base, partial);

        match claim {
            CoverageClaim::Full => {
                self.coverage.insert(id.to_string(), FieldMask::full());
            }
            CoverageClaim::Paths(paths) => {
                let mask = self.coverage.entry(id.to_string()).or_default();
                mask.union(&FieldMask::from_paths(Some(paths.iter())));
            }
        }

        self.notify(id);
    }

    /// Which of the requested paths are not yet covered for this entity.
    ///
    /// Returns [`Missing::All`] when the entity is wholly unknown. With no
    /// explicit paths, the entity counts as covered only when its mask is
    /// full.
    pub fn missing_for_selection<'a, I>(&self, id: &str, paths: Option<I>) -> Missing
    where
        I: IntoIterator<Item = &'a str>,
    {
        if !self.records.contains_key(id) {
            return Missing::All;
        }

        let mask = self.coverage.get(id);
        match paths {
            None => match mask {
                Some(mask) if mask.is_full() => Missing::Paths(Vec::new()),
                _ => Missing::All,
            },
            Some(paths) => {
                let empty = FieldMask::new();
                Missing::Paths(mask.unwrap_or(&empty).diff_paths(paths))
            }
        }
    }

    /// Register a change listener for an entity.
    pub fn subscribe(&mut self, id: &str, listener: Listener) -> SubscriptionId {
        let sub_id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions
            .entry(id.to_string())
            .or_default()
            .push((sub_id, listener));
        sub_id
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&mut self, id: &str, sub_id: SubscriptionId) {
        if let Some(listeners) = self.subscriptions.get_mut(id) {
            listeners.retain(|(existing, _)| *existing != sub_id);
            if listeners.is_empty() {
                self.subscriptions.remove(id);
            }
        }
    }

    fn notify(&self, id: &str) {
        let Some(listeners) = self.subscriptions.get(id) else {
            return;
        };

        for (sub_id, listener) in listeners {
            // One panicking subscriber must not break the rest.
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                tracing::warn!(entity_id = id, subscription = sub_id.0, "listener panicked");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Named lists
    // ------------------------------------------------------------------------

    /// Read a named ordered result list.
    pub fn get_list(&self, name: &str) -> Option<&[EntityId]> {
        self.lists.get(name).map(Vec::as_slice)
    }

    /// Replace a named list wholesale.
    pub fn set_list(&mut self, name: &str, ids: Vec<EntityId>) {
        self.lists.insert(name.to_string(), ids);
    }

    /// Append ids for pagination, skipping ones already present.
    pub fn append_list(&mut self, name: &str, ids: Vec<EntityId>) {
        let list = self.lists.entry(name.to_string()).or_default();
        for id in ids {
            if !list.contains(&id) {
                list.push(id);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Snapshots (optimistic mutation support)
    // ------------------------------------------------------------------------

    /// Capture the current record and mask of an entity.
    pub fn snapshot(&self, id: &str) -> Snapshot {
        Snapshot {
            record: self.records.get(id).cloned(),
            mask: self.coverage.get(id).cloned(),
        }
    }

    /// Restore an entity to a previously captured snapshot.
    ///
    /// Full overwrite, not merge: the record and mask are replaced (or
    /// removed, if the snapshot predates the entity). Subscribers are
    /// notified.
    pub fn restore(&mut self, id: &str, snapshot: Snapshot) {
        match snapshot.record {
            Some(record) => {
                self.records.insert(id.to_string(), record);
            }
            None => {
                self.records.remove(id);
            }
        }
        match snapshot.mask {
            Some(mask) => {
                self.coverage.insert(id.to_string(), mask);
            }
            None => {
                self.coverage.remove(id);
            }
        }
        self.notify(id);
    }

    /// Capture the current contents of a named list, for callers that
    /// stage list edits they may need to undo. Entity merges never touch
    /// named lists.
    pub fn snapshot_list(&self, name: &str) -> ListSnapshot {
        ListSnapshot {
            ids: self.lists.get(name).cloned(),
        }
    }

    /// Restore a named list to a previously captured snapshot.
    pub fn restore_list(&mut self, name: &str, snapshot: ListSnapshot) {
        match snapshot.ids {
            Some(ids) => {
                self.lists.insert(name.to_string(), ids);
            }
            None => {
                self.lists.remove(name);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    /// Remove an entity and scrub its id out of every named list and every
    /// other record's relation values. Returns the ids of other entities
    /// whose records were touched by the scrub.
    pub fn delete(&mut self, id: &str) -> Vec<EntityId> {
        self.records.remove(id);
        self.coverage.remove(id);

        for list in self.lists.values_mut() {
            list.retain(|entry| entry != id);
        }

        let mut touched = Vec::new();
        for (other_id, record) in self.records.iter_mut() {
            let mut changed = false;
            for value in record.values_mut() {
                match value {
                    serde_json::Value::String(s) if s == id => {
                        *value = serde_json::Value::Null;
                        changed = true;
                    }
                    serde_json::Value::Array(items) => {
                        let before = items.len();
                        items.retain(|item| item.as_str() != Some(id));
                        changed |= items.len() != before;
                    }
                    _ => {}
                }
            }
            if changed {
                touched.push(other_id.clone());
            }
        }

        self.notify(id);
        for other_id in &touched {
            self.notify(other_id);
        }
        touched
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
