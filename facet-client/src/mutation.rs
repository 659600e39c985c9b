//! Optimistic mutation support.
//!
//! A mutation may carry an immediately-visible optimistic record. Before
//! any field of any touched entity or list is overwritten, its pre-image
//! is captured into a rollback map; only the first capture per key within
//! one mutation is kept, so later writes inside the same mutation cannot
//! clobber the true pre-mutation state. On transport failure every
//! captured pre-image is restored wholesale.

use std::collections::{BTreeSet, HashMap};

use facet_core::{EntityId, Record};
use facet_store::{ListSnapshot, Snapshot, Store};
use serde_json::Value;

use crate::projection::ProjectionCache;
use crate::view::View;

/// Lifecycle of one mutation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Input accepted, nothing applied yet.
    Issued,
    /// The optimistic record has been normalized into the store.
    OptimisticApplied,
    /// Terminal: the authoritative response was merged.
    Confirmed,
    /// Terminal: every touched entity and list was restored.
    RolledBack,
}

/// What a mutation writes locally before and after the transport call.
#[derive(Debug, Clone, Default)]
pub struct MutationWrite {
    /// Entity type of the mutation's subject (and of its response record).
    pub entity_type: String,
    /// Record made visible immediately, before the server confirms.
    pub optimistic: Option<Record>,
    /// Selection used to request the authoritative response shape; also
    /// forwarded to the transport as select paths.
    pub view: Option<View>,
}

impl MutationWrite {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            optimistic: None,
            view: None,
        }
    }

    pub fn with_optimistic(mut self, record: Record) -> Self {
        self.optimistic = Some(record);
        self
    }

    pub fn with_view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }
}

/// Successful mutation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Terminal state; always [`MutationState::Confirmed`] on success.
    pub state: MutationState,
    /// Store key of the normalized response record, when the transport
    /// returned one.
    pub entity_id: Option<EntityId>,
}

/// Rollback map for one mutation: first-write-wins pre-images of every
/// entity and named list touched while the mutation was speculative.
#[derive(Debug, Default)]
pub struct MutationSnapshots {
    entities: HashMap<EntityId, Snapshot>,
    lists: HashMap<String, ListSnapshot>,
}

impl MutationSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture an entity's pre-image unless one is already held.
    pub fn capture_entity(&mut self, store: &Store, id: &str) {
        if !self.entities.contains_key(id) {
            self.entities.insert(id.to_string(), store.snapshot(id));
        }
    }

    /// Capture a named list's pre-image unless one is already held.
    ///
    /// Normalization itself never edits named lists, so `mutate` records
    /// entity snapshots only; this is for callers staging list edits
    /// around an optimistic write, rolled back through the same
    /// [`restore_all`](Self::restore_all).
    pub fn capture_list(&mut self, store: &Store, name: &str) {
        if !self.lists.contains_key(name) {
            self.lists
                .insert(name.to_string(), store.snapshot_list(name));
        }
    }

    /// Restore every captured pre-image (full overwrite, not merge) and
    /// invalidate the projections of restored entities. Restoring is a
    /// pure write of previously captured values and cannot fail partway.
    pub fn restore_all(self, store: &mut Store, projections: &mut ProjectionCache) {
        for (id, snapshot) in self.entities {
            projections.invalidate(&id);
            store.restore(&id, snapshot);
        }
        for (name, snapshot) in self.lists {
            store.restore_list(&name, snapshot);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.lists.is_empty()
    }
}

/// Dotted paths actually present in an (optimistic) record, used as the
/// coverage claim so a partial speculative write never over-claims.
pub(crate) fn record_paths(record: &serde_json::Map<String, Value>) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    collect_record_paths(record, None, &mut paths);
    paths
}

fn collect_record_paths(
    record: &serde_json::Map<String, Value>,
    prefix: Option<&str>,
    out: &mut BTreeSet<String>,
) {
    for (key, value) in record {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };
        match value {
            Value::Object(child) => collect_record_paths(child, Some(&path), out),
            Value::Array(items) => {
                let mut nested = false;
                for item in items {
                    if let Value::Object(child) = item {
                        collect_record_paths(child, Some(&path), out);
                        nested = true;
                    }
                }
                if !nested {
                    out.insert(path);
                }
            }
            _ => {
                out.insert(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_store::CoverageClaim;
    use serde_json::json;

    fn record(fields: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_first_snapshot_wins() {
        let mut store = Store::new();
        store.merge(
            "Post:p1",
            record(&[("likes", json!(3))]),
            CoverageClaim::Paths(vec!["likes".to_string()]),
        );

        let mut snapshots = MutationSnapshots::new();
        snapshots.capture_entity(&store, "Post:p1");

        // A later write inside the same mutation must not refresh the
        // pre-image.
        store.merge("Post:p1", record(&[("likes", json!(4))]), CoverageClaim::Full);
        snapshots.capture_entity(&store, "Post:p1");

        let mut projections = ProjectionCache::new();
        snapshots.restore_all(&mut store, &mut projections);
        assert_eq!(store.read("Post:p1").unwrap().get("likes"), Some(&json!(3)));
        assert!(!store.coverage("Post:p1").unwrap().is_full());
    }

    #[test]
    fn test_restore_covers_lists() {
        let mut store = Store::new();
        store.set_list("recent", vec!["Post:p1".to_string()]);

        let mut snapshots = MutationSnapshots::new();
        snapshots.capture_list(&store, "recent");
        store.set_list("recent", vec!["Post:p2".to_string()]);

        let mut projections = ProjectionCache::new();
        snapshots.restore_all(&mut store, &mut projections);
        assert_eq!(store.get_list("recent").unwrap(), &["Post:p1".to_string()]);
    }

    #[test]
    fn test_record_paths_flatten_embedded_children() {
        let rec = record(&[
            ("likes", json!(4)),
            ("author", json!({ "id": "u1", "name": "Ada" })),
            ("tags", json!(["a", "b"])),
            ("comments", json!([{ "id": "c1", "content": "hi" }])),
        ]);
        let paths: Vec<String> = record_paths(&rec).into_iter().collect();
        assert_eq!(
            paths,
            vec![
                "author.id",
                "author.name",
                "comments.content",
                "comments.id",
                "likes",
                "tags"
            ]
        );
    }
}
