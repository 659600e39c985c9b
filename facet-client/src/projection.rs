//! Masked projections and the derived-read cache.
//!
//! A projection is the shape handed back to callers: selected scalars
//! copied out of the store, relations resolved into fresh reference tokens
//! or inlined child objects. Projections are memoized per entity and
//! invalidated whenever the underlying record changes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use facet_core::EntityId;
use serde_json::{json, Value};

use crate::token::ViewRef;
use crate::view::{View, ViewTag};

/// One node of a masked projection.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewData {
    /// A copied scalar value.
    Scalar(Value),
    /// A nested object (inline relation data or connection wrapper).
    Object(BTreeMap<String, ViewData>),
    /// An ordered list (to-many relation or connection edges).
    List(Vec<ViewData>),
    /// A reference token for a relation read through a nested view.
    Ref(ViewRef),
    /// Selected, but not present in the store.
    Missing,
}

impl ViewData {
    /// Field access for object projections.
    pub fn get(&self, key: &str) -> Option<&ViewData> {
        match self {
            ViewData::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            ViewData::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ViewData]> {
        match self {
            ViewData::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_ref_token(&self) -> Option<&ViewRef> {
        match self {
            ViewData::Ref(token) => Some(token),
            _ => None,
        }
    }

    /// Collapse into plain JSON for display or assertions. Reference
    /// tokens become `{ "__typename": ..., "id": ... }`; missing fields
    /// become `null`.
    pub fn to_value(&self) -> Value {
        match self {
            ViewData::Scalar(value) => value.clone(),
            ViewData::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, data)| (key.clone(), data.to_value()))
                    .collect(),
            ),
            ViewData::List(items) => {
                Value::Array(items.iter().map(ViewData::to_value).collect())
            }
            ViewData::Ref(token) => json!({
                "__typename": token.type_name(),
                "id": token.raw_id(),
            }),
            ViewData::Missing => Value::Null,
        }
    }
}

/// Memo key: which view composition was read, through which token tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProjectionKey {
    view_tags: Vec<ViewTag>,
    token_tags: Vec<ViewTag>,
}

impl ProjectionKey {
    fn new(view: &View, token: &ViewRef) -> Self {
        Self {
            view_tags: view.tags().into_iter().collect(),
            token_tags: token.tags().iter().copied().collect(),
        }
    }
}

/// Per-entity memo of previously computed projections.
#[derive(Debug, Default)]
pub struct ProjectionCache {
    entries: HashMap<EntityId, HashMap<ProjectionKey, Arc<ViewData>>>,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: &str, view: &View, token: &ViewRef) -> Option<Arc<ViewData>> {
        self.entries
            .get(entity_id)?
            .get(&ProjectionKey::new(view, token))
            .cloned()
    }

    pub fn set(&mut self, entity_id: &str, view: &View, token: &ViewRef, data: Arc<ViewData>) {
        self.entries
            .entry(entity_id.to_string())
            .or_default()
            .insert(ProjectionKey::new(view, token), data);
    }

    /// Drop every memoized projection of an entity. Called on each merge,
    /// restore, or delete touching it.
    pub fn invalidate(&mut self, entity_id: &str) {
        self.entries.remove(entity_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Select;
    use crate::view::ViewRegistry;

    #[test]
    fn test_cache_hit_requires_same_view_and_tags() {
        let registry = ViewRegistry::new();
        let view_a = registry.define(Select::new().field("title"));
        let view_b = registry.define(Select::new().field("title"));
        let token_a = ViewRef::new("Post", "p1", &view_a);
        let token_b = ViewRef::new("Post", "p1", &view_b);

        let mut cache = ProjectionCache::new();
        let data = Arc::new(ViewData::Scalar(serde_json::json!("x")));
        cache.set("Post:p1", &view_a, &token_a, Arc::clone(&data));

        assert!(cache.get("Post:p1", &view_a, &token_a).is_some());
        // Structurally identical selection, distinct definition: miss.
        assert!(cache.get("Post:p1", &view_b, &token_b).is_none());
    }

    #[test]
    fn test_invalidate_drops_all_entries_for_entity() {
        let registry = ViewRegistry::new();
        let view = registry.define(Select::new().field("title"));
        let token = ViewRef::new("Post", "p1", &view);

        let mut cache = ProjectionCache::new();
        cache.set(
            "Post:p1",
            &view,
            &token,
            Arc::new(ViewData::Scalar(serde_json::json!(1))),
        );
        cache.invalidate("Post:p1");
        assert!(cache.get("Post:p1", &view, &token).is_none());
    }

    #[test]
    fn test_to_value_renders_refs_and_missing() {
        let registry = ViewRegistry::new();
        let view = registry.define(Select::new().field("name"));
        let token = ViewRef::new("User", "u1", &view);

        let mut map = BTreeMap::new();
        map.insert("author".to_string(), ViewData::Ref(token));
        map.insert("subtitle".to_string(), ViewData::Missing);
        let data = ViewData::Object(map);

        assert_eq!(
            data.to_value(),
            serde_json::json!({
                "author": { "__typename": "User", "id": "u1" },
                "subtitle": null,
            })
        );
    }
}
