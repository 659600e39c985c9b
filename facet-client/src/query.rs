//! Query model: named node and list lookups.
//!
//! A query is a named map of lookups resolved in one round of concurrent
//! fetches. Queries are memoized by a stable structural signature of their
//! input, so identical concurrent or repeated queries execute once.

use std::collections::BTreeMap;

use facet_core::TypeName;
use serde_json::Value;

use crate::selection::selection_paths;
use crate::token::ViewRef;
use crate::view::View;

/// One named lookup within a query.
#[derive(Debug, Clone)]
pub enum QueryItem {
    /// Fetch specific entities by raw id.
    Nodes {
        type_name: TypeName,
        ids: Vec<String>,
        view: View,
    },
    /// Fetch a named remote list; the query entry name doubles as the
    /// remote list key and as the store's list name.
    List {
        type_name: TypeName,
        args: Value,
        view: View,
    },
}

/// A named map of lookups. `BTreeMap` keeps iteration (and signatures)
/// deterministic.
pub type Query = BTreeMap<String, QueryItem>;

/// Per-item result: reference tokens in input order (node items) or in
/// stored list order (list items).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    items: BTreeMap<String, Vec<ViewRef>>,
}

impl QueryResult {
    pub(crate) fn new(items: BTreeMap<String, Vec<ViewRef>>) -> Self {
        Self { items }
    }

    pub fn get(&self, name: &str) -> Option<&[ViewRef]> {
        self.items.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ViewRef])> {
        self.items
            .iter()
            .map(|(name, refs)| (name.as_str(), refs.as_slice()))
    }
}

/// Stable structural serialization of a JSON value: object keys are
/// sorted, so two structurally equal inputs share a signature regardless
/// of construction order.
pub fn stable_value_signature(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("bool:{}", b),
        Value::Number(n) => format!("number:{}", n),
        Value::String(s) => format!("string:{:?}", s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(stable_value_signature).collect();
            format!("array:[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(key, _)| key.as_str());
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(key, entry)| format!("{:?}:{}", key, stable_value_signature(entry)))
                .collect();
            format!("object:{{{}}}", parts.join(","))
        }
    }
}

/// Signature of a view's flattened selection (write-time scope: all
/// payloads).
pub(crate) fn selection_signature(view: &View) -> String {
    let paths: Vec<String> = selection_paths(view, None).into_iter().collect();
    paths.join(",")
}

/// Stable signature of a whole query, for request memoization.
pub fn query_signature(query: &Query) -> String {
    let mut parts = Vec::with_capacity(query.len());
    for (name, item) in query {
        match item {
            QueryItem::Nodes {
                type_name,
                ids,
                view,
            } => {
                parts.push(format!(
                    "{}=N|{}|{}|{}",
                    name,
                    type_name,
                    ids.join(","),
                    selection_signature(view)
                ));
            }
            QueryItem::List {
                type_name, args, view, ..
            } => {
                parts.push(format!(
                    "{}=L|{}|{}|{}",
                    name,
                    type_name,
                    stable_value_signature(args),
                    selection_signature(view)
                ));
            }
        }
    }
    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Select;
    use crate::view::ViewRegistry;
    use serde_json::json;

    #[test]
    fn test_stable_signature_ignores_key_order() {
        let a = json!({ "limit": 10, "after": "c1" });
        let b = json!({ "after": "c1", "limit": 10 });
        assert_eq!(stable_value_signature(&a), stable_value_signature(&b));
    }

    #[test]
    fn test_stable_signature_distinguishes_values() {
        let a = json!({ "limit": 10 });
        let b = json!({ "limit": "10" });
        assert_ne!(stable_value_signature(&a), stable_value_signature(&b));
    }

    #[test]
    fn test_query_signature_covers_ids_args_and_selection() {
        let registry = ViewRegistry::new();
        let view = registry.define(Select::new().field("title"));

        let mut query = Query::new();
        query.insert(
            "post".to_string(),
            QueryItem::Nodes {
                type_name: "Post".to_string(),
                ids: vec!["p1".to_string()],
                view: view.clone(),
            },
        );
        let base = query_signature(&query);

        let mut other_ids = query.clone();
        other_ids.insert(
            "post".to_string(),
            QueryItem::Nodes {
                type_name: "Post".to_string(),
                ids: vec!["p2".to_string()],
                view: view.clone(),
            },
        );
        assert_ne!(base, query_signature(&other_ids));

        let wider_view = registry.define(Select::new().field("title").field("content"));
        let mut other_view = query.clone();
        other_view.insert(
            "post".to_string(),
            QueryItem::Nodes {
                type_name: "Post".to_string(),
                ids: vec!["p1".to_string()],
                view: wider_view,
            },
        );
        assert_ne!(base, query_signature(&other_view));
    }
}
