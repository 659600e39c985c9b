//! Declarative field selections.
//!
//! A selection maps field names to either a scalar leaf, a nested
//! selection (relation), or a nested tagged view. Flattening a composed
//! view yields the dotted paths the cache tracks coverage by; connection
//! shaped selections (`edges` wrapping `node`) descend into the node
//! selection without emitting wrapper segments, since pagination metadata
//! is not cached per entity.

use std::collections::{BTreeMap, BTreeSet};

use crate::token::ViewRef;
use crate::view::View;

/// One node of a selection tree.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Select the field's value as-is.
    Scalar,
    /// Select into a relation with a plain nested selection.
    Fields(SelectionMap),
    /// Select into a relation through a tagged view; reads produce
    /// reference tokens instead of inline data.
    View(View),
}

pub type SelectionMap = BTreeMap<String, Selection>;

/// Builder for selection maps.
#[derive(Debug, Clone, Default)]
pub struct Select {
    fields: SelectionMap,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a scalar field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Selection::Scalar);
        self
    }

    /// Select into a relation with a nested selection.
    pub fn nested(mut self, name: impl Into<String>, select: Select) -> Self {
        self.fields
            .insert(name.into(), Selection::Fields(select.into_map()));
        self
    }

    /// Select into a relation through a view.
    pub fn view(mut self, name: impl Into<String>, view: &View) -> Self {
        self.fields.insert(name.into(), Selection::View(view.clone()));
        self
    }

    /// Select a connection-shaped relation: `{ edges: { node: <select> } }`.
    pub fn connection(mut self, name: impl Into<String>, node: Select) -> Self {
        let mut edge = SelectionMap::new();
        edge.insert("node".to_string(), Selection::Fields(node.into_map()));
        let mut conn = SelectionMap::new();
        conn.insert("edges".to_string(), Selection::Fields(edge));
        self.fields.insert(name.into(), Selection::Fields(conn));
        self
    }

    /// Select a connection-shaped relation whose nodes resolve through a
    /// view (reads yield reference tokens per node).
    pub fn connection_view(mut self, name: impl Into<String>, node: &View) -> Self {
        let mut edge = SelectionMap::new();
        edge.insert("node".to_string(), Selection::View(node.clone()));
        let mut conn = SelectionMap::new();
        conn.insert("edges".to_string(), Selection::Fields(edge));
        self.fields.insert(name.into(), Selection::Fields(conn));
        self
    }

    pub fn into_map(self) -> SelectionMap {
        self.fields
    }
}

/// Wrapper keys of a connection-shaped selection that never become path
/// segments.
const CONNECTION_WRAPPERS: &[&str] = &["edges", "items"];

/// If the map is connection-shaped, return its edge selection and node
/// selection.
pub(crate) fn connection_parts(map: &SelectionMap) -> Option<(&SelectionMap, &Selection)> {
    for wrapper in CONNECTION_WRAPPERS {
        if let Some(Selection::Fields(edge)) = map.get(*wrapper) {
            if let Some(node) = edge.get("node") {
                return Some((edge, node));
            }
        }
    }
    None
}

/// If the map is connection-shaped, return its node selection.
pub(crate) fn connection_node(map: &SelectionMap) -> Option<&Selection> {
    connection_parts(map).map(|(_, node)| node)
}

/// Flatten a composed view into the set of dotted paths it references,
/// honoring the token's tag set (payloads not present on the token
/// contribute nothing).
pub fn selection_paths(view: &View, token: Option<&ViewRef>) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    for payload in view.payloads(token) {
        walk(&payload.select, None, token, &mut paths);
    }
    paths
}

fn walk(
    map: &SelectionMap,
    prefix: Option<&str>,
    token: Option<&ViewRef>,
    out: &mut BTreeSet<String>,
) {
    for (key, selection) in map {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };
        walk_selection(selection, &path, token, out);
    }
}

fn walk_selection(
    selection: &Selection,
    path: &str,
    token: Option<&ViewRef>,
    out: &mut BTreeSet<String>,
) {
    match selection {
        Selection::Scalar => {
            out.insert(path.to_string());
        }
        Selection::Fields(sub) => match connection_node(sub) {
            Some(node) => walk_selection(node, path, token, out),
            None => walk(sub, Some(path), token, out),
        },
        Selection::View(view) => {
            for payload in view.payloads(token) {
                walk(&payload.select, Some(path), token, out);
            }
        }
    }
}
