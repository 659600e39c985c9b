//! Field-coverage mask algebra.
//!
//! One mask exists per cached entity and records which dotted field paths
//! are known to be fully fetched. The mask is a small tree: `all = true`
//! at any node means every path under that node is covered, and children
//! are pruned as redundant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Coverage tree for one entity.
///
/// Invariant: a node with `all = true` has no children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMask {
    all: bool,
    children: BTreeMap<String, FieldMask>,
}

impl FieldMask {
    /// An empty mask covering nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mask covering every path.
    pub fn full() -> Self {
        Self {
            all: true,
            children: BTreeMap::new(),
        }
    }

    /// Whether the whole entity is covered.
    pub fn is_full(&self) -> bool {
        self.all
    }

    /// Build a mask from a list of dotted paths.
    ///
    /// `None` means "everything was fetched" and yields a full mask,
    /// matching the convention that an unselected fetch returns whole
    /// records.
    pub fn from_paths<I, S>(paths: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match paths {
            None => Self::full(),
            Some(paths) => {
                let mut mask = Self::new();
                for path in paths {
                    mask.add_path(path.as_ref());
                }
                mask
            }
        }
    }

    /// Mark a dotted path as covered.
    ///
    /// `"*"` (or the empty path) is the absorbing element: it marks the
    /// whole mask covered and discards children. Adding a path below an
    /// already-full subtree is a no-op.
    pub fn add_path(&mut self, path: &str) {
        if self.all {
            return;
        }

        if path == "*" || path.is_empty() {
            self.all = true;
            self.children.clear();
            return;
        }

        let mut node = self;
        for segment in path.split('.') {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.all = true;
        node.children.clear();
    }

    /// Union `other` into `self`. Coverage never regresses.
    pub fn union(&mut self, other: &FieldMask) {
        if self.all || other.all {
            self.all = true;
            self.children.clear();
            return;
        }

        for (key, child) in &other.children {
            match self.children.get_mut(key) {
                Some(existing) => existing.union(child),
                None => {
                    self.children.insert(key.clone(), child.clone());
                }
            }
        }
    }

    /// Whether a dotted path is covered.
    ///
    /// Walking segment by segment: hitting an `all` node early covers any
    /// longer path ("fetched this whole relation"); reaching a node with no
    /// remaining children means that subtree was marked covered in full, so
    /// a prefix path is trivially covered too.
    pub fn is_covered(&self, path: &str) -> bool {
        if self.all {
            return true;
        }

        let mut node = self;
        for segment in path.split('.') {
            if node.all {
                return true;
            }
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.all || node.children.is_empty()
    }

    /// Return the subset of `paths` not yet covered by this mask.
    pub fn diff_paths<'a, I>(&self, paths: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        paths
            .into_iter()
            .filter(|path| !self.is_covered(path))
            .map(|path| path.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mask_covers_nothing() {
        let mask = FieldMask::new();
        assert!(!mask.is_covered("title"));
        assert!(!mask.is_covered("author.name"));
    }

    #[test]
    fn test_full_mask_covers_everything() {
        let mask = FieldMask::full();
        assert!(mask.is_covered("title"));
        assert!(mask.is_covered("author.name.deeply.nested"));
    }

    #[test]
    fn test_add_path_covers_exact_path() {
        let mut mask = FieldMask::new();
        mask.add_path("author.name");
        assert!(mask.is_covered("author.name"));
        assert!(!mask.is_covered("author.email"));
        assert!(!mask.is_covered("title"));
    }

    #[test]
    fn test_leaf_subsumes_deeper_paths() {
        let mut mask = FieldMask::new();
        mask.add_path("author");
        // "Fetched this whole relation" covers anything beneath it.
        assert!(mask.is_covered("author.name"));
        assert!(mask.is_covered("author.name.first"));
    }

    #[test]
    fn test_prefix_with_partial_children_is_not_covered() {
        let mut mask = FieldMask::new();
        mask.add_path("author.name");
        mask.add_path("author.email");
        // Individual fields of the relation are known, but the relation as
        // a whole was never fetched in full.
        assert!(!mask.is_covered("author"));
        assert!(mask.is_covered("author.name"));

        mask.add_path("author");
        assert!(mask.is_covered("author"));
    }

    #[test]
    fn test_prefix_not_covered_when_siblings_missing() {
        let mut mask = FieldMask::new();
        mask.add_path("comments.edges.node.content");
        // The intermediate node still has children, so the bare prefix is
        // covered only down the recorded chain.
        assert!(mask.is_covered("comments.edges.node.content"));
        assert!(!mask.is_covered("comments.edges.node.author"));
    }

    #[test]
    fn test_star_absorbs_and_clears_children() {
        let mut mask = FieldMask::new();
        mask.add_path("title");
        mask.add_path("*");
        assert!(mask.is_full());
        assert!(mask.is_covered("anything.at.all"));
        // Absorbing element is idempotent.
        mask.add_path("*");
        assert!(mask.is_full());
    }

    #[test]
    fn test_union_promotes_all() {
        let mut a = FieldMask::new();
        a.add_path("title");
        let b = FieldMask::full();
        a.union(&b);
        assert!(a.is_full());
    }

    #[test]
    fn test_union_merges_children() {
        let mut a = FieldMask::new();
        a.add_path("author.name");
        let mut b = FieldMask::new();
        b.add_path("author.email");
        b.add_path("title");
        a.union(&b);
        assert!(a.is_covered("author.name"));
        assert!(a.is_covered("author.email"));
        assert!(a.is_covered("title"));
        assert!(!a.is_covered("content"));
    }

    #[test]
    fn test_from_paths_none_is_full() {
        let mask = FieldMask::from_paths(None::<Vec<&str>>);
        assert!(mask.is_full());
    }

    #[test]
    fn test_diff_paths_returns_missing_only() {
        let mut mask = FieldMask::new();
        mask.add_path("title");
        let missing = mask.diff_paths(["title", "content", "author.name"]);
        assert_eq!(missing, vec!["content".to_string(), "author.name".to_string()]);
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn path_strategy() -> impl Strategy<Value = String> {
        // Shallow dotted paths over a small segment alphabet, matching the
        // schema-bounded nesting depth of real selections.
        prop::collection::vec("[a-e]{1,3}", 1..4).prop_map(|segments| segments.join("."))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// After add_path(m, p), is_covered(m, p) holds.
        #[test]
        fn prop_add_path_covers(path in path_strategy()) {
            let mut mask = FieldMask::new();
            mask.add_path(&path);
            prop_assert!(mask.is_covered(&path));
        }

        /// Coverage never regresses under further add_path calls.
        #[test]
        fn prop_add_path_monotonic(
            first in path_strategy(),
            rest in prop::collection::vec(path_strategy(), 0..8),
        ) {
            let mut mask = FieldMask::new();
            mask.add_path(&first);
            for path in &rest {
                mask.add_path(path);
                prop_assert!(mask.is_covered(&first));
            }
        }

        /// Coverage never regresses under union.
        #[test]
        fn prop_union_monotonic(
            mine in prop::collection::vec(path_strategy(), 1..6),
            theirs in prop::collection::vec(path_strategy(), 0..6),
        ) {
            let mut mask = FieldMask::from_paths(Some(mine.iter()));
            let other = FieldMask::from_paths(Some(theirs.iter()));
            mask.union(&other);
            for path in &mine {
                prop_assert!(mask.is_covered(path));
            }
            for path in &theirs {
                prop_assert!(mask.is_covered(path));
            }
        }

        /// Union with a full mask absorbs everything.
        #[test]
        fn prop_full_absorbs(paths in prop::collection::vec(path_strategy(), 0..6)) {
            let mut mask = FieldMask::from_paths(Some(paths.iter()));
            mask.union(&FieldMask::full());
            prop_assert!(mask.is_full());
        }
    }
}
