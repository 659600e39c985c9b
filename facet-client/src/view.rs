//! Views: tagged, composable field selections.
//!
//! A view wraps a selection under a unique opaque tag so that multiple
//! named selections can be spread onto one base selection while the read
//! path still knows, per composed sub-selection, whether it was present on
//! a given reference token. Tags are minted by a registry-owned counter,
//! not global mutable state.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::selection::{Select, SelectionMap};
use crate::token::ViewRef;

/// Opaque identity of one view definition.
///
/// Two structurally identical selections defined separately get distinct
/// tags; identity comparison is O(1).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ViewTag(u64);

/// Mints view tags. One registry per process (or per schema) is expected;
/// the counter is scoped to the registry's lifetime.
#[derive(Debug, Default)]
pub struct ViewRegistry {
    next_tag: AtomicU64,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a new view over the given selection, under a fresh tag.
    pub fn define(&self, select: Select) -> View {
        let tag = ViewTag(self.next_tag.fetch_add(1, Ordering::Relaxed));
        View {
            payloads: vec![ViewPayload {
                tag,
                select: select.into_map(),
            }],
        }
    }
}

/// One tagged sub-selection of a composed view.
#[derive(Debug, Clone)]
pub struct ViewPayload {
    pub tag: ViewTag,
    pub select: SelectionMap,
}

/// A composed view: one or more tagged selections spread together.
#[derive(Debug, Clone, Default)]
pub struct View {
    payloads: Vec<ViewPayload>,
}

impl View {
    /// Spread this view together with another, preserving both tag sets.
    pub fn and(&self, other: &View) -> View {
        let mut payloads = self.payloads.clone();
        payloads.extend(other.payloads.iter().cloned());
        View { payloads }
    }

    /// Compose any number of views into one.
    pub fn compose<'a, I>(views: I) -> View
    where
        I: IntoIterator<Item = &'a View>,
    {
        let mut payloads = Vec::new();
        for view in views {
            payloads.extend(view.payloads.iter().cloned());
        }
        View { payloads }
    }

    /// All tags carried by this composition.
    pub fn tags(&self) -> BTreeSet<ViewTag> {
        self.payloads.iter().map(|payload| payload.tag).collect()
    }

    /// The sub-selections visible through the given token.
    ///
    /// With no token (e.g. at write time) every payload is returned;
    /// otherwise only payloads whose tag is in the token's tag set.
    pub fn payloads<'a>(
        &'a self,
        token: Option<&'a ViewRef>,
    ) -> impl Iterator<Item = &'a ViewPayload> + 'a {
        self.payloads
            .iter()
            .filter(move |payload| match token {
                None => true,
                Some(token) => token.has_tag(payload.tag),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Select;

    #[test]
    fn test_define_mints_distinct_tags() {
        let registry = ViewRegistry::new();
        let a = registry.define(Select::new().field("id"));
        let b = registry.define(Select::new().field("id"));
        assert_ne!(a.tags(), b.tags());
    }

    #[test]
    fn test_compose_preserves_all_tags() {
        let registry = ViewRegistry::new();
        let a = registry.define(Select::new().field("id"));
        let b = registry.define(Select::new().field("title"));
        let composed = a.and(&b);
        let expected: BTreeSet<ViewTag> = a.tags().union(&b.tags()).copied().collect();
        assert_eq!(composed.tags(), expected);
    }

    #[test]
    fn test_payloads_filtered_by_token_tags() {
        let registry = ViewRegistry::new();
        let a = registry.define(Select::new().field("id"));
        let b = registry.define(Select::new().field("title"));
        let composed = a.and(&b);

        // Token minted against only the first view.
        let token = ViewRef::new("Post", "p1", &a);
        assert_eq!(composed.payloads(Some(&token)).count(), 1);
        assert_eq!(composed.payloads(None).count(), 2);
    }
}
