//! Reference tokens: the only handle the cache passes to callers.
//!
//! A token is a cheap, structurally comparable `{type, id, tags}` value.
//! Its tag set records which view definitions it was minted against, and
//! gates which composed sub-selections a later read may surface. Reading a
//! field whose view tag is absent from the token is not an error; the
//! field is simply omitted (selection narrowing, not a violation).

use std::collections::BTreeSet;

use facet_core::{to_entity_id, EntityId, TypeName};
use serde::Serialize;

use crate::view::{View, ViewTag};

/// Opaque reference to one entity, scoped to a set of view definitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ViewRef {
    type_name: TypeName,
    raw_id: String,
    tags: BTreeSet<ViewTag>,
}

impl ViewRef {
    /// Mint a token for `(type, raw_id)` against a view composition.
    pub fn new(type_name: impl Into<TypeName>, raw_id: impl Into<String>, view: &View) -> Self {
        Self {
            type_name: type_name.into(),
            raw_id: raw_id.into(),
            tags: view.tags(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn raw_id(&self) -> &str {
        &self.raw_id
    }

    /// The store key this token points at.
    pub fn entity_id(&self) -> EntityId {
        to_entity_id(&self.type_name, &self.raw_id)
    }

    /// Whether the given view definition was present when this token was
    /// minted.
    pub fn has_tag(&self, tag: ViewTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn tags(&self) -> &BTreeSet<ViewTag> {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Select;
    use crate::view::ViewRegistry;

    #[test]
    fn test_tokens_are_structurally_comparable() {
        let registry = ViewRegistry::new();
        let view = registry.define(Select::new().field("title"));

        let a = ViewRef::new("Post", "p1", &view);
        let b = ViewRef::new("Post", "p1", &view);
        assert_eq!(a, b);

        let other = ViewRef::new("Post", "p2", &view);
        assert_ne!(a, other);
    }

    #[test]
    fn test_entity_id_round_trip() {
        let registry = ViewRegistry::new();
        let view = registry.define(Select::new().field("title"));
        let token = ViewRef::new("Post", "p1", &view);
        assert_eq!(token.entity_id(), "Post:p1");
        assert_eq!(token.type_name(), "Post");
        assert_eq!(token.raw_id(), "p1");
    }
}
