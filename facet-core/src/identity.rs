//! Identity types for FACET entities

/// Name of an entity type, e.g. `"Post"`.
pub type TypeName = String;

/// Stable string key identifying one normalized record: `"<Type>:<rawId>"`.
///
/// Derived deterministically from type name and identity value, so repeated
/// normalization of the same logical entity always collapses to one record.
pub type EntityId = String;

/// Build an [`EntityId`] from a type name and a raw identity value.
pub fn to_entity_id(type_name: &str, raw_id: &str) -> EntityId {
    format!("{}:{}", type_name, raw_id)
}

/// Split an [`EntityId`] back into `(type, raw_id)`.
///
/// Ids without a `:` separator parse as an empty type with the whole string
/// as the raw id.
pub fn parse_entity_id(id: &str) -> (&str, &str) {
    match id.find(':') {
        Some(idx) => (&id[..idx], &id[idx + 1..]),
        None => ("", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_entity_id() {
        assert_eq!(to_entity_id("Post", "p1"), "Post:p1");
        assert_eq!(to_entity_id("User", "42"), "User:42");
    }

    #[test]
    fn test_parse_entity_id_round_trip() {
        let id = to_entity_id("Post", "p1");
        assert_eq!(parse_entity_id(&id), ("Post", "p1"));
    }

    #[test]
    fn test_parse_entity_id_without_separator() {
        assert_eq!(parse_entity_id("orphan"), ("", "orphan"));
    }

    #[test]
    fn test_parse_entity_id_raw_with_colon() {
        // Only the first separator counts; raw ids may themselves contain ':'.
        assert_eq!(parse_entity_id("Post:a:b"), ("Post", "a:b"));
    }
}
