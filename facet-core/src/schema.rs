//! Entity/type configuration.
//!
//! The schema is built once at client construction and resolved into typed
//! relation tables up front, so normalization never probes value shapes at
//! runtime. Unknown types encountered later are a configuration defect, not
//! a soft failure.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ConfigError, FacetResult};
use crate::identity::TypeName;
use crate::record::Record;

/// Relation descriptor for one field of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// The field holds (after normalization) a single id of the given type.
    ToOne(TypeName),
    /// The field holds an ordered list of ids of the given type.
    ToMany(TypeName),
}

impl RelationKind {
    /// The related entity type this descriptor points at.
    pub fn target(&self) -> &str {
        match self {
            RelationKind::ToOne(t) | RelationKind::ToMany(t) => t,
        }
    }
}

/// How to extract the raw identity value from an incoming record.
#[derive(Clone)]
pub enum IdentityKey {
    /// Read a named field; string and integer values are accepted.
    Field(String),
    /// Arbitrary extractor over the raw record.
    Extractor(Arc<dyn Fn(&Record) -> Option<String> + Send + Sync>),
}

impl Default for IdentityKey {
    fn default() -> Self {
        IdentityKey::Field("id".to_string())
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Field(name) => f.debug_tuple("Field").field(name).finish(),
            IdentityKey::Extractor(_) => f.write_str("Extractor(..)"),
        }
    }
}

/// Static description of one entity type.
#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub type_name: TypeName,
    pub identity: IdentityKey,
    pub relations: BTreeMap<String, RelationKind>,
}

impl EntityConfig {
    /// A config with the default `"id"` identity field and no relations.
    pub fn new(type_name: impl Into<TypeName>) -> Self {
        Self {
            type_name: type_name.into(),
            identity: IdentityKey::default(),
            relations: BTreeMap::new(),
        }
    }

    /// Use a different identity field.
    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity = IdentityKey::Field(field.into());
        self
    }

    /// Use a custom identity extractor.
    pub fn with_identity_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&Record) -> Option<String> + Send + Sync + 'static,
    {
        self.identity = IdentityKey::Extractor(Arc::new(extractor));
        self
    }

    /// Declare a to-one relation field.
    pub fn to_one(mut self, field: impl Into<String>, target: impl Into<TypeName>) -> Self {
        self.relations
            .insert(field.into(), RelationKind::ToOne(target.into()));
        self
    }

    /// Declare a to-many relation field.
    pub fn to_many(mut self, field: impl Into<String>, target: impl Into<TypeName>) -> Self {
        self.relations
            .insert(field.into(), RelationKind::ToMany(target.into()));
        self
    }

    /// Extract the raw identity value from an incoming record.
    pub fn identity_of(&self, record: &Record) -> FacetResult<String> {
        let raw = match &self.identity {
            IdentityKey::Field(name) => record.get(name).and_then(identity_value),
            IdentityKey::Extractor(extract) => extract(record),
        };
        raw.ok_or_else(|| {
            ConfigError::MissingIdentity {
                type_name: self.type_name.clone(),
            }
            .into()
        })
    }
}

fn identity_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A to-many back-reference list kept in sync during normalization: when a
/// child of `child_type` carrying a to-one pointer in `via_field` is
/// normalized, its id is appended to `list_field` on the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub parent_type: TypeName,
    pub list_field: String,
    pub via_field: String,
}

/// Resolved schema: entity configs plus the derived parent back-link table.
#[derive(Debug, Clone)]
pub struct Schema {
    entities: BTreeMap<TypeName, EntityConfig>,
    parent_links: BTreeMap<TypeName, Vec<ParentLink>>,
}

impl Schema {
    /// Build and validate a schema from entity configs.
    ///
    /// Every relation target must itself be configured; a missing target is
    /// a fatal [`ConfigError::UnknownRelatedType`]. Parent back-links are
    /// derived here: a `ToMany` field on parent P pointing at child C, where
    /// C has a `ToOne` field back at P, becomes a maintained back-reference
    /// list.
    pub fn build(configs: Vec<EntityConfig>) -> FacetResult<Self> {
        let entities: BTreeMap<TypeName, EntityConfig> = configs
            .into_iter()
            .map(|config| (config.type_name.clone(), config))
            .collect();

        let mut parent_links: BTreeMap<TypeName, Vec<ParentLink>> = BTreeMap::new();

        for config in entities.values() {
            for (field, relation) in &config.relations {
                let target = relation.target();
                let child = entities.get(target).ok_or_else(|| ConfigError::UnknownRelatedType {
                    parent_type: config.type_name.clone(),
                    field: field.clone(),
                    type_name: target.to_string(),
                })?;

                let RelationKind::ToMany(child_type) = relation else {
                    continue;
                };

                let via = child.relations.iter().find_map(|(child_field, child_relation)| {
                    match child_relation {
                        RelationKind::ToOne(t) if *t == config.type_name => {
                            Some(child_field.clone())
                        }
                        _ => None,
                    }
                });

                if let Some(via_field) = via {
                    parent_links
                        .entry(child_type.clone())
                        .or_default()
                        .push(ParentLink {
                            parent_type: config.type_name.clone(),
                            list_field: field.clone(),
                            via_field,
                        });
                }
            }
        }

        Ok(Self {
            entities,
            parent_links,
        })
    }

    /// Look up the config for a type; unknown types are fatal.
    pub fn entity(&self, type_name: &str) -> FacetResult<&EntityConfig> {
        self.entities.get(type_name).ok_or_else(|| {
            ConfigError::UnknownEntityType {
                type_name: type_name.to_string(),
            }
            .into()
        })
    }

    /// Parent back-links maintained for children of the given type.
    pub fn parent_links(&self, child_type: &str) -> &[ParentLink] {
        self.parent_links
            .get(child_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blog_schema() -> Schema {
        Schema::build(vec![
            EntityConfig::new("Post")
                .to_many("comments", "Comment")
                .to_one("author", "User"),
            EntityConfig::new("Comment")
                .to_one("post", "Post")
                .to_one("author", "User"),
            EntityConfig::new("User"),
        ])
        .unwrap()
    }

    #[test]
    fn test_build_rejects_unknown_relation_target() {
        let err = Schema::build(vec![
            EntityConfig::new("Post").to_many("comments", "Comment")
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            crate::error::FacetError::Config(ConfigError::UnknownRelatedType { .. })
        ));
    }

    #[test]
    fn test_unknown_entity_type_is_fatal() {
        let schema = blog_schema();
        let err = schema.entity("Tag").unwrap_err();
        assert!(matches!(
            err,
            crate::error::FacetError::Config(ConfigError::UnknownEntityType { .. })
        ));
    }

    #[test]
    fn test_parent_links_derived_from_matching_to_one() {
        let schema = blog_schema();
        let links = schema.parent_links("Comment");
        assert_eq!(
            links,
            &[ParentLink {
                parent_type: "Post".to_string(),
                list_field: "comments".to_string(),
                via_field: "post".to_string(),
            }]
        );
        // Users have no to-one pointer back at Post, so no link.
        assert!(schema.parent_links("User").is_empty());
    }

    #[test]
    fn test_identity_field_accepts_numbers() {
        let config = EntityConfig::new("User");
        let mut record = Record::new();
        record.insert("id".to_string(), json!(42));
        assert_eq!(config.identity_of(&record).unwrap(), "42");
    }

    #[test]
    fn test_identity_missing_is_config_error() {
        let config = EntityConfig::new("User");
        let record = Record::new();
        let err = config.identity_of(&record).unwrap_err();
        assert!(matches!(
            err,
            crate::error::FacetError::Config(ConfigError::MissingIdentity { .. })
        ));
    }

    #[test]
    fn test_identity_extractor() {
        let config = EntityConfig::new("Setting").with_identity_extractor(|record| {
            record.get("key").and_then(|v| v.as_str()).map(String::from)
        });
        let mut record = Record::new();
        record.insert("key".to_string(), json!("theme"));
        assert_eq!(config.identity_of(&record).unwrap(), "theme");
    }
}
