//! FACET Core - Data Types and Mask Algebra
//!
//! Pure data structures and leaf algorithms with no I/O. All other crates
//! depend on this: entity identity, records, the field-coverage mask, the
//! entity schema, and the error taxonomy.

pub mod error;
pub mod identity;
pub mod mask;
pub mod record;
pub mod schema;

pub use error::{ConfigError, FacetError, FacetResult, ResolverKind, StoreError, TransportError};
pub use identity::{parse_entity_id, to_entity_id, EntityId, TypeName};
pub use mask::FieldMask;
pub use record::{as_entity_id, as_entity_id_list, merge_fields, Record};
pub use schema::{EntityConfig, IdentityKey, ParentLink, RelationKind, Schema};
