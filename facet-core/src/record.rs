//! Record representation for normalized entities.
//!
//! A record is a flat mapping from field name to value. Relation fields
//! never embed another entity's data: after normalization they hold either
//! a single [`EntityId`] string (to-one) or an array of [`EntityId`]
//! strings (to-many).

use serde_json::{Map, Value};

use crate::identity::EntityId;

/// One normalized entity record.
pub type Record = Map<String, Value>;

/// Interpret a record field as a to-one relation value.
pub fn as_entity_id(value: &Value) -> Option<&str> {
    value.as_str()
}

/// Interpret a record field as a to-many relation value.
///
/// Returns `None` if the value is not an array of strings.
pub fn as_entity_id_list(value: &Value) -> Option<Vec<EntityId>> {
    let items = value.as_array()?;
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        ids.push(item.as_str()?.to_string());
    }
    Some(ids)
}

/// Merge `partial` into `base`, field by field.
///
/// New fields overwrite old ones; fields absent from `partial` are left
/// untouched, so partial fetches compose.
pub fn merge_fields(base: &mut Record, partial: Record) {
    for (key, value) in partial {
        base.insert(key, value);
    }
}
