//! Deep merge of configuration trees
//!
//! Mappings merge key by key, recursively. Every other value (lists,
//! scalars, a mapping meeting a non-mapping) is replaced wholesale by the
//! overlay. Lists are never concatenated.

use serde_json::{Map, Value};

/// Merge `overlay` on top of `base`, returning a new tree.
///
/// Neither input is modified, so the same defaults can be merged into many
/// leaves without aliasing.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            Value::Object(merge_maps(base_map, overlay_map))
        }
        _ => overlay.clone(),
    }
}

/// Merge two mappings, keys in `overlay` taking precedence.
pub fn merge_maps(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        let next = match merged.get(key) {
            Some(existing) => deep_merge(existing, value),
            None => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

/// Fold a sequence of layers, later layers overriding earlier ones.
///
/// Starts from an empty mapping, so an empty sequence yields `{}`.
pub fn merge_all<'a, I>(layers: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    layers
        .into_iter()
        .fold(Value::Object(Map::new()), |acc, layer| deep_merge(&acc, layer))
}
