//! Pruning of empty extraction output ahead of validation.

use serde_json::{Map, Value};

use crate::constants::NOT_FOUND_SENTINEL;
use crate::types::CleanOptions;

/// Keys that describe a QUDT quantity without carrying a measurement.
const QUANTITY_METADATA_KEYS: &[&str] = &["quantityKind", "hasQuantityKind", "sameAs", "unit"];

/// Remove `null`, `"Not Found"`, `{}` and `[]` values from `value` in place.
///
/// Keys listed in `skip_keys` are kept verbatim. With
/// `prune_empty_quantities`, quantity objects that carry only metadata and no
/// `quantityValue.numericValue` are removed first. Returns the number of
/// values removed. The root itself is never removed.
pub fn clean_document(value: &mut Value, options: &CleanOptions) -> usize {
    if !options.enabled {
        return 0;
    }
    let mut removed = 0;
    if options.prune_empty_quantities {
        prune_quantities(value, &mut removed);
    }
    remove_empty(value, &options.skip_keys, &mut removed);
    if removed > 0 {
        tracing::debug!(removed, "pruned empty values from document");
    }
    removed
}

fn is_removable_field(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s == NOT_FOUND_SENTINEL,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn is_removable_item(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn remove_empty(value: &mut Value, skip_keys: &[String], removed: &mut usize) {
    match value {
        Value::Object(map) => {
            let before = map.len();
            map.retain(|key, child| {
                if skip_keys.iter().any(|skip| skip == key) {
                    return true;
                }
                remove_empty(child, skip_keys, removed);
                !is_removable_field(child)
            });
            *removed += before - map.len();
        }
        Value::Array(items) => {
            let before = items.len();
            for item in items.iter_mut() {
                remove_empty(item, skip_keys, removed);
            }
            items.retain(|item| !is_removable_item(item));
            *removed += before - items.len();
        }
        _ => {}
    }
}

fn has_numeric_value(map: &Map<String, Value>) -> bool {
    map.get("quantityValue")
        .and_then(Value::as_object)
        .and_then(|quantity| quantity.get("numericValue"))
        .is_some_and(|numeric| !numeric.is_null())
}

fn is_metadata_key(key: &str) -> bool {
    QUANTITY_METADATA_KEYS.contains(&key)
}

/// A non-empty object holding quantity metadata but no measured value.
fn is_empty_quantity(map: &Map<String, Value>) -> bool {
    if map.is_empty() {
        return false;
    }
    if map.keys().all(|key| is_metadata_key(key)) {
        return true;
    }
    match map.get("quantityValue") {
        Some(Value::Object(_)) => {
            !has_numeric_value(map)
                && map
                    .keys()
                    .filter(|key| *key != "quantityValue")
                    .all(|key| is_metadata_key(key))
        }
        _ => false,
    }
}

/// Returns true when `value` itself should be dropped by its parent.
fn prune_quantities(value: &mut Value, removed: &mut usize) -> bool {
    match value {
        Value::Array(items) => {
            let before = items.len();
            items.retain_mut(|item| !prune_quantities(item, removed));
            *removed += before - items.len();
            false
        }
        Value::Object(map) => {
            let keep_quantity = has_numeric_value(map);
            let before = map.len();
            map.retain(|key, child| {
                if key == "quantityValue" && keep_quantity {
                    return true;
                }
                !prune_quantities(child, removed)
            });
            *removed += before - map.len();
            map.is_empty() || is_empty_quantity(map)
        }
        _ => false,
    }
}
