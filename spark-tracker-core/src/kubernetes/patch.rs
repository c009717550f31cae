//! JSON merge patch (RFC 7386) computation between two versions of an object.
//!
//! Patches produced by [`optimistic_merge_patch`] carry the resource version of
//! the object they were computed against, which turns them into a conditional
//! write: the API server refuses them with a conflict once anybody else has
//! modified the object in the meantime.

use kube::Resource;
use serde::Serialize;
use serde_json::{Map, Value};

/// Computes a merge patch that transforms `original` into `modified`.
///
/// Keys missing from `modified` are nulled out, nested objects are diffed
/// recursively and every other changed value (arrays included) is replaced
/// wholesale.
pub fn merge_diff(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(original), Value::Object(modified)) => {
            let mut patch = Map::new();

            for (key, old_value) in original {
                match modified.get(key) {
                    None => {
                        patch.insert(key.to_owned(), Value::Null);
                    }
                    Some(new_value) if new_value != old_value => {
                        patch.insert(key.to_owned(), merge_diff(old_value, new_value));
                    }
                    Some(_) => (),
                }
            }

            for (key, new_value) in modified {
                if !original.contains_key(key) {
                    patch.insert(key.to_owned(), new_value.to_owned());
                }
            }

            Value::Object(patch)
        }
        _ => modified.to_owned(),
    }
}

pub fn is_empty_patch(patch: &Value) -> bool {
    matches!(patch, Value::Object(map) if map.is_empty())
}

/// Diffs two versions of a resource, returning `None` when nothing changed.
///
/// The resource version of `original` is embedded in the patch.
pub fn optimistic_merge_patch<K>(original: &K, modified: &K) -> Result<Option<Value>, serde_json::Error>
where
    K: Resource + Serialize,
{
    let mut patch = merge_diff(
        &serde_json::to_value(original)?,
        &serde_json::to_value(modified)?,
    );

    if is_empty_patch(&patch) {
        return Ok(None);
    }

    if let (Some(resource_version), Value::Object(patch)) =
        (original.meta().resource_version.as_ref(), &mut patch)
    {
        let metadata = patch
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));

        if let Value::Object(metadata) = metadata {
            metadata.insert(
                "resourceVersion".to_owned(),
                Value::String(resource_version.to_owned()),
            );
        }
    }

    Ok(Some(patch))
}
