//! RFC 7396 JSON Merge Patch, applied on update.
//!
//! Grounded on the teacher's `patch.rs`, which wraps the `json-patch`
//! crate for RFC 6902. This server only ever needs the merge-patch half
//! of that crate: `json_patch::merge` mutates a document in place
//! according to RFC 7396 (`null` deletes a key, objects recurse, arrays
//! and scalars replace wholesale).

use serde_json::Value;

/// Merges `incoming` into a clone of `existing` per RFC 7396 and returns
/// the result; `existing` is left untouched.
pub fn merge_patch(existing: &Value, incoming: &Value) -> Value {
    let mut merged = existing.clone();
    json_patch::merge(&mut merged, incoming);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_deletes_a_key() {
        let existing = json!({"a": 1, "b": {"c": 1, "d": 3}, "e": 4});
        let incoming = json!({"a": null, "b": {"c": 2}});
        let merged = merge_patch(&existing, &incoming);
        assert_eq!(merged, json!({"b": {"c": 2, "d": 3}, "e": 4}));
    }

    #[test]
    fn arrays_replace_wholesale() {
        let existing = json!({"tags": ["a", "b", "c"]});
        let incoming = json!({"tags": ["x"]});
        let merged = merge_patch(&existing, &incoming);
        assert_eq!(merged, json!({"tags": ["x"]}));
    }

    #[test]
    fn unmentioned_keys_survive() {
        let existing = json!({"name": "Widget", "version": "1.0"});
        let incoming = json!({"version": "1.1"});
        let merged = merge_patch(&existing, &incoming);
        assert_eq!(merged["name"], "Widget");
        assert_eq!(merged["version"], "1.1");
    }
}
