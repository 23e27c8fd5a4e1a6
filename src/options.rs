//! Layered option resolution for the request dispatcher.
//!
//! Per-call options travel as a flat [`Options`] map. Before dispatch the
//! client merges them over its own defaults and partitions the result into
//! three disjoint buckets: client options (identity of the client itself),
//! query options (forwarded as URL query parameters) and request options
//! (forwarded to the transport call). Anything left over is treated as
//! extra JSON:API parameters and merged into the query string or request
//! body depending on the HTTP method.

use serde_json::{Map, Value};

/// A flat mapping from option name to value.
pub type Options = Map<String, Value>;

/// Options describing the client itself; never forwarded to the transport.
pub const CLIENT_OPTIONS: &[&str] = &[
    "base_url",
    "timeout",
    "max_retries",
    "version",
    "full_response",
];

/// Options forwarded as URL query parameters.
pub const QUERY_OPTIONS: &[&str] = &["include", "page", "per_page"];

/// Options forwarded directly to the transport call.
pub const REQUEST_OPTIONS: &[&str] = &[
    "headers", "params", "data", "files", "verify", "timeout", "stream",
];

/// Merges one or more option maps into a new map.
///
/// Later sources win on key collision; the inputs are not mutated.
///
/// ```
/// use flowslate::options::merge;
/// use serde_json::json;
///
/// let a = json!({"a": 1}).as_object().unwrap().clone();
/// let b = json!({"a": 2, "b": 3}).as_object().unwrap().clone();
/// let merged = merge([&a, &b]);
/// assert_eq!(merged["a"], json!(2));
/// assert_eq!(merged["b"], json!(3));
/// ```
pub fn merge<'a, I>(sources: I) -> Options
where
    I: IntoIterator<Item = &'a Options>,
{
    let mut result = Options::new();
    for source in sources {
        for (key, value) in source {
            result.insert(key.clone(), value.clone());
        }
    }
    result
}

/// Returns the sub-map of `options` restricted to keys in `keys`, or its
/// complement when `invert` is true.
pub fn intersect_keys(options: &Options, keys: &[&str], invert: bool) -> Options {
    options
        .iter()
        .filter(|(key, _)| keys.contains(&key.as_str()) != invert)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Selects options recognized by none of the buckets.
///
/// These are free-form JSON:API parameters supplied at the call site; the
/// dispatcher merges them into the request body for write operations and
/// into the query string for reads.
pub fn parameter_options(options: &Options) -> Options {
    options
        .iter()
        .filter(|(key, _)| !is_reserved(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_reserved(key: &str) -> bool {
    CLIENT_OPTIONS.contains(&key)
        || QUERY_OPTIONS.contains(&key)
        || REQUEST_OPTIONS.contains(&key)
}

/// Stringifies a query parameter value.
///
/// Booleans and nulls use the canonical JSON literal spellings so the
/// transport layer neither drops nor mis-encodes them; strings pass
/// through bare (no surrounding quotes).
pub fn coerce_query_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Options {
        value.as_object().expect("object literal").clone()
    }

    #[test]
    fn test_merge_right_bias() {
        let a = obj(json!({"a": 1}));
        let b = obj(json!({"a": 2}));
        let c = obj(json!({"a": 3}));

        let merged = merge([&a, &b, &c]);
        assert_eq!(merged["a"], json!(3));
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let a = obj(json!({"a": 1}));
        let b = obj(json!({"a": 2, "b": 7}));

        let merged = merge([&a, &b]);
        assert_eq!(merged, obj(json!({"a": 2, "b": 7})));
        assert_eq!(a, obj(json!({"a": 1})));
        assert_eq!(b, obj(json!({"a": 2, "b": 7})));
    }

    #[test]
    fn test_intersect_keys_disjoint_cover() {
        let options = obj(json!({
            "base_url": "http://x.test",
            "include": "fields",
            "custom": 42,
        }));

        let selected = intersect_keys(&options, QUERY_OPTIONS, false);
        let inverted = intersect_keys(&options, QUERY_OPTIONS, true);

        // Selected and inverted cover the input with no overlap.
        assert_eq!(selected.len() + inverted.len(), options.len());
        for key in selected.keys() {
            assert!(!inverted.contains_key(key));
        }

        // Idempotent under re-selection.
        assert_eq!(intersect_keys(&selected, QUERY_OPTIONS, false), selected);
    }

    #[test]
    fn test_parameter_options_excludes_all_buckets() {
        let options = obj(json!({
            "base_url": "http://x.test",
            "timeout": 1.0,
            "include": "fields",
            "headers": {},
            "document_name": "report",
        }));

        let residual = parameter_options(&options);
        assert_eq!(residual, obj(json!({"document_name": "report"})));
    }

    #[test]
    fn test_coerce_query_booleans_and_null() {
        assert_eq!(coerce_query_value(&json!(true)), "true");
        assert_eq!(coerce_query_value(&json!(false)), "false");
        assert_eq!(coerce_query_value(&Value::Null), "null");
    }

    #[test]
    fn test_coerce_query_strings_and_numbers() {
        assert_eq!(coerce_query_value(&json!("fields")), "fields");
        assert_eq!(coerce_query_value(&json!(15)), "15");
    }
}
