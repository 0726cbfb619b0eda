//! Dotted-path helpers over nested JSON objects.

use serde_json::{Map, Value};

/// Read the value at a dotted `path`.
pub fn get_path<'a>(tree: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = tree.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write `value` at a dotted `path`, creating intermediate objects.
///
/// A non-object value sitting on an intermediate segment is replaced.
pub fn set_path(tree: &mut Map<String, Value>, path: &str, value: Value) {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };

    let mut current = tree;
    for segment in parents.into_iter().flat_map(|parents| parents.split('.')) {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(leaf.to_string(), value);
}

/// Build a nested object from `(dotted path, value)` pairs.
pub fn unflatten<I>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let mut tree = Map::new();
    for (path, value) in pairs {
        set_path(&mut tree, &path, value);
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_get_path() {
        let doc = tree(json!({ "a": { "b": { "c": 1 } }, "d": [1, 2] }));
        assert_eq!(get_path(&doc, "a.b.c"), Some(&json!(1)));
        assert_eq!(get_path(&doc, "a.b"), Some(&json!({ "c": 1 })));
        assert_eq!(get_path(&doc, "d.0"), None);
        assert_eq!(get_path(&doc, "a.x"), None);
        assert_eq!(get_path(&doc, ""), None);
    }

    #[test]
    fn test_set_path_creates_parents() {
        let mut doc = Map::new();
        set_path(&mut doc, "roles.admin", json!("1"));
        set_path(&mut doc, "prefix", json!("!"));
        assert_eq!(Value::Object(doc), json!({ "roles": { "admin": "1" }, "prefix": "!" }));
    }

    #[test]
    fn test_set_path_replaces_scalar_parent() {
        let mut doc = tree(json!({ "roles": 5 }));
        set_path(&mut doc, "roles.admin", json!("1"));
        assert_eq!(Value::Object(doc), json!({ "roles": { "admin": "1" } }));
    }

    #[test]
    fn test_unflatten() {
        let doc = unflatten([
            ("a.b".to_string(), json!(1)),
            ("a.c".to_string(), json!(2)),
            ("d".to_string(), json!(null)),
        ]);
        assert_eq!(Value::Object(doc), json!({ "a": { "b": 1, "c": 2 }, "d": null }));
    }
}
