//! Deep path access into JSON values
//!
//! Reads accept dotted paths with optional bracket segments, e.g.
//! `"foo.bar[0].baz"` or `"foo['key'].bar"`. Writes accept dotted paths
//! only; each segment is a field name, or an index when the value being
//! descended into is an array.
//!
//! Paths are tokenized once into [`Segment`]s before traversal.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from writing through a path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The root value cannot hold fields
    #[error("Cannot set '{path}': the stored value is not an object or array")]
    RootNotContainer { path: String },

    /// An existing value on the way down cannot hold fields
    #[error("Cannot set '{path}': segment '{segment}' holds a value that is not an object or array")]
    NotContainer { path: String, segment: String },

    /// A segment addressing an array is not a valid index
    #[error("Cannot set '{path}': '{segment}' is not a valid array index")]
    InvalidIndex { path: String, segment: String },
}

/// One step of a tokenized path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object field name
    Field(String),
    /// Array position (also matches an object field spelled as digits)
    Index(usize),
}

impl Segment {
    fn parse(token: &str) -> Self {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = token.parse() {
                return Segment::Index(index);
            }
        }
        Segment::Field(token.to_string())
    }
}

/// Tokenize a read path
///
/// Splits on `.`, `[`, `]` and the quotes hugging brackets (`['`, `"]`),
/// discarding empty tokens.
pub fn tokenize(path: &str) -> Vec<Segment> {
    let chars: Vec<char> = path.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();

    let mut push = |current: &mut String| {
        if !current.is_empty() {
            segments.push(Segment::parse(current));
            current.clear();
        }
    };

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '.' | ']' => push(&mut current),
            '[' => {
                push(&mut current);
                if matches!(chars.get(i + 1), Some('\'' | '"')) {
                    i += 1;
                }
            }
            '\'' | '"' if chars.get(i + 1) == Some(&']') => {
                push(&mut current);
                i += 1;
            }
            c => current.push(c),
        }
        i += 1;
    }
    push(&mut current);

    segments
}

/// Look up the value at `path`, treating `null` as absent
pub fn lookup<'a>(object: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = object;
    for segment in tokenize(path) {
        if current.is_null() {
            return None;
        }
        current = match (&segment, current) {
            (Segment::Field(name), Value::Object(map)) => map.get(name)?,
            (Segment::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
            (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// Read the value at `path`, or `default` when any step is absent
pub fn get_path(object: Option<&Value>, path: &str, default: Value) -> Value {
    object
        .and_then(|object| lookup(object, path))
        .cloned()
        .unwrap_or(default)
}

/// Write `value` at the dotted `path` inside `object`
///
/// Intermediate segments that are missing or hold a falsy value (`null`,
/// `false`, `0`, `""`) are replaced by an empty object. The root itself
/// must already be an object or array. Array segments may address an
/// existing element or append one at the end.
pub fn set_path<'a>(
    object: &'a mut Value,
    path: &str,
    value: Value,
) -> Result<&'a mut Value, PathError> {
    if !is_container(object) {
        return Err(PathError::RootNotContainer {
            path: path.to_string(),
        });
    }

    let (parents, last): (Vec<&str>, &str) = match path.rsplit_once('.') {
        Some((parents, last)) => (parents.split('.').collect(), last),
        None => (Vec::new(), path),
    };

    let mut current: &mut Value = object;
    for segment in parents {
        let slot = child_slot(current, path, segment)?;
        if is_falsy(slot) {
            *slot = Value::Object(Map::new());
        } else if !is_container(slot) {
            return Err(PathError::NotContainer {
                path: path.to_string(),
                segment: segment.to_string(),
            });
        }
        current = slot;
    }

    *child_slot(current, path, last)? = value;
    Ok(object)
}

/// Get (creating as `null` if needed) the child slot for `segment`
fn child_slot<'a>(
    parent: &'a mut Value,
    path: &str,
    segment: &str,
) -> Result<&'a mut Value, PathError> {
    match parent {
        Value::Object(map) => Ok(map.entry(segment.to_string()).or_insert(Value::Null)),
        Value::Array(items) => {
            let invalid = || PathError::InvalidIndex {
                path: path.to_string(),
                segment: segment.to_string(),
            };
            let index: usize = segment.parse().map_err(|_| invalid())?;
            // Existing positions or one past the end; never pads
            if index == items.len() {
                items.push(Value::Null);
            }
            items.get_mut(index).ok_or_else(invalid)
        }
        _ => Err(PathError::NotContainer {
            path: path.to_string(),
            segment: segment.to_string(),
        }),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tokenize_dots_and_brackets() {
        assert_eq!(
            tokenize("foo.bar[0].baz"),
            vec![
                Segment::Field("foo".into()),
                Segment::Field("bar".into()),
                Segment::Index(0),
                Segment::Field("baz".into()),
            ]
        );
        assert_eq!(
            tokenize("a['b c'][\"d\"]"),
            vec![
                Segment::Field("a".into()),
                Segment::Field("b c".into()),
                Segment::Field("d".into()),
            ]
        );
        assert_eq!(tokenize("..a..[1]"), vec![Segment::Field("a".into()), Segment::Index(1)]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_get_nested_value() {
        let doc = json!({"foo": {"bar": [{"baz": 1}, {"baz": 2}]}});

        assert_eq!(get_path(Some(&doc), "foo.bar[1].baz", json!(null)), json!(2));
        assert_eq!(get_path(Some(&doc), "foo.bar.0.baz", json!(null)), json!(1));
        assert_eq!(get_path(Some(&doc), "foo['bar'][0]", json!(null)), json!({"baz": 1}));
    }

    #[test]
    fn test_get_empty_path_returns_object() {
        let doc = json!({"x": 1});
        assert_eq!(get_path(Some(&doc), "", json!(null)), doc);
    }

    #[test]
    fn test_get_missing_segment_returns_default() {
        let doc = json!({"a": {"b": null}});

        assert_eq!(get_path(Some(&doc), "a.b.c.d", json!("dflt")), json!("dflt"));
        assert_eq!(get_path(Some(&doc), "a.missing", json!(7)), json!(7));
        assert_eq!(get_path(Some(&doc), "a.b", json!(false)), json!(false));
        assert_eq!(get_path(Some(&doc), "a[3]", json!(0)), json!(0));
        assert_eq!(get_path(None, "a", json!("none")), json!("none"));
    }

    #[test]
    fn test_get_digit_field_on_object() {
        let doc = json!({"1": "one"});
        assert_eq!(get_path(Some(&doc), "[1]", json!(null)), json!("one"));
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut doc = json!({});
        set_path(&mut doc, "a.b.x", json!(5)).unwrap();
        assert_eq!(doc, json!({"a": {"b": {"x": 5}}}));
    }

    #[test]
    fn test_set_preserves_siblings() {
        let mut doc = json!({"foo": "bar", "a": {"keep": true}});
        set_path(&mut doc, "a.new", json!([1, 2])).unwrap();
        set_path(&mut doc, "baz", json!("qux")).unwrap();
        assert_eq!(
            doc,
            json!({"foo": "bar", "baz": "qux", "a": {"keep": true, "new": [1, 2]}})
        );
    }

    #[test]
    fn test_set_replaces_falsy_intermediates() {
        let mut doc = json!({"a": 0, "b": "", "c": false, "d": null});
        for key in ["a", "b", "c", "d"] {
            set_path(&mut doc, &format!("{}.x", key), json!(1)).unwrap();
        }
        assert_eq!(
            doc,
            json!({"a": {"x": 1}, "b": {"x": 1}, "c": {"x": 1}, "d": {"x": 1}})
        );
    }

    #[test]
    fn test_set_into_array() {
        let mut doc = json!({"list": [1]});
        set_path(&mut doc, "list.0", json!("a")).unwrap();
        set_path(&mut doc, "list.1", json!("b")).unwrap();
        assert_eq!(doc, json!({"list": ["a", "b"]}));

        let err = set_path(&mut doc, "list.name", json!(1)).unwrap_err();
        assert!(matches!(err, PathError::InvalidIndex { .. }));
    }

    #[test]
    fn test_set_past_array_end_fails() {
        let mut doc = json!({"list": [1]});

        for path in ["list.3", "list.100000000000", "list.18446744073709551615"] {
            let err = set_path(&mut doc, path, json!(1)).unwrap_err();
            assert!(matches!(err, PathError::InvalidIndex { .. }), "path {}", path);
        }
        // Does not even fit in usize
        let err = set_path(&mut doc, "list.99999999999999999999999", json!(1)).unwrap_err();
        assert!(matches!(err, PathError::InvalidIndex { .. }));

        assert_eq!(doc, json!({"list": [1]}));
    }

    #[test]
    fn test_set_huge_index_through_intermediate_fails() {
        let mut doc = json!({"list": []});
        let err = set_path(&mut doc, "list.18446744073709551615.x", json!(1)).unwrap_err();
        assert!(matches!(err, PathError::InvalidIndex { .. }));
        assert_eq!(doc, json!({"list": []}));
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut doc = json!({"a": 5});
        let err = set_path(&mut doc, "a.b", json!(1)).unwrap_err();
        assert_eq!(
            err,
            PathError::NotContainer {
                path: "a.b".into(),
                segment: "a".into()
            }
        );
        assert_eq!(doc, json!({"a": 5}));
    }

    #[test]
    fn test_set_on_scalar_root_fails() {
        let mut doc = json!("hello");
        let err = set_path(&mut doc, "x", json!(1)).unwrap_err();
        assert!(matches!(err, PathError::RootNotContainer { .. }));
    }

    #[test]
    fn test_set_returns_root() {
        let mut doc = json!({});
        let root = set_path(&mut doc, "k", json!(1)).unwrap();
        assert_eq!(root, &json!({"k": 1}));
    }
}
