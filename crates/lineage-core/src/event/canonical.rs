//! Canonical JSON serialization.
//!
//! Produces compact JSON with object keys sorted lexicographically at every
//! nesting level. Content hashes are computed over this form, so the same
//! logical value must always produce the same byte sequence.
//!
//! Rules:
//! - Compact: no whitespace between tokens.
//! - Object keys sorted lexicographically (recursive at every depth).
//! - Arrays preserve element order.
//! - Numbers, strings, booleans, and null serialized normally.
//!
//! Floating-point numbers are *not* normalized here; callers that hash
//! floats render them to strings first (see [`crate::snapshot::hash`]).

use serde::Serialize;
use serde_json::Value;

/// Produce a canonical JSON string from a [`serde_json::Value`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use lineage_core::event::canonical::canonicalize_json;
///
/// let val = json!({"z": 1, "a": {"c": 3, "b": 2}});
/// assert_eq!(canonicalize_json(&val), r#"{"a":{"b":2,"c":3},"z":1}"#);
/// ```
#[must_use]
pub fn canonicalize_json(value: &Value) -> String {
    let mut buf = String::new();
    write_canonical(value, &mut buf);
    buf
}

/// Serialize any value to canonical JSON.
///
/// # Errors
///
/// Returns `serde_json::Error` if `value` cannot be represented as JSON.
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(canonicalize_json(&serde_json::to_value(value)?))
}

fn write_canonical(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => buf.push_str(&n.to_string()),
        Value::String(s) => write_string(s, buf),
        Value::Array(arr) => {
            buf.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            buf.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_string(key, buf);
                buf.push(':');
                write_canonical(val, buf);
            }
            buf.push('}');
        }
    }
}

fn write_string(s: &str, buf: &mut String) {
    // Value's Display applies serde_json's escaping and cannot fail.
    buf.push_str(&Value::String(s.to_owned()).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(canonicalize_json(&json!(null)), "null");
        assert_eq!(canonicalize_json(&json!(true)), "true");
        assert_eq!(canonicalize_json(&json!(42)), "42");
        assert_eq!(canonicalize_json(&json!("hello")), "\"hello\"");
    }

    #[test]
    fn string_with_escapes() {
        assert_eq!(
            canonicalize_json(&json!("he said \"hi\"\n")),
            "\"he said \\\"hi\\\"\\n\""
        );
    }

    #[test]
    fn array_preserves_order() {
        assert_eq!(canonicalize_json(&json!([3, 1, 2])), "[3,1,2]");
    }

    #[test]
    fn nested_keys_sorted() {
        let val = json!({"b": [{"y": 1, "x": 2}], "a": {"d": null, "c": false}});
        assert_eq!(
            canonicalize_json(&val),
            r#"{"a":{"c":false,"d":null},"b":[{"x":2,"y":1}]}"#
        );
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut m1 = serde_json::Map::new();
        m1.insert("a".into(), json!(1));
        m1.insert("b".into(), json!(2));
        let mut m2 = serde_json::Map::new();
        m2.insert("b".into(), json!(2));
        m2.insert("a".into(), json!(1));
        assert_eq!(
            canonicalize_json(&Value::Object(m1)),
            canonicalize_json(&Value::Object(m2))
        );
    }

    #[test]
    fn canonicalize_serializable() {
        #[derive(Serialize)]
        struct Pair {
            zeta: u8,
            alpha: &'static str,
        }
        let out = canonicalize(&Pair {
            zeta: 1,
            alpha: "x",
        })
        .unwrap();
        assert_eq!(out, r#"{"alpha":"x","zeta":1}"#);
    }
}
