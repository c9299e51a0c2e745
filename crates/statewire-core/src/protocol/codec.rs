//! Payload codec: round-trip serialization of arbitrary host values.
//!
//! Host state containers produce values that plain JSON cannot carry: an
//! undefined slot, NaN, infinities, or a structure that refers back into
//! itself. The codec maps a [`Value`] tree to transport-safe JSON text and
//! back, guaranteeing `decode(encode(v)) == v` for every value a host can
//! produce.
//!
//! # Wire encoding
//!
//! Non-plain nodes become sentinel strings inside otherwise ordinary JSON:
//!
//! | Value                | Wire form          |
//! |----------------------|--------------------|
//! | `Undefined`          | `"$undefined"`     |
//! | `Number(NaN)`        | `"$nan"`           |
//! | `Number(+∞)`         | `"$inf"`           |
//! | `Number(-∞)`         | `"$-inf"`          |
//! | `Ref("$.a[0]")`      | `"$ref:$.a[0]"`    |
//!
//! A literal string that happens to begin with `$` is escaped by prepending
//! one more `$`, so `"$undefined"` the *string* travels as `"$$undefined"`.
//! Any other `$`-prefixed string on the wire is a decode error rather than a
//! silent passthrough.
//!
//! Cyclic structures cross the wire as [`Value::Ref`] nodes holding the path
//! of the node they point back to (`$` is the root, then `.key` / `[index]`
//! segments). The codec carries refs verbatim; resolving them against the
//! decoded tree is the observer's concern.

use thiserror::Error;

/// Errors produced while encoding or decoding payload text.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload text is not valid JSON.
    #[error("invalid payload text: {0}")]
    Parse(#[from] serde_json::Error),

    /// A `$`-prefixed string on the wire matches no known sentinel.
    #[error("unknown payload sentinel: {0:?}")]
    UnknownSentinel(String),

    /// The value contains a node with no plain-JSON representation.
    #[error("value is not plain JSON: contains {0}")]
    NotPlain(&'static str),
}

// ── Value tree ────────────────────────────────────────────────────────────────

/// A payload value as produced by the host's state container.
///
/// Object entries preserve insertion order, matching the semantics of the
/// dynamic-language hosts this protocol observes.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    /// An undefined slot – distinct from `Null` on the host side.
    Undefined,
    Bool(bool),
    /// All numbers are f64; NaN and the infinities are representable.
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    /// A path reference back into the same tree; how cycles survive the wire.
    Ref(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            // NaN == NaN here: the round-trip law must hold for NaN payloads.
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Convenience constructor for an object value.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Looks up a key in an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// The string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The numeric payload, if this is a number value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts a plain `serde_json::Value` into a [`Value`] tree.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    /// Converts this value into plain JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotPlain`] when the tree contains `Undefined`,
    /// `Ref`, or a non-finite number – callers use this for control
    /// structures (like history commands) that must be plain.
    pub fn to_json(&self) -> Result<serde_json::Value, CodecError> {
        match self {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Undefined => Err(CodecError::NotPlain("undefined")),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .ok_or(CodecError::NotPlain("non-finite number")),
            Value::String(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            Value::Object(entries) => {
                let mut map = serde_json::Map::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json()?);
                }
                Ok(serde_json::Value::Object(map))
            }
            Value::Ref(_) => Err(CodecError::NotPlain("reference")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Value`] tree into transport-safe JSON text.
pub fn encode(value: &Value) -> String {
    // The sentinel mapping never produces an unserializable value, so this
    // to_string cannot fail.
    serde_json::to_string(&to_wire(value)).unwrap_or_default()
}

/// Decodes transport text back into a [`Value`] tree.
///
/// # Errors
///
/// Returns [`CodecError`] when the text is not valid JSON or contains an
/// unrecognized `$` sentinel.
///
/// # Examples
///
/// ```rust
/// use statewire_core::protocol::codec::{decode, encode, Value};
///
/// let v = Value::object([("count", Value::Number(f64::NAN))]);
/// assert_eq!(decode(&encode(&v)).unwrap(), v);
/// ```
pub fn decode(text: &str) -> Result<Value, CodecError> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    from_wire(json)
}

// ── Wire mapping ──────────────────────────────────────────────────────────────

const UNDEFINED: &str = "$undefined";
const NAN: &str = "$nan";
const INF: &str = "$inf";
const NEG_INF: &str = "$-inf";
const REF_PREFIX: &str = "$ref:";

fn to_wire(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Undefined => serde_json::Value::String(UNDEFINED.to_string()),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if n.is_nan() {
                serde_json::Value::String(NAN.to_string())
            } else if n.is_infinite() {
                let sentinel = if *n > 0.0 { INF } else { NEG_INF };
                serde_json::Value::String(sentinel.to_string())
            } else {
                // Finite f64 always has a JSON number representation.
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Value::String(s) => {
            if s.starts_with('$') {
                serde_json::Value::String(format!("${s}"))
            } else {
                serde_json::Value::String(s.clone())
            }
        }
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_wire).collect()),
        Value::Object(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                map.insert(k.clone(), to_wire(v));
            }
            serde_json::Value::Object(map)
        }
        Value::Ref(path) => serde_json::Value::String(format!("{REF_PREFIX}{path}")),
    }
}

fn from_wire(json: serde_json::Value) -> Result<Value, CodecError> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
        serde_json::Value::String(s) => decode_string(s),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(from_wire)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_json::Value::Object(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (k, v) in map {
                entries.push((k, from_wire(v)?));
            }
            Ok(Value::Object(entries))
        }
    }
}

fn decode_string(s: String) -> Result<Value, CodecError> {
    let Some(rest) = s.strip_prefix('$') else {
        return Ok(Value::String(s));
    };
    if rest.starts_with('$') {
        // Escaped literal: "$$foo" was the string "$foo".
        return Ok(Value::String(rest.to_string()));
    }
    match rest {
        "undefined" => Ok(Value::Undefined),
        "nan" => Ok(Value::Number(f64::NAN)),
        "inf" => Ok(Value::Number(f64::INFINITY)),
        "-inf" => Ok(Value::Number(f64::NEG_INFINITY)),
        _ => match s.strip_prefix(REF_PREFIX) {
            Some(path) => Ok(Value::Ref(path.to_string())),
            None => Err(CodecError::UnknownSentinel(s)),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: &Value) -> Value {
        decode(&encode(v)).expect("decode failed")
    }

    #[test]
    fn test_primitives_round_trip() {
        for v in [
            Value::Null,
            Value::Bool(true),
            Value::Bool(false),
            Value::Number(0.0),
            Value::Number(-12.5),
            Value::String("hello".to_string()),
            Value::String(String::new()),
        ] {
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn test_undefined_round_trips() {
        assert_eq!(round_trip(&Value::Undefined), Value::Undefined);
    }

    #[test]
    fn test_nan_round_trips() {
        let v = Value::Number(f64::NAN);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_infinities_round_trip() {
        assert_eq!(round_trip(&Value::Number(f64::INFINITY)), Value::Number(f64::INFINITY));
        assert_eq!(
            round_trip(&Value::Number(f64::NEG_INFINITY)),
            Value::Number(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn test_ref_round_trips() {
        let v = Value::Ref("$.items[0].parent".to_string());
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_nested_container_round_trips() {
        let v = Value::object([
            ("user", Value::object([("name", Value::from("ada")), ("age", Value::from(36_i64))])),
            (
                "tags",
                Value::Array(vec![Value::from("a"), Value::Null, Value::Undefined]),
            ),
        ]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_cyclic_structure_round_trips() {
        // A node whose "self" entry points back at the root.
        let v = Value::object([
            ("count", Value::from(1_i64)),
            ("self", Value::Ref("$".to_string())),
        ]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_object_key_order_is_preserved() {
        let v = Value::object([("z", Value::from(1_i64)), ("a", Value::from(2_i64))]);
        let text = encode(&v);
        assert!(text.find("\"z\"").unwrap() < text.find("\"a\"").unwrap());
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_dollar_string_is_escaped_and_round_trips() {
        let v = Value::String("$undefined".to_string());
        let text = encode(&v);
        assert_eq!(text, "\"$$undefined\"");
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_double_dollar_string_round_trips() {
        let v = Value::String("$$money".to_string());
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_unknown_sentinel_is_rejected() {
        let result = decode("\"$mystery\"");
        assert!(matches!(result, Err(CodecError::UnknownSentinel(_))));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let result = decode("{not json");
        assert!(matches!(result, Err(CodecError::Parse(_))));
    }

    #[test]
    fn test_to_json_rejects_undefined() {
        let v = Value::object([("x", Value::Undefined)]);
        assert!(matches!(v.to_json(), Err(CodecError::NotPlain(_))));
    }

    #[test]
    fn test_to_json_rejects_refs() {
        let v = Value::Ref("$".to_string());
        assert!(matches!(v.to_json(), Err(CodecError::NotPlain(_))));
    }

    #[test]
    fn test_from_json_to_json_preserves_plain_values() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a":[1,2,{"b":null}],"c":"text"}"#).unwrap();
        let v = Value::from_json(json.clone());
        assert_eq!(v.to_json().unwrap(), json);
    }

    #[test]
    fn test_get_and_accessors() {
        let v = Value::object([("type", Value::from("INCREMENT")), ("by", Value::from(2_i64))]);
        assert_eq!(v.get("type").and_then(Value::as_str), Some("INCREMENT"));
        assert_eq!(v.get("by").and_then(Value::as_f64), Some(2.0));
        assert_eq!(v.get("missing"), None);
    }
}
