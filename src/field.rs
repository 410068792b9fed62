//! Typed payload values and their rendering to AMI header lines.
//!
//! A command payload is a tree of [`Value`]s. Scalars render as one
//! `Name: text` line; records and maps flatten into their members; sequences
//! repeat the outer name once per element. Rendering is a plain recursive
//! walk; [`Value::from_serialize`] builds the tree from any `serde::Serialize`
//! type so typed action structs need no hand-written conversion.

use crate::error::{AmiError, AmiResult};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One node of a command payload.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// Text, emitted verbatim.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Rendered as `true` / `false`.
    Bool(bool),
    /// Rendered in exponent form with the shortest exact mantissa.
    Float(f64),
    /// Encodes the inner value, or nothing when empty.
    Optional(Option<Box<Value>>),
    /// Nested record; its fields are emitted, its own name is not.
    Record(Vec<Field>),
    /// String-keyed mapping; one header per entry.
    Map(Vec<(String, Value)>),
    /// One header per non-zero element, all sharing the outer name.
    Seq(Vec<Value>),
}

/// A named payload member.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    value: Value,
    omit_empty: bool,
}

impl Field {
    /// Field that is always emitted.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            omit_empty: false,
        }
    }

    /// Field suppressed when its value is the zero value of its type.
    pub fn omit_empty(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            omit_empty: true,
        }
    }

    /// Header name. `-` marks a field that is never emitted.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether this field would be skipped by the encoder.
    pub fn is_suppressed(&self) -> bool {
        self.name == "-" || (self.omit_empty && self.value.is_zero())
    }
}

impl Value {
    /// Zero value of its type: empty text, 0, false, empty optional or
    /// empty collection.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Str(s) => s.is_empty(),
            Value::Int(n) => *n == 0,
            Value::UInt(n) => *n == 0,
            Value::Bool(b) => !b,
            Value::Float(f) => *f == 0.0,
            Value::Optional(inner) => inner.is_none(),
            Value::Record(fields) => fields.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            Value::Seq(items) => items.is_empty(),
        }
    }

    /// Text of a scalar, `None` for composite values.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::UInt(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Float(f) => Some(format_float(*f)),
            _ => None,
        }
    }

    /// Build a payload tree from any serializable value.
    ///
    /// Objects become records, arrays sequences and `null` an empty
    /// optional. Serde attributes carry the field annotations:
    /// `skip_serializing_if = "..."` for omit-when-empty, `skip` for
    /// never-emitted fields, `rename` for wire names.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> AmiResult<Self> {
        Ok(Self::from_json(serde_json::to_value(value)?))
    }

    fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Optional(None),
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(
                        n.as_f64()
                            .unwrap_or_default(),
                    )
                }
            }
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::Seq(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect(),
            ),
            Json::Object(map) => Value::Record(
                map.into_iter()
                    .map(|(k, v)| Field::new(k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Render a float the way AMI peers expect: `d.ddde±XX`, shortest mantissa
/// that round-trips, exponent with sign and at least two digits.
pub(crate) fn format_float(f: f64) -> String {
    if !f.is_finite() {
        return f.to_string();
    }
    let raw = format!("{:e}", f);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => raw,
    }
}

/// Append the header lines for `name: value` to `out`.
pub(crate) fn encode_value(
    name: &str,
    value: &Value,
    out: &mut Vec<(String, String)>,
) -> AmiResult<()> {
    match value {
        Value::Optional(None) => Ok(()),
        Value::Optional(Some(inner)) => encode_value(name, inner, out),
        Value::Record(fields) => encode_fields(fields, out),
        Value::Map(entries) => {
            for (key, entry) in entries {
                encode_value(key, entry, out)?;
            }
            Ok(())
        }
        Value::Seq(items) => {
            for item in items {
                if item.is_zero() {
                    continue;
                }
                if let Value::Seq(_) = item {
                    return Err(AmiError::encode_error(format!(
                        "field {}: nested sequences have no header form",
                        name
                    )));
                }
                encode_value(name, item, out)?;
            }
            Ok(())
        }
        scalar => {
            let text = scalar
                .as_text()
                .ok_or_else(|| {
                    AmiError::encode_error(format!("field {}: unsupported value", name))
                })?;
            out.push((name.to_string(), text));
            Ok(())
        }
    }
}

/// Append the header lines for every emitted field of a record.
pub(crate) fn encode_fields(fields: &[Field], out: &mut Vec<(String, String)>) -> AmiResult<()> {
    for field in fields {
        if field.is_suppressed() {
            continue;
        }
        encode_value(&field.name, &field.value, out)?;
    }
    Ok(())
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f as f64)
    }
}

macro_rules! value_from_int {
    ($variant:ident, $wide:ty: $($t:ty),+) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::$variant(n as $wide)
                }
            }
        )+
    };
}

value_from_int!(Int, i64: i8, i16, i32, i64, isize);
value_from_int!(UInt, u64: u8, u16, u32, u64, usize);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        Value::Optional(opt.map(|v| Box::new(v.into())))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Seq(
            items
                .into_iter()
                .map(Into::into)
                .collect(),
        )
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(map: BTreeMap<String, V>) -> Self {
        Value::Map(
            map.into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
        )
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Value {
    /// Entries are sorted by key so a given map always renders identically.
    fn from(map: HashMap<String, V>) -> Self {
        let mut entries: Vec<(String, Value)> = map
            .into_iter()
            .map(|(k, v)| (k, v.into()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Value::Map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    fn render(fields: &[Field]) -> Vec<(String, String)> {
        let mut out = Vec::new();
        encode_fields(fields, &mut out).unwrap();
        out
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn scalars_render_as_text() {
        let out = render(&[
            Field::new("Channel", "SIP/100"),
            Field::new("Priority", 1),
            Field::new("Timeout", 30000u32),
            Field::new("Async", true),
            Field::new("Ratio", 1.5),
        ]);
        assert_eq!(
            out,
            vec![
                pair("Channel", "SIP/100"),
                pair("Priority", "1"),
                pair("Timeout", "30000"),
                pair("Async", "true"),
                pair("Ratio", "1.5e+00"),
            ]
        );
    }

    #[test]
    fn float_exponent_form() {
        assert_eq!(format_float(1_000_000.0), "1e+06");
        assert_eq!(format_float(0.000012345), "1.2345e-05");
        assert_eq!(format_float(-2.5), "-2.5e+00");
        assert_eq!(format_float(0.0), "0e+00");
        assert_eq!(format_float(1e300), "1e+300");
    }

    #[test]
    fn omit_empty_suppresses_zero_values() {
        let out = render(&[
            Field::omit_empty("Context", ""),
            Field::omit_empty("Priority", 0),
            Field::omit_empty("Async", false),
            Field::omit_empty("Codecs", Vec::<String>::new()),
            Field::omit_empty("Account", None::<String>),
            Field::omit_empty("Exten", "100"),
        ]);
        assert_eq!(out, vec![pair("Exten", "100")]);
    }

    #[test]
    fn zero_values_emitted_without_omit_empty() {
        let out = render(&[Field::new("Priority", 0), Field::new("Async", false)]);
        assert_eq!(out, vec![pair("Priority", "0"), pair("Async", "false")]);
    }

    #[test]
    fn dash_name_is_never_emitted() {
        let out = render(&[Field::new("-", "internal"), Field::new("Exten", "100")]);
        assert_eq!(out, vec![pair("Exten", "100")]);
    }

    #[test]
    fn optional_encodes_pointee_or_nothing() {
        let out = render(&[
            Field::new("CallerID", Some("Bob <100>")),
            Field::new("Account", None::<&str>),
        ]);
        assert_eq!(out, vec![pair("CallerID", "Bob <100>")]);
    }

    #[test]
    fn nested_record_flattens_without_outer_tag() {
        let inner = vec![Field::new("Context", "default"), Field::new("Exten", "100")];
        let out = render(&[
            Field::new("Target", Value::Record(inner)),
            Field::new("Priority", 1),
        ]);
        assert_eq!(
            out,
            vec![
                pair("Context", "default"),
                pair("Exten", "100"),
                pair("Priority", "1"),
            ]
        );
    }

    #[test]
    fn sequence_repeats_outer_name_and_skips_zero_elements() {
        let out = render(&[Field::new(
            "Variable",
            vec!["a=1".to_string(), String::new(), "b=2".to_string()],
        )]);
        assert_eq!(out, vec![pair("Variable", "a=1"), pair("Variable", "b=2")]);
    }

    #[test]
    fn hash_map_renders_in_key_order() {
        let mut map = HashMap::new();
        map.insert("Zeta".to_string(), "z");
        map.insert("Alpha".to_string(), "a");
        let out = render(&[Field::new("Vars", map)]);
        assert_eq!(out, vec![pair("Alpha", "a"), pair("Zeta", "z")]);
    }

    #[test]
    fn nested_sequence_is_unsupported() {
        let mut out = Vec::new();
        let err = encode_fields(
            &[Field::new(
                "Bad",
                Value::Seq(vec![Value::Seq(vec![Value::from("x")])]),
            )],
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, AmiError::Encode { .. }));
    }

    #[derive(Serialize)]
    struct Originate {
        #[serde(rename = "Channel")]
        channel: String,
        #[serde(rename = "Exten", skip_serializing_if = "Option::is_none")]
        exten: Option<String>,
        #[serde(rename = "Priority")]
        priority: u32,
        #[serde(skip)]
        _internal: u8,
        #[serde(rename = "Variable")]
        variables: Vec<String>,
        #[serde(rename = "Account")]
        account: Option<String>,
    }

    #[test]
    fn serde_payload_flattens_to_fields() {
        let payload = Originate {
            channel: "PJSIP/100".into(),
            exten: None,
            priority: 1,
            _internal: 7,
            variables: vec!["x=1".into(), "y=2".into()],
            account: None,
        };
        let value = Value::from_serialize(&payload).unwrap();
        let mut out = Vec::new();
        encode_value("payload", &value, &mut out).unwrap();

        assert!(out.contains(&pair("Channel", "PJSIP/100")));
        assert!(out.contains(&pair("Priority", "1")));
        assert!(out.contains(&pair("Variable", "x=1")));
        assert!(out.contains(&pair("Variable", "y=2")));
        assert!(!out
            .iter()
            .any(|(k, _)| k == "Exten" || k == "Account" || k == "_internal"));
    }
}
