//! # Values
//!
//! Everything generated code can hold in a variable. Plain values (`None`,
//! numbers, strings, lists, dicts and records) have value semantics and are
//! cloned on assignment. Attachments are shared handles: cloning one yields
//! another handle onto the same payload.

use crate::attachment::Attachment;
use crate::error::{self, Error, Result};
use crate::feedback::Raised;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Key under which a record's type name travels in JSON
pub const RECORD_TYPE_KEY: &str = "__type__";

/// Named fields of a record or the entries of a dict
pub type Fields = BTreeMap<String, Value>;

/// A named structured value, the usual payload of an attachment
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Type name shown to the model (`Image`, `TextBox`, ...)
    pub type_name: String,
    /// Attributes reachable through `.name`
    pub fields: Fields,
}

impl Record {
    /// Create an empty record of the given type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Fields::new(),
        }
    }

    /// Add a field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A runtime value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(Fields),
    Record(Record),
    Attachment(Attachment),
}

/// One step of a path into a value: `.attr` or `[key]`
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Attr(String),
    Item(Value),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Attr(name) => write!(f, ".{}", name),
            Segment::Item(Value::Str(key)) => {
                write!(f, "[\"{}\"]", key.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Segment::Item(key) => write!(f, "[{}]", key.repr()),
        }
    }
}

/// Map a possibly negative index onto `0..len`
fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

impl Value {
    /// Type name as shown to the model
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Record(record) => record.type_name.clone(),
            Value::Attachment(attachment) => attachment.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.is_empty(),
            Value::Record(_) => true,
            Value::Attachment(attachment) => attachment.with_payload(Value::is_truthy),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening ints
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_attachment(&self) -> Option<&Attachment> {
        match self {
            Value::Attachment(attachment) => Some(attachment),
            _ => None,
        }
    }

    /// Length of a string, list, dict or record
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            Value::Dict(entries) => Some(entries.len()),
            Value::Record(record) => Some(record.fields.len()),
            Value::Attachment(attachment) => attachment.with_payload(Value::len),
            _ => None,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// `value.name`; dict keys are readable as attributes too
    pub fn get_attr(&self, name: &str) -> Result<Value> {
        match self {
            Value::Record(record) => record
                .fields
                .get(name)
                .cloned()
                .ok_or_else(|| error::no_attribute(&record.type_name, name)),
            Value::Dict(entries) => entries
                .get(name)
                .cloned()
                .ok_or_else(|| error::no_attribute("dict", name)),
            Value::Attachment(attachment) => attachment.get_attr(name),
            other => Err(error::no_attribute(&other.type_name(), name)),
        }
    }

    /// `value[key]`
    pub fn get_item(&self, key: &Value) -> Result<Value> {
        match (self, key) {
            (Value::List(items), Value::Int(index)) => resolve_index(items.len(), *index)
                .map(|i| items[i].clone())
                .ok_or_else(|| error::no_item("list", index)),
            (Value::Str(s), Value::Int(index)) => {
                let chars: Vec<char> = s.chars().collect();
                resolve_index(chars.len(), *index)
                    .map(|i| Value::Str(chars[i].to_string()))
                    .ok_or_else(|| error::no_item("str", index))
            }
            (Value::Dict(entries), Value::Str(k)) => entries
                .get(k)
                .cloned()
                .ok_or_else(|| error::no_item("dict", key.repr())),
            (Value::Record(record), Value::Str(k)) => record
                .fields
                .get(k)
                .cloned()
                .ok_or_else(|| error::no_item(&record.type_name, key.repr())),
            (Value::Attachment(attachment), key) => attachment.get_item(key),
            (other, key) => Err(Error::type_mismatch(format!(
                "'{}' object is not subscriptable by '{}'",
                other.type_name(),
                key.type_name()
            ))),
        }
    }

    /// Read one path segment
    pub fn get_segment(&self, segment: &Segment) -> Result<Value> {
        match segment {
            Segment::Attr(name) => self.get_attr(name),
            Segment::Item(key) => self.get_item(key),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write `value` at `path` below this value.
    ///
    /// `variable` is the namespace slot the path starts from. Attachments met
    /// on the way take over the rest of the path and report the write to
    /// their observer.
    pub fn set_path(
        &mut self,
        variable: &str,
        path: &[Segment],
        value: Value,
    ) -> std::result::Result<(), Raised> {
        if let Value::Attachment(attachment) = self {
            return attachment.set_path(variable, path, value);
        }
        match path {
            [] => Err(Error::invalid_path(variable).into()),
            [segment] => self.set_segment(segment, value).map_err(Raised::from),
            [segment, rest @ ..] => self.child_mut(segment)?.set_path(variable, rest, value),
        }
    }

    /// Delete the member at `path` below this value
    pub fn del_path(
        &mut self,
        variable: &str,
        path: &[Segment],
    ) -> std::result::Result<(), Raised> {
        if let Value::Attachment(attachment) = self {
            return attachment.del_path(variable, path);
        }
        match path {
            [] => Err(Error::invalid_path(variable).into()),
            [segment] => self.del_segment(segment).map_err(Raised::from),
            [segment, rest @ ..] => self.child_mut(segment)?.del_path(variable, rest),
        }
    }

    fn child_mut(&mut self, segment: &Segment) -> Result<&mut Value> {
        match (self, segment) {
            (Value::Record(Record { type_name, fields }), Segment::Attr(name))
            | (Value::Record(Record { type_name, fields }), Segment::Item(Value::Str(name))) => {
                fields
                    .get_mut(name)
                    .ok_or_else(|| error::no_attribute(type_name, name))
            }
            (Value::Dict(entries), Segment::Attr(key))
            | (Value::Dict(entries), Segment::Item(Value::Str(key))) => entries
                .get_mut(key)
                .ok_or_else(|| error::no_item("dict", format!("'{}'", key))),
            (Value::List(items), Segment::Item(Value::Int(index))) => {
                let i = resolve_index(items.len(), *index)
                    .ok_or_else(|| error::no_item("list", index))?;
                Ok(&mut items[i])
            }
            (other, segment) => Err(Error::type_mismatch(format!(
                "'{}' object has no member {}",
                other.type_name(),
                segment
            ))),
        }
    }

    fn set_segment(&mut self, segment: &Segment, value: Value) -> Result<()> {
        match (self, segment) {
            (Value::Record(record), Segment::Attr(name))
            | (Value::Record(record), Segment::Item(Value::Str(name))) => {
                record.fields.insert(name.clone(), value);
                Ok(())
            }
            (Value::Dict(entries), Segment::Attr(key))
            | (Value::Dict(entries), Segment::Item(Value::Str(key))) => {
                entries.insert(key.clone(), value);
                Ok(())
            }
            (Value::List(items), Segment::Item(Value::Int(index))) => {
                let i = resolve_index(items.len(), *index)
                    .ok_or_else(|| error::no_item("list", index))?;
                items[i] = value;
                Ok(())
            }
            (other, segment) => Err(Error::type_mismatch(format!(
                "'{}' object does not support assignment to {}",
                other.type_name(),
                segment
            ))),
        }
    }

    fn del_segment(&mut self, segment: &Segment) -> Result<()> {
        match (self, segment) {
            (Value::Record(record), Segment::Attr(name))
            | (Value::Record(record), Segment::Item(Value::Str(name))) => record
                .fields
                .remove(name)
                .map(drop)
                .ok_or_else(|| error::no_attribute(&record.type_name, name)),
            (Value::Dict(entries), Segment::Attr(key))
            | (Value::Dict(entries), Segment::Item(Value::Str(key))) => entries
                .remove(key)
                .map(drop)
                .ok_or_else(|| error::no_item("dict", format!("'{}'", key))),
            (Value::List(items), Segment::Item(Value::Int(index))) => {
                let i = resolve_index(items.len(), *index)
                    .ok_or_else(|| error::no_item("list", index))?;
                items.remove(i);
                Ok(())
            }
            (other, segment) => Err(Error::type_mismatch(format!(
                "'{}' object does not support deletion of {}",
                other.type_name(),
                segment
            ))),
        }
    }

    // =========================================================================
    // Copies and identity
    // =========================================================================

    /// Recursively copy, detaching every nested attachment from its payload
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::List(items) => Value::List(items.iter().map(Value::deep_copy).collect()),
            Value::Dict(entries) => Value::Dict(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ),
            Value::Record(record) => Value::Record(Record {
                type_name: record.type_name.clone(),
                fields: record
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            }),
            Value::Attachment(attachment) => Value::Attachment(attachment.deep_copy()),
            other => other.clone(),
        }
    }

    /// Whether `target`'s payload is reachable from this value
    pub fn references(&self, target: &Attachment) -> bool {
        match self {
            Value::Attachment(attachment) => {
                attachment.same_payload(target)
                    || attachment.with_payload(|payload| payload.references(target))
            }
            Value::List(items) => items.iter().any(|v| v.references(target)),
            Value::Dict(entries) => entries.values().any(|v| v.references(target)),
            Value::Record(record) => record.fields.values().any(|v| v.references(target)),
            _ => false,
        }
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Source-like rendering, strings quoted
    pub fn repr(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) => format_float(*x),
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Dict(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("'{}': {}", k, v.repr()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            Value::Record(record) => {
                let fields: Vec<String> = record
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v.repr()))
                    .collect();
                format!("{}({})", record.type_name, fields.join(", "))
            }
            Value::Attachment(attachment) => attachment.with_payload(Value::repr),
        }
    }

    /// Convert to JSON; records carry their type under [`RECORD_TYPE_KEY`]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Dict(entries) => serde_json::Value::Object(
                entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Record(record) => {
                let mut object: serde_json::Map<String, serde_json::Value> = record
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                object.insert(
                    RECORD_TYPE_KEY.to_string(),
                    serde_json::Value::String(record.type_name.clone()),
                );
                serde_json::Value::Object(object)
            }
            Value::Attachment(attachment) => attachment.with_payload(Value::to_json),
        }
    }
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        let sign = if x > 0.0 { "" } else { "-" };
        format!("{}inf", sign)
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        x.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Attachment(a), Value::Attachment(b)) => a == b,
            (Value::Attachment(a), plain) | (plain, Value::Attachment(a)) => {
                a.with_payload(|payload| payload == plain)
            }
            _ => false,
        }
    }
}

/// `str()` rendering: strings bare, everything else as [`Value::repr`]
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Attachment(attachment) => write!(f, "{}", attachment),
            other => f.write_str(&other.repr()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(mut object) => match object.remove(RECORD_TYPE_KEY) {
                Some(serde_json::Value::String(type_name)) => Value::Record(Record {
                    type_name,
                    fields: object.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
                }),
                tag => {
                    let mut entries: Fields =
                        object.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                    if let Some(tag) = tag {
                        entries.insert(RECORD_TYPE_KEY.to_string(), Value::from(tag));
                    }
                    Value::Dict(entries)
                }
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
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

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Fields> for Value {
    fn from(entries: Fields) -> Self {
        Value::Dict(entries)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<Attachment> for Value {
    fn from(attachment: Attachment) -> Self {
        Value::Attachment(attachment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn image() -> Value {
        Record::new("Image")
            .with_field("width", 640)
            .with_field("height", 480)
            .with_field("layers", Value::List(vec![Value::from("background")]))
            .into()
    }

    #[test]
    fn test_record_attr_access() {
        let img = image();
        assert_eq!(img.get_attr("width").unwrap(), Value::Int(640));
        assert_eq!(img.type_name(), "Image");
        assert!(img
            .get_attr("depth")
            .is_err_and(|e| e.kind() == ErrorKind::LookupFailed));
    }

    #[test]
    fn test_negative_index() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(list.get_item(&Value::Int(-1)).unwrap(), Value::Int(3));
        assert!(list.get_item(&Value::Int(3)).is_err());
        assert!(list.get_item(&Value::Int(-4)).is_err());
    }

    #[test]
    fn test_set_path_nested() {
        let mut img = image();
        let path = [Segment::Attr("layers".into()), Segment::Item(Value::Int(0))];
        img.set_path("image0", &path, Value::from("sky")).unwrap();
        assert_eq!(
            img.get_attr("layers").unwrap(),
            Value::List(vec![Value::from("sky")])
        );

        img.set_path("image0", &[Segment::Attr("dpi".into())], Value::Int(72))
            .unwrap();
        assert_eq!(img.get_attr("dpi").unwrap(), Value::Int(72));
    }

    #[test]
    fn test_set_path_rejects_missing_parent() {
        let mut img = image();
        let path = [Segment::Attr("meta".into()), Segment::Attr("author".into())];
        let err = img.set_path("image0", &path, Value::Null).unwrap_err();
        assert!(matches!(err, Raised::Error(e) if e.kind() == ErrorKind::LookupFailed));
    }

    #[test]
    fn test_del_path() {
        let mut img = image();
        img.del_path("image0", &[Segment::Attr("height".into())]).unwrap();
        assert!(img.get_attr("height").is_err());
        assert!(img.del_path("image0", &[Segment::Attr("height".into())]).is_err());
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let original = Value::List(vec![image()]);
        let mut copy = original.deep_copy();
        let path = [Segment::Item(Value::Int(0)), Segment::Attr("width".into())];
        copy.set_path("copy", &path, Value::Int(1)).unwrap();

        assert_eq!(
            original.get_item(&Value::Int(0)).unwrap().get_attr("width").unwrap(),
            Value::Int(640)
        );
    }

    #[test]
    fn test_repr_and_display() {
        assert_eq!(Value::from("hi").repr(), "'hi'");
        assert_eq!(Value::from("hi").to_string(), "hi");
        assert_eq!(Value::Float(2.0).repr(), "2.0");
        assert_eq!(Value::Bool(true).repr(), "True");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Null]).to_string(),
            "[1, None]"
        );
        assert_eq!(
            Value::from(Record::new("Box").with_field("w", 2)).repr(),
            "Box(w=2)"
        );
    }

    #[test]
    fn test_segment_display() {
        assert_eq!(Segment::Attr("width".into()).to_string(), ".width");
        assert_eq!(Segment::Item(Value::Int(2)).to_string(), "[2]");
        assert_eq!(Segment::Item(Value::from("k")).to_string(), "[\"k\"]");
    }

    #[test]
    fn test_numeric_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::from("2"));
    }

    #[test]
    fn test_json_record_roundtrip_keeps_type() {
        let json = serde_json::json!({"__type__": "Image", "width": 3, "tags": ["a"]});
        let value = Value::from(json.clone());
        assert_eq!(value.type_name(), "Image");
        assert_eq!(value.get_attr("width").unwrap(), Value::Int(3));
        assert_eq!(value.to_json(), json);
    }
}
