//! Decoded field values
//!
//! [`Value`] is the dynamic form of an object (or one of its fields) read
//! through its type tree. Values are only materialised on demand; edits
//! that keep a field's size are patched directly into the object bytes.

use serde_json::json;

use super::{NodeKind, Primitive, TypeTree};
use crate::cursor::{Reader, Writer};
use crate::{Error, Result};

/// A decoded field
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    String(String),
    /// Raw bytes, also used for strings that are not valid UTF-8
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Named fields in schema order
    Struct(Vec<(String, Value)>),
}

enum Segment<'p> {
    Name(&'p str),
    Index(usize),
}

fn segments(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(at) => part.split_at(at),
            None => (part, ""),
        };
        if !name.is_empty() {
            out.push(Segment::Name(name));
        }
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped.find(']')?;
            out.push(Segment::Index(stripped[..close].parse().ok()?));
            rest = &stripped[close + 1..];
        }
    }
    Some(out)
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }

    /// Field at a dotted path (`a.b[2].c`)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut v = self;
        for seg in segments(path)? {
            v = match (seg, v) {
                (Segment::Name(n), Value::Struct(fields)) => {
                    &fields.iter().find(|(k, _)| k == n)?.1
                }
                (Segment::Index(i), Value::Array(items)) => items.get(i)?,
                _ => return None,
            };
        }
        Some(v)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let mut v = self;
        for seg in segments(path)? {
            v = match (seg, v) {
                (Segment::Name(n), Value::Struct(fields)) => {
                    &mut fields.iter_mut().find(|(k, _)| k == n)?.1
                }
                (Segment::Index(i), Value::Array(items)) => items.get_mut(i)?,
                _ => return None,
            };
        }
        Some(v)
    }

    /// Replace the field at `path`
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        let slot = self.get_mut(path).ok_or_else(|| Error::FieldNotFound {
            path: path.to_string(),
        })?;
        *slot = value;
        Ok(())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::UInt(v) => i64::try_from(v).ok(),
            Value::Bool(b) => Some(b as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Int(v) => u64::try_from(v).ok(),
            Value::UInt(v) => Some(v),
            Value::Bool(b) => Some(b as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v as f64),
            Value::Double(v) => Some(v),
            Value::Int(v) => Some(v as f64),
            Value::UInt(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            Value::Int(v) => Some(v != 0),
            Value::UInt(v) => Some(v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// JSON form: structs become objects, byte blobs become number arrays
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => json!(b),
            Value::Int(v) => json!(v),
            Value::UInt(v) => json!(v),
            Value::Float(v) => serde_json::Number::from_f64(*v as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => json!(s),
            Value::Bytes(b) => json!(b),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Struct(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Convert JSON to a value shaped by node `node` of `tree`
    pub fn from_json(json: &serde_json::Value, tree: &TypeTree, node: usize) -> Result<Value> {
        from_json_at(json, tree, node, &mut String::new())
    }

    /// Parse a textual value for node `node` (used for command-line edits)
    pub fn parse_for(text: &str, tree: &TypeTree, node: usize) -> Result<Value> {
        let mismatch = |expected: &str| Error::TypeMismatch {
            path: tree.node(node).name.clone(),
            expected: expected.to_string(),
            found: format!("{:?}", text),
        };

        match tree.kind(node) {
            NodeKind::Primitive(Primitive::Bool) => match text {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch("bool")),
            },
            NodeKind::Primitive(Primitive::F32) => {
                text.parse().map(Value::Float).map_err(|_| mismatch("float"))
            }
            NodeKind::Primitive(Primitive::F64) => {
                text.parse().map(Value::Double).map_err(|_| mismatch("double"))
            }
            NodeKind::Primitive(p) if is_signed(p) => {
                text.parse().map(Value::Int).map_err(|_| mismatch("integer"))
            }
            NodeKind::Primitive(_) => {
                text.parse().map(Value::UInt).map_err(|_| mismatch("unsigned integer"))
            }
            NodeKind::String => Ok(Value::String(text.to_string())),
            _ => {
                let json: serde_json::Value = serde_json::from_str(text)?;
                Value::from_json(&json, tree, node)
            }
        }
    }
}

fn is_signed(p: Primitive) -> bool {
    matches!(p, Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64)
}

fn child_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn json_mismatch(path: &str, expected: &str, json: &serde_json::Value) -> Error {
    let found = match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    };
    Error::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn json_bytes(json: &serde_json::Value, path: &str) -> Result<Vec<u8>> {
    let serde_json::Value::Array(items) = json else {
        return Err(json_mismatch(path, "byte array", json));
    };
    items
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| json_mismatch(path, "byte", v))
        })
        .collect()
}

fn from_json_at(
    json: &serde_json::Value,
    tree: &TypeTree,
    node: usize,
    path: &mut String,
) -> Result<Value> {
    use serde_json::Value as J;

    match tree.kind(node) {
        NodeKind::Primitive(Primitive::Bool) => match json {
            J::Bool(b) => Ok(Value::Bool(*b)),
            J::Number(n) => Ok(Value::Bool(n.as_u64().unwrap_or(0) != 0)),
            _ => Err(json_mismatch(path, "bool", json)),
        },
        NodeKind::Primitive(Primitive::F32) => match json {
            J::Number(n) => Ok(Value::Float(n.as_f64().unwrap_or(0.0) as f32)),
            J::Null => Ok(Value::Float(f32::NAN)),
            _ => Err(json_mismatch(path, "float", json)),
        },
        NodeKind::Primitive(Primitive::F64) => match json {
            J::Number(n) => Ok(Value::Double(n.as_f64().unwrap_or(0.0))),
            J::Null => Ok(Value::Double(f64::NAN)),
            _ => Err(json_mismatch(path, "double", json)),
        },
        NodeKind::Primitive(p) => match json {
            J::Number(n) if is_signed(p) => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| json_mismatch(path, "integer", json)),
            J::Number(n) => n
                .as_u64()
                .map(Value::UInt)
                .ok_or_else(|| json_mismatch(path, "unsigned integer", json)),
            J::Bool(b) => Ok(Value::UInt(*b as u64)),
            _ => Err(json_mismatch(path, "integer", json)),
        },
        NodeKind::String => match json {
            J::String(s) => Ok(Value::String(s.clone())),
            J::Array(_) => json_bytes(json, path).map(Value::Bytes),
            _ => Err(json_mismatch(path, "string", json)),
        },
        NodeKind::TypelessData => json_bytes(json, path).map(Value::Bytes),
        NodeKind::Array => {
            let J::Array(items) = json else {
                return Err(json_mismatch(path, "array", json));
            };
            let element = tree
                .array_element(node)
                .ok_or_else(|| Error::FieldNotFound { path: path.clone() })?;
            let len = path.len();
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push_str(&format!("[{}]", i));
                out.push(from_json_at(item, tree, element, path)?);
                path.truncate(len);
            }
            Ok(Value::Array(out))
        }
        NodeKind::Struct => {
            let J::Object(map) = json else {
                return Err(json_mismatch(path, "object", json));
            };
            let children: Vec<usize> = tree.children(node).collect();
            let mut fields = Vec::with_capacity(children.len());
            for c in children {
                let name = &tree.node(c).name;
                let mut sub = child_path(path, name);
                let item = map
                    .get(name)
                    .ok_or_else(|| Error::FieldNotFound { path: sub.clone() })?;
                fields.push((name.clone(), from_json_at(item, tree, c, &mut sub)?));
            }
            Ok(Value::Struct(fields))
        }
    }
}

/// Read node `i` (and its trailing alignment) into a value
pub(crate) fn read_node(tree: &TypeTree, i: usize, r: &mut Reader<'_>) -> Result<Value> {
    let value = match tree.kind(i) {
        NodeKind::Primitive(p) => match p {
            Primitive::Bool => Value::Bool(r.read_bool()?),
            Primitive::I8 => Value::Int(r.read_i8()? as i64),
            Primitive::U8 => Value::UInt(r.read_u8()? as u64),
            Primitive::I16 => Value::Int(r.read_i16()? as i64),
            Primitive::U16 => Value::UInt(r.read_u16()? as u64),
            Primitive::I32 => Value::Int(r.read_i32()? as i64),
            Primitive::U32 => Value::UInt(r.read_u32()? as u64),
            Primitive::I64 => Value::Int(r.read_i64()?),
            Primitive::U64 => Value::UInt(r.read_u64()?),
            Primitive::F32 => Value::Float(r.read_f32()?),
            Primitive::F64 => Value::Double(r.read_f64()?),
        },
        NodeKind::String => {
            let bytes = r.read_prefixed_bytes()?;
            match std::str::from_utf8(bytes) {
                Ok(s) => Value::String(s.to_string()),
                Err(_) => Value::Bytes(bytes.to_vec()),
            }
        }
        NodeKind::TypelessData => Value::Bytes(r.read_prefixed_bytes()?.to_vec()),
        NodeKind::Array => {
            let element = tree.array_element(i).ok_or_else(|| {
                Error::CorruptDirectory(format!("array {} has no element type", tree.node(i).name))
            })?;
            let at = r.position();
            let count = r.read_i32()?;
            let count = usize::try_from(count)
                .ok()
                .filter(|&n| n <= r.remaining())
                .ok_or(Error::OutOfBounds {
                    offset: at,
                    needed: count as u32 as usize,
                    available: r.remaining(),
                })?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_node(tree, element, r)?);
            }
            Value::Array(items)
        }
        NodeKind::Struct => {
            let children: Vec<usize> = tree.children(i).collect();
            let mut fields = Vec::with_capacity(children.len());
            for c in children {
                fields.push((tree.node(c).name.clone(), read_node(tree, c, r)?));
            }
            Value::Struct(fields)
        }
    };

    if tree.needs_align(i) {
        r.align(4)?;
    }
    Ok(value)
}

/// Write `value` as node `i`, with trailing alignment when `align` is set
pub(crate) fn write_node(
    tree: &TypeTree,
    i: usize,
    value: &Value,
    w: &mut Writer,
    path: &str,
    align: bool,
) -> Result<()> {
    let mismatch = |expected: &str| Error::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: value.kind_name().to_string(),
    };

    match tree.kind(i) {
        NodeKind::Primitive(p) => write_primitive(p, value, w).ok_or_else(|| mismatch(primitive_name(p)))?,
        NodeKind::String => {
            let bytes = value.as_bytes().ok_or_else(|| mismatch("string"))?;
            w.write_prefixed_bytes(bytes);
        }
        NodeKind::TypelessData => {
            let Value::Bytes(bytes) = value else {
                return Err(mismatch("bytes"));
            };
            w.write_prefixed_bytes(bytes);
        }
        NodeKind::Array => {
            let element = tree
                .array_element(i)
                .ok_or_else(|| Error::FieldNotFound { path: path.to_string() })?;
            match value {
                Value::Array(items) => {
                    w.write_i32(items.len() as i32);
                    for (k, item) in items.iter().enumerate() {
                        write_node(tree, element, item, w, &format!("{}[{}]", path, k), true)?;
                    }
                }
                // Byte arrays may be given as a blob
                Value::Bytes(bytes)
                    if tree.kind(element) == NodeKind::Primitive(Primitive::U8)
                        && !tree.needs_align(element) =>
                {
                    w.write_prefixed_bytes(bytes);
                }
                _ => return Err(mismatch("array")),
            }
        }
        NodeKind::Struct => {
            let Value::Struct(fields) = value else {
                return Err(mismatch("struct"));
            };
            for c in tree.children(i) {
                let name = &tree.node(c).name;
                let sub = child_path(path, name);
                let field = fields
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| Error::FieldNotFound { path: sub.clone() })?;
                write_node(tree, c, field, w, &sub, true)?;
            }
        }
    }

    if align && tree.needs_align(i) {
        w.align(4);
    }
    Ok(())
}

fn primitive_name(p: Primitive) -> &'static str {
    match p {
        Primitive::Bool => "bool",
        Primitive::I8 => "SInt8",
        Primitive::U8 => "UInt8",
        Primitive::I16 => "SInt16",
        Primitive::U16 => "UInt16",
        Primitive::I32 => "SInt32",
        Primitive::U32 => "UInt32",
        Primitive::I64 => "SInt64",
        Primitive::U64 => "UInt64",
        Primitive::F32 => "float",
        Primitive::F64 => "double",
    }
}

/// Write a scalar, converting between numeric kinds when the value fits
fn write_primitive(p: Primitive, value: &Value, w: &mut Writer) -> Option<()> {
    match p {
        Primitive::Bool => w.write_bool(value.as_bool()?),
        Primitive::I8 => w.write_i8(i8::try_from(value.as_i64()?).ok()?),
        Primitive::U8 => w.write_u8(u8::try_from(value.as_u64()?).ok()?),
        Primitive::I16 => w.write_i16(i16::try_from(value.as_i64()?).ok()?),
        Primitive::U16 => w.write_u16(u16::try_from(value.as_u64()?).ok()?),
        Primitive::I32 => w.write_i32(i32::try_from(value.as_i64()?).ok()?),
        Primitive::U32 => w.write_u32(u32::try_from(value.as_u64()?).ok()?),
        Primitive::I64 => w.write_i64(value.as_i64()?),
        Primitive::U64 => w.write_u64(value.as_u64()?),
        Primitive::F32 => match value {
            Value::Float(f) => w.write_f32(*f),
            other => w.write_f32(other.as_f64()? as f32),
        },
        Primitive::F64 => w.write_f64(value.as_f64()?),
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Endian;
    use crate::typetree::tests::sample_tree;

    fn sample_value() -> Value {
        Value::Struct(vec![
            ("m_Name".into(), Value::String("abcde".into())),
            ("m_Values".into(), Value::Array(vec![Value::Int(7), Value::Int(8)])),
            ("m_Scale".into(), Value::Float(2.5)),
        ])
    }

    fn encode(value: &Value) -> Vec<u8> {
        let mut w = Writer::new(Endian::Little);
        write_node(&sample_tree(), 0, value, &mut w, "", true).unwrap();
        w.into_inner()
    }

    #[test]
    fn test_read_write_roundtrip() {
        let bytes = encode(&sample_value());
        assert_eq!(bytes.len(), 28);

        let mut r = Reader::new(&bytes, Endian::Little);
        let value = read_node(&sample_tree(), 0, &mut r).unwrap();
        assert_eq!(value, sample_value());
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_paths() {
        let mut value = sample_value();
        assert_eq!(value.get("m_Values[1]"), Some(&Value::Int(8)));
        assert_eq!(value.get("m_Scale").and_then(Value::as_f64), Some(2.5));
        assert!(value.get("m_Values[5]").is_none());
        assert!(value.get("m_Name.x").is_none());

        value.set("m_Values[0]", Value::Int(-1)).unwrap();
        assert_eq!(value.get("m_Values[0]"), Some(&Value::Int(-1)));
        assert!(matches!(
            value.set("m_Nope", Value::Int(0)),
            Err(Error::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let mut value = sample_value();
        value.set("m_Scale", Value::String("wide".into())).unwrap();
        let mut w = Writer::new(Endian::Little);
        let err = write_node(&sample_tree(), 0, &value, &mut w, "", true).unwrap_err();
        match err {
            Error::TypeMismatch { path, expected, found } => {
                assert_eq!(path, "m_Scale");
                assert_eq!(expected, "float");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_integer_range_checked() {
        let mut value = sample_value();
        value.set("m_Values[0]", Value::Int(i64::MAX)).unwrap();
        let mut w = Writer::new(Endian::Little);
        assert!(matches!(
            write_node(&sample_tree(), 0, &value, &mut w, "", true),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let tree = sample_tree();
        let json = sample_value().to_json();
        assert_eq!(json["m_Name"], "abcde");
        assert_eq!(json["m_Values"][1], 8);
        assert_eq!(Value::from_json(&json, &tree, 0).unwrap(), sample_value());
    }

    #[test]
    fn test_json_missing_field() {
        let json = serde_json::json!({ "m_Name": "x", "m_Values": [] });
        assert!(matches!(
            Value::from_json(&json, &sample_tree(), 0),
            Err(Error::FieldNotFound { path }) if path == "m_Scale"
        ));
    }

    #[test]
    fn test_parse_for() {
        let tree = sample_tree();
        assert_eq!(Value::parse_for("1.25", &tree, 9).unwrap(), Value::Float(1.25));
        assert_eq!(Value::parse_for("hi", &tree, 1).unwrap(), Value::String("hi".into()));
        assert_eq!(
            Value::parse_for("[1, 2]", &tree, 5).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
        assert!(matches!(
            Value::parse_for("x", &tree, 9),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_string_kept_as_bytes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&[0xff, 0xfe, 0, 0]);
        let mut r = Reader::new(&bytes, Endian::Little);
        let value = read_node(&sample_tree(), 1, &mut r).unwrap();
        assert_eq!(value, Value::Bytes(vec![0xff, 0xfe]));

        let mut w = Writer::new(Endian::Little);
        write_node(&sample_tree(), 1, &value, &mut w, "m_Name", true).unwrap();
        assert_eq!(w.into_inner(), bytes);
    }
}
