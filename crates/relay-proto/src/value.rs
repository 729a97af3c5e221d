//! A small BSON-like tagged value encoding.
//!
//! Every value on the wire is a one-byte tag followed by a type-specific
//! payload. Documents are ordered maps of `String -> Value`; this is
//! deliberately not a general-purpose format, just enough to carry the
//! envelopes described by the relay protocol.

use crate::error::ProtoError;
use bytes::{Buf, BufMut};

const TAG_NULL: u8 = 0x01;
const TAG_BOOL: u8 = 0x02;
const TAG_INT32: u8 = 0x03;
const TAG_INT64: u8 = 0x04;
const TAG_DOUBLE: u8 = 0x05;
const TAG_STRING: u8 = 0x06;
const TAG_BINARY: u8 = 0x07;
const TAG_ARRAY: u8 = 0x08;
const TAG_DOCUMENT: u8 = 0x09;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Int32(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, buf: &mut impl BufMut) {
        match self {
            Value::Null => buf.put_u8(TAG_NULL),
            Value::Bool(b) => {
                buf.put_u8(TAG_BOOL);
                buf.put_u8(*b as u8);
            }
            Value::Int32(v) => {
                buf.put_u8(TAG_INT32);
                buf.put_i32_le(*v);
            }
            Value::Int64(v) => {
                buf.put_u8(TAG_INT64);
                buf.put_i64_le(*v);
            }
            Value::Double(v) => {
                buf.put_u8(TAG_DOUBLE);
                buf.put_f64_le(*v);
            }
            Value::String(s) => {
                buf.put_u8(TAG_STRING);
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Value::Binary(b) => {
                buf.put_u8(TAG_BINARY);
                buf.put_u32_le(b.len() as u32);
                buf.put_slice(b);
            }
            Value::Array(items) => {
                buf.put_u8(TAG_ARRAY);
                buf.put_u32_le(items.len() as u32);
                for item in items {
                    item.encode(buf);
                }
            }
            Value::Document(doc) => {
                buf.put_u8(TAG_DOCUMENT);
                doc.encode(buf);
            }
        }
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Value, ProtoError> {
        if !buf.has_remaining() {
            return Err(ProtoError::UnexpectedEof("value tag"));
        }
        let tag = buf.get_u8();
        match tag {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => {
                require(buf, 1, "bool")?;
                Ok(Value::Bool(buf.get_u8() != 0))
            }
            TAG_INT32 => {
                require(buf, 4, "int32")?;
                Ok(Value::Int32(buf.get_i32_le()))
            }
            TAG_INT64 => {
                require(buf, 8, "int64")?;
                Ok(Value::Int64(buf.get_i64_le()))
            }
            TAG_DOUBLE => {
                require(buf, 8, "double")?;
                Ok(Value::Double(buf.get_f64_le()))
            }
            TAG_STRING => {
                let len = read_u32_len(buf, "string length")?;
                require(buf, len, "string body")?;
                let mut raw = vec![0u8; len];
                buf.copy_to_slice(&mut raw);
                Ok(Value::String(
                    std::str::from_utf8(&raw).map_err(ProtoError::InvalidUtf8)?.to_string(),
                ))
            }
            TAG_BINARY => {
                let len = read_u32_len(buf, "binary length")?;
                require(buf, len, "binary body")?;
                let mut raw = vec![0u8; len];
                buf.copy_to_slice(&mut raw);
                Ok(Value::Binary(raw))
            }
            TAG_ARRAY => {
                let count = read_u32_len(buf, "array length")?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(Value::decode(buf)?);
                }
                Ok(Value::Array(items))
            }
            TAG_DOCUMENT => Ok(Value::Document(Document::decode(buf)?)),
            other => Err(ProtoError::InvalidTag(other)),
        }
    }
}

fn require(buf: &impl Buf, needed: usize, what: &'static str) -> Result<(), ProtoError> {
    if buf.remaining() < needed {
        Err(ProtoError::UnexpectedEof(what))
    } else {
        Ok(())
    }
}

fn read_u32_len(buf: &mut impl Buf, what: &'static str) -> Result<usize, ProtoError> {
    require(buf, 4, what)?;
    Ok(buf.get_u32_le() as usize)
}

/// An ordered document: insertion order is preserved so replies read
/// naturally and are reproducible in tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value.into();
        } else {
            self.fields.push((key, value.into()));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &'static str) -> Result<&str, ProtoError> {
        self.get(key)
            .ok_or(ProtoError::MissingField(key))?
            .as_str()
            .ok_or(ProtoError::WrongType { field: key })
    }

    pub fn get_i64(&self, key: &'static str) -> Result<i64, ProtoError> {
        self.get(key)
            .ok_or(ProtoError::MissingField(key))?
            .as_i64()
            .ok_or(ProtoError::WrongType { field: key })
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.fields.len() as u32);
        for (key, value) in &self.fields {
            buf.put_u16_le(key.len() as u16);
            buf.put_slice(key.as_bytes());
            value.encode(buf);
        }
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Document, ProtoError> {
        let count = read_u32_len(buf, "document field count")?;
        let mut fields = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            require(buf, 2, "field key length")?;
            let key_len = buf.get_u16_le() as usize;
            require(buf, key_len, "field key body")?;
            let mut raw = vec![0u8; key_len];
            buf.copy_to_slice(&mut raw);
            let key = std::str::from_utf8(&raw).map_err(ProtoError::InvalidUtf8)?.to_string();
            let value = Value::decode(buf)?;
            fields.push((key, value));
        }
        Ok(Document { fields })
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
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}
impl From<Document> for Value {
    fn from(d: Document) -> Self {
        Value::Document(d)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_document() {
        let mut doc = Document::new();
        doc.insert("method", "publish");
        doc.insert("published_at", 1_700_000_000_123i64);
        doc.insert("ok", true);
        doc.insert(
            "users",
            Value::Array(vec![Value::from("a"), Value::from("b")]),
        );

        let mut buf = bytes::BytesMut::new();
        doc.encode(&mut buf);
        let mut cursor = buf.freeze();
        let decoded = Document::decode(&mut cursor).unwrap();

        assert_eq!(decoded.get_str("method").unwrap(), "publish");
        assert_eq!(decoded.get_i64("published_at").unwrap(), 1_700_000_000_123);
        assert_eq!(decoded.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(
            decoded.get("users").and_then(Value::as_array).map(|a| a.len()),
            Some(2)
        );
    }

    #[test]
    fn rejects_truncated_buffer() {
        let mut doc = Document::new();
        doc.insert("channel", "g1");
        let mut buf = bytes::BytesMut::new();
        doc.encode(&mut buf);
        buf.truncate(buf.len() - 2);
        let mut cursor = buf.freeze();
        assert!(Document::decode(&mut cursor).is_err());
    }
}
