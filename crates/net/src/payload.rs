//! The application payload codec: a length-prefixed, tagged binary form
//! standing in for the msgpack the reference client uses. Peers must
//! agree byte-for-byte on [`CODEBOOK`]; it exists purely to shrink the
//! common dict keys (events, acks) down to two bytes instead of a
//! length-prefixed string every time.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::PayloadError;

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT32: u8 = 0x03;
const TAG_FLOAT64: u8 = 0x04;
const TAG_UTF8: u8 = 0x05;
const TAG_LIST: u8 = 0x06;
const TAG_DICT: u8 = 0x07;
const KEY_KNOWN: u8 = 0x08;
const KEY_UNKNOWN: u8 = 0x09;

/// Fixed codebook shared by both peers. Order is part of the wire
/// contract: appending is safe, reordering or removing is not.
pub const CODEBOOK: &[&str] =
    &["user-id", "action", "action-priority", "combatant-id", "type", "sequence", "ack"];

fn codebook_index(key: &str) -> Option<u8> {
    CODEBOOK.iter().position(|&k| k == key).map(|i| i as u8)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Int(i32),
    Float(f64),
    Str(String),
    List(Vec<PayloadValue>),
    Dict(Vec<(String, PayloadValue)>),
}

pub fn encode(value: &PayloadValue) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf);
    buf
}

fn encode_into(value: &PayloadValue, buf: &mut Vec<u8>) {
    match value {
        PayloadValue::Null => buf.push(TAG_NULL),
        PayloadValue::Bool(false) => buf.push(TAG_FALSE),
        PayloadValue::Bool(true) => buf.push(TAG_TRUE),
        PayloadValue::Int(n) => {
            buf.push(TAG_INT32);
            buf.write_i32::<BigEndian>(*n).expect("vec write is infallible");
        }
        PayloadValue::Float(f) => {
            buf.push(TAG_FLOAT64);
            buf.write_f64::<BigEndian>(*f).expect("vec write is infallible");
        }
        PayloadValue::Str(s) => {
            buf.push(TAG_UTF8);
            encode_utf8(s, buf);
        }
        PayloadValue::List(items) => {
            buf.push(TAG_LIST);
            buf.write_u16::<BigEndian>(items.len() as u16).expect("vec write is infallible");
            for item in items {
                encode_into(item, buf);
            }
        }
        PayloadValue::Dict(entries) => {
            buf.push(TAG_DICT);
            buf.write_u16::<BigEndian>(entries.len() as u16).expect("vec write is infallible");
            for (key, value) in entries {
                encode_key(key, buf);
                encode_into(value, buf);
            }
        }
    }
}

fn encode_utf8(s: &str, buf: &mut Vec<u8>) {
    buf.write_u16::<BigEndian>(s.len() as u16).expect("vec write is infallible");
    buf.extend_from_slice(s.as_bytes());
}

fn encode_key(key: &str, buf: &mut Vec<u8>) {
    match codebook_index(key) {
        Some(id) => {
            buf.push(KEY_KNOWN);
            buf.push(id);
        }
        None => {
            buf.push(KEY_UNKNOWN);
            encode_utf8(key, buf);
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<PayloadValue, PayloadError> {
    let mut cursor = bytes;
    let value = decode_value(&mut cursor)?;
    Ok(value)
}

fn decode_value(cursor: &mut &[u8]) -> Result<PayloadValue, PayloadError> {
    let tag = read_u8(cursor)?;
    match tag {
        TAG_NULL => Ok(PayloadValue::Null),
        TAG_FALSE => Ok(PayloadValue::Bool(false)),
        TAG_TRUE => Ok(PayloadValue::Bool(true)),
        TAG_INT32 => {
            let n = cursor.read_i32::<BigEndian>().map_err(|_| PayloadError::UnexpectedEof)?;
            Ok(PayloadValue::Int(n))
        }
        TAG_FLOAT64 => {
            let f = cursor.read_f64::<BigEndian>().map_err(|_| PayloadError::UnexpectedEof)?;
            Ok(PayloadValue::Float(f))
        }
        TAG_UTF8 => Ok(PayloadValue::Str(decode_utf8(cursor)?)),
        TAG_LIST => {
            let len = read_u16(cursor)?;
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(decode_value(cursor)?);
            }
            Ok(PayloadValue::List(items))
        }
        TAG_DICT => {
            let len = read_u16(cursor)?;
            let mut entries = Vec::with_capacity(len as usize);
            for _ in 0..len {
                let key = decode_key(cursor)?;
                let value = decode_value(cursor)?;
                entries.push((key, value));
            }
            Ok(PayloadValue::Dict(entries))
        }
        other => Err(PayloadError::UnknownTag { tag: other }),
    }
}

fn decode_key(cursor: &mut &[u8]) -> Result<String, PayloadError> {
    let tag = read_u8(cursor)?;
    match tag {
        KEY_KNOWN => {
            let id = read_u8(cursor)?;
            CODEBOOK
                .get(id as usize)
                .map(|s| s.to_string())
                .ok_or(PayloadError::UnknownCodebookId { id })
        }
        KEY_UNKNOWN => decode_utf8(cursor),
        other => Err(PayloadError::UnknownKeyTag { tag: other }),
    }
}

fn decode_utf8(cursor: &mut &[u8]) -> Result<String, PayloadError> {
    let len = read_u16(cursor)? as usize;
    if cursor.len() < len {
        return Err(PayloadError::UnexpectedEof);
    }
    let (bytes, rest) = cursor.split_at(len);
    *cursor = rest;
    String::from_utf8(bytes.to_vec()).map_err(|_| PayloadError::InvalidUtf8)
}

fn read_u8(cursor: &mut &[u8]) -> Result<u8, PayloadError> {
    cursor.read_u8().map_err(|_| PayloadError::UnexpectedEof)
}

fn read_u16(cursor: &mut &[u8]) -> Result<u16, PayloadError> {
    cursor.read_u16::<BigEndian>().map_err(|_| PayloadError::UnexpectedEof)
}
