//! Typed rows and their self-describing binary form.
//!
//! A tuple is an ordered sequence of cells, exactly one of which is
//! flagged as the table's primary key. Each cell encodes to
//!
//! `| type:u16 | length:u16 | key:u8 | reserved:[3]u8 | value:[length]u8 |`
//!
//! with every fixed-width field in big-endian byte order.


use std::cmp::Ordering;

use common::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use types::{DataType, Value};

/// Fixed bytes in front of every cell payload.
pub const CELL_HEADER_BYTES: usize = 8;

/// One column of a row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub value: Value,
    pub key: bool,
}

impl Cell {
    fn payload(&self) -> DbResult<Vec<u8>> {
        let bytes = match &self.value {
            Value::Bool(v) => vec![u8::from(*v)],
            Value::Int(v) => v.to_be_bytes().to_vec(),
            Value::Float(v) => v.to_bits().to_be_bytes().to_vec(),
            Value::Bytes(v) => v.clone(),
            Value::Text(v) => v.as_bytes().to_vec(),
            Value::Timestamp(v) => v.to_be_bytes().to_vec(),
        };
        if bytes.len() > usize::from(u16::MAX) {
            return Err(DbError::Codec(format!(
                "cell payload of {} bytes exceeds the 16-bit length field",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

fn type_tag(kind: DataType) -> u16 {
    match kind {
        DataType::Bool => 1,
        DataType::Int => 2,
        DataType::Float => 3,
        DataType::Bytes => 4,
        DataType::Text => 5,
        DataType::Timestamp => 6,
    }
}

fn kind_from_tag(tag: u16) -> Option<DataType> {
    match tag {
        1 => Some(DataType::Bool),
        2 => Some(DataType::Int),
        3 => Some(DataType::Float),
        4 => Some(DataType::Bytes),
        5 => Some(DataType::Text),
        6 => Some(DataType::Timestamp),
        _ => None,
    }
}

/// A row in a table. The encoded size varies with its contents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    cells: Vec<Cell>,
}

impl Tuple {
    /// Builds a row from column values, flagging `key_index` as the
    /// primary-key cell.
    pub fn new(values: Vec<Value>, key_index: usize) -> Tuple {
        let cells = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Cell {
                value,
                key: i == key_index,
            })
            .collect();
        Tuple { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// The value of the key-flagged cell.
    pub fn key_value(&self) -> Option<&Value> {
        self.cells.iter().find(|c| c.key).map(|c| &c.value)
    }

    /// Encoded size in bytes, without encoding.
    pub fn encoded_len(&self) -> usize {
        self.cells
            .iter()
            .map(|c| CELL_HEADER_BYTES + value_len(&c.value))
            .sum()
    }

    pub fn encode(&self) -> DbResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for cell in &self.cells {
            let payload = cell.payload()?;
            out.extend_from_slice(&type_tag(cell.value.kind()).to_be_bytes());
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
            out.push(u8::from(cell.key));
            out.extend_from_slice(&[0u8; 3]);
            out.extend_from_slice(&payload);
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> DbResult<Tuple> {
        let mut cells = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let header = bytes
                .get(offset..offset + CELL_HEADER_BYTES)
                .ok_or_else(|| truncated(bytes.len()))?;
            let tag = u16::from_be_bytes([header[0], header[1]]);
            let length = usize::from(u16::from_be_bytes([header[2], header[3]]));
            let key = header[4] == 1;
            offset += CELL_HEADER_BYTES;

            let payload = bytes
                .get(offset..offset + length)
                .ok_or_else(|| truncated(bytes.len()))?;
            offset += length;

            let kind = kind_from_tag(tag)
                .ok_or_else(|| DbError::Codec(format!("unknown cell type tag {tag}")))?;
            let value = decode_value(kind, payload)?;
            cells.push(Cell { value, key });
        }
        Ok(Tuple { cells })
    }

    /// Orders two rows by their key cells under the key type's natural
    /// ordering. Rows without a key cell compare equal to everything.
    pub fn cmp_by_key(&self, other: &Tuple) -> Ordering {
        match (self.key_value(), other.key_value()) {
            (Some(a), Some(b)) => a.cmp_same_type(b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        }
    }
}

fn value_len(value: &Value) -> usize {
    match value {
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) | Value::Timestamp(_) => 8,
        Value::Bytes(v) => v.len(),
        Value::Text(v) => v.len(),
    }
}

fn decode_value(kind: DataType, payload: &[u8]) -> DbResult<Value> {
    let fixed = |expected: usize| -> DbResult<[u8; 8]> {
        if payload.len() != expected {
            return Err(DbError::Codec(format!(
                "{kind} cell carries {} bytes, expected {expected}",
                payload.len()
            )));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(payload);
        Ok(buf)
    };

    match kind {
        DataType::Bool => match payload {
            [0] => Ok(Value::Bool(false)),
            [1] => Ok(Value::Bool(true)),
            _ => Err(DbError::Codec("malformed Bool cell".into())),
        },
        DataType::Int => Ok(Value::Int(i64::from_be_bytes(fixed(8)?))),
        DataType::Float => Ok(Value::Float(f64::from_bits(u64::from_be_bytes(fixed(8)?)))),
        DataType::Bytes => Ok(Value::Bytes(payload.to_vec())),
        DataType::Text => String::from_utf8(payload.to_vec())
            .map(Value::Text)
            .map_err(|e| DbError::Codec(format!("Text cell is not valid UTF-8: {e}"))),
        DataType::Timestamp => Ok(Value::Timestamp(i64::from_be_bytes(fixed(8)?))),
    }
}

fn truncated(len: usize) -> DbError {
    DbError::Codec(format!("tuple bytes truncated at {len}"))
}
