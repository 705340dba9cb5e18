//! Arena codec
//!
//! Normalization flattens a `Value` graph into an ordered arena of cells;
//! every nested node becomes an integer index into the arena. A visited map
//! keyed by node identity collapses shared references to one cell, and a
//! cell's slot is reserved before its children are normalized, so cycles
//! land as plain indices.
//!
//! Denormalization is the exact structural inverse: lay out empty shells for
//! every cell first, then fill children, so references (including cycles and
//! forward references) always have a live target.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::RwLock;

use crate::{Value, WireError, WireResult};

/// A normalized scalar-or-reference
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Index of a cell in the arena
    Ref(u32),
}

impl Slot {
    /// Is this slot a reference into the arena?
    #[inline]
    pub fn is_ref(&self) -> bool {
        matches!(self, Slot::Ref(_))
    }
}

/// One normalized array/map node
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Array(Vec<Slot>),
    /// Entries keep the source map's (sorted) key order
    Map(Vec<(String, Slot)>),
}

/// The wire form: a root slot plus the cell arena it may reference
#[derive(Clone, Debug, PartialEq)]
pub struct Wire {
    pub root: Slot,
    pub cells: Vec<Cell>,
}

/// Normalize a value graph into wire form.
///
/// Scalars pass through as the root slot with an empty arena.
pub fn serialize(value: &Value) -> Wire {
    let mut cells = Vec::new();
    let mut visited = HashMap::new();
    let root = normalize(value, &mut visited, &mut cells);
    Wire { root, cells }
}

fn normalize(value: &Value, visited: &mut HashMap<usize, u32>, cells: &mut Vec<Cell>) -> Slot {
    match value {
        Value::Null => Slot::Null,
        Value::Bool(b) => Slot::Bool(*b),
        Value::Int(n) => Slot::Int(*n),
        Value::Float(x) => Slot::Float(*x),
        Value::Str(s) => Slot::Str(s.clone()),
        Value::Array(items) => {
            let node = Arc::as_ptr(items) as usize;
            if let Some(&index) = visited.get(&node) {
                return Slot::Ref(index);
            }
            let index = cells.len() as u32;
            visited.insert(node, index);
            // reserve the slot before descending so cycles resolve to it
            cells.push(Cell::Array(Vec::new()));
            let normalized = items
                .read_recursive()
                .iter()
                .map(|item| normalize(item, visited, cells))
                .collect();
            cells[index as usize] = Cell::Array(normalized);
            Slot::Ref(index)
        }
        Value::Map(map) => {
            let node = Arc::as_ptr(map) as usize;
            if let Some(&index) = visited.get(&node) {
                return Slot::Ref(index);
            }
            let index = cells.len() as u32;
            visited.insert(node, index);
            cells.push(Cell::Map(Vec::new()));
            let normalized = map
                .read_recursive()
                .iter()
                .map(|(key, item)| (key.clone(), normalize(item, visited, cells)))
                .collect();
            cells[index as usize] = Cell::Map(normalized);
            Slot::Ref(index)
        }
    }
}

/// Rebuild a value graph from wire form, re-establishing shared references
/// and cycles.
pub fn deserialize(wire: &Wire) -> WireResult<Value> {
    // first pass: one empty shell per cell, so every reference has a target
    let shells: Vec<Value> = wire
        .cells
        .iter()
        .map(|cell| match cell {
            Cell::Array(_) => Value::Array(Arc::new(RwLock::new(Vec::new()))),
            Cell::Map(_) => Value::Map(Arc::new(RwLock::new(BTreeMap::new()))),
        })
        .collect();

    // second pass: fill children
    for (cell, shell) in wire.cells.iter().zip(shells.iter()) {
        match (cell, shell) {
            (Cell::Array(slots), Value::Array(items)) => {
                let mut items = items.write();
                for slot in slots {
                    items.push(resolve(slot, &shells)?);
                }
            }
            (Cell::Map(entries), Value::Map(map)) => {
                let mut map = map.write();
                for (key, slot) in entries {
                    map.insert(key.clone(), resolve(slot, &shells)?);
                }
            }
            _ => return Err(WireError::Malformed("cell and shell shapes diverged")),
        }
    }

    resolve(&wire.root, &shells)
}

fn resolve(slot: &Slot, shells: &[Value]) -> WireResult<Value> {
    Ok(match slot {
        Slot::Null => Value::Null,
        Slot::Bool(b) => Value::Bool(*b),
        Slot::Int(n) => Value::Int(*n),
        Slot::Float(x) => Value::Float(*x),
        Slot::Str(s) => Value::Str(s.clone()),
        Slot::Ref(index) => shells
            .get(*index as usize)
            .cloned()
            .ok_or(WireError::DanglingRef(*index))?,
    })
}

// Byte-level tags
const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_REF: u8 = 0x05;
const TAG_ARRAY: u8 = 0x10;
const TAG_MAP: u8 = 0x11;

impl Wire {
    /// Encode the wire form to bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_slot(&mut buf, &self.root);
        buf.put_u32_le(self.cells.len() as u32);
        for cell in &self.cells {
            match cell {
                Cell::Array(slots) => {
                    buf.put_u8(TAG_ARRAY);
                    buf.put_u32_le(slots.len() as u32);
                    for slot in slots {
                        encode_slot(&mut buf, slot);
                    }
                }
                Cell::Map(entries) => {
                    buf.put_u8(TAG_MAP);
                    buf.put_u32_le(entries.len() as u32);
                    for (key, slot) in entries {
                        encode_str(&mut buf, key);
                        encode_slot(&mut buf, slot);
                    }
                }
            }
        }
        buf.freeze()
    }

    /// Decode the wire form from bytes
    pub fn decode(mut buf: &[u8]) -> WireResult<Wire> {
        let root = decode_slot(&mut buf)?;
        let cell_count = decode_u32(&mut buf)? as usize;
        let mut cells = Vec::with_capacity(cell_count.min(4096));
        for _ in 0..cell_count {
            let tag = decode_u8(&mut buf)?;
            let len = decode_u32(&mut buf)? as usize;
            match tag {
                TAG_ARRAY => {
                    let mut slots = Vec::with_capacity(len.min(4096));
                    for _ in 0..len {
                        slots.push(decode_slot(&mut buf)?);
                    }
                    cells.push(Cell::Array(slots));
                }
                TAG_MAP => {
                    let mut entries = Vec::with_capacity(len.min(4096));
                    for _ in 0..len {
                        let key = decode_str(&mut buf)?;
                        let slot = decode_slot(&mut buf)?;
                        entries.push((key, slot));
                    }
                    cells.push(Cell::Map(entries));
                }
                other => return Err(WireError::UnknownTag(other)),
            }
        }
        Ok(Wire { root, cells })
    }
}

fn encode_slot(buf: &mut BytesMut, slot: &Slot) {
    match slot {
        Slot::Null => buf.put_u8(TAG_NULL),
        Slot::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*b));
        }
        Slot::Int(n) => {
            buf.put_u8(TAG_INT);
            buf.put_i64_le(*n);
        }
        Slot::Float(x) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_f64_le(*x);
        }
        Slot::Str(s) => {
            buf.put_u8(TAG_STR);
            encode_str(buf, s);
        }
        Slot::Ref(index) => {
            buf.put_u8(TAG_REF);
            buf.put_u32_le(*index);
        }
    }
}

fn encode_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn decode_u8(buf: &mut &[u8]) -> WireResult<u8> {
    if buf.remaining() < 1 {
        return Err(WireError::BufferTooShort {
            expected: 1,
            actual: buf.remaining(),
        });
    }
    Ok(buf.get_u8())
}

fn decode_u32(buf: &mut &[u8]) -> WireResult<u32> {
    if buf.remaining() < 4 {
        return Err(WireError::BufferTooShort {
            expected: 4,
            actual: buf.remaining(),
        });
    }
    Ok(buf.get_u32_le())
}

fn decode_str(buf: &mut &[u8]) -> WireResult<String> {
    let len = decode_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(WireError::BufferTooShort {
            expected: len,
            actual: buf.remaining(),
        });
    }
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
}

fn decode_slot(buf: &mut &[u8]) -> WireResult<Slot> {
    let tag = decode_u8(buf)?;
    Ok(match tag {
        TAG_NULL => Slot::Null,
        TAG_BOOL => Slot::Bool(decode_u8(buf)? != 0),
        TAG_INT => {
            if buf.remaining() < 8 {
                return Err(WireError::BufferTooShort {
                    expected: 8,
                    actual: buf.remaining(),
                });
            }
            Slot::Int(buf.get_i64_le())
        }
        TAG_FLOAT => {
            if buf.remaining() < 8 {
                return Err(WireError::BufferTooShort {
                    expected: 8,
                    actual: buf.remaining(),
                });
            }
            Slot::Float(buf.get_f64_le())
        }
        TAG_STR => Slot::Str(decode_str(buf)?),
        TAG_REF => Slot::Ref(decode_u32(buf)?),
        other => return Err(WireError::UnknownTag(other)),
    })
}
