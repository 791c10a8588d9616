//! Decoder for the self-describing MMDB data section.
//!
//! Every value starts with a control byte holding the type in its high
//! three bits and a raw size in the low five. A zero type field escapes to
//! an extended type carried by the next byte; raw sizes of 29, 30 and 31
//! escape to one, two and three extra length bytes. Pointers have their own
//! `001SSVVV` control layout and are resolved transparently against the
//! same buffer.

use std::collections::BTreeMap;

use crate::error::GeoIpError;
use crate::value::Value;

const TYPE_POINTER: u8 = 1;
const TYPE_STRING: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_BYTES: u8 = 4;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_INT32: u8 = 8;
const TYPE_UINT64: u8 = 9;
const TYPE_UINT128: u8 = 10;
const TYPE_ARRAY: u8 = 11;
const TYPE_BOOLEAN: u8 = 14;
const TYPE_FLOAT: u8 = 15;

/// Pointer chains longer than this are treated as loops in a corrupt file.
const MAX_POINTER_DEPTH: usize = 32;

/// Decodes `bytes` as a big-endian unsigned integer. Widths up to
/// `size_of::<usize>()` bytes; missing high bytes are implicitly zero.
pub(crate) fn be_usize(bytes: &[u8]) -> usize {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | usize::from(b))
}

fn be_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

fn be_u128(bytes: &[u8]) -> u128 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u128::from(b))
}

/// The decoded control byte(s) of a value.
enum Control {
    /// An in-data jump to an absolute offset.
    Pointer(usize),
    /// A regular value: `(type, payload size)`.
    Field(u8, usize),
}

/// A cursor over a data section (or the metadata slice).
///
/// Pointer resolution spawns a fresh cursor at the target offset; the outer
/// cursor is left just past the pointer's own control bytes. All reads are
/// bounds-checked so corrupt input surfaces as an error, never a panic.
#[derive(Debug)]
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8], pos: usize) -> Decoder<'a> {
        Decoder { buf, pos }
    }

    /// Decodes one complete value at the cursor.
    pub(crate) fn decode(&mut self) -> Result<Value, GeoIpError> {
        self.decode_value(0)
    }

    fn eat(&mut self) -> Result<u8, GeoIpError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| GeoIpError::decode_at("unexpected end of data", self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], GeoIpError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        let end = end.ok_or_else(|| GeoIpError::decode_at("unexpected end of data", self.pos))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn control(&mut self) -> Result<Control, GeoIpError> {
        let at = self.pos;
        let ctrl = self.eat()?;
        let type_num = ctrl >> 5;

        if type_num == TYPE_POINTER {
            // 001SSVVV: SS selects the width, VVV carries high bits.
            let ss = usize::from((ctrl >> 3) & 0x3);
            let vvv = usize::from(ctrl & 0x7);
            let bytes = self.take(ss + 1)?;
            let target = match ss {
                0 => (vvv << 8) | be_usize(bytes),
                1 => ((vvv << 16) | be_usize(bytes)) + 2048,
                2 => ((vvv << 24) | be_usize(bytes)) + 526_336,
                _ => be_usize(bytes),
            };
            return Ok(Control::Pointer(target));
        }

        let type_num = if type_num == 0 {
            let ext = self.eat()?;
            if ext > TYPE_FLOAT - 7 {
                return Err(GeoIpError::decode_at(
                    format!("unknown extended type {ext}"),
                    at,
                ));
            }
            ext + 7
        } else {
            type_num
        };

        let size = match usize::from(ctrl & 0x1f) {
            s if s < 29 => s,
            29 => 29 + usize::from(self.eat()?),
            30 => 285 + be_usize(self.take(2)?),
            _ => 65_821 + be_usize(self.take(3)?),
        };
        Ok(Control::Field(type_num, size))
    }

    fn decode_value(&mut self, ptr_depth: usize) -> Result<Value, GeoIpError> {
        let at = self.pos;
        match self.control()? {
            Control::Pointer(target) => {
                if ptr_depth >= MAX_POINTER_DEPTH {
                    return Err(GeoIpError::decode_at("pointer loop", at));
                }
                Decoder::new(self.buf, target).decode_value(ptr_depth + 1)
            }
            Control::Field(type_num, size) => self.decode_field(type_num, size, ptr_depth),
        }
    }

    fn decode_field(
        &mut self,
        type_num: u8,
        size: usize,
        ptr_depth: usize,
    ) -> Result<Value, GeoIpError> {
        let at = self.pos;
        Ok(match type_num {
            TYPE_STRING => Value::String(lossy_string(self.take(size)?)),
            TYPE_DOUBLE => {
                if size != 8 {
                    return Err(GeoIpError::decode_at(
                        format!("double must be 8 bytes, not {size}"),
                        at,
                    ));
                }
                Value::Double(f64::from_bits(be_u64(self.take(8)?)))
            }
            TYPE_BYTES => Value::Bytes(self.take(size)?.to_vec()),
            TYPE_UINT16 => {
                if size > 2 {
                    return Err(GeoIpError::decode_at(
                        format!("size {size} is too big for uint16"),
                        at,
                    ));
                }
                Value::Uint16(
                    self.take(size)?
                        .iter()
                        .fold(0, |acc, &b| (acc << 8) | u16::from(b)),
                )
            }
            TYPE_UINT32 => {
                if size > 4 {
                    return Err(GeoIpError::decode_at(
                        format!("size {size} is too big for uint32"),
                        at,
                    ));
                }
                Value::Uint32(
                    self.take(size)?
                        .iter()
                        .fold(0, |acc, &b| (acc << 8) | u32::from(b)),
                )
            }
            TYPE_MAP => self.decode_map(size, ptr_depth)?,
            TYPE_INT32 => {
                if size > 4 {
                    return Err(GeoIpError::decode_at(
                        format!("size {size} is too big for int32"),
                        at,
                    ));
                }
                let raw: u32 = self
                    .take(size)?
                    .iter()
                    .fold(0, |acc, &b| (acc << 8) | u32::from(b));
                Value::Int32(raw as i32)
            }
            TYPE_UINT64 => {
                if size > 8 {
                    return Err(GeoIpError::decode_at(
                        format!("size {size} is too big for uint64"),
                        at,
                    ));
                }
                Value::Uint64(be_u64(self.take(size)?))
            }
            TYPE_UINT128 => {
                if size > 16 {
                    return Err(GeoIpError::decode_at(
                        format!("size {size} is too big for uint128"),
                        at,
                    ));
                }
                // Payloads up to 8 bytes surface as uint64; every database
                // MaxMind currently ships stays in that range.
                if size <= 8 {
                    Value::Uint64(be_u64(self.take(size)?))
                } else {
                    Value::Uint128(be_u128(self.take(size)?))
                }
            }
            TYPE_ARRAY => self.decode_array(size, ptr_depth)?,
            TYPE_BOOLEAN => Value::Bool(size != 0),
            TYPE_FLOAT => {
                if size != 4 {
                    return Err(GeoIpError::decode_at(
                        format!("float must be 4 bytes, not {size}"),
                        at,
                    ));
                }
                let raw: u32 = self
                    .take(4)?
                    .iter()
                    .fold(0, |acc, &b| (acc << 8) | u32::from(b));
                Value::Float(f32::from_bits(raw))
            }
            u => return Err(GeoIpError::decode_at(format!("unknown data type {u}"), at)),
        })
    }

    fn decode_array(&mut self, count: usize, ptr_depth: usize) -> Result<Value, GeoIpError> {
        // Corrupt headers can claim absurd counts; grow instead of trusting
        // the declared size.
        let mut values = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            values.push(self.decode_value(ptr_depth)?);
        }
        Ok(Value::Array(values))
    }

    fn decode_map(&mut self, count: usize, ptr_depth: usize) -> Result<Value, GeoIpError> {
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.decode_key(ptr_depth)?;
            let value = self.decode_value(ptr_depth)?;
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }

    /// Fast path for map keys, which must be strings (possibly via pointer).
    fn decode_key(&mut self, ptr_depth: usize) -> Result<String, GeoIpError> {
        let at = self.pos;
        match self.control()? {
            Control::Pointer(target) => {
                if ptr_depth >= MAX_POINTER_DEPTH {
                    return Err(GeoIpError::decode_at("pointer loop", at));
                }
                Decoder::new(self.buf, target).decode_key(ptr_depth + 1)
            }
            Control::Field(TYPE_STRING, size) => Ok(lossy_string(self.take(size)?)),
            Control::Field(type_num, _) => Err(GeoIpError::decode_at(
                format!("map key is not a string (type {type_num})"),
                at,
            )),
        }
    }
}

/// Best-effort UTF-8: invalid sequences are replaced rather than rejected.
fn lossy_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
