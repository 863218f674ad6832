//! Typed value encoding
//!
//! The key-value engine only knows fixed-width integers and blobs. Every
//! type a settings group can persist maps onto one integer [`Primitive`]:
//!
//! | Rust type | Stored as | Rule |
//! |-----------|-----------|------|
//! | `u8` … `i64` | same-width integer | identity |
//! | `f32` | `U32` | IEEE-754 bit pattern (`to_bits` / `from_bits`) |
//! | `bool` | `U8` | `0` / `1`, any non-zero byte reads as `true` |
//!
//! Strings, blobs and record arrays go through [`crate::codec`].

use crate::error::{Result, StorageError};

/// Entry kind tag recorded next to every stored entry
///
/// Tag values match the ESP-IDF NVS item types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EntryKind {
    U8 = 0x01,
    I8 = 0x11,
    U16 = 0x02,
    I16 = 0x12,
    U32 = 0x04,
    I32 = 0x14,
    U64 = 0x08,
    I64 = 0x18,
    Blob = 0x42,
}

impl EntryKind {
    /// Decode a kind tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0x01 => EntryKind::U8,
            0x11 => EntryKind::I8,
            0x02 => EntryKind::U16,
            0x12 => EntryKind::I16,
            0x04 => EntryKind::U32,
            0x14 => EntryKind::I32,
            0x08 => EntryKind::U64,
            0x18 => EntryKind::I64,
            0x42 => EntryKind::Blob,
            _ => return None,
        })
    }

    /// Encoded size in bytes for integer kinds, `None` for blobs
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            EntryKind::U8 | EntryKind::I8 => Some(1),
            EntryKind::U16 | EntryKind::I16 => Some(2),
            EntryKind::U32 | EntryKind::I32 => Some(4),
            EntryKind::U64 | EntryKind::I64 => Some(8),
            EntryKind::Blob => None,
        }
    }
}

/// Fixed-width integer value as handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Primitive {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
}

impl Primitive {
    /// Kind tag of this value
    pub fn kind(&self) -> EntryKind {
        match self {
            Primitive::U8(_) => EntryKind::U8,
            Primitive::I8(_) => EntryKind::I8,
            Primitive::U16(_) => EntryKind::U16,
            Primitive::I16(_) => EntryKind::I16,
            Primitive::U32(_) => EntryKind::U32,
            Primitive::I32(_) => EntryKind::I32,
            Primitive::U64(_) => EntryKind::U64,
            Primitive::I64(_) => EntryKind::I64,
        }
    }

    /// Little-endian bytes, returned with their length
    pub fn to_le_bytes(&self) -> ([u8; 8], usize) {
        let mut buf = [0u8; 8];
        let len = match *self {
            Primitive::U8(v) => {
                buf[0] = v;
                1
            }
            Primitive::I8(v) => {
                buf[..1].copy_from_slice(&v.to_le_bytes());
                1
            }
            Primitive::U16(v) => {
                buf[..2].copy_from_slice(&v.to_le_bytes());
                2
            }
            Primitive::I16(v) => {
                buf[..2].copy_from_slice(&v.to_le_bytes());
                2
            }
            Primitive::U32(v) => {
                buf[..4].copy_from_slice(&v.to_le_bytes());
                4
            }
            Primitive::I32(v) => {
                buf[..4].copy_from_slice(&v.to_le_bytes());
                4
            }
            Primitive::U64(v) => {
                buf.copy_from_slice(&v.to_le_bytes());
                8
            }
            Primitive::I64(v) => {
                buf.copy_from_slice(&v.to_le_bytes());
                8
            }
        };
        (buf, len)
    }

    /// Decode little-endian bytes of the given integer kind
    ///
    /// Fails with `TypeMismatch` for `Blob` and `InvalidLength` when `bytes`
    /// does not have the kind's width.
    pub fn from_le_bytes(kind: EntryKind, bytes: &[u8]) -> Result<Self> {
        let size = kind.fixed_size().ok_or(StorageError::TypeMismatch)?;
        if bytes.len() != size {
            return Err(StorageError::InvalidLength);
        }

        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(bytes);

        Ok(match kind {
            EntryKind::U8 => Primitive::U8(buf[0]),
            EntryKind::I8 => Primitive::I8(i8::from_le_bytes([buf[0]])),
            EntryKind::U16 => Primitive::U16(u16::from_le_bytes([buf[0], buf[1]])),
            EntryKind::I16 => Primitive::I16(i16::from_le_bytes([buf[0], buf[1]])),
            EntryKind::U32 => Primitive::U32(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            EntryKind::I32 => Primitive::I32(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            EntryKind::U64 => Primitive::U64(u64::from_le_bytes(buf)),
            EntryKind::I64 => Primitive::I64(i64::from_le_bytes(buf)),
            EntryKind::Blob => return Err(StorageError::TypeMismatch),
        })
    }
}

/// A value that persists through one integer accessor
pub trait StoredValue: Copy {
    /// Engine kind used on both write and read
    const KIND: EntryKind;

    /// Encode for storage
    fn to_primitive(self) -> Primitive;

    /// Decode a stored value; `None` if the primitive has another kind
    fn from_primitive(value: Primitive) -> Option<Self>;
}

macro_rules! impl_stored_integer {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl StoredValue for $ty {
                const KIND: EntryKind = EntryKind::$variant;

                fn to_primitive(self) -> Primitive {
                    Primitive::$variant(self)
                }

                fn from_primitive(value: Primitive) -> Option<Self> {
                    match value {
                        Primitive::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_stored_integer! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
}

impl StoredValue for f32 {
    const KIND: EntryKind = EntryKind::U32;

    fn to_primitive(self) -> Primitive {
        Primitive::U32(self.to_bits())
    }

    fn from_primitive(value: Primitive) -> Option<Self> {
        match value {
            Primitive::U32(bits) => Some(f32::from_bits(bits)),
            _ => None,
        }
    }
}

impl StoredValue for bool {
    const KIND: EntryKind = EntryKind::U8;

    fn to_primitive(self) -> Primitive {
        Primitive::U8(u8::from(self))
    }

    fn from_primitive(value: Primitive) -> Option<Self> {
        match value {
            Primitive::U8(b) => Some(b != 0),
            _ => None,
        }
    }
}
