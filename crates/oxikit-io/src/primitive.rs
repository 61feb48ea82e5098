//! Fixed-size primitive encoding.
//!
//! Each primitive has a one-byte [`TypeTag`] that a stream may write in
//! front of the value when debug type tags are enabled, and a byte
//! encoding produced through [`ByteOrder::convert`].

use crate::ByteOrder;
use std::fmt;

/// One-byte type tag written before a value when a stream has type tags on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    /// `u8`
    U8 = 0x01,
    /// `i8`
    I8 = 0x02,
    /// `u16`
    U16 = 0x03,
    /// `i16`
    I16 = 0x04,
    /// `u32`
    U32 = 0x05,
    /// `i32`
    I32 = 0x06,
    /// `u64`
    U64 = 0x07,
    /// `i64`
    I64 = 0x08,
    /// `f32`
    F32 = 0x09,
    /// `f64`
    F64 = 0x0a,
    /// `bool`, encoded as one byte
    Bool = 0x0b,
    /// Length-prefixed, NUL-terminated string
    String = 0x10,
}

impl TypeTag {
    /// Decodes a raw tag byte.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0x01 => TypeTag::U8,
            0x02 => TypeTag::I8,
            0x03 => TypeTag::U16,
            0x04 => TypeTag::I16,
            0x05 => TypeTag::U32,
            0x06 => TypeTag::I32,
            0x07 => TypeTag::U64,
            0x08 => TypeTag::I64,
            0x09 => TypeTag::F32,
            0x0a => TypeTag::F64,
            0x0b => TypeTag::Bool,
            0x10 => TypeTag::String,
            _ => return None,
        })
    }

    /// Returns the raw tag byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns a short lowercase name for the tagged type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            TypeTag::U8 => "u8",
            TypeTag::I8 => "i8",
            TypeTag::U16 => "u16",
            TypeTag::I16 => "i16",
            TypeTag::U32 => "u32",
            TypeTag::I32 => "i32",
            TypeTag::U64 => "u64",
            TypeTag::I64 => "i64",
            TypeTag::F32 => "f32",
            TypeTag::F64 => "f64",
            TypeTag::Bool => "bool",
            TypeTag::String => "string",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value with a fixed-size, byte-order-aware encoding.
pub trait Primitive: Copy + Sized {
    /// Tag written ahead of the value in tagged streams.
    const TAG: TypeTag;

    /// Encoded byte array.
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    /// Encodes `self` in the given byte order.
    fn to_bytes(self, order: ByteOrder) -> Self::Bytes;

    /// Decodes a value stored in the given byte order.
    fn from_bytes(bytes: Self::Bytes, order: ByteOrder) -> Self;

    /// Encoded size in bytes, tag excluded.
    #[must_use]
    fn encoded_len() -> usize {
        Self::Bytes::default().as_ref().len()
    }
}

macro_rules! impl_primitive {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const TAG: TypeTag = TypeTag::$tag;
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn to_bytes(self, order: ByteOrder) -> Self::Bytes {
                    order.convert(self.to_ne_bytes())
                }

                fn from_bytes(bytes: Self::Bytes, order: ByteOrder) -> Self {
                    <$ty>::from_ne_bytes(order.convert(bytes))
                }
            }
        )*
    };
}

impl_primitive! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

impl Primitive for bool {
    const TAG: TypeTag = TypeTag::Bool;
    type Bytes = [u8; 1];

    fn to_bytes(self, _order: ByteOrder) -> Self::Bytes {
        [u8::from(self)]
    }

    fn from_bytes(bytes: Self::Bytes, _order: ByteOrder) -> Self {
        bytes[0] != 0
    }
}
