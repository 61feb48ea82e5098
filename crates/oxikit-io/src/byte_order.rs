//! Byte order of a stream.
//!
//! All multi-byte primitives pass through [`ByteOrder::convert`], the one
//! place where bytes are swapped. Nothing else in the crate looks at
//! endianness.

use std::fmt;

/// Byte order declared for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Most significant byte first (network order).
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

impl ByteOrder {
    /// Returns the byte order of the host.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// Converts between host order and this order.
    ///
    /// The conversion is its own inverse, so the same call serves both the
    /// read and the write path.
    #[must_use]
    pub fn convert<const N: usize>(self, mut bytes: [u8; N]) -> [u8; N] {
        if self != Self::native() {
            bytes.reverse();
        }
        bytes
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Big => write!(f, "big-endian"),
            ByteOrder::Little => write!(f, "little-endian"),
        }
    }
}
