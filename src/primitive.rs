//! Simple building-block data that can be read in one go.
//! All primitives have a known, fixed size.

use crate::prelude::*;

pub(crate) trait SplitChecked: Sized {
    fn split_checked(&mut self, at: usize) -> Option<Self>;
}
impl<'a> SplitChecked for &'a [u8] {
    #[inline]
    fn split_checked(&mut self, at: usize) -> Option<&'a [u8]> {
        if at > self.len() {
            None
        } else {
            let (extracted, remainder) = self.split_at(at);
            *self = remainder;
            Some(extracted)
        }
    }
}

/// Implemented on integer types for reading as big-endian.
pub(crate) trait IntRead: Sized {
    /// Reads a big-endian integer, advancing the slice.
    fn read(data: &mut &[u8]) -> Result<Self>;

    /// Reads a big-endian integer at a fixed offset, if it fits.
    fn read_at(data: &[u8], offset: usize) -> Option<Self> {
        let mut raw = data.get(offset..)?;
        Self::read(&mut raw).ok()
    }
}

/// Implement simple big endian integer reads.
macro_rules! impl_read_int {
    {$( $int:ty ),*} => {
        $(
            impl IntRead for $int {
                #[inline]
                fn read(raw: &mut &[u8]) -> Result<$int> {
                    let bytes = raw.split_checked(mem::size_of::<$int>())
                        .ok_or(err_malformed!("failed to read the expected integer"))?;
                    Ok(bytes.iter().fold(0, |acc: $int, byte| {
                        acc.checked_shl(8).unwrap_or(0) | *byte as $int
                    }))
                }
            }
        )*
    }
}
impl_read_int! {u8,u16}

/// Slightly restricted integers.
macro_rules! restricted_int {
    {$(#[$attr:meta])* $name:ident : $inner:tt => $bits:expr} => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
        #[repr(transparent)]
        #[allow(non_camel_case_types)]
        pub struct $name($inner);
        impl From<$inner> for $name {
            /// Lossy conversion, loses the top bits.
            #[inline]
            fn from(raw: $inner) -> $name {
                $name::new(raw)
            }
        }
        impl From<$name> for $inner {
            #[inline]
            fn from(restricted: $name) -> $inner {restricted.0}
        }
        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
        impl $name {
            const MASK: $inner = (1 << $bits) - 1;

            /// The maximum value that this restricted integer can hold.
            #[inline]
            pub const fn max_value() -> $name {
                $name (Self::MASK)
            }

            /// Creates a restricted int from its non-restricted counterpart by masking off the
            /// extra bits.
            #[inline]
            pub const fn new(raw: $inner) -> $name {
                $name (raw & Self::MASK)
            }

            /// Returns `Some` if the raw integer is within range of the restricted integer, and
            /// `None` otherwise.
            #[inline]
            pub fn try_from(raw: $inner) -> Option<$name> {
                if raw <= Self::MASK {
                    Some($name(raw))
                } else {
                    None
                }
            }

            /// Get the inner integer out of the wrapper.
            /// The inner integer is guaranteed to be in range of the restricted wrapper.
            #[inline]
            pub const fn as_int(self) -> $inner {
                self.0
            }
        }
        impl PartialEq<$inner> for $name {
            fn eq(&self, rhs: &$inner) -> bool {
                self.as_int() == *rhs
            }
        }
        impl PartialEq<$name> for $inner {
            fn eq(&self, rhs: &$name) -> bool {
                *self == rhs.as_int()
            }
        }
    };
}
restricted_int! {
    /// A 4-bit integer, used for device numbers.
    u4: u8 => 4
}
restricted_int! {
    /// A 7-bit integer, the payload of every SysEx data byte.
    u7: u8 => 7
}
restricted_int! {
    /// A 14-bit integer, transmitted as two 7-bit halves.
    u14: u16 => 14
}
impl u14 {
    /// Join a most-significant and least-significant 7-bit pair.
    #[inline]
    pub fn from_halves(hi: u7, lo: u7) -> u14 {
        u14::new((hi.as_int() as u16) << 7 | lo.as_int() as u16)
    }

    /// Split into the `(high, low)` 7-bit halves.
    #[inline]
    pub fn halves(self) -> (u7, u7) {
        (u7::new((self.0 >> 7) as u8), u7::new(self.0 as u8))
    }
}

/// A pattern tempo, stored as beats per minute times ten.
///
/// Pattern files store this value as a big-endian 16-bit word, so that `0x04B0` is 120 BPM.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Tempo(u16);
impl Tempo {
    /// The tempo assumed whenever a stored value is missing or zero.
    pub const DEFAULT: Tempo = Tempo(1200);

    /// Create a tempo from its raw tenths-of-BPM representation.
    #[inline]
    pub const fn from_tenths(tenths: u16) -> Tempo {
        Tempo(tenths)
    }

    /// Create a tempo from whole beats per minute.
    #[inline]
    pub fn from_bpm(bpm: u16) -> Tempo {
        Tempo(bpm.saturating_mul(10))
    }

    /// The raw stored value.
    #[inline]
    pub const fn tenths(self) -> u16 {
        self.0
    }

    /// Whole beats per minute, truncating any fractional part.
    #[inline]
    pub const fn bpm(self) -> u16 {
        self.0 / 10
    }

    /// Read a big-endian tempo word.
    pub(crate) fn read(raw: &mut &[u8]) -> Result<Tempo> {
        Ok(Tempo(u16::read(raw)?))
    }

    pub(crate) fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}
impl Default for Tempo {
    fn default() -> Tempo {
        Tempo::DEFAULT
    }
}
impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{} bpm", self.0 / 10, self.0 % 10)
    }
}
