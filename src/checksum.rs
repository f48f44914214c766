//! The Yamaha 7-bit checksum.
//!
//! The checksum byte is chosen so that the low 7 bits of the sum of every checksummed byte plus
//! the checksum itself are zero.
//! Which bytes are checksummed is up to the caller, see [`ChecksumSpan`](enum.ChecksumSpan.html).

use crate::prelude::*;

/// Compute the checksum over exactly `bytes`.
#[inline]
pub fn checksum(bytes: &[u8]) -> u7 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) & 0x7F;
    u7::new(128u8.wrapping_sub(sum))
}

/// Recompute the checksum over `bytes` and compare it against `expected`.
///
/// Two different inputs whose sums are congruent modulo 128 share a checksum, so a corrupted
/// span can still verify.
#[inline]
pub fn verify(bytes: &[u8], expected: u7) -> bool {
    checksum(bytes) == expected
}

/// The span of a bulk dump covered by its checksum.
///
/// The body of a bulk dump is `BH BL AH AM AL payload`.
/// Dumps captured from a QY70 verify with the byte count included, so that is the default.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ChecksumSpan {
    /// `BH BL AH AM AL payload`.
    CountAddressPayload,
    /// `AH AM AL payload`, skipping the byte count.
    AddressPayload,
}
impl ChecksumSpan {
    /// Select the checksummed bytes out of a bulk dump body starting at `BH`.
    #[inline]
    pub fn select<'a>(self, body: &'a [u8]) -> &'a [u8] {
        match self {
            ChecksumSpan::CountAddressPayload => body,
            ChecksumSpan::AddressPayload => body.get(2..).unwrap_or(&[]),
        }
    }
}
impl Default for ChecksumSpan {
    fn default() -> ChecksumSpan {
        ChecksumSpan::CountAddressPayload
    }
}
