//! Yamaha 7-bit packing.
//!
//! The MIDI transport only carries bytes with the top bit clear, so bulk dumps move raw 8-bit
//! data in groups of 7 bytes, each preceded by a header byte that collects their top bits.
//!
//! ```text
//! raw:    r0 r1 r2 r3 r4 r5 r6
//! packed: H  r0' r1' r2' r3' r4' r5' r6'
//!
//! H bit 6 = r0 bit 7, ..., H bit 0 = r6 bit 7
//! rN'     = rN & 0x7F
//! ```

/// Raw bytes per group.
pub const GROUP_RAW: usize = 7;
/// Packed bytes per full group.
pub const GROUP_PACKED: usize = 8;

/// Number of packed bytes produced for `raw_len` raw bytes.
#[inline]
pub fn packed_len(raw_len: usize) -> usize {
    let full = raw_len / GROUP_RAW;
    let rest = raw_len % GROUP_RAW;
    full * GROUP_PACKED + if rest > 0 { rest + 1 } else { 0 }
}

/// Number of raw bytes recovered from `packed_len` packed bytes.
///
/// A trailing header byte with no data bytes after it contributes nothing.
#[inline]
pub fn unpacked_len(packed_len: usize) -> usize {
    let full = packed_len / GROUP_PACKED;
    let rest = packed_len % GROUP_PACKED;
    full * GROUP_RAW + rest.saturating_sub(1)
}

/// Pack raw 8-bit bytes into 7-bit clean bytes.
pub fn pack(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packed_len(raw.len()));
    for group in raw.chunks(GROUP_RAW) {
        let header = group
            .iter()
            .enumerate()
            .fold(0u8, |hdr, (j, &byte)| hdr | ((byte >> 7) << (6 - j)));
        out.push(header);
        out.extend(group.iter().map(|&byte| byte & 0x7F));
    }
    out
}

/// Unpack 7-bit clean bytes back into raw 8-bit bytes.
///
/// The top bit of every input byte is ignored, so arbitrary input never fails to unpack.
pub fn unpack(packed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(unpacked_len(packed.len()));
    for group in packed.chunks(GROUP_PACKED) {
        let (header, data) = match group.split_first() {
            Some(split) => split,
            None => continue,
        };
        out.extend(
            data.iter()
                .enumerate()
                .map(|(j, &byte)| (byte & 0x7F) | (((header >> (6 - j)) & 1) << 7)),
        );
    }
    out
}
