//! The QY70 style data carried by bulk dumps.
//!
//! A style is sent as one data block per non-empty track, addressed by section and track, plus
//! a 640-byte style header at `AL = 0x7F`.

use crate::prelude::*;

/// Length of the header at the start of every track block.
pub const TRACK_HEADER_LEN: usize = 24;
/// Track blocks are at least this long.
pub const TRACK_BLOCK_LEN: usize = 128;
/// Length of the style header.
pub const STYLE_HEADER_LEN: usize = 640;

const TRACK_PREFIX: [u8; 14] = [
    0x08, 0x04, 0x82, 0x01, 0x00, 0x40, 0x20, 0x08, 0x04, 0x82, 0x01, 0x00, 0x06, 0x1C,
];
/// Voice bytes meaning "drum kit".
pub const DRUM_VOICE: [u8; 2] = [0x40, 0x80];
/// Voice bytes meaning "bass, voice in the block body".
pub const BASS_VOICE: [u8; 2] = [0x00, 0x04];
/// Filler data of a track without phrase data.
const EMPTY_TRACK_BODY: [u8; 8] = [0x1F, 0xA3, 0x60, 0x00, 0xDF, 0x77, 0xC0, 0x8F];

const FILL: [u8; 7] = [0xBF, 0xDF, 0xEF, 0xF7, 0xFB, 0xFD, 0xFE];
const FILL_RANGES: [(usize, usize); 3] = [(0x00F, 0x080), (0x137, 0x1B9), (0x1B9, 0x21C)];
const HEADER_MARKER_AT: usize = 0x080;
const HEADER_MARKER: [u8; 5] = [0x03, 0x01, 0x40, 0x60, 0x30];
/// Where the style name is kept inside the header.
pub const NAME_SLOT: usize = 0x085;
/// Length of the style name.
pub const NAME_LEN: usize = 10;

/// Tempo ranges tried by the encoder, in order of preference.
const TEMPO_RANGES: [u8; 4] = [2, 3, 1, 4];
const TEMPO_STEP: i32 = 95;
const TEMPO_BIAS: i32 = 133;

/// The part a track plays, decided by its position within the section.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TrackRole {
    Drum,
    Bass,
    Melody,
}
impl TrackRole {
    /// Tracks 1 and 2 are rhythm tracks, track 3 is the bass.
    pub fn of_track(track: usize) -> TrackRole {
        match track {
            0 | 1 => TrackRole::Drum,
            2 => TrackRole::Bass,
            _ => TrackRole::Melody,
        }
    }

    fn signature(self) -> [u8; 5] {
        match self {
            TrackRole::Drum => [0x87, 0xF8, 0x80, 0x8E, 0x83],
            TrackRole::Bass => [0x07, 0x78, 0x00, 0x07, 0x12],
            TrackRole::Melody => [0x07, 0x78, 0x00, 0x0F, 0x10],
        }
    }
}

/// The 24-byte header at the start of a track block.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct TrackHeader {
    pub role: TrackRole,
    /// Bytes 14 and 15.
    pub voice: [u8; 2],
}
impl TrackHeader {
    /// Build the header of a track, given the voice stored for it in a pattern file.
    pub fn new(track: usize, bank_msb: u7, program: u7) -> TrackHeader {
        let role = TrackRole::of_track(track);
        let voice = match role {
            TrackRole::Drum => DRUM_VOICE,
            TrackRole::Bass => BASS_VOICE,
            TrackRole::Melody if bank_msb.as_int() == 0 && program.as_int() == 0 => DRUM_VOICE,
            TrackRole::Melody => [bank_msb.as_int(), program.as_int()],
        };
        TrackHeader { role, voice }
    }

    /// Encode the header. Bytes 21 to 23 are left at zero.
    pub fn to_bytes(&self) -> [u8; TRACK_HEADER_LEN] {
        let mut out = [0; TRACK_HEADER_LEN];
        out[..14].copy_from_slice(&TRACK_PREFIX);
        out[14..16].copy_from_slice(&self.voice);
        out[16..21].copy_from_slice(&self.role.signature());
        out
    }

    /// Assemble a full track block out of this header and the phrase event data.
    ///
    /// Blocks are padded with zeros up to 128 bytes.
    /// Tracks without event data get a fixed filler body.
    pub fn track_data(&self, phrase: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(TRACK_BLOCK_LEN.max(TRACK_HEADER_LEN + phrase.len()));
        out.extend_from_slice(&self.to_bytes());
        if phrase.is_empty() {
            out.extend_from_slice(&EMPTY_TRACK_BODY);
        } else {
            out.extend_from_slice(phrase);
        }
        if out.len() < TRACK_BLOCK_LEN {
            out.resize(TRACK_BLOCK_LEN, 0);
        }
        out
    }
}

/// Voice settings recovered from the header of a received track block.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TrackVoice {
    /// A drum kit.
    Drum,
    /// A bass voice, with the bank LSB if the block carried it.
    Bass { bank_lsb: Option<u7> },
    /// A regular voice.
    Voice { bank_msb: u7, program: u7 },
}
impl TrackVoice {
    /// Read the voice out of a track block. Blocks shorter than 16 bytes carry no voice.
    pub fn read(block: &[u8]) -> Option<TrackVoice> {
        let voice = block.get(14..16)?;
        Some(match [voice[0], voice[1]] {
            DRUM_VOICE => TrackVoice::Drum,
            BASS_VOICE => TrackVoice::Bass {
                bank_lsb: block.get(26).map(|&b| u7::new(b)),
            },
            [msb, program] => TrackVoice::Voice {
                bank_msb: u7::new(msb),
                program: u7::new(program),
            },
        })
    }
}

/// The pan value a track block carries, if it has a pan flag set.
pub fn track_pan(block: &[u8]) -> Option<u7> {
    match block.get(21..23) {
        Some(&[0x41, pan]) => Some(u7::new(pan)),
        _ => None,
    }
}

/// Split a tempo into the `(range, offset)` pair stored in the style header.
///
/// A tempo is `range * 95 - 133 + offset`.
/// Ranges are tried in order of preference, keeping offsets at 94 or less when possible.
pub fn encode_tempo(bpm: u16) -> (u8, u8) {
    let bpm = bpm as i32;
    let offset_in = |range: u8, max: i32| {
        let off = bpm - (range as i32 * TEMPO_STEP - TEMPO_BIAS);
        if (0..=max).contains(&off) {
            Some((range, off as u8))
        } else {
            None
        }
    };
    TEMPO_RANGES
        .iter()
        .find_map(|&range| offset_in(range, 94))
        .or_else(|| TEMPO_RANGES.iter().rev().find_map(|&range| offset_in(range, 127)))
        .unwrap_or((2, 0))
}

/// The 640-byte style header.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StyleHeader {
    pub bytes: Vec<u8>,
}
impl StyleHeader {
    /// Build a header carrying a tempo and a name.
    pub fn new(tempo: Tempo, name: &str) -> StyleHeader {
        let mut bytes = vec![0; STYLE_HEADER_LEN];
        for &(start, end) in FILL_RANGES.iter() {
            for (i, byte) in bytes[start..end].iter_mut().enumerate() {
                *byte = FILL[i % FILL.len()];
            }
        }
        bytes[HEADER_MARKER_AT..HEADER_MARKER_AT + HEADER_MARKER.len()]
            .copy_from_slice(&HEADER_MARKER);
        let name = crate::pattern::normalize_name(name, NAME_LEN);
        bytes[NAME_SLOT..NAME_SLOT + NAME_LEN].copy_from_slice(&name);

        let (range, offset) = encode_tempo(tempo.bpm());
        bytes[0] = offset;
        //Range bits 2, 1, 0 ride in the top bits of bytes 4, 5, 6
        for (bit, byte) in bytes[4..7].iter_mut().enumerate() {
            if range & (0b100 >> bit) != 0 {
                *byte |= 0x80;
            }
        }
        StyleHeader { bytes }
    }

    /// Wrap received header bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> StyleHeader {
        StyleHeader { bytes }
    }

    /// The tempo in whole BPM, if the header is long enough to carry one.
    ///
    /// The range is the packing header of the first 7 bytes, so stray top bits in bytes 0 to 3
    /// push it past 7 and the result far outside any usable tempo.
    pub fn tempo_bpm(&self) -> Option<i32> {
        let head = self.bytes.get(..7)?;
        let range = head
            .iter()
            .fold(0, |acc, &b| (acc << 1) | (b >> 7) as i32);
        Some(range * TEMPO_STEP - TEMPO_BIAS + (head[0] & 0x7F) as i32)
    }

    /// The name, only if every byte of the name slot is printable ASCII.
    pub fn name(&self) -> Option<String> {
        let slot = self.bytes.get(NAME_SLOT..NAME_SLOT + NAME_LEN)?;
        if slot.iter().all(|b| (0x20..=0x7E).contains(b)) {
            Some(String::from_utf8_lossy(slot).trim_end().to_string())
        } else {
            None
        }
    }
}
