//! Inline phrase blocks of extended pattern files.
//!
//! ```text
//! +0   name (12 bytes)
//! +12  03 1C marker
//! +16  lowest note
//! +17  highest note
//! +24  tempo, BPM x10, big-endian
//! +26  F0 00
//! +28  event data, up to F2 or a run of padding
//! ```

use crate::{
    event::{self, MidiEvent, END, PADDING, PADDING_RUN},
    layout::{Field, Variant},
    pattern::{display_name, PatternFile},
    prelude::*,
};

const MARKER: [u8; 2] = [0x03, 0x1C];
const NAME_LEN: usize = 12;
const HEADER_LEN: usize = 28;

/// A phrase stored inline in an extended pattern file.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PhraseBlock {
    pub name: String,
    /// File offset of the block header.
    pub offset: usize,
    /// File offset of the event data.
    pub midi_offset: usize,
    pub tempo: Tempo,
    /// Lowest and highest note.
    pub note_range: (u8, u8),
    /// The raw event data, terminator excluded.
    pub data: Vec<u8>,
    pub events: Vec<MidiEvent>,
}

/// Find where event data starting at `start` ends: at an `F2` or at a run of padding.
fn phrase_end(raw: &[u8], start: usize) -> usize {
    (start..raw.len())
        .find(|&pos| {
            raw[pos] == END
                || raw[pos..]
                    .iter()
                    .take(PADDING_RUN)
                    .filter(|&&b| b == PADDING)
                    .count()
                    == PADDING_RUN
        })
        .unwrap_or(raw.len())
}

fn read_block(area: &[u8], pos: usize, base: usize) -> PhraseBlock {
    let header = &area[pos..pos + HEADER_LEN];
    let tempo = match u16::read_at(header, 24) {
        Some(0) | None => Tempo::DEFAULT,
        Some(tenths) => Tempo::from_tenths(tenths),
    };
    let start = pos + HEADER_LEN;
    let end = phrase_end(area, start);
    let data = area[start..end].to_vec();
    PhraseBlock {
        name: display_name(&header[..NAME_LEN]),
        offset: base + pos,
        midi_offset: base + start,
        tempo,
        note_range: (header[16], header[17]),
        events: event::parse(&data),
        data,
    }
}

/// Scan the inline phrase area of a pattern file.
///
/// Standard files keep their phrases elsewhere and yield no blocks.
pub fn parse_phrases(file: &PatternFile) -> Vec<PhraseBlock> {
    if file.variant() != Variant::Extended {
        return Vec::new();
    }
    let (area, base) = match (file.field(Field::PhraseArea), file.layout().region(Field::PhraseArea)) {
        (Some(area), Some(region)) => (area, region.offset),
        _ => return Vec::new(),
    };

    let mut phrases = Vec::new();
    let mut pos = 0;
    while pos + HEADER_LEN <= area.len() {
        let window = &area[pos..];
        if window[..NAME_LEN].iter().all(|&b| b == PADDING) {
            pos += 1;
        } else if window[NAME_LEN..NAME_LEN + 2] == MARKER {
            let block = read_block(area, pos, base);
            debug!(
                "phrase {:?} at 0x{:03X}, {} data byte(s)",
                block.name,
                block.offset,
                block.data.len()
            );
            pos = block.midi_offset - base + block.data.len() + 1;
            phrases.push(block);
        } else {
            pos += 1;
        }
    }
    phrases
}
