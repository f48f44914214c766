//! The event byte-code embedded in QY phrase data.
//!
//! Only part of the byte-code is understood.
//! Recognized events are decoded into [`MidiEvent`](enum.MidiEvent.html)s, everything else is
//! kept as opaque byte spans so it can be passed through untouched.

use crate::prelude::*;

/// Padding byte used to fill phrase areas.
pub const PADDING: u8 = 0x40;
/// A run of this many padding bytes ends an event stream.
pub const PADDING_RUN: usize = 4;
/// The end-of-phrase opcode.
pub const END: u8 = 0xF2;

/// A decoded phrase event.
///
/// Operand bytes are kept exactly as stored, so that writing an event reproduces its bytes.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MidiEvent {
    /// `D0 note velocity gate`.
    DrumNote { note: u8, velocity: u8, gate: u8 },
    /// `E0 note velocity param`.
    MelodyNote { note: u8, velocity: u8, param: u8 },
    /// `C1 note param`.
    AltNote { note: u8, param: u8 },
    /// `A0..=A7 value`, the low 3 bits of the opcode select the step.
    DeltaTime { step: u8, value: u8 },
    /// `BE param`.
    NoteOff { param: u8 },
    /// `BC param`.
    Control { param: u8 },
    /// `F2`, the end of the phrase.
    End,
}
impl MidiEvent {
    /// Event length in bytes, opcode included, for a given opcode.
    /// Returns `None` for unknown opcodes.
    fn len_for(opcode: u8) -> Option<usize> {
        Some(match opcode {
            0xD0 | 0xE0 => 4,
            0xC1 => 3,
            0xA0..=0xA7 | 0xBE | 0xBC => 2,
            END => 1,
            _ => return None,
        })
    }

    /// Decode one event from exactly its bytes.
    fn read(bytes: &[u8]) -> Option<MidiEvent> {
        Some(match *bytes {
            [0xD0, note, velocity, gate] => MidiEvent::DrumNote {
                note,
                velocity,
                gate,
            },
            [0xE0, note, velocity, param] => MidiEvent::MelodyNote {
                note,
                velocity,
                param,
            },
            [0xC1, note, param] => MidiEvent::AltNote { note, param },
            [op @ 0xA0..=0xA7, value] => MidiEvent::DeltaTime {
                step: op - 0xA0,
                value,
            },
            [0xBE, param] => MidiEvent::NoteOff { param },
            [0xBC, param] => MidiEvent::Control { param },
            [END] => MidiEvent::End,
            _ => return None,
        })
    }

    /// Length of the encoded event, opcode included.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            MidiEvent::DrumNote { .. } | MidiEvent::MelodyNote { .. } => 4,
            MidiEvent::AltNote { .. } => 3,
            MidiEvent::DeltaTime { .. } | MidiEvent::NoteOff { .. } | MidiEvent::Control { .. } => 2,
            MidiEvent::End => 1,
        }
    }

    /// Encode this event, appending it to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        match *self {
            MidiEvent::DrumNote {
                note,
                velocity,
                gate,
            } => out.extend_from_slice(&[0xD0, note, velocity, gate]),
            MidiEvent::MelodyNote {
                note,
                velocity,
                param,
            } => out.extend_from_slice(&[0xE0, note, velocity, param]),
            MidiEvent::AltNote { note, param } => out.extend_from_slice(&[0xC1, note, param]),
            MidiEvent::DeltaTime { step, value } => {
                out.extend_from_slice(&[0xA0 | (step & 0x07), value])
            }
            MidiEvent::NoteOff { param } => out.extend_from_slice(&[0xBE, param]),
            MidiEvent::Control { param } => out.extend_from_slice(&[0xBC, param]),
            MidiEvent::End => out.push(END),
        }
    }
}

/// A piece of an event stream.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Segment<'a> {
    /// A recognized event along with its source bytes.
    Event { bytes: &'a [u8], event: MidiEvent },
    /// Bytes that could not be decoded: unknown opcodes, or a truncated trailing event.
    Opaque(&'a [u8]),
}
impl<'a> Segment<'a> {
    /// The source bytes of this segment.
    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        match *self {
            Segment::Event { bytes, .. } => bytes,
            Segment::Opaque(bytes) => bytes,
        }
    }
}

/// Iterates over the segments of an event stream.
///
/// Iteration stops right after an `End` event, at a run of 4 padding bytes (which is not
/// consumed) or when the input runs out.
/// Consecutive unknown bytes are merged into a single opaque segment.
#[derive(Clone, Debug)]
pub struct EventIter<'a> {
    raw: &'a [u8],
    consumed: usize,
    done: bool,
}
impl<'a> EventIter<'a> {
    #[inline]
    pub fn new(raw: &'a [u8]) -> EventIter<'a> {
        EventIter {
            raw,
            consumed: 0,
            done: false,
        }
    }

    /// How many bytes have been read so far.
    #[inline]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// The bytes not read yet.
    #[inline]
    pub fn unread(&self) -> &'a [u8] {
        self.raw
    }

    fn at_padding_run(raw: &[u8]) -> bool {
        raw.len() >= PADDING_RUN && raw[..PADDING_RUN].iter().all(|&b| b == PADDING)
    }

    fn is_event_start(raw: &[u8]) -> bool {
        MidiEvent::len_for(raw[0]).is_some() || Self::at_padding_run(raw)
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let (head, tail) = self.raw.split_at(len);
        self.raw = tail;
        self.consumed += len;
        head
    }
}
impl<'a> Iterator for EventIter<'a> {
    type Item = Segment<'a>;
    fn next(&mut self) -> Option<Segment<'a>> {
        if self.done || self.raw.is_empty() || Self::at_padding_run(self.raw) {
            self.done = true;
            return None;
        }
        match MidiEvent::len_for(self.raw[0]) {
            Some(len) if len <= self.raw.len() => {
                let bytes = self.take(len);
                match MidiEvent::read(bytes) {
                    Some(event) => {
                        if event == MidiEvent::End {
                            self.done = true;
                        }
                        Some(Segment::Event { bytes, event })
                    }
                    None => Some(Segment::Opaque(bytes)),
                }
            }
            Some(_) => {
                //Truncated event
                self.done = true;
                let len = self.raw.len();
                Some(Segment::Opaque(self.take(len)))
            }
            None => {
                let len = (1..self.raw.len())
                    .find(|&i| Self::is_event_start(&self.raw[i..]))
                    .unwrap_or(self.raw.len());
                Some(Segment::Opaque(self.take(len)))
            }
        }
    }
}

/// Decode the recognized events of a stream, dropping unknown bytes.
pub fn parse(raw: &[u8]) -> Vec<MidiEvent> {
    let mut offset = 0;
    let mut events = Vec::new();
    for segment in EventIter::new(raw) {
        match segment {
            Segment::Event { event, .. } => {
                trace!("event {:?} at offset {}", event, offset);
                events.push(event);
            }
            Segment::Opaque(bytes) => {
                debug!("skipping {} unknown byte(s) at offset {}", bytes.len(), offset)
            }
        }
        offset += segment.bytes().len();
    }
    events
}

/// Split a stream into segments, keeping unknown bytes.
pub fn parse_segments(raw: &[u8]) -> Vec<Segment<'_>> {
    EventIter::new(raw).collect()
}

/// Write segments back out verbatim.
pub fn write_segments(segments: &[Segment], out: &mut Vec<u8>) {
    for segment in segments {
        out.extend_from_slice(segment.bytes());
    }
}

/// The recoverable errors describing the unknown bytes of a stream, one per run of unknown
/// bytes, reported at its first byte.
///
/// A truncated trailing event is not an unknown opcode and is not reported.
pub fn unknown_opcodes(raw: &[u8]) -> Vec<Error> {
    let mut offset = 0;
    let mut errors = Vec::new();
    for segment in EventIter::new(raw) {
        let bytes = segment.bytes();
        if let Segment::Opaque(_) = segment {
            if MidiEvent::len_for(bytes[0]).is_none() {
                errors.push(Error::UnknownOpcode {
                    opcode: bytes[0],
                    offset,
                });
            }
        }
        offset += bytes.len();
    }
    errors
}
