//! Splitting raw MIDI byte streams into SysEx messages.

use crate::prelude::*;

/// Start of a system-exclusive message.
pub const SYSEX_START: u8 = 0xF0;
/// End of a system-exclusive message.
pub const SYSEX_END: u8 = 0xF7;

/// Iterates over the `F0 ... F7` runs of a raw byte stream, in order.
///
/// Bytes outside any run are junk and skipped.
/// When a new `F0` shows up before the current run is closed, the open run is discarded and
/// framing restarts at the new `F0`.
/// A run that is still open when the stream ends is never yielded, but it can be inspected
/// through [`unterminated`](#method.unterminated) once iteration finishes.
#[derive(Clone, Debug)]
pub struct Framer<'a> {
    raw: &'a [u8],
    unterminated: Option<&'a [u8]>,
}
impl<'a> Framer<'a> {
    /// Create a framer over a raw stream.
    #[inline]
    pub fn new(raw: &'a [u8]) -> Framer<'a> {
        Framer {
            raw,
            unterminated: None,
        }
    }

    /// The trailing run left open at the end of the stream, if the framer has reached it.
    #[inline]
    pub fn unterminated(&self) -> Option<&'a [u8]> {
        self.unterminated
    }

    /// The bytes not yet scanned.
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        self.raw
    }
}
impl<'a> Iterator for Framer<'a> {
    type Item = &'a [u8];
    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            let start = match self.raw.iter().position(|&b| b == SYSEX_START) {
                Some(start) => start,
                None => {
                    self.raw = &[];
                    return None;
                }
            };
            let run = &self.raw[start..];
            match run[1..]
                .iter()
                .position(|&b| b == SYSEX_START || b == SYSEX_END)
            {
                Some(len) if run[1 + len] == SYSEX_END => {
                    let (msg, rest) = run.split_at(len + 2);
                    self.raw = rest;
                    return Some(msg);
                }
                Some(len) => {
                    //Restart at the interrupting start byte
                    trace!("discarding {} byte(s) of an interrupted message", len + 1);
                    self.raw = &run[1 + len..];
                }
                None => {
                    self.unterminated = Some(run);
                    self.raw = &[];
                    return None;
                }
            }
        }
    }
}

/// Collect every complete message of a stream.
///
/// An unterminated trailing run is silently dropped; use [`Framer`](struct.Framer.html)
/// directly to detect it.
pub fn frame(raw: &[u8]) -> Vec<&[u8]> {
    Framer::new(raw).collect()
}
