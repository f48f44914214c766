//! # Overview
//!
//! `qypattern` converts pattern data between the two binary formats used by the Yamaha QY
//! sequencers: the QY70 style bulk dump (a stream of SysEx messages) and the QY700 `.Q7P`
//! pattern file.
//!
//! Both directions are plain functions over in-memory buffers:
//!
//! ```rust
//! use qypattern::{file_to_wire, wire_to_file, DEFAULT_TEMPLATE};
//!
//! // Send the built-in pattern over the wire...
//! let wire = file_to_wire(DEFAULT_TEMPLATE, 0).unwrap();
//!
//! // ...and rebuild a pattern file from the dump.
//! let file = wire_to_file(&wire, None).unwrap();
//! assert_eq!(file.len(), 3072);
//! ```
//!
//! # About the pattern file
//!
//! Only part of the `.Q7P` format is understood. The [`PatternFile`](struct.PatternFile.html)
//! type describes every byte region through a static [`Layout`](layout/struct.Layout.html) table
//! and marks each region as safe, provisional or preserve. Conversions never synthesize a
//! pattern file from scratch: they start from a known-good template and only overwrite the safe
//! (and, optionally, provisional) regions.
//!
//! # About SysEx
//!
//! The QY70 transmits styles as 7-bit packed bulk dumps addressed by section and track.
//! The building blocks are available separately: [`bitpack`](bitpack/index.html) for the
//! packing scheme, [`checksum`](checksum/index.html), the [`Framer`](struct.Framer.html) for
//! splitting a raw stream and [`WireMessage`](enum.WireMessage.html) for individual messages.
//!
//! # About features
//!
//! - The `strict` feature
//!
//!   By default conversions plow through bad checksums, unknown event opcodes and foreign
//!   messages, recording them as warnings in the resulting
//!   [`Conversion`](struct.Conversion.html).
//!   With the `strict` feature enabled the first such anomaly fails the conversion instead.

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// All of the errors this crate produces.
#[macro_use]
mod error;

mod prelude {
    pub(crate) use crate::{
        error::{Error, Result},
        primitive::{u14, u4, u7, IntRead, SplitChecked, Tempo},
    };
    pub(crate) use std::{fmt, mem, ops};
    pub(crate) use tracing::{debug, trace, warn};
}

pub mod bitpack;
pub mod checksum;
mod convert;
mod event;
pub mod layout;
mod pattern;
mod phrase;
mod primitive;
mod stream;
pub mod style;
mod sysex;
mod template;

pub use crate::{
    checksum::ChecksumSpan,
    convert::{file_to_wire, wire_to_file, Conversion, ConvertOptions, Converter, WireEmitter},
    error::{Error, Result},
    event::{parse, parse_segments, unknown_opcodes, write_segments, EventIter, MidiEvent, Segment},
    layout::{Field, Layout, Mutability, Variant},
    pattern::{normalize_name, FieldWrite, PatternFile, SectionRecord, TrackRecord},
    phrase::{parse_phrases, PhraseBlock},
    primitive::Tempo,
    stream::{frame, Framer},
    sysex::{
        close_message, dump_request, init_message, parameter_change, Address, BulkDump,
        MessageKind, ParameterChange, WireMessage, MAX_PAYLOAD, QY70_MODEL_ID, YAMAHA_ID,
    },
    template::{default_template, DEFAULT_TEMPLATE},
};

/// Exotically-sized integers used by the MIDI standard.
pub mod num {
    pub use crate::primitive::{u14, u4, u7};
}

#[cfg(test)]
mod test;
