use crate::{layout::Field, sysex::Address};
use thiserror::Error;

/// Represents an error while decoding, encoding or converting QY data.
///
/// Errors are broadly categorized into 2 classes:
///
/// - Fatal errors, which prevent producing a well-formed output buffer (wrong file size,
///   missing message delimiters, an attempt to overwrite a preserve region).
/// - Recoverable anomalies ([`ChecksumMismatch`](#variant.ChecksumMismatch) and
///   [`UnknownOpcode`](#variant.UnknownOpcode)). These are not raised by default, but recorded
///   as warnings, unless the `strict` crate feature is enabled.
///
/// Use [`Error::is_fatal`](#method.is_fatal) to tell them apart.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Missing delimiter, truncated fixed fields or an oversized payload.
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),

    /// The message does not come from a Yamaha QY70.
    #[error("unsupported manufacturer 0x{manufacturer:02X} or model 0x{model:02X}")]
    UnsupportedManufacturerOrModel { manufacturer: u8, model: u8 },

    /// Pattern files are either 3072 or 5120 bytes long.
    #[error("invalid pattern file size: {0} bytes")]
    InvalidFileSize(usize),

    /// The pattern file does not start with the `YQ7PAT` magic.
    #[error("invalid pattern file header")]
    InvalidFileHeader,

    /// A bulk dump carried a checksum that does not match its contents.
    #[error("checksum mismatch at address {address}: expected 0x{expected:02X}, found 0x{found:02X}")]
    ChecksumMismatch {
        address: Address,
        expected: u8,
        found: u8,
    },

    /// An event byte that does not start any known event was skipped.
    #[error("unknown event opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    /// Attempt to write a region whose semantics are unknown.
    #[error("refusing to write preserve region {0:?}")]
    UnsafeFieldWrite(Field),

    /// The field is not part of this pattern file variant.
    #[error("field {0:?} is not present in this pattern file layout")]
    MissingField(Field),

    /// The write would spill outside the field.
    #[error("write to {field:?} at index {index} does not fit the field")]
    FieldOutOfRange { field: Field, index: usize },
}
impl Error {
    /// Whether this error prevents producing any output at all.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::ChecksumMismatch { .. } | Error::UnknownOpcode { .. }
        )
    }
}

macro_rules! err_malformed {
    ($msg:expr) => {
        $crate::error::Error::MalformedMessage($msg)
    };
}

/// The result type used by the converter.
pub type Result<T> = std::result::Result<T, Error>;
