//! QY70 system-exclusive messages.

use crate::{
    bitpack,
    checksum::{checksum, ChecksumSpan},
    prelude::*,
    stream::{SYSEX_END, SYSEX_START},
};

/// The Yamaha manufacturer id.
pub const YAMAHA_ID: u8 = 0x43;
/// The QY70 model id.
pub const QY70_MODEL_ID: u8 = 0x5F;
/// Largest raw payload carried by a single bulk dump.
///
/// 128 raw bytes pack into 147 wire bytes.
pub const MAX_PAYLOAD: usize = 128;

/// A three-byte memory address, as carried by bulk dumps, parameter changes and dump requests.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
pub struct Address {
    pub high: u7,
    pub mid: u7,
    pub low: u7,
}
impl Address {
    /// `AH` of the user style area.
    pub const STYLE_HIGH: u8 = 0x02;
    /// `AM` of the user style area.
    pub const STYLE_MID: u8 = 0x7E;
    /// `AL` of the style header.
    pub const HEADER_LOW: u8 = 0x7F;
    /// Number of tracks per section in track addresses.
    pub const TRACKS_PER_SECTION: u8 = 8;

    /// Build an address out of raw bytes, masking off the top bits.
    #[inline]
    pub const fn new(high: u8, mid: u8, low: u8) -> Address {
        Address {
            high: u7::new(high),
            mid: u7::new(mid),
            low: u7::new(low),
        }
    }

    /// The address of the style header dump.
    #[inline]
    pub const fn style_header() -> Address {
        Address::new(Self::STYLE_HIGH, Self::STYLE_MID, Self::HEADER_LOW)
    }

    /// The address of a track dump, `AL = section * 8 + track`.
    ///
    /// `AL` keeps only 7 bits, out-of-range slots wrap around.
    #[inline]
    pub fn style_track(section: u8, track: u8) -> Address {
        Address::new(
            Self::STYLE_HIGH,
            Self::STYLE_MID,
            section
                .wrapping_mul(Self::TRACKS_PER_SECTION)
                .wrapping_add(track),
        )
    }

    /// Whether the address points into the user style area.
    #[inline]
    pub fn is_style(&self) -> bool {
        self.high == Self::STYLE_HIGH && self.mid == Self::STYLE_MID
    }

    /// The `(section, track)` pair of a style track address.
    #[inline]
    pub fn track_slot(&self) -> Option<(u8, u8)> {
        let low = self.low.as_int();
        if self.is_style() && low < Self::HEADER_LOW {
            Some((low / Self::TRACKS_PER_SECTION, low % Self::TRACKS_PER_SECTION))
        } else {
            None
        }
    }

    /// The `AH AM AL` bytes, as sent on the wire.
    #[inline]
    pub fn as_bytes(&self) -> [u8; 3] {
        [self.high.as_int(), self.mid.as_int(), self.low.as_int()]
    }

    fn read(raw: &mut &[u8]) -> Result<Address> {
        let bytes = raw
            .split_checked(3)
            .ok_or(err_malformed!("truncated address"))?;
        Ok(Address::new(bytes[0], bytes[1], bytes[2]))
    }
}
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X}",
            self.high.as_int(),
            self.mid.as_int(),
            self.low.as_int()
        )
    }
}

/// The type of a QY70 message, from the high nibble of its device byte.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MessageKind {
    BulkDump,
    ParameterChange,
    DumpRequest,
    Unknown,
}
impl MessageKind {
    fn from_device_byte(byte: u8) -> MessageKind {
        match byte >> 4 {
            0x0 => MessageKind::BulkDump,
            0x1 => MessageKind::ParameterChange,
            0x2 => MessageKind::DumpRequest,
            _ => MessageKind::Unknown,
        }
    }

    /// The shortest well-formed message of this kind, delimiters included.
    pub fn min_len(self) -> usize {
        match self {
            MessageKind::BulkDump => 11,
            MessageKind::ParameterChange | MessageKind::DumpRequest => 8,
            MessageKind::Unknown => 5,
        }
    }

    /// Classify a raw message without decoding it.
    ///
    /// Anything that is not a QY70 message, or that is too short for the kind its device byte
    /// announces, is `Unknown`.
    pub fn classify(raw: &[u8]) -> MessageKind {
        if raw.len() < MessageKind::Unknown.min_len()
            || raw[0] != SYSEX_START
            || raw[1] != YAMAHA_ID
            || raw[3] != QY70_MODEL_ID
        {
            return MessageKind::Unknown;
        }
        let kind = MessageKind::from_device_byte(raw[2]);
        if raw.len() < kind.min_len() {
            MessageKind::Unknown
        } else {
            kind
        }
    }
}

/// A decoded bulk dump.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BulkDump {
    /// The device number, the low nibble of the device byte.
    pub device: u4,
    /// The packed payload length announced by the `BH BL` bytes.
    pub byte_count: u14,
    pub address: Address,
    /// The unpacked, raw 8-bit payload.
    pub payload: Vec<u8>,
    /// The checksum byte as received.
    pub checksum: u8,
    /// The checksum computed over the received span.
    pub expected_checksum: u7,
}
impl BulkDump {
    /// Whether the received checksum matched.
    #[inline]
    pub fn checksum_ok(&self) -> bool {
        self.expected_checksum == self.checksum
    }

    /// The recoverable error describing a checksum mismatch, if there is one.
    pub fn checksum_error(&self) -> Option<Error> {
        if self.checksum_ok() {
            None
        } else {
            Some(Error::ChecksumMismatch {
                address: self.address,
                expected: self.expected_checksum.as_int(),
                found: self.checksum,
            })
        }
    }

    /// Decode a complete `F0 ... F7` bulk dump.
    ///
    /// A checksum mismatch does not fail decoding, it is recorded in the returned dump instead.
    fn read(raw: &[u8], span: ChecksumSpan) -> Result<BulkDump> {
        ensure!(
            raw.len() >= MessageKind::BulkDump.min_len(),
            err_malformed!("truncated bulk dump")
        );
        let device = u4::new(raw[2]);
        //BH BL AH AM AL payload
        let body = &raw[4..raw.len() - 2];
        let found = raw[raw.len() - 2];

        let mut cursor = body;
        let count = cursor
            .split_checked(2)
            .ok_or(err_malformed!("truncated byte count"))?;
        let byte_count = u14::from_halves(u7::new(count[0]), u7::new(count[1]));
        let address = Address::read(&mut cursor)?;
        let packed = cursor;
        if byte_count.as_int() as usize != packed.len() {
            warn!(
                "bulk dump at {} announces {} bytes but carries {}",
                address,
                byte_count,
                packed.len()
            );
        }

        let expected_checksum = checksum(span.select(body));
        let dump = BulkDump {
            device,
            byte_count,
            address,
            payload: bitpack::unpack(packed),
            checksum: found,
            expected_checksum,
        };
        if !dump.checksum_ok() {
            warn!(
                "checksum mismatch at {}: expected 0x{:02X}, found 0x{:02X}",
                address,
                expected_checksum.as_int(),
                found
            );
        }
        Ok(dump)
    }

    /// Build a complete wire message out of a raw payload.
    ///
    /// The payload is packed, the byte count is set to the packed length and the checksum is
    /// computed over the given span.
    pub fn encode(
        device: u4,
        address: Address,
        payload: &[u8],
        span: ChecksumSpan,
    ) -> Result<Vec<u8>> {
        ensure!(
            payload.len() <= MAX_PAYLOAD,
            err_malformed!("bulk dump payload too large")
        );
        let packed = bitpack::pack(payload);
        let (bh, bl) = u14::new(packed.len() as u16).halves();
        let mut out = Vec::with_capacity(packed.len() + MessageKind::BulkDump.min_len());
        out.extend_from_slice(&[
            SYSEX_START,
            YAMAHA_ID,
            device.as_int(),
            QY70_MODEL_ID,
            bh.as_int(),
            bl.as_int(),
        ]);
        out.extend_from_slice(&address.as_bytes());
        out.extend_from_slice(&packed);
        let cs = checksum(span.select(&out[4..]));
        out.push(cs.as_int());
        out.push(SYSEX_END);
        Ok(out)
    }
}

/// The meaning of a parameter change message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ParameterChange {
    /// Opens a bulk transfer, `00 00 00 01`.
    Init,
    /// Closes a bulk transfer, `00 00 00 00`.
    Close,
    /// Any other parameter.
    Other { address: Address, data: Vec<u7> },
}

/// A single QY70 message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum WireMessage {
    BulkDump(BulkDump),
    ParameterChange { device: u4, change: ParameterChange },
    DumpRequest { device: u4, address: Address },
    /// A QY70 message of an unrecognized type, kept verbatim.
    Unknown { device: u4, raw: Vec<u8> },
}
impl WireMessage {
    /// Decode a single `F0 ... F7` message.
    ///
    /// Fails with `UnsupportedManufacturerOrModel` for messages meant for other devices and
    /// with `MalformedMessage` for missing delimiters or truncated fixed fields.
    pub fn parse(raw: &[u8], span: ChecksumSpan) -> Result<WireMessage> {
        ensure!(
            raw.len() >= MessageKind::Unknown.min_len(),
            err_malformed!("message too short")
        );
        ensure!(
            raw[0] == SYSEX_START && raw[raw.len() - 1] == SYSEX_END,
            err_malformed!("missing sysex delimiters")
        );
        if raw[1] != YAMAHA_ID || raw[3] != QY70_MODEL_ID {
            bail!(Error::UnsupportedManufacturerOrModel {
                manufacturer: raw[1],
                model: raw[3],
            });
        }
        let device = u4::new(raw[2]);
        let kind = MessageKind::from_device_byte(raw[2]);
        ensure!(
            raw.len() >= kind.min_len(),
            err_malformed!("message too short for its type")
        );
        let msg = match kind {
            MessageKind::BulkDump => WireMessage::BulkDump(BulkDump::read(raw, span)?),
            MessageKind::ParameterChange => {
                let mut cursor = &raw[4..raw.len() - 1];
                let address = Address::read(&mut cursor)?;
                let change = match (address.as_bytes(), cursor) {
                    ([0, 0, 0], [0x01]) => ParameterChange::Init,
                    ([0, 0, 0], [0x00]) => ParameterChange::Close,
                    _ => ParameterChange::Other {
                        address,
                        data: cursor.iter().map(|&b| u7::new(b)).collect(),
                    },
                };
                WireMessage::ParameterChange { device, change }
            }
            MessageKind::DumpRequest => {
                let mut cursor = &raw[4..raw.len() - 1];
                let address = Address::read(&mut cursor)?;
                WireMessage::DumpRequest { device, address }
            }
            MessageKind::Unknown => {
                trace!("unknown message type 0x{:02X}", raw[2] >> 4);
                WireMessage::Unknown {
                    device,
                    raw: raw.to_vec(),
                }
            }
        };
        Ok(msg)
    }

    /// The device number this message is addressed to or comes from.
    pub fn device(&self) -> u4 {
        match self {
            WireMessage::BulkDump(dump) => dump.device,
            WireMessage::ParameterChange { device, .. } => *device,
            WireMessage::DumpRequest { device, .. } => *device,
            WireMessage::Unknown { device, .. } => *device,
        }
    }

    /// The kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::BulkDump(_) => MessageKind::BulkDump,
            WireMessage::ParameterChange { .. } => MessageKind::ParameterChange,
            WireMessage::DumpRequest { .. } => MessageKind::DumpRequest,
            WireMessage::Unknown { .. } => MessageKind::Unknown,
        }
    }

    /// Encode this message, appending it to `out`.
    ///
    /// Bulk dumps are repacked and get a freshly computed checksum over `span`.
    pub fn write(&self, span: ChecksumSpan, out: &mut Vec<u8>) -> Result<()> {
        match self {
            WireMessage::BulkDump(dump) => {
                out.extend(BulkDump::encode(dump.device, dump.address, &dump.payload, span)?)
            }
            WireMessage::ParameterChange { device, change } => match change {
                ParameterChange::Init => out.extend_from_slice(&init_message(*device)),
                ParameterChange::Close => out.extend_from_slice(&close_message(*device)),
                ParameterChange::Other { address, data } => {
                    out.extend(parameter_change(*device, *address, data))
                }
            },
            WireMessage::DumpRequest { device, address } => {
                out.extend_from_slice(&dump_request(*device, *address))
            }
            WireMessage::Unknown { raw, .. } => out.extend_from_slice(raw),
        }
        Ok(())
    }
}

/// Build a parameter change message.
pub fn parameter_change(device: u4, address: Address, data: &[u7]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + data.len());
    out.extend_from_slice(&[SYSEX_START, YAMAHA_ID, 0x10 | device.as_int(), QY70_MODEL_ID]);
    out.extend_from_slice(&address.as_bytes());
    out.extend(data.iter().map(|b| b.as_int()));
    out.push(SYSEX_END);
    out
}

fn transfer_control(device: u4, open: bool) -> [u8; 9] {
    [
        SYSEX_START,
        YAMAHA_ID,
        0x10 | device.as_int(),
        QY70_MODEL_ID,
        0x00,
        0x00,
        0x00,
        open as u8,
        SYSEX_END,
    ]
}

/// The parameter change that opens a bulk transfer.
#[inline]
pub fn init_message(device: u4) -> [u8; 9] {
    transfer_control(device, true)
}

/// The parameter change that closes a bulk transfer.
#[inline]
pub fn close_message(device: u4) -> [u8; 9] {
    transfer_control(device, false)
}

/// Ask the device to dump the memory at `address`.
pub fn dump_request(device: u4, address: Address) -> [u8; 8] {
    let [high, mid, low] = address.as_bytes();
    [
        SYSEX_START,
        YAMAHA_ID,
        0x20 | device.as_int(),
        QY70_MODEL_ID,
        high,
        mid,
        low,
        SYSEX_END,
    ]
}
