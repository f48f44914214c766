//! Conversion between QY70 style dumps and QY700 pattern files.

use crate::{
    checksum::ChecksumSpan,
    layout::{Field, Variant, SECTION_COUNT, TRACK_COUNT},
    pattern::{normalize_name, FieldWrite, PatternFile},
    phrase::{parse_phrases, PhraseBlock},
    prelude::*,
    stream::Framer,
    style::{track_pan, StyleHeader, TrackHeader, TrackVoice},
    sysex::{close_message, init_message, Address, BulkDump, WireMessage, MAX_PAYLOAD},
    template::default_template,
};
use std::collections::{BTreeMap, VecDeque};

/// Tempos outside this range in a received header are ignored.
const TEMPO_LIMITS: ops::RangeInclusive<i32> = 30..=300;
/// Section config entries of sections that carry a phrase start with this byte.
const CONFIG_ACTIVE: u8 = 0xF0;
/// Phrases this short carry no events worth sending.
const MIN_PHRASE_LEN: usize = 4;

/// Runtime settings of a [`Converter`](struct.Converter.html).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Device number written into emitted messages.
    pub device: u4,
    /// Bytes covered by bulk dump checksums, both when reading and when writing.
    pub checksum_span: ChecksumSpan,
    /// Whether received voices are written into the provisional voice tables.
    pub write_provisional: bool,
    /// Pattern file used as the base of received styles.
    /// The built-in template is used when `None`.
    pub template: Option<Vec<u8>>,
}
impl Default for ConvertOptions {
    fn default() -> ConvertOptions {
        ConvertOptions {
            device: u4::new(0),
            checksum_span: ChecksumSpan::default(),
            write_provisional: true,
            template: None,
        }
    }
}

/// The result of a successful conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversion {
    /// The complete output buffer.
    pub bytes: Vec<u8>,
    /// Recoverable anomalies met along the way, in order.
    pub warnings: Vec<Error>,
}

/// Converts between QY70 bulk dump streams and QY700 pattern files.
#[derive(Clone, Debug, Default)]
pub struct Converter {
    options: ConvertOptions,
}
impl Converter {
    #[inline]
    pub fn new(options: ConvertOptions) -> Converter {
        Converter { options }
    }

    #[inline]
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Iterate over the wire messages that transmit a pattern file.
    pub fn emit<'a>(&'a self, file: &'a PatternFile) -> WireEmitter<'a> {
        WireEmitter {
            file,
            phrases: parse_phrases(file),
            options: &self.options,
            state: EmitState::Init,
            pending: VecDeque::new(),
        }
    }

    /// Convert a pattern file into a complete bulk dump stream.
    pub fn file_to_wire(&self, file: &[u8]) -> Result<Conversion> {
        let file = PatternFile::parse(file)?;
        debug!(
            "sending {:?} pattern {:?} at {}",
            file.variant(),
            file.name(),
            file.tempo()
        );
        let mut warnings = Vec::new();
        for phrase in parse_phrases(&file) {
            warnings.extend(crate::event::unknown_opcodes(&phrase.data));
        }
        let mut bytes = Vec::new();
        for msg in self.emit(&file) {
            bytes.extend(msg?);
        }
        finish(bytes, warnings)
    }

    /// Convert a bulk dump stream into a pattern file, built on top of the template.
    pub fn wire_to_file(&self, wire: &[u8]) -> Result<Conversion> {
        let mut warnings = Vec::new();
        let blocks = self.collect(wire, &mut warnings)?;
        let template = match &self.options.template {
            Some(raw) => PatternFile::parse(raw)?,
            None => default_template().clone(),
        };
        let writes = self.safe_writes(&template, &blocks);
        debug!(
            "collected {} block(s), applying {} write(s)",
            blocks.len(),
            writes.len()
        );
        let file = PatternFile::overlay_from_template(&template, &writes)?;
        finish(file.into_bytes(), warnings)
    }

    /// Group the payloads of style bulk dumps by `AL`, in message order.
    fn collect(&self, wire: &[u8], warnings: &mut Vec<Error>) -> Result<BTreeMap<u8, Vec<u8>>> {
        let mut blocks: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
        let mut framer = Framer::new(wire);
        for raw in framer.by_ref() {
            let dump = match WireMessage::parse(raw, self.options.checksum_span) {
                Ok(WireMessage::BulkDump(dump)) => dump,
                Ok(other) => {
                    trace!("ignoring {:?} message", other.kind());
                    continue;
                }
                Err(err) => {
                    warn!("skipping message: {}", err);
                    warnings.push(err);
                    continue;
                }
            };
            if !dump.address.is_style() {
                debug!("ignoring bulk dump at {}", dump.address);
                continue;
            }
            if let Some(err) = dump.checksum_error() {
                warnings.push(err);
            }
            blocks
                .entry(dump.address.low.as_int())
                .or_default()
                .extend_from_slice(&dump.payload);
        }
        if let Some(rest) = framer.unterminated() {
            warn!("stream ends inside a {} byte message", rest.len());
            bail!(err_malformed!("unterminated message at end of stream"));
        }
        Ok(blocks)
    }

    /// Derive the writes that carry received data into the template.
    fn safe_writes(&self, template: &PatternFile, blocks: &BTreeMap<u8, Vec<u8>>) -> Vec<FieldWrite> {
        let layout = template.layout();
        let mut writes = Vec::new();

        if let Some(header) = blocks.get(&Address::HEADER_LOW) {
            let header = StyleHeader::from_bytes(header.clone());
            match (header.name(), layout.region(Field::Name)) {
                (Some(name), Some(region)) => {
                    writes.push(FieldWrite::new(Field::Name, 0, normalize_name(&name, region.len)))
                }
                _ => debug!("no readable name in style header"),
            }
            match header.tempo_bpm() {
                Some(bpm) if TEMPO_LIMITS.contains(&bpm) => writes.push(FieldWrite::new(
                    Field::Tempo,
                    0,
                    Tempo::from_bpm(bpm as u16).to_bytes().to_vec(),
                )),
                other => debug!("ignoring header tempo {:?}", other),
            }
        }

        if let Some(region) = layout.region(Field::Pan) {
            for (&low, block) in blocks.range(..Address::HEADER_LOW) {
                let index = low as usize;
                match track_pan(block) {
                    Some(pan) if index < region.len => {
                        writes.push(FieldWrite::byte(Field::Pan, index, pan.as_int()))
                    }
                    Some(_) => debug!("no pan entry for track block {:02X}", low),
                    None => {}
                }
            }
        }

        let voice_tables = layout.region(Field::BankMsb).is_some();
        if self.options.write_provisional && voice_tables {
            for track in 0..TRACK_COUNT {
                let voice = (0..SECTION_COUNT)
                    .filter_map(|section| blocks.get(&((section * TRACK_COUNT + track) as u8)))
                    .find_map(|block| TrackVoice::read(block));
                match voice {
                    Some(TrackVoice::Drum) => {
                        writes.push(FieldWrite::byte(Field::BankMsb, track, 0x7F));
                        writes.push(FieldWrite::byte(Field::Program, track, 0));
                    }
                    Some(TrackVoice::Bass {
                        bank_lsb: Some(lsb),
                    }) => writes.push(FieldWrite::byte(Field::BankLsb, track, lsb.as_int())),
                    Some(TrackVoice::Voice { bank_msb, program }) => {
                        writes.push(FieldWrite::byte(Field::BankMsb, track, bank_msb.as_int()));
                        writes.push(FieldWrite::byte(Field::Program, track, program.as_int()));
                    }
                    Some(TrackVoice::Bass { bank_lsb: None }) | None => {}
                }
            }
        }
        writes
    }
}

/// Hand out the finished buffer, unless strict mode rejects the anomalies found.
fn finish(bytes: Vec<u8>, warnings: Vec<Error>) -> Result<Conversion> {
    if cfg!(feature = "strict") {
        if let Some(first) = warnings.into_iter().next() {
            bail!(first);
        }
        return Ok(Conversion {
            bytes,
            warnings: Vec::new(),
        });
    }
    Ok(Conversion { bytes, warnings })
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum EmitState {
    Init,
    /// Next track slot, `section * 8 + track`.
    Tracks(usize),
    Header,
    Close,
    Done,
}

/// Produces the messages transmitting a pattern file, one at a time.
///
/// The stream opens with an init message, carries one or more bulk dumps per non-empty track,
/// then the style header, and ends with a close message.
pub struct WireEmitter<'a> {
    file: &'a PatternFile,
    phrases: Vec<PhraseBlock>,
    options: &'a ConvertOptions,
    state: EmitState,
    pending: VecDeque<Vec<u8>>,
}
impl<'a> WireEmitter<'a> {
    /// The block of a track, or `None` if the track carries no data.
    fn track_data(&self, section: usize, track: usize) -> Option<Vec<u8>> {
        let phrase: &[u8] = match self.file.variant() {
            Variant::Standard => {
                if !self.file.section_enabled(section) {
                    return None;
                }
                &[]
            }
            Variant::Extended => {
                let config = self.file.section_config(section)?;
                if config[0] != CONFIG_ACTIVE {
                    return None;
                }
                let phrase = self.phrases.get(config[3] as usize)?;
                if phrase.data.len() <= MIN_PHRASE_LEN {
                    return None;
                }
                &phrase.data
            }
        };
        let header = TrackHeader::new(
            track,
            self.file.bank_msb(track).unwrap_or_default(),
            self.file.program(track).unwrap_or_default(),
        );
        Some(header.track_data(phrase))
    }

    /// Split a block into bulk dumps and queue them.
    fn queue(&mut self, address: Address, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(MAX_PAYLOAD) {
            let msg = BulkDump::encode(
                self.options.device,
                address,
                chunk,
                self.options.checksum_span,
            )?;
            self.pending.push_back(msg);
        }
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(msg) = self.pending.pop_front() {
                return Ok(Some(msg));
            }
            match self.state {
                EmitState::Init => {
                    self.state = EmitState::Tracks(0);
                    return Ok(Some(init_message(self.options.device).to_vec()));
                }
                EmitState::Tracks(slot) if slot < SECTION_COUNT * TRACK_COUNT => {
                    self.state = EmitState::Tracks(slot + 1);
                    let (section, track) = (slot / TRACK_COUNT, slot % TRACK_COUNT);
                    if let Some(data) = self.track_data(section, track) {
                        trace!(
                            "section {} track {}: {} byte(s)",
                            section,
                            track,
                            data.len()
                        );
                        self.queue(Address::style_track(section as u8, track as u8), &data)?;
                    }
                }
                EmitState::Tracks(_) => {
                    self.state = EmitState::Header;
                }
                EmitState::Header => {
                    self.state = EmitState::Close;
                    let tempo = match self.file.tempo() {
                        tempo if tempo.tenths() == 0 => Tempo::DEFAULT,
                        tempo => tempo,
                    };
                    let header = StyleHeader::new(tempo, &self.file.name());
                    self.queue(Address::style_header(), &header.bytes)?;
                }
                EmitState::Close => {
                    self.state = EmitState::Done;
                    return Ok(Some(close_message(self.options.device).to_vec()));
                }
                EmitState::Done => return Ok(None),
            }
        }
    }
}
impl<'a> Iterator for WireEmitter<'a> {
    type Item = Result<Vec<u8>>;
    fn next(&mut self) -> Option<Result<Vec<u8>>> {
        match self.step() {
            Ok(msg) => msg.map(Ok),
            Err(err) => {
                self.state = EmitState::Done;
                self.pending.clear();
                Some(Err(err))
            }
        }
    }
}

/// Convert a bulk dump stream into a pattern file.
///
/// The pattern is built on top of `template`, or on top of the built-in template if none is
/// given. Only the name, tempo, pan and voice fields are taken from the stream.
pub fn wire_to_file(wire: &[u8], template: Option<&[u8]>) -> Result<Vec<u8>> {
    let options = ConvertOptions {
        template: template.map(|raw| raw.to_vec()),
        ..ConvertOptions::default()
    };
    Converter::new(options)
        .wire_to_file(wire)
        .map(|conv| conv.bytes)
}

/// Convert a pattern file into a bulk dump stream for the device number `device` (0 to 15).
pub fn file_to_wire(file: &[u8], device: u8) -> Result<Vec<u8>> {
    let device = u4::try_from(device).ok_or(err_malformed!("device number above 15"))?;
    let options = ConvertOptions {
        device,
        ..ConvertOptions::default()
    };
    Converter::new(options)
        .file_to_wire(file)
        .map(|conv| conv.bytes)
}
