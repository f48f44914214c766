//! Reading and writing QY700 `.Q7P` pattern files through their offset tables.

use crate::{
    layout::{
        Field, Layout, Mutability, Variant, DISABLED_SECTION, MAGIC, SECTION_CONFIG_LEN,
        SECTION_COUNT, SECTION_NAMES, TRACK_COUNT,
    },
    prelude::*,
};

/// Characters allowed in a pattern name, besides uppercase letters and digits.
const NAME_SYMBOLS: &[u8] = b" -_./";

/// Turn an arbitrary string into a storable pattern name of exactly `len` bytes.
///
/// Letters are uppercased, unsupported characters become spaces, and the result is truncated or
/// padded with spaces.
pub fn normalize_name(name: &str, len: usize) -> Vec<u8> {
    name.bytes()
        .map(|b| b.to_ascii_uppercase())
        .map(|b| {
            if b.is_ascii_uppercase() || b.is_ascii_digit() || NAME_SYMBOLS.contains(&b) {
                b
            } else {
                b' '
            }
        })
        .chain(std::iter::repeat(b' '))
        .take(len)
        .collect()
}

/// Render stored name bytes, showing non-printable bytes as spaces.
pub(crate) fn display_name(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| if (0x20..=0x7E).contains(&b) { b as char } else { ' ' })
        .collect::<String>()
        .trim()
        .to_string()
}

/// A single write into a named region, `bytes` starting `index` bytes into the region.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldWrite {
    pub field: Field,
    pub index: usize,
    pub bytes: Vec<u8>,
}
impl FieldWrite {
    #[inline]
    pub fn new(field: Field, index: usize, bytes: impl Into<Vec<u8>>) -> FieldWrite {
        FieldWrite {
            field,
            index,
            bytes: bytes.into(),
        }
    }

    /// A single-byte write.
    #[inline]
    pub fn byte(field: Field, index: usize, byte: u8) -> FieldWrite {
        FieldWrite::new(field, index, vec![byte])
    }
}

/// The settings of one track within a section.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct TrackRecord {
    pub index: u8,
    /// MIDI channel, 1 to 16.
    pub channel: u8,
    /// Tracks follow the enable state of their section.
    pub enabled: bool,
    pub volume: Option<u7>,
    pub pan: Option<u7>,
    pub chorus: Option<u7>,
    pub reverb: Option<u7>,
    pub bank_msb: Option<u7>,
    pub program: Option<u7>,
    pub bank_lsb: Option<u7>,
}

/// One section of a pattern, with exactly one record per track.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SectionRecord {
    pub index: u8,
    pub name: &'static str,
    /// The raw section pointer.
    pub pointer: u16,
    /// Derived from the pointer: a section is disabled iff its pointer is `0xFEFE`.
    pub enabled: bool,
    pub tracks: [TrackRecord; TRACK_COUNT],
}

/// An owned, validated QY700 pattern file.
///
/// The buffer always keeps its original size and magic.
/// Typed getters read through the [`Layout`](layout/struct.Layout.html) of the file variant, and
/// every write is checked against the mutability class of its region.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PatternFile {
    bytes: Vec<u8>,
    layout: &'static Layout,
}
impl PatternFile {
    /// Validate and copy a raw pattern file.
    pub fn parse(raw: &[u8]) -> Result<PatternFile> {
        PatternFile::from_vec(raw.to_vec())
    }

    /// Validate a raw pattern file, taking ownership of the buffer.
    pub fn from_vec(bytes: Vec<u8>) -> Result<PatternFile> {
        let layout = Layout::for_size(bytes.len()).ok_or(Error::InvalidFileSize(bytes.len()))?;
        ensure!(bytes.starts_with(MAGIC), Error::InvalidFileHeader);
        Ok(PatternFile { bytes, layout })
    }

    /// Check whether some bytes look like a pattern file, without copying them.
    pub fn detect(raw: &[u8]) -> bool {
        Layout::for_size(raw.len()).is_some() && raw.starts_with(MAGIC)
    }

    /// The offset table of this file variant.
    #[inline]
    pub fn layout(&self) -> &'static Layout {
        self.layout
    }

    /// Whether this is a 3072 or 5120 byte file.
    #[inline]
    pub fn variant(&self) -> Variant {
        self.layout.variant
    }

    /// The raw file contents.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Give up the raw buffer.
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The raw bytes of a region, if this variant has it.
    pub fn field(&self, field: Field) -> Option<&[u8]> {
        self.layout
            .region(field)
            .and_then(|region| self.bytes.get(region.range()))
    }

    fn field_byte(&self, field: Field, index: usize) -> Option<u8> {
        self.field(field).and_then(|raw| raw.get(index)).copied()
    }

    fn mixer_index(section: usize, track: usize) -> Option<usize> {
        if section < SECTION_COUNT && track < TRACK_COUNT {
            Some(section * TRACK_COUNT + track)
        } else {
            None
        }
    }

    fn mixer(&self, field: Field, section: usize, track: usize) -> Option<u7> {
        let index = Self::mixer_index(section, track)?;
        self.field_byte(field, index).map(u7::new)
    }

    fn voice(&self, field: Field, track: usize) -> Option<u7> {
        if track < TRACK_COUNT {
            self.field_byte(field, track).map(u7::new)
        } else {
            None
        }
    }

    /// The pattern slot number.
    pub fn pattern_number(&self) -> u8 {
        self.field_byte(Field::PatternNumber, 0).unwrap_or(0)
    }

    /// The raw pattern flags byte.
    pub fn flags(&self) -> u8 {
        self.field_byte(Field::PatternFlags, 0).unwrap_or(0)
    }

    /// The pattern name, trimmed, with non-printable bytes shown as spaces.
    pub fn name(&self) -> String {
        self.field(Field::Name).map(display_name).unwrap_or_default()
    }

    /// The stored tempo. An unreadable tempo field reads as the default tempo.
    pub fn tempo(&self) -> Tempo {
        self.field(Field::Tempo)
            .and_then(|mut raw| Tempo::read(&mut raw).ok())
            .unwrap_or_default()
    }

    /// The two raw time signature bytes.
    pub fn time_signature(&self) -> [u8; 2] {
        match self.field(Field::TimeSignature) {
            Some(&[a, b]) => [a, b],
            _ => [0; 2],
        }
    }

    /// The MIDI channel of a track, 1 to 16.
    ///
    /// Stored values of 16 and above fall back to the track's own number.
    pub fn channel(&self, track: usize) -> u8 {
        match self.field_byte(Field::Channels, track) {
            Some(raw) if raw < 16 => raw + 1,
            _ => (track % 16) as u8 + 1,
        }
    }

    /// The 8 raw track number bytes, absent from extended files.
    pub fn track_numbers(&self) -> Option<&[u8]> {
        self.field(Field::TrackNumbers)
    }

    /// The 16-bit track enable mask.
    pub fn track_flags(&self) -> Option<u16> {
        u16::read_at(self.field(Field::TrackFlags)?, 0)
    }

    /// Volume of a track within a section.
    ///
    /// Mixer entries live at `section * 8 + track`; `None` when the table has no such entry.
    pub fn volume(&self, section: usize, track: usize) -> Option<u7> {
        self.mixer(Field::Volume, section, track)
    }

    /// Pan of a track within a section, `0x40` being center.
    pub fn pan(&self, section: usize, track: usize) -> Option<u7> {
        self.mixer(Field::Pan, section, track)
    }

    /// Chorus send of a track. Only sections 0 and 1 have entries.
    pub fn chorus(&self, section: usize, track: usize) -> Option<u7> {
        self.mixer(Field::Chorus, section, track)
    }

    /// Reverb send of a track within a section.
    pub fn reverb(&self, section: usize, track: usize) -> Option<u7> {
        self.mixer(Field::Reverb, section, track)
    }

    /// Provisional: bank select MSB of a track.
    pub fn bank_msb(&self, track: usize) -> Option<u7> {
        self.voice(Field::BankMsb, track)
    }

    /// Provisional: program number of a track.
    pub fn program(&self, track: usize) -> Option<u7> {
        self.voice(Field::Program, track)
    }

    /// Provisional: bank select LSB of a track.
    pub fn bank_lsb(&self, track: usize) -> Option<u7> {
        self.voice(Field::BankLsb, track)
    }

    /// The raw 2-byte pointer of a section, `0xFEFE` for disabled sections.
    pub fn section_pointer(&self, section: usize) -> u16 {
        self.field(Field::SectionPointers)
            .and_then(|raw| u16::read_at(raw, section * 2))
            .unwrap_or(DISABLED_SECTION)
    }

    /// A section is enabled unless its pointer is the `0xFEFE` sentinel.
    #[inline]
    pub fn section_enabled(&self, section: usize) -> bool {
        self.section_pointer(section) != DISABLED_SECTION
    }

    /// The 9-byte configuration entry of a section.
    pub fn section_config(&self, section: usize) -> Option<&[u8]> {
        let start = section * SECTION_CONFIG_LEN;
        self.field(Field::SectionConfig)?
            .get(start..start + SECTION_CONFIG_LEN)
    }

    /// Gather the settings of every section and track.
    pub fn sections(&self) -> Vec<SectionRecord> {
        (0..SECTION_COUNT)
            .map(|section| {
                let pointer = self.section_pointer(section);
                let enabled = pointer != DISABLED_SECTION;
                let mut tracks = [TrackRecord::default(); TRACK_COUNT];
                for (track, record) in tracks.iter_mut().enumerate() {
                    *record = TrackRecord {
                        index: track as u8,
                        channel: self.channel(track),
                        enabled,
                        volume: self.volume(section, track),
                        pan: self.pan(section, track),
                        chorus: self.chorus(section, track),
                        reverb: self.reverb(section, track),
                        bank_msb: self.bank_msb(track),
                        program: self.program(track),
                        bank_lsb: self.bank_lsb(track),
                    };
                }
                SectionRecord {
                    index: section as u8,
                    name: SECTION_NAMES[section],
                    pointer,
                    enabled,
                    tracks,
                }
            })
            .collect()
    }

    /// Write `bytes` starting `index` bytes into the region of `field`.
    ///
    /// Fails with `UnsafeFieldWrite` if the region must be preserved, with `MissingField` if
    /// this variant has no such region, and with `FieldOutOfRange` if the bytes do not fit.
    /// Provisional regions are writable; callers decide whether to emit such writes.
    pub fn write_safe_field(&mut self, field: Field, index: usize, bytes: &[u8]) -> Result<()> {
        let region = self
            .layout
            .region(field)
            .ok_or(Error::MissingField(field))?;
        ensure!(
            region.class != Mutability::Preserve,
            Error::UnsafeFieldWrite(field)
        );
        ensure!(
            index
                .checked_add(bytes.len())
                .map_or(false, |end| end <= region.len),
            Error::FieldOutOfRange { field, index }
        );
        let start = region.offset + index;
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        trace!("wrote {} byte(s) into {:?}[{}]", bytes.len(), field, index);
        Ok(())
    }

    /// Apply a described write.
    #[inline]
    pub fn apply(&mut self, write: &FieldWrite) -> Result<()> {
        self.write_safe_field(write.field, write.index, &write.bytes)
    }

    /// Build a new file out of `template`, changing only the regions named in `writes`.
    ///
    /// Every byte not covered by a write is copied verbatim from the template, which is how
    /// section tables, fill areas and other unknown regions survive conversions.
    /// If any write fails the whole overlay fails, no partially written file is returned.
    pub fn overlay_from_template(
        template: &PatternFile,
        writes: &[FieldWrite],
    ) -> Result<PatternFile> {
        let mut out = template.clone();
        for write in writes {
            out.apply(write)?;
        }
        Ok(out)
    }

    /// Set the pattern slot number.
    pub fn set_pattern_number(&mut self, number: u8) -> Result<()> {
        self.write_safe_field(Field::PatternNumber, 0, &[number])
    }

    /// Store a name, normalized to the name length of this variant.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let len = self
            .layout
            .region(Field::Name)
            .ok_or(Error::MissingField(Field::Name))?
            .len;
        self.write_safe_field(Field::Name, 0, &normalize_name(name, len))
    }

    /// Store a tempo as BPM times ten.
    pub fn set_tempo(&mut self, tempo: Tempo) -> Result<()> {
        self.write_safe_field(Field::Tempo, 0, &tempo.to_bytes())
    }

    /// Store the two raw time signature bytes.
    pub fn set_time_signature(&mut self, raw: [u8; 2]) -> Result<()> {
        self.write_safe_field(Field::TimeSignature, 0, &raw)
    }

    /// Set the MIDI channel of a track, 1 to 16.
    pub fn set_channel(&mut self, track: usize, channel: u8) -> Result<()> {
        ensure!(
            (1..=16).contains(&channel),
            Error::FieldOutOfRange {
                field: Field::Channels,
                index: track,
            }
        );
        self.write_safe_field(Field::Channels, track, &[channel - 1])
    }

    fn set_mixer(&mut self, field: Field, section: usize, track: usize, value: u7) -> Result<()> {
        let index = Self::mixer_index(section, track).ok_or(Error::FieldOutOfRange {
            field,
            index: section * TRACK_COUNT + track,
        })?;
        self.write_safe_field(field, index, &[value.as_int()])
    }

    /// Set the volume of a track within a section.
    pub fn set_volume(&mut self, section: usize, track: usize, value: u7) -> Result<()> {
        self.set_mixer(Field::Volume, section, track, value)
    }

    /// Set the pan of a track within a section.
    pub fn set_pan(&mut self, section: usize, track: usize, value: u7) -> Result<()> {
        self.set_mixer(Field::Pan, section, track, value)
    }

    /// Set the chorus send of a track within a section.
    pub fn set_chorus(&mut self, section: usize, track: usize, value: u7) -> Result<()> {
        self.set_mixer(Field::Chorus, section, track, value)
    }

    /// Set the reverb send of a track within a section.
    pub fn set_reverb(&mut self, section: usize, track: usize, value: u7) -> Result<()> {
        self.set_mixer(Field::Reverb, section, track, value)
    }

    /// Provisional: set the bank select MSB of a track.
    pub fn set_bank_msb(&mut self, track: usize, value: u7) -> Result<()> {
        self.write_safe_field(Field::BankMsb, track, &[value.as_int()])
    }

    /// Provisional: set the program number of a track.
    pub fn set_program(&mut self, track: usize, value: u7) -> Result<()> {
        self.write_safe_field(Field::Program, track, &[value.as_int()])
    }

    /// Provisional: set the bank select LSB of a track.
    pub fn set_bank_lsb(&mut self, track: usize, value: u7) -> Result<()> {
        self.write_safe_field(Field::BankLsb, track, &[value.as_int()])
    }
}
