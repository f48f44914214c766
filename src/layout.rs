//! Offset tables of the QY700 `.Q7P` pattern file.
//!
//! Every documented byte range of a pattern file is described by one [`Region`](struct.Region.html)
//! in a static table per file variant.
//! Readers and the template-overlay writer both go through these tables, so the decision of
//! what may be written lives in exactly one place.
//!
//! Bytes not covered by any region are treated as [`Preserve`](enum.Mutability.html#variant.Preserve).

use std::ops;

/// The 16-byte magic at the start of every pattern file.
pub const MAGIC: &[u8; 16] = b"YQ7PAT     V1.00";
/// Size of a standard pattern file.
pub const STANDARD_SIZE: usize = 3072;
/// Size of an extended pattern file, carrying inline phrase data.
pub const EXTENDED_SIZE: usize = 5120;

/// Sections of a pattern: Intro, Main A, Main B, Fill AB, Fill BA, Ending.
pub const SECTION_COUNT: usize = 6;
/// Tracks per section.
pub const TRACK_COUNT: usize = 8;
/// Section pointer value of a disabled section.
pub const DISABLED_SECTION: u16 = 0xFEFE;
/// Size of one section configuration entry.
pub const SECTION_CONFIG_LEN: usize = 9;
/// Display names of the sections, in storage order.
pub const SECTION_NAMES: [&str; SECTION_COUNT] =
    ["Intro", "Main A", "Main B", "Fill AB", "Fill BA", "Ending"];

/// Whether a region may be written by the converter.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Mutability {
    /// Semantics fully understood, free to overwrite.
    Safe,
    /// Believed to be understood, but unconfirmed on hardware.
    /// Writers may opt out of touching these.
    Provisional,
    /// Unknown or structurally critical, only ever copied from a template.
    Preserve,
}

/// Every named region of a pattern file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Field {
    Magic,
    PatternNumber,
    PatternFlags,
    SizeMarker,
    SectionPointers,
    SectionConfig,
    TempoPadding,
    Tempo,
    TimeSignature,
    Channels,
    TrackNumbers,
    TrackFlags,
    BankMsb,
    Program,
    BankLsb,
    Volume,
    Chorus,
    Reverb,
    Pan,
    PhraseArea,
    SequenceArea,
    TemplatePadding,
    Name,
    Reserved,
    PatternMap,
    Fill,
    Padding,
}

/// A byte range of a pattern file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Region {
    pub field: Field,
    pub offset: usize,
    pub len: usize,
    pub class: Mutability,
}
impl Region {
    const fn new(field: Field, offset: usize, len: usize, class: Mutability) -> Region {
        Region {
            field,
            offset,
            len,
            class,
        }
    }

    /// The byte range covered by this region.
    #[inline]
    pub fn range(&self) -> ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// The two known pattern file variants, told apart by size.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Variant {
    /// 3072 bytes, with phrase data kept in separate areas.
    Standard,
    /// 5120 bytes, with phrase blocks inline from `0x200`.
    Extended,
}

/// The offset table of one pattern file variant.
#[derive(Debug, PartialEq, Eq)]
pub struct Layout {
    pub variant: Variant,
    pub size: usize,
    /// Regions sorted by offset, never overlapping.
    pub regions: &'static [Region],
}
impl Layout {
    /// Select the layout matching a file size.
    pub fn for_size(size: usize) -> Option<&'static Layout> {
        match size {
            STANDARD_SIZE => Some(&STANDARD),
            EXTENDED_SIZE => Some(&EXTENDED),
            _ => None,
        }
    }

    /// The region storing `field`, if this variant has one.
    pub fn region(&self, field: Field) -> Option<&'static Region> {
        self.regions.iter().find(|r| r.field == field)
    }

    /// The mutability class of a single byte.
    pub fn class_at(&self, offset: usize) -> Mutability {
        self.regions
            .iter()
            .find(|r| r.range().contains(&offset))
            .map(|r| r.class)
            .unwrap_or(Mutability::Preserve)
    }
}

use self::{Field::*, Mutability::*};

static STANDARD_REGIONS: [Region; 27] = [
    Region::new(Magic, 0x000, 16, Preserve),
    Region::new(PatternNumber, 0x010, 1, Safe),
    Region::new(PatternFlags, 0x011, 1, Safe),
    Region::new(SizeMarker, 0x030, 2, Preserve),
    Region::new(SectionPointers, 0x100, 32, Preserve),
    Region::new(SectionConfig, 0x120, 96, Preserve),
    Region::new(TempoPadding, 0x180, 8, Preserve),
    Region::new(Tempo, 0x188, 2, Safe),
    Region::new(TimeSignature, 0x18A, 2, Safe),
    Region::new(Channels, 0x190, 8, Safe),
    Region::new(TrackNumbers, 0x1DC, 8, Safe),
    Region::new(TrackFlags, 0x1E4, 2, Safe),
    Region::new(BankMsb, 0x1E6, 8, Provisional),
    Region::new(Program, 0x1F6, 8, Provisional),
    Region::new(BankLsb, 0x206, 8, Provisional),
    Region::new(Volume, 0x226, 32, Safe),
    Region::new(Chorus, 0x246, 16, Safe),
    Region::new(Reverb, 0x256, 32, Safe),
    Region::new(Pan, 0x276, 48, Safe),
    Region::new(PhraseArea, 0x360, 792, Preserve),
    Region::new(SequenceArea, 0x678, 504, Preserve),
    Region::new(TemplatePadding, 0x870, 6, Preserve),
    Region::new(Name, 0x876, 10, Safe),
    Region::new(Reserved, 0x880, 128, Preserve),
    Region::new(PatternMap, 0x900, 192, Preserve),
    Region::new(Fill, 0x9C0, 336, Preserve),
    Region::new(Padding, 0xB10, 240, Preserve),
];

//The mixer and voice tables of the standard layout would land inside the inline phrase area.
static EXTENDED_REGIONS: [Region; 11] = [
    Region::new(Magic, 0x000, 16, Preserve),
    Region::new(PatternNumber, 0x010, 1, Safe),
    Region::new(PatternFlags, 0x011, 1, Safe),
    Region::new(SizeMarker, 0x030, 2, Preserve),
    Region::new(SectionPointers, 0x100, 32, Preserve),
    Region::new(SectionConfig, 0x120, 96, Preserve),
    Region::new(PhraseArea, 0x200, 2048, Preserve),
    Region::new(Name, 0xA00, 8, Safe),
    Region::new(Tempo, 0xA08, 2, Safe),
    Region::new(TimeSignature, 0xA0A, 2, Safe),
    Region::new(Channels, 0xA18, 8, Safe),
];

/// The 3072-byte layout.
pub static STANDARD: Layout = Layout {
    variant: Variant::Standard,
    size: STANDARD_SIZE,
    regions: &STANDARD_REGIONS,
};

/// The 5120-byte layout.
pub static EXTENDED: Layout = Layout {
    variant: Variant::Extended,
    size: EXTENDED_SIZE,
    regions: &EXTENDED_REGIONS,
};
