//! sfnt container primitives and the immutable [`Font`].

use core::{cmp, fmt, ops};
use std::collections::{BTreeMap, BTreeSet};

pub use self::builder::FontBuilder;
use crate::{errors::ParseErrorKind, tables::Table, ParseError};

mod builder;

/// SHA-1 fingerprint of the raw font data.
pub type Digest = [u8; 20];

/// Cursor over font data that tracks its absolute offset for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    pub(crate) bytes: &'a [u8],
    offset: usize,
    table: Option<TableTag>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            table: None,
        }
    }

    pub(crate) fn for_table(mut self, tag: TableTag) -> Self {
        self.table = Some(tag);
        self
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            offset: self.offset,
            table: self.table,
        }
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        self.split_at(len).map(drop)
    }

    /// Splits off the first `len` bytes, advancing this cursor past them.
    pub(crate) fn split_at(&mut self, len: usize) -> Result<Self, ParseError> {
        if self.bytes.len() < len {
            return Err(self.err(ParseErrorKind::UnexpectedEof));
        }
        let (head, tail) = self.bytes.split_at(len);
        let head = Self {
            bytes: head,
            ..*self
        };
        self.bytes = tail;
        self.offset += len;
        Ok(head)
    }

    /// Returns a cursor over the specified range relative to the start of this cursor.
    pub(crate) fn range(&self, range: ops::Range<usize>) -> Result<Self, ParseError> {
        let bytes = self.bytes.get(range.clone()).ok_or_else(|| {
            self.err(ParseErrorKind::RangeOutOfBounds {
                range: range.clone(),
                len: self.bytes.len(),
            })
        })?;
        Ok(Self {
            bytes,
            offset: self.offset + range.start,
            table: self.table,
        })
    }

    pub(crate) fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let head = self.split_at(N)?;
        let mut array = [0_u8; N];
        array.copy_from_slice(head.bytes);
        Ok(array)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ParseError> {
        self.read_byte_array().map(u16::from_be_bytes)
    }

    pub(crate) fn read_i16(&mut self) -> Result<i16, ParseError> {
        self.read_byte_array().map(i16::from_be_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.read_byte_array().map(u32::from_be_bytes)
    }

    /// Reads a `u16` and checks it, reporting the error at the offset of the value.
    pub(crate) fn read_u16_checked<T>(
        &mut self,
        check: impl FnOnce(u16) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u16()?;
        check(value).map_err(|kind| start.err(kind))
    }

    /// Reads a `u32` and checks it, reporting the error at the offset of the value.
    pub(crate) fn read_u32_checked<T>(
        &mut self,
        check: impl FnOnce(u32) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u32()?;
        check(value).map_err(|kind| start.err(kind))
    }
}

/// Computes the sfnt checksum: a wrapping sum of big-endian `u32` words, with the trailing
/// partial word padded with zeros.
pub(crate) fn checksum(bytes: &[u8]) -> u32 {
    let mut words = bytes.chunks_exact(4);
    let mut sum = words.by_ref().fold(0_u32, |acc, word| {
        let &[a, b, c, d] = word else {
            unreachable!();
        };
        acc.wrapping_add(u32::from_be_bytes([a, b, c, d]))
    });
    let remainder = words.remainder();
    if !remainder.is_empty() {
        let mut last_word = [0_u8; 4];
        last_word[..remainder.len()].copy_from_slice(remainder);
        sum = sum.wrapping_add(u32::from_be_bytes(last_word));
    }
    sum
}

/// Four-byte tag identifying a font table.
///
/// Tags are compared as big-endian `u32`s, which coincides with the byte-wise order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableTag(pub [u8; 4]);

impl fmt::Debug for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("TableTag")
            .field(&format_args!("{self}"))
            .finish()
    }
}

impl fmt::Display for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(formatter, "{}", char::from(byte))?;
            } else {
                write!(formatter, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl From<u32> for TableTag {
    fn from(value: u32) -> Self {
        Self::from_u32(value)
    }
}

impl From<TableTag> for u32 {
    fn from(tag: TableTag) -> Self {
        tag.as_u32()
    }
}

impl TableTag {
    /// Font header.
    pub const HEAD: Self = Self(*b"head");
    /// Font header of bitmap-only fonts.
    pub const BHED: Self = Self(*b"bhed");
    /// Horizontal header.
    pub const HHEA: Self = Self(*b"hhea");
    /// Horizontal metrics.
    pub const HMTX: Self = Self(*b"hmtx");
    /// Maximum profile.
    pub const MAXP: Self = Self(*b"maxp");
    /// OS/2 and Windows-specific metrics.
    pub const OS2: Self = Self(*b"OS/2");
    /// Naming table.
    pub const NAME: Self = Self(*b"name");
    /// Character to glyph mapping.
    pub const CMAP: Self = Self(*b"cmap");
    /// PostScript information.
    pub const POST: Self = Self(*b"post");
    /// Compact Font Format outlines.
    pub const CFF: Self = Self(*b"CFF ");
    /// Compact Font Format 2 outlines.
    pub const CFF2: Self = Self(*b"CFF2");
    /// Vertical origin (CFF fonts).
    pub const VORG: Self = Self(*b"VORG");
    /// Glyph data.
    pub const GLYF: Self = Self(*b"glyf");
    /// Index to location.
    pub const LOCA: Self = Self(*b"loca");
    /// Control value table.
    pub const CVT: Self = Self(*b"cvt ");
    /// Font program.
    pub const FPGM: Self = Self(*b"fpgm");
    /// Control value program.
    pub const PREP: Self = Self(*b"prep");
    /// Horizontal device metrics.
    pub const HDMX: Self = Self(*b"hdmx");
    /// Kerning.
    pub const KERN: Self = Self(*b"kern");
    /// Grid-fitting and scan-conversion procedure.
    pub const GASP: Self = Self(*b"gasp");
    /// PCL 5 data.
    pub const PCLT: Self = Self(*b"PCLT");
    /// Digital signature.
    pub const DSIG: Self = Self(*b"DSIG");
    /// Linear threshold data.
    pub const LTSH: Self = Self(*b"LTSH");
    /// Vertical device metrics.
    pub const VDMX: Self = Self(*b"VDMX");
    /// Vertical header.
    pub const VHEA: Self = Self(*b"vhea");
    /// Vertical metrics.
    pub const VMTX: Self = Self(*b"vmtx");
    /// Embedded bitmap data.
    pub const EBDT: Self = Self(*b"EBDT");
    /// Embedded bitmap location data.
    pub const EBLC: Self = Self(*b"EBLC");
    /// Embedded bitmap scaling data.
    pub const EBSC: Self = Self(*b"EBSC");
    /// Bitmap data (Apple).
    pub const BDAT: Self = Self(*b"bdat");
    /// Bitmap location data (Apple).
    pub const BLOC: Self = Self(*b"bloc");
    /// Glyph definition.
    pub const GDEF: Self = Self(*b"GDEF");
    /// Glyph positioning.
    pub const GPOS: Self = Self(*b"GPOS");
    /// Glyph substitution.
    pub const GSUB: Self = Self(*b"GSUB");
    /// Baseline data.
    pub const BASE: Self = Self(*b"BASE");
    /// Justification data.
    pub const JSTF: Self = Self(*b"JSTF");
    /// Marker at the start of a font collection.
    pub const TTCF: Self = Self(*b"ttcf");

    /// Creates a tag from its bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Creates a tag from the big-endian packed integer.
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    /// Packs this tag into an integer: `b0 << 24 | b1 << 16 | b2 << 8 | b3`.
    pub const fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Returns the bytes of this tag.
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }

    /// Checks whether this is a font header table (`head` or `bhed`), the checksum of which
    /// depends on the whole font.
    pub fn is_header_table(self) -> bool {
        self == Self::HEAD || self == Self::BHED
    }
}

/// Record in the sfnt table directory describing a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRecord {
    pub(crate) tag: TableTag,
    pub(crate) checksum: u32,
    /// Offset of the table from the start of the font data.
    pub(crate) offset: u32,
    pub(crate) length: u32,
}

impl TableRecord {
    pub(crate) const BYTE_LEN: usize = 16;

    /// Creates a record for a new table with zero checksum, offset and length.
    pub const fn new(tag: TableTag) -> Self {
        Self::with_location(tag, 0, 0, 0)
    }

    /// Creates a fully populated record.
    pub const fn with_location(tag: TableTag, checksum: u32, offset: u32, length: u32) -> Self {
        Self {
            tag,
            checksum,
            offset,
            length,
        }
    }

    /// Tag of the table.
    pub fn tag(&self) -> TableTag {
        self.tag
    }

    /// Checksum of the table.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Offset of the table in the font data.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Length of the table data (excluding padding).
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Orders records by their tags, as required for the on-disk table directory.
    pub fn cmp_by_tag(&self, other: &Self) -> cmp::Ordering {
        self.tag.cmp(&other.tag)
    }

    /// Orders records by their offsets (ties are broken by tags), which is the order
    /// the table data is read in.
    pub fn cmp_by_offset(&self, other: &Self) -> cmp::Ordering {
        self.offset
            .cmp(&other.offset)
            .then_with(|| self.tag.cmp(&other.tag))
    }

    pub(crate) fn parse(cursor: &mut Cursor<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            tag: TableTag(cursor.read_byte_array()?),
            checksum: cursor.read_u32()?,
            offset: cursor.read_u32()?,
            length: cursor.read_u32()?,
        })
    }

    pub(crate) fn data_range(&self) -> ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.length as usize
    }
}

/// Immutable sfnt font: a set of tables together with the container metadata.
///
/// A font is produced by [`FontBuilder::build()`]; its tables are never mutated afterward.
/// Use [`FontBuilder::from_font()`] to edit a font.
#[derive(Debug, Clone)]
pub struct Font<'a> {
    pub(crate) sfnt_version: u32,
    pub(crate) digest: Option<Digest>,
    pub(crate) checksum: u32,
    pub(crate) tables: BTreeMap<TableTag, Table<'a>>,
}

impl<'a> Font<'a> {
    /// sfnt version for fonts with TrueType outlines.
    pub const SFNT_VERSION_TRUETYPE: u32 = 0x_0001_0000;
    /// sfnt version for fonts with CFF outlines (`OTTO`).
    pub const SFNT_VERSION_CFF: u32 = 0x_4f54_544f;
    /// sfnt version used by Apple TrueType fonts (`true`).
    pub const SFNT_VERSION_APPLE: u32 = 0x_7472_7565;
    /// sfnt version of PostScript Type 1 fonts in an sfnt wrapper (`typ1`).
    pub const SFNT_VERSION_TYPE1: u32 = 0x_7479_7031;

    /// Offset of the `checkSumAdjustment` field in the `head` table.
    pub(crate) const HEAD_CHECKSUM_OFFSET: usize = 8;
    /// Magic value the whole-font checksum must be equal to.
    pub(crate) const SFNT_CHECKSUM: u32 = 0x_b1b0_afba;

    /// Recommended table ordering for fonts with CFF outlines.
    pub const CFF_TABLE_ORDERING: &'static [TableTag] = &[
        TableTag::HEAD,
        TableTag::HHEA,
        TableTag::MAXP,
        TableTag::OS2,
        TableTag::NAME,
        TableTag::CMAP,
        TableTag::POST,
        TableTag::CFF,
    ];

    /// Recommended table ordering for fonts with TrueType outlines.
    pub const TRUETYPE_TABLE_ORDERING: &'static [TableTag] = &[
        TableTag::HEAD,
        TableTag::HHEA,
        TableTag::MAXP,
        TableTag::OS2,
        TableTag::HMTX,
        TableTag::LTSH,
        TableTag::VDMX,
        TableTag::HDMX,
        TableTag::CMAP,
        TableTag::FPGM,
        TableTag::PREP,
        TableTag::CVT,
        TableTag::LOCA,
        TableTag::GLYF,
        TableTag::KERN,
        TableTag::NAME,
        TableTag::POST,
        TableTag::GASP,
        TableTag::PCLT,
        TableTag::DSIG,
    ];

    pub(crate) fn is_supported_version(version: u32) -> bool {
        matches!(
            version,
            Self::SFNT_VERSION_TRUETYPE
                | Self::SFNT_VERSION_CFF
                | Self::SFNT_VERSION_APPLE
                | Self::SFNT_VERSION_TYPE1
        )
    }

    /// Returns the sfnt version (a 16.16 fixed-point number or a four-byte tag like `OTTO`).
    pub fn sfnt_version(&self) -> u32 {
        self.sfnt_version
    }

    /// Returns the SHA-1 fingerprint of the data this font was loaded from, if fingerprinting
    /// was enabled in the [`FontFactory`](crate::FontFactory).
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Returns the font checksum: the wrapping sum of calculated checksums of all tables.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Returns the number of tables in this font.
    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    /// Checks whether this font contains a table with the specified tag.
    pub fn has_table(&self, tag: TableTag) -> bool {
        self.tables.contains_key(&tag)
    }

    /// Gets a table by its tag.
    pub fn table(&self, tag: TableTag) -> Option<&Table<'a>> {
        self.tables.get(&tag)
    }

    /// Returns all tables keyed by their tags.
    pub fn tables(&self) -> &BTreeMap<TableTag, Table<'a>> {
        &self.tables
    }

    /// Default table ordering depending on the font flavor.
    pub fn default_table_ordering(&self) -> &'static [TableTag] {
        if self.has_table(TableTag::CFF) {
            Self::CFF_TABLE_ORDERING
        } else {
            Self::TRUETYPE_TABLE_ORDERING
        }
    }

    /// Produces the order of tables in the serialized font. Tables mentioned in `partial`
    /// (or in the [default ordering](Self::default_table_ordering()) if `partial` is `None`)
    /// go first; remaining tables follow in the tag order. Each table in the font is
    /// mentioned exactly once; tags not present in the font are skipped.
    pub fn generate_table_ordering(&self, partial: Option<&[TableTag]>) -> Vec<TableTag> {
        let partial = partial.unwrap_or_else(|| self.default_table_ordering());
        let mut remaining: BTreeSet<_> = self.tables.keys().copied().collect();
        let mut ordering = Vec::with_capacity(remaining.len());
        for &tag in partial {
            if remaining.remove(&tag) {
                ordering.push(tag);
            }
        }
        ordering.extend(remaining);
        ordering
    }
}
