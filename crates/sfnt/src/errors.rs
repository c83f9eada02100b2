use core::{fmt, ops};
use std::io;

use crate::TableTag;

/// Kind of a font [`ParseError`].
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseErrorKind {
    /// I/O error when reading the font from a stream.
    Io(io::Error),
    /// Unexpected end of the font data.
    UnexpectedEof,
    /// Unexpected sfnt version.
    UnexpectedFontVersion(u32),
    /// Unexpected version of a font collection header.
    UnexpectedCollectionVersion(u32),
    /// Range inferred from the font data is out of bounds.
    RangeOutOfBounds {
        /// Inferred range.
        range: ops::Range<usize>,
        /// Length of the indexed data.
        len: usize,
    },
    /// The same table tag is mentioned in the table directory more than once.
    DuplicateTable,
    /// A table starts before the previous table in the stream has ended.
    OverlappingTable {
        /// Offset of the table.
        offset: usize,
        /// Current position in the stream.
        position: usize,
    },
    /// Unexpected table version.
    UnexpectedTableVersion(u32),
    /// Unexpected table length.
    UnexpectedTableLen {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// Unexpected table format (e.g., the `loca` format in the `head` table).
    UnexpectedTableFormat(u16),
    /// Checksum mismatch.
    Checksum {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum read from the font data.
        actual: u32,
    },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(formatter, "I/O error reading font data: {err}"),
            Self::UnexpectedEof => formatter.write_str("unexpected end of the font data"),
            Self::UnexpectedFontVersion(val) => {
                write!(formatter, "unexpected sfnt version ({val:#010x})")
            }
            Self::UnexpectedCollectionVersion(val) => {
                write!(formatter, "unexpected font collection version ({val:#010x})")
            }
            Self::RangeOutOfBounds { range, len } => {
                write!(
                    formatter,
                    "range ({range:?}) inferred from the font data is out of bounds (..{len})"
                )
            }
            Self::DuplicateTable => {
                formatter.write_str("table is mentioned in the table directory more than once")
            }
            Self::OverlappingTable { offset, position } => {
                write!(
                    formatter,
                    "table offset ({offset}) precedes the current stream position ({position})"
                )
            }
            Self::UnexpectedTableVersion(val) => {
                write!(formatter, "unexpected table version ({val:#010x})")
            }
            Self::UnexpectedTableLen { expected, actual } => {
                write!(
                    formatter,
                    "unexpected table length: expected {expected}, got {actual}"
                )
            }
            Self::UnexpectedTableFormat(val) => {
                write!(formatter, "unexpected table format ({val})")
            }
            Self::Checksum { expected, actual } => {
                write!(
                    formatter,
                    "unexpected checksum: expected {expected:#010x}, got {actual:#010x}"
                )
            }
        }
    }
}

impl std::error::Error for ParseErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors that can occur when loading an sfnt [`Font`](crate::Font) or a font collection.
#[derive(Debug)]
pub struct ParseError {
    pub(crate) kind: ParseErrorKind,
    pub(crate) offset: usize,
    pub(crate) table: Option<TableTag>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = self.table {
            write!(formatter, "[{table}] ")?;
        }
        if self.offset > 0 {
            write!(formatter, "{}: ", self.offset)?;
        }
        fmt::Display::fmt(&self.kind, formatter)
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        let kind = if err.kind() == io::ErrorKind::UnexpectedEof {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::Io(err)
        };
        Self::new(kind)
    }
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind) -> Self {
        Self {
            kind,
            offset: 0,
            table: None,
        }
    }

    pub(crate) fn at(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub(crate) fn with_table(mut self, table: TableTag) -> Self {
        self.table = Some(table);
        self
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Gets the table this error relates to.
    pub fn table(&self) -> Option<TableTag> {
        self.table
    }

    /// Gets the offset in the font data.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Kind of a [`BuildError`].
#[derive(Debug)]
#[non_exhaustive]
pub enum BuildErrorKind {
    /// The table builder lacks inputs from other tables (e.g., the glyph count from `maxp`).
    NotReady,
    /// Table data the builder needed to re-encode is malformed.
    InvalidData(ParseError),
    /// The number of per-glyph entries doesn't match the glyph count from `maxp`.
    GlyphCountMismatch {
        /// Glyph count from `maxp`.
        expected: usize,
        /// Number of entries held by the builder.
        actual: usize,
    },
    /// `numberOfHMetrics` from `hhea` is zero or exceeds the glyph count.
    MetricsCountOutOfRange {
        /// Number of long horizontal metrics.
        number_of_h_metrics: u16,
        /// Glyph count from `maxp`.
        num_glyphs: u16,
    },
    /// Glyph locations cannot be encoded in the requested `loca` format.
    LocaOverflow,
    /// The number of entries exceeds what the 16-bit count field can hold
    /// (device records in `hdmx`, or tables in the font directory).
    TooManyEntries {
        /// Number of entries to encode.
        actual: usize,
    },
}

impl fmt::Display for BuildErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => formatter.write_str("table builder is not ready to build"),
            Self::InvalidData(err) => write!(formatter, "invalid table data: {err}"),
            Self::GlyphCountMismatch { expected, actual } => {
                write!(
                    formatter,
                    "glyph count mismatch: expected {expected} entries, got {actual}"
                )
            }
            Self::MetricsCountOutOfRange {
                number_of_h_metrics,
                num_glyphs,
            } => {
                write!(
                    formatter,
                    "number of horizontal metrics ({number_of_h_metrics}) is out of range \
                     for {num_glyphs} glyphs"
                )
            }
            Self::LocaOverflow => {
                formatter.write_str("glyph locations do not fit into the short `loca` format")
            }
            Self::TooManyEntries { actual } => {
                write!(
                    formatter,
                    "too many entries: {actual}, while at most {} are supported",
                    u16::MAX
                )
            }
        }
    }
}

/// Errors that can occur when building a table or a [`Font`](crate::Font) from builders.
///
/// These errors signal that the builder state is internally inconsistent, e.g. a dependent
/// table was not supplied with data from the tables it depends on.
#[derive(Debug)]
pub struct BuildError {
    pub(crate) tag: TableTag,
    pub(crate) kind: BuildErrorKind,
}

impl fmt::Display for BuildError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unable to build table '{}': {}", self.tag, self.kind)
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            BuildErrorKind::InvalidData(err) => Some(err),
            _ => None,
        }
    }
}

impl BuildError {
    pub(crate) fn new(tag: TableTag, kind: BuildErrorKind) -> Self {
        Self { tag, kind }
    }

    /// Gets the tag of the table that could not be built.
    pub fn tag(&self) -> TableTag {
        self.tag
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &BuildErrorKind {
        &self.kind
    }
}

/// Errors that can occur when loading [`Font`](crate::Font)s
/// via a [`FontFactory`](crate::FontFactory).
#[derive(Debug)]
#[non_exhaustive]
pub enum LoadError {
    /// Error parsing the font data.
    Parse(ParseError),
    /// Error building a font from the parsed data.
    Build(BuildError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(formatter, "failed parsing font: {err}"),
            Self::Build(err) => write!(formatter, "failed building font: {err}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(match self {
            Self::Parse(err) => err,
            Self::Build(err) => err,
        })
    }
}

impl From<ParseError> for LoadError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<BuildError> for LoadError {
    fn from(err: BuildError) -> Self {
        Self::Build(err)
    }
}
