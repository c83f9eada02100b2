//! Font tables and their builders.

use std::{borrow::Cow, io};

pub use self::{
    hdmx::{DeviceRecord, HdmxBuilder},
    head::HeadBuilder,
    hhea::HheaBuilder,
    hmtx::{HmtxBuilder, HorizontalMetric},
    loca::{LocaBuilder, LocaFormat},
    maxp::MaxpBuilder,
};
use crate::{
    errors::{BuildErrorKind, ParseErrorKind},
    font::{checksum, Cursor},
    BuildError, Font, ParseError, TableRecord, TableTag,
};

mod hdmx;
mod head;
mod hhea;
mod hmtx;
mod loca;
mod maxp;

/// Calculates the checksum of table data. For the font header table, the `checkSumAdjustment`
/// field is treated as zero.
pub(crate) fn table_checksum(tag: TableTag, data: &[u8]) -> u32 {
    const ADJUSTMENT_RANGE_END: usize = Font::HEAD_CHECKSUM_OFFSET + 4;

    if tag.is_header_table() && data.len() >= ADJUSTMENT_RANGE_END {
        // Both parts start at a 4-byte boundary, so the sum is equal to the checksum
        // of the data with the zeroed adjustment.
        checksum(&data[..Font::HEAD_CHECKSUM_OFFSET])
            .wrapping_add(checksum(&data[ADJUSTMENT_RANGE_END..]))
    } else {
        checksum(data)
    }
}

/// Immutable font table: the directory record together with the table data.
#[derive(Debug, Clone)]
pub struct Table<'a> {
    record: TableRecord,
    data: Cow<'a, [u8]>,
}

impl<'a> Table<'a> {
    /// Creates a table, recomputing the checksum and length in the `record`. The offset
    /// is retained.
    pub(crate) fn new(record: TableRecord, data: Cow<'a, [u8]>) -> Self {
        let record = TableRecord {
            checksum: table_checksum(record.tag, &data),
            length: u32::try_from(data.len()).expect("table length overflow"),
            ..record
        };
        Self { record, data }
    }

    /// Returns the directory record for this table. The offset in the record refers
    /// to the data the table was loaded from (0 for new tables).
    pub fn record(&self) -> &TableRecord {
        &self.record
    }

    /// Returns the table tag.
    pub fn tag(&self) -> TableTag {
        self.record.tag
    }

    /// Returns the raw table data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the length of the table data in bytes, excluding padding.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Returns the calculated checksum of the table data.
    pub fn calculated_checksum(&self) -> u32 {
        self.record.checksum
    }

    /// Writes the table data (without padding) to the provided writer.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the writer.
    pub fn serialize<W: io::Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.data)
    }

    pub(crate) fn into_parts(self) -> (TableRecord, Cow<'a, [u8]>) {
        (self.record, self.data)
    }
}

/// Common interface of table builders.
pub trait TableBuilder<'a> {
    /// Returns the record of the table this builder was loaded from.
    fn record(&self) -> &TableRecord;

    /// Returns the tag of the built table.
    fn tag(&self) -> TableTag {
        self.record().tag
    }

    /// Checks whether the builder has all inputs from other tables to build the table.
    fn ready_to_build(&self) -> bool;

    /// Checks whether the table data differs from the data the builder was loaded with.
    fn changed(&self) -> bool;

    /// Builds the table from the current builder state. Building is idempotent: repeated
    /// calls without intermediate mutations produce equal tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder is not [ready](Self::ready_to_build()) or if its state
    /// cannot be encoded.
    fn build(&self) -> Result<Table<'a>, BuildError>;
}

/// Table data held by a builder.
#[derive(Debug, Clone)]
pub(crate) struct BuilderData<'a> {
    record: TableRecord,
    data: Cow<'a, [u8]>,
    changed: bool,
}

impl<'a> BuilderData<'a> {
    pub(crate) fn new(record: TableRecord, data: Cow<'a, [u8]>) -> Self {
        Self {
            record,
            data,
            changed: false,
        }
    }

    fn into_owned(self) -> BuilderData<'static> {
        BuilderData {
            record: self.record,
            data: Cow::Owned(self.data.into_owned()),
            changed: self.changed,
        }
    }

    pub(crate) fn record(&self) -> &TableRecord {
        &self.record
    }

    pub(crate) fn tag(&self) -> TableTag {
        self.record.tag
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.data).for_table(self.record.tag)
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut Vec<u8> {
        self.changed = true;
        self.data.to_mut()
    }

    pub(crate) fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.changed = true;
        self.data = Cow::Owned(bytes);
    }

    pub(crate) fn read_u16(&self, offset: usize) -> Result<u16, ParseError> {
        let mut cursor = self.cursor();
        cursor.skip(offset)?;
        cursor.read_u16()
    }

    pub(crate) fn read_u32(&self, offset: usize) -> Result<u32, ParseError> {
        let mut cursor = self.cursor();
        cursor.skip(offset)?;
        cursor.read_u32()
    }

    /// Patches a big-endian value in the table data. Does nothing (and doesn't mark the data
    /// as changed) if the value is the same.
    fn patch<const N: usize>(&mut self, offset: usize, value: [u8; N]) -> Result<(), ParseError> {
        let range = offset..offset + N;
        let current = self.data.get(range.clone()).ok_or_else(|| {
            self.cursor().err(ParseErrorKind::RangeOutOfBounds {
                range: range.clone(),
                len: self.data.len(),
            })
        })?;
        if current != value {
            self.bytes_mut()[range].copy_from_slice(&value);
        }
        Ok(())
    }

    pub(crate) fn write_u16(&mut self, offset: usize, value: u16) -> Result<(), ParseError> {
        self.patch(offset, value.to_be_bytes())
    }

    pub(crate) fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), ParseError> {
        self.patch(offset, value.to_be_bytes())
    }

    pub(crate) fn not_ready(&self) -> BuildError {
        BuildError::new(self.tag(), BuildErrorKind::NotReady)
    }

    pub(crate) fn error(&self, kind: BuildErrorKind) -> BuildError {
        BuildError::new(self.tag(), kind)
    }

    pub(crate) fn to_table(&self) -> Table<'a> {
        Table::new(self.record, self.data.clone())
    }

    pub(crate) fn to_table_with(&self, data: Vec<u8>) -> Table<'a> {
        Table::new(self.record, Cow::Owned(data))
    }
}

/// Builder for tables without dependencies on other tables. The table data is treated
/// as opaque bytes.
#[derive(Debug, Clone)]
pub struct GenericBuilder<'a> {
    raw: BuilderData<'a>,
}

impl<'a> GenericBuilder<'a> {
    pub(crate) fn new(raw: BuilderData<'a>) -> Self {
        Self { raw }
    }

    /// Returns the table data.
    pub fn data(&self) -> &[u8] {
        self.raw.bytes()
    }

    /// Returns mutable table data. The table is considered changed after this call.
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        self.raw.bytes_mut()
    }

    /// Replaces the table data.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.raw.set_bytes(data);
    }
}

impl<'a> TableBuilder<'a> for GenericBuilder<'a> {
    fn record(&self) -> &TableRecord {
        self.raw.record()
    }

    fn ready_to_build(&self) -> bool {
        true
    }

    fn changed(&self) -> bool {
        self.raw.changed()
    }

    fn build(&self) -> Result<Table<'a>, BuildError> {
        Ok(self.raw.to_table())
    }
}

/// Builder for any table, dispatched by the table tag.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyTableBuilder<'a> {
    /// Font header (`head` or `bhed`).
    Head(HeadBuilder<'a>),
    /// Horizontal header (`hhea`).
    Hhea(HheaBuilder<'a>),
    /// Maximum profile (`maxp`).
    Maxp(MaxpBuilder<'a>),
    /// Horizontal metrics (`hmtx`).
    Hmtx(HmtxBuilder<'a>),
    /// Horizontal device metrics (`hdmx`).
    Hdmx(HdmxBuilder<'a>),
    /// Index to location (`loca`).
    Loca(LocaBuilder<'a>),
    /// Any other table.
    Generic(GenericBuilder<'a>),
}

impl<'a> AnyTableBuilder<'a> {
    /// Creates a builder for the table described by `record`.
    pub(crate) fn for_tag(record: TableRecord, data: Cow<'a, [u8]>) -> Self {
        Self::from_raw(BuilderData::new(record, data))
    }

    /// Creates a builder for a table not present in the loaded font data. Such a table
    /// is considered changed.
    pub(crate) fn new_table(tag: TableTag, data: Cow<'a, [u8]>) -> Self {
        let mut raw = BuilderData::new(TableRecord::new(tag), data);
        raw.changed = true;
        Self::from_raw(raw)
    }

    fn from_raw(raw: BuilderData<'a>) -> Self {
        match raw.tag() {
            TableTag::HEAD | TableTag::BHED => Self::Head(HeadBuilder::new(raw)),
            TableTag::HHEA => Self::Hhea(HheaBuilder::new(raw)),
            TableTag::MAXP => Self::Maxp(MaxpBuilder::new(raw)),
            TableTag::HMTX => Self::Hmtx(HmtxBuilder::new(raw)),
            TableTag::HDMX => Self::Hdmx(HdmxBuilder::new(raw)),
            TableTag::LOCA => Self::Loca(LocaBuilder::new(raw)),
            _ => Self::Generic(GenericBuilder::new(raw)),
        }
    }

    fn as_dyn(&self) -> &dyn TableBuilder<'a> {
        match self {
            Self::Head(builder) => builder,
            Self::Hhea(builder) => builder,
            Self::Maxp(builder) => builder,
            Self::Hmtx(builder) => builder,
            Self::Hdmx(builder) => builder,
            Self::Loca(builder) => builder,
            Self::Generic(builder) => builder,
        }
    }

    /// Converts this builder to one that owns its data.
    pub fn into_owned(self) -> AnyTableBuilder<'static> {
        match self {
            Self::Head(builder) => AnyTableBuilder::Head(builder.into_owned()),
            Self::Hhea(builder) => AnyTableBuilder::Hhea(builder.into_owned()),
            Self::Maxp(builder) => AnyTableBuilder::Maxp(builder.into_owned()),
            Self::Hmtx(builder) => AnyTableBuilder::Hmtx(builder.into_owned()),
            Self::Hdmx(builder) => AnyTableBuilder::Hdmx(builder.into_owned()),
            Self::Loca(builder) => AnyTableBuilder::Loca(builder.into_owned()),
            Self::Generic(builder) => AnyTableBuilder::Generic(GenericBuilder {
                raw: builder.raw.into_owned(),
            }),
        }
    }
}

impl<'a> TableBuilder<'a> for AnyTableBuilder<'a> {
    fn record(&self) -> &TableRecord {
        self.as_dyn().record()
    }

    fn ready_to_build(&self) -> bool {
        self.as_dyn().ready_to_build()
    }

    fn changed(&self) -> bool {
        self.as_dyn().changed()
    }

    fn build(&self) -> Result<Table<'a>, BuildError> {
        self.as_dyn().build()
    }
}
