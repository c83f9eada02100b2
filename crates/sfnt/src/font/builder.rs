//! Mutable [`FontBuilder`] and font loading.

use std::{
    borrow::Cow,
    collections::{btree_map, BTreeMap, BTreeSet},
    io::{self, Read},
};

use super::{Cursor, Digest, Font, TableRecord, TableTag};
use crate::{
    errors::{BuildErrorKind, ParseErrorKind},
    tables::{table_checksum, AnyTableBuilder, LocaFormat, TableBuilder},
    BuildError, ParseError,
};

/// Mutable font consisting of [table builders](AnyTableBuilder).
///
/// A builder is created empty, loaded from font data or converted from a [`Font`]. Tables
/// are edited via their builders; [`Self::build()`] consumes the builder and produces
/// an immutable `Font`.
///
/// Some tables depend on data from other tables: `hmtx` on the glyph count from `maxp`
/// and the number of long metrics from `hhea`, `loca` on the glyph count and on the format
/// from `head`, and `hdmx` on the glyph count. These values are pushed into dependent
/// builders by [`Self::resolve_dependencies()`], which is called on load and before
/// the font is built.
#[derive(Debug, Clone)]
pub struct FontBuilder<'a> {
    sfnt_version: u32,
    digest: Option<Digest>,
    table_builders: BTreeMap<TableTag, AnyTableBuilder<'a>>,
}

impl Default for FontBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> FontBuilder<'a> {
    /// Length of the sfnt header preceding the table directory.
    const HEADER_LEN: usize = 12;

    /// Creates an empty builder for a font with TrueType outlines.
    pub fn new() -> Self {
        Self {
            sfnt_version: Font::SFNT_VERSION_TRUETYPE,
            digest: None,
            table_builders: BTreeMap::new(),
        }
    }

    /// Loads a font from the provided bytes. Table data is borrowed from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the font data is malformed.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ParseError> {
        Self::load(bytes, 0, false)
    }

    /// Loads a font with the table directory at `offset` in `bytes`. Table offsets are
    /// relative to the start of `bytes`, which is how fonts in a collection are laid out.
    pub(crate) fn load(
        bytes: &'a [u8],
        offset: usize,
        verify_checksums: bool,
    ) -> Result<Self, ParseError> {
        let font_data = Cursor::new(bytes);
        let mut cursor = font_data;
        cursor.skip(offset)?;
        let (sfnt_version, num_tables) = Self::parse_header(&mut cursor)?;
        let records = Self::parse_records(&mut cursor, num_tables)?;

        let mut table_builders = BTreeMap::new();
        let mut prev_end = 0;
        for record in records {
            let table_data = font_data
                .range(record.data_range())
                .map_err(|err| err.with_table(record.tag))?;
            if record.data_range().start < prev_end {
                log::warn!(
                    "table '{}' at {} overlaps with the previous table ending at {prev_end}",
                    record.tag,
                    record.offset
                );
            }
            prev_end = prev_end.max(record.data_range().end);

            Self::check_checksum(&record, table_data.bytes, verify_checksums)?;
            log::trace!("loaded table {record:?}");
            let builder = AnyTableBuilder::for_tag(record, Cow::Borrowed(table_data.bytes));
            table_builders.insert(record.tag, builder);
        }

        let mut this = Self {
            sfnt_version,
            digest: None,
            table_builders,
        };
        this.resolve_dependencies();
        Ok(this)
    }

    fn parse_header(cursor: &mut Cursor<'_>) -> Result<(u32, u16), ParseError> {
        let sfnt_version = cursor.read_u32_checked(|version| {
            if Font::is_supported_version(version) {
                Ok(version)
            } else {
                Err(ParseErrorKind::UnexpectedFontVersion(version))
            }
        })?;
        let num_tables = cursor.read_u16()?;
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift
        Ok((sfnt_version, num_tables))
    }

    /// Parses the table directory. Returned records are sorted by offset.
    fn parse_records(
        cursor: &mut Cursor<'_>,
        num_tables: u16,
    ) -> Result<Vec<TableRecord>, ParseError> {
        let mut tags = BTreeSet::new();
        let mut records = Vec::with_capacity(num_tables.into());
        for _ in 0..num_tables {
            let record_start = *cursor;
            let record = TableRecord::parse(cursor)?;
            if !tags.insert(record.tag) {
                let err = record_start.err(ParseErrorKind::DuplicateTable);
                return Err(err.with_table(record.tag));
            }
            records.push(record);
        }
        records.sort_unstable_by(TableRecord::cmp_by_offset);
        log::debug!("parsed table directory with {num_tables} table(s): {tags:?}");
        Ok(records)
    }

    fn check_checksum(
        record: &TableRecord,
        table_data: &[u8],
        verify_checksums: bool,
    ) -> Result<(), ParseError> {
        let calculated = table_checksum(record.tag, table_data);
        if calculated == record.checksum {
            return Ok(());
        }

        if verify_checksums {
            let err = ParseError::new(ParseErrorKind::Checksum {
                expected: calculated,
                actual: record.checksum,
            });
            Err(err.at(record.offset as usize).with_table(record.tag))
        } else {
            log::warn!(
                "checksum mismatch for table '{}': calculated {calculated:#010x}, \
                 directory has {:#010x}",
                record.tag,
                record.checksum
            );
            Ok(())
        }
    }

    /// Converts a built font back into a builder so that it can be edited.
    pub fn from_font(font: Font<'a>) -> Self {
        let table_builders = font
            .tables
            .into_iter()
            .map(|(tag, table)| {
                let (record, data) = table.into_parts();
                (tag, AnyTableBuilder::for_tag(record, data))
            })
            .collect();
        let mut this = Self {
            sfnt_version: font.sfnt_version,
            digest: font.digest,
            table_builders,
        };
        this.resolve_dependencies();
        this
    }

    /// Returns the sfnt version.
    pub fn sfnt_version(&self) -> u32 {
        self.sfnt_version
    }

    /// Sets the sfnt version.
    pub fn set_sfnt_version(&mut self, version: u32) {
        self.sfnt_version = version;
    }

    /// Returns the SHA-1 fingerprint of the data this builder was loaded from.
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    pub(crate) fn set_digest(&mut self, digest: Digest) {
        self.digest = Some(digest);
    }

    /// Checks whether there is a builder for the table with the specified tag.
    pub fn has_table_builder(&self, tag: TableTag) -> bool {
        self.table_builders.contains_key(&tag)
    }

    /// Gets a builder for the table with the specified tag.
    pub fn table_builder(&self, tag: TableTag) -> Option<&AnyTableBuilder<'a>> {
        self.table_builders.get(&tag)
    }

    /// Gets a mutable builder for the table with the specified tag.
    pub fn table_builder_mut(&mut self, tag: TableTag) -> Option<&mut AnyTableBuilder<'a>> {
        self.table_builders.get_mut(&tag)
    }

    /// Iterates over tags of all tables in this builder in the tag order.
    pub fn table_tags(&self) -> impl Iterator<Item = TableTag> + '_ {
        self.table_builders.keys().copied()
    }

    /// Creates a builder for a new empty table. An existing builder with the same tag
    /// is replaced.
    pub fn new_table_builder(&mut self, tag: TableTag) -> &mut AnyTableBuilder<'a> {
        self.new_table_builder_with_data(tag, Vec::<u8>::new())
    }

    /// Creates a builder for a new table with the specified data. An existing builder
    /// with the same tag is replaced.
    pub fn new_table_builder_with_data(
        &mut self,
        tag: TableTag,
        data: impl Into<Cow<'a, [u8]>>,
    ) -> &mut AnyTableBuilder<'a> {
        let builder = AnyTableBuilder::new_table(tag, data.into());
        match self.table_builders.entry(tag) {
            btree_map::Entry::Vacant(entry) => entry.insert(builder),
            btree_map::Entry::Occupied(mut entry) => {
                log::debug!("replacing builder for table '{tag}'");
                entry.insert(builder);
                entry.into_mut()
            }
        }
    }

    /// Removes the builder for the table with the specified tag.
    pub fn remove_table_builder(&mut self, tag: TableTag) -> Option<AnyTableBuilder<'a>> {
        self.table_builders.remove(&tag)
    }

    /// Converts this builder to one that owns all table data.
    pub fn into_owned(self) -> FontBuilder<'static> {
        FontBuilder {
            sfnt_version: self.sfnt_version,
            digest: self.digest,
            table_builders: self
                .table_builders
                .into_iter()
                .map(|(tag, builder)| (tag, builder.into_owned()))
                .collect(),
        }
    }

    fn read_dependency<T>(tag: TableTag, value: Result<T, ParseError>) -> Option<T> {
        value
            .map_err(|err| log::warn!("cannot read dependency from table '{tag}': {err}"))
            .ok()
    }

    /// Pushes values from `maxp`, `hhea` and `head` into the dependent `hmtx`, `loca`
    /// and `hdmx` builders. Values that cannot be read (e.g., because the source table
    /// is missing) are not pushed.
    pub fn resolve_dependencies(&mut self) {
        let num_glyphs = match self.table_builders.get(&TableTag::MAXP) {
            Some(AnyTableBuilder::Maxp(maxp)) => {
                Self::read_dependency(TableTag::MAXP, maxp.num_glyphs())
            }
            _ => None,
        };
        let number_of_h_metrics = match self.table_builders.get(&TableTag::HHEA) {
            Some(AnyTableBuilder::Hhea(hhea)) => {
                Self::read_dependency(TableTag::HHEA, hhea.number_of_h_metrics())
            }
            _ => None,
        };
        let head = self
            .table_builders
            .get(&TableTag::HEAD)
            .or_else(|| self.table_builders.get(&TableTag::BHED));
        let loca_format: Option<LocaFormat> = match head {
            Some(AnyTableBuilder::Head(head)) => {
                Self::read_dependency(head.tag(), head.index_to_loc_format())
            }
            _ => None,
        };
        log::trace!(
            "resolved dependencies: num_glyphs={num_glyphs:?}, \
             number_of_h_metrics={number_of_h_metrics:?}, loca_format={loca_format:?}"
        );

        for builder in self.table_builders.values_mut() {
            match builder {
                AnyTableBuilder::Hmtx(hmtx) => hmtx.resolve(num_glyphs, number_of_h_metrics),
                AnyTableBuilder::Loca(loca) => loca.resolve(num_glyphs, loca_format),
                AnyTableBuilder::Hdmx(hdmx) => hdmx.resolve(num_glyphs),
                _ => { /* no dependencies */ }
            }
        }
    }

    /// Builds the font, consuming this builder.
    ///
    /// Dependencies are resolved again, so that edits of `maxp`, `hhea` or `head` are
    /// propagated. The font header table is built last; if any other table has changed,
    /// it receives the checksum of the other tables.
    ///
    /// # Errors
    ///
    /// Returns an error if any table builder is not ready to build or cannot encode its state,
    /// or if there are more tables than the font directory can list.
    pub fn build(mut self) -> Result<Font<'a>, BuildError> {
        let max_tables = usize::from(u16::MAX);
        if let Some(&tag) = self.table_builders.keys().nth(max_tables) {
            let kind = BuildErrorKind::TooManyEntries {
                actual: self.table_builders.len(),
            };
            return Err(BuildError::new(tag, kind));
        }
        self.resolve_dependencies();

        let header_tag = [TableTag::HEAD, TableTag::BHED]
            .into_iter()
            .find(|tag| self.table_builders.contains_key(tag));
        let header_builder = header_tag.and_then(|tag| self.table_builders.remove(&tag));

        let mut tables = BTreeMap::new();
        let mut checksum = 0_u32;
        let mut changed = false;
        for (tag, builder) in self.table_builders {
            let table = builder.build()?;
            changed |= builder.changed();
            checksum = checksum.wrapping_add(table.calculated_checksum());
            log::trace!(
                "built table '{tag}': {} bytes, checksum {:#010x}",
                table.data_len(),
                table.calculated_checksum()
            );
            tables.insert(tag, table);
        }

        if let Some(mut header_builder) = header_builder {
            if let AnyTableBuilder::Head(head) = &mut header_builder {
                if changed {
                    head.set_font_checksum(checksum);
                }
            }
            let table = header_builder.build()?;
            checksum = checksum.wrapping_add(table.calculated_checksum());
            tables.insert(table.tag(), table);
        }

        log::debug!(
            "built font with {} table(s), checksum {checksum:#010x}, changed: {changed}",
            tables.len()
        );
        Ok(Font {
            sfnt_version: self.sfnt_version,
            digest: self.digest,
            checksum,
            tables,
        })
    }
}

/// Reader tracking its position in the stream for error reporting.
#[derive(Debug)]
struct StreamReader<R> {
    inner: R,
    position: usize,
}

impl<R: Read> StreamReader<R> {
    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, ParseError> {
        let mut buffer = Vec::new();
        (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut buffer)
            .map_err(|err| ParseError::from(err).at(self.position))?;
        self.position += buffer.len();
        if buffer.len() < len {
            return Err(ParseError::new(ParseErrorKind::UnexpectedEof).at(self.position));
        }
        Ok(buffer)
    }

    fn skip_to(&mut self, offset: usize) -> Result<(), ParseError> {
        let Some(skipped_len) = offset.checked_sub(self.position) else {
            return Err(ParseError::new(ParseErrorKind::OverlappingTable {
                offset,
                position: self.position,
            })
            .at(offset));
        };
        let skipped = io::copy(
            &mut (&mut self.inner).take(skipped_len as u64),
            &mut io::sink(),
        )
        .map_err(|err| ParseError::from(err).at(self.position))?;
        // `skipped <= skipped_len`, so the conversion is lossless
        self.position += skipped as usize;
        if self.position < offset {
            return Err(ParseError::new(ParseErrorKind::UnexpectedEof).at(self.position));
        }
        Ok(())
    }
}

impl FontBuilder<'static> {
    /// Loads a font from a stream. The stream is read up to the end of the last table;
    /// table data is copied since the stream cannot be revisited.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the stream fails or the font data is malformed.
    /// In particular, tables must not overlap since they are read in a single pass.
    pub fn from_reader(reader: impl Read) -> Result<Self, ParseError> {
        Self::load_stream(reader, false)
    }

    pub(crate) fn load_stream(
        reader: impl Read,
        verify_checksums: bool,
    ) -> Result<Self, ParseError> {
        let mut reader = StreamReader {
            inner: reader,
            position: 0,
        };

        let mut directory = reader.read_vec(Self::HEADER_LEN)?;
        let (sfnt_version, num_tables) = Self::parse_header(&mut Cursor::new(&directory))?;
        let records_len = usize::from(num_tables) * TableRecord::BYTE_LEN;
        directory.extend(reader.read_vec(records_len)?);
        let mut cursor = Cursor::new(&directory);
        cursor.skip(Self::HEADER_LEN)?;
        let records = Self::parse_records(&mut cursor, num_tables)?;

        let mut table_builders = BTreeMap::new();
        for record in records {
            let range = record.data_range();
            reader
                .skip_to(range.start)
                .map_err(|err| err.with_table(record.tag))?;
            let table_data = reader
                .read_vec(range.len())
                .map_err(|err| err.with_table(record.tag))?;

            Self::check_checksum(&record, &table_data, verify_checksums)?;
            log::trace!("read table {record:?}");
            let builder = AnyTableBuilder::for_tag(record, Cow::Owned(table_data));
            table_builders.insert(record.tag, builder);
        }

        let mut this = Self {
            sfnt_version,
            digest: None,
            table_builders,
        };
        this.resolve_dependencies();
        Ok(this)
    }
}
