//! Logic for serializing [`Font`]s in OpenType and WOFF2 formats.

use std::{io, iter};

use crate::{font::checksum, tables::Table, Font, TableRecord, TableTag};

mod brotli;

pub(crate) fn write_u16(writer: &mut Vec<u8>, value: u16) {
    writer.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_i16(writer: &mut Vec<u8>, value: i16) {
    writer.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u32(writer: &mut Vec<u8>, value: u32) {
    writer.extend_from_slice(&value.to_be_bytes());
}

fn uint_base128_len(val: u32) -> usize {
    if val == 0 {
        1
    } else {
        val.ilog2() as usize / 7 + 1
    }
}

#[allow(clippy::cast_possible_truncation)] // intentional
fn write_uint_base128(buffer: &mut Vec<u8>, val: u32) {
    if val >= 1 << 28 {
        buffer.push(0x80 | (val >> 28) as u8);
    }
    if val >= 1 << 21 {
        buffer.push(0x80 | (val >> 21) as u8);
    }
    if val >= 1 << 14 {
        buffer.push(0x80 | (val >> 14) as u8);
    }
    if val >= 1 << 7 {
        buffer.push(0x80 | (val >> 7) as u8);
    }
    buffer.push((val & 127) as u8);
}

/// Computes `(searchRange, entrySelector, rangeShift)` for the sfnt header.
#[allow(clippy::cast_possible_truncation)] // values are truncated for more than 4095 tables
fn search_params(table_count: u16) -> (u16, u16, u16) {
    if table_count == 0 {
        return (0, 0, 0);
    }
    let entry_selector = table_count.ilog2();
    let search_range = 16_u32 << entry_selector;
    let range_shift = 16 * u32::from(table_count) - search_range;
    (search_range as u16, entry_selector as u16, range_shift as u16)
}

/// Tags with a predefined index in the WOFF2 table directory.
const WOFF2_KNOWN_TAGS: [TableTag; 63] = [
    TableTag::CMAP,
    TableTag::HEAD,
    TableTag::HHEA,
    TableTag::HMTX,
    TableTag::MAXP,
    TableTag::NAME,
    TableTag::OS2,
    TableTag::POST,
    TableTag::CVT,
    TableTag::FPGM,
    TableTag::GLYF,
    TableTag::LOCA,
    TableTag::PREP,
    TableTag::CFF,
    TableTag::VORG,
    TableTag::EBDT,
    TableTag::EBLC,
    TableTag::GASP,
    TableTag::HDMX,
    TableTag::KERN,
    TableTag::LTSH,
    TableTag::PCLT,
    TableTag::VDMX,
    TableTag::VHEA,
    TableTag::VMTX,
    TableTag::BASE,
    TableTag::GDEF,
    TableTag::GPOS,
    TableTag::GSUB,
    TableTag::EBSC,
    TableTag::JSTF,
    TableTag(*b"MATH"),
    TableTag(*b"CBDT"),
    TableTag(*b"CBLC"),
    TableTag(*b"COLR"),
    TableTag(*b"CPAL"),
    TableTag(*b"SVG "),
    TableTag(*b"sbix"),
    TableTag(*b"acnt"),
    TableTag(*b"avar"),
    TableTag::BDAT,
    TableTag::BLOC,
    TableTag(*b"bsln"),
    TableTag(*b"cvar"),
    TableTag(*b"fdsc"),
    TableTag(*b"feat"),
    TableTag(*b"fmtx"),
    TableTag(*b"fvar"),
    TableTag(*b"gvar"),
    TableTag(*b"hsty"),
    TableTag(*b"just"),
    TableTag(*b"lcar"),
    TableTag(*b"mort"),
    TableTag(*b"morx"),
    TableTag(*b"opbd"),
    TableTag(*b"prop"),
    TableTag(*b"trak"),
    TableTag(*b"Zapf"),
    TableTag(*b"Silf"),
    TableTag(*b"Glat"),
    TableTag(*b"Gloc"),
    TableTag(*b"Feat"),
    TableTag(*b"Sill"),
];

impl TableRecord {
    fn write_opentype(&self, writer: &mut Vec<u8>) {
        writer.extend_from_slice(&self.tag.0);
        write_u32(writer, self.checksum);
        write_u32(writer, self.offset);
        write_u32(writer, self.length);
    }

    fn self_checksum(&self) -> u32 {
        self.tag
            .as_u32()
            .wrapping_add(self.checksum)
            .wrapping_add(self.offset)
            .wrapping_add(self.length)
    }

    fn woff2_tag_index(&self) -> Option<u8> {
        let idx = WOFF2_KNOWN_TAGS.iter().position(|&tag| tag == self.tag)?;
        // `unwrap()` is safe: there are 63 known tags
        Some(u8::try_from(idx).unwrap())
    }

    fn woff2_len(&self) -> usize {
        let tag_len = if self.woff2_tag_index().is_some() {
            0
        } else {
            4
        };
        1 /* flags */ + tag_len + uint_base128_len(self.length)
    }

    fn write_woff2(&self, buffer: &mut Vec<u8>) {
        const NULL_TRANSFORM: u8 = 0b_1100_0000;
        const ARBITRARY_TAG: u8 = 63;

        match self.woff2_tag_index() {
            Some(idx) if matches!(self.tag, TableTag::GLYF | TableTag::LOCA) => {
                buffer.push(idx | NULL_TRANSFORM);
            }
            Some(idx) => buffer.push(idx),
            None => {
                buffer.push(ARBITRARY_TAG);
                buffer.extend_from_slice(&self.tag.0);
            }
        }
        write_uint_base128(buffer, self.length);
    }
}

#[derive(Debug, Clone)]
struct FontWriter {
    sfnt_version: u32,
    /// Table records in the layout order.
    tables: Vec<TableRecord>,
    /// Contains *aligned* table data
    table_data: Vec<u8>,
}

impl FontWriter {
    const SFNT_HEADER_LEN: usize = 12;
    const WOFF2_HEADER_LEN: usize = 48;

    fn new(sfnt_version: u32) -> Self {
        Self {
            sfnt_version,
            tables: vec![],
            table_data: vec![],
        }
    }

    fn write_table(&mut self, table: &Table<'_>) {
        let offset = self.table_data.len();
        debug_assert_eq!(offset % 4, 0, "unaligned offset: {offset}");

        self.table_data.extend_from_slice(table.data());
        let length = table.data_len();
        // Pad the table heap to a 4-byte boundary.
        if length % 4 > 0 {
            let zero_padding = 4 - length % 4;
            self.table_data.extend(iter::repeat_n(0_u8, zero_padding));
        }

        self.tables.push(TableRecord {
            tag: table.tag(),
            checksum: table.calculated_checksum(),
            offset: u32::try_from(offset).expect("table offset overflow"),
            length: u32::try_from(length).expect("table length overflow"),
        });
    }

    fn write_sfnt_header(&self) -> Vec<u8> {
        let mut buffer = vec![];
        write_u32(&mut buffer, self.sfnt_version);

        let table_count = u16::try_from(self.tables.len()).expect("too many tables");
        write_u16(&mut buffer, table_count);
        let (search_range, entry_selector, range_shift) = search_params(table_count);
        write_u16(&mut buffer, search_range);
        write_u16(&mut buffer, entry_selector);
        write_u16(&mut buffer, range_shift);

        debug_assert_eq!(buffer.len(), Self::SFNT_HEADER_LEN);
        buffer
    }

    /// Returns the starting offset of table data.
    fn data_offset(&self) -> usize {
        Self::SFNT_HEADER_LEN + self.tables.len() * TableRecord::BYTE_LEN
    }

    fn into_opentype(mut self) -> Vec<u8> {
        let mut buffer = self.write_sfnt_header();
        self.adjust_data(checksum(&buffer));

        self.tables.sort_unstable_by(TableRecord::cmp_by_tag);
        for record in &self.tables {
            record.write_opentype(&mut buffer);
        }
        debug_assert_eq!(buffer.len(), self.data_offset());
        buffer.extend(self.table_data);
        buffer
    }

    /// Shifts table offsets past the table directory and patches the `checkSumAdjustment`
    /// field of the font header table.
    fn adjust_data(&mut self, sfnt_header_checksum: u32) {
        let data_offset = self.data_offset();
        let data_offset_u32 = u32::try_from(data_offset).expect("data_offset overflow");

        let mut file_checksum = sfnt_header_checksum;
        for record in &mut self.tables {
            record.offset += data_offset_u32;
            file_checksum = file_checksum
                .wrapping_add(record.self_checksum())
                .wrapping_add(record.checksum);
        }
        self.patch_head_table(file_checksum, data_offset);
    }

    fn checksum_adjustment_offset(&self) -> Option<usize> {
        let head_table = [TableTag::HEAD, TableTag::BHED].into_iter().find_map(|tag| {
            self.tables.iter().find(|record| record.tag == tag)
        })?;
        if (head_table.length as usize) < Font::HEAD_CHECKSUM_OFFSET + 4 {
            log::warn!("font header table is too short to hold checksum adjustment");
            return None;
        }
        Some(head_table.offset as usize + Font::HEAD_CHECKSUM_OFFSET)
    }

    fn patch_head_table(&mut self, file_checksum: u32, data_offset: usize) {
        let Some(adjustment_offset) = self.checksum_adjustment_offset() else {
            return;
        };
        let checksum_adjustment = Font::SFNT_CHECKSUM.wrapping_sub(file_checksum);
        log::trace!("setting checksum adjustment to {checksum_adjustment:#010x}");

        // The table offset already includes the heap offset, so we need to subtract it.
        let offset = adjustment_offset - data_offset;
        self.table_data[offset..offset + 4].copy_from_slice(&checksum_adjustment.to_be_bytes());
    }

    fn into_woff2(mut self) -> Vec<u8> {
        const WOFF2_SIGNATURE: u32 = 0x_774f_4632;

        self.adjust_data(checksum(&self.write_sfnt_header()));

        let compressed_data = self.compress_data();
        let tables_len = self
            .tables
            .iter()
            .map(TableRecord::woff2_len)
            .sum::<usize>();
        let mut file_len = Self::WOFF2_HEADER_LEN + tables_len + compressed_data.len();
        if file_len % 4 != 0 {
            file_len += 4 - file_len % 4;
        }

        let mut buffer = vec![];
        write_u32(&mut buffer, WOFF2_SIGNATURE);
        write_u32(&mut buffer, self.sfnt_version);
        write_u32(
            &mut buffer,
            file_len.try_into().expect("file length overflow"),
        );
        // `unwrap()` is safe: the table count was checked when writing the sfnt header
        write_u16(&mut buffer, self.tables.len().try_into().unwrap());
        write_u16(&mut buffer, 0); // reserved

        let decompressed_len = self.data_offset() + self.table_data.len();
        write_u32(
            &mut buffer,
            decompressed_len.try_into().expect("font length overflow"),
        );
        write_u32(
            &mut buffer,
            compressed_data.len().try_into().expect("file length overflow"),
        );
        write_u32(&mut buffer, 0); // WOFF version
        write_u32(&mut buffer, 0); // metadata offset
        write_u32(&mut buffer, 0); // metadata length
        write_u32(&mut buffer, 0); // original metadata length
        write_u32(&mut buffer, 0); // private block offset
        write_u32(&mut buffer, 0); // private block length
        debug_assert_eq!(buffer.len(), Self::WOFF2_HEADER_LEN);

        for record in &self.tables {
            record.write_woff2(&mut buffer);
        }
        debug_assert_eq!(buffer.len(), Self::WOFF2_HEADER_LEN + tables_len);
        buffer.extend(compressed_data);

        // Pad `buffer` to be 4-byte aligned. This is required even though we don't have
        // metadata or private blocks.
        if buffer.len() % 4 != 0 {
            let padding = 4 - buffer.len() % 4;
            buffer.extend(iter::repeat_n(0, padding));
        }
        debug_assert_eq!(file_len, buffer.len());
        buffer
    }
}

impl Font<'_> {
    /// Serializes this font in the OpenType (sfnt) format.
    ///
    /// Tables are laid out according to the [effective ordering](Self::generate_table_ordering())
    /// derived from `table_ordering`; the table directory is sorted by tag. Search parameters
    /// and the `checkSumAdjustment` field of the font header are recomputed.
    ///
    /// Table payloads are written as is, except for bytes 8..12 of `head` (or `bhed`)
    /// which receive the checksum adjustment for the produced layout. Hence, the header table
    /// of a re-parsed font may differ from [`Self::table()`] in this field, while
    /// [`Self::checksum()`] stays the same.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the writer.
    pub fn serialize<W: io::Write + ?Sized>(
        &self,
        writer: &mut W,
        table_ordering: Option<&[TableTag]>,
    ) -> io::Result<()> {
        writer.write_all(&self.to_bytes(table_ordering))
    }

    /// Serializes this font in the OpenType (sfnt) format into a byte vector.
    /// See [`Self::serialize()`] for details.
    pub fn to_bytes(&self, table_ordering: Option<&[TableTag]>) -> Vec<u8> {
        let bytes = self.to_writer(table_ordering).into_opentype();
        log::debug!(
            "serialized font with {} table(s) into {} bytes",
            self.num_tables(),
            bytes.len()
        );
        bytes
    }

    /// Serializes this font in the WOFF2 format. Tables are not transformed; the table data
    /// is compressed with Brotli.
    pub fn to_woff2(&self, table_ordering: Option<&[TableTag]>) -> Vec<u8> {
        let mut ordering = self.generate_table_ordering(table_ordering);
        // `loca` must immediately follow `glyf` in WOFF2
        if let Some(loca_pos) = ordering.iter().position(|&tag| tag == TableTag::LOCA) {
            if ordering.contains(&TableTag::GLYF) {
                ordering.remove(loca_pos);
                // `unwrap()` is safe due to the check above
                let glyf_pos = ordering.iter().position(|&tag| tag == TableTag::GLYF).unwrap();
                ordering.insert(glyf_pos + 1, TableTag::LOCA);
            }
        }
        let bytes = self.writer_for_ordering(&ordering).into_woff2();
        log::debug!(
            "serialized font with {} table(s) into {} bytes of WOFF2",
            self.num_tables(),
            bytes.len()
        );
        bytes
    }

    fn to_writer(&self, table_ordering: Option<&[TableTag]>) -> FontWriter {
        let ordering = self.generate_table_ordering(table_ordering);
        self.writer_for_ordering(&ordering)
    }

    fn writer_for_ordering(&self, ordering: &[TableTag]) -> FontWriter {
        let mut writer = FontWriter::new(self.sfnt_version);
        for &tag in ordering {
            let table = self
                .table(tag)
                .expect("table out of sync with font header");
            writer.write_table(table);
        }
        writer
    }
}

#[cfg(test)]
mod tests {
    use allsorts::{binary::read::ReadScope, font_data::FontData, tables::FontTableProvider};
    use pretty_assertions::assert_eq;
    use test_casing::test_casing;

    use super::*;
    use crate::{
        tables::TableBuilder,
        tests::{cff_font, truetype_font, FontFlavor},
        FontBuilder,
    };

    #[test]
    fn leb128_encoding() {
        let samples = &[
            (0_u32, &[0_u8] as &[u8]),
            (1, &[1]),
            (127, &[127]),
            (128, &[0x81, 0]),
            (129, &[0x81, 1]),
            (16_383, &[0xff, 0x7f]),
            (16_384, &[0x81, 0x80, 0]),
        ];
        for &(val, expected) in samples {
            assert_eq!(uint_base128_len(val), expected.len());
            let mut buffer = vec![];
            write_uint_base128(&mut buffer, val);
            assert_eq!(buffer, expected);
        }
    }

    #[test]
    fn computing_search_params() {
        assert_eq!(search_params(0), (0, 0, 0));
        assert_eq!(search_params(1), (16, 0, 0));
        assert_eq!(search_params(5), (64, 2, 16));
        assert_eq!(search_params(8), (128, 3, 0));
        assert_eq!(search_params(20), (256, 4, 64));
    }

    #[test]
    fn woff2_table_records() {
        let mut buffer = vec![];
        TableRecord::with_location(TableTag::HMTX, 0, 0, 10).write_woff2(&mut buffer);
        assert_eq!(buffer, [3, 10]);

        buffer.clear();
        TableRecord::with_location(TableTag::LOCA, 0, 0, 200).write_woff2(&mut buffer);
        assert_eq!(buffer, [11 | 0xc0, 0x81, 0x48]);

        buffer.clear();
        let record = TableRecord::with_location(TableTag::new(*b"zzzz"), 0, 0, 5);
        record.write_woff2(&mut buffer);
        assert_eq!(buffer, [63, b'z', b'z', b'z', b'z', 5]);
        assert_eq!(record.woff2_len(), buffer.len());
    }

    #[test]
    fn empty_font() {
        let font = FontBuilder::new().build().unwrap();
        let bytes = font.to_bytes(None);
        assert_eq!(bytes, [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn opentype_layout() {
        let bytes = truetype_font();
        let font = FontBuilder::from_bytes(&bytes).unwrap().build().unwrap();
        let serialized = font.to_bytes(None);

        let num_tables = usize::from(u16::from_be_bytes([serialized[4], serialized[5]]));
        assert_eq!(num_tables, font.num_tables());
        let records: Vec<_> = serialized[12..12 + 16 * num_tables]
            .chunks_exact(16)
            .map(|chunk| {
                let tag = TableTag::new(chunk[..4].try_into().unwrap());
                let offset = u32::from_be_bytes(chunk[8..12].try_into().unwrap());
                let length = u32::from_be_bytes(chunk[12..].try_into().unwrap());
                (tag, offset as usize, length as usize)
            })
            .collect();
        assert!(records.windows(2).all(|pair| pair[0].0 < pair[1].0));

        let mut layout = records.clone();
        layout.sort_unstable_by_key(|&(_, offset, _)| offset);
        let layout_tags: Vec<_> = layout.iter().map(|&(tag, ..)| tag).collect();
        assert_eq!(layout_tags, font.generate_table_ordering(None));

        let mut expected_offset = 12 + 16 * num_tables;
        for &(tag, offset, length) in &layout {
            assert_eq!(offset, expected_offset, "{tag}");
            assert_eq!(offset % 4, 0);
            let table = font.table(tag).unwrap();
            if tag != TableTag::HEAD {
                assert_eq!(serialized[offset..offset + length], *table.data());
            }
            expected_offset = offset + length.next_multiple_of(4);
        }
        assert_eq!(expected_offset, serialized.len());

        assert_eq!(checksum(&serialized), Font::SFNT_CHECKSUM);
    }

    #[test]
    fn custom_ordering() {
        let bytes = truetype_font();
        let font = FontBuilder::from_bytes(&bytes).unwrap().build().unwrap();
        let ordering = [TableTag::NAME, TableTag::new(*b"none"), TableTag::MAXP];
        let serialized = font.to_bytes(Some(&ordering));
        let first_offset = 12 + 16 * font.num_tables();
        let name = font.table(TableTag::NAME).unwrap();
        assert_eq!(
            serialized[first_offset..first_offset + name.data_len()],
            *name.data()
        );
        assert_eq!(checksum(&serialized), Font::SFNT_CHECKSUM);
    }

    #[test]
    fn checksum_adjustment_in_bhed() {
        let bytes = cff_font();
        let mut builder = FontBuilder::from_bytes(&bytes).unwrap();
        let Some(head) = builder.remove_table_builder(TableTag::HEAD) else {
            panic!("no head table");
        };
        let head = head.build().unwrap();
        builder.new_table_builder_with_data(TableTag::BHED, head.data().to_vec());
        let font = builder.build().unwrap();

        let serialized = font.to_bytes(None);
        assert_eq!(checksum(&serialized), Font::SFNT_CHECKSUM);
    }

    #[test_casing(2, [FontFlavor::TrueType, FontFlavor::Cff])]
    fn opentype_is_read_by_allsorts(flavor: FontFlavor) {
        let bytes = flavor.font_bytes();
        let font = FontBuilder::from_bytes(&bytes).unwrap().build().unwrap();
        let serialized = font.to_bytes(None);

        let font_file = ReadScope::new(&serialized).read::<FontData>().unwrap();
        let font_provider = font_file.table_provider(0).unwrap();
        for (tag, table) in font.tables() {
            let table_contents = font_provider.read_table_data(tag.as_u32()).unwrap();
            if *tag == TableTag::HEAD {
                let offset = Font::HEAD_CHECKSUM_OFFSET;
                assert_eq!(table_contents[..offset], table.data()[..offset]);
                assert_eq!(table_contents[offset + 4..], table.data()[offset + 4..]);
            } else {
                assert_eq!(table_contents.as_ref(), table.data(), "{tag}");
            }
        }
    }

    #[test]
    fn woff2_is_read_by_allsorts() {
        let bytes = cff_font();
        let font = FontBuilder::from_bytes(&bytes).unwrap().build().unwrap();
        let opentype = font.to_bytes(None);
        let woff2 = font.to_woff2(None);
        assert_eq!(woff2[..4], *b"wOF2");
        assert_eq!(woff2[4..8], *b"OTTO");
        assert_eq!(woff2.len() % 4, 0);
        let total_sfnt_size = u32::from_be_bytes(woff2[16..20].try_into().unwrap());
        assert_eq!(total_sfnt_size as usize, opentype.len());

        let font_file = ReadScope::new(&woff2).read::<FontData>().unwrap();
        let font_provider = font_file.table_provider(0).unwrap();
        for (tag, table) in font.tables() {
            let mut table_contents = font_provider
                .read_table_data(tag.as_u32())
                .unwrap()
                .into_owned();
            if *tag == TableTag::HEAD {
                let offset = Font::HEAD_CHECKSUM_OFFSET;
                table_contents[offset..offset + 4]
                    .copy_from_slice(&table.data()[offset..offset + 4]);
            }
            assert_eq!(table_contents, table.data(), "{tag}");
        }
    }

    #[test]
    fn woff2_places_loca_after_glyf() {
        let bytes = truetype_font();
        let font = FontBuilder::from_bytes(&bytes).unwrap().build().unwrap();
        let ordering = font.generate_table_ordering(None);
        let loca_pos = ordering.iter().position(|&tag| tag == TableTag::LOCA).unwrap();
        let glyf_pos = ordering.iter().position(|&tag| tag == TableTag::GLYF).unwrap();
        assert!(loca_pos < glyf_pos);

        let woff2 = font.to_woff2(None);
        let num_tables = usize::from(u16::from_be_bytes([woff2[12], woff2[13]]));
        assert_eq!(num_tables, font.num_tables());
        let flags: Vec<_> = woff2[FontWriter::WOFF2_HEADER_LEN..]
            .iter()
            .copied()
            .filter(|&flags| flags & 0xc0 == 0xc0)
            .take(2)
            .collect();
        assert_eq!(flags, [10 | 0xc0, 11 | 0xc0]);
    }
}
