//! Test fixtures and end-to-end tests.

use std::io::Write as _;

use allsorts::{binary::read::ReadScope, font_data::FontData, tables::FontTableProvider};
use test_casing::test_casing;

use crate::{
    font::checksum, tables::table_checksum, AnyTableBuilder, Font, FontBuilder, FontFactory,
    LocaFormat, TableBuilder, TableRecord, TableTag,
};

pub(crate) fn init_logger() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn write_u16s(buffer: &mut Vec<u8>, values: &[u16]) {
    for value in values {
        buffer.extend_from_slice(&value.to_be_bytes());
    }
}

pub(crate) fn head_table(loca_format: LocaFormat) -> Vec<u8> {
    let mut table = Vec::with_capacity(54);
    table.extend_from_slice(&0x_0001_0000_u32.to_be_bytes()); // version
    table.extend_from_slice(&0x_0001_8000_u32.to_be_bytes()); // fontRevision
    table.extend_from_slice(&[0; 4]); // checkSumAdjustment
    table.extend_from_slice(&0x_5f0f_3cf5_u32.to_be_bytes()); // magicNumber
    write_u16s(&mut table, &[0b1011, 1_000]); // flags, unitsPerEm
    table.extend_from_slice(&[0, 0, 0, 0, 0xdb, 0x3c, 0x11, 0x80]); // created
    table.extend_from_slice(&[0, 0, 0, 0, 0xdb, 0x3c, 0x11, 0x80]); // modified
    // xMin, yMin, xMax, yMax, macStyle, lowestRecPPEM, fontDirectionHint
    write_u16s(&mut table, &[0, 0xff38, 600, 800, 0, 8, 2]);
    let loca_format = match loca_format {
        LocaFormat::Short => 0,
        LocaFormat::Long => 1,
    };
    write_u16s(&mut table, &[loca_format, 0]);
    assert_eq!(table.len(), 54);
    table
}

pub(crate) fn hhea_table(number_of_h_metrics: u16) -> Vec<u8> {
    let mut table = Vec::with_capacity(36);
    table.extend_from_slice(&0x_0001_0000_u32.to_be_bytes());
    // ascender, descender, lineGap, advanceWidthMax, minLeftSideBearing, minRightSideBearing,
    // xMaxExtent, caretSlopeRise, caretSlopeRun, caretOffset
    write_u16s(&mut table, &[800, 0xff38, 0, 600, 0xffec, 0, 600, 1, 0, 0]);
    write_u16s(&mut table, &[0; 5]); // reserved, metricDataFormat
    write_u16s(&mut table, &[number_of_h_metrics]);
    assert_eq!(table.len(), 36);
    table
}

pub(crate) fn maxp_table(num_glyphs: u16) -> Vec<u8> {
    let mut table = 0x_0000_5000_u32.to_be_bytes().to_vec();
    write_u16s(&mut table, &[num_glyphs]);
    table
}

/// Metrics for 3 glyphs with 2 long metrics.
pub(crate) fn hmtx_table() -> Vec<u8> {
    let mut table = vec![];
    write_u16s(&mut table, &[500, 10, 600, 0xffec, 30]);
    table
}

/// Locations `[0, 12, 12, 24]` for 3 glyphs.
pub(crate) fn loca_table(format: LocaFormat) -> Vec<u8> {
    let mut table = vec![];
    for location in [0_u16, 12, 12, 24] {
        match format {
            LocaFormat::Short => write_u16s(&mut table, &[location / 2]),
            LocaFormat::Long => table.extend_from_slice(&u32::from(location).to_be_bytes()),
        }
    }
    table
}

fn glyf_table() -> Vec<u8> {
    (0_u8..24).collect()
}

/// Single device record for 3 glyphs.
pub(crate) fn hdmx_table() -> Vec<u8> {
    let mut table = vec![];
    write_u16s(&mut table, &[0, 1]);
    table.extend_from_slice(&8_u32.to_be_bytes());
    table.extend_from_slice(&[12, 7, 5, 6, 7, 0, 0, 0]);
    table
}

fn name_table() -> Vec<u8> {
    // Odd length to check padding
    b"Test font names".to_vec()
}

fn post_table() -> Vec<u8> {
    let mut table = 0x_0003_0000_u32.to_be_bytes().to_vec();
    table.resize(32, 0);
    table
}

fn os2_table() -> Vec<u8> {
    let mut table = vec![];
    write_u16s(&mut table, &[4, 550, 400, 5, 0]);
    table.resize(96, 0);
    table
}

fn cff_table() -> Vec<u8> {
    let mut table = vec![1, 0, 4, 1];
    table.extend_from_slice(b"opaque CFF outlines");
    table
}

/// Tags and data of tables in a TrueType font, in the layout order.
pub(crate) fn truetype_tables() -> Vec<(TableTag, Vec<u8>)> {
    vec![
        (TableTag::HEAD, head_table(LocaFormat::Short)),
        (TableTag::HHEA, hhea_table(2)),
        (TableTag::MAXP, maxp_table(3)),
        (TableTag::OS2, os2_table()),
        (TableTag::HMTX, hmtx_table()),
        (TableTag::HDMX, hdmx_table()),
        (TableTag::LOCA, loca_table(LocaFormat::Short)),
        (TableTag::GLYF, glyf_table()),
        (TableTag::NAME, name_table()),
        (TableTag::POST, post_table()),
        // Unknown table placed last
        (TableTag::new(*b"zzzz"), b"unknown data".to_vec()),
    ]
}

/// Tags and data of tables in a font with CFF outlines, in the layout order.
pub(crate) fn cff_tables() -> Vec<(TableTag, Vec<u8>)> {
    vec![
        (TableTag::HEAD, head_table(LocaFormat::Short)),
        (TableTag::HHEA, hhea_table(2)),
        (TableTag::MAXP, maxp_table(3)),
        (TableTag::OS2, os2_table()),
        (TableTag::NAME, name_table()),
        (TableTag::POST, post_table()),
        (TableTag::CFF, cff_table()),
        (TableTag::HMTX, hmtx_table()),
    ]
}

/// Assembles an sfnt font with tables laid out in the specified order. Table records are sorted
/// by tag, and the checksum adjustment in the font header is set.
pub(crate) fn assemble_sfnt(sfnt_version: u32, tables: &[(TableTag, Vec<u8>)]) -> Vec<u8> {
    let num_tables = u16::try_from(tables.len()).unwrap();
    let data_offset = 12 + 16 * tables.len();
    let mut records = Vec::with_capacity(tables.len());
    let mut data = vec![];
    for (tag, table) in tables {
        let offset = u32::try_from(data_offset + data.len()).unwrap();
        let length = u32::try_from(table.len()).unwrap();
        records.push(TableRecord::with_location(
            *tag,
            table_checksum(*tag, table),
            offset,
            length,
        ));
        data.extend_from_slice(table);
        data.resize(data.len().next_multiple_of(4), 0);
    }
    records.sort_unstable_by(TableRecord::cmp_by_tag);

    let mut bytes = sfnt_version.to_be_bytes().to_vec();
    let (search_range, entry_selector) = match num_tables.checked_ilog2() {
        Some(log) => (16_u16 << log, u16::try_from(log).unwrap()),
        None => (0, 0),
    };
    write_u16s(
        &mut bytes,
        &[num_tables, search_range, entry_selector, 16 * num_tables - search_range],
    );
    for record in &records {
        bytes.extend_from_slice(&record.tag().to_bytes());
        for value in [record.checksum(), record.offset(), record.length()] {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
    }
    assert_eq!(bytes.len(), data_offset);
    bytes.extend_from_slice(&data);

    let head = records.iter().find(|record| record.tag().is_header_table());
    if let Some(head) = head {
        let offset = head.offset() as usize + 8;
        bytes[offset..offset + 4].copy_from_slice(&[0; 4]);
        let adjustment = Font::SFNT_CHECKSUM.wrapping_sub(checksum(&bytes));
        bytes[offset..offset + 4].copy_from_slice(&adjustment.to_be_bytes());
    }
    bytes
}

pub(crate) fn truetype_font() -> Vec<u8> {
    assemble_sfnt(Font::SFNT_VERSION_TRUETYPE, &truetype_tables())
}

pub(crate) fn cff_font() -> Vec<u8> {
    assemble_sfnt(Font::SFNT_VERSION_CFF, &cff_tables())
}

/// Assembles a version 1.0 font collection from standalone fonts.
pub(crate) fn assemble_collection(fonts: &[Vec<u8>]) -> Vec<u8> {
    let num_fonts = u32::try_from(fonts.len()).unwrap();
    let mut bytes = b"ttcf".to_vec();
    bytes.extend_from_slice(&0x_0001_0000_u32.to_be_bytes());
    bytes.extend_from_slice(&num_fonts.to_be_bytes());

    let mut font_offset = bytes.len() + 4 * fonts.len();
    let mut font_data = vec![];
    for font in fonts {
        bytes.extend_from_slice(&u32::try_from(font_offset).unwrap().to_be_bytes());
        let mut font = font.clone();
        let num_tables = usize::from(u16::from_be_bytes([font[4], font[5]]));
        for i in 0..num_tables {
            let offset_pos = 12 + 16 * i + 8;
            let offset = u32::from_be_bytes(font[offset_pos..offset_pos + 4].try_into().unwrap());
            let rebased_offset = offset + u32::try_from(font_offset).unwrap();
            font[offset_pos..offset_pos + 4].copy_from_slice(&rebased_offset.to_be_bytes());
        }
        font_offset += font.len();
        font_data.extend_from_slice(&font);
    }
    bytes.extend_from_slice(&font_data);
    bytes
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum FontFlavor {
    TrueType,
    Cff,
}

impl FontFlavor {
    pub(crate) fn sfnt_version(self) -> u32 {
        match self {
            Self::TrueType => Font::SFNT_VERSION_TRUETYPE,
            Self::Cff => Font::SFNT_VERSION_CFF,
        }
    }

    pub(crate) fn tables(self) -> Vec<(TableTag, Vec<u8>)> {
        match self {
            Self::TrueType => truetype_tables(),
            Self::Cff => cff_tables(),
        }
    }

    pub(crate) fn font_bytes(self) -> Vec<u8> {
        assemble_sfnt(self.sfnt_version(), &self.tables())
    }
}

/// Checks that fonts have the same tables, ignoring the checksum adjustment in the font header.
pub(crate) fn assert_same_tables(font: &Font<'_>, expected: &Font<'_>) {
    const ADJUSTMENT_RANGE: std::ops::Range<usize> = 8..12;

    assert_eq!(font.sfnt_version(), expected.sfnt_version());
    assert_eq!(font.checksum(), expected.checksum());
    let tags: Vec<_> = font.tables().keys().collect();
    let expected_tags: Vec<_> = expected.tables().keys().collect();
    assert_eq!(tags, expected_tags);

    for (tag, table) in font.tables() {
        let expected_table = expected.table(*tag).unwrap();
        if tag.is_header_table() {
            let mut data = table.data().to_vec();
            data[ADJUSTMENT_RANGE].copy_from_slice(&expected_table.data()[ADJUSTMENT_RANGE]);
            assert_eq!(data, expected_table.data(), "{tag}");
        } else {
            assert_eq!(table.data(), expected_table.data(), "{tag}");
        }
    }
}

#[test_casing(2, [FontFlavor::TrueType, FontFlavor::Cff])]
fn unchanged_font_is_serialized_identically(flavor: FontFlavor) {
    init_logger();
    let bytes = flavor.font_bytes();
    let font = FontBuilder::from_bytes(&bytes).unwrap().build().unwrap();
    // Fixtures use the default table ordering
    assert_eq!(font.to_bytes(None), bytes);
}

#[test_casing(2, [FontFlavor::TrueType, FontFlavor::Cff])]
fn round_trip_with_custom_ordering(flavor: FontFlavor) {
    let bytes = flavor.font_bytes();
    let font = FontBuilder::from_bytes(&bytes).unwrap().build().unwrap();
    let mut ordering = font.generate_table_ordering(None);
    ordering.reverse();
    assert_eq!(ordering.len(), font.num_tables());

    let serialized = font.to_bytes(Some(&ordering));
    assert_ne!(serialized, bytes);
    assert_eq!(checksum(&serialized), Font::SFNT_CHECKSUM);
    let reloaded = FontBuilder::from_bytes(&serialized).unwrap().build().unwrap();
    assert_same_tables(&reloaded, &font);
    assert_eq!(reloaded.to_bytes(Some(&ordering)), serialized);

    // Only the checksum adjustment of the font header may be rewritten for the new layout.
    let head = reloaded.table(TableTag::HEAD).unwrap().data();
    let original_head = font.table(TableTag::HEAD).unwrap().data();
    assert_eq!(head[..8], original_head[..8]);
    assert_eq!(head[12..], original_head[12..]);
}

#[test_casing(2, [FontFlavor::TrueType, FontFlavor::Cff])]
fn loading_font_with_reversed_layout(flavor: FontFlavor) {
    let mut tables = flavor.tables();
    tables.reverse();
    let bytes = assemble_sfnt(flavor.sfnt_version(), &tables);
    let layout: Vec<_> = tables.iter().map(|(tag, _)| *tag).collect();

    let font = FontBuilder::from_bytes(&bytes).unwrap().build().unwrap();
    let streamed_font = FontBuilder::from_reader(bytes.as_slice())
        .unwrap()
        .build()
        .unwrap();
    assert_same_tables(&streamed_font, &font);
    for (tag, data) in &tables {
        assert_eq!(font.table(*tag).unwrap().data_len(), data.len(), "{tag}");
    }

    // The default ordering differs from the input layout.
    assert_ne!(font.to_bytes(None), bytes);
    assert_eq!(font.to_bytes(Some(&layout)), bytes);
    let default_bytes = font.to_bytes(None);
    let reloaded = FontBuilder::from_bytes(&default_bytes)
        .unwrap()
        .build()
        .unwrap();
    assert_same_tables(&reloaded, &font);
}

#[test]
fn edited_font_round_trip() {
    let bytes = truetype_font();
    let mut builder = FontBuilder::from_bytes(&bytes).unwrap();
    let Some(AnyTableBuilder::Head(head)) = builder.table_builder_mut(TableTag::HEAD) else {
        panic!("unexpected head builder");
    };
    head.set_index_to_loc_format(LocaFormat::Long).unwrap();
    let Some(AnyTableBuilder::Generic(name)) = builder.table_builder_mut(TableTag::NAME) else {
        panic!("unexpected name builder");
    };
    name.set_data(b"Edited names".to_vec());
    let font = builder.build().unwrap();

    let serialized = font.to_bytes(None);
    assert_eq!(checksum(&serialized), Font::SFNT_CHECKSUM);
    let mut factory = FontFactory::default();
    factory.verify_checksums(true);
    let reloaded = factory.load_fonts(&serialized).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_same_tables(&reloaded[0], &font);

    let reloaded = FontBuilder::from_font(reloaded.into_iter().next().unwrap());
    let Some(AnyTableBuilder::Loca(loca)) = reloaded.table_builder(TableTag::LOCA) else {
        panic!("unexpected loca builder");
    };
    assert_eq!(loca.format(), Some(LocaFormat::Long));
    assert_eq!(loca.locations().unwrap(), [0, 12, 12, 24]);
    assert!(reloaded.table_tags().all(|tag| !reloaded.table_builder(tag).unwrap().changed()));
}

#[test]
fn collection_fans_out_into_fonts() {
    init_logger();
    let fonts = [truetype_font(), cff_font(), truetype_font()];
    let collection = assemble_collection(&fonts);
    let loaded = FontFactory::default().load_fonts(&collection).unwrap();
    assert_eq!(loaded.len(), fonts.len());

    for (font, bytes) in loaded.iter().zip(&fonts) {
        // Tables are borrowed from the collection, but serialize to standalone fonts
        assert_eq!(font.to_bytes(None), *bytes);
    }
}

#[test_casing(2, [FontFlavor::TrueType, FontFlavor::Cff])]
fn serialized_font_is_read_by_allsorts(flavor: FontFlavor) {
    let bytes = flavor.font_bytes();
    let font = FontFactory::default().load_fonts(&bytes).unwrap().pop().unwrap();
    let mut buffer = vec![];
    FontFactory::default().serialize_font(&font, &mut buffer).unwrap();

    let font_file = ReadScope::new(&buffer).read::<FontData>().unwrap();
    let provider = font_file.table_provider(0).unwrap();
    let name = provider.read_table_data(TableTag::NAME.as_u32()).unwrap();
    assert_eq!(name.as_ref(), font.table(TableTag::NAME).unwrap().data());
}

#[test]
fn stream_loading_from_file() {
    let fonts = [truetype_font(), cff_font()];
    let collection = assemble_collection(&fonts);
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&collection).unwrap();
    file.sync_all().unwrap();
    std::io::Seek::rewind(&mut file).unwrap();

    let loaded = FontFactory::default().load_fonts_from_reader(&mut file).unwrap();
    assert_eq!(loaded.len(), 2);
    for (font, bytes) in loaded.iter().zip(&fonts) {
        assert_eq!(font.to_bytes(None), *bytes);
    }
}

#[test]
fn built_tables_match_builders() {
    let bytes = cff_font();
    let builder = FontBuilder::from_bytes(&bytes).unwrap();
    let tables: Vec<_> = builder
        .table_tags()
        .map(|tag| builder.table_builder(tag).unwrap().build().unwrap())
        .collect();
    let font = builder.build().unwrap();
    assert_eq!(tables.len(), font.num_tables());
    for table in tables {
        assert_eq!(table.data(), font.table(table.tag()).unwrap().data());
    }
}
