//! Reading, editing and writing sfnt font containers (TrueType / OpenType fonts
//! and font collections).
//!
//! # Overview
//!
//! - [`FontFactory`] loads fonts from byte buffers or streams, detects font collections
//!   and optionally fingerprints the loaded data.
//! - [`FontBuilder`] holds per-table [builders](AnyTableBuilder) and produces
//!   an immutable [`Font`]. Builders for tables with layout dependencies (`hmtx`, `loca`, `hdmx`)
//!   receive glyph counts and formats from `maxp`, `hhea` and `head`.
//! - [`Font`] can be serialized as OpenType (with the table directory and the whole-font
//!   checksum adjustment) or as WOFF2.
//!
//! Table data is treated as opaque bytes unless a table is needed to lay out another table.
//!
//! # Examples
//!
//! ```
//! # use sfnt::{AnyTableBuilder, Font, FontBuilder, FontFactory, TableTag};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = FontBuilder::new();
//! builder.set_sfnt_version(Font::SFNT_VERSION_CFF);
//! builder.new_table_builder_with_data(TableTag::CFF, b"outlines".as_slice());
//! builder.new_table_builder_with_data(TableTag::NAME, b"names".as_slice());
//! let font = builder.build()?;
//! let font_bytes = font.to_bytes(None);
//!
//! let font = FontFactory::default().load_fonts(&font_bytes)?.pop().unwrap();
//! assert_eq!(font.num_tables(), 2);
//! // Edit the loaded font.
//! let mut builder = FontBuilder::from_font(font);
//! let AnyTableBuilder::Generic(name) = builder.table_builder_mut(TableTag::NAME).unwrap() else {
//!     unreachable!();
//! };
//! name.set_data(b"other names".to_vec());
//! let font = builder.build()?;
//! let woff2_bytes = font.to_woff2(None);
//! assert_eq!(woff2_bytes[..4], *b"wOF2");
//! # Ok(())
//! # }
//! ```

pub use crate::{
    errors::{BuildError, BuildErrorKind, LoadError, ParseError, ParseErrorKind},
    factory::FontFactory,
    font::{Digest, Font, FontBuilder, TableRecord, TableTag},
    tables::{
        AnyTableBuilder, DeviceRecord, GenericBuilder, HdmxBuilder, HeadBuilder, HheaBuilder,
        HmtxBuilder, HorizontalMetric, LocaBuilder, LocaFormat, MaxpBuilder, Table, TableBuilder,
    },
};

mod errors;
mod factory;
mod font;
mod tables;
#[cfg(test)]
pub(crate) mod tests;
mod write;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
