//! `maxp` table builder.

use super::{BuilderData, Table, TableBuilder};
use crate::{errors::ParseErrorKind, BuildError, ParseError, TableRecord};

/// Builder for the maximum profile table (`maxp`), the source of the glyph count.
#[derive(Debug, Clone)]
pub struct MaxpBuilder<'a> {
    raw: BuilderData<'a>,
}

impl<'a> MaxpBuilder<'a> {
    /// Version used by fonts with CFF outlines.
    const VERSION_0_5: u32 = 0x_0000_5000;
    /// Version used by fonts with TrueType outlines.
    const VERSION_1_0: u32 = 0x_0001_0000;
    const NUM_GLYPHS_OFFSET: usize = 4;
    const MIN_LEN: usize = 6;

    pub(super) fn new(raw: BuilderData<'a>) -> Self {
        Self { raw }
    }

    pub(super) fn into_owned(self) -> MaxpBuilder<'static> {
        MaxpBuilder {
            raw: self.raw.into_owned(),
        }
    }

    /// Returns the table data.
    pub fn data(&self) -> &[u8] {
        self.raw.bytes()
    }

    /// Reads the number of glyphs in the font.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is truncated or has an unexpected version.
    pub fn num_glyphs(&self) -> Result<u16, ParseError> {
        let mut cursor = self.raw.cursor();
        cursor.read_u32_checked(|version| {
            if version == Self::VERSION_0_5 || version == Self::VERSION_1_0 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(version))
            }
        })?;
        cursor.read_u16()
    }

    /// Sets the number of glyphs in the font.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is truncated.
    pub fn set_num_glyphs(&mut self, num_glyphs: u16) -> Result<(), ParseError> {
        self.raw.write_u16(Self::NUM_GLYPHS_OFFSET, num_glyphs)
    }
}

impl<'a> TableBuilder<'a> for MaxpBuilder<'a> {
    fn record(&self) -> &TableRecord {
        self.raw.record()
    }

    fn ready_to_build(&self) -> bool {
        self.raw.bytes().len() >= Self::MIN_LEN
    }

    fn changed(&self) -> bool {
        self.raw.changed()
    }

    fn build(&self) -> Result<Table<'a>, BuildError> {
        if !self.ready_to_build() {
            return Err(self.raw.not_ready());
        }
        Ok(self.raw.to_table())
    }
}
