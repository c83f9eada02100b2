//! `loca` table builder.

use super::{BuilderData, Table, TableBuilder};
use crate::{
    errors::{BuildErrorKind, ParseErrorKind},
    write::{write_u16, write_u32},
    BuildError, TableRecord,
};

/// Format of the `loca` table as specified by the `indexToLocFormat` field in `head`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaFormat {
    /// Offsets are stored as `u16` values divided by 2.
    Short,
    /// Offsets are stored as `u32` values.
    Long,
}

impl LocaFormat {
    /// Returns the number of bytes per stored offset.
    pub const fn bytes_per_offset(self) -> usize {
        match self {
            Self::Short => 2,
            Self::Long => 4,
        }
    }
}

/// Builder for the index to location table (`loca`).
///
/// The table layout depends on the glyph count from `maxp` and on the format from `head`.
/// If the format changes, the table is re-encoded from the locations read in the original format.
#[derive(Debug, Clone)]
pub struct LocaBuilder<'a> {
    raw: BuilderData<'a>,
    num_glyphs: Option<u16>,
    format: Option<LocaFormat>,
    /// Format the raw data is encoded in.
    source_format: Option<LocaFormat>,
    locations: Option<Vec<u32>>,
}

impl<'a> LocaBuilder<'a> {
    const MAX_SHORT_OFFSET: u32 = 0x_0001_fffe;

    pub(super) fn new(raw: BuilderData<'a>) -> Self {
        Self {
            raw,
            num_glyphs: None,
            format: None,
            source_format: None,
            locations: None,
        }
    }

    pub(super) fn into_owned(self) -> LocaBuilder<'static> {
        LocaBuilder {
            raw: self.raw.into_owned(),
            num_glyphs: self.num_glyphs,
            format: self.format,
            source_format: self.source_format,
            locations: self.locations,
        }
    }

    pub(crate) fn resolve(&mut self, num_glyphs: Option<u16>, format: Option<LocaFormat>) {
        self.num_glyphs = num_glyphs.or(self.num_glyphs);
        self.format = format.or(self.format);
        if self.source_format.is_none() {
            self.source_format = self.format;
        }
    }

    /// Sets the glyph count.
    pub fn set_num_glyphs(&mut self, num_glyphs: u16) {
        self.num_glyphs = Some(num_glyphs);
    }

    /// Sets the format the table will be encoded in. If the format of the loaded data
    /// is not known yet, it is set as well.
    pub fn set_format(&mut self, format: LocaFormat) {
        self.format = Some(format);
        if self.source_format.is_none() {
            self.source_format = Some(format);
        }
    }

    /// Returns the glyph count, if it is known.
    pub fn num_glyphs(&self) -> Option<u16> {
        self.num_glyphs
    }

    /// Returns the format the table will be encoded in, if it is known.
    pub fn format(&self) -> Option<LocaFormat> {
        self.format
    }

    /// Returns glyph locations in the `glyf` table: `num_glyphs + 1` byte offsets.
    ///
    /// # Errors
    ///
    /// Returns an error if the glyph count or format are not known yet, or if the table
    /// has an unexpected length.
    pub fn locations(&self) -> Result<Vec<u32>, BuildError> {
        if let Some(locations) = &self.locations {
            return Ok(locations.clone());
        }
        let (Some(num_glyphs), Some(format)) = (self.num_glyphs, self.source_format) else {
            return Err(self.raw.not_ready());
        };

        let bytes = self.raw.bytes();
        let expected_len = (usize::from(num_glyphs) + 1) * format.bytes_per_offset();
        if bytes.len() != expected_len {
            let err = self.raw.cursor().err(ParseErrorKind::UnexpectedTableLen {
                expected: expected_len,
                actual: bytes.len(),
            });
            return Err(self.raw.error(BuildErrorKind::InvalidData(err)));
        }

        let locations = match format {
            LocaFormat::Short => bytes
                .chunks_exact(2)
                .map(|chunk| u32::from(u16::from_be_bytes([chunk[0], chunk[1]])) * 2)
                .collect(),
            LocaFormat::Long => bytes
                .chunks_exact(4)
                .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        };
        Ok(locations)
    }

    /// Replaces glyph locations. There must be `num_glyphs + 1` locations when the table is built.
    pub fn set_locations(&mut self, locations: Vec<u32>) {
        self.locations = Some(locations);
    }

    fn encode(
        &self,
        locations: &[u32],
        num_glyphs: u16,
        format: LocaFormat,
    ) -> Result<Vec<u8>, BuildError> {
        let expected_len = usize::from(num_glyphs) + 1;
        if locations.len() != expected_len {
            return Err(self.raw.error(BuildErrorKind::GlyphCountMismatch {
                expected: expected_len,
                actual: locations.len(),
            }));
        }

        let mut buffer = Vec::with_capacity(locations.len() * format.bytes_per_offset());
        match format {
            LocaFormat::Short => {
                for &location in locations {
                    if location % 2 != 0 || location > Self::MAX_SHORT_OFFSET {
                        return Err(self.raw.error(BuildErrorKind::LocaOverflow));
                    }
                    // `unwrap()` is safe due to the check above
                    write_u16(&mut buffer, (location / 2).try_into().unwrap());
                }
            }
            LocaFormat::Long => {
                for &location in locations {
                    write_u32(&mut buffer, location);
                }
            }
        }
        Ok(buffer)
    }
}

impl<'a> TableBuilder<'a> for LocaBuilder<'a> {
    fn record(&self) -> &TableRecord {
        self.raw.record()
    }

    fn ready_to_build(&self) -> bool {
        self.num_glyphs.is_some() && self.format.is_some()
    }

    fn changed(&self) -> bool {
        self.locations.is_some() || self.raw.changed() || self.format != self.source_format
    }

    fn build(&self) -> Result<Table<'a>, BuildError> {
        let (Some(num_glyphs), Some(format)) = (self.num_glyphs, self.format) else {
            return Err(self.raw.not_ready());
        };

        let locations = if let Some(locations) = &self.locations {
            locations.clone()
        } else if self.source_format != Some(format) {
            self.locations()?
        } else {
            return Ok(self.raw.to_table());
        };
        let data = self.encode(&locations, num_glyphs, format)?;
        Ok(self.raw.to_table_with(data))
    }
}
