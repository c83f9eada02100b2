//! `head` table builder.

use super::{BuilderData, LocaFormat, Table, TableBuilder};
use crate::{errors::ParseErrorKind, BuildError, Font, ParseError, TableRecord};

/// Builder for the font header table (`head` or `bhed`).
///
/// Besides the `indexToLocFormat` field consumed by the `loca` builder, this builder tracks
/// the font checksum. The `checkSumAdjustment` field is recomputed when the font is serialized.
#[derive(Debug, Clone)]
pub struct HeadBuilder<'a> {
    raw: BuilderData<'a>,
    font_checksum: Option<u32>,
}

impl<'a> HeadBuilder<'a> {
    const VERSION: u32 = 0x_0001_0000;
    const INDEX_TO_LOC_FORMAT_OFFSET: usize = 50;
    const MIN_LEN: usize = 54;

    pub(super) fn new(raw: BuilderData<'a>) -> Self {
        Self {
            raw,
            font_checksum: None,
        }
    }

    pub(super) fn into_owned(self) -> HeadBuilder<'static> {
        HeadBuilder {
            raw: self.raw.into_owned(),
            font_checksum: self.font_checksum,
        }
    }

    /// Returns the table data.
    pub fn data(&self) -> &[u8] {
        self.raw.bytes()
    }

    fn check_version(&self) -> Result<(), ParseError> {
        self.raw.cursor().read_u32_checked(|version| {
            if version == Self::VERSION {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(version))
            }
        })
    }

    /// Reads the `indexToLocFormat` field.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is truncated, or has an unexpected version or format.
    pub fn index_to_loc_format(&self) -> Result<LocaFormat, ParseError> {
        self.check_version()?;
        let mut cursor = self.raw.cursor();
        cursor.skip(Self::INDEX_TO_LOC_FORMAT_OFFSET)?;
        cursor.read_u16_checked(|raw_format| match raw_format {
            0 => Ok(LocaFormat::Short),
            1 => Ok(LocaFormat::Long),
            _ => Err(ParseErrorKind::UnexpectedTableFormat(raw_format)),
        })
    }

    /// Sets the `indexToLocFormat` field. The `loca` table is re-encoded accordingly
    /// when the font is built.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is truncated.
    pub fn set_index_to_loc_format(&mut self, format: LocaFormat) -> Result<(), ParseError> {
        let raw_format = match format {
            LocaFormat::Short => 0,
            LocaFormat::Long => 1,
        };
        self.raw
            .write_u16(Self::INDEX_TO_LOC_FORMAT_OFFSET, raw_format)
    }

    /// Reads the `checkSumAdjustment` field.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is truncated.
    pub fn checksum_adjustment(&self) -> Result<u32, ParseError> {
        self.raw.read_u32(Font::HEAD_CHECKSUM_OFFSET)
    }

    /// Returns the checksum of all other font tables, if it was supplied.
    pub fn font_checksum(&self) -> Option<u32> {
        self.font_checksum
    }

    /// Supplies the checksum of all other font tables. The stored `checkSumAdjustment`
    /// becomes stale and is zeroed.
    pub fn set_font_checksum(&mut self, checksum: u32) {
        if self.font_checksum == Some(checksum) {
            return;
        }
        self.font_checksum = Some(checksum);
        if self.raw.bytes().len() >= Self::MIN_LEN {
            self.raw
                .write_u32(Font::HEAD_CHECKSUM_OFFSET, 0)
                .expect("checked length");
        }
    }
}

impl<'a> TableBuilder<'a> for HeadBuilder<'a> {
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

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;
    use crate::{tests::head_table, TableTag};

    fn builder(data: Vec<u8>) -> HeadBuilder<'static> {
        let raw = BuilderData::new(TableRecord::new(TableTag::HEAD), Cow::Owned(data));
        HeadBuilder::new(raw)
    }

    #[test]
    fn reading_and_patching_loca_format() {
        let mut head = builder(head_table(LocaFormat::Short));
        assert_eq!(head.index_to_loc_format().unwrap(), LocaFormat::Short);
        assert!(!head.changed());

        head.set_index_to_loc_format(LocaFormat::Long).unwrap();
        assert!(head.changed());
        assert_eq!(head.index_to_loc_format().unwrap(), LocaFormat::Long);
        assert_eq!(head.data()[50..52], [0, 1]);
    }

    #[test]
    fn unexpected_loca_format() {
        let mut data = head_table(LocaFormat::Short);
        data[51] = 2;
        let err = builder(data).index_to_loc_format().unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnexpectedTableFormat(2)));
        assert_eq!(err.offset(), 50);
        assert_eq!(err.table(), Some(TableTag::HEAD));
    }

    #[test]
    fn font_checksum_clears_adjustment() {
        let mut data = head_table(LocaFormat::Short);
        data[8..12].copy_from_slice(&0x_1234_5678_u32.to_be_bytes());
        let mut head = builder(data);
        assert_eq!(head.checksum_adjustment().unwrap(), 0x_1234_5678);
        let checksum_before = head.build().unwrap().calculated_checksum();

        head.set_font_checksum(42);
        assert_eq!(head.font_checksum(), Some(42));
        assert_eq!(head.checksum_adjustment().unwrap(), 0);
        assert_eq!(head.build().unwrap().calculated_checksum(), checksum_before);
    }

    #[test]
    fn truncated_head_is_not_ready() {
        let mut head = builder(vec![0; 20]);
        assert!(!head.ready_to_build());
        head.set_font_checksum(42);
        assert_eq!(head.font_checksum(), Some(42));
        assert_eq!(head.data(), [0; 20]);
        let err = head.build().unwrap_err();
        assert_eq!(err.tag(), TableTag::HEAD);
        assert!(matches!(err.kind(), crate::BuildErrorKind::NotReady));
    }
}
