//! `hdmx` table builder.

use super::{BuilderData, Table, TableBuilder};
use crate::{
    errors::{BuildErrorKind, ParseErrorKind},
    write::{write_u16, write_u32},
    BuildError, ParseError, TableRecord,
};

/// Device record of the `hdmx` table: advance widths for all glyphs at a certain pixel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Pixel size the widths are specified for.
    pub pixel_size: u8,
    /// Maximum of the widths.
    pub max_width: u8,
    /// Advance width for each glyph.
    pub widths: Vec<u8>,
}

/// Builder for the horizontal device metrics table (`hdmx`). The record layout depends
/// on the glyph count from `maxp`.
#[derive(Debug, Clone)]
pub struct HdmxBuilder<'a> {
    raw: BuilderData<'a>,
    num_glyphs: Option<u16>,
    records: Option<Vec<DeviceRecord>>,
}

impl<'a> HdmxBuilder<'a> {
    const HEADER_LEN: usize = 8;

    pub(super) fn new(raw: BuilderData<'a>) -> Self {
        Self {
            raw,
            num_glyphs: None,
            records: None,
        }
    }

    pub(super) fn into_owned(self) -> HdmxBuilder<'static> {
        HdmxBuilder {
            raw: self.raw.into_owned(),
            num_glyphs: self.num_glyphs,
            records: self.records,
        }
    }

    pub(crate) fn resolve(&mut self, num_glyphs: Option<u16>) {
        self.num_glyphs = num_glyphs.or(self.num_glyphs);
    }

    /// Sets the glyph count.
    pub fn set_num_glyphs(&mut self, num_glyphs: u16) {
        self.num_glyphs = Some(num_glyphs);
    }

    /// Returns the glyph count, if it is known.
    pub fn num_glyphs(&self) -> Option<u16> {
        self.num_glyphs
    }

    /// Size of a single device record, padded to a 4-byte boundary.
    fn record_size(num_glyphs: u16) -> usize {
        (2 + usize::from(num_glyphs)).next_multiple_of(4)
    }

    /// Returns device records.
    ///
    /// # Errors
    ///
    /// Returns an error if the glyph count is not known yet or the table data is malformed.
    pub fn records(&self) -> Result<Vec<DeviceRecord>, BuildError> {
        if let Some(records) = &self.records {
            return Ok(records.clone());
        }
        let num_glyphs = self.num_glyphs.ok_or_else(|| self.raw.not_ready())?;
        let invalid_data = |err| self.raw.error(BuildErrorKind::InvalidData(err));

        let mut cursor = self.raw.cursor();
        cursor
            .read_u16_checked(|version| {
                if version == 0 {
                    Ok(())
                } else {
                    Err(ParseErrorKind::UnexpectedTableVersion(version.into()))
                }
            })
            .map_err(invalid_data)?;
        let num_records = cursor.read_u16().map_err(invalid_data)?;
        let record_size = cursor.read_u32().map_err(invalid_data)? as usize;
        let min_record_size = 2 + usize::from(num_glyphs);
        if record_size < min_record_size {
            let err = cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: Self::record_size(num_glyphs),
                actual: record_size,
            });
            return Err(invalid_data(err));
        }

        (0..num_records)
            .map(|_| -> Result<_, ParseError> {
                let mut record = cursor.split_at(record_size)?;
                Ok(DeviceRecord {
                    pixel_size: record.read_byte_array::<1>()?[0],
                    max_width: record.read_byte_array::<1>()?[0],
                    widths: record.split_at(num_glyphs.into())?.bytes.to_vec(),
                })
            })
            .collect::<Result<_, _>>()
            .map_err(invalid_data)
    }

    /// Replaces device records. Each record must have a width for every glyph
    /// when the table is built.
    pub fn set_records(&mut self, records: Vec<DeviceRecord>) {
        self.records = Some(records);
    }

    fn encode(&self, records: &[DeviceRecord], num_glyphs: u16) -> Result<Vec<u8>, BuildError> {
        if let Some(record) = records
            .iter()
            .find(|record| record.widths.len() != usize::from(num_glyphs))
        {
            return Err(self.raw.error(BuildErrorKind::GlyphCountMismatch {
                expected: num_glyphs.into(),
                actual: record.widths.len(),
            }));
        }

        let num_records = u16::try_from(records.len()).map_err(|_| {
            self.raw.error(BuildErrorKind::TooManyEntries {
                actual: records.len(),
            })
        })?;

        let record_size = Self::record_size(num_glyphs);
        let mut buffer = Vec::with_capacity(Self::HEADER_LEN + records.len() * record_size);
        write_u16(&mut buffer, 0); // version
        write_u16(&mut buffer, num_records);
        // `unwrap()` is safe: the record size is bounded by `u16::MAX + 5`
        write_u32(&mut buffer, record_size.try_into().unwrap());
        for record in records {
            let record_start = buffer.len();
            buffer.push(record.pixel_size);
            buffer.push(record.max_width);
            buffer.extend_from_slice(&record.widths);
            buffer.resize(record_start + record_size, 0);
        }
        Ok(buffer)
    }
}

impl<'a> TableBuilder<'a> for HdmxBuilder<'a> {
    fn record(&self) -> &TableRecord {
        self.raw.record()
    }

    fn ready_to_build(&self) -> bool {
        self.num_glyphs.is_some()
    }

    fn changed(&self) -> bool {
        self.records.is_some() || self.raw.changed()
    }

    fn build(&self) -> Result<Table<'a>, BuildError> {
        let num_glyphs = self.num_glyphs.ok_or_else(|| self.raw.not_ready())?;
        if let Some(records) = &self.records {
            let data = self.encode(records, num_glyphs)?;
            Ok(self.raw.to_table_with(data))
        } else {
            Ok(self.raw.to_table())
        }
    }
}
