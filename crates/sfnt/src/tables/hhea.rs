//! `hhea` table builder.

use super::{BuilderData, Table, TableBuilder};
use crate::{BuildError, ParseError, TableRecord};

/// Builder for the horizontal header table (`hhea`).
#[derive(Debug, Clone)]
pub struct HheaBuilder<'a> {
    raw: BuilderData<'a>,
}

impl<'a> HheaBuilder<'a> {
    const EXPECTED_LEN: usize = 36;
    const NUMBER_OF_H_METRICS_OFFSET: usize = Self::EXPECTED_LEN - 2;

    pub(super) fn new(raw: BuilderData<'a>) -> Self {
        Self { raw }
    }

    pub(super) fn into_owned(self) -> HheaBuilder<'static> {
        HheaBuilder {
            raw: self.raw.into_owned(),
        }
    }

    /// Returns the table data.
    pub fn data(&self) -> &[u8] {
        self.raw.bytes()
    }

    /// Reads the number of long horizontal metrics in the `hmtx` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is truncated.
    pub fn number_of_h_metrics(&self) -> Result<u16, ParseError> {
        self.raw.read_u16(Self::NUMBER_OF_H_METRICS_OFFSET)
    }

    /// Sets the number of long horizontal metrics in the `hmtx` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is truncated.
    pub fn set_number_of_h_metrics(&mut self, value: u16) -> Result<(), ParseError> {
        self.raw.write_u16(Self::NUMBER_OF_H_METRICS_OFFSET, value)
    }
}

impl<'a> TableBuilder<'a> for HheaBuilder<'a> {
    fn record(&self) -> &TableRecord {
        self.raw.record()
    }

    fn ready_to_build(&self) -> bool {
        self.raw.bytes().len() >= Self::EXPECTED_LEN
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
