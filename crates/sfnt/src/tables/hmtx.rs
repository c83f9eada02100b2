//! `hmtx` table builder.

use super::{BuilderData, Table, TableBuilder};
use crate::{
    errors::BuildErrorKind,
    write::{write_i16, write_u16},
    BuildError, TableRecord,
};

/// Horizontal metrics of a single glyph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HorizontalMetric {
    /// Advance width in font units.
    pub advance: u16,
    /// Left side bearing in font units.
    pub lsb: i16,
}

/// Builder for the horizontal metrics table (`hmtx`).
///
/// The table layout depends on the glyph count from `maxp` and on the number of long metrics
/// from `hhea`; both are supplied when the font is built.
#[derive(Debug, Clone)]
pub struct HmtxBuilder<'a> {
    raw: BuilderData<'a>,
    num_glyphs: Option<u16>,
    number_of_h_metrics: Option<u16>,
    metrics: Option<Vec<HorizontalMetric>>,
}

impl<'a> HmtxBuilder<'a> {
    pub(super) fn new(raw: BuilderData<'a>) -> Self {
        Self {
            raw,
            num_glyphs: None,
            number_of_h_metrics: None,
            metrics: None,
        }
    }

    pub(super) fn into_owned(self) -> HmtxBuilder<'static> {
        HmtxBuilder {
            raw: self.raw.into_owned(),
            num_glyphs: self.num_glyphs,
            number_of_h_metrics: self.number_of_h_metrics,
            metrics: self.metrics,
        }
    }

    pub(crate) fn resolve(&mut self, num_glyphs: Option<u16>, number_of_h_metrics: Option<u16>) {
        self.num_glyphs = num_glyphs.or(self.num_glyphs);
        self.number_of_h_metrics = number_of_h_metrics.or(self.number_of_h_metrics);
    }

    /// Sets the glyph count.
    pub fn set_num_glyphs(&mut self, num_glyphs: u16) {
        self.num_glyphs = Some(num_glyphs);
    }

    /// Sets the number of long horizontal metrics.
    pub fn set_number_of_h_metrics(&mut self, value: u16) {
        self.number_of_h_metrics = Some(value);
    }

    /// Returns the glyph count, if it is known.
    pub fn num_glyphs(&self) -> Option<u16> {
        self.num_glyphs
    }

    /// Returns the number of long horizontal metrics, if it is known.
    pub fn number_of_h_metrics(&self) -> Option<u16> {
        self.number_of_h_metrics
    }

    fn counts(&self) -> Result<(u16, u16), BuildError> {
        let (Some(num_glyphs), Some(number_of_h_metrics)) =
            (self.num_glyphs, self.number_of_h_metrics)
        else {
            return Err(self.raw.not_ready());
        };
        let in_range = if num_glyphs == 0 {
            number_of_h_metrics == 0
        } else {
            (1..=num_glyphs).contains(&number_of_h_metrics)
        };
        if !in_range {
            return Err(self.raw.error(BuildErrorKind::MetricsCountOutOfRange {
                number_of_h_metrics,
                num_glyphs,
            }));
        }
        Ok((num_glyphs, number_of_h_metrics))
    }

    /// Returns metrics for every glyph. Glyphs past the long metrics reuse the last advance.
    ///
    /// # Errors
    ///
    /// Returns an error if the glyph counts are not known yet or the table data is malformed.
    pub fn metrics(&self) -> Result<Vec<HorizontalMetric>, BuildError> {
        if let Some(metrics) = &self.metrics {
            return Ok(metrics.clone());
        }

        let (num_glyphs, number_of_h_metrics) = self.counts()?;
        let invalid_data = |err| self.raw.error(BuildErrorKind::InvalidData(err));
        let mut cursor = self.raw.cursor();
        let mut metrics = Vec::with_capacity(num_glyphs.into());
        for _ in 0..number_of_h_metrics {
            let advance = cursor.read_u16().map_err(invalid_data)?;
            let lsb = cursor.read_i16().map_err(invalid_data)?;
            metrics.push(HorizontalMetric { advance, lsb });
        }
        let last_advance = metrics.last().map_or(0, |metric| metric.advance);
        for _ in number_of_h_metrics..num_glyphs {
            let lsb = cursor.read_i16().map_err(invalid_data)?;
            metrics.push(HorizontalMetric {
                advance: last_advance,
                lsb,
            });
        }
        Ok(metrics)
    }

    /// Replaces metrics for all glyphs. The number of metrics must match the glyph count
    /// when the table is built.
    pub fn set_metrics(&mut self, metrics: Vec<HorizontalMetric>) {
        self.metrics = Some(metrics);
    }

    fn encode(&self, metrics: &[HorizontalMetric]) -> Result<Vec<u8>, BuildError> {
        let (num_glyphs, number_of_h_metrics) = self.counts()?;
        if metrics.len() != usize::from(num_glyphs) {
            return Err(self.raw.error(BuildErrorKind::GlyphCountMismatch {
                expected: num_glyphs.into(),
                actual: metrics.len(),
            }));
        }

        let (long_metrics, short_metrics) = metrics.split_at(number_of_h_metrics.into());
        let mut buffer = Vec::with_capacity(long_metrics.len() * 4 + short_metrics.len() * 2);
        for metric in long_metrics {
            write_u16(&mut buffer, metric.advance);
            write_i16(&mut buffer, metric.lsb);
        }
        for metric in short_metrics {
            write_i16(&mut buffer, metric.lsb);
        }
        Ok(buffer)
    }
}

impl<'a> TableBuilder<'a> for HmtxBuilder<'a> {
    fn record(&self) -> &TableRecord {
        self.raw.record()
    }

    fn ready_to_build(&self) -> bool {
        self.num_glyphs.is_some() && self.number_of_h_metrics.is_some()
    }

    fn changed(&self) -> bool {
        self.metrics.is_some() || self.raw.changed()
    }

    fn build(&self) -> Result<Table<'a>, BuildError> {
        if !self.ready_to_build() {
            return Err(self.raw.not_ready());
        }
        if let Some(metrics) = &self.metrics {
            let data = self.encode(metrics)?;
            Ok(self.raw.to_table_with(data))
        } else {
            Ok(self.raw.to_table())
        }
    }
}
