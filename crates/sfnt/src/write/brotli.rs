//! Brotli compression of the WOFF2 table stream.

use std::io::{self, Read};

use brotli::enc::{backward_references::BrotliEncoderMode, BrotliEncoderParams};

use super::FontWriter;

/// Reader over table data in the layout order. Padding between tables is not included
/// since WOFF2 stores tables contiguously.
struct TableDataReader<'a> {
    writer: &'a FontWriter,
    /// Offset of the first table; offsets may or may not be adjusted for the table directory.
    data_offset: u32,
    next_table_idx: usize,
    remaining: &'a [u8],
}

impl<'a> TableDataReader<'a> {
    fn new(writer: &'a FontWriter) -> Self {
        debug_assert!(
            writer
                .tables
                .windows(2)
                .all(|pair| pair[0].offset + pair[0].length <= pair[1].offset),
            "table records need to be ordered by offsets"
        );
        Self {
            writer,
            data_offset: writer.tables.first().map_or(0, |record| record.offset),
            next_table_idx: 0,
            remaining: &[],
        }
    }

    /// Moves to the next table if the current one is exhausted. Returns `false` if all
    /// table data was read.
    fn advance(&mut self) -> bool {
        let writer = self.writer;
        while self.remaining.is_empty() {
            let Some(record) = writer.tables.get(self.next_table_idx) else {
                return false;
            };
            self.next_table_idx += 1;
            let start = (record.offset - self.data_offset) as usize;
            self.remaining = &writer.table_data[start..start + record.length as usize];
        }
        true
    }
}

impl Read for TableDataReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total_read = 0;
        while total_read < buf.len() && self.advance() {
            let chunk_len = self.remaining.len().min(buf.len() - total_read);
            let (chunk, rest) = self.remaining.split_at(chunk_len);
            buf[total_read..total_read + chunk_len].copy_from_slice(chunk);
            self.remaining = rest;
            total_read += chunk_len;
        }
        Ok(total_read)
    }
}

impl FontWriter {
    pub(super) fn uncompressed_len(&self) -> usize {
        self.tables.iter().map(|record| record.length as usize).sum()
    }

    pub(super) fn compress_data(&self) -> Vec<u8> {
        let params = BrotliEncoderParams {
            mode: BrotliEncoderMode::BROTLI_MODE_FONT,
            size_hint: self.uncompressed_len(),
            ..BrotliEncoderParams::default()
        };
        let mut compressed = vec![];
        brotli::BrotliCompress(&mut TableDataReader::new(self), &mut compressed, &params)
            .expect("writing to Vec never fails");
        log::trace!(
            "compressed {} bytes of table data into {} bytes",
            self.uncompressed_len(),
            compressed.len()
        );
        compressed
    }
}
