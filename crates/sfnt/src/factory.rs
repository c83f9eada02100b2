//! [`FontFactory`]: loading fonts and font collections.

use std::io::{self, Read};

use sha1::{Digest as _, Sha1};

use crate::{
    errors::ParseErrorKind,
    font::{Cursor, Digest},
    Font, FontBuilder, LoadError, ParseError, TableTag,
};

/// Reader that optionally computes the SHA-1 digest of all data read through it.
struct DigestReader<R> {
    inner: R,
    hasher: Option<Sha1>,
}

impl<R: Read> DigestReader<R> {
    fn new(inner: R, fingerprint: bool) -> Self {
        Self {
            inner,
            hasher: fingerprint.then(Sha1::new),
        }
    }

    fn finalize(self) -> Option<Digest> {
        self.hasher.map(|hasher| hasher.finalize().into())
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&buf[..read]);
        }
        Ok(read)
    }
}

/// Entry point for loading fonts and font collections.
///
/// The factory holds loading and serialization settings:
///
/// - Whether to compute a SHA-1 [fingerprint](Self::fingerprint_font()) of the loaded data
/// - Whether to [verify table checksums](Self::verify_checksums())
/// - Table ordering used by [`Self::serialize_font()`]
///
/// # Examples
///
/// ```
/// # use sfnt::{FontBuilder, FontFactory, TableTag};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut builder = FontBuilder::new();
/// builder.new_table_builder_with_data(TableTag::NAME, b"test".as_slice());
/// let font_bytes = builder.build()?.to_bytes(None);
///
/// let mut factory = FontFactory::default();
/// factory.fingerprint_font(true);
/// let fonts = factory.load_fonts(&font_bytes)?;
/// assert_eq!(fonts.len(), 1);
/// assert!(fonts[0].digest().is_some());
/// assert_eq!(fonts[0].table(TableTag::NAME).unwrap().data(), b"test");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct FontFactory {
    fingerprint: bool,
    verify_checksums: bool,
    table_ordering: Option<Vec<TableTag>>,
}

impl FontFactory {
    const COLLECTION_VERSION_1: u32 = 0x_0001_0000;
    const COLLECTION_VERSION_2: u32 = 0x_0002_0000;

    /// Checks whether the provided data is a font collection (starts with the `ttcf` tag).
    pub fn is_collection(bytes: &[u8]) -> bool {
        bytes.starts_with(&TableTag::TTCF.0)
    }

    /// Sets whether loaded fonts are fingerprinted with a SHA-1 digest of the entire input.
    /// The digest is not used in any checksum computations.
    pub fn fingerprint_font(&mut self, fingerprint: bool) {
        self.fingerprint = fingerprint;
    }

    /// Checks whether loaded fonts are fingerprinted.
    pub fn is_fingerprinting(&self) -> bool {
        self.fingerprint
    }

    /// Sets whether table checksums in the table directory are verified on load. If enabled,
    /// a mismatch is an error; otherwise, it is logged as a warning.
    pub fn verify_checksums(&mut self, verify: bool) {
        self.verify_checksums = verify;
    }

    /// Checks whether table checksums are verified on load.
    pub fn is_verifying_checksums(&self) -> bool {
        self.verify_checksums
    }

    /// Sets the preferred table ordering for [`Self::serialize_font()`]. Tables not mentioned
    /// in the ordering will be written after the mentioned ones.
    pub fn set_serialization_table_ordering(&mut self, ordering: Vec<TableTag>) {
        self.table_ordering = Some(ordering);
    }

    /// Returns the preferred table ordering for serialization, if set.
    pub fn serialization_table_ordering(&self) -> Option<&[TableTag]> {
        self.table_ordering.as_deref()
    }

    /// Creates a new empty font builder.
    pub fn new_font_builder(&self) -> FontBuilder<'static> {
        FontBuilder::new()
    }

    fn parse_collection_header(bytes: &[u8]) -> Result<Vec<usize>, ParseError> {
        let mut cursor = Cursor::new(bytes);
        cursor.skip(4)?; // `ttcf` tag
        let version = cursor.read_u32_checked(|version| {
            if version == Self::COLLECTION_VERSION_1 || version == Self::COLLECTION_VERSION_2 {
                Ok(version)
            } else {
                Err(ParseErrorKind::UnexpectedCollectionVersion(version))
            }
        })?;
        let num_fonts = cursor.read_u32()? as usize;
        let mut offsets = cursor.split_at(num_fonts.saturating_mul(4))?;
        // Version 2.0 fields with the `DSIG` table location follow; they are not used.

        let offsets = (0..num_fonts)
            .map(|_| offsets.read_u32().map(|offset| offset as usize))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "parsed font collection header (version {version:#010x}) with {num_fonts} font(s) \
             at offsets {offsets:?}"
        );
        Ok(offsets)
    }

    fn load_builders_without_digest<'a>(
        &self,
        bytes: &'a [u8],
    ) -> Result<Vec<FontBuilder<'a>>, ParseError> {
        if Self::is_collection(bytes) {
            let offsets = Self::parse_collection_header(bytes)?;
            offsets
                .into_iter()
                .map(|offset| FontBuilder::load(bytes, offset, self.verify_checksums))
                .collect()
        } else if bytes.is_empty() {
            log::debug!("no font data provided");
            Ok(vec![])
        } else {
            Ok(vec![FontBuilder::load(bytes, 0, self.verify_checksums)?])
        }
    }

    /// Loads font builders from the provided bytes, which may contain a single font
    /// or a font collection. Table data is borrowed from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the font data is malformed.
    pub fn load_font_builders<'a>(
        &self,
        bytes: &'a [u8],
    ) -> Result<Vec<FontBuilder<'a>>, ParseError> {
        let mut builders = self.load_builders_without_digest(bytes)?;
        if self.fingerprint {
            let digest: Digest = Sha1::digest(bytes).into();
            for builder in &mut builders {
                builder.set_digest(digest);
            }
        }
        Ok(builders)
    }

    /// Loads fonts from the provided bytes, which may contain a single font or a font collection.
    /// Returns an empty vector if `bytes` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the font data is malformed, or if a font cannot be built
    /// from the loaded tables.
    pub fn load_fonts<'a>(&self, bytes: &'a [u8]) -> Result<Vec<Font<'a>>, LoadError> {
        let builders = self.load_font_builders(bytes)?;
        let fonts: Vec<_> = builders
            .into_iter()
            .map(FontBuilder::build)
            .collect::<Result<_, _>>()?;
        Ok(fonts)
    }

    /// Loads font builders from a stream. The first 4 bytes are used to determine whether
    /// the stream contains a font collection. Collections are read fully into memory;
    /// a single font is read table by table.
    ///
    /// If fingerprinting is enabled, the stream is read to the end so that the digest
    /// covers the entire input.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the stream fails or the font data is malformed.
    pub fn load_font_builders_from_reader(
        &self,
        reader: impl Read,
    ) -> Result<Vec<FontBuilder<'static>>, ParseError> {
        let mut reader = DigestReader::new(reader, self.fingerprint);
        let mut prefix = Vec::with_capacity(4);
        (&mut reader).take(4).read_to_end(&mut prefix)?;
        if prefix.is_empty() {
            log::debug!("no font data provided");
            return Ok(vec![]);
        }

        let mut builders = {
            let is_collection = Self::is_collection(&prefix);
            // Push the prefix back to the stream.
            let mut chained = io::Cursor::new(prefix).chain(&mut reader);
            if is_collection {
                let mut bytes = vec![];
                chained.read_to_end(&mut bytes)?;
                self.load_builders_without_digest(&bytes)?
                    .into_iter()
                    .map(FontBuilder::into_owned)
                    .collect()
            } else {
                let builder = FontBuilder::load_stream(&mut chained, self.verify_checksums)?;
                if self.fingerprint {
                    let trailing_len = io::copy(&mut chained, &mut io::sink())?;
                    log::trace!("read {trailing_len} trailing bytes after the last table");
                }
                vec![builder]
            }
        };

        if let Some(digest) = reader.finalize() {
            for builder in &mut builders {
                builder.set_digest(digest);
            }
        }
        Ok(builders)
    }

    /// Loads fonts from a stream. See [`Self::load_font_builders_from_reader()`] for details.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the stream fails, the font data is malformed,
    /// or if a font cannot be built from the loaded tables.
    pub fn load_fonts_from_reader(
        &self,
        reader: impl Read,
    ) -> Result<Vec<Font<'static>>, LoadError> {
        let builders = self.load_font_builders_from_reader(reader)?;
        let fonts: Vec<_> = builders
            .into_iter()
            .map(FontBuilder::build)
            .collect::<Result<_, _>>()?;
        Ok(fonts)
    }

    /// Serializes a font using the
    /// [configured table ordering](Self::serialization_table_ordering()).
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the writer.
    pub fn serialize_font<W: io::Write + ?Sized>(
        &self,
        font: &Font<'_>,
        writer: &mut W,
    ) -> io::Result<()> {
        font.serialize(writer, self.serialization_table_ordering())
    }
}
