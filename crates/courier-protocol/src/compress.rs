//! Stream compression policy and transform.
//!
//! A channel either carries raw bytes or wraps them in gzip. The transform
//! wraps one direction lazily on first access and caches the wrapper;
//! closing releases both directions independently, tolerates an absent
//! direction, and never reports cleanup failures (a close error must not
//! mask a real result travelling on the channel).

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed choice of stream compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionSettings {
    /// Identity transform; bytes pass through untouched.
    #[default]
    None,
    /// Symmetric gzip compression.
    Gzip,
}

impl CompressionSettings {
    /// Returns the canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
        }
    }
}

impl fmt::Display for CompressionSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for CompressionSettings {
    type Err = CompressionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            other => Err(CompressionParseError(other.to_owned())),
        }
    }
}

/// Error raised for an unrecognised compression choice.
#[derive(Debug, Error)]
#[error("unknown compression setting '{0}'")]
pub struct CompressionParseError(String);

/// Reader direction of a transform, wrapped according to the settings.
enum TransformReader<R: Read> {
    Plain(R),
    Gzip(GzDecoder<R>),
}

impl<R: Read> Read for TransformReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(reader) => reader.read(buf),
            Self::Gzip(reader) => reader.read(buf),
        }
    }
}

/// Writer direction of a transform, wrapped according to the settings.
enum TransformWriter<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> Write for TransformWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(writer) => writer.write(buf),
            Self::Gzip(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(writer) => writer.flush(),
            Self::Gzip(writer) => writer.flush(),
        }
    }
}

/// Wraps a raw stream pair with a compression algorithm.
///
/// Both directions are wrapped lazily: the decoding reader and encoding
/// writer are created on first access and cached for the lifetime of the
/// transform. The transform owns exactly one underlying stream pair and must
/// not be shared between callers.
pub struct CompressionTransform<R: Read, W: Write> {
    settings: CompressionSettings,
    raw_reader: Option<R>,
    raw_writer: Option<W>,
    reader: Option<TransformReader<R>>,
    writer: Option<TransformWriter<W>>,
}

impl<R: Read, W: Write> CompressionTransform<R, W> {
    /// Builds a transform over a full stream pair.
    #[must_use]
    pub const fn pair(settings: CompressionSettings, reader: R, writer: W) -> Self {
        Self::from_parts(settings, Some(reader), Some(writer))
    }

    /// Builds a transform where either direction may be absent.
    #[must_use]
    pub const fn from_parts(
        settings: CompressionSettings,
        reader: Option<R>,
        writer: Option<W>,
    ) -> Self {
        Self {
            settings,
            raw_reader: reader,
            raw_writer: writer,
            reader: None,
            writer: None,
        }
    }

    /// Returns the wrapped reader, creating it on first access.
    ///
    /// Returns `None` when the reading direction is absent or already
    /// closed.
    pub fn reader(&mut self) -> Option<&mut (dyn Read + '_)> {
        if self.reader.is_none()
            && let Some(raw) = self.raw_reader.take()
        {
            self.reader = Some(match self.settings {
                CompressionSettings::None => TransformReader::Plain(raw),
                CompressionSettings::Gzip => TransformReader::Gzip(GzDecoder::new(raw)),
            });
        }
        self.reader
            .as_mut()
            .map(|reader| reader as &mut (dyn Read + '_))
    }

    /// Returns the wrapped writer, creating it on first access.
    ///
    /// Returns `None` when the writing direction is absent or already
    /// closed.
    pub fn writer(&mut self) -> Option<&mut (dyn Write + '_)> {
        if self.writer.is_none()
            && let Some(raw) = self.raw_writer.take()
        {
            self.writer = Some(match self.settings {
                CompressionSettings::None => TransformWriter::Plain(raw),
                CompressionSettings::Gzip => {
                    TransformWriter::Gzip(GzEncoder::new(raw, Compression::default()))
                }
            });
        }
        self.writer
            .as_mut()
            .map(|writer| writer as &mut (dyn Write + '_))
    }

    /// Finishes the writing direction and returns the underlying writer.
    ///
    /// For gzip this writes the trailer so the peer's decoder sees a
    /// complete stream. Returns `None` when the direction is absent.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error when the trailer cannot be written.
    pub fn finish_writer(&mut self) -> io::Result<Option<W>> {
        match self.writer.take() {
            Some(TransformWriter::Plain(mut writer)) => {
                writer.flush()?;
                Ok(Some(writer))
            }
            Some(TransformWriter::Gzip(encoder)) => Ok(Some(encoder.finish()?)),
            None => Ok(self.raw_writer.take()),
        }
    }

    /// Releases both directions.
    ///
    /// Each direction is closed independently; an absent direction is
    /// ignored and cleanup failures are suppressed. Calling `close` again
    /// is a no-op.
    pub fn close(&mut self) {
        match self.writer.take() {
            Some(TransformWriter::Gzip(mut encoder)) => {
                let _ = encoder.try_finish();
            }
            Some(TransformWriter::Plain(mut writer)) => {
                let _ = writer.flush();
            }
            None => {}
        }
        self.raw_reader = None;
        self.raw_writer = None;
        self.reader = None;
    }
}

/// Encodes a byte buffer under the given settings.
///
/// # Errors
///
/// Returns an IO error when the encoder fails; the identity setting never
/// fails.
pub fn compress(settings: CompressionSettings, bytes: &[u8]) -> io::Result<Vec<u8>> {
    match settings {
        CompressionSettings::None => Ok(bytes.to_vec()),
        CompressionSettings::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes)?;
            encoder.finish()
        }
    }
}

/// Decodes a byte buffer under the given settings.
///
/// # Errors
///
/// Returns an IO error when the buffer is not a valid stream for the
/// settings; the identity setting never fails.
pub fn decompress(settings: CompressionSettings, bytes: &[u8]) -> io::Result<Vec<u8>> {
    match settings {
        CompressionSettings::None => Ok(bytes.to_vec()),
        CompressionSettings::Gzip => {
            let mut decoder = GzDecoder::new(bytes);
            let mut output = Vec::new();
            decoder.read_to_end(&mut output)?;
            Ok(output)
        }
    }
}
