//! Compression codecs for output files.
//!
//! Output files are written through a [`CompressedWriter`] wrapping the staged
//! local file, and read back (for appending and for the cleaner's checks) by
//! decompressing the whole content at once; individual output files are
//! bounded by the hourly bucketing.

use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Write};

use flate2::Compression as GzLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use restructure_config::shared::CompressionKind;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;

/// Writer for one staged output file in the configured codec.
pub enum CompressedWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Zip(Box<ZipWriter<BufWriter<File>>>),
}

impl CompressedWriter {
    /// Opens a writer over a staged file. `entry_name` is the archive entry
    /// name for codecs that need one.
    pub fn new(kind: CompressionKind, file: File, entry_name: &str) -> RestructureResult<Self> {
        let buffered = BufWriter::new(file);
        match kind {
            CompressionKind::None => Ok(CompressedWriter::Plain(buffered)),
            CompressionKind::Gzip => Ok(CompressedWriter::Gzip(GzEncoder::new(
                buffered,
                GzLevel::default(),
            ))),
            CompressionKind::Zip => {
                let mut writer = ZipWriter::new(buffered);
                writer
                    .start_file(entry_name, SimpleFileOptions::default())
                    .map_err(|err| {
                        restructure_error!(
                            ErrorKind::StagingIo,
                            "failed to start zip entry",
                            entry_name
                        )
                        .with_source(err)
                    })?;
                Ok(CompressedWriter::Zip(Box::new(writer)))
            }
        }
    }

    /// Finalizes the stream, writing any trailer the codec requires.
    pub fn finish(self) -> io::Result<()> {
        match self {
            CompressedWriter::Plain(mut writer) => writer.flush(),
            CompressedWriter::Gzip(encoder) => encoder.finish()?.flush(),
            CompressedWriter::Zip(writer) => writer
                .finish()
                .map_err(io::Error::other)?
                .flush(),
        }
    }
}

impl Write for CompressedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressedWriter::Plain(writer) => writer.write(buf),
            CompressedWriter::Gzip(writer) => writer.write(buf),
            CompressedWriter::Zip(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressedWriter::Plain(writer) => writer.flush(),
            CompressedWriter::Gzip(writer) => writer.flush(),
            CompressedWriter::Zip(writer) => writer.flush(),
        }
    }
}

/// Decompresses the full content of an output file.
pub fn decompress(kind: CompressionKind, bytes: &[u8]) -> RestructureResult<Vec<u8>> {
    let corrupt = |err: io::Error| {
        restructure_error!(ErrorKind::CorruptTarget, "failed to decompress target file")
            .with_source(err)
    };

    match kind {
        CompressionKind::None => Ok(bytes.to_vec()),
        CompressionKind::Gzip => {
            let mut decoded = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut decoded)
                .map_err(corrupt)?;
            Ok(decoded)
        }
        CompressionKind::Zip => {
            let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|err| {
                restructure_error!(ErrorKind::CorruptTarget, "failed to open zip archive")
                    .with_source(err)
            })?;
            if archive.len() == 0 {
                return Ok(Vec::new());
            }
            let mut entry = archive.by_index(0).map_err(|err| {
                restructure_error!(ErrorKind::CorruptTarget, "failed to open zip entry")
                    .with_source(err)
            })?;
            let mut decoded = Vec::new();
            entry.read_to_end(&mut decoded).map_err(corrupt)?;
            Ok(decoded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn round_trip(kind: CompressionKind) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("staged");

        let file = File::create(&path).unwrap();
        let mut writer = CompressedWriter::new(kind, file, "data.csv").unwrap();
        writer.write_all(b"a,b\n1,2\n").unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let decoded = decompress(kind, &bytes).unwrap();
        assert_eq!(decoded, b"a,b\n1,2\n");
    }

    #[test]
    fn gzip_round_trip() {
        round_trip(CompressionKind::Gzip);
    }

    #[test]
    fn zip_round_trip() {
        round_trip(CompressionKind::Zip);
    }

    #[test]
    fn plain_round_trip() {
        round_trip(CompressionKind::None);
    }

    #[test]
    fn corrupt_gzip_is_reported() {
        let result = decompress(CompressionKind::Gzip, b"definitely not gzip");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::CorruptTarget);
    }
}
