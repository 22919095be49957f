//! Opens transaction exports of unknown compression as decoded text.
//!
//! Detection order is zip, then gzip (by magic bytes), then plain text.
//! Exports are Latin-1; side tables may be UTF-8.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Text encodings found in the source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    Utf8,
}

impl Encoding {
    pub fn decode(self, bytes: Vec<u8>) -> std::result::Result<String, std::string::FromUtf8Error> {
        match self {
            Encoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
            Encoding::Utf8 => String::from_utf8(bytes),
        }
    }

    pub fn encode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            Encoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| Error::Unencodable(c)))
                .collect(),
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
        }
    }
}

/// Opens `path` and decodes it as Latin-1.
///
/// An empty result is not an error here, and neither is a zip archive with
/// no members; callers decide what an exhausted stream means for them.
///
/// # Errors
///
/// [`Error::Format`] when the file is a zip or gzip container that cannot be
/// decompressed, [`Error::Io`] when it cannot be read at all.
pub fn open_text(path: impl AsRef<Path>) -> Result<String> {
    open_text_with(path, Encoding::Latin1)
}

/// Same as [`open_text`] with an explicit encoding.
pub fn open_text_with(path: impl AsRef<Path>, encoding: Encoding) -> Result<String> {
    let path = path.as_ref();
    let raw = fs::read(path)?;
    let bytes = decompress(path, raw)?;
    encoding.decode(bytes).map_err(|e| Error::Format {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn decompress(path: &Path, raw: Vec<u8>) -> Result<Vec<u8>> {
    let format_error = |reason: String| Error::Format {
        path: path.to_path_buf(),
        reason,
    };

    if let Ok(mut archive) = ZipArchive::new(Cursor::new(raw.as_slice())) {
        if archive.is_empty() {
            debug!(file = %path.display(), "Zip archive has no members");
            return Ok(Vec::new());
        }
        // Exports hold a single member; anything beyond the first is ignored.
        let mut member = archive
            .by_index(0)
            .map_err(|e| format_error(e.to_string()))?;
        debug!(file = %path.display(), member = member.name(), "Reading zip member");
        // declared sizes are not trusted
        let mut bytes = Vec::new();
        member
            .read_to_end(&mut bytes)
            .map_err(|e| format_error(e.to_string()))?;
        return Ok(bytes);
    }

    if raw.starts_with(&GZIP_MAGIC) {
        debug!(file = %path.display(), "Reading gzip stream");
        let mut bytes = Vec::new();
        MultiGzDecoder::new(raw.as_slice())
            .read_to_end(&mut bytes)
            .map_err(|e| format_error(e.to_string()))?;
        return Ok(bytes);
    }

    Ok(raw)
}
