//! Program image format.
//!
//! An image is a flat file of instruction words, each stored as four bytes,
//! most significant first. There is no header.

use crate::cpu::Word;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Decode an image from its bytes.
pub fn parse_image(bytes: &[u8]) -> Result<Vec<Word>, ImageError> {
    if bytes.len() % 4 != 0 {
        return Err(ImageError::Truncated { len: bytes.len() });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| Word::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Load an image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Vec<Word>, ImageError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| ImageError::IoError(format!("{}: {}", path.display(), e)))?;
    let words = parse_image(&bytes)?;
    tracing::debug!(path = %path.display(), words = words.len(), "loaded image");
    Ok(words)
}

/// Write words to `writer` in image format.
pub fn write_image<W: Write>(mut writer: W, words: &[Word]) -> Result<(), ImageError> {
    for word in words {
        writer
            .write_all(&word.to_be_bytes())
            .map_err(|e| ImageError::IoError(e.to_string()))?;
    }
    writer.flush().map_err(|e| ImageError::IoError(e.to_string()))
}

/// Save words to disk as an image.
pub fn save_image<P: AsRef<Path>>(path: P, words: &[Word]) -> Result<(), ImageError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .map_err(|e| ImageError::IoError(format!("{}: {}", path.display(), e)))?;
    write_image(std::io::BufWriter::new(file), words)
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("image is {len} bytes long, which is not a whole number of words")]
    Truncated { len: usize },
}
