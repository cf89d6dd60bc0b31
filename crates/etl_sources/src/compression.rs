//! Optional gzip/brotli unwrapping shared by the CSV and JSON sources.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Brotli,
}

impl Compression {
    /// Guess from the file's extension: `.gz` -> gzip, `.br` -> brotli.
    pub fn sniff_extension(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("br") => Compression::Brotli,
            _ => Compression::None,
        }
    }
}

/// Open `path` and wrap it in the requested decompressor.
pub fn open_decompressed(path: &Path, compression: Compression) -> io::Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    Ok(match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        Compression::Brotli => Box::new(brotli::Decompressor::new(file, 4096)),
    })
}
