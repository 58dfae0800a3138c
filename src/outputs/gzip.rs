//! Gzip compression for guide files.

use crate::error::Result;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
