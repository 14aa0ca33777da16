//! Handler for Adobe Deflate compressed data

use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use crate::errors::{FormatError, FormatResult};
use super::handler::{CodecOptions, CompressionHandler};

/// Deflate (zlib) compression handler (compression code 8)
pub struct DeflateHandler {
    level: Compression,
}

impl DeflateHandler {
    pub fn new() -> Self {
        DeflateHandler { level: Compression::default() }
    }

    /// Create a handler with a zlib level between 0 and 9
    pub fn with_level(level: u32) -> Self {
        DeflateHandler { level: Compression::new(level.min(9)) }
    }
}

impl Default for DeflateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionHandler for DeflateHandler {
    fn decompress(&self, data: &[u8], _options: &CodecOptions) -> FormatResult<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut decompressed_data = Vec::new();
        decoder
            .read_to_end(&mut decompressed_data)
            .map_err(|e| FormatError::codec("DEFLATE", e.to_string()))?;
        Ok(decompressed_data)
    }

    fn compress(&self, data: &[u8], _options: &CodecOptions) -> FormatResult<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn name(&self) -> &'static str {
        "DEFLATE"
    }

    fn code(&self) -> u64 {
        8
    }
}
