//! Handler for ZSTD compressed data

use crate::errors::{FormatError, FormatResult};
use super::handler::{CodecOptions, CompressionHandler};
use log::{debug, warn};

/// ZSTD compression handler (compression code 50000)
pub struct ZstdHandler {
    /// Compression level (1-22, default 3)
    compression_level: i32,
}

impl ZstdHandler {
    /// Create a new ZSTD handler with default compression level
    pub fn new() -> Self {
        ZstdHandler {
            compression_level: 3
        }
    }

    /// Create a new ZSTD handler with specified compression level
    pub fn with_level(level: i32) -> Self {
        ZstdHandler {
            compression_level: level.clamp(1, 22)
        }
    }
}

impl Default for ZstdHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionHandler for ZstdHandler {
    fn decompress(&self, data: &[u8], _options: &CodecOptions) -> FormatResult<Vec<u8>> {
        debug!("ZSTD decompressing {} bytes", data.len());
        if data.is_empty() {
            return Ok(Vec::new());
        }

        zstd::decode_all(data).map_err(|e| {
            warn!("ZSTD decompression error: {}", e);
            FormatError::codec("ZSTD", e.to_string())
        })
    }

    fn compress(&self, data: &[u8], _options: &CodecOptions) -> FormatResult<Vec<u8>> {
        debug!("ZSTD compressing {} bytes with level {}", data.len(), self.compression_level);
        if data.is_empty() {
            return Ok(Vec::new());
        }

        zstd::encode_all(data, self.compression_level).map_err(|e| {
            warn!("ZSTD compression error: {}", e);
            FormatError::codec("ZSTD", e.to_string())
        })
    }

    fn name(&self) -> &'static str {
        "ZSTD"
    }

    fn code(&self) -> u64 {
        50000
    }
}
