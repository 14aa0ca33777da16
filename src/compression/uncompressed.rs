//! Handler for uncompressed data

use crate::errors::FormatResult;
use super::handler::{CodecOptions, CompressionHandler};

/// Uncompressed data handler (compression code 1)
pub struct UncompressedHandler;

impl CompressionHandler for UncompressedHandler {
    fn decompress(&self, data: &[u8], _options: &CodecOptions) -> FormatResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn compress(&self, data: &[u8], _options: &CodecOptions) -> FormatResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn name(&self) -> &'static str {
        "UNCOMPRESSED"
    }

    fn code(&self) -> u64 {
        1
    }
}
