//! Handler for TIFF-flavoured LZW data

use weezl::{decode::Decoder, encode::Encoder, BitOrder};

use crate::errors::{FormatError, FormatResult};
use super::handler::{CodecOptions, CompressionHandler};

/// LZW compression handler (compression code 5)
///
/// Uses MSB-first codes with the early code-size switch that TIFF
/// writers expect.
pub struct LzwHandler;

impl CompressionHandler for LzwHandler {
    fn decompress(&self, data: &[u8], _options: &CodecOptions) -> FormatResult<Vec<u8>> {
        let mut decoder = Decoder::with_tiff_size_switch(BitOrder::Msb, 8);
        decoder
            .decode(data)
            .map_err(|e| FormatError::codec("LZW", e.to_string()))
    }

    fn compress(&self, data: &[u8], _options: &CodecOptions) -> FormatResult<Vec<u8>> {
        let mut encoder = Encoder::with_tiff_size_switch(BitOrder::Msb, 8);
        encoder
            .encode(data)
            .map_err(|e| FormatError::codec("LZW", e.to_string()))
    }

    fn name(&self) -> &'static str {
        "LZW"
    }

    fn code(&self) -> u64 {
        5
    }
}
