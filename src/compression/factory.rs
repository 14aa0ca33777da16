//! Factory for creating compression handlers

use std::fmt;
use std::str::FromStr;

use crate::errors::{FormatError, FormatResult};
use crate::pixels::PixelType;
use super::deflate::DeflateHandler;
use super::handler::CompressionHandler;
use super::jpeg::JpegHandler;
use super::jpeg2000::Jpeg2000Handler;
use super::lzw::LzwHandler;
use super::uncompressed::UncompressedHandler;
use super::zstd::ZstdHandler;

/// Compression types with stable names used for writer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionType {
    Uncompressed,
    Lzw,
    Deflate,
    Jpeg,
    Jpeg2000,
    Jpeg2000Lossy,
    Zstd,
}

impl CompressionType {
    pub const ALL: [CompressionType; 7] = [
        CompressionType::Uncompressed,
        CompressionType::Lzw,
        CompressionType::Deflate,
        CompressionType::Jpeg,
        CompressionType::Jpeg2000,
        CompressionType::Jpeg2000Lossy,
        CompressionType::Zstd,
    ];

    /// Stable identifier
    pub fn name(&self) -> &'static str {
        match self {
            CompressionType::Uncompressed => "UNCOMPRESSED",
            CompressionType::Lzw => "LZW",
            CompressionType::Deflate => "DEFLATE",
            CompressionType::Jpeg => "JPEG",
            CompressionType::Jpeg2000 => "JPEG_2000",
            CompressionType::Jpeg2000Lossy => "JPEG_2000_LOSSY",
            CompressionType::Zstd => "ZSTD",
        }
    }

    /// TIFF compression code written by the TIFF writer
    pub fn code(&self) -> u64 {
        match self {
            CompressionType::Uncompressed => 1,
            CompressionType::Lzw => 5,
            CompressionType::Jpeg => 7,
            CompressionType::Deflate => 8,
            CompressionType::Jpeg2000 => 33003,
            CompressionType::Jpeg2000Lossy => 33004,
            CompressionType::Zstd => 50000,
        }
    }

    /// Maps a TIFF compression code, accepting the common aliases
    pub fn from_code(code: u64) -> FormatResult<Self> {
        match code {
            1 => Ok(CompressionType::Uncompressed),
            5 => Ok(CompressionType::Lzw),
            7 => Ok(CompressionType::Jpeg),
            8 | 32946 => Ok(CompressionType::Deflate),
            33003 | 33005 | 34712 => Ok(CompressionType::Jpeg2000),
            33004 => Ok(CompressionType::Jpeg2000Lossy),
            50000 => Ok(CompressionType::Zstd),
            _ => Err(FormatError::UnsupportedCompression(code)),
        }
    }

    pub fn is_lossless(&self) -> bool {
        !matches!(self, CompressionType::Jpeg | CompressionType::Jpeg2000Lossy)
    }

    /// Pixel types a writer may pair with this compression
    pub fn supported_pixel_types(&self) -> &'static [PixelType] {
        const ALL_TYPES: &[PixelType] = &[
            PixelType::Int8,
            PixelType::Uint8,
            PixelType::Int16,
            PixelType::Uint16,
            PixelType::Int32,
            PixelType::Uint32,
            PixelType::Float,
            PixelType::Double,
        ];
        match self {
            CompressionType::Jpeg => &[PixelType::Int8, PixelType::Uint8],
            CompressionType::Jpeg2000 | CompressionType::Jpeg2000Lossy => &ALL_TYPES[..4],
            _ => ALL_TYPES,
        }
    }

    /// Creates the stateless handler for this compression type
    pub fn handler(&self) -> Box<dyn CompressionHandler> {
        match self {
            CompressionType::Uncompressed => Box::new(UncompressedHandler),
            CompressionType::Lzw => Box::new(LzwHandler),
            CompressionType::Deflate => Box::new(DeflateHandler::new()),
            CompressionType::Jpeg => Box::new(JpegHandler),
            CompressionType::Jpeg2000 => Box::new(Jpeg2000Handler::lossless()),
            CompressionType::Jpeg2000Lossy => Box::new(Jpeg2000Handler::lossy()),
            CompressionType::Zstd => Box::new(ZstdHandler::new()),
        }
    }
}

impl FromStr for CompressionType {
    type Err = FormatError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "UNCOMPRESSED" | "NONE" => Ok(CompressionType::Uncompressed),
            "LZW" => Ok(CompressionType::Lzw),
            "DEFLATE" | "ZLIB" | "ZIP" | "ADOBE_DEFLATE" => Ok(CompressionType::Deflate),
            "JPEG" => Ok(CompressionType::Jpeg),
            "JPEG_2000" | "JPEG2000" | "J2K" => Ok(CompressionType::Jpeg2000),
            "JPEG_2000_LOSSY" | "JPEG2000_LOSSY" | "J2K_LOSSY" => Ok(CompressionType::Jpeg2000Lossy),
            "ZSTD" => Ok(CompressionType::Zstd),
            _ => Err(FormatError::GenericError(format!("Unknown compression type: {}", name))),
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Factory for creating compression handlers
pub struct CompressionFactory;

impl CompressionFactory {
    /// Create a compression handler for the given TIFF compression code
    pub fn create_handler(compression: u64) -> FormatResult<Box<dyn CompressionHandler>> {
        Ok(CompressionType::from_code(compression)?.handler())
    }

    /// Get a handler by stable name or alias
    pub fn get_handler_by_name(name: &str) -> FormatResult<Box<dyn CompressionHandler>> {
        Ok(name.parse::<CompressionType>()?.handler())
    }

    /// Get all available compression handlers
    pub fn get_available_handlers() -> Vec<Box<dyn CompressionHandler>> {
        CompressionType::ALL.iter().map(|c| c.handler()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CodecOptions;

    fn sample_block(options: &CodecOptions) -> Vec<u8> {
        (0..options.block_size())
            .map(|i| ((i / 3) as u8).wrapping_mul(7).wrapping_add((i % 5) as u8))
            .collect()
    }

    #[test]
    fn test_names_and_codes_are_consistent() {
        for compression in CompressionType::ALL {
            let handler = compression.handler();
            assert_eq!(handler.name(), compression.name());
            assert_eq!(handler.code(), compression.code());
            assert_eq!(handler.is_lossless(), compression.is_lossless());
            assert_eq!(CompressionType::from_code(compression.code()).unwrap(), compression);
            assert_eq!(compression.name().parse::<CompressionType>().unwrap(), compression);
        }
        assert_eq!("zlib".parse::<CompressionType>().unwrap(), CompressionType::Deflate);
        assert!(CompressionFactory::create_handler(2).is_err());
    }

    #[test]
    fn test_lossless_round_trips() {
        let options = CodecOptions::new(33, 17).with_bits(16).with_channels(3, true);
        let data = sample_block(&options);
        for compression in CompressionType::ALL.iter().filter(|c| c.is_lossless()) {
            let handler = compression.handler();
            let compressed = handler.compress(&data, &options).unwrap();
            let restored = handler.decompress(&compressed, &options).unwrap();
            assert_eq!(restored, data, "{}", compression);
        }
    }

    #[test]
    fn test_lossless_empty_and_single_byte() {
        let empty = CodecOptions::new(0, 0);
        for compression in [CompressionType::Uncompressed, CompressionType::Lzw, CompressionType::Deflate] {
            let handler = compression.handler();
            let compressed = handler.compress(&[], &empty).unwrap();
            assert!(handler.decompress(&compressed, &empty).unwrap().is_empty());
            let one = CodecOptions::new(1, 1);
            let compressed = handler.compress(&[42], &one).unwrap();
            assert_eq!(handler.decompress(&compressed, &one).unwrap(), vec![42]);
        }
    }

    #[test]
    fn test_lossy_codecs_change_bytes_but_not_length() {
        let options = CodecOptions::new(32, 32).with_channels(3, false);
        let data = sample_block(&options);
        for compression in [CompressionType::Jpeg, CompressionType::Jpeg2000Lossy] {
            let handler = compression.handler();
            let compressed = handler.compress(&data, &options).unwrap();
            assert_ne!(compressed, data, "{}", compression);
            let restored = handler.decompress(&compressed, &options).unwrap();
            assert_eq!(restored.len(), data.len(), "{}", compression);
        }
    }

    #[test]
    fn test_jpeg_rejects_wide_samples() {
        let options = CodecOptions::new(8, 8).with_bits(16);
        let data = vec![0u8; options.block_size()];
        assert!(CompressionType::Jpeg.handler().compress(&data, &options).is_err());
        assert!(!CompressionType::Jpeg.supported_pixel_types().contains(&PixelType::Uint16));
        assert!(CompressionType::Jpeg2000.supported_pixel_types().contains(&PixelType::Int16));
        assert!(!CompressionType::Jpeg2000Lossy.supported_pixel_types().contains(&PixelType::Float));
    }

    #[test]
    fn test_corrupt_deflate_is_codec_error() {
        let options = CodecOptions::new(4, 4);
        let err = CompressionType::Deflate.handler().decompress(&[1, 2, 3, 4], &options).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Format);
    }
}
