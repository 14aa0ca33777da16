//! Handler for baseline JPEG blocks

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};
use log::trace;

use crate::errors::{FormatError, FormatResult};
use super::handler::{deinterleave, interleave, CodecOptions, CompressionHandler};

/// JPEG compression handler (compression code 7)
///
/// Each block is a self-contained baseline JPEG stream. Only 8-bit
/// samples with one or three channels can be encoded.
pub struct JpegHandler;

impl JpegHandler {
    fn color_type(options: &CodecOptions) -> FormatResult<ExtendedColorType> {
        if options.bits_per_sample != 8 {
            return Err(FormatError::codec(
                "JPEG",
                format!("{} bits per sample is not supported, only 8", options.bits_per_sample),
            ));
        }
        match options.channels {
            1 => Ok(ExtendedColorType::L8),
            3 => Ok(ExtendedColorType::Rgb8),
            n => Err(FormatError::codec("JPEG", format!("{} channels is not supported", n))),
        }
    }
}

impl CompressionHandler for JpegHandler {
    fn decompress(&self, data: &[u8], options: &CodecOptions) -> FormatResult<Vec<u8>> {
        Self::color_type(options)?;
        let decoded = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| FormatError::codec("JPEG", e.to_string()))?;
        if decoded.width() != options.width || decoded.height() != options.height {
            return Err(FormatError::SizeMismatch {
                expected: options.block_size(),
                actual: decoded.width() as usize * decoded.height() as usize * options.channels as usize,
                plane: None,
                tile: None,
            });
        }
        trace!("JPEG decoded {}x{} block", decoded.width(), decoded.height());
        let raw = if options.channels == 1 {
            decoded.into_luma8().into_raw()
        } else {
            decoded.into_rgb8().into_raw()
        };
        if options.channels > 1 && !options.interleaved {
            Ok(deinterleave(&raw, options.channels as usize, 1))
        } else {
            Ok(raw)
        }
    }

    fn compress(&self, data: &[u8], options: &CodecOptions) -> FormatResult<Vec<u8>> {
        let color = Self::color_type(options)?;
        options.check_len(data.len())?;
        let pixels = if options.channels > 1 && !options.interleaved {
            interleave(data, options.channels as usize, 1)
        } else {
            data.to_vec()
        };
        let quality = ((options.quality * 100.0).round() as u8).clamp(1, 100);
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(&pixels, options.width, options.height, color)
            .map_err(|e| FormatError::codec("JPEG", e.to_string()))?;
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "JPEG"
    }

    fn code(&self) -> u64 {
        7
    }

    fn is_lossless(&self) -> bool {
        false
    }
}
