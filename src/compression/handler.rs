//! Compression handler trait definition

use crate::errors::{FormatError, FormatResult};

/// Hints passed to codecs that need to know the sample layout
///
/// Entropy coders such as JPEG and JPEG-2000 work on images, not byte
/// streams, so they receive the block geometry alongside the bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecOptions {
    /// Block width in pixels
    pub width: u32,
    /// Block height in pixels
    pub height: u32,
    /// Bits per sample (8, 16, 32 or 64)
    pub bits_per_sample: u16,
    /// Samples per pixel stored in the block
    pub channels: u16,
    /// Whether samples are pixel-interleaved (RGBRGB) rather than planar
    pub interleaved: bool,
    /// Byte order of multi-byte samples
    pub little_endian: bool,
    /// Whether samples are signed integers
    pub signed: bool,
    /// Quality for lossy codecs, in `0.0..=1.0`
    pub quality: f32,
}

impl CodecOptions {
    /// Options for a single-channel 8-bit block
    pub fn new(width: u32, height: u32) -> Self {
        CodecOptions {
            width,
            height,
            bits_per_sample: 8,
            channels: 1,
            interleaved: false,
            little_endian: true,
            signed: false,
            quality: 0.8,
        }
    }

    pub fn with_bits(mut self, bits_per_sample: u16) -> Self {
        self.bits_per_sample = bits_per_sample;
        self
    }

    pub fn with_channels(mut self, channels: u16, interleaved: bool) -> Self {
        self.channels = channels;
        self.interleaved = interleaved;
        self
    }

    pub fn with_little_endian(mut self, little_endian: bool) -> Self {
        self.little_endian = little_endian;
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality.clamp(0.0, 1.0);
        self
    }

    /// Bytes per sample, rounding sub-byte depths up
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8).max(1)
    }

    /// Expected size of the uncompressed block
    pub fn block_size(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize * self.bytes_per_sample()
    }

    /// Fails with a size mismatch when `len` differs from the block size
    pub fn check_len(&self, len: usize) -> FormatResult<()> {
        let expected = self.block_size();
        if len != expected {
            return Err(FormatError::SizeMismatch {
                expected,
                actual: len,
                plane: None,
                tile: None,
            });
        }
        Ok(())
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        CodecOptions::new(0, 0)
    }
}

/// Strategy trait for handling different compression methods
///
/// Handlers are stateless; one instance may be shared across threads.
pub trait CompressionHandler: Send + Sync {
    /// Decompress the data
    fn decompress(&self, data: &[u8], options: &CodecOptions) -> FormatResult<Vec<u8>>;

    /// Compress the data
    fn compress(&self, data: &[u8], options: &CodecOptions) -> FormatResult<Vec<u8>>;

    /// Stable name of this compression method
    fn name(&self) -> &'static str;

    /// TIFF compression code
    fn code(&self) -> u64;

    /// Whether `decompress(compress(x)) == x` holds for every input
    fn is_lossless(&self) -> bool {
        true
    }
}

/// Splits pixel-interleaved samples into consecutive per-channel planes
pub(crate) fn deinterleave(data: &[u8], channels: usize, sample_bytes: usize) -> Vec<u8> {
    if channels <= 1 {
        return data.to_vec();
    }
    let pixel_bytes = channels * sample_bytes;
    let pixels = data.len() / pixel_bytes;
    let mut out = vec![0u8; pixels * pixel_bytes];
    for p in 0..pixels {
        for c in 0..channels {
            let src = p * pixel_bytes + c * sample_bytes;
            let dst = (c * pixels + p) * sample_bytes;
            out[dst..dst + sample_bytes].copy_from_slice(&data[src..src + sample_bytes]);
        }
    }
    out
}

/// Inverse of [`deinterleave`]
pub(crate) fn interleave(data: &[u8], channels: usize, sample_bytes: usize) -> Vec<u8> {
    if channels <= 1 {
        return data.to_vec();
    }
    let pixel_bytes = channels * sample_bytes;
    let pixels = data.len() / pixel_bytes;
    let mut out = vec![0u8; pixels * pixel_bytes];
    for p in 0..pixels {
        for c in 0..channels {
            let src = (c * pixels + p) * sample_bytes;
            let dst = p * pixel_bytes + c * sample_bytes;
            out[dst..dst + sample_bytes].copy_from_slice(&data[src..src + sample_bytes]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave_round_trip() {
        let rgb = vec![1u8, 2, 3, 4, 5, 6];
        let planar = deinterleave(&rgb, 3, 1);
        assert_eq!(planar, vec![1, 4, 2, 5, 3, 6]);
        assert_eq!(interleave(&planar, 3, 1), rgb);
    }

    #[test]
    fn test_block_size() {
        let options = CodecOptions::new(4, 2).with_bits(16).with_channels(3, true);
        assert_eq!(options.block_size(), 48);
        assert!(options.check_len(48).is_ok());
        assert!(options.check_len(47).is_err());
    }
}
