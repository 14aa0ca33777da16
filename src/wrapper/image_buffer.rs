//! Planes as `image::DynamicImage` values

use std::borrow::Cow;
use std::path::Path;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use image::{DynamicImage, ImageBuffer};

use crate::errors::{FormatError, FormatResult};
use crate::pixels::{PixelType, Region};
use crate::reader::{forward_to_inner, CoreMetadata, FormatReader, LookupTable, Stage};

pub struct ImageBufferReader {
    inner: Box<dyn FormatReader>,
}

/// Reorders planar samples so the samples of each pixel sit together
fn interleave(bytes: &[u8], samples: usize, area: usize, bpp: usize) -> Vec<u8> {
    let mut out = vec![0u8; bytes.len()];
    for s in 0..samples {
        for i in 0..area {
            let src = (s * area + i) * bpp;
            let dst = (i * samples + s) * bpp;
            out[dst..dst + bpp].copy_from_slice(&bytes[src..src + bpp]);
        }
    }
    out
}

fn layout_error(w: u32, h: u32) -> FormatError {
    FormatError::InconsistentDimensions(format!("sample count does not fill a {}x{} image", w, h))
}

/// Wraps raw interleaved samples into an image of the matching color type
fn to_image(core: &CoreMetadata, width: u32, height: u32, bytes: Vec<u8>) -> FormatResult<DynamicImage> {
    let samples = core.rgb_channel_count();
    let unsupported = || {
        FormatError::Unsupported(format!(
            "{} samples of {} cannot form an image buffer",
            samples, core.pixel_type
        ))
    };
    match core.pixel_type {
        PixelType::Uint8 => {
            let image = match samples {
                1 => ImageBuffer::from_raw(width, height, bytes).map(DynamicImage::ImageLuma8),
                3 => ImageBuffer::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8),
                4 => ImageBuffer::from_raw(width, height, bytes).map(DynamicImage::ImageRgba8),
                _ => return Err(unsupported()),
            };
            image.ok_or_else(|| layout_error(width, height))
        }
        PixelType::Uint16 => {
            let mut words = vec![0u16; bytes.len() / 2];
            if core.little_endian {
                LittleEndian::read_u16_into(&bytes, &mut words);
            } else {
                BigEndian::read_u16_into(&bytes, &mut words);
            }
            let image = match samples {
                1 => ImageBuffer::from_raw(width, height, words).map(DynamicImage::ImageLuma16),
                3 => ImageBuffer::from_raw(width, height, words).map(DynamicImage::ImageRgb16),
                4 => ImageBuffer::from_raw(width, height, words).map(DynamicImage::ImageRgba16),
                _ => return Err(unsupported()),
            };
            image.ok_or_else(|| layout_error(width, height))
        }
        _ => Err(unsupported()),
    }
}

impl ImageBufferReader {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        ImageBufferReader { inner }
    }

    /// Whole plane `no` as an image
    pub fn open_image(&mut self, no: usize) -> FormatResult<DynamicImage> {
        let region = Region::full(self.size_x()?, self.size_y()?);
        self.open_image_region(no, &region)
    }

    /// A rectangle of plane `no` as an image
    pub fn open_image_region(&mut self, no: usize, region: &Region) -> FormatResult<DynamicImage> {
        let core = self.inner.core()?.into_owned();
        let bytes = self.inner.open_region(no, region)?;
        let samples = core.rgb_channel_count();
        let bytes = if samples > 1 && !core.interleaved {
            interleave(&bytes, samples, region.area(), core.pixel_type.bytes_per_pixel())
        } else {
            bytes
        };
        to_image(&core, region.width, region.height, bytes)
    }

    /// Thumbnail of plane `no` as an image
    pub fn open_thumb_image(&mut self, no: usize) -> FormatResult<DynamicImage> {
        let core = self.inner.core()?.into_owned();
        let bytes = self.inner.open_thumb_bytes(no)?;
        let (w, h) = (core.thumb_size_x.max(1), core.thumb_size_y.max(1));
        let samples = core.rgb_channel_count();
        let bytes = if samples > 1 && !core.interleaved {
            interleave(&bytes, samples, (w * h) as usize, core.pixel_type.bytes_per_pixel())
        } else {
            bytes
        };
        to_image(&core, w, h, bytes)
    }
}

impl FormatReader for ImageBufferReader {
    forward_to_inner!();

    fn stage(&self) -> Stage {
        Stage::BufferedImage
    }

    fn set_id(&mut self, path: &Path) -> FormatResult<()> {
        self.inner.set_id(path)
    }

    fn close(&mut self) -> FormatResult<()> {
        self.inner.close()
    }

    fn set_series(&mut self, series: usize) -> FormatResult<()> {
        self.inner.set_series(series)
    }

    fn set_resolution(&mut self, resolution: usize) -> FormatResult<()> {
        self.inner.set_resolution(resolution)
    }

    fn core(&self) -> FormatResult<Cow<'_, CoreMetadata>> {
        self.inner.core()
    }

    fn lookup_table(&self) -> FormatResult<Option<LookupTable>> {
        self.inner.lookup_table()
    }

    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
        self.inner.open_bytes_into(no, region, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::plugins::FakeReader;

    fn buffered(id: &str) -> ImageBufferReader {
        let mut reader = ImageBufferReader::new(Box::new(FakeReader::new()));
        reader.set_id(Path::new(id)).unwrap();
        reader
    }

    #[test]
    fn test_gray_plane() {
        let mut reader = buffered("img&sizeX=20&sizeY=15.fake");
        let image = reader.open_image(0).unwrap();
        assert_eq!((image.width(), image.height()), (20, 15));
        let gray = image.to_luma8();
        assert_eq!(gray.get_pixel(13, 12).0[0], 13);
    }

    #[test]
    fn test_planar_rgb_is_interleaved() {
        let mut reader = buffered("img&sizeX=20&sizeY=15&sizeC=3&rgb=3.fake");
        let raw = reader.open_bytes(0).unwrap();
        let image = reader.open_image(0).unwrap();
        let rgb = image.as_rgb8().unwrap();
        let pixel = rgb.get_pixel(4, 11).0;
        let area = 20 * 15;
        let at = 11 * 20 + 4;
        assert_eq!(pixel, [raw[at], raw[area + at], raw[2 * area + at]]);
    }

    #[test]
    fn test_uint16_endianness() {
        let mut reader = buffered("img&sizeX=16&sizeY=16&pixelType=uint16&little=false.fake");
        let image = reader.open_image_region(0, &Region::new(0, 12, 16, 4)).unwrap();
        let luma = image.as_luma16().unwrap();
        assert_eq!(luma.get_pixel(9, 0).0[0], 9);
    }

    #[test]
    fn test_float_is_rejected() {
        let mut reader = buffered("img&sizeX=8&sizeY=8&pixelType=float.fake");
        assert!(matches!(reader.open_image(0), Err(FormatError::Unsupported(_))));
    }
}
