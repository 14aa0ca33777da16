//! Expands indexed images through their lookup table
//!
//! An indexed plane with one sample per pixel becomes an interleaved plane
//! with one sample per LUT component. Readers that are not indexed, or
//! whose palette only carries false color, pass through untouched.

use std::borrow::Cow;
use std::path::Path;
use log::debug;

use crate::errors::{FormatError, FormatResult};
use crate::pixels::{PixelType, Region};
use crate::reader::format_reader::check_plane_parameters;
use crate::reader::{forward_to_inner, CoreMetadata, FormatReader, LookupTable, Stage};

pub struct ChannelFiller {
    inner: Box<dyn FormatReader>,
}

impl ChannelFiller {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        ChannelFiller { inner }
    }

    /// Whether planes of the current series are expanded
    pub fn is_filled(&self) -> FormatResult<bool> {
        let core = self.inner.core()?;
        Ok(core.indexed && !core.false_color && core.rgb_channel_count() == 1 && self.inner.lookup_table()?.is_some())
    }

    fn filled_core(core: &CoreMetadata, lut: &LookupTable) -> CoreMetadata {
        let pixel_type = if lut.bytes_per_sample() == 1 {
            PixelType::Uint8
        } else {
            PixelType::Uint16
        };
        CoreMetadata {
            size_c: core.size_c * lut.components(),
            rgb: true,
            interleaved: true,
            indexed: false,
            false_color: false,
            pixel_type,
            bits_per_pixel: (pixel_type.bytes_per_pixel() * 8) as u16,
            ..core.clone()
        }
    }
}

impl FormatReader for ChannelFiller {
    forward_to_inner!();

    fn stage(&self) -> Stage {
        Stage::ChannelFiller
    }

    fn set_id(&mut self, path: &Path) -> FormatResult<()> {
        self.inner.set_id(path)?;
        if self.is_filled()? {
            debug!("Expanding indexed pixels of {:?} through the lookup table", path);
        }
        Ok(())
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
        if !self.is_filled()? {
            return self.inner.core();
        }
        let lut = self.inner.lookup_table()?.ok_or(FormatError::NotInitialized)?;
        Ok(Cow::Owned(Self::filled_core(&*self.inner.core()?, &lut)))
    }

    /// The table is consumed once planes are expanded
    fn lookup_table(&self) -> FormatResult<Option<LookupTable>> {
        if self.is_filled()? {
            return Ok(None);
        }
        self.inner.lookup_table()
    }

    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
        let lut = match self.inner.lookup_table()? {
            Some(lut) if self.is_filled()? => lut,
            _ => return self.inner.open_bytes_into(no, region, buf),
        };
        let source = self.inner.core()?.into_owned();
        let filled = Self::filled_core(&source, &lut);
        check_plane_parameters(&filled, no, region, buf.len())?;

        let indices = self.inner.open_region(no, region)?;
        let components = lut.components();
        let out_type = filled.pixel_type;
        for i in 0..region.area() {
            let index = source.pixel_type.sample(&indices, i, source.little_endian);
            // negative indices of signed types wrap like their unsigned bit pattern
            let index = if index < 0.0 {
                (index as i64).rem_euclid(1i64 << (8 * source.pixel_type.bytes_per_pixel())) as usize
            } else {
                index as usize
            };
            for component in 0..components {
                let value = lut.value(component, index) as f64;
                out_type.write_sample(buf, i * components + component, value, filled.little_endian);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::plugins::FakeReader;

    fn filler(id: &str) -> ChannelFiller {
        let mut reader = ChannelFiller::new(Box::new(FakeReader::new()));
        reader.set_id(Path::new(id)).unwrap();
        reader
    }

    #[test]
    fn test_indexed_becomes_rgb() {
        let reader = filler("pal&sizeX=32&sizeY=16&indexed=true.fake");
        assert!(reader.is_filled().unwrap());
        assert_eq!(reader.size_c().unwrap(), 3);
        assert_eq!(reader.rgb_channel_count().unwrap(), 3);
        assert_eq!(reader.image_count().unwrap(), 1);
        assert!(reader.is_rgb().unwrap());
        assert!(!reader.is_indexed().unwrap());
        assert!(reader.lookup_table().unwrap().is_none());
    }

    #[test]
    fn test_pixels_follow_the_table() {
        let mut reader = filler("pal&sizeX=32&sizeY=16&indexed=true.fake");
        let lut = reader.inner().unwrap().lookup_table().unwrap().unwrap();
        let raw = reader.inner_mut().unwrap().open_bytes(0).unwrap();
        let filled = reader.open_bytes(0).unwrap();
        assert_eq!(filled.len(), raw.len() * 3);
        for (i, &index) in raw.iter().enumerate() {
            for c in 0..3 {
                assert_eq!(filled[i * 3 + c] as u16, lut.value(c, index as usize));
            }
        }
    }

    #[test]
    fn test_plain_readers_pass_through() {
        let mut reader = filler("plain&sizeX=8&sizeY=8&sizeC=2.fake");
        assert!(!reader.is_filled().unwrap());
        assert_eq!(reader.size_c().unwrap(), 2);
        let direct = reader.inner_mut().unwrap().open_bytes(1).unwrap();
        assert_eq!(reader.open_bytes(1).unwrap(), direct);
    }

    #[test]
    fn test_false_color_is_not_filled() {
        let reader = filler("fc&sizeX=8&sizeY=8&indexed=true&falseColor=true.fake");
        assert!(!reader.is_filled().unwrap());
        assert!(reader.lookup_table().unwrap().is_some());
    }
}
