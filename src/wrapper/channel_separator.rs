//! Splits multi-sample planes into one plane per channel

use std::borrow::Cow;
use std::path::Path;

use crate::errors::FormatResult;
use crate::pixels::{get_index, get_zct_coords, Region};
use crate::reader::format_reader::check_plane_parameters;
use crate::reader::{forward_to_inner, CoreMetadata, FormatReader, Stage};

/// Last source plane read, keyed by everything that selects it
struct CachedPlane {
    series: usize,
    resolution: usize,
    no: usize,
    region: Region,
    bytes: Vec<u8>,
}

pub struct ChannelSeparator {
    inner: Box<dyn FormatReader>,
    last: Option<CachedPlane>,
}

impl ChannelSeparator {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        ChannelSeparator { inner, last: None }
    }

    fn separated_core(core: &CoreMetadata) -> CoreMetadata {
        let samples = core.rgb_channel_count();
        if samples <= 1 {
            return core.clone();
        }
        CoreMetadata {
            image_count: core.image_count * samples,
            rgb: false,
            interleaved: false,
            ..core.clone()
        }
    }

    /// Source plane and sample index holding separated plane `no`
    pub fn original_index(&self, no: usize) -> FormatResult<(usize, usize)> {
        let source = self.inner.core()?;
        let samples = source.rgb_channel_count();
        if samples <= 1 {
            return Ok((no, 0));
        }
        let separated = Self::separated_core(&source);
        let [z, c, t] = get_zct_coords(&separated.dimension_order, separated.zct_sizes(), no)?;
        let source_no = get_index(&source.dimension_order, source.zct_sizes(), z, c / samples, t)?;
        Ok((source_no, c % samples))
    }

    fn source_region(&mut self, no: usize, region: &Region) -> FormatResult<&[u8]> {
        let (series, resolution) = (self.inner.series(), self.inner.resolution());
        let hit = matches!(
            &self.last,
            Some(c) if c.series == series && c.resolution == resolution && c.no == no && c.region == *region
        );
        if !hit {
            let bytes = self.inner.open_region(no, region)?;
            self.last = Some(CachedPlane {
                series,
                resolution,
                no,
                region: *region,
                bytes,
            });
        }
        match &self.last {
            Some(cached) => Ok(&cached.bytes),
            None => Ok(&[]),
        }
    }
}

impl FormatReader for ChannelSeparator {
    forward_to_inner!();

    fn stage(&self) -> Stage {
        Stage::ChannelSeparator
    }

    fn set_id(&mut self, path: &Path) -> FormatResult<()> {
        self.last = None;
        self.inner.set_id(path)
    }

    fn close(&mut self) -> FormatResult<()> {
        self.last = None;
        self.inner.close()
    }

    fn set_series(&mut self, series: usize) -> FormatResult<()> {
        self.inner.set_series(series)
    }

    fn set_resolution(&mut self, resolution: usize) -> FormatResult<()> {
        self.inner.set_resolution(resolution)
    }

    fn core(&self) -> FormatResult<Cow<'_, CoreMetadata>> {
        let core = self.inner.core()?;
        if core.rgb_channel_count() <= 1 {
            return Ok(core);
        }
        Ok(Cow::Owned(Self::separated_core(&core)))
    }

    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
        let source = self.inner.core()?.into_owned();
        let samples = source.rgb_channel_count();
        if samples <= 1 {
            return self.inner.open_bytes_into(no, region, buf);
        }
        check_plane_parameters(&Self::separated_core(&source), no, region, buf.len())?;
        let (source_no, channel) = self.original_index(no)?;

        let bpp = source.pixel_type.bytes_per_pixel();
        let area = region.area();
        let interleaved = source.interleaved;
        let plane = self.source_region(source_no, region)?;
        if interleaved {
            for i in 0..area {
                let src = (i * samples + channel) * bpp;
                buf[i * bpp..(i + 1) * bpp].copy_from_slice(&plane[src..src + bpp]);
            }
        } else {
            let start = channel * area * bpp;
            buf[..area * bpp].copy_from_slice(&plane[start..start + area * bpp]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::plugins::FakeReader;

    fn separator(id: &str) -> ChannelSeparator {
        let mut reader = ChannelSeparator::new(Box::new(FakeReader::new()));
        reader.set_id(Path::new(id)).unwrap();
        reader
    }

    #[test]
    fn test_rgb_planes_are_split() {
        let mut reader = separator("rgb&sizeX=16&sizeY=12&sizeC=3&rgb=3&interleaved=true&sizeT=2.fake");
        assert_eq!(reader.inner().unwrap().image_count().unwrap(), 2);
        assert_eq!(reader.image_count().unwrap(), 6);
        assert_eq!(reader.effective_size_c().unwrap(), 3);
        assert!(!reader.is_rgb().unwrap());
        assert_eq!(reader.rgb_channel_count().unwrap(), 1);

        let whole = reader.inner_mut().unwrap().open_bytes(1).unwrap();
        for c in 0..3 {
            let no = reader.get_index(0, c, 1).unwrap();
            assert_eq!(reader.original_index(no).unwrap(), (1, c));
            let plane = reader.open_bytes(no).unwrap();
            assert_eq!(plane.len(), 16 * 12);
            let expected: Vec<u8> = whole.iter().skip(c).step_by(3).copied().collect();
            assert_eq!(plane, expected);
        }
    }

    #[test]
    fn test_planar_rgb_is_split() {
        let mut reader = separator("planar&sizeX=8&sizeY=8&sizeC=3&rgb=3&interleaved=false.fake");
        let whole = reader.inner_mut().unwrap().open_bytes(0).unwrap();
        let green = reader.open_bytes(1).unwrap();
        assert_eq!(&green[..], &whole[64..128]);
    }

    #[test]
    fn test_regions_match_full_planes() {
        let mut reader = separator("tile&sizeX=40&sizeY=30&sizeC=3&rgb=3&interleaved=true.fake");
        let full = reader.open_bytes(2).unwrap();
        let region = Region::new(5, 12, 20, 9);
        let tile = reader.open_region(2, &region).unwrap();
        let mut expected = vec![0u8; tile.len()];
        crate::pixels::copy_subrect(&full, 40, 1, &region, &mut expected).unwrap();
        assert_eq!(tile, expected);
    }

    #[test]
    fn test_grayscale_passes_through() {
        let mut reader = separator("gray&sizeX=8&sizeY=8&sizeZ=4.fake");
        assert_eq!(reader.image_count().unwrap(), 4);
        assert_eq!(reader.original_index(3).unwrap(), (3, 0));
        let direct = reader.inner_mut().unwrap().open_bytes(3).unwrap();
        assert_eq!(reader.open_bytes(3).unwrap(), direct);
    }
}
