//! Writer contract
//!
//! A writer takes its dimensions from a [`MetadataRetrieve`] before the
//! output is opened, then accepts whole planes or sub-rectangles of planes
//! for the current series.

use std::path::Path;

use crate::compression::CompressionType;
use crate::config::WriterOptions;
use crate::errors::{FormatError, FormatResult};
use crate::meta::{MetadataRetrieve, RetrieveExt};
use crate::pixels::{DimensionOrder, PixelType, Region};

/// Dimensions of one series to be written
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesInfo {
    pub name: Option<String>,
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    /// Samples stored together in each plane
    pub samples: usize,
    pub pixel_type: PixelType,
    pub dimension_order: DimensionOrder,
    pub little_endian: bool,
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
}

fn positive(meta: &dyn MetadataRetrieve, path: &str) -> FormatResult<i64> {
    match meta.get_int(path) {
        Some(v) if v > 0 => Ok(v),
        Some(v) => Err(FormatError::InconsistentDimensions(format!("{} = {}", path, v))),
        None => Err(FormatError::GenericError(format!("{} is not set", path))),
    }
}

impl SeriesInfo {
    /// Reads the Pixels block of image `series`
    pub fn from_retrieve(meta: &dyn MetadataRetrieve, series: usize) -> FormatResult<Self> {
        let image = format!("Image[{}]", series);
        let pixels = format!("{}/Pixels", image);
        let pixel_type = match meta.get_text(&format!("{}/Type", pixels)) {
            Some(name) => PixelType::from_name(&name)?,
            None => return Err(FormatError::GenericError(format!("{}/Type is not set", pixels))),
        };
        let dimension_order = match meta.get_text(&format!("{}/DimensionOrder", pixels)) {
            Some(order) => DimensionOrder::parse(&order)?,
            None => DimensionOrder::XYZCT,
        };
        let samples = meta
            .get_int(&format!("{}/Channel[0]/SamplesPerPixel", pixels))
            .filter(|&s| s > 0)
            .unwrap_or(1) as usize;
        let big_endian = meta
            .get(&format!("{}/BigEndian", pixels))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let float = |key: &str| meta.get(&format!("{}/{}", pixels, key)).and_then(|v| v.as_float());

        let info = SeriesInfo {
            name: meta.get_text(&format!("{}/Name", image)),
            size_x: u32::try_from(positive(meta, &format!("{}/SizeX", pixels))?)
                .map_err(|e| FormatError::GenericError(e.to_string()))?,
            size_y: u32::try_from(positive(meta, &format!("{}/SizeY", pixels))?)
                .map_err(|e| FormatError::GenericError(e.to_string()))?,
            size_z: positive(meta, &format!("{}/SizeZ", pixels))? as usize,
            size_c: positive(meta, &format!("{}/SizeC", pixels))? as usize,
            size_t: positive(meta, &format!("{}/SizeT", pixels))? as usize,
            samples,
            pixel_type,
            dimension_order,
            little_endian: !big_endian,
            physical_size_x: float("PhysicalSizeX"),
            physical_size_y: float("PhysicalSizeY"),
        };
        if info.size_c % info.samples != 0 {
            return Err(FormatError::InconsistentDimensions(format!(
                "{} channels cannot hold {} samples per pixel",
                info.size_c, info.samples
            )));
        }
        Ok(info)
    }

    pub fn effective_size_c(&self) -> usize {
        self.size_c / self.samples
    }

    pub fn image_count(&self) -> usize {
        self.size_z * self.effective_size_c() * self.size_t
    }

    /// Bytes of a `region` with every sample of each pixel
    pub fn region_bytes(&self, region: &Region) -> usize {
        region.area() * self.samples * self.pixel_type.bytes_per_pixel()
    }
}

/// Reads every image of `meta`
pub fn series_from_retrieve(meta: &dyn MetadataRetrieve) -> FormatResult<Vec<SeriesInfo>> {
    let images = meta.count("Image");
    if images == 0 {
        return Err(FormatError::GenericError("Metadata describes no images".to_string()));
    }
    (0..images).map(|s| SeriesInfo::from_retrieve(meta, s)).collect()
}

pub trait FormatWriter {
    fn format_name(&self) -> &'static str;

    fn suffixes(&self) -> &'static [&'static str];

    /// Takes series dimensions from `meta`; must precede `set_id`
    fn set_metadata(&mut self, meta: &dyn MetadataRetrieve) -> FormatResult<()>;

    fn series_info(&self) -> &[SeriesInfo];

    fn set_compression(&mut self, compression: CompressionType) -> FormatResult<()>;

    fn compression(&self) -> CompressionType;

    /// Quality hint for lossy codecs, in `0.0..=1.0`
    fn set_quality(&mut self, quality: f32);

    /// Whether incoming planes hold pixel-interleaved samples
    fn set_interleaved(&mut self, interleaved: bool);

    fn is_interleaved(&self) -> bool;

    /// Requests tiled output; returns the tile size actually used
    fn set_tile_size(&mut self, width: u32, height: u32) -> FormatResult<(u32, u32)>;

    fn tile_size(&self) -> Option<(u32, u32)>;

    fn set_big_tiff(&mut self, big_tiff: bool) -> FormatResult<()>;

    /// Planes arrive in order and are never revisited
    fn set_sequential(&mut self, sequential: bool) -> FormatResult<()>;

    fn is_sequential(&self) -> bool;

    /// Opens the output file
    fn set_id(&mut self, path: &Path) -> FormatResult<()>;

    fn set_series(&mut self, series: usize) -> FormatResult<()>;

    fn series(&self) -> usize;

    /// Stores `region` of plane `no` of the current series
    ///
    /// `buf` holds the region's samples in the layout given by
    /// `set_interleaved`.
    fn save_region(&mut self, no: usize, buf: &[u8], region: &Region) -> FormatResult<()>;

    /// Finishes the output; unwritten pixels read back as zero
    fn close(&mut self) -> FormatResult<()>;

    /// Whether more than one plane fits in one output file
    fn can_do_stacks(&self) -> bool {
        true
    }

    fn supported_pixel_types(&self, compression: CompressionType) -> &'static [PixelType] {
        compression.supported_pixel_types()
    }

    fn is_supported_type(&self, pixel_type: PixelType) -> bool {
        self.supported_pixel_types(self.compression()).contains(&pixel_type)
    }

    /// Stores a whole plane of the current series
    fn save_bytes(&mut self, no: usize, buf: &[u8]) -> FormatResult<()> {
        let info = self
            .series_info()
            .get(self.series())
            .ok_or(FormatError::NotInitialized)?;
        let region = Region::full(info.size_x, info.size_y);
        self.save_region(no, buf, &region)
    }

    /// Applies the `[writer]` options
    fn apply_options(&mut self, options: &WriterOptions) -> FormatResult<()> {
        self.set_compression(options.compression)?;
        self.set_quality(options.quality);
        self.set_big_tiff(options.big_tiff)?;
        self.set_sequential(options.sequential)?;
        match (options.tile_width, options.tile_height) {
            (None, None) => {}
            (w, h) => {
                let side = w.or(h).unwrap_or(0);
                self.set_tile_size(w.unwrap_or(side), h.unwrap_or(side))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{OmeMetadata, StoreExt};

    #[test]
    fn test_series_from_store() {
        let mut meta = OmeMetadata::new();
        meta.set("Image[0]/Name", "rgb").unwrap();
        meta.set("Image[0]/Pixels/SizeX", 40u32).unwrap();
        meta.set("Image[0]/Pixels/SizeY", 30u32).unwrap();
        meta.set("Image[0]/Pixels/SizeZ", 2usize).unwrap();
        meta.set("Image[0]/Pixels/SizeC", 6usize).unwrap();
        meta.set("Image[0]/Pixels/SizeT", 1usize).unwrap();
        meta.set("Image[0]/Pixels/Type", "uint16").unwrap();
        meta.set("Image[0]/Pixels/BigEndian", true).unwrap();
        meta.set("Image[0]/Pixels/Channel[0]/SamplesPerPixel", 3usize).unwrap();

        let series = series_from_retrieve(&meta).unwrap();
        assert_eq!(series.len(), 1);
        let info = &series[0];
        assert_eq!(info.name.as_deref(), Some("rgb"));
        assert_eq!(info.effective_size_c(), 2);
        assert_eq!(info.image_count(), 4);
        assert!(!info.little_endian);
        assert_eq!(info.dimension_order, DimensionOrder::XYZCT);
        assert_eq!(info.region_bytes(&Region::new(0, 0, 4, 2)), 4 * 2 * 3 * 2);
    }

    #[test]
    fn test_missing_sizes_fail() {
        let mut meta = OmeMetadata::new();
        assert!(series_from_retrieve(&meta).is_err());
        meta.set("Image[0]/Pixels/SizeX", 4u32).unwrap();
        meta.set("Image[0]/Pixels/Type", "uint8").unwrap();
        assert!(series_from_retrieve(&meta).is_err());
    }
}
