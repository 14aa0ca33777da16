//! Dimensions and pixel layout of one series at one resolution

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{FormatError, FormatResult};
use crate::pixels::{plane_size, DimensionOrder, PixelType, ZctSizes};

/// Longest thumbnail edge
pub const THUMBNAIL_DIMENSION: u32 = 128;

/// Core dimensional metadata
///
/// `size_c` counts every channel including RGB samples, so a 3-sample
/// interleaved image with one stored channel has `size_c == 3` and
/// `effective_size_c() == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreMetadata {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    pub image_count: usize,
    pub dimension_order: DimensionOrder,
    pub pixel_type: PixelType,
    pub bits_per_pixel: u16,
    pub little_endian: bool,
    pub interleaved: bool,
    pub rgb: bool,
    pub indexed: bool,
    pub false_color: bool,
    pub thumb_size_x: u32,
    pub thumb_size_y: u32,
    pub metadata_complete: bool,
    /// Free-form key/value pairs reported by the format
    pub series_metadata: BTreeMap<String, String>,
}

impl Default for CoreMetadata {
    fn default() -> Self {
        CoreMetadata {
            size_x: 0,
            size_y: 0,
            size_z: 1,
            size_c: 1,
            size_t: 1,
            image_count: 1,
            dimension_order: DimensionOrder::default(),
            pixel_type: PixelType::Uint8,
            bits_per_pixel: 8,
            little_endian: true,
            interleaved: false,
            rgb: false,
            indexed: false,
            false_color: false,
            thumb_size_x: 0,
            thumb_size_y: 0,
            metadata_complete: true,
            series_metadata: BTreeMap::new(),
        }
    }
}

impl CoreMetadata {
    /// Channel planes per (z, t) position
    pub fn effective_size_c(&self) -> usize {
        let zt = self.size_z * self.size_t;
        if zt == 0 {
            return 0;
        }
        self.image_count / zt
    }

    /// Samples stored together in one plane
    pub fn rgb_channel_count(&self) -> usize {
        let effective = self.effective_size_c();
        if effective == 0 {
            return 0;
        }
        self.size_c / effective
    }

    pub fn zct_sizes(&self) -> ZctSizes {
        ZctSizes::new(self.size_z, self.effective_size_c(), self.size_t, self.image_count)
    }

    /// Bytes of one full plane, or `None` when not representable
    pub fn plane_size(&self) -> Option<usize> {
        plane_size(self.size_x, self.size_y, self.rgb_channel_count(), self.pixel_type)
    }

    /// Thumbnail size bounded by [`THUMBNAIL_DIMENSION`], keeping the aspect ratio
    pub fn compute_thumb_size(&mut self) {
        if self.size_x == 0 || self.size_y == 0 {
            return;
        }
        let (x, y) = (self.size_x as u64, self.size_y as u64);
        let bound = THUMBNAIL_DIMENSION as u64;
        let (tx, ty) = if x >= y {
            (bound.min(x), (y * bound.min(x) / x).max(1))
        } else {
            ((x * bound.min(y) / y).max(1), bound.min(y))
        };
        self.thumb_size_x = tx as u32;
        self.thumb_size_y = ty as u32;
    }

    /// Checks the dimensional identities every reader must satisfy
    pub fn validate(&self) -> FormatResult<()> {
        let fail = |msg: String| Err(FormatError::InconsistentDimensions(msg));
        if self.size_x == 0 || self.size_y == 0 {
            return fail(format!("Invalid plane size {}x{}", self.size_x, self.size_y));
        }
        if self.size_z == 0 || self.size_c == 0 || self.size_t == 0 || self.image_count == 0 {
            return fail(format!(
                "Invalid sizes Z={} C={} T={} imageCount={}",
                self.size_z, self.size_c, self.size_t, self.image_count
            ));
        }
        let zt = self.size_z * self.size_t;
        if self.image_count % zt != 0 {
            return fail(format!(
                "imageCount {} is not a multiple of sizeZ*sizeT = {}",
                self.image_count, zt
            ));
        }
        let effective = self.effective_size_c();
        if effective == 0 || self.size_c % effective != 0 {
            return fail(format!("sizeC {} is not a multiple of effective sizeC {}", self.size_c, effective));
        }
        if !self.rgb && self.rgb_channel_count() != 1 {
            return fail(format!(
                "sizeC {} and imageCount {} imply {} samples per plane, but the image is not RGB",
                self.size_c,
                self.image_count,
                self.rgb_channel_count()
            ));
        }
        Ok(())
    }
}

/// Checks that pyramid levels shrink monotonically
pub fn validate_resolutions(levels: &[CoreMetadata]) -> FormatResult<()> {
    if levels.is_empty() {
        return Err(FormatError::InconsistentDimensions("Series without resolution levels".to_string()));
    }
    for pair in levels.windows(2) {
        if pair[1].size_x > pair[0].size_x || pair[1].size_y > pair[0].size_y {
            return Err(FormatError::InconsistentDimensions(format!(
                "Resolution {}x{} follows smaller level {}x{}",
                pair[1].size_x, pair[1].size_y, pair[0].size_x, pair[0].size_y
            )));
        }
    }
    Ok(())
}

impl fmt::Display for CoreMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Width = {}", self.size_x)?;
        writeln!(f, "  Height = {}", self.size_y)?;
        writeln!(f, "  SizeZ = {}", self.size_z)?;
        writeln!(
            f,
            "  SizeC = {} (effectively {})",
            self.size_c,
            self.effective_size_c()
        )?;
        writeln!(f, "  SizeT = {}", self.size_t)?;
        writeln!(f, "  Image count = {}", self.image_count)?;
        writeln!(f, "  Dimension order = {}", self.dimension_order)?;
        writeln!(f, "  Pixel type = {}", self.pixel_type)?;
        writeln!(f, "  Endianness = {}", if self.little_endian { "intel" } else { "motorola" })?;
        writeln!(f, "  RGB = {} (interleaved: {})", self.rgb, self.interleaved)?;
        write!(f, "  Indexed = {} (false color: {})", self.indexed, self.false_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_core() -> CoreMetadata {
        CoreMetadata {
            size_x: 64,
            size_y: 32,
            size_z: 2,
            size_c: 3,
            size_t: 4,
            image_count: 8,
            rgb: true,
            interleaved: true,
            pixel_type: PixelType::Uint16,
            ..CoreMetadata::default()
        }
    }

    #[test]
    fn test_rgb_derivations() {
        let core = rgb_core();
        assert_eq!(core.effective_size_c(), 1);
        assert_eq!(core.rgb_channel_count(), 3);
        assert_eq!(core.plane_size(), Some(64 * 32 * 3 * 2));
        assert!(core.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut core = rgb_core();
        core.image_count = 7;
        assert!(core.validate().is_err());

        let mut core = rgb_core();
        core.rgb = false;
        assert!(core.validate().is_err());

        let mut core = rgb_core();
        core.size_x = 0;
        assert!(core.validate().is_err());
    }

    #[test]
    fn test_thumb_size_keeps_aspect() {
        let mut core = rgb_core();
        core.size_x = 1000;
        core.size_y = 250;
        core.compute_thumb_size();
        assert_eq!((core.thumb_size_x, core.thumb_size_y), (128, 32));

        core.size_x = 50;
        core.size_y = 60;
        core.compute_thumb_size();
        assert_eq!((core.thumb_size_x, core.thumb_size_y), (50, 60));
    }

    #[test]
    fn test_resolution_monotonicity() {
        let full = rgb_core();
        let mut half = rgb_core();
        half.size_x /= 2;
        half.size_y /= 2;
        assert!(validate_resolutions(&[full.clone(), half.clone()]).is_ok());
        assert!(validate_resolutions(&[half, full]).is_err());
        assert!(validate_resolutions(&[]).is_err());
    }
}
