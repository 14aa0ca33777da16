//! Pixel addressing
//!
//! Pixel types, dimension-order linearization of (Z, C, T) coordinates and
//! bounds checks for plane and tile requests.

pub mod dimension_order;
pub mod pixel_type;
pub mod region;

pub use dimension_order::{
    get_index, get_reordered_index, get_zct_coords, position_to_raster, raster_length, raster_to_position,
    DimensionOrder, ZctSizes,
};
pub use pixel_type::PixelType;
pub use region::{check_tile_size, copy_subrect, paste_subrect, Region};

use crate::errors::{FormatError, FormatResult};

/// Bytes needed for a `width` x `height` region with `samples` samples per pixel
///
/// Returns `None` when the size does not fit in `usize`.
pub fn plane_size(width: u32, height: u32, samples: usize, pixel_type: PixelType) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(samples)?
        .checked_mul(pixel_type.bytes_per_pixel())
}

/// Fails when `plane` is not in `0..image_count`
pub fn check_plane_number(plane: usize, image_count: usize) -> FormatResult<()> {
    if plane >= image_count {
        return Err(FormatError::InvalidPlane { plane, image_count });
    }
    Ok(())
}

/// Fails when a buffer of `len` bytes cannot hold `required` bytes
pub fn check_buffer_size(len: usize, required: usize) -> FormatResult<()> {
    if len < required {
        return Err(FormatError::BufferTooSmall { required, actual: len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_size() {
        assert_eq!(plane_size(10, 20, 3, PixelType::Uint16), Some(1200));
        assert_eq!(plane_size(u32::MAX, u32::MAX, usize::MAX, PixelType::Double), None);
    }

    #[test]
    fn test_plane_and_buffer_checks() {
        assert!(check_plane_number(0, 1).is_ok());
        assert!(check_plane_number(1, 1).is_err());
        assert!(check_buffer_size(10, 10).is_ok());
        assert!(check_buffer_size(9, 10).is_err());
    }
}
