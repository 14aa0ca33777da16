//! Rectangular plane regions and bounds checks
//!
//! A region is a tile request within a plane. Coordinates are in pixels
//! with (0,0) at the top-left corner; width and height do not need to
//! divide the plane size evenly.

use crate::errors::{FormatError, FormatResult};

/// Rectangular area of a plane (in pixel coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
    /// X-coordinate of the top-left corner (pixels from left)
    pub x: u32,

    /// Y-coordinate of the top-left corner (pixels from top)
    pub y: u32,

    /// Width of the region in pixels
    pub width: u32,

    /// Height of the region in pixels
    pub height: u32,
}

impl Region {
    /// Create a new region
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Region { x, y, width, height }
    }

    /// Region covering a whole plane of the given size
    pub fn full(size_x: u32, size_y: u32) -> Self {
        Region::new(0, 0, size_x, size_y)
    }

    /// Get the rightmost X coordinate (exclusive)
    pub fn end_x(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Get the bottommost Y coordinate (exclusive)
    pub fn end_y(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Number of pixels in the region
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether this region covers a whole plane of the given size
    pub fn covers(&self, size_x: u32, size_y: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == size_x && self.height == size_y
    }

    /// Intersection of two regions, `None` when they do not overlap
    pub fn intersection(&self, other: &Region) -> Option<Region> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.end_x().min(other.end_x());
        let y1 = self.end_y().min(other.end_y());
        if x1 <= x0 as u64 || y1 <= y0 as u64 {
            return None;
        }
        Some(Region::new(x0, y0, (x1 - x0 as u64) as u32, (y1 - y0 as u64) as u32))
    }
}

/// Validates a tile request against the plane size
///
/// Fails with [`FormatError::OutOfBounds`] when the rectangle does not fit
/// entirely inside a `size_x` by `size_y` plane.
pub fn check_tile_size(region: &Region, size_x: u32, size_y: u32) -> FormatResult<()> {
    if region.end_x() > size_x as u64 || region.end_y() > size_y as u64 {
        return Err(FormatError::OutOfBounds {
            region: *region,
            size_x,
            size_y,
        });
    }
    Ok(())
}

/// Copies a sub-rectangle out of a row-major plane buffer
///
/// `pixel_bytes` is the number of bytes per pixel in `plane` (bytes per
/// sample times interleaved samples). For planar (non-interleaved)
/// multi-sample data call this once per sample plane.
pub fn copy_subrect(
    plane: &[u8],
    plane_width: u32,
    pixel_bytes: usize,
    region: &Region,
    out: &mut [u8],
) -> FormatResult<()> {
    let row_in = plane_width as usize * pixel_bytes;
    let row_out = region.width as usize * pixel_bytes;
    let needed = row_out * region.height as usize;
    if out.len() < needed {
        return Err(FormatError::BufferTooSmall { required: needed, actual: out.len() });
    }
    let last = if region.height == 0 {
        0
    } else {
        (region.y as usize + region.height as usize - 1) * row_in + region.end_x() as usize * pixel_bytes
    };
    if last > plane.len() {
        return Err(FormatError::BufferTooSmall { required: last, actual: plane.len() });
    }
    for row in 0..region.height as usize {
        let src = (region.y as usize + row) * row_in + region.x as usize * pixel_bytes;
        out[row * row_out..(row + 1) * row_out].copy_from_slice(&plane[src..src + row_out]);
    }
    Ok(())
}

/// Writes a sub-rectangle into a row-major plane buffer
///
/// Inverse of [`copy_subrect`].
pub fn paste_subrect(
    plane: &mut [u8],
    plane_width: u32,
    pixel_bytes: usize,
    region: &Region,
    data: &[u8],
) -> FormatResult<()> {
    let row_out = plane_width as usize * pixel_bytes;
    let row_in = region.width as usize * pixel_bytes;
    if data.len() < row_in * region.height as usize {
        return Err(FormatError::BufferTooSmall {
            required: row_in * region.height as usize,
            actual: data.len(),
        });
    }
    for row in 0..region.height as usize {
        let dst = (region.y as usize + row) * row_out + region.x as usize * pixel_bytes;
        if dst + row_in > plane.len() {
            return Err(FormatError::BufferTooSmall { required: dst + row_in, actual: plane.len() });
        }
        plane[dst..dst + row_in].copy_from_slice(&data[row * row_in..(row + 1) * row_in]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tile_size() {
        assert!(check_tile_size(&Region::new(0, 0, 10, 10), 10, 10).is_ok());
        assert!(check_tile_size(&Region::new(5, 5, 5, 5), 10, 10).is_ok());
        assert!(check_tile_size(&Region::new(6, 0, 5, 1), 10, 10).is_err());
        assert!(check_tile_size(&Region::new(0, 9, 1, 2), 10, 10).is_err());
        // overflowing coordinates must not wrap around
        assert!(check_tile_size(&Region::new(u32::MAX, 0, 2, 1), 10, 10).is_err());
    }

    #[test]
    fn test_subrect_copy_and_paste() {
        let plane: Vec<u8> = (0..16).collect();
        let region = Region::new(1, 1, 2, 2);
        let mut out = vec![0u8; 4];
        copy_subrect(&plane, 4, 1, &region, &mut out).unwrap();
        assert_eq!(out, vec![5, 6, 9, 10]);

        let mut target = vec![0u8; 16];
        paste_subrect(&mut target, 4, 1, &region, &out).unwrap();
        assert_eq!(target[5], 5);
        assert_eq!(target[10], 10);
        assert_eq!(target[0], 0);
    }

    #[test]
    fn test_intersection() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(8, 8, 10, 10);
        assert_eq!(a.intersection(&b), Some(Region::new(8, 8, 2, 2)));
        assert_eq!(a.intersection(&Region::new(10, 0, 1, 1)), None);
    }
}
