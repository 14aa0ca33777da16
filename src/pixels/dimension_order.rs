//! Dimension order arithmetic
//!
//! Planes of a series are addressed by a single linear index. The
//! dimension order (a permutation of X, Y, Z, C and T that starts with XY
//! or YX) declares how the Z, C and T axes nest: the first of them after
//! XY varies fastest.

use std::fmt;
use std::str::FromStr;

use crate::errors::{FormatError, FormatResult};

/// Validated dimension order such as `XYZCT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionOrder {
    /// Axis letters in declaration order
    letters: [u8; 5],
}

impl DimensionOrder {
    pub const XYZCT: DimensionOrder = DimensionOrder { letters: *b"XYZCT" };
    pub const XYZTC: DimensionOrder = DimensionOrder { letters: *b"XYZTC" };
    pub const XYCZT: DimensionOrder = DimensionOrder { letters: *b"XYCZT" };
    pub const XYCTZ: DimensionOrder = DimensionOrder { letters: *b"XYCTZ" };
    pub const XYTZC: DimensionOrder = DimensionOrder { letters: *b"XYTZC" };
    pub const XYTCZ: DimensionOrder = DimensionOrder { letters: *b"XYTCZ" };

    /// Parses and validates a dimension order string
    pub fn parse(order: &str) -> FormatResult<Self> {
        let upper = order.to_ascii_uppercase();
        let bytes = upper.as_bytes();
        let invalid = || FormatError::InconsistentDimensions(format!("Invalid dimension order: {}", order));
        if bytes.len() != 5 || !(upper.starts_with("XY") || upper.starts_with("YX")) {
            return Err(invalid());
        }
        let mut letters = [0u8; 5];
        letters.copy_from_slice(bytes);
        for axis in [b'Z', b'C', b'T'] {
            if letters[2..].iter().filter(|&&l| l == axis).count() != 1 {
                return Err(invalid());
            }
        }
        Ok(DimensionOrder { letters })
    }

    pub fn as_str(&self) -> &str {
        // letters only ever hold ASCII axis names
        std::str::from_utf8(&self.letters).unwrap_or("XYZCT")
    }

    /// Position of an axis among the three non-spatial axes (0 = fastest)
    fn rank(&self, axis: u8) -> usize {
        self.letters[2..].iter().position(|&l| l == axis).unwrap_or(0)
    }

    /// Positions of Z, C and T (0 = fastest varying)
    pub fn ranks(&self) -> (usize, usize, usize) {
        (self.rank(b'Z'), self.rank(b'C'), self.rank(b'T'))
    }

    /// Non-spatial axes from fastest to slowest varying
    pub fn zct_axes(&self) -> [char; 3] {
        [self.letters[2] as char, self.letters[3] as char, self.letters[4] as char]
    }
}

impl Default for DimensionOrder {
    fn default() -> Self {
        DimensionOrder::XYZCT
    }
}

impl FromStr for DimensionOrder {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DimensionOrder::parse(s)
    }
}

impl fmt::Display for DimensionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizes of the Z, C (effective) and T axes plus the image count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZctSizes {
    pub z: usize,
    pub c: usize,
    pub t: usize,
    pub image_count: usize,
}

impl ZctSizes {
    pub fn new(z: usize, c: usize, t: usize, image_count: usize) -> Self {
        ZctSizes { z, c, t, image_count }
    }

    fn validate(&self) -> FormatResult<()> {
        for (name, size) in [("Z", self.z), ("C", self.c), ("T", self.t)] {
            if size == 0 {
                return Err(FormatError::InconsistentDimensions(format!("Invalid {} size: 0", name)));
            }
        }
        if self.image_count == 0 {
            return Err(FormatError::InconsistentDimensions("Invalid image count: 0".to_string()));
        }
        if self.image_count != self.z * self.c * self.t {
            return Err(FormatError::InconsistentDimensions(format!(
                "ZCT size vs image count mismatch (sizeZ={}, sizeC={}, sizeT={}, total={})",
                self.z, self.c, self.t, self.image_count
            )));
        }
        Ok(())
    }

    fn ordered_lengths(&self, order: &DimensionOrder) -> [usize; 3] {
        let (iz, ic, it) = order.ranks();
        let mut lengths = [0usize; 3];
        lengths[iz] = self.z;
        lengths[ic] = self.c;
        lengths[it] = self.t;
        lengths
    }
}

/// Linear plane index of (z, c, t)
pub fn get_index(order: &DimensionOrder, sizes: ZctSizes, z: usize, c: usize, t: usize) -> FormatResult<usize> {
    sizes.validate()?;
    for (name, v, size) in [("Z", z, sizes.z), ("C", c, sizes.c), ("T", t, sizes.t)] {
        if v >= size {
            return Err(FormatError::InconsistentDimensions(format!(
                "Invalid {} index: {}/{}",
                name, v, size
            )));
        }
    }
    let (iz, ic, it) = order.ranks();
    let mut values = [0usize; 3];
    values[iz] = z;
    values[ic] = c;
    values[it] = t;
    let lengths = sizes.ordered_lengths(order);
    Ok(values[0] + values[1] * lengths[0] + values[2] * lengths[0] * lengths[1])
}

/// Inverse of [`get_index`]: the (z, c, t) coordinates of a plane index
pub fn get_zct_coords(order: &DimensionOrder, sizes: ZctSizes, index: usize) -> FormatResult<[usize; 3]> {
    sizes.validate()?;
    if index >= sizes.image_count {
        return Err(FormatError::InvalidPlane {
            plane: index,
            image_count: sizes.image_count,
        });
    }
    let lengths = sizes.ordered_lengths(order);
    let values = [
        index % lengths[0],
        index / lengths[0] % lengths[1],
        index / lengths[0] / lengths[1],
    ];
    let (iz, ic, it) = order.ranks();
    Ok([values[iz], values[ic], values[it]])
}

/// Translates a plane index expressed in `new_order` to `original_order`
pub fn get_reordered_index(
    original_order: &DimensionOrder,
    new_order: &DimensionOrder,
    sizes: ZctSizes,
    new_index: usize,
) -> FormatResult<usize> {
    let [z, c, t] = get_zct_coords(new_order, sizes, new_index)?;
    get_index(original_order, sizes, z, c, t)
}

/// Rasterizes an N-dimensional position (first axis fastest)
pub fn position_to_raster(lengths: &[usize], position: &[usize]) -> usize {
    let mut offset = 1;
    let mut raster = 0;
    for (pos, len) in position.iter().zip(lengths) {
        raster += offset * pos;
        offset *= len;
    }
    raster
}

/// Inverse of [`position_to_raster`]
pub fn raster_to_position(lengths: &[usize], raster: usize) -> Vec<usize> {
    let mut position = vec![0; lengths.len()];
    let mut remaining = raster;
    let mut offset = 1;
    for i in 0..lengths.len() {
        let next = offset * lengths[i];
        let q = if i + 1 < lengths.len() { remaining % next } else { remaining };
        position[i] = q / offset;
        remaining -= q;
        offset = next;
    }
    position
}

/// Number of raster positions for the given lengths
pub fn raster_length(lengths: &[usize]) -> usize {
    lengths.iter().product()
}
