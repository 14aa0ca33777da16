//! Image File Directory (IFD) structures and methods
//!
//! An IFD is a sparse map from tag numbers to typed values. The parser
//! fills one per directory in the file; the saver builds one per plane and
//! keeps reusing it while the plane's (Z, C, T) position is unchanged.

use std::collections::BTreeMap;
use std::fmt;

use log::trace;

use crate::compression::CompressionType;
use crate::errors::{FormatError, FormatResult};
use crate::pixels::PixelType;
use crate::tiff::constants::{field_types, new_subfile_type, photometric, planar_config, predictor, tags};
use crate::utils::tag_utils;

/// A raw entry as stored on disk
///
/// `value_bytes` holds the 4 (TIFF) or 8 (BigTIFF) bytes of the value
/// field exactly as read, so inline values can be decoded later.
#[derive(Debug, Clone)]
pub struct IFDEntry {
    /// TIFF tag identifier
    pub tag: u16,
    /// Field type
    pub field_type: u16,
    /// Number of values
    pub count: u64,
    /// Value or offset to values
    pub value_offset: u64,
    /// Raw value field
    pub value_bytes: [u8; 8],
}

impl IFDEntry {
    /// Creates a new IFD entry
    pub fn new(tag: u16, field_type: u16, count: u64, value_offset: u64, value_bytes: [u8; 8]) -> Self {
        trace!(
            "IFD entry: tag={} ({}), type={} ({}), count={}, offset/value={}",
            tag,
            tag_utils::get_tag_name(tag),
            field_type,
            tag_utils::get_field_type_name(field_type),
            count,
            value_offset
        );
        IFDEntry {
            tag,
            field_type,
            count,
            value_offset,
            value_bytes,
        }
    }

    /// Get the size in bytes for this entry's field type
    pub fn get_field_type_size(&self) -> usize {
        field_type_size(self.field_type)
    }

    /// Determines if the value is stored inline in the value field
    pub fn is_value_inline(&self, is_big_tiff: bool) -> bool {
        let total_size = self.get_field_type_size() as u64 * self.count;
        total_size <= if is_big_tiff { 8 } else { 4 }
    }
}

/// Bytes used by one value of a field type (0 for unknown types)
pub fn field_type_size(field_type: u16) -> usize {
    match field_type {
        field_types::BYTE | field_types::ASCII | field_types::SBYTE | field_types::UNDEFINED => 1,
        field_types::SHORT | field_types::SSHORT => 2,
        field_types::LONG | field_types::SLONG | field_types::FLOAT | field_types::IFD => 4,
        field_types::RATIONAL | field_types::SRATIONAL | field_types::DOUBLE => 8,
        field_types::LONG8 | field_types::SLONG8 | field_types::IFD8 => 8,
        _ => 0,
    }
}

/// Decoded value of a tag
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Long8(Vec<u64>),
    Rational(Vec<(u32, u32)>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<(i32, i32)>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Undefined(Vec<u8>),
}

impl TagValue {
    /// TIFF field type used when writing this value
    pub fn field_type(&self) -> u16 {
        match self {
            TagValue::Byte(_) => field_types::BYTE,
            TagValue::Ascii(_) => field_types::ASCII,
            TagValue::Short(_) => field_types::SHORT,
            TagValue::Long(_) => field_types::LONG,
            TagValue::Long8(_) => field_types::LONG8,
            TagValue::Rational(_) => field_types::RATIONAL,
            TagValue::SShort(_) => field_types::SSHORT,
            TagValue::SLong(_) => field_types::SLONG,
            TagValue::SRational(_) => field_types::SRATIONAL,
            TagValue::Float(_) => field_types::FLOAT,
            TagValue::Double(_) => field_types::DOUBLE,
            TagValue::Undefined(_) => field_types::UNDEFINED,
        }
    }

    /// Number of values (ASCII counts include the NUL terminator)
    pub fn count(&self) -> usize {
        match self {
            TagValue::Byte(v) | TagValue::Undefined(v) => v.len(),
            TagValue::Ascii(s) => s.len() + 1,
            TagValue::Short(v) => v.len(),
            TagValue::Long(v) => v.len(),
            TagValue::Long8(v) => v.len(),
            TagValue::Rational(v) => v.len(),
            TagValue::SShort(v) => v.len(),
            TagValue::SLong(v) => v.len(),
            TagValue::SRational(v) => v.len(),
            TagValue::Float(v) => v.len(),
            TagValue::Double(v) => v.len(),
        }
    }

    /// Size of the encoded value in bytes
    pub fn byte_len(&self) -> usize {
        self.count() * field_type_size(self.field_type())
    }

    /// Integer values widened to u64; `None` for non-integer types
    pub fn as_u64_vec(&self) -> Option<Vec<u64>> {
        match self {
            TagValue::Byte(v) | TagValue::Undefined(v) => Some(v.iter().map(|&x| x as u64).collect()),
            TagValue::Short(v) => Some(v.iter().map(|&x| x as u64).collect()),
            TagValue::Long(v) => Some(v.iter().map(|&x| x as u64).collect()),
            TagValue::Long8(v) => Some(v.clone()),
            TagValue::SShort(v) => Some(v.iter().map(|&x| x.max(0) as u64).collect()),
            TagValue::SLong(v) => Some(v.iter().map(|&x| x.max(0) as u64).collect()),
            _ => None,
        }
    }

    pub fn first_u64(&self) -> Option<u64> {
        self.as_u64_vec().and_then(|v| v.first().copied())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) => Some(s),
            _ => None,
        }
    }
}

/// Represents an Image File Directory (IFD) in a TIFF file
#[derive(Debug, Clone, PartialEq)]
pub struct IFD {
    /// IFD number (0-based, in chain order)
    pub number: usize,
    /// Offset to this IFD in the file
    pub offset: u64,
    /// Byte order of multi-byte pixel samples
    pub little_endian: bool,
    entries: BTreeMap<u16, TagValue>,
}

impl IFD {
    /// Creates an empty IFD
    pub fn new(number: usize, offset: u64, little_endian: bool) -> Self {
        IFD {
            number,
            offset,
            little_endian,
            entries: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, tag: u16, value: TagValue) {
        self.entries.insert(tag, value);
    }

    pub fn remove(&mut self, tag: u16) -> Option<TagValue> {
        self.entries.remove(&tag)
    }

    pub fn get(&self, tag: u16) -> Option<&TagValue> {
        self.entries.get(&tag)
    }

    pub fn has_tag(&self, tag: u16) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Tags in ascending order, as TIFF requires on disk
    pub fn entries(&self) -> impl Iterator<Item = (&u16, &TagValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value of an integer tag
    pub fn get_tag_value(&self, tag: u16) -> Option<u64> {
        self.get(tag).and_then(TagValue::first_u64)
    }

    /// All values of an integer tag
    pub fn get_tag_values(&self, tag: u16) -> Option<Vec<u64>> {
        self.get(tag).and_then(TagValue::as_u64_vec)
    }

    fn required(&self, tag: u16) -> FormatResult<u64> {
        self.get_tag_value(tag).ok_or(FormatError::TagNotFound(tag))
    }

    pub fn image_width(&self) -> FormatResult<u32> {
        Ok(self.required(tags::IMAGE_WIDTH)? as u32)
    }

    pub fn image_length(&self) -> FormatResult<u32> {
        Ok(self.required(tags::IMAGE_LENGTH)? as u32)
    }

    /// Returns image dimensions (width, height) if available
    pub fn get_dimensions(&self) -> Option<(u32, u32)> {
        Some((self.image_width().ok()?, self.image_length().ok()?))
    }

    pub fn samples_per_pixel(&self) -> u16 {
        self.get_tag_value(tags::SAMPLES_PER_PIXEL).unwrap_or(1) as u16
    }

    /// Bits per sample; all samples of a pixel must share one depth
    pub fn bits_per_sample(&self) -> FormatResult<u16> {
        let values = self.get_tag_values(tags::BITS_PER_SAMPLE).unwrap_or_else(|| vec![1]);
        let first = values.first().copied().unwrap_or(1);
        if values.iter().any(|&b| b != first) {
            return Err(FormatError::Unsupported(format!("mixed bits per sample {:?}", values)));
        }
        Ok(first as u16)
    }

    pub fn sample_format(&self) -> u16 {
        self.get_tag_value(tags::SAMPLE_FORMAT).unwrap_or(1) as u16
    }

    pub fn pixel_type(&self) -> FormatResult<PixelType> {
        PixelType::from_tiff(self.bits_per_sample()?, self.sample_format())
    }

    pub fn compression(&self) -> FormatResult<CompressionType> {
        CompressionType::from_code(self.get_tag_value(tags::COMPRESSION).unwrap_or(1))
    }

    pub fn photometric(&self) -> u16 {
        self.get_tag_value(tags::PHOTOMETRIC_INTERPRETATION)
            .unwrap_or(photometric::BLACK_IS_ZERO as u64) as u16
    }

    pub fn predictor(&self) -> u16 {
        self.get_tag_value(tags::PREDICTOR).unwrap_or(predictor::NONE as u64) as u16
    }

    /// Whether samples are stored pixel-interleaved
    pub fn is_chunky(&self) -> bool {
        self.get_tag_value(tags::PLANAR_CONFIGURATION).unwrap_or(planar_config::CHUNKY as u64)
            == planar_config::CHUNKY as u64
    }

    pub fn is_tiled(&self) -> bool {
        self.has_tag(tags::TILE_WIDTH) && self.has_tag(tags::TILE_OFFSETS)
    }

    pub fn is_reduced_resolution(&self) -> bool {
        self.get_tag_value(tags::NEW_SUBFILE_TYPE).unwrap_or(0) & new_subfile_type::REDUCED_RESOLUTION != 0
    }

    pub fn is_indexed(&self) -> bool {
        self.photometric() == photometric::PALETTE && self.has_tag(tags::COLOR_MAP)
    }

    /// Rows per strip, defaulting to the whole image
    pub fn rows_per_strip(&self) -> FormatResult<u32> {
        let height = self.image_length()?;
        Ok(self
            .get_tag_value(tags::ROWS_PER_STRIP)
            .map(|r| (r.min(height as u64)) as u32)
            .unwrap_or(height)
            .max(1))
    }

    /// Block (tile or strip) width and height
    pub fn block_size(&self) -> FormatResult<(u32, u32)> {
        if self.is_tiled() {
            let w = self.required(tags::TILE_WIDTH)? as u32;
            let h = self.required(tags::TILE_LENGTH)? as u32;
            if w == 0 || h == 0 {
                return Err(FormatError::GenericError(format!("Invalid tile size {}x{}", w, h)));
            }
            Ok((w, h))
        } else {
            Ok((self.image_width()?, self.rows_per_strip()?))
        }
    }

    /// Blocks across and down one sample plane
    pub fn block_grid(&self) -> FormatResult<(u32, u32)> {
        let (bw, bh) = self.block_size()?;
        Ok((self.image_width()?.div_ceil(bw), self.image_length()?.div_ceil(bh)))
    }

    /// Offsets of every tile or strip
    pub fn block_offsets(&self) -> FormatResult<Vec<u64>> {
        let tag = if self.is_tiled() { tags::TILE_OFFSETS } else { tags::STRIP_OFFSETS };
        self.get_tag_values(tag).ok_or(FormatError::TagNotFound(tag))
    }

    /// Byte counts of every tile or strip
    pub fn block_byte_counts(&self) -> FormatResult<Vec<u64>> {
        let tag = if self.is_tiled() { tags::TILE_BYTE_COUNTS } else { tags::STRIP_BYTE_COUNTS };
        self.get_tag_values(tag).ok_or(FormatError::TagNotFound(tag))
    }

    /// Offsets of child IFDs (pyramid levels in SubIFD-style files)
    pub fn sub_ifds(&self) -> Vec<u64> {
        self.get_tag_values(tags::SUB_IFDS).unwrap_or_default()
    }

    pub fn description(&self) -> Option<&str> {
        self.get(tags::IMAGE_DESCRIPTION).and_then(TagValue::as_str)
    }

    /// Plane shape used to group pages into a series
    pub fn shape_key(&self) -> Option<(u32, u32, u16, u16, u16)> {
        let (w, h) = self.get_dimensions()?;
        Some((w, h, self.samples_per_pixel(), self.bits_per_sample().ok()?, self.sample_format()))
    }
}

impl fmt::Display for IFD {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "IFD #{} (offset: {})", self.number, self.offset)?;
        for (tag, value) in &self.entries {
            let shown = match value {
                TagValue::Ascii(s) => s.clone(),
                other => match other.as_u64_vec() {
                    Some(v) if v.len() > 8 => format!("{:?}... ({} values)", &v[..8], v.len()),
                    Some(v) => format!("{:?}", v),
                    None => format!("{:?}", other),
                },
            };
            writeln!(f, "  {} ({}): {}", tag_utils::get_tag_name(*tag), tag, shown)?;
        }
        Ok(())
    }
}
