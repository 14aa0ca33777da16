//! TIFF tag utilities
//!
//! Decoding of tag values and human-readable names for tags and field types.

use byteorder::ReadBytesExt;
use std::io::{Cursor, SeekFrom};

use crate::errors::{FormatError, FormatResult};
use crate::io::byte_order::ByteOrderHandler;
use crate::io::seekable::SeekableReader;
use crate::tiff::constants::{field_types, photometric, tags};
use crate::tiff::ifd::{IFDEntry, TagValue};

/// Upper bound on values decoded for one tag
const MAX_TAG_VALUES: u64 = 1 << 28;

/// Reads `entry.count` values of the entry's field type from `reader`
pub fn read_tag_value(
    reader: &mut dyn SeekableReader,
    entry: &IFDEntry,
    handler: &dyn ByteOrderHandler,
) -> FormatResult<TagValue> {
    if entry.count > MAX_TAG_VALUES {
        return Err(FormatError::GenericError(format!(
            "Tag {} declares {} values",
            entry.tag, entry.count
        )));
    }
    let n = entry.count as usize;
    macro_rules! collect {
        ($read:expr) => {{
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push($read?);
            }
            values
        }};
    }
    let value = match entry.field_type {
        field_types::BYTE | field_types::SBYTE => TagValue::Byte(collect!(reader.read_u8())),
        field_types::UNDEFINED => TagValue::Undefined(collect!(reader.read_u8())),
        field_types::ASCII => {
            let bytes: Vec<u8> = collect!(reader.read_u8());
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            TagValue::Ascii(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        field_types::SHORT => TagValue::Short(collect!(handler.read_u16(reader))),
        field_types::SSHORT => TagValue::SShort(collect!(handler.read_i16(reader))),
        field_types::LONG | field_types::IFD => TagValue::Long(collect!(handler.read_u32(reader))),
        field_types::SLONG => TagValue::SLong(collect!(handler.read_i32(reader))),
        field_types::RATIONAL => TagValue::Rational(collect!(handler.read_rational(reader))),
        field_types::SRATIONAL => TagValue::SRational(collect!(handler.read_srational(reader))),
        field_types::FLOAT => TagValue::Float(collect!(handler.read_f32(reader))),
        field_types::DOUBLE => TagValue::Double(collect!(handler.read_f64(reader))),
        field_types::LONG8 | field_types::SLONG8 | field_types::IFD8 => {
            TagValue::Long8(collect!(handler.read_u64(reader)))
        }
        other => return Err(FormatError::UnsupportedFieldType(other)),
    };
    Ok(value)
}

/// Resolves an entry's value, either inline or at its offset
pub fn resolve_tag_value(
    reader: &mut dyn SeekableReader,
    entry: &IFDEntry,
    handler: &dyn ByteOrderHandler,
    is_big_tiff: bool,
) -> FormatResult<TagValue> {
    if entry.is_value_inline(is_big_tiff) {
        let mut inline = Cursor::new(&entry.value_bytes[..]);
        read_tag_value(&mut inline, entry, handler)
    } else {
        reader.seek(SeekFrom::Start(entry.value_offset))?;
        read_tag_value(reader, entry, handler)
    }
}

/// Get the name of a TIFF tag
pub fn get_tag_name(tag: u16) -> &'static str {
    match tag {
        tags::NEW_SUBFILE_TYPE => "NewSubfileType",
        tags::IMAGE_WIDTH => "ImageWidth",
        tags::IMAGE_LENGTH => "ImageLength",
        tags::BITS_PER_SAMPLE => "BitsPerSample",
        tags::COMPRESSION => "Compression",
        tags::PHOTOMETRIC_INTERPRETATION => "PhotometricInterpretation",
        tags::IMAGE_DESCRIPTION => "ImageDescription",
        tags::STRIP_OFFSETS => "StripOffsets",
        tags::SAMPLES_PER_PIXEL => "SamplesPerPixel",
        tags::ROWS_PER_STRIP => "RowsPerStrip",
        tags::STRIP_BYTE_COUNTS => "StripByteCounts",
        tags::X_RESOLUTION => "XResolution",
        tags::Y_RESOLUTION => "YResolution",
        tags::PLANAR_CONFIGURATION => "PlanarConfiguration",
        tags::RESOLUTION_UNIT => "ResolutionUnit",
        tags::SOFTWARE => "Software",
        tags::DATE_TIME => "DateTime",
        tags::PREDICTOR => "Predictor",
        tags::COLOR_MAP => "ColorMap",
        tags::TILE_WIDTH => "TileWidth",
        tags::TILE_LENGTH => "TileLength",
        tags::TILE_OFFSETS => "TileOffsets",
        tags::TILE_BYTE_COUNTS => "TileByteCounts",
        tags::SUB_IFDS => "SubIFDs",
        tags::EXTRA_SAMPLES => "ExtraSamples",
        tags::SAMPLE_FORMAT => "SampleFormat",
        _ => "Unknown",
    }
}

/// Get the name of a TIFF field type
pub fn get_field_type_name(field_type: u16) -> &'static str {
    match field_type {
        field_types::BYTE => "BYTE",
        field_types::ASCII => "ASCII",
        field_types::SHORT => "SHORT",
        field_types::LONG => "LONG",
        field_types::RATIONAL => "RATIONAL",
        field_types::SBYTE => "SBYTE",
        field_types::UNDEFINED => "UNDEFINED",
        field_types::SSHORT => "SSHORT",
        field_types::SLONG => "SLONG",
        field_types::SRATIONAL => "SRATIONAL",
        field_types::FLOAT => "FLOAT",
        field_types::DOUBLE => "DOUBLE",
        field_types::IFD => "IFD",
        field_types::LONG8 => "LONG8",
        field_types::SLONG8 => "SLONG8",
        field_types::IFD8 => "IFD8",
        _ => "Unknown",
    }
}

/// Get the name of a photometric interpretation
pub fn get_photometric_name(value: u16) -> &'static str {
    match value {
        photometric::WHITE_IS_ZERO => "WhiteIsZero",
        photometric::BLACK_IS_ZERO => "BlackIsZero",
        photometric::RGB => "RGB",
        photometric::PALETTE => "Palette",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::byte_order::{BigEndianHandler, LittleEndianHandler};

    #[test]
    fn test_inline_shorts_are_decoded_from_value_bytes() {
        // two SHORTs packed into a classic TIFF value field
        let entry = IFDEntry::new(tags::BITS_PER_SAMPLE, field_types::SHORT, 2, 0, [8, 0, 16, 0, 0, 0, 0, 0]);
        let mut empty = Cursor::new(Vec::<u8>::new());
        let value = resolve_tag_value(&mut empty, &entry, &LittleEndianHandler, false).unwrap();
        assert_eq!(value, TagValue::Short(vec![8, 16]));
    }

    #[test]
    fn test_offset_values_are_read_from_the_stream() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&[0, 0, 1, 0, 0, 0, 2, 0]);
        let entry = IFDEntry::new(tags::STRIP_OFFSETS, field_types::LONG, 2, 4, [0; 8]);
        let mut cursor = Cursor::new(data);
        let value = resolve_tag_value(&mut cursor, &entry, &BigEndianHandler, false).unwrap();
        assert_eq!(value, TagValue::Long(vec![256, 512]));
    }

    #[test]
    fn test_ascii_stops_at_nul() {
        let entry = IFDEntry::new(tags::SOFTWARE, field_types::ASCII, 4, 0, *b"abc\0\0\0\0\0");
        let mut empty = Cursor::new(Vec::<u8>::new());
        let value = resolve_tag_value(&mut empty, &entry, &LittleEndianHandler, false).unwrap();
        assert_eq!(value.as_str(), Some("abc"));
    }
}
