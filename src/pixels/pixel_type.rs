//! Pixel types and per-sample decoding

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use std::fmt;

use crate::errors::{FormatError, FormatResult};

/// Storage type of a single sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float,
    Double,
    /// One bit per sample, stored as one byte per sample
    Bit,
}

impl PixelType {
    pub const ALL: [PixelType; 9] = [
        PixelType::Int8,
        PixelType::Uint8,
        PixelType::Int16,
        PixelType::Uint16,
        PixelType::Int32,
        PixelType::Uint32,
        PixelType::Float,
        PixelType::Double,
        PixelType::Bit,
    ];

    /// Bytes used to store one sample
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelType::Int8 | PixelType::Uint8 | PixelType::Bit => 1,
            PixelType::Int16 | PixelType::Uint16 => 2,
            PixelType::Int32 | PixelType::Uint32 | PixelType::Float => 4,
            PixelType::Double => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            PixelType::Int8 | PixelType::Int16 | PixelType::Int32 | PixelType::Float | PixelType::Double
        )
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, PixelType::Float | PixelType::Double)
    }

    /// Stable lower-case name
    pub fn name(&self) -> &'static str {
        match self {
            PixelType::Int8 => "int8",
            PixelType::Uint8 => "uint8",
            PixelType::Int16 => "int16",
            PixelType::Uint16 => "uint16",
            PixelType::Int32 => "int32",
            PixelType::Uint32 => "uint32",
            PixelType::Float => "float",
            PixelType::Double => "double",
            PixelType::Bit => "bit",
        }
    }

    /// Parses a pixel type from its name (case-insensitive)
    pub fn from_name(name: &str) -> FormatResult<Self> {
        let lower = name.to_ascii_lowercase();
        PixelType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            .ok_or_else(|| FormatError::GenericError(format!("Unknown pixel type: {}", name)))
    }

    /// Maps TIFF sample format and bit depth to a pixel type
    ///
    /// `sample_format` uses the TIFF codes: 1 unsigned, 2 signed, 3 IEEE float.
    pub fn from_tiff(bits_per_sample: u16, sample_format: u16) -> FormatResult<Self> {
        let pixel_type = match (sample_format, bits_per_sample) {
            (_, 1) => PixelType::Bit,
            (2, 8) => PixelType::Int8,
            (2, 16) => PixelType::Int16,
            (2, 32) => PixelType::Int32,
            (3, 32) => PixelType::Float,
            (3, 64) => PixelType::Double,
            (_, 8) => PixelType::Uint8,
            (_, 16) => PixelType::Uint16,
            (_, 32) => PixelType::Uint32,
            _ => {
                return Err(FormatError::Unsupported(format!(
                    "{} bits per sample with sample format {}",
                    bits_per_sample, sample_format
                )))
            }
        };
        Ok(pixel_type)
    }

    /// TIFF SampleFormat code for this type
    pub fn tiff_sample_format(&self) -> u16 {
        if self.is_floating_point() {
            3
        } else if self.is_signed() {
            2
        } else {
            1
        }
    }

    /// Smallest and largest representable values
    pub fn range(&self) -> (f64, f64) {
        match self {
            PixelType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            PixelType::Uint8 => (0.0, u8::MAX as f64),
            PixelType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            PixelType::Uint16 => (0.0, u16::MAX as f64),
            PixelType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            PixelType::Uint32 => (0.0, u32::MAX as f64),
            PixelType::Float => (f32::MIN as f64, f32::MAX as f64),
            PixelType::Double => (f64::MIN, f64::MAX),
            PixelType::Bit => (0.0, 1.0),
        }
    }

    /// Decodes the sample at `index` (in samples, not bytes)
    pub fn sample(&self, data: &[u8], index: usize, little_endian: bool) -> f64 {
        let bpp = self.bytes_per_pixel();
        let bytes = &data[index * bpp..(index + 1) * bpp];
        macro_rules! read {
            ($method:ident) => {
                if little_endian {
                    LittleEndian::$method(bytes)
                } else {
                    BigEndian::$method(bytes)
                }
            };
        }
        match self {
            PixelType::Int8 => bytes[0] as i8 as f64,
            PixelType::Uint8 | PixelType::Bit => bytes[0] as f64,
            PixelType::Int16 => read!(read_i16) as f64,
            PixelType::Uint16 => read!(read_u16) as f64,
            PixelType::Int32 => read!(read_i32) as f64,
            PixelType::Uint32 => read!(read_u32) as f64,
            PixelType::Float => read!(read_f32) as f64,
            PixelType::Double => read!(read_f64),
        }
    }

    /// Encodes `value` at sample `index`, saturating to the type's range
    pub fn write_sample(&self, data: &mut [u8], index: usize, value: f64, little_endian: bool) {
        let bpp = self.bytes_per_pixel();
        let (lo, hi) = self.range();
        let v = value.clamp(lo, hi);
        let bytes = &mut data[index * bpp..(index + 1) * bpp];
        macro_rules! write {
            ($method:ident, $value:expr) => {
                if little_endian {
                    LittleEndian::$method(bytes, $value)
                } else {
                    BigEndian::$method(bytes, $value)
                }
            };
        }
        match self {
            PixelType::Int8 => bytes[0] = v as i8 as u8,
            PixelType::Uint8 | PixelType::Bit => bytes[0] = v as u8,
            PixelType::Int16 => write!(write_i16, v as i16),
            PixelType::Uint16 => write!(write_u16, v as u16),
            PixelType::Int32 => write!(write_i32, v as i32),
            PixelType::Uint32 => write!(write_u32, v as u32),
            PixelType::Float => write!(write_f32, v as f32),
            PixelType::Double => write!(write_f64, v),
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for t in PixelType::ALL {
            assert_eq!(PixelType::from_name(t.name()).unwrap(), t);
        }
        assert!(PixelType::from_name("complex").is_err());
    }

    #[test]
    fn test_tiff_mapping() {
        assert_eq!(PixelType::from_tiff(16, 1).unwrap(), PixelType::Uint16);
        assert_eq!(PixelType::from_tiff(32, 3).unwrap(), PixelType::Float);
        assert_eq!(PixelType::from_tiff(8, 2).unwrap(), PixelType::Int8);
        assert!(PixelType::from_tiff(12, 1).is_err());
    }

    #[test]
    fn test_sample_decoding() {
        let data = [0x01, 0x02];
        assert_eq!(PixelType::Uint16.sample(&data, 0, true), 0x0201 as f64);
        assert_eq!(PixelType::Uint16.sample(&data, 0, false), 0x0102 as f64);

        let mut buf = vec![0u8; 4];
        PixelType::Int16.write_sample(&mut buf, 1, -5.0, true);
        assert_eq!(PixelType::Int16.sample(&buf, 1, true), -5.0);
        PixelType::Uint8.write_sample(&mut buf, 0, 300.0, true);
        assert_eq!(buf[0], 255);
    }
}
