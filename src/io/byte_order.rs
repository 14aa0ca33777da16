//! Byte order handling for TIFF files
//!
//! Strategy pattern for reading and writing multi-byte values in either
//! little-endian or big-endian order.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Result, Write};

use crate::errors::{FormatError, FormatResult};
use crate::io::seekable::SeekableReader;

/// Represents the byte order of a TIFF file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian byte order (II)
    LittleEndian,
    /// Big-endian byte order (MM)
    BigEndian,
}

impl ByteOrder {
    /// Detects the byte order from the TIFF header
    pub fn detect(reader: &mut dyn SeekableReader) -> FormatResult<Self> {
        let marker = reader.read_u16::<LittleEndian>()?;
        Self::from_marker(marker)
    }

    /// Maps a header marker to a byte order
    pub fn from_marker(marker: u16) -> FormatResult<Self> {
        match marker {
            0x4949 => Ok(ByteOrder::LittleEndian), // "II" (Intel)
            0x4D4D => Ok(ByteOrder::BigEndian),    // "MM" (Motorola)
            _ => Err(FormatError::InvalidByteOrder(marker)),
        }
    }

    pub fn from_little_endian(little: bool) -> Self {
        if little {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }

    pub fn is_little_endian(&self) -> bool {
        *self == ByteOrder::LittleEndian
    }

    /// The two header bytes for this order
    pub fn marker(&self) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => *b"II",
            ByteOrder::BigEndian => *b"MM",
        }
    }

    /// Returns a string representation of this byte order
    pub fn name(&self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "Little Endian (II)",
            ByteOrder::BigEndian => "Big Endian (MM)",
        }
    }

    /// Creates the appropriate handler for this byte order
    pub fn create_handler(&self) -> Box<dyn ByteOrderHandler> {
        match self {
            ByteOrder::LittleEndian => Box::new(LittleEndianHandler),
            ByteOrder::BigEndian => Box::new(BigEndianHandler),
        }
    }
}

/// Trait for byte order handling strategies
pub trait ByteOrderHandler: Send + Sync {
    fn byte_order(&self) -> ByteOrder;

    fn read_u16(&self, reader: &mut dyn SeekableReader) -> Result<u16>;
    fn read_u32(&self, reader: &mut dyn SeekableReader) -> Result<u32>;
    fn read_u64(&self, reader: &mut dyn SeekableReader) -> Result<u64>;
    fn read_i16(&self, reader: &mut dyn SeekableReader) -> Result<i16>;
    fn read_i32(&self, reader: &mut dyn SeekableReader) -> Result<i32>;
    fn read_f32(&self, reader: &mut dyn SeekableReader) -> Result<f32>;
    fn read_f64(&self, reader: &mut dyn SeekableReader) -> Result<f64>;

    /// Read a rational value (two u32 values as numerator/denominator)
    fn read_rational(&self, reader: &mut dyn SeekableReader) -> Result<(u32, u32)> {
        Ok((self.read_u32(reader)?, self.read_u32(reader)?))
    }

    /// Read a signed rational value (two i32 values as numerator/denominator)
    fn read_srational(&self, reader: &mut dyn SeekableReader) -> Result<(i32, i32)> {
        Ok((self.read_i32(reader)?, self.read_i32(reader)?))
    }

    fn write_u16(&self, writer: &mut dyn Write, value: u16) -> Result<()>;
    fn write_u32(&self, writer: &mut dyn Write, value: u32) -> Result<()>;
    fn write_u64(&self, writer: &mut dyn Write, value: u64) -> Result<()>;
    fn write_i16(&self, writer: &mut dyn Write, value: i16) -> Result<()>;
    fn write_i32(&self, writer: &mut dyn Write, value: i32) -> Result<()>;
    fn write_f32(&self, writer: &mut dyn Write, value: f32) -> Result<()>;
    fn write_f64(&self, writer: &mut dyn Write, value: f64) -> Result<()>;
}

macro_rules! byte_order_handler {
    ($name:ident, $order:ty, $variant:expr) => {
        pub struct $name;

        impl ByteOrderHandler for $name {
            fn byte_order(&self) -> ByteOrder {
                $variant
            }

            fn read_u16(&self, reader: &mut dyn SeekableReader) -> Result<u16> {
                reader.read_u16::<$order>()
            }

            fn read_u32(&self, reader: &mut dyn SeekableReader) -> Result<u32> {
                reader.read_u32::<$order>()
            }

            fn read_u64(&self, reader: &mut dyn SeekableReader) -> Result<u64> {
                reader.read_u64::<$order>()
            }

            fn read_i16(&self, reader: &mut dyn SeekableReader) -> Result<i16> {
                reader.read_i16::<$order>()
            }

            fn read_i32(&self, reader: &mut dyn SeekableReader) -> Result<i32> {
                reader.read_i32::<$order>()
            }

            fn read_f32(&self, reader: &mut dyn SeekableReader) -> Result<f32> {
                reader.read_f32::<$order>()
            }

            fn read_f64(&self, reader: &mut dyn SeekableReader) -> Result<f64> {
                reader.read_f64::<$order>()
            }

            fn write_u16(&self, writer: &mut dyn Write, value: u16) -> Result<()> {
                writer.write_u16::<$order>(value)
            }

            fn write_u32(&self, writer: &mut dyn Write, value: u32) -> Result<()> {
                writer.write_u32::<$order>(value)
            }

            fn write_u64(&self, writer: &mut dyn Write, value: u64) -> Result<()> {
                writer.write_u64::<$order>(value)
            }

            fn write_i16(&self, writer: &mut dyn Write, value: i16) -> Result<()> {
                writer.write_i16::<$order>(value)
            }

            fn write_i32(&self, writer: &mut dyn Write, value: i32) -> Result<()> {
                writer.write_i32::<$order>(value)
            }

            fn write_f32(&self, writer: &mut dyn Write, value: f32) -> Result<()> {
                writer.write_f32::<$order>(value)
            }

            fn write_f64(&self, writer: &mut dyn Write, value: f64) -> Result<()> {
                writer.write_f64::<$order>(value)
            }
        }
    };
}

byte_order_handler!(LittleEndianHandler, LittleEndian, ByteOrder::LittleEndian);
byte_order_handler!(BigEndianHandler, BigEndian, ByteOrder::BigEndian);
