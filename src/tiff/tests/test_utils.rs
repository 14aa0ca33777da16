use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::io::Cursor;

use crate::compression::CompressionType;
use crate::io::byte_order::ByteOrder;
use crate::tiff::constants::tags;
use crate::tiff::ifd::{TagValue, IFD};
use crate::tiff::saver::{offsets_value, TiffSaver};

/// Little-endian classic TIFF holding a 4x3 UINT8 image in two strips
///
/// Pixel (x, y) has value `y * 4 + x`.
pub fn create_test_tiff_buffer() -> Cursor<Vec<u8>> {
    let mut buffer = Vec::new();

    // TIFF header (little-endian)
    buffer.write_u16::<LittleEndian>(0x4949).unwrap(); // II
    buffer.write_u16::<LittleEndian>(42).unwrap();
    buffer.write_u32::<LittleEndian>(8).unwrap(); // IFD offset

    // IFD at offset 8, 8 entries, ends at 110
    buffer.write_u16::<LittleEndian>(8).unwrap();
    let long = |buf: &mut Vec<u8>, tag: u16, count: u32, value: u32| {
        buf.write_u16::<LittleEndian>(tag).unwrap();
        buf.write_u16::<LittleEndian>(4).unwrap();
        buf.write_u32::<LittleEndian>(count).unwrap();
        buf.write_u32::<LittleEndian>(value).unwrap();
    };
    long(&mut buffer, tags::IMAGE_WIDTH, 1, 4);
    long(&mut buffer, tags::IMAGE_LENGTH, 1, 3);
    for (tag, value) in [(tags::BITS_PER_SAMPLE, 8u16), (tags::COMPRESSION, 1)] {
        buffer.write_u16::<LittleEndian>(tag).unwrap();
        buffer.write_u16::<LittleEndian>(3).unwrap(); // SHORT
        buffer.write_u32::<LittleEndian>(1).unwrap();
        buffer.write_u16::<LittleEndian>(value).unwrap();
        buffer.write_u16::<LittleEndian>(0).unwrap();
    }
    long(&mut buffer, tags::STRIP_OFFSETS, 2, 110);
    long(&mut buffer, tags::SAMPLES_PER_PIXEL, 1, 1);
    long(&mut buffer, tags::ROWS_PER_STRIP, 1, 2);
    long(&mut buffer, tags::STRIP_BYTE_COUNTS, 2, 118);
    buffer.write_u32::<LittleEndian>(0).unwrap(); // no next IFD

    // StripOffsets and StripByteCounts values
    buffer.write_u32::<LittleEndian>(126).unwrap();
    buffer.write_u32::<LittleEndian>(134).unwrap();
    buffer.write_u32::<LittleEndian>(8).unwrap();
    buffer.write_u32::<LittleEndian>(4).unwrap();

    // Strip data
    buffer.extend(0u8..12);

    Cursor::new(buffer)
}

/// Big-endian BigTIFF holding a 20x10 UINT16 image in two 16x16 tiles
///
/// Pixel (x, y) has value `y * 20 + x`; tile padding is 0xFFFF.
pub fn create_test_bigtiff_buffer() -> Cursor<Vec<u8>> {
    let mut buffer = Vec::new();

    // BigTIFF header (big-endian)
    buffer.write_u16::<BigEndian>(0x4D4D).unwrap(); // MM
    buffer.write_u16::<BigEndian>(43).unwrap();
    buffer.write_u16::<BigEndian>(8).unwrap(); // Offset size
    buffer.write_u16::<BigEndian>(0).unwrap(); // Reserved
    buffer.write_u64::<BigEndian>(16).unwrap(); // IFD offset

    // IFD at offset 16, 9 entries, ends at 212
    buffer.write_u64::<BigEndian>(9).unwrap();
    let short = |buf: &mut Vec<u8>, tag: u16, value: u16| {
        buf.write_u16::<BigEndian>(tag).unwrap();
        buf.write_u16::<BigEndian>(3).unwrap();
        buf.write_u64::<BigEndian>(1).unwrap();
        buf.write_u16::<BigEndian>(value).unwrap();
        buf.extend_from_slice(&[0; 6]);
    };
    short(&mut buffer, tags::IMAGE_WIDTH, 20);
    short(&mut buffer, tags::IMAGE_LENGTH, 10);
    short(&mut buffer, tags::BITS_PER_SAMPLE, 16);
    short(&mut buffer, tags::COMPRESSION, 1);
    short(&mut buffer, tags::SAMPLES_PER_PIXEL, 1);
    short(&mut buffer, tags::TILE_WIDTH, 16);
    short(&mut buffer, tags::TILE_LENGTH, 16);
    for (tag, value) in [(tags::TILE_OFFSETS, 212u64), (tags::TILE_BYTE_COUNTS, 228)] {
        buffer.write_u16::<BigEndian>(tag).unwrap();
        buffer.write_u16::<BigEndian>(16).unwrap(); // LONG8
        buffer.write_u64::<BigEndian>(2).unwrap();
        buffer.write_u64::<BigEndian>(value).unwrap();
    }
    buffer.write_u64::<BigEndian>(0).unwrap(); // no next IFD

    buffer.write_u64::<BigEndian>(244).unwrap();
    buffer.write_u64::<BigEndian>(756).unwrap();
    buffer.write_u64::<BigEndian>(512).unwrap();
    buffer.write_u64::<BigEndian>(512).unwrap();

    for tile in 0..2u32 {
        for y in 0..16u32 {
            for x in 0..16u32 {
                let gx = tile * 16 + x;
                let value = if gx < 20 && y < 10 { (y * 20 + gx) as u16 } else { 0xFFFF };
                buffer.write_u16::<BigEndian>(value).unwrap();
            }
        }
    }

    Cursor::new(buffer)
}

/// Basic tags of a single-block strip image
pub fn strip_ifd(width: u32, height: u32, bits: u16, samples: u16, compression: CompressionType) -> IFD {
    let mut ifd = IFD::new(0, 0, true);
    ifd.set(tags::IMAGE_WIDTH, TagValue::Long(vec![width]));
    ifd.set(tags::IMAGE_LENGTH, TagValue::Long(vec![height]));
    ifd.set(tags::BITS_PER_SAMPLE, TagValue::Short(vec![bits; samples as usize]));
    ifd.set(tags::SAMPLES_PER_PIXEL, TagValue::Short(vec![samples]));
    ifd.set(tags::COMPRESSION, TagValue::Short(vec![compression.code() as u16]));
    ifd.set(tags::ROWS_PER_STRIP, TagValue::Long(vec![height]));
    ifd
}

/// Writes single-strip images with `compression` and returns the file bytes
pub fn write_strip_file(
    order: ByteOrder,
    big_tiff: bool,
    images: &[(IFD, Vec<u8>)],
) -> Cursor<Vec<u8>> {
    let mut saver = TiffSaver::new(Cursor::new(Vec::new()), order, big_tiff).unwrap();
    for (ifd, block) in images {
        let offset = saver.write_block(block).unwrap();
        let mut ifd = ifd.clone();
        ifd.set(tags::STRIP_OFFSETS, offsets_value(big_tiff, vec![offset]).unwrap());
        ifd.set(tags::STRIP_BYTE_COUNTS, offsets_value(big_tiff, vec![block.len() as u64]).unwrap());
        saver.write_ifd(&ifd).unwrap();
    }
    let mut cursor = saver.finish().unwrap();
    cursor.set_position(0);
    cursor
}
