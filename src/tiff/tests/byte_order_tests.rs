//! Byte order detection and the read/write handlers

use std::io::Cursor;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use crate::io::byte_order::{BigEndianHandler, ByteOrder, ByteOrderHandler, LittleEndianHandler};

#[test]
fn test_detect_reads_the_header_marker() {
    let cases: [(&[u8], Option<ByteOrder>); 4] = [
        (b"II", Some(ByteOrder::LittleEndian)),
        (b"MM", Some(ByteOrder::BigEndian)),
        (b"IM", None),
        (b"I", None),
    ];
    for (bytes, expected) in cases {
        let mut cursor = Cursor::new(bytes.to_vec());
        assert_eq!(ByteOrder::detect(&mut cursor).ok(), expected, "{:?}", bytes);
    }
}

#[test]
fn test_marker_matches_output_flag() {
    for little in [true, false] {
        let order = ByteOrder::from_little_endian(little);
        assert_eq!(order.is_little_endian(), little);
        let marker = order.marker();
        assert_eq!(ByteOrder::from_marker(u16::from_le_bytes(marker)).unwrap(), order);
    }
}

#[test]
fn test_little_endian_handler_mixed_widths() {
    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(0xBEEF).unwrap();
    buffer.write_u64::<LittleEndian>(0x0102_0304_0506_0708).unwrap();
    buffer.write_f32::<LittleEndian>(-0.5).unwrap();
    let mut cursor = Cursor::new(buffer);

    let handler = LittleEndianHandler;
    assert_eq!(handler.read_u16(&mut cursor).unwrap(), 0xBEEF);
    assert_eq!(handler.read_u64(&mut cursor).unwrap(), 0x0102_0304_0506_0708);
    assert_eq!(handler.read_f32(&mut cursor).unwrap(), -0.5);
    assert!(handler.read_u16(&mut cursor).is_err());
}

#[test]
fn test_big_endian_handler_rational() {
    let mut buffer = Vec::new();
    buffer.write_u32::<BigEndian>(72).unwrap();
    buffer.write_u32::<BigEndian>(1).unwrap();
    buffer.write_i32::<BigEndian>(-40_000).unwrap();
    let mut cursor = Cursor::new(buffer);

    let handler = BigEndianHandler;
    assert_eq!(handler.read_rational(&mut cursor).unwrap(), (72, 1));
    assert_eq!(handler.read_i32(&mut cursor).unwrap(), -40_000);
}

#[test]
fn test_handlers_write_what_they_read() {
    for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
        let handler = order.create_handler();
        let mut buffer = Vec::new();
        handler.write_u32(&mut buffer, 0xDEAD_BEEF).unwrap();
        handler.write_i16(&mut buffer, -2).unwrap();
        handler.write_f64(&mut buffer, 1.25).unwrap();
        let mut cursor = Cursor::new(buffer);
        assert_eq!(handler.read_u32(&mut cursor).unwrap(), 0xDEAD_BEEF);
        assert_eq!(handler.read_i16(&mut cursor).unwrap(), -2);
        assert_eq!(handler.read_f64(&mut cursor).unwrap(), 1.25);
    }
}
