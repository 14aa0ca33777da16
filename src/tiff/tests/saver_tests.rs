//! Tests for the TIFF saver

extern crate std;

use std::io::Cursor;

use super::test_utils::{strip_ifd, write_strip_file};
use crate::compression::{CodecOptions, CompressionType};
use crate::io::byte_order::ByteOrder;
use crate::pixels::Region;
use crate::tiff::constants::tags;
use crate::tiff::ifd::TagValue;
use crate::tiff::parser::TiffParser;
use crate::tiff::saver::{align_to_4_bytes, offsets_value, TiffSaver};

#[test]
fn test_alignment() {
    std::assert_eq!(align_to_4_bytes(0), 0);
    std::assert_eq!(align_to_4_bytes(5), 8);
    std::assert_eq!(align_to_4_bytes(8), 8);
}

#[test]
fn test_classic_offsets_refuse_values_past_4_gib() {
    std::assert!(offsets_value(false, vec![1 << 33]).is_err());
    std::assert_eq!(offsets_value(true, vec![1 << 33]).unwrap(), TagValue::Long8(vec![1 << 33]));
}

#[test]
fn test_two_pages_round_trip_in_every_layout() {
    let options = CodecOptions::new(6, 5).with_bits(16);
    let first: Vec<u8> = (0..60u8).collect();
    let second: Vec<u8> = (0..60u8).rev().collect();
    let codec = CompressionType::Lzw.handler();

    for (order, big_tiff) in [
        (ByteOrder::LittleEndian, false),
        (ByteOrder::BigEndian, false),
        (ByteOrder::LittleEndian, true),
        (ByteOrder::BigEndian, true),
    ] {
        let mut ifd = strip_ifd(6, 5, 16, 1, CompressionType::Lzw);
        ifd.set(tags::IMAGE_DESCRIPTION, TagValue::Ascii("two pages".to_string()));
        let images = [
            (ifd.clone(), codec.compress(&first, &options).unwrap()),
            (ifd, codec.compress(&second, &options).unwrap()),
        ];
        let mut parser = TiffParser::new(write_strip_file(order, big_tiff, &images)).unwrap();
        std::assert_eq!(parser.is_big_tiff(), big_tiff);
        let tiff = parser.read_tiff().unwrap();
        std::assert_eq!(tiff.ifd_count(), 2);
        std::assert_eq!(tiff.ifds[1].description(), Some("two pages"));

        for (ifd, expected) in tiff.ifds.iter().zip([&first, &second]) {
            let mut out = vec![0u8; 60];
            parser.get_samples(ifd, &Region::full(6, 5), &mut out, ifd.number).unwrap();
            std::assert_eq!(&out, expected);
        }
    }
}

#[test]
fn test_first_ifd_offset_is_patched_into_the_header() {
    let mut saver = TiffSaver::new(Cursor::new(Vec::new()), ByteOrder::LittleEndian, false).unwrap();
    saver.write_block(&[1, 2, 3]).unwrap();
    let offset = saver.write_ifd(&strip_ifd(1, 1, 8, 1, CompressionType::Uncompressed)).unwrap();
    std::assert_eq!(offset, 12);
    std::assert_eq!(saver.ifd_count(), 1);
    let bytes = saver.finish().unwrap().into_inner();
    std::assert_eq!(&bytes[0..8], &[0x49, 0x49, 42, 0, 12, 0, 0, 0]);
}
