//! Tests for the TIFF parser

extern crate std;

use byteorder::{ByteOrder as _, LittleEndian};

use super::test_utils::{create_test_bigtiff_buffer, create_test_tiff_buffer, strip_ifd, write_strip_file};
use crate::compression::CompressionType;
use crate::errors::FormatError;
use crate::io::byte_order::ByteOrder;
use crate::pixels::Region;
use crate::tiff::constants::{predictor, tags};
use crate::tiff::ifd::TagValue;
use crate::tiff::parser::{is_tiff_header, TiffParser};

#[test]
fn test_header_sniffing() {
    std::assert!(is_tiff_header(b"II*\0\x08\0\0\0"));
    std::assert!(is_tiff_header(b"MM\0+"));
    std::assert!(!is_tiff_header(b"II\0*"));
    std::assert!(!is_tiff_header(b"MM"));
}

#[test]
fn test_classic_strips_full_and_region() {
    let mut parser = TiffParser::new(create_test_tiff_buffer()).unwrap();
    std::assert!(!parser.is_big_tiff());
    let tiff = parser.read_tiff().unwrap();
    std::assert_eq!(tiff.ifd_count(), 1);
    let ifd = tiff.main_ifd().unwrap();
    std::assert_eq!(ifd.get_dimensions(), Some((4, 3)));
    std::assert!(!ifd.is_tiled());

    let mut full = vec![0u8; 12];
    parser.get_samples(ifd, &Region::full(4, 3), &mut full, 0).unwrap();
    std::assert_eq!(full, (0u8..12).collect::<Vec<_>>());

    let mut region = vec![0u8; 4];
    parser.get_samples(ifd, &Region::new(1, 1, 2, 2), &mut region, 0).unwrap();
    std::assert_eq!(region, vec![5, 6, 9, 10]);
}

#[test]
fn test_bigtiff_tiles_crossing_a_tile_edge() {
    let mut parser = TiffParser::new(create_test_bigtiff_buffer()).unwrap();
    std::assert!(parser.is_big_tiff());
    std::assert_eq!(parser.byte_order(), ByteOrder::BigEndian);
    let tiff = parser.read_tiff().unwrap();
    let ifd = tiff.main_ifd().unwrap();
    std::assert!(ifd.is_tiled());
    std::assert_eq!(ifd.block_grid().unwrap(), (2, 1));

    let region = Region::new(14, 7, 6, 3);
    let mut out = vec![0u8; region.area() * 2];
    parser.get_samples(ifd, &region, &mut out, 0).unwrap();

    let mut expected = Vec::new();
    for y in 7..10u16 {
        for x in 14..20u16 {
            expected.extend_from_slice(&(y * 20 + x).to_be_bytes());
        }
    }
    std::assert_eq!(out, expected);
}

#[test]
fn test_out_of_bounds_region_fails_before_reading() {
    let mut parser = TiffParser::new(create_test_tiff_buffer()).unwrap();
    let tiff = parser.read_tiff().unwrap();
    let mut out = vec![0u8; 64];
    let err = parser
        .get_samples(tiff.main_ifd().unwrap(), &Region::new(2, 0, 3, 1), &mut out, 0)
        .unwrap_err();
    std::assert!(matches!(err, FormatError::OutOfBounds { .. }));
}

#[test]
fn test_broken_next_link_keeps_earlier_ifds() {
    let mut cursor = create_test_tiff_buffer();
    // next IFD offset sits right after the 8 entries
    LittleEndian::write_u32(&mut cursor.get_mut()[106..110], 99_999);
    let mut parser = TiffParser::new(cursor).unwrap();
    std::assert_eq!(parser.read_tiff().unwrap().ifd_count(), 1);
}

#[test]
fn test_truncated_header_is_an_error() {
    let cursor = std::io::Cursor::new(b"II*\0".to_vec());
    std::assert!(TiffParser::new(cursor).is_err());
    let cursor = std::io::Cursor::new(b"II\x2c\0\x08\0\0\0".to_vec());
    std::assert!(matches!(TiffParser::new(cursor), Err(FormatError::UnsupportedVersion(44))));
}

#[test]
fn test_horizontal_predictor_is_undone() {
    let mut ifd = strip_ifd(4, 2, 8, 1, CompressionType::Uncompressed);
    ifd.set(tags::PREDICTOR, TagValue::Short(vec![predictor::HORIZONTAL_DIFFERENCING]));
    // rows 10,11,12,13 and 20,22,24,26 as differences
    let stored = vec![10, 1, 1, 1, 20, 2, 2, 2];
    let mut parser = TiffParser::new(write_strip_file(ByteOrder::LittleEndian, false, &[(ifd, stored)])).unwrap();
    let tiff = parser.read_tiff().unwrap();
    let mut out = vec![0u8; 8];
    parser.get_samples(tiff.main_ifd().unwrap(), &Region::full(4, 2), &mut out, 0).unwrap();
    std::assert_eq!(out, vec![10, 11, 12, 13, 20, 22, 24, 26]);
}

#[test]
fn test_planar_samples_are_returned_plane_by_plane() {
    let mut ifd = strip_ifd(2, 2, 8, 3, CompressionType::Uncompressed);
    ifd.set(tags::PLANAR_CONFIGURATION, TagValue::Short(vec![2]));
    ifd.set(tags::ROWS_PER_STRIP, TagValue::Long(vec![2]));
    let images = [(ifd, (0u8..12).collect::<Vec<_>>())];
    // write three strips by hand: one per sample plane
    let mut cursor = write_strip_file(ByteOrder::LittleEndian, false, &images);
    let mut parser = TiffParser::new(&mut cursor).unwrap();
    let mut tiff = parser.read_tiff().unwrap();
    let offset = tiff.ifds[0].block_offsets().unwrap()[0];
    let ifd = &mut tiff.ifds[0];
    ifd.set(tags::STRIP_OFFSETS, TagValue::Long(vec![offset as u32, offset as u32 + 4, offset as u32 + 8]));
    ifd.set(tags::STRIP_BYTE_COUNTS, TagValue::Long(vec![4, 4, 4]));

    let mut out = vec![0u8; 3];
    parser.get_samples(&tiff.ifds[0], &Region::new(1, 1, 1, 1), &mut out, 0).unwrap();
    std::assert_eq!(out, vec![3, 7, 11]);
}

#[test]
fn test_decompressed_size_mismatch_carries_coordinates() {
    let ifd = strip_ifd(8, 8, 8, 1, CompressionType::Deflate);
    let handler = CompressionType::Deflate.handler();
    let options = crate::compression::CodecOptions::new(8, 4);
    let short_block = handler.compress(&[7u8; 32], &options).unwrap();
    let mut parser = TiffParser::new(write_strip_file(ByteOrder::BigEndian, true, &[(ifd, short_block)])).unwrap();
    let tiff = parser.read_tiff().unwrap();
    let mut out = vec![0u8; 64];
    let err = parser.get_samples(tiff.main_ifd().unwrap(), &Region::full(8, 8), &mut out, 5).unwrap_err();
    match err {
        FormatError::SizeMismatch { expected, actual, plane, tile } => {
            std::assert_eq!((expected, actual), (64, 32));
            std::assert_eq!(plane, Some(5));
            std::assert_eq!(tile, Some((0, 0)));
        }
        other => std::panic!("unexpected error {}", other),
    }
}

#[test]
fn test_corrupt_block_is_a_codec_error_at_its_tile() {
    let ifd = strip_ifd(8, 8, 8, 1, CompressionType::Zstd);
    let mut parser = TiffParser::new(write_strip_file(ByteOrder::LittleEndian, false, &[(ifd, vec![1, 2, 3, 4, 5])])).unwrap();
    let tiff = parser.read_tiff().unwrap();
    let mut out = vec![0u8; 64];
    let err = parser.get_samples(tiff.main_ifd().unwrap(), &Region::full(8, 8), &mut out, 2).unwrap_err();
    std::assert!(matches!(err, FormatError::Codec { plane: Some(2), tile: Some((0, 0)), .. }));
}
