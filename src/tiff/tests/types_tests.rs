//! Tests for the TIFF types module

extern crate std;

use crate::io::byte_order::ByteOrder;
use crate::tiff::constants::tags;
use crate::tiff::ifd::{TagValue, IFD};
use crate::tiff::types::TIFF;

#[test]
fn test_tiff_creation() {
    let tiff = TIFF::new(false, ByteOrder::LittleEndian);
    std::assert!(!tiff.is_big_tiff);
    std::assert_eq!(tiff.ifd_count(), 0);
    std::assert!(tiff.main_ifd().is_none());
}

#[test]
fn test_tiff_with_ifds() {
    let mut tiff = TIFF::new(true, ByteOrder::BigEndian);

    let mut main_ifd = IFD::new(0, 16, false);
    main_ifd.set(tags::IMAGE_WIDTH, TagValue::Long(vec![1024]));
    main_ifd.set(tags::IMAGE_LENGTH, TagValue::Long(vec![768]));
    tiff.ifds.push(main_ifd);

    // reduced resolution
    let mut overview_ifd = IFD::new(1, 100, false);
    overview_ifd.set(tags::NEW_SUBFILE_TYPE, TagValue::Long(vec![1]));
    overview_ifd.set(tags::IMAGE_WIDTH, TagValue::Long(vec![512]));
    overview_ifd.set(tags::IMAGE_LENGTH, TagValue::Short(vec![384]));
    tiff.ifds.push(overview_ifd);

    std::assert_eq!(tiff.ifd_count(), 2);
    std::assert_eq!(tiff.pages().len(), 1);

    let overviews = tiff.overviews();
    std::assert_eq!(overviews.len(), 1);
    std::assert_eq!(overviews[0].get_dimensions(), Some((512, 384)));
    std::assert!(tiff.children_of(0).is_empty());
}
