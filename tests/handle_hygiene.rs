//! File handle accounting, kept in its own test binary so no other test
//! opens files while descriptors are counted

#![cfg(target_os = "linux")]

use std::path::Path;

use planeio::compression::CompressionType;
use planeio::meta::{OmeMetadata, StoreExt};
use planeio::reader::{FormatReader, Stage};
use planeio::wrapper::Pipeline;
use planeio::writer::{FormatWriter, TiffWriter};

const HANDLE_CEILING: usize = 1024;

fn open_handles() -> usize {
    std::fs::read_dir("/proc/self/fd").map(|dir| dir.count()).unwrap_or(0)
}

fn write_tiff(path: &Path) {
    let mut meta = OmeMetadata::new();
    meta.set("Image[0]/Pixels/SizeX", 64u32).unwrap();
    meta.set("Image[0]/Pixels/SizeY", 48u32).unwrap();
    meta.set("Image[0]/Pixels/SizeZ", 4usize).unwrap();
    meta.set("Image[0]/Pixels/SizeC", 1usize).unwrap();
    meta.set("Image[0]/Pixels/SizeT", 1usize).unwrap();
    meta.set("Image[0]/Pixels/Type", "uint8").unwrap();
    meta.set("Image[0]/Pixels/DimensionOrder", "XYZCT").unwrap();

    let mut writer = TiffWriter::new();
    writer.set_metadata(&meta).unwrap();
    writer.set_compression(CompressionType::Lzw).unwrap();
    writer.set_tile_size(32, 32).unwrap();
    writer.set_id(path).unwrap();
    for no in 0..4 {
        let plane: Vec<u8> = (0..64 * 48).map(|i| (i + no * 3) as u8).collect();
        writer.save_bytes(no, &plane).unwrap();
    }
    writer.close().unwrap();
}

#[test]
fn test_close_releases_every_handle() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (1..=3).map(|t| dir.path().join(format!("frame_t{}.tif", t))).collect();
    for path in &paths {
        write_tiff(path);
    }

    let baseline = open_handles();
    for _ in 0..3 {
        let mut reader = Pipeline::new()
            .with_stage(Stage::Stitcher)
            .unwrap()
            .with_stage(Stage::MinMax)
            .unwrap()
            .build()
            .unwrap();
        reader.set_id(&paths[1]).unwrap();
        for no in 0..reader.image_count().unwrap() {
            reader.open_bytes(no).unwrap();
        }
        assert!(open_handles() <= HANDLE_CEILING);
        reader.close().unwrap();
        assert_eq!(open_handles(), baseline);

        reader.close().unwrap();
        assert_eq!(open_handles(), baseline);
    }
}
