//! Format detection over every known plugin
//!
//! [`ImageReader`] asks each plugin, in priority order, whether it claims a
//! path and forwards all calls to the first one that does. Plugins are
//! created lazily and reused while consecutive files have the same format.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use log::{debug, info};

use crate::errors::{FormatError, FormatResult};
use crate::meta::{MetadataStore, OmeMetadata};
use crate::pixels::Region;
use super::core_metadata::CoreMetadata;
use super::format_reader::{FileGrouping, FormatReader, Stage};
use super::lookup_table::LookupTable;
use super::plugins::fake_reader::FAKE_SUFFIXES;
use super::plugins::image_io_reader::IMAGE_IO_SUFFIXES;
use super::plugins::tiff_reader::TIFF_SUFFIXES;
use super::plugins::{FakeReader, ImageIoReader, TiffReader};

/// Every plugin known to the composite reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Fake,
    Tiff,
    ImageIo,
}

/// Pairs `(a, b)` where `b` may also claim files that `a` claims.
///
/// The higher priority plugin wins; anything else claimed twice is a
/// detection conflict.
pub const ALLOWED_OVERLAPS: &[(FormatKind, FormatKind)] = &[(FormatKind::Tiff, FormatKind::ImageIo)];

const ALL_SUFFIXES: &[&str] = &["fake", "tif", "tiff", "tf2", "tf8", "btf", "png", "jpg", "jpeg", "bmp", "gif"];

impl FormatKind {
    /// Detection priority, highest first
    pub const ALL: [FormatKind; 3] = [FormatKind::Fake, FormatKind::Tiff, FormatKind::ImageIo];

    pub fn create(&self) -> Box<dyn FormatReader> {
        match self {
            FormatKind::Fake => Box::new(FakeReader::new()),
            FormatKind::Tiff => Box::new(TiffReader::new()),
            FormatKind::ImageIo => Box::new(ImageIoReader::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormatKind::Fake => "fake",
            FormatKind::Tiff => "tiff",
            FormatKind::ImageIo => "imageio",
        }
    }

    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            FormatKind::Fake => FAKE_SUFFIXES,
            FormatKind::Tiff => TIFF_SUFFIXES,
            FormatKind::ImageIo => IMAGE_IO_SUFFIXES,
        }
    }

    pub fn from_name(name: &str) -> Option<FormatKind> {
        FormatKind::ALL.iter().copied().find(|k| k.name().eq_ignore_ascii_case(name))
    }

    /// Whether `other`, a lower-priority kind, may also claim a file
    /// that `self` claims
    pub fn may_overlap(&self, other: FormatKind) -> bool {
        ALLOWED_OVERLAPS.contains(&(*self, other))
    }
}

pub struct ImageReader {
    kinds: Vec<FormatKind>,
    /// One idle instance per kind, used only for detection
    detectors: Vec<Box<dyn FormatReader>>,
    current: Option<(FormatKind, Box<dyn FormatReader>)>,
    /// Holds the store while no plugin is active
    pending: Box<dyn MetadataStore>,
    group_files: bool,
    flattened: bool,
}

impl Default for ImageReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader {
    pub fn new() -> Self {
        Self::with_kinds(&FormatKind::ALL)
    }

    /// Restricts detection to `kinds`, keeping the given order
    pub fn with_kinds(kinds: &[FormatKind]) -> Self {
        ImageReader {
            kinds: kinds.to_vec(),
            detectors: kinds.iter().map(FormatKind::create).collect(),
            current: None,
            pending: Box::new(OmeMetadata::new()),
            group_files: true,
            flattened: true,
        }
    }

    /// First plugin claiming `path`, in priority order
    pub fn detect(&self, path: &Path, open: bool) -> FormatResult<FormatKind> {
        self.kinds
            .iter()
            .zip(&self.detectors)
            .find(|(_, detector)| detector.is_this_type(path, open))
            .map(|(kind, _)| *kind)
            .ok_or_else(|| FormatError::Unsupported(format!("Unknown file format: {:?}", path)))
    }

    /// Every plugin claiming `path`, in priority order
    pub fn claimants(&self, path: &Path, open: bool) -> Vec<FormatKind> {
        self.kinds
            .iter()
            .zip(&self.detectors)
            .filter(|(_, detector)| detector.is_this_type(path, open))
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Kind of the active plugin
    pub fn current_kind(&self) -> Option<FormatKind> {
        self.current.as_ref().map(|(kind, _)| *kind)
    }

    fn reader(&self) -> FormatResult<&dyn FormatReader> {
        match &self.current {
            Some((_, reader)) => Ok(reader.as_ref()),
            None => Err(FormatError::NotInitialized),
        }
    }

    fn reader_mut(&mut self) -> FormatResult<&mut dyn FormatReader> {
        match &mut self.current {
            Some((_, reader)) => Ok(reader.as_mut()),
            None => Err(FormatError::NotInitialized),
        }
    }

    fn is_open(&self) -> bool {
        self.current
            .as_ref()
            .map_or(false, |(_, reader)| reader.current_file().is_some())
    }
}

impl FormatReader for ImageReader {
    fn stage(&self) -> Stage {
        Stage::Composite
    }

    fn inner(&self) -> Option<&dyn FormatReader> {
        self.current.as_ref().map(|(_, reader)| reader.as_ref())
    }

    fn inner_mut(&mut self) -> Option<&mut dyn FormatReader> {
        match &mut self.current {
            Some((_, reader)) => Some(reader.as_mut()),
            None => None,
        }
    }

    fn format_name(&self) -> &'static str {
        self.current
            .as_ref()
            .map_or("ImageReader", |(_, reader)| reader.format_name())
    }

    fn suffixes(&self) -> &'static [&'static str] {
        ALL_SUFFIXES
    }

    fn is_this_type(&self, path: &Path, open: bool) -> bool {
        self.detectors.iter().any(|detector| detector.is_this_type(path, open))
    }

    fn file_grouping(&self, path: &Path) -> FileGrouping {
        self.kinds
            .iter()
            .zip(&self.detectors)
            .find(|(_, detector)| detector.is_this_type(path, true))
            .map_or(FileGrouping::CannotGroup, |(_, detector)| detector.file_grouping(path))
    }

    fn set_group_files(&mut self, group: bool) {
        self.group_files = group;
        if let Some((_, reader)) = &mut self.current {
            reader.set_group_files(group);
        }
    }

    fn is_group_files(&self) -> bool {
        self.group_files
    }

    fn set_flattened_resolutions(&mut self, flattened: bool) -> FormatResult<()> {
        if self.is_open() {
            return Err(FormatError::GenericError(
                "Cannot change resolution flattening while a file is open".to_string(),
            ));
        }
        self.flattened = flattened;
        if let Some((_, reader)) = &mut self.current {
            reader.set_flattened_resolutions(flattened)?;
        }
        Ok(())
    }

    fn has_flattened_resolutions(&self) -> bool {
        self.flattened
    }

    fn set_metadata_store(&mut self, store: Box<dyn MetadataStore>) -> FormatResult<()> {
        match &mut self.current {
            Some((_, reader)) => reader.set_metadata_store(store),
            None => {
                self.pending = store;
                Ok(())
            }
        }
    }

    fn metadata_store(&self) -> &dyn MetadataStore {
        match &self.current {
            Some((_, reader)) => reader.metadata_store(),
            None => self.pending.as_ref(),
        }
    }

    fn take_metadata_store(&mut self) -> Box<dyn MetadataStore> {
        match &mut self.current {
            Some((_, reader)) => reader.take_metadata_store(),
            None => std::mem::replace(&mut self.pending, Box::new(OmeMetadata::new())),
        }
    }

    fn set_id(&mut self, path: &Path) -> FormatResult<()> {
        let kind = self.detect(path, true)?;
        if self.current_kind() != Some(kind) {
            let store = self.take_metadata_store();
            if let Some((old, mut reader)) = self.current.take() {
                debug!("Releasing {} reader", old.name());
                reader.close()?;
            }
            let mut reader = kind.create();
            reader.set_group_files(self.group_files);
            reader.set_flattened_resolutions(self.flattened)?;
            reader.set_metadata_store(store)?;
            self.current = Some((kind, reader));
        }
        info!("Opening {:?} with the {} reader", path, kind.name());
        self.reader_mut()?.set_id(path)
    }

    fn current_file(&self) -> Option<&Path> {
        self.current.as_ref().and_then(|(_, reader)| reader.current_file())
    }

    fn close(&mut self) -> FormatResult<()> {
        match &mut self.current {
            Some((_, reader)) => reader.close(),
            None => Ok(()),
        }
    }

    fn used_files(&self, no_pixels: bool) -> FormatResult<Vec<PathBuf>> {
        self.reader()?.used_files(no_pixels)
    }

    fn series_count(&self) -> FormatResult<usize> {
        self.reader()?.series_count()
    }

    fn set_series(&mut self, series: usize) -> FormatResult<()> {
        self.reader_mut()?.set_series(series)
    }

    fn series(&self) -> usize {
        self.current.as_ref().map_or(0, |(_, reader)| reader.series())
    }

    fn resolution_count(&self) -> FormatResult<usize> {
        self.reader()?.resolution_count()
    }

    fn set_resolution(&mut self, resolution: usize) -> FormatResult<()> {
        self.reader_mut()?.set_resolution(resolution)
    }

    fn resolution(&self) -> usize {
        self.current.as_ref().map_or(0, |(_, reader)| reader.resolution())
    }

    fn core(&self) -> FormatResult<Cow<'_, CoreMetadata>> {
        self.reader()?.core()
    }

    fn lookup_table(&self) -> FormatResult<Option<LookupTable>> {
        self.reader()?.lookup_table()
    }

    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
        self.reader_mut()?.open_bytes_into(no, region, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::RetrieveExt;

    #[test]
    fn test_detects_fake_ids() {
        let reader = ImageReader::new();
        let path = Path::new("plate&sizeZ=3.fake");
        assert_eq!(reader.detect(path, false).unwrap(), FormatKind::Fake);
        assert!(reader.detect(Path::new("notes.txt"), false).is_err());
    }

    #[test]
    fn test_forwards_to_plugin() {
        let mut reader = ImageReader::new();
        assert!(reader.size_x().is_err());
        reader.set_id(Path::new("test&sizeX=64&sizeY=32&sizeT=4.fake")).unwrap();
        assert_eq!(reader.current_kind(), Some(FormatKind::Fake));
        assert_eq!(reader.size_x().unwrap(), 64);
        assert_eq!(reader.image_count().unwrap(), 4);
        assert_eq!(reader.stages(), vec![Stage::Composite, Stage::Format("Simulated data")]);
        reader.close().unwrap();
        assert!(reader.size_x().is_err());
    }

    #[test]
    fn test_store_survives_plugin_switch() {
        let mut reader = ImageReader::new();
        reader.set_id(Path::new("first&sizeX=8&sizeY=8.fake")).unwrap();
        let store = reader.take_metadata_store();
        reader.set_metadata_store(store).unwrap_err();
        reader.close().unwrap();

        let mut fresh = ImageReader::new();
        fresh.set_metadata_store(Box::new(OmeMetadata::new())).unwrap();
        fresh.set_id(Path::new("second&sizeX=8&sizeY=8.fake")).unwrap();
        let retrieve = fresh.metadata_store().as_retrieve().unwrap();
        assert_eq!(retrieve.get_text("Image[0]/Name").as_deref(), Some("second"));
    }

    #[test]
    fn test_overlaps_keep_claimant_order() {
        assert!(FormatKind::Tiff.may_overlap(FormatKind::ImageIo));
        assert!(!FormatKind::ImageIo.may_overlap(FormatKind::Tiff));
        assert!(!FormatKind::Fake.may_overlap(FormatKind::Tiff));
    }
}
