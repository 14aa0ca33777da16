//! State shared by every format plugin
//!
//! Holds the open file, the parsed dimensions of every series and
//! resolution level, the current series/resolution selector and the
//! metadata store. Dimensions are written once by `install` and are
//! read-only afterwards.

use std::path::{Path, PathBuf};
use log::debug;

use crate::errors::{FormatError, FormatResult};
use crate::meta::{populate_pixels, MetadataStore, OmeMetadata};
use super::core_metadata::{validate_resolutions, CoreMetadata};

pub struct ReaderState {
    current_id: Option<PathBuf>,
    /// Indexed by series, then resolution level
    core: Vec<Vec<CoreMetadata>>,
    series: usize,
    resolution: usize,
    flattened: bool,
    group_files: bool,
    store: Box<dyn MetadataStore>,
}

impl Default for ReaderState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderState {
    pub fn new() -> Self {
        ReaderState {
            current_id: None,
            core: Vec::new(),
            series: 0,
            resolution: 0,
            flattened: true,
            group_files: true,
            store: Box::new(OmeMetadata::new()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.current_id.is_some()
    }

    pub fn require_init(&self) -> FormatResult<()> {
        if self.current_id.is_none() {
            return Err(FormatError::NotInitialized);
        }
        Ok(())
    }

    pub fn current_id(&self) -> Option<&Path> {
        self.current_id.as_deref()
    }

    pub fn set_flattened(&mut self, flattened: bool) -> FormatResult<()> {
        if self.is_initialized() {
            return Err(FormatError::Unsupported(
                "resolution flattening cannot change while a file is open".to_string(),
            ));
        }
        self.flattened = flattened;
        Ok(())
    }

    pub fn is_flattened(&self) -> bool {
        self.flattened
    }

    pub fn set_group_files(&mut self, group: bool) {
        self.group_files = group;
    }

    pub fn is_group_files(&self) -> bool {
        self.group_files
    }

    pub fn set_store(&mut self, store: Box<dyn MetadataStore>) -> FormatResult<()> {
        if self.is_initialized() {
            return Err(FormatError::Unsupported(
                "metadata store cannot change while a file is open".to_string(),
            ));
        }
        self.store = store;
        Ok(())
    }

    pub fn store(&self) -> &dyn MetadataStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn MetadataStore {
        self.store.as_mut()
    }

    pub fn take_store(&mut self) -> Box<dyn MetadataStore> {
        std::mem::replace(&mut self.store, Box::new(OmeMetadata::new()))
    }

    /// Starts parsing `path`: clears old dimensions and metadata
    pub fn begin(&mut self, path: &Path) {
        self.current_id = Some(path.to_path_buf());
        self.core.clear();
        self.series = 0;
        self.resolution = 0;
        self.store.reset();
    }

    /// Installs the parsed dimensions after validating them
    ///
    /// On error the state is reset so the reader stays closed.
    pub fn install(&mut self, mut core: Vec<Vec<CoreMetadata>>) -> FormatResult<()> {
        if let Err(e) = Self::check(&mut core) {
            self.reset();
            return Err(e);
        }
        self.core = core;
        Ok(())
    }

    /// Ends parsing: the metadata store becomes read-only
    pub fn finish(&mut self) {
        self.store.freeze();
        debug!(
            "Opened {:?}: {} series, {} levels",
            self.current_id,
            self.core.len(),
            self.core.iter().map(Vec::len).sum::<usize>()
        );
    }

    fn check(core: &mut [Vec<CoreMetadata>]) -> FormatResult<()> {
        if core.is_empty() {
            return Err(FormatError::InconsistentDimensions("dataset holds no series".to_string()));
        }
        for levels in core.iter_mut() {
            for level in levels.iter_mut() {
                level.validate()?;
                if level.thumb_size_x == 0 || level.thumb_size_y == 0 {
                    level.compute_thumb_size();
                }
            }
            validate_resolutions(levels)?;
        }
        Ok(())
    }

    /// Records the Pixels block of every exposed image
    ///
    /// Flattened datasets expose one image per level; otherwise only full
    /// resolution levels are images. `name` receives the image index.
    pub fn populate_store(&mut self, name: impl Fn(usize) -> Option<String>, planes: bool) -> FormatResult<()> {
        let mut image = 0;
        for levels in &self.core {
            let exposed = if self.flattened { levels.len() } else { 1 };
            for level in &levels[..exposed] {
                populate_pixels(self.store.as_mut(), level, image, name(image).as_deref(), planes)?;
                image += 1;
            }
        }
        Ok(())
    }

    /// Forgets the open file; the frozen store stays readable
    pub fn reset(&mut self) {
        self.current_id = None;
        self.core.clear();
        self.series = 0;
        self.resolution = 0;
    }

    pub fn series_count(&self) -> FormatResult<usize> {
        self.require_init()?;
        if self.flattened {
            Ok(self.core.iter().map(Vec::len).sum())
        } else {
            Ok(self.core.len())
        }
    }

    pub fn resolution_count(&self) -> FormatResult<usize> {
        self.require_init()?;
        if self.flattened {
            Ok(1)
        } else {
            Ok(self.core.get(self.series).map(Vec::len).unwrap_or(0))
        }
    }

    pub fn series(&self) -> usize {
        self.series
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn set_series(&mut self, series: usize) -> FormatResult<()> {
        let count = self.series_count()?;
        if series >= count {
            return Err(FormatError::GenericError(format!(
                "Invalid series: {} (series count {})",
                series, count
            )));
        }
        self.series = series;
        self.resolution = 0;
        Ok(())
    }

    pub fn set_resolution(&mut self, resolution: usize) -> FormatResult<()> {
        let count = self.resolution_count()?;
        if resolution >= count {
            return Err(FormatError::GenericError(format!(
                "Invalid resolution: {} (resolution count {})",
                resolution, count
            )));
        }
        self.resolution = resolution;
        Ok(())
    }

    /// (series, level) indices into the parsed dimensions
    pub fn core_index(&self) -> (usize, usize) {
        if !self.flattened {
            return (self.series, self.resolution);
        }
        let mut remaining = self.series;
        for (i, levels) in self.core.iter().enumerate() {
            if remaining < levels.len() {
                return (i, remaining);
            }
            remaining -= levels.len();
        }
        (0, 0)
    }

    pub fn core(&self) -> FormatResult<&CoreMetadata> {
        self.require_init()?;
        let (i, j) = self.core_index();
        self.core
            .get(i)
            .and_then(|levels| levels.get(j))
            .ok_or(FormatError::NotInitialized)
    }

    /// Every series with its resolution levels
    pub fn levels(&self) -> &[Vec<CoreMetadata>] {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::RetrieveExt;

    fn level(size: u32) -> CoreMetadata {
        CoreMetadata {
            size_x: size,
            size_y: size / 2,
            ..CoreMetadata::default()
        }
    }

    fn pyramid_state(flattened: bool) -> ReaderState {
        let mut state = ReaderState::new();
        state.set_flattened(flattened).unwrap();
        state.begin(Path::new("a.tif"));
        state
            .install(vec![vec![level(64), level(32), level(16)], vec![level(8)]])
            .unwrap();
        state.finish();
        state
    }

    #[test]
    fn test_flattened_levels_are_series() {
        let mut state = pyramid_state(true);
        assert_eq!(state.series_count().unwrap(), 4);
        assert_eq!(state.resolution_count().unwrap(), 1);
        state.set_series(2).unwrap();
        assert_eq!(state.core_index(), (0, 2));
        assert_eq!(state.core().unwrap().size_x, 16);
        state.set_series(3).unwrap();
        assert_eq!(state.core_index(), (1, 0));
        assert!(state.set_resolution(1).is_err());
    }

    #[test]
    fn test_nested_levels() {
        let mut state = pyramid_state(false);
        assert_eq!(state.series_count().unwrap(), 2);
        assert_eq!(state.resolution_count().unwrap(), 3);
        state.set_resolution(2).unwrap();
        assert_eq!(state.core().unwrap().size_x, 16);
        state.set_series(1).unwrap();
        assert_eq!(state.resolution(), 0);
        assert_eq!(state.resolution_count().unwrap(), 1);
    }

    #[test]
    fn test_lifecycle_guards() {
        let mut state = ReaderState::new();
        assert!(matches!(state.core(), Err(FormatError::NotInitialized)));
        state.begin(Path::new("a.tif"));
        assert!(state.set_flattened(false).is_err());
        assert!(state.install(vec![vec![level(8), level(16)]]).is_err());
        assert!(!state.is_initialized());
    }

    #[test]
    fn test_store_is_frozen_after_finish() {
        let mut state = pyramid_state(true);
        state.begin(Path::new("b.tif"));
        state.install(vec![vec![level(8)]]).unwrap();
        state.populate_store(|i| Some(format!("image {}", i)), false).unwrap();
        state.finish();
        assert!(state.store().is_frozen());
        let retrieve = state.store().as_retrieve().unwrap();
        assert_eq!(retrieve.get_text("Image[0]/Name").as_deref(), Some("image 0"));
    }
}
