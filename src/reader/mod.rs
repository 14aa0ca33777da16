//! Format readers
//!
//! [`FormatReader`] is the contract; plugins under [`plugins`] implement it
//! for concrete formats and [`ImageReader`] picks the right plugin for a
//! path.

pub mod core_metadata;
pub mod format_reader;
pub mod image_reader;
pub mod lookup_table;
pub mod plugins;
pub mod state;

pub use core_metadata::{CoreMetadata, THUMBNAIL_DIMENSION};
pub use format_reader::{base_reader, FileGrouping, FormatReader, Stage};
pub use image_reader::{FormatKind, ImageReader, ALLOWED_OVERLAPS};
pub use lookup_table::LookupTable;
pub use state::ReaderState;

/// Implements the bookkeeping half of [`FormatReader`] through a
/// `state: ReaderState` field
macro_rules! forward_to_state {
    () => {
        fn set_group_files(&mut self, group: bool) {
            self.state.set_group_files(group)
        }

        fn is_group_files(&self) -> bool {
            self.state.is_group_files()
        }

        fn set_flattened_resolutions(&mut self, flattened: bool) -> $crate::errors::FormatResult<()> {
            self.state.set_flattened(flattened)
        }

        fn has_flattened_resolutions(&self) -> bool {
            self.state.is_flattened()
        }

        fn set_metadata_store(
            &mut self,
            store: Box<dyn $crate::meta::MetadataStore>,
        ) -> $crate::errors::FormatResult<()> {
            self.state.set_store(store)
        }

        fn metadata_store(&self) -> &dyn $crate::meta::MetadataStore {
            self.state.store()
        }

        fn take_metadata_store(&mut self) -> Box<dyn $crate::meta::MetadataStore> {
            self.state.take_store()
        }

        fn current_file(&self) -> Option<&::std::path::Path> {
            self.state.current_id()
        }

        fn series_count(&self) -> $crate::errors::FormatResult<usize> {
            self.state.series_count()
        }

        fn set_series(&mut self, series: usize) -> $crate::errors::FormatResult<()> {
            self.state.set_series(series)
        }

        fn series(&self) -> usize {
            self.state.series()
        }

        fn resolution_count(&self) -> $crate::errors::FormatResult<usize> {
            self.state.resolution_count()
        }

        fn set_resolution(&mut self, resolution: usize) -> $crate::errors::FormatResult<()> {
            self.state.set_resolution(resolution)
        }

        fn resolution(&self) -> usize {
            self.state.resolution()
        }

        fn core(&self) -> $crate::errors::FormatResult<::std::borrow::Cow<'_, $crate::reader::CoreMetadata>> {
            self.state.core().map(::std::borrow::Cow::Borrowed)
        }
    };
}

/// Forwards the parts of [`FormatReader`] a wrapper leaves untouched to
/// an `inner: Box<dyn FormatReader>` field
macro_rules! forward_to_inner {
    () => {
        fn inner(&self) -> Option<&dyn $crate::reader::FormatReader> {
            Some(self.inner.as_ref())
        }

        fn inner_mut(&mut self) -> Option<&mut dyn $crate::reader::FormatReader> {
            Some(self.inner.as_mut())
        }

        fn format_name(&self) -> &'static str {
            self.inner.format_name()
        }

        fn suffixes(&self) -> &'static [&'static str] {
            self.inner.suffixes()
        }

        fn is_this_type(&self, path: &::std::path::Path, open: bool) -> bool {
            self.inner.is_this_type(path, open)
        }

        fn file_grouping(&self, path: &::std::path::Path) -> $crate::reader::FileGrouping {
            self.inner.file_grouping(path)
        }

        fn set_group_files(&mut self, group: bool) {
            self.inner.set_group_files(group)
        }

        fn is_group_files(&self) -> bool {
            self.inner.is_group_files()
        }

        fn set_flattened_resolutions(&mut self, flattened: bool) -> $crate::errors::FormatResult<()> {
            self.inner.set_flattened_resolutions(flattened)
        }

        fn has_flattened_resolutions(&self) -> bool {
            self.inner.has_flattened_resolutions()
        }

        fn set_metadata_store(
            &mut self,
            store: Box<dyn $crate::meta::MetadataStore>,
        ) -> $crate::errors::FormatResult<()> {
            self.inner.set_metadata_store(store)
        }

        fn metadata_store(&self) -> &dyn $crate::meta::MetadataStore {
            self.inner.metadata_store()
        }

        fn take_metadata_store(&mut self) -> Box<dyn $crate::meta::MetadataStore> {
            self.inner.take_metadata_store()
        }

        fn current_file(&self) -> Option<&::std::path::Path> {
            self.inner.current_file()
        }

        fn used_files(&self, no_pixels: bool) -> $crate::errors::FormatResult<Vec<::std::path::PathBuf>> {
            self.inner.used_files(no_pixels)
        }

        fn series_count(&self) -> $crate::errors::FormatResult<usize> {
            self.inner.series_count()
        }

        fn series(&self) -> usize {
            self.inner.series()
        }

        fn resolution_count(&self) -> $crate::errors::FormatResult<usize> {
            self.inner.resolution_count()
        }

        fn resolution(&self) -> usize {
            self.inner.resolution()
        }
    };
}

pub(crate) use forward_to_inner;
pub(crate) use forward_to_state;
