//! Presents a numbered file sequence as one dataset
//!
//! The stitcher looks for siblings of the opened file that differ only in
//! their numbers, assigns each numeric block to Z, C or T and exposes the
//! planes of every member file in a single index space. Files that do not
//! group fall back to plain single-file access.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};

use crate::errors::{FormatError, FormatResult};
use crate::meta::{copy_metadata, MetadataStore, OmeMetadata};
use crate::pixels::{get_index, get_zct_coords, position_to_raster, raster_to_position, Region};
use crate::reader::format_reader::{check_plane_parameters, has_suffix};
use crate::reader::{CoreMetadata, FileGrouping, FormatReader, LookupTable, ReaderState, Stage};
use super::axis_guesser::{Axis, AxisGuesser};
use super::file_pattern::FilePattern;

/// Member-file and stitched geometry of a grouped dataset
struct Group {
    pattern: FilePattern,
    guesser: AxisGuesser,
    files: Vec<PathBuf>,
    /// Dimensions of the first member, per series and level
    members: Vec<Vec<CoreMetadata>>,
    /// Per series: Z, C and T lengths; index 0 is the member's own size,
    /// the rest are block counts
    lengths: Vec<[Vec<usize>; 3]>,
    /// Member currently opened by the inner reader
    active: Option<usize>,
}

enum Layout {
    Single,
    Grouped(Group),
}

pub struct FileStitcher {
    inner: Box<dyn FormatReader>,
    state: ReaderState,
    layout: Option<Layout>,
    /// The caller's store lives in the inner reader for single files
    store_in_inner: bool,
}

impl FileStitcher {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        FileStitcher {
            inner,
            state: ReaderState::new(),
            layout: None,
            store_in_inner: false,
        }
    }

    /// Whether the open dataset spans several files
    pub fn is_stitched(&self) -> bool {
        matches!(self.layout, Some(Layout::Grouped(_)))
    }

    pub fn file_pattern(&self) -> Option<&FilePattern> {
        match &self.layout {
            Some(Layout::Grouped(group)) => Some(&group.pattern),
            _ => None,
        }
    }

    pub fn axis_types(&self) -> Option<&[Axis]> {
        match &self.layout {
            Some(Layout::Grouped(group)) => Some(group.guesser.axis_types()),
            _ => None,
        }
    }

    /// Member file index and plane index within that file for plane `no`
    pub fn compute_indices(&self, no: usize) -> FormatResult<(usize, usize)> {
        let group = match &self.layout {
            Some(Layout::Grouped(group)) => group,
            Some(Layout::Single) => return Ok((0, no)),
            None => return Err(FormatError::NotInitialized),
        };
        let core = self.state.core()?;
        let (series, level) = self.state.core_index();
        let [z, c, t] = get_zct_coords(&core.dimension_order, core.zct_sizes(), no)?;
        let [len_z, len_c, len_t] = &group.lengths[series];
        let (pos_z, pos_c, pos_t) = (
            raster_to_position(len_z, z),
            raster_to_position(len_c, c),
            raster_to_position(len_t, t),
        );
        let (mut iz, mut ic, mut it) = (1, 1, 1);
        let position: Vec<usize> = group
            .guesser
            .axis_types()
            .iter()
            .map(|axis| match axis {
                Axis::Z => {
                    iz += 1;
                    pos_z[iz - 1]
                }
                Axis::C => {
                    ic += 1;
                    pos_c[ic - 1]
                }
                _ => {
                    it += 1;
                    pos_t[it - 1]
                }
            })
            .collect();
        let file = position_to_raster(&group.pattern.count(), &position);
        let member = &group.members[series][level];
        let plane = get_index(&member.dimension_order, member.zct_sizes(), pos_z[0], pos_c[0], pos_t[0])?;
        Ok((file, plane))
    }

    /// Pattern to stitch `path` with, if it belongs to a group
    fn find_group(&self, path: &Path) -> Option<FilePattern> {
        if is_pattern_id(path) {
            let text = path.to_string_lossy();
            match FilePattern::new(&text) {
                Ok(pattern) if !pattern.files().is_empty() => return Some(pattern),
                Ok(_) => {}
                Err(e) => warn!("Ignoring invalid pattern id {}: {}", text, e),
            }
            return None;
        }
        let grouping = self.inner.file_grouping(path);
        if grouping != FileGrouping::CanGroup {
            debug!("{:?} is not stitched ({:?})", path, grouping);
            return None;
        }
        match FilePattern::find_pattern(path) {
            Ok(Some(pattern)) => match FilePattern::new(&pattern) {
                Ok(fp) if fp.files().len() > 1 => Some(fp),
                Ok(_) => None,
                Err(e) => {
                    warn!("Cannot use pattern {} for {:?}: {}", pattern, path, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cannot look for files grouped with {:?}: {}", path, e);
                None
            }
        }
    }

    fn open_single(&mut self, path: &Path) -> FormatResult<()> {
        let store = self.state.take_store();
        self.inner.close()?;
        self.inner.set_group_files(self.state.is_group_files());
        self.inner.set_metadata_store(store)?;
        self.store_in_inner = true;
        self.inner.set_id(path)?;
        self.layout = Some(Layout::Single);
        Ok(())
    }

    /// Opens every member through the inner reader; `Ok(false)` means the
    /// files should be read one at a time after all
    fn open_grouped(&mut self, path: &Path, pattern: FilePattern) -> FormatResult<bool> {
        let files = pattern.files().to_vec();
        if files.len() < 2 {
            return Ok(false);
        }
        for (i, file) in files.iter().enumerate() {
            if !has_suffix(file, &["fake"]) && !file.exists() {
                return Err(FormatError::GenericError(format!("File #{} ({:?}) does not exist", i, file)));
            }
        }

        self.inner.close()?;
        self.inner.set_group_files(false);
        self.inner.set_metadata_store(Box::new(OmeMetadata::new()))?;
        self.inner.set_id(&files[0])?;
        let pixel_files = self.inner.used_files(false)?.len() - self.inner.used_files(true)?.len();
        if pixel_files > 1 {
            debug!("{:?} already spans {} pixel files", files[0], pixel_files);
            self.inner.close()?;
            return Ok(false);
        }

        let mut members = Vec::new();
        for series in 0..self.inner.series_count()? {
            self.inner.set_series(series)?;
            let mut levels = Vec::new();
            for level in 0..self.inner.resolution_count()? {
                self.inner.set_resolution(level)?;
                levels.push(self.inner.core()?.into_owned());
            }
            members.push(levels);
        }
        self.inner.set_series(0)?;

        let first = &members[0][0];
        let guesser = AxisGuesser::new(&pattern, first.size_z, first.effective_size_c(), first.size_t);
        let counts = pattern.count();
        let mut lengths = Vec::with_capacity(members.len());
        let mut cores = Vec::with_capacity(members.len());
        for levels in &members {
            let base = &levels[0];
            let mut len = [vec![base.size_z], vec![base.effective_size_c()], vec![base.size_t]];
            for (axis, &count) in guesser.axis_types().iter().zip(&counts) {
                match axis {
                    Axis::Z => len[0].push(count),
                    Axis::C => len[1].push(count),
                    _ => len[2].push(count),
                }
            }
            cores.push(levels.iter().map(|member| stitched_core(member, &len)).collect());
            lengths.push(len);
        }

        self.state.begin(path);
        self.state.install(cores)?;
        if let Some(retrieve) = self.inner.metadata_store().as_retrieve() {
            copy_metadata(retrieve, self.state.store_mut())?;
        }
        self.state.populate_store(|_| None, true)?;
        self.state.finish();

        info!(
            "Stitched {} files matching {} along {:?}",
            files.len(),
            pattern.pattern(),
            guesser.axis_types()
        );
        self.layout = Some(Layout::Grouped(Group {
            pattern,
            guesser,
            files,
            members,
            lengths,
            active: Some(0),
        }));
        Ok(true)
    }

    /// Points the inner reader at member `file` with the current series and
    /// resolution selected
    fn activate(&mut self, file: usize) -> FormatResult<()> {
        let (series, level) = self.state.core_index();
        let (selected_series, selected_level) = (self.state.series(), self.state.resolution());
        let Some(Layout::Grouped(group)) = &mut self.layout else {
            return Err(FormatError::NotInitialized);
        };
        if group.active != Some(file) {
            let path = group.files.get(file).cloned().ok_or_else(|| {
                FormatError::GenericError(format!("Member file #{} outside the pattern", file))
            })?;
            group.active = None;
            self.inner.close()?;
            self.inner.set_id(&path)?;
            group.active = Some(file);
        }
        self.inner.set_series(selected_series)?;
        if selected_level > 0 {
            self.inner.set_resolution(selected_level)?;
        }

        let expected = &group.members[series][level];
        let actual = self.inner.core()?;
        if actual.size_x != expected.size_x
            || actual.size_y != expected.size_y
            || actual.pixel_type != expected.pixel_type
            || actual.image_count != expected.image_count
            || actual.rgb_channel_count() != expected.rgb_channel_count()
        {
            return Err(FormatError::InconsistentDimensions(format!(
                "{:?} does not match the first file of {}",
                group.files[file],
                group.pattern.pattern()
            )));
        }
        Ok(())
    }
}

/// Whether `path` names a file sequence such as `img_z<1-4>.tif` rather
/// than an existing file
fn is_pattern_id(path: &Path) -> bool {
    path.to_string_lossy().contains('<') && !path.exists()
}

/// First file named by a pattern id
fn first_member(path: &Path) -> Option<PathBuf> {
    if !is_pattern_id(path) {
        return None;
    }
    FilePattern::new(&path.to_string_lossy()).ok()?.files().first().cloned()
}

/// Member dimensions multiplied by the block counts of each axis
fn stitched_core(member: &CoreMetadata, lengths: &[Vec<usize>; 3]) -> CoreMetadata {
    let size_z: usize = lengths[0].iter().product();
    let effective_c: usize = lengths[1].iter().product();
    let size_t: usize = lengths[2].iter().product();
    CoreMetadata {
        size_z,
        size_c: effective_c * member.rgb_channel_count(),
        size_t,
        image_count: size_z * effective_c * size_t,
        ..member.clone()
    }
}

impl FormatReader for FileStitcher {
    fn stage(&self) -> Stage {
        Stage::Stitcher
    }

    fn inner(&self) -> Option<&dyn FormatReader> {
        Some(self.inner.as_ref())
    }

    fn inner_mut(&mut self) -> Option<&mut dyn FormatReader> {
        Some(self.inner.as_mut())
    }

    fn format_name(&self) -> &'static str {
        self.inner.format_name()
    }

    fn suffixes(&self) -> &'static [&'static str] {
        self.inner.suffixes()
    }

    fn is_this_type(&self, path: &Path, open: bool) -> bool {
        self.inner.is_this_type(path, open)
    }

    fn file_grouping(&self, path: &Path) -> FileGrouping {
        self.inner.file_grouping(path)
    }

    fn set_group_files(&mut self, group: bool) {
        self.state.set_group_files(group);
    }

    fn is_group_files(&self) -> bool {
        self.state.is_group_files()
    }

    fn set_flattened_resolutions(&mut self, flattened: bool) -> FormatResult<()> {
        self.inner.set_flattened_resolutions(flattened)?;
        self.state.set_flattened(flattened)
    }

    fn has_flattened_resolutions(&self) -> bool {
        self.state.is_flattened()
    }

    fn set_metadata_store(&mut self, store: Box<dyn MetadataStore>) -> FormatResult<()> {
        if self.store_in_inner {
            self.inner.set_metadata_store(store)
        } else {
            self.state.set_store(store)
        }
    }

    fn metadata_store(&self) -> &dyn MetadataStore {
        if self.store_in_inner {
            self.inner.metadata_store()
        } else {
            self.state.store()
        }
    }

    fn take_metadata_store(&mut self) -> Box<dyn MetadataStore> {
        if self.store_in_inner {
            self.inner.take_metadata_store()
        } else {
            self.state.take_store()
        }
    }

    fn set_id(&mut self, path: &Path) -> FormatResult<()> {
        let store = self.take_metadata_store();
        self.close()?;
        self.store_in_inner = false;
        self.state.set_store(store)?;

        if self.state.is_group_files() {
            if let Some(pattern) = self.find_group(path) {
                match self.open_grouped(path, pattern) {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(e) if is_pattern_id(path) => {
                        self.close()?;
                        return Err(e);
                    }
                    Err(e) => {
                        warn!("Cannot stitch files grouped with {:?}, reading it alone: {}", path, e);
                        self.close()?;
                    }
                }
            }
        }
        let target = first_member(path).unwrap_or_else(|| path.to_path_buf());
        self.open_single(&target)
    }

    fn current_file(&self) -> Option<&Path> {
        match &self.layout {
            Some(Layout::Single) => self.inner.current_file(),
            Some(Layout::Grouped(_)) => self.state.current_id(),
            None => None,
        }
    }

    fn close(&mut self) -> FormatResult<()> {
        self.inner.close()?;
        self.state.reset();
        self.layout = None;
        Ok(())
    }

    fn used_files(&self, no_pixels: bool) -> FormatResult<Vec<PathBuf>> {
        match &self.layout {
            Some(Layout::Single) => self.inner.used_files(no_pixels),
            Some(Layout::Grouped(_)) if no_pixels => Ok(Vec::new()),
            Some(Layout::Grouped(group)) => {
                let mut files = group.files.clone();
                files.sort();
                Ok(files)
            }
            None => Err(FormatError::NotInitialized),
        }
    }

    fn series_count(&self) -> FormatResult<usize> {
        match &self.layout {
            Some(Layout::Single) => self.inner.series_count(),
            _ => self.state.series_count(),
        }
    }

    fn set_series(&mut self, series: usize) -> FormatResult<()> {
        match &self.layout {
            Some(Layout::Single) => self.inner.set_series(series),
            _ => self.state.set_series(series),
        }
    }

    fn series(&self) -> usize {
        match &self.layout {
            Some(Layout::Single) => self.inner.series(),
            _ => self.state.series(),
        }
    }

    fn resolution_count(&self) -> FormatResult<usize> {
        match &self.layout {
            Some(Layout::Single) => self.inner.resolution_count(),
            _ => self.state.resolution_count(),
        }
    }

    fn set_resolution(&mut self, resolution: usize) -> FormatResult<()> {
        match &self.layout {
            Some(Layout::Single) => self.inner.set_resolution(resolution),
            _ => self.state.set_resolution(resolution),
        }
    }

    fn resolution(&self) -> usize {
        match &self.layout {
            Some(Layout::Single) => self.inner.resolution(),
            _ => self.state.resolution(),
        }
    }

    fn core(&self) -> FormatResult<Cow<'_, CoreMetadata>> {
        match &self.layout {
            Some(Layout::Single) => self.inner.core(),
            _ => self.state.core().map(Cow::Borrowed),
        }
    }

    fn lookup_table(&self) -> FormatResult<Option<LookupTable>> {
        match &self.layout {
            None => Err(FormatError::NotInitialized),
            Some(_) => self.inner.lookup_table(),
        }
    }

    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
        if let Some(Layout::Single) = self.layout {
            return self.inner.open_bytes_into(no, region, buf);
        }
        check_plane_parameters(self.state.core()?, no, region, buf.len())?;
        let (file, plane) = self.compute_indices(no)?;
        self.activate(file)?;
        self.inner.open_bytes_into(plane, region, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::plugins::FakeReader;
    use std::fs;

    fn touch_fakes(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"").unwrap();
        }
    }

    fn stitcher() -> FileStitcher {
        FileStitcher::new(Box::new(FakeCanGroup(FakeReader::new())))
    }

    /// Fake reader that allows grouping, so sequences of fake ids stitch
    struct FakeCanGroup(FakeReader);

    impl FormatReader for FakeCanGroup {
        fn stage(&self) -> Stage {
            self.0.stage()
        }
        fn format_name(&self) -> &'static str {
            self.0.format_name()
        }
        fn suffixes(&self) -> &'static [&'static str] {
            self.0.suffixes()
        }
        fn is_this_type(&self, path: &Path, open: bool) -> bool {
            self.0.is_this_type(path, open)
        }
        fn file_grouping(&self, _path: &Path) -> FileGrouping {
            FileGrouping::CanGroup
        }
        fn set_group_files(&mut self, group: bool) {
            self.0.set_group_files(group)
        }
        fn is_group_files(&self) -> bool {
            self.0.is_group_files()
        }
        fn set_flattened_resolutions(&mut self, flattened: bool) -> FormatResult<()> {
            self.0.set_flattened_resolutions(flattened)
        }
        fn has_flattened_resolutions(&self) -> bool {
            self.0.has_flattened_resolutions()
        }
        fn set_metadata_store(&mut self, store: Box<dyn MetadataStore>) -> FormatResult<()> {
            self.0.set_metadata_store(store)
        }
        fn metadata_store(&self) -> &dyn MetadataStore {
            self.0.metadata_store()
        }
        fn take_metadata_store(&mut self) -> Box<dyn MetadataStore> {
            self.0.take_metadata_store()
        }
        fn set_id(&mut self, path: &Path) -> FormatResult<()> {
            self.0.set_id(path)
        }
        fn current_file(&self) -> Option<&Path> {
            self.0.current_file()
        }
        fn close(&mut self) -> FormatResult<()> {
            self.0.close()
        }
        fn used_files(&self, no_pixels: bool) -> FormatResult<Vec<PathBuf>> {
            self.0.used_files(no_pixels)
        }
        fn series_count(&self) -> FormatResult<usize> {
            self.0.series_count()
        }
        fn set_series(&mut self, series: usize) -> FormatResult<()> {
            self.0.set_series(series)
        }
        fn series(&self) -> usize {
            self.0.series()
        }
        fn resolution_count(&self) -> FormatResult<usize> {
            self.0.resolution_count()
        }
        fn set_resolution(&mut self, resolution: usize) -> FormatResult<()> {
            self.0.set_resolution(resolution)
        }
        fn resolution(&self) -> usize {
            self.0.resolution()
        }
        fn core(&self) -> FormatResult<Cow<'_, CoreMetadata>> {
            self.0.core()
        }
        fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
            self.0.open_bytes_into(no, region, buf)
        }
    }

    #[test]
    fn test_pattern_id_stitches_along_guessed_axes() {
        let mut reader = stitcher();
        reader
            .set_id(Path::new("cell_t<1-3>&sizeX=16&sizeY=16&sizeZ=2.fake"))
            .unwrap();
        assert!(reader.is_stitched());
        assert_eq!(reader.axis_types().unwrap(), &[Axis::T]);
        assert_eq!(reader.size_z().unwrap(), 2);
        assert_eq!(reader.size_t().unwrap(), 3);
        assert_eq!(reader.image_count().unwrap(), 6);
        assert_eq!(reader.used_files(false).unwrap().len(), 3);

        let no = reader.get_index(1, 0, 2).unwrap();
        assert_eq!(reader.compute_indices(no).unwrap(), (2, 1));
        let plane = reader.open_bytes(no).unwrap();
        assert_eq!(plane.len(), 16 * 16);
    }

    #[test]
    fn test_directory_grouping_is_associative() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["s_z1&sizeX=8&sizeY=8.fake", "s_z2&sizeX=8&sizeY=8.fake", "s_z3&sizeX=8&sizeY=8.fake"];
        touch_fakes(dir.path(), &names);

        let mut expected = None;
        for name in names {
            let mut reader = stitcher();
            reader.set_id(&dir.path().join(name)).unwrap();
            assert_eq!(reader.size_z().unwrap(), 3);
            let used = reader.used_files(false).unwrap();
            assert_eq!(used.len(), 3);
            match &expected {
                None => expected = Some(used),
                Some(first) => assert_eq!(first, &used),
            }
        }
    }

    #[test]
    fn test_lonely_file_is_not_stitched() {
        let dir = tempfile::tempdir().unwrap();
        touch_fakes(dir.path(), &["only_7&sizeX=8&sizeY=8.fake", "notes.txt"]);
        let mut reader = stitcher();
        reader.set_id(&dir.path().join("only_7&sizeX=8&sizeY=8.fake")).unwrap();
        assert!(!reader.is_stitched());
        assert_eq!(reader.compute_indices(0).unwrap(), (0, 0));
        assert_eq!(reader.stages(), vec![Stage::Stitcher, Stage::Format("Simulated data")]);
    }

    #[test]
    fn test_grouping_can_be_disabled() {
        let mut reader = stitcher();
        reader.set_group_files(false);
        reader.set_id(Path::new("g_<1-4>&sizeX=8&sizeY=8.fake")).unwrap();
        assert!(!reader.is_stitched());
        assert_eq!(reader.image_count().unwrap(), 1);
    }

    #[test]
    fn test_inconsistent_members_fail() {
        let mut reader = stitcher();
        reader.set_id(Path::new("m&sizeY=8&sizeX=<8,9>.fake")).unwrap();
        assert_eq!(reader.image_count().unwrap(), 2);
        reader.open_bytes(0).unwrap();
        assert!(matches!(reader.open_bytes(1), Err(FormatError::InconsistentDimensions(_))));
    }

    #[test]
    fn test_store_receives_stitched_sizes() {
        use crate::meta::RetrieveExt;
        let mut reader = stitcher();
        reader.set_id(Path::new("st_c<1-2>&sizeX=8&sizeY=8.fake")).unwrap();
        let retrieve = reader.metadata_store().as_retrieve().unwrap();
        assert_eq!(retrieve.get_int("Image[0]/Pixels/SizeC"), Some(2));
        assert_eq!(retrieve.get_text("Image[0]/Name").as_deref(), Some("st_c1"));
        reader.close().unwrap();
        assert!(reader.size_x().is_err());
    }

    fn write_small_tiff(path: &Path) {
        use crate::meta::StoreExt;
        use crate::writer::{FormatWriter, TiffWriter};
        let mut meta = OmeMetadata::new();
        meta.set("Image[0]/Pixels/SizeX", 8u32).unwrap();
        meta.set("Image[0]/Pixels/SizeY", 4u32).unwrap();
        meta.set("Image[0]/Pixels/SizeZ", 1usize).unwrap();
        meta.set("Image[0]/Pixels/SizeC", 1usize).unwrap();
        meta.set("Image[0]/Pixels/SizeT", 1usize).unwrap();
        meta.set("Image[0]/Pixels/Type", "uint8").unwrap();
        meta.set("Image[0]/Pixels/DimensionOrder", "XYZCT").unwrap();
        let mut writer = TiffWriter::new();
        writer.set_metadata(&meta).unwrap();
        writer.set_id(path).unwrap();
        writer.save_bytes(0, &[7u8; 32]).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_unreadable_sibling_falls_back_to_single_file() {
        use crate::reader::ImageReader;
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a_1.tif"), b"this is not a tiff").unwrap();
        write_small_tiff(&dir.path().join("a_2.tif"));
        write_small_tiff(&dir.path().join("a_3.tif"));

        let mut reader = FileStitcher::new(Box::new(ImageReader::new()));
        reader.set_id(&dir.path().join("a_2.tif")).unwrap();
        assert!(!reader.is_stitched());
        assert_eq!(reader.image_count().unwrap(), 1);
        assert_eq!(reader.used_files(false).unwrap(), vec![dir.path().join("a_2.tif")]);
        assert_eq!(reader.open_bytes(0).unwrap(), vec![7u8; 32]);
    }

    #[test]
    fn test_pattern_id_with_missing_member_fails() {
        let dir = tempfile::tempdir().unwrap();
        let id = dir.path().join("gone_<1-3>.tif");
        let mut reader = FileStitcher::new(Box::new(crate::reader::ImageReader::new()));
        assert!(reader.set_id(&id).is_err());
        assert!(reader.current_file().is_none());
    }
}
