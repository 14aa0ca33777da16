//! TIFF and BigTIFF plugin
//!
//! Consecutive pages with the same plane shape form one series. Pyramid
//! levels come from SubIFDs or from reduced-resolution pages that follow a
//! full-resolution page in the main chain.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};

use crate::errors::{FormatError, FormatResult};
use crate::io::open_buffered;
use crate::meta::StoreExt;
use crate::pixels::{DimensionOrder, Region};
use crate::reader::core_metadata::CoreMetadata;
use crate::reader::format_reader::{
    check_plane_parameters, has_suffix, read_header, FileGrouping, FormatReader, Stage,
};
use crate::reader::lookup_table::LookupTable;
use crate::reader::state::ReaderState;
use crate::reader::forward_to_state;
use crate::tiff::constants::tags;
use crate::tiff::{is_tiff_header, TiffParser, IFD, TIFF};

pub const TIFF_SUFFIXES: &[&str] = &["tif", "tiff", "tf2", "tf8", "btf"];

/// Key of the plane count in descriptions written by this crate
const IMAGES_KEY: &str = "images";

/// Directories of one series: `levels[level][plane]`
struct SeriesLayout {
    levels: Vec<Vec<IFD>>,
    lut: Option<LookupTable>,
}

pub struct TiffReader {
    state: ReaderState,
    parser: Option<TiffParser<BufReader<File>>>,
    layout: Vec<SeriesLayout>,
}

impl Default for TiffReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Hyperstack sizes recorded in an image description
#[derive(Debug, Clone, Copy, PartialEq)]
struct StackDescription {
    images: usize,
    channels: usize,
    slices: usize,
    frames: usize,
    order: DimensionOrder,
}

fn parse_description(text: &str) -> Option<StackDescription> {
    let mut values: HashMap<&str, &str> = HashMap::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim(), value.trim());
        }
    }
    let number = |key: &str| values.get(key).and_then(|v| v.parse::<usize>().ok());
    let images = number(IMAGES_KEY)?;
    let order = values
        .get("order")
        .and_then(|o| DimensionOrder::parse(o).ok())
        .unwrap_or(DimensionOrder::XYCZT);
    Some(StackDescription {
        images,
        channels: number("channels").unwrap_or(1).max(1),
        slices: number("slices").unwrap_or(1).max(1),
        frames: number("frames").unwrap_or(1).max(1),
        order,
    })
}

/// Writes the description understood by [`parse_description`]
pub fn stack_description(images: usize, channels: usize, slices: usize, frames: usize, order: &DimensionOrder) -> String {
    format!(
        "planeio\n{}={}\nchannels={}\nslices={}\nframes={}\norder={}\n",
        IMAGES_KEY, images, channels, slices, frames, order
    )
}

/// Physical pixel size in micrometres from the resolution tags
fn physical_size(ifd: &IFD, tag: u16) -> Option<f64> {
    let (num, den) = match ifd.get(tag)? {
        crate::tiff::TagValue::Rational(v) => *v.first()?,
        _ => return None,
    };
    if num == 0 || den == 0 {
        return None;
    }
    let per_unit = num as f64 / den as f64;
    match ifd.get_tag_value(tags::RESOLUTION_UNIT).unwrap_or(2) {
        2 => Some(25_400.0 / per_unit),
        3 => Some(10_000.0 / per_unit),
        _ => None,
    }
}

fn level_core(ifd: &IFD, pages: usize) -> FormatResult<CoreMetadata> {
    let samples = ifd.samples_per_pixel() as usize;
    let pixel_type = ifd.pixel_type()?;
    Ok(CoreMetadata {
        size_x: ifd.image_width()?,
        size_y: ifd.image_length()?,
        size_z: 1,
        size_c: samples,
        size_t: pages,
        image_count: pages,
        dimension_order: DimensionOrder::XYCZT,
        pixel_type,
        bits_per_pixel: ifd.bits_per_sample()?,
        little_endian: ifd.little_endian,
        interleaved: ifd.is_chunky() && samples > 1,
        rgb: samples > 1,
        indexed: ifd.is_indexed(),
        ..CoreMetadata::default()
    })
}

/// Applies a stack description to a level when it matches the page count
fn apply_description(core: &mut CoreMetadata, description: &StackDescription) {
    let planes = description.channels * description.slices * description.frames;
    if description.images != core.image_count || planes != core.image_count {
        debug!(
            "Ignoring stack description: {} planes described, {} stored",
            planes, core.image_count
        );
        return;
    }
    let samples = core.size_c;
    core.size_z = description.slices;
    core.size_c = description.channels * samples;
    core.size_t = description.frames;
    core.dimension_order = description.order;
}

/// Reduced-resolution children of every full-resolution page
///
/// SubIFDs come first; reduced pages of the main chain attach to the
/// closest preceding full-resolution page.
fn children_by_page(tiff: &TIFF) -> HashMap<usize, Vec<IFD>> {
    let mut children: HashMap<usize, Vec<IFD>> = HashMap::new();
    let mut owner = None;
    for ifd in &tiff.ifds {
        if ifd.is_reduced_resolution() {
            match owner {
                Some(number) => children.entry(number).or_default().push(ifd.clone()),
                None => warn!("Reduced-resolution IFD #{} precedes every full page", ifd.number),
            }
        } else {
            owner = Some(ifd.number);
            let subs = tiff.children_of(ifd.number);
            if !subs.is_empty() {
                children.entry(ifd.number).or_default().extend(subs.iter().cloned());
            }
        }
    }
    for list in children.values_mut() {
        list.sort_by_key(|ifd| std::cmp::Reverse(ifd.image_width().unwrap_or(0)));
    }
    children
}

impl TiffReader {
    pub fn new() -> Self {
        TiffReader {
            state: ReaderState::new(),
            parser: None,
            layout: Vec::new(),
        }
    }

    fn group_series(tiff: &TIFF) -> Vec<Vec<&IFD>> {
        let mut series: Vec<Vec<&IFD>> = Vec::new();
        let mut last_key = None;
        for page in tiff.pages() {
            let key = page.shape_key();
            match series.last_mut() {
                Some(current) if key == last_key => current.push(page),
                _ => series.push(vec![page]),
            }
            last_key = key;
        }
        series
    }

    fn build_layout(tiff: &TIFF) -> FormatResult<(Vec<SeriesLayout>, Vec<Vec<CoreMetadata>>)> {
        let children = children_by_page(tiff);
        let mut layouts = Vec::new();
        let mut cores = Vec::new();

        for pages in Self::group_series(tiff) {
            let level_count = 1 + pages
                .iter()
                .map(|p| children.get(&p.number).map(Vec::len).unwrap_or(0))
                .min()
                .unwrap_or(0);
            let mut levels: Vec<Vec<IFD>> = vec![pages.iter().map(|&p| p.clone()).collect()];
            for level in 1..level_count {
                levels.push(
                    pages
                        .iter()
                        .filter_map(|p| children.get(&p.number).and_then(|c| c.get(level - 1)).cloned())
                        .collect(),
                );
            }

            let description = pages[0].description().and_then(parse_description);
            let mut series_core = Vec::with_capacity(levels.len());
            for ifds in &levels {
                let mut core = level_core(&ifds[0], ifds.len())?;
                if let Some(desc) = &description {
                    apply_description(&mut core, desc);
                }
                series_core.push(core);
            }

            let lut = if pages[0].is_indexed() {
                let bits = pages[0].bits_per_sample()?;
                pages[0]
                    .get_tag_values(tags::COLOR_MAP)
                    .and_then(|values| LookupTable::from_color_map(&values, bits))
            } else {
                None
            };
            layouts.push(SeriesLayout { levels, lut });
            cores.push(series_core);
        }
        Ok((layouts, cores))
    }

    fn initialize(&mut self, path: &Path) -> FormatResult<()> {
        let mut parser = TiffParser::new(open_buffered(path)?)?;
        let tiff = parser.read_tiff()?;
        info!(
            "{:?}: {} IFDs ({}, {})",
            path.file_name().unwrap_or_default(),
            tiff.ifd_count(),
            if tiff.is_big_tiff { "BigTIFF" } else { "TIFF" },
            tiff.byte_order.name()
        );

        let (layout, cores) = Self::build_layout(&tiff)?;
        self.state.install(cores)?;

        let stem = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.state.populate_store(
            |image| {
                if image == 0 {
                    Some(stem.clone())
                } else {
                    Some(format!("{} #{}", stem, image + 1))
                }
            },
            true,
        )?;
        for (index, series) in layout.iter().enumerate() {
            let first = &series.levels[0][0];
            if let Some(text) = first.description().filter(|d| parse_description(d).is_none()) {
                self.state.store_mut().set(&format!("Image[{}]/Description", index), text)?;
            }
            if let Some(size) = physical_size(first, tags::X_RESOLUTION) {
                self.state
                    .store_mut()
                    .set(&format!("Image[{}]/Pixels/PhysicalSizeX", index), size)?;
            }
            if let Some(size) = physical_size(first, tags::Y_RESOLUTION) {
                self.state
                    .store_mut()
                    .set(&format!("Image[{}]/Pixels/PhysicalSizeY", index), size)?;
            }
        }

        self.parser = Some(parser);
        self.layout = layout;
        Ok(())
    }

    fn current_layout(&self) -> FormatResult<(&SeriesLayout, usize)> {
        self.state.require_init()?;
        let (series, level) = self.state.core_index();
        let layout = self.layout.get(series).ok_or(FormatError::NotInitialized)?;
        Ok((layout, level))
    }
}

impl FormatReader for TiffReader {
    forward_to_state!();

    fn stage(&self) -> Stage {
        Stage::Format(self.format_name())
    }

    fn format_name(&self) -> &'static str {
        "Tagged Image File Format"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        TIFF_SUFFIXES
    }

    fn is_this_type(&self, path: &Path, open: bool) -> bool {
        if has_suffix(path, TIFF_SUFFIXES) {
            return true;
        }
        if !open {
            return false;
        }
        read_header(path, 4).map(|h| is_tiff_header(&h)).unwrap_or(false)
    }

    fn file_grouping(&self, _path: &Path) -> FileGrouping {
        FileGrouping::CanGroup
    }

    fn set_id(&mut self, path: &Path) -> FormatResult<()> {
        self.close()?;
        self.state.begin(path);
        if let Err(e) = self.initialize(path) {
            self.close()?;
            return Err(e);
        }
        self.state.finish();
        Ok(())
    }

    fn close(&mut self) -> FormatResult<()> {
        self.parser = None;
        self.layout.clear();
        self.state.reset();
        Ok(())
    }

    fn used_files(&self, no_pixels: bool) -> FormatResult<Vec<PathBuf>> {
        self.state.require_init()?;
        if no_pixels {
            return Ok(Vec::new());
        }
        Ok(self.state.current_id().map(Path::to_path_buf).into_iter().collect())
    }

    fn lookup_table(&self) -> FormatResult<Option<LookupTable>> {
        let (layout, _) = self.current_layout()?;
        Ok(layout.lut.clone())
    }

    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
        check_plane_parameters(self.state.core()?, no, region, buf.len())?;
        let (series, level) = self.state.core_index();
        let ifd = self
            .layout
            .get(series)
            .and_then(|s| s.levels.get(level))
            .and_then(|planes| planes.get(no))
            .ok_or(FormatError::InvalidPlane { plane: no, image_count: 0 })?;
        let parser = self.parser.as_mut().ok_or(FormatError::NotInitialized)?;
        parser.get_samples(ifd, region, buf, no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_round_trip() {
        let text = stack_description(6, 3, 2, 1, &DimensionOrder::XYZCT);
        let parsed = parse_description(&text).unwrap();
        assert_eq!(parsed.images, 6);
        assert_eq!((parsed.channels, parsed.slices, parsed.frames), (3, 2, 1));
        assert_eq!(parsed.order, DimensionOrder::XYZCT);
        assert!(parse_description("plain text").is_none());
    }

    #[test]
    fn test_description_must_match_page_count() {
        let mut core = CoreMetadata {
            size_x: 4,
            size_y: 4,
            size_t: 5,
            image_count: 5,
            ..CoreMetadata::default()
        };
        let desc = parse_description(&stack_description(6, 3, 2, 1, &DimensionOrder::XYCZT)).unwrap();
        apply_description(&mut core, &desc);
        assert_eq!(core.size_t, 5);

        core.size_t = 6;
        core.image_count = 6;
        apply_description(&mut core, &desc);
        assert_eq!((core.size_z, core.size_c, core.size_t), (2, 3, 1));
        assert!(core.validate().is_ok());
    }

    #[test]
    fn test_name_only_sniffing_is_stricter() {
        let reader = TiffReader::new();
        assert!(reader.is_this_type(Path::new("/nonexistent/a.TIFF"), false));
        assert!(!reader.is_this_type(Path::new("/nonexistent/a.dat"), false));
        assert!(!reader.is_this_type(Path::new("/nonexistent/a.dat"), true));
    }

    #[test]
    fn test_used_files_without_pixels_is_empty() {
        use crate::meta::{OmeMetadata, StoreExt};
        use crate::writer::{FormatWriter, TiffWriter};
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.tif");
        let mut meta = OmeMetadata::new();
        meta.set("Image[0]/Pixels/SizeX", 4u32).unwrap();
        meta.set("Image[0]/Pixels/SizeY", 4u32).unwrap();
        meta.set("Image[0]/Pixels/SizeZ", 1usize).unwrap();
        meta.set("Image[0]/Pixels/SizeC", 1usize).unwrap();
        meta.set("Image[0]/Pixels/SizeT", 1usize).unwrap();
        meta.set("Image[0]/Pixels/Type", "uint8").unwrap();
        meta.set("Image[0]/Pixels/DimensionOrder", "XYZCT").unwrap();
        let mut writer = TiffWriter::new();
        writer.set_metadata(&meta).unwrap();
        writer.set_id(&path).unwrap();
        writer.save_bytes(0, &[1u8; 16]).unwrap();
        writer.close().unwrap();

        let mut reader = TiffReader::new();
        reader.set_id(&path).unwrap();
        assert_eq!(reader.used_files(false).unwrap(), vec![path.clone()]);
        assert!(reader.used_files(true).unwrap().is_empty());
    }
}
