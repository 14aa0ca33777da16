//! Synthetic datasets described entirely by their file name
//!
//! An id such as `cells&sizeX=64&sizeC=3&pixelType=uint16.fake` opens a
//! dataset without touching the disk. Every plane starts with a row of
//! 10x10 boxes holding the series, plane number, Z, C and T; the remaining
//! pixels form a horizontal gradient, so any two planes differ.

use std::path::{Path, PathBuf};
use log::{debug, warn};

use crate::errors::{FormatError, FormatResult};
use crate::meta::StoreExt;
use crate::pixels::{DimensionOrder, PixelType, Region};
use crate::reader::core_metadata::CoreMetadata;
use crate::reader::format_reader::{check_plane_parameters, has_suffix, FormatReader, Stage};
use crate::reader::forward_to_state;
use crate::reader::lookup_table::LookupTable;
use crate::reader::state::ReaderState;

pub const FAKE_SUFFIXES: &[&str] = &["fake"];

/// Edge of the coordinate boxes in the first rows of a plane
const BOX_SIZE: u32 = 10;

/// Parsed id parameters
#[derive(Debug, Clone, PartialEq)]
pub struct FakeParams {
    pub name: String,
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    pub pixel_type: PixelType,
    pub bits_per_pixel: Option<u16>,
    /// Samples stored together per plane
    pub rgb: usize,
    pub dimension_order: DimensionOrder,
    pub little_endian: bool,
    pub interleaved: bool,
    pub indexed: bool,
    pub false_color: bool,
    pub lut_length: usize,
    pub series: usize,
    pub resolutions: usize,
    pub resolution_scale: u32,
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
}

impl Default for FakeParams {
    fn default() -> Self {
        FakeParams {
            name: "Image".to_string(),
            size_x: 512,
            size_y: 512,
            size_z: 1,
            size_c: 1,
            size_t: 1,
            pixel_type: PixelType::Uint8,
            bits_per_pixel: None,
            rgb: 1,
            dimension_order: DimensionOrder::XYZCT,
            little_endian: true,
            interleaved: false,
            indexed: false,
            false_color: false,
            lut_length: 3,
            series: 1,
            resolutions: 1,
            resolution_scale: 2,
            physical_size_x: None,
            physical_size_y: None,
        }
    }
}

fn invalid(key: &str, value: &str) -> FormatError {
    FormatError::GenericError(format!("Invalid {}: {}", key, value))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> FormatResult<T> {
    value.parse::<T>().map_err(|_| invalid(key, value))
}

impl FakeParams {
    /// Parses `name&key=value&...` from the file name of `path`
    pub fn from_path(path: &Path) -> FormatResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FormatError::GenericError(format!("Invalid fake id {:?}", path)))?;
        let stem = file_name
            .len()
            .checked_sub(".fake".len())
            .and_then(|end| file_name.get(..end))
            .filter(|_| has_suffix(path, FAKE_SUFFIXES))
            .ok_or_else(|| FormatError::GenericError(format!("Not a fake id: {}", file_name)))?;

        let mut params = FakeParams::default();
        let mut tokens = stem.split('&');
        if let Some(name) = tokens.next().filter(|n| !n.is_empty()) {
            params.name = name.to_string();
        }
        for token in tokens.filter(|t| !t.is_empty()) {
            let Some((key, value)) = token.split_once('=') else {
                warn!("Ignoring token: {}", token);
                continue;
            };
            params.apply(key, value)?;
        }
        params.validate()?;
        Ok(params)
    }

    fn apply(&mut self, key: &str, value: &str) -> FormatResult<()> {
        let flag = value == "true";
        match key {
            "sizeX" => self.size_x = parse_number(key, value)?,
            "sizeY" => self.size_y = parse_number(key, value)?,
            "sizeZ" => self.size_z = parse_number(key, value)?,
            "sizeC" => self.size_c = parse_number(key, value)?,
            "sizeT" => self.size_t = parse_number(key, value)?,
            "pixelType" => self.pixel_type = PixelType::from_name(value)?,
            "bitsPerPixel" => self.bits_per_pixel = Some(parse_number(key, value)?),
            "rgb" => self.rgb = parse_number(key, value)?,
            "dimOrder" => self.dimension_order = DimensionOrder::parse(value)?,
            "little" => self.little_endian = flag,
            "interleaved" => self.interleaved = flag,
            "indexed" => self.indexed = flag,
            "falseColor" => self.false_color = flag,
            "lutLength" => self.lut_length = parse_number(key, value)?,
            "series" => self.series = parse_number(key, value)?,
            "resolutions" => self.resolutions = parse_number(key, value)?,
            "resolutionScale" => self.resolution_scale = parse_number(key, value)?,
            "physicalSizeX" => self.physical_size_x = Some(parse_number(key, value)?),
            "physicalSizeY" => self.physical_size_y = Some(parse_number(key, value)?),
            _ => debug!("Unknown fake parameter {}={}", key, value),
        }
        Ok(())
    }

    fn validate(&self) -> FormatResult<()> {
        let positive = [
            ("sizeX", self.size_x as usize),
            ("sizeY", self.size_y as usize),
            ("sizeZ", self.size_z),
            ("sizeC", self.size_c),
            ("sizeT", self.size_t),
            ("series", self.series),
            ("resolutions", self.resolutions),
            ("lutLength", self.lut_length),
        ];
        for (key, value) in positive {
            if value < 1 {
                return Err(invalid(key, &value.to_string()));
            }
        }
        if self.rgb < 1 || self.rgb > self.size_c || self.size_c % self.rgb != 0 {
            return Err(FormatError::GenericError(format!(
                "Invalid sizeC/rgb combination: {}/{}",
                self.size_c, self.rgb
            )));
        }
        if self.false_color && !self.indexed {
            return Err(FormatError::GenericError("False color images must be indexed".to_string()));
        }
        if self.resolution_scale < 2 {
            return Err(invalid("resolutionScale", &self.resolution_scale.to_string()));
        }
        Ok(())
    }

    /// Entries of the lookup table, for pixel types that carry one
    fn lut_entries(&self) -> Option<usize> {
        match (self.indexed, self.pixel_type) {
            (true, PixelType::Uint8) => Some(256),
            (true, PixelType::Uint16) => Some(65_536),
            _ => None,
        }
    }

    fn level_core(&self, level: usize) -> CoreMetadata {
        let scale = (self.resolution_scale as u64).saturating_pow(level as u32).max(1);
        CoreMetadata {
            size_x: ((self.size_x as u64 / scale).max(1)) as u32,
            size_y: ((self.size_y as u64 / scale).max(1)) as u32,
            size_z: self.size_z,
            size_c: self.size_c,
            size_t: self.size_t,
            image_count: self.size_z * (self.size_c / self.rgb) * self.size_t,
            dimension_order: self.dimension_order,
            pixel_type: self.pixel_type,
            bits_per_pixel: self
                .bits_per_pixel
                .unwrap_or((self.pixel_type.bytes_per_pixel() * 8) as u16),
            little_endian: self.little_endian,
            interleaved: self.interleaved,
            rgb: self.rgb > 1,
            indexed: self.indexed,
            false_color: self.false_color,
            ..CoreMetadata::default()
        }
    }
}

/// Synthetic image reader
pub struct FakeReader {
    state: ReaderState,
    params: Option<FakeParams>,
}

impl Default for FakeReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeReader {
    pub fn new() -> Self {
        FakeReader {
            state: ReaderState::new(),
            params: None,
        }
    }

    fn initialize(&mut self, path: &Path) -> FormatResult<()> {
        let params = FakeParams::from_path(path)?;
        let cores = (0..params.series)
            .map(|_| (0..params.resolutions).map(|r| params.level_core(r)).collect())
            .collect();
        self.state.install(cores)?;

        let name = params.name.clone();
        self.state.populate_store(
            |image| {
                if image == 0 {
                    Some(name.clone())
                } else {
                    Some(format!("{} {}", name, image + 1))
                }
            },
            true,
        )?;
        let images = self.state.series_count()?;
        for image in 0..images {
            if let Some(size) = params.physical_size_x {
                self.state
                    .store_mut()
                    .set(&format!("Image[{}]/Pixels/PhysicalSizeX", image), size)?;
            }
            if let Some(size) = params.physical_size_y {
                self.state
                    .store_mut()
                    .set(&format!("Image[{}]/Pixels/PhysicalSizeY", image), size)?;
            }
        }
        self.params = Some(params);
        Ok(())
    }

    /// Raw sample value of a pixel before indexing and encoding
    fn pixel_value(
        core: &CoreMetadata,
        series: usize,
        no: usize,
        zct: [usize; 3],
        channel: usize,
        x: u32,
        y: u32,
    ) -> i64 {
        let min = if core.pixel_type.is_signed() && !core.pixel_type.is_floating_point() {
            -(1i64 << (8 * core.pixel_type.bytes_per_pixel() - 1))
        } else {
            0
        };
        if y < BOX_SIZE {
            let special = match x / BOX_SIZE {
                0 => Some(series),
                1 => Some(no),
                2 => Some(zct[0]),
                3 => Some(channel),
                4 => Some(zct[2]),
                _ => None,
            };
            if let Some(value) = special {
                return value as i64;
            }
        }
        let value = min + x as i64;
        if core.pixel_type.is_floating_point() {
            return value;
        }
        // integer gradients wrap around like the stored type would
        let bits = 8 * core.pixel_type.bytes_per_pixel() as u32;
        (value - min).rem_euclid(1i64 << bits) + min
    }
}

impl FormatReader for FakeReader {
    forward_to_state!();

    fn stage(&self) -> Stage {
        Stage::Format(self.format_name())
    }

    fn format_name(&self) -> &'static str {
        "Simulated data"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        FAKE_SUFFIXES
    }

    fn is_this_type(&self, path: &Path, _open: bool) -> bool {
        has_suffix(path, FAKE_SUFFIXES)
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
        self.params = None;
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

    /// Component `i` maps index `v` to `(v + i * entries / components) % entries`,
    /// so every filled channel differs from the others
    fn lookup_table(&self) -> FormatResult<Option<LookupTable>> {
        self.state.require_init()?;
        let params = self.params.as_ref().ok_or(FormatError::NotInitialized)?;
        let Some(entries) = params.lut_entries() else {
            return Ok(None);
        };
        let components = params.lut_length;
        let shift = |i: usize, v: usize| (v + i * entries / components) % entries;
        Ok(Some(if entries == 256 {
            LookupTable::Bits8(
                (0..components)
                    .map(|i| (0..entries).map(|v| shift(i, v) as u8).collect())
                    .collect(),
            )
        } else {
            LookupTable::Bits16(
                (0..components)
                    .map(|i| (0..entries).map(|v| shift(i, v) as u16).collect())
                    .collect(),
            )
        }))
    }

    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
        let core = self.state.core()?;
        check_plane_parameters(core, no, region, buf.len())?;
        let params = self.params.as_ref().ok_or(FormatError::NotInitialized)?;
        let series = self.state.series();
        let zct = crate::pixels::get_zct_coords(&core.dimension_order, core.zct_sizes(), no)?;
        let rgb = core.rgb_channel_count();
        let lut_entries = params.lut_entries().map(|n| n as i64);
        let (w, h) = (region.width as usize, region.height as usize);

        for c_offset in 0..rgb {
            let channel = rgb * zct[1] + c_offset;
            for row in 0..h {
                let y = region.y + row as u32;
                for col in 0..w {
                    let x = region.x + col as u32;
                    let mut pixel = Self::pixel_value(core, series, no, zct, channel, x, y);
                    if let Some(entries) = lut_entries {
                        pixel = pixel.rem_euclid(entries);
                    }
                    let index = if core.interleaved {
                        w * rgb * row + rgb * col + c_offset
                    } else {
                        h * w * c_offset + w * row + col
                    };
                    core.pixel_type
                        .write_sample(buf, index, pixel as f64, core.little_endian);
                }
            }
        }
        Ok(())
    }
}
