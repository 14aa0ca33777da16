//! TIFF and BigTIFF output
//!
//! Every plane becomes one page of the main IFD chain, series after
//! series. Planes are cut into tiles (or strips when no tile size is set)
//! and each block is compressed and appended as soon as all of its pixels
//! have arrived. Blocks that only received part of their pixels are held
//! back and merged with later writes; they are flushed with zero fill when
//! their plane is finished. A plane's IFD is built on its first write and
//! reused for every later write to the same plane.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use log::{debug, info, trace, warn};

use crate::compression::{CodecOptions, CompressionHandler, CompressionType};
use crate::config::DEFAULT_QUALITY;
use crate::errors::{FormatError, FormatResult};
use crate::io::byte_order::ByteOrder;
use crate::io::create_buffered;
use crate::meta::MetadataRetrieve;
use crate::pixels::{check_tile_size, Region};
use crate::reader::plugins::tiff_reader::{stack_description, TIFF_SUFFIXES};
use crate::tiff::constants::{photometric, planar_config, tags, DEFAULT_STRIP_BYTES, TILE_GRANULARITY};
use crate::tiff::saver::offsets_value;
use crate::tiff::{TagValue, TiffSaver, IFD};
use super::format_writer::{series_from_retrieve, FormatWriter, SeriesInfo};

/// (series, plane) in output order
type PlaneKey = (usize, usize);

/// Block grid of one series
#[derive(Debug, Clone, Copy)]
struct BlockLayout {
    width: u32,
    height: u32,
    across: u32,
    down: u32,
    tiled: bool,
    /// Separately stored sample planes (1 when chunky)
    sample_planes: usize,
    /// Bytes per pixel within a block
    pixel_bytes: usize,
}

impl BlockLayout {
    fn new(info: &SeriesInfo, tile: Option<(u32, u32)>, interleaved: bool) -> Self {
        let sample_bytes = info.pixel_type.bytes_per_pixel();
        let chunky = interleaved || info.samples == 1;
        let pixel_bytes = if chunky { info.samples * sample_bytes } else { sample_bytes };
        let (width, height, tiled) = match tile {
            Some((w, h)) => (w, h, true),
            None => {
                let row_bytes = (info.size_x as usize * pixel_bytes).max(1);
                let rows = (DEFAULT_STRIP_BYTES / row_bytes).clamp(1, info.size_y as usize);
                (info.size_x, rows as u32, false)
            }
        };
        BlockLayout {
            width,
            height,
            across: info.size_x.div_ceil(width),
            down: info.size_y.div_ceil(height),
            tiled,
            sample_planes: if chunky { 1 } else { info.samples },
            pixel_bytes,
        }
    }

    fn per_sample(&self) -> usize {
        (self.across * self.down) as usize
    }

    fn count(&self) -> usize {
        self.per_sample() * self.sample_planes
    }

    /// Image area covered by block (`row`, `col`)
    fn bounds(&self, row: u32, col: u32, size_x: u32, size_y: u32) -> Region {
        let x = col * self.width;
        let y = row * self.height;
        Region::new(x, y, self.width.min(size_x - x), self.height.min(size_y - y))
    }

    /// Rows stored for a block: tiles are padded, the last strip is clipped
    fn stored_rows(&self, bounds: &Region) -> u32 {
        if self.tiled {
            self.height
        } else {
            bounds.height
        }
    }
}

/// Block that has received some, not all, of its pixels
struct PartialBlock {
    data: Vec<u8>,
    /// One flag per pixel of the block's image area
    written: Vec<bool>,
    covered: usize,
}

/// Output state of a plane that has been written to
struct PendingPlane {
    ifd: IFD,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    partial: HashMap<usize, PartialBlock>,
}

pub struct TiffWriter {
    series_info: Vec<SeriesInfo>,
    layouts: Vec<BlockLayout>,
    compression: CompressionType,
    codec: Box<dyn CompressionHandler>,
    quality: f32,
    interleaved: bool,
    tile: Option<(u32, u32)>,
    big_tiff: bool,
    sequential: bool,
    series: usize,
    path: Option<PathBuf>,
    saver: Option<TiffSaver<BufWriter<File>>>,
    pending: BTreeMap<PlaneKey, PendingPlane>,
    /// Next plane whose IFD goes into the chain
    next_emit: PlaneKey,
    /// Last plane written in sequential mode
    last_written: Option<PlaneKey>,
}

impl Default for TiffWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TiffWriter {
    pub fn new() -> Self {
        TiffWriter {
            series_info: Vec::new(),
            layouts: Vec::new(),
            compression: CompressionType::Uncompressed,
            codec: CompressionType::Uncompressed.handler(),
            quality: DEFAULT_QUALITY,
            interleaved: true,
            tile: None,
            big_tiff: false,
            sequential: false,
            series: 0,
            path: None,
            saver: None,
            pending: BTreeMap::new(),
            next_emit: (0, 0),
            last_written: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.saver.is_some()
    }

    fn require_closed(&self, what: &str) -> FormatResult<()> {
        if self.is_open() {
            return Err(FormatError::Unsupported(format!("{} cannot change while writing", what)));
        }
        Ok(())
    }

    fn codec_options(&self, info: &SeriesInfo, layout: &BlockLayout, rows: u32) -> CodecOptions {
        let channels = if layout.sample_planes == 1 { info.samples } else { 1 };
        CodecOptions::new(layout.width, rows)
            .with_bits((info.pixel_type.bytes_per_pixel() * 8) as u16)
            .with_channels(channels as u16, true)
            .with_little_endian(info.little_endian)
            .with_signed(info.pixel_type.is_signed() && !info.pixel_type.is_floating_point())
            .with_quality(self.quality)
    }

    /// Tags shared by every plane of `series`
    fn plane_ifd(&self, (series, no): PlaneKey) -> FormatResult<IFD> {
        let info = &self.series_info[series];
        let layout = &self.layouts[series];
        let samples = info.samples as u16;
        let bits = (info.pixel_type.bytes_per_pixel() * 8) as u16;
        let mut ifd = IFD::new(0, 0, info.little_endian);
        ifd.set(tags::IMAGE_WIDTH, TagValue::Long(vec![info.size_x]));
        ifd.set(tags::IMAGE_LENGTH, TagValue::Long(vec![info.size_y]));
        ifd.set(tags::BITS_PER_SAMPLE, TagValue::Short(vec![bits; samples as usize]));
        ifd.set(tags::COMPRESSION, TagValue::Short(vec![self.compression.code() as u16]));
        let rgb = matches!(samples, 3 | 4) && bits <= 16;
        let photometric = if rgb { photometric::RGB } else { photometric::BLACK_IS_ZERO };
        ifd.set(tags::PHOTOMETRIC_INTERPRETATION, TagValue::Short(vec![photometric]));
        ifd.set(tags::SAMPLES_PER_PIXEL, TagValue::Short(vec![samples]));
        let extra = if rgb { samples - 3 } else { samples - 1 };
        if extra > 0 {
            ifd.set(tags::EXTRA_SAMPLES, TagValue::Short(vec![0; extra as usize]));
        }
        let planar = if layout.sample_planes == 1 { planar_config::CHUNKY } else { planar_config::PLANAR };
        ifd.set(tags::PLANAR_CONFIGURATION, TagValue::Short(vec![planar]));
        ifd.set(
            tags::SAMPLE_FORMAT,
            TagValue::Short(vec![info.pixel_type.tiff_sample_format(); samples as usize]),
        );
        if layout.tiled {
            ifd.set(tags::TILE_WIDTH, TagValue::Long(vec![layout.width]));
            ifd.set(tags::TILE_LENGTH, TagValue::Long(vec![layout.height]));
        } else {
            ifd.set(tags::ROWS_PER_STRIP, TagValue::Long(vec![layout.height]));
        }
        if no == 0 {
            let description = stack_description(
                info.image_count(),
                info.effective_size_c(),
                info.size_z,
                info.size_t,
                &info.dimension_order,
            );
            ifd.set(tags::IMAGE_DESCRIPTION, TagValue::Ascii(description));
            ifd.set(tags::SOFTWARE, TagValue::Ascii(format!("planeio {}", env!("CARGO_PKG_VERSION"))));
        }
        if let (Some(x), Some(y)) = (info.physical_size_x, info.physical_size_y) {
            // pixels per centimetre
            let per_cm = |size: f64| ((10_000.0 / size) * 1000.0).round().clamp(1.0, u32::MAX as f64) as u32;
            ifd.set(tags::X_RESOLUTION, TagValue::Rational(vec![(per_cm(x), 1000)]));
            ifd.set(tags::Y_RESOLUTION, TagValue::Rational(vec![(per_cm(y), 1000)]));
            ifd.set(tags::RESOLUTION_UNIT, TagValue::Short(vec![3]));
        }
        Ok(ifd)
    }

    fn new_pending(&self, key: PlaneKey) -> FormatResult<PendingPlane> {
        let blocks = self.layouts[key.0].count();
        Ok(PendingPlane {
            ifd: self.plane_ifd(key)?,
            offsets: vec![0; blocks],
            byte_counts: vec![0; blocks],
            partial: HashMap::new(),
        })
    }

    /// Compresses `data` and appends it as block `index` of `plane`
    fn store_block(
        saver: &mut TiffSaver<BufWriter<File>>,
        codec: &dyn CompressionHandler,
        options: &CodecOptions,
        plane: &mut PendingPlane,
        index: usize,
    ) -> FormatResult<()> {
        let data = plane
            .partial
            .remove(&index)
            .map(|p| p.data)
            .ok_or_else(|| FormatError::GenericError(format!("Block {} has no data", index)))?;
        let compressed = codec.compress(&data, options)?;
        let offset = saver.write_block(&compressed)?;
        plane.offsets[index] = offset;
        plane.byte_counts[index] = compressed.len() as u64;
        trace!("Block {}: {} -> {} bytes at {}", index, data.len(), compressed.len(), offset);
        Ok(())
    }

    /// Flushes partial blocks and links the IFD of `key`
    fn emit_plane(&mut self, key: PlaneKey) -> FormatResult<()> {
        let mut plane = match self.pending.remove(&key) {
            Some(plane) => plane,
            None => self.new_pending(key)?,
        };
        let info = &self.series_info[key.0];
        let layout = self.layouts[key.0];

        let mut partial: Vec<usize> = plane.partial.keys().copied().collect();
        partial.sort_unstable();
        if !partial.is_empty() {
            debug!("Plane {:?}: zero-filling {} incomplete blocks", key, partial.len());
        }
        let jobs: Vec<(usize, CodecOptions)> = partial
            .into_iter()
            .map(|index| {
                let within = index % layout.per_sample();
                let (row, col) = (within as u32 / layout.across, within as u32 % layout.across);
                let bounds = layout.bounds(row, col, info.size_x, info.size_y);
                (index, self.codec_options(info, &layout, layout.stored_rows(&bounds)))
            })
            .collect();
        let saver = self.saver.as_mut().ok_or(FormatError::NotInitialized)?;
        for (index, options) in jobs {
            Self::store_block(saver, self.codec.as_ref(), &options, &mut plane, index)?;
        }

        let (offset_tag, count_tag) = if layout.tiled {
            (tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS)
        } else {
            (tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS)
        };
        let big_tiff = saver.is_big_tiff();
        plane.ifd.set(offset_tag, offsets_value(big_tiff, plane.offsets)?);
        plane.ifd.set(count_tag, offsets_value(big_tiff, plane.byte_counts)?);
        saver.write_ifd(&plane.ifd)?;
        Ok(())
    }

    fn next_key(&self, (series, no): PlaneKey) -> PlaneKey {
        if no + 1 < self.series_info[series].image_count() {
            (series, no + 1)
        } else {
            (series + 1, 0)
        }
    }

    /// Emits every plane before `until`, or every remaining plane
    fn emit_until(&mut self, until: Option<PlaneKey>) -> FormatResult<()> {
        while self.next_emit.0 < self.series_info.len() && until.map_or(true, |u| self.next_emit < u) {
            let key = self.next_emit;
            self.emit_plane(key)?;
            self.next_emit = self.next_key(key);
        }
        Ok(())
    }

    /// Writes the parts of `buf` that fall into block (`row`, `col`) of
    /// sample plane `sample`
    fn write_into_block(
        &mut self,
        key: PlaneKey,
        buf: &[u8],
        region: &Region,
        sample: usize,
        row: u32,
        col: u32,
    ) -> FormatResult<()> {
        let info = &self.series_info[key.0];
        let layout = self.layouts[key.0];
        let bounds = layout.bounds(row, col, info.size_x, info.size_y);
        let Some(overlap) = bounds.intersection(region) else {
            return Ok(());
        };
        let index = sample * layout.per_sample() + (row * layout.across + col) as usize;
        let rows = layout.stored_rows(&bounds);
        let options = self.codec_options(info, &layout, rows);
        let plane = self.pending.get_mut(&key).ok_or(FormatError::NotInitialized)?;
        if plane.offsets[index] != 0 {
            return Err(FormatError::Unsupported(format!(
                "block {} of plane {} in series {} was already written",
                index, key.1, key.0
            )));
        }

        let block_len = layout.width as usize * rows as usize * layout.pixel_bytes;
        let entry = plane.partial.entry(index).or_insert_with(|| PartialBlock {
            data: vec![0u8; block_len],
            written: vec![false; bounds.area()],
            covered: 0,
        });
        let row_bytes = overlap.width as usize * layout.pixel_bytes;
        let source_base = sample * region.area() * layout.pixel_bytes;
        for y in overlap.y..overlap.y + overlap.height {
            let src = source_base
                + ((y - region.y) as usize * region.width as usize + (overlap.x - region.x) as usize)
                    * layout.pixel_bytes;
            let dst = ((y - bounds.y) as usize * layout.width as usize + (overlap.x - bounds.x) as usize)
                * layout.pixel_bytes;
            entry.data[dst..dst + row_bytes].copy_from_slice(&buf[src..src + row_bytes]);
            let first = (y - bounds.y) as usize * bounds.width as usize + (overlap.x - bounds.x) as usize;
            for flag in &mut entry.written[first..first + overlap.width as usize] {
                if !*flag {
                    *flag = true;
                    entry.covered += 1;
                }
            }
        }
        if entry.covered == bounds.area() {
            let saver = self.saver.as_mut().ok_or(FormatError::NotInitialized)?;
            Self::store_block(saver, self.codec.as_ref(), &options, plane, index)?;
        }
        Ok(())
    }
}

impl FormatWriter for TiffWriter {
    fn format_name(&self) -> &'static str {
        "Tagged Image File Format"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        TIFF_SUFFIXES
    }

    fn set_metadata(&mut self, meta: &dyn MetadataRetrieve) -> FormatResult<()> {
        self.require_closed("metadata")?;
        self.series_info = series_from_retrieve(meta)?;
        self.series = 0;
        Ok(())
    }

    fn series_info(&self) -> &[SeriesInfo] {
        &self.series_info
    }

    fn set_compression(&mut self, compression: CompressionType) -> FormatResult<()> {
        self.require_closed("compression")?;
        self.compression = compression;
        self.codec = compression.handler();
        Ok(())
    }

    fn compression(&self) -> CompressionType {
        self.compression
    }

    fn set_quality(&mut self, quality: f32) {
        self.quality = quality.clamp(0.0, 1.0);
    }

    fn set_interleaved(&mut self, interleaved: bool) {
        self.interleaved = interleaved;
    }

    fn is_interleaved(&self) -> bool {
        self.interleaved
    }

    fn set_tile_size(&mut self, width: u32, height: u32) -> FormatResult<(u32, u32)> {
        self.require_closed("tile size")?;
        if width == 0 || height == 0 {
            return Err(FormatError::GenericError(format!("Invalid tile size {}x{}", width, height)));
        }
        let round = |v: u32| v.div_ceil(TILE_GRANULARITY) * TILE_GRANULARITY;
        let tile = (round(width), round(height));
        if tile != (width, height) {
            debug!("Tile size {}x{} rounded to {}x{}", width, height, tile.0, tile.1);
        }
        self.tile = Some(tile);
        Ok(tile)
    }

    fn tile_size(&self) -> Option<(u32, u32)> {
        self.tile
    }

    fn set_big_tiff(&mut self, big_tiff: bool) -> FormatResult<()> {
        self.require_closed("BigTIFF mode")?;
        self.big_tiff = big_tiff;
        Ok(())
    }

    fn set_sequential(&mut self, sequential: bool) -> FormatResult<()> {
        self.require_closed("sequential mode")?;
        self.sequential = sequential;
        Ok(())
    }

    fn is_sequential(&self) -> bool {
        self.sequential
    }

    fn set_id(&mut self, path: &Path) -> FormatResult<()> {
        if self.is_open() {
            self.close()?;
        }
        if self.series_info.is_empty() {
            return Err(FormatError::GenericError("Metadata must be set before the output is opened".to_string()));
        }
        for (s, info) in self.series_info.iter().enumerate() {
            if !self.is_supported_type(info.pixel_type) {
                return Err(FormatError::Unsupported(format!(
                    "{} cannot store {} pixels (series {})",
                    self.compression,
                    info.pixel_type.name(),
                    s
                )));
            }
        }
        self.layouts = self
            .series_info
            .iter()
            .map(|info| BlockLayout::new(info, self.tile, self.interleaved))
            .collect();

        let order = ByteOrder::from_little_endian(self.series_info[0].little_endian);
        self.saver = Some(TiffSaver::new(create_buffered(path)?, order, self.big_tiff)?);
        self.path = Some(path.to_path_buf());
        self.series = 0;
        self.next_emit = (0, 0);
        self.last_written = None;
        info!(
            "Writing {:?}: {} series, {} compression, {}",
            path,
            self.series_info.len(),
            self.compression,
            match self.tile {
                Some((w, h)) => format!("{}x{} tiles", w, h),
                None => "strips".to_string(),
            }
        );
        Ok(())
    }

    fn set_series(&mut self, series: usize) -> FormatResult<()> {
        if series >= self.series_info.len() {
            return Err(FormatError::GenericError(format!(
                "Invalid series: {} (series count {})",
                series,
                self.series_info.len()
            )));
        }
        if self.sequential && self.last_written.is_some_and(|(s, _)| series < s) {
            return Err(FormatError::Unsupported(format!(
                "sequential output cannot return to series {}",
                series
            )));
        }
        self.series = series;
        Ok(())
    }

    fn series(&self) -> usize {
        self.series
    }

    fn save_region(&mut self, no: usize, buf: &[u8], region: &Region) -> FormatResult<()> {
        if !self.is_open() {
            return Err(FormatError::NotInitialized);
        }
        let info = &self.series_info[self.series];
        let image_count = info.image_count();
        if no >= image_count {
            return Err(FormatError::InvalidPlane { plane: no, image_count });
        }
        check_tile_size(region, info.size_x, info.size_y)?;
        let required = info.region_bytes(region);
        if buf.len() < required {
            return Err(FormatError::BufferTooSmall { required, actual: buf.len() });
        }
        if region.is_empty() {
            return Ok(());
        }

        let key = (self.series, no);
        if self.sequential {
            if self.last_written.is_some_and(|last| key < last) {
                return Err(FormatError::Unsupported(format!(
                    "sequential output cannot return to plane {} of series {}",
                    no, self.series
                )));
            }
            self.emit_until(Some(key))?;
            self.last_written = Some(key);
        } else if key < self.next_emit {
            return Err(FormatError::Unsupported(format!(
                "plane {} of series {} is already finished",
                no, self.series
            )));
        }
        if !self.pending.contains_key(&key) {
            let plane = self.new_pending(key)?;
            self.pending.insert(key, plane);
        }

        let layout = self.layouts[self.series];
        let first_row = region.y / layout.height;
        let last_row = ((region.end_y() - 1) / layout.height as u64) as u32;
        let first_col = region.x / layout.width;
        let last_col = ((region.end_x() - 1) / layout.width as u64) as u32;
        for sample in 0..layout.sample_planes {
            for row in first_row..=last_row {
                for col in first_col..=last_col {
                    self.write_into_block(key, buf, region, sample, row, col)?;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> FormatResult<()> {
        if !self.is_open() {
            return Ok(());
        }
        let result = self.emit_until(None);
        let saver = self.saver.take();
        self.pending.clear();
        self.last_written = None;
        let path = self.path.take();
        result?;
        if let Some(saver) = saver {
            let count = saver.ifd_count();
            saver.finish()?;
            debug!("Closed {:?} with {} IFDs", path, count);
        }
        Ok(())
    }
}

impl Drop for TiffWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to finish TIFF output: {}", e);
        }
    }
}
