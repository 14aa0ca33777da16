//! Dataset conversion
//!
//! Reads any dataset the reader pipeline can open and writes it as TIFF
//! with the compression and block layout of the writer options. Planes
//! are copied one block at a time, so memory use stays at one tile or
//! strip band whatever the plane size.

use std::path::Path;
use log::{debug, info, warn};

use crate::config::{ReaderOptions, WriterOptions};
use crate::errors::{FormatError, FormatResult};
use crate::meta::{populate_pixels, OmeMetadata, RetrieveExt, StoreExt};
use crate::pixels::Region;
use crate::reader::FormatReader;
use crate::utils::logger::Logger;
use crate::utils::ProgressTracker;
use crate::wrapper::Pipeline;
use crate::writer::{FormatWriter, TiffWriter};
use super::handler::{deinterleave, interleave};

/// Rough size of one strip band read while converting untiled output
const BAND_BYTES: usize = 4 * 1024 * 1024;

/// Counts of what a conversion wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionSummary {
    pub series: usize,
    pub planes: usize,
    pub blocks: usize,
}

/// Converter from any readable dataset to TIFF
pub struct DatasetConverter<'a> {
    logger: &'a Logger,
    reader_options: ReaderOptions,
    writer_options: WriterOptions,
    series: Option<usize>,
    show_progress: bool,
}

impl<'a> DatasetConverter<'a> {
    pub fn new(logger: &'a Logger, reader_options: ReaderOptions, writer_options: WriterOptions) -> Self {
        DatasetConverter {
            logger,
            reader_options,
            writer_options,
            series: None,
            show_progress: true,
        }
    }

    /// Converts only `series` instead of every series
    pub fn with_series(mut self, series: Option<usize>) -> Self {
        self.series = series;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Regions covering one plane in output block order
    fn regions(size_x: u32, size_y: u32, tile: Option<(u32, u32)>, row_bytes: usize) -> Vec<Region> {
        let (width, height) = match tile {
            Some(tile) => tile,
            None => (size_x, (BAND_BYTES / row_bytes.max(1)).clamp(1, size_y as usize) as u32),
        };
        let mut regions = Vec::new();
        for y in (0..size_y).step_by(height as usize) {
            for x in (0..size_x).step_by(width as usize) {
                regions.push(Region::new(x, y, width.min(size_x - x), height.min(size_y - y)));
            }
        }
        regions
    }

    /// Writer metadata for the selected series, taken from the reader's
    /// current dimensions so wrapper stages are reflected
    fn output_metadata(reader: &mut dyn FormatReader, selected: &[usize]) -> FormatResult<OmeMetadata> {
        let mut meta = OmeMetadata::new();
        for (image, &series) in selected.iter().enumerate() {
            reader.set_series(series)?;
            let core = reader.core()?.into_owned();
            let source = reader.metadata_store().as_retrieve();
            let name = source.and_then(|r| r.get_text(&format!("Image[{}]/Name", series)));
            populate_pixels(&mut meta, &core, image, name.as_deref(), false)?;
            for key in ["PhysicalSizeX", "PhysicalSizeY"] {
                let path = format!("Image[{}]/Pixels/{}", series, key);
                if let Some(size) = source.and_then(|r| r.get(&path)).and_then(|v| v.as_float()) {
                    meta.set(&format!("Image[{}]/Pixels/{}", image, key), size)?;
                }
            }
        }
        Ok(meta)
    }

    /// Converts `input` to a TIFF file at `output`
    pub fn convert(&self, input: &Path, output: &Path) -> FormatResult<ConversionSummary> {
        let mut reader = Pipeline::from_options(&self.reader_options)?.build()?;
        reader.set_id(input)?;
        let series_count = reader.series_count()?;
        let selected: Vec<usize> = match self.series {
            Some(s) if s >= series_count => {
                return Err(FormatError::GenericError(format!(
                    "Invalid series: {} (series count {})",
                    s, series_count
                )))
            }
            Some(s) => vec![s],
            None => (0..series_count).collect(),
        };

        let meta = Self::output_metadata(reader.as_mut(), &selected)?;
        let mut writer = TiffWriter::new();
        writer.apply_options(&self.writer_options)?;
        writer.set_metadata(&meta)?;
        reader.set_series(selected[0])?;
        let interleaved = reader.is_interleaved()?;
        writer.set_interleaved(interleaved);
        writer.set_id(output)?;

        let mut total = 0u64;
        for &series in &selected {
            reader.set_series(series)?;
            let core = reader.core()?;
            let row_bytes = core.size_x as usize * core.rgb_channel_count() * core.pixel_type.bytes_per_pixel();
            let regions = Self::regions(core.size_x, core.size_y, writer.tile_size(), row_bytes);
            total += (regions.len() * core.image_count) as u64;
        }
        let progress = if self.show_progress {
            ProgressTracker::new(total, "Converting blocks")
        } else {
            ProgressTracker::hidden(total)
        };

        let mut summary = ConversionSummary::default();
        for (image, &series) in selected.iter().enumerate() {
            reader.set_series(series)?;
            writer.set_series(image)?;
            let core = reader.core()?.into_owned();
            let samples = core.rgb_channel_count();
            let sample_bytes = core.pixel_type.bytes_per_pixel();
            let relayout = samples > 1 && core.interleaved != interleaved;
            if relayout {
                warn!("Series {} is re-laid out to match the first series' interleaving", series);
            }
            let row_bytes = core.size_x as usize * samples * sample_bytes;
            let regions = Self::regions(core.size_x, core.size_y, writer.tile_size(), row_bytes);
            progress.set_message(&format!("Series {} of {}", image + 1, selected.len()));
            debug!("Series {}: {} planes of {} blocks", series, core.image_count, regions.len());

            for no in 0..core.image_count {
                for region in &regions {
                    let mut data = reader.open_region(no, region)?;
                    if relayout {
                        data = if interleaved {
                            interleave(&data, samples, sample_bytes)
                        } else {
                            deinterleave(&data, samples, sample_bytes)
                        };
                    }
                    writer.save_region(no, &data, region)?;
                    summary.blocks += 1;
                    progress.increment(1);
                }
                summary.planes += 1;
            }
            summary.series += 1;
        }

        writer.close()?;
        reader.close()?;
        progress.finish();

        let message = format!(
            "Converted {:?} to {:?}: {} series, {} planes, {} compression",
            input,
            output,
            summary.series,
            summary.planes,
            writer.compression()
        );
        info!("{}", message);
        self.logger.log(&message)?;
        Ok(summary)
    }
}
