//! Running per-channel extrema of the planes a caller reads
//!
//! Only whole-plane reads feed the statistics. Returned bytes are never
//! altered.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use log::debug;

use crate::errors::{FormatError, FormatResult};
use crate::pixels::Region;
use crate::reader::{forward_to_inner, CoreMetadata, FormatReader, LookupTable, Stage};

/// Extrema of one series at one resolution
#[derive(Debug, Clone, Default)]
struct SeriesStats {
    channels: Vec<Option<(f64, f64)>>,
    planes: Vec<Option<Vec<(f64, f64)>>>,
    planes_done: usize,
}

impl SeriesStats {
    fn new(core: &CoreMetadata) -> Self {
        SeriesStats {
            channels: vec![None; core.size_c],
            planes: vec![None; core.image_count],
            planes_done: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.planes_done == self.planes.len()
    }
}

/// Per-sample minimum and maximum of a plane buffer
fn plane_extrema(core: &CoreMetadata, plane: &[u8], area: usize) -> Vec<(f64, f64)> {
    let samples = core.rgb_channel_count();
    let mut ranges = vec![(f64::INFINITY, f64::NEG_INFINITY); samples];
    for i in 0..area {
        for (s, range) in ranges.iter_mut().enumerate() {
            let index = if core.interleaved { i * samples + s } else { s * area + i };
            let v = core.pixel_type.sample(plane, index, core.little_endian);
            if v.is_nan() {
                continue;
            }
            range.0 = range.0.min(v);
            range.1 = range.1.max(v);
        }
    }
    ranges
}

pub struct MinMaxCalculator {
    inner: Box<dyn FormatReader>,
    stats: HashMap<(usize, usize), SeriesStats>,
}

impl MinMaxCalculator {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        MinMaxCalculator {
            inner,
            stats: HashMap::new(),
        }
    }

    fn key(&self) -> (usize, usize) {
        (self.inner.series(), self.inner.resolution())
    }

    fn check_channel(&self, channel: usize) -> FormatResult<()> {
        let size_c = self.inner.size_c()?;
        if channel >= size_c {
            return Err(FormatError::GenericError(format!(
                "Invalid channel index: {} (sizeC = {})",
                channel, size_c
            )));
        }
        Ok(())
    }

    /// Extrema of `channel` over every plane of the series
    ///
    /// `None` until every plane of the current series was read in full.
    pub fn channel_global_range(&self, channel: usize) -> FormatResult<Option<(f64, f64)>> {
        self.check_channel(channel)?;
        Ok(self
            .stats
            .get(&self.key())
            .filter(|stats| stats.is_complete())
            .and_then(|stats| stats.channels[channel]))
    }

    /// Extrema of `channel` over the planes read so far
    pub fn channel_known_range(&self, channel: usize) -> FormatResult<Option<(f64, f64)>> {
        self.check_channel(channel)?;
        Ok(self.stats.get(&self.key()).and_then(|stats| stats.channels[channel]))
    }

    /// Extrema of each sample of plane `no`, once it was read
    pub fn plane_range(&self, no: usize) -> FormatResult<Option<Vec<(f64, f64)>>> {
        let image_count = self.inner.image_count()?;
        if no >= image_count {
            return Err(FormatError::InvalidPlane { plane: no, image_count });
        }
        Ok(self.stats.get(&self.key()).and_then(|stats| stats.planes[no].clone()))
    }

    /// Whether every plane of the current series was seen
    pub fn is_min_max_populated(&self) -> FormatResult<bool> {
        self.inner.core()?;
        Ok(self.stats.get(&self.key()).map_or(false, SeriesStats::is_complete))
    }

    fn update(&mut self, no: usize, plane: &[u8]) -> FormatResult<()> {
        let key = self.key();
        let core = self.inner.core()?.into_owned();
        let stats = self.stats.entry(key).or_insert_with(|| SeriesStats::new(&core));
        if stats.planes.get(no).map_or(true, Option::is_some) {
            return Ok(());
        }
        let ranges = plane_extrema(&core, plane, core.size_x as usize * core.size_y as usize);
        let [_, c, _] = self.inner.get_zct_coords(no)?;
        let samples = ranges.len();
        for (s, &(lo, hi)) in ranges.iter().enumerate() {
            if lo > hi {
                continue;
            }
            let slot = &mut stats.channels[c * samples + s];
            *slot = Some(match *slot {
                Some((min, max)) => (min.min(lo), max.max(hi)),
                None => (lo, hi),
            });
        }
        stats.planes[no] = Some(ranges);
        stats.planes_done += 1;
        if stats.is_complete() {
            debug!("Min/max populated for series {} resolution {}", key.0, key.1);
        }
        Ok(())
    }
}

impl FormatReader for MinMaxCalculator {
    forward_to_inner!();

    fn stage(&self) -> Stage {
        Stage::MinMax
    }

    fn set_id(&mut self, path: &Path) -> FormatResult<()> {
        self.stats.clear();
        self.inner.set_id(path)
    }

    fn close(&mut self) -> FormatResult<()> {
        self.stats.clear();
        self.inner.close()
    }

    fn set_series(&mut self, series: usize) -> FormatResult<()> {
        self.inner.set_series(series)
    }

    fn set_resolution(&mut self, resolution: usize) -> FormatResult<()> {
        self.inner.set_resolution(resolution)
    }

    fn core(&self) -> FormatResult<Cow<'_, CoreMetadata>> {
        self.inner.core()
    }

    fn lookup_table(&self) -> FormatResult<Option<LookupTable>> {
        self.inner.lookup_table()
    }

    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
        self.inner.open_bytes_into(no, region, buf)?;
        let (size_x, size_y) = (self.inner.size_x()?, self.inner.size_y()?);
        if region.x == 0 && region.y == 0 && region.width == size_x && region.height == size_y {
            self.update(no, buf)?;
        }
        Ok(())
    }
}
