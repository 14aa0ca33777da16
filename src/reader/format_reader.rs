//! The contract every format plugin and wrapper implements
//!
//! A reader is opened with [`FormatReader::set_id`], queried through the
//! accessors of the currently selected series and resolution, asked for
//! pixel rectangles, and finally closed. Accessors fail with
//! [`FormatError::NotInitialized`] before `set_id`.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::errors::{FormatError, FormatResult};
use crate::meta::MetadataStore;
use crate::pixels::{
    check_buffer_size, check_plane_number, check_tile_size, get_index, get_zct_coords, plane_size,
    DimensionOrder, PixelType, Region,
};
use super::core_metadata::CoreMetadata;
use super::lookup_table::LookupTable;

/// How a reader relates to neighbouring files of the same dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileGrouping {
    /// The format is always spread over several files
    MustGroup,
    /// Numbered siblings may be stitched into one dataset
    CanGroup,
    /// Every file is a dataset of its own
    CannotGroup,
}

/// One link of a reader chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// A concrete format plugin, by format name
    Format(&'static str),
    /// Format detection over all known plugins
    Composite,
    Stitcher,
    ChannelFiller,
    ChannelSeparator,
    MinMax,
    BufferedImage,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Format(name) => write!(f, "{}", name),
            Stage::Composite => write!(f, "ImageReader"),
            Stage::Stitcher => write!(f, "FileStitcher"),
            Stage::ChannelFiller => write!(f, "ChannelFiller"),
            Stage::ChannelSeparator => write!(f, "ChannelSeparator"),
            Stage::MinMax => write!(f, "MinMaxCalculator"),
            Stage::BufferedImage => write!(f, "ImageBufferReader"),
        }
    }
}

/// Uniform multi-dimensional pixel access
///
/// Pixel buffers hold row-major samples in the byte order reported by
/// `is_little_endian`. Interleaved readers store the samples of a pixel
/// together; otherwise each sample forms its own region-sized plane.
///
/// A reader keeps file handles and caches and must not be shared between
/// threads; open one reader per thread instead.
pub trait FormatReader: Send {
    /// What this link of the chain does
    fn stage(&self) -> Stage;

    /// The reader this one wraps, if any
    fn inner(&self) -> Option<&dyn FormatReader> {
        None
    }

    fn inner_mut(&mut self) -> Option<&mut dyn FormatReader> {
        None
    }

    fn format_name(&self) -> &'static str;

    /// Lowercase file suffixes, without the dot
    fn suffixes(&self) -> &'static [&'static str];

    /// Sniffs whether `path` belongs to this format
    ///
    /// With `open == false` only the name is inspected. The answer may then
    /// be stricter than the opened check but never more permissive. Any
    /// failure while sniffing yields `false`.
    fn is_this_type(&self, path: &Path, open: bool) -> bool;

    fn file_grouping(&self, _path: &Path) -> FileGrouping {
        FileGrouping::CannotGroup
    }

    fn set_group_files(&mut self, group: bool);

    fn is_group_files(&self) -> bool;

    /// Chooses between one series per pyramid level (the default) and
    /// levels nested under their series. Fails once a file is open.
    fn set_flattened_resolutions(&mut self, flattened: bool) -> FormatResult<()>;

    fn has_flattened_resolutions(&self) -> bool;

    /// Supplies the sink for parsed metadata. Fails once a file is open.
    fn set_metadata_store(&mut self, store: Box<dyn MetadataStore>) -> FormatResult<()>;

    fn metadata_store(&self) -> &dyn MetadataStore;

    /// Hands the store back, leaving a fresh one in its place
    fn take_metadata_store(&mut self) -> Box<dyn MetadataStore>;

    /// Opens `path`, parsing dimensions and filling the metadata store
    fn set_id(&mut self, path: &Path) -> FormatResult<()>;

    fn current_file(&self) -> Option<&Path>;

    /// Releases every file handle. Closing a closed reader is a no-op.
    fn close(&mut self) -> FormatResult<()>;

    /// Every file of the dataset, the primary file first
    fn used_files(&self, no_pixels: bool) -> FormatResult<Vec<PathBuf>>;

    fn series_count(&self) -> FormatResult<usize>;

    /// Selects a series and resets the resolution to full size
    fn set_series(&mut self, series: usize) -> FormatResult<()>;

    fn series(&self) -> usize;

    fn resolution_count(&self) -> FormatResult<usize>;

    fn set_resolution(&mut self, resolution: usize) -> FormatResult<()>;

    fn resolution(&self) -> usize;

    /// Dimensions of the current series and resolution
    fn core(&self) -> FormatResult<Cow<'_, CoreMetadata>>;

    fn lookup_table(&self) -> FormatResult<Option<LookupTable>> {
        Ok(None)
    }

    /// Fills `buf` with the `region` of plane `no`
    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()>;

    fn size_x(&self) -> FormatResult<u32> {
        Ok(self.core()?.size_x)
    }

    fn size_y(&self) -> FormatResult<u32> {
        Ok(self.core()?.size_y)
    }

    fn size_z(&self) -> FormatResult<usize> {
        Ok(self.core()?.size_z)
    }

    fn size_c(&self) -> FormatResult<usize> {
        Ok(self.core()?.size_c)
    }

    fn size_t(&self) -> FormatResult<usize> {
        Ok(self.core()?.size_t)
    }

    fn image_count(&self) -> FormatResult<usize> {
        Ok(self.core()?.image_count)
    }

    fn effective_size_c(&self) -> FormatResult<usize> {
        Ok(self.core()?.effective_size_c())
    }

    fn rgb_channel_count(&self) -> FormatResult<usize> {
        Ok(self.core()?.rgb_channel_count())
    }

    fn pixel_type(&self) -> FormatResult<PixelType> {
        Ok(self.core()?.pixel_type)
    }

    fn dimension_order(&self) -> FormatResult<DimensionOrder> {
        Ok(self.core()?.dimension_order)
    }

    fn is_little_endian(&self) -> FormatResult<bool> {
        Ok(self.core()?.little_endian)
    }

    fn is_interleaved(&self) -> FormatResult<bool> {
        Ok(self.core()?.interleaved)
    }

    fn is_rgb(&self) -> FormatResult<bool> {
        Ok(self.core()?.rgb)
    }

    fn is_indexed(&self) -> FormatResult<bool> {
        Ok(self.core()?.indexed)
    }

    fn is_false_color(&self) -> FormatResult<bool> {
        Ok(self.core()?.false_color)
    }

    fn get_index(&self, z: usize, c: usize, t: usize) -> FormatResult<usize> {
        let core = self.core()?;
        get_index(&core.dimension_order, core.zct_sizes(), z, c, t)
    }

    fn get_zct_coords(&self, no: usize) -> FormatResult<[usize; 3]> {
        let core = self.core()?;
        get_zct_coords(&core.dimension_order, core.zct_sizes(), no)
    }

    /// Bytes needed for `region` of one plane
    fn region_size(&self, region: &Region) -> FormatResult<usize> {
        let core = self.core()?;
        plane_size(region.width, region.height, core.rgb_channel_count(), core.pixel_type).ok_or_else(|| {
            FormatError::InconsistentDimensions(format!(
                "{}x{} region does not fit in memory",
                region.width, region.height
            ))
        })
    }

    /// Reads a whole plane
    fn open_bytes(&mut self, no: usize) -> FormatResult<Vec<u8>> {
        let region = {
            let core = self.core()?;
            Region::full(core.size_x, core.size_y)
        };
        self.open_region(no, &region)
    }

    /// Reads a rectangle of a plane
    fn open_region(&mut self, no: usize, region: &Region) -> FormatResult<Vec<u8>> {
        let mut buf = vec![0u8; self.region_size(region)?];
        self.open_bytes_into(no, region, &mut buf)?;
        Ok(buf)
    }

    /// Nearest-neighbour downsampling of a plane to the thumbnail size
    fn open_thumb_bytes(&mut self, no: usize) -> FormatResult<Vec<u8>> {
        let core = self.core()?.into_owned();
        let plane = self.open_bytes(no)?;
        let (tx, ty) = (core.thumb_size_x.max(1) as usize, core.thumb_size_y.max(1) as usize);
        let (sx, sy) = (core.size_x as usize, core.size_y as usize);
        let samples = core.rgb_channel_count();
        let bpp = core.pixel_type.bytes_per_pixel();

        let mut thumb = vec![0u8; tx * ty * samples * bpp];
        for y in 0..ty {
            let src_y = y * sy / ty;
            for x in 0..tx {
                let src_x = x * sx / tx;
                for s in 0..samples {
                    let (src, dst) = if core.interleaved {
                        (((src_y * sx + src_x) * samples + s) * bpp, ((y * tx + x) * samples + s) * bpp)
                    } else {
                        ((s * sx * sy + src_y * sx + src_x) * bpp, (s * tx * ty + y * tx + x) * bpp)
                    };
                    thumb[dst..dst + bpp].copy_from_slice(&plane[src..src + bpp]);
                }
            }
        }
        Ok(thumb)
    }

    /// Stages from this reader down to the format plugin
    fn stages(&self) -> Vec<Stage> {
        let mut stages = vec![self.stage()];
        let mut current = self.inner();
        while let Some(reader) = current {
            stages.push(reader.stage());
            current = reader.inner();
        }
        stages
    }
}

/// Innermost reader of a chain
pub fn base_reader(reader: &dyn FormatReader) -> &dyn FormatReader {
    let mut current = reader;
    while let Some(inner) = current.inner() {
        current = inner;
    }
    current
}

/// Validates a plane request against `core` before any byte is read
pub fn check_plane_parameters(core: &CoreMetadata, no: usize, region: &Region, buf_len: usize) -> FormatResult<()> {
    check_plane_number(no, core.image_count)?;
    check_tile_size(region, core.size_x, core.size_y)?;
    let required = plane_size(region.width, region.height, core.rgb_channel_count(), core.pixel_type)
        .ok_or_else(|| FormatError::InconsistentDimensions("region size overflows".to_string()))?;
    check_buffer_size(buf_len, required)
}

/// Case-insensitive suffix check; multi-part suffixes such as `ome.tif` work too
pub fn has_suffix(path: &Path, suffixes: &[&str]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    suffixes.iter().any(|suffix| {
        name.len() > suffix.len() + 1
            && name.ends_with(suffix)
            && name.as_bytes()[name.len() - suffix.len() - 1] == b'.'
    })
}

/// First `len` bytes of a file, fewer when the file is shorter
pub fn read_header(path: &Path, len: usize) -> FormatResult<Vec<u8>> {
    let mut header = Vec::with_capacity(len);
    File::open(path)?.take(len as u64).read_to_end(&mut header)?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_matching() {
        assert!(has_suffix(Path::new("/data/a.TIF"), &["tif", "tiff"]));
        assert!(has_suffix(Path::new("cells.ome.tiff"), &["ome.tiff"]));
        assert!(!has_suffix(Path::new("notatif"), &["tif"]));
        assert!(!has_suffix(Path::new(".tif"), &["tif"]));
    }

    #[test]
    fn test_plane_parameter_checks() {
        let core = CoreMetadata {
            size_x: 10,
            size_y: 8,
            size_z: 2,
            image_count: 2,
            ..CoreMetadata::default()
        };
        assert!(check_plane_parameters(&core, 1, &Region::new(2, 2, 8, 6), 48).is_ok());
        assert!(check_plane_parameters(&core, 2, &Region::full(10, 8), 80).is_err());
        assert!(check_plane_parameters(&core, 0, &Region::new(3, 0, 8, 8), 64).is_err());
        assert!(check_plane_parameters(&core, 0, &Region::full(10, 8), 79).is_err());
    }
}
