//! General raster formats decoded by the `image` crate
//!
//! PNG, JPEG, BMP, GIF and simple TIFF files are decoded completely at
//! open time; the file is closed again before `set_id` returns.

use std::path::{Path, PathBuf};
use image::{DynamicImage, ImageFormat, ImageReader};
use log::debug;

use crate::errors::{FormatError, FormatResult};
use crate::pixels::{copy_subrect, DimensionOrder, PixelType, Region};
use crate::reader::core_metadata::CoreMetadata;
use crate::reader::format_reader::{check_plane_parameters, has_suffix, read_header, FileGrouping, FormatReader, Stage};
use crate::reader::forward_to_state;
use crate::reader::state::ReaderState;

pub const IMAGE_IO_SUFFIXES: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

pub struct ImageIoReader {
    state: ReaderState,
    /// Decoded interleaved samples in native byte order
    pixels: Vec<u8>,
}

impl Default for ImageIoReader {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(path: &Path, e: image::ImageError) -> FormatError {
    match e {
        image::ImageError::IoError(io) => FormatError::IoError(io),
        other => FormatError::GenericError(format!("Cannot decode {:?}: {}", path, other)),
    }
}

/// Pixel type and sample bytes of a decoded image
fn layout_of(image: DynamicImage) -> FormatResult<(PixelType, usize, Vec<u8>)> {
    let channels = image.color().channel_count() as usize;
    let pixel_type = match image.color().bytes_per_pixel() as usize / channels {
        1 => PixelType::Uint8,
        2 => PixelType::Uint16,
        4 => PixelType::Float,
        _ => {
            return Err(FormatError::Unsupported(format!(
                "color type {:?}",
                image.color()
            )))
        }
    };
    Ok((pixel_type, channels, image.into_bytes()))
}

impl ImageIoReader {
    pub fn new() -> Self {
        ImageIoReader {
            state: ReaderState::new(),
            pixels: Vec::new(),
        }
    }

    fn initialize(&mut self, path: &Path) -> FormatResult<()> {
        let image = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| decode_error(path, e))?;
        let (width, height) = (image.width(), image.height());
        let (pixel_type, channels, pixels) = layout_of(image)?;
        debug!("Decoded {:?}: {}x{}, {} x {}", path, width, height, channels, pixel_type);

        let core = CoreMetadata {
            size_x: width,
            size_y: height,
            size_c: channels,
            image_count: 1,
            dimension_order: DimensionOrder::XYCZT,
            pixel_type,
            bits_per_pixel: (pixel_type.bytes_per_pixel() * 8) as u16,
            little_endian: cfg!(target_endian = "little"),
            interleaved: channels > 1,
            rgb: channels > 1,
            ..CoreMetadata::default()
        };
        self.state.install(vec![vec![core]])?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        self.state.populate_store(|_| name.clone(), true)?;
        self.pixels = pixels;
        Ok(())
    }
}

impl FormatReader for ImageIoReader {
    forward_to_state!();

    fn stage(&self) -> Stage {
        Stage::Format(self.format_name())
    }

    fn format_name(&self) -> &'static str {
        "Raster image"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        IMAGE_IO_SUFFIXES
    }

    fn is_this_type(&self, path: &Path, open: bool) -> bool {
        if has_suffix(path, IMAGE_IO_SUFFIXES) {
            return true;
        }
        if !open {
            return false;
        }
        read_header(path, 16)
            .ok()
            .and_then(|header| image::guess_format(&header).ok())
            .map(|format| {
                matches!(
                    format,
                    ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::Gif | ImageFormat::Tiff
                )
            })
            .unwrap_or(false)
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
        self.pixels = Vec::new();
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

    fn open_bytes_into(&mut self, no: usize, region: &Region, buf: &mut [u8]) -> FormatResult<()> {
        let core = self.state.core()?;
        check_plane_parameters(core, no, region, buf.len())?;
        let pixel_bytes = core.rgb_channel_count() * core.pixel_type.bytes_per_pixel();
        copy_subrect(&self.pixels, core.size_x, pixel_bytes, region, buf)
    }
}
