//! Options file
//!
//! Reader and writer options come from a TOML file with a `[reader]` and a
//! `[writer]` table:
//!
//! ```toml
//! [reader]
//! group_files = true
//! flattened_resolutions = false
//! fill_channels = true
//!
//! [writer]
//! compression = "LZW"
//! tile_width = 256
//! tile_height = 256
//! ```
//!
//! Missing keys keep their defaults. Unknown keys are logged and skipped.

use std::fs;
use std::path::Path;
use log::{debug, warn};

use crate::compression::CompressionType;
use crate::errors::{FormatError, FormatResult};

/// Default quality of lossy codecs
pub const DEFAULT_QUALITY: f32 = 0.8;

/// How datasets are opened
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderOptions {
    pub group_files: bool,
    pub flattened_resolutions: bool,
    pub fill_channels: bool,
    pub separate_channels: bool,
    pub track_min_max: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            group_files: true,
            flattened_resolutions: true,
            fill_channels: false,
            separate_channels: false,
            track_min_max: false,
        }
    }
}

/// How TIFF output is written
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    pub compression: CompressionType,
    /// Tile size; strips are written when unset
    pub tile_width: Option<u32>,
    pub tile_height: Option<u32>,
    pub big_tiff: bool,
    pub sequential: bool,
    pub quality: f32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            compression: CompressionType::Uncompressed,
            tile_width: None,
            tile_height: None,
            big_tiff: false,
            sequential: false,
            quality: DEFAULT_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub reader: ReaderOptions,
    pub writer: WriterOptions,
}

impl Options {
    /// Reads options from a TOML file
    pub fn load(path: &Path) -> FormatResult<Self> {
        let content = fs::read_to_string(path)?;
        debug!("Loading options from {:?}", path);
        Self::from_str(&content)
    }

    /// Parses options from TOML text
    pub fn from_str(content: &str) -> FormatResult<Self> {
        let toml_value: toml::Value = content
            .parse()
            .map_err(|e| FormatError::GenericError(format!("Failed to parse TOML: {}", e)))?;
        let Some(root) = toml_value.as_table() else {
            return Err(FormatError::GenericError("Options must be a TOML table".to_string()));
        };

        let mut options = Options::default();
        for (section, value) in root {
            let table = value.as_table().ok_or_else(|| {
                FormatError::GenericError(format!("[{}] must be a table", section))
            })?;
            match section.as_str() {
                "reader" => options.reader.apply(table)?,
                "writer" => options.writer.apply(table)?,
                _ => warn!("Ignoring unknown options section [{}]", section),
            }
        }
        Ok(options)
    }
}

fn wrong_type(section: &str, key: &str, expected: &str) -> FormatError {
    FormatError::GenericError(format!("{}.{} must be {}", section, key, expected))
}

fn get_bool(section: &str, key: &str, value: &toml::Value) -> FormatResult<bool> {
    value.as_bool().ok_or_else(|| wrong_type(section, key, "a boolean"))
}

impl ReaderOptions {
    fn apply(&mut self, table: &toml::value::Table) -> FormatResult<()> {
        for (key, value) in table {
            match key.as_str() {
                "group_files" => self.group_files = get_bool("reader", key, value)?,
                "flattened_resolutions" => self.flattened_resolutions = get_bool("reader", key, value)?,
                "fill_channels" => self.fill_channels = get_bool("reader", key, value)?,
                "separate_channels" => self.separate_channels = get_bool("reader", key, value)?,
                "track_min_max" => self.track_min_max = get_bool("reader", key, value)?,
                _ => warn!("Ignoring unknown reader option {}", key),
            }
        }
        Ok(())
    }
}

impl WriterOptions {
    fn apply(&mut self, table: &toml::value::Table) -> FormatResult<()> {
        for (key, value) in table {
            match key.as_str() {
                "compression" => {
                    let name = value
                        .as_str()
                        .ok_or_else(|| wrong_type("writer", key, "a codec name"))?;
                    self.compression = name.parse()?;
                }
                "tile_width" => self.tile_width = Some(tile_size(key, value)?),
                "tile_height" => self.tile_height = Some(tile_size(key, value)?),
                "big_tiff" => self.big_tiff = get_bool("writer", key, value)?,
                "sequential" => self.sequential = get_bool("writer", key, value)?,
                "quality" => {
                    let quality = value
                        .as_float()
                        .or_else(|| value.as_integer().map(|q| q as f64))
                        .ok_or_else(|| wrong_type("writer", key, "a number"))?;
                    if !(0.0..=1.0).contains(&quality) {
                        return Err(FormatError::GenericError(format!(
                            "writer.quality must lie in [0, 1], got {}",
                            quality
                        )));
                    }
                    self.quality = quality as f32;
                }
                _ => warn!("Ignoring unknown writer option {}", key),
            }
        }
        Ok(())
    }
}

fn tile_size(key: &str, value: &toml::Value) -> FormatResult<u32> {
    value
        .as_integer()
        .filter(|&size| size > 0 && size <= u32::MAX as i64)
        .map(|size| size as u32)
        .ok_or_else(|| wrong_type("writer", key, "a positive integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = Options::from_str("").unwrap();
        assert_eq!(options, Options::default());
        assert!(options.reader.group_files);
        assert!(options.reader.flattened_resolutions);
        assert_eq!(options.writer.compression, CompressionType::Uncompressed);
        assert_eq!(options.writer.tile_width, None);
        assert_eq!(options.writer.quality, DEFAULT_QUALITY);
    }

    #[test]
    fn test_sections() {
        let options = Options::from_str(
            r#"
            [reader]
            group_files = false
            separate_channels = true
            colour = "blue"

            [writer]
            compression = "jpeg-2000"
            tile_width = 256
            tile_height = 128
            big_tiff = true
            quality = 1
            "#,
        )
        .unwrap();
        assert!(!options.reader.group_files);
        assert!(options.reader.separate_channels);
        assert_eq!(options.writer.compression, CompressionType::Jpeg2000);
        assert_eq!(options.writer.tile_width, Some(256));
        assert_eq!(options.writer.tile_height, Some(128));
        assert!(options.writer.big_tiff);
        assert_eq!(options.writer.quality, 1.0);
    }

    #[test]
    fn test_wrong_types_fail() {
        assert!(Options::from_str("[reader]\ngroup_files = \"yes\"").is_err());
        assert!(Options::from_str("[writer]\ntile_width = -4").is_err());
        assert!(Options::from_str("[writer]\ncompression = \"BZIP\"").is_err());
        assert!(Options::from_str("[writer]\nquality = 3.5").is_err());
        assert!(Options::from_str("reader = 1").is_err());
        assert!(Options::from_str("[reader").is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[writer]\ncompression = \"LZW\"\nsequential = true").unwrap();
        let options = Options::load(file.path()).unwrap();
        assert_eq!(options.writer.compression, CompressionType::Lzw);
        assert!(options.writer.sequential);
    }
}
