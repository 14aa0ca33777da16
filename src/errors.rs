//! Error types shared by every reader, writer and codec
//!
//! Every failure falls into one of two kinds: a format error (malformed or
//! unsupported data, inconsistent dimensions, invalid tag values) or an I/O
//! error (the file itself could not be accessed).

use std::fmt;
use std::io;

use crate::pixels::Region;

/// Top-level classification of a [`FormatError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, unsupported or inconsistent data
    Format,
    /// File access failure
    Io,
}

/// Errors raised while reading, writing or transcoding image data
#[derive(Debug)]
pub enum FormatError {
    /// I/O error
    IoError(io::Error),
    /// Invalid TIFF header
    InvalidHeader,
    /// Invalid byte order marker
    InvalidByteOrder(u16),
    /// Invalid BigTIFF header
    InvalidBigTIFFHeader,
    /// Unsupported TIFF version
    UnsupportedVersion(u16),
    /// Tag not found
    TagNotFound(u16),
    /// Unsupported field type
    UnsupportedFieldType(u16),
    /// Unsupported compression method
    UnsupportedCompression(u64),
    /// Tile request outside the plane
    OutOfBounds {
        region: Region,
        size_x: u32,
        size_y: u32,
    },
    /// Plane index outside `0..image_count`
    InvalidPlane { plane: usize, image_count: usize },
    /// Caller buffer too small for the request
    BufferTooSmall { required: usize, actual: usize },
    /// Codec failure on a specific plane/tile
    Codec {
        codec: &'static str,
        plane: Option<usize>,
        tile: Option<(u32, u32)>,
        message: String,
    },
    /// Decompressed size differs from the declared size
    SizeMismatch {
        expected: usize,
        actual: usize,
        plane: Option<usize>,
        tile: Option<(u32, u32)>,
    },
    /// Dimension arithmetic does not add up
    InconsistentDimensions(String),
    /// Accessor used before `set_id`
    NotInitialized,
    /// Operation the reader or writer cannot perform
    Unsupported(String),
    /// Generic error with message
    GenericError(String),
}

impl FormatError {
    /// Returns whether this is a format or an I/O failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormatError::IoError(_) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }

    /// Creates a codec error without coordinates
    pub fn codec(codec: &'static str, message: impl Into<String>) -> Self {
        FormatError::Codec {
            codec,
            plane: None,
            tile: None,
            message: message.into(),
        }
    }

    /// Attaches plane and tile coordinates to codec and size errors
    ///
    /// Other variants are returned untouched.
    pub fn at(self, plane: usize, tile: (u32, u32)) -> Self {
        match self {
            FormatError::Codec { codec, message, .. } => FormatError::Codec {
                codec,
                plane: Some(plane),
                tile: Some(tile),
                message,
            },
            FormatError::SizeMismatch { expected, actual, .. } => FormatError::SizeMismatch {
                expected,
                actual,
                plane: Some(plane),
                tile: Some(tile),
            },
            FormatError::IoError(e) if e.kind() == io::ErrorKind::InvalidData => FormatError::Codec {
                codec: "stream",
                plane: Some(plane),
                tile: Some(tile),
                message: e.to_string(),
            },
            other => other,
        }
    }
}

fn location(plane: &Option<usize>, tile: &Option<(u32, u32)>) -> String {
    match (plane, tile) {
        (Some(p), Some((row, col))) => format!(" at plane {}, tile ({}, {})", p, row, col),
        (Some(p), None) => format!(" at plane {}", p),
        _ => String::new(),
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::IoError(e) => write!(f, "I/O error: {}", e),
            FormatError::InvalidHeader => write!(f, "Invalid TIFF header"),
            FormatError::InvalidByteOrder(v) => write!(f, "Invalid byte order marker: {:#06x}", v),
            FormatError::InvalidBigTIFFHeader => write!(f, "Invalid BigTIFF header"),
            FormatError::UnsupportedVersion(v) => write!(f, "Unsupported TIFF version: {}", v),
            FormatError::TagNotFound(tag) => write!(f, "Tag not found: {}", tag),
            FormatError::UnsupportedFieldType(ft) => write!(f, "Unsupported field type: {}", ft),
            FormatError::UnsupportedCompression(c) => write!(f, "Unsupported compression method: {}", c),
            FormatError::OutOfBounds { region, size_x, size_y } => write!(
                f,
                "Tile {}x{} at ({}, {}) exceeds plane size {}x{}",
                region.width, region.height, region.x, region.y, size_x, size_y
            ),
            FormatError::InvalidPlane { plane, image_count } => {
                write!(f, "Invalid plane number {} (image count {})", plane, image_count)
            }
            FormatError::BufferTooSmall { required, actual } => {
                write!(f, "Buffer too small: need {} bytes, got {}", required, actual)
            }
            FormatError::Codec { codec, plane, tile, message } => {
                write!(f, "{} codec error{}: {}", codec, location(plane, tile), message)
            }
            FormatError::SizeMismatch { expected, actual, plane, tile } => write!(
                f,
                "Decompressed size {} does not match declared size {}{}",
                actual,
                expected,
                location(plane, tile)
            ),
            FormatError::InconsistentDimensions(msg) => write!(f, "Inconsistent dimensions: {}", msg),
            FormatError::NotInitialized => write!(f, "Reader has not been initialized with set_id"),
            FormatError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            FormatError::GenericError(msg) => write!(f, "Format error: {}", msg),
        }
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormatError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FormatError {
    fn from(error: io::Error) -> Self {
        FormatError::IoError(error)
    }
}

impl From<String> for FormatError {
    fn from(msg: String) -> Self {
        FormatError::GenericError(msg)
    }
}

/// Result type for reader, writer and codec operations
pub type FormatResult<T> = Result<T, FormatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let io = FormatError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.kind(), ErrorKind::Io);
        assert_eq!(FormatError::InvalidHeader.kind(), ErrorKind::Format);
        assert_eq!(FormatError::NotInitialized.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_codec_error_carries_coordinates() {
        let err = FormatError::codec("LZW", "bad code").at(4, (1, 2));
        let text = err.to_string();
        assert!(text.contains("plane 4"));
        assert!(text.contains("tile (1, 2)"));
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
