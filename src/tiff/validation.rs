//! TIFF validation utilities
//!
//! Checks that keep a malformed file from sending the parser outside the
//! stream or into unbounded allocations.

use log::{debug, error, warn};
use std::io::SeekFrom;

use crate::errors::{FormatError, FormatResult};
use crate::io::byte_order::ByteOrderHandler;
use crate::io::seekable::SeekableReader;
use crate::tiff::constants::header;

/// Validates an IFD offset to ensure it's within reasonable bounds
pub fn validate_ifd_offset(offset: u64, file_size: u64) -> FormatResult<()> {
    if offset >= file_size || offset < header::TIFF_HEADER_SIZE {
        return Err(FormatError::GenericError(format!(
            "Invalid IFD offset: {} (file size: {})",
            offset, file_size
        )));
    }

    Ok(())
}

/// Gets the stream length, restoring the current position
///
/// Returns `u64::MAX` if the size could not be determined.
pub fn get_file_size(reader: &mut dyn SeekableReader) -> FormatResult<u64> {
    let current_position = reader.stream_position()?;
    let file_size = match reader.seek(SeekFrom::End(0)) {
        Ok(size) => size,
        Err(e) => {
            warn!("Could not determine file size: {}", e);
            u64::MAX
        }
    };
    reader.seek(SeekFrom::Start(current_position))?;

    Ok(file_size)
}

/// Validates the remainder of a BigTIFF header (offset size and padding)
pub fn validate_bigtiff_header(
    reader: &mut dyn SeekableReader,
    byte_order_handler: &dyn ByteOrderHandler,
) -> FormatResult<()> {
    let offset_size = byte_order_handler.read_u16(reader)?;
    let zeros = byte_order_handler.read_u16(reader)?;

    debug!("BigTIFF offset size: {}, reserved: {}", offset_size, zeros);

    if offset_size != header::BIGTIFF_OFFSET_SIZE || zeros != 0 {
        error!("Invalid BigTIFF header: offset_size={}, zeros={}", offset_size, zeros);
        return Err(FormatError::InvalidBigTIFFHeader);
    }

    Ok(())
}

/// Checks that `offset..offset + len` lies inside a stream of `file_size` bytes
pub fn validate_range(offset: u64, len: u64, file_size: u64, what: &str) -> FormatResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= file_size => Ok(()),
        _ => Err(FormatError::GenericError(format!(
            "{} at offset {} with length {} exceeds file size {}",
            what, offset, len, file_size
        ))),
    }
}
