//! TIFF/BigTIFF parser
//!
//! Reads the header and IFD chain of a TIFF stream, and reconstructs
//! arbitrary rectangles of a plane from its tiles or strips.

use log::{debug, info, trace, warn};
use std::collections::HashSet;
use std::io::{Cursor, SeekFrom};

use crate::compression::{CodecOptions, CompressionHandler};
use crate::errors::{FormatError, FormatResult};
use crate::io::byte_order::{ByteOrder, ByteOrderHandler};
use crate::io::seekable::SeekableReader;
use crate::pixels::{check_tile_size, PixelType, Region};
use crate::tiff::constants::{header, predictor, MAX_IFDS};
use crate::tiff::ifd::{IFDEntry, IFD};
use crate::tiff::types::TIFF;
use crate::tiff::validation;
use crate::utils::tag_utils;

/// Whether `bytes` start with a classic or BigTIFF header
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    matches!(
        bytes,
        [0x49, 0x49, 42, 0, ..] | [0x4D, 0x4D, 0, 42, ..] | [0x49, 0x49, 43, 0, ..] | [0x4D, 0x4D, 0, 43, ..]
    )
}

/// Geometry and codec of one tile or strip
struct Block {
    index: usize,
    bounds: Region,
    /// Rows stored for this block (full tile height for tiles)
    stored_rows: u32,
    row: u32,
    col: u32,
}

/// Parser over a seekable TIFF stream
///
/// The stream position is shared state, so one parser must not be used
/// from several threads at once. Open one parser per thread instead.
pub struct TiffParser<R: SeekableReader> {
    reader: R,
    handler: Box<dyn ByteOrderHandler>,
    byte_order: ByteOrder,
    is_big_tiff: bool,
    first_ifd_offset: u64,
    file_size: u64,
    /// Last decoded block, keyed by (IFD offset, block index)
    cache: Option<((u64, usize), Vec<u8>)>,
}

impl<R: SeekableReader> TiffParser<R> {
    /// Reads and validates the header
    pub fn new(mut reader: R) -> FormatResult<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let byte_order = ByteOrder::detect(&mut reader)?;
        debug!("Detected byte order: {}", byte_order.name());
        let handler = byte_order.create_handler();

        let version = handler.read_u16(&mut reader)?;
        let is_big_tiff = match version {
            header::BIG_TIFF_VERSION => {
                validation::validate_bigtiff_header(&mut reader, handler.as_ref())?;
                true
            }
            header::TIFF_VERSION => false,
            _ => return Err(FormatError::UnsupportedVersion(version)),
        };

        let first_ifd_offset = if is_big_tiff {
            handler.read_u64(&mut reader)?
        } else {
            handler.read_u32(&mut reader)? as u64
        };
        let file_size = validation::get_file_size(&mut reader)?;
        validation::validate_ifd_offset(first_ifd_offset, file_size)?;
        debug!("First IFD offset: {} (BigTIFF: {})", first_ifd_offset, is_big_tiff);

        Ok(TiffParser {
            reader,
            handler,
            byte_order,
            is_big_tiff,
            first_ifd_offset,
            file_size,
            cache: None,
        })
    }

    pub fn is_big_tiff(&self) -> bool {
        self.is_big_tiff
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Gives back the underlying stream
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads every IFD in the main chain plus their SubIFDs
    pub fn read_tiff(&mut self) -> FormatResult<TIFF> {
        let mut tiff = TIFF::new(self.is_big_tiff, self.byte_order);
        tiff.ifds = self.read_ifd_chain(self.first_ifd_offset)?;
        if tiff.ifds.is_empty() {
            return Err(FormatError::GenericError("No IFDs found in TIFF file".to_string()));
        }

        for number in 0..tiff.ifds.len() {
            let offsets = tiff.ifds[number].sub_ifds();
            if offsets.is_empty() {
                continue;
            }
            let mut children = Vec::with_capacity(offsets.len());
            for (i, offset) in offsets.into_iter().enumerate() {
                match self.read_ifd(offset, i) {
                    Ok((child, _)) => children.push(child),
                    Err(e) => {
                        warn!("Skipping SubIFD {} of IFD {}: {}", i, number, e);
                        break;
                    }
                }
            }
            tiff.sub_ifds.push((number, children));
        }

        info!("Read {} IFDs from TIFF stream", tiff.ifds.len());
        Ok(tiff)
    }

    /// Follows the IFD chain from `first_offset`
    ///
    /// A damaged link ends the chain with a warning; IFDs read before it
    /// are kept.
    fn read_ifd_chain(&mut self, first_offset: u64) -> FormatResult<Vec<IFD>> {
        let mut ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = first_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if !seen.insert(offset) {
                warn!("IFD chain loops back to offset {}, stopping", offset);
                break;
            }
            if validation::validate_ifd_offset(offset, self.file_size).is_err() {
                warn!("IFD offset {} exceeds file size {}, stopping IFD chain", offset, self.file_size);
                break;
            }
            match self.read_ifd(offset, ifds.len()) {
                Ok((ifd, next)) => {
                    trace!("IFD #{} has {} tags, next at {}", ifd.number, ifd.len(), next);
                    ifds.push(ifd);
                    offset = next;
                }
                Err(e) if ifds.is_empty() => return Err(e),
                Err(e) => {
                    warn!("Error reading IFD {}: {}", ifds.len(), e);
                    break;
                }
            }
        }

        Ok(ifds)
    }

    /// Reads one IFD, returning it with the offset of the next one
    pub fn read_ifd(&mut self, offset: u64, number: usize) -> FormatResult<(IFD, u64)> {
        self.reader.seek(SeekFrom::Start(offset))?;
        let entry_count = if self.is_big_tiff {
            self.handler.read_u64(&mut self.reader)?
        } else {
            self.handler.read_u16(&mut self.reader)? as u64
        };
        let entry_size = if self.is_big_tiff { 20 } else { 12 };
        validation::validate_range(offset, entry_count.saturating_mul(entry_size), self.file_size, "IFD")?;

        let mut raw = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            raw.push(self.read_ifd_entry()?);
        }
        let next = if self.is_big_tiff {
            self.handler.read_u64(&mut self.reader)?
        } else {
            self.handler.read_u32(&mut self.reader)? as u64
        };

        let mut ifd = IFD::new(number, offset, self.byte_order.is_little_endian());
        for entry in raw {
            if !entry.is_value_inline(self.is_big_tiff) {
                let len = entry.count.saturating_mul(entry.get_field_type_size() as u64);
                if validation::validate_range(entry.value_offset, len, self.file_size, "Tag value").is_err() {
                    warn!("Skipping tag {} with out-of-range value", entry.tag);
                    continue;
                }
            }
            match tag_utils::resolve_tag_value(&mut self.reader, &entry, self.handler.as_ref(), self.is_big_tiff) {
                Ok(value) => ifd.set(entry.tag, value),
                Err(FormatError::UnsupportedFieldType(t)) => {
                    debug!("Skipping tag {} with unsupported field type {}", entry.tag, t)
                }
                Err(e) => return Err(e),
            }
        }

        debug!("Read IFD #{} with {} entries", number, ifd.len());
        Ok((ifd, next))
    }

    /// Reads a single raw IFD entry
    fn read_ifd_entry(&mut self) -> FormatResult<IFDEntry> {
        let tag = self.handler.read_u16(&mut self.reader)?;
        let field_type = self.handler.read_u16(&mut self.reader)?;
        let count = if self.is_big_tiff {
            self.handler.read_u64(&mut self.reader)?
        } else {
            self.handler.read_u32(&mut self.reader)? as u64
        };

        let mut value_bytes = [0u8; 8];
        let width = if self.is_big_tiff { 8 } else { 4 };
        self.reader.read_exact(&mut value_bytes[..width])?;
        let mut cursor = Cursor::new(&value_bytes[..width]);
        let value_offset = if self.is_big_tiff {
            self.handler.read_u64(&mut cursor)?
        } else {
            self.handler.read_u32(&mut cursor)? as u64
        };

        Ok(IFDEntry::new(tag, field_type, count, value_offset, value_bytes))
    }

    /// Reads the stored (still compressed) bytes of one tile or strip
    pub fn read_raw_block(&mut self, ifd: &IFD, index: usize) -> FormatResult<Vec<u8>> {
        let offsets = ifd.block_offsets()?;
        let counts = ifd.block_byte_counts()?;
        let (offset, count) = match (offsets.get(index), counts.get(index)) {
            (Some(&o), Some(&c)) => (o, c),
            _ => {
                return Err(FormatError::GenericError(format!(
                    "Block {} missing from IFD #{} ({} offsets)",
                    index,
                    ifd.number,
                    offsets.len()
                )))
            }
        };
        if offset == 0 || count == 0 {
            return Ok(Vec::new());
        }
        validation::validate_range(offset, count, self.file_size, "Block")?;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; count as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    fn block(&self, ifd: &IFD, sample: usize, row: u32, col: u32) -> FormatResult<Block> {
        let (bw, bh) = ifd.block_size()?;
        let (across, down) = ifd.block_grid()?;
        let width = ifd.image_width()?;
        let height = ifd.image_length()?;
        let x = col * bw;
        let y = row * bh;
        let bounds = Region::new(x, y, bw.min(width - x), bh.min(height - y));
        let stored_rows = if ifd.is_tiled() { bh } else { bounds.height };
        Ok(Block {
            index: sample * (across * down) as usize + (row * across + col) as usize,
            bounds,
            stored_rows,
            row,
            col,
        })
    }

    /// Decompresses one block and undoes any predictor
    ///
    /// The result holds `stored_rows` rows of the full block width.
    fn decode_block(
        &mut self,
        ifd: &IFD,
        block: &Block,
        codec: &dyn CompressionHandler,
        plane: usize,
    ) -> FormatResult<Vec<u8>> {
        let key = (ifd.offset, block.index);
        if let Some((cached, data)) = &self.cache {
            if *cached == key {
                return Ok(data.clone());
            }
        }

        let pixel_type = ifd.pixel_type()?;
        let spp = if ifd.is_chunky() { ifd.samples_per_pixel() } else { 1 };
        let (bw, _) = ifd.block_size()?;
        let bits = ifd.bits_per_sample()?;
        let options = CodecOptions::new(bw, block.stored_rows)
            .with_bits(bits)
            .with_channels(spp, true)
            .with_little_endian(ifd.little_endian)
            .with_signed(pixel_type.is_signed() && !pixel_type.is_floating_point());
        let sample_bytes = pixel_type.bytes_per_pixel();
        let unpacked_len = bw as usize * block.stored_rows as usize * spp as usize * sample_bytes;
        let stored_len = if bits == 1 {
            (bw as usize * spp as usize).div_ceil(8) * block.stored_rows as usize
        } else {
            unpacked_len
        };

        let raw = self.read_raw_block(ifd, block.index)?;
        let mut data = if raw.is_empty() {
            vec![0u8; stored_len]
        } else {
            codec
                .decompress(&raw, &options)
                .map_err(|e| e.at(plane, (block.row, block.col)))?
        };

        if data.len() != stored_len {
            let full_len = stored_len / block.stored_rows.max(1) as usize * ifd.block_size()?.1 as usize;
            if ifd.is_tiled() || data.len() != full_len {
                return Err(FormatError::SizeMismatch {
                    expected: stored_len,
                    actual: data.len(),
                    plane: Some(plane),
                    tile: Some((block.row, block.col)),
                });
            }
            // padded final strip
            data.truncate(stored_len);
        }

        if bits == 1 {
            data = unpack_bits(&data, bw as usize * spp as usize, block.stored_rows as usize);
        } else if ifd.predictor() == predictor::HORIZONTAL_DIFFERENCING {
            undo_horizontal_predictor(&mut data, bw as usize, spp as usize, pixel_type, ifd.little_endian);
        }

        self.cache = Some((key, data.clone()));
        Ok(data)
    }

    /// Fills `out` with the samples of `region`
    ///
    /// Chunky images produce row-major interleaved samples; planar images
    /// produce one region-sized plane per sample. `plane` is only used to
    /// annotate errors.
    pub fn get_samples(&mut self, ifd: &IFD, region: &Region, out: &mut [u8], plane: usize) -> FormatResult<()> {
        let width = ifd.image_width()?;
        let height = ifd.image_length()?;
        check_tile_size(region, width, height)?;

        let pixel_type = ifd.pixel_type()?;
        let spp = ifd.samples_per_pixel() as usize;
        let sample_bytes = pixel_type.bytes_per_pixel();
        let required = region.area() * spp * sample_bytes;
        if out.len() < required {
            return Err(FormatError::BufferTooSmall { required, actual: out.len() });
        }
        if region.is_empty() {
            return Ok(());
        }

        let codec = ifd.compression()?.handler();
        let chunky = ifd.is_chunky();
        let (pixel_bytes, sample_planes) = if chunky {
            (spp * sample_bytes, 1)
        } else {
            (sample_bytes, spp)
        };
        let (bw, bh) = ifd.block_size()?;
        let first_row = region.y / bh;
        let last_row = ((region.end_y() - 1) / bh as u64) as u32;
        let first_col = region.x / bw;
        let last_col = ((region.end_x() - 1) / bw as u64) as u32;

        for sample in 0..sample_planes {
            let plane_base = sample * region.area() * pixel_bytes;
            for row in first_row..=last_row {
                for col in first_col..=last_col {
                    let block = self.block(ifd, sample, row, col)?;
                    let overlap = match block.bounds.intersection(region) {
                        Some(r) => r,
                        None => continue,
                    };
                    let data = self.decode_block(ifd, &block, codec.as_ref(), plane)?;
                    let row_bytes = overlap.width as usize * pixel_bytes;
                    for y in overlap.y..overlap.y + overlap.height {
                        let src = ((y - block.bounds.y) as usize * bw as usize
                            + (overlap.x - block.bounds.x) as usize)
                            * pixel_bytes;
                        let dst = plane_base
                            + ((y - region.y) as usize * region.width as usize + (overlap.x - region.x) as usize)
                                * pixel_bytes;
                        out[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Expands 1-bit packed rows into one byte per sample
fn unpack_bits(data: &[u8], samples_per_row: usize, rows: usize) -> Vec<u8> {
    let row_bytes = samples_per_row.div_ceil(8);
    let mut out = Vec::with_capacity(samples_per_row * rows);
    for r in 0..rows {
        for s in 0..samples_per_row {
            let byte = data[r * row_bytes + s / 8];
            out.push((byte >> (7 - (s % 8))) & 1);
        }
    }
    out
}

/// Reverses TIFF horizontal differencing in place
fn undo_horizontal_predictor(data: &mut [u8], width: usize, spp: usize, pixel_type: PixelType, little: bool) {
    let bytes = pixel_type.bytes_per_pixel();
    let row_len = width * spp * bytes;
    if row_len == 0 {
        return;
    }
    for row in data.chunks_mut(row_len) {
        let samples = row.len() / bytes;
        for i in spp..samples {
            match bytes {
                1 => row[i] = row[i].wrapping_add(row[i - spp]),
                2 => {
                    let read = |b: &[u8]| if little { u16::from_le_bytes([b[0], b[1]]) } else { u16::from_be_bytes([b[0], b[1]]) };
                    let v = read(&row[i * 2..]).wrapping_add(read(&row[(i - spp) * 2..]));
                    let out = if little { v.to_le_bytes() } else { v.to_be_bytes() };
                    row[i * 2..i * 2 + 2].copy_from_slice(&out);
                }
                4 => {
                    let read = |b: &[u8]| {
                        let a = [b[0], b[1], b[2], b[3]];
                        if little { u32::from_le_bytes(a) } else { u32::from_be_bytes(a) }
                    };
                    let v = read(&row[i * 4..]).wrapping_add(read(&row[(i - spp) * 4..]));
                    let out = if little { v.to_le_bytes() } else { v.to_be_bytes() };
                    row[i * 4..i * 4 + 4].copy_from_slice(&out);
                }
                _ => {}
            }
        }
    }
}
