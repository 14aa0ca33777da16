//! TIFF writing
//!
//! Appends compressed blocks to an output stream and links IFDs into the
//! main chain. The header is written up front with an empty first-IFD
//! offset that is patched when the first IFD lands.

use log::{debug, trace};
use std::io::SeekFrom;

use crate::errors::{FormatError, FormatResult};
use crate::io::byte_order::{ByteOrder, ByteOrderHandler};
use crate::io::seekable::SeekableWriter;
use crate::tiff::constants::header;
use crate::tiff::ifd::{TagValue, IFD};

/// Next 4-byte aligned position
pub fn align_to_4_bytes(offset: u64) -> u64 {
    (offset + 3) & !3
}

/// Serializes a tag value in the given byte order
pub fn encode_value(value: &TagValue, handler: &dyn ByteOrderHandler) -> FormatResult<Vec<u8>> {
    let mut out = Vec::with_capacity(value.byte_len());
    match value {
        TagValue::Byte(v) | TagValue::Undefined(v) => out.extend_from_slice(v),
        TagValue::Ascii(s) => {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        TagValue::Short(v) => {
            for &x in v {
                handler.write_u16(&mut out, x)?;
            }
        }
        TagValue::SShort(v) => {
            for &x in v {
                handler.write_i16(&mut out, x)?;
            }
        }
        TagValue::Long(v) => {
            for &x in v {
                handler.write_u32(&mut out, x)?;
            }
        }
        TagValue::SLong(v) => {
            for &x in v {
                handler.write_i32(&mut out, x)?;
            }
        }
        TagValue::Long8(v) => {
            for &x in v {
                handler.write_u64(&mut out, x)?;
            }
        }
        TagValue::Rational(v) => {
            for &(n, d) in v {
                handler.write_u32(&mut out, n)?;
                handler.write_u32(&mut out, d)?;
            }
        }
        TagValue::SRational(v) => {
            for &(n, d) in v {
                handler.write_i32(&mut out, n)?;
                handler.write_i32(&mut out, d)?;
            }
        }
        TagValue::Float(v) => {
            for &x in v {
                handler.write_f32(&mut out, x)?;
            }
        }
        TagValue::Double(v) => {
            for &x in v {
                handler.write_f64(&mut out, x)?;
            }
        }
    }
    Ok(out)
}

/// Offset-valued tag in the width the file format allows
pub fn offsets_value(big_tiff: bool, offsets: Vec<u64>) -> FormatResult<TagValue> {
    if big_tiff {
        return Ok(TagValue::Long8(offsets));
    }
    offsets
        .into_iter()
        .map(|o| {
            u32::try_from(o)
                .map_err(|_| FormatError::Unsupported(format!("offset {} needs BigTIFF", o)))
        })
        .collect::<FormatResult<Vec<u32>>>()
        .map(TagValue::Long)
}

/// Low-level TIFF stream writer
pub struct TiffSaver<W: SeekableWriter> {
    writer: W,
    handler: Box<dyn ByteOrderHandler>,
    big_tiff: bool,
    /// Position of the link to patch when the next IFD is written
    next_link: u64,
    end: u64,
    ifd_count: usize,
}

impl<W: SeekableWriter> TiffSaver<W> {
    /// Writes the header and positions the stream for block data
    pub fn new(mut writer: W, byte_order: ByteOrder, big_tiff: bool) -> FormatResult<Self> {
        let handler = byte_order.create_handler();
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&byte_order.marker())?;
        if big_tiff {
            handler.write_u16(&mut writer, header::BIG_TIFF_VERSION)?;
            handler.write_u16(&mut writer, header::BIGTIFF_OFFSET_SIZE)?;
            handler.write_u16(&mut writer, 0)?;
            handler.write_u64(&mut writer, 0)?;
        } else {
            handler.write_u16(&mut writer, header::TIFF_VERSION)?;
            handler.write_u32(&mut writer, 0)?;
        }
        let (next_link, end) = if big_tiff {
            (8, header::BIG_TIFF_HEADER_SIZE)
        } else {
            (4, header::TIFF_HEADER_SIZE)
        };
        debug!("Wrote {} header ({})", if big_tiff { "BigTIFF" } else { "TIFF" }, byte_order.name());

        Ok(TiffSaver {
            writer,
            handler,
            big_tiff,
            next_link,
            end,
            ifd_count: 0,
        })
    }

    pub fn is_big_tiff(&self) -> bool {
        self.big_tiff
    }

    pub fn ifd_count(&self) -> usize {
        self.ifd_count
    }

    fn check_offset(&self, offset: u64) -> FormatResult<()> {
        if !self.big_tiff && offset > u32::MAX as u64 {
            return Err(FormatError::Unsupported(format!(
                "output exceeds 4 GiB at offset {}; enable BigTIFF",
                offset
            )));
        }
        Ok(())
    }

    /// Appends `data` at the next aligned position and returns its offset
    pub fn write_block(&mut self, data: &[u8]) -> FormatResult<u64> {
        let offset = align_to_4_bytes(self.end);
        self.check_offset(offset + data.len() as u64)?;
        self.writer.seek(SeekFrom::Start(self.end))?;
        self.writer.write_all(&[0u8; 3][..(offset - self.end) as usize])?;
        self.writer.write_all(data)?;
        self.end = offset + data.len() as u64;
        trace!("Wrote {} byte block at {}", data.len(), offset);
        Ok(offset)
    }

    /// Appends `ifd` and links it after the previously written IFD
    ///
    /// Values that do not fit in the entry are written just before the
    /// directory. Returns the IFD offset.
    pub fn write_ifd(&mut self, ifd: &IFD) -> FormatResult<u64> {
        let inline = if self.big_tiff { 8 } else { 4 };
        let mut encoded = Vec::with_capacity(ifd.len());
        for (&tag, value) in ifd.entries() {
            let bytes = encode_value(value, self.handler.as_ref())?;
            let external = if bytes.len() > inline {
                Some(self.write_block(&bytes)?)
            } else {
                None
            };
            encoded.push((tag, value.field_type(), value.count() as u64, bytes, external));
        }

        let mut table = Vec::new();
        let h = self.handler.as_ref();
        if self.big_tiff {
            h.write_u64(&mut table, encoded.len() as u64)?;
        } else {
            h.write_u16(&mut table, encoded.len() as u16)?;
        }
        for (tag, field_type, count, bytes, external) in &encoded {
            h.write_u16(&mut table, *tag)?;
            h.write_u16(&mut table, *field_type)?;
            if self.big_tiff {
                h.write_u64(&mut table, *count)?;
            } else {
                h.write_u32(&mut table, *count as u32)?;
            }
            match external {
                Some(offset) if self.big_tiff => h.write_u64(&mut table, *offset)?,
                Some(offset) => h.write_u32(&mut table, *offset as u32)?,
                None => {
                    let mut field = bytes.clone();
                    field.resize(inline, 0);
                    table.extend_from_slice(&field);
                }
            }
        }
        let link_position = table.len() as u64;
        if self.big_tiff {
            h.write_u64(&mut table, 0)?;
        } else {
            h.write_u32(&mut table, 0)?;
        }

        let offset = self.write_block(&table)?;
        self.patch_link(self.next_link, offset)?;
        self.next_link = offset + link_position;
        self.ifd_count += 1;
        debug!("Wrote IFD #{} with {} entries at {}", self.ifd_count - 1, encoded.len(), offset);
        Ok(offset)
    }

    fn patch_link(&mut self, position: u64, offset: u64) -> FormatResult<()> {
        self.writer.seek(SeekFrom::Start(position))?;
        if self.big_tiff {
            self.handler.write_u64(&mut self.writer, offset)?;
        } else {
            self.handler.write_u32(&mut self.writer, offset as u32)?;
        }
        self.writer.seek(SeekFrom::Start(self.end))?;
        Ok(())
    }

    /// Flushes and returns the stream
    pub fn finish(mut self) -> FormatResult<W> {
        self.writer.seek(SeekFrom::Start(self.end))?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}
