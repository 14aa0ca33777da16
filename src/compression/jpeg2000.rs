//! JPEG-2000 codestreams for the JPEG_2000 and JPEG_2000_LOSSY compression types
//!
//! Every block is coded as an ISO/IEC 15444-1 codestream with a single
//! tile, the reversible 5/3 wavelet, 64x64 code-blocks and one quality
//! layer in LRCP order. The lossy type keeps the same transform and drops
//! the lowest magnitude bit-planes, more of them at lower quality.
//! Decoding goes through OpenJPEG (the `jpeg2k` crate), so codestreams
//! written by other encoders read back as well.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian, WriteBytesExt};
use log::trace;

use crate::errors::{FormatError, FormatResult};
use super::ebcot::{self, CodedBlock, Orientation};
use super::handler::{deinterleave, interleave, CodecOptions, CompressionHandler};

const SOC: u16 = 0xFF4F;
const SIZ: u16 = 0xFF51;
const COD: u16 = 0xFF52;
const QCD: u16 = 0xFF5C;
const SOT: u16 = 0xFF90;
const SOD: u16 = 0xFF93;
const EOC: u16 = 0xFFD9;

const MAX_LEVELS: u32 = 5;
/// Code-block edge, stored in COD as log2 minus two
const CODE_BLOCK_LOG2: u32 = 6;
const GUARD_BITS: u32 = 2;

/// JPEG-2000 handler
///
/// `lossless` selects between compression codes 33003 and 33004.
pub struct Jpeg2000Handler {
    lossless: bool,
}

impl Jpeg2000Handler {
    pub fn lossless() -> Self {
        Jpeg2000Handler { lossless: true }
    }

    pub fn lossy() -> Self {
        Jpeg2000Handler { lossless: false }
    }

    /// Lowest bit-plane kept for a component of `precision` bits
    fn lowest_plane(&self, options: &CodecOptions) -> u32 {
        if self.lossless {
            0
        } else {
            1 + ((1.0 - options.quality) * options.bits_per_sample as f32 / 2.0) as u32
        }
    }
}

/// A subband of one resolution level, in tile-component coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
struct Band {
    x0: usize,
    y0: usize,
    width: usize,
    height: usize,
    orientation: Orientation,
}

impl Band {
    fn gain(&self) -> u32 {
        match self.orientation {
            Orientation::Ll => 0,
            Orientation::Hl | Orientation::Lh => 1,
            Orientation::Hh => 2,
        }
    }

    fn blocks_across(&self) -> usize {
        self.width.div_ceil(1 << CODE_BLOCK_LOG2)
    }

    fn blocks_down(&self) -> usize {
        self.height.div_ceil(1 << CODE_BLOCK_LOG2)
    }
}

/// Number of wavelet decompositions for a `width` x `height` block
fn decomposition_levels(width: usize, height: usize) -> u32 {
    let smallest = width.min(height).max(1);
    (usize::BITS - 1 - smallest.leading_zeros()).min(MAX_LEVELS)
}

/// Subbands of resolution `r`: the lowest LL for 0, then HL, LH and HH
fn resolution_bands(width: usize, height: usize, levels: u32, r: u32) -> Vec<Band> {
    let scaled = |n: usize, level: u32| n.div_ceil(1 << level);
    if r == 0 {
        return vec![Band {
            x0: 0,
            y0: 0,
            width: scaled(width, levels),
            height: scaled(height, levels),
            orientation: Orientation::Ll,
        }];
    }
    let level = levels + 1 - r;
    let (low_w, low_h) = (scaled(width, level), scaled(height, level));
    let (full_w, full_h) = (scaled(width, level - 1), scaled(height, level - 1));
    vec![
        Band { x0: low_w, y0: 0, width: full_w - low_w, height: low_h, orientation: Orientation::Hl },
        Band { x0: 0, y0: low_h, width: low_w, height: full_h - low_h, orientation: Orientation::Lh },
        Band { x0: low_w, y0: low_h, width: full_w - low_w, height: full_h - low_h, orientation: Orientation::Hh },
    ]
}

/// Right even neighbour of odd sample `i`
#[inline]
fn even_right(s: &[i32], i: usize) -> i32 {
    if i + 1 < s.len() {
        s[i + 1]
    } else {
        s[i]
    }
}

/// Odd neighbours of even sample `i`
#[inline]
fn odd_pair(d: &[i32], i: usize) -> (i32, i32) {
    let left = if i > 0 { d[i - 1] } else { d[0] };
    let right = if i < d.len() { d[i] } else { d[d.len() - 1] };
    (left, right)
}

/// Reversible LeGall 5/3 lifting of one line, stored as `[low..., high...]`
fn forward_53(line: &mut [i32]) {
    if line.len() < 2 {
        return;
    }
    let mut s: Vec<i32> = line.iter().step_by(2).copied().collect();
    let mut d: Vec<i32> = line.iter().skip(1).step_by(2).copied().collect();
    for i in 0..d.len() {
        d[i] -= (s[i] + even_right(&s, i)).div_euclid(2);
    }
    for i in 0..s.len() {
        let (l, r) = odd_pair(&d, i);
        s[i] += (l + r + 2).div_euclid(4);
    }
    line[..s.len()].copy_from_slice(&s);
    line[s.len()..].copy_from_slice(&d);
}

/// Multi-level 2D transform in place; columns first, then rows, at each level
fn forward_dwt(plane: &mut [i32], width: usize, height: usize, levels: u32) {
    let (mut w, mut h) = (width, height);
    let mut column = Vec::with_capacity(height);
    for _ in 0..levels {
        for x in 0..w {
            column.clear();
            column.extend((0..h).map(|y| plane[y * width + x]));
            forward_53(&mut column);
            for (y, v) in column.iter().enumerate() {
                plane[y * width + x] = *v;
            }
        }
        for y in 0..h {
            forward_53(&mut plane[y * width..y * width + w]);
        }
        w = w.div_ceil(2);
        h = h.div_ceil(2);
    }
}

/// Sample value with the unsigned range shifted to be centred on zero
fn read_sample(bytes: &[u8], options: &CodecOptions) -> i32 {
    match (options.bytes_per_sample(), options.signed) {
        (1, false) => bytes[0] as i32 - 128,
        (1, true) => bytes[0] as i8 as i32,
        (_, false) if options.little_endian => LittleEndian::read_u16(bytes) as i32 - 32768,
        (_, false) => BigEndian::read_u16(bytes) as i32 - 32768,
        (_, true) if options.little_endian => LittleEndian::read_i16(bytes) as i32,
        (_, true) => BigEndian::read_i16(bytes) as i32,
    }
}

/// Stores a decoded sample, clamped to the range of its type
fn write_sample(bytes: &mut [u8], value: i32, options: &CodecOptions) {
    let bits = options.bits_per_sample as u32;
    let (lo, hi) = if options.signed {
        (-(1i32 << (bits - 1)), (1i32 << (bits - 1)) - 1)
    } else {
        (0, (1i32 << bits) - 1)
    };
    let value = value.clamp(lo, hi);
    match options.bytes_per_sample() {
        1 => bytes[0] = value as u8,
        _ if options.little_endian => LittleEndian::write_u16(bytes, value as u16),
        _ => BigEndian::write_u16(bytes, value as u16),
    }
}

/// Packet header bit writer; a byte after 0xFF carries only seven bits
struct BitWriter {
    buf: u32,
    ct: u32,
    out: Vec<u8>,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter { buf: 0, ct: 8, out: Vec::new() }
    }

    fn put_bit(&mut self, bit: u32) {
        if self.ct == 0 {
            self.byte_out();
        }
        self.ct -= 1;
        self.buf |= bit << self.ct;
    }

    fn put(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.put_bit((value >> i) & 1);
        }
    }

    fn byte_out(&mut self) {
        self.buf = (self.buf << 8) & 0xFFFF;
        self.ct = if self.buf == 0xFF00 { 7 } else { 8 };
        self.out.push((self.buf >> 8) as u8);
    }

    fn finish(mut self) -> Vec<u8> {
        self.byte_out();
        if self.ct == 7 {
            self.byte_out();
        }
        self.out
    }
}

#[derive(Debug, Clone)]
struct TagNode {
    parent: Option<usize>,
    value: u32,
    low: u32,
    known: bool,
}

/// Quad-tree coding of one value per code-block
struct TagTree {
    nodes: Vec<TagNode>,
}

impl TagTree {
    /// Leaves come first in raster order, then each coarser level
    fn new(across: usize, down: usize) -> Self {
        let mut levels = vec![(across, down)];
        while levels[levels.len() - 1].0 * levels[levels.len() - 1].1 > 1 {
            let (w, h) = levels[levels.len() - 1];
            levels.push((w.div_ceil(2), h.div_ceil(2)));
        }
        let mut nodes = Vec::new();
        let mut start = 0;
        for (level, &(w, h)) in levels.iter().enumerate() {
            let parent_start = start + w * h;
            for y in 0..h {
                for x in 0..w {
                    let parent = levels
                        .get(level + 1)
                        .map(|&(pw, _)| parent_start + (y / 2) * pw + x / 2);
                    nodes.push(TagNode { parent, value: u32::MAX, low: 0, known: false });
                }
            }
            start = parent_start;
        }
        TagTree { nodes }
    }

    fn set_value(&mut self, leaf: usize, value: u32) {
        let mut node = Some(leaf);
        while let Some(i) = node {
            if self.nodes[i].value <= value {
                break;
            }
            self.nodes[i].value = value;
            node = self.nodes[i].parent;
        }
    }

    /// Writes what the decoder still needs to learn whether the leaf
    /// value is below `threshold`
    fn encode(&mut self, bits: &mut BitWriter, leaf: usize, threshold: u32) {
        let mut path = vec![leaf];
        while let Some(parent) = self.nodes[path[path.len() - 1]].parent {
            path.push(parent);
        }
        let mut low = 0;
        for &i in path.iter().rev() {
            let node = &mut self.nodes[i];
            if low > node.low {
                node.low = low;
            } else {
                low = node.low;
            }
            while low < threshold {
                if low >= node.value {
                    if !node.known {
                        bits.put_bit(1);
                        node.known = true;
                    }
                    break;
                }
                bits.put_bit(0);
                low += 1;
            }
            node.low = low;
        }
    }
}

fn floor_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - 1 - n.leading_zeros()
    }
}

fn put_pass_count(bits: &mut BitWriter, passes: usize) {
    let n = passes as u32;
    match passes {
        1 => bits.put(0, 1),
        2 => bits.put(0b10, 2),
        3..=5 => bits.put(0xC | (n - 3), 4),
        6..=36 => bits.put(0x1E0 | (n - 6), 9),
        _ => bits.put(0xFF80 | (n - 37), 16),
    }
}

/// Code-blocks of one subband of one component
struct CodedBand {
    across: usize,
    down: usize,
    /// Magnitude bit-planes the band can hold
    max_planes: u32,
    blocks: Vec<CodedBlock>,
}

fn code_band(plane: &[i32], stride: usize, band: &Band, precision: u32, lowest_plane: u32) -> CodedBand {
    let edge = 1 << CODE_BLOCK_LOG2;
    let (across, down) = (band.blocks_across(), band.blocks_down());
    let mut blocks = Vec::with_capacity(across * down);
    for by in 0..down {
        for bx in 0..across {
            let (x0, y0) = (bx * edge, by * edge);
            let w = edge.min(band.width - x0);
            let h = edge.min(band.height - y0);
            let mut coefficients = Vec::with_capacity(w * h);
            for y in band.y0 + y0..band.y0 + y0 + h {
                let row = y * stride + band.x0 + x0;
                coefficients.extend_from_slice(&plane[row..row + w]);
            }
            blocks.push(ebcot::encode_block(&coefficients, w, h, band.orientation, lowest_plane));
        }
    }
    CodedBand {
        across,
        down,
        max_planes: GUARD_BITS + precision + band.gain() - 1,
        blocks,
    }
}

/// Appends one packet: the header, then the code-block contributions
fn write_packet(out: &mut Vec<u8>, bands: &[CodedBand]) {
    let mut bits = BitWriter::new();
    let included = |block: &CodedBlock| block.passes > 0;
    if !bands.iter().flat_map(|b| &b.blocks).any(included) {
        bits.put_bit(0);
        out.extend(bits.finish());
        return;
    }
    bits.put_bit(1);
    for band in bands.iter().filter(|b| !b.blocks.is_empty()) {
        let mut inclusion = TagTree::new(band.across, band.down);
        let mut zero_planes = TagTree::new(band.across, band.down);
        for (i, block) in band.blocks.iter().enumerate() {
            if included(block) {
                inclusion.set_value(i, 0);
            }
            zero_planes.set_value(i, band.max_planes.saturating_sub(block.bit_planes));
        }
        for (i, block) in band.blocks.iter().enumerate() {
            inclusion.encode(&mut bits, i, 1);
            if !included(block) {
                continue;
            }
            zero_planes.encode(&mut bits, i, u32::MAX);
            put_pass_count(&mut bits, block.passes);
            let pass_bits = floor_log2(block.passes);
            let increment = (floor_log2(block.data.len()) + 1).saturating_sub(3 + pass_bits);
            for _ in 0..increment {
                bits.put_bit(1);
            }
            bits.put_bit(0);
            bits.put(block.data.len() as u32, 3 + increment + pass_bits);
        }
    }
    out.extend(bits.finish());
    for block in bands.iter().flat_map(|b| &b.blocks) {
        out.extend_from_slice(&block.data);
    }
}

fn write_main_header(out: &mut Vec<u8>, options: &CodecOptions, levels: u32) -> std::io::Result<()> {
    let precision = options.bits_per_sample as u32;
    let components = options.channels;
    out.write_u16::<BigEndian>(SOC)?;

    out.write_u16::<BigEndian>(SIZ)?;
    out.write_u16::<BigEndian>(38 + 3 * components)?;
    out.write_u16::<BigEndian>(0)?;
    for value in [options.width, options.height, 0, 0, options.width, options.height, 0, 0] {
        out.write_u32::<BigEndian>(value)?;
    }
    out.write_u16::<BigEndian>(components)?;
    for _ in 0..components {
        out.write_u8((options.signed as u8) << 7 | (precision - 1) as u8)?;
        out.write_u8(1)?;
        out.write_u8(1)?;
    }

    out.write_u16::<BigEndian>(COD)?;
    out.write_u16::<BigEndian>(12)?;
    out.write_u8(0)?;
    out.write_u8(0)?;
    out.write_u16::<BigEndian>(1)?;
    out.write_u8(0)?;
    out.write_u8(levels as u8)?;
    out.write_u8((CODE_BLOCK_LOG2 - 2) as u8)?;
    out.write_u8((CODE_BLOCK_LOG2 - 2) as u8)?;
    out.write_u8(0)?;
    out.write_u8(1)?;

    // Reversible bands carry only their exponent: precision plus band gain
    out.write_u16::<BigEndian>(QCD)?;
    out.write_u16::<BigEndian>(4 + 3 * levels as u16)?;
    out.write_u8((GUARD_BITS << 5) as u8)?;
    out.write_u8((precision << 3) as u8)?;
    for _ in 0..levels {
        for gain in [1, 1, 2] {
            out.write_u8(((precision + gain) << 3) as u8)?;
        }
    }
    Ok(())
}

impl CompressionHandler for Jpeg2000Handler {
    fn compress(&self, data: &[u8], options: &CodecOptions) -> FormatResult<Vec<u8>> {
        options.check_len(data.len())?;
        if data.is_empty() {
            return Err(FormatError::codec(self.name(), "empty block"));
        }
        if !matches!(options.bits_per_sample, 8 | 16) {
            return Err(FormatError::codec(
                self.name(),
                format!("{}-bit samples cannot be coded, only 8 or 16", options.bits_per_sample),
            ));
        }
        let sample_bytes = options.bytes_per_sample();
        let planar = if options.interleaved {
            deinterleave(data, options.channels as usize, sample_bytes)
        } else {
            data.to_vec()
        };
        let width = options.width as usize;
        let height = options.height as usize;
        let precision = options.bits_per_sample as u32;
        let levels = decomposition_levels(width, height);
        let lowest_plane = self.lowest_plane(options);

        let coded: Vec<Vec<Vec<CodedBand>>> = planar
            .chunks(width * height * sample_bytes)
            .map(|component| {
                let mut plane: Vec<i32> = component
                    .chunks(sample_bytes)
                    .map(|bytes| read_sample(bytes, options))
                    .collect();
                forward_dwt(&mut plane, width, height, levels);
                (0..=levels)
                    .map(|r| {
                        resolution_bands(width, height, levels, r)
                            .iter()
                            .map(|band| code_band(&plane, width, band, precision, lowest_plane))
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut packets = Vec::new();
        for r in 0..=levels as usize {
            for component in &coded {
                write_packet(&mut packets, &component[r]);
            }
        }

        let mut out = Vec::with_capacity(packets.len() + 128);
        write_main_header(&mut out, options, levels)?;
        out.write_u16::<BigEndian>(SOT)?;
        out.write_u16::<BigEndian>(10)?;
        out.write_u16::<BigEndian>(0)?;
        out.write_u32::<BigEndian>((12 + 2 + packets.len()) as u32)?;
        out.write_u8(0)?;
        out.write_u8(1)?;
        out.write_u16::<BigEndian>(SOD)?;
        out.extend_from_slice(&packets);
        out.write_u16::<BigEndian>(EOC)?;
        trace!("{} coded {} bytes into {}", self.name(), data.len(), out.len());
        Ok(out)
    }

    fn decompress(&self, data: &[u8], options: &CodecOptions) -> FormatResult<Vec<u8>> {
        let image = jpeg2k::Image::from_bytes(data).map_err(|e| FormatError::codec(self.name(), e.to_string()))?;
        let components = image.components();
        let pixels = image.width() as usize * image.height() as usize;
        let sample_bytes = options.bytes_per_sample();
        let actual = pixels * components.len() * sample_bytes;
        if actual != options.block_size() {
            return Err(FormatError::SizeMismatch {
                expected: options.block_size(),
                actual,
                plane: None,
                tile: None,
            });
        }
        if actual == 0 {
            return Err(FormatError::codec(self.name(), "empty block"));
        }

        let mut planar = vec![0u8; actual];
        for (component, out) in components.iter().zip(planar.chunks_mut(pixels * sample_bytes)) {
            let values = component.data();
            if values.len() != pixels {
                return Err(FormatError::codec(self.name(), "component is subsampled"));
            }
            for (chunk, &value) in out.chunks_mut(sample_bytes).zip(values) {
                write_sample(chunk, value, options);
            }
        }
        if options.interleaved {
            Ok(interleave(&planar, options.channels as usize, sample_bytes))
        } else {
            Ok(planar)
        }
    }

    fn name(&self) -> &'static str {
        if self.lossless {
            "JPEG_2000"
        } else {
            "JPEG_2000_LOSSY"
        }
    }

    fn code(&self) -> u64 {
        if self.lossless {
            33003
        } else {
            33004
        }
    }

    fn is_lossless(&self) -> bool {
        self.lossless
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(options: &CodecOptions) -> Vec<u8> {
        (0..options.block_size()).map(|i| ((i * 31) % 251) as u8).collect()
    }

    #[test]
    fn test_codestream_markers() {
        let options = CodecOptions::new(16, 16);
        let compressed = Jpeg2000Handler::lossless().compress(&gradient(&options), &options).unwrap();
        assert_eq!(&compressed[..4], &[0xFF, 0x4F, 0xFF, 0x51]);
        assert_eq!(&compressed[compressed.len() - 2..], &[0xFF, 0xD9]);
        assert_eq!(BigEndian::read_u32(&compressed[8..]), 16);
        assert_eq!(BigEndian::read_u32(&compressed[12..]), 16);
    }

    #[test]
    fn test_lossless_round_trip_layouts() {
        for bits in [8u16, 16] {
            for (channels, interleaved) in [(1u16, false), (3, true), (3, false)] {
                for (width, height) in [(19, 7), (70, 66), (1, 5)] {
                    let options = CodecOptions::new(width, height)
                        .with_bits(bits)
                        .with_channels(channels, interleaved)
                        .with_little_endian(bits == 8);
                    let data = gradient(&options);
                    let handler = Jpeg2000Handler::lossless();
                    let compressed = handler.compress(&data, &options).unwrap();
                    assert_eq!(handler.decompress(&compressed, &options).unwrap(), data, "{}x{} {} bits", width, height, bits);
                }
            }
        }
    }

    #[test]
    fn test_signed_round_trip() {
        let options = CodecOptions::new(8, 8).with_bits(16).with_signed(true);
        let data: Vec<u8> = (0..128).map(|i| if i % 2 == 0 { 0xF0 } else { 0x80 }).collect();
        let handler = Jpeg2000Handler::lossless();
        let compressed = handler.compress(&data, &options).unwrap();
        assert_eq!(handler.decompress(&compressed, &options).unwrap(), data);
    }

    #[test]
    fn test_flat_block_round_trip() {
        let options = CodecOptions::new(32, 32);
        let handler = Jpeg2000Handler::lossless();
        for value in [0u8, 128, 255] {
            let data = vec![value; options.block_size()];
            let compressed = handler.compress(&data, &options).unwrap();
            assert_eq!(handler.decompress(&compressed, &options).unwrap(), data);
        }
    }

    #[test]
    fn test_lossy_preserves_length() {
        let options = CodecOptions::new(64, 48).with_bits(16).with_quality(0.2);
        let data = gradient(&options);
        let handler = Jpeg2000Handler::lossy();
        let compressed = handler.compress(&data, &options).unwrap();
        assert!(compressed.len() < Jpeg2000Handler::lossless().compress(&data, &options).unwrap().len());
        assert_eq!(handler.decompress(&compressed, &options).unwrap().len(), data.len());
    }

    #[test]
    fn test_wide_samples_are_rejected() {
        let options = CodecOptions::new(4, 4).with_bits(32);
        let err = Jpeg2000Handler::lossless().compress(&[0u8; 64], &options).unwrap_err();
        assert!(matches!(err, FormatError::Codec { .. }));
    }

    #[test]
    fn test_corrupt_stream_is_a_codec_error() {
        let options = CodecOptions::new(4, 4);
        let handler = Jpeg2000Handler::lossless();
        let mut compressed = handler.compress(&[7u8; 16], &options).unwrap();
        compressed.truncate(12);
        assert!(matches!(
            handler.decompress(&compressed, &options),
            Err(FormatError::Codec { .. })
        ));
        assert!(handler.decompress(&[0u8; 4], &options).is_err());
    }

    #[test]
    fn test_geometry_mismatch_is_reported() {
        let handler = Jpeg2000Handler::lossless();
        let compressed = handler.compress(&[1u8; 16], &CodecOptions::new(4, 4)).unwrap();
        assert!(matches!(
            handler.decompress(&compressed, &CodecOptions::new(4, 5)),
            Err(FormatError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_band_layout() {
        assert_eq!(decomposition_levels(70, 66), 5);
        assert_eq!(decomposition_levels(19, 7), 2);
        assert_eq!(decomposition_levels(1, 5), 0);
        let bands = resolution_bands(19, 7, 2, 2);
        assert_eq!((bands[0].x0, bands[0].width, bands[0].height), (10, 9, 4));
        assert_eq!((bands[1].y0, bands[1].width, bands[1].height), (4, 10, 3));
        assert_eq!(bands[2].orientation, Orientation::Hh);
        assert_eq!(resolution_bands(19, 7, 2, 0)[0].width, 5);
    }

    #[test]
    fn test_header_bits_are_stuffed_after_ff() {
        let mut bits = BitWriter::new();
        bits.put(0xFF, 8);
        bits.put(0x7F, 7);
        bits.put(1, 1);
        assert_eq!(bits.finish(), vec![0xFF, 0x7F, 0x80]);
    }

    #[test]
    fn test_tag_tree_codes_minimum_once() {
        let mut tree = TagTree::new(2, 1);
        tree.set_value(0, 1);
        tree.set_value(1, 2);
        let mut bits = BitWriter::new();
        tree.encode(&mut bits, 0, u32::MAX);
        tree.encode(&mut bits, 1, u32::MAX);
        // root: 0 then 1; leaf 0 known at once: 1; leaf 1: 0 then 1
        assert_eq!(bits.finish(), vec![0b0110_1000]);
    }
}
