//! Embedded block coding for JPEG-2000 codestreams
//!
//! A code-block of wavelet coefficients is coded bit-plane by bit-plane,
//! most significant first, in significance propagation, magnitude
//! refinement and cleanup passes. Every decision goes through the MQ
//! arithmetic coder with the 19 context models of ISO/IEC 15444-1 Annex D.

/// MQ coder probability states: (Qe, next after MPS, next after LPS, swap MPS)
const MQ_STATES: [(u32, u8, u8, bool); 47] = [
    (0x5601, 1, 1, true),
    (0x3401, 2, 6, false),
    (0x1801, 3, 9, false),
    (0x0AC1, 4, 12, false),
    (0x0521, 5, 29, false),
    (0x0221, 38, 33, false),
    (0x5601, 7, 6, true),
    (0x5401, 8, 14, false),
    (0x4801, 9, 14, false),
    (0x3801, 10, 14, false),
    (0x3001, 11, 17, false),
    (0x2401, 12, 18, false),
    (0x1C01, 13, 20, false),
    (0x1601, 29, 21, false),
    (0x5601, 15, 14, true),
    (0x5401, 16, 14, false),
    (0x5101, 17, 15, false),
    (0x4801, 18, 16, false),
    (0x3801, 19, 17, false),
    (0x3401, 20, 18, false),
    (0x3001, 21, 19, false),
    (0x2801, 22, 19, false),
    (0x2401, 23, 20, false),
    (0x2201, 24, 21, false),
    (0x1C01, 25, 22, false),
    (0x1801, 26, 23, false),
    (0x1601, 27, 24, false),
    (0x1401, 28, 25, false),
    (0x1201, 29, 26, false),
    (0x1101, 30, 27, false),
    (0x0AC1, 31, 28, false),
    (0x09C1, 32, 29, false),
    (0x08A1, 33, 30, false),
    (0x0521, 34, 31, false),
    (0x0441, 35, 32, false),
    (0x02A1, 36, 33, false),
    (0x0221, 37, 34, false),
    (0x0141, 38, 35, false),
    (0x0111, 39, 36, false),
    (0x0085, 40, 37, false),
    (0x0049, 41, 38, false),
    (0x0025, 42, 39, false),
    (0x0015, 43, 40, false),
    (0x0009, 44, 41, false),
    (0x0005, 45, 42, false),
    (0x0001, 45, 43, false),
    (0x5601, 46, 46, false),
];

/// Zero coding contexts 0..=8, sign coding 9..=13, refinement 14..=16
const CONTEXTS: usize = 19;
const CTX_SIGN: usize = 9;
const CTX_REFINE: usize = 14;
const CTX_RUN: usize = 17;
const CTX_UNIFORM: usize = 18;

/// MQ arithmetic encoder with its own set of adaptive contexts
struct MqEncoder {
    a: u32,
    c: u32,
    ct: u32,
    /// `out[0]` stands for the byte before the first output byte
    out: Vec<u8>,
    state: [u8; CONTEXTS],
    mps: [u8; CONTEXTS],
}

impl MqEncoder {
    fn new() -> Self {
        let mut state = [0u8; CONTEXTS];
        state[0] = 4;
        state[CTX_RUN] = 3;
        state[CTX_UNIFORM] = 46;
        MqEncoder {
            a: 0x8000,
            c: 0,
            ct: 12,
            out: vec![0],
            state,
            mps: [0; CONTEXTS],
        }
    }

    fn encode(&mut self, cx: usize, bit: u8) {
        let (qe, next_mps, next_lps, swap) = MQ_STATES[self.state[cx] as usize];
        self.a -= qe;
        if bit == self.mps[cx] {
            if self.a & 0x8000 != 0 {
                self.c += qe;
                return;
            }
            if self.a < qe {
                self.a = qe;
            } else {
                self.c += qe;
            }
            self.state[cx] = next_mps;
        } else {
            if self.a < qe {
                self.c += qe;
            } else {
                self.a = qe;
            }
            if swap {
                self.mps[cx] ^= 1;
            }
            self.state[cx] = next_lps;
        }
        self.renormalize();
    }

    fn renormalize(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
            }
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    fn byte_out(&mut self) {
        let last = self.out.len() - 1;
        if self.out[last] == 0xFF {
            self.emit(20);
        } else if self.c & 0x800_0000 == 0 {
            self.emit(19);
        } else {
            self.out[last] += 1;
            if self.out[last] == 0xFF {
                self.c &= 0x7FF_FFFF;
                self.emit(20);
            } else {
                self.emit(19);
            }
        }
    }

    /// Moves the bits above `shift` into a new output byte; after an 0xFF
    /// byte only seven bits are taken so no marker code can appear
    fn emit(&mut self, shift: u32) {
        self.out.push((self.c >> shift) as u8);
        self.c &= (1 << shift) - 1;
        self.ct = 27 - shift;
    }

    /// Terminates the codeword and returns it
    fn flush(mut self) -> Vec<u8> {
        let upper = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= upper {
            self.c -= 0x8000;
        }
        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();
        if self.out.last() == Some(&0xFF) {
            self.out.pop();
        }
        self.out.split_off(1)
    }
}

/// Subband orientation, which selects the zero coding context table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Ll,
    /// Horizontally high-pass
    Hl,
    /// Vertically high-pass
    Lh,
    Hh,
}

/// One coded code-block
#[derive(Debug, Clone, Default)]
pub struct CodedBlock {
    pub data: Vec<u8>,
    pub passes: usize,
    /// Magnitude bit-planes up to the most significant non-zero one
    pub bit_planes: u32,
}

const SIG: u8 = 1;
const NEG: u8 = 2;
const VISITED: u8 = 4;
const REFINED: u8 = 8;

/// Coefficient states with a one-sample insignificant border
struct BlockState {
    flags: Vec<u8>,
    stride: usize,
}

impl BlockState {
    fn new(width: usize, height: usize) -> Self {
        BlockState {
            flags: vec![0; (width + 2) * (height + 2)],
            stride: width + 2,
        }
    }

    fn index(&self, x: usize, y: usize) -> usize {
        (y + 1) * self.stride + x + 1
    }

    fn sig(&self, i: usize) -> u8 {
        self.flags[i] & SIG
    }

    fn has_significant_neighbour(&self, i: usize) -> bool {
        let s = self.stride;
        [i - s - 1, i - s, i - s + 1, i - 1, i + 1, i + s - 1, i + s, i + s + 1]
            .iter()
            .any(|&n| self.flags[n] & SIG != 0)
    }

    fn zero_context(&self, i: usize, orientation: Orientation) -> usize {
        let s = self.stride;
        let h = self.sig(i - 1) + self.sig(i + 1);
        let v = self.sig(i - s) + self.sig(i + s);
        let d = self.sig(i - s - 1) + self.sig(i - s + 1) + self.sig(i + s - 1) + self.sig(i + s + 1);
        match orientation {
            Orientation::Ll | Orientation::Lh => emphasised_context(h, v, d),
            Orientation::Hl => emphasised_context(v, h, d),
            Orientation::Hh => match (d, h + v) {
                (d, _) if d >= 3 => 8,
                (2, hv) if hv >= 1 => 7,
                (2, _) => 6,
                (1, hv) if hv >= 2 => 5,
                (1, 1) => 4,
                (1, _) => 3,
                (_, hv) if hv >= 2 => 2,
                (_, 1) => 1,
                _ => 0,
            },
        }
    }

    /// -1, 0 or 1 for an insignificant, positive or negative neighbour
    fn contribution(&self, i: usize) -> i8 {
        match self.flags[i] & (SIG | NEG) {
            0 => 0,
            SIG => 1,
            _ => -1,
        }
    }

    /// Sign context and the bit the sign is XORed with
    fn sign_context(&self, i: usize) -> (usize, u8) {
        let s = self.stride;
        let h = (self.contribution(i - 1) + self.contribution(i + 1)).clamp(-1, 1);
        let v = (self.contribution(i - s) + self.contribution(i + s)).clamp(-1, 1);
        let (offset, flip) = match (h, v) {
            (1, 1) => (4, 0),
            (1, 0) => (3, 0),
            (1, _) => (2, 0),
            (0, 1) => (1, 0),
            (0, 0) => (0, 0),
            (0, _) => (1, 1),
            (_, 1) => (2, 1),
            (_, 0) => (3, 1),
            _ => (4, 1),
        };
        (CTX_SIGN + offset, flip)
    }

    fn refine_context(&self, i: usize) -> usize {
        if self.flags[i] & REFINED != 0 {
            CTX_REFINE + 2
        } else if self.has_significant_neighbour(i) {
            CTX_REFINE + 1
        } else {
            CTX_REFINE
        }
    }
}

/// Zero coding table of the LL and LH bands; HL passes `v` and `h` swapped
fn emphasised_context(h: u8, v: u8, d: u8) -> usize {
    match (h, v, d) {
        (2, _, _) => 8,
        (1, v, _) if v >= 1 => 7,
        (1, 0, d) if d >= 1 => 6,
        (1, _, _) => 5,
        (0, 2, _) => 4,
        (0, 1, _) => 3,
        (0, 0, d) if d >= 2 => 2,
        (0, 0, 1) => 1,
        _ => 0,
    }
}

struct BlockCoder<'a> {
    magnitudes: &'a [u32],
    negative: &'a [bool],
    width: usize,
    height: usize,
    orientation: Orientation,
    state: BlockState,
    mq: MqEncoder,
}

impl BlockCoder<'_> {
    fn bit(&self, x: usize, y: usize, plane: u32) -> u8 {
        ((self.magnitudes[y * self.width + x] >> plane) & 1) as u8
    }

    fn code_sign(&mut self, x: usize, y: usize) {
        let i = self.state.index(x, y);
        let (cx, flip) = self.state.sign_context(i);
        let negative = self.negative[y * self.width + x];
        self.mq.encode(cx, negative as u8 ^ flip);
        self.state.flags[i] |= SIG | if negative { NEG } else { 0 };
    }

    /// Stripes of four rows, scanned column by column
    fn scan(&self) -> impl Iterator<Item = (usize, usize)> {
        let (width, height) = (self.width, self.height);
        (0..height).step_by(4).flat_map(move |top| {
            (0..width).flat_map(move |x| (top..(top + 4).min(height)).map(move |y| (x, y)))
        })
    }

    fn significance_pass(&mut self, plane: u32) {
        let positions: Vec<_> = self.scan().collect();
        for (x, y) in positions {
            let i = self.state.index(x, y);
            if self.state.flags[i] & SIG != 0 || !self.state.has_significant_neighbour(i) {
                continue;
            }
            let cx = self.state.zero_context(i, self.orientation);
            let bit = self.bit(x, y, plane);
            self.mq.encode(cx, bit);
            if bit == 1 {
                self.code_sign(x, y);
            }
            self.state.flags[i] |= VISITED;
        }
    }

    fn refinement_pass(&mut self, plane: u32) {
        let positions: Vec<_> = self.scan().collect();
        for (x, y) in positions {
            let i = self.state.index(x, y);
            if self.state.flags[i] & (SIG | VISITED) != SIG {
                continue;
            }
            let cx = self.state.refine_context(i);
            let bit = self.bit(x, y, plane);
            self.mq.encode(cx, bit);
            self.state.flags[i] |= REFINED;
        }
    }

    fn cleanup_pass(&mut self, plane: u32) {
        for top in (0..self.height).step_by(4) {
            let rows = (self.height - top).min(4);
            for x in 0..self.width {
                let mut first = top;
                if rows == 4 && self.run_mode(x, top) {
                    match (0..4).find(|&r| self.bit(x, top + r, plane) == 1) {
                        None => {
                            self.mq.encode(CTX_RUN, 0);
                            continue;
                        }
                        Some(r) => {
                            self.mq.encode(CTX_RUN, 1);
                            self.mq.encode(CTX_UNIFORM, (r >> 1) as u8);
                            self.mq.encode(CTX_UNIFORM, (r & 1) as u8);
                            self.code_sign(x, top + r);
                            first = top + r + 1;
                        }
                    }
                }
                for y in first..top + rows {
                    let i = self.state.index(x, y);
                    if self.state.flags[i] & (SIG | VISITED) != 0 {
                        continue;
                    }
                    let cx = self.state.zero_context(i, self.orientation);
                    let bit = self.bit(x, y, plane);
                    self.mq.encode(cx, bit);
                    if bit == 1 {
                        self.code_sign(x, y);
                    }
                }
            }
        }
        for flag in &mut self.state.flags {
            *flag &= !VISITED;
        }
    }

    /// Whether a full stripe column is still entirely insignificant
    fn run_mode(&self, x: usize, top: usize) -> bool {
        (top..top + 4).all(|y| {
            let i = self.state.index(x, y);
            self.state.flags[i] & (SIG | VISITED) == 0 && !self.state.has_significant_neighbour(i)
        })
    }
}

/// Codes a `width` x `height` code-block of coefficients, stopping after
/// bit-plane `lowest_plane`; planes below it are dropped.
pub fn encode_block(
    coefficients: &[i32],
    width: usize,
    height: usize,
    orientation: Orientation,
    lowest_plane: u32,
) -> CodedBlock {
    let magnitudes: Vec<u32> = coefficients.iter().map(|c| c.unsigned_abs()).collect();
    let negative: Vec<bool> = coefficients.iter().map(|&c| c < 0).collect();
    let bit_planes = magnitudes.iter().max().map_or(0, |&m| 32 - m.leading_zeros());
    if bit_planes <= lowest_plane {
        return CodedBlock {
            data: Vec::new(),
            passes: 0,
            bit_planes,
        };
    }

    let mut coder = BlockCoder {
        magnitudes: &magnitudes,
        negative: &negative,
        width,
        height,
        orientation,
        state: BlockState::new(width, height),
        mq: MqEncoder::new(),
    };
    let top = bit_planes - 1;
    coder.cleanup_pass(top);
    let mut passes = 1;
    for plane in (lowest_plane..top).rev() {
        coder.significance_pass(plane);
        coder.refinement_pass(plane);
        coder.cleanup_pass(plane);
        passes += 3;
    }
    CodedBlock {
        data: coder.mq.flush(),
        passes,
        bit_planes,
    }
}
