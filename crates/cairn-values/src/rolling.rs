//! Content-defined chunk boundary detection.
//!
//! # Key Types
//!
//! - [`BuzHash`]: cyclic-polynomial rolling hash over a fixed byte window.
//! - [`Sloppy`]: a cheap LZ77-style estimator that folds repeated byte runs
//!   into short copy tokens, so compressible blob data yields fewer bytes to
//!   hash and therefore larger chunks.
//! - [`RollingHasher`]: per-level boundary detector used by the chunker.
//!
//! # Design Rules
//!
//! - A boundary fires when `hash & CHUNK_PATTERN == CHUNK_PATTERN`, or once a
//!   chunk has consumed [`MAX_CHUNK_BYTES`] input bytes.
//! - Every input byte is XORed with a per-level salt before hashing, so a
//!   subtree's boundaries do not echo its parent's.
//! - All state resets at each boundary; boundaries depend only on the
//!   content of the current chunk.

use crate::codec::Encoder;
use crate::sequence::Item;

/// Rolling hash window, in bytes.
pub const CHUNK_WINDOW: usize = 67;

/// Boundary mask: 12 low bits, for ~4 KiB chunks.
pub const CHUNK_PATTERN: u32 = (1 << 12) - 1;

/// Hard cap on hashed input per chunk.
pub const MAX_CHUNK_BYTES: usize = 1 << 20;

static BUZ_TABLE: [u32; 256] = build_table();

/// SplitMix64-derived random table.
const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut state: u64 = 0x243F_6A88_85A3_08D3;
    let mut i = 0;
    while i < 256 {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        table[i] = z as u32;
        i += 1;
    }
    table
}

// ---------------------------------------------------------------------------
// BuzHash
// ---------------------------------------------------------------------------

/// Rolling hash over the last `window` bytes.
#[derive(Clone, Debug)]
pub struct BuzHash {
    window: Box<[u8]>,
    pos: usize,
    filled: usize,
    state: u32,
}

impl BuzHash {
    pub fn new(window: usize) -> Self {
        Self {
            window: vec![0; window.max(1)].into_boxed_slice(),
            pos: 0,
            filled: 0,
            state: 0,
        }
    }

    /// Slide `b` into the window and return the new hash.
    pub fn roll(&mut self, b: u8) -> u32 {
        let n = self.window.len();
        let incoming = BUZ_TABLE[usize::from(b)];
        if self.filled < n {
            self.state = self.state.rotate_left(1) ^ incoming;
            self.filled += 1;
        } else {
            let outgoing = BUZ_TABLE[usize::from(self.window[self.pos])];
            self.state = self.state.rotate_left(1) ^ outgoing.rotate_left((n % 32) as u32) ^ incoming;
        }
        self.window[self.pos] = b;
        self.pos = (self.pos + 1) % n;
        self.state
    }

    pub fn sum(&self) -> u32 {
        self.state
    }

    pub fn reset(&mut self) {
        self.window.fill(0);
        self.pos = 0;
        self.filled = 0;
        self.state = 0;
    }
}

// ---------------------------------------------------------------------------
// Sloppy
// ---------------------------------------------------------------------------

const SLOPPY_TABLE_BITS: u32 = 12;
const SLOPPY_MAX_OFFSET: usize = 4095;
const SLOPPY_MAX_MATCH: usize = 64;

/// Approximates the output of an LZ77 compressor.
///
/// Literal bytes pass through. Once the last four bytes match an earlier
/// position, following bytes that keep matching are swallowed and replaced
/// by a three-byte `(offset, length)` token when the match ends.
#[derive(Clone)]
pub struct Sloppy {
    buf: Vec<u8>,
    table: Box<[u32]>,
    matching: Option<usize>,
    match_len: usize,
    match_offset: usize,
}

impl Default for Sloppy {
    fn default() -> Self {
        Self::new()
    }
}

impl Sloppy {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            table: vec![0; 1 << SLOPPY_TABLE_BITS].into_boxed_slice(),
            matching: None,
            match_len: 0,
            match_offset: 0,
        }
    }

    /// Feed one byte, calling `emit` for each estimated output byte.
    pub fn update(&mut self, b: u8, emit: &mut impl FnMut(u8)) {
        let n = self.buf.len();
        self.buf.push(b);

        if let Some(p) = self.matching {
            let continues = self.buf[p] == b;
            if continues && self.match_len < SLOPPY_MAX_MATCH {
                self.matching = Some(p + 1);
                self.match_len += 1;
                return;
            }
            self.emit_copy(emit);
            if continues {
                self.matching = Some(p + 1);
                self.match_len = 1;
                return;
            }
            self.matching = None;
        }

        emit(b);
        if n >= 3 {
            let slot = key4(&self.buf[n - 3..=n]);
            let candidate = self.table[slot] as usize;
            self.table[slot] = (n + 1) as u32;
            if candidate >= 4
                && n + 1 - candidate <= SLOPPY_MAX_OFFSET
                && self.buf[candidate - 4..candidate] == self.buf[n - 3..=n]
            {
                self.matching = Some(candidate);
                self.match_len = 0;
                self.match_offset = n + 1 - candidate;
            }
        }
    }

    fn emit_copy(&mut self, emit: &mut impl FnMut(u8)) {
        if self.match_len == 0 {
            return;
        }
        emit((self.match_offset & 0xff) as u8);
        emit((self.match_offset >> 8) as u8);
        emit(self.match_len as u8);
        self.match_len = 0;
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.table.fill(0);
        self.matching = None;
        self.match_len = 0;
        self.match_offset = 0;
    }
}

fn key4(bytes: &[u8]) -> usize {
    let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    (word.wrapping_mul(2_654_435_761) >> (32 - SLOPPY_TABLE_BITS)) as usize
}

// ---------------------------------------------------------------------------
// RollingHasher
// ---------------------------------------------------------------------------

/// Decides where one tree level's chunks end.
pub struct RollingHasher {
    buz: BuzHash,
    sloppy: Option<Sloppy>,
    salt: u8,
    crossed: bool,
    raw_bytes: usize,
    scratch: Encoder,
}

impl RollingHasher {
    /// `sloppy` enables the compression estimator (blob leaves only).
    pub fn new(level: u64, sloppy: bool) -> Self {
        Self {
            buz: BuzHash::new(CHUNK_WINDOW),
            sloppy: sloppy.then(Sloppy::new),
            salt: level as u8,
            crossed: false,
            raw_bytes: 0,
            scratch: Encoder::new(),
        }
    }

    /// Hash the encoding of one chunker item.
    pub fn hash_item(&mut self, item: &Item) {
        if let Item::Byte(b) = item {
            self.hash_bytes(&[*b]);
            return;
        }
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.write_item(item);
        self.hash_bytes(scratch.as_bytes());
        self.scratch = scratch;
    }

    pub fn hash_bytes(&mut self, bytes: &[u8]) {
        let Self {
            buz,
            sloppy,
            salt,
            crossed,
            raw_bytes,
            ..
        } = self;
        let mut roll = |b: u8| {
            if buz.roll(b ^ *salt) & CHUNK_PATTERN == CHUNK_PATTERN {
                *crossed = true;
            }
        };
        for &b in bytes {
            *raw_bytes += 1;
            match sloppy {
                Some(estimator) => estimator.update(b, &mut roll),
                None => roll(b),
            }
        }
    }

    /// True once a boundary pattern was seen or the size cap was reached
    /// since the last reset.
    pub fn crossed_boundary(&self) -> bool {
        self.crossed || self.raw_bytes >= MAX_CHUNK_BYTES
    }

    pub fn reset(&mut self) {
        self.buz.reset();
        if let Some(s) = self.sloppy.as_mut() {
            s.reset();
        }
        self.crossed = false;
        self.raw_bytes = 0;
    }
}
