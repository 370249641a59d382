//! Resumable primitive reads.
//!
//! All integers are big-endian. An unsigned vint is 1-9 bytes: the number of
//! leading one bits in the first byte gives the number of continuation
//! bytes, and the remaining bits of the first byte followed by the
//! continuation bytes form the value, most significant first.

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, Bytes};

/// Outcome of a primitive read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The value is complete and stored in the corresponding slot.
    Ready,
    /// The chunk ran out mid-primitive. The prestate remembers how far the
    /// read got; feed more input via [`FieldReader::resume`].
    NotReady,
}

/// A completed byte run.
///
/// `Shared` is a zero-copy view into the input chunk the run was contiguous
/// in; `Owned` is the accumulator used when a run spanned chunk boundaries.
/// Either way the bytes are only as stable as the slot itself — the decoder
/// drops the slot after the consumer callback it was produced for.
#[derive(Debug, Clone)]
pub enum ByteSlot {
    Shared(Bytes),
    Owned(Vec<u8>),
}

impl ByteSlot {
    pub fn empty() -> Self {
        ByteSlot::Shared(Bytes::new())
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            ByteSlot::Shared(b) => b,
            ByteSlot::Owned(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl Default for ByteSlot {
    fn default() -> Self {
        ByteSlot::empty()
    }
}

/// Which fixed-width integer a suspended read was producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixedKind {
    U8,
    U16,
    U32,
    U64,
}

impl FixedKind {
    fn width(self) -> usize {
        match self {
            FixedKind::U8 => 1,
            FixedKind::U16 => 2,
            FixedKind::U32 => 4,
            FixedKind::U64 => 8,
        }
    }
}

/// What, if anything, is mid-flight across chunk boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prestate {
    None,
    /// A fixed-width integer; partial bytes live in `partial`.
    Fixed(FixedKind),
    /// An unsigned vint. `vint_total == 0` means the first byte (which
    /// determines the length) has not been seen yet.
    Vint,
    /// The u16 length prefix of a short byte run; chains into `Run`.
    ShortLen,
    /// A byte run accumulating into `acc`; `run_needed` bytes still missing.
    Run,
}

/// The primitive-read engine.
///
/// Holds the integer slots the state machines read results from (`u8v`,
/// `u16v`, `u32v`, `u64v` — vints land in `u64v`), the byte-run slot, and
/// the prestate for a suspended read. Exactly one primitive can be in
/// flight at a time.
#[derive(Debug)]
pub struct FieldReader {
    prestate: Prestate,
    /// Partial bytes of a suspended fixed int or vint (vints are at most 9
    /// bytes).
    partial: [u8; 9],
    partial_len: usize,
    /// Total encoded length of the vint being read, 0 if not yet known.
    vint_total: usize,

    pub u8v: u8,
    pub u16v: u16,
    pub u32v: u32,
    pub u64v: u64,

    /// Completed byte run, if one is waiting to be claimed.
    run: Option<ByteSlot>,
    /// Accumulator for a run split across chunks.
    acc: Vec<u8>,
    run_needed: usize,
}

impl FieldReader {
    pub fn new() -> Self {
        FieldReader {
            prestate: Prestate::None,
            partial: [0; 9],
            partial_len: 0,
            vint_total: 0,
            u8v: 0,
            u16v: 0,
            u32v: 0,
            u64v: 0,
            run: None,
            acc: Vec::new(),
            run_needed: 0,
        }
    }

    /// True when a primitive is suspended mid-read. The driver must feed
    /// [`resume`](Self::resume) until `Ready` before stepping the state
    /// machine again.
    pub fn pending(&self) -> bool {
        self.prestate != Prestate::None
    }

    /// Discard any in-flight read and unclaimed run. Used after an external
    /// seek and on fatal errors; completed integer slots are left as-is
    /// (they are meaningless to the freshly reset machine anyway).
    pub fn reset(&mut self) {
        self.prestate = Prestate::None;
        self.partial_len = 0;
        self.vint_total = 0;
        self.run = None;
        self.acc.clear();
        self.run_needed = 0;
    }

    /// Claim the completed byte run, if there is one.
    ///
    /// Runs are claimed by the state that *follows* the read (the spot the
    /// machine lands on whether the read completed inline or via
    /// [`resume`](Self::resume)), so both completion paths share one claim
    /// site.
    pub fn take_run(&mut self) -> Option<ByteSlot> {
        self.run.take()
    }

    pub fn read_u8(&mut self, data: &mut Bytes) -> ReadStatus {
        self.read_fixed(data, FixedKind::U8)
    }

    pub fn read_u16(&mut self, data: &mut Bytes) -> ReadStatus {
        self.read_fixed(data, FixedKind::U16)
    }

    pub fn read_u32(&mut self, data: &mut Bytes) -> ReadStatus {
        self.read_fixed(data, FixedKind::U32)
    }

    pub fn read_u64(&mut self, data: &mut Bytes) -> ReadStatus {
        self.read_fixed(data, FixedKind::U64)
    }

    /// Read a u16 length followed by that many bytes. The length lands in
    /// `u16v`, the bytes in the run slot.
    pub fn read_short_length_bytes(&mut self, data: &mut Bytes) -> ReadStatus {
        debug_assert!(!self.pending());
        if data.len() >= 2 {
            let len = BigEndian::read_u16(&data[..2]);
            data.advance(2);
            self.u16v = len;
            self.start_run(data, len as usize)
        } else {
            self.stash_partial(data);
            self.prestate = Prestate::ShortLen;
            ReadStatus::NotReady
        }
    }

    /// Read exactly `n` bytes into the run slot.
    pub fn read_bytes(&mut self, data: &mut Bytes, n: usize) -> ReadStatus {
        debug_assert!(!self.pending());
        self.start_run(data, n)
    }

    /// Read an unsigned vint into `u64v`.
    pub fn read_unsigned_vint(&mut self, data: &mut Bytes) -> ReadStatus {
        debug_assert!(!self.pending());
        if data.is_empty() {
            self.partial_len = 0;
            self.vint_total = 0;
            self.prestate = Prestate::Vint;
            return ReadStatus::NotReady;
        }
        let total = 1 + data[0].leading_ones() as usize;
        if data.len() >= total {
            self.u64v = decode_unsigned_vint(&data[..total]);
            data.advance(total);
            ReadStatus::Ready
        } else {
            self.vint_total = total;
            self.stash_partial(data);
            self.prestate = Prestate::Vint;
            ReadStatus::NotReady
        }
    }

    /// Feed a new chunk into the suspended primitive. Returns `Ready` once
    /// the value is complete (the chunk is advanced past the consumed
    /// bytes, possibly leaving a remainder).
    pub fn resume(&mut self, data: &mut Bytes) -> ReadStatus {
        match self.prestate {
            Prestate::None => ReadStatus::Ready,
            Prestate::Fixed(kind) => {
                if self.fill_partial(data, kind.width()) == ReadStatus::NotReady {
                    return ReadStatus::NotReady;
                }
                self.store_fixed(kind);
                self.prestate = Prestate::None;
                ReadStatus::Ready
            }
            Prestate::Vint => {
                if self.vint_total == 0 {
                    if data.is_empty() {
                        return ReadStatus::NotReady;
                    }
                    self.vint_total = 1 + data[0].leading_ones() as usize;
                }
                let total = self.vint_total;
                if self.fill_partial(data, total) == ReadStatus::NotReady {
                    return ReadStatus::NotReady;
                }
                self.u64v = decode_unsigned_vint(&self.partial[..total]);
                self.vint_total = 0;
                self.prestate = Prestate::None;
                ReadStatus::Ready
            }
            Prestate::ShortLen => {
                if self.fill_partial(data, 2) == ReadStatus::NotReady {
                    return ReadStatus::NotReady;
                }
                let len = BigEndian::read_u16(&self.partial[..2]);
                self.u16v = len;
                self.prestate = Prestate::None;
                self.start_run(data, len as usize)
            }
            Prestate::Run => {
                let take = self.run_needed.min(data.len());
                self.acc.extend_from_slice(&data[..take]);
                data.advance(take);
                self.run_needed -= take;
                if self.run_needed > 0 {
                    return ReadStatus::NotReady;
                }
                self.run = Some(ByteSlot::Owned(std::mem::take(&mut self.acc)));
                self.prestate = Prestate::None;
                ReadStatus::Ready
            }
        }
    }

    /// Begin a byte run of `n` bytes. Zero-copy when the chunk already
    /// holds the whole run; otherwise start the owned accumulator.
    fn start_run(&mut self, data: &mut Bytes, n: usize) -> ReadStatus {
        if data.len() >= n {
            self.run = Some(ByteSlot::Shared(data.split_to(n)));
            ReadStatus::Ready
        } else {
            self.acc.clear();
            self.acc.reserve(n);
            self.acc.extend_from_slice(data);
            self.run_needed = n - data.len();
            data.advance(data.len());
            self.prestate = Prestate::Run;
            ReadStatus::NotReady
        }
    }

    fn read_fixed(&mut self, data: &mut Bytes, kind: FixedKind) -> ReadStatus {
        debug_assert!(!self.pending());
        let width = kind.width();
        if data.len() >= width {
            self.partial[..width].copy_from_slice(&data[..width]);
            data.advance(width);
            self.store_fixed(kind);
            ReadStatus::Ready
        } else {
            self.stash_partial(data);
            self.prestate = Prestate::Fixed(kind);
            ReadStatus::NotReady
        }
    }

    /// Move the whole (insufficient) chunk into the partial buffer.
    fn stash_partial(&mut self, data: &mut Bytes) {
        self.partial[..data.len()].copy_from_slice(data);
        self.partial_len = data.len();
        data.advance(data.len());
    }

    /// Top up the partial buffer to `want` bytes from `data`.
    fn fill_partial(&mut self, data: &mut Bytes, want: usize) -> ReadStatus {
        let need = want - self.partial_len;
        let take = need.min(data.len());
        self.partial[self.partial_len..self.partial_len + take].copy_from_slice(&data[..take]);
        self.partial_len += take;
        data.advance(take);
        if self.partial_len < want {
            ReadStatus::NotReady
        } else {
            self.partial_len = 0;
            ReadStatus::Ready
        }
    }

    fn store_fixed(&mut self, kind: FixedKind) {
        match kind {
            FixedKind::U8 => self.u8v = self.partial[0],
            FixedKind::U16 => self.u16v = BigEndian::read_u16(&self.partial[..2]),
            FixedKind::U32 => self.u32v = BigEndian::read_u32(&self.partial[..4]),
            FixedKind::U64 => self.u64v = BigEndian::read_u64(&self.partial[..8]),
        }
    }
}

impl Default for FieldReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a complete unsigned vint. `bytes` is exactly the encoded form
/// (1-9 bytes, length already validated against the first byte).
fn decode_unsigned_vint(bytes: &[u8]) -> u64 {
    let extra = bytes.len() - 1;
    // The first byte carries `extra` leading ones, a zero, then the top
    // value bits; masking 8-extra low bits keeps exactly the value bits.
    let mut value = if extra >= 8 {
        0
    } else {
        u64::from(bytes[0] & (0xffu8 >> extra))
    };
    for &b in &bytes[1..] {
        value = (value << 8) | u64::from(b);
    }
    value
}
