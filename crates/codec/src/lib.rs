//! # Codec — resumable byte-reader primitives and the continuous decode driver
//!
//! Low-level plumbing for decoding length-framed binary streams that arrive
//! in arbitrarily sized, arbitrarily aligned chunks. Nothing in this crate
//! knows about SSTables; it provides three things:
//!
//! * [`FieldReader`] — resumable reads of fixed big-endian integers,
//!   unsigned vints, and byte runs. Every read either completes against the
//!   current chunk (**ready**) or records how far it got (**not ready**) and
//!   finishes against a later chunk. A byte run that is contiguous in the
//!   current chunk is handed out as a zero-copy slice of that chunk.
//! * [`Driver`] — the pull loop. It owns the input stream, the remaining
//!   byte budget, and the `FieldReader`, and repeatedly steps a
//!   format-specific [`StateMachine`] until the stream ends, the budget runs
//!   out, or the machine asks to pause.
//! * [`ChunkSource`] — the input-stream collaborator contract, with two
//!   stock implementations: [`SliceSource`] (scripted chunk boundaries, for
//!   tests) and [`FileSource`].
//!
//! ## Ready / not-ready
//!
//! ```text
//! read_u32(chunk)                      chunk: [aa bb]        -> NotReady
//!   (2 bytes stashed in the prestate)
//! resume(chunk)                        chunk: [cc dd ee ..]  -> Ready
//!   (u32 = 0xaabbccdd, chunk advanced to [ee ..])
//! ```
//!
//! A state machine never sees a half-read primitive: the [`Driver`]
//! completes the in-flight read before calling
//! [`StateMachine::process_state`] again, which is why machine states come
//! in pairs ("read the length" / "length now valid").
//!
//! ## Pausing
//!
//! `process_state` returns [`Proceed::No`] when the machine's consumer asks
//! to stop. The driver trims nothing and invents nothing: the unconsumed
//! suffix of the current chunk stays buffered, and the next
//! [`Driver::run`] call picks up at exactly the same logical position.

mod driver;
mod fields;
mod source;

use std::io;

use thiserror::Error;

pub use driver::{ChunkSource, Driver, IndexableElement, RunOutcome, StateMachine};
pub use fields::{ByteSlot, FieldReader, ReadStatus};
pub use source::{CancelFlag, FileSource, IoPriority, ResourceTracker, SliceSource};

/// Errors surfaced by the decode driver and the format state machines.
///
/// `Malformed` and `Unsupported` are fatal to the decoder instance: the
/// stream is abandoned and no further callbacks are delivered. A consumer
/// pause is *not* an error; see [`Proceed`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A framing violation: the bytes cannot be a valid stream.
    #[error("malformed sstable: {0}")]
    Malformed(String),

    /// A legal construct this decoder does not implement.
    #[error("unsupported sstable feature: {0}")]
    Unsupported(&'static str),

    /// An error from the input-stream collaborator, passed through unchanged.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The decode was cancelled at a buffer-pull boundary.
    #[error("decode cancelled")]
    Cancelled,
}

/// The consumer's answer at every callback: keep going or pause here.
///
/// `No` is a normal pause, not an error. The state machine advances *past*
/// the event it just delivered before surfacing `No`, so resuming never
/// re-delivers and never skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proceed {
    Yes,
    No,
}
