//! The continuous decode loop.

use bytes::Bytes;
use tracing::trace;

use crate::fields::{FieldReader, ReadStatus};
use crate::source::ResourceTracker;
use crate::{DecodeError, Proceed};

/// The input-stream collaborator.
///
/// Chunks may be any size, including sizes that split a primitive across
/// calls. End of stream is signalled by returning an empty chunk. A source
/// that supports cancellation returns [`DecodeError::Cancelled`] from the
/// first pull after the flag is raised.
pub trait ChunkSource {
    fn next_chunk(&mut self) -> Result<Bytes, DecodeError>;
}

/// A position the decoder can be externally repositioned to, e.g. after a
/// seek through a promoted index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexableElement {
    /// The start of a partition.
    Partition,
    /// The start of an atom within a partition (legacy dialect only).
    Cell,
}

/// A format-specific state processor driven by [`Driver`].
///
/// The driver owns the [`FieldReader`]; the machine owns only its state
/// enum and its consumer. When a primitive read returns not-ready the
/// machine records the follow-up state and returns — the driver completes
/// the read against later chunks and re-enters `process_state` with the
/// value sitting in the reader's slots.
pub trait StateMachine {
    /// Step the machine against the buffered input. Returns
    /// [`Proceed::No`] when the consumer asked to pause (the state has
    /// already advanced past the delivered event).
    fn process_state(
        &mut self,
        fields: &mut FieldReader,
        data: &mut Bytes,
    ) -> Result<Proceed, DecodeError>;

    /// True when the current state makes progress without consuming input,
    /// so the driver re-enters `process_state` on an empty buffer instead
    /// of demanding bytes.
    fn non_consuming(&self) -> bool;

    /// Called at clean end of stream: either accept the final state or
    /// report a framing error. May deliver a final synthesized callback.
    fn verify_end_state(&mut self) -> Result<(), DecodeError>;

    /// Reposition after an external seek.
    fn reset(&mut self, element: IndexableElement);
}

/// How a [`Driver::run`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// End of stream at a legal boundary; `verify_end_state` passed.
    Finished,
    /// The consumer asked to pause. Call `run` again to continue.
    Paused,
    /// The byte budget ran out. End-state verification is *not* performed.
    BudgetExhausted,
}

enum Pulled {
    Chunk,
    Eof,
    Budget,
}

/// Drives a [`StateMachine`] over a [`ChunkSource`].
///
/// Owns the unconsumed buffer, the primitive reader, and the remaining
/// byte budget (`maxlen`). One driver decodes one stream; concurrency comes
/// from running many drivers, each on its own task.
pub struct Driver<S, M> {
    source: S,
    machine: M,
    fields: FieldReader,
    data: Bytes,
    remaining: u64,
    tracker: ResourceTracker,
    tracked: u64,
}

impl<S: ChunkSource, M: StateMachine> Driver<S, M> {
    /// `maxlen` caps how many bytes the driver will pull from `source`.
    pub fn new(source: S, machine: M, maxlen: u64) -> Self {
        Self::with_tracker(source, machine, maxlen, ResourceTracker::untracked())
    }

    /// As [`new`](Self::new), charging pulled bytes to `tracker` until the
    /// stream finishes or fails.
    pub fn with_tracker(source: S, machine: M, maxlen: u64, tracker: ResourceTracker) -> Self {
        Driver {
            source,
            machine,
            fields: FieldReader::new(),
            data: Bytes::new(),
            remaining: maxlen,
            tracker,
            tracked: 0,
        }
    }

    /// Decode until the consumer pauses, the budget runs out, or the
    /// stream ends. Safe to call again after `Paused`; the stream resumes
    /// at exactly the next event.
    ///
    /// # Errors
    ///
    /// `Malformed` on framing violations (including end of stream at an
    /// illegal state), `Unsupported` for constructs the format machine
    /// rejects, `Io`/`Cancelled` from the source. All errors are fatal to
    /// this driver; the stream is abandoned.
    pub fn run(&mut self) -> Result<RunOutcome, DecodeError> {
        let outcome = self.run_inner();
        match &outcome {
            Ok(RunOutcome::Finished) | Err(_) => {
                // A finished or dead decoder holds no claim on the I/O
                // budget; in-flight primitive state is meaningless too.
                self.fields.reset();
                self.release_tracked();
            }
            Ok(RunOutcome::Paused) | Ok(RunOutcome::BudgetExhausted) => {}
        }
        outcome
    }

    fn run_inner(&mut self) -> Result<RunOutcome, DecodeError> {
        loop {
            if self.data.is_empty() && (self.fields.pending() || !self.machine.non_consuming()) {
                match self.pull()? {
                    Pulled::Chunk => {}
                    Pulled::Eof => {
                        if self.fields.pending() {
                            return Err(DecodeError::Malformed(
                                "end of input in the middle of a primitive".into(),
                            ));
                        }
                        self.machine.verify_end_state()?;
                        return Ok(RunOutcome::Finished);
                    }
                    Pulled::Budget => return Ok(RunOutcome::BudgetExhausted),
                }
            }
            if self.fields.pending() && self.fields.resume(&mut self.data) == ReadStatus::NotReady {
                continue;
            }
            match self.machine.process_state(&mut self.fields, &mut self.data)? {
                Proceed::Yes => {}
                Proceed::No => return Ok(RunOutcome::Paused),
            }
        }
    }

    fn pull(&mut self) -> Result<Pulled, DecodeError> {
        if self.remaining == 0 {
            return Ok(Pulled::Budget);
        }
        let mut chunk = self.source.next_chunk()?;
        if chunk.is_empty() {
            return Ok(Pulled::Eof);
        }
        if chunk.len() as u64 > self.remaining {
            chunk.truncate(self.remaining as usize);
        }
        self.remaining -= chunk.len() as u64;
        self.tracked += chunk.len() as u64;
        self.tracker.consume(chunk.len() as u64);
        trace!(len = chunk.len(), remaining = self.remaining, "pulled chunk");
        self.data = chunk;
        Ok(Pulled::Chunk)
    }

    /// Reposition the state machine after an external seek of the source.
    /// Buffered bytes and any in-flight primitive are discarded.
    pub fn skip_to(&mut self, element: IndexableElement) {
        self.data = Bytes::new();
        self.fields.reset();
        self.machine.reset(element);
    }

    /// Bytes of budget still available.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    fn release_tracked(&mut self) {
        self.tracker.release(self.tracked);
        self.tracked = 0;
    }
}

impl<S, M> Drop for Driver<S, M> {
    fn drop(&mut self) {
        // Covers abandonment mid-stream (cancellation, caller gave up).
        self.tracker.release(self.tracked);
    }
}
