//! Legacy-dialect state processor.
//!
//! A partition is a short-length partition key, a 32+64-bit deletion time,
//! then atoms until a zero-length column name marks the end of the row.
//! Each atom is a short-length name, a mask byte, and a mask-dependent body.
//!
//! The machine is a flat state enum stepped by one `loop { match }`: a
//! fall-through in the wire grammar is a state assignment plus `continue`,
//! and a primitive that ran out of input parks the machine in the paired
//! follow-up state (the driver completes the read and re-enters there with
//! the value sitting in the [`FieldReader`] slots).

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use codec::{
    ByteSlot, DecodeError, FieldReader, IndexableElement, Proceed, ReadStatus, StateMachine,
};
use tracing::trace;

use crate::consumer::RowConsumer;
use crate::types::{ColumnMask, DeletionTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RowStart,
    DeletionTime,
    DeletionTime2,
    DeletionTime3,
    AtomStart,
    AtomStart2,
    AtomMask,
    AtomMask2,
    CounterCell,
    CounterCell2,
    ExpiringCell,
    ExpiringCell2,
    ExpiringCell3,
    Cell,
    Cell2,
    CellValueBytes,
    CellValueBytes2,
    RangeTombstone,
    RangeTombstone2,
    RangeTombstone3,
    RangeTombstone4,
    StopThenAtomStart,
}

/// States that make progress without consuming input: the driver may enter
/// them on an empty buffer, and the step loop never demands bytes in them.
fn non_consuming_state(state: State) -> bool {
    matches!(
        state,
        State::DeletionTime3
            | State::CellValueBytes2
            | State::AtomStart2
            | State::AtomMask2
            | State::StopThenAtomStart
            | State::CounterCell2
            | State::RangeTombstone4
            | State::ExpiringCell3
    )
}

/// Decodes legacy-dialect partitions and feeds a [`RowConsumer`].
///
/// The consumer is exclusively borrowed for the parser's lifetime and is
/// only ever called from the driving task.
pub struct FormatAParser<'c, C: RowConsumer> {
    consumer: &'c mut C,
    state: State,

    /// Current atom name (and the partition key at row start).
    key: ByteSlot,
    /// Current cell value (and the range-tombstone end bound).
    val: ByteSlot,

    deleted: bool,
    counter: bool,
    shadowable: bool,
    timestamp: i64,
    ttl: u32,
    expiration: u32,
    value_len: usize,
}

impl<'c, C: RowConsumer> FormatAParser<'c, C> {
    pub fn new(consumer: &'c mut C) -> Self {
        FormatAParser {
            consumer,
            state: State::RowStart,
            key: ByteSlot::empty(),
            val: ByteSlot::empty(),
            deleted: false,
            counter: false,
            shadowable: false,
            timestamp: 0,
            ttl: 0,
            expiration: 0,
            value_len: 0,
        }
    }

    /// Arrange for the next step to pause just before the following atom.
    /// Used by index-driven readers that decode a partition in bounded
    /// slices.
    pub fn stop_before_next_atom(&mut self) {
        self.state = State::StopThenAtomStart;
    }

    /// Deliver the just-completed cell. The name and value slots are still
    /// armed; the caller releases them afterwards.
    fn flush_cell(&mut self) -> Result<Proceed, DecodeError> {
        if self.deleted {
            if self.val.len() != 4 {
                return Err(DecodeError::Malformed(
                    "deleted cell value must be the 4-byte local deletion time".into(),
                ));
            }
            let deletion = DeletionTime {
                local_deletion_time: BigEndian::read_u32(self.val.as_slice()),
                marked_for_delete_at: self.timestamp,
            };
            Ok(self.consumer.consume_deleted_cell(self.key.as_slice(), deletion))
        } else if self.counter {
            Ok(self.consumer.consume_counter_cell(
                self.key.as_slice(),
                self.val.as_slice(),
                self.timestamp,
            ))
        } else {
            Ok(self.consumer.consume_cell(
                self.key.as_slice(),
                self.val.as_slice(),
                self.timestamp,
                self.ttl,
                self.expiration,
            ))
        }
    }
}

impl<C: RowConsumer> StateMachine for FormatAParser<'_, C> {
    fn process_state(
        &mut self,
        fields: &mut FieldReader,
        data: &mut Bytes,
    ) -> Result<Proceed, DecodeError> {
        loop {
            if data.is_empty() && !non_consuming_state(self.state) {
                return Ok(Proceed::Yes);
            }
            trace!(state = ?self.state, len = data.len(), "format-A step");
            match self.state {
                State::RowStart => {
                    if fields.read_short_length_bytes(data) == ReadStatus::NotReady {
                        self.state = State::DeletionTime;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::DeletionTime;
                }
                State::DeletionTime => {
                    if let Some(run) = fields.take_run() {
                        self.key = run;
                    }
                    if fields.read_u32(data) == ReadStatus::NotReady {
                        self.state = State::DeletionTime2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::DeletionTime2;
                }
                State::DeletionTime2 => {
                    if fields.read_u64(data) == ReadStatus::NotReady {
                        self.state = State::DeletionTime3;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::DeletionTime3;
                }
                State::DeletionTime3 => {
                    let deletion = DeletionTime {
                        local_deletion_time: fields.u32v,
                        marked_for_delete_at: fields.u64v as i64,
                    };
                    let ret = self.consumer.consume_row_start(self.key.as_slice(), deletion);
                    self.key = ByteSlot::empty();
                    self.state = State::AtomStart;
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::AtomStart => {
                    if fields.read_short_length_bytes(data) == ReadStatus::NotReady {
                        self.state = State::AtomStart2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::AtomStart2;
                }
                State::AtomStart2 => {
                    if let Some(run) = fields.take_run() {
                        self.key = run;
                    }
                    if fields.u16v == 0 {
                        // end of row marker
                        self.state = State::RowStart;
                        if self.consumer.consume_row_end() == Proceed::No {
                            return Ok(Proceed::No);
                        }
                    } else {
                        self.state = State::AtomMask;
                    }
                }
                State::AtomMask => {
                    if fields.read_u8(data) == ReadStatus::NotReady {
                        self.state = State::AtomMask2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::AtomMask2;
                }
                State::AtomMask2 => {
                    let mask = ColumnMask(fields.u8v);
                    if mask.is_range_tombstone() {
                        self.shadowable = mask.is_shadowable();
                        self.state = State::RangeTombstone;
                    } else if mask.is_counter() {
                        self.deleted = false;
                        self.counter = true;
                        self.state = State::CounterCell;
                    } else if mask.is_expiration() {
                        self.deleted = false;
                        self.counter = false;
                        self.state = State::ExpiringCell;
                    } else if mask.is_counter_update() {
                        return Err(DecodeError::Unsupported("counter update cells"));
                    } else {
                        self.ttl = 0;
                        self.expiration = 0;
                        self.deleted = mask.is_deletion();
                        self.counter = false;
                        self.state = State::Cell;
                    }
                }
                State::CounterCell => {
                    if fields.read_u64(data) == ReadStatus::NotReady {
                        self.state = State::CounterCell2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CounterCell2;
                }
                State::CounterCell2 => {
                    // timestamp-of-last-deletion: read and discarded
                    self.state = State::Cell;
                }
                State::ExpiringCell => {
                    if fields.read_u32(data) == ReadStatus::NotReady {
                        self.state = State::ExpiringCell2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ExpiringCell2;
                }
                State::ExpiringCell2 => {
                    self.ttl = fields.u32v;
                    if fields.read_u32(data) == ReadStatus::NotReady {
                        self.state = State::ExpiringCell3;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ExpiringCell3;
                }
                State::ExpiringCell3 => {
                    self.expiration = fields.u32v;
                    self.state = State::Cell;
                }
                State::Cell => {
                    if fields.read_u64(data) == ReadStatus::NotReady {
                        self.state = State::Cell2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::Cell2;
                }
                State::Cell2 => {
                    self.timestamp = fields.u64v as i64;
                    if fields.read_u32(data) == ReadStatus::NotReady {
                        self.state = State::CellValueBytes;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CellValueBytes;
                }
                State::CellValueBytes => {
                    self.value_len = fields.u32v as usize;
                    if fields.read_bytes(data, self.value_len) == ReadStatus::NotReady {
                        self.state = State::CellValueBytes2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CellValueBytes2;
                }
                State::CellValueBytes2 => {
                    if let Some(run) = fields.take_run() {
                        self.val = run;
                    }
                    let ret = self.flush_cell()?;
                    self.key = ByteSlot::empty();
                    self.val = ByteSlot::empty();
                    self.state = State::AtomStart;
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::RangeTombstone => {
                    if fields.read_short_length_bytes(data) == ReadStatus::NotReady {
                        self.state = State::RangeTombstone2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RangeTombstone2;
                }
                State::RangeTombstone2 => {
                    if let Some(run) = fields.take_run() {
                        self.val = run;
                    }
                    if fields.read_u32(data) == ReadStatus::NotReady {
                        self.state = State::RangeTombstone3;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RangeTombstone3;
                }
                State::RangeTombstone3 => {
                    if fields.read_u64(data) == ReadStatus::NotReady {
                        self.state = State::RangeTombstone4;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RangeTombstone4;
                }
                State::RangeTombstone4 => {
                    let deletion = DeletionTime {
                        local_deletion_time: fields.u32v,
                        marked_for_delete_at: fields.u64v as i64,
                    };
                    let ret = if self.shadowable {
                        self.consumer
                            .consume_shadowable_row_tombstone(self.key.as_slice(), deletion)
                    } else {
                        self.consumer.consume_range_tombstone(
                            self.key.as_slice(),
                            self.val.as_slice(),
                            deletion,
                        )
                    };
                    self.key = ByteSlot::empty();
                    self.val = ByteSlot::empty();
                    self.state = State::AtomStart;
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::StopThenAtomStart => {
                    self.state = State::AtomStart;
                    return Ok(Proceed::No);
                }
            }
        }
    }

    fn non_consuming(&self) -> bool {
        non_consuming_state(self.state)
    }

    fn verify_end_state(&mut self) -> Result<(), DecodeError> {
        match self.state {
            // A bounded read through a promoted index may stop between
            // atoms; the end-of-row marker was never seen, so close the row
            // for the consumer here.
            State::AtomStart | State::AtomStart2 => {
                let _ = self.consumer.consume_row_end();
                Ok(())
            }
            State::RowStart => Ok(()),
            _ => Err(DecodeError::Malformed(
                "end of input, but not end of row".into(),
            )),
        }
    }

    fn reset(&mut self, element: IndexableElement) {
        self.state = match element {
            IndexableElement::Partition => State::RowStart,
            IndexableElement::Cell => State::AtomStart,
        };
        self.key = ByteSlot::empty();
        self.val = ByteSlot::empty();
        self.consumer.reset(element);
    }
}
