//! # SSTable — streaming decoder for Cassandra-compatible data files
//!
//! A resumable, byte-oriented decoder for the partition/row/cell layer of
//! SSTable data files, in two wire dialects: the legacy format ("format A")
//! and the 3.x format ("format M"). The decoder is a push parser driven by
//! [`codec::Driver`]: input arrives as arbitrarily sized, arbitrarily
//! aligned chunks, and the caller's consumer receives typed callbacks. The
//! consumer can pause the stream at any callback; the next run resumes at
//! exactly the following event.
//!
//! ## Wire layout — format A (per partition, all integers big-endian)
//!
//! ```text
//! partition := u16 key_len | key | u32 local_deletion_time
//!            | u64 marked_for_delete_at | atom* | u16(0) end-of-row
//! atom      := u16 name_len | name | u8 mask | body(mask)
//!
//! body, by mask bit:
//!   cell              u64 ts | u32 vlen | value
//!   deleted cell      u64 ts | u32 vlen(=4) | u32 local_deletion_time
//!   expiring cell     u32 ttl | u32 expiration | <cell>
//!   counter cell      u64 timestamp_of_last_deletion | <cell>
//!   range tombstone   u16 end_len | end | u32 ldt | u64 mfda
//!   shadowable row tombstone: same framing, shadowable mask bit set
//! ```
//!
//! ## Wire layout — format M (per partition)
//!
//! ```text
//! partition  := u16 key_len | key | u32 ldt | u64 mfda | unfiltered*
//! unfiltered := u8 flags
//!             | (extended?)      u8 extended_flags
//!             | (end)            nothing — closes the partition
//!             | (static row)     <row-body>
//!             | (clustering row) <clustering><row-body>
//! clustering := per block: vint header word every 32 blocks;
//!               absent marker OR (fixed-length | vint length) bytes
//! row-body   := vint size | vint prev_size
//!             | (has_timestamp?) vint Δts
//!             | (has_ttl?)       vint Δttl | vint Δldt
//!             | (has_deletion?)  vint Δmfda | vint Δldt
//!             | missing-columns | column*
//! column     := u8 flags | (own ts?) vint Δts | (own ldt?) vint Δldt
//!             | (own ttl?) vint Δttl
//!             | (has_value?) (fixed-length | vint length) bytes
//! ```
//!
//! The `Δ` fields are unsigned-vint deltas against the file's
//! [`SerializationHeader`] minima; the schema collaborator supplies those
//! and the [`ColumnTranslation`] before decoding begins.
//!
//! ## Using the decoder
//!
//! ```rust,no_run
//! use codec::{Driver, Proceed, SliceSource};
//! use sstable::{DeletionTime, FormatAParser, RowConsumer};
//!
//! struct KeyPrinter;
//!
//! impl RowConsumer for KeyPrinter {
//!     fn consume_row_start(&mut self, key: &[u8], _dt: DeletionTime) -> Proceed {
//!         println!("{:?}", key); // copy if the key must outlive the call
//!         Proceed::Yes
//!     }
//!     fn consume_cell(&mut self, _: &[u8], _: &[u8], _: i64, _: u32, _: u32) -> Proceed {
//!         Proceed::Yes
//!     }
//!     fn consume_counter_cell(&mut self, _: &[u8], _: &[u8], _: i64) -> Proceed {
//!         Proceed::Yes
//!     }
//!     fn consume_deleted_cell(&mut self, _: &[u8], _: DeletionTime) -> Proceed {
//!         Proceed::Yes
//!     }
//!     fn consume_shadowable_row_tombstone(&mut self, _: &[u8], _: DeletionTime) -> Proceed {
//!         Proceed::Yes
//!     }
//!     fn consume_range_tombstone(&mut self, _: &[u8], _: &[u8], _: DeletionTime) -> Proceed {
//!         Proceed::Yes
//!     }
//!     fn consume_row_end(&mut self) -> Proceed {
//!         Proceed::Yes
//!     }
//! }
//!
//! let mut consumer = KeyPrinter;
//! let source = SliceSource::whole(std::fs::read("la-1-big-Data.db").unwrap());
//! let mut driver = Driver::new(source, FormatAParser::new(&mut consumer), u64::MAX);
//! driver.run().unwrap();
//! ```
//!
//! ## Contracts
//!
//! * Byte slices passed to `consume_*` calls are valid only for that call.
//! * Events arrive in strict file order; within a row, columns arrive in
//!   schema order, present columns only.
//! * A [`Proceed::No`](codec::Proceed::No) return pauses *after* the event;
//!   resuming never re-delivers and never skips.
//! * Framing violations and unsupported constructs are fatal to the decoder
//!   instance; it never skips corrupt bytes and never invents events.

mod bitset;
mod consumer;
mod format_a;
mod format_m;
mod types;

pub use bitset::Bitset;
pub use consumer::{RowConsumer, RowConsumerM};
pub use format_a::FormatAParser;
pub use format_m::FormatMParser;
pub use types::{
    CellFlags, ClusteringKey, ColumnId, ColumnInfo, ColumnMask, ColumnTranslation, DeletionTime,
    LivenessInfo, SerializationHeader, UnfilteredExtendedFlags, UnfilteredFlags,
    MAX_LOCAL_DELETION_TIME, NO_TIMESTAMP,
};

pub use codec::{
    ChunkSource, DecodeError, Driver, IndexableElement, IoPriority, Proceed, ResourceTracker,
    RunOutcome,
};

#[cfg(test)]
mod tests;
