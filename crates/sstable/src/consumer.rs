//! The two consumer contracts.
//!
//! A decoder feeds one consumer. Every byte slice handed to a `consume_*`
//! method is a view into the decoder's buffers and is valid **only for the
//! duration of that call** — a consumer that wants to keep bytes must copy
//! them. Every method returns [`Proceed`]: `No` pauses the stream *after*
//! the delivered event, so the next [`Driver::run`](codec::Driver::run)
//! resumes at the following event, never re-delivering and never skipping.

use codec::{IndexableElement, IoPriority, Proceed, ResourceTracker};

use crate::types::{ColumnId, DeletionTime, LivenessInfo};
use crate::ClusteringKey;

/// Consumer for the legacy dialect: one partition is a key, a partition
/// deletion time, and a run of atoms closed by an end-of-row marker.
pub trait RowConsumer {
    /// The partition key and partition-level deletion time. The key bytes
    /// are serialized form; deserialize per the schema before use.
    fn consume_row_start(&mut self, key: &[u8], deletion_time: DeletionTime) -> Proceed;

    /// A live cell. `ttl` is the time-to-live in seconds originally set and
    /// `expiration` the absolute expiry second; both are zero for cells not
    /// set to expire.
    fn consume_cell(
        &mut self,
        name: &[u8],
        value: &[u8],
        timestamp: i64,
        ttl: u32,
        expiration: u32,
    ) -> Proceed;

    /// A counter cell.
    fn consume_counter_cell(&mut self, name: &[u8], value: &[u8], timestamp: i64) -> Proceed;

    /// A cell tombstone.
    fn consume_deleted_cell(&mut self, name: &[u8], deletion_time: DeletionTime) -> Proceed;

    /// A shadowable row tombstone.
    fn consume_shadowable_row_tombstone(
        &mut self,
        name: &[u8],
        deletion_time: DeletionTime,
    ) -> Proceed;

    /// A range tombstone covering `start`..`end`.
    fn consume_range_tombstone(
        &mut self,
        start: &[u8],
        end: &[u8],
        deletion_time: DeletionTime,
    ) -> Proceed;

    /// The end-of-row marker. Also synthesized once at end of stream when a
    /// bounded read stopped between atoms.
    fn consume_row_end(&mut self) -> Proceed;

    /// Mirror of [`Driver::skip_to`](codec::Driver::skip_to): the stream
    /// was repositioned to `element` by an external seek.
    fn reset(&mut self, _element: IndexableElement) {}

    /// Scheduling class for this consumer's reads; used by the I/O
    /// collaborator only.
    fn io_priority(&self) -> IoPriority {
        IoPriority::default()
    }

    /// Byte-quota handle for this consumer's reads; used by the I/O
    /// collaborator only.
    fn resource_tracker(&self) -> ResourceTracker {
        ResourceTracker::untracked()
    }
}

/// Consumer for the 3.x dialect: partitions carry unfiltereds (a static
/// row, clustering rows) between explicit start and end events.
pub trait RowConsumerM {
    /// The partition key and partition-level deletion time.
    fn consume_partition_start(&mut self, key: &[u8], deletion_time: DeletionTime) -> Proceed;

    /// The end-of-partition marker.
    fn consume_partition_end(&mut self) -> Proceed;

    /// A clustering row is starting; `clustering_key` holds its blocks in
    /// schema order (absent blocks included).
    fn consume_row_start(&mut self, clustering_key: &ClusteringKey) -> Proceed;

    /// The static row is starting. Only ever the first unfiltered of a
    /// partition.
    fn consume_static_row_start(&mut self) -> Proceed;

    /// One simple column of the current row. `column_id` is `None` when the
    /// column no longer exists in the schema. Timestamp, TTL, and local
    /// deletion time are absolute (header deltas already applied, row
    /// defaults already inherited).
    fn consume_column(
        &mut self,
        column_id: Option<ColumnId>,
        value: &[u8],
        timestamp: i64,
        ttl: u32,
        local_deletion_time: u32,
    ) -> Proceed;

    /// The current row is complete; `liveness` holds the row-level defaults
    /// that applied to it.
    fn consume_row_end(&mut self, liveness: &LivenessInfo) -> Proceed;

    /// Mirror of [`Driver::skip_to`](codec::Driver::skip_to).
    fn reset(&mut self, _element: IndexableElement) {}

    /// Scheduling class for this consumer's reads; used by the I/O
    /// collaborator only.
    fn io_priority(&self) -> IoPriority {
        IoPriority::default()
    }

    /// Byte-quota handle for this consumer's reads; used by the I/O
    /// collaborator only.
    fn resource_tracker(&self) -> ResourceTracker {
        ResourceTracker::untracked()
    }
}
