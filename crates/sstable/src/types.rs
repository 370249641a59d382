//! Wire-level value types shared by both dialects.

use codec::ByteSlot;

/// Timestamp value meaning "no timestamp was written".
pub const NO_TIMESTAMP: i64 = i64::MIN;

/// Local-deletion-time value meaning "never expires" — the maximum of the
/// 32-bit seconds clock the formats store.
pub const MAX_LOCAL_DELETION_TIME: u32 = u32::MAX;

/// When a tombstone was created and which writes it covers.
///
/// `local_deletion_time` is seconds since the epoch (the 32-bit gc clock);
/// `marked_for_delete_at` is a microsecond write timestamp. It travels on
/// the wire as a fixed 64-bit big-endian field but is signed — the live
/// sentinel is `i64::MIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionTime {
    pub local_deletion_time: u32,
    pub marked_for_delete_at: i64,
}

impl DeletionTime {
    /// The sentinel meaning "no deletion".
    pub const LIVE: DeletionTime = DeletionTime {
        local_deletion_time: i32::MAX as u32,
        marked_for_delete_at: i64::MIN,
    };

    pub fn is_live(&self) -> bool {
        *self == Self::LIVE
    }
}

/// Per-row defaults individual columns may inherit: write timestamp, TTL,
/// and local deletion time. Reset at each row start; populated by the
/// row-body fields when the row flags say they are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessInfo {
    pub timestamp: i64,
    pub ttl: u32,
    pub local_deletion_time: u32,
}

impl LivenessInfo {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_set(&self) -> bool {
        self.timestamp != NO_TIMESTAMP
    }

    pub(crate) fn set_timestamp(&mut self, header: &SerializationHeader, raw: u64) {
        self.timestamp = header.parse_timestamp(raw);
    }

    pub(crate) fn set_ttl(&mut self, header: &SerializationHeader, raw: u64) {
        self.ttl = header.parse_ttl(raw);
    }

    pub(crate) fn set_local_deletion_time(&mut self, header: &SerializationHeader, raw: u64) {
        self.local_deletion_time = header.parse_expiry(raw);
    }
}

impl Default for LivenessInfo {
    fn default() -> Self {
        LivenessInfo {
            timestamp: NO_TIMESTAMP,
            ttl: 0,
            local_deletion_time: MAX_LOCAL_DELETION_TIME,
        }
    }
}

/// Per-file base values for the vint deltas the 3.x dialect stores.
///
/// Timestamps, TTLs, and local deletion times are written as unsigned vint
/// deltas against these minima; the schema collaborator supplies them from
/// the file's serialization header.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializationHeader {
    pub min_timestamp: i64,
    pub min_local_deletion_time: i64,
    pub min_ttl: i64,
}

impl SerializationHeader {
    pub fn parse_timestamp(&self, raw: u64) -> i64 {
        self.min_timestamp.wrapping_add(raw as i64)
    }

    pub fn parse_ttl(&self, raw: u64) -> u32 {
        self.min_ttl.wrapping_add(raw as i64) as u32
    }

    pub fn parse_expiry(&self, raw: u64) -> u32 {
        self.min_local_deletion_time.wrapping_add(raw as i64) as u32
    }
}

/// Index of a column in the schema's column registry.
pub type ColumnId = u32;

/// What the schema collaborator knows about one column of the stream: its
/// id (absent when the column was dropped from the schema) and, for
/// fixed-width types, the value length (so no length vint is stored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfo {
    pub id: Option<ColumnId>,
    pub fixed_length: Option<u32>,
}

impl ColumnInfo {
    pub fn new(id: Option<ColumnId>, fixed_length: Option<u32>) -> Self {
        ColumnInfo { id, fixed_length }
    }
}

/// The schema collaborator's view of a table, frozen for the lifetime of
/// one partition stream: ordered static columns, regular columns, and the
/// fixed-length table for clustering columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnTranslation {
    static_columns: Vec<ColumnInfo>,
    regular_columns: Vec<ColumnInfo>,
    clustering_fixed_lengths: Vec<Option<u32>>,
}

impl ColumnTranslation {
    pub fn new(
        static_columns: Vec<ColumnInfo>,
        regular_columns: Vec<ColumnInfo>,
        clustering_fixed_lengths: Vec<Option<u32>>,
    ) -> Self {
        ColumnTranslation {
            static_columns,
            regular_columns,
            clustering_fixed_lengths,
        }
    }

    pub fn static_columns(&self) -> &[ColumnInfo] {
        &self.static_columns
    }

    pub fn regular_columns(&self) -> &[ColumnInfo] {
        &self.regular_columns
    }

    pub fn clustering_fixed_lengths(&self) -> &[Option<u32>] {
        &self.clustering_fixed_lengths
    }
}

/// The clustering key of one row: its blocks in schema order, where a
/// block is either absent or a byte run.
///
/// Handed by reference to the row-start callback of
/// [`RowConsumerM`](crate::RowConsumerM); the block bytes are only valid
/// for the duration of that call.
#[derive(Debug, Default)]
pub struct ClusteringKey {
    blocks: Vec<Option<ByteSlot>>,
}

impl ClusteringKey {
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The bytes of block `i`, or `None` when the block is absent.
    pub fn block(&self, i: usize) -> Option<&[u8]> {
        self.blocks[i].as_ref().map(ByteSlot::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&[u8]>> + '_ {
        self.blocks.iter().map(|b| b.as_ref().map(ByteSlot::as_slice))
    }

    pub(crate) fn push_absent(&mut self) {
        self.blocks.push(None);
    }

    pub(crate) fn push_value(&mut self, value: ByteSlot) {
        self.blocks.push(Some(value));
    }

    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
    }
}

/// The 1-byte atom mask of the legacy dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMask(pub u8);

impl ColumnMask {
    const DELETION: u8 = 0x01;
    const EXPIRATION: u8 = 0x02;
    const COUNTER: u8 = 0x04;
    const COUNTER_UPDATE: u8 = 0x08;
    const RANGE_TOMBSTONE: u8 = 0x10;
    const SHADOWABLE: u8 = 0x40;

    pub fn is_deletion(self) -> bool {
        self.0 & Self::DELETION != 0
    }

    pub fn is_expiration(self) -> bool {
        self.0 & Self::EXPIRATION != 0
    }

    pub fn is_counter(self) -> bool {
        self.0 & Self::COUNTER != 0
    }

    pub fn is_counter_update(self) -> bool {
        self.0 & Self::COUNTER_UPDATE != 0
    }

    pub fn is_range_tombstone(self) -> bool {
        self.0 & (Self::RANGE_TOMBSTONE | Self::SHADOWABLE) != 0
    }

    pub fn is_shadowable(self) -> bool {
        self.0 & Self::SHADOWABLE != 0
    }
}

/// The flags byte opening every unfiltered in the 3.x dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnfilteredFlags(pub u8);

impl UnfilteredFlags {
    const END_OF_PARTITION: u8 = 0x01;
    const IS_MARKER: u8 = 0x02;
    const HAS_TIMESTAMP: u8 = 0x04;
    const HAS_TTL: u8 = 0x08;
    const HAS_DELETION: u8 = 0x10;
    const HAS_ALL_COLUMNS: u8 = 0x20;
    const HAS_COMPLEX_DELETION: u8 = 0x40;
    const EXTENSION: u8 = 0x80;

    pub fn is_end_of_partition(self) -> bool {
        self.0 & Self::END_OF_PARTITION != 0
    }

    pub fn is_range_tombstone_marker(self) -> bool {
        self.0 & Self::IS_MARKER != 0
    }

    pub fn has_timestamp(self) -> bool {
        self.0 & Self::HAS_TIMESTAMP != 0
    }

    pub fn has_ttl(self) -> bool {
        self.0 & Self::HAS_TTL != 0
    }

    pub fn has_deletion(self) -> bool {
        self.0 & Self::HAS_DELETION != 0
    }

    pub fn has_all_columns(self) -> bool {
        self.0 & Self::HAS_ALL_COLUMNS != 0
    }

    pub fn has_complex_deletion(self) -> bool {
        self.0 & Self::HAS_COMPLEX_DELETION != 0
    }

    pub fn has_extended_flags(self) -> bool {
        self.0 & Self::EXTENSION != 0
    }
}

/// The optional second flags byte of the 3.x dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnfilteredExtendedFlags(pub u8);

impl UnfilteredExtendedFlags {
    const IS_STATIC: u8 = 0x01;

    pub fn is_static(self) -> bool {
        self.0 & Self::IS_STATIC != 0
    }
}

/// The per-cell flags byte of the 3.x dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellFlags(pub u8);

impl CellFlags {
    const IS_DELETED: u8 = 0x01;
    const IS_EXPIRING: u8 = 0x02;
    const HAS_EMPTY_VALUE: u8 = 0x04;
    const USE_ROW_TIMESTAMP: u8 = 0x08;
    const USE_ROW_TTL: u8 = 0x10;

    pub fn is_deleted(self) -> bool {
        self.0 & Self::IS_DELETED != 0
    }

    pub fn is_expiring(self) -> bool {
        self.0 & Self::IS_EXPIRING != 0
    }

    pub fn has_value(self) -> bool {
        self.0 & Self::HAS_EMPTY_VALUE == 0
    }

    pub fn use_row_timestamp(self) -> bool {
        self.0 & Self::USE_ROW_TIMESTAMP != 0
    }

    pub fn use_row_ttl(self) -> bool {
        self.0 & Self::USE_ROW_TTL != 0
    }
}
