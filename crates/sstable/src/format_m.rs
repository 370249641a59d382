//! 3.x-dialect state processor.
//!
//! A partition is a short-length partition key, a 32+64-bit deletion time,
//! then unfiltereds until an end-of-partition flags byte. A clustering row
//! carries its clustering blocks (headers packed two bits per block,
//! thirty-two blocks per vint header word), a flag-driven row body, and its
//! columns filtered by the missing-columns selector. Timestamps, TTLs, and
//! local deletion times are vint deltas against the file's serialization
//! header, and individual cells may inherit the row-level values instead of
//! carrying their own.
//!
//! Same stepping discipline as the legacy machine: one `loop { match }`
//! over a flat state enum, paired follow-up states for suspended reads.

use bytes::Bytes;
use codec::{
    ByteSlot, DecodeError, FieldReader, IndexableElement, Proceed, ReadStatus, StateMachine,
};
use tracing::trace;

use crate::bitset::Bitset;
use crate::consumer::RowConsumerM;
use crate::types::{
    CellFlags, ClusteringKey, ColumnInfo, ColumnTranslation, DeletionTime, LivenessInfo,
    SerializationHeader, UnfilteredExtendedFlags, UnfilteredFlags, MAX_LOCAL_DELETION_TIME,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    PartitionStart,
    DeletionTime,
    DeletionTime2,
    DeletionTime3,
    Flags,
    Flags2,
    ExtendedFlags,
    ClusteringRow,
    CkBlock,
    CkBlockHeader,
    CkBlock2,
    CkBlockValueLength,
    CkBlockValueBytes,
    CkBlockEnd,
    ClusteringRowConsume,
    RowBody,
    RowBodySize,
    RowBodyPrevSize,
    RowBodyTimestamp,
    RowBodyTimestampTtl,
    RowBodyTimestampDeltime,
    RowBodyDeletion,
    RowBodyDeletion2,
    RowBodyDeletion3,
    RowBodyMissingColumns,
    RowBodyMissingColumns2,
    RowBodyMissingColumnsReadColumns,
    RowBodyMissingColumnsReadColumns2,
    Column,
    SimpleColumn,
    ComplexColumn,
    NextColumn,
    ColumnFlags,
    ColumnTimestamp,
    ColumnDeletionTime,
    ColumnDeletionTime2,
    ColumnTtl,
    ColumnTtl2,
    ColumnValue,
    ColumnValueLength,
    ColumnValueBytes,
    ColumnEnd,
    RangeTombstoneMarker,
}

fn non_consuming_state(state: State) -> bool {
    matches!(
        state,
        State::DeletionTime3
            | State::Flags2
            | State::ExtendedFlags
            | State::ClusteringRow
            | State::CkBlockHeader
            | State::CkBlockValueLength
            | State::CkBlockEnd
            | State::ClusteringRowConsume
            | State::RowBodyTimestampDeltime
            | State::RowBodyDeletion3
            | State::RowBodyMissingColumns2
            | State::RowBodyMissingColumnsReadColumns2
            | State::Column
            | State::NextColumn
            | State::ColumnTimestamp
            | State::ColumnDeletionTime2
            | State::ColumnTtl2
            | State::ColumnValueLength
            | State::ColumnEnd
    )
}

/// Which column list of the translation is armed for the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Static,
    Regular,
}

/// Decodes 3.x-dialect partitions and feeds a [`RowConsumerM`].
pub struct FormatMParser<'c, C: RowConsumerM> {
    consumer: &'c mut C,
    header: SerializationHeader,
    translation: ColumnTranslation,
    state: State,

    pk: ByteSlot,
    flags: UnfilteredFlags,
    extended_flags: UnfilteredExtendedFlags,
    liveness: LivenessInfo,
    is_first_unfiltered: bool,

    row_key: ClusteringKey,
    ck_pos: usize,
    ck_blocks_header: u64,
    ck_blocks_header_offset: u32,

    column_kind: ColumnKind,
    column_pos: usize,
    columns_selector: Bitset,
    missing_columns_to_read: u64,

    column_flags: CellFlags,
    column_timestamp: i64,
    column_ttl: u32,
    column_local_deletion_time: u32,
    column_value_length: usize,
    column_value: ByteSlot,
}

impl<'c, C: RowConsumerM> FormatMParser<'c, C> {
    /// `header` and `translation` come from the schema collaborator and
    /// stay frozen for the lifetime of the partition stream.
    pub fn new(
        consumer: &'c mut C,
        header: SerializationHeader,
        translation: ColumnTranslation,
    ) -> Self {
        FormatMParser {
            consumer,
            header,
            translation,
            state: State::PartitionStart,
            pk: ByteSlot::empty(),
            flags: UnfilteredFlags(0),
            extended_flags: UnfilteredExtendedFlags(0),
            liveness: LivenessInfo::default(),
            is_first_unfiltered: true,
            row_key: ClusteringKey::default(),
            ck_pos: 0,
            ck_blocks_header: 0,
            ck_blocks_header_offset: 0,
            column_kind: ColumnKind::Regular,
            column_pos: 0,
            columns_selector: Bitset::zeroed(0),
            missing_columns_to_read: 0,
            column_flags: CellFlags(0),
            column_timestamp: 0,
            column_ttl: 0,
            column_local_deletion_time: 0,
            column_value_length: 0,
            column_value: ByteSlot::empty(),
        }
    }

    fn active_columns(&self) -> &[ColumnInfo] {
        match self.column_kind {
            ColumnKind::Static => self.translation.static_columns(),
            ColumnKind::Regular => self.translation.regular_columns(),
        }
    }

    fn column_count(&self) -> usize {
        self.active_columns().len()
    }

    fn setup_columns(&mut self, kind: ColumnKind) {
        self.column_kind = kind;
        self.column_pos = 0;
    }

    fn no_more_columns(&self) -> bool {
        self.column_pos >= self.column_count()
    }

    fn current_column(&self) -> ColumnInfo {
        self.active_columns()[self.column_pos]
    }

    /// Collection columns are not represented in the translation yet, so
    /// every armed column is a simple cell.
    fn is_column_simple(&self) -> bool {
        true
    }

    fn skip_absent_columns(&mut self) {
        self.column_pos = self.columns_selector.find_first().unwrap_or(self.column_count());
    }

    fn move_to_next_column(&mut self) {
        self.column_pos = self
            .columns_selector
            .find_next(self.column_pos)
            .unwrap_or(self.column_count());
    }

    fn setup_ck(&mut self) {
        self.row_key.clear();
        self.ck_pos = 0;
        self.ck_blocks_header_offset = 0;
    }

    fn no_more_ck_blocks(&self) -> bool {
        self.ck_pos >= self.translation.clustering_fixed_lengths().len()
    }

    fn move_to_next_ck_block(&mut self) {
        self.ck_pos += 1;
        self.ck_blocks_header_offset += 1;
        if self.ck_blocks_header_offset == 32 {
            self.ck_blocks_header_offset = 0;
        }
    }

    /// A new header word is due every thirty-two blocks.
    fn should_read_block_header(&self) -> bool {
        self.ck_blocks_header_offset == 0
    }

    fn is_block_empty(&self) -> bool {
        (self.ck_blocks_header >> (2 * self.ck_blocks_header_offset)) & 1 == 1
    }

    fn ck_block_fixed_length(&self) -> Option<u32> {
        self.translation.clustering_fixed_lengths()[self.ck_pos]
    }
}

impl<C: RowConsumerM> StateMachine for FormatMParser<'_, C> {
    fn process_state(
        &mut self,
        fields: &mut FieldReader,
        data: &mut Bytes,
    ) -> Result<Proceed, DecodeError> {
        loop {
            if data.is_empty() && !non_consuming_state(self.state) {
                return Ok(Proceed::Yes);
            }
            trace!(state = ?self.state, len = data.len(), "format-M step");
            match self.state {
                State::PartitionStart => {
                    self.is_first_unfiltered = true;
                    if fields.read_short_length_bytes(data) == ReadStatus::NotReady {
                        self.state = State::DeletionTime;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::DeletionTime;
                }
                State::DeletionTime => {
                    if let Some(run) = fields.take_run() {
                        self.pk = run;
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
                    let ret = self.consumer.consume_partition_start(self.pk.as_slice(), deletion);
                    self.pk = ByteSlot::empty();
                    self.state = State::Flags;
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::Flags => {
                    self.liveness.reset();
                    if fields.read_u8(data) == ReadStatus::NotReady {
                        self.state = State::Flags2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::Flags2;
                }
                State::Flags2 => {
                    self.flags = UnfilteredFlags(fields.u8v);
                    if self.flags.is_end_of_partition() {
                        self.state = State::PartitionStart;
                        if self.consumer.consume_partition_end() == Proceed::No {
                            return Ok(Proceed::No);
                        }
                    } else if self.flags.is_range_tombstone_marker() {
                        self.state = State::RangeTombstoneMarker;
                    } else if !self.flags.has_extended_flags() {
                        self.extended_flags = UnfilteredExtendedFlags(0);
                        self.setup_columns(ColumnKind::Regular);
                        self.state = State::ClusteringRow;
                    } else if fields.read_u8(data) == ReadStatus::NotReady {
                        self.state = State::ExtendedFlags;
                        return Ok(Proceed::Yes);
                    } else {
                        self.state = State::ExtendedFlags;
                    }
                }
                State::ExtendedFlags => {
                    self.extended_flags = UnfilteredExtendedFlags(fields.u8v);
                    if self.extended_flags.is_static() {
                        if !self.is_first_unfiltered {
                            return Err(DecodeError::Malformed(
                                "static row must be the first unfiltered in a partition".into(),
                            ));
                        }
                        self.setup_columns(ColumnKind::Static);
                        self.is_first_unfiltered = false;
                        self.state = State::RowBody;
                        if self.consumer.consume_static_row_start() == Proceed::No {
                            return Ok(Proceed::No);
                        }
                    } else {
                        self.setup_columns(ColumnKind::Regular);
                        self.state = State::ClusteringRow;
                    }
                }
                State::ClusteringRow => {
                    self.is_first_unfiltered = false;
                    self.setup_ck();
                    self.state = State::CkBlock;
                }
                State::CkBlock => {
                    if self.no_more_ck_blocks() {
                        self.state = State::ClusteringRowConsume;
                        continue;
                    }
                    if !self.should_read_block_header() {
                        self.state = State::CkBlock2;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::CkBlockHeader;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CkBlockHeader;
                }
                State::CkBlockHeader => {
                    self.ck_blocks_header = fields.u64v;
                    self.state = State::CkBlock2;
                }
                State::CkBlock2 => {
                    if self.is_block_empty() {
                        self.row_key.push_absent();
                        self.move_to_next_ck_block();
                        self.state = State::CkBlock;
                        continue;
                    }
                    if let Some(len) = self.ck_block_fixed_length() {
                        self.column_value_length = len as usize;
                        self.state = State::CkBlockValueBytes;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::CkBlockValueLength;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CkBlockValueLength;
                }
                State::CkBlockValueLength => {
                    self.column_value_length = fields.u64v as usize;
                    self.state = State::CkBlockValueBytes;
                }
                State::CkBlockValueBytes => {
                    if fields.read_bytes(data, self.column_value_length) == ReadStatus::NotReady {
                        self.state = State::CkBlockEnd;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::CkBlockEnd;
                }
                State::CkBlockEnd => {
                    if let Some(run) = fields.take_run() {
                        self.row_key.push_value(run);
                    }
                    self.move_to_next_ck_block();
                    self.state = State::CkBlock;
                }
                State::ClusteringRowConsume => {
                    let ret = self.consumer.consume_row_start(&self.row_key);
                    self.row_key.clear();
                    self.state = State::RowBody;
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::RowBody => {
                    // row total size: only useful for skipping, ignored
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::RowBodySize;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodySize;
                }
                State::RowBodySize => {
                    // previous row size: likewise ignored
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::RowBodyPrevSize;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyPrevSize;
                }
                State::RowBodyPrevSize => {
                    if !self.flags.has_timestamp() {
                        self.state = State::RowBodyDeletion;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::RowBodyTimestamp;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyTimestamp;
                }
                State::RowBodyTimestamp => {
                    self.liveness.set_timestamp(&self.header, fields.u64v);
                    if !self.flags.has_ttl() {
                        self.state = State::RowBodyDeletion;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::RowBodyTimestampTtl;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyTimestampTtl;
                }
                State::RowBodyTimestampTtl => {
                    self.liveness.set_ttl(&self.header, fields.u64v);
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::RowBodyTimestampDeltime;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyTimestampDeltime;
                }
                State::RowBodyTimestampDeltime => {
                    self.liveness.set_local_deletion_time(&self.header, fields.u64v);
                    self.state = State::RowBodyDeletion;
                }
                State::RowBodyDeletion => {
                    if !self.flags.has_deletion() {
                        self.state = State::RowBodyMissingColumns;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::RowBodyDeletion2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyDeletion2;
                }
                State::RowBodyDeletion2 => {
                    // Row-level marked-for-delete-at: read off the wire but
                    // dropped.
                    // TODO: surface the row deletion once the consumer
                    // contract grows a hook for it.
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::RowBodyDeletion3;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyDeletion3;
                }
                State::RowBodyDeletion3 => {
                    // Row-level local deletion time: dropped likewise.
                    self.state = State::RowBodyMissingColumns;
                }
                State::RowBodyMissingColumns => {
                    if self.flags.has_all_columns() {
                        self.columns_selector = Bitset::all_set(self.column_count());
                        self.state = State::Column;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::RowBodyMissingColumns2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyMissingColumns2;
                }
                State::RowBodyMissingColumns2 => {
                    let encoded = fields.u64v;
                    let count = self.column_count();
                    if count < 64 {
                        self.columns_selector = Bitset::from_missing_bitmap(encoded, count);
                        self.skip_absent_columns();
                        self.state = State::Column;
                        continue;
                    }
                    if encoded > count as u64 {
                        return Err(DecodeError::Malformed(
                            "missing-column count exceeds the column count".into(),
                        ));
                    }
                    // The shorter of the two sides is listed explicitly:
                    // present columns when few are present, missing columns
                    // otherwise.
                    if count as u64 - encoded < count as u64 / 2 {
                        self.missing_columns_to_read = count as u64 - encoded;
                        self.columns_selector = Bitset::zeroed(count);
                    } else {
                        self.missing_columns_to_read = encoded;
                        self.columns_selector = Bitset::all_set(count);
                    }
                    self.state = State::RowBodyMissingColumnsReadColumns;
                }
                State::RowBodyMissingColumnsReadColumns => {
                    if self.missing_columns_to_read == 0 {
                        self.skip_absent_columns();
                        self.state = State::Column;
                        continue;
                    }
                    self.missing_columns_to_read -= 1;
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::RowBodyMissingColumnsReadColumns2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::RowBodyMissingColumnsReadColumns2;
                }
                State::RowBodyMissingColumnsReadColumns2 => {
                    let index = fields.u64v as usize;
                    if index >= self.column_count() {
                        return Err(DecodeError::Malformed(
                            "column index out of range in missing-columns listing".into(),
                        ));
                    }
                    self.columns_selector.flip(index);
                    self.state = State::RowBodyMissingColumnsReadColumns;
                }
                State::Column => {
                    if self.no_more_columns() {
                        self.state = State::Flags;
                        if self.consumer.consume_row_end(&self.liveness) == Proceed::No {
                            return Ok(Proceed::No);
                        }
                        continue;
                    }
                    if !self.is_column_simple() {
                        self.state = State::ComplexColumn;
                        continue;
                    }
                    self.state = State::SimpleColumn;
                }
                State::SimpleColumn => {
                    if fields.read_u8(data) == ReadStatus::NotReady {
                        self.state = State::ColumnFlags;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnFlags;
                }
                State::ColumnFlags => {
                    self.column_flags = CellFlags(fields.u8v);
                    if self.column_flags.use_row_timestamp() {
                        self.column_timestamp = self.liveness.timestamp;
                        self.state = State::ColumnDeletionTime;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::ColumnTimestamp;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnTimestamp;
                }
                State::ColumnTimestamp => {
                    self.column_timestamp = self.header.parse_timestamp(fields.u64v);
                    self.state = State::ColumnDeletionTime;
                }
                State::ColumnDeletionTime => {
                    if self.column_flags.use_row_ttl() {
                        self.column_local_deletion_time = self.liveness.local_deletion_time;
                        self.state = State::ColumnTtl;
                        continue;
                    }
                    if !self.column_flags.is_deleted() && !self.column_flags.is_expiring() {
                        self.column_local_deletion_time = MAX_LOCAL_DELETION_TIME;
                        self.state = State::ColumnTtl;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::ColumnDeletionTime2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnDeletionTime2;
                }
                State::ColumnDeletionTime2 => {
                    self.column_local_deletion_time = self.header.parse_expiry(fields.u64v);
                    self.state = State::ColumnTtl;
                }
                State::ColumnTtl => {
                    if self.column_flags.use_row_timestamp() {
                        self.column_ttl = self.liveness.ttl;
                        self.state = State::ColumnValue;
                        continue;
                    }
                    if !self.column_flags.is_expiring() {
                        self.column_ttl = 0;
                        self.state = State::ColumnValue;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::ColumnTtl2;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnTtl2;
                }
                State::ColumnTtl2 => {
                    self.column_ttl = self.header.parse_ttl(fields.u64v);
                    self.state = State::ColumnValue;
                }
                State::ColumnValue => {
                    if !self.column_flags.has_value() {
                        self.column_value = ByteSlot::empty();
                        self.state = State::ColumnEnd;
                        continue;
                    }
                    if let Some(len) = self.current_column().fixed_length {
                        self.column_value_length = len as usize;
                        self.state = State::ColumnValueBytes;
                        continue;
                    }
                    if fields.read_unsigned_vint(data) == ReadStatus::NotReady {
                        self.state = State::ColumnValueLength;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnValueLength;
                }
                State::ColumnValueLength => {
                    self.column_value_length = fields.u64v as usize;
                    self.state = State::ColumnValueBytes;
                }
                State::ColumnValueBytes => {
                    if fields.read_bytes(data, self.column_value_length) == ReadStatus::NotReady {
                        self.state = State::ColumnEnd;
                        return Ok(Proceed::Yes);
                    }
                    self.state = State::ColumnEnd;
                }
                State::ColumnEnd => {
                    if let Some(run) = fields.take_run() {
                        self.column_value = run;
                    }
                    self.state = State::NextColumn;
                    let column = self.current_column();
                    let ret = self.consumer.consume_column(
                        column.id,
                        self.column_value.as_slice(),
                        self.column_timestamp,
                        self.column_ttl,
                        self.column_local_deletion_time,
                    );
                    self.column_value = ByteSlot::empty();
                    if ret == Proceed::No {
                        return Ok(Proceed::No);
                    }
                }
                State::NextColumn => {
                    self.move_to_next_column();
                    self.state = State::Column;
                }
                State::ComplexColumn => {
                    return Err(DecodeError::Unsupported("complex (multi-cell) columns"));
                }
                State::RangeTombstoneMarker => {
                    return Err(DecodeError::Unsupported("range tombstone markers"));
                }
            }
        }
    }

    fn non_consuming(&self) -> bool {
        non_consuming_state(self.state)
    }

    fn verify_end_state(&mut self) -> Result<(), DecodeError> {
        if self.state != State::PartitionStart {
            return Err(DecodeError::Malformed(
                "end of input, but not end of partition".into(),
            ));
        }
        Ok(())
    }

    fn reset(&mut self, element: IndexableElement) {
        match element {
            IndexableElement::Partition => {
                self.state = State::PartitionStart;
                self.pk = ByteSlot::empty();
                self.row_key.clear();
                self.liveness.reset();
            }
            IndexableElement::Cell => {
                panic!("3.x streams can only be repositioned to a partition start")
            }
        }
        self.consumer.reset(element);
    }
}
