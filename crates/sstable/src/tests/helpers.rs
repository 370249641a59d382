//! Shared test rig: a byte-stream builder and recording consumers.

use codec::{DecodeError, Driver, IndexableElement, Proceed, RunOutcome, SliceSource};

use crate::{
    ColumnId, ColumnTranslation, DeletionTime, FormatAParser, FormatMParser, LivenessInfo,
    RowConsumer, RowConsumerM, SerializationHeader,
};

/// Builder for hand-written wire streams (big-endian throughout).
#[derive(Default)]
pub struct Enc {
    buf: Vec<u8>,
}

impl Enc {
    pub fn new() -> Self {
        Enc::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(mut self, v: &[u8]) -> Self {
        self.buf.extend_from_slice(v);
        self
    }

    /// u16 length prefix + bytes.
    pub fn short_bytes(self, v: &[u8]) -> Self {
        self.u16(v.len() as u16).bytes(v)
    }

    /// Unsigned vint: the first byte's leading ones give the number of
    /// continuation bytes.
    pub fn vint(mut self, v: u64) -> Self {
        let mut extra = 0usize;
        while extra < 8 && (v >> (7 + 7 * extra)) != 0 {
            extra += 1;
        }
        if extra == 8 {
            self.buf.push(0xff);
            self.buf.extend_from_slice(&v.to_be_bytes());
        } else {
            self.buf.push(!(0xffu8 >> extra) | (v >> (8 * extra)) as u8);
            for i in (0..extra).rev() {
                self.buf.push((v >> (8 * i)) as u8);
            }
        }
        self
    }

    pub fn done(self) -> Vec<u8> {
        self.buf
    }
}

// -------------------- format A recording consumer --------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AEvent {
    RowStart {
        key: Vec<u8>,
        deletion: DeletionTime,
    },
    Cell {
        name: Vec<u8>,
        value: Vec<u8>,
        timestamp: i64,
        ttl: u32,
        expiration: u32,
    },
    CounterCell {
        name: Vec<u8>,
        value: Vec<u8>,
        timestamp: i64,
    },
    DeletedCell {
        name: Vec<u8>,
        deletion: DeletionTime,
    },
    ShadowableRowTombstone {
        name: Vec<u8>,
        deletion: DeletionTime,
    },
    RangeTombstone {
        start: Vec<u8>,
        end: Vec<u8>,
        deletion: DeletionTime,
    },
    RowEnd,
}

#[derive(Default)]
pub struct RecordingA {
    pub events: Vec<AEvent>,
    pub resets: Vec<IndexableElement>,
    /// Pause once, right after the event with this index.
    pub stop_at: Option<usize>,
}

impl RecordingA {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stopping_at(index: usize) -> Self {
        RecordingA {
            stop_at: Some(index),
            ..Self::default()
        }
    }

    fn push(&mut self, event: AEvent) -> Proceed {
        self.events.push(event);
        if self.stop_at == Some(self.events.len() - 1) {
            Proceed::No
        } else {
            Proceed::Yes
        }
    }
}

impl RowConsumer for RecordingA {
    fn consume_row_start(&mut self, key: &[u8], deletion: DeletionTime) -> Proceed {
        self.push(AEvent::RowStart {
            key: key.to_vec(),
            deletion,
        })
    }

    fn consume_cell(
        &mut self,
        name: &[u8],
        value: &[u8],
        timestamp: i64,
        ttl: u32,
        expiration: u32,
    ) -> Proceed {
        self.push(AEvent::Cell {
            name: name.to_vec(),
            value: value.to_vec(),
            timestamp,
            ttl,
            expiration,
        })
    }

    fn consume_counter_cell(&mut self, name: &[u8], value: &[u8], timestamp: i64) -> Proceed {
        self.push(AEvent::CounterCell {
            name: name.to_vec(),
            value: value.to_vec(),
            timestamp,
        })
    }

    fn consume_deleted_cell(&mut self, name: &[u8], deletion: DeletionTime) -> Proceed {
        self.push(AEvent::DeletedCell {
            name: name.to_vec(),
            deletion,
        })
    }

    fn consume_shadowable_row_tombstone(&mut self, name: &[u8], deletion: DeletionTime) -> Proceed {
        self.push(AEvent::ShadowableRowTombstone {
            name: name.to_vec(),
            deletion,
        })
    }

    fn consume_range_tombstone(
        &mut self,
        start: &[u8],
        end: &[u8],
        deletion: DeletionTime,
    ) -> Proceed {
        self.push(AEvent::RangeTombstone {
            start: start.to_vec(),
            end: end.to_vec(),
            deletion,
        })
    }

    fn consume_row_end(&mut self) -> Proceed {
        self.push(AEvent::RowEnd)
    }

    fn reset(&mut self, element: IndexableElement) {
        self.resets.push(element);
    }
}

/// Decode `stream` in `chunk`-sized slices, resuming over pauses until the
/// driver finishes or fails. Returns the recorded events alongside the
/// terminal result.
pub fn drive_a(
    stream: &[u8],
    chunk: usize,
    consumer: RecordingA,
) -> (Vec<AEvent>, Result<RunOutcome, DecodeError>) {
    let mut consumer = consumer;
    let result = {
        let source = SliceSource::chunked(stream.to_vec(), chunk);
        let mut driver = Driver::new(source, FormatAParser::new(&mut consumer), u64::MAX);
        loop {
            match driver.run() {
                Ok(RunOutcome::Paused) => continue,
                other => break other,
            }
        }
    };
    (consumer.events, result)
}

pub fn decode_a(stream: &[u8], chunk: usize) -> Vec<AEvent> {
    let (events, result) = drive_a(stream, chunk, RecordingA::new());
    assert_eq!(result.expect("stream must decode"), RunOutcome::Finished);
    events
}

// -------------------- format M recording consumer --------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MEvent {
    PartitionStart {
        key: Vec<u8>,
        deletion: DeletionTime,
    },
    PartitionEnd,
    RowStart {
        blocks: Vec<Option<Vec<u8>>>,
    },
    StaticRowStart,
    Column {
        id: Option<ColumnId>,
        value: Vec<u8>,
        timestamp: i64,
        ttl: u32,
        local_deletion_time: u32,
    },
    RowEnd {
        liveness: LivenessInfo,
    },
}

#[derive(Default)]
pub struct RecordingM {
    pub events: Vec<MEvent>,
    pub resets: Vec<IndexableElement>,
    pub stop_at: Option<usize>,
}

impl RecordingM {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stopping_at(index: usize) -> Self {
        RecordingM {
            stop_at: Some(index),
            ..Self::default()
        }
    }

    fn push(&mut self, event: MEvent) -> Proceed {
        self.events.push(event);
        if self.stop_at == Some(self.events.len() - 1) {
            Proceed::No
        } else {
            Proceed::Yes
        }
    }
}

impl RowConsumerM for RecordingM {
    fn consume_partition_start(&mut self, key: &[u8], deletion: DeletionTime) -> Proceed {
        self.push(MEvent::PartitionStart {
            key: key.to_vec(),
            deletion,
        })
    }

    fn consume_partition_end(&mut self) -> Proceed {
        self.push(MEvent::PartitionEnd)
    }

    fn consume_row_start(&mut self, clustering_key: &crate::ClusteringKey) -> Proceed {
        self.push(MEvent::RowStart {
            blocks: clustering_key
                .iter()
                .map(|b| b.map(<[u8]>::to_vec))
                .collect(),
        })
    }

    fn consume_static_row_start(&mut self) -> Proceed {
        self.push(MEvent::StaticRowStart)
    }

    fn consume_column(
        &mut self,
        id: Option<ColumnId>,
        value: &[u8],
        timestamp: i64,
        ttl: u32,
        local_deletion_time: u32,
    ) -> Proceed {
        self.push(MEvent::Column {
            id,
            value: value.to_vec(),
            timestamp,
            ttl,
            local_deletion_time,
        })
    }

    fn consume_row_end(&mut self, liveness: &LivenessInfo) -> Proceed {
        self.push(MEvent::RowEnd {
            liveness: *liveness,
        })
    }

    fn reset(&mut self, element: IndexableElement) {
        self.resets.push(element);
    }
}

pub fn drive_m(
    stream: &[u8],
    chunk: usize,
    header: SerializationHeader,
    translation: ColumnTranslation,
    consumer: RecordingM,
) -> (Vec<MEvent>, Result<RunOutcome, DecodeError>) {
    let mut consumer = consumer;
    let result = {
        let source = SliceSource::chunked(stream.to_vec(), chunk);
        let machine = FormatMParser::new(&mut consumer, header, translation);
        let mut driver = Driver::new(source, machine, u64::MAX);
        loop {
            match driver.run() {
                Ok(RunOutcome::Paused) => continue,
                other => break other,
            }
        }
    };
    (consumer.events, result)
}

pub fn decode_m(
    stream: &[u8],
    chunk: usize,
    header: SerializationHeader,
    translation: ColumnTranslation,
) -> Vec<MEvent> {
    let (events, result) = drive_m(stream, chunk, header, translation, RecordingM::new());
    assert_eq!(result.expect("stream must decode"), RunOutcome::Finished);
    events
}
