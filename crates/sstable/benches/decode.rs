use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use codec::{Driver, Proceed, SliceSource};
use sstable::{DeletionTime, FormatAParser, RowConsumer};

const N_PARTITIONS: usize = 1_000;
const CELLS_PER_PARTITION: usize = 10;
const VALUE_SIZE: usize = 100;

/// Consumer that only counts events, so the bench measures decoding.
#[derive(Default)]
struct Counting {
    cells: u64,
    rows: u64,
}

impl RowConsumer for Counting {
    fn consume_row_start(&mut self, _key: &[u8], _dt: DeletionTime) -> Proceed {
        Proceed::Yes
    }

    fn consume_cell(&mut self, _: &[u8], _: &[u8], _: i64, _: u32, _: u32) -> Proceed {
        self.cells += 1;
        Proceed::Yes
    }

    fn consume_counter_cell(&mut self, _: &[u8], _: &[u8], _: i64) -> Proceed {
        Proceed::Yes
    }

    fn consume_deleted_cell(&mut self, _: &[u8], _: DeletionTime) -> Proceed {
        Proceed::Yes
    }

    fn consume_shadowable_row_tombstone(&mut self, _: &[u8], _: DeletionTime) -> Proceed {
        Proceed::Yes
    }

    fn consume_range_tombstone(&mut self, _: &[u8], _: &[u8], _: DeletionTime) -> Proceed {
        Proceed::Yes
    }

    fn consume_row_end(&mut self) -> Proceed {
        self.rows += 1;
        Proceed::Yes
    }
}

fn build_stream() -> Vec<u8> {
    let mut out = Vec::new();
    let value = vec![b'x'; VALUE_SIZE];
    for p in 0..N_PARTITIONS {
        let key = format!("partition{p:06}");
        out.extend_from_slice(&(key.len() as u16).to_be_bytes());
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(i64::MIN as u64).to_be_bytes());
        for c in 0..CELLS_PER_PARTITION {
            let name = format!("col{c:02}");
            out.extend_from_slice(&(name.len() as u16).to_be_bytes());
            out.extend_from_slice(name.as_bytes());
            out.push(0x00);
            out.extend_from_slice(&(c as u64).to_be_bytes());
            out.extend_from_slice(&(value.len() as u32).to_be_bytes());
            out.extend_from_slice(&value);
        }
        out.extend_from_slice(&0u16.to_be_bytes());
    }
    out
}

fn decode_benchmark(c: &mut Criterion) {
    let stream = build_stream();
    let mut group = c.benchmark_group("format_a");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for &chunk in &[4096usize, 64 * 1024] {
        group.bench_function(format!("decode_chunk_{chunk}"), |b| {
            b.iter(|| {
                let mut consumer = Counting::default();
                let source = SliceSource::chunked(stream.clone(), chunk);
                let mut driver =
                    Driver::new(source, FormatAParser::new(&mut consumer), u64::MAX);
                driver.run().unwrap();
                assert_eq!(consumer.rows, N_PARTITIONS as u64);
                assert_eq!(consumer.cells, (N_PARTITIONS * CELLS_PER_PARTITION) as u64);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, decode_benchmark);
criterion_main!(benches);
