//! Record pass benchmarks.
//!
//! Run with: cargo bench --bench record_benchmark
//!
//! - layout: record layout of groups with many channels
//! - decode: fixed records dispatched to an observer
//! - vlsd: VLSD size accumulation and record indexing

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mdf4_cg::blocks::CN_FLAG_INVALIDATION_BIT_VALID;
use mdf4_cg::{
    CG_FLAG_VLSD, Channel, ChannelGroup, ChannelType, DataType, RecordIndex, SampleObservers,
    VecWriter,
};
use std::io::{Cursor, Seek, SeekFrom};

fn fixed_group(num_channels: usize) -> ChannelGroup {
    let mut group = ChannelGroup::new(1, "bench");
    for i in 0..num_channels {
        let mut channel = Channel::new(
            &format!("c{i}"),
            ChannelType::FixedLength,
            DataType::UnsignedIntegerLE,
            16,
        );
        if i % 3 == 0 {
            channel.set_flags(CN_FLAG_INVALIDATION_BIT_VALID);
        }
        // the group is unwritten, so adding cannot fail
        let _ = group.add_channel(channel);
    }
    group
}

/// VLSD record stream with payloads of 0..max_len bytes.
fn vlsd_stream(num_records: usize, max_len: usize) -> (ChannelGroup, Vec<u8>) {
    let mut group = ChannelGroup::new(2, "vlsd");
    group.set_flags(CG_FLAG_VLSD);
    let mut writer = VecWriter::new();
    for i in 0..num_records {
        let payload = vec![i as u8; i % max_len];
        let _ = group.append_vlsd_record(&mut writer, &payload);
    }
    (group, writer.into_inner())
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    for num_channels in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_channels),
            &num_channels,
            |b, &n| {
                let mut cg = fixed_group(n);
                b.iter(|| {
                    let _ = cg.prepare_for_writing();
                    black_box(cg.data_bytes())
                });
            },
        );
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for num_records in [1_000u64, 100_000] {
        let mut cg = fixed_group(16);
        let _ = cg.prepare_for_writing();
        let record_len = cg.sample_buffer().len();
        cg.set_nof_samples(num_records);
        let bytes = vec![0x5Au8; record_len * num_records as usize];

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_records),
            &bytes,
            |b, bytes| {
                let mut cursor = Cursor::new(bytes.as_slice());
                b.iter(|| {
                    let mut sum = 0u64;
                    let mut observers = SampleObservers::new();
                    observers.attach(|_: u64, _: u64, record: &[u8]| {
                        sum += u64::from(record[0]);
                    });
                    cg.reset_sample();
                    let _ = cursor.seek(SeekFrom::Start(0));
                    while let Ok(n) = cg.read_data_record(&mut cursor, &mut observers) {
                        if n == 0 {
                            break;
                        }
                    }
                    drop(observers);
                    black_box(sum)
                });
            },
        );
    }
    group.finish();
}

fn bench_vlsd(c: &mut Criterion) {
    let mut group = c.benchmark_group("vlsd");
    let (template, bytes) = vlsd_stream(50_000, 64);
    let end = bytes.len() as u64;
    group.throughput(Throughput::Bytes(end));

    group.bench_function("accumulate_size", |b| {
        b.iter(|| {
            let mut cg = template.clone();
            cg.set_nof_samples(0);
            cg.set_vlsd_size(0);
            let mut cursor = Cursor::new(bytes.as_slice());
            while matches!(cg.update_vlsd_size(&mut cursor), Ok(n) if n > 0) {}
            black_box(cg.vlsd_size())
        });
    });

    group.bench_function("record_index", |b| {
        b.iter(|| {
            let mut cg = template.clone();
            let mut cursor = Cursor::new(bytes.as_slice());
            let index = RecordIndex::build(&mut cg, &mut cursor, 0, end);
            black_box(index.map(|i| i.len()).unwrap_or(0))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_layout, bench_decode, bench_vlsd);
criterion_main!(benches);
