use std::time::Duration;

use criterion::measurement::WallTime;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion, Throughput};
use slot_codegen::codegen::RoutineCache;
use slot_codegen::convert::TextConverter;
use slot_codegen::{ConversionPolicy, SlotType, Tuple, TupleLayout, TupleWriter};

const ROWS: usize = 4096;

/// `id|name|score|active|qty`, with a null and a bad value now and then.
fn make_lines(count: usize) -> Vec<Vec<u8>> {
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..count)
        .map(|row| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let score = (seed % 100_000) as f64 / 100.0;
            let qty = match row % 97 {
                0 => "\\N".to_string(),
                1 => "oops".to_string(),
                _ => ((seed >> 20) % 30_000).to_string(),
            };
            let active = if seed & 1 == 0 { "true" } else { "false" };
            format!("{row}|customer-{:08x}|{score}|{active}|{qty}", seed as u32).into_bytes()
        })
        .collect()
}

fn split(line: &[u8]) -> Vec<&[u8]> {
    line.split(|b| *b == b'|').collect()
}

fn layout() -> TupleLayout {
    TupleLayout::builder()
        .slots([
            SlotType::BigInt,
            SlotType::Varchar { max_len: 16 },
            SlotType::Double,
            SlotType::Boolean,
            SlotType::SmallInt,
        ])
        .build()
        .unwrap()
}

fn bench_rows(group: &mut BenchmarkGroup<'_, WallTime>, name: &str, writer: &TupleWriter, rows: &[Vec<&[u8]>]) {
    let mut tuple = Tuple::new(writer.layout());
    group.bench_function(BenchmarkId::new(name, rows.len()), |b| {
        b.iter(|| {
            let mut errors = 0;
            for fields in rows {
                errors += writer.write_tuple(black_box(fields), tuple.as_bytes_mut()).error_count();
            }
            black_box(errors)
        })
    });
}

fn bench_single_slot(c: &mut Criterion, fields: &[&[u8]]) {
    let layout = TupleLayout::builder().slot(SlotType::Int).build().unwrap();
    let slot = &layout.slots()[0];
    let converter = TextConverter::default();
    let routine = slot_codegen::generate(&layout, slot, converter.policy()).unwrap();
    let mut tuple = Tuple::new(&layout);

    let mut group = c.benchmark_group("write_slot_int");
    group.throughput(Throughput::Elements(fields.len() as u64));
    group.bench_function("interpreted", |b| {
        b.iter(|| {
            for field in fields {
                black_box(converter.write_slot(slot, black_box(field), tuple.as_bytes_mut()));
            }
        })
    });
    group.bench_function("generated", |b| {
        b.iter(|| {
            for field in fields {
                black_box(routine.invoke(black_box(field), tuple.as_bytes_mut()));
            }
        })
    });
    group.finish();
}

fn criterion_config() -> Criterion {
    if std::env::var("SLOT_BENCH_MINIMAL").is_ok() {
        Criterion::default()
            .warm_up_time(Duration::from_secs(0))
            .measurement_time(Duration::from_millis(10))
            .sample_size(10)
            .nresamples(1)
    } else {
        Criterion::default()
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let lines = make_lines(ROWS);
    let rows: Vec<Vec<&[u8]>> = lines.iter().map(|line| split(line)).collect();
    let bytes: usize = lines.iter().map(Vec::len).sum();

    let layout = layout();
    let policy = ConversionPolicy::default();
    let cache = RoutineCache::default();
    let generated = TupleWriter::new(layout.clone(), TextConverter::new(policy.clone()), &cache).unwrap();
    let interpreted = TupleWriter::interpreted(layout, TextConverter::new(policy));

    let mut group = c.benchmark_group("write_tuple");
    group.throughput(Throughput::Bytes(bytes as u64));
    bench_rows(&mut group, "interpreted", &interpreted, &rows);
    bench_rows(&mut group, "generated", &generated, &rows);
    group.finish();

    let ints: Vec<&[u8]> = rows.iter().map(|fields| fields[0]).collect();
    bench_single_slot(c, &ints);
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = criterion_benchmark
}
criterion_main!(benches);
