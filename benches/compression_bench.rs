use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use s_archive::{
    compress, extract, ArchiveDescriptor, ArchiveFormat, ArchiveWriter, CompressionLevel,
    EngineOptions, EntryHeader,
};
use std::fs;
use std::io::{Cursor, Write};
use tempfile::tempdir;

fn generate_compressible_data(size: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    // LCG noise, close to incompressible
    let mut data = Vec::with_capacity(size);
    let mut state = 0x12345678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// Single entry pushed through the composer into memory
fn write_one(format: ArchiveFormat, level: CompressionLevel, data: &[u8]) -> usize {
    let mut writer = ArchiveWriter::open(format.triple(), Cursor::new(Vec::new()), level).unwrap();
    let mut entry = writer
        .start_entry(&EntryHeader::file("data.bin", data.len() as u64))
        .unwrap();
    for chunk in data.chunks(64 * 1024) {
        entry.write_all(chunk).unwrap();
    }
    entry.finish().unwrap();
    writer.finish().unwrap().into_inner().len()
}

fn bench_formats(c: &mut Criterion) {
    for size in [10 * 1024, 1024 * 1024] {
        for (kind, data) in [
            ("compressible", generate_compressible_data(size)),
            ("random", generate_random_data(size)),
        ] {
            let mut group = c.benchmark_group(format!("write_{}_{}", kind, format_size(size)));
            group.throughput(Throughput::Bytes(size as u64));
            group.sample_size(10);

            for format in ArchiveFormat::ALL {
                group.bench_with_input(
                    BenchmarkId::from_parameter(format.identifier()),
                    &data,
                    |b, data| {
                        b.iter(|| write_one(format, CompressionLevel::Default, black_box(data)))
                    },
                );
            }
            group.finish();
        }
    }
}

fn bench_levels(c: &mut Criterion) {
    let data = generate_compressible_data(1024 * 1024);
    let mut group = c.benchmark_group("tar_gz_levels");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.sample_size(10);

    for level in [1, 6, 9] {
        group.bench_with_input(BenchmarkId::new("level", level), &data, |b, data| {
            b.iter(|| {
                write_one(
                    ArchiveFormat::TarGz,
                    CompressionLevel::Level(level),
                    black_box(data),
                )
            })
        });
    }
    group.finish();
}

fn bench_directory_roundtrip(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let root = dir.path().join("tree");
    for d in 0..10 {
        let sub = root.join(format!("dir_{}", d));
        fs::create_dir_all(&sub).unwrap();
        for f in 0..10 {
            fs::write(
                sub.join(format!("file_{}.txt", f)),
                generate_compressible_data(8 * 1024),
            )
            .unwrap();
        }
    }

    let mut group = c.benchmark_group("directory_roundtrip_100_files");
    group.sample_size(10);

    for format in [ArchiveFormat::Zip, ArchiveFormat::TarGz, ArchiveFormat::TarXz] {
        group.bench_function(format.identifier(), |b| {
            b.iter(|| {
                let out = tempdir().unwrap();
                let descriptor = ArchiveDescriptor::builder(format)
                    .input(&root)
                    .output_dir(out.path())
                    .archive_name("bench")
                    .build()
                    .unwrap();
                let options = EngineOptions::default();
                let report = compress(&descriptor, &options).unwrap();
                extract(&report.archive_path, out.path().join("x"), &options).unwrap();
            });
        });
    }
    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{}MB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}B", bytes)
    }
}

criterion_group!(
    benches,
    bench_formats,
    bench_levels,
    bench_directory_roundtrip
);
criterion_main!(benches);
