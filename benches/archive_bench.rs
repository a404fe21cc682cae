use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lmtlss_core::{
    ArchiveStore, Compiler, EventRecord, EventType, GraphStore, NewNode, NodeType, PartialWeight,
    SoulConfig, StoragePaths,
};
use serde_json::json;
use std::hint::black_box;

const EVENT_COUNTS: &[usize] = &[1_000, 10_000];

fn seed_archive(count: usize) -> ArchiveStore {
    let archive = ArchiveStore::open_in_memory().expect("failed to open archive");
    for i in 0..count {
        let session = format!("s{}", i % 8);
        archive
            .append_to_session(
                EventRecord::new(&session, EventType::Message, "soul")
                    .with_payload(json!({ "kind": "inbound", "text": format!("message {i}") })),
            )
            .expect("append failed");
    }
    archive
}

fn bench_append(c: &mut Criterion) {
    let archive = ArchiveStore::open_in_memory().expect("failed to open archive");
    let mut i = 0u64;
    c.bench_function("archive_append_to_session", |b| {
        b.iter(|| {
            i += 1;
            archive
                .append_to_session(
                    EventRecord::new("bench", EventType::Message, "soul")
                        .with_payload(json!({ "text": i })),
                )
                .expect("append failed")
        });
    });
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_hash_chain");
    group.sample_size(20);
    for &count in EVENT_COUNTS {
        let archive = seed_archive(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(archive.verify_hash_chain().expect("verify failed")));
        });
    }
    group.finish();
}

fn bench_capsule(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().expect("failed to create tempdir");
    let graph = GraphStore::open_in_memory().expect("failed to open graph");
    for i in 0..5_000 {
        graph
            .create_node(
                NewNode::new(&format!("belief number {i}"), NodeType::ALL[i % 9], "bench")
                    .with_weight(PartialWeight {
                        salience: Some((i % 100) as f64 / 100.0),
                        ..Default::default()
                    }),
            )
            .expect("create failed");
    }
    let compiler = Compiler::new(&graph, StoragePaths::new(temp_dir.path()), SoulConfig::default())
        .with_backup_writer(None);
    c.bench_function("capsule_render_5000_nodes", |b| {
        b.iter(|| black_box(compiler.render().expect("render failed")));
    });
}

criterion_group!(benches, bench_append, bench_verify, bench_capsule);
criterion_main!(benches);
