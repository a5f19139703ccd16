// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// Hot paths of the dispatcher:
//   1. Registry churn: register and cancel jobs under many live sessions
//   2. Queue admission: enqueue/dequeue round trip through the bounded queue
//   3. Prompt parsing: transport command split and backend request parsing

use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio_util::sync::CancellationToken;

use genbot::backend::dreambooth::TextToImageRequest;
use genbot::backend::fusionbrain::RunParams;
use genbot::dispatch::{Task, TaskQueue};
use genbot::session::{BackendKind, JobId, SessionRegistry};
use genbot::transport::split_command;

// ─── Helpers ────────────────────────────────────────────────────────────────

/// A registry with `n` sessions, each holding one DreamBooth job.
fn populated_registry(n: i64) -> SessionRegistry {
    let registry = SessionRegistry::new();
    for key in 0..n {
        registry
            .add_session(key, &format!("user{key}"))
            .expect("add session");
        registry
            .add_job(
                key,
                BackendKind::DreamBooth,
                JobId::new(100_000),
                CancellationToken::new(),
            )
            .expect("add job");
    }
    registry
}

fn task(i: i64) -> Task {
    Task {
        session: i,
        message_id: i,
        text: "a red fox in the snow".into(),
    }
}

// ─── Benchmark: Registry churn ──────────────────────────────────────────────

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for sessions in [10i64, 1_000, 10_000] {
        let registry = populated_registry(sessions);
        let key = sessions / 2;
        group.bench_with_input(
            BenchmarkId::new("add_cancel_job", sessions),
            &key,
            |b, &key| {
                b.iter(|| {
                    let id = JobId::new(200_000);
                    registry
                        .add_job(key, BackendKind::ChatGpt, id, CancellationToken::new())
                        .expect("add job");
                    registry
                        .cancel_job(black_box(key), BackendKind::ChatGpt, id)
                        .expect("cancel job");
                })
            },
        );
    }

    let registry = populated_registry(1_000);
    group.bench_function("count_jobs", |b| {
        b.iter(|| {
            registry
                .count_jobs(black_box(500), BackendKind::DreamBooth)
                .expect("count")
        })
    });

    group.finish();
}

// ─── Benchmark: Queue admission ─────────────────────────────────────────────

fn bench_queue(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("build runtime");
    let queue = TaskQueue::new(100);

    c.bench_function("queue_enqueue_dequeue", |b| {
        b.iter(|| {
            queue.try_enqueue(task(black_box(7))).expect("enqueue");
            rt.block_on(queue.dequeue()).expect("dequeue")
        })
    });
}

// ─── Benchmark: Prompt parsing ──────────────────────────────────────────────

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");

    group.bench_function("split_command", |b| {
        b.iter(|| split_command(black_box("/dreamBooth@genbot a red fox")))
    });

    let dreambooth = "prompt: Iron Man, masterpiece, dynamic lighting\n\
        negative_prompt: blurry, lowres\n\
        width: 512\n\
        height: 768\n\
        num_inference_steps: 30\n\
        guidance_scale: 7.5";
    group.bench_function("dreambooth_request", |b| {
        b.iter(|| TextToImageRequest::parse("midjourney", black_box(dreambooth)))
    });

    let styles: HashSet<String> = ["DEFAULT", "ANIME", "UHD", "KANDINSKY"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let fusionbrain = "Iron Man in a jungle, masterpiece\nblurry, lowres\n768\n512\nANIME";
    group.bench_function("fusionbrain_params", |b| {
        b.iter(|| RunParams::parse(black_box(fusionbrain), &styles))
    });

    group.finish();
}

// ─── Main ───────────────────────────────────────────────────────────────────

criterion_group!(benches, bench_registry, bench_queue, bench_parsing);
criterion_main!(benches);
