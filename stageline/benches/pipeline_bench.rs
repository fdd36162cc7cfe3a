//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stageline::prelude::*;

const VALUES: u64 = 1_000;

async fn square(_ctx: Context, input: Receiver<u64>, output: Sender<u64>) -> anyhow::Result<()> {
    while let Some(n) = input.recv().await {
        output.send(n * n).await?;
    }
    Ok(())
}

async fn run_pipeline(workers: usize, buffered: bool) -> usize {
    let step = Step::worker("square", workers, square).with_buffered(buffered);
    let pipeline = Pipeline::new("bench", vec![Stage::serial("math", vec![step])]);

    let (tx, rx) = channel(MAX_BUFFER_SIZE);
    let out = pipeline.process(&CancellationToken::new(), rx).await;
    tokio::spawn(async move {
        for n in 0..VALUES {
            if tx.send(n).await.is_err() {
                break;
            }
        }
        tx.close();
    });

    let count = out.collect().await.len();
    let _ = pipeline.wait().await;
    count
}

fn pipeline_benchmark(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Builder::new_multi_thread().enable_all().build() else {
        return;
    };

    let mut group = c.benchmark_group("competing_workers");
    group.throughput(Throughput::Elements(VALUES));
    for workers in [1, 4, 16] {
        for buffered in [false, true] {
            let id = BenchmarkId::new(if buffered { "buffered" } else { "unbuffered" }, workers);
            group.bench_with_input(id, &workers, |b, &workers| {
                b.iter(|| black_box(runtime.block_on(run_pipeline(workers, buffered))));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
