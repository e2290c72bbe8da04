//! Publish and consume throughput on the in-memory backend

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;
use vigil_workspace::{AgentId, MessageQueue, Payload, QueueConfig};

fn event_payload(n: usize) -> Payload {
    let mut payload = Payload::new();
    payload.insert(
        "disaster_event".into(),
        json!({"id": format!("evt-{n}"), "confidence": 0.9, "severity": 0.8}),
    );
    payload
}

fn queue() -> MessageQueue {
    MessageQueue::in_memory(QueueConfig {
        consume_timeout: Duration::from_millis(10),
        ..QueueConfig::default()
    })
}

fn bench_publish(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let queue = queue();
    let sender = AgentId::parse("watchtower").unwrap();
    let recipient = AgentId::parse("auditor").unwrap();

    c.bench_function("publish_single", |b| {
        b.to_async(&rt).iter(|| async {
            let delivery = queue
                .publish(&sender, &recipient, black_box(event_payload(1)))
                .await;
            black_box(delivery)
        });
    });

    rt.block_on(async {
        let _ = queue.clear_queue(&recipient).await;
    });
}

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("publish_then_consume_batch");

    for size in [1usize, 10, 100] {
        let queue = queue();
        let sender = AgentId::parse("watchtower").unwrap();
        let recipient = AgentId::parse("auditor").unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async {
                for n in 0..size {
                    queue.publish(&sender, &recipient, event_payload(n)).await;
                }
                let batch = queue.consume_batch(&recipient, size).await;
                black_box(batch.len())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_publish, bench_round_trip);
criterion_main!(benches);
