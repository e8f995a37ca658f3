use criterion::{black_box, criterion_group, criterion_main, Criterion};
use demand_pipeline::subscription::{self, EventBatch, MaxDemand};

fn benchmark_request_deliver_roundtrip(c: &mut Criterion) {
    c.bench_function("subscription_roundtrip_1000", |b| {
        b.iter(|| {
            let (up, mut down) = subscription::connect::<u64>(MaxDemand::Unbounded);
            for i in 0..1000u64 {
                down.request(1).expect("Request failed");
                let amount = up.await_demand().expect("Demand lost");
                up.deliver(EventBatch::exact(vec![black_box(i); amount]))
                    .expect("Deliver failed");
                black_box(down.await_events().expect("Events lost"));
            }
        });
    });
}

fn benchmark_capped_request(c: &mut Criterion) {
    c.bench_function("subscription_capped_request_1000", |b| {
        b.iter(|| {
            let (up, mut down) = subscription::connect::<u64>(MaxDemand::Limit(1));
            for i in 0..1000u64 {
                // The second request is clamped to zero until the batch lands
                down.request(8).expect("Request failed");
                down.request(8).expect("Request failed");
                let amount = up.await_demand().expect("Demand lost");
                up.deliver(EventBatch::exact(vec![black_box(i); amount]))
                    .expect("Deliver failed");
                black_box(down.await_events().expect("Events lost"));
            }
        });
    });
}

criterion_group!(benches, benchmark_request_deliver_roundtrip, benchmark_capped_request);
criterion_main!(benches);
