use demand_pipeline::{
    decode_body, MapTransformer, MaxDemand, PassthroughTransformer, PipelineBuilder,
    PipelineError, PluckTransformer, ReplicateProducer, Result as PipelineResult, SinkConsumer,
    UnfoldProducer, FieldEqualsFilter,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A producer that counts upward from zero, one event per demand unit
fn counting_producer() -> UnfoldProducer<u64, impl FnMut(usize, u64) -> PipelineResult<(Vec<u64>, u64)> + Send>
{
    UnfoldProducer::new("count", 0u64, |amount: usize, mut next: u64| {
        let events: Vec<u64> = (0..amount as u64).map(|i| next + i).collect();
        next += amount as u64;
        Ok((events, next))
    })
}

fn collecting_consumer<T: Send + 'static>(
    delay: Duration,
    into: Arc<Mutex<Vec<T>>>,
) -> SinkConsumer<impl FnMut(Vec<T>) -> PipelineResult<()> + Send> {
    SinkConsumer::new("collect", delay, move |events| {
        into.lock().extend(events);
        Ok(())
    })
}

#[test]
fn test_demand_conservation() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let pipeline = PipelineBuilder::new()
        .producer(counting_producer())
        .transformer(MaxDemand::Unbounded, PassthroughTransformer)
        .consumer(
            MaxDemand::Unbounded,
            2,
            collecting_consumer(Duration::from_millis(5), Arc::clone(&collected)),
        )
        .build()
        .expect("Pipeline build failed");

    let consumer_metrics = pipeline.stage_metrics(2).expect("Metrics not found").clone();
    let running = pipeline.start().expect("Pipeline start failed");
    running
        .wait_timeout(Duration::from_millis(100))
        .expect("Wait failed");

    let delivered = consumer_metrics.total_events();
    let demanded = consumer_metrics.total_demand();
    assert!(delivered > 0);
    assert!(
        delivered <= demanded,
        "delivered {delivered} events against {demanded} demand"
    );
}

#[test]
fn test_edge_ordering_is_preserved_end_to_end() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let pipeline = PipelineBuilder::new()
        .producer(counting_producer())
        .transformer(MaxDemand::Unbounded, PassthroughTransformer)
        .consumer(
            MaxDemand::Unbounded,
            4,
            collecting_consumer(Duration::from_millis(1), Arc::clone(&collected)),
        )
        .build()
        .expect("Pipeline build failed");

    pipeline
        .start()
        .expect("Pipeline start failed")
        .wait_timeout(Duration::from_millis(100))
        .expect("Wait failed");

    let items = collected.lock();
    assert!(items.len() >= 8);
    for (i, item) in items.iter().enumerate() {
        assert_eq!(*item, i as u64);
    }
}

#[test]
fn test_max_outstanding_demand_cap() {
    let amounts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&amounts);
    let producer = UnfoldProducer::new("count", 0u64, move |amount: usize, next: u64| {
        seen.lock().push(amount);
        Ok((vec![next; amount], next + 1))
    });

    let pipeline = PipelineBuilder::new()
        .producer(producer)
        .transformer(MaxDemand::Limit(1), PassthroughTransformer)
        .consumer(
            MaxDemand::Unbounded,
            5,
            SinkConsumer::new("drain", Duration::from_millis(1), |_: Vec<u64>| Ok(())),
        )
        .build()
        .expect("Pipeline build failed");

    pipeline
        .start()
        .expect("Pipeline start failed")
        .wait_timeout(Duration::from_millis(80))
        .expect("Wait failed");

    let amounts = amounts.lock();
    assert!(!amounts.is_empty());
    // Despite 5 units of downstream demand per pulse, the capped edge never
    // lets more than 1 unit reach the producer at a time
    assert!(amounts.iter().all(|&amount| amount == 1));
}

#[test]
fn test_heartbeat_cadence() {
    let delay = Duration::from_millis(50);
    let pulse_times = Arc::new(Mutex::new(Vec::new()));
    let times = Arc::clone(&pulse_times);

    let pipeline = PipelineBuilder::new()
        .producer(counting_producer())
        .consumer(
            MaxDemand::Unbounded,
            1,
            SinkConsumer::new("pulse", delay, move |_: Vec<u64>| {
                times.lock().push(Instant::now());
                Ok(())
            }),
        )
        .build()
        .expect("Pipeline build failed");

    let producer_metrics = pipeline.stage_metrics(0).expect("Metrics not found").clone();
    let consumer_metrics = pipeline.stage_metrics(1).expect("Metrics not found").clone();
    pipeline
        .start()
        .expect("Pipeline start failed")
        .wait_timeout(Duration::from_millis(250))
        .expect("Wait failed");

    let times = pulse_times.lock();
    assert!(times.len() >= 2);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= delay);
    }
    // No upstream activity beyond satisfying the consumer's own pulses
    assert_eq!(
        producer_metrics.total_demand(),
        consumer_metrics.total_demand()
    );
}

#[test]
fn test_station_feed_end_to_end() {
    const FEED_URL: &str = "https://example.test/stations.json";
    const FEED_BODY: &str =
        r#"{"stationBeanList": [{"stationName": "A"}, {"stationName": "W 14 St & The High Line"}]}"#;

    let collected = Arc::new(Mutex::new(Vec::new()));
    let pipeline = PipelineBuilder::new()
        .producer(ReplicateProducer::new(Value::String(FEED_URL.to_string())))
        .transformer(
            MaxDemand::Limit(1),
            MapTransformer::new("fetch", |event: Value| {
                if event.as_str() != Some(FEED_URL) {
                    return Err(PipelineError::StageError(
                        "fetch expects the seed URL".to_string(),
                    ));
                }
                Ok(Value::String(FEED_BODY.to_string()))
            }),
        )
        .transformer(
            MaxDemand::Unbounded,
            MapTransformer::new("decode", |event: Value| {
                let body = event.as_str().ok_or_else(|| {
                    PipelineError::StageError("decode expects a raw body".to_string())
                })?;
                decode_body(body)
            }),
        )
        .transformer(MaxDemand::Unbounded, PluckTransformer::new("stationBeanList"))
        .transformer(
            MaxDemand::Unbounded,
            FieldEqualsFilter::new("stationName", json!("W 14 St & The High Line")),
        )
        .consumer(
            MaxDemand::Unbounded,
            1,
            collecting_consumer(Duration::from_millis(10), Arc::clone(&collected)),
        )
        .build()
        .expect("Pipeline build failed");

    pipeline
        .start()
        .expect("Pipeline start failed")
        .wait_timeout(Duration::from_millis(100))
        .expect("Wait failed");

    let batches = collected.lock();
    assert!(!batches.is_empty());
    assert_eq!(
        batches[0],
        json!([{"stationName": "W 14 St & The High Line"}])
    );
}

#[test]
fn test_producer_fault_stops_the_pipeline() {
    let producer = UnfoldProducer::new("faulty", (), |_: usize, _: ()| -> PipelineResult<(Vec<u64>, ())> {
        Err(PipelineError::StageError("generator broke".to_string()))
    });

    let pipeline = PipelineBuilder::new()
        .producer(producer)
        .consumer(
            MaxDemand::Unbounded,
            1,
            SinkConsumer::new("drain", Duration::from_millis(1), |_: Vec<u64>| Ok(())),
        )
        .build()
        .expect("Pipeline build failed");

    let result = pipeline.start().expect("Pipeline start failed").wait();
    assert!(matches!(result, Err(PipelineError::StageError(_))));
}

#[test]
fn test_decode_fault_stops_the_pipeline() {
    let pipeline = PipelineBuilder::new()
        .producer(ReplicateProducer::new(Value::String("{not json".to_string())))
        .transformer(
            MaxDemand::Unbounded,
            MapTransformer::new("decode", |event: Value| {
                let body = event.as_str().ok_or_else(|| {
                    PipelineError::StageError("decode expects a raw body".to_string())
                })?;
                decode_body(body)
            }),
        )
        .consumer(
            MaxDemand::Unbounded,
            1,
            SinkConsumer::new("drain", Duration::from_millis(1), |_: Vec<Value>| Ok(())),
        )
        .build()
        .expect("Pipeline build failed");

    let result = pipeline.start().expect("Pipeline start failed").wait();
    assert!(matches!(result, Err(PipelineError::Decode(_))));
}

#[test]
fn test_shutdown_handle_stops_a_healthy_pipeline() {
    let pipeline = PipelineBuilder::new()
        .producer(counting_producer())
        .consumer(
            MaxDemand::Unbounded,
            1,
            SinkConsumer::new("drain", Duration::from_millis(20), |_: Vec<u64>| Ok(())),
        )
        .build()
        .expect("Pipeline build failed");

    let running = pipeline.start().expect("Pipeline start failed");
    let handle = running.shutdown_handle();
    let signaller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        handle.signal();
    });

    running.wait().expect("Wait failed");
    signaller.join().expect("Signaller join failed");
}
