//! Concurrent requests share one pipeline, sink and registry without losing updates.

use super::test_utils::*;
use askpipe::{AskRequest, ChaosFlags, SpanStatus};
use std::sync::Arc;

const REQUESTS: usize = 48;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_fully_accounted() {
    let h = harness();
    let pipeline = Arc::new(h.pipeline);

    let mut handles = Vec::with_capacity(REQUESTS);
    for i in 0..REQUESTS {
        let pipeline = Arc::clone(&pipeline);
        let tenant = if i % 2 == 0 { "acme" } else { "globex" };
        let chaos = ChaosFlags {
            break_tool: i % 3 == 0,
            ..ChaosFlags::default()
        };
        handles.push(tokio::spawn(async move {
            pipeline
                .ask(AskRequest::new(tenant, QUESTION).with_chaos(chaos))
                .await
        }));
    }

    let mut total_tokens = 0u64;
    let mut degraded = 0usize;
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        total_tokens += response.usage.total_tokens;
        if response.status == SpanStatus::Degraded {
            degraded += 1;
        }
    }

    assert_eq!(h.spans.opened(), REQUESTS * 6);
    assert_eq!(h.spans.closed(), REQUESTS * 6);
    assert_eq!(h.metrics.counter_total("core.requests"), REQUESTS as f64);
    assert_eq!(h.metrics.counter_total("core.tokens"), total_tokens as f64);
    assert_eq!(
        h.metrics
            .counter("core.requests", &[("tenant", "acme"), ("status", "DEGRADED")])
            + h.metrics
                .counter("core.requests", &[("tenant", "globex"), ("status", "DEGRADED")]),
        degraded as f64
    );
    assert_eq!(degraded, REQUESTS / 3);

    let latency = h
        .metrics
        .histogram("core.request.latency_ms", &[("tenant", "acme"), ("status", "OK")])
        .unwrap();
    assert!(latency.count > 0);
    assert!(latency.min <= latency.max);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_request_gets_its_own_trace() {
    let h = harness();
    let pipeline = Arc::new(h.pipeline);
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .ask(request().with_request_id(format!("req-{i}")))
                    .await
            })
        })
        .collect();

    let mut traces = Vec::new();
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        let spans = h.spans.records_for_trace(&response.trace.trace_id);
        assert_eq!(spans.len(), 6);
        assert!(spans
            .iter()
            .all(|s| s.attr_str("request_id") == Some(response.request_id.as_str())));
        traces.push(response.trace.trace_id);
    }
    traces.sort();
    traces.dedup();
    assert_eq!(traces.len(), 16);
}
