mod common;

use common::{aggregator, settings, ScriptedEngine};
use std::sync::Arc;
use std::time::Duration;
use veil_common::{SearchRequest, UnresponsiveReason};
use veil_core::{AggregatorSettings, BudgetPolicy};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fifty_sessions_never_exceed_engine_ceiling() {
    common::init_test_tracing();
    let engine = ScriptedEngine::hits("a", Duration::from_millis(20), &["https://a.example/"]);
    let mut s = settings("a", 2_000);
    s.policy = BudgetPolicy {
        max_in_flight: 2,
        failure_threshold: 0,
        ..Default::default()
    };
    let agg = Arc::new(aggregator(
        vec![(s, engine.clone())],
        AggregatorSettings {
            cache_ttl: None,
            ..Default::default()
        },
    ));

    let mut handles = Vec::new();
    for i in 0..50 {
        let agg = agg.clone();
        handles.push(tokio::spawn(async move {
            agg.search(SearchRequest::new(format!("query {i}"))).await
        }));
    }

    let mut answered = 0;
    let mut limited = 0;
    for h in handles {
        let result = h.await.unwrap().unwrap();
        if result.results.is_empty() {
            assert_eq!(result.unresponsive_engines.len(), 1);
            assert_eq!(
                result.unresponsive_engines[0].reason,
                UnresponsiveReason::RateLimited
            );
            limited += 1;
        } else {
            assert!(result.unresponsive_engines.is_empty());
            answered += 1;
        }
    }

    assert!(engine.peak() <= 2, "peak in flight was {}", engine.peak());
    assert_eq!(answered, engine.calls());
    assert_eq!(answered + limited, 50);
    assert!(answered >= 1);
    assert_eq!(agg.budgeter().snapshot()[0].in_flight, 0);
}
