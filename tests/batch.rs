//! Integration tests for the sequential batch runner.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use keyfall::{
    BatchConfig, BatchOutcome, BatchProgress, BatchRunner, BatchState, CredentialPlacement,
    CredentialPool, Dispatcher, HttpResponse, MockHttpClient, ProviderRequest,
};

/// Opt-in log output for debugging: `RUST_LOG=keyfall=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn runner_with_delay(delay_ms: u64) -> BatchRunner {
    BatchRunner::new(BatchConfig {
        inter_item_delay: Duration::from_millis(delay_ms),
    })
}

#[tokio::test(start_paused = true)]
async fn progress_fires_once_per_item_in_order() {
    init_tracing();

    let runner = runner_with_delay(3000);
    let progress_log = Arc::new(Mutex::new(Vec::new()));

    let log = progress_log.clone();
    let started = tokio::time::Instant::now();
    let report = runner
        .run(
            vec![1, 2, 3, 4, 5],
            |_| async { Ok(()) },
            move |p| log.lock().push((p.current, p.total)),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert_eq!(report.processed, 5);
    assert!(report.failures.is_empty());
    assert_eq!(
        *progress_log.lock(),
        vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
    );

    // The inter-item delay applies exactly M-1 times: 4 * 3000ms of
    // virtual time, with none before the first item or after the last.
    assert_eq!(started.elapsed(), Duration::from_millis(12_000));
}

#[tokio::test(start_paused = true)]
async fn item_failure_does_not_abort_the_batch() {
    let runner = runner_with_delay(3000);
    let progress_log = Arc::new(Mutex::new(Vec::new()));

    let log = progress_log.clone();
    let report = runner
        .run(
            vec![1, 2, 3, 4, 5],
            |item| async move {
                if item == 3 {
                    Err(anyhow::anyhow!("generation failed for item 3").into())
                } else {
                    Ok(())
                }
            },
            move |p| log.lock().push((p.current, p.total)),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Items 4 and 5 still ran; progress fired for every item.
    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert_eq!(report.processed, 5);
    assert_eq!(
        *progress_log.lock(),
        vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
    );

    // The failure is recorded separately, naming the failed item.
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 2);
    assert_eq!(report.failures[0].item, 3);
    assert!(report.failures[0].error.contains("item 3"));
    assert_eq!(report.succeeded(), 4);
}

#[tokio::test(start_paused = true)]
async fn cancellation_after_item_two_starts_no_further_item() {
    let runner = runner_with_delay(3000);
    let cancel = CancellationToken::new();
    let started_items = Arc::new(Mutex::new(Vec::new()));

    let on_progress_cancel = cancel.clone();
    let started = started_items.clone();
    let report = runner
        .run(
            vec![1, 2, 3, 4, 5],
            move |item| {
                let started = started.clone();
                async move {
                    started.lock().push(item);
                    Ok(())
                }
            },
            move |p: BatchProgress| {
                // Simulates the user clicking "Cancel" right after "2 of 5"
                // renders. The in-flight check happens at the top of the
                // next iteration, so item 3 never starts.
                if p.current == 2 {
                    on_progress_cancel.cancel();
                }
            },
            cancel.clone(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, BatchOutcome::Cancelled);
    assert_eq!(report.processed, 2);
    assert_eq!(*started_items.lock(), vec![1, 2]);

    // Observable state resets so the UI hides its progress indicator.
    let snapshot = runner.snapshot();
    assert_eq!(snapshot.state, BatchState::Idle);
    assert_eq!(snapshot.progress, BatchProgress { current: 0, total: 0 });
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_delay_does_not_sit_out_the_full_wait() {
    let runner = runner_with_delay(60_000);
    let cancel = CancellationToken::new();

    let on_progress_cancel = cancel.clone();
    let started = tokio::time::Instant::now();
    let report = runner
        .run(
            vec![1, 2, 3],
            |_| async { Ok(()) },
            move |p: BatchProgress| {
                if p.current == 1 {
                    on_progress_cancel.cancel();
                }
            },
            cancel.clone(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, BatchOutcome::Cancelled);
    assert_eq!(report.processed, 1);
    // The 60s inter-item delay is cut short by the cancellation.
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn batch_items_can_dispatch_through_a_credential_pool() {
    // End to end: each batch item generates through the fallback
    // dispatcher. Both items hit a rate limit on the first key and succeed
    // on the second.
    let mock = MockHttpClient::new();
    for _ in 0..2 {
        mock.add_response(
            "POST /v1/generate",
            Ok(HttpResponse {
                status: 429,
                body: "rate limited".to_string(),
            }),
        );
        mock.add_response(
            "POST /v1/generate",
            Ok(HttpResponse {
                status: 200,
                body: r#"{"text":"ok"}"#.to_string(),
            }),
        );
    }

    let pool = Arc::new(CredentialPool::new("gemini", vec!["k1", "k2"]).unwrap());
    let dispatcher = Arc::new(Dispatcher::new(mock.clone()));
    let runner = runner_with_delay(5000);

    let report = runner
        .run(
            vec!["article-1".to_string(), "article-2".to_string()],
            move |article_id| {
                let pool = pool.clone();
                let dispatcher = dispatcher.clone();
                async move {
                    let request = ProviderRequest {
                        endpoint: "https://api.example.com".to_string(),
                        method: "POST".to_string(),
                        path: "/v1/generate".to_string(),
                        body: format!(r#"{{"article":"{article_id}"}}"#),
                        placement: CredentialPlacement::Bearer,
                    };
                    dispatcher.dispatch(&pool, &request).await.map(|_| ())
                }
            },
            |_| {},
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert!(report.failures.is_empty());
    // Each item restarted the pool walk from index 0.
    assert_eq!(mock.credentials_used(), vec!["k1", "k2", "k1", "k2"]);
}

#[tokio::test(start_paused = true)]
async fn pool_exhaustion_in_one_item_is_an_isolated_failure() {
    let mock = MockHttpClient::new();
    // Item 1: both keys rate-limited -> pool exhausted.
    mock.add_response(
        "POST /v1/generate",
        Ok(HttpResponse {
            status: 429,
            body: "rate limited".to_string(),
        }),
    );
    mock.add_response(
        "POST /v1/generate",
        Ok(HttpResponse {
            status: 429,
            body: "rate limited".to_string(),
        }),
    );
    // Item 2: first key works.
    mock.add_response(
        "POST /v1/generate",
        Ok(HttpResponse {
            status: 200,
            body: "ok".to_string(),
        }),
    );

    let pool = Arc::new(CredentialPool::new("gemini", vec!["k1", "k2"]).unwrap());
    let dispatcher = Arc::new(Dispatcher::new(mock.clone()));
    let runner = runner_with_delay(3000);

    let report = runner
        .run(
            vec![1, 2],
            move |_| {
                let pool = pool.clone();
                let dispatcher = dispatcher.clone();
                async move {
                    let request = ProviderRequest {
                        endpoint: "https://api.example.com".to_string(),
                        method: "POST".to_string(),
                        path: "/v1/generate".to_string(),
                        body: "{}".to_string(),
                        placement: CredentialPlacement::Bearer,
                    };
                    dispatcher.dispatch(&pool, &request).await.map(|_| ())
                }
            },
            |_| {},
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 0);
    assert!(report.failures[0].error.contains("2 credentials"));
    assert_eq!(report.succeeded(), 1);
}
