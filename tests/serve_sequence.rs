//! End-to-end tests for the serve sequencer.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::low_level::raise;
use serial_test::serial;
use sigctx::{
    serve, serve_with, set_shutdown_grace_period, shutdown_grace_period, ServeError,
    ShutdownReason, SignalKind,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

mod common;

use common::{MockServer, ShutdownMode, StartMode};

const GRACE: Duration = Duration::from_millis(50);

#[tokio::test]
#[serial]
async fn interrupt_triggers_bounded_shutdown() {
    let server = Arc::new(MockServer::new(StartMode::Block, ShutdownMode::Succeed));
    let root = CancellationToken::new();

    let sequence = {
        let server = Arc::clone(&server);
        let root = root.clone();
        tokio::spawn(async move { serve_with(server, &root, GRACE).await })
    };
    server.wait_started().await;

    let interrupted_at = Instant::now();
    raise(SIGINT).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), sequence)
        .await
        .expect("sequencer hung")
        .unwrap();

    assert_eq!(outcome.reason, ShutdownReason::Signal(SignalKind::Interrupt));
    assert!(outcome.start_error.is_none());
    assert!(matches!(outcome.shutdown, Some(Ok(()))));

    let calls = server.shutdown_calls();
    assert_eq!(calls.len(), 1);
    let call = calls[0];
    assert!(call.deadline > call.called_at);
    assert!(call.deadline - call.called_at <= GRACE);
    assert!(call.deadline.duration_since(interrupted_at) <= GRACE + Duration::from_millis(500));
}

#[tokio::test]
#[serial]
async fn default_handling_restored_before_shutdown() {
    let server = Arc::new(MockServer::new(StartMode::Block, ShutdownMode::Succeed));
    let root = CancellationToken::new();

    let sequence = {
        let server = Arc::clone(&server);
        let root = root.clone();
        tokio::spawn(async move { serve_with(server, &root, GRACE).await })
    };
    server.wait_started().await;
    assert!(!common::sigint_is_default());

    raise(SIGTERM).unwrap();
    let outcome = sequence.await.unwrap();

    assert_eq!(outcome.reason, ShutdownReason::Signal(SignalKind::Terminate));
    let calls = server.shutdown_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].sigint_default, "shutdown ran while SIGINT was still intercepted");
}

#[tokio::test]
#[serial]
async fn hanging_shutdown_reports_deadline_exceeded() {
    let server = Arc::new(MockServer::new(StartMode::Block, ShutdownMode::Hang));
    let root = CancellationToken::new();

    let sequence = {
        let server = Arc::clone(&server);
        let root = root.clone();
        tokio::spawn(async move { serve_with(server, &root, GRACE).await })
    };
    server.wait_started().await;

    let cancelled_at = Instant::now();
    root.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), sequence)
        .await
        .expect("sequencer hung past the grace period")
        .unwrap();
    let elapsed = cancelled_at.elapsed();

    assert_eq!(outcome.reason, ShutdownReason::Cancelled);
    assert!(matches!(outcome.shutdown, Some(Err(ServeError::DeadlineExceeded))));
    assert!(elapsed >= GRACE);
    assert!(elapsed < GRACE + Duration::from_millis(500));
    assert_eq!(server.shutdown_calls().len(), 1);
}

#[tokio::test]
#[serial]
async fn start_failure_skips_shutdown() {
    let server = Arc::new(MockServer::new(StartMode::FailImmediately, ShutdownMode::Succeed));
    let root = CancellationToken::new();

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        serve_with(Arc::clone(&server), &root, GRACE),
    )
    .await
    .expect("sequencer waited for a signal after start failed");

    assert_eq!(outcome.reason, ShutdownReason::StartFailed);
    assert!(matches!(
        outcome.start_error,
        Some(ServeError::Other(ref msg)) if msg == "address already in use"
    ));
    assert!(outcome.shutdown.is_none());
    assert_eq!(server.start_calls(), 1);
    assert!(server.shutdown_calls().is_empty());
    assert!(common::sigint_is_default());
}

#[tokio::test]
#[serial]
async fn closed_sentinel_skips_shutdown() {
    let server = Arc::new(MockServer::new(StartMode::CloseImmediately, ShutdownMode::Succeed));
    let root = CancellationToken::new();

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        serve_with(Arc::clone(&server), &root, GRACE),
    )
    .await
    .expect("sequencer waited for a signal after the server closed");

    assert_eq!(outcome.reason, ShutdownReason::ServerClosed);
    assert!(outcome.start_error.is_none());
    assert!(outcome.shutdown.is_none());
    assert!(server.shutdown_calls().is_empty());
}

#[tokio::test]
#[serial]
async fn start_returning_after_parent_cancel_does_not_panic() {
    // Both the latch and the start task are ready at once; either select
    // branch may win, so repeat to cover both.
    for _ in 0..40 {
        let root = CancellationToken::new();
        let server = Arc::new(
            MockServer::new(StartMode::CancelParent, ShutdownMode::Succeed).with_parent(root.clone()),
        );

        let sequence = {
            let server = Arc::clone(&server);
            let root = root.clone();
            tokio::spawn(async move { serve_with(server, &root, GRACE).await })
        };
        let outcome = tokio::time::timeout(Duration::from_secs(2), sequence)
            .await
            .expect("sequencer hung")
            .expect("sequencer panicked");

        assert_eq!(outcome.reason, ShutdownReason::Cancelled);
        assert!(outcome.start_error.is_none());
        assert!(matches!(outcome.shutdown, Some(Ok(()))));
        assert_eq!(server.shutdown_calls().len(), 1);
    }
}

#[tokio::test]
#[serial]
async fn cancelled_parent_shuts_down_immediately() {
    let server = Arc::new(MockServer::new(StartMode::Block, ShutdownMode::Succeed));
    let root = CancellationToken::new();
    root.cancel();

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        serve_with(Arc::clone(&server), &root, GRACE),
    )
    .await
    .expect("sequencer hung");

    assert_eq!(outcome.reason, ShutdownReason::Cancelled);
    assert!(matches!(outcome.shutdown, Some(Ok(()))));
    assert_eq!(server.shutdown_calls().len(), 1);
}

#[tokio::test]
#[serial]
async fn serve_uses_process_grace_period() {
    let grace = Duration::from_millis(120);
    set_shutdown_grace_period(grace);

    let server = Arc::new(MockServer::new(StartMode::Block, ShutdownMode::Succeed));
    let sequence = tokio::spawn(serve(Arc::clone(&server)));
    server.wait_started().await;

    raise(SIGINT).unwrap();
    tokio::time::timeout(Duration::from_secs(2), sequence)
        .await
        .expect("sequencer hung")
        .unwrap();

    set_shutdown_grace_period(sigctx::lifecycle::DEFAULT_SHUTDOWN_GRACE_PERIOD);
    assert_eq!(shutdown_grace_period(), Duration::from_secs(10));

    let calls = server.shutdown_calls();
    assert_eq!(calls.len(), 1);
    let budget = calls[0].deadline - calls[0].called_at;
    assert!(budget > GRACE);
    assert!(budget <= grace);
}
