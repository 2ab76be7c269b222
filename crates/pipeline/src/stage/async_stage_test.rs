//! Async stage tests
//!
//! Tests that need the worker held back use a current-thread runtime that is
//! only driven after all events are enqueued.

use std::sync::Arc;
use std::time::Duration;

use scribe_protocol::{DeliveryError, ErrorKind};
use tokio::runtime::{Builder, Runtime};

use super::*;
use crate::stage::TerminalStage;
use crate::test_util::{Outcomes, RecordingTarget, completion};

fn paused_runtime() -> Runtime {
    Builder::new_current_thread().enable_all().build().unwrap()
}

fn threaded_runtime() -> Runtime {
    Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn terminal(target: &Arc<RecordingTarget>) -> Arc<dyn Stage> {
    Arc::new(TerminalStage::new(Arc::clone(target) as Arc<dyn crate::target::Target>))
}

fn error_kind(outcomes: &Outcomes, message: &str) -> Option<ErrorKind> {
    outcomes
        .result_for(message)
        .and_then(|r| r.err())
        .map(|e: DeliveryError| e.kind())
}

// =============================================================================
// Overflow policies
// =============================================================================

#[test]
fn test_discard_oldest_fails_oldest_event() {
    let rt = paused_runtime();
    let target = RecordingTarget::new("memory");
    let config = AsyncStageConfig::default()
        .with_queue_limit(2)
        .with_overflow(OverflowPolicy::DiscardOldest);
    let stage = AsyncStage::new(config, terminal(&target), rt.handle());
    let outcomes = Outcomes::new();

    for message in ["e1", "e2", "e3"] {
        assert!(stage.enqueue(outcomes.envelope(message)).is_accepted());
    }

    // e1 was evicted before the worker ever ran
    assert_eq!(error_kind(&outcomes, "e1"), Some(ErrorKind::Overflow));
    assert_eq!(stage.queued(), 2);

    let (continuation, rx) = completion();
    stage.flush(continuation);
    rt.block_on(rx).unwrap().unwrap();

    assert_eq!(target.messages(), vec!["e2", "e3"]);
    assert!(outcomes.result_for("e2").unwrap().is_ok());
    assert!(outcomes.result_for("e3").unwrap().is_ok());
    assert_eq!(stage.metrics().snapshot().overflowed, 1);
}

#[test]
fn test_block_times_out_with_overflow() {
    let rt = paused_runtime();
    let target = RecordingTarget::new("memory");
    let config = AsyncStageConfig::default()
        .with_queue_limit(1)
        .with_overflow(OverflowPolicy::Block)
        .with_block_timeout(Duration::from_millis(30));
    let stage = AsyncStage::new(config, terminal(&target), rt.handle());
    let outcomes = Outcomes::new();

    stage.enqueue(outcomes.envelope("first"));
    let started = std::time::Instant::now();
    stage.enqueue(outcomes.envelope("second"));

    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(error_kind(&outcomes, "second"), Some(ErrorKind::Overflow));
    assert!(outcomes.result_for("first").is_none());
}

#[test]
fn test_block_waits_for_worker_and_keeps_order() {
    let rt = threaded_runtime();
    let target = RecordingTarget::slow("memory", Duration::from_millis(2));
    let config = AsyncStageConfig::default()
        .with_queue_limit(1)
        .with_overflow(OverflowPolicy::Block)
        .with_block_timeout(Duration::from_secs(2));
    let stage = AsyncStage::new(config, terminal(&target), rt.handle());
    let outcomes = Outcomes::new();

    let messages: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
    for message in &messages {
        stage.enqueue(outcomes.envelope(message));
    }

    assert!(outcomes.wait_for(10, Duration::from_secs(5)));
    assert_eq!(outcomes.successes(), 10);
    assert_eq!(target.messages(), messages);
}

#[test]
fn test_grow_accepts_until_ceiling() {
    let rt = paused_runtime();
    let target = RecordingTarget::new("memory");
    let config = AsyncStageConfig::default()
        .with_queue_limit(2)
        .with_overflow(OverflowPolicy::Grow)
        .with_grow_ceiling(3);
    let stage = AsyncStage::new(config, terminal(&target), rt.handle());
    let outcomes = Outcomes::new();

    for message in ["a", "b", "c", "d"] {
        stage.enqueue(outcomes.envelope(message));
    }

    assert_eq!(stage.queued(), 3);
    assert_eq!(error_kind(&outcomes, "d"), Some(ErrorKind::Overflow));

    let (continuation, rx) = completion();
    stage.flush(continuation);
    rt.block_on(rx).unwrap().unwrap();
    assert_eq!(target.messages(), vec!["a", "b", "c"]);
}

#[test]
fn test_config_is_normalized() {
    let rt = paused_runtime();
    let target = RecordingTarget::new("memory");
    let config = AsyncStageConfig::default()
        .with_queue_limit(0)
        .with_grow_ceiling(0);
    let stage = AsyncStage::new(config, terminal(&target), rt.handle());

    assert_eq!(stage.config().queue_limit, 1);
    assert_eq!(stage.config().grow_ceiling, 1);
}

// =============================================================================
// Flush barrier
// =============================================================================

#[test]
fn test_flush_completes_after_prior_events() {
    let rt = threaded_runtime();
    let target = RecordingTarget::slow("memory", Duration::from_millis(1));
    let stage = AsyncStage::new(AsyncStageConfig::default(), terminal(&target), rt.handle());
    let outcomes = Outcomes::new();

    for i in 0..50 {
        stage.enqueue(outcomes.envelope(&format!("e{i}")));
    }
    let (continuation, rx) = completion();
    stage.flush(continuation);

    rt.block_on(rx).unwrap().unwrap();
    assert_eq!(outcomes.len(), 50);
    assert_eq!(target.flushes(), 1);
}

#[test]
fn test_flush_on_empty_queue() {
    let rt = paused_runtime();
    let target = RecordingTarget::new("memory");
    let stage = AsyncStage::new(AsyncStageConfig::default(), terminal(&target), rt.handle());

    let (continuation, rx) = completion();
    stage.flush(continuation);
    rt.block_on(rx).unwrap().unwrap();
    assert_eq!(stage.phase(), WorkerPhase::Idle);
}

#[test]
fn test_slow_target_leaves_runtime_workers_free() {
    let rt = Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let target = RecordingTarget::slow("slow", Duration::from_millis(100));
    let stage = AsyncStage::new(AsyncStageConfig::default(), terminal(&target), rt.handle());
    let outcomes = Outcomes::new();

    for i in 0..5 {
        stage.enqueue(outcomes.envelope(&format!("e{i}")));
    }
    std::thread::sleep(Duration::from_millis(50));

    let started = std::time::Instant::now();
    rt.block_on(async { tokio::spawn(async {}).await.unwrap() });
    assert!(started.elapsed() < Duration::from_millis(80));

    assert!(outcomes.wait_for(5, Duration::from_secs(2)));
    assert_eq!(outcomes.successes(), 5);
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_shutdown_drains_queue() {
    let rt = threaded_runtime();
    let target = RecordingTarget::new("memory");
    let stage = AsyncStage::new(AsyncStageConfig::default(), terminal(&target), rt.handle());
    let outcomes = Outcomes::new();

    for i in 0..20 {
        stage.enqueue(outcomes.envelope(&format!("e{i}")));
    }
    stage.shutdown(Duration::from_secs(5));

    assert_eq!(outcomes.len(), 20);
    assert_eq!(outcomes.successes(), 20);
    assert!(target.is_closed());
    assert_eq!(stage.phase(), WorkerPhase::ShuttingDown);
}

#[test]
fn test_shutdown_timeout_fails_leftovers_exactly_once() {
    let rt = threaded_runtime();
    let target = RecordingTarget::slow("memory", Duration::from_millis(40));
    let stage = AsyncStage::new(AsyncStageConfig::default(), terminal(&target), rt.handle());
    let outcomes = Outcomes::new();

    let messages: Vec<String> = (0..10).map(|i| format!("e{i}")).collect();
    for message in &messages {
        stage.enqueue(outcomes.envelope(message));
    }
    stage.shutdown(Duration::from_millis(60));

    // The write in flight at the deadline still completes on its own
    assert!(outcomes.wait_for(10, Duration::from_secs(2)));
    for message in &messages {
        assert_eq!(outcomes.count_for(message), 1, "{message}");
    }
    let timed_out = messages
        .iter()
        .filter(|m| error_kind(&outcomes, m) == Some(ErrorKind::Timeout))
        .count();
    assert!(timed_out >= 1);
    assert_eq!(timed_out + outcomes.successes(), 10);
}

#[test]
fn test_enqueue_after_shutdown_is_rejected() {
    let rt = threaded_runtime();
    let target = RecordingTarget::new("memory");
    let stage = AsyncStage::new(AsyncStageConfig::default(), terminal(&target), rt.handle());
    stage.shutdown(Duration::from_secs(1));

    let outcomes = Outcomes::new();
    stage.enqueue(outcomes.envelope("late"));
    assert_eq!(error_kind(&outcomes, "late"), Some(ErrorKind::Shutdown));

    let (continuation, mut rx) = completion();
    stage.flush(continuation);
    assert!(matches!(rx.try_recv(), Ok(Err(DeliveryError::Shutdown))));
}

#[test]
fn test_shutdown_twice_is_harmless() {
    let rt = threaded_runtime();
    let target = RecordingTarget::new("memory");
    let stage = AsyncStage::new(AsyncStageConfig::default(), terminal(&target), rt.handle());

    stage.shutdown(Duration::from_millis(500));
    stage.shutdown(Duration::from_millis(500));
    assert!(target.is_closed());
}
