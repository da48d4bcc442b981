//! Batch collection against scripted devices on paused time

mod common;

use common::*;
use daylog_lib::batcher::SampleBatcher;
use daylog_lib::sample::Aggregation;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn batcher(capacity: usize) -> SampleBatcher {
    SampleBatcher::new(12, Duration::from_secs(5), 18.22, capacity)
}

#[tokio::test(start_paused = true)]
async fn test_batch_keeps_last_read() {
    let script = Script::new();
    let mut device = ScriptedDevice::new(script.clone());
    let (mut chart, log) = RecordingChart::new();
    let clock = PausedClock::starting_at(at(day(), 9, 0, 0));
    let cancel = CancellationToken::new();

    let mut batcher = batcher(80);
    let record = batcher
        .collect_batch(&mut device, &mut chart, clock.as_ref(), &cancel)
        .await
        .unwrap();

    assert_eq!(record.timestamp, at(day(), 9, 0, 55));
    assert_eq!(record.current_amperes, 1.2);
    assert_eq!(record.voltage_volts, 27.33);
    assert_eq!(script.reads.load(Ordering::SeqCst), 12);
    // Every read reaches the live view, and the batch takes 12 intervals
    assert_eq!(log.lock().unwrap().refreshes, 12);
    assert_eq!(batcher.window().len(), 12);
    assert_eq!(clock.now(), at(day(), 9, 1, 0));
}

#[tokio::test(start_paused = true)]
async fn test_failed_read_discards_batch() {
    let script = Script::new();
    script.failing_reads.lock().unwrap().insert(5);
    let mut device = ScriptedDevice::new(script.clone());
    let (mut chart, log) = RecordingChart::new();
    let clock = PausedClock::starting_at(at(day(), 9, 0, 0));
    let cancel = CancellationToken::new();

    let mut batcher = batcher(80);
    let result = batcher
        .collect_batch(&mut device, &mut chart, clock.as_ref(), &cancel)
        .await;

    match result {
        Err(AcqError::DeviceRead { channel, .. }) => assert_eq!(channel, Channel::Current),
        other => panic!("Expected read failure, got {:?}", other),
    }
    assert_eq!(log.lock().unwrap().refreshes, 5);
    assert_eq!(clock.now(), at(day(), 9, 0, 25));

    // The next batch starts clean
    let record = batcher
        .collect_batch(&mut device, &mut chart, clock.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(record.timestamp, at(day(), 9, 1, 20));
}

#[tokio::test(start_paused = true)]
async fn test_chart_failure_does_not_abort_batch() {
    let script = Script::new();
    let mut device = ScriptedDevice::new(script);
    let (mut chart, log) = RecordingChart::failing();
    let clock = PausedClock::starting_at(at(day(), 9, 0, 0));
    let cancel = CancellationToken::new();

    let record = batcher(80)
        .collect_batch(&mut device, &mut chart, clock.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(record.current_amperes, 1.2);
    assert_eq!(log.lock().unwrap().refreshes, 12);
}

#[tokio::test(start_paused = true)]
async fn test_display_window_is_bounded() {
    let script = Script::new();
    let mut device = ScriptedDevice::new(script);
    let (mut chart, log) = RecordingChart::new();
    let clock = PausedClock::starting_at(at(day(), 9, 0, 0));
    let cancel = CancellationToken::new();

    let mut batcher = batcher(5);
    for _ in 0..3 {
        batcher
            .collect_batch(&mut device, &mut chart, clock.as_ref(), &cancel)
            .await
            .unwrap();
    }
    assert_eq!(batcher.window().len(), 5);
    assert_eq!(log.lock().unwrap().max_points, 5);
    let latest = batcher.window().latest().unwrap();
    assert_eq!(latest.current, 3.6);
}

#[tokio::test(start_paused = true)]
async fn test_mean_aggregation() {
    let script = Script::new();
    let mut device = ScriptedDevice::new(script);
    let (mut chart, _log) = RecordingChart::new();
    let clock = PausedClock::starting_at(at(day(), 9, 0, 0));
    let cancel = CancellationToken::new();

    let record = batcher(80)
        .with_aggregation(Aggregation::Mean)
        .collect_batch(&mut device, &mut chart, clock.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(record.current_amperes, 0.65);
    assert_eq!(record.voltage_volts, 27.33);
    assert_eq!(record.timestamp, at(day(), 9, 0, 55));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_wait() {
    let script = Script::new();
    let mut device = ScriptedDevice::new(script.clone());
    let (mut chart, log) = RecordingChart::new();
    let clock = PausedClock::starting_at(at(day(), 9, 0, 0));
    let cancel = CancellationToken::new();

    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        token.cancel();
    });

    let result = batcher(80)
        .collect_batch(&mut device, &mut chart, clock.as_ref(), &cancel)
        .await;
    assert!(matches!(result, Err(AcqError::Cancelled)));
    assert_eq!(script.reads.load(Ordering::SeqCst), 3);
    assert_eq!(log.lock().unwrap().refreshes, 3);
    assert_eq!(clock.now(), at(day(), 9, 0, 12));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_first_read() {
    let script = Script::new();
    let mut device = ScriptedDevice::new(script.clone());
    let (mut chart, _log) = RecordingChart::new();
    let clock = PausedClock::starting_at(at(day(), 9, 0, 0));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = batcher(80)
        .collect_batch(&mut device, &mut chart, clock.as_ref(), &cancel)
        .await;
    assert!(matches!(result, Err(AcqError::Cancelled)));
    assert_eq!(script.reads.load(Ordering::SeqCst), 0);
}
