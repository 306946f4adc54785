//! Governor and tuner invariants

mod common;

use common::strategies::*;
use common::*;
use pipeworker_core::config::ConcurrencySettings;
use pipeworker_core::messaging::{ChannelSource, FnHandler, RawMessage, RecordingSink};
use pipeworker_core::pipeline::{ConcurrencyGovernor, TuningDecision};
use pipeworker_core::{Worker, WorkerSettings};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn complete(governor: &Arc<ConcurrencyGovernor>, n: u64) {
    for _ in 0..n {
        drop(governor.begin());
    }
}

proptest! {
    /// Property: the ceiling never leaves [min, max] and moves by at most one per window
    #[test]
    fn dynamic_ceiling_stays_within_bounds(
        settings in dynamic_settings_strategy(),
        windows in throughput_strategy(),
    ) {
        let governor = Arc::new(ConcurrencyGovernor::new(&settings));
        let mut tuner = governor.tuner();

        for completed in windows {
            let before = governor.ceiling();
            complete(&governor, completed);
            let step = tuner.step();
            let after = governor.ceiling();

            prop_assert!(after >= settings.min, "ceiling {} fell below min {}", after, settings.min);
            if let Some(max) = settings.max {
                prop_assert!(after <= max, "ceiling {} exceeded max {}", after, max);
            }
            prop_assert!(before.abs_diff(after) <= 1);
            prop_assert_eq!(governor.in_flight(), 0);
            if completed == 0 {
                prop_assert_eq!(step.decision, TuningDecision::Idle);
                prop_assert_eq!(before, after);
            }
        }
    }

    /// Property: fixed-rate mode never changes the ceiling
    #[test]
    fn fixed_ceiling_is_constant(concurrency in 1usize..64, windows in throughput_strategy()) {
        let governor = Arc::new(ConcurrencyGovernor::new(&ConcurrencySettings::fixed(concurrency)));
        let mut tuner = governor.tuner();

        for completed in windows {
            complete(&governor, completed);
            prop_assert_eq!(governor.window_count(), 0);
            tuner.step();
            prop_assert_eq!(governor.ceiling(), concurrency);
        }
    }
}

#[test]
fn test_increasing_throughput_climbs_one_per_window() {
    let governor = Arc::new(ConcurrencyGovernor::new(&ConcurrencySettings::dynamic(2, 1, 100)));
    let mut tuner = governor.tuner();

    let mut ceilings = vec![governor.ceiling()];
    for completed in [8, 12, 16] {
        complete(&governor, completed);
        tuner.step();
        ceilings.push(governor.ceiling());
    }

    assert_eq!(ceilings, vec![2, 3, 4, 5]);
}

#[test]
fn test_throughput_drop_reverses_until_floor() {
    let governor = Arc::new(ConcurrencyGovernor::new(&ConcurrencySettings::dynamic(3, 2, 100)));
    let mut tuner = governor.tuner();

    complete(&governor, 10);
    assert_eq!(tuner.step().decision, TuningDecision::Upscaled { ceiling: 4 });

    // Throughput dropped: direction flips to downscale
    complete(&governor, 6);
    let step = tuner.step();
    assert!(!step.upscaling);
    assert_eq!(step.decision, TuningDecision::Downscaled { ceiling: 3 });

    // Equal throughput keeps the direction
    complete(&governor, 6);
    assert_eq!(tuner.step().decision, TuningDecision::Downscaled { ceiling: 2 });

    complete(&governor, 6);
    assert_eq!(tuner.step().decision, TuningDecision::Held { ceiling: 2 });
    assert_eq!(governor.ceiling(), 2);

    // Another drop flips back up
    complete(&governor, 3);
    assert_eq!(tuner.step().decision, TuningDecision::Upscaled { ceiling: 3 });
}

#[tokio::test(start_paused = true)]
async fn test_running_worker_publishes_tuned_ceilings() {
    let (source, feed) = ChannelSource::new("steady", 512);
    for i in 0..400 {
        feed.send(RawMessage::new(format!("m{i}")).boxed()).await.unwrap();
    }

    let handler = FnHandler::shared(|data: Vec<u8>| async move {
        tokio::time::sleep(Duration::from_millis(25)).await;
        Ok(Some(RawMessage::new(data).boxed()))
    });
    let metrics = Arc::new(RecordingMetrics::new());
    let settings =
        WorkerSettings::new("tuned").with_concurrency(ConcurrencySettings::dynamic(2, 1, 100));

    let worker = Worker::builder(settings)
        .source(source)
        .handler(handler)
        .output(Arc::new(RecordingSink::new("out")))
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let (result, ()) = tokio::join!(worker.start(token.clone()), async {
        // Spans three tuning windows: ceilings published at 0, 100 and 200 ms
        tokio::time::sleep(Duration::from_millis(250)).await;
        token.cancel();
    });

    assert!(result.is_ok());
    let ceilings = metrics.ceilings();
    assert!(ceilings.len() >= 3, "ceiling history: {ceilings:?}");
    assert_eq!(&ceilings[..3], &[2, 3, 4], "ceiling history: {ceilings:?}");

    let batches = metrics.batch_sizes();
    assert!(batches[0] > 0);
    assert!(batches[1] >= batches[0], "throughput fell: {batches:?}");
    drop(feed);
}
