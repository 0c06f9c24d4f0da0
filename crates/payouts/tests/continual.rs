// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Continual mode and the cycle monitor.

mod common;

use std::{sync::Arc, time::Duration};

use bakerpay_payouts::{
    continual::{process_cycle, run_continual_with_monitor, ContinualOptions, CycleRunOutcome},
    cycle_monitor::{CycleEvent, CycleMonitor, CycleMonitorOptions, NotificationDelay},
    lock::{lock_file_path, try_lock_cycle},
    CyclePayoutSummary, OperationLimits, PayoutError,
};
use bakerpay_test_utils::{
    fixtures::{self, head, uniform_cycle_facts},
    MockTransactor,
};
use common::Harness;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const BALANCE: u64 = 1_000_000_000;

fn options(lock_root: &std::path::Path, last_processed_cycle: i64) -> ContinualOptions {
    let mut options = ContinualOptions::new(lock_root, &fixtures::configuration());
    options.last_processed_cycle = Some(last_processed_cycle);
    options.lock_timeout = Duration::from_secs(1);
    options
}

async fn monitor_over(events: Vec<CycleEvent>) -> CycleMonitor {
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        tx.send(event).await.expect("receiver alive");
    }
    CycleMonitor::from_receiver(rx)
}

#[tokio::test]
async fn test_pays_each_completed_cycle() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(10, BALANCE));
    harness.collector.add_cycle(uniform_cycle_facts(11, BALANCE));
    let root = tempfile::tempdir()?;

    let monitor = monitor_over(vec![
        CycleEvent::Completed(10),
        CycleEvent::Completed(11),
        CycleEvent::Closed,
    ])
    .await;
    run_continual_with_monitor(
        harness.services(),
        options(root.path(), 9),
        monitor,
        CancellationToken::new(),
    )
    .await?;

    assert!(harness.reporter.summary(10).is_some());
    assert!(harness.reporter.summary(11).is_some());
    assert_eq!(harness.reporter.reports(11).len(), 6);
    assert_eq!(harness.transactor.broadcasts().len(), 2);
    // Locks are released after every cycle.
    assert!(!lock_file_path(root.path(), 10).exists());
    assert!(!lock_file_path(root.path(), 11).exists());
    Ok(())
}

#[tokio::test]
async fn test_skips_cycles_with_a_summary() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(10, BALANCE));
    harness.collector.add_cycle(uniform_cycle_facts(11, BALANCE));
    harness.reporter.seed_summary(CyclePayoutSummary { cycle: 10, ..Default::default() });
    let root = tempfile::tempdir()?;
    let options = options(root.path(), 9);
    let cancel = CancellationToken::new();

    let outcome = process_cycle(&harness.services(), 10, &options, &cancel).await?;
    assert!(matches!(outcome, CycleRunOutcome::AlreadyPaid));
    assert!(harness.transactor.broadcasts().is_empty());

    let outcome = process_cycle(&harness.services(), 11, &options, &cancel).await?;
    match outcome {
        CycleRunOutcome::Executed(result) => assert!(result.is_complete()),
        other => panic!("unexpected outcome: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_locked_cycle_is_not_paid() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(10, BALANCE));
    let root = tempfile::tempdir()?;
    let _held = try_lock_cycle(root.path(), 10)?.expect("lock is free");

    let result =
        process_cycle(&harness.services(), 10, &options(root.path(), 9), &CancellationToken::new())
            .await;
    assert!(matches!(result, Err(PayoutError::Lock(_))), "{result:?}");
    assert!(harness.transactor.broadcasts().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_batches_notify_the_admin() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(10, BALANCE));
    harness.transactor.push_outcome(bakerpay_test_utils::BroadcastOutcome::Rejected);
    let root = tempfile::tempdir()?;

    process_cycle(&harness.services(), 10, &options(root.path(), 9), &CancellationToken::new())
        .await?;
    let messages = harness.notificator.messages();
    assert_eq!(messages, vec!["Payouts of cycle 10: 1 of 1 batches failed".to_string()]);
    assert_eq!(harness.reporter.summary(10), None);
    Ok(())
}

#[tokio::test]
async fn test_fatal_error_stops_continual_mode() -> anyhow::Result<()> {
    let mut harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(10, BALANCE));
    let limits = OperationLimits {
        hard_gas_limit_per_operation: 10,
        ..fixtures::limits()
    };
    harness.transactor =
        Arc::new(MockTransactor::new(harness.collector.clone()).with_limits(limits));
    let root = tempfile::tempdir()?;

    let monitor = monitor_over(vec![CycleEvent::Completed(10)]).await;
    let result = run_continual_with_monitor(
        harness.services(),
        options(root.path(), 9),
        monitor,
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(PayoutError::PayoutExceedsOperationLimits { .. })), "{result:?}");
    assert_eq!(harness.notificator.messages().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    let root = tempfile::tempdir()?;

    // Cycle data shows up only after the first attempt failed.
    let collector = harness.collector.clone();
    let publisher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        collector.add_cycle(uniform_cycle_facts(10, BALANCE));
    });

    let monitor = monitor_over(vec![CycleEvent::Completed(10), CycleEvent::Closed]).await;
    run_continual_with_monitor(
        harness.services(),
        options(root.path(), 9),
        monitor,
        CancellationToken::new(),
    )
    .await?;
    publisher.await?;
    assert!(harness.reporter.summary(10).is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_ends_the_retry_loop() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    let root = tempfile::tempdir()?;
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        canceller.cancel();
    });

    // Cycle 10 has no data, so every attempt fails until cancellation.
    let monitor = monitor_over(vec![CycleEvent::Completed(10)]).await;
    run_continual_with_monitor(harness.services(), options(root.path(), 9), monitor, cancel)
        .await?;
    assert_eq!(harness.reporter.summary(10), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_monitor_reports_completed_cycles_from_the_head() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.push_head(head(5, 50));
    harness.collector.push_head(head(5, 99));
    harness.collector.push_head(head(6, 0));
    harness.collector.push_head(head(6, 3));

    let cancel = CancellationToken::new();
    let options = CycleMonitorOptions {
        notification_delay: NotificationDelay::Fixed(2),
        min_poll_interval: Duration::from_secs(2),
        max_poll_interval: Duration::from_secs(120),
    };
    let mut monitor = CycleMonitor::spawn(harness.collector.clone(), options, &cancel);

    assert_eq!(monitor.wait_for_next_completed_cycle(3).await?, 4);
    assert_eq!(monitor.wait_for_next_completed_cycle(4).await?, 5);

    cancel.cancel();
    loop {
        match monitor.next_event().await {
            CycleEvent::Closed => break,
            CycleEvent::Completed(cycle) => assert!(cycle <= 5),
        }
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_monitor_backs_off_while_the_head_is_unavailable() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.push_head(head(6, 3));
    harness.collector.fail_head_metadata(4);

    let cancel = CancellationToken::new();
    let options = CycleMonitorOptions {
        notification_delay: NotificationDelay::Fixed(0),
        min_poll_interval: Duration::from_secs(2),
        max_poll_interval: Duration::from_secs(5),
    };
    let started = tokio::time::Instant::now();
    let mut monitor = CycleMonitor::spawn(harness.collector.clone(), options, &cancel);
    assert_eq!(monitor.wait_for_next_completed_cycle(4).await?, 5);

    // Retries after 4s, then 5s three times: doubled from the minimum and capped at the maximum.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(19), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(20), "{elapsed:?}");
    assert_eq!(harness.collector.head_requests(), 5);
    cancel.cancel();
    Ok(())
}
