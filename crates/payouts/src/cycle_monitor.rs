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

//! Background watcher of the chain head that reports completed cycles.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{clients::Collector, config::CycleMonitorConfig, model::HeadMetadata};

const EVENT_BUFFER: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleMonitorError {
    #[error("cycle monitor was cancelled")]
    Cancelled,

    #[error("cycle monitor stopped unexpectedly")]
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleEvent {
    /// The given cycle has completed.
    Completed(i64),
    /// The producer stopped; no further events follow.
    Closed,
}

/// Blocks into a new cycle to wait before reporting the previous one completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationDelay {
    Fixed(i64),
    /// Uniform in `[0, max]`, drawn once per monitor.
    Random { max: i64 },
}

impl NotificationDelay {
    fn resolve(self) -> i64 {
        match self {
            NotificationDelay::Fixed(blocks) => blocks.max(0),
            NotificationDelay::Random { max } => rand::rng().random_range(0..=max.max(0)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CycleMonitorOptions {
    pub notification_delay: NotificationDelay,
    pub min_poll_interval: Duration,
    pub max_poll_interval: Duration,
}

impl From<&CycleMonitorConfig> for CycleMonitorOptions {
    fn from(config: &CycleMonitorConfig) -> Self {
        let notification_delay = match config.random_notification_delay_max {
            Some(max) => NotificationDelay::Random { max },
            None => NotificationDelay::Fixed(config.notification_delay),
        };
        Self {
            notification_delay,
            min_poll_interval: Duration::from_secs(config.min_poll_interval_secs),
            max_poll_interval: Duration::from_secs(config.max_poll_interval_secs),
        }
    }
}

impl CycleMonitorOptions {
    /// Half the expected time until the next interesting block, within the poll bounds.
    fn poll_interval(&self, head: &HeadMetadata, delay: i64) -> Duration {
        let blocks = if head.cycle_position < delay {
            delay - head.cycle_position
        } else {
            head.remaining_blocks() + delay
        };
        let secs = (blocks.max(0) as u64).saturating_mul(head.block_time_secs) / 2;
        Duration::from_secs(secs).clamp(self.min_poll_interval, self.max_poll_interval)
    }
}

async fn poll_head(
    collector: Arc<dyn Collector>,
    options: CycleMonitorOptions,
    delay: i64,
    events: mpsc::Sender<CycleEvent>,
    cancel: CancellationToken,
) {
    let mut last_emitted: Option<i64> = None;
    let mut backoff = options.min_poll_interval;
    loop {
        let wait = match collector.get_head_metadata().await {
            Ok(head) => {
                backoff = options.min_poll_interval;
                let completed = head.cycle - 1;
                let is_new = last_emitted.is_none_or(|last| completed > last);
                if is_new && completed >= 0 && head.cycle_position >= delay {
                    tracing::info!(
                        "Cycle {} completed (head level {}, position {})",
                        completed,
                        head.level,
                        head.cycle_position
                    );
                    if events.send(CycleEvent::Completed(completed)).await.is_err() {
                        return;
                    }
                    last_emitted = Some(completed);
                }
                options.poll_interval(&head, delay)
            }
            Err(e) => {
                backoff = (backoff * 2).min(options.max_poll_interval);
                tracing::warn!("Failed to fetch head metadata, retrying in {:?}: {e:?}", backoff);
                backoff
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }
    tracing::debug!("Cycle monitor stopped");
    let _ = events.send(CycleEvent::Closed).await;
}

/// Consumer side of the cycle monitor.
pub struct CycleMonitor {
    events: mpsc::Receiver<CycleEvent>,
    latest: Option<i64>,
    _stop: Option<DropGuard>,
}

impl CycleMonitor {
    /// Start polling the head in a background task. The task stops when `cancel` fires or the
    /// monitor is dropped.
    pub fn spawn(
        collector: Arc<dyn Collector>,
        options: CycleMonitorOptions,
        cancel: &CancellationToken,
    ) -> Self {
        let delay = options.notification_delay.resolve();
        tracing::info!("Starting cycle monitor with a notification delay of {} blocks", delay);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let stop = cancel.child_token();
        tokio::spawn(poll_head(collector, options, delay, tx, stop.clone()));
        Self { events: rx, latest: None, _stop: Some(stop.drop_guard()) }
    }

    /// Monitor over an externally produced event stream.
    pub fn from_receiver(events: mpsc::Receiver<CycleEvent>) -> Self {
        Self { events, latest: None, _stop: None }
    }

    /// Highest completed cycle observed so far.
    pub fn latest_completed_cycle(&self) -> Option<i64> {
        self.latest
    }

    pub async fn next_event(&mut self) -> CycleEvent {
        let event = self.events.recv().await.unwrap_or(CycleEvent::Closed);
        if let CycleEvent::Completed(cycle) = event {
            self.latest = Some(self.latest.map_or(cycle, |latest| latest.max(cycle)));
        }
        event
    }

    /// Wait until `last_processed + 1` has completed and return it.
    ///
    /// Returns immediately when a later cycle was already observed, so a consumer that fell
    /// behind catches up one cycle at a time.
    pub async fn wait_for_next_completed_cycle(
        &mut self,
        last_processed: i64,
    ) -> Result<i64, CycleMonitorError> {
        let next = last_processed + 1;
        loop {
            if self.latest.is_some_and(|latest| latest >= next) {
                return Ok(next);
            }
            match self.events.recv().await {
                Some(CycleEvent::Completed(cycle)) => {
                    self.latest = Some(self.latest.map_or(cycle, |latest| latest.max(cycle)));
                }
                Some(CycleEvent::Closed) => return Err(CycleMonitorError::Cancelled),
                None => return Err(CycleMonitorError::Closed),
            }
        }
    }
}
