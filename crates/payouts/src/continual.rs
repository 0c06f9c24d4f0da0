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

//! Continual mode: pay every cycle as it completes.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    clients::{Collector, Notificator, Reporter, Signer, Transactor},
    config::PayoutConfiguration,
    constants::{CONTINUAL_RETRY_DELAY, DEFAULT_LOCK_TIMEOUT},
    cycle_monitor::{CycleMonitor, CycleMonitorOptions},
    error::PayoutError,
    execute::{execute_payouts, ExecutePayoutsResult, ExecutionContext},
    generate::{generate_payouts, GeneratePayoutsOptions, PayoutGenerationContext},
    lock::lock_cycles,
    prepare::prepare_payouts,
};

/// Collaborators shared by every cycle run.
#[derive(Clone)]
pub struct PayoutServices {
    pub configuration: Arc<PayoutConfiguration>,
    pub collector: Arc<dyn Collector>,
    pub signer: Arc<dyn Signer>,
    pub transactor: Arc<dyn Transactor>,
    pub reporter: Arc<dyn Reporter>,
    pub notificator: Arc<dyn Notificator>,
}

impl PayoutServices {
    fn generation_context(&self) -> PayoutGenerationContext {
        PayoutGenerationContext::new(
            self.configuration.clone(),
            self.collector.clone(),
            self.notificator.clone(),
            self.signer.pkh(),
        )
    }

    fn execution_context(&self) -> ExecutionContext {
        ExecutionContext {
            configuration: self.configuration.clone(),
            signer: self.signer.clone(),
            transactor: self.transactor.clone(),
            collector: self.collector.clone(),
            reporter: self.reporter.clone(),
        }
    }

    async fn notify(&self, message: &str) {
        if let Err(e) = self.notificator.notify_admin(message).await {
            tracing::warn!("Failed to notify admin: {e:?}");
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContinualOptions {
    /// Directory holding the cycle lock files.
    pub lock_root: PathBuf,
    pub lock_timeout: Duration,
    /// Last cycle already paid. Defaults to the one before the last completed cycle.
    pub last_processed_cycle: Option<i64>,
    pub retry_delay: Duration,
    pub monitor: CycleMonitorOptions,
}

impl ContinualOptions {
    pub fn new(lock_root: impl Into<PathBuf>, configuration: &PayoutConfiguration) -> Self {
        Self {
            lock_root: lock_root.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            last_processed_cycle: None,
            retry_delay: CONTINUAL_RETRY_DELAY,
            monitor: CycleMonitorOptions::from(&configuration.cycle_monitor),
        }
    }
}

#[derive(Debug)]
pub enum CycleRunOutcome {
    /// A summary was already recorded for the cycle.
    AlreadyPaid,
    Executed(ExecutePayoutsResult),
}

/// Lock a cycle, then generate, prepare and execute its payouts.
pub async fn pay_cycle(
    services: &PayoutServices,
    cycle: i64,
    options: &ContinualOptions,
    cancel: &CancellationToken,
) -> Result<ExecutePayoutsResult, PayoutError> {
    let locks = lock_cycles(&options.lock_root, &[cycle], options.lock_timeout, cancel).await?;

    let generation = GeneratePayoutsOptions::for_cycle(Some(cycle), &services.configuration);
    let blueprint = tokio::select! {
        _ = cancel.cancelled() => return Err(PayoutError::Cancelled),
        blueprint = generate_payouts(services.generation_context(), &generation) => blueprint?,
    };
    let prepared = prepare_payouts(
        std::slice::from_ref(&blueprint),
        services.reporter.as_ref(),
        Some(services.collector.as_ref()),
    )
    .await?;
    let result = execute_payouts(&services.execution_context(), prepared, cancel).await?;

    locks.release()?;
    Ok(result)
}

/// Pay a cycle unless it already has a recorded summary.
pub async fn process_cycle(
    services: &PayoutServices,
    cycle: i64,
    options: &ContinualOptions,
    cancel: &CancellationToken,
) -> Result<CycleRunOutcome, PayoutError> {
    let summary = services
        .reporter
        .get_existing_cycle_summary(cycle)
        .await
        .map_err(PayoutError::Reporter)?;
    if summary.is_some() {
        tracing::info!("Cycle {} was already paid, skipping", cycle);
        return Ok(CycleRunOutcome::AlreadyPaid);
    }

    tracing::info!("Paying cycle {}", cycle);
    let result = pay_cycle(services, cycle, options, cancel).await?;
    if result.is_complete() {
        tracing::info!("Cycle {} paid with {} reports", cycle, result.reports.len());
    } else {
        let message = format!(
            "Payouts of cycle {cycle}: {} of {} batches failed",
            result.failed_batches,
            result.batch_results.len()
        );
        tracing::error!("{}", message);
        services.notify(&message).await;
    }
    Ok(CycleRunOutcome::Executed(result))
}

/// Run continual mode until cancelled or a fatal error occurs.
pub async fn run_continual(
    services: PayoutServices,
    options: ContinualOptions,
    cancel: CancellationToken,
) -> Result<(), PayoutError> {
    let monitor = CycleMonitor::spawn(services.collector.clone(), options.monitor.clone(), &cancel);
    run_continual_with_monitor(services, options, monitor, cancel).await
}

/// [run_continual] driven by the given monitor.
pub async fn run_continual_with_monitor(
    services: PayoutServices,
    options: ContinualOptions,
    mut monitor: CycleMonitor,
    cancel: CancellationToken,
) -> Result<(), PayoutError> {
    let mut last_processed = match options.last_processed_cycle {
        Some(cycle) => cycle,
        None => {
            services.collector.get_last_completed_cycle().await.map_err(PayoutError::Collector)?
                - 1
        }
    };
    tracing::info!("Continual payouts starting after cycle {}", last_processed);

    loop {
        let cycle = match monitor.wait_for_next_completed_cycle(last_processed).await {
            Ok(cycle) => cycle,
            Err(e) => {
                tracing::info!("Continual payouts stopped: {}", e);
                return Ok(());
            }
        };

        loop {
            match process_cycle(&services, cycle, &options, &cancel).await {
                Ok(_) => break,
                Err(_) if cancel.is_cancelled() => {
                    tracing::info!("Continual payouts cancelled during cycle {}", cycle);
                    return Ok(());
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("Fatal error while paying cycle {}: {e:?}", cycle);
                    services.notify(&format!("Payouts stopped at cycle {cycle}: {e}")).await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to pay cycle {}, retrying in {:?}: {e:?}",
                        cycle,
                        options.retry_delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(options.retry_delay) => {}
                    }
                }
            }
        }
        last_processed = cycle;
    }
}
