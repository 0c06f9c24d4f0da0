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

//! Execution of prepared payouts as batched chain operations.
//!
//! Batches run strictly one after another from the single payout wallet. A failing batch is
//! recorded and the run moves on; reports are persisted after every batch so a crash leaves
//! the store consistent with the batches that completed.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    clients::{Collector, Reporter, Signer, Transactor},
    config::PayoutConfiguration,
    confirmation::{wait_for_confirmation, ConfirmationOptions},
    error::PayoutError,
    model::{OpHash, PayoutOperation, PayoutRecipe, PayoutReport},
    prepare::PreparedPayouts,
};

mod batch;

pub use batch::{plan_batches, BatchPlanOptions, PayoutBatch};

pub struct ExecutionContext {
    pub configuration: Arc<PayoutConfiguration>,
    pub signer: Arc<dyn Signer>,
    pub transactor: Arc<dyn Transactor>,
    pub collector: Arc<dyn Collector>,
    pub reporter: Arc<dyn Reporter>,
}

/// Outcome of one batch.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult {
    pub batch_index: usize,
    pub payouts: Vec<PayoutRecipe>,
    /// `None` when the operation was never broadcast.
    pub op_hash: Option<OpHash>,
    pub is_success: bool,
    pub error: Option<String>,
}

impl BatchResult {
    fn failed(
        batch_index: usize,
        payouts: Vec<PayoutRecipe>,
        op_hash: Option<OpHash>,
        error: String,
    ) -> Self {
        Self { batch_index, payouts, op_hash, is_success: false, error: Some(error) }
    }

    pub fn to_reports(&self) -> Vec<PayoutReport> {
        let note = self.error.clone().unwrap_or_default();
        self.payouts
            .iter()
            .map(|recipe| {
                PayoutReport::from_recipe(recipe, self.op_hash.clone(), self.is_success, &note)
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExecutePayoutsResult {
    pub batch_results: Vec<BatchResult>,
    /// Every report persisted by the run, including earlier successful payouts.
    pub reports: Vec<PayoutReport>,
    pub failed_batches: usize,
}

impl ExecutePayoutsResult {
    pub fn is_complete(&self) -> bool {
        self.failed_batches == 0
    }
}

async fn execute_batch(
    ctx: &ExecutionContext,
    batch_index: usize,
    batch: PayoutBatch,
    confirmation: &ConfirmationOptions,
    cancel: &CancellationToken,
) -> BatchResult {
    let operation = PayoutOperation {
        source: ctx.signer.pkh(),
        contents: batch.payouts.iter().map(PayoutRecipe::to_transfer).collect(),
    };

    let prepared = match ctx.transactor.complete(operation, &ctx.signer.public_key()).await {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!("Failed to complete operation of batch {}: {e:?}", batch_index);
            return BatchResult::failed(batch_index, batch.payouts, None, format!("{e:#}"));
        }
    };
    let signed = match ctx.signer.sign(prepared).await {
        Ok(signed) => signed,
        Err(e) => {
            tracing::error!("Failed to sign operation of batch {}: {e:?}", batch_index);
            return BatchResult::failed(batch_index, batch.payouts, None, format!("{e:#}"));
        }
    };
    let op_hash = match ctx.transactor.broadcast(&signed).await {
        Ok(op_hash) => op_hash,
        Err(e) => {
            tracing::error!("Failed to broadcast batch {}: {e:?}", batch_index);
            return BatchResult::failed(batch_index, batch.payouts, None, format!("{e:#}"));
        }
    };
    tracing::info!(
        "Broadcast batch {} with {} payouts as {}, waiting for confirmation",
        batch_index,
        batch.len(),
        op_hash
    );

    match wait_for_confirmation(
        &op_hash,
        ctx.transactor.as_ref(),
        ctx.collector.as_ref(),
        confirmation,
        cancel,
    )
    .await
    {
        Ok(()) => {
            tracing::info!("Batch {} confirmed in {}", batch_index, op_hash);
            BatchResult {
                batch_index,
                payouts: batch.payouts,
                op_hash: Some(op_hash),
                is_success: true,
                error: None,
            }
        }
        Err(e) => {
            tracing::error!("Batch {} was not confirmed: {}", batch_index, e);
            BatchResult::failed(batch_index, batch.payouts, Some(op_hash), e.to_string())
        }
    }
}

/// Execute prepared payouts, persisting reports as batches complete.
///
/// Batch failures do not fail the run; they are counted in
/// [ExecutePayoutsResult::failed_batches]. Cancellation stops dispatching further batches.
/// Invalid payouts are reported at the end, and cycle summaries only when every batch
/// succeeded, so an incomplete cycle is picked up again by the next run.
pub async fn execute_payouts(
    ctx: &ExecutionContext,
    prepared: PreparedPayouts,
    cancel: &CancellationToken,
) -> Result<ExecutePayoutsResult, PayoutError> {
    let network = &ctx.configuration.network;
    let limits = ctx.transactor.get_limits().await.map_err(PayoutError::Transactor)?;
    let batches = plan_batches(
        &prepared.valid,
        &limits,
        BatchPlanOptions {
            max_batch_size: network.batch_size,
            split_contract_calls: network.split_contract_calls,
        },
    )?;
    let confirmation = ConfirmationOptions::from(network);
    tracing::info!("Executing {} payouts in {} batches", prepared.valid.len(), batches.len());

    let mut reports = prepared.reports_of_past_successful_payouts.clone();
    reports.extend(prepared.reports_of_unsettled_payouts.iter().cloned());
    let mut result = ExecutePayoutsResult { reports, ..Default::default() };
    let mut interrupted = false;
    for (batch_index, batch) in batches.into_iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::warn!("Execution cancelled before batch {}", batch_index);
            interrupted = true;
            break;
        }
        let batch_result = execute_batch(ctx, batch_index, batch, &confirmation, cancel).await;
        if !batch_result.is_success {
            result.failed_batches += 1;
        }
        result.reports.extend(batch_result.to_reports());
        result.batch_results.push(batch_result);

        ctx.reporter.report_payouts(&result.reports).await.map_err(PayoutError::Reporter)?;
    }

    ctx.reporter
        .report_invalid_payouts(&prepared.invalid)
        .await
        .map_err(PayoutError::Reporter)?;
    if result.failed_batches == 0 && !interrupted {
        for summary in &prepared.summaries {
            ctx.reporter.report_cycle_summary(summary).await.map_err(PayoutError::Reporter)?;
        }
    } else {
        tracing::warn!(
            "{} of {} batches failed, cycle summaries not recorded",
            result.failed_batches,
            result.batch_results.len()
        );
    }

    Ok(result)
}
