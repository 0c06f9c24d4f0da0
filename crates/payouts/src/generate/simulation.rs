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

use async_trait::async_trait;

use super::{GeneratePayoutsOptions, GenerationStage, PayoutGenerationContext};
use crate::{
    clients::Collector,
    constants::SIMULATION_BATCH_CAPACITY,
    error::PayoutError,
    model::{
        Address, ContentSimulation, InvalidReason, OperationCost, PayoutOperation, TransferContent,
        TransferKind,
    },
};

/// Estimate the cost of every transfer.
///
/// Transfers are simulated in groups of [SIMULATION_BATCH_CAPACITY]. A group that fails as a
/// whole is retried one transfer at a time, so a single failing transfer only affects itself.
pub(crate) async fn estimate_transfers(
    collector: &dyn Collector,
    source: &Address,
    transfers: &[TransferContent],
) -> Vec<Result<OperationCost, String>> {
    let mut results = Vec::with_capacity(transfers.len());
    for chunk in transfers.chunks(SIMULATION_BATCH_CAPACITY) {
        let operation = PayoutOperation { source: source.clone(), contents: chunk.to_vec() };
        match collector.simulate(&operation).await {
            Ok(simulations) if simulations.len() == chunk.len() => {
                let costs: Option<Vec<OperationCost>> = simulations
                    .iter()
                    .map(|simulation| match simulation {
                        ContentSimulation::Applied(cost) => Some(*cost),
                        ContentSimulation::Failed(_) => None,
                    })
                    .collect();
                if let Some(costs) = costs {
                    results.extend(costs.into_iter().map(Ok));
                    continue;
                }
                tracing::warn!(
                    "Batch simulation of {} transfers failed, estimating individually",
                    chunk.len()
                );
            }
            Ok(simulations) => {
                tracing::warn!(
                    "Batch simulation returned {} results for {} transfers, estimating individually",
                    simulations.len(),
                    chunk.len()
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Batch simulation of {} transfers failed, estimating individually: {e:?}",
                    chunk.len()
                );
            }
        }
        for transfer in chunk {
            results.push(estimate_transfer(collector, source, transfer).await);
        }
    }
    results
}

async fn estimate_transfer(
    collector: &dyn Collector,
    source: &Address,
    transfer: &TransferContent,
) -> Result<OperationCost, String> {
    let operation = PayoutOperation { source: source.clone(), contents: vec![transfer.clone()] };
    match collector.simulate(&operation).await {
        Ok(simulations) => match simulations.into_iter().next() {
            Some(ContentSimulation::Applied(cost)) => Ok(cost),
            Some(ContentSimulation::Failed(error)) => Err(error),
            None => Err("simulation returned no result".to_string()),
        },
        Err(e) => Err(format!("{e:#}")),
    }
}

/// Simulates the payouts and applies their transaction costs.
pub struct CollectTransactionFees;

#[async_trait]
impl GenerationStage for CollectTransactionFees {
    fn name(&self) -> &'static str {
        "collect_transaction_fees"
    }

    async fn run(
        &self,
        mut ctx: PayoutGenerationContext,
        _options: &GeneratePayoutsOptions,
    ) -> Result<PayoutGenerationContext, PayoutError> {
        let candidates = std::mem::take(&mut ctx.stage_data.candidates_with_fees);
        let payout = &ctx.configuration.payout;

        let transfers: Vec<TransferContent> = candidates
            .iter()
            .filter(|c| !c.is_invalid() && !c.bonds_after_fee().is_zero())
            .map(|c| TransferContent {
                destination: c.candidate().recipient().clone(),
                amount: c.bonds_after_fee(),
                kind: TransferKind::Tez,
                limits: None,
            })
            .collect();
        tracing::debug!("Estimating transaction costs of {} payouts", transfers.len());
        let mut estimates =
            estimate_transfers(ctx.collector.as_ref(), &ctx.payout_wallet, &transfers)
                .await
                .into_iter();

        let mut simulated = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.is_invalid() || candidate.bonds_after_fee().is_zero() {
                simulated.push(candidate.without_cost());
                continue;
            }
            let estimate = estimates
                .next()
                .ok_or(PayoutError::MissingStageData("transaction cost estimate"))?;
            match estimate {
                Ok(cost) => simulated.push(candidate.with_cost(
                    cost,
                    payout.baker_pays_transaction_fee,
                    payout.baker_pays_allocation_fee,
                )),
                Err(error) => {
                    tracing::warn!(
                        "Failed to estimate transaction costs of payout to {}: {}",
                        candidate.candidate().recipient(),
                        error
                    );
                    simulated.push(candidate.with_failed_estimate(error));
                }
            }
        }

        ctx.stage_data.simulated = simulated;
        Ok(ctx)
    }
}

/// Invalidates payouts with nothing or too little left to pay.
pub struct ValidateSimulatedPayouts;

#[async_trait]
impl GenerationStage for ValidateSimulatedPayouts {
    fn name(&self) -> &'static str {
        "validate_simulated_payouts"
    }

    async fn run(
        &self,
        mut ctx: PayoutGenerationContext,
        _options: &GeneratePayoutsOptions,
    ) -> Result<PayoutGenerationContext, PayoutError> {
        let minimum = ctx.configuration.payout.minimum_payout_amount;
        let simulated = std::mem::take(&mut ctx.stage_data.simulated);
        ctx.stage_data.simulated = simulated
            .into_iter()
            .map(|candidate| {
                if candidate.is_invalid() {
                    candidate
                } else if candidate.amount().is_zero() {
                    candidate.invalidate(InvalidReason::PayoutZero)
                } else if candidate.amount() < minimum {
                    candidate.invalidate(InvalidReason::PayoutBelowMinimum)
                } else {
                    candidate
                }
            })
            .collect();
        Ok(ctx)
    }
}
