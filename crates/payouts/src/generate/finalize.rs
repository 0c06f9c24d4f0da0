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

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    simulation::estimate_transfers, GeneratePayoutsOptions, GenerationStage, IncomeTotals,
    PayoutGenerationContext,
};
use crate::{
    error::PayoutError,
    model::{
        Address, CyclePayoutBlueprint, CyclePayoutSummary, InvalidReason, Mutez, PayoutKind,
        PayoutRecipe, TransferContent, TransferKind,
    },
};

/// Turns the simulated candidates into recipes and distributes the baker's income.
pub struct FinalizePayouts;

struct IncomeShare {
    kind: PayoutKind,
    recipient: Address,
    amount: Mutez,
}

fn income_shares(
    kind: PayoutKind,
    recipients: &BTreeMap<Address, f64>,
    amount: Mutez,
) -> impl Iterator<Item = IncomeShare> + '_ {
    recipients
        .iter()
        .map(move |(recipient, share)| IncomeShare {
            kind,
            recipient: recipient.clone(),
            amount: amount.portion(*share),
        })
        .filter(|share| !share.amount.is_zero())
}

#[async_trait]
impl GenerationStage for FinalizePayouts {
    fn name(&self) -> &'static str {
        "finalize_payouts"
    }

    async fn run(
        &self,
        mut ctx: PayoutGenerationContext,
        _options: &GeneratePayoutsOptions,
    ) -> Result<PayoutGenerationContext, PayoutError> {
        let cycle = ctx.stage_data.cycle.ok_or(PayoutError::MissingStageData("cycle"))?;
        let simulated = std::mem::take(&mut ctx.stage_data.simulated);
        let baker_balance = ctx.cycle_facts()?.baker_balance();
        let configuration = ctx.configuration.clone();
        let baker = &configuration.baker;

        let mut payouts: Vec<PayoutRecipe> =
            simulated.iter().map(|candidate| candidate.to_recipe(baker, cycle)).collect();

        let valid = simulated.iter().filter(|candidate| !candidate.is_invalid());
        let delegator_bonds: Mutez = valid.clone().map(|c| c.bonds_amount()).sum();
        let earned_fees: Mutez = valid.clone().map(|c| c.fee()).sum();
        let distributed_rewards: Mutez = valid.map(|c| c.amount()).sum();

        // Rounding dust and bonds of unpaid delegators stay with the baker.
        let baker_bonds = ctx.stage_data.total_rewards.saturating_sub(delegator_bonds);
        let recipients = &configuration.income_recipients;
        let donated_bonds = baker_bonds.portion(recipients.donate);
        let donated_fees = earned_fees.portion(recipients.donate);
        let income = IncomeTotals {
            earned_fees,
            distributed_rewards,
            bond_income: baker_bonds.saturating_sub(donated_bonds),
            fee_income: earned_fees.saturating_sub(donated_fees),
            donated_bonds,
            donated_fees,
        };

        let shares: Vec<IncomeShare> =
            income_shares(PayoutKind::BakerRewardIncome, &recipients.bonds, income.bond_income)
                .chain(income_shares(PayoutKind::FeeIncome, &recipients.fees, income.fee_income))
                .chain(income_shares(
                    PayoutKind::Donation,
                    &recipients.donations,
                    donated_bonds + donated_fees,
                ))
                .collect();
        let transfers: Vec<TransferContent> = shares
            .iter()
            .map(|share| TransferContent {
                destination: share.recipient.clone(),
                amount: share.amount,
                kind: TransferKind::Tez,
                limits: None,
            })
            .collect();
        let estimates =
            estimate_transfers(ctx.collector.as_ref(), &ctx.payout_wallet, &transfers).await;

        let payout = &configuration.payout;
        for (share, estimate) in shares.into_iter().zip(estimates) {
            let mut recipe = PayoutRecipe {
                baker: baker.clone(),
                delegator: baker.clone(),
                recipient: share.recipient,
                cycle,
                kind: share.kind,
                transfer: TransferKind::Tez,
                delegated_balance: baker_balance,
                amount: Mutez::ZERO,
                fee_rate: 0.0,
                fee: Mutez::ZERO,
                op_limits: None,
                is_valid: false,
                invalid_reason: None,
                note: String::new(),
            };
            match estimate {
                Ok(cost) => {
                    let deducted = cost.deducted_from_payout(
                        payout.baker_pays_transaction_fee,
                        payout.baker_pays_allocation_fee,
                    );
                    match share.amount.checked_sub(deducted) {
                        Some(amount) if !amount.is_zero() => {
                            recipe.amount = amount;
                            recipe.op_limits = Some(cost);
                            recipe.is_valid = true;
                        }
                        Some(_) => recipe.invalid_reason = Some(InvalidReason::PayoutZero),
                        None => {
                            recipe.invalid_reason = Some(InvalidReason::InsufficientBondsForTxCosts)
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        "Failed to estimate transaction costs of {} payout to {}: {}",
                        recipe.kind,
                        recipe.recipient,
                        error
                    );
                    recipe.invalid_reason = Some(InvalidReason::FailedToEstimateTxCosts);
                    recipe.note = error;
                }
            }
            payouts.push(recipe);
        }

        ctx.stage_data.income = income;
        ctx.stage_data.payouts = payouts;
        Ok(ctx)
    }
}

/// Packages the recipes and the cycle summary.
pub struct CreateBlueprint;

#[async_trait]
impl GenerationStage for CreateBlueprint {
    fn name(&self) -> &'static str {
        "create_blueprint"
    }

    async fn run(
        &self,
        mut ctx: PayoutGenerationContext,
        _options: &GeneratePayoutsOptions,
    ) -> Result<PayoutGenerationContext, PayoutError> {
        let payouts = std::mem::take(&mut ctx.stage_data.payouts);
        let facts = ctx.cycle_facts()?;
        let data = &ctx.stage_data;
        let income = data.income;

        let summary = CyclePayoutSummary {
            cycle: facts.cycle,
            delegators: facts.delegators.len(),
            paid_delegators: payouts
                .iter()
                .filter(|p| p.is_valid && p.kind == PayoutKind::DelegatorReward)
                .count(),
            staking_balance: facts.staking_balance,
            delegated_balance: facts.delegated_balance,
            baker_balance: facts.baker_balance(),
            effective_delegated_balance: data.effective_delegated_balance,
            earned_fees: income.earned_fees,
            earned_rewards: data.total_rewards,
            distributed_rewards: income.distributed_rewards,
            bond_income: income.bond_income,
            fee_income: income.fee_income,
            income_total: income.bond_income + income.fee_income,
            donated_bonds: income.donated_bonds,
            donated_fees: income.donated_fees,
            donated_total: income.donated_bonds + income.donated_fees,
            timestamp: Some(Utc::now()),
        };
        let blueprint = CyclePayoutBlueprint { cycle: facts.cycle, payouts, summary };
        ctx.stage_data.blueprint = Some(blueprint);
        Ok(ctx)
    }
}
