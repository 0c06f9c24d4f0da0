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

//! Payout generation: cycle facts to a validated, fee-adjusted [CyclePayoutBlueprint].
//!
//! Generation runs as an ordered list of [GenerationStage]s over a [PayoutGenerationContext].
//! Each stage consumes the context and returns it with its own results added; the first
//! error aborts the run.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    clients::{Collector, Notificator},
    config::PayoutConfiguration,
    constants::{BALANCE_CHECK_INTERVAL, BALANCE_NOTIFICATION_EVERY},
    error::PayoutError,
    model::{Address, CycleFacts, CyclePayoutBlueprint, Mutez, PayoutRecipe},
};

mod balance;
mod bonds;
mod candidates;
mod fees;
mod finalize;
mod simulation;
mod validators;

pub use balance::CheckSufficientBalance;
pub use bonds::{get_baker_bonds_amount, DistributeBonds};
pub use candidates::{
    GenerateCandidates, PayoutCandidate, PayoutCandidateSimulated, PayoutCandidateWithBondAmount,
    PayoutCandidateWithBondAmountAndFee,
};
pub use fees::CollectBakerFee;
pub use finalize::{CreateBlueprint, FinalizePayouts};
pub use simulation::{CollectTransactionFees, ValidateSimulatedPayouts};
pub use validators::{
    validate_candidate, CandidateValidator, Validation, ValidationContext, CANDIDATE_VALIDATORS,
};

#[derive(Clone, Debug)]
pub struct GeneratePayoutsOptions {
    /// Cycle to generate payouts for. Defaults to the last completed cycle.
    pub cycle: Option<i64>,
    pub skip_balance_check: bool,
    /// Wait for the payout wallet to be refilled instead of failing.
    pub wait_for_sufficient_balance: bool,
    pub balance_check_interval: Duration,
    /// Number of balance checks between admin notifications while waiting.
    pub balance_notification_every: u32,
}

impl Default for GeneratePayoutsOptions {
    fn default() -> Self {
        Self {
            cycle: None,
            skip_balance_check: false,
            wait_for_sufficient_balance: false,
            balance_check_interval: BALANCE_CHECK_INTERVAL,
            balance_notification_every: BALANCE_NOTIFICATION_EVERY,
        }
    }
}

impl GeneratePayoutsOptions {
    /// Options for the given cycle, with balance waiting taken from the configuration.
    pub fn for_cycle(cycle: Option<i64>, configuration: &PayoutConfiguration) -> Self {
        Self {
            cycle,
            wait_for_sufficient_balance: configuration.payout.wait_for_sufficient_balance,
            balance_check_interval: configuration.balance_check_interval(),
            ..Default::default()
        }
    }
}

/// Results accumulated by the generation stages.
#[derive(Debug, Default)]
pub struct StageData {
    pub cycle: Option<i64>,
    pub cycle_facts: Option<CycleFacts>,
    pub total_rewards: Mutez,
    pub effective_delegated_balance: Mutez,
    /// Baker share as computed by the bond distribution, before rounding dust is added.
    pub baker_bonds: Mutez,
    pub candidates: Vec<PayoutCandidate>,
    pub candidates_with_bonds: Vec<PayoutCandidateWithBondAmount>,
    pub candidates_with_fees: Vec<PayoutCandidateWithBondAmountAndFee>,
    pub simulated: Vec<PayoutCandidateSimulated>,
    pub income: IncomeTotals,
    pub payouts: Vec<PayoutRecipe>,
    pub blueprint: Option<CyclePayoutBlueprint>,
}

/// Final baker income of a cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IncomeTotals {
    pub earned_fees: Mutez,
    pub distributed_rewards: Mutez,
    pub bond_income: Mutez,
    pub fee_income: Mutez,
    pub donated_bonds: Mutez,
    pub donated_fees: Mutez,
}

pub struct PayoutGenerationContext {
    pub configuration: Arc<PayoutConfiguration>,
    pub collector: Arc<dyn Collector>,
    pub notificator: Arc<dyn Notificator>,
    /// Account the payouts are sent from.
    pub payout_wallet: Address,
    pub stage_data: StageData,
}

impl PayoutGenerationContext {
    pub fn new(
        configuration: Arc<PayoutConfiguration>,
        collector: Arc<dyn Collector>,
        notificator: Arc<dyn Notificator>,
        payout_wallet: Address,
    ) -> Self {
        Self {
            configuration,
            collector,
            notificator,
            payout_wallet,
            stage_data: StageData::default(),
        }
    }

    pub(crate) fn cycle_facts(&self) -> Result<&CycleFacts, PayoutError> {
        self.stage_data.cycle_facts.as_ref().ok_or(PayoutError::MissingStageData("cycle facts"))
    }
}

/// One step of payout generation.
#[async_trait]
pub trait GenerationStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: PayoutGenerationContext,
        options: &GeneratePayoutsOptions,
    ) -> Result<PayoutGenerationContext, PayoutError>;
}

/// The stages of a complete generation run, in order.
pub const GENERATION_STAGES: &[&dyn GenerationStage] = &[
    &GenerateCandidates,
    &DistributeBonds,
    &CheckSufficientBalance,
    &CollectBakerFee,
    &CollectTransactionFees,
    &ValidateSimulatedPayouts,
    &FinalizePayouts,
    &CreateBlueprint,
];

/// Run the stages in order, stopping at the first error.
pub async fn run_stages(
    mut ctx: PayoutGenerationContext,
    options: &GeneratePayoutsOptions,
    stages: &[&dyn GenerationStage],
) -> Result<PayoutGenerationContext, PayoutError> {
    for stage in stages {
        tracing::debug!("Running payout generation stage {}", stage.name());
        ctx = stage.run(ctx, options).await?;
    }
    Ok(ctx)
}

/// Generate the payout blueprint of a cycle.
pub async fn generate_payouts(
    ctx: PayoutGenerationContext,
    options: &GeneratePayoutsOptions,
) -> Result<CyclePayoutBlueprint, PayoutError> {
    let ctx = run_stages(ctx, options, GENERATION_STAGES).await?;
    let blueprint =
        ctx.stage_data.blueprint.ok_or(PayoutError::MissingStageData("payout blueprint"))?;
    tracing::info!(
        "Generated {} payouts for cycle {} ({} valid)",
        blueprint.payouts.len(),
        blueprint.cycle,
        blueprint.valid_payouts().count()
    );
    Ok(blueprint)
}
