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
    constants::DELEGATION_CAPACITY_FACTOR,
    error::PayoutError,
    model::{CycleFacts, InvalidReason, Mutez},
};

/// The baker's share of the cycle rewards.
///
/// The baker gets `total_rewards / DELEGATION_CAPACITY_FACTOR` while overdelegated with
/// protection enabled. Otherwise it gets its pro-rata share by own balance. The
/// overdelegation limit is the frozen deposit limit when set, else the baker's own balance.
pub fn get_baker_bonds_amount(
    facts: &CycleFacts,
    effective_delegated_balance: Mutez,
    total_rewards: Mutez,
    overdelegation_protection: bool,
) -> Mutez {
    let baker_balance = facts.baker_balance();
    let counted_balance = effective_delegated_balance + baker_balance;
    let overdelegation_limit = if facts.frozen_deposit_limit.is_zero() {
        baker_balance
    } else {
        facts.frozen_deposit_limit
    };
    let overdelegated =
        overdelegation_limit.mul_u64(DELEGATION_CAPACITY_FACTOR) < counted_balance;

    if overdelegation_protection && overdelegated {
        total_rewards.div_u64(DELEGATION_CAPACITY_FACTOR)
    } else {
        total_rewards.mul_div(baker_balance, counted_balance)
    }
}

/// Splits the reward pool between the baker and the valid delegators.
pub struct DistributeBonds;

#[async_trait]
impl GenerationStage for DistributeBonds {
    fn name(&self) -> &'static str {
        "distribute_bonds"
    }

    async fn run(
        &self,
        mut ctx: PayoutGenerationContext,
        _options: &GeneratePayoutsOptions,
    ) -> Result<PayoutGenerationContext, PayoutError> {
        let candidates = std::mem::take(&mut ctx.stage_data.candidates);
        let facts = ctx.cycle_facts()?;
        let total_rewards = facts.total_rewards(ctx.configuration.payout.payout_mode);

        // Only globally ignored delegators leave the distribution base; other invalid
        // candidates still count towards the overdelegation math.
        let effective_delegated_balance: Mutez = candidates
            .iter()
            .filter(|c| c.invalid_reason() != Some(InvalidReason::DelegatorIgnored))
            .map(|c| c.delegated_balance())
            .sum();

        let baker_bonds = get_baker_bonds_amount(
            facts,
            effective_delegated_balance,
            total_rewards,
            ctx.configuration.overdelegation.protect,
        );
        let distributable = total_rewards.saturating_sub(baker_bonds);
        tracing::info!(
            "Cycle {} rewards: {} total, {} baker bonds, {} to delegators, effective delegated balance {}",
            facts.cycle,
            total_rewards,
            baker_bonds,
            distributable,
            effective_delegated_balance
        );

        let with_bonds = candidates
            .into_iter()
            .map(|candidate| {
                let bonds = distributable
                    .mul_div(candidate.delegated_balance(), effective_delegated_balance);
                candidate.with_bond_amount(bonds)
            })
            .collect();

        ctx.stage_data.total_rewards = total_rewards;
        ctx.stage_data.effective_delegated_balance = effective_delegated_balance;
        ctx.stage_data.baker_bonds = baker_bonds;
        ctx.stage_data.candidates_with_bonds = with_bonds;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(frozen_deposit_limit: u64) -> CycleFacts {
        CycleFacts {
            cycle: 500,
            staking_balance: Mutez::from(20_000_000),
            delegated_balance: Mutez::from(19_000_000),
            frozen_deposit_limit: Mutez::from(frozen_deposit_limit),
            block_rewards: Mutez::from(1_000),
            endorsement_rewards: Mutez::from(10_000),
            ideal_block_rewards: Mutez::from(1_000),
            ideal_endorsement_rewards: Mutez::from(10_000),
            block_fees: Mutez::ZERO,
            delegators: vec![],
        }
    }

    #[test]
    fn overdelegated_baker_gets_fixed_share() {
        let facts = facts(0);
        let total = Mutez::from(11_000);
        assert_eq!(
            get_baker_bonds_amount(&facts, Mutez::from(19_000_000), total, true),
            Mutez::from(1_100)
        );
        assert_eq!(
            get_baker_bonds_amount(&facts, Mutez::from(19_000_000), total, false),
            Mutez::from(550)
        );
    }

    #[test]
    fn baker_within_capacity_gets_pro_rata_share() {
        let facts = facts(0);
        let total = Mutez::from(11_000);
        assert_eq!(
            get_baker_bonds_amount(&facts, Mutez::from(9_000_000), total, true),
            Mutez::from(1_100)
        );
        assert_eq!(
            get_baker_bonds_amount(&facts, Mutez::from(9_000_000), total, false),
            Mutez::from(1_100)
        );
    }

    #[test]
    fn frozen_deposit_limit_bounds_capacity() {
        // A limit of 3M lifts capacity to 30M, so 19M delegated is not overdelegated.
        let facts = facts(3_000_000);
        assert_eq!(
            get_baker_bonds_amount(&facts, Mutez::from(19_000_000), Mutez::from(11_000), true),
            Mutez::from(550)
        );
    }

    #[test]
    fn no_balance_yields_no_share() {
        let mut facts = facts(0);
        facts.staking_balance = Mutez::ZERO;
        facts.delegated_balance = Mutez::ZERO;
        assert_eq!(
            get_baker_bonds_amount(&facts, Mutez::ZERO, Mutez::from(11_000), false),
            Mutez::ZERO
        );
    }
}
