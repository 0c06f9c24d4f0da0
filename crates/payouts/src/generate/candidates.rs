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

use super::{
    validators::{validate_candidate, ValidationContext},
    GeneratePayoutsOptions, GenerationStage, PayoutGenerationContext,
};
use crate::{
    config::PayoutConfiguration,
    error::PayoutError,
    model::{
        Address, Delegator, InvalidReason, Mutez, OperationCost, PayoutKind, PayoutRecipe,
        TransferKind,
    },
};

/// One delegator entering the payout computation.
///
/// Candidates only ever become more invalid: the first reason sticks, and every later
/// layer reports zero amounts for an invalid candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct PayoutCandidate {
    delegator: Address,
    recipient: Address,
    /// Override recipient that failed to parse.
    unparsable_recipient: Option<String>,
    delegated_balance: Mutez,
    emptied: bool,
    fee_rate: f64,
    invalid_reason: Option<InvalidReason>,
}

impl PayoutCandidate {
    /// Map a delegator through the configuration.
    pub fn from_delegator(delegator: &Delegator, configuration: &PayoutConfiguration) -> Self {
        let (recipient, unparsable_recipient) =
            match configuration.recipient_override(&delegator.address) {
                Some(raw) => match raw.parse::<Address>() {
                    Ok(recipient) => (recipient, None),
                    Err(_) => (delegator.address.clone(), Some(raw.to_string())),
                },
                None => (delegator.address.clone(), None),
            };
        Self {
            delegator: delegator.address.clone(),
            recipient,
            unparsable_recipient,
            delegated_balance: delegator.delegated_balance,
            emptied: delegator.emptied,
            fee_rate: configuration.fee_rate_for(&delegator.address),
            invalid_reason: None,
        }
    }

    pub fn delegator(&self) -> &Address {
        &self.delegator
    }

    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    pub fn unparsable_recipient(&self) -> Option<&str> {
        self.unparsable_recipient.as_deref()
    }

    pub fn delegated_balance(&self) -> Mutez {
        self.delegated_balance
    }

    pub fn is_emptied(&self) -> bool {
        self.emptied
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        self.invalid_reason
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid_reason.is_some()
    }

    /// Mark the candidate invalid. An existing reason is kept.
    pub fn invalidate(mut self, reason: InvalidReason) -> Self {
        self.invalid_reason.get_or_insert(reason);
        self
    }

    pub fn with_bond_amount(self, bonds_amount: Mutez) -> PayoutCandidateWithBondAmount {
        let bonds_amount = if self.is_invalid() { Mutez::ZERO } else { bonds_amount };
        PayoutCandidateWithBondAmount { candidate: self, bonds_amount }
    }

    fn base_recipe(&self, baker: &Address, cycle: i64) -> PayoutRecipe {
        PayoutRecipe {
            baker: baker.clone(),
            delegator: self.delegator.clone(),
            recipient: self.recipient.clone(),
            cycle,
            kind: if self.is_invalid() { PayoutKind::Invalid } else { PayoutKind::DelegatorReward },
            transfer: TransferKind::Tez,
            delegated_balance: self.delegated_balance,
            amount: Mutez::ZERO,
            fee_rate: self.fee_rate,
            fee: Mutez::ZERO,
            op_limits: None,
            is_valid: !self.is_invalid(),
            invalid_reason: self.invalid_reason,
            note: self.unparsable_recipient.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PayoutCandidateWithBondAmount {
    candidate: PayoutCandidate,
    bonds_amount: Mutez,
}

impl PayoutCandidateWithBondAmount {
    pub fn candidate(&self) -> &PayoutCandidate {
        &self.candidate
    }

    pub fn bonds_amount(&self) -> Mutez {
        self.bonds_amount
    }

    pub fn is_invalid(&self) -> bool {
        self.candidate.is_invalid()
    }

    pub fn invalidate(self, reason: InvalidReason) -> Self {
        Self { candidate: self.candidate.invalidate(reason), bonds_amount: Mutez::ZERO }
    }

    /// Withhold the baker fee from the bonds.
    pub fn with_fee(self) -> PayoutCandidateWithBondAmountAndFee {
        let fee = self.bonds_amount.portion(self.candidate.fee_rate);
        let bonds_after_fee = self.bonds_amount.saturating_sub(fee);
        PayoutCandidateWithBondAmountAndFee { candidate: self, fee, bonds_after_fee }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PayoutCandidateWithBondAmountAndFee {
    candidate: PayoutCandidateWithBondAmount,
    fee: Mutez,
    bonds_after_fee: Mutez,
}

impl PayoutCandidateWithBondAmountAndFee {
    pub fn candidate(&self) -> &PayoutCandidate {
        self.candidate.candidate()
    }

    pub fn bonds_amount(&self) -> Mutez {
        self.candidate.bonds_amount()
    }

    pub fn fee(&self) -> Mutez {
        self.fee
    }

    pub fn bonds_after_fee(&self) -> Mutez {
        self.bonds_after_fee
    }

    pub fn is_invalid(&self) -> bool {
        self.candidate.is_invalid()
    }

    pub fn invalidate(self, reason: InvalidReason) -> Self {
        Self {
            candidate: self.candidate.invalidate(reason),
            fee: Mutez::ZERO,
            bonds_after_fee: Mutez::ZERO,
        }
    }

    /// Apply the simulated transaction cost.
    ///
    /// Costs the baker does not pay are deducted from the bonds; a candidate whose bonds do
    /// not cover them becomes invalid.
    pub fn with_cost(
        self,
        cost: OperationCost,
        baker_pays_transaction_fee: bool,
        baker_pays_allocation_fee: bool,
    ) -> PayoutCandidateSimulated {
        if self.is_invalid() {
            return PayoutCandidateSimulated::unsimulated(self);
        }
        let deducted =
            cost.deducted_from_payout(baker_pays_transaction_fee, baker_pays_allocation_fee);
        match self.bonds_after_fee.checked_sub(deducted) {
            Some(amount) => {
                PayoutCandidateSimulated { candidate: self, cost: Some(cost), amount, note: None }
            }
            None => PayoutCandidateSimulated::unsimulated(
                self.invalidate(InvalidReason::InsufficientBondsForTxCosts),
            ),
        }
    }

    pub fn with_failed_estimate(self, error: String) -> PayoutCandidateSimulated {
        let mut simulated = PayoutCandidateSimulated::unsimulated(
            self.invalidate(InvalidReason::FailedToEstimateTxCosts),
        );
        simulated.note = Some(error);
        simulated
    }

    /// Carry the candidate over without a simulation, e.g. when there is nothing to pay.
    pub fn without_cost(self) -> PayoutCandidateSimulated {
        PayoutCandidateSimulated::unsimulated(self)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PayoutCandidateSimulated {
    candidate: PayoutCandidateWithBondAmountAndFee,
    cost: Option<OperationCost>,
    /// Net amount transferred to the recipient.
    amount: Mutez,
    note: Option<String>,
}

impl PayoutCandidateSimulated {
    fn unsimulated(candidate: PayoutCandidateWithBondAmountAndFee) -> Self {
        let amount = if candidate.is_invalid() { Mutez::ZERO } else { candidate.bonds_after_fee };
        Self { candidate, cost: None, amount, note: None }
    }

    pub fn candidate(&self) -> &PayoutCandidate {
        self.candidate.candidate()
    }

    pub fn bonds_amount(&self) -> Mutez {
        self.candidate.bonds_amount()
    }

    pub fn fee(&self) -> Mutez {
        self.candidate.fee()
    }

    pub fn cost(&self) -> Option<OperationCost> {
        self.cost
    }

    pub fn amount(&self) -> Mutez {
        self.amount
    }

    pub fn is_invalid(&self) -> bool {
        self.candidate.is_invalid()
    }

    pub fn invalidate(self, reason: InvalidReason) -> Self {
        Self {
            candidate: self.candidate.invalidate(reason),
            cost: None,
            amount: Mutez::ZERO,
            note: self.note,
        }
    }

    pub fn to_recipe(&self, baker: &Address, cycle: i64) -> PayoutRecipe {
        let mut recipe = self.candidate().base_recipe(baker, cycle);
        if !self.is_invalid() {
            recipe.amount = self.amount;
            recipe.fee = self.fee();
            recipe.op_limits = self.cost;
        }
        if let Some(note) = &self.note {
            recipe.note = note.clone();
        }
        recipe
    }
}

/// Resolves the cycle, fetches its facts and classifies every delegator.
pub struct GenerateCandidates;

#[async_trait]
impl GenerationStage for GenerateCandidates {
    fn name(&self) -> &'static str {
        "generate_candidates"
    }

    async fn run(
        &self,
        mut ctx: PayoutGenerationContext,
        options: &GeneratePayoutsOptions,
    ) -> Result<PayoutGenerationContext, PayoutError> {
        let cycle = match options.cycle {
            Some(cycle) => cycle,
            None => ctx
                .collector
                .get_last_completed_cycle()
                .await
                .map_err(PayoutError::Collector)?,
        };
        let baker = &ctx.configuration.baker;
        tracing::info!("Collecting cycle {} data of baker {}", cycle, baker);
        let facts =
            ctx.collector.get_cycle_data(baker, cycle).await.map_err(PayoutError::Collector)?;

        let validation = ValidationContext { configuration: &ctx.configuration };
        let candidates: Vec<PayoutCandidate> = facts
            .delegators
            .iter()
            .map(|delegator| {
                let candidate = PayoutCandidate::from_delegator(delegator, &ctx.configuration);
                match validate_candidate(&candidate, &validation) {
                    Some(reason) => candidate.invalidate(reason),
                    None => candidate,
                }
            })
            .collect();
        tracing::debug!(
            "Cycle {} has {} delegators, {} invalid",
            cycle,
            candidates.len(),
            candidates.iter().filter(|c| c.is_invalid()).count()
        );

        ctx.stage_data.cycle = Some(cycle);
        ctx.stage_data.cycle_facts = Some(facts);
        ctx.stage_data.candidates = candidates;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PayoutConfiguration {
        PayoutConfiguration::from_toml_str(
            r#"
            baker = "tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU"
            [payout]
            fee = 0.1
            [delegators.overrides.tz1KpeT1YhjpUa5Mw4ujJojp2XtP9mXTbJV2]
            recipient = "not-an-address"
            "#,
        )
        .unwrap()
    }

    fn candidate(address: &str) -> PayoutCandidate {
        let delegator = Delegator {
            address: address.parse().unwrap(),
            delegated_balance: Mutez::from(10),
            emptied: false,
        };
        PayoutCandidate::from_delegator(&delegator, &config())
    }

    #[test]
    fn first_invalid_reason_sticks() {
        let candidate = candidate("tz1KjLa4hxghcRgtK6i8BgPTXathEV66JaSk")
            .invalidate(InvalidReason::LowBalance)
            .invalidate(InvalidReason::DelegatorEmptied);
        assert_eq!(candidate.invalid_reason(), Some(InvalidReason::LowBalance));
    }

    #[test]
    fn invalid_candidates_carry_no_amounts() {
        let candidate = candidate("tz1KjLa4hxghcRgtK6i8BgPTXathEV66JaSk")
            .invalidate(InvalidReason::DelegatorIgnored);
        let with_fee = candidate.with_bond_amount(Mutez::from(1_000)).with_fee();
        assert_eq!(with_fee.bonds_amount(), Mutez::ZERO);
        assert_eq!(with_fee.fee(), Mutez::ZERO);

        let simulated = with_fee.with_cost(
            OperationCost { transaction_fee: Mutez::from(1), ..Default::default() },
            false,
            false,
        );
        assert_eq!(simulated.amount(), Mutez::ZERO);
        assert_eq!(simulated.candidate().invalid_reason(), Some(InvalidReason::DelegatorIgnored));
    }

    #[test]
    fn fees_and_costs_are_deducted() {
        let candidate = candidate("tz1KjLa4hxghcRgtK6i8BgPTXathEV66JaSk");
        let with_fee = candidate.with_bond_amount(Mutez::from(1_000)).with_fee();
        assert_eq!(with_fee.fee(), Mutez::from(100));
        assert_eq!(with_fee.bonds_after_fee(), Mutez::from(900));

        let cost = OperationCost {
            transaction_fee: Mutez::from(50),
            allocation_fee: Mutez::from(20),
            ..Default::default()
        };
        assert_eq!(with_fee.clone().with_cost(cost, false, false).amount(), Mutez::from(830));
        assert_eq!(with_fee.clone().with_cost(cost, true, false).amount(), Mutez::from(880));
        assert_eq!(with_fee.with_cost(cost, true, true).amount(), Mutez::from(900));
    }

    #[test]
    fn costs_above_bonds_invalidate() {
        let candidate = candidate("tz1KjLa4hxghcRgtK6i8BgPTXathEV66JaSk");
        let cost = OperationCost { transaction_fee: Mutez::from(5_000), ..Default::default() };
        let simulated =
            candidate.with_bond_amount(Mutez::from(1_000)).with_fee().with_cost(cost, false, false);
        assert_eq!(
            simulated.candidate().invalid_reason(),
            Some(InvalidReason::InsufficientBondsForTxCosts)
        );
        assert_eq!(simulated.amount(), Mutez::ZERO);
    }

    #[test]
    fn unparsable_override_keeps_raw_value() {
        let candidate = candidate("tz1KpeT1YhjpUa5Mw4ujJojp2XtP9mXTbJV2");
        assert_eq!(candidate.unparsable_recipient(), Some("not-an-address"));
        assert_eq!(candidate.recipient(), candidate.delegator());
    }
}
