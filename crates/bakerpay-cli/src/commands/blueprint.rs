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

use std::{collections::BTreeMap, path::PathBuf};

use bakerpay_payouts::{CyclePayoutBlueprint, Mutez, PayoutKind};
use clap::Args;
use serde::Serialize;

use crate::config::GlobalConfig;

/// Command to inspect a saved payout blueprint before it is executed.
#[derive(Args, Clone, Debug)]
pub struct BlueprintInfo {
    /// Blueprint file written by payout generation.
    #[clap(long)]
    pub file: PathBuf,
}

/// Totals of a blueprint.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BlueprintOverview {
    pub cycle: i64,
    pub valid: usize,
    pub invalid: usize,
    pub total_amount: Mutez,
    pub total_fees: Mutez,
    pub total_transaction_fees: Mutez,
    pub contract_calls: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub invalid_by_reason: BTreeMap<String, usize>,
}

impl BlueprintInfo {
    /// Run the [BlueprintInfo] command.
    pub async fn run(&self, _global_config: &GlobalConfig) -> anyhow::Result<()> {
        let blueprint = CyclePayoutBlueprint::load(&self.file).await?;
        let overview = describe_blueprint(&blueprint);
        tracing::info!(
            "Cycle {}: {} payouts totalling {}, {} invalid",
            overview.cycle,
            overview.valid,
            overview.total_amount,
            overview.invalid
        );
        for (reason, count) in &overview.invalid_by_reason {
            tracing::info!("  {reason}: {count}");
        }
        println!("{}", serde_json::to_string_pretty(&overview)?);
        Ok(())
    }
}

pub fn describe_blueprint(blueprint: &CyclePayoutBlueprint) -> BlueprintOverview {
    let mut overview = BlueprintOverview { cycle: blueprint.cycle, ..Default::default() };
    for recipe in blueprint.valid_payouts() {
        overview.valid += 1;
        overview.total_amount += recipe.amount;
        overview.total_fees += recipe.fee;
        overview.total_transaction_fees += recipe.transaction_fee();
        if recipe.is_contract_call() {
            overview.contract_calls += 1;
        }
        *overview.by_kind.entry(recipe.kind.to_string()).or_default() += 1;
    }
    for recipe in blueprint.invalid_payouts() {
        overview.invalid += 1;
        let reason = recipe
            .invalid_reason
            .map(|reason| reason.to_string())
            .unwrap_or_else(|| PayoutKind::Invalid.to_string());
        *overview.invalid_by_reason.entry(reason).or_default() += 1;
    }
    overview
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakerpay_payouts::{Address, CyclePayoutSummary, InvalidReason, PayoutRecipe, TransferKind};

    const BAKER: &str = "tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU";

    fn recipe(recipient: &str, amount: u64, reason: Option<InvalidReason>) -> PayoutRecipe {
        let recipient: Address = recipient.parse().expect("valid address");
        PayoutRecipe {
            baker: BAKER.parse().expect("valid address"),
            delegator: recipient.clone(),
            recipient,
            cycle: 42,
            kind: if reason.is_some() { PayoutKind::Invalid } else { PayoutKind::DelegatorReward },
            transfer: TransferKind::Tez,
            delegated_balance: Mutez::from(1_000_000_000u64),
            amount: Mutez::from(amount),
            fee_rate: 0.05,
            fee: Mutez::from(100u64),
            op_limits: None,
            is_valid: reason.is_none(),
            invalid_reason: reason,
            note: String::new(),
        }
    }

    #[test]
    fn counts_payouts_and_reasons() {
        let blueprint = CyclePayoutBlueprint {
            cycle: 42,
            payouts: vec![
                recipe("tz1KjLa4hxghcRgtK6i8BgPTXathEV66JaSk", 1_000, None),
                recipe("KT18g5SiBpZEhMtyW11tE35UN9EJy2vSb8rC", 2_000, None),
                recipe("tz1KpeT1YhjpUa5Mw4ujJojp2XtP9mXTbJV2", 0, Some(InvalidReason::LowBalance)),
                recipe("tz1KuxKxPSnwLiTqZ37LRw6AXUt553ouPvEY", 0, Some(InvalidReason::LowBalance)),
                recipe("tz1L1GCuEBr4CrrKB1JwZ4SX2RskzLEbC8Mo", 0, Some(InvalidReason::KtIgnored)),
            ],
            summary: CyclePayoutSummary { cycle: 42, ..Default::default() },
        };

        let overview = describe_blueprint(&blueprint);
        assert_eq!(overview.valid, 2);
        assert_eq!(overview.invalid, 3);
        assert_eq!(overview.total_amount, Mutez::from(3_000u64));
        assert_eq!(overview.total_fees, Mutez::from(200u64));
        assert_eq!(overview.contract_calls, 1);
        assert_eq!(overview.by_kind.get("delegator_reward"), Some(&2));
        assert_eq!(overview.invalid_by_reason.get("low_balance"), Some(&2));
        assert_eq!(overview.invalid_by_reason.get("kt_ignored"), Some(&1));
    }
}
