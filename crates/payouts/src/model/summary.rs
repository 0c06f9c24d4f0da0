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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Mutez;

/// Financial totals of a cycle payout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclePayoutSummary {
    pub cycle: i64,
    pub delegators: usize,
    pub paid_delegators: usize,
    pub staking_balance: Mutez,
    pub delegated_balance: Mutez,
    pub baker_balance: Mutez,
    /// Delegated balance counted for the distribution, excluding ignored delegators.
    pub effective_delegated_balance: Mutez,
    pub earned_fees: Mutez,
    pub earned_rewards: Mutez,
    pub distributed_rewards: Mutez,
    pub bond_income: Mutez,
    pub fee_income: Mutez,
    pub income_total: Mutez,
    pub donated_bonds: Mutez,
    pub donated_fees: Mutez,
    pub donated_total: Mutez,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CyclePayoutSummary {
    /// Sums two summaries for range reports, keeping the highest cycle and latest timestamp.
    pub fn combine(&self, other: &CyclePayoutSummary) -> CyclePayoutSummary {
        CyclePayoutSummary {
            cycle: self.cycle.max(other.cycle),
            delegators: self.delegators + other.delegators,
            paid_delegators: self.paid_delegators + other.paid_delegators,
            staking_balance: self.staking_balance + other.staking_balance,
            delegated_balance: self.delegated_balance + other.delegated_balance,
            baker_balance: self.baker_balance + other.baker_balance,
            effective_delegated_balance: self.effective_delegated_balance
                + other.effective_delegated_balance,
            earned_fees: self.earned_fees + other.earned_fees,
            earned_rewards: self.earned_rewards + other.earned_rewards,
            distributed_rewards: self.distributed_rewards + other.distributed_rewards,
            bond_income: self.bond_income + other.bond_income,
            fee_income: self.fee_income + other.fee_income,
            income_total: self.income_total + other.income_total,
            donated_bonds: self.donated_bonds + other.donated_bonds,
            donated_fees: self.donated_fees + other.donated_fees,
            donated_total: self.donated_total + other.donated_total,
            timestamp: self.timestamp.max(other.timestamp),
        }
    }
}
