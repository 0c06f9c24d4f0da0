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

use serde::{Deserialize, Serialize};

use super::{Address, Mutez};
use crate::config::PayoutMode;

/// An account delegating to the baker at the snapshot of a cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegator {
    pub address: Address,
    pub delegated_balance: Mutez,
    /// The account was emptied (balance dropped to zero) since the snapshot.
    #[serde(default)]
    pub emptied: bool,
}

/// Per-cycle accounting facts of a baker, as reported by the collector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleFacts {
    pub cycle: i64,
    pub staking_balance: Mutez,
    pub delegated_balance: Mutez,
    /// Zero when the baker has not set a limit.
    pub frozen_deposit_limit: Mutez,
    pub block_rewards: Mutez,
    pub endorsement_rewards: Mutez,
    pub ideal_block_rewards: Mutez,
    pub ideal_endorsement_rewards: Mutez,
    pub block_fees: Mutez,
    pub delegators: Vec<Delegator>,
}

impl CycleFacts {
    /// The baker's own balance within its staking balance.
    pub fn baker_balance(&self) -> Mutez {
        self.staking_balance.saturating_sub(self.delegated_balance)
    }

    /// The reward pool distributed for this cycle.
    pub fn total_rewards(&self, mode: PayoutMode) -> Mutez {
        match mode {
            PayoutMode::Actual => self.block_rewards + self.endorsement_rewards + self.block_fees,
            PayoutMode::Ideal => {
                self.ideal_block_rewards + self.ideal_endorsement_rewards + self.block_fees
            }
        }
    }
}

/// Chain head position used by the cycle monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadMetadata {
    pub level: i64,
    pub cycle: i64,
    /// Zero-based position of the head block within its cycle.
    pub cycle_position: i64,
    pub blocks_per_cycle: i64,
    pub block_time_secs: u64,
}

impl HeadMetadata {
    pub fn remaining_blocks(&self) -> i64 {
        (self.blocks_per_cycle - self.cycle_position).max(0)
    }
}
