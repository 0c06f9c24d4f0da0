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

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Address, Mutez, OperationCost, TransferContent, TransferKind};

/// What a payout pays for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    /// Share of the cycle rewards owed to a delegator.
    DelegatorReward,
    /// Baker bonds forwarded to a configured bond recipient.
    BakerRewardIncome,
    /// Collected baker fees forwarded to a configured fee recipient.
    FeeIncome,
    Donation,
    /// A delegator that is not paid, see [InvalidReason].
    Invalid,
}

impl PayoutKind {
    pub fn is_income(&self) -> bool {
        matches!(self, PayoutKind::BakerRewardIncome | PayoutKind::FeeIncome | PayoutKind::Donation)
    }
}

impl fmt::Display for PayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayoutKind::DelegatorReward => "delegator_reward",
            PayoutKind::BakerRewardIncome => "baker_reward_income",
            PayoutKind::FeeIncome => "fee_income",
            PayoutKind::Donation => "donation",
            PayoutKind::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Why a delegator is not paid. Serialized names are stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    DelegatorIgnored,
    InvalidRecipient,
    LowBalance,
    KtIgnored,
    DelegatorEmptied,
    RecipientTargetsBaker,
    FailedToEstimateTxCosts,
    InsufficientBondsForTxCosts,
    PayoutZero,
    PayoutBelowMinimum,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvalidReason::DelegatorIgnored => "delegator_ignored",
            InvalidReason::InvalidRecipient => "invalid_recipient",
            InvalidReason::LowBalance => "low_balance",
            InvalidReason::KtIgnored => "kt_ignored",
            InvalidReason::DelegatorEmptied => "delegator_emptied",
            InvalidReason::RecipientTargetsBaker => "recipient_targets_baker",
            InvalidReason::FailedToEstimateTxCosts => "failed_to_estimate_tx_costs",
            InvalidReason::InsufficientBondsForTxCosts => "insufficient_bonds_for_tx_costs",
            InvalidReason::PayoutZero => "payout_zero",
            InvalidReason::PayoutBelowMinimum => "payout_below_minimum",
        };
        f.write_str(name)
    }
}

/// Identity of a payout across runs, used to suppress repeated payments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PayoutIdentity {
    pub cycle: i64,
    pub kind: PayoutKind,
    pub delegator: Address,
    pub recipient: Address,
}

/// A final payout instruction, produced by generation and consumed by execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoutRecipe {
    pub baker: Address,
    /// The delegator, or the baker for income payouts.
    pub delegator: Address,
    pub recipient: Address,
    pub cycle: i64,
    pub kind: PayoutKind,
    #[serde(default)]
    pub transfer: TransferKind,
    pub delegated_balance: Mutez,
    /// Net amount transferred to the recipient.
    pub amount: Mutez,
    pub fee_rate: f64,
    /// Baker fee withheld from the bonds.
    pub fee: Mutez,
    /// Estimated cost of the transfer, `None` for invalid recipes.
    pub op_limits: Option<OperationCost>,
    pub is_valid: bool,
    pub invalid_reason: Option<InvalidReason>,
    #[serde(default)]
    pub note: String,
}

impl PayoutRecipe {
    pub fn identity(&self) -> PayoutIdentity {
        PayoutIdentity {
            cycle: self.cycle,
            kind: self.kind,
            delegator: self.delegator.clone(),
            recipient: self.recipient.clone(),
        }
    }

    /// A tez transfer to a smart contract, which invokes its default entrypoint.
    pub fn is_contract_call(&self) -> bool {
        self.recipient.is_originated() && self.transfer == TransferKind::Tez
    }

    pub fn transaction_fee(&self) -> Mutez {
        self.op_limits.map(|limits| limits.transaction_fee).unwrap_or(Mutez::ZERO)
    }

    pub fn to_transfer(&self) -> TransferContent {
        TransferContent {
            destination: self.recipient.clone(),
            amount: self.amount,
            kind: self.transfer.clone(),
            limits: self.op_limits,
        }
    }
}
