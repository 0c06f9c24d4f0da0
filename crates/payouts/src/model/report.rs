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

use super::{Address, InvalidReason, Mutez, OpHash, PayoutIdentity, PayoutKind, PayoutRecipe};

/// Settled record of a payout recipe after an execution attempt.
///
/// Flat so it maps to a single CSV row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoutReport {
    pub cycle: i64,
    pub kind: PayoutKind,
    pub baker: Address,
    pub delegator: Address,
    pub recipient: Address,
    pub delegated_balance: Mutez,
    pub amount: Mutez,
    pub fee_rate: f64,
    pub fee: Mutez,
    pub transaction_fee: Mutez,
    pub op_hash: Option<OpHash>,
    pub is_success: bool,
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

impl PayoutReport {
    pub fn from_recipe(
        recipe: &PayoutRecipe,
        op_hash: Option<OpHash>,
        is_success: bool,
        note: impl Into<String>,
    ) -> Self {
        Self {
            cycle: recipe.cycle,
            kind: recipe.kind,
            baker: recipe.baker.clone(),
            delegator: recipe.delegator.clone(),
            recipient: recipe.recipient.clone(),
            delegated_balance: recipe.delegated_balance,
            amount: recipe.amount,
            fee_rate: recipe.fee_rate,
            fee: recipe.fee,
            transaction_fee: recipe.transaction_fee(),
            op_hash,
            is_success,
            note: note.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn identity(&self) -> PayoutIdentity {
        PayoutIdentity {
            cycle: self.cycle,
            kind: self.kind,
            delegator: self.delegator.clone(),
            recipient: self.recipient.clone(),
        }
    }
}

/// A recipe that will not be paid, as persisted next to the payout reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvalidPayoutRecord {
    pub cycle: i64,
    pub kind: PayoutKind,
    pub delegator: Address,
    pub recipient: Address,
    pub delegated_balance: Mutez,
    pub amount: Mutez,
    pub fee: Mutez,
    pub reason: Option<InvalidReason>,
    pub note: String,
}

impl From<&PayoutRecipe> for InvalidPayoutRecord {
    fn from(recipe: &PayoutRecipe) -> Self {
        Self {
            cycle: recipe.cycle,
            kind: recipe.kind,
            delegator: recipe.delegator.clone(),
            recipient: recipe.recipient.clone(),
            delegated_balance: recipe.delegated_balance,
            amount: recipe.amount,
            fee: recipe.fee,
            reason: recipe.invalid_reason,
            note: recipe.note.clone(),
        }
    }
}
