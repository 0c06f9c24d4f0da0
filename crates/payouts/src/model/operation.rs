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

//! Chain operation types exchanged with the signer and transactor.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Address, Mutez};

/// Hash of an injected operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpHash(String);

impl OpHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of an operation as reported by an indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Applied,
    Failed,
    NotExists,
    Unknown,
}

/// Chain-imposed per-operation ceilings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLimits {
    pub hard_gas_limit_per_operation: u64,
    pub hard_storage_limit_per_operation: u64,
    pub max_operation_data_length: u64,
}

/// Estimated cost of a single transfer content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCost {
    pub gas_limit: u64,
    pub storage_limit: u64,
    pub serialization_size: u64,
    pub transaction_fee: Mutez,
    /// Burned when the recipient account does not exist yet.
    pub allocation_fee: Mutez,
}

impl OperationCost {
    /// The part of the cost charged to the payout recipient.
    pub fn deducted_from_payout(
        &self,
        baker_pays_transaction_fee: bool,
        baker_pays_allocation_fee: bool,
    ) -> Mutez {
        let mut deducted = Mutez::ZERO;
        if !baker_pays_transaction_fee {
            deducted += self.transaction_fee;
        }
        if !baker_pays_allocation_fee {
            deducted += self.allocation_fee;
        }
        deducted
    }
}

/// What a transfer content moves.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferKind {
    #[default]
    Tez,
    Fa1 {
        contract: Address,
    },
    Fa2 {
        contract: Address,
        token_id: u64,
    },
}

/// A single transfer inside a payout operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferContent {
    pub destination: Address,
    pub amount: Mutez,
    pub kind: TransferKind,
    /// Limits assigned by the caller; `None` lets the transactor estimate them.
    pub limits: Option<OperationCost>,
}

/// A multi-content operation sent from the payout wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutOperation {
    pub source: Address,
    pub contents: Vec<TransferContent>,
}

/// Result of simulating one content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentSimulation {
    Applied(OperationCost),
    Failed(String),
}

/// An operation with counters, branch and fees assigned, ready for signing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedOperation {
    pub operation: PayoutOperation,
    pub branch: String,
    pub counter: u64,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperation {
    pub prepared: PreparedOperation,
    pub signature: String,
}

/// An operation included in an observed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludedOperation {
    pub hash: OpHash,
    pub status: OperationStatus,
}

/// A block as seen by the live confirmation path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockObservation {
    pub level: i64,
    pub operations: Vec<IncludedOperation>,
}
