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

use thiserror::Error;

use crate::{config::ConfigError, lock::LockError, Address, Mutez};

#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Collector error: {0:#}")]
    Collector(anyhow::Error),

    #[error("Insufficient payout wallet balance [required: {required}, available: {available}]")]
    InsufficientBalance { required: Mutez, available: Mutez },

    #[error("Transactor error: {0:#}")]
    Transactor(anyhow::Error),

    #[error("Reporter error: {0:#}")]
    Reporter(anyhow::Error),

    #[error("Payout to {recipient} exceeds the operation limits on its own")]
    PayoutExceedsOperationLimits { recipient: Address },

    #[error("Pipeline stage data missing: {0}")]
    MissingStageData(&'static str),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Cancelled")]
    Cancelled,
}

impl PayoutError {
    /// Errors that retrying cannot fix, such as malformed configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PayoutError::Config(_)
                | PayoutError::MissingStageData(_)
                | PayoutError::PayoutExceedsOperationLimits { .. }
        )
    }
}
