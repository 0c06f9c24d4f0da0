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

//! Waiting for a broadcast operation to settle on chain.
//!
//! Two paths race: a live path observing new blocks from the transactor, and a fallback path
//! polling the indexer after a grace period. The first to resolve wins and the other is
//! dropped.
//!
//! The live path only sees blocks produced after it subscribed, so before giving up on an
//! operation it never saw included it asks the indexer once.

use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    clients::{Collector, Transactor},
    config::NetworkConfig,
    model::{OpHash, OperationStatus},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("operation {0} failed on chain")]
    OperationFailed(OpHash),

    #[error("operation {0} was not included within {1} blocks")]
    NotIncluded(OpHash, u64),

    #[error("waiting for operation {0} was cancelled")]
    Cancelled(OpHash),
}

#[derive(Clone, Debug)]
pub struct ConfirmationOptions {
    /// Blocks required on top of the inclusion block. Zero resolves on inclusion.
    pub confirmations: u64,
    /// Blocks after the first observed one within which the operation must be included.
    pub ttl: u64,
    pub fallback_grace_period: Duration,
    pub fallback_poll_interval: Duration,
}

impl From<&NetworkConfig> for ConfirmationOptions {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            confirmations: network.confirmations,
            ttl: network.operation_ttl,
            fallback_grace_period: network.fallback_grace_period(),
            fallback_poll_interval: network.fallback_poll_interval(),
        }
    }
}

/// Wait until the operation is applied with enough confirmations.
pub async fn wait_for_confirmation(
    op_hash: &OpHash,
    transactor: &dyn Transactor,
    collector: &dyn Collector,
    options: &ConfirmationOptions,
    cancel: &CancellationToken,
) -> Result<(), ConfirmationError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConfirmationError::Cancelled(op_hash.clone())),
        result = live_confirmation(op_hash, transactor, collector, options) => result,
        result = fallback_confirmation(op_hash, collector, options) => result,
    }
}

async fn live_confirmation(
    op_hash: &OpHash,
    transactor: &dyn Transactor,
    collector: &dyn Collector,
    options: &ConfirmationOptions,
) -> Result<(), ConfirmationError> {
    match observe_blocks(op_hash, transactor, collector, options).await {
        Some(result) => result,
        // Without a block stream the fallback path decides.
        None => std::future::pending().await,
    }
}

async fn observe_blocks(
    op_hash: &OpHash,
    transactor: &dyn Transactor,
    collector: &dyn Collector,
    options: &ConfirmationOptions,
) -> Option<Result<(), ConfirmationError>> {
    let mut blocks = match transactor.subscribe_blocks().await {
        Ok(blocks) => blocks,
        Err(e) => {
            tracing::warn!("Failed to subscribe to blocks, relying on indexer polling: {e:?}");
            return None;
        }
    };

    let mut first_level: Option<i64> = None;
    let mut included_at: Option<i64> = None;
    while let Some(block) = blocks.next().await {
        let block = match block {
            Ok(block) => block,
            Err(e) => {
                tracing::warn!("Block stream failed, relying on indexer polling: {e:?}");
                return None;
            }
        };
        let first = *first_level.get_or_insert(block.level);

        if included_at.is_none() {
            if let Some(operation) = block.operations.iter().find(|op| &op.hash == op_hash) {
                match operation.status {
                    OperationStatus::Failed => {
                        return Some(Err(ConfirmationError::OperationFailed(op_hash.clone())))
                    }
                    OperationStatus::Applied => {
                        tracing::debug!("Operation {} included at level {}", op_hash, block.level);
                        included_at = Some(block.level);
                    }
                    OperationStatus::NotExists | OperationStatus::Unknown => {}
                }
            }
        }

        match included_at {
            Some(level) if block.level >= level.saturating_add(options.confirmations as i64) => {
                return Some(Ok(()));
            }
            Some(_) => {}
            None if block.level - first >= options.ttl as i64 => {
                return not_seen_within_ttl(op_hash, collector, options).await;
            }
            None => {}
        }
    }
    tracing::warn!("Block stream ended, relying on indexer polling");
    None
}

/// Resolve an operation the block stream never showed, which happens when it was included
/// before the subscription started.
async fn not_seen_within_ttl(
    op_hash: &OpHash,
    collector: &dyn Collector,
    options: &ConfirmationOptions,
) -> Option<Result<(), ConfirmationError>> {
    match collector.was_operation_applied(op_hash).await {
        Ok(OperationStatus::Applied) => {
            tracing::debug!("Operation {} was included before the block subscription", op_hash);
            Some(Ok(()))
        }
        Ok(OperationStatus::Failed) => {
            Some(Err(ConfirmationError::OperationFailed(op_hash.clone())))
        }
        Ok(OperationStatus::NotExists | OperationStatus::Unknown) => {
            Some(Err(ConfirmationError::NotIncluded(op_hash.clone(), options.ttl)))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to check status of operation {}, deferring to polling: {e:?}",
                op_hash
            );
            None
        }
    }
}

async fn fallback_confirmation(
    op_hash: &OpHash,
    collector: &dyn Collector,
    options: &ConfirmationOptions,
) -> Result<(), ConfirmationError> {
    tokio::time::sleep(options.fallback_grace_period).await;
    loop {
        match collector.was_operation_applied(op_hash).await {
            Ok(OperationStatus::Applied) => return Ok(()),
            Ok(OperationStatus::Failed) => {
                return Err(ConfirmationError::OperationFailed(op_hash.clone()))
            }
            Ok(status) => tracing::debug!("Operation {} status: {:?}", op_hash, status),
            Err(e) => tracing::warn!("Failed to check status of operation {}: {e:?}", op_hash),
        }
        tokio::time::sleep(options.fallback_poll_interval).await;
    }
}
