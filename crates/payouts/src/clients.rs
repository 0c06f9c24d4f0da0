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

//! Collaborators of the payout core: chain reads, signing, broadcasting, persistence and
//! notifications.
//!
//! Implementations are pluggable. All methods return [anyhow::Result]; the core wraps errors
//! into typed [crate::PayoutError] variants.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::model::{
    Address, BlockObservation, ContentSimulation, CycleFacts, CyclePayoutSummary, HeadMetadata,
    Mutez, OpHash, OperationLimits, OperationStatus, PayoutOperation, PayoutRecipe, PayoutReport,
    PreparedOperation, SignedOperation,
};

/// Read-only access to chain and indexer data.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn get_cycle_data(&self, baker: &Address, cycle: i64) -> Result<CycleFacts>;

    async fn get_balance(&self, address: &Address) -> Result<Mutez>;

    /// Simulate an operation, returning one result per content in order.
    async fn simulate(&self, operation: &PayoutOperation) -> Result<Vec<ContentSimulation>>;

    async fn was_operation_applied(&self, op_hash: &OpHash) -> Result<OperationStatus>;

    async fn get_last_completed_cycle(&self) -> Result<i64>;

    async fn get_head_metadata(&self) -> Result<HeadMetadata>;
}

/// Key custody. Private key material never leaves the signer.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Public key hash of the payout wallet.
    fn pkh(&self) -> Address;

    fn public_key(&self) -> String;

    async fn sign(&self, operation: PreparedOperation) -> Result<SignedOperation>;
}

#[async_trait]
pub trait Transactor: Send + Sync {
    async fn get_limits(&self) -> Result<OperationLimits>;

    /// Assign counter, branch and fees of the operation.
    async fn complete(
        &self,
        operation: PayoutOperation,
        public_key: &str,
    ) -> Result<PreparedOperation>;

    async fn broadcast(&self, operation: &SignedOperation) -> Result<OpHash>;

    /// Stream of blocks from the current head on, used to observe inclusion.
    async fn subscribe_blocks(&self) -> Result<BoxStream<'static, Result<BlockObservation>>>;
}

/// Durable store of payout reports, invalid payouts and cycle summaries.
///
/// Writes replace the stored content of each affected cycle.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn get_existing_reports(&self, cycle: i64) -> Result<Vec<PayoutReport>>;

    async fn report_payouts(&self, reports: &[PayoutReport]) -> Result<()>;

    async fn report_invalid_payouts(&self, recipes: &[PayoutRecipe]) -> Result<()>;

    async fn report_cycle_summary(&self, summary: &CyclePayoutSummary) -> Result<()>;

    async fn get_existing_cycle_summary(&self, cycle: i64) -> Result<Option<CyclePayoutSummary>>;
}

#[async_trait]
pub trait Notificator: Send + Sync {
    async fn notify_admin(&self, message: &str) -> Result<()>;
}

/// Notificator that writes admin notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotificator;

#[async_trait]
impl Notificator for LogNotificator {
    async fn notify_admin(&self, message: &str) -> Result<()> {
        tracing::warn!("Admin notification: {message}");
        Ok(())
    }
}
