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

//! In-memory doubles of the payout collaborators.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};

use bakerpay_payouts::{
    model::{
        BlockObservation, ContentSimulation, HeadMetadata, IncludedOperation, PayoutOperation,
        PreparedOperation, SignedOperation,
    },
    Address, Collector, CycleFacts, CyclePayoutSummary, Mutez, Notificator, OpHash,
    OperationLimits, OperationStatus, PayoutRecipe, PayoutReport, Reporter, Signer, Transactor,
};

use crate::fixtures;

/// Allocation fee charged when a recipient account does not exist yet.
pub const ALLOCATION_FEE: u64 = 64_250;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct CollectorState {
    cycles: HashMap<i64, CycleFacts>,
    balances: HashMap<Address, Mutez>,
    operations: HashMap<OpHash, OperationStatus>,
    last_completed_cycle: i64,
    heads: VecDeque<HeadMetadata>,
    head_failures: usize,
    head_requests: usize,
    failing_destinations: HashSet<Address>,
    unallocated: HashSet<Address>,
    simulation_sizes: Vec<usize>,
    fail_status_checks: bool,
}

/// Collector serving configured cycle facts, balances and operation statuses.
#[derive(Default)]
pub struct MockCollector {
    state: Mutex<CollectorState>,
}

impl MockCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cycle(&self, facts: CycleFacts) {
        let mut state = lock(&self.state);
        state.last_completed_cycle = state.last_completed_cycle.max(facts.cycle);
        state.cycles.insert(facts.cycle, facts);
    }

    pub fn set_balance(&self, address: &Address, balance: Mutez) {
        lock(&self.state).balances.insert(address.clone(), balance);
    }

    pub fn set_operation_status(&self, op_hash: &OpHash, status: OperationStatus) {
        lock(&self.state).operations.insert(op_hash.clone(), status);
    }

    pub fn set_last_completed_cycle(&self, cycle: i64) {
        lock(&self.state).last_completed_cycle = cycle;
    }

    /// Queue head metadata. The last queued head keeps being served.
    pub fn push_head(&self, head: HeadMetadata) {
        lock(&self.state).heads.push_back(head);
    }

    /// The next `times` head metadata requests fail.
    pub fn fail_head_metadata(&self, times: usize) {
        lock(&self.state).head_failures = times;
    }

    pub fn head_requests(&self) -> usize {
        lock(&self.state).head_requests
    }

    /// Simulations of transfers to `destination` fail.
    pub fn fail_simulation_for(&self, destination: &Address) {
        lock(&self.state).failing_destinations.insert(destination.clone());
    }

    /// Transfers to `destination` pay [ALLOCATION_FEE].
    pub fn mark_unallocated(&self, destination: &Address) {
        lock(&self.state).unallocated.insert(destination.clone());
    }

    pub fn fail_status_checks(&self, fail: bool) {
        lock(&self.state).fail_status_checks = fail;
    }

    /// Number of contents of every simulation request, in order.
    pub fn simulation_sizes(&self) -> Vec<usize> {
        lock(&self.state).simulation_sizes.clone()
    }
}

#[async_trait]
impl Collector for MockCollector {
    async fn get_cycle_data(&self, baker: &Address, cycle: i64) -> Result<CycleFacts> {
        match lock(&self.state).cycles.get(&cycle) {
            Some(facts) => Ok(facts.clone()),
            None => bail!("no data for baker {baker} in cycle {cycle}"),
        }
    }

    async fn get_balance(&self, address: &Address) -> Result<Mutez> {
        Ok(lock(&self.state).balances.get(address).copied().unwrap_or_default())
    }

    async fn simulate(&self, operation: &PayoutOperation) -> Result<Vec<ContentSimulation>> {
        let mut state = lock(&self.state);
        state.simulation_sizes.push(operation.contents.len());
        Ok(operation
            .contents
            .iter()
            .map(|content| {
                if state.failing_destinations.contains(&content.destination) {
                    return ContentSimulation::Failed("script_rejected".to_string());
                }
                let mut cost = fixtures::transfer_cost(&content.destination);
                if state.unallocated.contains(&content.destination) {
                    cost.allocation_fee = Mutez::from(ALLOCATION_FEE);
                }
                ContentSimulation::Applied(cost)
            })
            .collect())
    }

    async fn was_operation_applied(&self, op_hash: &OpHash) -> Result<OperationStatus> {
        let state = lock(&self.state);
        if state.fail_status_checks {
            bail!("indexer unavailable");
        }
        Ok(state.operations.get(op_hash).copied().unwrap_or(OperationStatus::NotExists))
    }

    async fn get_last_completed_cycle(&self) -> Result<i64> {
        Ok(lock(&self.state).last_completed_cycle)
    }

    async fn get_head_metadata(&self) -> Result<HeadMetadata> {
        let mut state = lock(&self.state);
        state.head_requests += 1;
        if state.head_failures > 0 {
            state.head_failures -= 1;
            bail!("node unavailable");
        }
        let head = match state.heads.len() {
            0 => bail!("no head metadata"),
            1 => state.heads.front().copied(),
            _ => state.heads.pop_front(),
        };
        head.ok_or_else(|| anyhow::anyhow!("no head metadata"))
    }
}

/// Signer for a fixed payout wallet.
pub struct MockSigner {
    pkh: Address,
    fail: AtomicBool,
}

impl MockSigner {
    pub fn new(pkh: Address) -> Self {
        Self { pkh, fail: AtomicBool::new(false) }
    }

    pub fn fail_signing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new(fixtures::address(fixtures::PAYOUT_WALLET))
    }
}

#[async_trait]
impl Signer for MockSigner {
    fn pkh(&self) -> Address {
        self.pkh.clone()
    }

    fn public_key(&self) -> String {
        "edpkvGfYw3LyB1UcCahKQk4rF2tvbMUk8GFiTuMjL75uGXrpvKXhjn".to_string()
    }

    async fn sign(&self, operation: PreparedOperation) -> Result<SignedOperation> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("signer rejected the operation");
        }
        let signature = format!("edsig{:08}", operation.counter);
        Ok(SignedOperation { prepared: operation, signature })
    }
}

/// What happens to the next broadcast operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Included and applied.
    #[default]
    Applied,
    /// Included with a failed status.
    Failed,
    /// Rejected by the node, no hash is returned.
    Rejected,
    /// Accepted but never included.
    Lost,
}

#[derive(Default)]
struct TransactorState {
    outcomes: VecDeque<BroadcastOutcome>,
    broadcasts: Vec<(OpHash, SignedOperation)>,
    last: Option<(OpHash, BroadcastOutcome)>,
    counter: u64,
    level: i64,
    live_blocks: bool,
}

/// Transactor recording broadcasts and replaying blocks for the last one.
///
/// Broadcast outcomes are registered with the shared [MockCollector] so the polling path sees
/// them too.
pub struct MockTransactor {
    collector: Arc<MockCollector>,
    limits: OperationLimits,
    state: Mutex<TransactorState>,
}

impl MockTransactor {
    pub fn new(collector: Arc<MockCollector>) -> Self {
        Self {
            collector,
            limits: fixtures::limits(),
            state: Mutex::new(TransactorState {
                level: 1_000,
                live_blocks: true,
                ..Default::default()
            }),
        }
    }

    pub fn with_limits(mut self, limits: OperationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Outcome of the next broadcast without a queued outcome is [BroadcastOutcome::Applied].
    pub fn push_outcome(&self, outcome: BroadcastOutcome) {
        lock(&self.state).outcomes.push_back(outcome);
    }

    /// Without live blocks, subscribing fails and confirmation relies on polling.
    pub fn set_live_blocks(&self, live: bool) {
        lock(&self.state).live_blocks = live;
    }

    pub fn broadcasts(&self) -> Vec<(OpHash, SignedOperation)> {
        lock(&self.state).broadcasts.clone()
    }

    /// Destinations of every broadcast operation, in order.
    pub fn broadcast_destinations(&self) -> Vec<Vec<Address>> {
        lock(&self.state)
            .broadcasts
            .iter()
            .map(|(_, signed)| {
                signed.prepared.operation.contents.iter().map(|c| c.destination.clone()).collect()
            })
            .collect()
    }
}

#[async_trait]
impl Transactor for MockTransactor {
    async fn get_limits(&self) -> Result<OperationLimits> {
        Ok(self.limits)
    }

    async fn complete(
        &self,
        operation: PayoutOperation,
        _public_key: &str,
    ) -> Result<PreparedOperation> {
        let mut state = lock(&self.state);
        state.counter += 1;
        Ok(PreparedOperation {
            operation,
            branch: "BLockGenesisGenesisGenesisGenesisGenesisf79b5d1CoW2".to_string(),
            counter: state.counter,
            bytes: Vec::new(),
        })
    }

    async fn broadcast(&self, operation: &SignedOperation) -> Result<OpHash> {
        let (op_hash, status) = {
            let mut state = lock(&self.state);
            let outcome = state.outcomes.pop_front().unwrap_or_default();
            let status = match outcome {
                BroadcastOutcome::Rejected => bail!("counter_in_the_past"),
                BroadcastOutcome::Applied => OperationStatus::Applied,
                BroadcastOutcome::Failed => OperationStatus::Failed,
                BroadcastOutcome::Lost => OperationStatus::NotExists,
            };
            let op_hash = OpHash::new(format!("oo{:049}", state.broadcasts.len() + 1));
            state.broadcasts.push((op_hash.clone(), operation.clone()));
            state.last = Some((op_hash.clone(), outcome));
            (op_hash, status)
        };
        self.collector.set_operation_status(&op_hash, status);
        Ok(op_hash)
    }

    async fn subscribe_blocks(&self) -> Result<BoxStream<'static, Result<BlockObservation>>> {
        let mut state = lock(&self.state);
        if !state.live_blocks {
            bail!("block stream unavailable");
        }
        let start = state.level;
        let mut blocks = Vec::new();
        match state.last.clone() {
            Some((hash, outcome @ (BroadcastOutcome::Applied | BroadcastOutcome::Failed))) => {
                let status = if outcome == BroadcastOutcome::Failed {
                    OperationStatus::Failed
                } else {
                    OperationStatus::Applied
                };
                blocks.push(BlockObservation { level: start, operations: Vec::new() });
                blocks.push(BlockObservation {
                    level: start + 1,
                    operations: vec![IncludedOperation { hash, status }],
                });
                blocks.extend(
                    (start + 2..start + 8)
                        .map(|level| BlockObservation { level, operations: Vec::new() }),
                );
            }
            Some((_, BroadcastOutcome::Lost)) => {
                blocks.extend(
                    (start..start + 200)
                        .map(|level| BlockObservation { level, operations: Vec::new() }),
                );
            }
            Some((_, BroadcastOutcome::Rejected)) | None => {}
        }
        state.level = start + blocks.len() as i64;
        Ok(futures_util::stream::iter(blocks.into_iter().map(Ok)).boxed())
    }
}

#[derive(Default)]
struct ReporterState {
    reports: BTreeMap<i64, Vec<PayoutReport>>,
    invalid: BTreeMap<i64, Vec<PayoutRecipe>>,
    summaries: BTreeMap<i64, CyclePayoutSummary>,
    writes: Vec<Vec<PayoutReport>>,
    fail_writes: bool,
}

/// Reporter keeping everything in memory, with the same per-cycle replace semantics as the
/// file reporter.
#[derive(Default)]
pub struct MemoryReporter {
    state: Mutex<ReporterState>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_reports(&self, reports: Vec<PayoutReport>) {
        let mut state = lock(&self.state);
        for report in reports {
            state.reports.entry(report.cycle).or_default().push(report);
        }
    }

    pub fn seed_summary(&self, summary: CyclePayoutSummary) {
        lock(&self.state).summaries.insert(summary.cycle, summary);
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    pub fn reports(&self, cycle: i64) -> Vec<PayoutReport> {
        lock(&self.state).reports.get(&cycle).cloned().unwrap_or_default()
    }

    pub fn invalid(&self, cycle: i64) -> Vec<PayoutRecipe> {
        lock(&self.state).invalid.get(&cycle).cloned().unwrap_or_default()
    }

    pub fn summary(&self, cycle: i64) -> Option<CyclePayoutSummary> {
        lock(&self.state).summaries.get(&cycle).cloned()
    }

    /// Every `report_payouts` call, in order.
    pub fn writes(&self) -> Vec<Vec<PayoutReport>> {
        lock(&self.state).writes.clone()
    }
}

#[async_trait]
impl Reporter for MemoryReporter {
    async fn get_existing_reports(&self, cycle: i64) -> Result<Vec<PayoutReport>> {
        Ok(self.reports(cycle))
    }

    async fn report_payouts(&self, reports: &[PayoutReport]) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_writes {
            bail!("report store unavailable");
        }
        let mut grouped: BTreeMap<i64, Vec<PayoutReport>> = BTreeMap::new();
        for report in reports {
            grouped.entry(report.cycle).or_default().push(report.clone());
        }
        state.reports.extend(grouped);
        state.writes.push(reports.to_vec());
        Ok(())
    }

    async fn report_invalid_payouts(&self, recipes: &[PayoutRecipe]) -> Result<()> {
        let mut grouped: BTreeMap<i64, Vec<PayoutRecipe>> = BTreeMap::new();
        for recipe in recipes {
            grouped.entry(recipe.cycle).or_default().push(recipe.clone());
        }
        lock(&self.state).invalid.extend(grouped);
        Ok(())
    }

    async fn report_cycle_summary(&self, summary: &CyclePayoutSummary) -> Result<()> {
        lock(&self.state).summaries.insert(summary.cycle, summary.clone());
        Ok(())
    }

    async fn get_existing_cycle_summary(&self, cycle: i64) -> Result<Option<CyclePayoutSummary>> {
        Ok(self.summary(cycle))
    }
}

/// Notificator remembering every message.
#[derive(Default)]
pub struct RecordingNotificator {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotificator {
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

#[async_trait]
impl Notificator for RecordingNotificator {
    async fn notify_admin(&self, message: &str) -> Result<()> {
        lock(&self.messages).push(message.to_string());
        Ok(())
    }
}
