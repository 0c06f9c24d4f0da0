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

//! Preparation of generated payouts for execution.
//!
//! Filters out payouts that earlier runs already settled, so executing a cycle again never
//! pays a delegator twice.

use std::collections::HashSet;

use crate::{
    clients::{Collector, Reporter},
    error::PayoutError,
    model::{
        CyclePayoutBlueprint, CyclePayoutSummary, OperationStatus, PayoutIdentity, PayoutRecipe,
        PayoutReport,
    },
};

#[derive(Clone, Debug, Default)]
pub struct PreparedPayouts {
    /// Valid payouts not paid yet.
    pub valid: Vec<PayoutRecipe>,
    pub invalid: Vec<PayoutRecipe>,
    /// Reports of payouts settled by earlier runs of the same cycles.
    pub reports_of_past_successful_payouts: Vec<PayoutReport>,
    /// Earlier failed reports whose operation may still be applied. Kept in the report store
    /// so the op hash stays on record.
    pub reports_of_unsettled_payouts: Vec<PayoutReport>,
    pub summaries: Vec<CyclePayoutSummary>,
}

impl PreparedPayouts {
    pub fn cycles(&self) -> Vec<i64> {
        self.summaries.iter().map(|summary| summary.cycle).collect()
    }
}

/// Whether an earlier report settles its payout.
///
/// A report marked successful counts. A report that only carries an op hash counts once the
/// collector reports the operation applied; it is returned marked successful.
async fn settled_report(
    report: &PayoutReport,
    collector: Option<&dyn Collector>,
) -> Result<Option<PayoutReport>, PayoutError> {
    if report.is_success {
        return Ok(Some(report.clone()));
    }
    let (Some(op_hash), Some(collector)) = (&report.op_hash, collector) else {
        return Ok(None);
    };
    let status = collector.was_operation_applied(op_hash).await.map_err(PayoutError::Collector)?;
    if status != OperationStatus::Applied {
        tracing::debug!(
            "Operation {} of earlier payout to {} is {:?}",
            op_hash,
            report.recipient,
            status
        );
        return Ok(None);
    }
    tracing::info!(
        "Earlier payout to {} in cycle {} was applied in {}, marking it successful",
        report.recipient,
        report.cycle,
        op_hash
    );
    let mut settled = report.clone();
    settled.is_success = true;
    Ok(Some(settled))
}

/// Split the blueprints into payouts to execute and payouts already settled.
///
/// Failed reports without an op hash never reached the chain and are dropped; the payouts they
/// describe are executed again.
pub async fn prepare_payouts(
    blueprints: &[CyclePayoutBlueprint],
    reporter: &dyn Reporter,
    collector: Option<&dyn Collector>,
) -> Result<PreparedPayouts, PayoutError> {
    let mut prepared = PreparedPayouts::default();
    let mut paid: HashSet<PayoutIdentity> = HashSet::new();

    for blueprint in blueprints {
        let existing = reporter
            .get_existing_reports(blueprint.cycle)
            .await
            .map_err(PayoutError::Reporter)?;
        for report in &existing {
            if paid.contains(&report.identity()) {
                if !report.is_success && report.op_hash.is_some() {
                    prepared.reports_of_unsettled_payouts.push(report.clone());
                }
                continue;
            }
            match settled_report(report, collector).await? {
                Some(settled) => {
                    paid.insert(settled.identity());
                    prepared.reports_of_past_successful_payouts.push(settled);
                }
                None if report.op_hash.is_some() => {
                    prepared.reports_of_unsettled_payouts.push(report.clone());
                }
                None => {}
            }
        }

        let (valid, invalid): (Vec<&PayoutRecipe>, Vec<&PayoutRecipe>) =
            blueprint.payouts.iter().partition(|recipe| recipe.is_valid);
        let total = valid.len();
        let pending: Vec<PayoutRecipe> = valid
            .into_iter()
            .filter(|recipe| !paid.contains(&recipe.identity()))
            .cloned()
            .collect();
        let skipped = total - pending.len();
        prepared.valid.extend(pending);
        if skipped > 0 {
            tracing::info!(
                "Skipping {} payouts of cycle {} already paid",
                skipped,
                blueprint.cycle
            );
        }
        prepared.invalid.extend(invalid.into_iter().cloned());
        prepared.summaries.push(blueprint.summary.clone());
    }

    Ok(prepared)
}
