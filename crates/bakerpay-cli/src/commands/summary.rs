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

use anyhow::{ensure, Context};
use bakerpay_payouts::{CyclePayoutSummary, FsReporter};
use clap::Args;

use crate::config::GlobalConfig;

/// Command to print the combined summary of a range of cycles.
#[derive(Args, Clone, Debug)]
pub struct SummaryRange {
    /// First cycle of the range.
    #[clap(long)]
    pub from: i64,
    /// Last cycle of the range, inclusive. Defaults to `--from`.
    #[clap(long)]
    pub to: Option<i64>,
}

impl SummaryRange {
    /// Run the [SummaryRange] command.
    pub async fn run(&self, global_config: &GlobalConfig) -> anyhow::Result<()> {
        let root = global_config.require_reports()?;
        let to = self.to.unwrap_or(self.from);
        let reporter = FsReporter::new(root);

        let (summary, missing) = summarize_range(&reporter, self.from, to)?;
        if !missing.is_empty() {
            tracing::warn!("No summary recorded for cycles {:?}", missing);
        }
        tracing::info!(
            "Cycles {}..={}: distributed {}, income {}, donated {}",
            self.from,
            to,
            summary.distributed_rewards,
            summary.income_total,
            summary.donated_total
        );
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }
}

/// Combine the summaries of the cycles `from..=to`, returning the cycles without one.
pub fn summarize_range(
    reporter: &FsReporter,
    from: i64,
    to: i64,
) -> anyhow::Result<(CyclePayoutSummary, Vec<i64>)> {
    ensure!(from <= to, "invalid cycle range {from}..={to}");
    let mut combined: Option<CyclePayoutSummary> = None;
    let mut missing = Vec::new();
    for cycle in from..=to {
        let summary = reporter
            .read_summary(cycle)
            .with_context(|| format!("failed to read the summary of cycle {cycle}"))?;
        match summary {
            Some(summary) => {
                combined = Some(match combined {
                    Some(acc) => acc.combine(&summary),
                    None => summary,
                })
            }
            None => missing.push(cycle),
        }
    }
    Ok((combined.unwrap_or_default(), missing))
}
