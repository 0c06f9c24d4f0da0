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

//! Reporter persisting payout reports and summaries under a directory per cycle.
//!
//! Layout: `<root>/<cycle>/payouts.csv`, `<root>/<cycle>/invalid.csv` and
//! `<root>/<cycle>/summary.json`. Every file is replaced atomically.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use atomicwrites::{AtomicFile, OverwriteBehavior};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{
    clients::Reporter,
    model::{CyclePayoutSummary, InvalidPayoutRecord, PayoutRecipe, PayoutReport},
};

pub const PAYOUTS_FILE: &str = "payouts.csv";
pub const INVALID_FILE: &str = "invalid.csv";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug)]
pub struct FsReporter {
    root: PathBuf,
}

impl FsReporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cycle_dir(&self, cycle: i64) -> PathBuf {
        self.root.join(cycle.to_string())
    }

    fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ReporterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| ReporterError::Io { path: parent.to_path_buf(), source })?;
        }
        AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(data))
            .map_err(|e| ReporterError::Io { path: path.to_path_buf(), source: e.into() })
    }

    fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ReporterError> {
        let csv_error = |source| ReporterError::Csv { path: path.to_path_buf(), source };
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in rows {
            writer.serialize(row).map_err(csv_error)?;
        }
        let data = writer.into_inner().map_err(|e| csv_error(e.into_error().into()))?;
        Self::write_atomic(path, &data)
    }

    /// Rows of a CSV file, empty when the file does not exist.
    fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ReporterError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ReporterError::Io { path: path.to_path_buf(), source }),
        };
        csv::Reader::from_reader(data.as_slice())
            .deserialize()
            .collect::<Result<Vec<T>, _>>()
            .map_err(|source| ReporterError::Csv { path: path.to_path_buf(), source })
    }

    pub fn read_reports(&self, cycle: i64) -> Result<Vec<PayoutReport>, ReporterError> {
        Self::read_csv(&self.cycle_dir(cycle).join(PAYOUTS_FILE))
    }

    pub fn read_invalid_payouts(
        &self,
        cycle: i64,
    ) -> Result<Vec<InvalidPayoutRecord>, ReporterError> {
        Self::read_csv(&self.cycle_dir(cycle).join(INVALID_FILE))
    }

    pub fn read_summary(&self, cycle: i64) -> Result<Option<CyclePayoutSummary>, ReporterError> {
        let path = self.cycle_dir(cycle).join(SUMMARY_FILE);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ReporterError::Io { path, source }),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| ReporterError::Json { path, source })
    }

    /// Replace the payout reports of every cycle present in `reports`.
    pub fn write_reports(&self, reports: &[PayoutReport]) -> Result<(), ReporterError> {
        for (cycle, rows) in group_by_cycle(reports, |report| report.cycle) {
            let path = self.cycle_dir(cycle).join(PAYOUTS_FILE);
            Self::write_csv(&path, &rows)?;
            tracing::debug!("Wrote {} payout reports of cycle {}", rows.len(), cycle);
        }
        Ok(())
    }

    pub fn write_invalid_payouts(&self, recipes: &[PayoutRecipe]) -> Result<(), ReporterError> {
        let records: Vec<InvalidPayoutRecord> = recipes.iter().map(Into::into).collect();
        for (cycle, rows) in group_by_cycle(&records, |record| record.cycle) {
            Self::write_csv(&self.cycle_dir(cycle).join(INVALID_FILE), &rows)?;
        }
        Ok(())
    }

    pub fn write_summary(&self, summary: &CyclePayoutSummary) -> Result<(), ReporterError> {
        let path = self.cycle_dir(summary.cycle).join(SUMMARY_FILE);
        let data = serde_json::to_vec_pretty(summary)
            .map_err(|source| ReporterError::Json { path: path.clone(), source })?;
        Self::write_atomic(&path, &data)
    }
}

fn group_by_cycle<T: Clone>(rows: &[T], cycle: impl Fn(&T) -> i64) -> BTreeMap<i64, Vec<T>> {
    let mut grouped: BTreeMap<i64, Vec<T>> = BTreeMap::new();
    for row in rows {
        grouped.entry(cycle(row)).or_default().push(row.clone());
    }
    grouped
}

#[async_trait]
impl Reporter for FsReporter {
    async fn get_existing_reports(&self, cycle: i64) -> anyhow::Result<Vec<PayoutReport>> {
        Ok(self.read_reports(cycle)?)
    }

    async fn report_payouts(&self, reports: &[PayoutReport]) -> anyhow::Result<()> {
        Ok(self.write_reports(reports)?)
    }

    async fn report_invalid_payouts(&self, recipes: &[PayoutRecipe]) -> anyhow::Result<()> {
        Ok(self.write_invalid_payouts(recipes)?)
    }

    async fn report_cycle_summary(&self, summary: &CyclePayoutSummary) -> anyhow::Result<()> {
        self.write_summary(summary)?;
        tracing::info!("Recorded payout summary of cycle {}", summary.cycle);
        Ok(())
    }

    async fn get_existing_cycle_summary(
        &self,
        cycle: i64,
    ) -> anyhow::Result<Option<CyclePayoutSummary>> {
        Ok(self.read_summary(cycle)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Address, InvalidReason, Mutez, OpHash, PayoutKind, TransferKind};

    const BAKER: &str = "tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU";
    const DELEGATOR: &str = "tz1KjLa4hxghcRgtK6i8BgPTXathEV66JaSk";

    fn recipe(cycle: i64) -> PayoutRecipe {
        let delegator: Address = DELEGATOR.parse().unwrap();
        PayoutRecipe {
            baker: BAKER.parse().unwrap(),
            delegator: delegator.clone(),
            recipient: delegator,
            cycle,
            kind: PayoutKind::DelegatorReward,
            transfer: TransferKind::Tez,
            delegated_balance: Mutez::from(5_000_000),
            amount: Mutez::from(12_345),
            fee_rate: 0.05,
            fee: Mutez::from(650),
            op_limits: None,
            is_valid: true,
            invalid_reason: None,
            note: String::new(),
        }
    }

    #[tokio::test]
    async fn persists_reports_per_cycle() {
        let root = tempfile::tempdir().unwrap();
        let reporter = FsReporter::new(root.path());
        assert!(reporter.get_existing_reports(10).await.unwrap().is_empty());

        let op_hash = OpHash::new("onhJn6T1vDHVqF6x8e3QJmj7KKtEdfzPkA4YXYJDoTbC1PkETuG");
        let reports = vec![
            PayoutReport::from_recipe(&recipe(10), Some(op_hash.clone()), true, ""),
            PayoutReport::from_recipe(&recipe(11), None, false, "broadcast failed, retry later"),
        ];
        reporter.report_payouts(&reports).await.unwrap();

        assert!(root.path().join("10").join(PAYOUTS_FILE).exists());
        assert_eq!(reporter.get_existing_reports(10).await.unwrap(), vec![reports[0].clone()]);
        let cycle_11 = reporter.get_existing_reports(11).await.unwrap();
        assert_eq!(cycle_11, vec![reports[1].clone()]);
        assert_eq!(cycle_11[0].op_hash, None);

        // A later write replaces the whole cycle file.
        let retried = PayoutReport::from_recipe(&recipe(11), Some(op_hash), true, "");
        reporter.report_payouts(std::slice::from_ref(&retried)).await.unwrap();
        assert_eq!(reporter.get_existing_reports(11).await.unwrap(), vec![retried]);
    }

    #[tokio::test]
    async fn persists_invalid_payouts_and_summaries() {
        let root = tempfile::tempdir().unwrap();
        let reporter = FsReporter::new(root.path());

        let mut invalid = recipe(12);
        invalid.is_valid = false;
        invalid.kind = PayoutKind::Invalid;
        invalid.invalid_reason = Some(InvalidReason::LowBalance);
        reporter.report_invalid_payouts(std::slice::from_ref(&invalid)).await.unwrap();
        let records = reporter.read_invalid_payouts(12).unwrap();
        assert_eq!(records, vec![InvalidPayoutRecord::from(&invalid)]);

        assert_eq!(reporter.get_existing_cycle_summary(12).await.unwrap(), None);
        let summary = CyclePayoutSummary {
            cycle: 12,
            delegators: 3,
            paid_delegators: 2,
            distributed_rewards: Mutez::from(1_000_000),
            ..Default::default()
        };
        reporter.report_cycle_summary(&summary).await.unwrap();
        assert_eq!(reporter.get_existing_cycle_summary(12).await.unwrap(), Some(summary));
    }

    #[tokio::test]
    async fn corrupted_report_file_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let reporter = FsReporter::new(root.path());
        std::fs::create_dir_all(reporter.cycle_dir(5)).unwrap();
        std::fs::write(reporter.cycle_dir(5).join(PAYOUTS_FILE), "cycle,kind\nfive,unknown\n")
            .unwrap();
        let err = reporter.read_reports(5).unwrap_err();
        assert!(matches!(err, ReporterError::Csv { .. }), "{err}");
    }
}
