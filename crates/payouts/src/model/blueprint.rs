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

use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use serde::{Deserialize, Serialize};

use super::{CyclePayoutSummary, Mutez, PayoutRecipe};

/// Output of payout generation for one cycle.
///
/// Saved to disk so generated payouts can be reviewed before they are executed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CyclePayoutBlueprint {
    pub cycle: i64,
    pub payouts: Vec<PayoutRecipe>,
    pub summary: CyclePayoutSummary,
}

impl CyclePayoutBlueprint {
    pub fn valid_payouts(&self) -> impl Iterator<Item = &PayoutRecipe> {
        self.payouts.iter().filter(|recipe| recipe.is_valid)
    }

    pub fn invalid_payouts(&self) -> impl Iterator<Item = &PayoutRecipe> {
        self.payouts.iter().filter(|recipe| !recipe.is_valid)
    }

    /// Sum of the amounts of all valid payouts.
    pub fn total_amount(&self) -> Mutez {
        self.valid_payouts().map(|recipe| recipe.amount).sum()
    }

    /// Load a blueprint from the given path.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read blueprint file: {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to decode blueprint from file: {}", path.display()))
    }

    /// Save the blueprint to the given path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_vec_pretty(self).context("Failed to serialize blueprint")?;

        AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&data))
            .with_context(|| format!("Failed to write blueprint to {}", path.display()))?;

        tracing::debug!("Saved payout blueprint of cycle {}: {}", self.cycle, path.display());
        Ok(())
    }
}
