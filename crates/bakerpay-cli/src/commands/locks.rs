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

use anyhow::Context;
use bakerpay_payouts::lock::list_lock_files;
use clap::Args;

use crate::config::GlobalConfig;

/// Command to list cycle lock files left under the reports root.
#[derive(Args, Clone, Debug)]
pub struct ListLocks {}

impl ListLocks {
    /// Run the [ListLocks] command.
    pub async fn run(&self, global_config: &GlobalConfig) -> anyhow::Result<()> {
        let root = global_config.require_reports()?;
        let locks = list_lock_files(&root)
            .with_context(|| format!("failed to list lock files under {}", root.display()))?;
        if locks.is_empty() {
            tracing::info!("No cycle locks under {}", root.display());
            return Ok(());
        }
        for lock in locks {
            match lock.pid {
                Some(pid) => tracing::info!(
                    "Cycle {} locked by pid {}: {}",
                    lock.cycle,
                    pid,
                    lock.path.display()
                ),
                None => tracing::info!("Cycle {}: {}", lock.cycle, lock.path.display()),
            }
        }
        Ok(())
    }
}
