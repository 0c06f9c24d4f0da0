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

use std::path::PathBuf;

use anyhow::Context;
use bakerpay_payouts::PayoutConfiguration;
use clap::Args;

use crate::config::GlobalConfig;

/// Command to load and validate a payout configuration.
#[derive(Args, Clone, Debug)]
pub struct CheckConfig {
    /// Configuration file to check. Defaults to the global `--config`.
    #[clap(long)]
    pub file: Option<PathBuf>,
}

impl CheckConfig {
    /// Run the [CheckConfig] command.
    pub async fn run(&self, global_config: &GlobalConfig) -> anyhow::Result<()> {
        let path = match &self.file {
            Some(file) => file.clone(),
            None => global_config.require_config()?,
        };
        let config = PayoutConfiguration::load(&path)
            .await
            .with_context(|| format!("invalid configuration {}", path.display()))?;

        tracing::info!("Configuration {} is valid", path.display());
        tracing::info!("Baker: {}", config.baker);
        tracing::info!(
            "Payout mode: {:?}, fee: {}, minimum payout: {}",
            config.payout.payout_mode,
            config.payout.fee,
            config.payout.minimum_payout_amount
        );
        tracing::info!(
            "Ignored delegators: {}, overrides: {}, income recipients: {}",
            config.delegators.ignore.len(),
            config.delegators.overrides.len(),
            config.income_recipients.recipient_count()
        );
        tracing::info!(
            "Batch size: {}, confirmations: {}, operation TTL: {} blocks",
            config.network.batch_size,
            config.network.confirmations,
            config.network.operation_ttl
        );
        Ok(())
    }
}
