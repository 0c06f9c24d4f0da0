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

//! Options shared by all commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct GlobalConfig {
    /// Path of the payout configuration file.
    #[clap(long, env = "BAKERPAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Root directory of the payout reports and cycle locks.
    #[clap(long, env = "BAKERPAY_REPORTS", global = true)]
    pub reports: Option<PathBuf>,

    /// Whether to log in JSON format.
    #[clap(long, env, global = true, default_value_t = false)]
    pub log_json: bool,
}

impl GlobalConfig {
    /// Access [Self::config] or return an error that can be shown to the user.
    pub fn require_config(&self) -> Result<PathBuf> {
        self.config.clone().context(
            "Configuration file not provided; please set --config or the BAKERPAY_CONFIG env var",
        )
    }

    /// Access [Self::reports] or return an error that can be shown to the user.
    pub fn require_reports(&self) -> Result<PathBuf> {
        self.reports.clone().context(
            "Reports directory not provided; please set --reports or the BAKERPAY_REPORTS env var",
        )
    }
}
