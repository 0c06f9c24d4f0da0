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

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod commands;
mod config;

use commands::{BlueprintInfo, CheckConfig, ListLocks, SummaryRange};
use config::GlobalConfig;

/// Operator tool over the persisted payout state of a baker.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MainArgs {
    #[clap(subcommand)]
    command: Command,

    #[clap(flatten)]
    config: GlobalConfig,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Load and validate a payout configuration file.
    CheckConfig(CheckConfig),
    /// Print the combined summary of a range of paid cycles.
    Summary(SummaryRange),
    /// Print the totals of a saved payout blueprint.
    Blueprint(BlueprintInfo),
    /// List the cycle lock files under the reports root.
    Locks(ListLocks),
}

impl Command {
    async fn run(&self, global_config: &GlobalConfig) -> Result<()> {
        match self {
            Self::CheckConfig(cmd) => cmd.run(global_config).await,
            Self::Summary(cmd) => cmd.run(global_config).await,
            Self::Blueprint(cmd) => cmd.run(global_config).await,
            Self::Locks(cmd) => cmd.run(global_config).await,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = MainArgs::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    if args.config.log_json {
        tracing_subscriber::fmt().with_ansi(false).json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_ansi(false).with_env_filter(filter).init();
    }

    if let Err(e) = args.command.run(&args.config).await {
        tracing::error!("FATAL: {:?}", e);
        std::process::exit(1);
    }
}
