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

//! Payout configuration, loaded from TOML.

use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{constants::BALANCE_CHECK_INTERVAL, Address, Mutez};

// Tolerance on the sum of recipient shares, which are written as decimal fractions.
const SHARE_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which reward figures the payouts are based on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMode {
    /// Rewards the baker actually received.
    #[default]
    Actual,
    /// Rewards the baker would have received without missed blocks and endorsements.
    Ideal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoutConfiguration {
    pub baker: Address,
    #[serde(default)]
    pub delegators: DelegatorsConfig,
    #[serde(default)]
    pub payout: PayoutConfig,
    #[serde(default)]
    pub overdelegation: OverdelegationConfig,
    #[serde(default)]
    pub income_recipients: IncomeRecipientsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub cycle_monitor: CycleMonitorConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegatorsConfig {
    /// Delegators with a lower delegated balance are not paid.
    pub minimum_balance: Mutez,
    pub ignore: Vec<Address>,
    pub overrides: BTreeMap<Address, DelegatorOverride>,
}

/// Per-delegator settings taking precedence over the global ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegatorOverride {
    /// Alternative recipient. Kept unparsed so a typo invalidates only this delegator.
    pub recipient: Option<String>,
    pub fee: Option<f64>,
    pub minimum_balance: Option<Mutez>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    pub payout_mode: PayoutMode,
    /// Baker fee as a fraction of the delegator bonds.
    pub fee: f64,
    pub minimum_payout_amount: Mutez,
    pub baker_pays_transaction_fee: bool,
    pub baker_pays_allocation_fee: bool,
    pub ignore_empty_accounts: bool,
    pub ignore_kt: bool,
    pub wait_for_sufficient_balance: bool,
    pub balance_check_interval_secs: u64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            payout_mode: PayoutMode::Actual,
            fee: 0.05,
            minimum_payout_amount: Mutez::ZERO,
            baker_pays_transaction_fee: false,
            baker_pays_allocation_fee: false,
            ignore_empty_accounts: false,
            ignore_kt: false,
            wait_for_sufficient_balance: false,
            balance_check_interval_secs: BALANCE_CHECK_INTERVAL.as_secs(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverdelegationConfig {
    pub protect: bool,
}

impl Default for OverdelegationConfig {
    fn default() -> Self {
        Self { protect: true }
    }
}

/// Where the baker's income goes. Shares are fractions of the respective income.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomeRecipientsConfig {
    pub bonds: BTreeMap<Address, f64>,
    pub fees: BTreeMap<Address, f64>,
    /// Fraction of the baker bonds and fees donated.
    pub donate: f64,
    pub donations: BTreeMap<Address, f64>,
}

impl IncomeRecipientsConfig {
    pub fn recipient_count(&self) -> usize {
        self.bonds.len() + self.fees.len() + self.donations.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Maximum number of transfers in one operation.
    pub batch_size: usize,
    /// Plan contract calls in batches of their own.
    pub split_contract_calls: bool,
    /// Blocks on top of the inclusion block before a payout counts as settled.
    pub confirmations: u64,
    /// Blocks after which an operation that was not included is given up on.
    pub operation_ttl: u64,
    pub fallback_grace_period_secs: u64,
    pub fallback_poll_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            split_contract_calls: true,
            confirmations: 2,
            operation_ttl: 120,
            fallback_grace_period_secs: 60,
            fallback_poll_interval_secs: 15,
        }
    }
}

impl NetworkConfig {
    pub fn fallback_grace_period(&self) -> Duration {
        Duration::from_secs(self.fallback_grace_period_secs)
    }

    pub fn fallback_poll_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_poll_interval_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleMonitorConfig {
    /// Blocks into a new cycle before the previous one is reported completed.
    pub notification_delay: i64,
    /// When set, the delay is drawn uniformly from `[0, max]` instead.
    pub random_notification_delay_max: Option<i64>,
    pub min_poll_interval_secs: u64,
    pub max_poll_interval_secs: u64,
}

impl Default for CycleMonitorConfig {
    fn default() -> Self {
        Self {
            notification_delay: 0,
            random_notification_delay_max: None,
            min_poll_interval_secs: 2,
            max_poll_interval_secs: 120,
        }
    }
}

impl PayoutConfiguration {
    /// Load and validate a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PayoutConfiguration = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("payout.fee", self.payout.fee)?;
        for (delegator, delegator_override) in &self.delegators.overrides {
            if let Some(fee) = delegator_override.fee {
                check_fraction(&format!("delegators.overrides.{delegator}.fee"), fee)?;
            }
        }

        let recipients = &self.income_recipients;
        check_fraction("income_recipients.donate", recipients.donate)?;
        check_shares("income_recipients.bonds", &recipients.bonds)?;
        check_shares("income_recipients.fees", &recipients.fees)?;
        check_shares("income_recipients.donations", &recipients.donations)?;
        if recipients.donate > 0.0 && recipients.donations.is_empty() {
            return Err(ConfigError::Invalid(
                "income_recipients.donate is set but no donation recipients are configured".into(),
            ));
        }

        if self.network.batch_size == 0 {
            return Err(ConfigError::Invalid("network.batch_size must be positive".into()));
        }
        if self.network.fallback_poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "network.fallback_poll_interval_secs must be positive".into(),
            ));
        }

        let monitor = &self.cycle_monitor;
        if monitor.min_poll_interval_secs == 0
            || monitor.min_poll_interval_secs > monitor.max_poll_interval_secs
        {
            return Err(ConfigError::Invalid(format!(
                "cycle_monitor poll interval bounds are invalid [min: {}, max: {}]",
                monitor.min_poll_interval_secs, monitor.max_poll_interval_secs
            )));
        }
        if monitor.notification_delay < 0 || monitor.random_notification_delay_max.unwrap_or(0) < 0
        {
            return Err(ConfigError::Invalid(
                "cycle_monitor notification delays must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn is_ignored(&self, delegator: &Address) -> bool {
        self.delegators.ignore.contains(delegator)
    }

    pub fn fee_rate_for(&self, delegator: &Address) -> f64 {
        self.delegators
            .overrides
            .get(delegator)
            .and_then(|o| o.fee)
            .unwrap_or(self.payout.fee)
    }

    pub fn minimum_balance_for(&self, delegator: &Address) -> Mutez {
        self.delegators
            .overrides
            .get(delegator)
            .and_then(|o| o.minimum_balance)
            .unwrap_or(self.delegators.minimum_balance)
    }

    pub fn recipient_override(&self, delegator: &Address) -> Option<&str> {
        self.delegators.overrides.get(delegator).and_then(|o| o.recipient.as_deref())
    }

    pub fn balance_check_interval(&self) -> Duration {
        Duration::from_secs(self.payout.balance_check_interval_secs)
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {value}")));
    }
    Ok(())
}

fn check_shares(name: &str, shares: &BTreeMap<Address, f64>) -> Result<(), ConfigError> {
    for (recipient, share) in shares {
        check_fraction(&format!("{name}.{recipient}"), *share)?;
    }
    let total: f64 = shares.values().sum();
    if total > 1.0 + SHARE_SUM_TOLERANCE {
        return Err(ConfigError::Invalid(format!("{name} shares sum to {total}, more than 1")));
    }
    Ok(())
}
