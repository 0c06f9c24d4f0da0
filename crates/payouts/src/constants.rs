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

//! Protocol and pipeline constants.

use std::time::Duration;

/// Maximum delegated balance multiple a baker can back with its own balance.
pub const DELEGATION_CAPACITY_FACTOR: u64 = 10;

/// Number of candidates simulated together in a single request.
pub const SIMULATION_BATCH_CAPACITY: usize = 25;

/// Mutez reserved per expected operation when estimating the required payout balance.
pub const PAYOUT_FEE_BUFFER: u64 = 1_000;

/// Delay between payout balance checks while waiting for a refill.
pub const BALANCE_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Number of balance check attempts between admin notifications (hourly at the default
/// interval).
pub const BALANCE_NOTIFICATION_EVERY: u32 = 12;

/// Serialized bytes per operation not attributable to its contents (branch, signature).
pub const OPERATION_OVERHEAD_BYTES: u64 = 128;

/// Precision of percentages used in monetary math (4 decimal digits).
pub const PORTION_BASIS_POINTS: u64 = 10_000;

/// Retry interval of a contended cycle lock.
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Default time to wait for the locks of a cycle.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay before retrying a failed cycle in continual mode.
pub const CONTINUAL_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);
