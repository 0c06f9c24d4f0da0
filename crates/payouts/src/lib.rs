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

//! Reward distribution and payout settlement for a delegating baker.
//!
//! The crate turns per-cycle chain accounting facts into a validated set of payout recipes
//! ([generate]), filters out what was already paid ([prepare]), packs the rest into
//! operations that respect protocol limits and settles them on chain ([execute]), and wraps
//! per-cycle runs in cross-process locks ([lock]) driven by a chain head monitor
//! ([cycle_monitor], [continual]).
//!
//! Chain access, key custody, broadcasting, persistence and notifications are collaborators
//! behind the traits in [clients].

pub mod clients;
pub mod config;
pub mod confirmation;
pub mod constants;
pub mod continual;
pub mod cycle_monitor;
pub mod error;
pub mod execute;
pub mod generate;
pub mod lock;
pub mod model;
pub mod prepare;
pub mod reporter;

pub use clients::{Collector, LogNotificator, Notificator, Reporter, Signer, Transactor};
pub use config::{ConfigError, PayoutConfiguration, PayoutMode};
pub use error::PayoutError;
pub use reporter::FsReporter;
pub use model::{
    Address, AddressKind, CycleFacts, CyclePayoutBlueprint, CyclePayoutSummary, Delegator,
    InvalidReason, Mutez, OpHash, OperationLimits, OperationStatus, PayoutKind, PayoutRecipe,
    PayoutReport, TransferKind,
};
