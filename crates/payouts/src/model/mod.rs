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

//! Data model shared by the payout pipeline, execution engine and reporters.

mod address;
mod blueprint;
mod cycle;
mod mutez;
mod operation;
mod recipe;
mod report;
mod summary;

pub use address::{Address, AddressError, AddressKind};
pub use blueprint::CyclePayoutBlueprint;
pub use cycle::{CycleFacts, Delegator, HeadMetadata};
pub use mutez::Mutez;
pub use operation::{
    BlockObservation, ContentSimulation, IncludedOperation, OpHash, OperationCost,
    OperationLimits, OperationStatus, PayoutOperation, PreparedOperation, SignedOperation,
    TransferContent, TransferKind,
};
pub use recipe::{InvalidReason, PayoutIdentity, PayoutKind, PayoutRecipe};
pub use report::{InvalidPayoutRecord, PayoutReport};
pub use summary::CyclePayoutSummary;
