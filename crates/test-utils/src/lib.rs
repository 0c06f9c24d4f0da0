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

//! Test utilities for the bakerpay crates.
//!
//! In-memory doubles of the payout collaborators and fixture builders for cycle facts and
//! configurations, shared by the integration tests.

pub mod fixtures;
pub mod mocks;

pub use mocks::{
    BroadcastOutcome, MemoryReporter, MockCollector, MockSigner, MockTransactor,
    RecordingNotificator,
};
