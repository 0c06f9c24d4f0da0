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

#![allow(dead_code)]

use std::sync::Arc;

use bakerpay_payouts::{
    continual::PayoutServices,
    execute::ExecutionContext,
    generate::{generate_payouts, GeneratePayoutsOptions, PayoutGenerationContext},
    CyclePayoutBlueprint, Mutez, PayoutConfiguration, PayoutError, Signer,
};
use bakerpay_test_utils::{
    fixtures, MemoryReporter, MockCollector, MockSigner, MockTransactor, RecordingNotificator,
};

/// Payout wallet balance funded by [Harness::new].
pub const WALLET_BALANCE: u64 = 1_000_000_000;

pub struct Harness {
    pub configuration: Arc<PayoutConfiguration>,
    pub collector: Arc<MockCollector>,
    pub signer: Arc<MockSigner>,
    pub transactor: Arc<MockTransactor>,
    pub reporter: Arc<MemoryReporter>,
    pub notificator: Arc<RecordingNotificator>,
}

impl Harness {
    pub fn new(configuration: PayoutConfiguration) -> Self {
        let collector = Arc::new(MockCollector::new());
        let signer = Arc::new(MockSigner::default());
        collector.set_balance(&signer.pkh(), Mutez::from(WALLET_BALANCE));
        let transactor = Arc::new(MockTransactor::new(collector.clone()));
        Self {
            configuration: Arc::new(configuration),
            collector,
            signer,
            transactor,
            reporter: Arc::new(MemoryReporter::new()),
            notificator: Arc::new(RecordingNotificator::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(fixtures::configuration())
    }

    pub fn generation_context(&self) -> PayoutGenerationContext {
        PayoutGenerationContext::new(
            self.configuration.clone(),
            self.collector.clone(),
            self.notificator.clone(),
            self.signer.pkh(),
        )
    }

    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext {
            configuration: self.configuration.clone(),
            signer: self.signer.clone(),
            transactor: self.transactor.clone(),
            collector: self.collector.clone(),
            reporter: self.reporter.clone(),
        }
    }

    pub fn services(&self) -> PayoutServices {
        PayoutServices {
            configuration: self.configuration.clone(),
            collector: self.collector.clone(),
            signer: self.signer.clone(),
            transactor: self.transactor.clone(),
            reporter: self.reporter.clone(),
            notificator: self.notificator.clone(),
        }
    }

    pub async fn generate(&self, cycle: i64) -> Result<CyclePayoutBlueprint, PayoutError> {
        let options = GeneratePayoutsOptions::for_cycle(Some(cycle), &self.configuration);
        generate_payouts(self.generation_context(), &options).await
    }
}
