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

use async_trait::async_trait;

use super::{GeneratePayoutsOptions, GenerationStage, PayoutGenerationContext};
use crate::error::PayoutError;

/// Withholds the baker fee from every delegator's bonds.
pub struct CollectBakerFee;

#[async_trait]
impl GenerationStage for CollectBakerFee {
    fn name(&self) -> &'static str {
        "collect_baker_fee"
    }

    async fn run(
        &self,
        mut ctx: PayoutGenerationContext,
        _options: &GeneratePayoutsOptions,
    ) -> Result<PayoutGenerationContext, PayoutError> {
        let candidates = std::mem::take(&mut ctx.stage_data.candidates_with_bonds);
        ctx.stage_data.candidates_with_fees =
            candidates.into_iter().map(|candidate| candidate.with_fee()).collect();
        Ok(ctx)
    }
}
