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
use crate::{constants::PAYOUT_FEE_BUFFER, error::PayoutError, model::Mutez};

/// Ensures the payout wallet can cover the payouts, optionally waiting for a refill.
pub struct CheckSufficientBalance;

impl CheckSufficientBalance {
    fn required_balance(ctx: &PayoutGenerationContext) -> Mutez {
        let data = &ctx.stage_data;
        let valid = data.candidates_with_bonds.iter().filter(|c| !c.is_invalid()).count();
        let operations = valid + ctx.configuration.income_recipients.recipient_count();
        let bonds: Mutez = data.candidates_with_bonds.iter().map(|c| c.bonds_amount()).sum();
        bonds + data.baker_bonds + Mutez::from(PAYOUT_FEE_BUFFER).mul_u64(operations as u64)
    }
}

#[async_trait]
impl GenerationStage for CheckSufficientBalance {
    fn name(&self) -> &'static str {
        "check_sufficient_balance"
    }

    async fn run(
        &self,
        ctx: PayoutGenerationContext,
        options: &GeneratePayoutsOptions,
    ) -> Result<PayoutGenerationContext, PayoutError> {
        if options.skip_balance_check {
            tracing::debug!("Skipping payout wallet balance check");
            return Ok(ctx);
        }

        let required = Self::required_balance(&ctx);
        let mut attempts: u32 = 0;
        loop {
            let available = ctx
                .collector
                .get_balance(&ctx.payout_wallet)
                .await
                .map_err(PayoutError::Collector)?;
            if available >= required {
                tracing::debug!(
                    "Payout wallet {} balance {} covers required {}",
                    ctx.payout_wallet,
                    available,
                    required
                );
                return Ok(ctx);
            }
            if !options.wait_for_sufficient_balance {
                return Err(PayoutError::InsufficientBalance { required, available });
            }

            if attempts % options.balance_notification_every.max(1) == 0 {
                let message = format!(
                    "Insufficient balance in payout wallet {} [required: {}, available: {}]. Waiting for a refill.",
                    ctx.payout_wallet, required, available
                );
                if let Err(e) = ctx.notificator.notify_admin(&message).await {
                    tracing::warn!("Failed to notify admin about insufficient balance: {e:?}");
                }
            }
            attempts = attempts.wrapping_add(1);
            tracing::warn!(
                "Insufficient payout wallet balance [required: {}, available: {}], checking again in {:?}",
                required,
                available,
                options.balance_check_interval
            );
            tokio::time::sleep(options.balance_check_interval).await;
        }
    }
}
