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

use crate::{
    constants::OPERATION_OVERHEAD_BYTES,
    error::PayoutError,
    model::{OperationCost, OperationLimits, PayoutRecipe},
};

#[derive(Clone, Copy, Debug)]
pub struct BatchPlanOptions {
    /// Maximum number of transfers per operation.
    pub max_batch_size: usize,
    /// Plan contract calls after, and separately from, the classic transfers.
    pub split_contract_calls: bool,
}

/// Payouts sent together in one operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PayoutBatch {
    pub payouts: Vec<PayoutRecipe>,
}

impl PayoutBatch {
    fn cost(recipe: &PayoutRecipe) -> OperationCost {
        recipe.op_limits.unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.payouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payouts.is_empty()
    }

    pub fn gas_limit(&self) -> u64 {
        self.payouts.iter().map(|p| Self::cost(p).gas_limit).sum()
    }

    pub fn storage_limit(&self) -> u64 {
        self.payouts.iter().map(|p| Self::cost(p).storage_limit).sum()
    }

    /// Estimated serialized size, including the per-operation overhead.
    pub fn serialization_size(&self) -> u64 {
        OPERATION_OVERHEAD_BYTES
            + self.payouts.iter().map(|p| Self::cost(p).serialization_size).sum::<u64>()
    }

    fn fits(&self, recipe: &PayoutRecipe, limits: &OperationLimits, max_batch_size: usize) -> bool {
        let cost = Self::cost(recipe);
        self.len() < max_batch_size
            && self.gas_limit() + cost.gas_limit <= limits.hard_gas_limit_per_operation
            && self.storage_limit() + cost.storage_limit <= limits.hard_storage_limit_per_operation
            && self.serialization_size() + cost.serialization_size
                <= limits.max_operation_data_length
    }
}

fn plan_group<'a>(
    recipes: impl Iterator<Item = &'a PayoutRecipe>,
    limits: &OperationLimits,
    max_batch_size: usize,
    batches: &mut Vec<PayoutBatch>,
) -> Result<(), PayoutError> {
    let mut current = PayoutBatch::default();
    for recipe in recipes {
        if !PayoutBatch::default().fits(recipe, limits, max_batch_size) {
            return Err(PayoutError::PayoutExceedsOperationLimits {
                recipient: recipe.recipient.clone(),
            });
        }
        if !current.fits(recipe, limits, max_batch_size) {
            batches.push(std::mem::take(&mut current));
        }
        current.payouts.push(recipe.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    Ok(())
}

/// Pack payouts into batches that stay within the operation limits.
///
/// Payouts keep their relative order. With `split_contract_calls`, classic transfers are
/// planned first and contract calls follow in batches of their own.
pub fn plan_batches(
    recipes: &[PayoutRecipe],
    limits: &OperationLimits,
    options: BatchPlanOptions,
) -> Result<Vec<PayoutBatch>, PayoutError> {
    let max_batch_size = options.max_batch_size.max(1);
    let mut batches = Vec::new();
    if options.split_contract_calls {
        plan_group(
            recipes.iter().filter(|r| !r.is_contract_call()),
            limits,
            max_batch_size,
            &mut batches,
        )?;
        plan_group(
            recipes.iter().filter(|r| r.is_contract_call()),
            limits,
            max_batch_size,
            &mut batches,
        )?;
    } else {
        plan_group(recipes.iter(), limits, max_batch_size, &mut batches)?;
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Address, Mutez, PayoutKind, TransferKind};
    use proptest::prelude::*;

    const IMPLICIT: [&str; 4] = [
        "tz1KjLa4hxghcRgtK6i8BgPTXathEV66JaSk",
        "tz1KpeT1YhjpUa5Mw4ujJojp2XtP9mXTbJV2",
        "tz1KuxKxPSnwLiTqZ37LRw6AXUt553ouPvEY",
        "tz1L1GCuEBr4CrrKB1JwZ4SX2RskzLEbC8Mo",
    ];
    const CONTRACT: &str = "KT18g5SiBpZEhMtyW11tE35UN9EJy2vSb8rC";

    fn recipe(recipient: &str, gas: u64, storage: u64, size: u64) -> PayoutRecipe {
        let baker: Address = "tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU".parse().unwrap();
        let recipient: Address = recipient.parse().unwrap();
        PayoutRecipe {
            baker: baker.clone(),
            delegator: recipient.clone(),
            recipient,
            cycle: 1,
            kind: PayoutKind::DelegatorReward,
            transfer: TransferKind::Tez,
            delegated_balance: Mutez::from(1_000),
            amount: Mutez::from(10),
            fee_rate: 0.0,
            fee: Mutez::ZERO,
            op_limits: Some(OperationCost {
                gas_limit: gas,
                storage_limit: storage,
                serialization_size: size,
                ..Default::default()
            }),
            is_valid: true,
            invalid_reason: None,
            note: String::new(),
        }
    }

    fn limits(gas: u64, storage: u64, size: u64) -> OperationLimits {
        OperationLimits {
            hard_gas_limit_per_operation: gas,
            hard_storage_limit_per_operation: storage,
            max_operation_data_length: size,
        }
    }

    #[test]
    fn splits_on_batch_size() {
        let recipes: Vec<_> = IMPLICIT.iter().map(|r| recipe(r, 1, 0, 10)).collect();
        let batches = plan_batches(
            &recipes,
            &limits(1_000, 1_000, 10_000),
            BatchPlanOptions { max_batch_size: 3, split_contract_calls: false },
        )
        .unwrap();
        assert_eq!(batches.iter().map(PayoutBatch::len).collect::<Vec<_>>(), vec![3, 1]);
    }

    #[test]
    fn splits_on_gas_and_size() {
        let recipes: Vec<_> = IMPLICIT.iter().map(|r| recipe(r, 400, 0, 100)).collect();
        let batches = plan_batches(
            &recipes,
            &limits(1_000, 1_000, 10_000),
            BatchPlanOptions { max_batch_size: 100, split_contract_calls: false },
        )
        .unwrap();
        assert_eq!(batches.iter().map(PayoutBatch::len).collect::<Vec<_>>(), vec![2, 2]);

        // Overhead of 128 plus 3 transfers of 100 bytes exceeds 400.
        let batches = plan_batches(
            &recipes,
            &limits(10_000, 1_000, 400),
            BatchPlanOptions { max_batch_size: 100, split_contract_calls: false },
        )
        .unwrap();
        assert_eq!(batches.iter().map(PayoutBatch::len).collect::<Vec<_>>(), vec![2, 2]);
    }

    #[test]
    fn contract_calls_follow_classic_batches() {
        let recipes = vec![
            recipe(CONTRACT, 10, 0, 10),
            recipe(IMPLICIT[0], 10, 0, 10),
            recipe(IMPLICIT[1], 10, 0, 10),
        ];
        let options = BatchPlanOptions { max_batch_size: 10, split_contract_calls: true };
        let batches = plan_batches(&recipes, &limits(1_000, 1_000, 10_000), options).unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches[0].payouts.iter().all(|p| !p.is_contract_call()));
        assert!(batches[1].payouts.iter().all(PayoutRecipe::is_contract_call));

        let options = BatchPlanOptions { max_batch_size: 10, split_contract_calls: false };
        let batches = plan_batches(&recipes, &limits(1_000, 1_000, 10_000), options).unwrap();
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn oversized_payout_is_an_error() {
        let recipes = vec![recipe(IMPLICIT[0], 2_000, 0, 10)];
        let result = plan_batches(
            &recipes,
            &limits(1_000, 1_000, 10_000),
            BatchPlanOptions { max_batch_size: 10, split_contract_calls: false },
        );
        assert!(matches!(result, Err(PayoutError::PayoutExceedsOperationLimits { .. })));
    }

    proptest! {
        #[test]
        fn batches_respect_limits_and_keep_every_payout(
            costs in prop::collection::vec((0u64..500, 0u64..300, 0u64..200, any::<bool>()), 0..60),
            max_batch_size in 1usize..20,
            split_contract_calls in any::<bool>(),
        ) {
            let limits = limits(1_000, 600, 1_000);
            let recipes: Vec<_> = costs
                .iter()
                .enumerate()
                .map(|(i, (gas, storage, size, contract))| {
                    let recipient = if *contract { CONTRACT } else { IMPLICIT[i % IMPLICIT.len()] };
                    let mut recipe = recipe(recipient, *gas, *storage, *size);
                    recipe.amount = Mutez::from(i as u64);
                    recipe
                })
                .collect();
            let options = BatchPlanOptions { max_batch_size, split_contract_calls };
            let batches = plan_batches(&recipes, &limits, options).unwrap();

            for batch in &batches {
                prop_assert!(!batch.is_empty());
                prop_assert!(batch.len() <= max_batch_size);
                prop_assert!(batch.gas_limit() <= limits.hard_gas_limit_per_operation);
                prop_assert!(batch.storage_limit() <= limits.hard_storage_limit_per_operation);
                prop_assert!(batch.serialization_size() <= limits.max_operation_data_length);
            }
            let mut planned: Vec<Mutez> =
                batches.iter().flat_map(|b| b.payouts.iter().map(|p| p.amount)).collect();
            planned.sort();
            let expected: Vec<Mutez> = recipes.iter().map(|r| r.amount).collect();
            prop_assert_eq!(planned, expected);
        }
    }
}
