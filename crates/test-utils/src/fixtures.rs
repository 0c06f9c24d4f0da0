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

//! Fixture builders for cycle facts, configurations and chain limits.

use bakerpay_payouts::{
    config::{NetworkConfig, PayoutConfig},
    model::{HeadMetadata, OperationCost},
    Address, CycleFacts, Delegator, Mutez, OperationLimits, PayoutConfiguration,
};

pub const BAKER: &str = "tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU";
pub const PAYOUT_WALLET: &str = "tz1LeRMX7PDtFsZeWniBQwtzX4qaRJkTZTbJ";
pub const DELEGATORS: [&str; 6] = [
    "tz1KjLa4hxghcRgtK6i8BgPTXathEV66JaSk",
    "tz1KpeT1YhjpUa5Mw4ujJojp2XtP9mXTbJV2",
    "tz1KuxKxPSnwLiTqZ37LRw6AXUt553ouPvEY",
    "tz1L1GCuEBr4CrrKB1JwZ4SX2RskzLEbC8Mo",
    "tz1L6a5r4vuB51EnnyWYgBnsXNsSucZWqaKG",
    "tz1LBsxnufxHw9dGQwi9oK9E2Ks8ptvZu3kK",
];
pub const CONTRACT_DELEGATORS: [&str; 3] = [
    "KT18g5SiBpZEhMtyW11tE35UN9EJy2vSb8rC",
    "KT18mPKf2ZcMZWHT7yDVMARps6DztKHJ2ZVA",
    "KT18rhCbsJfURefvjwR6UHnBN3DgobiLw46h",
];
pub const INCOME_RECIPIENTS: [&str; 3] = [
    "tz1LHBqjkR1QoJ1k2uukvSVaXGrpkBLZhG48",
    "tz1LNVigbA4XfSQDet7N3Zqw2DrWfTiAKMLw",
    "tz1LTobdRu7eXanhGrJyAhCHXArCajy7uDL2",
];

/// Baker's own balance in [cycle_facts].
pub const BAKER_BALANCE: u64 = 10_000_000_000;
pub const BLOCK_REWARDS: u64 = 40_000_000;
pub const ENDORSEMENT_REWARDS: u64 = 20_000_000;
pub const BLOCK_FEES: u64 = 1_000_000;
pub const BLOCKS_PER_CYCLE: i64 = 100;

pub fn address(value: &str) -> Address {
    value.parse().unwrap_or_else(|e| panic!("invalid fixture address {value}: {e}"))
}

pub fn delegator(address_str: &str, balance: u64) -> Delegator {
    Delegator {
        address: address(address_str),
        delegated_balance: Mutez::from(balance),
        emptied: false,
    }
}

/// Facts of a cycle with the default rewards and a baker balance of [BAKER_BALANCE].
pub fn cycle_facts(cycle: i64, delegators: Vec<Delegator>) -> CycleFacts {
    let delegated_balance: Mutez = delegators.iter().map(|d| d.delegated_balance).sum();
    CycleFacts {
        cycle,
        staking_balance: delegated_balance + Mutez::from(BAKER_BALANCE),
        delegated_balance,
        frozen_deposit_limit: Mutez::ZERO,
        block_rewards: Mutez::from(BLOCK_REWARDS),
        endorsement_rewards: Mutez::from(ENDORSEMENT_REWARDS),
        ideal_block_rewards: Mutez::from(BLOCK_REWARDS + 4_000_000),
        ideal_endorsement_rewards: Mutez::from(ENDORSEMENT_REWARDS + 2_000_000),
        block_fees: Mutez::from(BLOCK_FEES),
        delegators,
    }
}

/// Cycle facts with every address of [DELEGATORS] delegating `balance`.
pub fn uniform_cycle_facts(cycle: i64, balance: u64) -> CycleFacts {
    cycle_facts(cycle, DELEGATORS.iter().map(|d| delegator(d, balance)).collect())
}

/// Configuration for [BAKER] with a 5% fee and a single confirmation.
pub fn configuration() -> PayoutConfiguration {
    PayoutConfiguration {
        baker: address(BAKER),
        delegators: Default::default(),
        payout: PayoutConfig { fee: 0.05, ..Default::default() },
        overdelegation: Default::default(),
        income_recipients: Default::default(),
        network: NetworkConfig { confirmations: 1, ..Default::default() },
        cycle_monitor: Default::default(),
    }
}

pub fn limits() -> OperationLimits {
    OperationLimits {
        hard_gas_limit_per_operation: 1_040_000,
        hard_storage_limit_per_operation: 60_000,
        max_operation_data_length: 32 * 1024,
    }
}

/// Simulated cost of a tez transfer to `destination`.
pub fn transfer_cost(destination: &Address) -> OperationCost {
    if destination.is_originated() {
        OperationCost {
            gas_limit: 3_000,
            storage_limit: 0,
            serialization_size: 120,
            transaction_fee: Mutez::from(700),
            allocation_fee: Mutez::ZERO,
        }
    } else {
        OperationCost {
            gas_limit: 1_000,
            storage_limit: 0,
            serialization_size: 100,
            transaction_fee: Mutez::from(400),
            allocation_fee: Mutez::ZERO,
        }
    }
}

pub fn head(cycle: i64, cycle_position: i64) -> HeadMetadata {
    HeadMetadata {
        level: cycle * BLOCKS_PER_CYCLE + cycle_position,
        cycle,
        cycle_position,
        blocks_per_cycle: BLOCKS_PER_CYCLE,
        block_time_secs: 8,
    }
}
