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

//! Payout generation against in-memory collaborators.

mod common;

use std::collections::BTreeMap;

use bakerpay_payouts::{
    config::DelegatorOverride, CyclePayoutBlueprint, InvalidReason, Mutez, PayoutError,
    PayoutKind, PayoutMode, Signer,
};
use bakerpay_test_utils::fixtures::{
    self, address, cycle_facts, delegator, uniform_cycle_facts, CONTRACT_DELEGATORS, DELEGATORS,
    INCOME_RECIPIENTS,
};
use common::Harness;

const CYCLE: i64 = 500;
const BALANCE: u64 = 1_000_000_000;

#[tokio::test]
async fn test_generates_uniform_cycle() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));

    let blueprint = harness.generate(CYCLE).await?;
    assert_eq!(blueprint.cycle, CYCLE);
    assert_eq!(blueprint.payouts.len(), DELEGATORS.len());
    for recipe in &blueprint.payouts {
        assert!(recipe.is_valid, "{recipe:?}");
        assert_eq!(recipe.kind, PayoutKind::DelegatorReward);
        assert_eq!(recipe.fee, Mutez::from(190_625));
        assert_eq!(recipe.amount, Mutez::from(3_621_475));
        assert_eq!(recipe.transaction_fee(), Mutez::from(400));
    }

    let summary = &blueprint.summary;
    assert_eq!(summary.delegators, 6);
    assert_eq!(summary.paid_delegators, 6);
    assert_eq!(summary.earned_rewards, Mutez::from(61_000_000));
    assert_eq!(summary.earned_fees, Mutez::from(1_143_750));
    assert_eq!(summary.bond_income, Mutez::from(38_125_000));
    assert_eq!(summary.fee_income, Mutez::from(1_143_750));
    assert_eq!(summary.distributed_rewards, Mutez::from(6 * 3_621_475));
    assert_eq!(summary.donated_total, Mutez::ZERO);
    assert_eq!(blueprint.total_amount(), summary.distributed_rewards);
    Ok(())
}

#[tokio::test]
async fn test_ideal_mode_uses_ideal_rewards() -> anyhow::Result<()> {
    let mut configuration = fixtures::configuration();
    configuration.payout.payout_mode = PayoutMode::Ideal;
    let harness = Harness::new(configuration);
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));

    let blueprint = harness.generate(CYCLE).await?;
    assert_eq!(blueprint.summary.earned_rewards, Mutez::from(67_000_000));
    assert_eq!(blueprint.summary.bond_income, Mutez::from(41_875_000));
    Ok(())
}

#[tokio::test]
async fn test_overdelegated_baker_keeps_a_tenth() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    let mut facts = uniform_cycle_facts(CYCLE, BALANCE);
    // 100 tez of own balance backs at most 1000 tez of delegations.
    facts.staking_balance = facts.delegated_balance + Mutez::from(100_000_000);
    harness.collector.add_cycle(facts);

    let blueprint = harness.generate(CYCLE).await?;
    assert_eq!(blueprint.summary.bond_income, Mutez::from(6_100_000));
    for recipe in &blueprint.payouts {
        assert_eq!(recipe.fee, Mutez::from(457_500));
        assert_eq!(recipe.amount, Mutez::from(8_692_100));
    }
    Ok(())
}

#[tokio::test]
async fn test_invalid_candidates_keep_their_reason() -> anyhow::Result<()> {
    let mut configuration = fixtures::configuration();
    configuration.delegators.minimum_balance = Mutez::from(500_000_000);
    configuration.delegators.ignore = vec![address(DELEGATORS[1])];
    configuration.payout.ignore_empty_accounts = true;
    configuration.payout.ignore_kt = true;
    configuration.delegators.overrides = BTreeMap::from([
        (
            address(DELEGATORS[4]),
            DelegatorOverride { recipient: Some("tz1notanaddress".into()), ..Default::default() },
        ),
        (
            address(DELEGATORS[5]),
            DelegatorOverride { fee: Some(0.1), ..Default::default() },
        ),
    ]);
    let harness = Harness::new(configuration);

    let mut emptied = delegator(DELEGATORS[3], BALANCE);
    emptied.emptied = true;
    let facts = cycle_facts(
        CYCLE,
        vec![
            delegator(DELEGATORS[0], BALANCE),
            delegator(DELEGATORS[1], BALANCE),
            delegator(DELEGATORS[2], 100_000_000),
            emptied,
            delegator(DELEGATORS[4], BALANCE),
            delegator(DELEGATORS[5], BALANCE),
            delegator(CONTRACT_DELEGATORS[0], BALANCE),
        ],
    );
    let total_rewards = facts.total_rewards(PayoutMode::Actual);
    harness.collector.add_cycle(facts);

    let blueprint = harness.generate(CYCLE).await?;
    let reasons: Vec<Option<InvalidReason>> =
        blueprint.payouts.iter().map(|p| p.invalid_reason).collect();
    assert_eq!(
        reasons,
        vec![
            None,
            Some(InvalidReason::DelegatorIgnored),
            Some(InvalidReason::LowBalance),
            Some(InvalidReason::DelegatorEmptied),
            Some(InvalidReason::InvalidRecipient),
            None,
            Some(InvalidReason::KtIgnored),
        ]
    );
    for invalid in blueprint.invalid_payouts() {
        assert_eq!(invalid.kind, PayoutKind::Invalid);
        assert_eq!(invalid.amount, Mutez::ZERO);
    }
    assert_eq!(blueprint.payouts[4].note, "tz1notanaddress");

    // The override fee applies to its delegator only.
    let valid: Vec<_> = blueprint.valid_payouts().collect();
    assert_eq!(valid.len(), 2);
    assert_eq!(valid[0].fee, Mutez::from(201_986));
    assert_eq!(valid[1].fee, Mutez::from(403_973));

    // Everything not paid to delegators stays with the baker.
    let summary = &blueprint.summary;
    let tx_fees: Mutez = valid.iter().map(|p| p.transaction_fee()).sum();
    assert_eq!(
        summary.distributed_rewards + tx_fees + summary.earned_fees + summary.bond_income,
        total_rewards
    );
    assert_eq!(summary.paid_delegators, 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_simulation_only_invalidates_its_payout() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));
    harness.collector.fail_simulation_for(&address(DELEGATORS[2]));

    let blueprint = harness.generate(CYCLE).await?;
    let failed = &blueprint.payouts[2];
    assert!(!failed.is_valid);
    assert_eq!(failed.invalid_reason, Some(InvalidReason::FailedToEstimateTxCosts));
    assert_eq!(failed.note, "script_rejected");
    assert_eq!(blueprint.valid_payouts().count(), 5);

    // One batch request, then every transfer on its own.
    assert_eq!(harness.collector.simulation_sizes(), vec![6, 1, 1, 1, 1, 1, 1]);
    Ok(())
}

#[tokio::test]
async fn test_allocation_fee_paid_by_recipient_unless_baker_pays() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));
    harness.collector.mark_unallocated(&address(DELEGATORS[0]));
    let blueprint = harness.generate(CYCLE).await?;
    assert_eq!(blueprint.payouts[0].amount, Mutez::from(3_621_475 - 64_250));

    let mut configuration = fixtures::configuration();
    configuration.payout.baker_pays_allocation_fee = true;
    configuration.payout.baker_pays_transaction_fee = true;
    let harness = Harness::new(configuration);
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));
    harness.collector.mark_unallocated(&address(DELEGATORS[0]));
    let blueprint = harness.generate(CYCLE).await?;
    assert_eq!(blueprint.payouts[0].amount, Mutez::from(3_621_875));
    Ok(())
}

#[tokio::test]
async fn test_minimum_payout_amount() -> anyhow::Result<()> {
    let mut configuration = fixtures::configuration();
    configuration.payout.minimum_payout_amount = Mutez::from(5_000_000);
    let harness = Harness::new(configuration);
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));

    let blueprint = harness.generate(CYCLE).await?;
    assert_eq!(blueprint.valid_payouts().count(), 0);
    assert!(blueprint
        .payouts
        .iter()
        .all(|p| p.invalid_reason == Some(InvalidReason::PayoutBelowMinimum)));
    assert_eq!(blueprint.summary.bond_income, Mutez::from(61_000_000));
    Ok(())
}

#[tokio::test]
async fn test_income_recipients_and_donations() -> anyhow::Result<()> {
    let mut configuration = fixtures::configuration();
    let recipients = &mut configuration.income_recipients;
    recipients.bonds = BTreeMap::from([
        (address(INCOME_RECIPIENTS[0]), 0.7),
        (address(INCOME_RECIPIENTS[1]), 0.3),
    ]);
    recipients.fees = BTreeMap::from([(address(INCOME_RECIPIENTS[0]), 1.0)]);
    recipients.donate = 0.1;
    recipients.donations = BTreeMap::from([(address(INCOME_RECIPIENTS[2]), 1.0)]);
    let harness = Harness::new(configuration);
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));

    let blueprint = harness.generate(CYCLE).await?;
    let summary = &blueprint.summary;
    assert_eq!(summary.donated_bonds, Mutez::from(3_812_500));
    assert_eq!(summary.donated_fees, Mutez::from(114_375));
    assert_eq!(summary.bond_income, Mutez::from(34_312_500));
    assert_eq!(summary.fee_income, Mutez::from(1_029_375));

    let income: Vec<(PayoutKind, String, Mutez)> = blueprint
        .payouts
        .iter()
        .filter(|p| p.kind.is_income())
        .map(|p| (p.kind, p.recipient.to_string(), p.amount))
        .collect();
    let expected = |kind: PayoutKind, recipient: &str, amount: u64| {
        (kind, recipient.to_string(), Mutez::from(amount))
    };
    assert_eq!(
        income,
        vec![
            expected(PayoutKind::BakerRewardIncome, INCOME_RECIPIENTS[0], 24_018_350),
            expected(PayoutKind::BakerRewardIncome, INCOME_RECIPIENTS[1], 10_293_350),
            expected(PayoutKind::FeeIncome, INCOME_RECIPIENTS[0], 1_028_975),
            expected(PayoutKind::Donation, INCOME_RECIPIENTS[2], 3_926_475),
        ]
    );
    assert!(blueprint.payouts.iter().all(|p| p.is_valid));
    Ok(())
}

#[tokio::test]
async fn test_insufficient_balance_fails_generation() {
    let harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));
    harness.collector.set_balance(&harness.signer.pkh(), Mutez::from(1_000));

    let result = harness.generate(CYCLE).await;
    match result {
        Err(PayoutError::InsufficientBalance { required, available }) => {
            assert_eq!(required, Mutez::from(61_006_000));
            assert_eq!(available, Mutez::from(1_000));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_sufficient_balance() -> anyhow::Result<()> {
    let mut configuration = fixtures::configuration();
    configuration.payout.wait_for_sufficient_balance = true;
    let harness = Harness::new(configuration);
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));
    let wallet = harness.signer.pkh();
    harness.collector.set_balance(&wallet, Mutez::ZERO);

    let collector = harness.collector.clone();
    let refill = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(12 * 60)).await;
        collector.set_balance(&wallet, Mutez::from(100_000_000));
    });

    let blueprint = harness.generate(CYCLE).await?;
    refill.await?;
    assert_eq!(blueprint.valid_payouts().count(), 6);
    let messages = harness.notificator.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Insufficient balance"), "{}", messages[0]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_admin_is_reminded_while_waiting_for_balance() -> anyhow::Result<()> {
    let mut configuration = fixtures::configuration();
    configuration.payout.wait_for_sufficient_balance = true;
    let harness = Harness::new(configuration);
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));
    let wallet = harness.signer.pkh();
    harness.collector.set_balance(&wallet, Mutez::ZERO);

    // Refilled between the 14th and 15th check, five minutes apart.
    let collector = harness.collector.clone();
    let refill = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(13 * 5 * 60 + 150)).await;
        collector.set_balance(&wallet, Mutez::from(100_000_000));
    });

    let blueprint = harness.generate(CYCLE).await?;
    refill.await?;
    assert_eq!(blueprint.valid_payouts().count(), 6);
    // Notified on the first check and again twelve checks later.
    let messages = harness.notificator.messages();
    assert_eq!(messages.len(), 2, "{messages:?}");
    assert!(messages.iter().all(|m| m.contains("Waiting for a refill")));
    Ok(())
}

#[tokio::test]
async fn test_missing_cycle_data_is_a_collector_error() {
    let harness = Harness::with_defaults();
    let result = harness.generate(CYCLE).await;
    assert!(matches!(result, Err(PayoutError::Collector(_))), "{result:?}");
}

#[tokio::test]
async fn test_blueprint_survives_a_round_trip_through_disk() -> anyhow::Result<()> {
    let harness = Harness::with_defaults();
    harness.collector.add_cycle(uniform_cycle_facts(CYCLE, BALANCE));
    let blueprint = harness.generate(CYCLE).await?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("blueprint-500.json");
    blueprint.save(&path)?;
    let loaded = CyclePayoutBlueprint::load(&path).await?;
    assert_eq!(loaded, blueprint);
    Ok(())
}
