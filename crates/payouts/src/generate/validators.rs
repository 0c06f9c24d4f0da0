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

//! Ordered validator chain classifying a delegator as payable or not.

use super::PayoutCandidate;
use crate::{
    config::PayoutConfiguration,
    model::InvalidReason,
};

pub struct ValidationContext<'a> {
    pub configuration: &'a PayoutConfiguration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(InvalidReason),
}

pub trait CandidateValidator: Send + Sync {
    fn validate(&self, candidate: &PayoutCandidate, ctx: &ValidationContext<'_>) -> Validation;
}

fn check(invalid: bool, reason: InvalidReason) -> Validation {
    if invalid {
        Validation::Invalid(reason)
    } else {
        Validation::Valid
    }
}

pub struct DelegatorIgnored;

impl CandidateValidator for DelegatorIgnored {
    fn validate(&self, candidate: &PayoutCandidate, ctx: &ValidationContext<'_>) -> Validation {
        check(
            ctx.configuration.is_ignored(candidate.delegator()),
            InvalidReason::DelegatorIgnored,
        )
    }
}

pub struct RecipientParsable;

impl CandidateValidator for RecipientParsable {
    fn validate(&self, candidate: &PayoutCandidate, _: &ValidationContext<'_>) -> Validation {
        check(candidate.unparsable_recipient().is_some(), InvalidReason::InvalidRecipient)
    }
}

pub struct MinimumBalance;

impl CandidateValidator for MinimumBalance {
    fn validate(&self, candidate: &PayoutCandidate, ctx: &ValidationContext<'_>) -> Validation {
        let minimum = ctx.configuration.minimum_balance_for(candidate.delegator());
        check(candidate.delegated_balance() < minimum, InvalidReason::LowBalance)
    }
}

pub struct KtIgnored;

impl CandidateValidator for KtIgnored {
    fn validate(&self, candidate: &PayoutCandidate, ctx: &ValidationContext<'_>) -> Validation {
        check(
            ctx.configuration.payout.ignore_kt && candidate.delegator().is_originated(),
            InvalidReason::KtIgnored,
        )
    }
}

pub struct DelegatorEmptied;

impl CandidateValidator for DelegatorEmptied {
    fn validate(&self, candidate: &PayoutCandidate, ctx: &ValidationContext<'_>) -> Validation {
        check(
            ctx.configuration.payout.ignore_empty_accounts && candidate.is_emptied(),
            InvalidReason::DelegatorEmptied,
        )
    }
}

pub struct RecipientNotBaker;

impl CandidateValidator for RecipientNotBaker {
    fn validate(&self, candidate: &PayoutCandidate, ctx: &ValidationContext<'_>) -> Validation {
        check(
            candidate.recipient() == &ctx.configuration.baker,
            InvalidReason::RecipientTargetsBaker,
        )
    }
}

/// Validators in evaluation order. The first failing one determines the reason.
pub const CANDIDATE_VALIDATORS: &[&dyn CandidateValidator] = &[
    &DelegatorIgnored,
    &RecipientParsable,
    &MinimumBalance,
    &KtIgnored,
    &DelegatorEmptied,
    &RecipientNotBaker,
];

/// Run the validator chain, returning the reason of the first failing validator.
pub fn validate_candidate(
    candidate: &PayoutCandidate,
    ctx: &ValidationContext<'_>,
) -> Option<InvalidReason> {
    CANDIDATE_VALIDATORS.iter().find_map(|validator| match validator.validate(candidate, ctx) {
        Validation::Valid => None,
        Validation::Invalid(reason) => Some(reason),
    })
}
