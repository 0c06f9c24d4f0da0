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

use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign},
    str::FromStr,
};

use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::PORTION_BASIS_POINTS;

// Percentages come from configuration as floats; values like 0.0029 land just below their
// basis point after scaling, so flooring tolerates float representation error.
const BASIS_POINT_TOLERANCE: f64 = 1e-6;

/// An amount of mutez, the smallest unit of tez.
///
/// Backed by a [U256] so that intermediate products in the distribution math never overflow.
/// All operations floor; there is no signed variant, so subtractions are explicit about
/// what happens when the result would be negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mutez(U256);

impl Mutez {
    pub const ZERO: Self = Self(U256::ZERO);

    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_sub(self, other: Mutez) -> Option<Mutez> {
        self.0.checked_sub(other.0).map(Mutez)
    }

    pub fn saturating_sub(self, other: Mutez) -> Mutez {
        Mutez(self.0.saturating_sub(other.0))
    }

    pub fn mul_u64(self, factor: u64) -> Mutez {
        Mutez(self.0.saturating_mul(U256::from(factor)))
    }

    /// Integer division; dividing by zero yields zero.
    pub fn div_u64(self, divisor: u64) -> Mutez {
        if divisor == 0 {
            return Mutez::ZERO;
        }
        Mutez(self.0 / U256::from(divisor))
    }

    /// `self * numerator / denominator`, floored. Zero when the denominator is zero.
    pub fn mul_div(self, numerator: Mutez, denominator: Mutez) -> Mutez {
        if denominator.is_zero() {
            return Mutez::ZERO;
        }
        Mutez(self.0.saturating_mul(numerator.0) / denominator.0)
    }

    /// The given fraction of this amount.
    ///
    /// The percentage (a fraction in `[0, 1]`) is first floored to 4 decimal digits, the
    /// multiplication is floored, and the result is clamped so it never exceeds `self`.
    /// Non-finite and non-positive percentages yield zero.
    pub fn portion(self, percentage: f64) -> Mutez {
        if !percentage.is_finite() || percentage <= 0.0 {
            return Mutez::ZERO;
        }
        let scale = PORTION_BASIS_POINTS as f64;
        let basis_points = (percentage * scale + BASIS_POINT_TOLERANCE).floor().min(scale) as u64;
        let portion =
            self.0.saturating_mul(U256::from(basis_points)) / U256::from(PORTION_BASIS_POINTS);
        Mutez(portion.min(self.0))
    }
}

impl From<u64> for Mutez {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for Mutez {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl Add for Mutez {
    type Output = Mutez;

    fn add(self, rhs: Mutez) -> Mutez {
        Mutez(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Mutez {
    fn add_assign(&mut self, rhs: Mutez) {
        *self = *self + rhs;
    }
}

impl Sum for Mutez {
    fn sum<I: Iterator<Item = Mutez>>(iter: I) -> Mutez {
        iter.fold(Mutez::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Mutez> for Mutez {
    fn sum<I: Iterator<Item = &'a Mutez>>(iter: I) -> Mutez {
        iter.copied().sum()
    }
}

impl fmt::Display for Mutez {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Mutez {
    type Err = alloy_primitives::ruint::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str_radix(s.trim(), 10).map(Mutez)
    }
}

impl Serialize for Mutez {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Mutez {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MutezVisitor)
    }
}

struct MutezVisitor;

impl de::Visitor<'_> for MutezVisitor {
    type Value = Mutez;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer amount of mutez, as a number or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Mutez, E> {
        Ok(Mutez::from(value))
    }

    fn visit_u128<E: de::Error>(self, value: u128) -> Result<Mutez, E> {
        Ok(Mutez(U256::from(value)))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Mutez, E> {
        u64::try_from(value)
            .map(Mutez::from)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Mutez, E> {
        value.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}
