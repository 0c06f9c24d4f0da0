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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ADDRESS_LENGTH: usize = 36;
const PAYLOAD_LENGTH: usize = 23;

/// Base58check prefixes of the supported account kinds.
const PREFIXES: [(&str, [u8; 3], AddressKind); 5] = [
    ("tz1", [6, 161, 159], AddressKind::Implicit),
    ("tz2", [6, 161, 161], AddressKind::Implicit),
    ("tz3", [6, 161, 164], AddressKind::Implicit),
    ("tz4", [6, 161, 166], AddressKind::Implicit),
    ("KT1", [2, 90, 121], AddressKind::Originated),
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("address {0:?} has invalid length")]
    InvalidLength(String),
    #[error("address {0:?} has an unsupported prefix")]
    UnsupportedPrefix(String),
    #[error("address {0:?} is not valid base58check")]
    InvalidEncoding(String),
}

/// Account kinds distinguished by the payout logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    /// A key-controlled account (`tz1`, `tz2`, `tz3`, `tz4`).
    Implicit,
    /// A smart contract (`KT1`). Transfers to it are contract calls.
    Originated,
}

/// A validated base58check account address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(value: &str) -> Result<Self, AddressError> {
        if value.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength(value.to_string()));
        }
        let (_, prefix_bytes, _) = PREFIXES
            .iter()
            .find(|(prefix, _, _)| value.starts_with(prefix))
            .ok_or_else(|| AddressError::UnsupportedPrefix(value.to_string()))?;
        let payload = bs58::decode(value)
            .with_check(None)
            .into_vec()
            .map_err(|_| AddressError::InvalidEncoding(value.to_string()))?;
        if payload.len() != PAYLOAD_LENGTH || payload[..3] != prefix_bytes[..] {
            return Err(AddressError::InvalidEncoding(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn kind(&self) -> AddressKind {
        PREFIXES
            .iter()
            .find(|(prefix, _, _)| self.0.starts_with(prefix))
            .map(|(_, _, kind)| *kind)
            .unwrap_or(AddressKind::Implicit)
    }

    pub fn is_originated(&self) -> bool {
        self.kind() == AddressKind::Originated
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
