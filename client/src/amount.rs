//! Fixed-point token amounts.
//!
//! Amounts cross the backend boundary as 256-bit integers scaled by 10^18. Human-readable
//! decimal strings only exist at the outer edge: `parse_decimal` when an intent comes in,
//! `Display` when a view goes out.

use crate::error::{GovernanceError, Result};
use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Fractional decimal digits carried by every governance token
pub const DECIMALS: usize = 18;

fn scale() -> U256 {
    U256::from(1_000_000_000_000_000_000u128)
}

/// A token amount in base units (10^-18 of a whole token)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(U256);

impl TokenAmount {
    /// The zero amount
    pub const ZERO: Self = Self(U256::ZERO);

    /// Wrap a raw base-unit value
    pub fn from_base_units(units: U256) -> Self {
        Self(units)
    }

    /// Amount of `tokens` whole tokens
    pub fn from_tokens(tokens: u64) -> Self {
        Self(U256::from(tokens) * scale())
    }

    /// Raw base-unit value
    pub fn base_units(&self) -> U256 {
        self.0
    }

    /// Whether the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse a human-readable decimal string such as `"1000000"` or `"0.25"`.
    pub fn parse_decimal(input: &str) -> Result<Self> {
        let text = input.trim();
        let invalid = || GovernanceError::Validation(format!("invalid amount: {:?}", input));

        let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac.len() > DECIMALS {
            return Err(GovernanceError::Validation(format!(
                "amount {:?} has more than {} fractional digits",
                input, DECIMALS
            )));
        }

        let whole_units = if whole.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(whole, 10).map_err(|_| invalid())?
        };
        let frac_units = if frac.is_empty() {
            U256::ZERO
        } else {
            let padded = format!("{:0<width$}", frac, width = DECIMALS);
            U256::from_str_radix(&padded, 10).map_err(|_| invalid())?
        };

        whole_units
            .checked_mul(scale())
            .and_then(|units| units.checked_add(frac_units))
            .map(Self)
            .ok_or_else(|| GovernanceError::Validation(format!("amount {:?} overflows", input)))
    }

    /// Parse a strictly positive decimal amount
    pub fn parse_positive(input: &str) -> Result<Self> {
        let amount = Self::parse_decimal(input)?;
        if amount.is_zero() {
            return Err(GovernanceError::Validation(format!(
                "amount must be greater than 0, got {:?}",
                input
            )));
        }
        Ok(amount)
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Saturating addition, used when summing backend-reported weights
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Human-readable decimal rendering with trailing fractional zeros trimmed
    pub fn to_decimal_string(&self) -> String {
        let whole = self.0 / scale();
        let frac = self.0 % scale();
        if frac.is_zero() {
            return whole.to_string();
        }
        let digits = format!("{:0>width$}", frac.to_string(), width = DECIMALS);
        format!("{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl std::iter::Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireAmount {
    Text(String),
    Number(u64),
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match WireAmount::deserialize(deserializer)? {
            WireAmount::Number(n) => Ok(Self(U256::from(n))),
            WireAmount::Text(text) => {
                let parsed = match text.strip_prefix("0x") {
                    Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
                    None => U256::from_str_radix(&text, 10),
                };
                parsed.map(Self).map_err(|e| {
                    serde::de::Error::custom(format!("invalid base-unit amount {:?}: {}", text, e))
                })
            }
        }
    }
}
