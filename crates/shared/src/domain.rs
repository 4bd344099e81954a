use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Fixed-point precision of every asset handled by the batch workflow.
pub const AMOUNT_DECIMALS: u32 = 18;
const BASE_UNITS_PER_WHOLE: u128 = 10u128.pow(AMOUNT_DECIMALS);

pub const ADDRESS_BYTES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount contains invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("amount has more than {max} fractional digits")]
    TooManyDecimals { max: u32 },
    #[error("amount does not fit in base units")]
    Overflow,
}

/// An asset amount held as an integer count of base units (18 decimals).
///
/// All arithmetic and comparisons go through the integer representation.
/// On the wire the base-unit integer is written as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub const fn base_units(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Sums amounts, returning `None` instead of wrapping on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Amount>
    where
        I: IntoIterator<Item = Amount>,
    {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Converts human decimal text (e.g. `"1.5"`) into base units.
    pub fn parse_decimal(raw: &str) -> Result<Self, AmountError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AmountError::Empty);
        }

        let (whole, fraction) = match raw.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (raw, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountError::Empty);
        }
        if let Some(bad) = whole
            .chars()
            .chain(fraction.chars())
            .find(|c| !c.is_ascii_digit())
        {
            return Err(AmountError::InvalidCharacter(bad));
        }

        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountError::TooManyDecimals {
                max: AMOUNT_DECIMALS,
            });
        }

        let whole_units = parse_digits(whole)?
            .checked_mul(BASE_UNITS_PER_WHOLE)
            .ok_or(AmountError::Overflow)?;
        let fraction_units = parse_digits(fraction)?
            .checked_mul(10u128.pow(AMOUNT_DECIMALS - fraction.len() as u32))
            .ok_or(AmountError::Overflow)?;

        whole_units
            .checked_add(fraction_units)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    /// Exact decimal rendering; always carries at least one fractional digit.
    pub fn to_decimal_string(self) -> String {
        let whole = self.0 / BASE_UNITS_PER_WHOLE;
        let fraction = self.0 % BASE_UNITS_PER_WHOLE;
        let fraction = format!("{fraction:0width$}", width = AMOUNT_DECIMALS as usize);
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            format!("{whole}.0")
        } else {
            format!("{whole}.{fraction}")
        }
    }

    /// Splits into `parts` equal shares; the remainder lands on the last share.
    pub fn split_evenly(self, parts: usize) -> Vec<Amount> {
        if parts == 0 {
            return Vec::new();
        }
        let share = self.0 / parts as u128;
        let remainder = self.0 % parts as u128;
        let mut shares = vec![Amount(share); parts];
        if let Some(last) = shares.last_mut() {
            last.0 += remainder;
        }
        shares
    }
}

fn parse_digits(digits: &str) -> Result<u128, AmountError> {
    digits.bytes().try_fold(0u128, |acc, b| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(u128::from(b - b'0')))
            .ok_or(AmountError::Overflow)
    })
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BaseUnitsVisitor;

        impl<'de> de::Visitor<'de> for BaseUnitsVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a base-unit integer as a decimal string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
                value
                    .parse::<u128>()
                    .map(Amount)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
                Ok(Amount(u128::from(value)))
            }
        }

        deserializer.deserialize_any(BaseUnitsVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must have 40 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("address contains non-hex characters")]
    InvalidHex,
}

/// A 20-byte account address, written as `0x` followed by 40 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_BYTES]);

impl Address {
    pub const fn from_bytes(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }

    /// `0x1234...abcd` form for compact listings.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if digits.len() != ADDRESS_BYTES * 2 {
            return Err(AddressError::InvalidLength(digits.len()));
        }
        let mut bytes = [0u8; ADDRESS_BYTES];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| AddressError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approve,
    Warn,
    Block,
}
