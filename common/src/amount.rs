//! Fixed-point integer arithmetic for shares, prices and USD values.
//!
//! Nothing in this module ever touches a float. Every quantity is an integer in
//! the smallest unit of its asset, paired with an explicit `scale` (power of ten)
//! wherever the value isn't already expressed in the asset's native decimals.

use ethers::types::{I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An unsigned fixed-point quantity: shares, token balances, prices, USD values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(#[serde(with = "u256_decimal")] pub U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::zero());

    pub fn from_u64(v: u64) -> Self {
        Amount(U256::from(v))
    }

    /// `10^exp`, used throughout the snapshot engine to move a raw integer
    /// between a scale/decimals exponent and a plain quantity.
    pub fn pow10(exp: u8) -> Self {
        Amount(U256::from(10u64).pow(U256::from(exp)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// `self * numerator / denominator`, rounding down, using 512-bit
    /// intermediate precision via `full_mul`/`div_mod` so large PPS*price
    /// products never overflow 256 bits before the division collapses them
    /// back down.
    pub fn mul_div(&self, numerator: Amount, denominator: Amount) -> Option<Amount> {
        if denominator.0.is_zero() {
            return None;
        }
        let product = self.0.full_mul(numerator.0);
        let denom = ethers::types::U512::from(denominator.0);
        let (quotient, _) = product.div_mod(denom);
        if quotient > ethers::types::U512::from(U256::MAX) {
            return None;
        }
        Some(Amount(U256::try_from(quotient).ok()?))
    }

    pub fn to_i256(self) -> I256 {
        I256::from_raw(self.0)
    }

    /// Render as a decimal string scaled down by `10^scale` (for display/logging
    /// only — never for further arithmetic).
    pub fn as_decimal_string(&self, scale: u8) -> String {
        let divisor = U256::from(10u64).pow(U256::from(scale));
        let whole = self.0 / divisor;
        let frac = self.0 % divisor;
        if scale == 0 {
            whole.to_string()
        } else {
            format!(
                "{whole}.{frac:0width$}",
                frac = frac,
                width = scale as usize
            )
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<U256> for Amount {
    fn from(v: U256) -> Self {
        Amount(v)
    }
}

/// A signed fixed-point delta: `ShareEvent.shares_delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAmount(#[serde(with = "i256_decimal")] pub I256);

impl SignedAmount {
    pub const ZERO: SignedAmount = SignedAmount(I256::zero());

    pub fn positive(amount: Amount) -> Self {
        SignedAmount(amount.to_i256())
    }

    pub fn negative(amount: Amount) -> Self {
        SignedAmount(-amount.to_i256())
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Absolute value as an unsigned [`Amount`].
    pub fn unsigned_abs(&self) -> Amount {
        Amount(self.0.unsigned_abs())
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

mod u256_decimal {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &U256, s: S) -> Result<S::Ok, S::Error> {
        v.to_string().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(d)?;
        U256::from_dec_str(&raw).map_err(serde::de::Error::custom)
    }
}

mod i256_decimal {
    use ethers::types::I256;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(v: &I256, s: S) -> Result<S::Ok, S::Error> {
        v.to_string().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<I256, D::Error> {
        let raw = String::deserialize(d)?;
        I256::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_rounds_down() {
        let shares = Amount::from_u64(10);
        let pps = Amount::from_u64(3);
        let scale = Amount::from_u64(2);
        // 10 * 3 / 2 = 15, exact
        assert_eq!(shares.mul_div(pps, scale), Some(Amount::from_u64(15)));

        let shares = Amount::from_u64(7);
        let pps = Amount::from_u64(3);
        let scale = Amount::from_u64(2);
        // 7 * 3 / 2 = 10.5 -> floors to 10
        assert_eq!(shares.mul_div(pps, scale), Some(Amount::from_u64(10)));
    }

    #[test]
    fn mul_div_rejects_zero_denominator() {
        let a = Amount::from_u64(5);
        assert_eq!(a.mul_div(Amount::from_u64(1), Amount::ZERO), None);
    }

    #[test]
    fn signed_amount_abs() {
        let pos = SignedAmount::positive(Amount::from_u64(42));
        let neg = SignedAmount::negative(Amount::from_u64(42));
        assert_eq!(pos.unsigned_abs(), Amount::from_u64(42));
        assert_eq!(neg.unsigned_abs(), Amount::from_u64(42));
        assert!(neg.is_negative());
        assert!(!pos.is_negative());
    }

    proptest::proptest! {
        #[test]
        fn mul_div_never_exceeds_u256(a in 0u64..u64::MAX, b in 1u64..u64::MAX, c in 1u64..u64::MAX) {
            let amt = Amount::from_u64(a);
            let num = Amount::from_u64(b);
            let den = Amount::from_u64(c);
            // Should never panic; may legitimately overflow to None for huge inputs,
            // but u64 inputs always fit comfortably in U512 intermediate precision.
            let _ = amt.mul_div(num, den);
        }
    }
}
