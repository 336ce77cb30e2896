//! Lossless decimal numeric type backed by rust_decimal.
//!
//! All SOL- and USD-denominated amounts flow through this type; lamport
//! amounts are plain `u64` and cross over via the conversion helpers here.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lamports per SOL (the settlement asset's smallest unit).
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Lossless decimal numeric type for financial calculations.
///
/// Backed by rust_decimal to avoid floating-point drift.
/// Serializes to JSON number (not string) by default; persisted records
/// use canonical strings instead (see `domain::coerce`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    /// Create a Decimal from a RustDecimal.
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Format the Decimal as a canonical string (no exponent notation,
    /// no trailing zeros).
    pub fn to_canonical_string(&self) -> String {
        let normalized = self.0.normalize();
        format!("{}", normalized)
    }

    /// Get the underlying RustDecimal.
    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    /// The additive identity (0).
    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    /// The multiplicative identity (1).
    pub fn one() -> Self {
        Decimal(RustDecimal::ONE)
    }

    /// Returns true if the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// Largest integer less than or equal to the value.
    pub fn floor(&self) -> Self {
        Decimal(self.0.floor())
    }

    /// Smallest integer greater than or equal to the value.
    pub fn ceil(&self) -> Self {
        Decimal(self.0.ceil())
    }

    /// Smaller of the two values.
    pub fn min(self, other: Self) -> Self {
        if self < other {
            self
        } else {
            other
        }
    }

    /// Larger of the two values.
    pub fn max(self, other: Self) -> Self {
        if self > other {
            self
        } else {
            other
        }
    }

    /// Convert a SOL amount to lamports, rounding up.
    ///
    /// Used on charge paths so rounding never favors the debtor.
    /// Negative amounts convert to 0.
    pub fn to_lamports_ceil(&self) -> u64 {
        if self.is_negative() {
            return 0;
        }
        let scaled = self.0 * RustDecimal::from(LAMPORTS_PER_SOL);
        scaled.ceil().to_u64().unwrap_or(u64::MAX)
    }

    /// Convert a SOL amount to lamports, rounding down.
    ///
    /// Used on credit paths. Negative amounts convert to 0.
    pub fn to_lamports_floor(&self) -> u64 {
        if self.is_negative() {
            return 0;
        }
        let scaled = self.0 * RustDecimal::from(LAMPORTS_PER_SOL);
        scaled.floor().to_u64().unwrap_or(u64::MAX)
    }

    /// Convert a lamport amount to the exact SOL decimal.
    ///
    /// Division by 10^9 is exact in decimal arithmetic.
    pub fn from_lamports(lamports: u64) -> Self {
        Decimal(RustDecimal::from(lamports) / RustDecimal::from(LAMPORTS_PER_SOL))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

// Arithmetic operations
impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl std::iter::Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Decimal {
        iter.fold(Decimal::zero(), |acc, x| acc + x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_decimal_parse_roundtrip() {
        let test_cases = vec![
            "123.456",
            "0.0001",
            "1000000",
            "-123.456",
            "0",
            "999999999.999999999",
        ];

        for s in test_cases {
            let decimal = d(s);
            let formatted = decimal.to_canonical_string();
            let reparsed = d(&formatted);
            assert_eq!(decimal, reparsed, "roundtrip failed for {}", s);
        }
    }

    #[test]
    fn test_decimal_canonical_no_exponent() {
        let decimal = d("123");
        let formatted = decimal.to_canonical_string();
        assert!(
            !formatted.contains('e'),
            "formatted string should not contain exponent"
        );
        assert_eq!(formatted, "123");
    }

    #[test]
    fn test_decimal_arithmetic() {
        let a = d("10.5");
        let b = d("2.5");

        assert_eq!((a + b).to_canonical_string(), "13");
        assert_eq!((a - b).to_canonical_string(), "8");
        assert_eq!((a * b).to_canonical_string(), "26.25");
        assert_eq!((a / b).to_canonical_string(), "4.2");
    }

    #[test]
    fn test_decimal_json_serialization() {
        let decimal = d("123.456");
        let json = serde_json::to_value(decimal).unwrap();
        assert!(json.is_number());
        assert_eq!(json.to_string(), "123.456");
    }

    #[test]
    fn test_decimal_floor_ceil() {
        assert_eq!(d("1.2").floor(), d("1"));
        assert_eq!(d("1.2").ceil(), d("2"));
        assert_eq!(d("-1.2").floor(), d("-2"));
        assert_eq!(d("-1.2").ceil(), d("-1"));
        assert_eq!(d("5").floor(), d("5"));
        assert_eq!(d("5").ceil(), d("5"));
    }

    #[test]
    fn test_decimal_min_max() {
        assert_eq!(d("1").min(d("2")), d("1"));
        assert_eq!(d("1").max(d("2")), d("2"));
        assert_eq!(d("-3").min(d("0")), d("-3"));
    }

    #[test]
    fn test_lamports_ceil_rounds_up() {
        // 0.0000000011 SOL is 1.1 lamports; charging rounds up to 2.
        assert_eq!(d("0.0000000011").to_lamports_ceil(), 2);
        assert_eq!(d("1").to_lamports_ceil(), 1_000_000_000);
        assert_eq!(d("0").to_lamports_ceil(), 0);
    }

    #[test]
    fn test_lamports_floor_rounds_down() {
        assert_eq!(d("0.0000000019").to_lamports_floor(), 1);
        assert_eq!(d("58.5").to_lamports_floor(), 58_500_000_000);
    }

    #[test]
    fn test_lamports_negative_clamps_to_zero() {
        assert_eq!(d("-1").to_lamports_ceil(), 0);
        assert_eq!(d("-1").to_lamports_floor(), 0);
    }

    #[test]
    fn test_from_lamports_exact() {
        assert_eq!(Decimal::from_lamports(1), d("0.000000001"));
        assert_eq!(Decimal::from_lamports(58_500_000_000), d("58.5"));
        assert_eq!(Decimal::from_lamports(0), Decimal::zero());
    }

    #[test]
    fn test_lamports_roundtrip_exact() {
        for lamports in [0u64, 1, 999, 1_000_000_000, 58_500_000_000] {
            let sol = Decimal::from_lamports(lamports);
            assert_eq!(sol.to_lamports_floor(), lamports);
            assert_eq!(sol.to_lamports_ceil(), lamports);
        }
    }

    #[test]
    fn test_decimal_sum() {
        let total: Decimal = [d("1.5"), d("2.5"), d("3")].into_iter().sum();
        assert_eq!(total, d("7"));
    }

    #[test]
    fn test_decimal_ordering() {
        let a = d("10");
        let b = d("20");
        assert!(a < b);
        assert!(b > a);
        assert_eq!(a, a);
    }
}
