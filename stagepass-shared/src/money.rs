use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

/// An amount in minor currency units (cents).
///
/// All arithmetic happens on the integer value. The services speak decimal
/// numbers, so conversion only happens in [`decimal`] at the wire boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole currency units, e.g. `Money::from_units(50)` is 50.00
    pub const fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    /// Convert a decimal wire amount, rounding half away from zero to the cent.
    pub fn from_decimal(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn to_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Line total for `quantity` units at this price.
    pub fn times(&self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

/// Serde adapter for fields the services encode as decimal numbers
/// (`"total_price": 100.5`).
pub mod decimal {
    use super::Money;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Money, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_decimal())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Money, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = f64::deserialize(deserializer)?;
        Money::from_decimal(raw).ok_or_else(|| de::Error::custom(format!("invalid amount: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Priced {
        #[serde(with = "decimal")]
        price: Money,
    }

    #[test]
    fn test_display_two_decimals() {
        assert_eq!(Money::from_cents(10050).to_string(), "100.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn test_sum_has_no_float_drift() {
        // 0.1 + 0.2 style inputs stay exact once in cents
        let prices = vec![Money::from_decimal(0.1).unwrap(), Money::from_decimal(0.2).unwrap()];
        let total: Money = prices.iter().sum();
        assert_eq!(total, Money::from_cents(30));

        let many: Money = std::iter::repeat(Money::from_decimal(19.99).unwrap()).take(1000).sum();
        assert_eq!(many.cents(), 1_999_000);
    }

    #[test]
    fn test_decimal_wire_format() {
        let parsed: Priced = serde_json::from_str(r#"{"price": 49.99}"#).unwrap();
        assert_eq!(parsed.price, Money::from_cents(4999));

        let json = serde_json::to_string(&Priced { price: Money::from_units(100) }).unwrap();
        assert_eq!(json, r#"{"price":100.0}"#);
    }

    #[test]
    fn test_times() {
        assert_eq!(Money::from_units(50).times(2), Money::from_units(100));
        assert_eq!(Money::from_cents(333).times(3).to_string(), "9.99");
    }
}
