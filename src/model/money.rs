// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Money.
//!
//! Amounts are kept as integer cents. Decimal input is rounded half-up
//! (away from zero on ties) to two places.
//!

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Amount of money in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Parse a decimal amount, rounding half-up to cents.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - the text is not a decimal number
    ///
    pub fn parse(text: &str) -> Result<Self, Error> {
        parse_scaled(text, 2, Rounding::HalfUp).map(Money)
    }

    /// Parse a decimal amount, dropping fractions of a cent.
    pub fn parse_floor(text: &str) -> Result<Self, Error> {
        parse_scaled(text, 2, Rounding::Down).map(Money)
    }

    /// Decimal representation without currency symbol, e.g. `19.99`.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{}{}.{:02}", sign, abs / 100, abs % 100)
    }

    /// Sum, or `None` when it leaves the representable range.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Multiply by an integer factor.
    pub fn times(self, factor: i64) -> Self {
        Self(self.0 * factor)
    }

    /// Divide by an integer, rounding half-up.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - the divisor is zero
    ///
    pub fn divided_by(self, divisor: i64) -> Result<Self, Error> {
        if divisor == 0 {
            return Err(Error::BadRequest("Division by zero".to_owned()));
        }
        let negative = (self.0 < 0) != (divisor < 0);
        let (num, den) = (self.0.unsigned_abs() as i128, divisor.unsigned_abs() as i128);
        let quotient = ((2 * num + den) / (2 * den)) as i64;
        Ok(Self(if negative { -quotient } else { quotient }))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.unsigned_abs();
        if self.0 < 0 {
            write!(f, "-${}.{:02}", abs / 100, abs % 100)
        } else {
            write!(f, "${}.{:02}", abs / 100, abs % 100)
        }
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = DecimalText::deserialize(deserializer)?;
        Money::parse(&text.0).map_err(de::Error::custom)
    }
}

/// Price multiplier applied to carrier rates, in hundredths (1.00 to 1.99).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Multiplier(i64);

impl Multiplier {
    pub const MIN: i64 = 100;
    pub const MAX: i64 = 199;
    pub const ONE: Multiplier = Multiplier(100);

    /// Build a multiplier from hundredths.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - outside 1.00 to 1.99
    ///
    pub fn from_hundredths(hundredths: i64) -> Result<Self, Error> {
        if !(Self::MIN..=Self::MAX).contains(&hundredths) {
            return Err(Error::BadRequest(
                "Multiplier must be between 1.00 and 1.99".to_owned(),
            ));
        }
        Ok(Self(hundredths))
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let hundredths = parse_scaled(text, 2, Rounding::HalfUp).map_err(|_| {
            Error::BadRequest("Multiplier must be between 1.00 and 1.99".to_owned())
        })?;
        Self::from_hundredths(hundredths)
    }

    pub fn hundredths(&self) -> i64 {
        self.0
    }

    /// Apply the multiplier to an amount, rounding half-up to cents.
    ///
    /// # Errors
    ///
    /// * `Error::NegativeAmount` - the amount is negative
    ///
    pub fn apply(&self, value: Money) -> Result<Money, Error> {
        if value.is_negative() {
            return Err(Error::NegativeAmount(value));
        }
        let scaled = value.cents() as i128 * self.0 as i128;
        let result = Money::from_cents(((scaled + 50) / 100) as i64);
        log::debug!("apply multiplier init_value={} new_value={}", value, result);
        Ok(result)
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = DecimalText::deserialize(deserializer)?;
        Multiplier::parse(&text.0).map_err(de::Error::custom)
    }
}

/// Decimal number taken verbatim from a JSON number or string.
#[derive(Debug, Clone, PartialEq)]
pub struct DecimalText(pub String);

impl<'de> Deserialize<'de> for DecimalText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = DecimalText;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal number or string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<DecimalText, E> {
                Ok(DecimalText(v.trim().to_owned()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<DecimalText, E> {
                Ok(DecimalText(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<DecimalText, E> {
                Ok(DecimalText(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<DecimalText, E> {
                Ok(DecimalText(v.to_string()))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

#[derive(Clone, Copy)]
enum Rounding {
    HalfUp,
    Down,
}

/// Parse decimal text into an integer scaled by `10^scale`.
fn parse_scaled(text: &str, scale: u32, rounding: Rounding) -> Result<i64, Error> {
    let invalid = || Error::BadRequest(format!("Invalid amount: {}", text));
    let text = text.trim();
    if text.contains(['e', 'E']) {
        let value: f64 = text.parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }
        return parse_scaled(&format!("{:.6}", value), scale, rounding);
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let int_value: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| invalid())?
    };
    let mut frac_value: i64 = 0;
    for i in 0..scale as usize {
        let digit = frac_part.as_bytes().get(i).map(|b| (b - b'0') as i64).unwrap_or(0);
        frac_value = frac_value * 10 + digit;
    }
    let round_up = match rounding {
        Rounding::HalfUp => frac_part
            .as_bytes()
            .get(scale as usize)
            .map(|b| *b >= b'5')
            .unwrap_or(false),
        Rounding::Down => false,
    };
    let magnitude = int_value
        .checked_mul(10_i64.pow(scale))
        .and_then(|v| v.checked_add(frac_value + round_up as i64))
        .ok_or_else(invalid)?;
    Ok(if negative { -magnitude } else { magnitude })
}
