//! The per-country partial aggregate.
//!
//! `CountryRevenue` is a commutative monoid under component-wise addition
//! with identity `(0.0, 0)`. It is the mapper's output value, the
//! combiner's state and the reducer's output, and crosses the shuffle in
//! a fixed 16-byte big-endian encoding.

use anyhow::{bail, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::iter::Sum;

/// Encoded size of a [`CountryRevenue`]: an `f64` followed by an `i64`.
pub const WIRE_LEN: usize = 16;

/// Revenue and transaction count accumulated for one country.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CountryRevenue {
    total_revenue: f64,
    transaction_count: i64,
}

impl CountryRevenue {
    pub fn new(total_revenue: f64, transaction_count: i64) -> Self {
        Self {
            total_revenue,
            transaction_count,
        }
    }

    /// The identity element.
    pub fn zero() -> Self {
        Self::default()
    }

    /// The aggregate of a single transaction line.
    pub fn single(revenue: f64) -> Self {
        Self::new(revenue, 1)
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            total_revenue: self.total_revenue + other.total_revenue,
            transaction_count: self.transaction_count + other.transaction_count,
        }
    }

    pub fn total_revenue(&self) -> f64 {
        self.total_revenue
    }

    pub fn transaction_count(&self) -> i64 {
        self.transaction_count
    }

    /// Mean revenue per transaction line, `0.0` when there are none.
    pub fn mean(&self) -> f64 {
        if self.transaction_count > 0 {
            self.total_revenue / self.transaction_count as f64
        } else {
            0.0
        }
    }

    /// Total revenue in whole cents, truncated toward zero.
    ///
    /// Truncation works on the shortest decimal form of the revenue, so
    /// `40.8` counts as 4080 cents although `40.8 * 100.0` is just below
    /// 4080. Saturates at the `i64` range.
    pub fn revenue_cents(&self) -> i64 {
        if self.total_revenue.is_nan() {
            return 0;
        }
        if self.total_revenue.is_infinite() {
            return if self.total_revenue > 0.0 { i64::MAX } else { i64::MIN };
        }

        let (digits, _) = hundredths(self.total_revenue);
        let magnitude = digits.iter().try_fold(0i64, |acc, d| {
            acc.checked_mul(10)?.checked_add(i64::from(d - b'0'))
        });
        match (magnitude, self.total_revenue.is_sign_negative()) {
            (Some(cents), false) => cents,
            (Some(cents), true) => -cents,
            (None, false) => i64::MAX,
            (None, true) => i64::MIN,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(WIRE_LEN);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_f64(self.total_revenue);
        buf.put_i64(self.transaction_count);
    }

    pub fn decode(mut buf: impl Buf) -> Result<Self> {
        if buf.remaining() != WIRE_LEN {
            bail!(
                "corrupt partial aggregate: expected {} bytes, got {}",
                WIRE_LEN,
                buf.remaining()
            );
        }
        let total_revenue = buf.get_f64();
        let transaction_count = buf.get_i64();
        Ok(Self {
            total_revenue,
            transaction_count,
        })
    }
}

impl Sum for CountryRevenue {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Self::merge)
    }
}

/// `<revenue>\t<count>\t<mean>`, both reals with two decimals rounded half-up.
impl fmt::Display for CountryRevenue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}",
            format_fixed2(self.total_revenue),
            self.transaction_count,
            format_fixed2(self.mean())
        )
    }
}

/// Formats `value` with exactly two fractional digits.
///
/// Rounding is half-up (away from zero) on the shortest decimal
/// representation of `value`, so `1.005` gives `1.01` and `0.125` gives
/// `0.13`.
pub fn format_fixed2(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let (mut digits, next) = hundredths(value);
    if next >= b'5' {
        let mut carry = true;
        for d in digits.iter_mut().rev() {
            if *d == b'9' {
                *d = b'0';
            } else {
                *d += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
    }

    let split = digits.len() - 2;
    let mut out = String::with_capacity(digits.len() + 2);
    if value.is_sign_negative() {
        out.push('-');
    }
    // All bytes are ASCII digits.
    out.extend(digits[..split].iter().map(|d| *d as char));
    out.push('.');
    out.extend(digits[split..].iter().map(|d| *d as char));
    out
}

/// Digits of `|value|` up to and including the hundredths, taken from its
/// shortest decimal form, and the thousandths digit that follows them.
fn hundredths(value: f64) -> (Vec<u8>, u8) {
    // Display for f64 is the shortest round-trip form and never uses an exponent.
    let shortest = value.abs().to_string();
    let (int_part, frac_part) = shortest.split_once('.').unwrap_or((&shortest, ""));
    let frac = frac_part.as_bytes();

    let mut digits: Vec<u8> = int_part.bytes().collect();
    digits.push(frac.first().copied().unwrap_or(b'0'));
    digits.push(frac.get(1).copied().unwrap_or(b'0'));
    (digits, frac.get(2).copied().unwrap_or(b'0'))
}
