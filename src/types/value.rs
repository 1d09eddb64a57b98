//! Host-native decoded values (spec §4.4 "Logical-type mapping").

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

/// A signed year-month interval (`interval year to month`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalYearMonth {
    /// Whole years component (carries the interval's sign).
    pub years: i32,
    /// Whole months component (carries the interval's sign).
    pub months: i32,
}

/// A signed day-time interval (`interval day to second`), stored as a
/// `chrono::Duration` which already supports negative magnitudes.
pub type IntervalDaySecond = chrono::Duration;

/// An arbitrary-precision decimal with an explicit sign, preserving `-0.x`
/// (spec §4.4: "preserves `-0.x`" — a detail a plain `f64` or a
/// sign-normalizing bignum cannot represent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    /// Sign of the value, tracked independently of magnitude so `-0.5` and
    /// `0.5` remain distinguishable even when the unscaled digits are equal
    /// to zero.
    pub negative: bool,
    /// Unscaled magnitude digits (ASCII `0`-`9`, no sign, no leading `+`).
    pub digits: String,
    /// Number of digits after the decimal point.
    pub scale: u32,
}

impl Decimal {
    /// Parse a decimal literal as emitted on the wire, e.g. `"-0.50"` or
    /// `"123456789000.1234005"`.
    pub fn parse(raw: &str) -> crate::Result<Decimal> {
        let raw = raw.trim();
        let (negative, unsigned) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };

        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (unsigned, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(crate::Error::Decode {
                type_name: "decimal".to_string(),
                reason: format!("empty decimal literal: {raw:?}"),
            });
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(crate::Error::Decode {
                type_name: "decimal".to_string(),
                reason: format!("non-numeric decimal literal: {raw:?}"),
            });
        }

        let digits = format!("{int_part}{frac_part}");
        let digits = if digits.is_empty() { "0".to_string() } else { digits };
        Ok(Decimal {
            negative,
            digits,
            scale: frac_part.len() as u32,
        })
    }

    /// Render as a canonical decimal string, preserving sign and scale
    /// (including `-0.x`).
    pub fn to_canonical_string(&self) -> String {
        let scale = self.scale as usize;
        let digits = &self.digits;
        let body = if scale == 0 {
            digits.clone()
        } else if digits.len() > scale {
            let split = digits.len() - scale;
            format!("{}.{}", &digits[..split], &digits[split..])
        } else {
            format!("0.{:0>width$}", digits, width = scale)
        };
        if self.negative {
            format!("-{body}")
        } else {
            body
        }
    }

    /// True if the magnitude is exactly zero (sign-independent).
    pub fn is_zero_magnitude(&self) -> bool {
        self.digits.bytes().all(|b| b == b'0')
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

/// A host-native decoded value (spec §4.4 mapping table).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// `bigint`
    BigInt(i64),
    /// `integer`
    Integer(i32),
    /// `smallint`
    SmallInt(i16),
    /// `tinyint`
    TinyInt(i8),
    /// `boolean`
    Boolean(bool),
    /// `double`; `NaN` is accepted as the literal string token `"NaN"` on
    /// the wire (spec §4.4, §8 property S6).
    Double(f64),
    /// `real`
    Real(f32),
    /// `decimal(p,s)`
    Decimal(Decimal),
    /// `date`
    Date(NaiveDate),
    /// `time`
    Time(NaiveTime),
    /// `time with time zone`; passed through verbatim (spec: "no host
    /// equivalent mandated").
    TimeWithTimeZone(String),
    /// `timestamp`
    Timestamp(NaiveDateTime),
    /// `timestamp with time zone`
    TimestampWithTimeZone(DateTime<FixedOffset>),
    /// `varchar`
    Varchar(String),
    /// `char(n)`, trailing padding already stripped.
    Char(String),
    /// `uuid`
    Uuid(Uuid),
    /// `varbinary`
    Varbinary(Vec<u8>),
    /// `interval year to month`
    IntervalYearToMonth(IntervalYearMonth),
    /// `interval day to second`
    IntervalDayToSecond(IntervalDaySecond),
    /// `array(T)`
    Array(Vec<Value>),
    /// `map(K,V)`, stored as pairs since `Value` is not `Ord`/`Hash`.
    Map(Vec<(Value, Value)>),
    /// `row(...)`, decoded positionally.
    Row(Vec<Value>),
    /// `json`
    Json(serde_json::Value),
    /// `ipaddress`
    IpAddress(String),
}
