//! Decodes a JSON value against a resolved [`LogicalType`] (spec §4.4).

use std::sync::OnceLock;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use serde_json::Value as Json;
use uuid::Uuid;

use super::{Decimal, IntervalDaySecond, IntervalYearMonth, LogicalType, Value};
use crate::{Error, Result};

fn decode_err(type_name: impl Into<String>, reason: impl Into<String>) -> Error {
    Error::Decode {
        type_name: type_name.into(),
        reason: reason.into(),
    }
}

/// Decode a raw JSON value into its host-native representation.
pub fn decode_value(json: &Json, logical_type: &LogicalType) -> Result<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }

    match logical_type {
        LogicalType::BigInt => decode_i64(json).map(Value::BigInt),
        LogicalType::Integer => decode_i64(json).and_then(|v| {
            i32::try_from(v)
                .map(Value::Integer)
                .map_err(|_| decode_err("integer", format!("{v} out of range")))
        }),
        LogicalType::SmallInt => decode_i64(json).and_then(|v| {
            i16::try_from(v)
                .map(Value::SmallInt)
                .map_err(|_| decode_err("smallint", format!("{v} out of range")))
        }),
        LogicalType::TinyInt => decode_i64(json).and_then(|v| {
            i8::try_from(v)
                .map(Value::TinyInt)
                .map_err(|_| decode_err("tinyint", format!("{v} out of range")))
        }),
        LogicalType::Boolean => json
            .as_bool()
            .map(Value::Boolean)
            .ok_or_else(|| decode_err("boolean", format!("not a boolean: {json}"))),
        LogicalType::Double => decode_double(json).map(Value::Double),
        LogicalType::Real => decode_double(json).map(|v| Value::Real(v as f32)),
        LogicalType::Decimal { .. } => decode_decimal(json).map(Value::Decimal),
        LogicalType::Date => decode_date(json).map(Value::Date),
        LogicalType::Time { precision } => decode_time(json, *precision).map(Value::Time),
        LogicalType::TimeWithTimeZone { .. } => json
            .as_str()
            .map(|s| Value::TimeWithTimeZone(s.to_string()))
            .ok_or_else(|| decode_err("time with time zone", format!("not a string: {json}"))),
        LogicalType::Timestamp { precision } => {
            decode_timestamp(json, *precision).map(Value::Timestamp)
        }
        LogicalType::TimestampWithTimeZone { precision } => {
            decode_timestamp_with_time_zone(json, *precision).map(Value::TimestampWithTimeZone)
        }
        LogicalType::Varchar => json
            .as_str()
            .map(|s| Value::Varchar(s.to_string()))
            .ok_or_else(|| decode_err("varchar", format!("not a string: {json}"))),
        LogicalType::Char { length } => json
            .as_str()
            .map(|s| Value::Char(s.trim_end().chars().take(*length).collect()))
            .ok_or_else(|| decode_err("char", format!("not a string: {json}"))),
        LogicalType::Uuid => {
            let s = json
                .as_str()
                .ok_or_else(|| decode_err("uuid", format!("not a string: {json}")))?;
            Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|e| decode_err("uuid", e.to_string()))
        }
        LogicalType::Varbinary => {
            let s = json
                .as_str()
                .ok_or_else(|| decode_err("varbinary", format!("not a string: {json}")))?;
            base64_decode(s)
                .map(Value::Varbinary)
                .map_err(|e| decode_err("varbinary", e))
        }
        LogicalType::IntervalYearToMonth => {
            decode_interval_year_month(json).map(Value::IntervalYearToMonth)
        }
        LogicalType::IntervalDayToSecond => {
            decode_interval_day_second(json).map(Value::IntervalDayToSecond)
        }
        LogicalType::Array(element) => {
            let items = json
                .as_array()
                .ok_or_else(|| decode_err("array", format!("not an array: {json}")))?;
            items
                .iter()
                .map(|item| decode_value(item, element))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        LogicalType::Map(key_type, value_type) => {
            let object = json
                .as_object()
                .ok_or_else(|| decode_err("map", format!("not an object: {json}")))?;
            object
                .iter()
                .map(|(key, value)| {
                    let key = decode_value(&Json::String(key.clone()), key_type)?;
                    let value = decode_value(value, value_type)?;
                    Ok((key, value))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Map)
        }
        LogicalType::Row(fields) => {
            let items = json
                .as_array()
                .ok_or_else(|| decode_err("row", format!("not an array: {json}")))?;
            if items.len() != fields.len() {
                return Err(decode_err(
                    "row",
                    format!("expected {} fields, got {}", fields.len(), items.len()),
                ));
            }
            items
                .iter()
                .zip(fields)
                .map(|(item, (_, field_type))| decode_value(item, field_type))
                .collect::<Result<Vec<_>>>()
                .map(Value::Row)
        }
        LogicalType::Json => Ok(Value::Json(json.clone())),
        LogicalType::IpAddress => json
            .as_str()
            .map(|s| Value::IpAddress(s.to_string()))
            .ok_or_else(|| decode_err("ipaddress", format!("not a string: {json}"))),
    }
}

fn decode_i64(json: &Json) -> Result<i64> {
    json.as_i64()
        .or_else(|| json.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| decode_err("integer", format!("not an integer: {json}")))
}

fn decode_double(json: &Json) -> Result<f64> {
    // Spec §4.4: accept the literal string token "NaN" (also used for
    // stats.progressPercentage, spec §8 S6).
    if let Some(s) = json.as_str() {
        if s == "NaN" {
            return Ok(f64::NAN);
        }
        return s
            .parse()
            .map_err(|_| decode_err("double", format!("invalid numeric string: {s}")));
    }
    json.as_f64()
        .ok_or_else(|| decode_err("double", format!("not a number: {json}")))
}

fn decode_decimal(json: &Json) -> Result<Decimal> {
    let s = match json {
        Json::String(s) => s.clone(),
        Json::Number(n) => n.to_string(),
        other => return Err(decode_err("decimal", format!("not a number/string: {other}"))),
    };
    Decimal::parse(&s)
}

fn decode_date(json: &Json) -> Result<NaiveDate> {
    let s = json
        .as_str()
        .ok_or_else(|| decode_err("date", format!("not a string: {json}")))?;
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| decode_err("date", e.to_string()))
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<h>\d{2}):(?P<m>\d{2}):(?P<s>\d{2})(?:\.(?P<frac>\d{1,7}))?$")
            .expect("static regex is valid")
    })
}

fn decode_time(json: &Json, precision: Option<u32>) -> Result<NaiveTime> {
    let s = json
        .as_str()
        .ok_or_else(|| decode_err("time", format!("not a string: {json}")))?;
    let caps = time_regex()
        .captures(s)
        .ok_or_else(|| decode_err("time", format!("malformed time: {s}")))?;
    let hour: u32 = caps["h"].parse().expect("regex guarantees digits");
    let minute: u32 = caps["m"].parse().expect("regex guarantees digits");
    let second: u32 = caps["s"].parse().expect("regex guarantees digits");
    let nanos = caps
        .name("frac")
        .map(|m| fraction_to_nanos(m.as_str(), precision))
        .transpose()?
        .unwrap_or(0);
    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)
        .ok_or_else(|| decode_err("time", format!("out-of-range time: {s}")))
}

fn decode_timestamp(json: &Json, precision: Option<u32>) -> Result<NaiveDateTime> {
    let s = json
        .as_str()
        .ok_or_else(|| decode_err("timestamp", format!("not a string: {json}")))?;
    let (date_part, time_part) = s
        .split_once([' ', 'T'])
        .ok_or_else(|| decode_err("timestamp", format!("malformed timestamp: {s}")))?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| decode_err("timestamp", e.to_string()))?;
    let time = decode_time(&Json::String(time_part.to_string()), precision)?;
    Ok(NaiveDateTime::new(date, time))
}

fn timestamp_tz_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<date>\d{4}-\d{2}-\d{2})[ T](?P<h>\d{2}):(?P<m>\d{2}):(?P<s>\d{2})(?:\.(?P<frac>\d{1,7}))?\s+(?P<offset>UTC|[+-]\d{2}:\d{2})$",
        )
        .expect("static regex is valid")
    })
}

fn decode_timestamp_with_time_zone(
    json: &Json,
    precision: Option<u32>,
) -> Result<chrono::DateTime<FixedOffset>> {
    let s = json
        .as_str()
        .ok_or_else(|| decode_err("timestamp with time zone", format!("not a string: {json}")))?;
    let caps = timestamp_tz_regex().captures(s).ok_or_else(|| {
        decode_err(
            "timestamp with time zone",
            format!("malformed or over-precise (>7 fractional digits) timestamp: {s}"),
        )
    })?;

    let date = NaiveDate::parse_from_str(&caps["date"], "%Y-%m-%d")
        .map_err(|e| decode_err("timestamp with time zone", e.to_string()))?;
    let hour: u32 = caps["h"].parse().expect("regex guarantees digits");
    let minute: u32 = caps["m"].parse().expect("regex guarantees digits");
    let second: u32 = caps["s"].parse().expect("regex guarantees digits");
    let nanos = caps
        .name("frac")
        .map(|m| fraction_to_nanos(m.as_str(), precision))
        .transpose()?
        .unwrap_or(0);
    let naive_time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanos).ok_or_else(|| {
        decode_err("timestamp with time zone", format!("out-of-range time: {s}"))
    })?;
    let naive = NaiveDateTime::new(date, naive_time);

    let offset_str = &caps["offset"];
    let offset = if offset_str == "UTC" {
        FixedOffset::east_opt(0).expect("zero offset is always valid")
    } else {
        parse_fixed_offset(offset_str)?
    };

    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| decode_err("timestamp with time zone", format!("ambiguous local time: {s}")))
}

fn parse_fixed_offset(offset: &str) -> Result<FixedOffset> {
    if offset.len() < 2 {
        return Err(decode_err("timestamp with time zone", format!("bad offset: {offset}")));
    }
    let (sign, rest) = offset.split_at(1);
    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| decode_err("timestamp with time zone", format!("bad offset: {offset}")))?;
    let hours: i32 = hours
        .parse()
        .map_err(|_| decode_err("timestamp with time zone", format!("bad offset: {offset}")))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| decode_err("timestamp with time zone", format!("bad offset: {offset}")))?;
    let total_seconds = (hours * 3600 + minutes * 60) * if sign == "-" { -1 } else { 1 };
    FixedOffset::east_opt(total_seconds)
        .ok_or_else(|| decode_err("timestamp with time zone", format!("out-of-range offset: {offset}")))
}

/// Convert a fractional-second digit string (1-7 digits, already validated
/// by the caller's regex) into nanoseconds, rounding to `precision` digits
/// when one is declared (spec example: `.004567` at precision 3 rounds to
/// `.005`).
fn fraction_to_nanos(frac: &str, precision: Option<u32>) -> Result<u32> {
    if frac.len() > 7 {
        return Err(decode_err(
            "timestamp",
            format!("fractional seconds exceed 7 digits: {frac}"),
        ));
    }

    let Some(precision) = precision else {
        let padded = format!("{frac:0<9}");
        return padded[..9]
            .parse()
            .map_err(|_| decode_err("timestamp", format!("invalid fraction: {frac}")));
    };

    if precision as usize >= frac.len() {
        let padded = format!("{frac:0<9}");
        return padded[..9]
            .parse()
            .map_err(|_| decode_err("timestamp", format!("invalid fraction: {frac}")));
    }

    // Round the digit string down to `precision` digits, half-up, by
    // inspecting the first dropped digit.
    let keep = precision as usize;
    let kept: u64 = frac[..keep].parse().expect("digits validated by regex");
    let first_dropped = frac.as_bytes()[keep] - b'0';
    let rounded = if first_dropped >= 5 { kept + 1 } else { kept };
    // `rounded` may now have `keep + 1` digits (e.g. 999 -> 1000); that's
    // fine, it only means the fraction carried into a larger value that
    // still fits comfortably inside a second once scaled to nanoseconds
    // provided precision <= 8.
    let scale = 9u32.saturating_sub(precision);
    Ok((rounded * 10u64.pow(scale)) as u32)
}

fn decode_interval_year_month(json: &Json) -> Result<IntervalYearMonth> {
    // Wire form: "Y-M" optionally signed, e.g. "3-2" or "-1-6".
    let s = json.as_str().ok_or_else(|| {
        decode_err("interval year to month", format!("not a string: {json}"))
    })?;
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (years, months) = rest.split_once('-').ok_or_else(|| {
        decode_err("interval year to month", format!("malformed interval: {s}"))
    })?;
    let years: i32 = years
        .parse()
        .map_err(|_| decode_err("interval year to month", format!("malformed interval: {s}")))?;
    let months: i32 = months
        .parse()
        .map_err(|_| decode_err("interval year to month", format!("malformed interval: {s}")))?;
    let sign = if negative { -1 } else { 1 };
    Ok(IntervalYearMonth {
        years: sign * years,
        months: sign * months,
    })
}

fn interval_day_second_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<sign>-)?(?P<d>\d+) (?P<h>\d{2}):(?P<m>\d{2}):(?P<s>\d{2})(?:\.(?P<frac>\d{1,3}))?$")
            .expect("static regex is valid")
    })
}

fn decode_interval_day_second(json: &Json) -> Result<IntervalDaySecond> {
    let s = json.as_str().ok_or_else(|| {
        decode_err("interval day to second", format!("not a string: {json}"))
    })?;
    let caps = interval_day_second_regex()
        .captures(s)
        .ok_or_else(|| decode_err("interval day to second", format!("malformed interval: {s}")))?;
    let days: i64 = caps["d"].parse().expect("regex guarantees digits");
    let hours: i64 = caps["h"].parse().expect("regex guarantees digits");
    let minutes: i64 = caps["m"].parse().expect("regex guarantees digits");
    let seconds: i64 = caps["s"].parse().expect("regex guarantees digits");
    let millis: i64 = caps
        .name("frac")
        .map(|m| format!("{:0<3}", m.as_str())[..3].parse().unwrap_or(0))
        .unwrap_or(0);

    let magnitude = chrono::Duration::days(days)
        + chrono::Duration::hours(hours)
        + chrono::Duration::minutes(minutes)
        + chrono::Duration::seconds(seconds)
        + chrono::Duration::milliseconds(millis);

    Ok(if caps.name("sign").is_some() {
        -magnitude
    } else {
        magnitude
    })
}

fn base64_decode(s: &str) -> std::result::Result<Vec<u8>, String> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogicalType;

    #[test]
    fn decodes_bigint() {
        let v = decode_value(&serde_json::json!(1), &LogicalType::BigInt).unwrap();
        assert_eq!(v, Value::BigInt(1));
    }

    #[test]
    fn decodes_nan_progress_style_double() {
        let v = decode_value(&serde_json::json!("NaN"), &LogicalType::Double).unwrap();
        match v {
            Value::Double(d) => assert!(d.is_nan()),
            other => panic!("expected double, got {other:?}"),
        }
    }

    #[test]
    fn decodes_real_from_scientific_notation() {
        let v = decode_value(&serde_json::json!("3.402823466E+38"), &LogicalType::Real);
        // serde_json won't parse this as f64 directly from a string number
        // via as_f64, so the decoder falls back to str::parse.
        let v = v.unwrap();
        match v {
            Value::Real(f) => assert!((f - 3.402_823_5e38_f32).abs() < 1e31),
            other => panic!("expected real, got {other:?}"),
        }
    }

    #[test]
    fn decodes_decimal_overflowing_display() {
        let v = decode_value(
            &serde_json::json!("123456789000.1234005"),
            &LogicalType::Decimal {
                precision: 24,
                scale: 10,
            },
        )
        .unwrap();
        match v {
            Value::Decimal(d) => assert_eq!(d.to_canonical_string(), "123456789000.1234005"),
            other => panic!("expected decimal, got {other:?}"),
        }
    }

    #[test]
    fn decodes_char_truncates_to_declared_length() {
        let v = decode_value(
            &serde_json::json!("0123456789abc"),
            &LogicalType::Char { length: 10 },
        )
        .unwrap();
        assert_eq!(v, Value::Char("0123456789".to_string()));
    }

    #[test]
    fn decodes_char_strips_trailing_padding() {
        let v = decode_value(
            &serde_json::json!("ab        "),
            &LogicalType::Char { length: 10 },
        )
        .unwrap();
        assert_eq!(v, Value::Char("ab".to_string()));
    }

    #[test]
    fn timestamp_with_time_zone_rounds_to_declared_precision() {
        let v = decode_value(
            &serde_json::json!("2023-04-04 01:02:03.004567 UTC"),
            &LogicalType::TimestampWithTimeZone { precision: Some(3) },
        )
        .unwrap();
        match v {
            Value::TimestampWithTimeZone(dt) => {
                assert_eq!(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), "2023-04-04 01:02:03.005");
            }
            other => panic!("expected timestamptz, got {other:?}"),
        }
    }

    #[test]
    fn timestamp_with_time_zone_rejects_over_seven_fractional_digits() {
        let result = decode_value(
            &serde_json::json!("2023-04-04 01:02:03.12345678 UTC"),
            &LogicalType::TimestampWithTimeZone { precision: None },
        );
        assert!(result.is_err());
    }

    #[test]
    fn decodes_offset_timestamp() {
        let v = decode_value(
            &serde_json::json!("2024-01-01 00:00:00.000 +05:30"),
            &LogicalType::TimestampWithTimeZone { precision: None },
        )
        .unwrap();
        match v {
            Value::TimestampWithTimeZone(dt) => {
                assert_eq!(dt.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
            }
            other => panic!("expected timestamptz, got {other:?}"),
        }
    }

    #[test]
    fn decodes_array_of_maps() {
        let ty = LogicalType::Array(Box::new(LogicalType::Map(
            Box::new(LogicalType::Varchar),
            Box::new(LogicalType::BigInt),
        )));
        let v = decode_value(&serde_json::json!([{"a": 1}]), &ty).unwrap();
        match v {
            Value::Array(items) => {
                assert_eq!(items.len(), 1);
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn decodes_varbinary_from_base64() {
        let v = decode_value(&serde_json::json!("aGVsbG8="), &LogicalType::Varbinary).unwrap();
        assert_eq!(v, Value::Varbinary(b"hello".to_vec()));
    }
}
