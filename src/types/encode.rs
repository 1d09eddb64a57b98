//! Encodes a host [`Value`] as a SQL literal for `EXECUTE ... USING` binding
//! (spec §4.4 "Parameter literal encoding").

use std::fmt::Write as _;

use super::Value;

/// Render `value` as a SQL literal suitable for substitution into an
/// `EXECUTE ... USING` parameter list.
///
/// Follows spec §4.4's enumerated cases exactly; types it does not name
/// (date, time, decimal, every numeric width, json, ip address) fall through
/// to "any other → string form of the value".
pub fn encode_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Varchar(s) | Value::Char(s) => quote_string(s),
        Value::Timestamp(ts) => format!("timestamp '{}'", ts.format("%Y-%m-%d %H:%M:%S%.3f")),
        Value::TimestampWithTimeZone(ts) => format!(
            "\"timestamp with time zone\" '{}'",
            ts.format("%Y-%m-%d %H:%M:%S%.3f %:z")
        ),
        Value::IntervalDayToSecond(d) => quote_string(&encode_interval_day_second(d)),
        Value::Uuid(u) => quote_string(&u.to_string()),
        Value::Boolean(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
        Value::Varbinary(bytes) => encode_varbinary(bytes),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(encode_literal).collect();
            format!("({})", rendered.join(", "))
        }
        other => display_value(other),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Integer(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::Boolean(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
        Value::Double(v) => encode_float(*v),
        Value::Real(v) => encode_float(*v as f64),
        Value::Decimal(d) => d.to_canonical_string(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Time(t) => t.format("%H:%M:%S%.3f").to_string(),
        Value::TimeWithTimeZone(raw) => raw.clone(),
        Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        Value::TimestampWithTimeZone(ts) => ts.format("%Y-%m-%d %H:%M:%S%.3f %:z").to_string(),
        Value::Varchar(s) | Value::Char(s) => s.clone(),
        Value::Uuid(u) => u.to_string(),
        Value::Varbinary(bytes) => encode_varbinary(bytes),
        Value::IntervalYearToMonth(i) => encode_interval_year_month(i),
        Value::IntervalDayToSecond(d) => encode_interval_day_second(d),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(display_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Map(pairs) => {
            let rendered: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{}: {}", display_value(k), display_value(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        Value::Row(fields) => {
            let rendered: Vec<String> = fields.iter().map(display_value).collect();
            format!("({})", rendered.join(", "))
        }
        Value::Json(json) => json.to_string(),
        Value::IpAddress(s) => s.clone(),
    }
}

fn encode_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        let mut s = String::new();
        write!(s, "{v}").expect("writing to a String never fails");
        s
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn encode_varbinary(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2 + 2);
    hex.push_str("X'");
    for byte in bytes {
        let _ = write!(hex, "{byte:02X}");
    }
    hex.push('\'');
    hex
}

fn encode_interval_year_month(i: &super::IntervalYearMonth) -> String {
    let negative = i.years < 0 || i.months < 0;
    format!(
        "{}{}-{}",
        if negative { "-" } else { "" },
        i.years.abs(),
        i.months.abs()
    )
}

fn encode_interval_day_second(d: &super::IntervalDaySecond) -> String {
    let negative = *d < chrono::Duration::zero();
    let magnitude = if negative { -*d } else { *d };
    let days = magnitude.num_days();
    let hours = magnitude.num_hours() % 24;
    let minutes = magnitude.num_minutes() % 60;
    let seconds = magnitude.num_seconds() % 60;
    let millis = magnitude.num_milliseconds() % 1000;
    format!(
        "{}{} {:02}:{:02}:{:02}.{:03}",
        if negative { "-" } else { "" },
        days,
        hours,
        minutes,
        seconds,
        millis
    )
}
