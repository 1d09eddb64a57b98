//! TypeCodec: decodes server JSON values into host-native [`Value`]s and
//! encodes host values as SQL literals for prepared `EXECUTE` statements
//! (spec §4.4).

mod decode;
mod encode;
mod signature;
mod value;

pub use decode::decode_value;
pub use encode::encode_literal;
pub use signature::{parse_signature, TypeSignature};
pub use value::{Decimal, IntervalDaySecond, IntervalYearMonth, Value};

use serde::{Deserialize, Serialize};

/// A resolved logical type: the host-side intent of a server-declared type
/// string (spec §4.4 mapping table).
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalType {
    /// `bigint`
    BigInt,
    /// `integer`
    Integer,
    /// `smallint`
    SmallInt,
    /// `tinyint`
    TinyInt,
    /// `boolean`
    Boolean,
    /// `double`
    Double,
    /// `real`
    Real,
    /// `decimal(p,s)`
    Decimal {
        /// Total digit precision.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// `date`
    Date,
    /// `time`, or `time(p)` with an explicit fractional-second precision.
    Time {
        /// Declared fractional-second digits, when given.
        precision: Option<u32>,
    },
    /// `time with time zone`, or `time(p) with time zone`.
    TimeWithTimeZone {
        /// Declared fractional-second digits, when given.
        precision: Option<u32>,
    },
    /// `timestamp`, or `timestamp(p)`.
    Timestamp {
        /// Declared fractional-second digits, when given.
        precision: Option<u32>,
    },
    /// `timestamp with time zone`, or `timestamp(p) with time zone`.
    TimestampWithTimeZone {
        /// Declared fractional-second digits, when given.
        precision: Option<u32>,
    },
    /// `varchar`
    Varchar,
    /// `char(n)`
    Char {
        /// Declared fixed length.
        length: usize,
    },
    /// `uuid`
    Uuid,
    /// `varbinary`
    Varbinary,
    /// `interval year to month`
    IntervalYearToMonth,
    /// `interval day to second`
    IntervalDayToSecond,
    /// `array(T)`
    Array(Box<LogicalType>),
    /// `map(K,V)`
    Map(Box<LogicalType>, Box<LogicalType>),
    /// `row(name T, ...)`, decoded as a positional sequence of its fields.
    Row(Vec<(Option<String>, LogicalType)>),
    /// `json`
    Json,
    /// `ipaddress`
    IpAddress,
}

/// A single result column: its declared type string plus the logical type
/// resolved from it (spec §3 "Column").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Raw server type string, e.g. `"array(map(varchar,decimal(24,10)))"`.
    #[serde(rename = "type")]
    pub raw_type: String,
    /// The server's own structured type signature, when present on the wire.
    #[serde(rename = "typeSignature", default, skip_serializing_if = "Option::is_none")]
    pub type_signature: Option<serde_json::Value>,
    /// Logical type resolved from `raw_type`, skipped on the wire and filled
    /// in by [`Column::resolve`].
    #[serde(skip)]
    pub logical_type: Option<LogicalType>,
}

impl Column {
    /// Resolve `logical_type` from `raw_type`, returning a new `Column`.
    pub fn resolve(mut self) -> crate::Result<Self> {
        self.logical_type = Some(LogicalType::parse(&self.raw_type)?);
        Ok(self)
    }
}

impl LogicalType {
    /// Parse a declared type string into a [`LogicalType`] (spec §4.4: split
    /// on the first `(` and the last `)`, recursing into the parameter
    /// block).
    pub fn parse(raw: &str) -> crate::Result<LogicalType> {
        let TypeSignature { base, params } = parse_signature(raw)?;
        let base_lower = base.to_ascii_lowercase();

        match base_lower.as_str() {
            "bigint" => Ok(LogicalType::BigInt),
            "integer" | "int" => Ok(LogicalType::Integer),
            "smallint" => Ok(LogicalType::SmallInt),
            "tinyint" => Ok(LogicalType::TinyInt),
            "boolean" => Ok(LogicalType::Boolean),
            "double" => Ok(LogicalType::Double),
            "real" => Ok(LogicalType::Real),
            "date" => Ok(LogicalType::Date),
            "varchar" => Ok(LogicalType::Varchar),
            "uuid" => Ok(LogicalType::Uuid),
            "varbinary" => Ok(LogicalType::Varbinary),
            "json" => Ok(LogicalType::Json),
            "ipaddress" => Ok(LogicalType::IpAddress),
            "time" => Ok(LogicalType::Time {
                precision: parse_precision(raw, &params)?,
            }),
            "time with time zone" => Ok(LogicalType::TimeWithTimeZone {
                precision: parse_precision(raw, &params)?,
            }),
            "timestamp" => Ok(LogicalType::Timestamp {
                precision: parse_precision(raw, &params)?,
            }),
            "timestamp with time zone" => Ok(LogicalType::TimestampWithTimeZone {
                precision: parse_precision(raw, &params)?,
            }),
            "interval year to month" => Ok(LogicalType::IntervalYearToMonth),
            "interval day to second" => Ok(LogicalType::IntervalDayToSecond),
            "decimal" => {
                let params = params.ok_or_else(|| {
                    crate::Error::Decode {
                        type_name: raw.to_string(),
                        reason: "decimal requires (precision,scale)".to_string(),
                    }
                })?;
                let mut parts = split_top_level(&params);
                if parts.len() != 2 {
                    return Err(crate::Error::Decode {
                        type_name: raw.to_string(),
                        reason: format!("expected decimal(p,s), got decimal({params})"),
                    });
                }
                let scale_str = parts.pop().expect("len checked == 2");
                let precision_str = parts.pop().expect("len checked == 2");
                let precision = precision_str.trim().parse().map_err(|_| crate::Error::Decode {
                    type_name: raw.to_string(),
                    reason: format!("invalid precision: {precision_str}"),
                })?;
                let scale = scale_str.trim().parse().map_err(|_| crate::Error::Decode {
                    type_name: raw.to_string(),
                    reason: format!("invalid scale: {scale_str}"),
                })?;
                Ok(LogicalType::Decimal { precision, scale })
            }
            "char" => {
                let length = match params {
                    Some(p) => p.trim().parse().map_err(|_| crate::Error::Decode {
                        type_name: raw.to_string(),
                        reason: format!("invalid char length: {p}"),
                    })?,
                    None => 1,
                };
                Ok(LogicalType::Char { length })
            }
            "array" => {
                let params = params.ok_or_else(|| crate::Error::Decode {
                    type_name: raw.to_string(),
                    reason: "array requires an element type".to_string(),
                })?;
                Ok(LogicalType::Array(Box::new(LogicalType::parse(&params)?)))
            }
            "map" => {
                let params = params.ok_or_else(|| crate::Error::Decode {
                    type_name: raw.to_string(),
                    reason: "map requires (key,value) types".to_string(),
                })?;
                let parts = split_top_level(&params);
                if parts.len() != 2 {
                    return Err(crate::Error::Decode {
                        type_name: raw.to_string(),
                        reason: format!("expected map(K,V), got map({params})"),
                    });
                }
                let key = LogicalType::parse(parts[0].trim())?;
                let value = LogicalType::parse(parts[1].trim())?;
                Ok(LogicalType::Map(Box::new(key), Box::new(value)))
            }
            "row" => {
                let params = params.ok_or_else(|| crate::Error::Decode {
                    type_name: raw.to_string(),
                    reason: "row requires field types".to_string(),
                })?;
                let fields = split_top_level(&params)
                    .into_iter()
                    .map(|field| parse_row_field(field.trim()))
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(LogicalType::Row(fields))
            }
            other => Err(crate::Error::Decode {
                type_name: raw.to_string(),
                reason: format!("unsupported declared type: {other}"),
            }),
        }
    }
}

fn parse_precision(raw: &str, params: &Option<String>) -> crate::Result<Option<u32>> {
    match params {
        None => Ok(None),
        Some(p) => p
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| crate::Error::Decode {
                type_name: raw.to_string(),
                reason: format!("invalid precision: {p}"),
            }),
    }
}

fn parse_row_field(field: &str) -> crate::Result<(Option<String>, LogicalType)> {
    match field.split_once(' ') {
        Some((name, ty)) if !ty.trim().is_empty() => {
            Ok((Some(name.trim().to_string()), LogicalType::parse(ty.trim())?))
        }
        _ => Ok((None, LogicalType::parse(field)?)),
    }
}

/// Split a parameter block on top-level commas, respecting nested
/// parentheses (needed for e.g. `array(map(varchar,decimal(24,10)))`).
fn split_top_level(params: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in params.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() || !parts.is_empty() {
        parts.push(current);
    }
    parts
}
