//! Splits a declared type string into a base name and its parameter block.
//!
//! Per spec §4.4, the grammar is `base ( params )?`; parsing splits on the
//! **first** `(` and the **last** `)`, handing the substring between to
//! nested decoding (needed for types like `decimal(p,s)` whose params never
//! nest, and `array(map(...))` whose params do).

/// A type string split into its base name and raw parameter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSignature {
    /// Base type name, lowercased whitespace preserved (e.g.
    /// `"time with time zone"`).
    pub base: String,
    /// Raw text between the first `(` and the last `)`, if any.
    pub params: Option<String>,
}

/// Parse a declared type string (spec §4.4).
///
/// A type's parameter block need not sit at the end of the string — e.g.
/// `timestamp(3) with time zone` — so any text following the last `)` is
/// folded back into the base name rather than discarded.
pub fn parse_signature(raw: &str) -> crate::Result<TypeSignature> {
    let trimmed = raw.trim();
    match trimmed.find('(') {
        None => Ok(TypeSignature {
            base: trimmed.to_string(),
            params: None,
        }),
        Some(open) => {
            let close = trimmed.rfind(')').ok_or_else(|| crate::Error::Decode {
                type_name: raw.to_string(),
                reason: "unbalanced parentheses in type signature".to_string(),
            })?;
            if close < open {
                return Err(crate::Error::Decode {
                    type_name: raw.to_string(),
                    reason: "unbalanced parentheses in type signature".to_string(),
                });
            }
            let prefix = trimmed[..open].trim();
            let suffix = trimmed[close + 1..].trim();
            let base = if suffix.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix} {suffix}")
            };
            Ok(TypeSignature {
                base,
                params: Some(trimmed[open + 1..close].to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_scalar_with_no_params() {
        let sig = parse_signature("bigint").unwrap();
        assert_eq!(sig.base, "bigint");
        assert_eq!(sig.params, None);
    }

    #[test]
    fn splits_decimal_params() {
        let sig = parse_signature("decimal(24,10)").unwrap();
        assert_eq!(sig.base, "decimal");
        assert_eq!(sig.params.as_deref(), Some("24,10"));
    }

    #[test]
    fn splits_on_first_open_and_last_close() {
        let sig = parse_signature("array(map(varchar,decimal(24,10)))").unwrap();
        assert_eq!(sig.base, "array");
        assert_eq!(sig.params.as_deref(), Some("map(varchar,decimal(24,10))"));
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(parse_signature("decimal(24,10").is_err());
    }

    #[test]
    fn folds_trailing_suffix_into_base() {
        let sig = parse_signature("timestamp(3) with time zone").unwrap();
        assert_eq!(sig.base, "timestamp with time zone");
        assert_eq!(sig.params.as_deref(), Some("3"));
    }
}
