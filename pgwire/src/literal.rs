//! Literal SQL value interpolation.
//!
//! Distinct from [`Encode`][crate::encode::Encode]: instead of producing a
//! [`Bind`][crate::postgres::frontend::Bind] parameter sent alongside a
//! prepared statement, this produces the literal text a value should be
//! written as once substituted directly into a query string (a quoted
//! `'...'`, a bare decimal, an `ARRAY[...]` constructor, ...). Used by
//! [`substitute`] and the [`interpolate`][crate::query::interpolate] query
//! entrypoint, which executes the resulting text over the simple-query
//! protocol rather than Parse/Bind.
use std::collections::HashMap;

use crate::encode::EncodeError;

/// A value that writes its own literal SQL text, verbatim.
///
/// Implementors are responsible for their own quoting/escaping. Checked
/// first by a hand-written [`Literal`] impl that wants to opt into it; see
/// [`literal_via_appender`].
pub trait Appender {
    fn append_literal(&self, buf: &mut String);
}

/// A value that defers its literal encoding to another value.
///
/// Useful for newtypes that wrap a primitive already covered by a built-in
/// [`Literal`] impl. See [`literal_via_external`].
pub trait ExternalValue {
    type Value: Literal;

    fn external_value(&self) -> Self::Value;
}

/// A value that can be rendered as a literal SQL fragment.
///
/// The built-in impls below are the "static kind" rung of the dispatch order
/// described by the value-codec spec (`Appender` > `ExternalValue` > static
/// kind): a type picks which rung it wants by implementing `Literal` itself,
/// either directly or via [`literal_via_appender`]/[`literal_via_external`].
pub trait Literal {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError>;
}

/// Implement [`Literal`] for a type via its [`Appender`] impl (highest
/// dispatch precedence).
#[macro_export]
macro_rules! literal_via_appender {
    ($ty:ty) => {
        impl $crate::literal::Literal for $ty {
            fn append_literal(&self, buf: &mut String) -> Result<(), $crate::encode::EncodeError> {
                $crate::literal::Appender::append_literal(self, buf);
                Ok(())
            }
        }
    };
}

/// Implement [`Literal`] for a type via its [`ExternalValue`] impl (middle
/// dispatch precedence, below [`Appender`]).
#[macro_export]
macro_rules! literal_via_external {
    ($ty:ty) => {
        impl $crate::literal::Literal for $ty {
            fn append_literal(&self, buf: &mut String) -> Result<(), $crate::encode::EncodeError> {
                $crate::literal::ExternalValue::external_value(self).append_literal(buf)
            }
        }
    };
}

impl<T: Literal> Literal for Option<T> {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        match self {
            Some(v) => v.append_literal(buf),
            None => {
                buf.push_str("NULL");
                Ok(())
            },
        }
    }
}

impl<T: Literal + ?Sized> Literal for &T {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        (**self).append_literal(buf)
    }
}

fn push_quoted(buf: &mut String, s: &str) {
    buf.push('\'');
    for c in s.chars() {
        if c == '\'' {
            buf.push('\'');
        }
        buf.push(c);
    }
    buf.push('\'');
}

impl Literal for bool {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        buf.push_str(if *self { "TRUE" } else { "FALSE" });
        Ok(())
    }
}

macro_rules! literal_int {
    ($ty:ty) => {
        impl Literal for $ty {
            fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
                buf.push_str(itoa::Buffer::new().format(*self));
                Ok(())
            }
        }
    };
}

literal_int!(i16);
literal_int!(i32);
literal_int!(i64);
literal_int!(u32);
literal_int!(u64);

macro_rules! literal_float {
    ($ty:ty) => {
        impl Literal for $ty {
            fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
                let v = *self;
                if v.is_nan() {
                    buf.push_str("'NaN'");
                } else if v == <$ty>::INFINITY {
                    buf.push_str("'Infinity'");
                } else if v == <$ty>::NEG_INFINITY {
                    buf.push_str("'-Infinity'");
                } else {
                    buf.push_str(ryu::Buffer::new().format(v));
                }
                Ok(())
            }
        }
    };
}

literal_float!(f32);
literal_float!(f64);

impl Literal for char {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        let mut tmp = [0u8; 4];
        push_quoted(buf, self.encode_utf8(&mut tmp));
        Ok(())
    }
}

impl Literal for str {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        push_quoted(buf, self);
        Ok(())
    }
}

impl Literal for String {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        push_quoted(buf, self);
        Ok(())
    }
}

/// `E'\x...'` hex-escaped byte string; the `E` prefix is required for the
/// `\x` escape to be recognized regardless of `standard_conforming_strings`.
impl Literal for Vec<u8> {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        buf.push_str("E'\\x");
        buf.push_str(&hex::encode(self));
        buf.push('\'');
        Ok(())
    }
}

/// `ARRAY[...]` constructor, recursing into each element's own `Literal`
/// impl; an empty vec becomes the `'{}'` literal since `ARRAY[]` alone is
/// untyped and postgres rejects it without an explicit cast.
impl<T: Literal> Literal for Vec<T> {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        if self.is_empty() {
            buf.push_str("'{}'");
            return Ok(());
        }
        buf.push_str("ARRAY[");
        for (i, item) in self.iter().enumerate() {
            if i > 0 {
                buf.push(',');
            }
            item.append_literal(buf)?;
        }
        buf.push(']');
        Ok(())
    }
}

/// `'k=>v,...'` hstore literal, doubling `"`/`\` inside keys and values and
/// relying on [`push_quoted`] to double the enclosing `'`.
impl Literal for HashMap<String, String> {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        let mut inner = String::with_capacity(self.len() * 8);
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                inner.push(',');
            }
            push_hstore_escaped(&mut inner, k);
            inner.push_str("=>");
            push_hstore_escaped(&mut inner, v);
        }
        push_quoted(buf, &inner);
        Ok(())
    }
}

fn push_hstore_escaped(buf: &mut String, s: &str) {
    buf.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            buf.push('\\');
        }
        buf.push(c);
    }
    buf.push('"');
}

#[cfg(feature = "json")]
impl<T: serde::Serialize> Literal for crate::types::Json<T> {
    fn append_literal(&self, buf: &mut String) -> Result<(), EncodeError> {
        let text = serde_json::to_string(&self.0).map_err(|e| EncodeError::new(e.to_string()))?;
        push_quoted(buf, &text);
        Ok(())
    }
}

/// Substitutes `?` (positional, consumed in appearance order) and `$N`
/// (1-based, explicitly indexed) placeholders in `sql` with the pre-rendered
/// literal text in `values`, skipping `'...'` string literals (with `''`
/// escapes), `"..."` quoted identifiers, `$tag$...$tag$` dollar-quoted
/// strings, and `--`/`/* */` comments.
///
/// Both placeholder styles read from the same `values` slice (index `n - 1`
/// for `$n`, the next not-yet-consumed slot for `?`), so a query may mix them
/// freely.
pub fn substitute(sql: &str, values: &[String]) -> Result<String, EncodeError> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let len = sql.len();
    let byte_at = |k: usize| chars.get(k).map_or(len, |(b, _)| *b);

    let mut out = String::with_capacity(sql.len() + values.iter().map(String::len).sum::<usize>());
    let mut positional = 0usize;
    let mut k = 0usize;

    while k < chars.len() {
        let (_, c) = chars[k];
        match c {
            '\'' => {
                let start = k;
                k += 1;
                loop {
                    if k >= chars.len() {
                        return Err(EncodeError::new("unterminated string literal"));
                    }
                    if chars[k].1 == '\'' {
                        if chars.get(k + 1).is_some_and(|&(_, c)| c == '\'') {
                            k += 2;
                        } else {
                            k += 1;
                            break;
                        }
                    } else {
                        k += 1;
                    }
                }
                out.push_str(&sql[byte_at(start)..byte_at(k)]);
            },
            '"' => {
                let start = k;
                k += 1;
                loop {
                    if k >= chars.len() {
                        return Err(EncodeError::new("unterminated quoted identifier"));
                    }
                    if chars[k].1 == '"' {
                        if chars.get(k + 1).is_some_and(|&(_, c)| c == '"') {
                            k += 2;
                        } else {
                            k += 1;
                            break;
                        }
                    } else {
                        k += 1;
                    }
                }
                out.push_str(&sql[byte_at(start)..byte_at(k)]);
            },
            '-' if chars.get(k + 1).is_some_and(|&(_, c)| c == '-') => {
                let start = k;
                while k < chars.len() && chars[k].1 != '\n' {
                    k += 1;
                }
                out.push_str(&sql[byte_at(start)..byte_at(k)]);
            },
            '/' if chars.get(k + 1).is_some_and(|&(_, c)| c == '*') => {
                let start = k;
                k += 2;
                let mut depth = 1u32;
                while k < chars.len() && depth > 0 {
                    if chars[k].1 == '/' && chars.get(k + 1).is_some_and(|&(_, c)| c == '*') {
                        depth += 1;
                        k += 2;
                    } else if chars[k].1 == '*' && chars.get(k + 1).is_some_and(|&(_, c)| c == '/') {
                        depth -= 1;
                        k += 2;
                    } else {
                        k += 1;
                    }
                }
                out.push_str(&sql[byte_at(start)..byte_at(k)]);
            },
            '$' if chars.get(k + 1).is_some_and(|&(_, c)| c.is_ascii_digit()) => {
                let num_start = k + 1;
                let mut j = num_start;
                while j < chars.len() && chars[j].1.is_ascii_digit() {
                    j += 1;
                }
                let n: usize = sql[byte_at(num_start)..byte_at(j)].parse().expect("digits");
                let value = values
                    .get(n - 1)
                    .ok_or_else(|| EncodeError::new(format!("placeholder ${n} has no bound value")))?;
                out.push_str(value);
                k = j;
            },
            '$' => match dollar_tag_end(&chars, k) {
                Some(tag_end) => {
                    let tag = &sql[byte_at(k)..byte_at(tag_end + 1)];
                    match sql[byte_at(tag_end + 1)..].find(tag) {
                        Some(rel) => {
                            let content_end_byte = byte_at(tag_end + 1) + rel + tag.len();
                            out.push_str(&sql[byte_at(k)..content_end_byte]);
                            k = chars.partition_point(|&(b, _)| b < content_end_byte);
                        },
                        None => return Err(EncodeError::new("unterminated dollar-quoted string")),
                    }
                },
                None => {
                    out.push('$');
                    k += 1;
                },
            },
            '?' => {
                let value = values
                    .get(positional)
                    .ok_or_else(|| EncodeError::new("not enough bound values for `?` placeholders"))?;
                out.push_str(value);
                positional += 1;
                k += 1;
            },
            _ => {
                out.push(c);
                k += 1;
            },
        }
    }

    Ok(out)
}

/// Looks for a `$tag$` opening delimiter starting at `chars[start]` (which
/// must be `$`). `tag` is `[A-Za-z0-9_]*`; returns the index of the closing
/// `$` of the opening delimiter, or `None` if `start` is just a stray `$`.
fn dollar_tag_end(chars: &[(usize, char)], start: usize) -> Option<usize> {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j].1 {
            '$' => return Some(j),
            c if c.is_ascii_alphanumeric() || c == '_' => j += 1,
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quotes_and_escapes_strings() {
        let mut buf = String::new();
        "it's".append_literal(&mut buf).unwrap();
        assert_eq!(buf, "'it''s'");
    }

    #[test]
    fn renders_bool_and_numbers_unquoted() {
        let mut buf = String::new();
        true.append_literal(&mut buf).unwrap();
        assert_eq!(buf, "TRUE");

        let mut buf = String::new();
        42i32.append_literal(&mut buf).unwrap();
        assert_eq!(buf, "42");
    }

    #[test]
    fn renders_array_with_nulls_and_nested_quoting() {
        let v: Vec<Option<String>> = vec![Some("a".into()), None, Some("b".into())];
        let mut buf = String::new();
        v.append_literal(&mut buf).unwrap();
        assert_eq!(buf, "ARRAY['a',NULL,'b']");
    }

    #[test]
    fn renders_empty_array_as_untyped_literal() {
        let v: Vec<i32> = vec![];
        let mut buf = String::new();
        v.append_literal(&mut buf).unwrap();
        assert_eq!(buf, "'{}'");
    }

    #[test]
    fn renders_null_for_none() {
        let mut buf = String::new();
        Option::<i32>::None.append_literal(&mut buf).unwrap();
        assert_eq!(buf, "NULL");
    }

    #[test]
    fn substitutes_positional_and_indexed_placeholders_together() {
        let values = vec!["1".to_string(), "'a'".to_string()];
        let sql = substitute("SELECT ? WHERE x = $2 AND y = $1", &values).unwrap();
        assert_eq!(sql, "SELECT 1 WHERE x = 'a' AND y = 1");
    }

    #[test]
    fn skips_placeholders_inside_string_and_quoted_identifier() {
        let values = vec!["99".to_string()];
        let sql = substitute(r#"SELECT '?', "col$1", ? FROM t"#, &values).unwrap();
        assert_eq!(sql, r#"SELECT '?', "col$1", 99 FROM t"#);
    }

    #[test]
    fn preserves_escaped_quote_inside_string_literal() {
        let values: Vec<String> = vec![];
        let sql = substitute("SELECT 'it''s ? not a placeholder'", &values).unwrap();
        assert_eq!(sql, "SELECT 'it''s ? not a placeholder'");
    }

    #[test]
    fn skips_placeholders_inside_comments() {
        let values = vec!["1".to_string()];
        let sql = substitute("SELECT ? -- what about ?\n/* and $2 */", &values).unwrap();
        assert_eq!(sql, "SELECT 1 -- what about ?\n/* and $2 */");
    }

    #[test]
    fn skips_placeholders_inside_dollar_quoted_string() {
        let values: Vec<String> = vec![];
        let sql = substitute("SELECT $tag$literal ? and $1 text$tag$", &values).unwrap();
        assert_eq!(sql, "SELECT $tag$literal ? and $1 text$tag$");
    }

    #[test]
    fn errors_when_indexed_placeholder_has_no_bound_value() {
        let values: Vec<String> = vec![];
        assert!(substitute("SELECT $1", &values).is_err());
    }
}
