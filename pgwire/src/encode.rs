//! Parameter value encoding.
//!
//! - [`Encode`]
//! - [`Encoded`]
//!
//! Every bound parameter is sent as postgres text format: the same textual
//! representation `COPY`/`psql` would print, never the binary wire format. See
//! [`PgFormat`][crate::postgres::PgFormat] for why.
use bytes::Buf;
use std::{borrow::Cow, collections::HashMap, fmt};

use crate::{
    ext::BindParams,
    postgres::{Oid, PgType},
    value::ValueRef,
};

/// A value ready to be bound into a [`Bind`][crate::postgres::frontend::Bind]
/// message: its postgres text-format bytes (or `None` for `NULL`) plus the `Oid`
/// the server should treat the parameter as.
pub struct Encoded<'val> {
    value: Option<ValueRef<'val>>,
    oid: Oid,
}

impl<'val> Encoded<'val> {
    /// A `NULL` parameter of the given type.
    pub fn null(oid: Oid) -> Encoded<'static> {
        Encoded { value: None, oid }
    }

    /// Borrow an already-encoded textual value without copying.
    pub fn borrowed(slice: &'val [u8], oid: Oid) -> Self {
        Encoded { value: Some(ValueRef::Slice(slice)), oid }
    }

    /// Take ownership of an already-encoded textual value.
    pub fn owned(bytes: Vec<u8>, oid: Oid) -> Encoded<'static> {
        Encoded { value: Some(ValueRef::Bytes(bytes.into())), oid }
    }

    /// Store a short (<15 byte) textual value inline, avoiding an allocation.
    pub fn inline(slice: &[u8], oid: Oid) -> Encoded<'static> {
        Encoded { value: Some(ValueRef::inline(slice)), oid }
    }

    pub(crate) fn oid(&self) -> Oid {
        self.oid
    }

    /// Length of the encoded value in bytes, `0` for `NULL`.
    pub(crate) fn len(&self) -> usize {
        self.value.as_ref().map_or(0, ValueRef::len)
    }
}

impl Buf for Encoded<'_> {
    fn remaining(&self) -> usize {
        self.value.as_ref().map_or(0, Buf::remaining)
    }

    fn chunk(&self) -> &[u8] {
        self.value.as_ref().map_or(&[], Buf::chunk)
    }

    fn advance(&mut self, cnt: usize) {
        if let Some(value) = &mut self.value {
            value.advance(cnt);
        }
    }
}

impl BindParams for Encoded<'_> {
    fn size(&self) -> i32 {
        match &self.value {
            Some(value) => value.len() as i32,
            None => -1,
        }
    }
}

impl std::fmt::Debug for Encoded<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoded").field("oid", &self.oid).field("value", &self.value).finish()
    }
}

/// An error produced while turning a Rust value into its wire-ready text form.
///
/// Unlike decoding, nearly every built-in type encodes infallibly; this exists
/// for implementors whose encoding runs through a fallible step, such as
/// [`Json`][crate::types::Json]'s `serde_json` serialization.
#[derive(Debug)]
pub struct EncodeError(pub(crate) Cow<'static, str>);

impl EncodeError {
    pub(crate) fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self(reason.into())
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to encode value, {}", self.0)
    }
}

impl std::error::Error for EncodeError { }

/// A type that can be sent as a bound query parameter.
///
/// Implementors produce postgres text format: the same bytes `psql` would show
/// for the value, not a binary wire representation.
pub trait Encode<'val> {
    /// Encode `self` into its wire-ready form.
    fn encode(self) -> Result<Encoded<'val>, EncodeError>;
}

impl<'val> Encode<'val> for Encoded<'val> {
    fn encode(self) -> Result<Encoded<'val>, EncodeError> {
        Ok(self)
    }
}

fn encode_text(s: &str, oid: Oid) -> Encoded<'static> {
    if s.len() < 15 {
        Encoded::inline(s.as_bytes(), oid)
    } else {
        Encoded::owned(s.as_bytes().to_vec(), oid)
    }
}

/// Implement [`Encode`] (and its `Option<T>` counterpart) for an owned, `'static`
/// value type whose text form is computed from `self`.
macro_rules! encode_owned {
    ($ty:ty, |$v:ident| $body:expr) => {
        impl Encode<'static> for $ty {
            fn encode(self) -> Result<Encoded<'static>, EncodeError> {
                let $v = self;
                Ok($body)
            }
        }

        impl Encode<'static> for Option<$ty> {
            fn encode(self) -> Result<Encoded<'static>, EncodeError> {
                match self {
                    Some(v) => Encode::encode(v),
                    None => Ok(Encoded::null(<$ty as PgType>::OID)),
                }
            }
        }
    };
}

encode_owned!(bool, |v| encode_text(if v { "t" } else { "f" }, bool::OID));
encode_owned!(i16, |v| encode_text(itoa::Buffer::new().format(v), i16::OID));
encode_owned!(i32, |v| encode_text(itoa::Buffer::new().format(v), i32::OID));
encode_owned!(i64, |v| encode_text(itoa::Buffer::new().format(v), i64::OID));

encode_owned!(f32, |v| match v {
    v if v.is_nan() => encode_text("NaN", f32::OID),
    f32::INFINITY => encode_text("Infinity", f32::OID),
    f32::NEG_INFINITY => encode_text("-Infinity", f32::OID),
    v => encode_text(ryu::Buffer::new().format(v), f32::OID),
});

encode_owned!(f64, |v| match v {
    v if v.is_nan() => encode_text("NaN", f64::OID),
    f64::INFINITY => encode_text("Infinity", f64::OID),
    f64::NEG_INFINITY => encode_text("-Infinity", f64::OID),
    v => encode_text(ryu::Buffer::new().format(v), f64::OID),
});

encode_owned!(char, |v| {
    let mut buf = [0u8; 4];
    encode_text(v.encode_utf8(&mut buf), char::OID)
});

encode_owned!(String, |v| encode_text(&v, String::OID));

encode_owned!(Vec<u8>, |v| {
    let mut text = String::with_capacity(2 + v.len() * 2);
    text.push_str("\\x");
    text.push_str(&hex::encode(&v));
    Encoded::owned(text.into_bytes(), <Vec<u8> as PgType>::OID)
});

impl<'val> Encode<'val> for &'val str {
    fn encode(self) -> Result<Encoded<'val>, EncodeError> {
        Ok(Encoded::borrowed(self.as_bytes(), <str as PgType>::OID))
    }
}

impl<'val> Encode<'val> for Option<&'val str> {
    fn encode(self) -> Result<Encoded<'val>, EncodeError> {
        match self {
            Some(v) => v.encode(),
            None => Ok(Encoded::null(<str as PgType>::OID)),
        }
    }
}

/// Encodes as a postgres array literal (`{e1,e2,...}`), quoting/escaping
/// elements that need it and using the unquoted `NULL` sentinel for `None`.
///
/// Sent with oid `0`, letting the server infer the element type from context
/// (the target column or an explicit cast), since no single fixed oid can
/// describe an array of arbitrary element type.
impl<'val, T> Encode<'val> for Vec<T>
where
    T: Encode<'val>,
{
    fn encode(self) -> Result<Encoded<'val>, EncodeError> {
        let mut text = String::with_capacity(2 + self.len() * 4);
        text.push('{');
        for (i, item) in self.into_iter().enumerate() {
            if i > 0 {
                text.push(',');
            }
            match item.encode()? {
                enc if enc.value.is_none() => text.push_str("NULL"),
                enc => push_quoted_array_element(&mut text, &enc),
            }
        }
        text.push('}');
        Ok(Encoded::owned(text.into_bytes(), 0))
    }
}

impl<'val, T> Encode<'val> for Option<Vec<T>>
where
    T: Encode<'val>,
{
    fn encode(self) -> Result<Encoded<'val>, EncodeError> {
        match self {
            Some(v) => v.encode(),
            None => Ok(Encoded::null(0)),
        }
    }
}

fn push_quoted_array_element(text: &mut String, enc: &Encoded) {
    let bytes = Buf::chunk(enc.value.as_ref().unwrap());
    let s = std::str::from_utf8(bytes).unwrap_or_default();
    text.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            text.push('\\');
        }
        text.push(c);
    }
    text.push('"');
}

/// Encodes as a postgres `hstore` literal (`"k"=>"v"`), doubling `"` and `\`
/// inside keys/values.
///
/// Sent with oid `0`; `hstore` is a contrib extension type with no fixed
/// well-known oid, so the server is left to infer it from the target column.
impl<'val> Encode<'val> for HashMap<String, String> {
    fn encode(self) -> Result<Encoded<'val>, EncodeError> {
        let mut text = String::with_capacity(self.len() * 8);
        for (i, (k, v)) in self.into_iter().enumerate() {
            if i > 0 {
                text.push(',');
            }
            push_hstore_quoted(&mut text, &k);
            text.push_str("=>");
            push_hstore_quoted(&mut text, &v);
        }
        Ok(Encoded::owned(text.into_bytes(), 0))
    }
}

fn push_hstore_quoted(text: &mut String, s: &str) {
    text.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            text.push('\\');
        }
        text.push(c);
    }
    text.push('"');
}

/// Postgres has no unsigned integer types; `u32`/`u64` are encoded as
/// `numeric` decimal text, which accepts and round-trips any integer value.
impl Encode<'static> for u32 {
    fn encode(self) -> Result<Encoded<'static>, EncodeError> {
        Ok(encode_text(itoa::Buffer::new().format(self), 1700))
    }
}

impl Encode<'static> for Option<u32> {
    fn encode(self) -> Result<Encoded<'static>, EncodeError> {
        match self {
            Some(v) => v.encode(),
            None => Ok(Encoded::null(1700)),
        }
    }
}

impl Encode<'static> for u64 {
    fn encode(self) -> Result<Encoded<'static>, EncodeError> {
        Ok(encode_text(itoa::Buffer::new().format(self), 1700))
    }
}

impl Encode<'static> for Option<u64> {
    fn encode(self) -> Result<Encoded<'static>, EncodeError> {
        match self {
            Some(v) => v.encode(),
            None => Ok(Encoded::null(1700)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn text(e: &Encoded) -> &[u8] {
        e.value.as_ref().map_or(&[][..], |v| match v {
            ValueRef::Slice(s) => s,
            ValueRef::Inline { offset, value } => &value[*offset..],
            ValueRef::Bytes(b) => b,
        })
    }

    #[test]
    fn encodes_integers_as_decimal_text() {
        assert_eq!(text(&42i32.encode().unwrap()), b"42");
        assert_eq!(text(&(-7i64).encode().unwrap()), b"-7");
    }

    #[test]
    fn encodes_bool_as_single_char() {
        assert_eq!(text(&true.encode().unwrap()), b"t");
        assert_eq!(text(&false.encode().unwrap()), b"f");
    }

    #[test]
    fn encodes_float_special_values() {
        assert_eq!(text(&f64::NAN.encode().unwrap()), b"NaN");
        assert_eq!(text(&f64::INFINITY.encode().unwrap()), b"Infinity");
        assert_eq!(text(&f64::NEG_INFINITY.encode().unwrap()), b"-Infinity");
    }

    #[test]
    fn encodes_bytea_as_hex() {
        assert_eq!(text(&vec![0xDEu8, 0xAD].encode().unwrap()), b"\\xdead");
    }

    #[test]
    fn none_is_null() {
        assert_eq!(Option::<i32>::None.encode().unwrap().size(), -1);
        assert_eq!(Some(5i32).encode().unwrap().size(), 2);
    }

    #[test]
    fn encodes_array_with_quoted_elements_and_nulls() {
        let arr = vec![Some("a".to_string()), None, Some("b,c".to_string())];
        assert_eq!(text(&arr.encode().unwrap()), br#"{"a",NULL,"b,c"}"#);
    }

    #[test]
    fn encodes_hstore_as_quoted_pairs() {
        let mut map = HashMap::new();
        map.insert("k".to_string(), "v".to_string());
        assert_eq!(text(&map.encode().unwrap()), br#""k"=>"v""#);
    }

    #[test]
    fn encodes_u32_and_u64_as_numeric_text() {
        assert_eq!(text(&42u32.encode().unwrap()), b"42");
        assert_eq!(text(&42u64.encode().unwrap()), b"42");
    }
}
