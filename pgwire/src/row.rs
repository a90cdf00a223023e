//! Postgres row operation.
//!
//! - [`Row`]
//! - [`Column`]
//! - [`FromRow`]
//! - [`Decode`]
//!
//! - [`Index`]
//! - [`DecodeError`]
use bytes::{Buf, Bytes};
use std::{borrow::Cow, fmt, str::Utf8Error, string::FromUtf8Error};

use crate::{
    common::{ByteStr, unit_error},
    ext::{BytesExt, FmtExt},
    postgres::{Oid, PgType},
};

// <https://www.postgresql.org/docs/current/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-ROWDESCRIPTION>
// table_oid
// attribute_len
// oid
// data_type_size
// type_modifier
// format_code
const SUFFIX: usize = size_of::<u32>()
    + size_of::<u16>()
    + size_of::<u32>()
    + size_of::<i16>()
    + size_of::<i32>()
    + size_of::<u16>();

const OID_OFFSET: usize = size_of::<u32>() + size_of::<u16>();

/// Postgres row.
pub struct Row {
    field_len: u16,
    body: Bytes,
    values: Bytes,
}

impl Row {
    /// `RowDescription` message
    pub(crate) fn new(mut bytes: Bytes) -> Self {
        Self {
            field_len: bytes.get_u16(),
            body: bytes,
            values: Bytes::new(),
        }
    }

    /// `DataRow` message
    pub(crate) fn inner_clone(&self, mut bytes: Bytes) -> Row {
        assert_eq!(
            self.field_len, bytes.get_u16(),
            "RowDescription len missmatch with DataRow len"
        );
        Self {
            field_len: self.field_len,
            body: self.body.clone(),
            values: bytes,
        }
    }

    /// Returns `true` if row contains no columns.
    pub const fn is_empty(&self) -> bool {
        self.field_len == 0
    }

    /// Returns the number of fields/column.
    pub const fn len(&self) -> u16 {
        self.field_len
    }

    /// Try get and decode column.
    pub fn try_get<I: Index, R: Decode>(&self, idx: I) -> Result<R, DecodeError> {
        let (offset,nul,nth) = idx.position(&self.body, self.field_len)?;

        let name = ByteStr::from_utf8(self.body.slice(offset..nul))?;

        let mut i = 0;
        let mut values = self.values.clone();
        let value = loop {
            let len = values.get_i32();
            let value = match len {
                -1 => None,
                _ => Some(values.split_to(len as _)),
            };
            if i == nth {
                break value;
            }
            i += 1;
        };

        R::decode(Column::new(name, &self.body[nul + 1..], value))
    }

    /// Try decode type using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(self) -> Result<D, DecodeError> {
        D::from_row(self)
    }
}

impl IntoIterator for Row {
    type Item = Result<Column, DecodeError>;

    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            field_len: self.field_len,
            body: self.body,
            values: self.values,
            iter_n: 0,
        }
    }
}

/// [`IntoIterator`] implementation from [`Row`].
#[derive(Debug)]
pub struct IntoIter {
    field_len: u16,
    body: Bytes,
    values: Bytes,

    iter_n: u16,
}

impl IntoIter {
    /// Same as [`Iterator::next`] but returns [`Result`] instead.
    pub fn try_next(&mut self) -> Result<Column, DecodeError> {
        match self.next() {
            Some(ok) => ok,
            None => Err(DecodeError::IndexOutOfBounds(self.iter_n as _)),
        }
    }
}

impl Iterator for IntoIter {
    type Item = Result<Column, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.iter_n == self.field_len {
            return None
        }

        let field_name = match self.body.get_nul_bytestr() {
            Ok(ok) => ok,
            Err(err) => {
                self.iter_n = self.field_len;
                return Some(Err(err.into()))
            },
        };
        let column = self.body.split_to(SUFFIX);
        let len = self.values.get_i32();
        let value = match len {
            -1 => None,
            _ => Some(self.values.split_to(len as _)),
        };
        self.iter_n += 1;

        Some(Ok(Column::new(field_name, &column, value)))
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        let mut b = self.body.clone();
        let mut v = self.values.clone();
        for _ in 0..self.field_len {
            let Ok(key) = b.get_nul_bytestr() else { break };
            b.advance(SUFFIX);
            let len = v.get_i32();
            dbg.key(&key);
            match len {
                -1 => dbg.value(&format_args!("NULL")),
                len => dbg.value(&v.split_to(len as _).lossy()),
            };
        }
        dbg.finish()
    }
}

/// Postgres column.
#[derive(Debug, Clone)]
pub struct Column {
    oid: Oid,
    value: Option<Bytes>,
    name: ByteStr,
}

impl Column {
    /// `body` is start of data **after** field name
    fn new(name: ByteStr, body: &[u8], value: Option<Bytes>) -> Self {
        Self {
            name,
            oid: (&mut &body[OID_OFFSET..]).get_u32(),
            value
        }
    }

    /// Returns column [`Oid`].
    pub const fn oid(&self) -> Oid {
        self.oid
    }

    /// Returns column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return `true` if value is NULL.
    pub const fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Extract the inner bytes as slice.
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Clone the inner [`Bytes`].
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn value(&self) -> Option<Bytes> {
        self.value.as_ref().cloned()
    }

    /// Consume self into the inner [`Bytes`].
    ///
    /// Returns empty [`Bytes`] if value is `NULL`.
    pub fn into_value(self) -> Option<Bytes> {
        self.value
    }

    /// Try consume self into the inner [`Bytes`].
    ///
    /// Return [`DecodeError::Null`] if value is `NULL`.
    pub fn try_into_value(self) -> Result<Bytes, DecodeError> {
        self.value.ok_or(DecodeError::Null)
    }

    /// Try decode type using [`Decode`] implementation.
    pub fn decode<D: Decode>(self) -> Result<D, DecodeError> {
        D::decode(self)
    }

    /// Build a [`Column`] directly from an `Oid` and raw wire bytes, bypassing
    /// the `RowDescription`/`DataRow` byte layout this is normally parsed from.
    ///
    /// Only for `Decode`/`Encode` round-trip tests in sibling modules
    /// (`types::time`, `types::json`, ...) that don't want to hand-build full
    /// message bytes just to exercise a single scalar decode.
    #[cfg(test)]
    pub(crate) fn new_for_test(oid: Oid, value: Option<Bytes>) -> Self {
        Self { oid, value, name: ByteStr::from_static("") }
    }
}

/// Query result with its rows affected.
#[derive(Debug)]
pub struct RowResult {
    pub rows_affected: u64,
}

// ===== Traits =====

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    /// Construct self from row.
    fn from_row(row: Row) -> Result<Self, DecodeError>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row)
    }
}

impl FromRow for () {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:literal),*) => {
        impl<$($t),*> FromRow for ($($t),*,)
        where
            $($t: Decode),*
        {
            fn from_row(row: Row) -> Result<Self, DecodeError> {
                Ok((
                    $(row.try_get($i)?),*,
                ))
            }
        }
    };
}

from_row_tuple!(T0 0);
from_row_tuple!(T0 0, T1 1);
from_row_tuple!(T0 0, T1 1, T2 2);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3);

/// A type that can be constructed from [`Column`].
pub trait Decode: Sized {
    /// Try decode self from column.
    fn decode(column: Column) -> Result<Self, DecodeError>;
}

impl Decode for Column {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(column)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        match column.is_null() {
            true => Ok(None),
            false => column.decode().map(Some),
        }
    }
}

impl Decode for () {
    fn decode(_: Column) -> Result<Self, DecodeError> {
        Ok(())
    }
}

/// A value that can be parsed directly from a column's textual bytes, without
/// the surrounding `Oid` check `Decode` normally performs.
///
/// Used to decode the elements of [`Vec<T>`] (postgres array literals), whose
/// element `Oid` differs from `T::OID` (e.g. `int4[]` vs `int4`).
pub trait DecodeText: Sized {
    fn decode_text(bytes: Option<&[u8]>) -> Result<Self, DecodeError>;
}

macro_rules! decode_text {
    ($ty:ty) => {
        impl DecodeText for $ty {
            fn decode_text(bytes: Option<&[u8]>) -> Result<Self, DecodeError> {
                let bytes = bytes.ok_or(DecodeError::Null)?;
                let s = std::str::from_utf8(bytes)?;
                s.parse().map_err(|_| {
                    DecodeError::Invalid(format!(concat!("invalid ", stringify!($ty), " value: {s:?}")).into())
                })
            }
        }

        impl Decode for $ty {
            fn decode(col: Column) -> Result<Self, DecodeError> {
                if col.oid() != Self::OID {
                    return Err(DecodeError::OidMissmatch);
                }
                <$ty as DecodeText>::decode_text(col.as_slice())
            }
        }
    };
}

decode_text!(i16);
decode_text!(i32);
decode_text!(i64);
decode_text!(f32);
decode_text!(f64);

impl DecodeText for bool {
    fn decode_text(bytes: Option<&[u8]>) -> Result<Self, DecodeError> {
        match bytes {
            Some(b"t") => Ok(true),
            Some(b"f") => Ok(false),
            Some(other) => Err(DecodeError::Invalid(
                format!("invalid boolean value: {:?}", String::from_utf8_lossy(other)).into(),
            )),
            None => Err(DecodeError::Null),
        }
    }
}

impl Decode for bool {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        if col.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        bool::decode_text(col.as_slice())
    }
}

impl DecodeText for String {
    fn decode_text(bytes: Option<&[u8]>) -> Result<Self, DecodeError> {
        let bytes = bytes.ok_or(DecodeError::Null)?;
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}

impl Decode for String {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        if col.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        Ok(String::from_utf8(col.try_into_value().map(Into::into)?)?)
    }
}

/// `bytea`, decoded from either the hex (`\x...`) or legacy escape format.
///
/// <https://www.postgresql.org/docs/current/datatype-binary.html#id-1.5.7.12.9>
impl Decode for Vec<u8> {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        if col.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let bytes = col.try_into_value()?;
        decode_bytea(&bytes)
    }
}

fn decode_bytea(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if let Some(hex) = bytes.strip_prefix(b"\\x") {
        let hex = std::str::from_utf8(hex)?;
        return hex::decode(hex).map_err(|_| DecodeError::Invalid("invalid bytea hex encoding".into()));
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            Some(b'\\') => {
                out.push(b'\\');
                i += 2;
            },
            Some(_) if bytes.len() >= i + 4 && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b)) => {
                let val = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
                out.push(val);
                i += 4;
            },
            _ => return Err(DecodeError::Invalid("invalid bytea escape sequence".into())),
        }
    }
    Ok(out)
}

/// Postgres array literal (`{e1,e2,...}`), one dimension, `NULL` as the null
/// sentinel for unquoted elements.
///
/// The element `Oid` (e.g. `int4[]`'s `23`-typed elements) is not tracked
/// statically here, so decoding does not verify the container column's `Oid`
/// against `T::OID`; it relies entirely on the textual shape.
impl<T: DecodeText> Decode for Vec<T> {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        let bytes = col.try_into_value()?;
        let s = std::str::from_utf8(&bytes)?;
        parse_pg_array_text(s)?
            .into_iter()
            .map(|e| T::decode_text(e.as_deref().map(str::as_bytes)))
            .collect()
    }
}

fn parse_pg_array_text(s: &str) -> Result<Vec<Option<String>>, DecodeError> {
    let s = s.trim();
    let inner = s
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| DecodeError::Invalid("malformed array literal".into()))?;

    let chars: Vec<char> = inner.chars().collect();
    let mut elems = Vec::new();

    if chars.is_empty() {
        return Ok(elems);
    }

    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '"' {
            let mut value = String::new();
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    value.push(chars[i + 1]);
                    i += 2;
                } else {
                    value.push(chars[i]);
                    i += 1;
                }
            }
            i += 1; // closing quote
            elems.push(Some(value));
            while i < chars.len() && chars[i] != ',' {
                i += 1;
            }
            i += 1; // comma
        } else {
            let start = i;
            while i < chars.len() && chars[i] != ',' {
                i += 1;
            }
            let raw: String = chars[start..i].iter().collect();
            elems.push(if raw == "NULL" { None } else { Some(raw) });
            i += 1; // comma
        }
    }

    Ok(elems)
}

/// `hstore`'s `"key"=>"value"` text form. A `NULL` value decodes to an empty
/// string, since `HashMap<String,String>` cannot represent a per-entry null;
/// use a `HashMap<String, Option<String>>` conversion downstream if that
/// distinction matters.
impl Decode for std::collections::HashMap<String, String> {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        let bytes = col.try_into_value()?;
        let s = std::str::from_utf8(&bytes)?;
        parse_hstore_text(s)
    }
}

fn parse_hstore_text(s: &str) -> Result<std::collections::HashMap<String, String>, DecodeError> {
    fn parse_quoted(chars: &[char], i: &mut usize) -> Result<String, DecodeError> {
        if chars.get(*i) != Some(&'"') {
            return Err(DecodeError::Invalid("malformed hstore literal".into()));
        }
        *i += 1;
        let mut value = String::new();
        while *i < chars.len() && chars[*i] != '"' {
            if chars[*i] == '\\' && *i + 1 < chars.len() {
                value.push(chars[*i + 1]);
                *i += 2;
            } else {
                value.push(chars[*i]);
                *i += 1;
            }
        }
        *i += 1;
        Ok(value)
    }

    let chars: Vec<char> = s.trim().chars().collect();
    let mut map = std::collections::HashMap::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let key = parse_quoted(&chars, &mut i)?;

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if chars.get(i) != Some(&'=') || chars.get(i + 1) != Some(&'>') {
            return Err(DecodeError::Invalid("malformed hstore literal".into()));
        }
        i += 2;

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }

        let rest: String = chars[i..].iter().take(4).collect();
        let value = if rest == "NULL" {
            i += 4;
            String::new()
        } else {
            parse_quoted(&chars, &mut i)?
        };

        map.insert(key, value);

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if chars.get(i) == Some(&',') {
            i += 1;
        }
    }

    Ok(map)
}

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns (bytes start offset, nul string index, nth column).
    fn position(self, body: &[u8], len: u16) -> Result<(usize,usize,u16), DecodeError>;
}

macro_rules! position {
    (
        $self:pat, $body:ident, $len:ident,
        ($offset:ident,$i_nul:ident,$nth:ident) => $test:expr,
        () => $into:expr
    ) => {
        let mut iter = $body.iter().copied().enumerate();
        let mut $offset = 0;

        for $nth in 0..$len {
            let Some(($i_nul, _)) = iter.find(|(_, e)| matches!(e, b'\0')) else {
                break;
            };

            if $test {
                return Ok(($offset,$i_nul,$nth));
            }

            match iter.$nth(SUFFIX) {
                Some((i,_)) => {
                    $offset = i;
                },
                None => break,
            }
        }

        Err(DecodeError::ColumnNotFound($into))
    };
}

impl Index for usize {
    fn position(self, body: &[u8], len: u16) -> Result<(usize,usize,u16), DecodeError> {
        position! {
            self, body, len,
            (off,i_nul,nth) => self == nth as usize,
            () => String::from(itoa::Buffer::new().format(self)).into()
        }
    }
}

impl Index for &str {
    fn position(self, body: &[u8], len: u16) -> Result<(usize,usize,u16), DecodeError> {
        position! {
            self, body, len,
            (off,i_nul,nth) => self.as_bytes() == &body[off..i_nul],
            () => String::from(self).into()
        }
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

unit_error! {
    /// An error when try to [`fetch_one`][crate::query::Query::fetch_one] and not returns any row.
    pub struct RowNotFound("row not found");
}

unit_error! {
    /// An error when [`fetch_one`][crate::query::Query::fetch_one]/[`begin`][crate::phase::begin]-style
    /// single-row operation matched more than one row.
    pub struct TooManyRows("query returned more than one row");
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row value.
pub enum DecodeError {
    /// Postgres return non utf8 string.
    Utf8(Utf8Error),
    /// Column requested not found.
    ColumnNotFound(Cow<'static,str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Oid requested missmatch.
    OidMissmatch,
    /// Row is null.
    Null,
    /// Column body could not be parsed as the requested text representation.
    Invalid(Cow<'static, str>),
    /// Failed to deserialize using `serde_json`.
    #[cfg(feature = "json")]
    Json(serde_json::error::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::OidMissmatch => write!(f, "data type missmatch"),
            Self::Null => write!(f, "unexpected NULL value"),
            Self::Invalid(reason) => write!(f, "{reason}"),
            #[cfg(feature = "json")]
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));
#[cfg(feature = "json")]
from!(<serde_json::error::Error>e => Self::Json(e));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_bytea_hex() {
        assert_eq!(decode_bytea(b"\\xdead").unwrap(), vec![0xde, 0xad]);
    }

    #[test]
    fn decodes_bytea_legacy_escape() {
        assert_eq!(decode_bytea(br"ab\\c\101").unwrap(), b"ab\\cA".to_vec());
    }

    #[test]
    fn decodes_empty_array() {
        assert_eq!(parse_pg_array_text("{}").unwrap(), Vec::<Option<String>>::new());
    }

    #[test]
    fn decodes_array_with_null_and_quoted_elements() {
        let got = parse_pg_array_text(r#"{1,NULL,"a,b","say \"hi\""}"#).unwrap();
        assert_eq!(
            got,
            vec![
                Some("1".to_string()),
                None,
                Some("a,b".to_string()),
                Some(r#"say "hi""#.to_string()),
            ]
        );
    }

    #[test]
    fn decodes_i32_array_via_decode_text() {
        let got = parse_pg_array_text("{1,2,3}")
            .unwrap()
            .into_iter()
            .map(|e| i32::decode_text(e.as_deref().map(str::as_bytes)))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_malformed_array() {
        assert!(parse_pg_array_text("not-an-array").is_err());
    }

    #[test]
    fn decodes_hstore_pairs() {
        let got = parse_hstore_text(r#""a"=>"1", "b"=>NULL, "c"=>"say \"hi\"""#).unwrap();
        assert_eq!(got.get("a").map(String::as_str), Some("1"));
        assert_eq!(got.get("b").map(String::as_str), Some(""));
        assert_eq!(got.get("c").map(String::as_str), Some(r#"say "hi""#));
    }

    #[test]
    fn rejects_malformed_hstore() {
        assert!(parse_hstore_text("not-hstore").is_err());
    }

    fn row_description(fields: &[(&str, Oid)]) -> Bytes {
        let mut buf = bytes::BytesMut::new();
        buf.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for (name, oid) in fields {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b"\0");
            buf.extend_from_slice(&0u32.to_be_bytes()); // table_oid
            buf.extend_from_slice(&0u16.to_be_bytes()); // attribute number
            buf.extend_from_slice(&oid.to_be_bytes());
            buf.extend_from_slice(&0i16.to_be_bytes()); // type size
            buf.extend_from_slice(&0i32.to_be_bytes()); // type modifier
            buf.extend_from_slice(&0u16.to_be_bytes()); // format code
        }
        buf.freeze()
    }

    fn data_row(values: &[Option<&[u8]>]) -> Bytes {
        let mut buf = bytes::BytesMut::new();
        buf.extend_from_slice(&(values.len() as u16).to_be_bytes());
        for value in values {
            match value {
                Some(bytes) => {
                    buf.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                    buf.extend_from_slice(bytes);
                },
                None => buf.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        buf.freeze()
    }

    fn row(fields: &[(&str, Oid)], values: &[Option<&[u8]>]) -> Row {
        let descr = Row::new(row_description(fields));
        descr.inner_clone(data_row(values))
    }

    #[test]
    fn try_get_by_index_and_name() {
        let r = row(&[("id", i32::OID), ("name", String::OID)], &[Some(b"7"), Some(b"joe")]);
        assert_eq!(r.try_get::<_, i32>(0).unwrap(), 7);
        assert_eq!(r.try_get::<_, String>("name").unwrap(), "joe".to_string());
    }

    #[test]
    fn try_get_unknown_column_name_errors() {
        let r = row(&[("id", i32::OID)], &[Some(b"7")]);
        assert!(matches!(r.try_get::<_, i32>("nope"), Err(DecodeError::ColumnNotFound(_))));
    }

    #[test]
    fn try_get_null_into_option() {
        let r = row(&[("id", i32::OID)], &[None]);
        assert_eq!(r.try_get::<_, Option<i32>>(0).unwrap(), None);
    }

    #[test]
    fn into_iter_visits_every_column() {
        let r = row(&[("a", i32::OID), ("b", i32::OID)], &[Some(b"1"), Some(b"2")]);
        let names: Vec<String> = r.into_iter().map(|c| c.unwrap().name().to_owned()).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn tuple_from_row_decodes_in_order() {
        let r = row(&[("a", i32::OID), ("b", String::OID)], &[Some(b"1"), Some(b"two")]);
        let (a, b): (i32, String) = r.decode().unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, "two".to_string());
    }
}

