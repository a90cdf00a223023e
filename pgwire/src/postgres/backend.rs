//! Postgres Backend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{Buf, Bytes};

use super::ProtocolError;
use crate::{common::ByteStr, ext::BytesExt};

/// A type that can be decoded from a postgres backend message.
pub trait BackendProtocol: Sized + std::fmt::Debug {
    /// Try to decode the given bytes into a message.
    ///
    /// `body` is only the main body, **excluding** message type and length.
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError>;
}

/// Postgres backend messages.
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    CopyInResponse(CopyInResponse),
    CopyOutResponse(CopyOutResponse),
    CopyData(CopyData),
    CopyDone(CopyDone),
    DataRow(DataRow),
    ErrorResponse(ErrorResponse),
    EmptyQueryResponse(EmptyQueryResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            /// Returns the message type.
            pub const fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get the message name for a message type.
            ///
            /// Returns `"Unknown"` for an unrecognized message type.
            pub const fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    _ => "Unknown",
                }
            }

            /// Build a protocol error reporting that this message was not expected
            /// during `phase`.
            pub(crate) fn unexpected(&self, phase: &'static str) -> ProtocolError {
                ProtocolError::unexpected_phase(self.msgtype(), phase)
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::unknown(msgtype)),
                };
                Ok(message)
            }
        }
        impl std::fmt::Debug for BackendMessage {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                match self {
                    $(Self::$name(e) => std::fmt::Debug::fmt(e, f),)*
                }
            }
        }
    };
}

match_backend! {
    Authentication,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    CopyInResponse,
    CopyOutResponse,
    CopyData,
    CopyDone,
    DataRow,
    ErrorResponse,
    EmptyQueryResponse,
    NegotiateProtocolVersion,
    NoData,
    NoticeResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(ProtocolError::unexpected(Self::MSGTYPE,$typ))
        }
    };
}

macro_rules! msgtype {
    ($me:ident,$ty:literal) => {
        impl $me {
            #[doc = concat!("`",stringify!($ty),"`")]
            pub const MSGTYPE: u8 = $ty;
        }
    };
}

/// Identifies the message as an authentication request.
#[derive(Debug)]
pub enum Authentication {
    /// Authentication was successful.
    Ok,
    /// Kerberos V5 authentication is required.
    KerberosV5,
    /// A clear-text password is required.
    CleartextPassword,
    /// An MD5-encrypted password is required.
    MD5Password {
        /// Salt to mix into the MD5 digest.
        salt: [u8; 4],
    },
    /// GSSAPI authentication is required.
    GSS,
    /// GSSAPI or SSPI authentication data.
    GSSContinue { data: Bytes },
    /// SSPI authentication is required.
    SSPI,
    /// SASL authentication is required.
    SASL { name: Bytes },
    /// This message contains a SASL challenge.
    SASLContinue { data: Bytes },
    /// SASL authentication has completed.
    SASLFinal { data: Bytes },
}

msgtype!(Authentication, b'R');

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        let auth = match body.get_u32() {
            0 => Self::Ok,
            2 => Self::KerberosV5,
            3 => Self::CleartextPassword,
            5 => Self::MD5Password { salt: body.get_u32().to_be_bytes() },
            7 => Self::GSS,
            8 => Self::GSSContinue { data: body },
            9 => Self::SSPI,
            10 => Self::SASL { name: body },
            11 => Self::SASLContinue { data: body },
            12 => Self::SASLFinal { data: body },
            auth => return Err(ProtocolError::unknown_auth(auth)),
        };
        Ok(auth)
    }
}

/// Identifies the message as cancellation key data.
///
/// The frontend must save these values to issue `CancelRequest` messages later.
pub struct BackendKeyData {
    pub process_id: u32,
    pub secret_key: u32,
}

msgtype!(BackendKeyData, b'K');

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            process_id: body.get_u32(),
            secret_key: body.get_u32(),
        })
    }
}

/// Identifies the message as a run-time parameter status report.
#[derive(Debug)]
pub struct ParameterStatus {
    pub name: ByteStr,
    pub value: ByteStr,
}

msgtype!(ParameterStatus, b'S');

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            name: body.get_nul_bytestr().map_err(|_| ProtocolError::unknown(msgtype))?,
            value: body.get_nul_bytestr().map_err(|_| ProtocolError::unknown(msgtype))?,
        })
    }
}

/// Decoded server error/notice fields.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub severity: ByteStr,
    pub code: ByteStr,
    pub message: ByteStr,
    pub detail: Option<ByteStr>,
    pub hint: Option<ByteStr>,
}

impl DatabaseError {
    fn parse(mut body: Bytes) -> Result<Self, ProtocolError> {
        let mut severity = None;
        let mut code = None;
        let mut message = None;
        let mut detail = None;
        let mut hint = None;

        loop {
            if !body.has_remaining() {
                break;
            }
            let field = body.get_u8();
            if field == 0 {
                break;
            }
            let value = body
                .get_nul_bytestr()
                .map_err(|_| ProtocolError::unknown(field))?;
            match field {
                // `V`, the non-localized severity, takes precedence over `S` when both appear.
                b'S' => { severity.get_or_insert(value); },
                b'V' => severity = Some(value),
                b'C' => { code.get_or_insert(value); },
                b'M' => { message.get_or_insert(value); },
                b'D' => { detail.get_or_insert(value); },
                b'H' => { hint.get_or_insert(value); },
                _ => continue,
            }
        }

        Ok(Self {
            severity: severity.unwrap_or_default(),
            code: code.unwrap_or_default(),
            message: message.unwrap_or_default(),
            detail,
            hint,
        })
    }

    /// Whether this is a constraint/integrity-violation error (SQLSTATE class `23`).
    pub fn is_integrity_violation(&self) -> bool {
        self.code.starts_with("23")
    }
}

/// Identifies the message as a notice: a warning-level server message that is
/// absorbed by the transport and never surfaced as an [`Err`].
#[derive(Debug, Clone)]
pub struct NoticeResponse {
    pub error: DatabaseError,
}

msgtype!(NoticeResponse, b'N');

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { error: DatabaseError::parse(body)? })
    }
}

/// Identifies the message as an error.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub error: DatabaseError,
}

msgtype!(ErrorResponse, b'E');

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { error: DatabaseError::parse(body)? })
    }
}

/// Identifies the message as a row description.
pub struct RowDescription {
    /// Raw message body.
    ///
    /// - `Int16` number of fields (can be zero), then for each field:
    /// - `String` field name
    /// - `Int32` table OID, or zero
    /// - `Int16` column attribute number, or zero
    /// - `Int32` field type OID
    /// - `Int16` type size (negative denotes variable-width)
    /// - `Int32` type modifier
    /// - `Int16` format code (always zero here)
    pub body: Bytes,
}

msgtype!(RowDescription, b'T');

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a data row.
pub struct DataRow {
    /// Raw row buffer: `Int16` column count, then for each column an `Int32` length
    /// (`-1` for `NULL`) followed by that many bytes of textual value.
    pub body: Bytes,
}

msgtype!(DataRow, b'D');

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a command-completed response.
#[derive(Debug)]
pub struct CommandComplete {
    /// The command tag, e.g. `INSERT 0 3`, `SELECT 14`, `COPY 7`.
    pub tag: ByteStr,
}

msgtype!(CommandComplete, b'C');

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            tag: body.get_nul_bytestr().map_err(|_| ProtocolError::unknown(msgtype))?,
        })
    }
}

/// Identifies the message as a protocol version negotiation message.
#[derive(Debug)]
pub struct NegotiateProtocolVersion {
    pub minor: u32,
    pub len: u32,
    pub opt_names: Bytes,
}

msgtype!(NegotiateProtocolVersion, b'v');

impl BackendProtocol for NegotiateProtocolVersion {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            minor: body.get_u32(),
            len: body.get_u32(),
            opt_names: body,
        })
    }
}

/// Identifies the message as a parameter description.
#[derive(Debug)]
pub struct ParameterDescription {
    pub param_len: u16,
    /// For each parameter, an `Int32` type OID.
    pub oids: Bytes,
}

msgtype!(ParameterDescription, b't');

impl BackendProtocol for ParameterDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            param_len: body.get_u16(),
            oids: body,
        })
    }
}

/// Sent whenever the backend is ready for a new query cycle.
pub struct ReadyForQuery {
    /// `'I'` idle, `'T'` in a transaction block, `'E'` in a failed transaction block.
    pub tx_status: u8,
}

msgtype!(ReadyForQuery, b'Z');

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { tx_status: body.get_u8() })
    }
}

/// Identifies the message as a Start Copy In response.
pub struct CopyInResponse {
    pub body: Bytes,
}

msgtype!(CopyInResponse, b'G');

impl BackendProtocol for CopyInResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a Start Copy Out response.
pub struct CopyOutResponse {
    pub body: Bytes,
}

msgtype!(CopyOutResponse, b'H');

impl BackendProtocol for CopyOutResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// A chunk of COPY data sent from the backend.
pub struct CopyData {
    pub data: Bytes,
}

msgtype!(CopyData, b'd');

impl BackendProtocol for CopyData {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { data: body })
    }
}

/// Identifies the message as a COPY-complete indicator, sent from the backend.
#[derive(Debug)]
pub struct CopyDone;

msgtype!(CopyDone, b'c');

impl BackendProtocol for CopyDone {
    fn decode(msgtype: u8, _: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self)
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
            $(#[$doc])*
            #[derive(Debug)]
            pub struct $name;

            msgtype!($name, $ty);

            impl BackendProtocol for $name {
                fn decode(msgtype: u8, _: Bytes) -> Result<Self, ProtocolError> {
                    if $name::MSGTYPE != msgtype {
                        return Err(ProtocolError::unexpected(Self::MSGTYPE, msgtype))
                    }
                    Ok(Self)
                }
            }
    )*};
}

unit_msg! {
    /// Identifies the message as a Bind-complete indicator.
    struct BindComplete, b'2';

    /// Identifies the message as a Close-complete indicator.
    struct CloseComplete, b'3';

    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    struct EmptyQueryResponse, b'I';

    /// Identifies the message as a no-data indicator.
    struct NoData, b'n';

    /// Identifies the message as a Parse-complete indicator.
    struct ParseComplete, b'1';

    /// Identifies the message as a portal-suspended indicator.
    ///
    /// Only appears when an Execute message's row-count limit was reached.
    struct PortalSuspended, b's';
}

// CUSTOM DEBUG

impl std::fmt::Debug for BackendKeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendKeyData")
            .field("process_id", &self.process_id)
            .field("secret_key", &"<REDACTED>")
            .finish()
    }
}

impl std::fmt::Debug for ReadyForQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyForQuery")
            .field("tx_status", &match self.tx_status {
                b'I' => "Idle(I)",
                b'T' => "Transaction(T)",
                b'E' => "FailedTx(E)",
                _ => "unknown",
            })
            .finish()
    }
}

impl std::fmt::Debug for RowDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowDescription").field("body", &"<WIRE>").finish()
    }
}

impl std::fmt::Debug for DataRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataRow").field("body", &"<WIRE>").finish()
    }
}

impl std::fmt::Debug for CopyInResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyInResponse").finish()
    }
}

impl std::fmt::Debug for CopyOutResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyOutResponse").finish()
    }
}

impl std::fmt::Debug for CopyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyData").field("len", &self.data.len()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn field(tag: u8, value: &str) -> Vec<u8> {
        let mut buf = vec![tag];
        buf.extend_from_slice(value.as_bytes());
        buf.push(0);
        buf
    }

    #[test]
    fn parses_error_fields_and_detects_integrity_violation() {
        let mut body = Vec::new();
        body.extend(field(b'S', "ERROR"));
        body.extend(field(b'C', "23505"));
        body.extend(field(b'M', "duplicate key value violates unique constraint"));
        body.extend(field(b'D', "Key (id)=(1) already exists."));
        body.extend(field(b'H', "try a different id"));
        body.push(0);

        let err = DatabaseError::parse(Bytes::from(body)).unwrap();
        assert_eq!(err.severity.as_str(), "ERROR");
        assert_eq!(err.code.as_str(), "23505");
        assert_eq!(err.message.as_str(), "duplicate key value violates unique constraint");
        assert_eq!(err.detail.as_deref(), Some("Key (id)=(1) already exists."));
        assert_eq!(err.hint.as_deref(), Some("try a different id"));
        assert!(err.is_integrity_violation());
    }

    #[test]
    fn non_integrity_code_is_not_flagged() {
        let mut body = Vec::new();
        body.extend(field(b'S', "ERROR"));
        body.extend(field(b'C', "42601"));
        body.extend(field(b'M', "syntax error"));
        body.push(0);

        let err = DatabaseError::parse(Bytes::from(body)).unwrap();
        assert!(!err.is_integrity_violation());
    }

    #[test]
    fn v_field_takes_precedence_over_s() {
        let mut body = Vec::new();
        body.extend(field(b'S', "ERROR (localized)"));
        body.extend(field(b'V', "ERROR"));
        body.extend(field(b'C', "XX000"));
        body.push(0);

        let err = DatabaseError::parse(Bytes::from(body)).unwrap();
        assert_eq!(err.severity.as_str(), "ERROR");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let body = vec![0u8];
        let err = DatabaseError::parse(Bytes::from(body)).unwrap();
        assert_eq!(err.severity.as_str(), "");
        assert_eq!(err.code.as_str(), "");
        assert_eq!(err.message.as_str(), "");
        assert_eq!(err.detail, None);
        assert_eq!(err.hint, None);
    }
}
