//! Protocol framing errors.
use std::fmt;

/// An error produced while translating bytes to or from postgres wire messages.
#[derive(Debug)]
pub enum ProtocolError {
    /// A message carried a type byte the decoder did not expect at this point
    /// in the protocol, or did not recognize at all.
    Unexpected {
        expect: Option<u8>,
        found: u8,
        phase: Option<&'static str>,
    },
    /// An `Authentication` message named a sub-protocol this driver has not
    /// implemented (GSS, SSPI, SASL, Kerberos V5).
    UnknownAuth {
        auth: u32,
    },
    /// The connection was closed mid-message; the framer had fewer bytes than
    /// the message header promised and the socket reported EOF.
    ConnectionClosed,
}

impl ProtocolError {
    pub(crate) fn unknown(found: u8) -> ProtocolError {
        Self::Unexpected { expect: None, found, phase: None }
    }

    pub(crate) fn unexpected(expect: u8, found: u8) -> ProtocolError {
        Self::Unexpected { expect: Some(expect), found, phase: None }
    }

    pub(crate) fn unexpected_phase(found: u8, phase: &'static str) -> ProtocolError {
        Self::Unexpected { expect: None, found, phase: Some(phase) }
    }

    pub(crate) fn unknown_auth(auth: u32) -> ProtocolError {
        Self::UnknownAuth { auth }
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unexpected { expect: Some(expect), found, phase: Some(phase) } =>
                write!(f, "unexpected message {found:#x} while {phase}, expected {expect:#x}"),
            Self::Unexpected { expect: Some(expect), found, phase: None } =>
                write!(f, "unexpected message {found:#x}, expected {expect:#x}"),
            Self::Unexpected { expect: None, found, phase: Some(phase) } =>
                write!(f, "unrecognized message {found:#x} while {phase}"),
            Self::Unexpected { expect: None, found, phase: None } =>
                write!(f, "unrecognized message {found:#x}"),
            Self::UnknownAuth { auth } => write!(f, "unsupported authentication method {auth}"),
            Self::ConnectionClosed => f.write_str("connection closed mid-message"),
        }
    }
}
