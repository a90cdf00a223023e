/// Postgres data transmission format code.
///
/// As of PostgreSQL 7.4 the wire protocol supports "text" (code zero) and "binary"
/// (code one) formats. This driver only ever negotiates the text format: every
/// parameter sent in a `Bind` message and every result column requested in a
/// `Describe`/`Bind` carries format code zero, so encode/decode only has to deal
/// with one textual representation per type instead of two.
///
/// <https://www.postgresql.org/docs/current/protocol-overview.html#PROTOCOL-FORMAT-CODES>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgFormat;

impl PgFormat {
    /// Format code sent on the wire. Always zero (text).
    pub const fn format_code(&self) -> u16 {
        0
    }
}
