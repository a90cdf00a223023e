//! Streaming `COPY FROM STDIN` / `COPY TO STDOUT`.
//!
//! Both directions are issued via the simple-query protocol (`COPY ...` is sent as
//! a plain [`Query`][frontend::Query] message); the server switches the connection
//! into copy-in or copy-out mode as signaled by [`CopyInResponse`][backend::CopyInResponse]
//! / [`CopyOutResponse`][backend::CopyOutResponse].
use std::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use bytes::{Buf, Bytes};
use futures_core::Stream;

use crate::{
    Result,
    common::unit_error,
    error::ErrorKind,
    executor::Executor,
    fetch::command_complete,
    postgres::{BackendMessage, backend, frontend},
    row::RowResult,
    sql::Sql,
    transport::{PgTransport, PgTransportExt},
};

/// Largest payload a single `CopyData` message can carry: the message length
/// field is a signed 32-bit int covering itself (4 bytes), so the body is capped
/// at `i32::MAX - 4`; chunk well below that to keep a single frame reasonable.
pub const COPY_MAX_DATA_LEN: usize = 0x3fff_ffff - 4;

unit_error! {
    /// Server acknowledged a `CopyFail` with something other than an error,
    /// which the protocol never does.
    pub struct AbortNotAcknowledged("server did not respond to CopyFail with an error");
}

fn copy_format(mut body: Bytes) -> (bool, u16) {
    let format = body.get_u8();
    let columns = if body.remaining() >= 2 { body.get_u16() } else { 0 };
    (format != 0, columns)
}

/// Issue `sql` (a `COPY ... FROM STDIN` statement) and return a handle to stream
/// data into the server.
///
/// [`CopyIn::finish`] or [`CopyIn::abort`] must be called to complete the copy;
/// dropping the handle without either sends `CopyFail` so the connection isn't
/// left stuck mid-copy.
pub async fn copy_from<SQL, Exe>(sql: SQL, exe: Exe) -> Result<CopyIn<Exe::Transport>>
where
    SQL: Sql,
    Exe: Executor,
{
    let mut io = exe.connection().await?;
    io.send(frontend::Query { sql: sql.sql() });
    io.flush().await?;

    let (is_binary, columns) = match io.recv::<BackendMessage>().await? {
        BackendMessage::CopyInResponse(r) => copy_format(r.body),
        f => return Err(f.unexpected("awaiting CopyInResponse").into()),
    };

    Ok(CopyIn { io, is_binary, columns, done: false })
}

/// Issue `sql` (a `COPY ... TO STDOUT` statement) and return a [`Stream`] of the
/// resulting data chunks.
///
/// The stream must be polled to completion (or the connection is left holding
/// queued `CopyData` that the next operation will have to read and discard).
pub fn copy_to<SQL, Exe>(sql: SQL, exe: Exe) -> CopyOut<SQL, Exe::Future, Exe::Transport>
where
    SQL: Sql,
    Exe: Executor,
{
    CopyOut { sql, io: None, phase: CopyOutPhase::Connect { f: exe.connection() } }
}

/// A connection in `COPY FROM STDIN` streaming mode.
///
/// Returned by [`copy_from`]. [`finish`][CopyIn::finish] or [`abort`][CopyIn::abort]
/// must be called when done.
#[derive(Debug)]
#[must_use = "connection is left mid-copy unless `.finish()` or `.abort()` is called"]
pub struct CopyIn<IO> {
    io: IO,
    is_binary: bool,
    columns: u16,
    done: bool,
}

impl<IO: PgTransport> CopyIn<IO> {
    /// `true` if the server expects binary-format rows rather than text/CSV.
    pub fn is_binary(&self) -> bool {
        self.is_binary
    }

    /// Number of columns the server expects per copied row.
    pub fn columns(&self) -> u16 {
        self.columns
    }

    /// Send a chunk of `COPY` data, splitting it into multiple `CopyData`
    /// messages if it exceeds [`COPY_MAX_DATA_LEN`].
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(COPY_MAX_DATA_LEN.max(1)) {
            self.io.send(frontend::CopyData { data: chunk });
        }
        self.io.flush().await?;
        Ok(())
    }

    /// Signal that the copy is complete. Returns the number of rows affected.
    pub async fn finish(mut self) -> Result<RowResult> {
        self.io.send(frontend::CopyDone);
        self.io.flush().await?;
        let cmd = self.io.recv::<backend::CommandComplete>().await?;
        self.io.recv::<backend::ReadyForQuery>().await?;
        self.done = true;
        Ok(RowResult { rows_affected: command_complete(cmd) })
    }

    /// Abort the copy; any data received by the server for this command is
    /// discarded. `reason` is recorded in the server's log.
    ///
    /// The server always responds to `CopyFail` with an error (SQLSTATE
    /// `57014`); that expected error is swallowed and `Ok(())` returned. Any
    /// other error surfaces as-is.
    pub async fn abort(mut self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.io.send(frontend::CopyFail { message: &reason });
        self.io.flush().await?;
        self.done = true;

        match self.io.recv::<backend::ReadyForQuery>().await {
            Ok(_) => Err(AbortNotAcknowledged.into()),
            Err(e) => match e.kind() {
                ErrorKind::Database(db) if db.error.code == "57014" => Ok(()),
                _ => Err(e),
            },
        }
    }
}

impl<IO: PgTransport> Drop for CopyIn<IO> {
    fn drop(&mut self) {
        if !self.done {
            self.io.send(frontend::CopyFail {
                message: "CopyIn dropped without calling finish() or abort()",
            });
            self.io.ready_request();
        }
    }
}

#[derive(Debug)]
enum CopyOutPhase<ExeFut> {
    Connect { f: ExeFut },
    Query,
    CopyResponse,
    Streaming,
    CommandComplete,
    ReadyForQuery,
    Complete,
}

/// A [`Stream`] of `COPY ... TO STDOUT` data chunks.
///
/// Returned by [`copy_to`].
#[derive(Debug)]
#[must_use = "streams do nothing unless polled"]
pub struct CopyOut<SQL, ExeFut, IO> {
    sql: SQL,
    io: Option<IO>,
    phase: CopyOutPhase<ExeFut>,
}

impl<SQL, ExeFut, IO> Stream for CopyOut<SQL, ExeFut, IO>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
{
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();

        loop {
            match &mut me.phase {
                CopyOutPhase::Connect { f } => {
                    let io = ready!(Pin::new(f).poll(cx)?);
                    me.io = Some(io);
                    me.phase = CopyOutPhase::Query;
                },
                CopyOutPhase::Query => {
                    me.io.as_mut().unwrap().send(frontend::Query { sql: me.sql.sql() });
                    me.phase = CopyOutPhase::CopyResponse;
                },
                CopyOutPhase::CopyResponse => {
                    use BackendMessage::*;
                    match ready!(me.io.as_mut().unwrap().poll_recv(cx)?) {
                        CopyOutResponse(_) => me.phase = CopyOutPhase::Streaming,
                        f => {
                            let err = f.unexpected("awaiting CopyOutResponse");
                            me.phase = CopyOutPhase::Complete;
                            return Poll::Ready(Some(Err(err.into())));
                        },
                    }
                },
                CopyOutPhase::Streaming => {
                    use BackendMessage::*;
                    match ready!(me.io.as_mut().unwrap().poll_recv(cx)?) {
                        CopyData(chunk) => return Poll::Ready(Some(Ok(chunk.data))),
                        CopyDone(_) => me.phase = CopyOutPhase::CommandComplete,
                        f => {
                            let err = f.unexpected("streaming CopyData");
                            me.phase = CopyOutPhase::Complete;
                            return Poll::Ready(Some(Err(err.into())));
                        },
                    }
                },
                CopyOutPhase::CommandComplete => {
                    ready!(me.io.as_mut().unwrap().poll_recv::<backend::CommandComplete>(cx)?);
                    me.phase = CopyOutPhase::ReadyForQuery;
                },
                CopyOutPhase::ReadyForQuery => {
                    ready!(me.io.as_mut().unwrap().poll_recv::<backend::ReadyForQuery>(cx)?);
                    me.phase = CopyOutPhase::Complete;
                },
                CopyOutPhase::Complete => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn copy_format_reads_mode_and_column_count() {
        let body = Bytes::from_static(&[0, 0, 3]);
        assert_eq!(copy_format(body), (false, 3));

        let body = Bytes::from_static(&[1, 0, 2]);
        assert_eq!(copy_format(body), (true, 2));
    }

    #[test]
    fn copy_format_defaults_columns_when_absent() {
        let body = Bytes::from_static(&[0]);
        assert_eq!(copy_format(body), (false, 0));
    }

    #[test]
    fn max_data_len_fits_a_message_length_field() {
        assert!(COPY_MAX_DATA_LEN < i32::MAX as usize);
    }
}
