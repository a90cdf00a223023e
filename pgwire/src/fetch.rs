use futures_core::Stream;
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    marker::PhantomData,
    mem,
    pin::Pin,
    task::{Context, Poll, ready},
};

use crate::{
    Error, Result, Row,
    common::unit_error,
    encode::Encoded,
    ext::UsizeExt,
    postgres::{
        PgFormat,
        backend::{self, CommandComplete},
        frontend,
    },
    sql::Sql,
    statement::{PortalName, StatementName},
    transport::PgTransport,
};

unit_error! {
    /// Response when fetching against an empty SQL string.
    ///
    /// Substitutes for `CommandComplete`; postgres itself refuses to prepare or
    /// execute an empty statement.
    pub struct EmptyQueryError("query string is empty");
}

#[derive(Debug)]
pub struct PrepareData {
    pub sqlid: u64,
    pub stmt: StatementName,
    pub cache_hit: bool,
    /// this field intended to be edited by called for `portal` params.
    pub max_row: u32,
}

/// Write Prepare statement to `io`.
///
/// If cache hit, no further action is required.
///
/// If cache miss, flushing is required, with responses possible:
/// - `ParseComplete` from `Parse`
///
/// Also caller might want to cache the returned statement.
fn prepare(
    sql: &impl Sql,
    params: &[Encoded],
    mut io: impl PgTransport,
) -> PrepareData {
    let persist = sql.persistent();
    let sql = sql.sql().trim();

    let sqlid = {
        let mut buf = DefaultHasher::new();
        sql.hash(&mut buf);
        buf.finish()
    };

    if persist {
        if let Some(stmt) = io.get_stmt(sqlid) {
            return PrepareData { sqlid, stmt, cache_hit: true, max_row: 0 };
        }
    }

    let stmt = match persist {
        true => StatementName::next(),
        false => StatementName::unnamed(),
    };

    io.send(frontend::Parse {
        prepare_name: stmt.as_str(),
        sql,
        oids_len: params.len() as _,
        oids: params.iter().map(Encoded::oid),
    });
    io.send(frontend::Flush);

    PrepareData { sqlid, stmt, cache_hit: false, max_row: 0 }
}

/// Write Prepare statement to `io`.
///
/// Flushing is required after call.
///
/// Responses possible:
/// - `BindComplete` from `Bind`
/// - `RowDescription` or `NoData` from `Describe`
/// - `DataRow` from `Execute`
/// - `Execute` phase is always terminated by the appearance of exactly one of these messages:
///   - `CommandComplete`
///   - `EmptyQueryResponse`
///   - `ErrorResponse`
///   - `PortalSuspended`
/// - `ReadyForQuery` from `Sync`
fn portal(data: &PrepareData, params: &mut Vec<Encoded>, mut io: impl PgTransport) {
    let portal = PortalName::unnamed();

    io.send(frontend::Bind {
        portal_name: portal.as_str(),
        stmt_name: data.stmt.as_str(),
        param_formats_len: 1,
        param_formats: [PgFormat],
        params_len: params.len().to_u16(),
        params_size_hint: params
            .iter()
            .fold(0, |acc, n| acc + 4 + n.len().to_u32()),
        params: mem::take(params).into_iter(),
        result_formats_len: 1,
        result_formats: [PgFormat],
    });
    io.send(frontend::Describe {
        kind: b'P',
        name: portal.as_str(),
    });
    io.send(frontend::Execute {
        portal_name: portal.as_str(),
        max_row: data.max_row,
    });
    io.send(frontend::Sync);
}

/// Decode information from [`CommandComplete`][1] message.
///
/// [1]: backend::CommandComplete
pub(crate) fn command_complete(cmd: backend::CommandComplete) -> u64 {
    let mut whs = cmd.tag.split_whitespace();
    let Some(tag) = whs.next() else {
        return 0;
    };
    let Some(rows) = whs.next() else {
        return 0;
    };
    match tag {
        "INSERT" => whs.next().unwrap_or_default(),
        "SELECT" => rows,
        "UPDATE" => rows,
        "DELETE" => rows,
        "MERGE" => rows,
        "FETCH" => rows,
        "MOVE" => rows,
        "COPY" => rows,
        _ => return 0,
    }
    .parse()
    .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::ByteStr;

    fn cmd(tag: &str) -> backend::CommandComplete {
        backend::CommandComplete { tag: ByteStr::copy_from_str(tag) }
    }

    #[test]
    fn parses_insert_tag_using_third_token() {
        assert_eq!(command_complete(cmd("INSERT 0 3")), 3);
    }

    #[test]
    fn parses_select_tag_using_second_token() {
        assert_eq!(command_complete(cmd("SELECT 7")), 7);
    }

    #[test]
    fn parses_update_delete_copy_tags() {
        assert_eq!(command_complete(cmd("UPDATE 5")), 5);
        assert_eq!(command_complete(cmd("DELETE 2")), 2);
        assert_eq!(command_complete(cmd("COPY 1000000")), 1_000_000);
    }

    #[test]
    fn non_numeric_or_unknown_tag_yields_zero() {
        assert_eq!(command_complete(cmd("BEGIN")), 0);
        assert_eq!(command_complete(cmd("CREATE TABLE")), 0);
        assert_eq!(command_complete(cmd("")), 0);
    }
}

/// Maps a decoded [`Row`] into a stream's output item.
///
/// Implemented by [`StreamRow`][crate::query::StreamRow] (whole row, via
/// [`FromRow`][crate::FromRow]) and [`StreamScalar`][crate::query::StreamScalar]
/// (single column, via [`Decode`][crate::row::Decode]).
pub trait StreamMap {
    type Output;

    fn map(row: Row) -> Result<Self::Output>;
}

/// Collects the items produced by a [`FetchStream`] into a final output.
///
/// Implemented by the `Collect*` adapters in [`query`][crate::query] backing
/// `fetch_all`/`fetch_one`/`fetch_optional`/`execute`.
pub trait FetchCollect<R> {
    type Output;

    /// Accept one stream item. Returning `Err` (e.g. a second row reaching
    /// [`CollectOne`][crate::query::CollectOne]) aborts collection, but the
    /// stream is still drained to completion to keep the connection in sync.
    fn value(&mut self, input: R) -> Result<()>;

    fn finish(&mut self, cmd: Option<backend::CommandComplete>) -> Result<Self::Output>;
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchStream<'val, SQL, ExeFut, IO, M> {
    sql: SQL,
    io: Option<IO>,
    data: Option<PrepareData>,
    phase: Phase<ExeFut>,
    params: Vec<Encoded<'val>>,
    max_row: u32,
    cmd: Option<CommandComplete>,
    /// An error from binding a parameter, deferred here so it surfaces as
    /// the first stream item instead of being reported at `bind` time.
    bind_error: Option<Error>,
    _p: PhantomData<M>,
}

#[derive(Debug)]
enum Phase<ExeFut> {
    Connect { f: ExeFut },
    Prepare,
    PrepareComplete,
    Portal,
    BindComplete,
    Complete,
    RowDescription,
    DataRow(Row),
    ReadyForQuery,
}

impl<'val, SQL, ExeFut, IO, M> FetchStream<'val, SQL, ExeFut, IO, M> {
    pub fn new(
        sql: SQL,
        exe: ExeFut,
        params: Vec<Encoded<'val>>,
        max_row: u32,
        bind_error: Option<Error>,
    ) -> Self {
        Self {
            sql,
            io: None,
            data: None,
            phase: Phase::Connect { f: exe },
            params,
            max_row,
            cmd: None,
            bind_error,
            _p: PhantomData,
        }
    }
}

impl<SQL, ExeFut, IO, M> Stream for FetchStream<'_, SQL, ExeFut, IO, M>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    M: StreamMap,
{
    type Item = Result<M::Output>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();

        if let Some(err) = me.bind_error.take() {
            me.phase = Phase::Complete;
            return Poll::Ready(Some(Err(err)));
        }

        loop {
            match &mut me.phase {
                Phase::Connect { f } => {
                    let io = ready!(Pin::new(f).poll(cx)?);
                    me.io = Some(io);
                    me.phase = Phase::Prepare;
                },
                Phase::Prepare => {
                    me.data = Some(prepare(&me.sql, &me.params, me.io.as_mut().unwrap()));
                    me.phase = match me.data.as_ref().unwrap().cache_hit {
                        true => Phase::Portal,
                        false => Phase::PrepareComplete,
                    };
                },
                Phase::PrepareComplete => {
                    let io = me.io.as_mut().unwrap();
                    let data = me.data.as_ref().unwrap();
                    ready!(io.poll_recv::<backend::ParseComplete>(cx)?);
                    io.add_stmt(data.sqlid, data.stmt.clone());
                    me.phase = Phase::Portal;
                },
                Phase::Portal => {
                    let data = me.data.as_mut().unwrap();
                    data.max_row = me.max_row;
                    portal(data, &mut me.params, me.io.as_mut().unwrap());
                    me.phase = Phase::BindComplete;
                },
                Phase::BindComplete => {
                    ready!(me.io.as_mut().unwrap().poll_recv::<backend::BindComplete>(cx)?);
                    me.phase = Phase::RowDescription;
                }
                Phase::RowDescription => {
                    use backend::BackendMessage::*;
                    match ready!(me.io.as_mut().unwrap().poll_recv(cx)?) {
                        NoData(_) => { },
                        // Received after `NoData`
                        CommandComplete(cmd) => {
                            me.cmd = Some(cmd);
                            me.phase = Phase::ReadyForQuery;
                        },

                        RowDescription(rd) => {
                            me.phase = Phase::DataRow(Row::new(rd.body));
                        },
                        f => {
                            let err = f.unexpected("description recv");
                            me.phase = Phase::Complete;
                            return Poll::Ready(Some(Err(err.into())));
                        },
                    }
                },
                Phase::DataRow(row) => {
                    use backend::BackendMessage::*;
                    match ready!(me.io.as_mut().unwrap().poll_recv(cx)?) {
                        DataRow(dr) => {
                            let row = row.inner_clone(dr.body);
                            let result = M::map(row);
                            if result.is_err() {
                                me.io.as_mut().unwrap().ready_request();
                                me.phase = Phase::Complete;
                            }
                            return Poll::Ready(Some(result));
                        },

                        // `Execute` phase terminations:
                        CommandComplete(cmd) => {
                            me.cmd = Some(cmd);
                        },
                        PortalSuspended(_) => { },
                        EmptyQueryResponse(_) => {
                            me.phase = Phase::Complete;
                            return Poll::Ready(Some(Err(EmptyQueryError.into())));
                        },
                        f => {
                            let err = f.unexpected("fetching data rows");
                            me.phase = Phase::Complete;
                            return Poll::Ready(Some(Err(err.into())));
                        },
                    }

                    me.phase = Phase::ReadyForQuery;
                },
                Phase::ReadyForQuery => {
                    ready!(me.io.as_mut().unwrap().poll_recv::<backend::ReadyForQuery>(cx)?);
                    me.phase = Phase::Complete;
                },
                Phase::Complete => return Poll::Ready(None),
            }
        }
    }
}

/// Streams the results of a literal-interpolated query sent over the
/// simple-query protocol (a single [`frontend::Query`] message), as opposed
/// to [`FetchStream`]'s Parse/Bind/Describe/Execute/Sync sequence.
///
/// Built for [`interpolate`][crate::query::interpolate]: once a query's
/// `?`/`$N` placeholders are substituted with literal SQL text there is no
/// parameter list left to bind, so the simple-query path (which accepts a
/// complete, self-contained SQL string and needs no prior `Parse`) is the
/// natural way to run it.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct SimpleStream<ExeFut, IO, M> {
    sql: String,
    io: Option<IO>,
    phase: SimplePhase<ExeFut>,
    cmd: Option<CommandComplete>,
    bind_error: Option<Error>,
    _p: PhantomData<M>,
}

#[derive(Debug)]
enum SimplePhase<ExeFut> {
    Connect { f: ExeFut },
    Send,
    Message,
    DataRow(Row),
    Complete,
}

impl<ExeFut, IO, M> SimpleStream<ExeFut, IO, M> {
    pub fn new(sql: String, exe: ExeFut, bind_error: Option<Error>) -> Self {
        Self {
            sql,
            io: None,
            phase: SimplePhase::Connect { f: exe },
            cmd: None,
            bind_error,
            _p: PhantomData,
        }
    }
}

impl<ExeFut, IO, M> Stream for SimpleStream<ExeFut, IO, M>
where
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    M: StreamMap,
{
    type Item = Result<M::Output>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();

        if let Some(err) = me.bind_error.take() {
            me.phase = SimplePhase::Complete;
            return Poll::Ready(Some(Err(err)));
        }

        loop {
            match &mut me.phase {
                SimplePhase::Connect { f } => {
                    let io = ready!(Pin::new(f).poll(cx)?);
                    me.io = Some(io);
                    me.phase = SimplePhase::Send;
                },
                SimplePhase::Send => {
                    me.io.as_mut().unwrap().send(frontend::Query { sql: me.sql.as_str() });
                    me.phase = SimplePhase::Message;
                },
                SimplePhase::Message => {
                    use backend::BackendMessage::*;
                    match ready!(me.io.as_mut().unwrap().poll_recv(cx)?) {
                        RowDescription(rd) => {
                            me.phase = SimplePhase::DataRow(Row::new(rd.body));
                        },
                        CommandComplete(cmd) => {
                            me.cmd = Some(cmd);
                            // A multi-statement query string yields one
                            // RowDescription/DataRow*/CommandComplete group
                            // per statement; keep reading until ReadyForQuery.
                        },
                        EmptyQueryResponse(_) => {
                            me.phase = SimplePhase::Complete;
                            return Poll::Ready(Some(Err(EmptyQueryError.into())));
                        },
                        ReadyForQuery(_) => {
                            me.phase = SimplePhase::Complete;
                            return Poll::Ready(None);
                        },
                        f => {
                            let err = f.unexpected("simple query message");
                            me.phase = SimplePhase::Complete;
                            return Poll::Ready(Some(Err(err.into())));
                        },
                    }
                },
                SimplePhase::DataRow(row) => {
                    use backend::BackendMessage::*;
                    match ready!(me.io.as_mut().unwrap().poll_recv(cx)?) {
                        DataRow(dr) => {
                            let row = row.inner_clone(dr.body);
                            let result = M::map(row);
                            if result.is_err() {
                                me.io.as_mut().unwrap().ready_request();
                                me.phase = SimplePhase::Complete;
                            }
                            return Poll::Ready(Some(result));
                        },
                        CommandComplete(cmd) => {
                            me.cmd = Some(cmd);
                            me.phase = SimplePhase::Message;
                        },
                        f => {
                            let err = f.unexpected("simple query data rows");
                            me.phase = SimplePhase::Complete;
                            return Poll::Ready(Some(Err(err.into())));
                        },
                    }
                },
                SimplePhase::Complete => return Poll::Ready(None),
            }
        }
    }
}

/// Drives a [`SimpleStream`] to completion, mirroring [`Fetch`] for the
/// simple-query path.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct SimpleFetch<ExeFut, IO, M, C> {
    fetch: SimpleStream<ExeFut, IO, M>,
    collect: C,
    error: Option<Error>,
}

impl<ExeFut, IO, M, C> SimpleFetch<ExeFut, IO, M, C> {
    pub fn new(sql: String, exe: ExeFut, collect: C, bind_error: Option<Error>) -> Self {
        Self {
            fetch: SimpleStream::new(sql, exe, bind_error),
            collect,
            error: None,
        }
    }
}

impl<ExeFut, IO, M, C> Future for SimpleFetch<ExeFut, IO, M, C>
where
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    M: StreamMap + Unpin,
    C: FetchCollect<M::Output>,
{
    type Output = Result<C::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(item) = ready!(Pin::new(&mut me.fetch).poll_next(cx)) {
            if me.error.is_some() {
                continue;
            }
            match item {
                Ok(row) => {
                    if let Err(e) = me.collect.value(row) {
                        me.error = Some(e);
                    }
                },
                Err(e) => me.error = Some(e),
            }
        }

        match me.error.take() {
            Some(e) => Poll::Ready(Err(e)),
            None => Poll::Ready(me.collect.finish(me.fetch.cmd.take())),
        }
    }
}

/// Drives a [`FetchStream`] to completion, handing each item to a
/// [`FetchCollect`] adapter and returning its final output.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Fetch<'val, SQL, ExeFut, IO, M, C> {
    fetch: FetchStream<'val, SQL, ExeFut, IO, M>,
    collect: C,
    error: Option<Error>,
}

impl<'val, SQL, ExeFut, IO, M, C> Fetch<'val, SQL, ExeFut, IO, M, C> {
    pub fn new(
        sql: SQL,
        exe: ExeFut,
        params: Vec<Encoded<'val>>,
        collect: C,
        max_row: u32,
        bind_error: Option<Error>,
    ) -> Self {
        Self {
            fetch: FetchStream::new(sql, exe, params, max_row, bind_error),
            collect,
            error: None,
        }
    }
}

impl<SQL, ExeFut, IO, M, C> Future for Fetch<'_, SQL, ExeFut, IO, M, C>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    M: StreamMap + Unpin,
    C: FetchCollect<M::Output>,
{
    type Output = Result<C::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(item) = ready!(Pin::new(&mut me.fetch).poll_next(cx)) {
            if me.error.is_some() {
                // Draining the rest of the portal after an earlier error, to leave
                // the connection in sync for the next operation.
                continue;
            }
            match item {
                Ok(row) => {
                    if let Err(e) = me.collect.value(row) {
                        me.error = Some(e);
                    }
                },
                Err(e) => me.error = Some(e),
            }
        }

        match me.error.take() {
            Some(e) => Poll::Ready(Err(e)),
            None => Poll::Ready(me.collect.finish(me.fetch.cmd.take())),
        }
    }
}
