//! Query API types.
use std::marker::PhantomData;

use crate::{
    Decode, Error, FromRow, Result, Row,
    encode::{Encode, Encoded},
    executor::Executor,
    fetch::{Fetch, FetchCollect, FetchStream, SimpleFetch, SimpleStream, StreamMap, command_complete},
    literal::{self, Literal},
    postgres::backend,
    row::{RowNotFound, RowResult, TooManyRows},
    sql::Sql,
};

/// Entrypoint of the query API.
#[inline]
pub fn query<'val, SQL, Exe>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe, StreamRow<Row>> {
    Query { sql, exe, params: Vec::new(), error: None, _p: PhantomData }
}

/// Entrypoint of the query API.
#[inline]
pub fn query_as<'val, SQL, Exe, R>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe, StreamRow<R>> {
    Query { sql, exe, params: Vec::new(), error: None, _p: PhantomData }
}

/// Entrypoint of the query API.
#[inline]
pub fn query_scalar<'val, SQL, Exe, D>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe, StreamScalar<D>> {
    Query { sql, exe, params: Vec::new(), error: None, _p: PhantomData }
}

/// Entrypoint for a statement executed for its side effect, ignoring any rows it
/// returns. Sugar for [`query`] typed so `.execute()` is the natural next call.
#[inline]
pub fn execute<'val, SQL, Exe>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe, StreamRow<Row>> {
    query(sql, exe)
}

/// Entrypoint for a statement executed for its side effect, asserting exactly
/// one row was affected. Errors with [`RowNotFound`] (0 rows) or
/// [`TooManyRows`] (more than 1) otherwise.
#[inline]
pub fn exec_one<'val, SQL, Exe>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe, StreamRow<Row>> {
    query(sql, exe)
}

pub use crate::phase::begin;

/// The query API.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Query<'val, SQL, Exe, M> {
    sql: SQL,
    exe: Exe,
    params: Vec<Encoded<'val>>,
    /// Set by the first [`bind`][Self::bind] call whose value fails to
    /// encode. Carried through to the fetch/execute entrypoints so it
    /// surfaces as the operation's result instead of reaching the wire.
    error: Option<Error>,
    _p: PhantomData<M>,
}

impl<'val, SQL, Exe, M> Query<'val, SQL, Exe, M> {
    /// Bind query parameter.
    #[inline]
    pub fn bind<V: Encode<'val>>(mut self, value: V) -> Self {
        if self.error.is_none() {
            match value.encode() {
                Ok(enc) => self.params.push(enc),
                Err(e) => self.error = Some(e.into()),
            }
        }
        self
    }
}

impl<'val, SQL, Exe, M> Query<'val, SQL, Exe, M> {
    /// Fetch rows using [`Stream`][futures_core::Stream] api.
    ///
    /// The returned `Stream` must be polled/awaited until completion,
    /// otherwise it will disturb subsequent query.
    ///
    /// Also if [`FromRow`][crate::FromRow] implementation returns error,
    /// stream is suspended.
    #[inline]
    pub fn fetch(self) -> FetchStream<'val, SQL, Exe::Future, Exe::Transport, M>
    where
        Exe: Executor,
        M: StreamMap,
    {
        FetchStream::new(self.sql, self.exe.connection(), self.params, 0, self.error)
    }

    /// Fetch all rows into [`Vec`].
    #[inline]
    pub fn fetch_all(self) -> Fetch<'val, SQL, Exe::Future, Exe::Transport, M, CollectAll<M::Output>>
    where
        Exe: Executor,
        M: StreamMap,
    {
        Fetch::new(
            self.sql,
            self.exe.connection(),
            self.params,
            CollectAll(Vec::new()),
            0,
            self.error,
        )
    }

    /// Fetch one row.
    #[inline]
    pub fn fetch_one(self) -> Fetch<'val, SQL, Exe::Future, Exe::Transport, M, CollectOne<M::Output>>
    where
        Exe: Executor,
        M: StreamMap,
    {
        Fetch::new(
            self.sql,
            self.exe.connection(),
            self.params,
            CollectOne(None),
            1,
            self.error,
        )
    }

    /// Optionally fetch one row.
    #[inline]
    pub fn fetch_optional(self) -> Fetch<'val, SQL, Exe::Future, Exe::Transport, M, CollectOpt<M::Output>>
    where
        Exe: Executor,
        M: StreamMap,
    {
        Fetch::new(
            self.sql,
            self.exe.connection(),
            self.params,
            CollectOpt(None),
            1,
            self.error,
        )
    }

    /// Execute statement and return number of rows affected.
    #[inline]
    pub fn execute(self) -> Fetch<'val, SQL, Exe::Future, Exe::Transport, M, CollectCmd>
    where
        Exe: Executor,
    {
        Fetch::new(self.sql, self.exe.connection(), self.params, CollectCmd, 0, self.error)
    }

    /// Execute statement, asserting exactly one row was affected.
    ///
    /// Errors with [`RowNotFound`] if no rows were affected, or
    /// [`TooManyRows`] if more than one was.
    #[inline]
    pub fn exec_one(self) -> Fetch<'val, SQL, Exe::Future, Exe::Transport, M, CollectCmdOne>
    where
        Exe: Executor,
    {
        Fetch::new(self.sql, self.exe.connection(), self.params, CollectCmdOne, 0, self.error)
    }
}

impl<'val, SQL, Exe, M> IntoFuture for Query<'val, SQL, Exe, M>
where
    SQL: Sql + Unpin,
    Exe: Executor + Unpin,
    M: StreamMap<Output = Row> + Unpin,
{
    type Output = Result<RowResult>;

    type IntoFuture = Fetch<'val, SQL, Exe::Future, Exe::Transport, M, CollectCmd>;

    #[inline]
    fn into_future(self) -> Self::IntoFuture {
        self.execute()
    }
}


impl<SQL, Exe, M> IntoFuture for Interpolate<SQL, Exe, M>
where
    SQL: Sql,
    Exe: Executor,
    Exe::Future: Unpin,
    Exe::Transport: Unpin,
    M: StreamMap<Output = Row> + Unpin,
{
    type Output = Result<RowResult>;

    type IntoFuture = SimpleFetch<Exe::Future, Exe::Transport, M, CollectCmd>;

    #[inline]
    fn into_future(self) -> Self::IntoFuture {
        self.execute()
    }
}

// ===== Stream Adapters =====

pub struct StreamRow<R>(PhantomData<R>);

pub struct StreamScalar<D>(PhantomData<D>);

impl<R> StreamMap for StreamRow<R>
where
    R: FromRow,
{
    type Output = R;

    #[inline]
    fn map(row: Row) -> Result<Self::Output> {
        R::from_row(row).map_err(Into::into)
    }
}

impl<D> StreamMap for StreamScalar<D>
where
    D: Decode,
{
    type Output = D;

    #[inline]
    fn map(row: Row) -> Result<Self::Output> {
        match <(D,)>::from_row(row) {
            Ok(ok) => Ok(ok.0),
            Err(err) => Err(err.into()),
        }
    }
}

// ===== Fetch Adapters =====

/// [`FetchCollect`] adapter used by [`fetch_all`][Query::fetch_all].
#[derive(Debug)]
pub struct CollectAll<R>(pub Vec<R>);

/// [`FetchCollect`] adapter used by [`fetch_one`][Query::fetch_one].
#[derive(Debug)]
pub struct CollectOne<R>(pub Option<R>);

/// [`FetchCollect`] adapter used by [`fetch_optional`][Query::fetch_optional].
#[derive(Debug)]
pub struct CollectOpt<R>(pub Option<R>);

/// [`FetchCollect`] adapter used by [`execute`][Query::execute].
#[derive(Debug)]
pub struct CollectCmd;

impl<R> FetchCollect<R> for CollectAll<R> {
    type Output = Vec<R>;

    #[inline]
    fn value(&mut self, input: R) -> Result<()> {
        self.0.push(input);
        Ok(())
    }

    #[inline]
    fn finish(&mut self, _: Option<backend::CommandComplete>) -> Result<Self::Output> {
        Ok(std::mem::take(&mut self.0))
    }
}

impl<R> FetchCollect<R> for CollectOpt<R> {
    type Output = Option<R>;

    #[inline]
    fn value(&mut self, input: R) -> Result<()> {
        self.0 = Some(input);
        Ok(())
    }

    #[inline]
    fn finish(&mut self, _: Option<backend::CommandComplete>) -> Result<Self::Output> {
        Ok(self.0.take())
    }
}

impl<R> FetchCollect<R> for CollectOne<R> {
    type Output = R;

    #[inline]
    fn value(&mut self, input: R) -> Result<()> {
        if self.0.replace(input).is_some() {
            return Err(TooManyRows.into());
        }
        Ok(())
    }

    #[inline]
    fn finish(&mut self, _: Option<backend::CommandComplete>) -> Result<Self::Output> {
        match self.0.take() {
            Some(ok) => Ok(ok),
            None => Err(RowNotFound.into()),
        }
    }
}

impl FetchCollect<Row> for CollectCmd {
    type Output = RowResult;

    #[inline]
    fn value(&mut self, _: Row) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn finish(&mut self, cmd: Option<backend::CommandComplete>) -> Result<Self::Output> {
        Ok(RowResult {
            rows_affected: cmd.map(command_complete).expect("only PortalSuspended"),
        })
    }
}

/// [`FetchCollect`] adapter used by [`exec_one`][Query::exec_one].
#[derive(Debug)]
pub struct CollectCmdOne;

impl FetchCollect<Row> for CollectCmdOne {
    type Output = RowResult;

    #[inline]
    fn value(&mut self, _: Row) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn finish(&mut self, cmd: Option<backend::CommandComplete>) -> Result<Self::Output> {
        let rows_affected = cmd.map(command_complete).expect("only PortalSuspended");
        match rows_affected {
            0 => Err(RowNotFound.into()),
            1 => Ok(RowResult { rows_affected }),
            _ => Err(TooManyRows.into()),
        }
    }
}

// ===== Literal interpolation =====

/// Entrypoint for a query whose `?`/`$N` placeholders are substituted with
/// literal SQL text and executed over the simple-query protocol, rather than
/// bound via Parse/Bind. See [`crate::literal`].
#[inline]
pub fn interpolate<SQL, Exe>(sql: SQL, exe: Exe) -> Interpolate<SQL, Exe, StreamRow<Row>> {
    Interpolate { sql, exe, values: Vec::new(), error: None, _p: PhantomData }
}

/// Like [`interpolate`], decoding rows into `R` via [`FromRow`].
#[inline]
pub fn interpolate_as<SQL, Exe, R>(sql: SQL, exe: Exe) -> Interpolate<SQL, Exe, StreamRow<R>> {
    Interpolate { sql, exe, values: Vec::new(), error: None, _p: PhantomData }
}

/// Like [`interpolate`], decoding a single column per row.
#[inline]
pub fn interpolate_scalar<SQL, Exe, D>(sql: SQL, exe: Exe) -> Interpolate<SQL, Exe, StreamScalar<D>> {
    Interpolate { sql, exe, values: Vec::new(), error: None, _p: PhantomData }
}

/// Builder for a literal-interpolated query. See [`interpolate`].
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Interpolate<SQL, Exe, M> {
    sql: SQL,
    exe: Exe,
    values: Vec<String>,
    /// Set by the first [`bind`][Self::bind] call whose value fails to
    /// render, mirroring [`Query`]'s deferred bind error.
    error: Option<Error>,
    _p: PhantomData<M>,
}

impl<SQL, Exe, M> Interpolate<SQL, Exe, M> {
    /// Bind a value, rendering it to literal SQL text immediately.
    #[inline]
    pub fn bind<V: Literal>(mut self, value: V) -> Self {
        if self.error.is_none() {
            let mut buf = String::new();
            match value.append_literal(&mut buf) {
                Ok(()) => self.values.push(buf),
                Err(e) => self.error = Some(e.into()),
            }
        }
        self
    }

    fn build(self) -> (String, Exe, Option<Error>)
    where
        SQL: Sql,
    {
        let Interpolate { sql, exe, values, error, .. } = self;
        match error {
            Some(e) => (String::new(), exe, Some(e)),
            None => match literal::substitute(sql.sql(), &values) {
                Ok(text) => (text, exe, None),
                Err(e) => (String::new(), exe, Some(e.into())),
            },
        }
    }
}

impl<SQL, Exe, M> Interpolate<SQL, Exe, M>
where
    SQL: Sql,
    Exe: Executor,
    M: StreamMap,
{
    /// Fetch rows using [`Stream`][futures_core::Stream] api.
    #[inline]
    pub fn fetch(self) -> SimpleStream<Exe::Future, Exe::Transport, M> {
        let (sql, exe, error) = self.build();
        SimpleStream::new(sql, exe.connection(), error)
    }

    /// Fetch all rows into [`Vec`].
    #[inline]
    pub fn fetch_all(self) -> SimpleFetch<Exe::Future, Exe::Transport, M, CollectAll<M::Output>> {
        let (sql, exe, error) = self.build();
        SimpleFetch::new(sql, exe.connection(), CollectAll(Vec::new()), error)
    }

    /// Fetch one row.
    #[inline]
    pub fn fetch_one(self) -> SimpleFetch<Exe::Future, Exe::Transport, M, CollectOne<M::Output>> {
        let (sql, exe, error) = self.build();
        SimpleFetch::new(sql, exe.connection(), CollectOne(None), error)
    }

    /// Optionally fetch one row.
    #[inline]
    pub fn fetch_optional(self) -> SimpleFetch<Exe::Future, Exe::Transport, M, CollectOpt<M::Output>> {
        let (sql, exe, error) = self.build();
        SimpleFetch::new(sql, exe.connection(), CollectOpt(None), error)
    }

    /// Execute statement and return number of rows affected.
    #[inline]
    pub fn execute(self) -> SimpleFetch<Exe::Future, Exe::Transport, M, CollectCmd> {
        let (sql, exe, error) = self.build();
        SimpleFetch::new(sql, exe.connection(), CollectCmd, error)
    }

    /// Execute statement, asserting exactly one row was affected.
    #[inline]
    pub fn exec_one(self) -> SimpleFetch<Exe::Future, Exe::Transport, M, CollectCmdOne> {
        let (sql, exe, error) = self.build();
        SimpleFetch::new(sql, exe.connection(), CollectCmdOne, error)
    }
}

