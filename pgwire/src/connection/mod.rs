//! Postgres connection.
use bytes::{Buf, BytesMut};
use lru::LruCache;
use std::{
    collections::BTreeMap,
    future::Ready,
    io,
    num::NonZeroUsize,
    task::{Context, Poll, ready},
    time::Instant,
};

use crate::{
    Result,
    common::{span, verbose},
    executor::Executor,
    net::Socket,
    phase,
    postgres::{BackendProtocol, ErrorResponse, FrontendProtocol, NoticeResponse, backend, frontend},
    statement::StatementName,
    transport::{PgTransport, PgTransportExt},
};

mod config;

pub use config::{Config, Network, ParseError};

const DEFAULT_BUF_CAPACITY: usize = 1024;
const DEFAULT_PREPARED_STMT_CACHE: NonZeroUsize = NonZeroUsize::new(24).unwrap();

/// A live connection to a postgres server.
///
/// # Features
///
/// A connection caches prepared statements keyed by a hash of their SQL text; to
/// opt out for a single statement, use [`once`][1] when querying.
///
/// `NoticeResponse` is absorbed: if the `log` feature is enabled it is logged at
/// `warn`, otherwise it is silently dropped. An `ErrorResponse` received outside of
/// an explicit `Sync` round-trip causes the connection to send its own `Sync` and
/// swallow messages until `ReadyForQuery`, matching how postgres itself requires a
/// client to resynchronize after an error in the extended-query protocol.
///
/// # Pending actions
///
/// RAII guards (like [`Transaction`][crate::transaction::Transaction]'s rollback
/// on drop) cannot run async code synchronously; their cleanup is queued here and
/// flushed on the connection's next operation. Used through [`Pool`][2], this
/// queue is drained automatically on release; using [`Connection`] directly is
/// best suited to short-lived, single-purpose connections.
///
/// # Runtime
///
/// All constructors panic if the `tokio` feature is not enabled.
///
/// [1]: crate::sql::SqlExt::once
/// [2]: crate::pool::Pool
#[derive(Debug)]
pub struct Connection {
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,

    stmts: LruCache<u64, StatementName>,

    param_status: BTreeMap<String, String>,
    process_id: u32,
    secret_key: u32,

    connected_at: Instant,
    sync_pending: usize,
    tx_status: u8,
}

impl Connection {
    /// Connect using configuration read from the environment.
    ///
    /// See [`Config::from_env`] for the variables consulted.
    pub fn connect_env() -> impl Future<Output = Result<Connection>> {
        Self::connect_with(Config::from_env())
    }

    /// Connect using a `postgres://` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect using an explicit [`Config`].
    pub async fn connect_with(config: Config) -> Result<Self> {
        span!("connect", host = %config.display_host(), port = config.port());

        let socket = match config.network() {
            Network::Unix => Socket::connect_socket(&config.socket_path()).await?,
            Network::Tcp => Socket::connect_tcp(&config.host, config.port()).await?,
        };

        let mut me = Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            stmts: LruCache::new(DEFAULT_PREPARED_STMT_CACHE),
            param_status: BTreeMap::new(),
            process_id: 0,
            secret_key: 0,
            connected_at: Instant::now(),
            sync_pending: 0,
            tx_status: b'I',
        };

        let phase::StartupResponse { backend_key_data, param_status } =
            phase::startup(&config, &mut me).await?;

        me.process_id = backend_key_data.process_id;
        me.secret_key = backend_key_data.secret_key;
        me.param_status = param_status;

        verbose!("connected, server_version={:?}", me.parameter("server_version"));

        Ok(me)
    }
}

impl Connection {
    /// When the socket connected to the postgres server.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Look up a run-time parameter reported by the server during startup or
    /// updated afterward (`server_version`, `client_encoding`, `TimeZone`, ...).
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.param_status.get(name).map(String::as_str)
    }

    /// The `(process_id, secret_key)` pair needed to build a [`CancelRequest`][1]
    /// against this connection from another socket.
    ///
    /// [1]: crate::postgres::frontend::CancelRequest
    pub fn cancel_token(&self) -> (u32, u32) {
        (self.process_id, self.secret_key)
    }

    /// The transaction status (`'I'` idle, `'T'` in a transaction, `'E'` in a
    /// failed transaction block) reported with the last `ReadyForQuery`.
    pub fn tx_status(&self) -> u8 {
        self.tx_status
    }
}

impl Connection {
    /// Begin shutting down the socket, returning `Ready` once fully closed.
    pub fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.socket.poll_shutdown(cx)
    }

    /// Close the connection cleanly by sending `Terminate` before shutting down
    /// the socket; an abandoned/dropped connection just closes the socket, which
    /// postgres treats identically.
    pub async fn close(mut self) -> io::Result<()> {
        self.send(frontend::Terminate);
        self.flush().await?;
        self.socket.shutdown().await
    }
}

macro_rules! poll_message {
    (
        poll($io:ident, $cx:ident);
        let $msgtype:ident;
        let $body:ident;
    ) => {
        let Some(mut header) = $io.read_buf.get(..5) else {
            $io.read_buf.reserve(1024);
            let n = ready!(crate::io::poll_read(&mut $io.socket, &mut $io.read_buf, $cx)?);
            if n == 0 {
                return Poll::Ready(Err(crate::postgres::ProtocolError::ConnectionClosed.into()));
            }
            continue;
        };

        let $msgtype = header.get_u8();
        let len = header.get_i32() as _;

        if $io.read_buf.len() - 1/*msgtype*/ < len {
            $io.read_buf.reserve(1 + len);
            let n = ready!(crate::io::poll_read(&mut $io.socket, &mut $io.read_buf, $cx)?);
            if n == 0 {
                return Poll::Ready(Err(crate::postgres::ProtocolError::ConnectionClosed.into()));
            }
            continue;
        }

        $io.read_buf.advance(5);
        let $body = $io.read_buf.split_to(len - 4).freeze();
    };
}

impl Connection {
    /// Drain all queued actions (deferred `Sync`s from dropped RAII guards).
    pub fn ready(&mut self) -> impl Future<Output = Result<()>> {
        std::future::poll_fn(|cx| self.poll_ready(cx))
    }

    pub(crate) fn poll_ready(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        if !self.write_buf.is_empty() {
            if let Err(e) = ready!(self.poll_flush(cx)) {
                return Poll::Ready(Err(e.into()));
            }
        }

        while self.sync_pending != 0 {
            poll_message! {
                poll(self, cx);
                let msgtype;
                let body;
            }

            match msgtype {
                ErrorResponse::MSGTYPE => {
                    self.send(frontend::Sync);
                    self.ready_request();
                    #[cfg(feature = "log")]
                    if let Ok(msg) = ErrorResponse::decode(msgtype, body) {
                        log::error!("{}", msg.error.message);
                    }
                },
                backend::ParameterStatus::MSGTYPE => {
                    if let Ok(status) = backend::ParameterStatus::decode(msgtype, body) {
                        self.param_status.insert(status.name.to_string(), status.value.to_string());
                    }
                },
                NoticeResponse::MSGTYPE => {
                    #[cfg(feature = "log")]
                    if let Ok(msg) = NoticeResponse::decode(msgtype, body) {
                        log::warn!("{}", msg.error.message);
                    }
                },
                backend::ReadyForQuery::MSGTYPE => {
                    if let Ok(rfq) = backend::ReadyForQuery::decode(msgtype, body.clone()) {
                        self.tx_status = rfq.tx_status;
                    }
                    self.sync_pending -= 1;
                },
                _ => {} // ignore all other messages until `ReadyForQuery`
            }
        }

        Poll::Ready(Ok(()))
    }
}

impl PgTransport for Connection {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        crate::io::poll_write_all(&mut self.socket, &mut self.write_buf, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        if let Err(e) = ready!(self.poll_ready(cx)) {
            return Poll::Ready(Err(e));
        }

        loop {
            poll_message! {
                poll(self, cx);
                let msgtype;
                let body;
            }

            match msgtype {
                ErrorResponse::MSGTYPE => {
                    self.send(frontend::Sync);
                    self.ready_request();
                    return match ErrorResponse::decode(msgtype, body) {
                        Ok(e) => Poll::Ready(Err(e.into())),
                        Err(e) => Poll::Ready(Err(e.into())),
                    };
                },
                backend::ParameterStatus::MSGTYPE => {
                    let status = match backend::ParameterStatus::decode(msgtype, body) {
                        Ok(status) => status,
                        Err(e) => return Poll::Ready(Err(e.into())),
                    };
                    self.param_status.insert(status.name.to_string(), status.value.to_string());
                    continue;
                },
                NoticeResponse::MSGTYPE => {
                    #[cfg(feature = "log")]
                    match NoticeResponse::decode(msgtype, body) {
                        Ok(notice) => log::warn!("{}", notice.error.message),
                        Err(e) => return Poll::Ready(Err(e.into())),
                    }
                    continue;
                },
                backend::ReadyForQuery::MSGTYPE => {
                    if let Ok(rfq) = backend::ReadyForQuery::decode(msgtype, body.clone()) {
                        self.tx_status = rfq.tx_status;
                    }
                    return Poll::Ready(B::decode(msgtype, body).map_err(Into::into));
                },
                _ => return Poll::Ready(B::decode(msgtype, body).map_err(Into::into)),
            }
        }
    }

    fn ready_request(&mut self) {
        self.sync_pending += 1;
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        frontend::write(message, &mut self.write_buf);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        startup.write(&mut self.write_buf);
    }

    fn get_stmt(&mut self, sqlid: u64) -> Option<StatementName> {
        self.stmts.get(&sqlid).cloned()
    }

    fn add_stmt(&mut self, id: u64, name: StatementName) {
        if let Some((_id, name)) = self.stmts.push(id, name) {
            self.send(frontend::Close { variant: b'S', name: name.as_str() });
            self.send(frontend::Sync);
            self.ready_request();
        }
    }

    fn forget_stmt(&mut self, sqlid: u64) -> Option<StatementName> {
        self.stmts.pop(&sqlid)
    }
}

impl Executor for Connection {
    type Transport = Self;

    type Future = Ready<Result<Self::Transport>>;

    fn connection(self) -> Self::Future {
        std::future::ready(Ok(self))
    }
}
