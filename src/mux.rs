//! Handshake, `serve`, `open_stream`, `shutdown`: the muxer facade and its
//! shared, cross-task state.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// `Shared` is the arena that breaks the stream<->muxer ownership cycle
// (design note §9): the active stream map owns every `MuxedStream`; streams
// only hold non-owning handles (`Arc<ReadyList>`, an `Arc<DictionaryTable>`)
// valid for the connection's lifetime. `Muxer` itself is the handle a caller
// holds; `Reader`/`Writer` are consumed by `serve()`.

use crate::dictionary::DictionaryTable;
use crate::dupe::Dupe;
use crate::error::{HandshakeError, MuxError, Reason, Result};
use crate::errors_map::StreamErrorMap;
use crate::frame::settings::CompressionSetting;
use crate::handshake::handshake as run_handshake;
use crate::metrics::{MetricsSnapshot, MetricsUpdater};
use crate::ping::{PingClock, PongClock};
use crate::reader::Reader;
use crate::frame::headers::HeaderList;
use crate::ready::ReadyList;
use crate::stream::{MuxedStream, Role};
use crate::stream_map::StreamTable;
use crate::sync::Signal;
use crate::writer::Writer;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// A boxed future, used for the type-erased peer-initiated-stream handler.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// An optional body source an `open_stream` caller supplies; forwarded into
/// the new stream's write buffer by a dedicated task until it returns EOF.
pub type BodySource = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Handles a peer-initiated stream. Implemented for any
/// `Fn(Arc<MuxedStream>) -> impl Future<Output = ()>`, so callers can pass a
/// plain async closure instead of a hand-written `impl`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, stream: Arc<MuxedStream>) -> BoxFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<MuxedStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, stream: Arc<MuxedStream>) -> BoxFuture {
        Box::pin(self(stream))
    }
}

/// A handler that never gets invoked, for connections that only call
/// `open_stream` and never accept peer-initiated ones.
pub struct NoHandler;

impl Handler for NoHandler {
    fn call(&self, stream: Arc<MuxedStream>) -> BoxFuture {
        Box::pin(async move {
            stream.abort();
        })
    }
}

/// Handshake and connection configuration (spec §6 `handshake` config
/// fields). A plain in-memory struct: config *loading* (files, env) is one
/// of spec §1's external collaborators and stays out of scope here.
pub struct Config {
    pub role: Role,
    pub handshake_timeout: Duration,
    pub handler: Arc<dyn Handler>,
    pub initial_window: u32,
    pub max_window: u32,
    pub max_write_buffer: usize,
    pub heartbeat_interval: Duration,
    pub max_heartbeats: u32,
    pub compression: CompressionSetting,
    pub compression_level: i32,
    pub max_frame_size: u32,
    pub metrics_period: Duration,
    pub connection_name: String,
}

impl Config {
    /// A `Config` with an inert handler and compression disabled, for
    /// callers that only ever call `open_stream` (or tests).
    #[must_use]
    pub fn new(role: Role, handler: Arc<dyn Handler>) -> Self {
        Self {
            role,
            handshake_timeout: Duration::from_secs(10),
            handler,
            initial_window: 256 * 1024,
            max_window: 16 * 1024 * 1024,
            max_write_buffer: 1024 * 1024,
            heartbeat_interval: Duration::from_secs(30),
            max_heartbeats: 3,
            compression: CompressionSetting::disabled(),
            compression_level: 3,
            max_frame_size: crate::frame::DEFAULT_MAX_FRAME_SIZE,
            metrics_period: Duration::from_secs(5),
            connection_name: String::new(),
        }
    }
}

/// Everything the reader and writer tasks, and the `Muxer` handle, share for
/// the lifetime of one connection.
pub struct Shared {
    pub role: Role,
    pub streams: Arc<StreamTable>,
    pub ready: Arc<ReadyList>,
    pub errors: Arc<StreamErrorMap>,
    pub dictionaries: Arc<DictionaryTable>,
    pub ping: Arc<PingClock>,
    pub pong: Arc<PongClock>,
    pub metrics: Arc<MetricsUpdater>,
    pub activity: Arc<Signal>,
    pub handler: Arc<dyn Handler>,
    pub abort: CancellationToken,
    pub open_tx: mpsc::UnboundedSender<OpenStreamRequest>,
    pub goaway_tx: mpsc::UnboundedSender<Reason>,
    pub idle_retries: Arc<AtomicU32>,
    pub initial_window: u32,
    pub max_window: u32,
    pub max_write_buffer: usize,
    pub max_frame_size: u32,
    pub compression_level: i32,
    pub metrics_period: Duration,
    pub connection_name: String,
    pub heartbeat_interval: Duration,
    pub max_heartbeats: u32,
}

/// A pending `open_stream` call, routed to the writer loop (spec §4.4 source
/// 7, "new stream request").
pub struct OpenStreamRequest {
    pub headers: HeaderList,
    pub body: Option<BodySource>,
    pub responder: oneshot::Sender<Result<Arc<MuxedStream>>>,
}

/// A cheap, cloneable handle to a connection's shared state: `open_stream`,
/// `shutdown`, `metrics`, `timer_retries`. Obtained from [`Muxer::handle`]
/// before handing the `Muxer` itself to a task that drives [`Muxer::serve`]
/// to completion — `serve` consumes the `Muxer` outright (there is nothing
/// left to call on it once the connection is being driven), so callers that
/// still need `open_stream` while the connection runs keep a `MuxHandle`
/// instead, the same split `carllerche-h2` exposes as `SendRequest` versus
/// `Connection`.
pub struct MuxHandle {
    shared: Arc<Shared>,
}

impl Clone for MuxHandle {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.dupe(),
        }
    }
}

impl MuxHandle {
    /// Open a new locally-initiated stream and wait for the peer's response
    /// HEADERS. Returns `connection-closed` if the connection has been or is
    /// being torn down.
    pub async fn open_stream(
        &self,
        headers: HeaderList,
        body: Option<BodySource>,
    ) -> Result<Arc<MuxedStream>> {
        open_stream_via(&self.shared, headers, body).await
    }

    /// Initiate graceful shutdown: refuse new peer-initiated streams, ask
    /// the writer to emit GOAWAY, and wait for every stream to close before
    /// tearing the connection down. Idempotent.
    pub async fn shutdown(&self) {
        shutdown_via(&self.shared).await
    }

    /// A point-in-time snapshot of connection metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot(&self.shared.ping)
    }

    /// The idle timer's current consumed-retry count.
    #[must_use]
    pub fn timer_retries(&self) -> u32 {
        self.shared.idle_retries.load(std::sync::atomic::Ordering::Relaxed)
    }
}

async fn open_stream_via(
    shared: &Arc<Shared>,
    headers: HeaderList,
    body: Option<BodySource>,
) -> Result<Arc<MuxedStream>> {
    let (responder, rx) = oneshot::channel();
    shared
        .open_tx
        .send(OpenStreamRequest {
            headers,
            body,
            responder,
        })
        .map_err(|_| MuxError::ConnectionClosed)?;

    let stream = tokio::select! {
        result = rx => result.map_err(|_| MuxError::ConnectionClosed)??,
        () = shared.abort.cancelled() => return Err(MuxError::ConnectionClosed),
    };

    tokio::select! {
        () = stream.inbound_headers_changed() => {}
        () = shared.abort.cancelled() => return Err(MuxError::ConnectionClosed),
    }
    Ok(stream)
}

async fn shutdown_via(shared: &Arc<Shared>) {
    let (notifier, already_in_progress) = shared.streams.shutdown();
    if !already_in_progress {
        let _ = shared.goaway_tx.send(Reason::NoError);
    }
    notifier.cancelled().await;
    shared.abort.cancel();
}

/// The muxer facade: `handshake`, `serve`, `open_stream`, `shutdown`,
/// `metrics`, `timer_retries` (spec §6).
pub struct Muxer<R, W> {
    shared: Arc<Shared>,
    read_half: Option<R>,
    write_half: Option<W>,
    open_rx: Option<mpsc::UnboundedReceiver<OpenStreamRequest>>,
    goaway_rx: Option<mpsc::UnboundedReceiver<Reason>>,
}

impl<R, W> Muxer<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Run the four-exchange SETTINGS/ACK handshake and, on success, return a
    /// `Muxer` ready for `serve()`.
    #[instrument(skip_all, fields(role = ?config.role, name = %config.connection_name))]
    pub async fn handshake(
        mut read_half: R,
        mut write_half: W,
        config: Config,
    ) -> std::result::Result<Self, HandshakeError> {
        let outcome = run_handshake(
            &mut read_half,
            &mut write_half,
            config.role,
            config.compression,
            config.handshake_timeout,
        )
        .await?;
        debug!(compression = ?outcome.compression, "handshake complete");

        let dict_count = if outcome.compression.is_enabled() {
            outcome.compression.dict_count as usize
        } else {
            0
        };
        let dictionaries = Arc::new(DictionaryTable::new(
            dict_count,
            outcome.compression.dict_size(),
            config.compression_level,
        ));

        let (open_tx, open_rx) = mpsc::unbounded_channel();
        let (goaway_tx, goaway_rx) = mpsc::unbounded_channel();
        let idle_retries = Arc::new(AtomicU32::new(0));

        let shared = Arc::new(Shared {
            role: config.role,
            streams: Arc::new(StreamTable::new(config.role)),
            ready: Arc::new(ReadyList::new()),
            errors: Arc::new(StreamErrorMap::new()),
            dictionaries,
            ping: Arc::new(PingClock::new()),
            pong: Arc::new(PongClock::new()),
            metrics: MetricsUpdater::new(),
            activity: Arc::new(Signal::new()),
            handler: config.handler,
            abort: CancellationToken::new(),
            open_tx,
            goaway_tx,
            idle_retries,
            initial_window: config.initial_window,
            max_window: config.max_window,
            max_write_buffer: config.max_write_buffer,
            max_frame_size: config.max_frame_size,
            compression_level: config.compression_level,
            metrics_period: config.metrics_period,
            connection_name: config.connection_name,
            heartbeat_interval: config.heartbeat_interval,
            max_heartbeats: config.max_heartbeats,
        });

        Ok(Self {
            shared,
            read_half: Some(read_half),
            write_half: Some(write_half),
            open_rx: Some(open_rx),
            goaway_rx: Some(goaway_rx),
        })
    }

    /// A cheap, cloneable handle for `open_stream`/`shutdown`/`metrics`
    /// calls made while this `Muxer` is (or is about to be) driven by
    /// `serve` on another task.
    #[must_use]
    pub fn handle(&self) -> MuxHandle {
        MuxHandle {
            shared: self.shared.dupe(),
        }
    }

    /// Run the reader, writer, and metrics-updater tasks concurrently until
    /// one fails or `cancellation` closes. Returns the first non-shutdown
    /// error, or `Ok(())` on a clean shutdown/cancellation. Consumes the
    /// `Muxer`: once a connection is being driven there is nothing left to
    /// call on the `Muxer` itself, only on a [`MuxHandle`] taken beforehand.
    #[instrument(skip_all, fields(name = %self.shared.connection_name))]
    pub async fn serve(mut self, cancellation: CancellationToken) -> Result<()> {
        let read_half = self.read_half.take().expect("serve() called twice");
        let write_half = self.write_half.take().expect("serve() called twice");
        let open_rx = self.open_rx.take().expect("serve() called twice");
        let goaway_rx = self.goaway_rx.take().expect("serve() called twice");

        let shared = self.shared.dupe();
        let linked_abort = shared.abort.clone();
        let link_task = tokio::spawn(async move {
            cancellation.cancelled().await;
            linked_abort.cancel();
        });

        let reader = Reader::new(read_half, self.shared.dupe());
        let writer = Writer::new(write_half, self.shared.dupe(), open_rx, goaway_rx);

        let metrics_shared = self.shared.dupe();
        let metrics_task = tokio::spawn(run_metrics_updater(metrics_shared));

        // Race the two loops rather than `join!`-ing them outright: whichever
        // exits first must cancel `abort` before we wait on the other, since
        // the other loop's only way out short of its own error is observing
        // that cancellation in its own `select!`.
        let mut reader_task = tokio::spawn(reader.run());
        let mut writer_task = tokio::spawn(writer.run());
        let (reader_result, writer_result) = tokio::select! {
            r = &mut reader_task => {
                self.shared.abort.cancel();
                (r, writer_task.await)
            }
            w = &mut writer_task => {
                self.shared.abort.cancel();
                (reader_task.await, w)
            }
        };

        // Either loop exiting ends the connection; tear down the rest.
        self.shared.abort.cancel();
        self.shared.streams.abort();
        self.shared.ready.close();
        link_task.abort();
        metrics_task.abort();

        let reader_result = reader_result.map_err(|e| MuxError::Io(std::io::Error::other(e)))?;
        let writer_result = writer_result.map_err(|e| MuxError::Io(std::io::Error::other(e)))?;
        reader_result?;
        writer_result?;
        Ok(())
    }

    /// Open a new locally-initiated stream and wait for the peer's response
    /// HEADERS. Returns `connection-closed` if the connection has been or is
    /// being torn down. Equivalent to `self.handle().open_stream(..)`,
    /// convenient for callers that open a stream before ever calling
    /// `serve`.
    pub async fn open_stream(
        &self,
        headers: HeaderList,
        body: Option<BodySource>,
    ) -> Result<Arc<MuxedStream>> {
        open_stream_via(&self.shared, headers, body).await
    }

    /// Initiate graceful shutdown: refuse new peer-initiated streams, ask
    /// the writer to emit GOAWAY, and wait for every stream to close before
    /// tearing the connection down. Idempotent.
    #[instrument(skip_all, fields(name = %self.shared.connection_name))]
    pub async fn shutdown(&self) {
        shutdown_via(&self.shared).await
    }

    /// A point-in-time snapshot of connection metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot(&self.shared.ping)
    }

    /// The idle timer's current consumed-retry count.
    #[must_use]
    pub fn timer_retries(&self) -> u32 {
        self.shared.idle_retries.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Periodically logs a lightweight connection snapshot. RTT and throughput
/// are already recorded directly by the reader/writer on their own ticks
/// (spec §4.3/§4.4); this task is the ambient aggregation point spec §2's
/// "Metrics updater" component names, kept here rather than folded into the
/// reader/writer so it survives either of those tasks restarting in a
/// future revision.
async fn run_metrics_updater(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(shared.metrics_period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshot = shared.metrics.snapshot(&shared.ping);
                debug!(
                    name = %shared.connection_name,
                    active_streams = shared.streams.active_count(),
                    bytes_sent = snapshot.bytes_sent,
                    bytes_received = snapshot.bytes_received,
                    rtt = ?snapshot.rtt,
                    "connection metrics"
                );
            }
            () = shared.abort.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dupe::Dupe;
    use tokio::io::AsyncReadExt;

    fn test_config(role: Role, handler: Arc<dyn Handler>) -> Config {
        Config::new(role, handler)
    }

    #[tokio::test]
    async fn handshake_then_echo_one_stream() {
        let (client_io, server_io) = tokio::io::duplex(1 << 20);
        let (client_r, client_w) = tokio::io::split(client_io);
        let (server_r, server_w) = tokio::io::split(server_io);

        let server_handler = Arc::new(|stream: Arc<MuxedStream>| async move {
            stream.write_headers(vec![("response-header".into(), "responseValue".into())]);
            stream.write_bytes(b"Hello world");
            stream.close_write();
        });

        let client_fut = Muxer::handshake(
            client_r,
            client_w,
            test_config(Role::Client, Arc::new(NoHandler)),
        );
        let server_fut = Muxer::handshake(
            server_r,
            server_w,
            test_config(Role::Server, server_handler),
        );
        let (client, server) = tokio::join!(client_fut, server_fut);
        let client = client.unwrap();
        let server = server.unwrap();

        let client_handle = client.handle();
        let server_task = tokio::spawn(async move { server.serve(CancellationToken::new()).await });
        let client_task = tokio::spawn(async move { client.serve(CancellationToken::new()).await });

        let stream = client_handle
            .open_stream(
                vec![(":method".into(), "GET".into()), (":path".into(), "/".into())],
                None,
            )
            .await
            .unwrap();

        let mut body = Vec::new();
        stream.reader().read_to_end(&mut body).await.unwrap();
        assert_eq!(&body, b"Hello world");
        assert_eq!(
            stream.headers().unwrap(),
            vec![("response-header".to_string(), "responseValue".to_string())]
        );

        client_task.abort();
        server_task.abort();
    }
}
