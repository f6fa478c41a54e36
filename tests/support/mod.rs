//! Shared integration-test harness: two muxers, handshaken back to back over
//! a `tokio::io::duplex` pipe, the way `carllerche-h2`'s
//! `tests/support/util.rs` wires its client/server pairs.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wiremux::{Config, Handler, MuxHandle, Muxer, NoHandler, Result, Role};

/// A `Config` with an inert handler, for callers that only ever
/// `open_stream`.
pub fn inert_config(role: Role) -> Config {
    Config::new(role, Arc::new(NoHandler))
}

pub fn handler_config(role: Role, handler: Arc<dyn Handler>) -> Config {
    Config::new(role, handler)
}

/// Handshake `client_config`/`server_config` over a fresh duplex pipe and
/// spawn both `serve()` loops. Returns a cloneable handle plus the
/// background task for each side.
pub async fn connected_pair(
    client_config: Config,
    server_config: Config,
) -> (MuxHandle, JoinHandle<Result<()>>, MuxHandle, JoinHandle<Result<()>>) {
    connected_pair_with_buffer(client_config, server_config, 256 * 1024).await
}

pub async fn connected_pair_with_buffer(
    client_config: Config,
    server_config: Config,
    buffer: usize,
) -> (MuxHandle, JoinHandle<Result<()>>, MuxHandle, JoinHandle<Result<()>>) {
    let (client_io, server_io) = tokio::io::duplex(buffer);
    let (client_r, client_w) = tokio::io::split(client_io);
    let (server_r, server_w) = tokio::io::split(server_io);

    let client_fut = Muxer::handshake(client_r, client_w, client_config);
    let server_fut = Muxer::handshake(server_r, server_w, server_config);
    let (client, server) = tokio::join!(client_fut, server_fut);
    let client = client.expect("client handshake");
    let server = server.expect("server handshake");

    let client_handle = client.handle();
    let server_handle = server.handle();

    let client_task = tokio::spawn(client.serve(CancellationToken::new()));
    let server_task = tokio::spawn(server.serve(CancellationToken::new()));

    (client_handle, client_task, server_handle, server_task)
}

/// A deterministic, non-repeating-enough-to-catch-reordering byte pattern of
/// length `len`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
