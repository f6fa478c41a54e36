//! Scenario 5: the peer stops responding without ever sending GOAWAY or
//! closing its half of the connection (a network partition, not a clean
//! shutdown). Detection relies entirely on the idle timer's heartbeat/retry
//! budget (spec §4.8), so this pins a fast heartbeat to keep the test quick.

mod support;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremux::{Config, MuxError, Muxer, NoHandler, Role};

#[tokio::test]
async fn unresponsive_peer_is_declared_dropped_after_heartbeat_budget() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (client_r, client_w) = tokio::io::split(client_io);
    let (server_r, server_w) = tokio::io::split(server_io);

    let mut client_config = Config::new(Role::Client, Arc::new(NoHandler));
    client_config.heartbeat_interval = Duration::from_millis(20);
    client_config.max_heartbeats = 1;

    let server_config = Config::new(Role::Server, Arc::new(NoHandler));

    let (client, server) = tokio::join!(
        Muxer::handshake(client_r, client_w, client_config),
        Muxer::handshake(server_r, server_w, server_config),
    );
    let client = client.unwrap();
    // Held alive but never driven by `serve()`: the peer accepted the
    // handshake and then simply stopped reading or writing anything.
    let _server = server.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), client.serve(CancellationToken::new()))
        .await
        .expect("client did not notice the unresponsive peer in time");

    match result {
        Err(MuxError::ConnectionDropped(_)) => {}
        other => panic!("expected ConnectionDropped, got {other:?}"),
    }
}
