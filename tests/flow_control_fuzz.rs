//! Scenario 7: 32 streams, each carrying a randomly sized payload in
//! `[0, 16 * initial_window)`, run concurrently to fuzz the interaction
//! between per-stream send/receive window accounting and the ready list's
//! fairness, including the zero-byte edge case.

mod support;

use rand::Rng;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use wiremux::{Config, MuxHandle, MuxedStream, Role};

const STREAM_COUNT: usize = 32;
const INITIAL_WINDOW: u32 = 64 * 1024;

fn config_with_window(role: Role, handler: Arc<dyn wiremux::Handler>) -> Config {
    let mut config = Config::new(role, handler);
    config.initial_window = INITIAL_WINDOW;
    config.max_window = INITIAL_WINDOW * 64;
    config
}

#[tokio::test]
async fn flow_control_survives_random_sized_concurrent_streams() {
    let server_handler = Arc::new(|stream: Arc<MuxedStream>| async move {
        let mut body = Vec::new();
        stream.reader().read_to_end(&mut body).await.unwrap();
        stream.write_bytes(&body);
        stream.close_write();
    });

    let (client, client_task, _server, server_task) = support::connected_pair_with_buffer(
        config_with_window(Role::Client, Arc::new(wiremux::NoHandler)),
        config_with_window(Role::Server, server_handler),
        128 * 1024,
    )
    .await;

    let ceiling = 16 * INITIAL_WINDOW;
    let sizes: Vec<u32> = (0..STREAM_COUNT).map(|_| rand::rng().random_range(0..ceiling)).collect();

    let futures = sizes.into_iter().enumerate().map(|(i, size)| run_one(client.clone(), i, size));
    futures_util::future::join_all(futures).await;

    client_task.abort();
    server_task.abort();
}

async fn run_one(client: MuxHandle, i: usize, size: u32) {
    let stream = client
        .open_stream(vec![(":method".into(), "POST".into())], None)
        .await
        .unwrap();
    let payload = support::pattern(size as usize);
    stream.write_bytes(&payload);
    stream.close_write();

    let mut body = Vec::new();
    stream.reader().read_to_end(&mut body).await.unwrap();
    assert_eq!(body, payload, "stream {i} (size {size}) got back the wrong bytes");
}
