//! Scenario 3: 64 streams opened concurrently on one connection, each
//! carrying its own payload, verifying the ready list's fairness doesn't
//! starve or cross-deliver any of them.

mod support;

use std::sync::Arc;
use tokio::io::AsyncReadExt;
use wiremux::{MuxHandle, MuxedStream, Role};

const STREAM_COUNT: usize = 64;

#[tokio::test]
async fn parallel_streams_do_not_cross_deliver() {
    let server_handler = Arc::new(|stream: Arc<MuxedStream>| async move {
        let mut body = Vec::new();
        stream.reader().read_to_end(&mut body).await.unwrap();
        stream.write_bytes(&body);
        stream.close_write();
    });

    let (client, client_task, _server, server_task) = support::connected_pair_with_buffer(
        support::inert_config(Role::Client),
        support::handler_config(Role::Server, server_handler),
        1024 * 1024,
    )
    .await;

    let futures = (0..STREAM_COUNT).map(|i| run_one(client.clone(), i));
    let results = futures_util::future::join_all(futures).await;
    assert_eq!(results.len(), STREAM_COUNT);

    client_task.abort();
    server_task.abort();
}

async fn run_one(client: MuxHandle, i: usize) {
    let stream = client
        .open_stream(vec![(":method".into(), "POST".into())], None)
        .await
        .unwrap();
    let payload = format!("stream-{i}-payload").into_bytes();
    stream.write_bytes(&payload);
    stream.close_write();

    let mut body = Vec::new();
    stream.reader().read_to_end(&mut body).await.unwrap();
    assert_eq!(body, payload, "stream {i} got the wrong payload back");
}
