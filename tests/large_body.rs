//! Scenario 2: a single stream carries a body well past one send window and
//! one max-frame-size, exercising receive-window growth and chunked DATA
//! emission together.

mod support;

use std::sync::Arc;
use tokio::io::AsyncReadExt;
use wiremux::{MuxedStream, Role};

const SIZE: usize = 16 * 1024 * 1024;

#[tokio::test]
async fn large_body_round_trips_intact() {
    let server_handler = Arc::new(|stream: Arc<MuxedStream>| async move {
        let mut body = Vec::new();
        stream.reader().read_to_end(&mut body).await.unwrap();
        stream.write_bytes(&body);
        stream.close_write();
    });

    let (client, client_task, _server, server_task) = support::connected_pair(
        support::inert_config(Role::Client),
        support::handler_config(Role::Server, server_handler),
    )
    .await;

    let stream = client
        .open_stream(vec![(":method".into(), "POST".into())], None)
        .await
        .unwrap();

    let payload = support::pattern(SIZE);
    stream.write_bytes(&payload);
    stream.close_write();

    let mut body = Vec::new();
    stream.reader().read_to_end(&mut body).await.unwrap();
    assert_eq!(body.len(), SIZE);
    assert_eq!(body, payload);

    client_task.abort();
    server_task.abort();
}
