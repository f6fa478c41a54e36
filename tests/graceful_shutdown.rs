//! Scenario 4: graceful shutdown initiated while a stream still has
//! in-flight data; the shutdown must wait for that stream to drain and
//! close before tearing the connection down, and both ends exit cleanly.

mod support;

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use wiremux::{MuxedStream, Role};

const SIZE: usize = 720 * 1024;

#[tokio::test]
async fn shutdown_waits_for_in_flight_stream_to_drain() {
    let server_handler = Arc::new(|stream: Arc<MuxedStream>| async move {
        let mut body = Vec::new();
        stream.reader().read_to_end(&mut body).await.unwrap();
        stream.write_bytes(&body);
        stream.close_write();
    });

    let (client, client_task, _server, server_task) = support::connected_pair_with_buffer(
        support::inert_config(Role::Client),
        support::handler_config(Role::Server, server_handler),
        256 * 1024,
    )
    .await;

    let stream = client
        .open_stream(vec![(":method".into(), "POST".into())], None)
        .await
        .unwrap();
    let payload = support::pattern(SIZE);
    stream.write_bytes(&payload);
    stream.close_write();

    let read_stream = stream.clone();
    let ((), body) = tokio::join!(client.shutdown(), async move {
        let mut body = Vec::new();
        read_stream.reader().read_to_end(&mut body).await.unwrap();
        body
    });
    assert_eq!(body, payload);

    let client_result = tokio::time::timeout(Duration::from_secs(5), client_task)
        .await
        .expect("client serve() did not exit after shutdown")
        .unwrap();
    assert!(client_result.is_ok(), "{client_result:?}");

    let server_result = tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server serve() did not exit after peer shutdown")
        .unwrap();
    assert!(server_result.is_ok(), "{server_result:?}");
}
