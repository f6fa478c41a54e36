//! Scenario 1: handshake, open one stream, echo a small body end to end.

mod support;

use std::sync::Arc;
use tokio::io::AsyncReadExt;
use wiremux::{MuxedStream, Role};

#[tokio::test]
async fn handshake_then_echo_one_stream() {
    let server_handler = Arc::new(|stream: Arc<MuxedStream>| async move {
        let headers = stream.headers().unwrap_or_default();
        assert_eq!(
            headers.iter().find(|(k, _)| k == ":method").map(|(_, v)| v.as_str()),
            Some("GET")
        );
        stream.write_headers(vec![("response-header".into(), "yes".into())]);
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
        .open_stream(
            vec![(":method".into(), "GET".into()), (":path".into(), "/".into())],
            None,
        )
        .await
        .unwrap();
    stream.write_bytes(b"hello from client");
    stream.close_write();
    assert_eq!(
        stream.headers().unwrap(),
        vec![("response-header".to_string(), "yes".to_string())]
    );

    let mut body = Vec::new();
    stream.reader().read_to_end(&mut body).await.unwrap();
    assert_eq!(&body, b"hello from client");

    client_task.abort();
    server_task.abort();
}
