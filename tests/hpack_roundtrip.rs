//! Scenario 6: HPACK round trip for 16-entry header sets across 3 streams on
//! one connection, exercising the shared per-connection dynamic table in
//! both directions.

mod support;

use std::sync::Arc;
use wiremux::{HeaderList, MuxedStream, Role};

fn header_set(stream_index: usize) -> HeaderList {
    let mut headers: HeaderList = vec![
        (":method".into(), "POST".into()),
        (":path".into(), format!("/s{stream_index}")),
        ("x-common".into(), "shared-value".into()),
    ];
    for n in 0..13 {
        headers.push((format!("x-field-{n}"), format!("value-{stream_index}-{n}")));
    }
    assert_eq!(headers.len(), 16);
    headers
}

#[tokio::test]
async fn hpack_round_trips_across_three_streams() {
    let server_handler = Arc::new(|stream: Arc<MuxedStream>| async move {
        stream.inbound_headers_changed().await;
        let received = stream.headers().unwrap_or_default();
        stream.write_headers(received);
        stream.close_write();
    });

    let (client, client_task, _server, server_task) = support::connected_pair(
        support::inert_config(Role::Client),
        support::handler_config(Role::Server, server_handler),
    )
    .await;

    for i in 0..3 {
        let headers = header_set(i);
        let stream = client.open_stream(headers.clone(), None).await.unwrap();
        assert_eq!(stream.headers().unwrap(), headers, "stream {i} header mismatch");
    }

    client_task.abort();
    server_task.abort();
}
