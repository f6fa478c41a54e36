//! Open question (spec §9): "compression correctness under reordering" —
//! several streams sharing one dictionary slot, each appending to it in
//! turn, must still decode correctly on the peer side no matter how their
//! DATA/SetDictionary frames interleave with each other on the wire.

mod support;

use std::sync::Arc;
use tokio::io::AsyncReadExt;
use wiremux::{CompressionSetting, Config, MuxedStream, Role};

fn compressing_config(role: Role, handler: Arc<dyn wiremux::Handler>) -> Config {
    let mut config = Config::new(role, handler);
    config.compression = CompressionSetting {
        version: 1,
        format: 1,
        log_dict_size: 14, // 16 KiB dictionary
        dict_count: 2,
    };
    config
}

/// Same path on every request: all streams should route to the same write
/// dictionary slot, so each one's `SetDictionary` update lands on top of the
/// last, in order.
#[tokio::test]
async fn multiple_streams_with_dictionaries() {
    let server_handler = Arc::new(|stream: Arc<MuxedStream>| async move {
        let mut body = Vec::new();
        stream.reader().read_to_end(&mut body).await.unwrap();
        stream.write_headers(vec![(":status".into(), "200".into())]);
        // Repeat the body back twice: compressible, and large enough that
        // the dictionary's effect is exercised across several chunks.
        stream.write_bytes(&body);
        stream.write_bytes(&body);
        stream.close_write();
    });

    let (client, client_task, _server, server_task) = support::connected_pair(
        compressing_config(Role::Client, Arc::new(wiremux::NoHandler)),
        compressing_config(Role::Server, server_handler),
    )
    .await;

    let headers = |i: usize| {
        vec![
            (":method".into(), "POST".into()),
            (":path".into(), "/shared-dict".into()),
            ("content-type".into(), "text/plain".into()),
            ("x-stream".into(), i.to_string()),
        ]
    };

    // Text with enough repetition that zstd-with-dictionary actually helps,
    // and distinct enough per stream to catch any cross-stream corruption.
    let bodies: Vec<Vec<u8>> = (0..6)
        .map(|i| format!("the quick brown fox jumps over the lazy dog #{i} ").repeat(40).into_bytes())
        .collect();

    let mut handles = Vec::new();
    for (i, body) in bodies.iter().cloned().enumerate() {
        let client = client.clone();
        let headers = headers(i);
        handles.push(tokio::spawn(async move {
            let stream = client.open_stream(headers, None).await.unwrap();
            stream.write_bytes(&body);
            stream.close_write();
            let mut received = Vec::new();
            stream.reader().read_to_end(&mut received).await.unwrap();
            (body, received)
        }));
    }

    for handle in handles {
        let (sent, received) = handle.await.unwrap();
        let mut expected = sent.clone();
        expected.extend_from_slice(&sent);
        assert_eq!(received, expected, "dictionary-compressed stream corrupted in transit");
    }

    client_task.abort();
    server_task.abort();
}

/// Non-text content types never select a dictionary; the data still needs
/// to arrive byte-for-byte unmodified.
#[tokio::test]
async fn non_compressible_content_type_is_sent_plain() {
    let server_handler = Arc::new(|stream: Arc<MuxedStream>| async move {
        let mut body = Vec::new();
        stream.reader().read_to_end(&mut body).await.unwrap();
        stream.write_bytes(&body);
        stream.close_write();
    });

    let (client, client_task, _server, server_task) = support::connected_pair(
        compressing_config(Role::Client, Arc::new(wiremux::NoHandler)),
        compressing_config(Role::Server, server_handler),
    )
    .await;

    let stream = client
        .open_stream(
            vec![
                (":method".into(), "POST".into()),
                (":path".into(), "/binary".into()),
                ("content-type".into(), "application/octet-stream".into()),
            ],
            None,
        )
        .await
        .unwrap();
    let payload: Vec<u8> = (0u32..4096).map(|i| (i % 256) as u8).collect();
    stream.write_bytes(&payload);
    stream.close_write();

    let mut body = Vec::new();
    stream.reader().read_to_end(&mut body).await.unwrap();
    assert_eq!(body, payload);

    client_task.abort();
    server_task.abort();
}
