//! Four-exchange SETTINGS/ACK handshake.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::error::HandshakeError;
use crate::frame::{flags, Frame, FrameHeader, Settings, FRAME_HEADER_LEN};
use crate::frame::settings::{CompressionSetting, MAGIC_CLIENT, MAGIC_SERVER, SETTING_COMPRESSION, SETTING_MUXER_MAGIC};
use crate::stream::Role;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// The outcome of a successful handshake: the negotiated compression
/// parameters, ready to configure the [`crate::dictionary::DictionaryTable`].
#[derive(Debug, Clone, Copy)]
pub struct HandshakeOutcome {
    pub compression: CompressionSetting,
}

async fn write_settings<W: AsyncWrite + Unpin>(
    writer: &mut W,
    settings: Settings,
) -> Result<(), HandshakeError> {
    let mut buf = BytesMut::new();
    Frame::Settings(settings).encode(&mut buf);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_frame_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(FrameHeader, BytesMut), HandshakeError> {
    let mut header_buf = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header_buf).await?;
    let header = FrameHeader::decode(&mut &header_buf[..]);
    let mut payload = BytesMut::with_capacity(header.length as usize);
    payload.resize(header.length as usize, 0);
    reader.read_exact(&mut payload).await?;
    Ok((header, payload))
}

fn magic_for(role: Role) -> u32 {
    match role {
        Role::Client => MAGIC_CLIENT,
        Role::Server => MAGIC_SERVER,
    }
}

fn expected_peer_magic(role: Role) -> u32 {
    match role {
        Role::Client => MAGIC_SERVER,
        Role::Server => MAGIC_CLIENT,
    }
}

/// Run the handshake described for §4.2: concurrently exchange SETTINGS
/// carrying role magic + compression offer, then concurrently exchange
/// SETTINGS-ACK. Bounded by `timeout_duration` end to end.
pub async fn handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    role: Role,
    offered_compression: CompressionSetting,
    timeout_duration: Duration,
) -> Result<HandshakeOutcome, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    timeout(timeout_duration, run(reader, writer, role, offered_compression))
        .await
        .map_err(|_| HandshakeError::Timeout(timeout_duration))?
}

async fn run<R, W>(
    reader: &mut R,
    writer: &mut W,
    role: Role,
    offered_compression: CompressionSetting,
) -> Result<HandshakeOutcome, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let outbound = Settings::new(vec![
        (SETTING_MUXER_MAGIC, magic_for(role)),
        (SETTING_COMPRESSION, offered_compression.encode()),
    ]);
    write_settings(writer, outbound).await?;

    let (header, mut payload) = read_frame_header(reader).await?;
    if header.flags & flags::ACK != 0 {
        return Err(HandshakeError::UnexpectedAck);
    }
    let frame = Frame::decode(header, payload.split().freeze()).map_err(|_| HandshakeError::NotSettings)?;
    let Frame::Settings(settings) = frame else {
        return Err(HandshakeError::NotSettings);
    };
    let peer_magic = settings.get(SETTING_MUXER_MAGIC).ok_or(HandshakeError::NoMagic)?;
    if peer_magic != expected_peer_magic(role) {
        return Err(HandshakeError::WrongMagic(peer_magic));
    }
    let peer_compression = settings
        .get(SETTING_COMPRESSION)
        .map(CompressionSetting::decode)
        .unwrap_or_else(CompressionSetting::disabled);

    write_settings(writer, Settings::ack()).await?;

    let (ack_header, _) = read_frame_header(reader).await?;
    if ack_header.flags & flags::ACK == 0 {
        return Err(HandshakeError::NoAck);
    }

    Ok(HandshakeOutcome {
        compression: offered_compression.negotiate(peer_compression),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_handshake_negotiates_compression() {
        let (mut client_r, mut server_w) = tokio::io::duplex(4096);
        let (mut server_r, mut client_w) = tokio::io::duplex(4096);

        let client_compression = CompressionSetting {
            version: 1,
            format: 1,
            log_dict_size: 16,
            dict_count: 8,
        };
        let server_compression = CompressionSetting {
            version: 1,
            format: 1,
            log_dict_size: 12,
            dict_count: 16,
        };

        let client = tokio::spawn(async move {
            handshake(
                &mut client_r,
                &mut client_w,
                Role::Client,
                client_compression,
                Duration::from_secs(5),
            )
            .await
        });
        let server = tokio::spawn(async move {
            handshake(
                &mut server_r,
                &mut server_w,
                Role::Server,
                server_compression,
                Duration::from_secs(5),
            )
            .await
        });

        let (client_outcome, server_outcome) = tokio::join!(client, server);
        let client_outcome = client_outcome.unwrap().unwrap();
        let server_outcome = server_outcome.unwrap().unwrap();
        assert_eq!(client_outcome.compression.log_dict_size, 12);
        assert_eq!(server_outcome.compression.log_dict_size, 12);
    }

    #[tokio::test]
    async fn wrong_magic_is_rejected() {
        let (mut client_r, mut server_w) = tokio::io::duplex(4096);
        let (mut server_r, mut client_w) = tokio::io::duplex(4096);

        let client = tokio::spawn(async move {
            handshake(
                &mut client_r,
                &mut client_w,
                Role::Client,
                CompressionSetting::disabled(),
                Duration::from_secs(5),
            )
            .await
        });
        // Wrong role: both claim Client, so the client side sees the wrong magic.
        let server = tokio::spawn(async move {
            handshake(
                &mut server_r,
                &mut server_w,
                Role::Client,
                CompressionSetting::disabled(),
                Duration::from_secs(5),
            )
            .await
        });

        let (client_outcome, _server_outcome) = tokio::join!(client, server);
        assert!(matches!(
            client_outcome.unwrap(),
            Err(HandshakeError::WrongMagic(_))
        ));
    }
}
