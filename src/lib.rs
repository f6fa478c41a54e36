//! An HTTP/2-framing-compatible multiplexed bidirectional stream transport
//! over a single reliable connection: independent streams with per-stream
//! flow control, dictionary-seeded compression, and heartbeat-based liveness
//! checking, all carried on one `AsyncRead + AsyncWrite` pair.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// Module layout follows the connection's own data flow: `frame` and `codec`
// are the wire format, `handshake` establishes it, `reader`/`writer` are the
// two tasks that drive it, `mux` is the facade tying them together, and
// everything else (`stream`, `stream_map`, `ready`, `dictionary`, `errors_map`,
// `idle`, `ping`, `metrics`, `sync`, `buf`, `dupe`) is shared state those
// tasks coordinate through.

mod buf;
mod codec;
mod dictionary;
mod dupe;
mod error;
mod errors_map;
mod frame;
mod handshake;
mod idle;
mod metrics;
mod mux;
mod ping;
mod reader;
mod ready;
mod stream;
mod stream_map;
mod sync;
mod writer;

pub use error::{HandshakeError, MuxError, ProtocolError, Reason, Result, StreamError};
pub use frame::headers::HeaderList;
pub use frame::settings::CompressionSetting;
pub use metrics::MetricsSnapshot;
pub use mux::{BodySource, Config, Handler, MuxHandle, Muxer, NoHandler};
pub use stream::{MuxedStream, Role, StreamId};

pub use tokio_util::sync::CancellationToken;
