//! Stream-local byte buffers.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

mod pipe;
mod write_buf;

pub use pipe::{read_pipe, ReadPipeReader, ReadPipeWriter};
pub use write_buf::WriteBuf;
