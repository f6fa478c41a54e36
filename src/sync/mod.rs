//! Small lock-free/notify-based primitives shared across the muxer.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

mod counter;
mod fuse;
mod signal;

pub use counter::AtomicCounter;
pub use fuse::Fuse;
pub use signal::Signal;
