//! Stream identifiers.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::error::ProtocolError;
use std::sync::atomic::{AtomicU32, Ordering};

/// An unsigned 31-bit stream identifier. `0` is reserved for connection-level
/// frames and is never constructed as a `StreamId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

/// The high bit of the 32-bit wire field is reserved and must be ignored on
/// receipt, never set on send (RFC 7540 §4.1).
const RESERVED_MASK: u32 = 1 << 31;

impl StreamId {
    /// Construct a `StreamId` from a raw value. Returns `None` for `0`.
    #[must_use]
    pub fn new(raw: u32) -> Option<Self> {
        let raw = raw & !RESERVED_MASK;
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// Parse a raw 32-bit wire value, which may be `0` for connection-level
    /// frames (distinguish via [`StreamId::is_zero`] on the raw form) or
    /// malformed per [`ProtocolError::ZeroStreamId`] when zero is not
    /// permitted for this frame type.
    pub fn from_wire(raw: u32) -> Result<Self, ProtocolError> {
        Self::new(raw).ok_or(ProtocolError::ZeroStreamId)
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// `true` if this ID was allocated by the client (odd IDs).
    #[must_use]
    pub fn is_client_initiated(self) -> bool {
        self.0 % 2 == 1
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which end of the connection we are: determines the parity of locally
/// allocated stream IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Odd IDs, starting at 1.
    Client,
    /// Even IDs, starting at 2.
    Server,
}

/// Monotonic local stream ID allocator, stepping by 2 from the role's
/// starting parity.
#[derive(Debug)]
pub struct LocalIdAllocator {
    next: AtomicU32,
}

impl LocalIdAllocator {
    #[must_use]
    pub fn new(role: Role) -> Self {
        let start = match role {
            Role::Client => 1,
            Role::Server => 2,
        };
        Self {
            next: AtomicU32::new(start),
        }
    }

    /// Return the next local ID and advance by 2.
    pub fn acquire(&self) -> StreamId {
        let raw = self.next.fetch_add(2, Ordering::Relaxed);
        StreamId::new(raw).expect("local id allocator never produces 0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(StreamId::new(0).is_none());
    }

    #[test]
    fn allocator_parity_and_monotonicity() {
        let client = LocalIdAllocator::new(Role::Client);
        assert_eq!(client.acquire().as_u32(), 1);
        assert_eq!(client.acquire().as_u32(), 3);
        assert_eq!(client.acquire().as_u32(), 5);

        let server = LocalIdAllocator::new(Role::Server);
        assert_eq!(server.acquire().as_u32(), 2);
        assert_eq!(server.acquire().as_u32(), 4);
    }

    #[test]
    fn reserved_bit_is_masked() {
        let id = StreamId::new(RESERVED_MASK | 7).unwrap();
        assert_eq!(id.as_u32(), 7);
    }
}
