//! Codec for the transport parameters negotiated during a QUIC handshake
//!
//! Transport parameters communicate each endpoint's connection-level preferences
//! (flow control windows, stream counts, timeouts, migration hints) as an opaque
//! blob inside the cryptographic handshake. The blob is parsed from untrusted
//! network input before anything else about the peer has been established, so
//! decoding here is strict: malformed input fails outright, and a failed decode
//! never yields a partially-populated value.
//!
//! The codec itself is stateless. Every operation is a pure function over its
//! inputs, and which parameters are legal to send or receive depends on the
//! [`Side`] passed into each call rather than on any global mode. Callers own
//! the result outright; no references into the input buffer survive a call.

#![warn(missing_docs)]

use std::{fmt, ops};

use bytes::Buf;

#[doc(hidden)]
pub mod coding;
pub mod transport_parameters;
mod varint;

pub use crate::transport_parameters::{Error, ParameterId, PreferredAddress, TransportParameters};
pub use crate::varint::{VarInt, VarIntBoundsExceeded};

/// Length in bytes of a stateless reset token
pub const RESET_TOKEN_SIZE: usize = 16;

/// Maximum length in bytes of a connection ID
pub const MAX_CID_SIZE: usize = 20;

/// Whether an endpoint was the initiator of a connection
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Side {
    /// The initiator of a connection
    Client = 0,
    /// The acceptor of a connection
    Server = 1,
}

impl Side {
    /// Shorthand for `self == Side::Client`
    #[inline]
    pub fn is_client(self) -> bool {
        self == Self::Client
    }

    /// Shorthand for `self == Side::Server`
    #[inline]
    pub fn is_server(self) -> bool {
        self == Self::Server
    }
}

impl ops::Not for Side {
    type Output = Self;
    fn not(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

/// Protocol-level identifier for a connection
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ConnectionId {
    len: u8,
    bytes: [u8; MAX_CID_SIZE],
}

impl ConnectionId {
    /// Construct cid from byte array
    pub fn new(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= MAX_CID_SIZE);
        let mut res = Self {
            len: bytes.len() as u8,
            bytes: [0; MAX_CID_SIZE],
        };
        res.bytes[..bytes.len()].copy_from_slice(bytes);
        res
    }

    /// Construct cid by reading `len` bytes from a `Buf`
    ///
    /// Callers must ensure that `buf` contains at least `len` bytes.
    pub(crate) fn from_buf(buf: &mut impl Buf, len: usize) -> Self {
        debug_assert!(len <= MAX_CID_SIZE);
        let mut res = Self {
            len: len as u8,
            bytes: [0; MAX_CID_SIZE],
        };
        buf.copy_to_slice(&mut res.bytes[..len]);
        res
    }
}

impl ops::Deref for ConnectionId {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.bytes[0..self.len as usize]
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.bytes[0..self.len as usize].fmt(f)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Stateless reset token
///
/// A secret used by a server to communicate that it has lost state for a
/// connection, and by a client to authenticate such a signal.
#[allow(clippy::derived_hash_with_manual_eq)] // Custom PartialEq impl matches derived semantics
#[derive(Debug, Copy, Clone, Hash)]
pub struct ResetToken([u8; RESET_TOKEN_SIZE]);

impl PartialEq for ResetToken {
    fn eq(&self, other: &Self) -> bool {
        // Comparison must not leak how much of the token matched
        let mut diff = 0;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for ResetToken {}

impl From<[u8; RESET_TOKEN_SIZE]> for ResetToken {
    fn from(x: [u8; RESET_TOKEN_SIZE]) -> Self {
        Self(x)
    }
}

impl ops::Deref for ResetToken {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
