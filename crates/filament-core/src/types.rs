//! Newtype wrappers for protocol identifier fields.
//!
//! These types prevent accidental mixing of identifiers that share the same
//! underlying integer representation (a session handle is not an exchange id
//! is not a protocol id).

use core::fmt;

/// Opaque handle identifying one secure transport session.
///
/// The exchange layer never owns the session it names; the session manager
/// governs session lifetime and the handle may outlive the session itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct SessionId(pub(crate) u16);

impl SessionId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({:#06x})", self.0)
    }
}

/// Peer node identifier carried in packet headers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:#018x})", self.0)
    }
}

/// Protocol namespace for message types.
///
/// Every exchange message carries a `(protocol_id, message_type)` pair; the
/// protocol id selects the namespace the type code is interpreted in.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct ProtocolId(pub(crate) u16);

impl ProtocolId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl fmt::Debug for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtocolId({:#06x})", self.0)
    }
}
