//! Identifier and role types shared by every layer.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FunctionId
// ---------------------------------------------------------------------------

/// Numeric identifier of a remotely callable function.
///
/// Game code picks these (usually from an enum) and registers a handler for
/// each. Negative ids are reserved for protocol control calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub i32);

impl FunctionId {
    /// Returns `true` for ids reserved by the protocol itself.
    pub fn is_reserved(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TransferId
// ---------------------------------------------------------------------------

/// Opaque correlation token shared by every envelope of one call.
///
/// Generated fresh for each outgoing call. For fragmented calls it is the
/// key the receiver reassembles under, and the token a "continue transfer"
/// signal refers back to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    /// Wraps an existing token, e.g. one read off the wire.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generates a random 32-character hex token (128 bits of entropy).
    ///
    /// At that size two live transfers colliding is not a practical
    /// concern.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Role / NodeRole
// ---------------------------------------------------------------------------

/// Which side(s) a registered function is permitted to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Runs only on nodes acting as clients.
    ClientOnly,
    /// Runs only on the node acting as the server.
    ServerOnly,
    /// Runs on any node.
    Both,
}

impl Role {
    /// Returns `true` if a function with this role may run on `node`.
    pub fn runs_on(self, node: NodeRole) -> bool {
        match self {
            Self::Both => true,
            Self::ClientOnly => node == NodeRole::Client,
            Self::ServerOnly => node == NodeRole::Server,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientOnly => write!(f, "ClientOnly"),
            Self::ServerOnly => write!(f, "ServerOnly"),
            Self::Both => write!(f, "Both"),
        }
    }
}

/// The part the local process plays in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// This node is a client.
    Client,
    /// This node is the server.
    Server,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "Client"),
            Self::Server => write!(f, "Server"),
        }
    }
}
