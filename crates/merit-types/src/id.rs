use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an appended event. Supplied by the producer; the store
/// rejects duplicates on append.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint an id for an internally produced event (audit trail entries).
    pub fn derive(tag: &str, subject: &str, timestamp: i64, nonce: u64) -> Self {
        Self(derive_hex(&[
            tag.as_bytes(),
            subject.as_bytes(),
            &timestamp.to_le_bytes(),
            &nonce.to_le_bytes(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an actor (contributor, verifier, claimant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a ticket row, derived from its creation inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn derive(work_package_id: &str, timestamp: i64, nonce: u64) -> Self {
        Self(derive_hex(&[
            work_package_id.as_bytes(),
            &timestamp.to_le_bytes(),
            &nonce.to_le_bytes(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stake row, derived from its creation inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StakeId(String);

impl StakeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn derive(actor: &ActorId, amount: u64, timestamp: i64, nonce: u64) -> Self {
        Self(derive_hex(&[
            actor.as_str().as_bytes(),
            &amount.to_le_bytes(),
            &timestamp.to_le_bytes(),
            &nonce.to_le_bytes(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn derive_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize().as_bytes())
}
