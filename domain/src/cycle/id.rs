//! Cycle identity

use serde::{Deserialize, Serialize};

/// Identifies one cycle run by a manager.
///
/// The owner name is stable across process restarts and is what scopes
/// durable pending-request records; the sequence number only distinguishes
/// cycles within a single process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId {
    owner: String,
    seq: u64,
}

impl CycleId {
    pub fn new(owner: impl Into<String>, seq: u64) -> Self {
        Self {
            owner: owner.into(),
            seq,
        }
    }

    /// The stable owner name used to scope persisted records.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.owner, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let id = CycleId::new("game-night", 3);
        assert_eq!(id.to_string(), "game-night#3");
        assert_eq!(id.owner(), "game-night");
    }
}
