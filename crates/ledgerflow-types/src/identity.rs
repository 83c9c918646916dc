//! Party identity types.
//!
//! A `PartyIdentity` names one member of a membership group. Identity
//! resolution (routing a name to a network address) is an external
//! collaborator; the engine only carries identities as data.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The logical identity of a party: a member name within a membership group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyIdentity {
    /// Member name, e.g. "O=Alice, L=Dublin, C=IE".
    pub name: String,
    /// The membership group this party belongs to.
    pub group_id: String,
}

impl PartyIdentity {
    pub fn new(name: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_id: group_id.into(),
        }
    }
}

impl fmt::Display for PartyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let id = PartyIdentity::new("O=Alice, L=Dublin, C=IE", "group-1");
        assert_eq!(id.to_string(), "O=Alice, L=Dublin, C=IE@group-1");
    }

    #[test]
    fn test_identity_serde() {
        let id = PartyIdentity::new("O=Bob, L=London, C=GB", "group-1");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: PartyIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
