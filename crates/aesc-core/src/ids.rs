//! Branded ID newtypes for type safety.
//!
//! Channel and FSM identifiers are opaque strings assigned by the node.
//! Wrapping them in distinct newtypes prevents accidentally passing a
//! channel ID where an FSM session ID is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// On-chain channel identifier (`ch_...`), assigned by the node once
    /// the channel is opened.
    ChannelId
}

branded_id! {
    /// Node-side FSM session identifier (`ba_...`), valid for the
    /// lifetime of one FSM session and across reestablish.
    FsmId
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_string() {
        let id = ChannelId::from_string("ch_abc".to_owned());
        assert_eq!(id.as_str(), "ch_abc");
    }

    #[test]
    fn from_str_ref() {
        let id = FsmId::from("ba_123");
        assert_eq!(id.as_str(), "ba_123");
    }

    #[test]
    fn deref_to_str() {
        let id = ChannelId::from("ch_x");
        let s: &str = &id;
        assert_eq!(s, "ch_x");
    }

    #[test]
    fn display() {
        let id = FsmId::from("ba_display");
        assert_eq!(format!("{id}"), "ba_display");
    }

    #[test]
    fn into_string() {
        let id = ChannelId::from("ch_convert");
        let s: String = id.into();
        assert_eq!(s, "ch_convert");
    }

    #[test]
    fn serde_roundtrip() {
        let id = ChannelId::from("ch_serde");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ch_serde\"");
        let back: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn serde_in_struct() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Snapshot {
            channel_id: ChannelId,
            fsm_id: FsmId,
        }

        let snap = Snapshot {
            channel_id: ChannelId::from("ch_1"),
            fsm_id: FsmId::from("ba_1"),
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
    }

    #[test]
    fn hash_and_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let id = ChannelId::from("same");
        let _ = set.insert(id.clone());
        let _ = set.insert(id.clone());
        assert_eq!(set.len(), 1);
    }
}
