//! Workflow-graph reference keys.
//!
//! Nodes and transitions are addressed by human-authored `ref` strings that
//! are unique within one workflow definition. These are newtypes rather than
//! bare `String`s so a node reference can never be passed where a transition
//! reference is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! ref_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a reference string.
            #[must_use]
            pub fn new(r: impl Into<String>) -> Self {
                Self(r.into())
            }

            /// The reference as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(r: &str) -> Self {
                Self(r.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(r: String) -> Self {
                Self(r)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

ref_key! {
    /// Reference to a node within a workflow definition.
    NodeRef
}

ref_key! {
    /// Reference to a transition within a workflow definition.
    ///
    /// Doubles as the name of the sibling group spawned by a fan-out
    /// transition.
    TransitionRef
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_ref_from_str() {
        let r = NodeRef::from("ideate");
        assert_eq!(r.as_str(), "ideate");
        assert_eq!(r.to_string(), "ideate");
    }

    #[test]
    fn transition_ref_equality_and_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(TransitionRef::from("spawn_judges"));
        assert!(set.contains(&TransitionRef::new("spawn_judges")));
        assert!(!set.contains(&TransitionRef::new("other")));
    }

    #[test]
    fn refs_serialize_as_plain_strings() {
        let json = serde_json::to_string(&NodeRef::from("collect")).unwrap();
        assert_eq!(json, "\"collect\"");
        let back: NodeRef = serde_json::from_str("\"collect\"").unwrap();
        assert_eq!(back, NodeRef::from("collect"));
    }
}
