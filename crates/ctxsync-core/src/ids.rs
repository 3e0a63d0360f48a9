//! Branded ID newtypes.
//!
//! Change IDs and sync cycle IDs are distinct newtypes around `String` so a
//! cycle ID can never be passed where a change ID is expected. Fresh IDs are
//! UUID v7 (time-ordered), which keeps audit and history listings sortable.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
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

        impl Default for $name {
            fn default() -> Self {
                Self::new()
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
    /// Unique identifier for a [`ContextChange`](crate::change::ContextChange).
    ChangeId
}

branded_id! {
    /// Unique identifier for one synchronization cycle.
    CycleId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_id_new_is_uuid_v7() {
        let id = ChangeId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ChangeId::new(), ChangeId::new());
        assert_ne!(CycleId::new(), CycleId::new());
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let first = ChangeId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ChangeId::new();
        assert!(first < second);
    }

    #[test]
    fn from_str_ref_and_display() {
        let id = ChangeId::from("chg-1");
        assert_eq!(id.as_str(), "chg-1");
        assert_eq!(format!("{id}"), "chg-1");
        let s: &str = &id;
        assert_eq!(s, "chg-1");
    }

    #[test]
    fn serializes_transparently() {
        let id = CycleId::from("cycle-7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cycle-7\"");
        let back: CycleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn into_inner() {
        let id = ChangeId::from("inner");
        assert_eq!(id.into_inner(), "inner");
    }
}
