//! Newtype identifiers for every entity in the data model.
//!
//! Kept as thin wrappers around `u64` rather than raw integers so the
//! various `*_id` fields scattered across `race`, `judge`, and `views`
//! cannot be accidentally swapped for one another at a call site.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(ConnectionId);
entity_id!(CarId);
entity_id!(SuiteId);
entity_id!(TestId);
entity_id!(RunId);
entity_id!(RunItemId);
