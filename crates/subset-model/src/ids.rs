//! Strongly-typed entity identifiers
//!
//! Every table key is a distinct newtype over [`Uuid`] so a list id can never
//! be passed where an item id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random id
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing uuid
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying uuid
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

entity_id!(
    /// Questionnaire project (study) identifier
    ProjectId
);
entity_id!(
    /// Questionnaire line (question) identifier
    QuestionnaireLineId
);
entity_id!(
    /// Managed list identifier
    ManagedListId
);
entity_id!(
    /// Managed list item identifier
    ManagedListItemId
);
entity_id!(
    /// Question-to-list assignment identifier
    QuestionManagedListId
);
entity_id!(
    /// Subset definition identifier
    SubsetDefinitionId
);
entity_id!(
    /// Subset membership row identifier
    SubsetMembershipId
);
entity_id!(
    /// Question subset link identifier
    QuestionSubsetLinkId
);
entity_id!(
    /// Acting user, recorded in audit fields
    UserId
);
