//! Newtype wrappers for identifiers to ensure type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Create a new id from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a new random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Get the inner string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
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
    };
}

define_id!(
    /// Unique identifier for a CareRequest.
    RequestId
);

define_id!(
    /// Unique identifier for a background pipeline Job.
    JobId
);

define_id!(
    /// Unique identifier for a CareTask.
    TaskId
);

define_id!(
    /// Unique identifier for a CarePlan.
    PlanId
);

define_id!(
    /// Unique identifier for a ReviewPacket.
    PacketId
);

define_id!(
    /// Unique identifier for a CareTaskEvent.
    EventId
);

define_id!(
    /// Identifier of an acting user (organizer or helper).
    ///
    /// Authentication is external; the core only compares identities.
    UserId
);
