//! Newtype wrappers around caller-supplied string identifiers.
//!
//! Resource and participant ids arrive from external collaborators (the
//! product catalogue and the login flow), so they are opaque strings here.
//! Distinct types prevent passing a `ParticipantId` where a `ResourceId`
//! is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default upper bound on identifier length.
pub const DEFAULT_MAX_ID_LENGTH: usize = 128;

/// Macro to define a validated newtype wrapper around `String`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier.
            ///
            /// Surrounding whitespace is trimmed. Empty values, values longer
            /// than `max_len`, and values containing control characters are
            /// rejected with `ErrorKind::ConnectionRejected`.
            pub fn parse(raw: &str, max_len: usize) -> Result<Self, AppError> {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(AppError::connection_rejected(concat!(
                        $label,
                        " is required"
                    )));
                }
                if trimmed.len() > max_len {
                    return Err(AppError::connection_rejected(format!(
                        "{} exceeds {} bytes",
                        $label, max_len
                    )));
                }
                if trimmed.chars().any(char::is_control) {
                    return Err(AppError::connection_rejected(concat!(
                        $label,
                        " contains control characters"
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Return the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of a scarce resource (an auction product page).
    ResourceId, "resource id"
);

define_id!(
    /// Identifier of a participant attempting to view a resource.
    ParticipantId, "participant id"
);
