#![forbid(unsafe_code)]

//! Errors surfaced by bus and hub operations.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `NotOwningContext` | Owning-context operation called elsewhere | Operation rejected, state untouched |
//! | `ConflictingRegistration` | Same subscriber id bound to a second source | Existing registration kept |
//! | `TypeMismatch` | Hub key reused with another value type | Existing channel kept |

use std::fmt;

use livebus_core::ContextError;

use crate::reactive::SubscriberId;

/// Errors from [`LiveBus`](crate::LiveBus) and [`BusHub`](crate::BusHub).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// An owning-context operation was invoked from another context.
    NotOwningContext { operation: &'static str },
    /// The subscriber is already registered against a different binding.
    ConflictingRegistration { subscriber: SubscriberId },
    /// A hub channel exists under `key` with a different value type.
    TypeMismatch {
        key: String,
        stored: &'static str,
        requested: &'static str,
    },
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOwningContext { operation } => {
                write!(f, "cannot invoke {operation} outside the owning context")
            }
            Self::ConflictingRegistration { subscriber } => {
                write!(
                    f,
                    "cannot add {subscriber} with a different liveness binding"
                )
            }
            Self::TypeMismatch {
                key,
                stored,
                requested,
            } => write!(
                f,
                "channel '{key}' carries {stored}, not {requested}"
            ),
        }
    }
}

impl std::error::Error for BusError {}

impl From<ContextError> for BusError {
    fn from(err: ContextError) -> Self {
        Self::NotOwningContext {
            operation: err.operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_error_converts() {
        let err: BusError = ContextError::new("subscribe").into();
        assert_eq!(
            err,
            BusError::NotOwningContext {
                operation: "subscribe"
            }
        );
        assert_eq!(
            err.to_string(),
            "cannot invoke subscribe outside the owning context"
        );
    }

    #[test]
    fn display_messages() {
        let conflict = BusError::ConflictingRegistration {
            subscriber: SubscriberId::from_raw(3),
        };
        assert_eq!(
            conflict.to_string(),
            "cannot add subscriber#3 with a different liveness binding"
        );
        let mismatch = BusError::TypeMismatch {
            key: "title".into(),
            stored: "alloc::string::String",
            requested: "u32",
        };
        assert_eq!(
            mismatch.to_string(),
            "channel 'title' carries alloc::string::String, not u32"
        );
    }
}
