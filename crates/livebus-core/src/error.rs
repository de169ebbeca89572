//! Owning-context precondition errors.

use std::fmt;

/// An owning-context-only operation was invoked from another context.
///
/// Proceeding would corrupt version and registry invariants, so callers
/// must surface this rather than retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextError {
    /// Name of the rejected operation (e.g. `"publish"`).
    pub operation: &'static str,
}

impl ContextError {
    /// Create an error for the named operation.
    #[must_use]
    pub const fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot invoke {} outside the owning context",
            self.operation
        )
    }
}

impl std::error::Error for ContextError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_operation() {
        let err = ContextError::new("publish");
        assert_eq!(
            err.to_string(),
            "cannot invoke publish outside the owning context"
        );
    }
}
