use std::fmt;

use flint_query::FilterParseError;

/// Failure of a find/projection operation.
///
/// Carries the user-visible diagnostic string; messages for known
/// conditions are stable and match the upstream server's wording.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationFailure(pub String);

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for OperationFailure {}

impl From<FilterParseError> for OperationFailure {
    fn from(e: FilterParseError) -> Self {
        OperationFailure(e.to_string())
    }
}
