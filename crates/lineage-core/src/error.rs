use std::fmt;

/// Machine-readable error codes shared by every lineage error type.
///
/// Each module defines its own `thiserror` enum and maps its variants onto
/// one of these kinds via a `code()` method, so callers can branch on the
/// kind without matching every concrete error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidArgument,
    AlreadyExists,
    MissingReference,
    NotFound,
    CycleDetected,
    ConcurrencyConflict,
    ConfigParseError,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidArgument => "E1001",
            Self::AlreadyExists => "E2001",
            Self::MissingReference => "E2002",
            Self::NotFound => "E2003",
            Self::CycleDetected => "E2004",
            Self::ConcurrencyConflict => "E3001",
            Self::ConfigParseError => "E4001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidArgument => "Invalid argument",
            Self::AlreadyExists => "Identifier already exists",
            Self::MissingReference => "Reference to an unknown node",
            Self::NotFound => "Identifier not found",
            Self::CycleDetected => "Cycle in the transition relation",
            Self::ConcurrencyConflict => "Branch version conflict",
            Self::ConfigParseError => "Config file parse error",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint for callers.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidArgument | Self::NotFound => None,
            Self::AlreadyExists => Some("Generate a fresh identifier for the new record."),
            Self::MissingReference => {
                Some("Insert referenced nodes before the records that point at them.")
            }
            Self::CycleDetected => {
                Some("Remove the transition edge that closes the loop; edges must follow the parent DAG.")
            }
            Self::ConcurrencyConflict => {
                Some("Re-read the branch version and retry, merge, or abort the append.")
            }
            Self::ConfigParseError => Some("Fix syntax in the lineage config file and retry."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }

    /// Whether a caller can reasonably retry the failed operation unchanged
    /// after refreshing its view of the store.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::ConcurrencyConflict)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
