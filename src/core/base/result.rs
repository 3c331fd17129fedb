//! Result
//!
use std::fmt;

/// `BlockType` tells which primitive rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Unknown,
    /// rejected by the adaptive circuit breaker,
    /// callers should fail fast or route the request to a fallback
    CircuitBreaking,
    /// rejected by the adaptive load shedder,
    /// callers should back off and retry later
    Overload,
}

impl Default for BlockType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
