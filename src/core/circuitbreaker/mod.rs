//! Adaptive circuit breaking.
//!
//! Unlike the classic closed/open/half-open state machine, the breakers here
//! reject requests with a probability that grows with the failure rate
//! observed in a rolling window, so recovery is gradual and needs no probes.

pub mod breaker;
pub mod breakers;
pub mod error_window;
pub mod google_breaker;

pub use breaker::*;
pub use breakers::*;
pub use error_window::*;
pub use google_breaker::*;
