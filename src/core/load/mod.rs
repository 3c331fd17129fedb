//! Adaptive load shedding.
//!
//! A shedder drops requests only when the process is overloaded (or has just been)
//! and more requests are on the fly than it can handle, so a busy but healthy
//! service keeps serving everything it admits.

pub mod adaptive_shedder;
pub mod nop_shedder;
pub mod shedder_group;
pub mod shedding_stat;

pub use adaptive_shedder::*;
pub use nop_shedder::*;
pub use shedder_group::*;
pub use shedding_stat::*;

use crate::{config, Result};

/// Promise reports the outcome of a request admitted by `Shedder::allow`.
/// Exactly one of `pass` or `fail` is called, dropping it counts as `fail`.
pub trait Promise: Send {
    /// `pass` reports a successful request, its latency feeds the capacity estimation.
    fn pass(self: Box<Self>);
    fn fail(self: Box<Self>);
}

pub trait Shedder: Send + Sync {
    /// `allow` admits the request or rejects it with a `BlockError` of `BlockType::Overload`.
    fn allow(&self) -> Result<Box<dyn Promise>>;
}

/// `disable` turns the shedders constructed afterwards into no-op shedders.
pub fn disable() {
    config::set_shedder_enabled(false);
}

/// `disable_log` mutes the drop logs of the shedders constructed afterwards
/// and the periodic shedding statistics.
pub fn disable_log() {
    config::set_shedder_log_enabled(false);
}
