//! # Sentinel Kit
//!
//! Self-protection and concurrency primitives for request-serving services:
//!
//! - `circuitbreaker`: adaptive circuit breaking after the Google SRE client-side throttling,
//!   driven by a rolling window of accepted and total requests.
//! - `load`: adaptive load shedding, driven by the cpu usage and the requests in flight.
//! - `collection`: a hashed timing wheel for delayed tasks.
//! - `mr`: bounded fan-out/fan-in with cancellation.
//! - `syncx`: single-flight calls and a keyed resource cache with single-flight creation.
//!
//! The primitives are independent building blocks, composed by the surrounding service code.
//!
//! ## General Configurations and Initialization
//!
//! The `api` module provides following interfaces:
//!
//! - `init_default()`: Load configurations from environment variable. For undefined configurations, use default values.
//! - `init_with_config_file(config_path: &mut String)`: Load configurations from a YAML file.
//! - `init_with_config(config_entity: ConfigEntity)`: Use hand-crafted `ConfigEntity` to initialize the kit.
//!
//! Example:
//!
//! ```rust
//! use sentinel_kit::{init_default, logging};
//! init_default().unwrap_or_else(|err| logging::error!("{:?}", err));
//! ```
//!
//! ## Circuit Breaking
//!
//! ```rust
//! use sentinel_kit::circuitbreaker;
//! let res = circuitbreaker::do_request("user-service", || {
//!     // call the dependency here
//!     Ok(())
//! });
//! ```
//!
//! ## Load Shedding
//!
//! ```rust
//! use sentinel_kit::load::{new_adaptive_shedder, ShedderOptions};
//! let shedder = new_adaptive_shedder(ShedderOptions::default()).unwrap();
//! if let Ok(promise) = shedder.allow() {
//!     // serve the request, then report the outcome
//!     promise.pass();
//! } else {
//!     // the service is overloaded, reject the request
//! }
//! ```

/// Initialization of the kit.
pub mod api;
/// Core implementations, the statistic structures, the admission control primitives,
/// the schedulers and the configuration.
pub mod core;
/// Adapters for different logging crates.
pub mod logging;
// Utility functions.
pub mod utils;

// re-export precludes
pub use crate::core::*;
pub use api::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
