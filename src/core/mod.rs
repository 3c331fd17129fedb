// error taxonomy and the shared configuration
pub mod base;
pub mod config;
// statistics
pub mod stat;
pub mod system_metric;
// admission control
pub mod circuitbreaker;
pub mod load;
// scheduling and concurrency
pub mod collection;
pub mod mr;
pub mod syncx;
pub mod threading;
