/// statistics module
mod base;

pub use base::*;
