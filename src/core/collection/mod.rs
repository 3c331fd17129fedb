mod timing_wheel;

pub use timing_wheel::*;
