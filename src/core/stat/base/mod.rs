mod rolling_window;

pub use rolling_window::*;
