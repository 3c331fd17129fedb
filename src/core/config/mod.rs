pub mod base;
pub mod constant;
pub mod entity;

pub use base::*;
pub use constant::*;
pub use entity::*;
