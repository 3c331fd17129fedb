mod batch_error;
mod block_error;
mod result;

pub use batch_error::*;
pub use block_error::*;
pub use result::*;
