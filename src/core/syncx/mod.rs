mod resource_manager;
mod single_flight;

pub use resource_manager::*;
pub use single_flight::*;
