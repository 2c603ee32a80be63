pub mod store;
pub mod catalog;

pub use store::*;
pub use catalog::*;
