pub mod payment;
pub mod store;
pub mod usage;
pub mod subscription;

pub use payment::*;
pub use store::*;
pub use usage::*;
pub use subscription::*;
