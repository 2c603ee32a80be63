pub mod sender;
pub mod dispatcher;

pub use sender::*;
pub use dispatcher::*;
