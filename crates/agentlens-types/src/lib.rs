mod batch;
mod message;
mod session;

pub use batch::*;
pub use message::*;
pub use session::*;
