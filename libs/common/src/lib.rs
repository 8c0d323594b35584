pub mod escape;
pub mod frame;
pub mod id;

pub use escape::decode_messages;
pub use frame::{CloseReason, Frame};
