//! Wire protocol: frame shapes and codec for agent connections.

pub mod frame;

pub use frame::{decode_frame, encode_frame, Frame, Usage};
