//! Protocol implementations.

pub mod checksum;
pub mod command;
pub mod frame;

// Re-export common types
pub use command::{CHUNK_SIZE, Command, Opcode};
pub use frame::{FrameKind, decode_device_frame, encode_device_frame, encode_host_frame};
