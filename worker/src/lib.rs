//! Message-driven worker boundary around the deterministic locomotion core.
//!
//! Hosts spawn an [`Engine`], feed it geometry and input messages, and consume
//! the position/raycast update stream. All simulation runs on one worker
//! thread at a fixed frequency; the host thread never touches core state and
//! nothing crosses the boundary except flat, copyable wire values.

pub mod handle;
pub mod messages;
mod scheduler;

pub use handle::Engine;
pub use messages::{
    CodecError, EngineUpdate, HostMessage, HotCommand, StructuredMessage, decode_command,
    decode_update, encode_command, encode_update, tag,
};
