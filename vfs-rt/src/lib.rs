//! Runtime-agnostic executor abstraction for the async file channel (§4.6,
//! §9). `vfs-mem` is entirely synchronous; this crate is the only place an
//! `async fn` appears in the workspace.

pub mod channel;
pub mod runtime;

pub use channel::{AsyncFileChannel, CancelCheck};
pub use runtime::{InlineTestRuntime, VfsRuntime};

#[cfg(feature = "tokio")]
pub use runtime::TokioRuntime;
