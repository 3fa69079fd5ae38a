//! Purpose: Define the stable public Rust API boundary for jsonhandle.
//! Exports: Runtime/session operations plus the handle, node, and error types they use.
//! Role: Public, additive-only surface shared by the C ABI and the CLI.
//! Invariants: Callers only ever see handles; nodes are reachable through `Node` for
//! hosts that build or inspect trees directly.

mod runtime;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::decode::ParseFailureCategory;
pub use crate::core::encode::EncodeFlags;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::handle::{BAD_HANDLE, Handle, OwnerId};
pub use crate::core::iter::{IterRead, IterStep};
pub use crate::core::node::{JsonType, Node};
pub use crate::core::value::Access;
pub use runtime::{ApiResult, Runtime, RuntimeOptions, Session};
