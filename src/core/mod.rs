// Core modules implementing the document model, handle table, and adapters.
pub mod decode;
pub mod encode;
pub mod error;
pub mod handle;
pub mod iter;
pub mod node;
pub mod value;
