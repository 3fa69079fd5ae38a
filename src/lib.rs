//! Purpose: Library crate exposing opaque JSON handles over a reference-counted tree.
//! Exports: `api` (runtime, handles, results), `core` (node model, handle table,
//! adapters), `abi` (C-callable surface).
//! Role: Backs the `jsonh` CLI, the `cdylib`/`staticlib` builds, and tests.
//! Invariants: Node references are acquired and released only by the value and
//! iterator adapters.
//! Invariants: Single-threaded; a runtime never crosses threads.
pub mod abi;
pub mod api;
pub mod core;
