//! Purpose: Operation layer mapping handle-based calls onto the JSON document model.
//! Exports: `Runtime`, `RuntimeOptions`, `Session`.
//! Role: Single entry point shared by Rust callers, the C ABI, and the CLI.
//! Invariants: Every operation checks handle type and owner before touching a node.
//! Invariants: Reference counts move only inside the value/iterator adapters.
//! Invariants: Type and range misses are `Ok(Access::..)`; only bad handles, parse
//! failures, and table limits are `Err`.
#![allow(clippy::result_large_err)]

use tracing::debug;

use crate::core::decode;
use crate::core::encode::EncodeFlags;
use crate::core::error::{Error, ErrorKind};
use crate::core::handle::{
    DEFAULT_MAX_HANDLES, Handle, HandleError, HandleSecurity, HandleTable, OwnerId,
};
use crate::core::iter::{IterAdapter, IterRead, IterStep};
use crate::core::node::{JsonType, Node};
use crate::core::value::{Access, ValueAdapter};

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RuntimeOptions {
    max_handles: usize,
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
        }
    }

    pub fn with_max_handles(mut self, max_handles: usize) -> Self {
        self.max_handles = max_handles;
        self
    }

    pub fn max_handles(&self) -> usize {
        self.max_handles
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the handle table. Dropping the runtime destroys every remaining handle.
pub struct Runtime {
    table: HandleTable,
    values: ValueAdapter,
    iters: IterAdapter,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::new())
    }

    pub fn with_options(options: RuntimeOptions) -> Self {
        let mut table = HandleTable::new(options.max_handles());
        let values = ValueAdapter::register(&mut table);
        let iters = IterAdapter::register(&mut table);
        Self {
            table,
            values,
            iters,
        }
    }

    /// Operations on behalf of `owner`; handles minted here are tagged with it.
    pub fn session(&mut self, owner: OwnerId) -> Session<'_> {
        Session {
            runtime: self,
            owner,
        }
    }

    /// Owner-context teardown: destroys every handle minted for `owner`.
    pub fn release_owner(&mut self, owner: OwnerId) -> usize {
        let destroyed = self.table.free_owner(owner);
        debug!(owner = owner.0, destroyed, "released owner handles");
        destroyed
    }

    pub fn live_handles(&self) -> usize {
        self.table.live()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Session<'rt> {
    runtime: &'rt mut Runtime,
    owner: OwnerId,
}

impl Session<'_> {
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Parses `text`; the new handle owns the root outright.
    pub fn parse(&mut self, text: &str) -> ApiResult<Handle> {
        let root = decode::parse(text)?;
        self.adopt(root)
    }

    /// Hands an owned reference to a new value handle without acquiring another.
    pub fn adopt(&mut self, node: Node) -> ApiResult<Handle> {
        let rt = &mut *self.runtime;
        rt.values
            .mint(&mut rt.table, self.owner, node)
            .map_err(|err| mint_error(err, "JSON value"))
    }

    pub fn dumps(&self, handle: Handle, flags: EncodeFlags) -> ApiResult<String> {
        self.node(handle)?.encode(flags)
    }

    pub fn type_of(&self, handle: Handle) -> ApiResult<JsonType> {
        Ok(self.node(handle)?.json_type())
    }

    pub fn read_string(&self, handle: Handle) -> ApiResult<Access<String>> {
        self.read_scalar(handle, |node| node.as_str().map(str::to_string))
    }

    pub fn read_integer(&self, handle: Handle) -> ApiResult<Access<i64>> {
        self.read_scalar(handle, Node::as_i64)
    }

    pub fn read_real(&self, handle: Handle) -> ApiResult<Access<f64>> {
        self.read_scalar(handle, Node::as_f64)
    }

    pub fn read_bool(&self, handle: Handle) -> ApiResult<Access<bool>> {
        self.read_scalar(handle, Node::as_bool)
    }

    pub fn array_size(&self, handle: Handle) -> ApiResult<Access<usize>> {
        self.read_scalar(handle, Node::array_len)
    }

    /// Any index outside `[0, size)`, negative included, is `OutOfRange`.
    pub fn array_get(&mut self, handle: Handle, index: i64) -> ApiResult<Access<Handle>> {
        self.derive(handle, |node| {
            let Some(len) = node.array_len() else {
                return Access::WrongType;
            };
            match usize::try_from(index) {
                Ok(index) if index < len => node
                    .array_get(index)
                    .map_or(Access::OutOfRange, Access::Value),
                _ => Access::OutOfRange,
            }
        })
    }

    pub fn object_size(&self, handle: Handle) -> ApiResult<Access<usize>> {
        self.read_scalar(handle, Node::object_len)
    }

    pub fn object_get(&mut self, handle: Handle, key: &str) -> ApiResult<Access<Handle>> {
        self.derive(handle, |node| {
            if node.json_type() != JsonType::Object {
                return Access::WrongType;
            }
            node.object_get(key)
                .map_or(Access::OutOfRange, Access::Value)
        })
    }

    /// `OutOfRange` when the object has no entries.
    pub fn object_iter(&mut self, handle: Handle) -> ApiResult<Access<Handle>> {
        let rt = &mut *self.runtime;
        rt.iters
            .begin(&mut rt.table, &rt.values, self.owner, handle)
            .map_err(|err| handle_error(err, handle, "JSON value"))
    }

    /// Current key plus a new value handle. An exhausted iterator is destroyed
    /// and reported as `IterRead::Exhausted`.
    pub fn object_iter_read(&mut self, iter: Handle) -> ApiResult<IterRead> {
        let rt = &mut *self.runtime;
        rt.iters
            .read(&mut rt.table, &rt.values, self.owner, iter)
            .map_err(|err| handle_error(err, iter, "JSON object iterator"))
    }

    /// Advances `iter`; when no entry is left the handle is destroyed and
    /// `IterStep::Exhausted` returned.
    pub fn object_iter_next(&mut self, iter: Handle) -> ApiResult<IterStep> {
        let rt = &mut *self.runtime;
        rt.iters
            .advance(&mut rt.table, self.owner, iter)
            .map_err(|err| handle_error(err, iter, "JSON object iterator"))
    }

    /// Explicit release of a value or iterator handle.
    pub fn close(&mut self, handle: Handle) -> ApiResult<()> {
        self.runtime
            .table
            .free(handle, HandleSecurity::owner(self.owner))
            .map_err(|err| handle_error(err, handle, "JSON"))
    }

    /// References currently held on the node behind `handle`.
    pub fn ref_count(&self, handle: Handle) -> ApiResult<usize> {
        Ok(self.node(handle)?.ref_count())
    }

    fn node(&self, handle: Handle) -> ApiResult<&Node> {
        let rt = &*self.runtime;
        rt.values
            .read(&rt.table, handle, HandleSecurity::owner(self.owner))
            .map_err(|err| handle_error(err, handle, "JSON value"))
    }

    fn read_scalar<T>(
        &self,
        handle: Handle,
        read: impl FnOnce(&Node) -> Option<T>,
    ) -> ApiResult<Access<T>> {
        Ok(read(self.node(handle)?).map_or(Access::WrongType, Access::Value))
    }

    fn derive<F>(&mut self, handle: Handle, select: F) -> ApiResult<Access<Handle>>
    where
        F: for<'n> FnOnce(&'n Node) -> Access<&'n Node>,
    {
        let rt = &mut *self.runtime;
        rt.values
            .mint_derived(&mut rt.table, self.owner, handle, select)
            .map_err(|err| handle_error(err, handle, "JSON value"))
    }
}

fn handle_error(err: HandleError, handle: Handle, what: &str) -> Error {
    if err == HandleError::Limit {
        return mint_error(err, what);
    }
    debug!(handle = %handle, error = %err, "rejected {what} handle");
    Error::new(ErrorKind::InvalidHandle)
        .with_message(format!("invalid {what} handle {handle}: {err}"))
        .with_handle(handle.raw())
        .with_source(err)
}

fn mint_error(err: HandleError, what: &str) -> Error {
    let kind = match err {
        HandleError::Limit => ErrorKind::Limit,
        _ => ErrorKind::Internal,
    };
    Error::new(kind)
        .with_message(format!("cannot create {what} handle: {err}"))
        .with_source(err)
}
