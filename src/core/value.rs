// Value handle adapter: each "JSON" handle owns exactly one node reference.
use tracing::trace;

use crate::core::handle::{
    Handle, HandleError, HandleObject, HandleSecurity, HandleTable, HandleType, OwnerId,
};
use crate::core::node::Node;

pub const VALUE_TYPE_NAME: &str = "JSON";

/// Outcome of a typed query: a value, or which check rejected it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access<T> {
    Value(T),
    WrongType,
    /// Index outside `[0, len)`, absent key, or nothing to iterate.
    OutOfRange,
}

impl<T> Access<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Access::Value(value) => Some(value),
            Access::WrongType | Access::OutOfRange => None,
        }
    }
}

#[derive(Debug)]
pub struct JsonValue {
    node: Node,
}

impl JsonValue {
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl HandleObject for JsonValue {
    fn on_handle_destroy(self: Box<Self>) {
        trace!(refs_before = self.node.ref_count(), "releasing json value reference");
        drop(self);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ValueAdapter {
    ty: HandleType,
}

impl ValueAdapter {
    pub fn register(table: &mut HandleTable) -> Self {
        Self {
            ty: table.register_type::<JsonValue>(VALUE_TYPE_NAME),
        }
    }

    /// Mints a handle for a reference the caller already owns; the count is not
    /// touched. If minting fails the reference is released before returning.
    pub fn mint(
        &self,
        table: &mut HandleTable,
        owner: OwnerId,
        node: Node,
    ) -> Result<Handle, HandleError> {
        table
            .create(self.ty, owner, JsonValue { node })
            .map_err(|(err, rejected)| {
                drop(rejected);
                err
            })
    }

    /// Mints a handle for a child picked out of the node behind `source`. The
    /// child is borrowed from its parent, so a reference is acquired for the new
    /// handle.
    pub fn mint_derived<F>(
        &self,
        table: &mut HandleTable,
        owner: OwnerId,
        source: Handle,
        select: F,
    ) -> Result<Access<Handle>, HandleError>
    where
        F: for<'n> FnOnce(&'n Node) -> Access<&'n Node>,
    {
        let parent = self.read(table, source, HandleSecurity::owner(owner))?;
        let child = match select(parent) {
            Access::Value(child) => child.incref(),
            Access::WrongType => return Ok(Access::WrongType),
            Access::OutOfRange => return Ok(Access::OutOfRange),
        };
        self.mint(table, owner, child).map(Access::Value)
    }

    pub fn read<'t>(
        &self,
        table: &'t HandleTable,
        handle: Handle,
        security: HandleSecurity,
    ) -> Result<&'t Node, HandleError> {
        table
            .read::<JsonValue>(handle, self.ty, security)
            .map(JsonValue::node)
    }
}
