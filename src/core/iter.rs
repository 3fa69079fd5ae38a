// Iterator handle adapter: object cursors that self-destruct once exhausted.
use tracing::{debug, trace};

use crate::core::handle::{
    Handle, HandleError, HandleObject, HandleSecurity, HandleTable, HandleType, OwnerId,
};
use crate::core::node::{Cursor, JsonType, Node};
use crate::core::value::{Access, ValueAdapter};

pub const ITER_TYPE_NAME: &str = "JSONObjectIter";

/// `Positioned` holds the iterator's own reference to the object; moving to
/// `Exhausted` releases it, so a dead iterator never pins its object.
#[derive(Debug)]
enum IterState {
    Positioned { object: Node, cursor: Cursor },
    Exhausted,
}

#[derive(Debug)]
pub struct JsonIter {
    state: IterState,
}

impl JsonIter {
    /// Starts at the first entry, acquiring a reference to `object`. `None` for
    /// non-objects and empty objects.
    pub fn begin(object: &Node) -> Option<Self> {
        let cursor = object.object_iter()?;
        Some(Self {
            state: IterState::Positioned {
                object: object.incref(),
                cursor,
            },
        })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, IterState::Exhausted)
    }

    /// Current key and a borrowed value; `None` once exhausted.
    pub fn current(&self) -> Option<(&str, &Node)> {
        match &self.state {
            IterState::Positioned { object, cursor } => {
                let key = object.object_iter_key(*cursor)?;
                let value = object.object_iter_value(*cursor)?;
                Some((key, value))
            }
            IterState::Exhausted => None,
        }
    }

    /// Moves to the next entry. Returns `false`, and releases the object, when
    /// there is none.
    pub fn advance(&mut self) -> bool {
        if let IterState::Positioned { object, cursor } = &mut self.state {
            if let Some(next) = object.object_iter_next(*cursor) {
                *cursor = next;
                return true;
            }
        }
        self.state = IterState::Exhausted;
        false
    }
}

impl HandleObject for JsonIter {
    fn on_handle_destroy(self: Box<Self>) {
        trace!(exhausted = self.is_exhausted(), "releasing json object iterator");
        drop(self);
    }
}

#[derive(Debug, PartialEq)]
pub enum IterRead {
    Entry { key: String, value: Handle },
    /// The iterator handle has been destroyed.
    Exhausted,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IterStep {
    Advanced(Handle),
    /// The iterator handle has been destroyed.
    Exhausted,
}

#[derive(Clone, Copy, Debug)]
pub struct IterAdapter {
    ty: HandleType,
}

impl IterAdapter {
    pub fn register(table: &mut HandleTable) -> Self {
        Self {
            ty: table.register_type::<JsonIter>(ITER_TYPE_NAME),
        }
    }

    /// Starts iterating the object behind the value handle `source`.
    /// `WrongType` for non-objects, `OutOfRange` for empty objects.
    pub fn begin(
        &self,
        table: &mut HandleTable,
        values: &ValueAdapter,
        owner: OwnerId,
        source: Handle,
    ) -> Result<Access<Handle>, HandleError> {
        let object = values.read(table, source, HandleSecurity::owner(owner))?;
        if object.json_type() != JsonType::Object {
            return Ok(Access::WrongType);
        }
        let Some(iter) = JsonIter::begin(object) else {
            return Ok(Access::OutOfRange);
        };
        table
            .create(self.ty, owner, iter)
            .map(Access::Value)
            .map_err(|(err, rejected)| {
                drop(rejected);
                err
            })
    }

    /// Reads the current entry without advancing. The value handle gets its own
    /// reference; an exhausted iterator is destroyed instead.
    pub fn read(
        &self,
        table: &mut HandleTable,
        values: &ValueAdapter,
        owner: OwnerId,
        handle: Handle,
    ) -> Result<IterRead, HandleError> {
        let security = HandleSecurity::owner(owner);
        let entry = table
            .read::<JsonIter>(handle, self.ty, security)?
            .current()
            .map(|(key, value)| (key.to_string(), value.incref()));
        match entry {
            Some((key, value)) => {
                let value = values.mint(table, owner, value)?;
                Ok(IterRead::Entry { key, value })
            }
            None => {
                self.expire(table, handle, security)?;
                Ok(IterRead::Exhausted)
            }
        }
    }

    /// Advances the cursor; destroys the iterator when no entry is left.
    pub fn advance(
        &self,
        table: &mut HandleTable,
        owner: OwnerId,
        handle: Handle,
    ) -> Result<IterStep, HandleError> {
        let security = HandleSecurity::owner(owner);
        if table
            .read_mut::<JsonIter>(handle, self.ty, security)?
            .advance()
        {
            return Ok(IterStep::Advanced(handle));
        }
        self.expire(table, handle, security)?;
        Ok(IterStep::Exhausted)
    }

    fn expire(
        &self,
        table: &mut HandleTable,
        handle: Handle,
        security: HandleSecurity,
    ) -> Result<(), HandleError> {
        debug!(handle = %handle, "object iterator exhausted");
        table.free(handle, security)
    }
}
