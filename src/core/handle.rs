// Generation-checked, type-tagged handle registry with owner scoping.
use std::any::{Any, TypeId};
use std::fmt;
use std::num::NonZeroU64;

use tracing::trace;

/// Raw value that never names a live handle.
pub const BAD_HANDLE: u64 = 0;

pub const DEFAULT_MAX_HANDLES: usize = 65_536;

/// Opaque handle: slot index in the low 32 bits, slot generation in the high 32.
/// Generations start at 1, so a valid handle is never [`BAD_HANDLE`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Handle(NonZeroU64);

impl Handle {
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }

    fn compose(index: usize, generation: u32) -> Option<Self> {
        let index = u32::try_from(index).ok()?;
        Self::from_raw(((generation as u64) << 32) | index as u64)
    }

    fn index(self) -> usize {
        (self.raw() & 0xFFFF_FFFF) as usize
    }

    fn generation(self) -> u32 {
        (self.raw() >> 32) as u32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.raw())
    }
}

/// Identity of the host context a handle was minted for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct OwnerId(pub u32);

/// Type tag returned by [`HandleTable::register_type`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandleType(u16);

/// Access check applied on dereference and close.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandleSecurity {
    pub owner: OwnerId,
}

impl HandleSecurity {
    pub fn owner(owner: OwnerId) -> Self {
        Self { owner }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandleError {
    /// Raw value does not address a slot.
    Index,
    /// Slot was freed, or reused by a later generation.
    Freed,
    /// Handle belongs to a different registered type.
    Type,
    /// Owner check failed.
    Access,
    /// Live handle limit reached.
    Limit,
    /// Handle type was never registered with this table.
    NoType,
}

impl HandleError {
    pub fn code(self) -> i32 {
        match self {
            HandleError::Type => 2,
            HandleError::Freed => 3,
            HandleError::Index => 4,
            HandleError::Access => 5,
            HandleError::Limit => 6,
            HandleError::NoType => 7,
        }
    }
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HandleError::Index => "no such handle",
            HandleError::Freed => "handle already destroyed",
            HandleError::Type => "handle has a different type",
            HandleError::Access => "handle belongs to another owner",
            HandleError::Limit => "handle limit reached",
            HandleError::NoType => "handle type is not registered",
        };
        write!(f, "{text} (error {})", self.code())
    }
}

impl std::error::Error for HandleError {}

/// Object stored behind a handle.
pub trait HandleObject: Any {
    /// Destroy callback; runs exactly once, after the handle is already unreachable.
    fn on_handle_destroy(self: Box<Self>);
}

trait Stored {
    fn destroy(self: Box<Self>);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: HandleObject> Stored for T {
    fn destroy(self: Box<Self>) {
        self.on_handle_destroy();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct TypeEntry {
    name: &'static str,
    type_id: TypeId,
}

struct Entry {
    ty: HandleType,
    owner: OwnerId,
    object: Box<dyn Stored>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

pub struct HandleTable {
    types: Vec<TypeEntry>,
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
    max_handles: usize,
}

impl HandleTable {
    pub fn new(max_handles: usize) -> Self {
        Self {
            types: Vec::new(),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            max_handles,
        }
    }

    pub fn register_type<T: HandleObject>(&mut self, name: &'static str) -> HandleType {
        let ty = HandleType(self.types.len() as u16);
        self.types.push(TypeEntry {
            name,
            type_id: TypeId::of::<T>(),
        });
        ty
    }

    pub fn live(&self) -> usize {
        self.live
    }

    /// Stores `object` under a new handle. On failure the object is handed back
    /// untouched so the caller decides how to release it.
    pub fn create<T: HandleObject>(
        &mut self,
        ty: HandleType,
        owner: OwnerId,
        object: T,
    ) -> Result<Handle, (HandleError, T)> {
        if let Err(err) = self.check_type::<T>(ty) {
            return Err((err, object));
        }
        if self.live >= self.max_handles {
            return Err((HandleError::Limit, object));
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 1,
                    entry: None,
                });
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        let handle = match Handle::compose(index, slot.generation) {
            Some(handle) => handle,
            None => {
                self.free.push(index);
                return Err((HandleError::Limit, object));
            }
        };
        slot.entry = Some(Entry {
            ty,
            owner,
            object: Box::new(object),
        });
        self.live += 1;
        trace!(handle = %handle, owner = owner.0, type_name = self.types[ty.0 as usize].name, "handle created");
        Ok(handle)
    }

    pub fn read<T: HandleObject>(
        &self,
        handle: Handle,
        ty: HandleType,
        security: HandleSecurity,
    ) -> Result<&T, HandleError> {
        self.check_type::<T>(ty)?;
        let entry = self.entry(handle, security)?;
        if entry.ty != ty {
            return Err(HandleError::Type);
        }
        entry
            .object
            .as_any()
            .downcast_ref::<T>()
            .ok_or(HandleError::Type)
    }

    pub fn read_mut<T: HandleObject>(
        &mut self,
        handle: Handle,
        ty: HandleType,
        security: HandleSecurity,
    ) -> Result<&mut T, HandleError> {
        self.check_type::<T>(ty)?;
        let entry = self.entry_mut(handle, security)?;
        if entry.ty != ty {
            return Err(HandleError::Type);
        }
        entry
            .object
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(HandleError::Type)
    }

    /// Destroys a handle of any type, running its destroy callback once.
    pub fn free(&mut self, handle: Handle, security: HandleSecurity) -> Result<(), HandleError> {
        self.entry(handle, security)?;
        let entry = self.vacate(handle.index());
        self.finish_destroy(handle, entry);
        Ok(())
    }

    /// Destroys every handle minted for `owner`; returns how many were destroyed.
    pub fn free_owner(&mut self, owner: OwnerId) -> usize {
        self.destroy_where(|entry| entry.owner == owner)
    }

    pub fn clear(&mut self) -> usize {
        self.destroy_where(|_| true)
    }

    fn check_type<T: HandleObject>(&self, ty: HandleType) -> Result<(), HandleError> {
        let entry = self.types.get(ty.0 as usize).ok_or(HandleError::NoType)?;
        if entry.type_id != TypeId::of::<T>() {
            return Err(HandleError::Type);
        }
        Ok(())
    }

    fn entry(&self, handle: Handle, security: HandleSecurity) -> Result<&Entry, HandleError> {
        let slot = self.slots.get(handle.index()).ok_or(HandleError::Index)?;
        let entry = match (&slot.entry, slot.generation == handle.generation()) {
            (Some(entry), true) => entry,
            _ => return Err(HandleError::Freed),
        };
        if security.owner != entry.owner {
            return Err(HandleError::Access);
        }
        Ok(entry)
    }

    fn entry_mut(
        &mut self,
        handle: Handle,
        security: HandleSecurity,
    ) -> Result<&mut Entry, HandleError> {
        self.entry(handle, security)?;
        self.slots[handle.index()]
            .entry
            .as_mut()
            .ok_or(HandleError::Freed)
    }

    /// Empties a slot and retires its generation; the entry is returned so its
    /// destroy callback runs after the table is consistent again.
    fn vacate(&mut self, index: usize) -> Option<Entry> {
        let slot = &mut self.slots[index];
        let entry = slot.entry.take()?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.free.push(index);
        self.live -= 1;
        Some(entry)
    }

    fn finish_destroy(&self, handle: Handle, entry: Option<Entry>) {
        if let Some(entry) = entry {
            trace!(
                handle = %handle,
                owner = entry.owner.0,
                type_name = self.types[entry.ty.0 as usize].name,
                "handle destroyed"
            );
            entry.object.destroy();
        }
    }

    fn destroy_where(&mut self, predicate: impl Fn(&Entry) -> bool) -> usize {
        let mut doomed = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(entry) = &slot.entry {
                if predicate(entry) {
                    if let Some(handle) = Handle::compose(index, slot.generation) {
                        doomed.push(handle);
                    }
                }
            }
        }
        for handle in &doomed {
            let entry = self.vacate(handle.index());
            self.finish_destroy(*handle, entry);
        }
        doomed.len()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HANDLES)
    }
}

impl Drop for HandleTable {
    fn drop(&mut self) {
        self.clear();
    }
}
