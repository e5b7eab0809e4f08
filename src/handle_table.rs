//! The process-wide handle table.
//!
//! Built as a free-list slab: a `Vec<Option<T>>` plus a `Vec<u32>` of
//! recycled indices, handing back `index + 1` so `0` stays reserved for
//! [`Handle::INVALID`]. Two things a plain slab has no equivalent for are
//! added on top: a per-dispatcher handle refcount (closing one of several handles that
//! alias the same dispatcher, via `Duplicate`, must not tear down the
//! dispatcher until the *last* one closes) and a cancel registry (a
//! blocked `Wait`/`WaitMany`/`WaitSetWait` call is registered against the
//! handle it was issued through, so closing that handle from another
//! thread can resolve it with `CANCELLED` instead of leaving it blocked
//! forever).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::dispatcher::{default_rights_for, Dispatcher};
use crate::error::{MojoError, MojoResult};
use crate::handle::Handle;
use crate::limits::Limits;
use crate::rights::Rights;

struct Binding {
    dispatcher: Dispatcher,
    rights: Rights,
}

struct Inner {
    entries: Vec<Option<Binding>>,
    free_list: Vec<u32>,
    live_count: usize,
    /// How many live handles currently reference each dispatcher id.
    dispatcher_refs: HashMap<u64, usize>,
    /// `handle index -> [(dispatcher, waiter id), ...]` pending cancellable
    /// registrations made through that handle.
    cancel_registry: HashMap<u32, Vec<(Dispatcher, u64)>>,
}

/// The single process-global table every [`Handle`] indexes into (spec
/// §5.1). One instance backs one [`crate::core::Core`].
pub struct HandleTable {
    inner: Mutex<Inner>,
    max_handles: usize,
}

impl HandleTable {
    pub fn new(limits: &Limits) -> HandleTable {
        HandleTable {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                free_list: Vec::new(),
                live_count: 0,
                dispatcher_refs: HashMap::new(),
                cancel_registry: HashMap::new(),
            }),
            max_handles: limits.max_handles,
        }
    }

    fn index_of(handle: Handle) -> MojoResult<u32> {
        if !handle.is_valid() {
            return Err(MojoError::InvalidArgument);
        }
        Ok(handle.0 - 1)
    }

    /// Installs `dispatcher` under a fresh handle with its default rights
    ///.
    pub fn add(&self, dispatcher: Dispatcher) -> MojoResult<Handle> {
        let rights = default_rights_for(&dispatcher);
        self.add_with_rights(dispatcher, rights)
    }

    /// Installs `dispatcher` under a fresh handle with explicit `rights`,
    /// used by `ReadMessage` to reinstall a transferred handle's original
    /// rights rather than the default set for its kind.
    pub fn add_with_rights(&self, dispatcher: Dispatcher, rights: Rights) -> MojoResult<Handle> {
        let mut inner = self.inner.lock().unwrap();
        if inner.live_count >= self.max_handles {
            return Err(MojoError::ResourceExhausted);
        }
        let id = dispatcher.dispatcher_id();
        *inner.dispatcher_refs.entry(id).or_insert(0) += 1;
        let binding = Binding { dispatcher, rights };
        let index = if let Some(index) = inner.free_list.pop() {
            inner.entries[index as usize] = Some(binding);
            index
        } else {
            inner.entries.push(Some(binding));
            (inner.entries.len() - 1) as u32
        };
        inner.live_count += 1;
        Ok(Handle(index + 1))
    }

    /// Returns a clone of the dispatcher and the rights bound to `handle`.
    /// Every operation that acts on a handle starts here, then checks the
    /// right it needs against the returned mask.
    pub fn lookup(&self, handle: Handle) -> MojoResult<(Dispatcher, Rights)> {
        let index = Self::index_of(handle)?;
        let inner = self.inner.lock().unwrap();
        match inner.entries.get(index as usize).and_then(|slot| slot.as_ref()) {
            Some(binding) => Ok((binding.dispatcher.clone(), binding.rights)),
            None => Err(MojoError::InvalidArgument),
        }
    }

    /// `Close`: removes the binding, cancels any wait still
    /// registered through this specific handle, and tears down the
    /// dispatcher's peer/propagation logic once its last handle is gone.
    pub fn close(&self, handle: Handle) -> MojoResult<()> {
        let index = Self::index_of(handle)?;
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .entries
            .get_mut(index as usize)
            .ok_or(MojoError::InvalidArgument)?;
        let binding = slot.take().ok_or(MojoError::InvalidArgument)?;
        inner.free_list.push(index);
        inner.live_count -= 1;

        let pending = inner.cancel_registry.remove(&index);
        let dispatcher_id = binding.dispatcher.dispatcher_id();
        let last_reference = match inner.dispatcher_refs.get_mut(&dispatcher_id) {
            Some(count) => {
                *count -= 1;
                let gone = *count == 0;
                if gone {
                    inner.dispatcher_refs.remove(&dispatcher_id);
                }
                gone
            }
            None => true,
        };
        drop(inner);

        if let Some(pending) = pending {
            for (dispatcher, waiter_id) in pending {
                dispatcher.cancel_waiter(waiter_id);
            }
        }
        if last_reference {
            binding.dispatcher.on_last_handle_closed();
        }
        Ok(())
    }

    /// `Duplicate`/`DuplicateWithReducedRights`:
    /// requires `DUPLICATE`, checked by the caller against the rights
    /// `lookup` returned before calling this.
    pub fn duplicate(&self, dispatcher: Dispatcher, rights: Rights) -> MojoResult<Handle> {
        self.add_with_rights(dispatcher, rights)
    }

    /// Removes `handle`'s binding for `WriteMessage` to carry it inside a
    /// message. Unlike [`HandleTable::close`],
    /// this does **not** decrement `dispatcher_refs`: the reference the
    /// closed handle held is still alive, just moved into the message
    /// queue instead of a table slot, until [`HandleTable::install_transferred`]
    /// gives it a new slot on the reader's side. Still cancels any wait
    /// pending through this handle, since the handle number itself stops
    /// existing the instant it is detached.
    pub fn detach_for_transfer(&self, handle: Handle) -> MojoResult<(Dispatcher, Rights)> {
        let index = Self::index_of(handle)?;
        let (binding, pending) = {
            let mut inner = self.inner.lock().unwrap();
            let slot = inner
                .entries
                .get_mut(index as usize)
                .ok_or(MojoError::InvalidArgument)?;
            let binding = slot.take().ok_or(MojoError::InvalidArgument)?;
            inner.free_list.push(index);
            inner.live_count -= 1;
            let pending = inner.cancel_registry.remove(&index);
            (binding, pending)
        };
        if let Some(pending) = pending {
            for (dispatcher, waiter_id) in pending {
                dispatcher.cancel_waiter(waiter_id);
            }
        }
        Ok((binding.dispatcher, binding.rights))
    }

    /// Installs a dispatcher arriving from `ReadMessage` under a fresh
    /// handle at its original rights. The mirror image of
    /// [`HandleTable::detach_for_transfer`]: does not increment
    /// `dispatcher_refs`, since the reference was never decremented when
    /// the handle was detached on the sender's side.
    pub fn install_transferred(&self, dispatcher: Dispatcher, rights: Rights) -> MojoResult<Handle> {
        let mut inner = self.inner.lock().unwrap();
        if inner.live_count >= self.max_handles {
            return Err(MojoError::ResourceExhausted);
        }
        let binding = Binding { dispatcher, rights };
        let index = if let Some(index) = inner.free_list.pop() {
            inner.entries[index as usize] = Some(binding);
            index
        } else {
            inner.entries.push(Some(binding));
            (inner.entries.len() - 1) as u32
        };
        inner.live_count += 1;
        Ok(Handle(index + 1))
    }

    /// `replace_with_reduced_rights`: atomically closes
    /// `handle` and binds the same dispatcher under a new handle with
    /// `rights & !rights_to_remove`. Never touches the dispatcher's
    /// refcount (the close and the re-add cancel out under one lock
    /// acquisition), so this never spuriously fires peer-close
    /// propagation the way a plain `close` followed by `add` would.
    pub fn replace_with_reduced_rights(&self, handle: Handle, rights_to_remove: Rights) -> MojoResult<Handle> {
        let index = Self::index_of(handle)?;
        let (pending, new_handle) = {
            let mut inner = self.inner.lock().unwrap();
            let slot = inner
                .entries
                .get_mut(index as usize)
                .ok_or(MojoError::InvalidArgument)?;
            let binding = slot.take().ok_or(MojoError::InvalidArgument)?;
            inner.free_list.push(index);
            inner.live_count -= 1;
            let pending = inner.cancel_registry.remove(&index);

            let new_rights = binding.rights.minus(rights_to_remove);
            let new_binding = Binding {
                dispatcher: binding.dispatcher,
                rights: new_rights,
            };
            let new_index = if let Some(idx) = inner.free_list.pop() {
                inner.entries[idx as usize] = Some(new_binding);
                idx
            } else {
                inner.entries.push(Some(new_binding));
                (inner.entries.len() - 1) as u32
            };
            inner.live_count += 1;
            (pending, Handle(new_index + 1))
        };
        if let Some(pending) = pending {
            for (dispatcher, waiter_id) in pending {
                dispatcher.cancel_waiter(waiter_id);
            }
        }
        Ok(new_handle)
    }

    /// Registers a pending wait as cancellable through `handle`: if
    /// `handle` is closed by another thread before the wait resolves
    /// naturally, `dispatcher.cancel_waiter(waiter_id)` fires.
    pub fn register_cancellable(&self, handle: Handle, dispatcher: Dispatcher, waiter_id: u64) -> MojoResult<()> {
        let index = Self::index_of(handle)?;
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.get(index as usize).and_then(|s| s.as_ref()).is_none() {
            return Err(MojoError::InvalidArgument);
        }
        inner
            .cancel_registry
            .entry(index)
            .or_default()
            .push((dispatcher, waiter_id));
        Ok(())
    }

    /// Removes a cancellable-wait registration once it resolved on its
    /// own, so a later `close` doesn't redundantly call `cancel_waiter`
    /// on an id the dispatcher has already forgotten.
    pub fn unregister_cancellable(&self, handle: Handle, waiter_id: u64) {
        let Ok(index) = Self::index_of(handle) else {
            return;
        };
        let mut inner = self.inner.lock().unwrap();
        if let Some(list) = inner.cancel_registry.get_mut(&index) {
            list.retain(|(_, id)| *id != waiter_id);
            if list.is_empty() {
                inner.cancel_registry.remove(&index);
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().unwrap().live_count
    }
}
