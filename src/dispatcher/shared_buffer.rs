//! Refcounted shared memory regions.
//!
//! A shared buffer has no dynamic signal state at all — its
//! `(satisfied, satisfiable)` pair is always empty — so unlike every
//! other dispatcher variant there is no waiter registry here, only the
//! region bytes and a table of live mappings, guarded by one
//! `Arc<Mutex<...>>`-wrapped region shared by every duplicate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{MojoError, MojoResult};
use crate::rights::Rights;
use crate::signals::SignalsState;
use crate::waiter::WaiterEntry;

use super::next_dispatcher_id;

static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque mapping identifier. A real mmap hands back a pointer; this
/// in-process kernel has no address space to map into, so `MapBuffer`
/// hands back an id a caller exchanges for a byte-slice view via
/// [`SharedBuffer::read_mapped`]/[`SharedBuffer::write_mapped`] instead
/// (documented deviation, see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(u64);

impl MapId {
    /// The bits an ABI caller stores and hands back to `UnmapBuffer`.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Reconstructs a `MapId` from bits an ABI caller previously received
    /// from `MapBuffer`. Does not validate that the id is still live —
    /// `unmap`/`read_mapped`/`write_mapped` reject a dead or unknown one.
    #[inline]
    pub fn from_raw(bits: u64) -> MapId {
        MapId(bits)
    }
}

#[derive(Debug)]
struct Mapping {
    offset: usize,
    len: usize,
}

#[derive(Debug)]
struct Region {
    bytes: Mutex<Vec<u8>>,
    mappings: Mutex<HashMap<MapId, Mapping>>,
}

/// A handle to a refcounted memory region.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    region: Arc<Region>,
    dispatcher_id: u64,
}

impl SharedBuffer {
    /// `CreateSharedBuffer(num_bytes)`: `num_bytes` has already been
    /// rounded up to a page multiple by the caller.
    pub fn new(num_bytes: usize) -> SharedBuffer {
        SharedBuffer {
            region: Arc::new(Region {
                bytes: Mutex::new(vec![0u8; num_bytes]),
                mappings: Mutex::new(HashMap::new()),
            }),
            dispatcher_id: next_dispatcher_id(),
        }
    }

    pub(crate) fn dispatcher_id(&self) -> u64 {
        self.dispatcher_id
    }

    /// Always empty: a shared buffer carries no signals.
    pub(crate) fn signals_state(&self) -> SignalsState {
        SignalsState::default()
    }

    pub(crate) fn register_waiter(&self, entry: WaiterEntry) -> Option<u64> {
        entry.outcome.notify(
            entry.index,
            crate::waiter::WaitCode::FailedPrecondition,
            SignalsState::default(),
        );
        None
    }

    pub(crate) fn cancel_waiter(&self, _id: u64) {}

    pub fn size_bytes(&self) -> usize {
        self.region.bytes.lock().unwrap().len()
    }

    /// `DuplicateBufferHandle`: a new handle over the same region. Rights
    /// narrowing happens at the handle-table layer; this just hands back
    /// another reference to the same backing memory.
    pub fn duplicate(&self) -> SharedBuffer {
        SharedBuffer {
            region: self.region.clone(),
            dispatcher_id: next_dispatcher_id(),
        }
    }

    /// `MapBuffer(h, offset, num_bytes, flags)`. Returns an
    /// opaque [`MapId`] standing in for the pointer a real mmap would
    /// return.
    pub fn map(&self, offset: usize, num_bytes: usize) -> MojoResult<MapId> {
        let len = self.region.bytes.lock().unwrap().len();
        if offset.checked_add(num_bytes).map_or(true, |end| end > len) {
            return Err(MojoError::OutOfRange);
        }
        let id = MapId(NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed));
        self.region
            .mappings
            .lock()
            .unwrap()
            .insert(id, Mapping { offset, len: num_bytes });
        Ok(id)
    }

    /// `UnmapBuffer(ptr)`: releases a mapping's reference to the region.
    pub fn unmap(&self, id: MapId) -> MojoResult<()> {
        match self.region.mappings.lock().unwrap().remove(&id) {
            Some(_) => Ok(()),
            None => Err(MojoError::InvalidArgument),
        }
    }

    /// Copies `src` into the span covered by a still-live mapping.
    pub fn write_mapped(&self, id: MapId, src: &[u8]) -> MojoResult<()> {
        let mappings = self.region.mappings.lock().unwrap();
        let mapping = mappings.get(&id).ok_or(MojoError::InvalidArgument)?;
        if src.len() > mapping.len {
            return Err(MojoError::OutOfRange);
        }
        let mut bytes = self.region.bytes.lock().unwrap();
        bytes[mapping.offset..mapping.offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Copies out of the span covered by a still-live mapping.
    pub fn read_mapped(&self, id: MapId, dst: &mut [u8]) -> MojoResult<()> {
        let mappings = self.region.mappings.lock().unwrap();
        let mapping = mappings.get(&id).ok_or(MojoError::InvalidArgument)?;
        if dst.len() > mapping.len {
            return Err(MojoError::OutOfRange);
        }
        let bytes = self.region.bytes.lock().unwrap();
        dst.copy_from_slice(&bytes[mapping.offset..mapping.offset + dst.len()]);
        Ok(())
    }
}

/// `MapBuffer` requires `READ`, and `WRITE` as well for a writable
/// mapping; the rights check itself happens in `core.rs` where the
/// handle's rights live, not here.
pub const MAP_REQUIRES_WRITE_FOR_WRITABLE: Rights = Rights::WRITE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_region_is_zeroed_and_right_sized() {
        let buf = SharedBuffer::new(4096);
        assert_eq!(buf.size_bytes(), 4096);
    }

    #[test]
    fn duplicate_shares_the_same_backing_bytes() {
        let buf = SharedBuffer::new(16);
        let dup = buf.duplicate();
        let id = buf.map(0, 16).unwrap();
        buf.write_mapped(id, &[1, 2, 3, 4]).unwrap();

        let dup_id = dup.map(0, 16).unwrap();
        let mut out = [0u8; 4];
        dup.read_mapped(dup_id, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn map_out_of_range_is_rejected() {
        let buf = SharedBuffer::new(16);
        assert_eq!(buf.map(10, 10).unwrap_err(), MojoError::OutOfRange);
    }

    #[test]
    fn unmap_then_reuse_of_same_id_fails() {
        let buf = SharedBuffer::new(16);
        let id = buf.map(0, 8).unwrap();
        buf.unmap(id).unwrap();
        assert_eq!(buf.unmap(id).unwrap_err(), MojoError::InvalidArgument);
    }

    #[test]
    fn multiple_simultaneous_mappings_are_independent() {
        let buf = SharedBuffer::new(16);
        let a = buf.map(0, 8).unwrap();
        let b = buf.map(8, 8).unwrap();
        buf.write_mapped(a, &[9; 8]).unwrap();
        buf.write_mapped(b, &[5; 8]).unwrap();
        let mut out_a = [0u8; 8];
        let mut out_b = [0u8; 8];
        buf.read_mapped(a, &mut out_a).unwrap();
        buf.read_mapped(b, &mut out_b).unwrap();
        assert_eq!(out_a, [9; 8]);
        assert_eq!(out_b, [5; 8]);
    }
}
