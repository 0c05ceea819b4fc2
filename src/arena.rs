//! Slot arena backing every engine object.
//!
//! Objects live in a slab: freed slots go on a free list and are reused by
//! later allocations, and storage is never returned to the operating system.
//! A parallel generation counter is bumped on every free, so a handle held
//! past its object's destruction (a pending-reaction entry, a subscription
//! edge) is detected as stale instead of dangling - lookups through it
//! return `None`.
//!
//! Exhaustion is fatal. The engine is a long-running interpreter; limping on
//! after a failed allocation risks silent corruption of the reactive graph,
//! so the arena logs and aborts rather than report an error nobody can
//! meaningfully handle.

use slab::Slab;

use crate::object::Obj;

/// Hard ceiling on live slots. Reaching it indicates a runaway graph, not a
/// workload the engine is expected to carry.
const SLOT_CEILING: usize = 1 << 24;

/// Stable handle to an arena slot.
///
/// The index addresses the slot; the generation identifies which occupancy
/// of the slot this handle refers to. A handle whose generation no longer
/// matches the slot's is stale and resolves to `None`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct CellId {
    index: u32,
    generation: u32,
}

impl CellId {
    /// Build a handle from raw parts.
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index, for slab addressing.
    pub(crate) fn index(self) -> usize {
        self.index as usize
    }
}

/// The object arena: slab slots plus per-slot generations.
pub(crate) struct Arena {
    slots: Slab<Obj>,
    generations: Vec<u32>,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            slots: Slab::new(),
            generations: Vec::new(),
        }
    }

    /// Allocate a slot. The constructor closure receives the handle the new
    /// object will live under, so self-referential values (a constant's
    /// value is itself) can be built in place.
    pub fn insert(&mut self, build: impl FnOnce(CellId) -> Obj) -> CellId {
        if self.slots.len() >= SLOT_CEILING {
            tracing::error!(ceiling = SLOT_CEILING, "object arena exhausted; terminating");
            std::process::abort();
        }
        let entry = self.slots.vacant_entry();
        let index = entry.key();
        if index >= self.generations.len() {
            self.generations.resize(index + 1, 0);
        }
        let id = CellId::new(index as u32, self.generations[index]);
        entry.insert(build(id));
        id
    }

    /// Free a slot, bumping its generation so outstanding handles go stale.
    pub fn remove(&mut self, id: CellId) -> Option<Obj> {
        self.get(id)?;
        self.generations[id.index()] = self.generations[id.index()].wrapping_add(1);
        Some(self.slots.remove(id.index()))
    }

    pub fn get(&self, id: CellId) -> Option<&Obj> {
        if self.generations.get(id.index()).copied() != Some(id.generation) {
            return None;
        }
        self.slots.get(id.index())
    }

    pub fn get_mut(&mut self, id: CellId) -> Option<&mut Obj> {
        if self.generations.get(id.index()).copied() != Some(id.generation) {
            return None;
        }
        self.slots.get_mut(id.index())
    }

    /// Whether the handle still refers to a live object.
    pub fn contains(&self, id: CellId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
