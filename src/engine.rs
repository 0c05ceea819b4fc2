//! The engine context and the publish/schedule/react machinery.
//!
//! All mutable state - the object arena, the type registry, the intern
//! tables, the pending-level index - is owned by one `Engine` value, so
//! independent engines can coexist in a process and tests never share state.
//!
//! Reaction is a single ascending sweep over pending levels. Because every
//! cell sits strictly above its non-constant operands, a cell is evaluated
//! only after everything it reads has settled in the same sweep; publication
//! from a re-evaluated cell can only land at higher levels, which the sweep
//! has not reached yet. One pass, no revisiting.

use std::collections::BTreeSet;

use crate::arena::{Arena, CellId};
use crate::object::{CellData, Interns};
use crate::show::ShowOptions;
use crate::types::{Attr, Kind, TypeId, TypeInfo, TypeRegistry};
use crate::value::Value;

/// Handles of the built-in types, resolved once at engine construction.
pub(crate) struct BuiltinTypes {
    pub real: TypeId,
    pub string: TypeId,
    pub term: TypeId,
    pub conditional: TypeId,
    pub synapse: TypeId,
}

/// Running counters for introspection and tests. Defects are logged and
/// counted, never raised - evaluation always produces a value.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    /// Reactive evaluations performed.
    pub evals: u64,
    /// Value changes published to subscribers.
    pub publishes: u64,
    /// Reaction sweeps run.
    pub reactions: u64,
    /// Logic defects logged (circular expressions, unmatched disables,
    /// unimplemented dispatch slots).
    pub defects: u64,
}

/// An incremental rule-evaluation engine: the cell graph, its allocator and
/// registries, and the reaction scheduler.
pub struct Engine {
    pub(crate) arena: Arena,
    pub(crate) types: TypeRegistry,
    pub(crate) interns: Interns,
    pub(crate) builtin: BuiltinTypes,
    /// Pending cells awaiting re-evaluation, one ordered set per level.
    pending: Vec<BTreeSet<CellId>>,
    /// Highest level holding pending work since the last sweep.
    pending_top: usize,
    /// Display annotation switches.
    pub show: ShowOptions,
    stats: Stats,
}

impl Engine {
    /// Build an engine with the built-in types registered: the permanent
    /// sentinel pseudo-types, the constant families, and the cell kinds.
    pub fn new() -> Self {
        let mut types = TypeRegistry::new();
        let permanent = Kind::CONSTANT | Kind::PERMANENT;
        types.register("disabled", permanent, Attr::SPECIAL, false);
        types.register("true", Kind::TRUE | Kind::REAL | permanent, Attr::SPECIAL, false);
        types.register("false", Kind::FALSE | Kind::REAL | permanent, Attr::SPECIAL, false);
        types.register("unknown", Kind::UNKNOWN | permanent, Attr::SPECIAL, false);
        types.register("undefined", permanent, Attr::SPECIAL, false);
        types.register("placeholder", permanent, Attr::SPECIAL, false);
        let builtin = BuiltinTypes {
            real: types.register("real", Kind::REAL | Kind::CONSTANT, Attr::NONE, false),
            string: types.register("string", Kind::STRING | Kind::CONSTANT, Attr::NONE, false),
            // Terms keep a static binding across their last disable.
            term: types.register("term", Kind::CELL, Attr::NONE, true),
            conditional: types.register("conditional", Kind::CELL, Attr::NONE, false),
            synapse: types.register("synapse", Kind::NONE, Attr::NONE, false),
        };
        Self {
            arena: Arena::new(),
            types,
            interns: Interns::new(),
            builtin,
            pending: Vec::new(),
            pending_top: 0,
            show: ShowOptions::default(),
            stats: Stats::default(),
        }
    }

    /// The running counters.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Type handle of an object, `None` for a stale handle.
    pub(crate) fn type_of(&self, id: CellId) -> Option<TypeId> {
        self.arena.get(id).map(|o| o.type_id)
    }

    /// Type name of an object, `"?"` for a stale handle.
    pub fn type_name(&self, id: CellId) -> &str {
        match self.arena.get(id) {
            Some(obj) => self.types.get(obj.type_id).name,
            None => "?",
        }
    }

    /// Type metadata of an object - the kind and attribute masks higher
    /// layers dispatch on.
    pub fn type_info(&self, id: CellId) -> Option<&TypeInfo> {
        self.arena.get(id).map(|o| self.types.get(o.type_id))
    }

    /// Look a registered type up by name.
    pub fn lookup_type(&self, name: &str) -> Option<&TypeInfo> {
        self.types.by_name(name).map(|(_, info)| info)
    }

    /// Log a logic defect and count it. Defects degrade, they never halt:
    /// the only fatal path in the engine is allocator exhaustion.
    pub(crate) fn defect(&mut self, message: std::fmt::Arguments<'_>) {
        tracing::warn!(target: "axon", "{message}");
        self.stats.defects += 1;
    }

    /// Notify every subscriber of `cell` that its value changed. Constants
    /// never publish. Synapse subscribers run their handler immediately;
    /// every other subscriber is scheduled for the next reaction sweep.
    pub fn publish(&mut self, cell: CellId) {
        if self.is_static(cell) {
            return;
        }
        let subs: Vec<CellId> = match self.arena.get(cell) {
            Some(obj) => obj.subscribers.keys().copied().collect(),
            None => return,
        };
        self.stats.publishes += 1;
        for sub in subs {
            self.alert(sub);
        }
    }

    /// React to a change beneath `cell`. This is also the entry point for
    /// external producers (the clock/timer collaborator): alerting a cell is
    /// treated exactly like a value-change publication reaching it.
    pub fn alert(&mut self, cell: CellId) {
        let fires = matches!(
            self.arena.get(cell).map(|o| &o.data),
            Some(CellData::Synapse(_))
        );
        if fires {
            self.fire_synapse(cell);
        } else {
            self.schedule_for_reaction(cell);
        }
    }

    /// Queue a cell for re-evaluation at its level. Scheduling is
    /// idempotent: a cell already pending at that level stays queued once.
    pub fn schedule_for_reaction(&mut self, cell: CellId) {
        let level = self.level_of(cell) as usize;
        if self.pending.len() <= level {
            self.pending.resize_with(level + 1, BTreeSet::new);
        }
        if self.pending[level].insert(cell) {
            tracing::trace!(target: "axon", ?cell, level, "scheduled");
            if level > self.pending_top {
                self.pending_top = level;
            }
        } else {
            cov_mark::hit!(idempotent_schedule);
        }
    }

    /// Drain pending levels in ascending order, re-evaluating each pending
    /// cell once and republishing where the value changed. Returns the
    /// number of cells evaluated.
    ///
    /// Entries whose cell was destroyed (stale handle) or disabled while
    /// queued are discarded - safe-drain is what the generation counter on
    /// handles buys. Work a cycle re-queues at an already-drained level
    /// waits for the next sweep.
    pub fn react(&mut self) -> usize {
        self.stats.reactions += 1;
        let mut evaluated = 0;
        let mut level = 0;
        while level <= self.pending_top {
            loop {
                let next = self.pending.get_mut(level).and_then(BTreeSet::pop_first);
                let Some(cell) = next else { break };
                if !self.arena.contains(cell) {
                    cov_mark::hit!(stale_pending_skipped);
                    continue;
                }
                if !self.is_enabled(cell) {
                    cov_mark::hit!(disabled_pending_skipped);
                    continue;
                }
                self.evaluate(cell);
                evaluated += 1;
            }
            level += 1;
        }
        // Anything left is below the sweep line (cycle fallout); keep the
        // marker honest for the next invocation.
        self.pending_top = self
            .pending
            .iter()
            .rposition(|set| !set.is_empty())
            .unwrap_or(0);
        evaluated
    }

    /// Re-evaluate one enabled cell now: compare the candidate against the
    /// stored value by identity, and on change store the grabbed candidate,
    /// release the old value, and publish. Returns the (possibly new)
    /// stored value.
    pub fn evaluate(&mut self, cell: CellId) -> Value {
        if self.is_static(cell) {
            return self.value_of(cell);
        }
        if !self.is_enabled(cell) {
            return Value::Disabled;
        }
        self.stats.evals += 1;
        let candidate = self.eval_cell(cell);
        let current = self.value_of(cell);
        if candidate != current {
            let candidate = self.grab(candidate);
            if let Some(obj) = self.arena.get_mut(cell) {
                obj.value = candidate;
            }
            self.release(current);
            self.publish(cell);
        }
        self.value_of(cell)
    }

    /// Whether any level currently holds pending work.
    pub fn has_pending(&self) -> bool {
        self.pending.iter().any(|set| !set.is_empty())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_is_idempotent() {
        cov_mark::check!(idempotent_schedule);
        let mut engine = Engine::new();
        let five = engine.real(5.0);
        let t = engine.term("input");
        engine.assert(t, Value::Object(five));
        engine.enable(t, None);

        engine.schedule_for_reaction(t);
        engine.schedule_for_reaction(t);

        let before = engine.stats().evals;
        engine.react();
        assert_eq!(engine.stats().evals, before + 1);
        assert!(!engine.has_pending());
    }

    #[test]
    fn stale_pending_entries_drain_safely() {
        cov_mark::check!(stale_pending_skipped);
        let mut engine = Engine::new();
        let t = engine.term("doomed");
        engine.assert(t, Value::Unknown);
        engine.enable(t, None);
        engine.schedule_for_reaction(t);

        // Destroy the cell while it is still queued.
        engine.grab(Value::Object(t));
        engine.release(Value::Object(t));
        assert!(engine.refcount(t).is_none());

        let evaluated = engine.react();
        assert_eq!(evaluated, 0);
    }

    #[test]
    fn disabled_pending_entries_drain_safely() {
        cov_mark::check!(disabled_pending_skipped);
        let mut engine = Engine::new();
        let c = engine.term("cond");
        engine.assert(c, Value::False);
        let five = engine.real(5.0);
        let seven = engine.real(7.0);
        let cond = engine.conditional(c, five, seven, seven);
        engine.enable(cond, None);
        engine.schedule_for_reaction(cond);
        engine.disable(cond, None);

        let evaluated = engine.react();
        assert_eq!(evaluated, 0);
    }

    #[test]
    fn engines_are_independent() {
        let mut a = Engine::new();
        let mut b = Engine::new();
        let ra = a.real(1.0);
        let rb = b.real(2.0);
        assert_eq!(a.real_value(Value::Object(ra)), Some(1.0));
        assert_eq!(b.real_value(Value::Object(rb)), Some(2.0));
        assert_eq!(a.live_objects(), 1);
        assert_eq!(b.live_objects(), 1);
    }
}
