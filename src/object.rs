//! Object lifecycle: allocation, reference counting, destruction, interning.
//!
//! Every object is created with a refcount of zero, grabbed (+1) by each
//! holder and released (-1) by each; the release that finds the count at
//! zero destroys the object. Destruction releases everything the object
//! grabbed (its held value, its operands), detaches it from the non-owning
//! indexes that point at it (intern tables, operand subscription trees), and
//! frees the slot.
//!
//! Interning matters for correctness, not just memory: subscription and
//! level state live per instance, so two structurally identical cells must
//! collapse to one shared instance for publication to reach every dependent.

use std::collections::{BTreeMap, HashMap};

use crate::arena::CellId;
use crate::conditional::Conditional;
use crate::engine::Engine;
use crate::hash::InternHashBuilder;
use crate::synapse::Synapse;
use crate::term::Term;
use crate::types::{Kind, TypeId};
use crate::value::Value;

/// An arena object: type metadata handle, current value, reference count,
/// and the cell extension (level, subscribers) shared by every kind.
///
/// Simple constants carry the extension too, permanently empty; treating
/// "object" as a degenerate cell keeps every operation total over one slot
/// layout, the same trick the original value-points-to-self convention
/// plays.
pub(crate) struct Obj {
    pub type_id: TypeId,
    /// Current value. `Object(self)` marks a static (constant) object;
    /// `Disabled` marks a cell not currently maintaining its value.
    pub value: Value,
    pub refcnt: u32,
    /// Topological height: 0 for leaves, otherwise strictly above every
    /// non-constant operand.
    pub level: u32,
    /// Direct subscribers, keyed by identity, with a multiplicity count so
    /// an operand used twice (`a+a`) subscribes twice and must disable
    /// twice.
    pub subscribers: BTreeMap<CellId, u32>,
    pub data: CellData,
}

impl Obj {
    /// A static object: its value is itself.
    pub fn constant(type_id: TypeId, value: Value, data: CellData) -> Obj {
        Obj {
            type_id,
            value,
            refcnt: 0,
            level: 0,
            subscribers: BTreeMap::new(),
            data,
        }
    }

    /// A reactive cell: starts disabled.
    pub fn cell(type_id: TypeId, data: CellData) -> Obj {
        Obj {
            type_id,
            value: Value::Disabled,
            refcnt: 0,
            level: 0,
            subscribers: BTreeMap::new(),
            data,
        }
    }
}

/// Closed set of object payloads. Behavior dispatches by match; kinds that
/// leave an operation unimplemented fall through to defaults that log a
/// defect instead of crashing through a null slot.
pub(crate) enum CellData {
    /// Interned numeric constant.
    Real(f64),
    /// Interned string constant.
    Text(Box<str>),
    /// Named input cell with an assertable definition.
    Term(Term),
    /// Ternary conditional over four operands.
    Conditional(Conditional),
    /// Single-cell observer firing a callback on alert.
    Synapse(Synapse),
}

/// Locate-or-insert tables, one per internable kind, each keyed by that
/// kind's notion of structural equality.
pub(crate) struct Interns {
    pub reals: HashMap<u64, CellId, InternHashBuilder>,
    pub texts: HashMap<Box<str>, CellId, InternHashBuilder>,
    pub terms: HashMap<Box<str>, CellId, InternHashBuilder>,
    pub conditionals: HashMap<[CellId; 4], CellId, InternHashBuilder>,
}

impl Interns {
    pub fn new() -> Self {
        Self {
            reals: HashMap::with_hasher(InternHashBuilder),
            texts: HashMap::with_hasher(InternHashBuilder),
            terms: HashMap::with_hasher(InternHashBuilder),
            conditionals: HashMap::with_hasher(InternHashBuilder),
        }
    }
}

impl Engine {
    /// Allocate a fresh object of the given type. Constants come up static
    /// (value = self); cells come up disabled.
    pub(crate) fn new_object(&mut self, type_id: TypeId, data: CellData) -> CellId {
        let constant = self.types.get(type_id).kind.contains(Kind::CONSTANT);
        self.arena.insert(|id| {
            if constant {
                Obj::constant(type_id, Value::Object(id), data)
            } else {
                Obj::cell(type_id, data)
            }
        })
    }

    /// The interned numeric constant for `n`.
    pub fn real(&mut self, n: f64) -> CellId {
        if let Some(&id) = self.interns.reals.get(&n.to_bits()) {
            return id;
        }
        let id = self.new_object(self.builtin.real, CellData::Real(n));
        self.interns.reals.insert(n.to_bits(), id);
        id
    }

    /// The interned string constant for `s`.
    pub fn text(&mut self, s: &str) -> CellId {
        if let Some(&id) = self.interns.texts.get(s) {
            return id;
        }
        let id = self.new_object(self.builtin.string, CellData::Text(s.into()));
        self.interns.texts.insert(s.into(), id);
        id
    }

    /// Increment the reference count behind an object value. Sentinels pass
    /// through untouched - they are permanent and never counted.
    pub fn grab(&mut self, v: Value) -> Value {
        if let Value::Object(id) = v {
            if !self.arena.contains(id) {
                self.defect(format_args!("grab of stale handle {id:?}"));
                return v;
            }
            if let Some(obj) = self.arena.get_mut(id) {
                obj.refcnt += 1;
            }
        }
        v
    }

    /// Reference-grab through an optional handle. A missing handle is
    /// tolerated and normalized to `Unknown` so callers need not null-check.
    pub fn grab_handle(&mut self, obj: Option<CellId>) -> Value {
        match obj {
            Some(id) => self.grab(Value::Object(id)),
            None => {
                cov_mark::hit!(null_grab_normalized);
                tracing::debug!("grab of empty handle normalized to unknown");
                Value::Unknown
            }
        }
    }

    /// Decrement the reference count behind an object value; destroy the
    /// object when the count reaches zero. Sentinels and stale handles are
    /// no-ops.
    pub fn release(&mut self, v: Value) {
        let Value::Object(id) = v else { return };
        let Some(obj) = self.arena.get_mut(id) else {
            cov_mark::hit!(stale_release_ignored);
            return;
        };
        if obj.refcnt > 0 {
            obj.refcnt -= 1;
        }
        if obj.refcnt == 0 {
            self.destroy(id);
        }
    }

    /// Tear an object down: detach it from everything that references it
    /// without a reservation, release everything it holds, free the slot.
    fn destroy(&mut self, id: CellId) {
        if self.is_enabled(id) {
            // Unsubscribe from operands before the handle goes stale.
            self.shut_down(id);
        }
        let Some(obj) = self.arena.remove(id) else {
            return;
        };
        if obj.value != Value::Object(id) {
            self.release(obj.value);
        }
        match obj.data {
            CellData::Real(n) => {
                self.interns.reals.remove(&n.to_bits());
            }
            CellData::Text(s) => {
                self.interns.texts.remove(&s);
            }
            CellData::Term(t) => {
                self.interns.terms.remove(&t.name);
                if let Some(def) = t.def {
                    self.release(def);
                }
            }
            CellData::Conditional(c) => {
                self.interns.conditionals.remove(&c.key());
                for operand in c.operands() {
                    self.release(Value::Object(operand));
                }
            }
            CellData::Synapse(s) => {
                if let Some(watched) = s.watched {
                    self.release(Value::Object(watched));
                }
            }
        }
    }

    /// Current value of an object; `Unknown` for a stale handle.
    pub fn value_of(&self, id: CellId) -> Value {
        self.arena.get(id).map(|o| o.value).unwrap_or(Value::Unknown)
    }

    /// A static object's value is itself: constants, and nothing else.
    pub fn is_static(&self, id: CellId) -> bool {
        self.arena
            .get(id)
            .map(|o| o.value == Value::Object(id))
            .unwrap_or(false)
    }

    /// Whether a cell is currently maintaining its value. Constants count
    /// as enabled - their value is always current.
    pub fn is_enabled(&self, id: CellId) -> bool {
        self.arena
            .get(id)
            .map(|o| o.value != Value::Disabled)
            .unwrap_or(false)
    }

    /// Topological level; 0 for leaves and stale handles.
    pub fn level_of(&self, id: CellId) -> u32 {
        self.arena.get(id).map(|o| o.level).unwrap_or(0)
    }

    /// Reference count, for introspection. `None` for a stale handle.
    pub fn refcount(&self, id: CellId) -> Option<u32> {
        self.arena.get(id).map(|o| o.refcnt)
    }

    /// Number of live objects in the arena.
    pub fn live_objects(&self) -> usize {
        self.arena.len()
    }

    /// Numeric reading of a value: the boolean sentinels read as 1 and 0
    /// (they are real-kinded), object references read their payload.
    pub fn real_value(&self, v: Value) -> Option<f64> {
        match v {
            Value::True => Some(1.0),
            Value::False => Some(0.0),
            Value::Object(id) => match self.arena.get(id)?.data {
                CellData::Real(n) => Some(n),
                _ => None,
            },
            _ => None,
        }
    }

    /// String reading of a value, for string-kinded objects.
    pub fn text_value(&self, v: Value) -> Option<&str> {
        match v {
            Value::Object(id) => match &self.arena.get(id)?.data {
                CellData::Text(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}
