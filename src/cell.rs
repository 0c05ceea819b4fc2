//! The subscription graph: enable/disable, level assignment, compute, solve.
//!
//! A cell is in exactly one of two states. Disabled: its value is the
//! `Disabled` sentinel and it holds no subscriptions on its operands.
//! Enabled: it is subscribed to its operands and its value is kept current
//! by the reaction engine. The transition is driven purely by the cell's own
//! subscription set - the first subscriber enables it (recursively enabling
//! operands), the last disable tears it back down.
//!
//! Levels make single-pass reaction possible: every cell sits strictly above
//! its non-constant operands, so draining pending work in ascending level
//! order evaluates each cell only after its inputs have settled.

use crate::arena::CellId;
use crate::engine::Engine;
use crate::object::CellData;
use crate::value::Value;

/// What a kind-dispatched operation needs, copied out of the arena so the
/// borrow is released before the operation recurses into the engine.
enum Dispatch {
    Static,
    Term(Option<Value>),
    Cond(crate::conditional::Conditional),
    /// The kind leaves this slot unimplemented; carries the current value
    /// as the best-effort result.
    Bug(Value),
}

impl Engine {
    fn dispatch(&self, id: CellId) -> Option<Dispatch> {
        let obj = self.arena.get(id)?;
        Some(match &obj.data {
            CellData::Real(_) | CellData::Text(_) => Dispatch::Static,
            CellData::Term(t) => Dispatch::Term(t.def),
            CellData::Conditional(c) => Dispatch::Cond(*c),
            CellData::Synapse(_) => Dispatch::Bug(obj.value),
        })
    }

    /// Subscribe `subscriber` to `publisher` and make sure the publisher is
    /// live. No-op on constants - they never change, so there is nothing to
    /// subscribe to. Passing no subscriber enables the publisher without
    /// registering an observer (the `compute` path).
    ///
    /// Subscribing the same cell twice is legitimate when an expression uses
    /// one operand in two positions; the multiplicity is tracked and must be
    /// matched by an equal number of disables.
    pub fn enable(&mut self, publisher: CellId, subscriber: Option<CellId>) {
        if self.is_static(publisher) {
            return;
        }
        if !self.arena.contains(publisher) {
            self.defect(format_args!("enable of stale handle {publisher:?}"));
            return;
        }
        if let Some(sub) = subscriber {
            if let Some(obj) = self.arena.get_mut(publisher) {
                *obj.subscribers.entry(sub).or_insert(0) += 1;
            }
        }
        if !self.is_enabled(publisher) {
            self.enable_operands(publisher);
            let v = self.eval_cell(publisher);
            let v = self.grab(v);
            if let Some(obj) = self.arena.get_mut(publisher) {
                obj.value = v;
            }
        }
        if let Some(sub) = subscriber {
            let floor = self.level_of(publisher);
            if self.level_of(sub) <= floor {
                if let Some(obj) = self.arena.get_mut(sub) {
                    obj.level = floor + 1;
                }
                self.raise_downstream(sub, sub);
            }
        }
    }

    /// Remove `subscriber` from `publisher`'s subscription set; when the set
    /// empties, cascade the disable down to the publisher's own operands and
    /// reset its value to `Disabled`. No-op on constants and on cells that
    /// are already disabled.
    pub fn disable(&mut self, publisher: CellId, subscriber: Option<CellId>) {
        if self.is_static(publisher) || !self.is_enabled(publisher) {
            return;
        }
        if let Some(sub) = subscriber {
            let mut unmatched = false;
            if let Some(obj) = self.arena.get_mut(publisher) {
                match obj.subscribers.get_mut(&sub) {
                    Some(count) if *count > 1 => *count -= 1,
                    Some(_) => {
                        obj.subscribers.remove(&sub);
                    }
                    None => unmatched = true,
                }
            }
            if unmatched {
                cov_mark::hit!(unmatched_disable);
                self.defect(format_args!(
                    "disable of {sub:?} which is not subscribed to {publisher:?}"
                ));
            }
        }
        let occupied = self
            .arena
            .get(publisher)
            .map(|o| !o.subscribers.is_empty())
            .unwrap_or(true);
        if occupied {
            return;
        }
        // One kind keeps its value once bound to a static definition; the
        // flag is explicit on the type rather than inferred.
        let sticky = self
            .type_of(publisher)
            .map(|t| self.types.get(t).sticky)
            .unwrap_or(false);
        if sticky && self.bound_static(publisher) {
            cov_mark::hit!(sticky_binding_retained);
            return;
        }
        self.shut_down(publisher);
    }

    /// Forced teardown: unsubscribe from operands and reset the value to
    /// `Disabled`, regardless of the sticky exception. Used by the last
    /// disable and by object destruction.
    pub(crate) fn shut_down(&mut self, id: CellId) {
        if self.is_static(id) || !self.is_enabled(id) {
            return;
        }
        self.disable_operands(id);
        let old = match self.arena.get_mut(id) {
            Some(obj) => std::mem::replace(&mut obj.value, Value::Disabled),
            None => return,
        };
        self.release(old);
    }

    /// Read a cell's value without leaving it subscribed: enable, grab the
    /// result, disable, return. The caller owns one reference on the result
    /// and must release it.
    pub fn compute(&mut self, cell: CellId) -> Value {
        self.enable(cell, None);
        let v = self.value_of(cell);
        let v = self.grab(v);
        self.disable(cell, None);
        v
    }

    /// On-demand value derivation without subscribing: recursively solves
    /// only the operands actually needed (a conditional solves just the
    /// branch its condition selects). Enabled cells answer from their
    /// maintained value.
    pub fn solve(&mut self, cell: CellId) -> Value {
        if self.is_enabled(cell) {
            // Covers constants (their value is themselves) and live cells.
            return self.value_of(cell);
        }
        match self.dispatch(cell) {
            Some(Dispatch::Static) | None => self.value_of(cell),
            Some(Dispatch::Term(def)) => match def {
                None => Value::Unknown,
                Some(Value::Object(c)) => self.solve(c),
                Some(v) => v,
            },
            Some(Dispatch::Cond(c)) => {
                let chosen = self.solve(c.condition);
                let branch = c.select(chosen);
                self.solve(branch)
            }
            Some(Dispatch::Bug(v)) => {
                cov_mark::hit!(bug_default_dispatch);
                let name = self.type_name(cell).to_owned();
                self.defect(format_args!("{name}: no solve method"));
                v
            }
        }
    }

    /// One reactive evaluation of a cell, from its operands' current values.
    pub(crate) fn eval_cell(&mut self, id: CellId) -> Value {
        match self.dispatch(id) {
            None => Value::Unknown,
            Some(Dispatch::Static) => Value::Object(id),
            Some(Dispatch::Term(def)) => match def {
                None => Value::Unknown,
                Some(Value::Object(c)) => self.value_of(c),
                Some(v) => v,
            },
            Some(Dispatch::Cond(c)) => {
                let branch = c.select(self.value_of(c.condition));
                self.value_of(branch)
            }
            Some(Dispatch::Bug(v)) => {
                cov_mark::hit!(bug_default_dispatch);
                let name = self.type_name(id).to_owned();
                self.defect(format_args!("{name}: no eval method"));
                v
            }
        }
    }

    /// Kind-specific enable cascade: subscribe the cell to each operand.
    pub(crate) fn enable_operands(&mut self, id: CellId) {
        match self.dispatch(id) {
            None | Some(Dispatch::Static) => {}
            Some(Dispatch::Term(def)) => {
                if let Some(Value::Object(c)) = def {
                    self.enable(c, Some(id));
                }
            }
            Some(Dispatch::Cond(c)) => {
                for operand in c.operands() {
                    self.enable(operand, Some(id));
                }
            }
            Some(Dispatch::Bug(_)) => {
                cov_mark::hit!(bug_default_dispatch);
                let name = self.type_name(id).to_owned();
                self.defect(format_args!("{name}: no enable method"));
            }
        }
    }

    /// Kind-specific disable cascade: unsubscribe from each operand.
    pub(crate) fn disable_operands(&mut self, id: CellId) {
        match self.dispatch(id) {
            None | Some(Dispatch::Static) => {}
            Some(Dispatch::Term(def)) => {
                if let Some(Value::Object(c)) = def {
                    self.disable(c, Some(id));
                }
            }
            Some(Dispatch::Cond(c)) => {
                for operand in c.operands() {
                    self.disable(operand, Some(id));
                }
            }
            Some(Dispatch::Bug(_)) => {
                cov_mark::hit!(bug_default_dispatch);
                let name = self.type_name(id).to_owned();
                self.defect(format_args!("{name}: no disable method"));
            }
        }
    }

    /// Raise every subscriber downstream of `cell` that no longer sits
    /// strictly above it. If the walk arrives back at the cell it started
    /// from, the expression is circular: log the defect and pin the start's
    /// level at zero instead of recursing forever.
    fn raise_downstream(&mut self, start: CellId, cell: CellId) {
        let floor = self.level_of(cell);
        let subs: Vec<CellId> = match self.arena.get(cell) {
            Some(obj) => obj.subscribers.keys().copied().collect(),
            None => return,
        };
        for sub in subs {
            if self.level_of(sub) > floor {
                continue;
            }
            if sub == start {
                cov_mark::hit!(circular_expression_pinned);
                self.defect(format_args!("circular expression at {start:?}; level pinned"));
                if let Some(obj) = self.arena.get_mut(start) {
                    obj.level = 0;
                }
                continue;
            }
            if let Some(obj) = self.arena.get_mut(sub) {
                obj.level = floor + 1;
            } else {
                continue;
            }
            self.raise_downstream(start, sub);
        }
    }

    /// Test seam: splice a raw subscription edge without the enable
    /// protocol, to assemble graphs (including cycles) by hand.
    #[cfg(test)]
    pub(crate) fn subscribe_raw(&mut self, publisher: CellId, subscriber: CellId) {
        if let Some(obj) = self.arena.get_mut(publisher) {
            *obj.subscribers.entry(subscriber).or_insert(0) += 1;
        }
    }

    /// Number of distinct subscribers currently on a cell.
    pub fn subscriber_count(&self, id: CellId) -> usize {
        self.arena.get(id).map(|o| o.subscribers.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_disable_round_trip_restores_disabled() {
        let mut engine = Engine::new();
        let five = engine.real(5.0);
        let t = engine.term("input");
        engine.assert(t, Value::Object(five));

        assert!(!engine.is_enabled(t));
        engine.enable(t, None);
        assert!(engine.is_enabled(t));
        assert_eq!(engine.value_of(t), Value::Object(five));

        // Terms are the sticky kind: bound to a static value they survive
        // the disable. Force the teardown to check the plain path.
        engine.disable(t, None);
        assert!(engine.is_enabled(t));
        engine.shut_down(t);
        assert!(!engine.is_enabled(t));
        assert_eq!(engine.subscriber_count(t), 0);
    }

    #[test]
    fn constants_ignore_the_subscription_protocol() {
        let mut engine = Engine::new();
        let five = engine.real(5.0);
        let t = engine.term("watcher");
        engine.enable(five, Some(t));
        assert_eq!(engine.subscriber_count(five), 0);
        engine.disable(five, Some(t));
        assert_eq!(engine.stats().defects, 0);
    }

    #[test]
    fn unmatched_disable_is_a_logged_defect() {
        cov_mark::check!(unmatched_disable);
        let mut engine = Engine::new();
        let t = engine.term("a");
        let other = engine.term("b");
        engine.enable(t, None);
        engine.disable(t, Some(other));
        assert_eq!(engine.stats().defects, 1);
    }

    #[test]
    fn circular_expression_pins_level() {
        cov_mark::check!(circular_expression_pinned);
        let mut engine = Engine::new();
        let a = engine.term("a");
        let b = engine.term("b");
        // Hand-assembled cycle, bypassing normal construction.
        engine.subscribe_raw(a, b);
        engine.subscribe_raw(b, a);

        engine.enable(a, Some(b));
        assert_eq!(engine.level_of(b), 0);
        assert!(engine.stats().defects >= 1);
    }

    #[test]
    fn solve_derives_without_enabling() {
        let mut engine = Engine::new();
        let five = engine.real(5.0);
        let seven = engine.real(7.0);
        let c = engine.term("cond");
        engine.assert(c, Value::True);
        let t = engine.term("then");
        engine.assert(t, Value::Object(five));
        let f = engine.term("else");
        engine.assert(f, Value::Object(seven));
        let cond = engine.conditional(c, t, f, f);

        let v = engine.solve(cond);
        assert_eq!(v, Value::Object(five));
        // Nothing got subscribed along the way.
        assert!(!engine.is_enabled(cond));
        assert!(!engine.is_enabled(c));
        assert_eq!(engine.subscriber_count(c), 0);
    }

    #[test]
    fn compute_leaves_cell_disabled_and_hands_out_a_reference() {
        let mut engine = Engine::new();
        let five = engine.real(5.0);
        let t = engine.term("transient");
        engine.assert(t, Value::Object(five));
        // A term bound to a constant is sticky; use an unbound-then-rebound
        // chain through a conditional to exercise the plain path.
        let c = engine.term("cond");
        engine.assert(c, Value::False);
        let seven = engine.real(7.0);
        let f = engine.term("fallback");
        engine.assert(f, Value::Object(seven));
        let cond = engine.conditional(c, t, f, f);

        let before = engine.refcount(seven).unwrap();
        let v = engine.compute(cond);
        assert_eq!(v, Value::Object(seven));
        assert!(!engine.is_enabled(cond));
        // Two new references: the caller's, and the fallback term's - it is
        // sticky and kept its static binding through the disable cascade.
        assert_eq!(engine.refcount(seven), Some(before + 2));
        engine.release(v);
        assert_eq!(engine.refcount(seven), Some(before + 1));
    }
}
