//! The ternary conditional cell.
//!
//! Four operands: a condition and a substitute for each region of the truth
//! domain. Evaluation routes on the condition's current value - Unknown
//! selects `if_unknown`, False selects `if_false`, anything else selects
//! `if_true` - and yields the selected operand's value. Enable and disable
//! cascade to all four operands; only the selected branch is solved on the
//! on-demand path.

use crate::arena::CellId;
use crate::engine::Engine;
use crate::object::CellData;
use crate::value::Value;

/// Operand record for a conditional cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Conditional {
    pub condition: CellId,
    pub if_true: CellId,
    pub if_false: CellId,
    pub if_unknown: CellId,
}

impl Conditional {
    /// Interning key: conditionals are structurally equal when all four
    /// operands are identical.
    pub fn key(&self) -> [CellId; 4] {
        [self.condition, self.if_true, self.if_false, self.if_unknown]
    }

    /// All operand positions, in display order. Positions may repeat; each
    /// repeat is its own subscription.
    pub fn operands(&self) -> [CellId; 4] {
        self.key()
    }

    /// The operand selected by a condition value.
    pub fn select(&self, condition: Value) -> CellId {
        match condition {
            Value::Unknown => self.if_unknown,
            Value::False => self.if_false,
            _ => self.if_true,
        }
    }
}

impl Engine {
    /// Locate or construct the conditional over the given operands.
    /// Structurally identical conditionals share one instance - level and
    /// subscription state is per instance, so collapsing them is what makes
    /// publication reach every dependent expression.
    ///
    /// The new cell's level starts one above its highest non-constant
    /// operand (at least 1); enable-time propagation keeps it there as the
    /// graph grows.
    pub fn conditional(
        &mut self,
        condition: CellId,
        if_true: CellId,
        if_false: CellId,
        if_unknown: CellId,
    ) -> CellId {
        let cond = Conditional {
            condition,
            if_true,
            if_false,
            if_unknown,
        };
        if let Some(&id) = self.interns.conditionals.get(&cond.key()) {
            cov_mark::hit!(conditional_intern_hit);
            return id;
        }
        for operand in cond.operands() {
            self.grab(Value::Object(operand));
        }
        let id = self.new_object(self.builtin.conditional, CellData::Conditional(cond));
        let mut level = 1;
        for operand in cond.operands() {
            if !self.is_static(operand) {
                level = level.max(self.level_of(operand) + 1);
            }
        }
        if let Some(obj) = self.arena.get_mut(id) {
            obj.level = level;
        }
        self.interns.conditionals.insert(cond.key(), id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_collapses_identical_conditionals() {
        cov_mark::check!(conditional_intern_hit);
        let mut engine = Engine::new();
        let c = engine.term("cond");
        let five = engine.real(5.0);
        let seven = engine.real(7.0);
        let a = engine.conditional(c, five, seven, seven);
        let b = engine.conditional(c, five, seven, seven);
        assert_eq!(a, b);

        let other = engine.conditional(c, seven, five, five);
        assert_ne!(a, other);
    }

    #[test]
    fn truth_table_routes_to_the_right_operand() {
        let mut engine = Engine::new();
        let c = engine.term("cond");
        let five = engine.real(5.0);
        let seven = engine.real(7.0);
        let nine = engine.real(9.0);
        let cond = engine.conditional(c, five, seven, nine);

        engine.assert(c, Value::True);
        engine.enable(cond, None);
        assert_eq!(engine.real_value(engine.value_of(cond)), Some(5.0));

        engine.assert(c, Value::False);
        engine.react();
        assert_eq!(engine.real_value(engine.value_of(cond)), Some(7.0));

        engine.assert(c, Value::Unknown);
        engine.react();
        assert_eq!(engine.real_value(engine.value_of(cond)), Some(9.0));
    }

    #[test]
    fn level_sits_above_non_constant_operands() {
        let mut engine = Engine::new();
        let c = engine.term("cond");
        let five = engine.real(5.0);
        let seven = engine.real(7.0);
        let inner = engine.conditional(c, five, seven, seven);
        let outer = engine.conditional(c, inner, five, five);
        engine.enable(outer, None);

        assert!(engine.level_of(inner) > engine.level_of(c));
        assert!(engine.level_of(outer) > engine.level_of(inner));
        assert_eq!(engine.level_of(five), 0);
    }

    #[test]
    fn operands_are_grabbed_once_per_position() {
        let mut engine = Engine::new();
        let c = engine.term("cond");
        let five = engine.real(5.0);
        // `five` occupies three positions: three references held.
        let _cond = engine.conditional(c, five, five, five);
        assert_eq!(engine.refcount(five), Some(3));
        assert_eq!(engine.refcount(c), Some(1));
    }
}
