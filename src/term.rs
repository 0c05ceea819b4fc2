//! Term cells: named inputs at the edge of the graph.
//!
//! A term is where the outside world meets the engine. Embedding code
//! asserts a definition - a sentinel, a constant, or another cell - and the
//! term relays that definition's value to everything downstream, publishing
//! when an assertion actually changes it.
//!
//! Terms are the one kind with the sticky disable exception: once bound to
//! a static value, a term keeps that binding (and stays enabled) when its
//! last subscriber leaves, instead of resetting to Disabled.

use crate::arena::CellId;
use crate::engine::Engine;
use crate::object::CellData;
use crate::value::Value;

/// Payload of a term cell.
pub(crate) struct Term {
    pub name: Box<str>,
    /// Current definition; `None` until the first assertion.
    pub def: Option<Value>,
}

impl Engine {
    /// Locate or create the term with the given name. New terms have no
    /// definition and evaluate to Unknown.
    pub fn term(&mut self, name: &str) -> CellId {
        if let Some(&id) = self.interns.terms.get(name) {
            return id;
        }
        let id = self.new_object(
            self.builtin.term,
            CellData::Term(Term {
                name: name.into(),
                def: None,
            }),
        );
        self.interns.terms.insert(name.into(), id);
        id
    }

    /// Assert a term's definition. While the term is enabled this rewires
    /// its subscription (old cell definition out, new cell definition in),
    /// re-evaluates immediately, and publishes if the value changed; a
    /// disabled term just records the definition for its next enable.
    ///
    /// Asserting on anything that is not a term is a logged defect, not an
    /// error return.
    pub fn assert(&mut self, term: CellId, definition: Value) {
        if !matches!(
            self.arena.get(term).map(|o| &o.data),
            Some(CellData::Term(_))
        ) {
            let name = self.type_name(term).to_owned();
            self.defect(format_args!("assert on {name}, which is not a term"));
            return;
        }
        let definition = self.grab(definition);
        let enabled = self.is_enabled(term);
        let old = match self.arena.get_mut(term) {
            Some(obj) => match &mut obj.data {
                CellData::Term(t) => std::mem::replace(&mut t.def, Some(definition)),
                _ => unreachable!("checked above"),
            },
            None => return,
        };
        if enabled {
            if let Some(Value::Object(cell)) = old {
                self.disable(cell, Some(term));
            }
        }
        if let Some(old) = old {
            self.release(old);
        }
        if enabled {
            if let Value::Object(cell) = definition {
                self.enable(cell, Some(term));
            }
            self.evaluate(term);
        }
    }

    /// Whether a term's definition is a static value (a sentinel or a
    /// constant object). Non-terms are never statically bound.
    pub(crate) fn bound_static(&self, id: CellId) -> bool {
        match self.arena.get(id).map(|o| &o.data) {
            Some(CellData::Term(t)) => match t.def {
                Some(Value::Object(cell)) => self.is_static(cell),
                Some(_) => true,
                None => false,
            },
            _ => false,
        }
    }
}
