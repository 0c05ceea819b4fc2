//! Textual display of cells, values, and the graph around them.
//!
//! Display is purely presentational: the conditional shorthand forms
//! (`known`, `unfalse`, `untrue`, …) collapse coinciding operands for the
//! reader and never affect evaluation. Sentinels render as their glyphs,
//! reals as numbers, strings quoted, terms by name.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::arena::CellId;
use crate::conditional::Conditional;
use crate::engine::Engine;
use crate::object::CellData;
use crate::value::Value;

/// Annotation switches for `display`: prepend the current value in braces,
/// the level in parentheses, the reference count in brackets.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShowOptions {
    /// Show a reactive cell's current value ahead of its expression.
    pub value: bool,
    /// Show a reactive cell's level.
    pub level: bool,
    /// Show the reference count.
    pub count: bool,
}

impl Engine {
    /// Expression form of a value: the sentinel glyph, or the referenced
    /// object's display.
    pub fn display_value(&self, v: Value) -> String {
        match v {
            Value::Object(id) => self.display(id),
            sentinel => sentinel.glyph().unwrap_or("?").to_owned(),
        }
    }

    /// Expression form of an object, with any enabled annotations.
    pub fn display(&self, id: CellId) -> String {
        let mut out = String::new();
        self.render(&mut out, id);
        out
    }

    fn render(&self, out: &mut String, id: CellId) {
        let Some(obj) = self.arena.get(id) else {
            out.push_str("???");
            return;
        };
        if obj.value != Value::Object(id) {
            if self.show.value {
                out.push('{');
                self.render_value(out, obj.value);
                out.push('}');
            }
            if self.show.level {
                let _ = write!(out, "({})", obj.level);
            }
        }
        if self.show.count {
            let _ = write!(out, "[{}]", obj.refcnt);
        }
        match &obj.data {
            CellData::Real(n) => {
                let _ = write!(out, "{n}");
            }
            CellData::Text(s) => {
                let _ = write!(out, "\"{s}\"");
            }
            CellData::Term(t) => out.push_str(&t.name),
            CellData::Synapse(_) => out.push_str("(synapse)"),
            CellData::Conditional(c) => self.render_conditional(out, *c),
        }
    }

    fn render_value(&self, out: &mut String, v: Value) {
        match v.glyph() {
            Some(glyph) => out.push_str(glyph),
            None => {
                if let Some(id) = v.as_object() {
                    self.render(out, id);
                }
            }
        }
    }

    /// Shorthand table for the conditional, collapsing coinciding operands:
    /// everything equal prints `known X`; a lone true-substitute prints
    /// `true X`; true-and-unknown sharing prints `unfalse X`;
    /// false-and-unknown sharing prints `untrue X`; fully distinct operands
    /// print the expanded `true … else false … else …` form.
    fn render_conditional(&self, out: &mut String, x: Conditional) {
        let Conditional {
            condition: c,
            if_true: t,
            if_false: f,
            if_unknown: u,
        } = x;
        out.push('(');
        self.render(out, c);
        if t != c {
            if f == c {
                if u == c {
                    out.push_str(" true ");
                    self.render(out, t);
                } else if u == t {
                    out.push_str(" unfalse ");
                    self.render(out, t);
                } else {
                    out.push_str(" true ");
                    self.render(out, t);
                    out.push_str(" else unknown ");
                    self.render(out, u);
                }
            } else if f == t {
                out.push_str(" known ");
                self.render(out, t);
                if u != c && u != t {
                    out.push_str(" else ");
                    self.render(out, u);
                }
            } else if u == t {
                out.push_str(" false ");
                self.render(out, f);
                out.push_str(" else ");
                self.render(out, t);
            } else {
                out.push_str(" true ");
                self.render(out, t);
                if u != f {
                    out.push_str(" else false ");
                    self.render(out, f);
                    if u != c {
                        out.push_str(" else ");
                        self.render(out, u);
                    }
                } else {
                    out.push_str(" else ");
                    self.render(out, f);
                }
            }
        } else if f != c {
            if u == f {
                out.push_str(" untrue ");
                self.render(out, f);
            } else {
                out.push_str(" false ");
                self.render(out, f);
                if u != c {
                    out.push_str(" else unknown ");
                    self.render(out, u);
                }
            }
        } else if u != c {
            out.push_str(" unknown ");
            self.render(out, u);
        }
        out.push(')');
    }

    /// The impacted downstream of a cell: the cell and, indented beneath
    /// it, every transitive subscriber. Diagnostic companion to `publish`.
    pub fn show_impact(&self, id: CellId) -> String {
        let mut out = String::new();
        let mut seen = BTreeSet::new();
        self.render_impact(&mut out, id, 0, &mut seen);
        out
    }

    fn render_impact(&self, out: &mut String, id: CellId, depth: usize, seen: &mut BTreeSet<CellId>) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        self.render(out, id);
        out.push('\n');
        if !seen.insert(id) {
            return;
        }
        let Some(obj) = self.arena.get(id) else { return };
        for &sub in obj.subscribers.keys() {
            self.render_impact(out, sub, depth + 1, seen);
        }
    }

    /// The registered types, one per line, in registration order.
    pub fn show_types(&self) -> String {
        let mut out = String::new();
        for info in self.types.iter() {
            let _ = writeln!(out, "type {}", info.name);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_render_as_glyphs() {
        let engine = Engine::new();
        assert_eq!(engine.display_value(Value::True), "!!");
        assert_eq!(engine.display_value(Value::False), "!");
        assert_eq!(engine.display_value(Value::Unknown), "?");
        assert_eq!(engine.display_value(Value::Disabled), "#");
        assert_eq!(engine.display_value(Value::Undefined), "??");
        assert_eq!(engine.display_value(Value::Placeholder), "_");
    }

    #[test]
    fn constants_and_terms_render_plainly() {
        let mut engine = Engine::new();
        let five = engine.real(5.0);
        let half = engine.real(0.5);
        let s = engine.text("alarm");
        let t = engine.term("fraud.score");
        assert_eq!(engine.display(five), "5");
        assert_eq!(engine.display(half), "0.5");
        assert_eq!(engine.display(s), "\"alarm\"");
        assert_eq!(engine.display(t), "fraud.score");
    }

    #[test]
    fn conditional_shorthand_forms() {
        let mut engine = Engine::new();
        let c = engine.term("c");
        let x = engine.real(1.0);
        let y = engine.real(2.0);
        let z = engine.real(3.0);

        // All three substitutes coincide.
        let known = engine.conditional(c, x, x, x);
        assert_eq!(engine.display(known), "(c known 1)");

        // Only a true-substitute.
        let true_only = engine.conditional(c, x, c, c);
        assert_eq!(engine.display(true_only), "(c true 1)");

        // True and unknown share a substitute.
        let unfalse = engine.conditional(c, x, c, x);
        assert_eq!(engine.display(unfalse), "(c unfalse 1)");

        // False and unknown share a substitute.
        let untrue = engine.conditional(c, c, y, y);
        assert_eq!(engine.display(untrue), "(c untrue 2)");

        // Fully distinct operands: the expanded form.
        let full = engine.conditional(c, x, y, z);
        assert_eq!(engine.display(full), "(c true 1 else false 2 else 3)");
    }

    #[test]
    fn annotations_follow_show_options() {
        let mut engine = Engine::new();
        let t = engine.term("input");
        engine.assert(t, Value::True);
        engine.enable(t, None);

        assert_eq!(engine.display(t), "input");
        engine.show.value = true;
        assert_eq!(engine.display(t), "{!!}input");
        engine.show.level = true;
        assert_eq!(engine.display(t), "{!!}(0)input");
    }

    #[test]
    fn impact_tree_lists_transitive_subscribers() {
        let mut engine = Engine::new();
        let c = engine.term("c");
        engine.assert(c, Value::True);
        let five = engine.real(5.0);
        let seven = engine.real(7.0);
        let cond = engine.conditional(c, five, seven, seven);
        let relay = engine.term("relay");
        engine.assert(relay, Value::Object(cond));
        engine.enable(relay, None);

        let impact = engine.show_impact(c);
        let lines: Vec<&str> = impact.lines().collect();
        assert_eq!(lines[0], "c");
        assert!(lines[1].starts_with("  ("));
        assert_eq!(lines[2], "    relay");
    }

    #[test]
    fn type_listing_is_in_registration_order() {
        let engine = Engine::new();
        let listing = engine.show_types();
        let first: Vec<&str> = listing.lines().take(3).collect();
        assert_eq!(first, ["type disabled", "type true", "type false"]);
        assert!(listing.lines().any(|l| l == "type conditional"));

        assert!(engine.lookup_type("term").unwrap().sticky);
        assert!(engine.lookup_type("schedule").is_none());
    }
}
