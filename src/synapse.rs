//! Synapse cells: callbacks riding the subscription graph.
//!
//! A synapse subscribes to exactly one cell and runs a handler whenever
//! that cell publishes, instead of being scheduled for reaction like an
//! ordinary subscriber. It is the hook external collaborators use to
//! observe the graph - a timer firing into `alert`, a peer channel watching
//! a rule's value - without defining a cell kind of their own.
//!
//! A synapse without a watched cell is legal: it only fires when alerted
//! directly (the timer-driven case).

use crate::arena::CellId;
use crate::engine::Engine;
use crate::object::CellData;
use crate::value::Value;

/// Handler invoked when a synapse fires. Receives the engine and the
/// watched cell (the synapse's own handle when nothing is watched).
pub type SynapseHandler = Box<dyn FnMut(&mut Engine, CellId)>;

/// Payload of a synapse cell.
pub(crate) struct Synapse {
    pub watched: Option<CellId>,
    /// Taken out while the handler runs, so a handler re-entering the
    /// engine can never alias it.
    pub handler: Option<SynapseHandler>,
}

impl Engine {
    /// Open a synapse on `watched`, subscribing it for alerts. The handler
    /// runs synchronously inside `publish`/`alert`; it may freely call back
    /// into the engine, including closing its own synapse.
    pub fn synapse_open(
        &mut self,
        watched: Option<CellId>,
        handler: impl FnMut(&mut Engine, CellId) + 'static,
    ) -> CellId {
        if let Some(cell) = watched {
            self.grab(Value::Object(cell));
        }
        let id = self.new_object(
            self.builtin.synapse,
            CellData::Synapse(Synapse {
                watched,
                handler: Some(Box::new(handler)),
            }),
        );
        if let Some(cell) = watched {
            self.enable(cell, Some(id));
        }
        id
    }

    /// Close a synapse: releases it, which unsubscribes from the watched
    /// cell (cascading its disable if the synapse was the last subscriber)
    /// and frees the slot.
    pub fn synapse_close(&mut self, synapse: CellId) {
        if !matches!(
            self.arena.get(synapse).map(|o| &o.data),
            Some(CellData::Synapse(_))
        ) {
            let name = self.type_name(synapse).to_owned();
            self.defect(format_args!("synapse close on {name}"));
            return;
        }
        self.release(Value::Object(synapse));
    }

    /// The cell a synapse watches.
    pub fn synapse_watched(&self, synapse: CellId) -> Option<CellId> {
        match self.arena.get(synapse).map(|o| &o.data) {
            Some(CellData::Synapse(s)) => s.watched,
            _ => None,
        }
    }

    /// Run a synapse's handler. The handler is taken out of the arena for
    /// the duration of the call and restored afterwards, unless the synapse
    /// was closed from inside the handler.
    pub(crate) fn fire_synapse(&mut self, id: CellId) {
        let (watched, handler) = match self.arena.get_mut(id) {
            Some(obj) => match &mut obj.data {
                CellData::Synapse(s) => (s.watched, s.handler.take()),
                _ => return,
            },
            None => return,
        };
        let Some(mut handler) = handler else {
            // Already firing further up the stack; a re-entrant alert is
            // dropped rather than recursed.
            cov_mark::hit!(reentrant_synapse_alert_dropped);
            return;
        };
        handler(self, watched.unwrap_or(id));
        if let Some(obj) = self.arena.get_mut(id) {
            if let CellData::Synapse(s) = &mut obj.data {
                if s.handler.is_none() {
                    s.handler = Some(handler);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn handler_fires_when_watched_cell_publishes() {
        let mut engine = Engine::new();
        let t = engine.term("input");
        engine.assert(t, Value::False);

        let fired = Rc::new(Cell::new(0));
        let seen = Rc::new(Cell::new(None));
        let fired_in = fired.clone();
        let seen_in = seen.clone();
        let syn = engine.synapse_open(Some(t), move |engine, cell| {
            fired_in.set(fired_in.get() + 1);
            seen_in.set(Some(engine.value_of(cell)));
        });
        assert_eq!(engine.synapse_watched(syn), Some(t));
        // Opening subscribed and enabled the term, but did not fire.
        assert!(engine.is_enabled(t));
        assert_eq!(fired.get(), 0);

        engine.assert(t, Value::True);
        assert_eq!(fired.get(), 1);
        assert_eq!(seen.get(), Some(Value::True));
    }

    #[test]
    fn direct_alert_fires_an_unwatched_synapse() {
        let mut engine = Engine::new();
        let fired = Rc::new(Cell::new(0));
        let fired_in = fired.clone();
        let syn = engine.synapse_open(None, move |_, _| {
            fired_in.set(fired_in.get() + 1);
        });

        // The timer collaborator path: alert the synapse directly.
        engine.alert(syn);
        engine.alert(syn);
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn closing_detaches_and_frees() {
        let mut engine = Engine::new();
        let t = engine.term("watched");
        engine.assert(t, Value::True);
        // The test holds its own reference to the term.
        engine.grab(Value::Object(t));
        let syn = engine.synapse_open(Some(t), |_, _| {});
        assert_eq!(engine.subscriber_count(t), 1);
        let live = engine.live_objects();

        engine.synapse_close(syn);
        assert_eq!(engine.subscriber_count(t), 0);
        assert_eq!(engine.live_objects(), live - 1);
        assert!(engine.refcount(syn).is_none());

        // Publishing afterwards reaches nobody and hurts nothing.
        engine.assert(t, Value::False);
    }

    #[test]
    fn handler_may_close_its_own_synapse() {
        let mut engine = Engine::new();
        let t = engine.term("oneshot");
        engine.assert(t, Value::False);
        engine.grab(Value::Object(t));

        let fired = Rc::new(Cell::new(0));
        let me: Rc<Cell<Option<CellId>>> = Rc::new(Cell::new(None));
        let fired_in = fired.clone();
        let me_in = me.clone();
        let syn = engine.synapse_open(Some(t), move |engine, _| {
            fired_in.set(fired_in.get() + 1);
            if let Some(id) = me_in.get() {
                engine.synapse_close(id);
            }
        });
        me.set(Some(syn));

        engine.assert(t, Value::True);
        assert_eq!(fired.get(), 1);
        assert!(engine.refcount(syn).is_none());

        // Detached: further publications no longer fire.
        engine.assert(t, Value::Unknown);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn reentrant_alert_is_dropped() {
        cov_mark::check!(reentrant_synapse_alert_dropped);
        let mut engine = Engine::new();
        let fired = Rc::new(Cell::new(0));
        let me: Rc<Cell<Option<CellId>>> = Rc::new(Cell::new(None));
        let fired_in = fired.clone();
        let me_in = me.clone();
        let syn = engine.synapse_open(None, move |engine, _| {
            fired_in.set(fired_in.get() + 1);
            if fired_in.get() == 1 {
                if let Some(id) = me_in.get() {
                    engine.alert(id);
                }
            }
        });
        me.set(Some(syn));

        engine.alert(syn);
        assert_eq!(fired.get(), 1);
    }
}
