#![deny(missing_docs)]

//! Incremental rule-evaluation cell engine.
//!
//! A long-lived graph of computed values ("cells") reacts to input changes
//! by propagating updates only to affected downstream cells, in dependency
//! order, without re-evaluating unaffected state. Cells carry a topological
//! *level* strictly above their non-constant operands; reaction drains
//! pending work level by level ascending, so one pass brings the graph to a
//! fixed point.
//!
//! # Quick start
//!
//! ```
//! use axon::{Engine, Value};
//!
//! let mut engine = Engine::new();
//!
//! // Constants are interned; terms are named inputs.
//! let five = engine.real(5.0);
//! let seven = engine.real(7.0);
//! let nine = engine.real(9.0);
//! let condition = engine.term("alarm.raised");
//! engine.assert(condition, Value::False);
//!
//! // A ternary conditional: true / false / unknown substitutes.
//! let rule = engine.conditional(condition, five, seven, nine);
//!
//! // Enabling subscribes the cell to its operands and computes its value.
//! engine.enable(rule, None);
//! assert_eq!(engine.real_value(engine.value_of(rule)), Some(7.0));
//!
//! // An assertion publishes; one reaction sweep settles the graph.
//! engine.assert(condition, Value::True);
//! engine.react();
//! assert_eq!(engine.real_value(engine.value_of(rule)), Some(5.0));
//! ```
//!
//! # Core types
//!
//! - [`Engine`] - owns the object arena, type registry, intern tables, and
//!   the pending-level reaction index. Independent engines coexist freely.
//! - [`CellId`] - generational handle to an engine object; handles held
//!   past destruction go stale instead of dangling.
//! - [`Value`] - the value domain: permanent truth/state sentinels plus
//!   object references. Identity comparison on values is the reaction
//!   engine's change test.
//!
//! # Lifecycle
//!
//! Objects are reference counted by hand: [`Engine::grab`] for every
//! reference held, [`Engine::release`] for every reference dropped; the
//! release that returns the count to zero destroys the object. Sentinels
//! are permanent and exempt. Evaluation never fails - defects (circular
//! expressions, bookkeeping mismatches, unimplemented dispatch slots) are
//! logged through `tracing` and counted on [`Stats`], and the engine
//! continues degraded. The only fatal path is allocator exhaustion.

mod arena;
mod cell;
mod conditional;
mod engine;
mod hash;
mod object;
mod show;
mod synapse;
mod term;
mod types;
mod value;

pub use arena::CellId;
pub use engine::{Engine, Stats};
pub use show::ShowOptions;
pub use types::{Attr, Kind, TypeId, TypeInfo};
pub use value::Value;
