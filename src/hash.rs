//! Fixed-seed hashing for the engine's intern tables.
//!
//! Interning maps (reals by bit pattern, strings and terms by text,
//! conditionals by operand identity) are internal lookup structures: they are
//! never fed attacker-controlled keys, so HashDoS resistance buys nothing.
//! `InternHashBuilder` trades it for a zero-sized, deterministic foldhash
//! state shared by every table.

use std::hash::BuildHasher;

pub use foldhash::fast::{FixedState, FoldHasher};

/// Zero-sized `BuildHasher` over foldhash with a fixed seed.
///
/// Every instance produces identical hashes, so handles can be looked up in
/// any table built with it, and the hasher adds no per-table memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct InternHashBuilder;

impl BuildHasher for InternHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x9e3779b97f4a7c15).build_hasher()
    }
}
