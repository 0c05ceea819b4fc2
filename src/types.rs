//! The type registry: per-kind metadata for every object the engine can hold.
//!
//! A type records what an object *is* - capability flags, attribute flags
//! consumed by higher layers, the sticky-enable exception - while behavior
//! (solve/eval/enable/disable/show) dispatches on the closed payload enum in
//! `object.rs`. Types are registered once when the engine is constructed and
//! live for the process; the registry preserves registration order for
//! listings and hashes names for lookup.

use indexmap::IndexMap;

use crate::hash::InternHashBuilder;

/// Capability flags shared by every type of a given kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Kind(u32);

impl Kind {
    /// No capabilities.
    pub const NONE: Kind = Kind(0);
    /// Counts as boolean true wherever a truth value is needed.
    pub const TRUE: Kind = Kind(0x01);
    /// Counts as boolean false.
    pub const FALSE: Kind = Kind(0x02);
    /// Counts as unknown.
    pub const UNKNOWN: Kind = Kind(0x04);
    /// Participates in the subscription graph and has a level.
    pub const CELL: Kind = Kind(0x08);
    /// Never changes; subscription to it is pointless and skipped.
    pub const CONSTANT: Kind = Kind(0x10);
    /// Lives for the process; exempt from reference counting.
    pub const PERMANENT: Kind = Kind(0x20);
    /// Carries a numeric payload.
    pub const REAL: Kind = Kind(0x40);
    /// Carries a string payload.
    pub const STRING: Kind = Kind(0x80);

    /// True when every flag in `other` is set in `self`.
    pub fn contains(self, other: Kind) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Kind {
    type Output = Kind;

    fn bitor(self, rhs: Kind) -> Kind {
        Kind(self.0 | rhs.0)
    }
}

/// Attribute flags consumed by layers above the core (rule compilation,
/// display policy). The core carries them; it only reads `SPECIAL`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Attr(u32);

impl Attr {
    /// No attributes.
    pub const NONE: Attr = Attr(0);
    /// Subscribes to other cells as a rule body does.
    pub const RULE: Attr = Attr(0x02);
    /// Relational operator family: publishes and subscribes.
    pub const REL: Attr = Attr(0x08);
    /// Boolean operator family.
    pub const BOOL: Attr = Attr(0x20);
    /// Special value outside the ordinary constant families.
    pub const SPECIAL: Attr = Attr(0x100);

    /// True when every flag in `other` is set in `self`.
    pub fn contains(self, other: Attr) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Attr {
    type Output = Attr;

    fn bitor(self, rhs: Attr) -> Attr {
        Attr(self.0 | rhs.0)
    }
}

/// Index of a registered type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeId(u16);

impl TypeId {
    pub(crate) fn new(index: u16) -> Self {
        Self(index)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Metadata for one registered type.
#[derive(Debug)]
pub struct TypeInfo {
    /// Symbolic name, unique within the registry.
    pub name: &'static str,
    /// Capability flags.
    pub kind: Kind,
    /// Attribute flags for higher layers.
    pub attr: Attr,
    /// Disable exception: once bound to a static value, a cell of this type
    /// stays enabled even with an empty subscription set. Set only where the
    /// behavior is known to be intended; never inferred.
    pub sticky: bool,
}

/// Process-wide type list, in registration order.
pub(crate) struct TypeRegistry {
    types: IndexMap<&'static str, TypeInfo, InternHashBuilder>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: IndexMap::with_hasher(InternHashBuilder),
        }
    }

    /// Link a new type into the registry. Re-registering a name is a logic
    /// error in engine construction and panics there rather than corrupting
    /// the table.
    pub fn register(&mut self, name: &'static str, kind: Kind, attr: Attr, sticky: bool) -> TypeId {
        let (index, previous) = self.types.insert_full(
            name,
            TypeInfo {
                name,
                kind,
                attr,
                sticky,
            },
        );
        assert!(previous.is_none(), "type {name:?} registered twice");
        TypeId::new(index as u16)
    }

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        self.types
            .get_index(id.index())
            .map(|(_, info)| info)
            .expect("type ids are only minted by register()")
    }

    /// Look a type up by name.
    pub fn by_name(&self, name: &str) -> Option<(TypeId, &TypeInfo)> {
        self.types
            .get_full(name)
            .map(|(index, _, info)| (TypeId::new(index as u16), info))
    }

    /// All types, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types.values()
    }
}
