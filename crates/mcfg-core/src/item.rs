//! Configuration item nodes

use crate::attribute::EnvValue;
use crate::proxy::ChildSlot;
use crate::repeatable::RepeatableDict;
use crate::schema::ItemSchema;
use crate::state_machine::ItemState;
use indexmap::{IndexMap, IndexSet};
use mcfg_envs::{EnvId, EnvMask};
use std::sync::Arc;

/// Handle of an item inside its configuration tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub(crate) usize);

impl ItemId {
    /// The root item
    pub const ROOT: Self = Self(0);

    /// Index into the tree
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Children stored under one name
#[derive(Debug, Clone)]
pub(crate) enum ChildEntry {
    Single(ChildSlot),
    Repeatable(RepeatableDict),
}

impl ChildEntry {
    pub(crate) fn empty(repeatable: bool) -> Self {
        if repeatable {
            Self::Repeatable(RepeatableDict::default())
        } else {
            Self::Single(ChildSlot::default())
        }
    }

    pub(crate) fn is_repeatable(&self) -> bool {
        matches!(self, Self::Repeatable(_))
    }

    /// Slot for a key, `None` key for single children
    pub(crate) fn slot(&self, key: Option<&str>) -> Option<&ChildSlot> {
        match (self, key) {
            (Self::Single(slot), None) => Some(slot),
            (Self::Repeatable(dict), Some(key)) => dict.get(key),
            _ => None,
        }
    }

    pub(crate) fn slot_mut(&mut self, key: Option<&str>) -> Option<&mut ChildSlot> {
        match (self, key) {
            (Self::Single(slot), None) => Some(slot),
            (Self::Repeatable(dict), Some(key)) => Some(dict.slot_mut(key)),
            _ => None,
        }
    }

    /// All slots with their keys
    pub(crate) fn slots(&self) -> Vec<(Option<&str>, &ChildSlot)> {
        match self {
            Self::Single(slot) => vec![(None, slot)],
            Self::Repeatable(dict) => dict.iter().map(|(k, s)| (Some(k), s)).collect(),
        }
    }
}

/// A configuration item
#[derive(Debug, Clone)]
pub(crate) struct ItemNode {
    pub(crate) schema: Arc<ItemSchema>,
    /// Name in the parent, the schema name
    pub(crate) name: String,
    /// Key inside the parent's repeatable collection
    pub(crate) key: Option<String>,
    pub(crate) state: ItemState,
    /// Envs the item was constructed for
    pub(crate) seen: EnvMask,
    /// Envs the item exists for
    pub(crate) included: EnvMask,
    pub(crate) attributes: IndexMap<String, EnvValue>,
    pub(crate) children: IndexMap<String, ChildEntry>,
    pub(crate) parent: Option<ItemId>,
    pub(crate) built_by: Option<ItemId>,
    /// Errors recorded during the current env pass
    pub(crate) errors: usize,
    /// Attributes set to the required placeholder during the current env pass
    pub(crate) pending: IndexSet<String>,
    /// Inside a default items container
    pub(crate) in_defaults: bool,
}

impl ItemNode {
    pub(crate) fn new(schema: Arc<ItemSchema>, key: Option<String>, parent: Option<ItemId>) -> Self {
        Self {
            name: schema.name().to_string(),
            schema,
            key,
            state: ItemState::InInit,
            seen: EnvMask::empty(),
            included: EnvMask::empty(),
            attributes: IndexMap::new(),
            children: IndexMap::new(),
            parent,
            built_by: None,
            errors: 0,
            pending: IndexSet::new(),
            in_defaults: false,
        }
    }

    #[inline]
    pub(crate) fn is_included(&self, env: EnvId) -> bool {
        self.included.contains(env.index())
    }

    #[inline]
    pub(crate) fn was_seen(&self, env: EnvId) -> bool {
        self.seen.contains(env.index())
    }

    /// Default items and their contents skip required checks and hooks
    pub(crate) fn is_shared(&self) -> bool {
        self.in_defaults || self.schema.is_default_items()
    }
}
