//! Keyed collections of repeatable items

use crate::item::ItemId;
use crate::proxy::ChildSlot;
use indexmap::IndexMap;
use mcfg_envs::EnvId;

/// Ordered mapping from key to item slot
///
/// Keys stay in first-insertion order across envs. An entry whose item is
/// excluded for an env is skipped when iterating that env.
#[derive(Debug, Clone, Default)]
pub(crate) struct RepeatableDict {
    entries: IndexMap<String, ChildSlot>,
}

impl RepeatableDict {
    pub(crate) fn get(&self, key: &str) -> Option<&ChildSlot> {
        self.entries.get(key)
    }

    pub(crate) fn slot_mut(&mut self, key: &str) -> &mut ChildSlot {
        self.entries.entry(key.to_string()).or_default()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &ChildSlot)> {
        self.entries.iter().map(|(k, s)| (k.as_str(), s))
    }

    /// Entries live for `env`, in key order
    pub(crate) fn live<'a, F>(&'a self, env: EnvId, included: F) -> impl Iterator<Item = (&'a str, ItemId, bool)> + 'a
    where
        F: Fn(ItemId) -> bool + Copy + 'a,
    {
        self.entries
            .iter()
            .filter_map(move |(k, slot)| slot.resolve(env, included).map(|(id, p)| (k.as_str(), id, p)))
    }
}
