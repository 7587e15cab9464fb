//! Shared default items
//!
//! A default items container holds a parallel hierarchy of items whose
//! values fill in what regular items leave unset. The counterpart of an item
//! is found by mirroring its path through the counterpart of its container,
//! or else in the nearest default items container up the containment chain.

use crate::attribute::{Incoming, Where};
use crate::error::{DefinitionError, Result};
use crate::item::{ChildEntry, ItemId};
use crate::schema::DEFAULT_ITEMS_NAME;
use crate::scope::BuildContext;
use crate::tree::Tree;
use crate::value::McValue;
use mcfg_envs::EnvId;

impl Tree {
    /// Shared item providing defaults for `id` in `env`
    pub(crate) fn default_counterpart(&self, id: ItemId, env: EnvId) -> Option<ItemId> {
        let node = self.node(id);
        if node.is_shared() || node.schema.is_hidden() {
            return None;
        }
        let parent = node.parent?;
        let key = node.key.as_deref();

        if let Some(mirror) = self.default_counterpart(parent, env) {
            if let Some((found, _)) = self.resolve_child(mirror, &node.name, key, env) {
                return Some(found);
            }
        }

        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if let Some((container, _)) = self.resolve_child(current, DEFAULT_ITEMS_NAME, None, env) {
                if let Some((found, _)) = self.resolve_child(container, &node.name, key, env) {
                    return Some(found);
                }
            }
            ancestor = self.node(current).parent;
        }
        None
    }
}

impl BuildContext {
    /// Fill unset attributes from the default counterpart, then report
    /// required and pending attributes still without a value
    pub(crate) fn resolve_missing_values(&mut self, id: ItemId) -> Result<()> {
        let env = self.env;
        let counterpart = self.tree.default_counterpart(id, env);
        let node = self.tree.node(id);

        let mut names: Vec<String> = node.schema.attributes().map(|d| d.name().to_string()).collect();
        for name in node.pending.iter().chain(node.attributes.keys()) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        if let Some(shared) = counterpart {
            for name in self.tree.node(shared).attributes.keys() {
                if !names.contains(name) && node.schema.attribute(name).is_some() {
                    names.push(name.clone());
                }
            }
        }

        let mut first = None;
        for attr in names {
            let node = self.tree.node(id);
            if !is_unset(node.attributes.get(&attr).and_then(|v| v.value(env))) {
                continue;
            }

            let shared_slot = counterpart.and_then(|shared| {
                self.tree
                    .node(shared)
                    .attributes
                    .get(&attr)
                    .and_then(|v| v.get(env))
                    .filter(|slot| !slot.value().is_placeholder())
                    .cloned()
            });
            if let Some(slot) = shared_slot {
                let incoming = Incoming {
                    value: slot.value().clone(),
                    where_from: Where::DefaultItem,
                    from_eg: slot.from_eg(),
                    force: false,
                };
                if let Err(err) = self.store(id, &attr, incoming, None) {
                    first.get_or_insert(err);
                }
                tracing::debug!("Adopted default for {}.{}", self.tree.path(id), attr);
                continue;
            }

            let node = self.tree.node(id);
            let required = node.pending.contains(&attr)
                || node.schema.attribute(&attr).is_some_and(|d| d.is_required());
            if required {
                let err = DefinitionError::MissingValue {
                    item: self.tree.path(id),
                    attr,
                    env: self.env_info.name().to_string(),
                };
                let err = self.fail(id, err);
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Proxy in declared children the item lacks but its default counterpart has
    pub(crate) fn backfill_children(&mut self, id: ItemId) -> Result<()> {
        let env = self.env;
        let Some(shared) = self.tree.default_counterpart(id, env) else {
            return Ok(());
        };
        let schema = std::sync::Arc::clone(&self.tree.node(id).schema);

        let mut wanted: Vec<(String, Option<String>, ItemId)> = Vec::new();
        for (name, entry) in &self.tree.node(shared).children {
            let declared = match entry {
                ChildEntry::Single(_) => schema.declared_child(name).is_some(),
                ChildEntry::Repeatable(_) => schema.declares_repeatable(name),
            };
            if !declared {
                continue;
            }
            for (key, _) in entry.slots() {
                if let Some((target, _)) = self.tree.resolve_child(shared, name, key, env) {
                    if self.tree.resolve_child(id, name, key, env).is_none() {
                        wanted.push((name.clone(), key.map(str::to_string), target));
                    }
                }
            }
        }

        for (name, key, target) in wanted {
            match self.tree.install_proxy(id, &name, key.as_deref(), target, env) {
                Ok(true) => tracing::debug!(
                    "Proxied default {} into {}",
                    self.tree.path(target),
                    self.tree.path(id)
                ),
                Ok(false) => {}
                Err(err) => return Err(self.fail(id, err)),
            }
        }
        Ok(())
    }

    /// Report declared required children absent for the current env
    pub(crate) fn check_required_children(&mut self, id: ItemId) -> Result<()> {
        let env = self.env;
        let schema = std::sync::Arc::clone(&self.tree.node(id).schema);
        let mut first = None;
        for name in schema.required_children() {
            if self.tree.resolve_child(id, name, None, env).is_none() {
                let err = DefinitionError::MissingRequiredItem {
                    item: self.tree.path(id),
                    name: name.to_string(),
                    env: self.env_info.name().to_string(),
                };
                let err = self.fail(id, err);
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// True if `value` leaves the attribute without a usable value
fn is_unset(value: Option<&McValue>) -> bool {
    value.map_or(true, McValue::is_placeholder)
}
