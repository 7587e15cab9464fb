//! Arena of configuration items
//!
//! All items of a configuration live in one [`Tree`] and refer to each other
//! by [`ItemId`]. The tree is mutated only while envs are being built and is
//! shared read-only once loaded.

use crate::error::DefinitionError;
use crate::item::{ChildEntry, ItemId, ItemNode};
use crate::proxy::ProxyInstall;
use crate::schema::ItemSchema;
use crate::state_machine::{validate_transition, ItemState};
use indexmap::IndexMap;
use mcfg_envs::{EnvFactory, EnvId};
use std::sync::Arc;

/// Items of one configuration
#[derive(Debug)]
pub struct Tree {
    pub(crate) envs: Arc<EnvFactory>,
    pub(crate) nodes: Vec<ItemNode>,
    pub(crate) loaded: bool,
    pub(crate) errors: usize,
    pub(crate) warnings: usize,
    /// Attribute paths holding todo values, per env
    pub(crate) todo: IndexMap<EnvId, Vec<String>>,
}

impl Tree {
    pub(crate) fn new(envs: Arc<EnvFactory>, root: Arc<ItemSchema>) -> Self {
        Self {
            envs,
            nodes: vec![ItemNode::new(root, None, None)],
            loaded: false,
            errors: 0,
            warnings: 0,
            todo: IndexMap::new(),
        }
    }

    /// Env hierarchy the tree was built for
    #[inline]
    #[must_use]
    pub fn envs(&self) -> &EnvFactory {
        &self.envs
    }

    /// True once every requested env was built
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Errors recorded while building
    #[inline]
    #[must_use]
    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Warnings recorded while building
    #[inline]
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    /// Attribute paths holding todo values for `env`
    #[must_use]
    pub fn todo(&self, env: EnvId) -> &[String] {
        self.todo.get(&env).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub(crate) fn node(&self, id: ItemId) -> &ItemNode {
        &self.nodes[id.0]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: ItemId) -> &mut ItemNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn push(&mut self, node: ItemNode) -> ItemId {
        self.nodes.push(node);
        ItemId(self.nodes.len() - 1)
    }

    pub(crate) fn env_name(&self, env: EnvId) -> String {
        self.envs
            .env_by_id(env)
            .map_or_else(|| format!("#{}", env.index()), |e| e.name().to_string())
    }

    /// Dotted path of an item, keys in brackets
    #[must_use]
    pub fn path(&self, id: ItemId) -> String {
        let node = self.node(id);
        let own = match &node.key {
            Some(key) => format!("{}[{key}]", node.name),
            None => node.name.clone(),
        };
        match node.parent {
            Some(parent) => format!("{}.{own}", self.path(parent)),
            None => own,
        }
    }

    pub(crate) fn transition(&mut self, id: ItemId, to: ItemState) -> Result<(), DefinitionError> {
        let from = self.node(id).state;
        validate_transition(from, to).map_err(|e| DefinitionError::IllegalTransition {
            item: self.path(id),
            from: e.from,
            to: e.to,
        })?;
        self.node_mut(id).state = to;
        Ok(())
    }

    /// Resolve the child stored under `name` and `key` for `env`
    ///
    /// Returns the item and whether it was reached through a proxy.
    pub(crate) fn resolve_child(
        &self,
        parent: ItemId,
        name: &str,
        key: Option<&str>,
        env: EnvId,
    ) -> Option<(ItemId, bool)> {
        self.node(parent)
            .children
            .get(name)?
            .slot(key)?
            .resolve(env, |id| self.node(id).is_included(env))
    }

    /// Real item stored under `name` and `key`, whatever its envs
    pub(crate) fn real_child(&self, parent: ItemId, name: &str, key: Option<&str>) -> Option<ItemId> {
        self.node(parent).children.get(name)?.slot(key)?.item
    }

    pub(crate) fn attach(&mut self, parent: ItemId, id: ItemId) {
        let (name, key, repeatable) = {
            let node = self.node(id);
            (node.name.clone(), node.key.clone(), node.key.is_some())
        };
        let entry = self
            .node_mut(parent)
            .children
            .entry(name)
            .or_insert_with(|| ChildEntry::empty(repeatable));
        if let Some(slot) = entry.slot_mut(key.as_deref()) {
            slot.item = Some(id);
        }
    }

    /// Expose `target` in the slot `name`/`key` of `owner` for `env`
    pub(crate) fn install_proxy(
        &mut self,
        owner: ItemId,
        name: &str,
        key: Option<&str>,
        target: ItemId,
        env: EnvId,
    ) -> Result<bool, DefinitionError> {
        let real_included = self
            .real_child(owner, name, key)
            .is_some_and(|id| self.node(id).is_included(env));
        let path = self.path(owner);
        let entry = self
            .node_mut(owner)
            .children
            .entry(name.to_string())
            .or_insert_with(|| ChildEntry::empty(key.is_some()));
        let outcome = entry
            .slot_mut(key)
            .map(|slot| slot.install_proxy(target, env, real_included));
        match outcome {
            Some(ProxyInstall::Installed) => Ok(true),
            Some(ProxyInstall::Shadowed) => Ok(false),
            Some(ProxyInstall::Conflict) => Err(DefinitionError::ProxyConflict {
                item: path,
                name: key.map_or_else(|| name.to_string(), |k| format!("{name}[{k}]")),
            }),
            None => Err(DefinitionError::RepeatableMismatch {
                name: name.to_string(),
                parent: path,
                reason: "shared item does not match the repeatable declaration".to_string(),
            }),
        }
    }

    /// Leave the tree consistent after a failed env pass
    pub(crate) fn abort_env(&mut self, env: EnvId) {
        for node in &mut self.nodes {
            node.state = ItemState::Frozen;
            node.pending.clear();
            node.seen.clear(env.index());
            node.included.clear(env.index());
            for value in node.attributes.values_mut() {
                value.clear_env(env);
            }
        }
        self.todo.shift_remove(&env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    #[test]
    fn paths_include_keys() {
        let mut envs = EnvFactory::new();
        envs.env("dev").unwrap();
        envs.seal().unwrap();
        let root = SchemaBuilder::new("root").build().unwrap();
        let server = SchemaBuilder::new("server").repeatable().build().unwrap();
        let log = SchemaBuilder::new("log").build().unwrap();

        let mut tree = Tree::new(Arc::new(envs), root);
        let s = tree.push(ItemNode::new(server, Some("web".into()), Some(ItemId::ROOT)));
        tree.attach(ItemId::ROOT, s);
        let l = tree.push(ItemNode::new(log, None, Some(s)));
        tree.attach(s, l);

        assert_eq!(tree.path(l), "root.server[web].log");
        assert_eq!(tree.real_child(ItemId::ROOT, "server", Some("web")), Some(s));
        assert_eq!(tree.real_child(ItemId::ROOT, "server", None), None);
    }

    #[test]
    fn abort_freezes_everything() {
        let mut envs = EnvFactory::new();
        let dev = envs.env("dev").unwrap();
        envs.seal().unwrap();
        let root = SchemaBuilder::new("root").build().unwrap();
        let mut tree = Tree::new(Arc::new(envs), root);
        tree.node_mut(ItemId::ROOT).seen.set(dev.index());
        tree.node_mut(ItemId::ROOT).state = ItemState::InWith;

        tree.abort_env(dev);
        assert_eq!(tree.node(ItemId::ROOT).state, ItemState::Frozen);
        assert!(!tree.node(ItemId::ROOT).was_seen(dev));
    }
}
