//! Read views over a configuration tree
//!
//! [`ItemView`] reads an item for one env. A view remembers the items it was
//! reached through, so a view at or below a proxy reports the proxy's owner
//! as containing item and relative navigation works the same for shared and
//! own children. [`CrossEnvView`] is handed to
//! post-validation hooks, which run with no current env.

use crate::attribute::EnvValue;
use crate::error::{ApiUsageError, ConfigError, DefinitionError, ExcludedError, Result};
use crate::item::{ChildEntry, ItemId, ItemNode};
use crate::repeatable::RepeatableDict;
use crate::schema::ItemSchema;
use crate::state_machine::ItemState;
use crate::tree::Tree;
use crate::value::McValue;
use mcfg_envs::{Env, EnvId, EnvMask};
use serde::de::DeserializeOwned;
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt::{self, Debug, Formatter};

/// Containing items a view was reached through, outermost first
type Trail = SmallVec<[ItemId; 8]>;

/// Read access to one item for one env
#[derive(Clone)]
pub struct ItemView<'cfg> {
    tree: &'cfg Tree,
    env: EnvId,
    id: ItemId,
    trail: Trail,
}

impl<'cfg> ItemView<'cfg> {
    pub(crate) fn new(tree: &'cfg Tree, env: EnvId, id: ItemId) -> Self {
        let mut trail = Trail::new();
        let mut current = tree.node(id).parent;
        while let Some(parent) = current {
            trail.push(parent);
            current = tree.node(parent).parent;
        }
        trail.reverse();
        Self { tree, env, id, trail }
    }

    /// View of a child slot entry of this item, proxied or not
    fn nested(&self, id: ItemId) -> Self {
        let mut trail = self.trail.clone();
        trail.push(self.id);
        Self {
            tree: self.tree,
            env: self.env,
            id,
            trail,
        }
    }

    #[inline]
    fn node(&self) -> &'cfg ItemNode {
        self.tree.node(self.id)
    }

    fn env_name(&self) -> String {
        self.tree.env_name(self.env)
    }

    /// Item id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Name in the containing item
    #[must_use]
    pub fn name(&self) -> &'cfg str {
        &self.node().name
    }

    /// Key inside a repeatable collection
    #[must_use]
    pub fn key(&self) -> Option<&'cfg str> {
        self.node().key.as_deref()
    }

    /// Item schema
    #[must_use]
    pub fn schema(&self) -> &'cfg ItemSchema {
        &self.node().schema
    }

    /// Lifecycle state
    #[must_use]
    pub fn state(&self) -> ItemState {
        self.node().state
    }

    /// Env the view reads
    #[must_use]
    pub fn env(&self) -> Option<&'cfg Env> {
        self.tree.envs.env_by_id(self.env)
    }

    /// Dotted path of the underlying item
    #[must_use]
    pub fn path(&self) -> String {
        self.tree.path(self.id)
    }

    /// True if the item exists for the view's env
    #[must_use]
    pub fn exists(&self) -> bool {
        self.node().is_included(self.env)
    }

    /// True if the item exists for the named env
    ///
    /// # Errors
    /// Returns an error for unknown env names
    pub fn exists_in(&self, env: &str) -> Result<bool> {
        let env = self.tree.envs.env_named(env)?;
        Ok(self.node().is_included(env.id()))
    }

    /// Envs the item exists for
    #[must_use]
    pub fn env_mask(&self) -> &'cfg EnvMask {
        &self.node().included
    }

    /// True if reached through a proxy
    #[must_use]
    pub fn is_proxied(&self) -> bool {
        self.trail.last().copied() != self.node().parent
    }

    fn ensure_exists(&self) -> Result<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(ExcludedError::Item {
                item: self.path(),
                env: self.env_name(),
            }
            .into())
        }
    }

    /// Value of an attribute for the view's env
    ///
    /// Unset declared attributes read as their schema default.
    ///
    /// # Errors
    /// Returns [`ExcludedError`] if the item or value is absent for the env,
    /// [`ApiUsageError::TodoValue`] for deferred values and
    /// [`DefinitionError::UnknownAttribute`] for undeclared names
    pub fn attr(&self, name: &str) -> Result<&'cfg Value> {
        self.ensure_exists()?;
        let node = self.node();
        let slot = node.attributes.get(name).and_then(|v| v.value(self.env));
        match slot {
            Some(McValue::Value(value)) => Ok(value),
            Some(McValue::Todo) => Err(ApiUsageError::TodoValue {
                item: self.path(),
                attr: name.to_string(),
                env: self.env_name(),
            }
            .into()),
            Some(McValue::Required) | None => match node.schema.attribute(name) {
                Some(decl) => decl.default().ok_or_else(|| self.no_value(name)),
                None if node.attributes.contains_key(name) => Err(self.no_value(name)),
                None => Err(DefinitionError::UnknownAttribute {
                    item: self.path(),
                    attr: name.to_string(),
                }
                .into()),
            },
        }
    }

    fn no_value(&self, name: &str) -> ConfigError {
        ExcludedError::Attribute {
            item: self.path(),
            attr: name.to_string(),
            env: self.env_name(),
        }
        .into()
    }

    /// Attribute value deserialized into `T`
    ///
    /// # Errors
    /// Returns the errors of [`ItemView::attr`] and
    /// [`DefinitionError::TypeMismatch`] if the value does not deserialize
    pub fn attr_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.attr(name)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            DefinitionError::TypeMismatch {
                item: self.path(),
                attr: name.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Attribute names: declared first, then undeclared ones in setting order
    #[must_use]
    pub fn attr_names(&self) -> Vec<&'cfg str> {
        let node = self.node();
        let mut names: Vec<&'cfg str> = node.schema.attributes().map(|d| d.name()).collect();
        for name in node.attributes.keys() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Attributes with their value for the view's env, in name order
    pub fn attributes(&self) -> impl Iterator<Item = (&'cfg str, Result<&'cfg Value>)> + 'cfg {
        let view = self.clone();
        self.attr_names().into_iter().map(move |name| (name, view.attr(name)))
    }

    /// Raw per-env value of an attribute
    #[must_use]
    pub fn env_value(&self, name: &str) -> Option<&'cfg EnvValue> {
        self.node().attributes.get(name)
    }

    /// Value of the attribute on this item or the nearest containing item
    /// that has it
    ///
    /// # Errors
    /// Returns [`ExcludedError::Attribute`] if no containing item has a value
    pub fn find_attribute(&self, name: &str) -> Result<&'cfg Value> {
        let mut current = Some(self.clone());
        while let Some(view) = current {
            match view.attr(name) {
                Ok(value) => return Ok(value),
                Err(ConfigError::Definition(DefinitionError::UnknownAttribute { .. })) => {}
                Err(ConfigError::Excluded(ExcludedError::Attribute { .. })) => {}
                Err(other) => return Err(other),
            }
            current = view.contained_in();
        }
        Err(self.no_value(name))
    }

    /// Single child for the view's env
    ///
    /// # Errors
    /// Returns [`ExcludedError`] if the child is absent for the env
    pub fn child(&self, name: &str) -> Result<ItemView<'cfg>> {
        self.ensure_exists()?;
        self.tree
            .resolve_child(self.id, name, None, self.env)
            .filter(|(id, _)| !self.tree.node(*id).schema.is_hidden())
            .map(|(id, _)| self.nested(id))
            .ok_or_else(|| self.missing_child(name))
    }

    fn missing_child(&self, name: &str) -> ConfigError {
        ExcludedError::Child {
            item: self.path(),
            name: name.to_string(),
            env: self.env_name(),
        }
        .into()
    }

    /// Nested repeatable collection
    ///
    /// A declared collection with no entries yields an empty view.
    ///
    /// # Errors
    /// Returns [`ExcludedError::Child`] for names that are neither declared
    /// nor present
    pub fn repeatable(&self, name: &str) -> Result<RepeatableView<'cfg>> {
        self.ensure_exists()?;
        let node = self.node();
        let dict = match node.children.get(name) {
            Some(ChildEntry::Repeatable(dict)) => Some(dict),
            Some(ChildEntry::Single(_)) => return Err(self.missing_child(name)),
            None if node.schema.declares_repeatable(name) => None,
            None => return Err(self.missing_child(name)),
        };
        Ok(RepeatableView {
            owner: self.clone(),
            dict,
        })
    }

    pub(crate) fn child_entry(&self, name: &str) -> Option<&'cfg ChildEntry> {
        self.node().children.get(name)
    }

    /// Visible children for the view's env, single children and repeatable
    /// entries in declaration order
    #[must_use]
    pub fn children(&self) -> Vec<ItemView<'cfg>> {
        self.collect_children(false)
    }

    /// Visible children including those excluded for the view's env
    #[must_use]
    pub fn all_children(&self) -> Vec<ItemView<'cfg>> {
        self.collect_children(true)
    }

    fn collect_children(&self, with_excluded: bool) -> Vec<ItemView<'cfg>> {
        let mut out = Vec::new();
        for entry in self.node().children.values() {
            for (_, slot) in entry.slots() {
                let found = slot
                    .resolve(self.env, |id| self.tree.node(id).is_included(self.env))
                    .or_else(|| with_excluded.then_some(slot.item).flatten().map(|id| (id, false)));
                if let Some((id, _)) = found {
                    if !self.tree.node(id).schema.is_hidden() {
                        out.push(self.nested(id));
                    }
                }
            }
        }
        out
    }

    /// Containing item as reached, the proxy owner for proxied views
    #[must_use]
    pub fn contained_in(&self) -> Option<ItemView<'cfg>> {
        let (&id, rest) = self.trail.split_last()?;
        Some(Self {
            tree: self.tree,
            env: self.env,
            id,
            trail: rest.iter().copied().collect(),
        })
    }

    /// Nearest containing item whose schema is or extends `schema_name`
    ///
    /// # Errors
    /// Returns [`ExcludedError::Child`] if there is none
    pub fn find_contained_in(&self, schema_name: &str) -> Result<ItemView<'cfg>> {
        let mut current = self.contained_in();
        while let Some(view) = current {
            if view.schema().is_a(schema_name) {
                return Ok(view);
            }
            current = view.contained_in();
        }
        Err(self.missing_child(schema_name))
    }

    /// Root of the tree
    #[must_use]
    pub fn root(&self) -> ItemView<'cfg> {
        Self::new(self.tree, self.env, ItemId::ROOT)
    }

    /// Builder that produced this item
    #[must_use]
    pub fn built_by(&self) -> Option<ItemView<'cfg>> {
        self.node()
            .built_by
            .map(|id| Self::new(self.tree, self.env, id))
    }

    /// Evaluate a computed property
    ///
    /// # Errors
    /// Returns [`ApiUsageError::UnknownProperty`] for undeclared names and
    /// whatever the property returns
    pub fn property(&self, name: &str) -> Result<Value> {
        self.ensure_exists()?;
        let compute = self
            .node()
            .schema
            .property(name)
            .ok_or_else(|| ApiUsageError::UnknownProperty {
                item: self.path(),
                property: name.to_string(),
            })?;
        compute(self)
    }

    /// The same item read for another env
    ///
    /// # Errors
    /// Returns an error for unknown env names
    pub fn in_env(&self, env: &str) -> Result<ItemView<'cfg>> {
        let env = self.tree.envs.env_named(env)?.id();
        Ok(Self {
            tree: self.tree,
            env,
            id: self.id,
            trail: self.trail.clone(),
        })
    }
}

impl Debug for ItemView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemView")
            .field("path", &self.path())
            .field("env", &self.env_name())
            .field("proxied", &self.is_proxied())
            .finish()
    }
}

/// Read access to a nested repeatable collection
#[derive(Clone)]
pub struct RepeatableView<'cfg> {
    owner: ItemView<'cfg>,
    dict: Option<&'cfg RepeatableDict>,
}

impl<'cfg> RepeatableView<'cfg> {
    fn included(&self) -> impl Fn(ItemId) -> bool + Copy + 'cfg {
        let tree = self.owner.tree;
        let env = self.owner.env;
        move |id| tree.node(id).is_included(env)
    }

    /// Item stored under `key` for the env
    ///
    /// # Errors
    /// Returns [`ExcludedError::Child`] if the key is absent for the env
    pub fn get(&self, key: &str) -> Result<ItemView<'cfg>> {
        let owner = &self.owner;
        self.dict
            .and_then(|dict| dict.get(key))
            .and_then(|slot| slot.resolve(owner.env, self.included()))
            .map(|(id, _)| owner.nested(id))
            .ok_or_else(|| owner.missing_child(key))
    }

    /// True if `key` exists for the env
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }

    /// Entries existing for the env, in key insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&'cfg str, ItemView<'cfg>)> + 'cfg {
        let owner = self.owner.clone();
        let included = self.included();
        self.dict.into_iter().flat_map(move |dict| {
            let owner = owner.clone();
            dict.live(owner.env, included)
                .map(move |(key, id, _)| (key, owner.nested(id)))
        })
    }

    /// Keys existing for the env
    pub fn keys(&self) -> impl Iterator<Item = &'cfg str> + 'cfg {
        self.iter().map(|(key, _)| key)
    }

    /// Number of entries existing for the env
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True if no entry exists for the env
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Item access with no current env, for post-validation
#[derive(Clone, Copy)]
pub struct CrossEnvView<'cfg> {
    tree: &'cfg Tree,
    id: ItemId,
}

impl<'cfg> CrossEnvView<'cfg> {
    pub(crate) fn new(tree: &'cfg Tree, id: ItemId) -> Self {
        Self { tree, id }
    }

    /// Item id
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Dotted path of the item
    #[must_use]
    pub fn path(&self) -> String {
        self.tree.path(self.id)
    }

    /// Item schema
    #[must_use]
    pub fn schema(&self) -> &'cfg ItemSchema {
        &self.tree.node(self.id).schema
    }

    /// Envs the item exists for
    #[must_use]
    pub fn env_mask(&self) -> &'cfg EnvMask {
        &self.tree.node(self.id).included
    }

    /// Names of the envs the item exists for
    #[must_use]
    pub fn env_names(&self) -> Vec<&'cfg str> {
        self.tree
            .envs
            .envs()
            .filter(|env| self.env_mask().contains(env.id().index()))
            .map(Env::name)
            .collect()
    }

    /// Attribute access needs an env here
    ///
    /// # Errors
    /// Always returns [`ApiUsageError::NoCurrentEnv`]
    pub fn attr(&self, name: &str) -> Result<&'cfg Value> {
        Err(ApiUsageError::NoCurrentEnv {
            item: self.path(),
            attr: name.to_string(),
        }
        .into())
    }

    /// Value of an attribute for the named env
    ///
    /// # Errors
    /// Returns the errors of [`ItemView::attr`]
    pub fn attr_in(&self, env: &str, name: &str) -> Result<&'cfg Value> {
        self.in_env(env)?.attr(name)
    }

    /// True if the item exists for the named env
    ///
    /// # Errors
    /// Returns an error for unknown env names
    pub fn exists_in(&self, env: &str) -> Result<bool> {
        let env = self.tree.envs.env_named(env)?;
        Ok(self.tree.node(self.id).is_included(env.id()))
    }

    /// The item read for the named env
    ///
    /// # Errors
    /// Returns an error for unknown env names
    pub fn in_env(&self, env: &str) -> Result<ItemView<'cfg>> {
        let env = self.tree.envs.env_named(env)?.id();
        Ok(ItemView::new(self.tree, env, self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Incoming, Where};
    use crate::item::ItemNode;
    use crate::schema::SchemaBuilder;
    use mcfg_envs::EnvFactory;
    use serde_json::json;
    use std::sync::Arc;

    fn tree() -> (Tree, EnvId, EnvId) {
        let mut envs = EnvFactory::new();
        let dev = envs.env("dev").unwrap();
        let prod = envs.env("prod").unwrap();
        envs.seal().unwrap();
        let root = SchemaBuilder::new("root")
            .attr("name", "app")
            .required_attr("size")
            .repeatables("server")
            .build()
            .unwrap();
        let server = SchemaBuilder::new("server").repeatable().build().unwrap();
        let mut tree = Tree::new(Arc::new(envs), root);
        tree.node_mut(ItemId::ROOT).included.set(dev.index());
        tree.node_mut(ItemId::ROOT).included.set(prod.index());

        let default_group = tree.envs.default_group().unwrap();
        let envs = Arc::clone(&tree.envs);
        let incoming = Incoming {
            value: json!(3).into(),
            where_from: Where::With,
            from_eg: default_group.into(),
            force: false,
        };
        tree.node_mut(ItemId::ROOT)
            .attributes
            .entry("size".into())
            .or_default()
            .set(&envs, dev, incoming)
            .unwrap();

        for key in ["b", "a"] {
            let mut node = ItemNode::new(Arc::clone(&server), Some(key.into()), Some(ItemId::ROOT));
            node.included.set(dev.index());
            if key == "a" {
                node.included.set(prod.index());
            }
            let id = tree.push(node);
            tree.attach(ItemId::ROOT, id);
        }
        (tree, dev, prod)
    }

    #[test]
    fn attr_reads_value_default_or_missing() {
        let (tree, dev, prod) = tree();
        let root = ItemView::new(&tree, dev, ItemId::ROOT);
        assert_eq!(root.attr("size").unwrap(), &json!(3));
        assert_eq!(root.attr("name").unwrap(), &json!("app"));
        assert_eq!(root.attr_as::<u32>("size").unwrap(), 3);

        let in_prod = root.in_env("prod").unwrap();
        assert!(in_prod.attr("size").unwrap_err().is_excluded());
        assert!(ItemView::new(&tree, prod, ItemId::ROOT).attr("nope").unwrap_err().is_definition());
    }

    #[test]
    fn repeatable_iteration_is_per_env() {
        let (tree, dev, prod) = tree();
        let keys: Vec<&str> = ItemView::new(&tree, dev, ItemId::ROOT)
            .repeatable("server")
            .unwrap()
            .keys()
            .collect();
        assert_eq!(keys, ["b", "a"]);

        let servers = ItemView::new(&tree, prod, ItemId::ROOT).repeatable("server").unwrap();
        assert_eq!(servers.len(), 1);
        assert!(!servers.contains_key("b"));
        assert!(servers.get("b").unwrap_err().is_excluded());
        assert_eq!(servers.get("a").unwrap().contained_in().unwrap().id(), ItemId::ROOT);
    }

    #[test]
    fn cross_env_view_needs_explicit_env() {
        let (tree, _, _) = tree();
        let view = CrossEnvView::new(&tree, ItemId::ROOT);
        assert!(view.attr("size").unwrap_err().is_api_usage());
        assert_eq!(view.attr_in("dev", "size").unwrap(), &json!(3));
        assert_eq!(view.env_names(), ["dev", "prod"]);
        assert!(view.exists_in("prod").unwrap());
    }
}
