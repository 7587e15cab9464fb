//! Build scopes
//!
//! A [`Scope`] is the handle user code receives while an item is being
//! built for one env. It carries the explicit [`BuildContext`] (the tree
//! under construction and the env being built) and exposes attribute
//! setting, child construction and read access to the item.

use crate::attribute::{decide, Incoming, SetDecision};
use crate::config::LoadOptions;
use crate::error::{ApiUsageError, ConfigError, DefinitionError, Result};
use crate::item::ItemId;
use crate::registry::Registration;
use crate::schema::{ItemSchema, ScopeHook};
use crate::state_machine::ItemState;
use crate::tree::Tree;
use crate::value::{McValue, TypeCheck, ValueKind};
use crate::view::ItemView;
use mcfg_envs::{Env, EnvError, EnvId, EnvKey};
use serde_json::Value;
use std::sync::Arc;

/// Result of constructing an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    /// Item built and frozen for the current env
    Completed(ItemId),
    /// Item excluded for the current env, its body was skipped
    Excluded(ItemId),
}

impl ScopeOutcome {
    /// Id of the constructed item
    #[inline]
    #[must_use]
    pub fn id(self) -> ItemId {
        match self {
            Self::Completed(id) | Self::Excluded(id) => id,
        }
    }

    /// True if the item was excluded for the current env
    #[inline]
    #[must_use]
    pub fn is_excluded(self) -> bool {
        matches!(self, Self::Excluded(_))
    }
}

/// Construction request for a child item
///
/// ```rust
/// use mcfg_core::scope::ItemCall;
/// use mcfg_core::schema::SchemaBuilder;
///
/// let server = SchemaBuilder::new("server").repeatable().required_attr("port").build().unwrap();
/// let call = ItemCall::keyed(&server, "web").arg("port", 8080).exclude(["dev"]);
/// assert_eq!(call.key(), Some("web"));
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct ItemCall {
    pub(crate) schema: Arc<ItemSchema>,
    pub(crate) key: Option<String>,
    pub(crate) args: Vec<(String, McValue)>,
    pub(crate) include: Vec<String>,
    pub(crate) exclude: Vec<String>,
}

impl ItemCall {
    /// Single item of `schema`
    pub fn new(schema: &Arc<ItemSchema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            key: None,
            args: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Repeatable item of `schema` stored under `key`
    pub fn keyed(schema: &Arc<ItemSchema>, key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::new(schema)
        }
    }

    /// Init argument, applied for all envs in the init phase
    pub fn arg(mut self, name: &str, value: impl Into<McValue>) -> Self {
        self.args.push((name.to_string(), value.into()));
        self
    }

    /// Envs or groups the item is handled for
    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(names.into_iter().map(Into::into));
        self
    }

    /// Envs or groups the item is not handled for
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    /// Key of a repeatable item
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// Attribute setting with per-env values
///
/// The value of the most specific env or group covering the env being
/// built is used. `default` covers all envs.
#[derive(Debug, Clone)]
#[must_use]
pub struct SetAttr {
    pub(crate) name: String,
    pub(crate) values: Vec<(String, McValue)>,
    pub(crate) force: bool,
    pub(crate) unknown: bool,
}

impl SetAttr {
    /// Start a setting of attribute `name`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: Vec::new(),
            force: false,
            unknown: false,
        }
    }

    /// Value for all envs, through the implicit `default` group
    pub fn default(self, value: impl Into<McValue>) -> Self {
        self.env(mcfg_envs::DEFAULT_GROUP, value)
    }

    /// Value for an env or group
    pub fn env(mut self, name: &str, value: impl Into<McValue>) -> Self {
        self.values.push((name.to_string(), value.into()));
        self
    }

    /// Override whatever is stored, regardless of phase and specificity
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Allow an attribute the schema does not declare
    pub fn unknown(mut self) -> Self {
        self.unknown = true;
        self
    }
}

/// Builder expansion in progress
#[derive(Debug)]
pub(crate) struct BuildFrame {
    pub(crate) builder: ItemId,
    pub(crate) produced: Vec<ItemId>,
}

/// State of one env pass over the tree
pub(crate) struct BuildContext {
    pub(crate) tree: Tree,
    pub(crate) env: EnvId,
    pub(crate) env_info: Env,
    pub(crate) options: LoadOptions,
    pub(crate) type_check: Arc<dyn TypeCheck>,
    pub(crate) frames: Vec<BuildFrame>,
}

impl BuildContext {
    pub(crate) fn new(tree: Tree, env: &Env, options: LoadOptions, type_check: Arc<dyn TypeCheck>) -> Self {
        Self {
            tree,
            env: env.id(),
            env_info: env.clone(),
            options,
            type_check,
            frames: Vec::new(),
        }
    }

    pub(crate) fn into_tree(self) -> Tree {
        self.tree
    }

    /// Record an error on `id` and hand it back for propagation
    pub(crate) fn fail(&mut self, id: ItemId, err: impl Into<ConfigError>) -> ConfigError {
        let err = err.into();
        self.tree.node_mut(id).errors += 1;
        self.tree.errors += 1;
        tracing::error!("{} (env '{}')", err, self.env_info.name());
        err
    }

    /// Wrap a user hook failure with the item and hook it came from
    pub(crate) fn hook_failed(&mut self, id: ItemId, hook: &'static str, err: ConfigError) -> ConfigError {
        match err {
            ConfigError::Definition(DefinitionError::Invalid(message)) => {
                let item = self.tree.path(id);
                self.fail(id, DefinitionError::Hook { item, hook, message })
            }
            // Errors from nested calls were recorded where they happened
            other => other,
        }
    }

    /// Run the user build function in the root scope
    pub(crate) fn run_root(&mut self, build: &ScopeHook) -> Result<()> {
        let root = ItemId::ROOT;
        let env = self.env;
        if self.tree.node(root).state.is_frozen() {
            self.tree.transition(root, ItemState::InReInit)?;
        }
        {
            let node = self.tree.node_mut(root);
            node.seen.set(env.index());
            node.included.set(env.index());
            node.errors = 0;
        }
        self.enter_scope(root, build.as_ref())
    }

    /// Enter the scope of a registered item, run its body and exit
    pub(crate) fn enter_scope<F>(&mut self, id: ItemId, body: F) -> Result<()>
    where
        F: FnOnce(&mut Scope<'_>) -> Result<()>,
    {
        let state = self.tree.node(id).state;
        let Some(scope_state) = state.scope_state() else {
            let item = self.tree.path(id);
            return Err(self.fail(
                id,
                DefinitionError::IllegalState {
                    item,
                    action: "enter the item scope",
                    state,
                },
            ));
        };
        self.tree.transition(id, scope_state)?;

        if let Err(err) = body(&mut Scope::new(self, id)) {
            self.abort_item(id);
            return Err(err);
        }
        self.exit_scope(id)
    }

    /// Scope exit: builder expansion, hooks, value and child checks, freeze
    fn exit_scope(&mut self, id: ItemId) -> Result<()> {
        let schema = Arc::clone(&self.tree.node(id).schema);

        if schema.is_builder() {
            self.tree.transition(id, ItemState::InMcBuild)?;
            if let Err(err) = self.expand_builder(id) {
                self.abort_item(id);
                return Err(err);
            }
        }

        self.tree.transition(id, ItemState::InMcInit)?;
        if !self.tree.node(id).is_shared() {
            for hook in schema.mc_init_hooks() {
                if let Err(err) = hook(&mut Scope::new(self, id)) {
                    let err = self.hook_failed(id, "mc_init", err);
                    self.abort_item(id);
                    return Err(err);
                }
            }
        }

        let mut first = None;
        if !self.tree.node(id).is_shared() {
            if let Err(err) = self.resolve_missing_values(id) {
                first.get_or_insert(err);
            }
            // Items produced by a running builder get their children once its proxies are in
            if first.is_none() && !self.is_being_produced(id) {
                if let Err(err) = self.backfill_children(id).and_then(|()| self.check_required_children(id)) {
                    first.get_or_insert(err);
                }
            }
        }
        self.track_todo(id);

        if let Some(err) = first {
            self.abort_item(id);
            return Err(err);
        }

        let env = self.env;
        let failed_children = self.failed_children(id, env);
        let count = self.tree.node(id).errors + failed_children;
        if count > 0 {
            self.tree.node_mut(id).errors = count;
            self.abort_item(id);
            return Err(DefinitionError::ItemFailed {
                item: self.tree.path(id),
                count,
            }
            .into());
        }

        self.tree.transition(id, ItemState::Frozen)?;
        self.tree.node_mut(id).pending.clear();
        tracing::debug!("Froze {} for env '{}'", self.tree.path(id), self.env_info.name());
        Ok(())
    }

    /// Freeze an item whose scope failed so later envs can re-enter it
    fn abort_item(&mut self, id: ItemId) {
        let node = self.tree.node_mut(id);
        node.errors = node.errors.max(1);
        node.state = ItemState::Frozen;
        node.pending.clear();
    }

    fn failed_children(&self, id: ItemId, env: EnvId) -> usize {
        self.tree
            .node(id)
            .children
            .values()
            .flat_map(|entry| entry.slots().into_iter().filter_map(|(_, slot)| slot.item))
            .filter(|child| {
                let node = self.tree.node(*child);
                node.was_seen(env) && node.errors > 0
            })
            .count()
    }

    fn is_being_produced(&self, id: ItemId) -> bool {
        self.frames.iter().any(|f| f.produced.contains(&id))
    }

    /// Record todo values of the current env
    fn track_todo(&mut self, id: ItemId) {
        let env = self.env;
        let todo: Vec<String> = self
            .tree
            .node(id)
            .attributes
            .iter()
            .filter(|(_, value)| matches!(value.value(env), Some(McValue::Todo)))
            .map(|(name, _)| name.clone())
            .collect();
        if todo.is_empty() {
            return;
        }
        let path = self.tree.path(id);
        for attr in todo {
            let full = format!("{path}.{attr}");
            if self.env_info.allow_todo() {
                tracing::warn!("Todo value for {} tolerated in env '{}'", full, self.env_info.name());
                self.tree.warnings += 1;
            }
            self.tree.todo.entry(env).or_default().push(full);
        }
    }

    /// Apply a setting to `id` for the current env
    pub(crate) fn apply_setattr(&mut self, id: ItemId, set: SetAttr) -> Result<()> {
        let envs = Arc::clone(&self.tree.envs);
        let mut keys: Vec<EnvKey> = Vec::with_capacity(set.values.len());
        for (selector, _) in &set.values {
            let key = envs.key(selector).map_err(|e| self.fail(id, e))?;
            if keys.contains(&key) {
                return Err(self.fail(
                    id,
                    DefinitionError::DuplicateEnvSelector {
                        attr: set.name.clone(),
                        key: selector.clone(),
                    },
                ));
            }
            keys.push(key);
        }

        let chosen = envs
            .resolve_most_specific(keys.iter().copied(), self.env)
            .map_err(|e| self.fail(id, e))?;
        let Some(chosen) = chosen else {
            return Ok(());
        };
        let Some(index) = keys.iter().position(|k| *k == chosen) else {
            return Ok(());
        };
        let SetAttr {
            name,
            mut values,
            force,
            unknown,
        } = set;
        let value = values.swap_remove(index).1;
        self.set_env_value(id, &name, value, chosen, force, unknown)
    }

    /// Single entry point for attribute writes during a build
    pub(crate) fn set_env_value(
        &mut self,
        id: ItemId,
        attr: &str,
        value: McValue,
        from_eg: EnvKey,
        force: bool,
        unknown: bool,
    ) -> Result<()> {
        if self.tree.loaded {
            return Err(ApiUsageError::MutationAfterLoad {
                item: self.tree.path(id),
            }
            .into());
        }
        let node = self.tree.node(id);
        let schema = Arc::clone(&node.schema);
        let Some(where_from) = node.state.phase() else {
            let item = self.tree.path(id);
            return Err(self.fail(
                id,
                DefinitionError::AttributeFrozen {
                    item,
                    attr: attr.to_string(),
                },
            ));
        };

        let decl = schema.attribute(attr);
        if decl.is_none() && self.options.strict_attributes && !unknown && !node.is_shared() {
            let item = self.tree.path(id);
            return Err(self.fail(
                id,
                DefinitionError::UnknownAttribute {
                    item,
                    attr: attr.to_string(),
                },
            ));
        }

        let kind = decl.map_or(ValueKind::Any, |d| d.kind());
        self.store(
            id,
            attr,
            Incoming {
                value,
                where_from,
                from_eg,
                force,
            },
            Some(kind),
        )
    }

    /// Write through the attribute store's conflict resolution
    ///
    /// With `kind` given, a plain value is type checked once it is accepted
    /// and before it is stored.
    pub(crate) fn store(&mut self, id: ItemId, attr: &str, incoming: Incoming, kind: Option<ValueKind>) -> Result<()> {
        let envs = Arc::clone(&self.tree.envs);
        let env = self.env;
        let from_eg = incoming.from_eg;
        let existing = self.tree.node(id).attributes.get(attr).and_then(|v| v.get(env));
        let decided = decide(&envs, env, existing, &incoming);
        let decision = decided.map_err(|e| self.fail(id, e))?;

        match decision {
            SetDecision::Accepted => {
                if let (Some(kind), McValue::Value(plain)) = (kind, &incoming.value) {
                    let schema = Arc::clone(&self.tree.node(id).schema);
                    if let Some(message) = self.type_check.check(schema.name(), attr, kind, plain) {
                        let item = self.tree.path(id);
                        return Err(self.fail(
                            id,
                            DefinitionError::TypeMismatch {
                                item,
                                attr: attr.to_string(),
                                message,
                            },
                        ));
                    }
                }
                let placeholder = incoming.value.is_placeholder();
                let node = self.tree.node_mut(id);
                node.attributes.entry(attr.to_string()).or_default().insert(env, incoming);
                if placeholder {
                    node.pending.insert(attr.to_string());
                }
                Ok(())
            }
            SetDecision::Kept => Ok(()),
            SetDecision::Redefined => {
                let item = self.tree.path(id);
                let from = envs.key_name(from_eg).unwrap_or_default().to_string();
                Err(self.fail(
                    id,
                    DefinitionError::AttributeRedefined {
                        item,
                        attr: attr.to_string(),
                        env: self.env_info.name().to_string(),
                        from,
                    },
                ))
            }
        }
    }

    /// True if `target` is `scope` or was built inside it
    fn is_within(&self, target: ItemId, scope: ItemId) -> bool {
        let mut current = Some(target);
        while let Some(id) = current {
            let node = self.tree.node(id);
            if id == scope || node.built_by == Some(scope) {
                return true;
            }
            current = node.parent;
        }
        false
    }

    /// Construct a child item from the scope of `scope_item`
    pub(crate) fn construct<F>(&mut self, scope_item: ItemId, call: ItemCall, body: F) -> Result<ScopeOutcome>
    where
        F: FnOnce(&mut Scope<'_>) -> Result<()>,
    {
        let selected = match self.selects_env(&call) {
            Ok(selected) => selected,
            Err(err) => return Err(self.fail(scope_item, err)),
        };
        let id = match self.register(scope_item, &call, selected)? {
            Registration::Entered(id) => id,
            Registration::Skipped(id) => {
                tracing::debug!(
                    "Skipped alternative definition of {} for env '{}'",
                    self.tree.path(id),
                    self.env_info.name()
                );
                return Ok(ScopeOutcome::Excluded(id));
            }
        };

        if !selected {
            self.tree.node_mut(id).included.clear(self.env.index());
            self.tree.transition(id, ItemState::Frozen)?;
            tracing::debug!(
                "Excluded {} for env '{}'",
                self.tree.path(id),
                self.env_info.name()
            );
            return Ok(ScopeOutcome::Excluded(id));
        }

        let default_group = self.tree.envs.default_group().map_err(|e| self.fail(id, e))?;
        for (name, value) in call.args {
            if let Err(err) = self.set_env_value(id, &name, value, default_group.into(), false, false) {
                self.abort_item(id);
                return Err(err);
            }
        }

        self.enter_scope(id, body)?;
        Ok(ScopeOutcome::Completed(id))
    }

    /// True if the call's include and exclude lists select the current env
    fn selects_env(&self, call: &ItemCall) -> std::result::Result<bool, EnvError> {
        if call.include.is_empty() && call.exclude.is_empty() {
            return Ok(true);
        }
        let envs = &self.tree.envs;
        let resolve = |names: &[String]| -> std::result::Result<Vec<EnvKey>, EnvError> {
            names.iter().map(|n| envs.key(n)).collect()
        };
        let include = resolve(&call.include)?;
        let exclude = resolve(&call.exclude)?;
        envs.select_env_list(self.env, &exclude, &include)
    }
}

/// Handle to an item being built for one env
pub struct Scope<'a> {
    ctx: &'a mut BuildContext,
    item: ItemId,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(ctx: &'a mut BuildContext, item: ItemId) -> Self {
        Self { ctx, item }
    }

    /// Id of the item
    #[inline]
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.item
    }

    /// Env being built
    #[inline]
    #[must_use]
    pub fn env(&self) -> &Env {
        &self.ctx.env_info
    }

    /// Lifecycle state of the item
    #[must_use]
    pub fn state(&self) -> ItemState {
        self.ctx.tree.node(self.item).state
    }

    /// Dotted path of the item
    #[must_use]
    pub fn path(&self) -> String {
        self.ctx.tree.path(self.item)
    }

    /// Read access to the item for the current env
    #[must_use]
    pub fn view(&self) -> ItemView<'_> {
        ItemView::new(&self.ctx.tree, self.ctx.env, self.item)
    }

    /// Current value of an attribute
    ///
    /// # Errors
    /// Returns an error if the attribute has no value for the env
    pub fn get(&self, attr: &str) -> Result<Value> {
        self.view().attr(attr).cloned()
    }

    /// Set an attribute for all envs
    ///
    /// # Errors
    /// Returns definition errors from conflict resolution and type checking
    pub fn set(&mut self, attr: &str, value: impl Into<McValue>) -> Result<()> {
        self.setattr(SetAttr::new(attr).default(value))
    }

    /// Apply a per-env setting to the item
    ///
    /// # Errors
    /// Returns definition errors from selector resolution, conflict
    /// resolution and type checking
    pub fn setattr(&mut self, set: SetAttr) -> Result<()> {
        self.ctx.apply_setattr(self.item, set)
    }

    /// Apply a per-env setting to an item built inside this scope
    ///
    /// # Errors
    /// Returns [`DefinitionError::IllegalState`] for items outside this scope
    /// and [`DefinitionError::AttributeFrozen`] for frozen items
    pub fn setattr_on(&mut self, target: ItemId, set: SetAttr) -> Result<()> {
        if !self.ctx.is_within(target, self.item) {
            let item = self.ctx.tree.path(target);
            let state = self.ctx.tree.node(target).state;
            return Err(self.ctx.fail(
                self.item,
                DefinitionError::IllegalState {
                    item,
                    action: "set attributes from an unrelated scope",
                    state,
                },
            ));
        }
        self.ctx.apply_setattr(target, set)
    }

    /// Construct a child item and run `body` in its scope
    ///
    /// # Errors
    /// Returns the first error raised while building the item
    pub fn item<F>(&mut self, call: ItemCall, body: F) -> Result<ScopeOutcome>
    where
        F: FnOnce(&mut Scope<'_>) -> Result<()>,
    {
        self.ctx.construct(self.item, call, body)
    }

    /// Construct a child item with an empty scope body
    ///
    /// # Errors
    /// Returns the first error raised while building the item
    pub fn add(&mut self, call: ItemCall) -> Result<ScopeOutcome> {
        self.item(call, |_| Ok(()))
    }

    /// Declare shared default items for the descendants of this item
    ///
    /// Must precede the items it provides defaults for.
    ///
    /// # Errors
    /// Returns the first error raised while building the default items
    pub fn default_items<F>(&mut self, body: F) -> Result<ScopeOutcome>
    where
        F: FnOnce(&mut Scope<'_>) -> Result<()>,
    {
        self.item(ItemCall::new(&ItemSchema::default_items()), body)
    }

    /// Real child item stored under `name` and `key`, whatever its envs
    #[must_use]
    pub fn child_id(&self, name: &str, key: Option<&str>) -> Option<ItemId> {
        self.ctx.tree.real_child(self.item, name, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;
    use crate::value::KindCheck;
    use mcfg_envs::EnvFactory;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> BuildContext {
        let mut envs = EnvFactory::new();
        let prod = envs.env("prod").unwrap();
        let pp = envs.env("pp").unwrap();
        envs.group("g_ppr", &[prod.into(), pp.into()]).unwrap();
        envs.seal().unwrap();
        let env = envs.env_named("prod").unwrap().clone();
        let root = SchemaBuilder::new("root")
            .required_attr("size")
            .attr("name", "x")
            .build()
            .unwrap();
        let tree = Tree::new(Arc::new(envs), root);
        BuildContext::new(tree, &env, LoadOptions::default(), Arc::new(KindCheck))
    }

    fn in_scope(ctx: &mut BuildContext) {
        ctx.tree.node_mut(ItemId::ROOT).state = ItemState::InWith;
    }

    #[test]
    fn setattr_picks_most_specific_selector() {
        let mut ctx = context();
        in_scope(&mut ctx);
        let set = SetAttr::new("size").env("g_ppr", 10).env("prod", 20);
        ctx.apply_setattr(ItemId::ROOT, set).unwrap();
        assert_eq!(
            ctx.tree.node(ItemId::ROOT).attributes["size"].value(ctx.env),
            Some(&McValue::Value(json!(20)))
        );
    }

    #[test]
    fn duplicate_selector_rejected() {
        let mut ctx = context();
        in_scope(&mut ctx);
        let err = ctx
            .apply_setattr(ItemId::ROOT, SetAttr::new("size").env("prod", 1).env("prod", 2))
            .unwrap_err();
        assert!(matches!(
            err.as_definition(),
            Some(DefinitionError::DuplicateEnvSelector { .. })
        ));
        assert_eq!(ctx.tree.errors(), 1);
    }

    #[test]
    fn frozen_item_rejects_writes() {
        let mut ctx = context();
        ctx.tree.node_mut(ItemId::ROOT).state = ItemState::Frozen;
        let err = ctx
            .apply_setattr(ItemId::ROOT, SetAttr::new("size").default(1))
            .unwrap_err();
        assert!(matches!(
            err.as_definition(),
            Some(DefinitionError::AttributeFrozen { .. })
        ));
    }

    #[test]
    fn unknown_attribute_needs_flag() {
        let mut ctx = context();
        in_scope(&mut ctx);
        assert!(ctx.apply_setattr(ItemId::ROOT, SetAttr::new("nope").default(1)).is_err());
        ctx.apply_setattr(ItemId::ROOT, SetAttr::new("nope").default(1).unknown())
            .unwrap();
    }

    #[test]
    fn selector_not_covering_env_is_noop() {
        let mut ctx = context();
        in_scope(&mut ctx);
        ctx.apply_setattr(ItemId::ROOT, SetAttr::new("size").env("pp", 3)).unwrap();
        assert!(ctx.tree.node(ItemId::ROOT).attributes.get("size").is_none());
    }

    #[test]
    fn required_placeholder_is_pending() {
        let mut ctx = context();
        in_scope(&mut ctx);
        ctx.apply_setattr(ItemId::ROOT, SetAttr::new("size").default(McValue::Required))
            .unwrap();
        assert!(ctx.tree.node(ItemId::ROOT).pending.contains("size"));
    }

    struct CountingCheck(Arc<AtomicUsize>);

    impl TypeCheck for CountingCheck {
        fn check(&self, _schema: &str, _attr: &str, _kind: ValueKind, _value: &Value) -> Option<String> {
            self.0.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    #[test]
    fn type_check_skips_discarded_writes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ctx = context();
        ctx.type_check = Arc::new(CountingCheck(Arc::clone(&calls)));
        in_scope(&mut ctx);
        ctx.apply_setattr(ItemId::ROOT, SetAttr::new("size").env("prod", 20)).unwrap();
        // A lower phase never replaces the scope body value
        ctx.tree.node_mut(ItemId::ROOT).state = ItemState::InMcInit;
        ctx.apply_setattr(ItemId::ROOT, SetAttr::new("size").env("g_ppr", 10)).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(
            ctx.tree.node(ItemId::ROOT).attributes["size"].value(ctx.env),
            Some(&McValue::Value(json!(20)))
        );
    }

    #[test]
    fn loaded_tree_rejects_mutation() {
        let mut ctx = context();
        in_scope(&mut ctx);
        ctx.tree.loaded = true;
        let err = ctx.apply_setattr(ItemId::ROOT, SetAttr::new("size").default(1)).unwrap_err();
        assert!(err.is_api_usage());
    }
}
