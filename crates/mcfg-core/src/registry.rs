//! Item identity and containment
//!
//! Decides, for every construction inside a scope, where the item is stored,
//! whether it is a new item or the re-entry of an item built for an earlier
//! env, and whether its repeatable-ness matches the declarations.

use crate::error::{DefinitionError, Result};
use crate::item::{ItemId, ItemNode};
use crate::schema::ItemSchema;
use crate::scope::{BuildContext, ItemCall};
use crate::state_machine::ItemState;
use std::sync::Arc;

/// Result of registering a construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    /// New item in `InInit` or re-entered item in `InReInit`, marked as seen
    /// and included for the current env
    Entered(ItemId),
    /// Alternative definition not selecting the current env, while another
    /// definition of the item is live for it
    Skipped(ItemId),
}

impl BuildContext {
    /// Register the item requested by `call` from the scope of `scope_item`
    ///
    /// `selected` tells whether the call's include and exclude lists select
    /// the current env.
    pub(crate) fn register(&mut self, scope_item: ItemId, call: &ItemCall, selected: bool) -> Result<Registration> {
        let state = self.tree.node(scope_item).state;
        if !state.accepts_children() {
            let item = self.tree.path(scope_item);
            return Err(self.fail(
                scope_item,
                DefinitionError::IllegalState {
                    item,
                    action: "construct child items",
                    state,
                },
            ));
        }

        let target = self.registration_target(scope_item);
        let built_by = (target != scope_item).then_some(scope_item);
        let key = call.key.as_deref();

        if let Err(err) = self.check_declaration(target, &call.schema, key) {
            return Err(self.fail(scope_item, err));
        }

        let env = self.env;
        let id = match self.tree.real_child(target, call.schema.name(), key) {
            None => self.create(target, &call.schema, call.key.clone(), built_by),
            Some(existing) if self.tree.node(existing).is_included(env) => {
                if !selected {
                    return Ok(Registration::Skipped(existing));
                }
                let err = DefinitionError::RepeatedItem {
                    key: key.unwrap_or(call.schema.name()).to_string(),
                    schema: call.schema.name().to_string(),
                    parent: self.tree.path(target),
                };
                return Err(self.fail(scope_item, err));
            }
            // Not handled for this env, or only excluded by an earlier definition
            Some(existing) => {
                self.tree.transition(existing, ItemState::InReInit)?;
                let node = self.tree.node_mut(existing);
                node.errors = 0;
                node.pending.clear();
                for value in node.attributes.values_mut() {
                    value.clear_env(env);
                }
                tracing::debug!("Re-entered {} for env '{}'", self.tree.path(existing), self.env_info.name());
                existing
            }
        };

        let node = self.tree.node_mut(id);
        node.seen.set(env.index());
        node.included.set(env.index());

        if let Some(builder) = built_by {
            if let Some(frame) = self.frames.iter_mut().rev().find(|f| f.builder == builder) {
                frame.produced.push(id);
            }
        }
        Ok(Registration::Entered(id))
    }

    /// Container the item is stored in: a builder running its deferred
    /// build stores its products in its own container
    fn registration_target(&self, scope_item: ItemId) -> ItemId {
        let mut target = scope_item;
        loop {
            let node = self.tree.node(target);
            match node.parent {
                Some(parent) if node.schema.is_builder() && node.state == ItemState::InMcBuild => {
                    target = parent;
                }
                _ => return target,
            }
        }
    }

    fn create(
        &mut self,
        parent: ItemId,
        schema: &Arc<ItemSchema>,
        key: Option<String>,
        built_by: Option<ItemId>,
    ) -> ItemId {
        let parent_node = self.tree.node(parent);
        let in_defaults = parent_node.is_shared();
        let mut node = ItemNode::new(Arc::clone(schema), key, Some(parent));
        node.built_by = built_by;
        node.in_defaults = in_defaults;
        let id = self.tree.push(node);
        self.tree.attach(parent, id);
        tracing::debug!("Created {} for env '{}'", self.tree.path(id), self.env_info.name());
        id
    }

    /// Check the child against the declarations of the parent schema
    pub(crate) fn check_declaration(
        &self,
        parent: ItemId,
        schema: &ItemSchema,
        key: Option<&str>,
    ) -> Result<(), DefinitionError> {
        let parent_node = self.tree.node(parent);
        let parent_schema = &parent_node.schema;
        let name = schema.name();
        let mismatch = |reason: &str| DefinitionError::RepeatableMismatch {
            name: name.to_string(),
            parent: self.tree.path(parent),
            reason: reason.to_string(),
        };

        match (schema.is_repeatable(), key) {
            (true, None) => return Err(mismatch("repeatable item constructed without a key")),
            (false, Some(_)) => return Err(mismatch("single item constructed with a key")),
            _ => {}
        }

        if let Some(entry) = parent_node.children.get(name) {
            if entry.is_repeatable() != schema.is_repeatable() {
                return Err(mismatch("used both as single and repeatable item"));
            }
        }

        if schema.is_hidden() || parent_schema.allows_any_child() {
            return Ok(());
        }

        if schema.is_repeatable() {
            if parent_schema.declared_child(name).is_some() {
                return Err(mismatch("declared as single child, used as repeatable"));
            }
            if !parent_schema.declares_repeatable(name) {
                return Err(DefinitionError::UndeclaredChild {
                    name: name.to_string(),
                    parent: self.tree.path(parent),
                });
            }
        } else if parent_schema.declares_repeatable(name) {
            return Err(mismatch("declared repeatable, used as single child"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadOptions;
    use crate::schema::SchemaBuilder;
    use crate::tree::Tree;
    use crate::value::KindCheck;
    use mcfg_envs::EnvFactory;

    struct Fixture {
        ctx: BuildContext,
        server: Arc<ItemSchema>,
        log: Arc<ItemSchema>,
    }

    fn fixture() -> Fixture {
        let mut envs = EnvFactory::new();
        envs.env("dev").unwrap();
        envs.env("prod").unwrap();
        envs.seal().unwrap();
        let dev = envs.env_named("dev").unwrap().clone();
        let root = SchemaBuilder::new("root").repeatables("server").build().unwrap();
        let server = SchemaBuilder::new("server").repeatable().build().unwrap();
        let log = SchemaBuilder::new("log").build().unwrap();
        let mut tree = Tree::new(Arc::new(envs), root);
        tree.node_mut(ItemId::ROOT).state = ItemState::InWith;
        Fixture {
            ctx: BuildContext::new(tree, &dev, LoadOptions::default(), Arc::new(KindCheck)),
            server,
            log,
        }
    }

    fn entered(f: &mut Fixture, call: &ItemCall) -> ItemId {
        match f.ctx.register(ItemId::ROOT, call, true).unwrap() {
            Registration::Entered(id) => id,
            other => panic!("unexpected registration: {other:?}"),
        }
    }

    #[test]
    fn new_item_is_registered_under_key() {
        let mut f = fixture();
        let call = ItemCall::keyed(&f.server, "a");
        let id = entered(&mut f, &call);
        assert_eq!(f.ctx.tree.node(id).state, ItemState::InInit);
        assert_eq!(f.ctx.tree.path(id), "root.server[a]");
        assert_eq!(f.ctx.tree.real_child(ItemId::ROOT, "server", Some("a")), Some(id));
    }

    #[test]
    fn same_key_twice_in_one_env_is_repeated() {
        let mut f = fixture();
        let call = ItemCall::keyed(&f.server, "a");
        entered(&mut f, &call);
        let err = f
            .ctx
            .register(ItemId::ROOT, &ItemCall::keyed(&f.server, "a"), true)
            .unwrap_err();
        assert!(matches!(
            err.as_definition(),
            Some(DefinitionError::RepeatedItem { key, .. }) if key == "a"
        ));
    }

    #[test]
    fn frozen_item_is_re_entered_for_next_env() {
        let mut f = fixture();
        let call = ItemCall::new(&f.log);
        let id = entered(&mut f, &call);
        f.ctx.tree.node_mut(id).state = ItemState::Frozen;

        let prod = f.ctx.tree.envs.env_named("prod").unwrap().clone();
        f.ctx.env = prod.id();
        f.ctx.env_info = prod;
        let call = ItemCall::new(&f.log);
        let again = entered(&mut f, &call);
        assert_eq!(again, id);
        assert_eq!(f.ctx.tree.node(id).state, ItemState::InReInit);
    }

    #[test]
    fn excluded_item_is_re_entered_by_alternative_definition() {
        let mut f = fixture();
        let call = ItemCall::new(&f.log);
        let id = entered(&mut f, &call);
        let env = f.ctx.env;
        let node = f.ctx.tree.node_mut(id);
        node.included.clear(env.index());
        node.state = ItemState::Frozen;

        let call = ItemCall::new(&f.log);

        let again = entered(&mut f, &call);
        assert_eq!(again, id);
        assert_eq!(f.ctx.tree.node(id).state, ItemState::InReInit);
        assert!(f.ctx.tree.node(id).is_included(env));
    }

    #[test]
    fn unselected_definition_is_skipped_when_item_is_live() {
        let mut f = fixture();
        let call = ItemCall::new(&f.log);
        let id = entered(&mut f, &call);
        let skipped = f.ctx.register(ItemId::ROOT, &ItemCall::new(&f.log), false).unwrap();
        assert_eq!(skipped, Registration::Skipped(id));
        assert_eq!(f.ctx.tree.node(id).state, ItemState::InInit);
    }

    #[test]
    fn repeatable_usage_must_match() {
        let f = fixture();
        let err = f
            .ctx
            .check_declaration(ItemId::ROOT, &f.server, None)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::RepeatableMismatch { .. }));

        let undeclared = SchemaBuilder::new("other").repeatable().build().unwrap();
        let err = f
            .ctx
            .check_declaration(ItemId::ROOT, &undeclared, Some("x"))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UndeclaredChild { .. }));
    }

    #[test]
    fn frozen_scope_cannot_construct() {
        let mut f = fixture();
        f.ctx.tree.node_mut(ItemId::ROOT).state = ItemState::Frozen;
        let err = f.ctx.register(ItemId::ROOT, &ItemCall::new(&f.log), true).unwrap_err();
        assert!(matches!(
            err.as_definition(),
            Some(DefinitionError::IllegalState { .. })
        ));
    }
}
