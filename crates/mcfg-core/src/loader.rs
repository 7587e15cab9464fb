//! Multi-env loading
//!
//! Builds the item tree once per env, validates each env, then freezes the
//! tree for good and runs the cross-env validation pass.

use crate::config::{ConfigDef, LoadOptions};
use crate::error::{ConfigError, DefinitionError, EnvFailure, Result};
use crate::item::ItemId;
use crate::scope::BuildContext;
use crate::tree::Tree;
use crate::view::{CrossEnvView, ItemView};
use mcfg_envs::EnvId;
use std::sync::Arc;

/// Drives the env passes of one load
pub(crate) struct Loader<'a> {
    def: &'a ConfigDef,
    options: &'a LoadOptions,
}

impl<'a> Loader<'a> {
    pub(crate) fn new(def: &'a ConfigDef, options: &'a LoadOptions) -> Self {
        Self { def, options }
    }

    /// Build `envs` in order into one tree
    pub(crate) fn load(&self, envs: &[EnvId]) -> Result<Tree> {
        let mut tree = Tree::new(Arc::clone(&self.def.envs), Arc::clone(&self.def.root));
        let mut failures = Vec::new();

        for env in envs {
            let (built, result) = self.load_env(tree, *env);
            tree = built;
            let name = tree.env_name(*env);
            match result {
                Ok(()) => tracing::info!("Built env '{}'", name),
                Err(err) => {
                    tracing::error!("Env '{}' failed: {}", name, err);
                    tree.abort_env(*env);
                    if !self.options.isolate_env_errors {
                        return Err(err);
                    }
                    failures.push(EnvFailure {
                        env: name,
                        error: Box::new(err),
                    });
                }
            }
        }
        if !failures.is_empty() {
            return Err(ConfigError::LoadFailed { failures });
        }

        tree.loaded = true;
        post_validate(&mut tree)?;
        Ok(tree)
    }

    fn load_env(&self, tree: Tree, env: EnvId) -> (Tree, Result<()>) {
        let Some(info) = tree.envs.env_by_id(env).cloned() else {
            return (tree, Err(mcfg_envs::EnvError::Unknown(format!("#{}", env.index())).into()));
        };
        let mut ctx = BuildContext::new(tree, &info, self.options.clone(), Arc::clone(&self.def.type_check));
        tracing::debug!("Building env '{}'", info.name());

        let result = ctx
            .run_root(&self.def.build)
            .and_then(|()| validate_env(&mut ctx.tree, env, self.options.validate_properties));
        (ctx.into_tree(), result)
    }
}

/// Run validation hooks and property checks on every item of `env`
fn validate_env(tree: &mut Tree, env: EnvId, validate_properties: bool) -> Result<()> {
    let result = validate_item(ItemView::new(tree, env, ItemId::ROOT), validate_properties);
    if result.is_err() {
        tree.errors += 1;
    }
    result
}

fn validate_item(view: ItemView<'_>, validate_properties: bool) -> Result<()> {
    let schema = view.schema();
    for hook in schema.validate_hooks() {
        hook(&view).map_err(|err| hook_error(view.path(), "validate", err))?;
    }
    if validate_properties {
        for name in schema.property_names() {
            view.property(name)
                .map_err(|err| hook_error(view.path(), "property", err))?;
        }
    }
    for child in view.children() {
        // Shared items are validated where they are declared
        if !child.is_proxied() {
            validate_item(child, validate_properties)?;
        }
    }
    Ok(())
}

fn post_validate(tree: &mut Tree) -> Result<()> {
    let result = (0..tree.nodes.len()).map(ItemId).try_for_each(|id| {
        let node = tree.node(id);
        if node.is_shared() || node.schema.is_hidden() || node.included.is_empty() {
            return Ok(());
        }
        let view = CrossEnvView::new(tree, id);
        for hook in node.schema.post_validate_hooks() {
            hook(&view).map_err(|err| hook_error(view.path(), "post_validate", err))?;
        }
        Ok(())
    });
    if result.is_err() {
        tree.errors += 1;
    }
    result
}

/// Attribute a plain validation failure to the hook that raised it
fn hook_error(item: String, hook: &'static str, err: ConfigError) -> ConfigError {
    match err {
        ConfigError::Definition(DefinitionError::Invalid(message)) => {
            DefinitionError::Hook { item, hook, message }.into()
        }
        other => other,
    }
}
