//! Configuration definitions and loaded configurations
//!
//! A [`ConfigDef`] pairs a sealed env hierarchy with a root schema and the
//! user function that builds the item tree. Loading runs that function once
//! per env and yields a [`Config`], from which per-env views are taken.

use crate::error::{ApiUsageError, DefinitionError, Result};
use crate::item::ItemId;
use crate::json;
use crate::loader::Loader;
use crate::schema::{ItemSchema, ScopeHook};
use crate::scope::Scope;
use crate::tree::Tree;
use crate::value::{KindCheck, TypeCheck};
use crate::view::ItemView;
use indexmap::IndexMap;
use mcfg_envs::{Env, EnvError, EnvFactory, EnvId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Load behavior
///
/// Can be read from TOML:
///
/// ```rust
/// use mcfg_core::config::LoadOptions;
///
/// let options = LoadOptions::from_toml_str("lazy = true\nenvs = [\"prod\"]").unwrap();
/// assert!(options.lazy);
/// assert!(options.strict_attributes);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Build each env on first access instead of at load time
    pub lazy: bool,
    /// Keep building remaining envs after one fails, report all at the end
    pub isolate_env_errors: bool,
    /// Evaluate every declared property for every item after an env is built
    pub validate_properties: bool,
    /// Tolerate todo values in every env
    pub allow_todo: bool,
    /// Reject attributes not declared by the item schema
    pub strict_attributes: bool,
    /// Envs to build, all envs if unset
    pub envs: Option<Vec<String>>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            lazy: false,
            isolate_env_errors: false,
            validate_properties: true,
            allow_todo: false,
            strict_attributes: true,
            envs: None,
        }
    }
}

impl LoadOptions {
    /// Parse options from a TOML document, missing keys take their default
    ///
    /// # Errors
    /// Returns the TOML parse error
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Set lazy loading
    #[must_use]
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Set per-env error isolation
    #[must_use]
    pub fn with_isolate_env_errors(mut self, isolate: bool) -> Self {
        self.isolate_env_errors = isolate;
        self
    }

    /// Set property validation
    #[must_use]
    pub fn with_validate_properties(mut self, validate: bool) -> Self {
        self.validate_properties = validate;
        self
    }

    /// Set todo tolerance for every env
    #[must_use]
    pub fn with_allow_todo(mut self, allow: bool) -> Self {
        self.allow_todo = allow;
        self
    }

    /// Set strict attribute declaration checking
    #[must_use]
    pub fn with_strict_attributes(mut self, strict: bool) -> Self {
        self.strict_attributes = strict;
        self
    }

    /// Restrict loading to the named envs
    #[must_use]
    pub fn with_envs<I, S>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.envs = Some(envs.into_iter().map(Into::into).collect());
        self
    }
}

/// Definition of a configuration
#[derive(Clone)]
pub struct ConfigDef {
    pub(crate) envs: Arc<EnvFactory>,
    pub(crate) root: Arc<ItemSchema>,
    pub(crate) build: ScopeHook,
    pub(crate) type_check: Arc<dyn TypeCheck>,
}

impl ConfigDef {
    /// Define a configuration
    ///
    /// # Errors
    /// Returns [`EnvError::NotSealed`] for an unsealed hierarchy,
    /// [`EnvError::NoEnvs`] for an empty one and an invalid-schema error if
    /// the root schema is repeatable or hidden
    pub fn new<F>(envs: EnvFactory, root: Arc<ItemSchema>, build: F) -> Result<Self>
    where
        F: Fn(&mut Scope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        if !envs.is_sealed() {
            return Err(EnvError::NotSealed.into());
        }
        if envs.is_empty() {
            return Err(EnvError::NoEnvs.into());
        }
        if root.is_repeatable() || root.is_hidden() {
            return Err(DefinitionError::InvalidSchema {
                schema: root.name().to_string(),
                reason: "the root must be a single regular item".to_string(),
            }
            .into());
        }
        Ok(Self {
            envs: Arc::new(envs),
            root,
            build: Arc::new(build),
            type_check: Arc::new(KindCheck),
        })
    }

    /// Replace the type checker
    #[must_use]
    pub fn with_type_check(mut self, type_check: impl TypeCheck + 'static) -> Self {
        self.type_check = Arc::new(type_check);
        self
    }

    /// Env hierarchy
    #[must_use]
    pub fn envs(&self) -> &EnvFactory {
        &self.envs
    }

    /// Root schema
    #[must_use]
    pub fn root_schema(&self) -> &Arc<ItemSchema> {
        &self.root
    }

    /// Load the configuration
    ///
    /// Eagerly builds every requested env, unless `options.lazy` is set.
    ///
    /// # Errors
    /// Returns unknown env names in `options.envs`, the first env failure, or
    /// [`crate::error::ConfigError::LoadFailed`] with per-env isolation
    pub fn load(&self, options: LoadOptions) -> Result<Config> {
        let requested: Vec<EnvId> = match &options.envs {
            Some(names) => names
                .iter()
                .map(|name| self.envs.env_named(name).map(Env::id))
                .collect::<std::result::Result<_, _>>()?,
            None => self.envs.envs().map(Env::id).collect(),
        };

        let config = Config {
            def: self.clone(),
            options,
            requested,
            trees: Mutex::new(IndexMap::new()),
        };
        if !config.options.lazy {
            let tree = Arc::new(Loader::new(self, &config.options).load(&config.requested)?);
            let mut trees = config.trees.lock();
            for env in &config.requested {
                trees.insert(*env, Arc::clone(&tree));
            }
            drop(trees);
            tracing::info!("Loaded configuration for {} env(s)", config.requested.len());
        }
        Ok(config)
    }
}

impl Debug for ConfigDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDef")
            .field("envs", &self.envs)
            .field("root", &self.root.name())
            .finish_non_exhaustive()
    }
}

/// Loaded configuration
pub struct Config {
    def: ConfigDef,
    options: LoadOptions,
    requested: Vec<EnvId>,
    /// Built trees per env; all envs share one tree unless loading lazily
    trees: Mutex<IndexMap<EnvId, Arc<Tree>>>,
}

impl Config {
    /// Load options in effect
    #[must_use]
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Env hierarchy
    #[must_use]
    pub fn envs(&self) -> &EnvFactory {
        &self.def.envs
    }

    /// Names of the envs this configuration serves
    #[must_use]
    pub fn env_names(&self) -> Vec<&str> {
        self.requested
            .iter()
            .filter_map(|id| self.def.envs.env_by_id(*id))
            .map(Env::name)
            .collect()
    }

    /// Configuration for an env
    ///
    /// # Errors
    /// Returns [`ApiUsageError::EnvNotLoaded`] for envs not requested,
    /// [`ApiUsageError::OutstandingTodo`] if the env has todo values it does
    /// not tolerate, and build errors of a lazy load
    pub fn env(&self, name: &str) -> Result<EnvConfig> {
        self.env_config(name, false)
    }

    /// Configuration for an env, tolerating todo values
    ///
    /// # Errors
    /// Returns [`ApiUsageError::EnvNotLoaded`] for envs not requested and
    /// build errors of a lazy load
    pub fn env_allow_todo(&self, name: &str) -> Result<EnvConfig> {
        self.env_config(name, true)
    }

    fn env_config(&self, name: &str, allow_todo: bool) -> Result<EnvConfig> {
        let env = self.def.envs.env_named(name)?;
        if !self.requested.contains(&env.id()) {
            return Err(ApiUsageError::EnvNotLoaded(name.to_string()).into());
        }
        let tree = self.tree_for(env.id())?;

        let todo = tree.todo(env.id());
        if !todo.is_empty() && !(allow_todo || env.allow_todo() || self.options.allow_todo) {
            return Err(ApiUsageError::OutstandingTodo {
                env: name.to_string(),
                attrs: todo.to_vec(),
            }
            .into());
        }
        Ok(EnvConfig { tree, env: env.id() })
    }

    fn tree_for(&self, env: EnvId) -> Result<Arc<Tree>> {
        let mut trees = self.trees.lock();
        if let Some(tree) = trees.get(&env) {
            return Ok(Arc::clone(tree));
        }
        let tree = Arc::new(Loader::new(&self.def, &self.options).load(&[env])?);
        trees.insert(env, Arc::clone(&tree));
        tracing::info!("Lazily loaded env '{}'", self.def.envs.env_by_id(env).map_or("?", Env::name));
        Ok(tree)
    }

    /// Errors recorded over all built trees
    #[must_use]
    pub fn errors(&self) -> usize {
        self.distinct_trees().iter().map(|t| t.errors()).sum()
    }

    /// Warnings recorded over all built trees
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.distinct_trees().iter().map(|t| t.warnings()).sum()
    }

    /// True if the named env has been built
    #[must_use]
    pub fn is_loaded(&self, env: &str) -> bool {
        self.def
            .envs
            .lookup(env)
            .and_then(|key| match key {
                mcfg_envs::EnvKey::Env(id) => Some(id),
                mcfg_envs::EnvKey::Group(_) => None,
            })
            .is_some_and(|id| self.trees.lock().contains_key(&id))
    }

    fn distinct_trees(&self) -> Vec<Arc<Tree>> {
        let trees = self.trees.lock();
        let mut out: Vec<Arc<Tree>> = Vec::new();
        for tree in trees.values() {
            if !out.iter().any(|t| Arc::ptr_eq(t, tree)) {
                out.push(Arc::clone(tree));
            }
        }
        out
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("def", &self.def)
            .field("options", &self.options)
            .field("envs", &self.env_names())
            .finish_non_exhaustive()
    }
}

/// Configuration of one env
#[derive(Clone)]
pub struct EnvConfig {
    tree: Arc<Tree>,
    env: EnvId,
}

impl EnvConfig {
    /// View of the root item
    #[must_use]
    pub fn root(&self) -> ItemView<'_> {
        ItemView::new(&self.tree, self.env, ItemId::ROOT)
    }

    /// The env
    #[must_use]
    pub fn env(&self) -> Option<&Env> {
        self.tree.envs().env_by_id(self.env)
    }

    /// Attribute paths holding todo values
    #[must_use]
    pub fn todo(&self) -> &[String] {
        self.tree.todo(self.env)
    }

    /// Render the env configuration as JSON
    ///
    /// # Errors
    /// Returns serialization errors from `serde_json`
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        json::to_json_value(&self.root())
    }
}

impl Debug for EnvConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvConfig")
            .field("env", &self.env().map(Env::name))
            .finish_non_exhaustive()
    }
}
