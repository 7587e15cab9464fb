//! Item schemas
//!
//! An [`ItemSchema`] is the type of a configuration item: its declared
//! attributes with defaults, declared children and nested repeatables, and
//! the user hooks run during its lifecycle. Schemas are built once with
//! [`SchemaBuilder`] and shared as `Arc<ItemSchema>`.

use crate::error::{DefinitionError, Result};
use crate::scope::Scope;
use crate::value::ValueKind;
use crate::view::{CrossEnvView, ItemView};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, OnceLock};

/// Name under which shared default items are stored in their container
pub const DEFAULT_ITEMS_NAME: &str = "default_items";

/// Hook run with a mutable scope (`mc_init`, `mc_build`)
pub type ScopeHook = Arc<dyn Fn(&mut Scope<'_>) -> Result<()> + Send + Sync>;
/// Per-env validation hook
pub type ValidateHook = Arc<dyn Fn(&ItemView<'_>) -> Result<()> + Send + Sync>;
/// Cross-env validation hook, run once after all envs are loaded
pub type PostValidateHook = Arc<dyn Fn(&CrossEnvView<'_>) -> Result<()> + Send + Sync>;
/// Computed property
pub type PropertyFn = Arc<dyn Fn(&ItemView<'_>) -> Result<Value> + Send + Sync>;

/// Kind of item a schema describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Ordinary configuration item
    Regular,
    /// Transient item expanding into regular items in its `mc_build` hook
    Builder,
    /// Container of shared default items
    DefaultItems,
}

/// Declared attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttrDecl {
    name: String,
    default: Option<Value>,
    kind: ValueKind,
}

impl AttrDecl {
    /// Attribute name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default value, `None` for required attributes
    #[inline]
    #[must_use]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// True if a value must be set for every env
    #[inline]
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Declared value kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

/// Type of a configuration item
pub struct ItemSchema {
    name: String,
    kind: ItemKind,
    repeatable: bool,
    lineage: Vec<String>,
    attributes: IndexMap<String, AttrDecl>,
    children: IndexMap<String, bool>,
    repeatables: IndexSet<String>,
    allow_any_child: bool,
    mc_build: Option<ScopeHook>,
    mc_init: Vec<ScopeHook>,
    validate: Vec<ValidateHook>,
    post_validate: Vec<PostValidateHook>,
    properties: IndexMap<String, PropertyFn>,
}

impl ItemSchema {
    /// Shared schema of the default items container
    #[must_use]
    pub fn default_items() -> Arc<Self> {
        static DEFAULT_ITEMS: OnceLock<Arc<ItemSchema>> = OnceLock::new();
        Arc::clone(DEFAULT_ITEMS.get_or_init(|| {
            Arc::new(Self {
                kind: ItemKind::DefaultItems,
                allow_any_child: true,
                ..Self::empty(DEFAULT_ITEMS_NAME)
            })
        }))
    }

    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ItemKind::Regular,
            repeatable: false,
            lineage: vec![name.to_string()],
            attributes: IndexMap::new(),
            children: IndexMap::new(),
            repeatables: IndexSet::new(),
            allow_any_child: false,
            mc_build: None,
            mc_init: Vec::new(),
            validate: Vec::new(),
            post_validate: Vec::new(),
            properties: IndexMap::new(),
        }
    }

    /// Schema name, also the name items are stored under in their parent
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Item kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// True if items are keyed inside a repeatable collection
    #[inline]
    #[must_use]
    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    /// True for builders
    #[inline]
    #[must_use]
    pub fn is_builder(&self) -> bool {
        self.kind == ItemKind::Builder
    }

    /// True for the default items container
    #[inline]
    #[must_use]
    pub fn is_default_items(&self) -> bool {
        self.kind == ItemKind::DefaultItems
    }

    /// True if items of this kind are hidden from views
    #[inline]
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.kind != ItemKind::Regular
    }

    /// True if this schema is `name` or extends a schema named `name`
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.lineage.iter().any(|n| n == name)
    }

    /// Declared attribute
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttrDecl> {
        self.attributes.get(name)
    }

    /// Declared attributes in declaration order
    pub fn attributes(&self) -> impl Iterator<Item = &AttrDecl> {
        self.attributes.values()
    }

    /// `Some(required)` if `name` is a declared single child
    #[must_use]
    pub fn declared_child(&self, name: &str) -> Option<bool> {
        self.children.get(name).copied()
    }

    /// Names of required single children
    pub fn required_children(&self) -> impl Iterator<Item = &str> {
        self.children
            .iter()
            .filter(|(_, required)| **required)
            .map(|(name, _)| name.as_str())
    }

    /// True if `name` is a declared nested repeatable
    #[must_use]
    pub fn declares_repeatable(&self, name: &str) -> bool {
        self.repeatables.contains(name)
    }

    /// Declared nested repeatables
    pub fn repeatables(&self) -> impl Iterator<Item = &str> {
        self.repeatables.iter().map(String::as_str)
    }

    /// True if children of any type may be added without declaration
    #[inline]
    #[must_use]
    pub fn allows_any_child(&self) -> bool {
        self.allow_any_child
    }

    pub(crate) fn mc_build(&self) -> Option<&ScopeHook> {
        self.mc_build.as_ref()
    }

    pub(crate) fn mc_init_hooks(&self) -> &[ScopeHook] {
        &self.mc_init
    }

    pub(crate) fn validate_hooks(&self) -> &[ValidateHook] {
        &self.validate
    }

    pub(crate) fn post_validate_hooks(&self) -> &[PostValidateHook] {
        &self.post_validate
    }

    /// Computed property
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyFn> {
        self.properties.get(name)
    }

    /// Names of computed properties
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

impl Debug for ItemSchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemSchema")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("repeatable", &self.repeatable)
            .field("lineage", &self.lineage)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .field("repeatables", &self.repeatables)
            .field("mc_init", &self.mc_init.len())
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ItemSchema`]
///
/// ```rust
/// use mcfg_core::schema::SchemaBuilder;
/// use mcfg_core::value::ValueKind;
///
/// let server = SchemaBuilder::new("server")
///     .repeatable()
///     .typed_attr("port", ValueKind::Int, None)
///     .attr("host", "localhost")
///     .build()
///     .unwrap();
/// assert!(server.attribute("port").unwrap().is_required());
/// ```
#[must_use]
pub struct SchemaBuilder {
    schema: ItemSchema,
    base: Option<Arc<ItemSchema>>,
    problems: Vec<String>,
}

impl SchemaBuilder {
    /// Start a regular, non-repeatable schema
    pub fn new(name: &str) -> Self {
        Self {
            schema: ItemSchema::empty(name),
            base: None,
            problems: Vec::new(),
        }
    }

    /// Items are keyed inside a repeatable collection of their parent
    pub fn repeatable(mut self) -> Self {
        self.schema.repeatable = true;
        self
    }

    /// Make this a builder expanding into regular items
    pub fn builder<F>(mut self, build: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.schema.kind = ItemKind::Builder;
        self.schema.mc_build = Some(Arc::new(build));
        self
    }

    /// Declare an optional attribute with a default
    pub fn attr(self, name: &str, default: impl Into<Value>) -> Self {
        self.typed_attr(name, ValueKind::Any, Some(default.into()))
    }

    /// Declare an attribute that must be set for every env
    pub fn required_attr(self, name: &str) -> Self {
        self.typed_attr(name, ValueKind::Any, None)
    }

    /// Declare an attribute with a kind, required if `default` is `None`
    pub fn typed_attr(mut self, name: &str, kind: ValueKind, default: Option<Value>) -> Self {
        if let Some(value) = &default {
            if !kind.accepts(value) {
                self.problems
                    .push(format!("default of '{name}' is not of kind {kind:?}"));
            }
        }
        let decl = AttrDecl {
            name: name.to_string(),
            default,
            kind,
        };
        self.schema.attributes.insert(name.to_string(), decl);
        self
    }

    /// Declare an optional single child
    pub fn child(mut self, name: &str) -> Self {
        self.schema.children.insert(name.to_string(), false);
        self
    }

    /// Declare a single child that must exist for every env
    pub fn required_child(mut self, name: &str) -> Self {
        self.schema.children.insert(name.to_string(), true);
        self
    }

    /// Declare a nested repeatable collection
    pub fn repeatables(mut self, name: &str) -> Self {
        self.schema.repeatables.insert(name.to_string());
        self
    }

    /// Accept undeclared children, repeatable or not
    pub fn allow_any_child(mut self) -> Self {
        self.schema.allow_any_child = true;
        self
    }

    /// Hook run after the scope body, before the item freezes
    pub fn mc_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.schema.mc_init.push(Arc::new(hook));
        self
    }

    /// Hook run per env after the env is built
    pub fn validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ItemView<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.schema.validate.push(Arc::new(hook));
        self
    }

    /// Hook run once after all envs are loaded
    pub fn post_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CrossEnvView<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.schema.post_validate.push(Arc::new(hook));
        self
    }

    /// Computed property, evaluated per env
    pub fn property<F>(mut self, name: &str, compute: F) -> Self
    where
        F: Fn(&ItemView<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.schema.properties.insert(name.to_string(), Arc::new(compute));
        self
    }

    /// Inherit declarations and hooks from `base`
    ///
    /// Base hooks run before the hooks of this schema. Declarations of this
    /// schema override base declarations with the same name.
    pub fn extends(mut self, base: &Arc<ItemSchema>) -> Self {
        self.base = Some(Arc::clone(base));
        self
    }

    /// Finish the schema
    ///
    /// # Errors
    /// Returns [`DefinitionError::InvalidSchema`] for invalid names, names
    /// declared both as child and repeatable, and invalid defaults
    pub fn build(self) -> Result<Arc<ItemSchema>, DefinitionError> {
        let Self {
            schema,
            base,
            mut problems,
        } = self;
        let schema = match base {
            Some(base) => merge(&base, schema),
            None => schema,
        };

        if !is_identifier(&schema.name) {
            problems.push("name must be an identifier".to_string());
        }
        if schema.name == DEFAULT_ITEMS_NAME {
            problems.push(format!("'{DEFAULT_ITEMS_NAME}' is reserved"));
        }
        for name in schema.children.keys() {
            if schema.repeatables.contains(name) {
                problems.push(format!("'{name}' declared both as child and repeatable"));
            }
        }

        match problems.into_iter().next() {
            Some(reason) => Err(DefinitionError::InvalidSchema {
                schema: schema.name,
                reason,
            }),
            None => Ok(Arc::new(schema)),
        }
    }
}

fn merge(base: &ItemSchema, derived: ItemSchema) -> ItemSchema {
    let mut lineage = vec![derived.name.clone()];
    lineage.extend(base.lineage.iter().cloned());

    let mut attributes = base.attributes.clone();
    attributes.extend(derived.attributes);
    let mut children = base.children.clone();
    children.extend(derived.children);
    let mut repeatables = base.repeatables.clone();
    repeatables.extend(derived.repeatables);
    let mut properties = base.properties.clone();
    properties.extend(derived.properties);

    let (kind, mc_build) = match derived.mc_build {
        Some(build) => (ItemKind::Builder, Some(build)),
        None => (base.kind, base.mc_build.clone()),
    };

    ItemSchema {
        name: derived.name,
        kind,
        repeatable: derived.repeatable || base.repeatable,
        lineage,
        attributes,
        children,
        repeatables,
        allow_any_child: derived.allow_any_child || base.allow_any_child,
        mc_build,
        mc_init: base.mc_init.iter().cloned().chain(derived.mc_init).collect(),
        validate: base.validate.iter().cloned().chain(derived.validate).collect(),
        post_validate: base
            .post_validate
            .iter()
            .cloned()
            .chain(derived.post_validate)
            .collect(),
        properties,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
