//! MCFG Configuration Model
//!
//! Environment-aware configuration items whose attributes carry one value per
//! env, resolved by env-group specificity.
//!
//! # Overview
//!
//! The configuration model provides:
//! - **ItemSchema**: Declared attributes, children and hooks of an item type
//! - **Scope**: Build-time handle for setting attributes and nesting items
//! - **ConfigDef / Config**: Definition and multi-env loading
//! - **ItemView**: Frozen, read-only per-env view of the built tree
//!
//! # Example
//!
//! ```rust
//! use mcfg_core::{ConfigDef, LoadOptions, SchemaBuilder, SetAttr};
//! use mcfg_envs::EnvFactory;
//!
//! let mut envs = EnvFactory::new();
//! let prod = envs.env("prod").unwrap();
//! let pp = envs.env("pp").unwrap();
//! envs.group("g_ppr", &[prod.into(), pp.into()]).unwrap();
//! envs.seal().unwrap();
//!
//! let root = SchemaBuilder::new("cluster").required_attr("size").build().unwrap();
//! let def = ConfigDef::new(envs, root, |scope| {
//!     scope.setattr(SetAttr::new("size").env("g_ppr", 10).env("prod", 20))
//! })
//! .unwrap();
//!
//! let config = def.load(LoadOptions::default()).unwrap();
//! assert_eq!(config.env("prod").unwrap().root().attr("size").unwrap(), 20);
//! assert_eq!(config.env("pp").unwrap().root().attr("size").unwrap(), 10);
//! ```

#![warn(missing_docs)]

pub mod attribute;
mod builder;
pub mod config;
mod defaults;
pub mod error;
pub mod item;
pub mod json;
mod loader;
mod proxy;
mod registry;
mod repeatable;
pub mod schema;
pub mod scope;
pub mod state_machine;
pub mod tree;
pub mod value;
pub mod view;

// Re-exports
pub use attribute::{EnvValue, Where};
pub use config::{Config, ConfigDef, EnvConfig, LoadOptions};
pub use error::{ApiUsageError, ConfigError, DefinitionError, EnvFailure, ExcludedError, Result};
pub use item::ItemId;
pub use json::{to_json_string, to_json_value, TODO_MARKER};
pub use schema::{ItemKind, ItemSchema, SchemaBuilder};
pub use scope::{ItemCall, Scope, ScopeOutcome, SetAttr};
pub use state_machine::ItemState;
pub use value::{mc_required, mc_todo, KindCheck, McValue, TypeCheck, ValueKind};
pub use view::{CrossEnvView, ItemView, RepeatableView};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for configuration definitions
    pub use crate::{
        mc_required, mc_todo, Config, ConfigDef, ConfigError, CrossEnvView, ItemCall, ItemSchema, ItemView,
        LoadOptions, McValue, Scope, ScopeOutcome, SchemaBuilder, SetAttr,
    };
    pub use mcfg_envs::{EnvFactory, EnvKey};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
