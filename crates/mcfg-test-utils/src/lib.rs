//! Testing utilities for MCFG workspace
//!
//! Shared env hierarchies, schemas and loaders.

#![allow(missing_docs)]

use mcfg_core::{Config, ConfigDef, ConfigError, ItemSchema, LoadOptions, SchemaBuilder, Scope};
use mcfg_envs::EnvFactory;
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Route `tracing` output to the test writer, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// `prod`, `pp` and `dev`, with `g_ppr` grouping `prod` and `pp`
pub fn ppr_envs() -> EnvFactory {
    let mut envs = EnvFactory::new();
    let prod = envs.env("prod").unwrap();
    let pp = envs.env("pp").unwrap();
    envs.env("dev").unwrap();
    envs.group("g_ppr", &[prod.into(), pp.into()]).unwrap();
    envs.seal().unwrap();
    envs
}

/// Like [`ppr_envs`], with `dev` marked as allowing todo values
pub fn ppr_envs_dev_todo() -> EnvFactory {
    let mut envs = EnvFactory::new();
    let prod = envs.env("prod").unwrap();
    let pp = envs.env("pp").unwrap();
    envs.env_with_todo("dev", true).unwrap();
    envs.group("g_ppr", &[prod.into(), pp.into()]).unwrap();
    envs.seal().unwrap();
    envs
}

/// Two overlapping groups, `g_a = {x, y}` and `g_b = {y, z}`
pub fn overlapping_envs() -> EnvFactory {
    let mut envs = EnvFactory::new();
    let x = envs.env("x").unwrap();
    let y = envs.env("y").unwrap();
    let z = envs.env("z").unwrap();
    envs.group("g_a", &[x.into(), y.into()]).unwrap();
    envs.group("g_b", &[y.into(), z.into()]).unwrap();
    envs.seal().unwrap();
    envs
}

/// Root item accepting any child
pub fn root_schema() -> Arc<ItemSchema> {
    SchemaBuilder::new("root").allow_any_child().build().unwrap()
}

/// Root with a required `size` attribute
pub fn cluster_schema() -> Arc<ItemSchema> {
    SchemaBuilder::new("cluster")
        .required_attr("size")
        .allow_any_child()
        .build()
        .unwrap()
}

/// Single item with an optional `a` attribute
pub fn plain_schema(name: &str) -> Arc<ItemSchema> {
    SchemaBuilder::new(name).attr("a", 0).allow_any_child().build().unwrap()
}

/// Repeatable item with a required `port` attribute
pub fn server_schema() -> Arc<ItemSchema> {
    SchemaBuilder::new("server")
        .repeatable()
        .required_attr("port")
        .build()
        .unwrap()
}

/// Load a configuration in one step
pub fn load<F>(envs: EnvFactory, root: Arc<ItemSchema>, options: LoadOptions, build: F) -> Result<Config, ConfigError>
where
    F: Fn(&mut Scope<'_>) -> Result<(), ConfigError> + Send + Sync + 'static,
{
    ConfigDef::new(envs, root, build)?.load(options)
}
