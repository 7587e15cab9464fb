//! Multi-env loading, validation, todo values and rendering

use mcfg_core::prelude::*;
use mcfg_core::{ApiUsageError, DefinitionError, TODO_MARKER};
use mcfg_envs::EnvError;
use mcfg_test_utils::{cluster_schema, init_tracing, load, plain_schema, ppr_envs, ppr_envs_dev_todo, root_schema};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn sized(s: &mut Scope<'_>) -> Result<(), ConfigError> {
    s.setattr(SetAttr::new("size").env("prod", 20).env("g_ppr", 10).env("dev", 1))
}

fn missing_for_pp(s: &mut Scope<'_>) -> Result<(), ConfigError> {
    s.setattr(SetAttr::new("size").env("prod", 20).env("dev", 1))
}

#[test]
fn eager_load_builds_every_env() {
    init_tracing();
    let config = load(ppr_envs(), cluster_schema(), LoadOptions::default(), sized).unwrap();

    assert_eq!(config.env_names(), vec!["prod", "pp", "dev"]);
    for env in ["prod", "pp", "dev"] {
        assert!(config.is_loaded(env));
    }
    assert_eq!(config.errors(), 0);
    let sizes: Vec<_> = ["prod", "pp", "dev"]
        .iter()
        .map(|env| config.env(env).unwrap().root().attr("size").unwrap().clone())
        .collect();
    assert_eq!(sizes, vec![json!(20), json!(10), json!(1)]);
}

#[test]
fn first_env_error_aborts_load() {
    let err = load(ppr_envs(), cluster_schema(), LoadOptions::default(), missing_for_pp).unwrap_err();

    match err.as_definition() {
        Some(DefinitionError::MissingValue { item, attr, env }) => {
            assert_eq!(item, "cluster");
            assert_eq!(attr, "size");
            assert_eq!(env, "pp");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn isolated_env_errors_are_collected() {
    let options = LoadOptions::default().with_isolate_env_errors(true);
    let err = load(ppr_envs(), cluster_schema(), options, missing_for_pp).unwrap_err();

    let failures = err.env_failures();
    assert_eq!(failures.iter().map(|f| f.env.as_str()).collect::<Vec<_>>(), vec!["pp"]);
    assert!(matches!(
        failures[0].error.as_definition(),
        Some(DefinitionError::MissingValue { .. })
    ));
    assert!(err.to_string().contains("pp"));
}

#[test]
fn isolated_missing_items_list_every_failing_env() {
    let db = plain_schema("db");
    let root = SchemaBuilder::new("root").required_child("db").build().unwrap();
    let options = LoadOptions::default().with_isolate_env_errors(true);
    let err = load(ppr_envs(), root, options, move |s| {
        s.add(ItemCall::new(&db).include(["prod"]))?;
        Ok(())
    })
    .unwrap_err();

    let envs: Vec<_> = err.env_failures().iter().map(|f| f.env.clone()).collect();
    assert_eq!(envs, vec!["pp".to_string(), "dev".to_string()]);
}

#[test]
fn lazy_load_builds_envs_on_access() {
    let config = load(
        ppr_envs(),
        cluster_schema(),
        LoadOptions::default().with_lazy(true),
        missing_for_pp,
    )
    .unwrap();

    assert!(!config.is_loaded("prod"));
    let prod = config.env("prod").unwrap();
    assert_eq!(prod.root().attr("size").unwrap(), &json!(20));
    assert!(config.is_loaded("prod"));
    assert!(!config.is_loaded("pp"));

    let err = config.env("pp").unwrap_err();
    assert!(matches!(err.as_definition(), Some(DefinitionError::MissingValue { .. })));
    assert!(!config.is_loaded("pp"));
    assert!(config.env("dev").is_ok());
}

#[test]
fn env_subset_from_options() {
    let options = LoadOptions::from_toml_str("envs = [\"prod\", \"dev\"]").unwrap();
    assert!(options.validate_properties);
    let config = load(ppr_envs(), cluster_schema(), options, missing_for_pp).unwrap();

    assert_eq!(config.env_names(), vec!["prod", "dev"]);
    assert!(matches!(
        config.env("pp").unwrap_err(),
        ConfigError::ApiUsage(ApiUsageError::EnvNotLoaded(env)) if env == "pp"
    ));
}

#[test]
fn unknown_env_in_options_is_rejected() {
    let options = LoadOptions::default().with_envs(["prod", "qa"]);
    let err = load(ppr_envs(), cluster_schema(), options, sized).unwrap_err();
    assert!(matches!(err, ConfigError::Env(EnvError::Unknown(name)) if name == "qa"));
}

#[test]
fn definition_requires_sealed_envs() {
    let mut envs = EnvFactory::new();
    envs.env("prod").unwrap();
    let err = ConfigDef::new(envs, cluster_schema(), sized).unwrap_err();
    assert!(matches!(err, ConfigError::Env(EnvError::NotSealed)));

    let repeatable = SchemaBuilder::new("root").repeatable().build().unwrap();
    let err = ConfigDef::new(ppr_envs(), repeatable, sized).unwrap_err();
    assert!(matches!(err.as_definition(), Some(DefinitionError::InvalidSchema { .. })));
}

fn secret_schema() -> Arc<ItemSchema> {
    SchemaBuilder::new("root").required_attr("secret").build().unwrap()
}

fn secret(s: &mut Scope<'_>) -> Result<(), ConfigError> {
    s.setattr(SetAttr::new("secret").default(mc_todo()).env("prod", "s3cr3t"))
}

#[test]
fn todo_values_block_envs_that_do_not_allow_them() {
    let config = load(ppr_envs_dev_todo(), secret_schema(), LoadOptions::default(), secret).unwrap();

    let prod = config.env("prod").unwrap();
    assert_eq!(prod.root().attr("secret").unwrap(), &json!("s3cr3t"));
    assert!(prod.todo().is_empty());

    match config.env("pp").unwrap_err() {
        ConfigError::ApiUsage(ApiUsageError::OutstandingTodo { env, attrs }) => {
            assert_eq!(env, "pp");
            assert_eq!(attrs, vec!["root.secret".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let dev = config.env("dev").unwrap();
    assert_eq!(dev.todo().to_vec(), vec!["root.secret".to_string()]);
    assert_eq!(config.warnings(), 1);
}

#[test]
fn todo_values_read_and_render() {
    let config = load(ppr_envs_dev_todo(), secret_schema(), LoadOptions::default(), secret).unwrap();

    let pp = config.env_allow_todo("pp").unwrap();
    assert!(matches!(
        pp.root().attr("secret"),
        Err(ConfigError::ApiUsage(ApiUsageError::TodoValue { .. }))
    ));
    assert_eq!(pp.to_json().unwrap(), json!({ "secret": TODO_MARKER }));

    let tolerant = load(
        ppr_envs_dev_todo(),
        secret_schema(),
        LoadOptions::default().with_allow_todo(true),
        secret,
    )
    .unwrap();
    assert!(tolerant.env("pp").is_ok());
}

#[test]
fn validate_hook_failure_names_item_and_hook() {
    let db = SchemaBuilder::new("db")
        .attr("a", 0)
        .validate(|v| {
            if v.attr_as::<i64>("a")? > 100 {
                return Err(ConfigError::invalid("a is too large"));
            }
            Ok(())
        })
        .build()
        .unwrap();
    let build = move |s: &mut Scope<'_>| -> Result<(), ConfigError> {
        s.item(ItemCall::new(&db), |d| d.setattr(SetAttr::new("a").default(1).env("pp", 500)))?;
        Ok(())
    };

    let err = load(ppr_envs(), root_schema(), LoadOptions::default(), build.clone()).unwrap_err();
    match err.as_definition() {
        Some(DefinitionError::Hook { item, hook, message }) => {
            assert_eq!(item, "root.db");
            assert_eq!(*hook, "validate");
            assert_eq!(message, "a is too large");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let isolated = LoadOptions::default().with_isolate_env_errors(true);
    let err = load(ppr_envs(), root_schema(), isolated, build).unwrap_err();
    assert_eq!(err.env_failures().len(), 1);
    assert_eq!(err.env_failures()[0].env, "pp");
}

fn web_schema() -> Arc<ItemSchema> {
    SchemaBuilder::new("web")
        .attr("host", "localhost")
        .required_attr("port")
        .property("url", |v| {
            let host: String = v.attr_as("host")?;
            let port: u64 = v.attr_as("port")?;
            Ok(json!(format!("http://{host}:{port}")))
        })
        .property("per_worker", |v| {
            let port: u64 = v.attr_as("port")?;
            if port == 0 {
                return Err(ConfigError::invalid("port is not set up"));
            }
            Ok(json!(port / 2))
        })
        .build()
        .unwrap()
}

fn web() -> impl Fn(&mut Scope<'_>) -> Result<(), ConfigError> + Send + Sync + 'static {
    let schema = web_schema();
    move |s: &mut Scope<'_>| {
        s.item(ItemCall::new(&schema), |w| w.setattr(SetAttr::new("port").default(8080).env("dev", 0)))?;
        Ok(())
    }
}

#[test]
fn properties_are_computed_per_env() {
    let options = LoadOptions::default().with_validate_properties(false);
    let config = load(ppr_envs(), root_schema(), options, web()).unwrap();

    let prod = config.env("prod").unwrap();
    let item = prod.root().child("web").unwrap();
    assert_eq!(item.property("url").unwrap(), json!("http://localhost:8080"));
    assert_eq!(item.property("per_worker").unwrap(), json!(4040));
    assert!(matches!(
        item.property("nope"),
        Err(ConfigError::ApiUsage(ApiUsageError::UnknownProperty { .. }))
    ));

    let dev = config.env("dev").unwrap();
    let err = dev.root().child("web").unwrap().property("per_worker").unwrap_err();
    assert!(matches!(err.as_definition(), Some(DefinitionError::Invalid(_))));
}

#[test]
fn failing_property_fails_load_when_validated() {
    let err = load(ppr_envs(), root_schema(), LoadOptions::default(), web()).unwrap_err();
    assert!(matches!(
        err.as_definition(),
        Some(DefinitionError::Hook { hook, .. }) if *hook == "property"
    ));
}

#[test]
fn post_validate_sees_every_env() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let recorded = Arc::clone(&seen);
    let root = SchemaBuilder::new("cluster")
        .required_attr("size")
        .post_validate(move |v| {
            assert!(matches!(
                v.attr("size"),
                Err(ConfigError::ApiUsage(ApiUsageError::NoCurrentEnv { .. }))
            ));
            recorded.lock().extend(v.env_names().into_iter().map(str::to_string));
            let prod = v.attr_in("prod", "size")?.as_i64();
            let pp = v.attr_in("pp", "size")?.as_i64();
            if prod < pp {
                return Err(ConfigError::invalid("prod must not be smaller than pp"));
            }
            Ok(())
        })
        .build()
        .unwrap();

    load(ppr_envs(), Arc::clone(&root), LoadOptions::default(), sized).unwrap();
    assert_eq!(*seen.lock(), vec!["prod", "pp", "dev"]);

    let err = load(ppr_envs(), root, LoadOptions::default(), |s| {
        s.setattr(SetAttr::new("size").default(10).env("prod", 5))
    })
    .unwrap_err();
    assert!(matches!(
        err.as_definition(),
        Some(DefinitionError::Hook { hook, item, .. }) if *hook == "post_validate" && item == "cluster"
    ));
}

#[test]
fn env_config_renders_nested_json() {
    let server = SchemaBuilder::new("server").repeatable().required_attr("port").build().unwrap();
    let db = plain_schema("db");
    let root = SchemaBuilder::new("app")
        .attr("name", "shop")
        .repeatables("server")
        .child("db")
        .build()
        .unwrap();
    let config = load(ppr_envs(), root, LoadOptions::default(), move |s| {
        s.item(ItemCall::new(&db), |d| d.setattr(SetAttr::new("a").default(1).env("prod", 3)))?;
        s.add(ItemCall::keyed(&server, "web").arg("port", 80))?;
        s.add(ItemCall::keyed(&server, "api").arg("port", 81).exclude(["dev"]))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        config.env("prod").unwrap().to_json().unwrap(),
        json!({
            "name": "shop",
            "db": {"a": 3},
            "server": {"web": {"port": 80}, "api": {"port": 81}},
        })
    );
    assert_eq!(
        config.env("dev").unwrap().to_json().unwrap(),
        json!({
            "name": "shop",
            "db": {"a": 1},
            "server": {"web": {"port": 80}},
        })
    );
    let text = mcfg_core::to_json_string(&config.env("pp").unwrap().root()).unwrap();
    assert!(text.contains("\"shop\""));
}

#[test]
fn one_definition_loads_independent_configs() {
    let def = ConfigDef::new(ppr_envs(), cluster_schema(), sized).unwrap();
    let eager = def.load(LoadOptions::default()).unwrap();
    let lazy = def.load(LoadOptions::default().with_lazy(true)).unwrap();

    assert_eq!(
        eager.env("pp").unwrap().to_json().unwrap(),
        lazy.env("pp").unwrap().to_json().unwrap()
    );
    assert!(!lazy.is_loaded("prod"));
}
