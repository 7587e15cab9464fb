//! Error types for MCFG Core
//!
//! Provides the error taxonomy for:
//! - Definition errors (structural misuse of the item model)
//! - Excluded access (item or attribute not present for an env)
//! - API usage errors (calls that are never legal in the current phase)
//! - Load failures aggregated across envs

use crate::state_machine::ItemState;
use mcfg_envs::EnvError;

/// Main MCFG error type
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Structural misuse of the configuration model
    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Item or attribute does not exist for the requested env
    #[error("excluded: {0}")]
    Excluded(#[from] ExcludedError),

    /// Call not legal in the current phase
    #[error("api usage error: {0}")]
    ApiUsage(#[from] ApiUsageError),

    /// Env hierarchy error
    #[error("env error: {0}")]
    Env(#[from] EnvError),

    /// One or more envs failed to load
    #[error("configuration failed to load for env(s) {}", env_names(.failures))]
    LoadFailed {
        /// Failure per env, in load order
        failures: Vec<EnvFailure>,
    },
}

/// Failure of a single env build
#[derive(Debug)]
pub struct EnvFailure {
    /// Name of the env that failed
    pub env: String,
    /// The error that stopped the env build
    pub error: Box<ConfigError>,
}

fn env_names(failures: &[EnvFailure]) -> String {
    failures
        .iter()
        .map(|f| f.env.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigError {
    /// Failure raised by a user hook or build body
    ///
    /// Raised from a hook, the message is reported with the item path and
    /// hook kind as [`DefinitionError::Hook`].
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Definition(DefinitionError::Invalid(message.into()))
    }

    /// Check if error is an excluded access
    #[inline]
    #[must_use]
    pub fn is_excluded(&self) -> bool {
        matches!(self, Self::Excluded(_))
    }

    /// Check if error is a definition error
    #[inline]
    #[must_use]
    pub fn is_definition(&self) -> bool {
        matches!(self, Self::Definition(_) | Self::Env(_))
    }

    /// Check if error is an API usage error
    #[inline]
    #[must_use]
    pub fn is_api_usage(&self) -> bool {
        matches!(self, Self::ApiUsage(_))
    }

    /// The definition error, if this is one
    #[must_use]
    pub fn as_definition(&self) -> Option<&DefinitionError> {
        match self {
            Self::Definition(e) => Some(e),
            _ => None,
        }
    }

    /// Failures per env, if this is a load failure
    #[must_use]
    pub fn env_failures(&self) -> &[EnvFailure] {
        match self {
            Self::LoadFailed { failures } => failures,
            _ => &[],
        }
    }
}

/// Structural misuse of the configuration model
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    /// Same item key constructed twice for one env
    #[error("repeated item '{key}' of type '{schema}' in {parent}")]
    RepeatedItem {
        /// Key or name of the item
        key: String,
        /// Schema name
        schema: String,
        /// Path of the containing item
        parent: String,
    },

    /// Repeatable usage does not match the declaration
    #[error("'{name}' in {parent}: {reason}")]
    RepeatableMismatch {
        /// Child name
        name: String,
        /// Path of the containing item
        parent: String,
        /// What did not match
        reason: String,
    },

    /// Child name not declared by the parent schema
    #[error("'{name}' is not a declared child of {parent}")]
    UndeclaredChild {
        /// Child name
        name: String,
        /// Path of the containing item
        parent: String,
    },

    /// Attribute not declared by the item schema
    #[error("unknown attribute '{attr}' on {item}")]
    UnknownAttribute {
        /// Item path
        item: String,
        /// Attribute name
        attr: String,
    },

    /// Attribute set again in the same phase without refining its selector
    #[error("attribute '{attr}' on {item} is already fully defined for env '{env}' by '{from}'")]
    AttributeRedefined {
        /// Item path
        item: String,
        /// Attribute name
        attr: String,
        /// Env being built
        env: String,
        /// Env or group of the rejected setting
        from: String,
    },

    /// The same env or group given twice in one setting
    #[error("env or group '{key}' given more than once for attribute '{attr}'")]
    DuplicateEnvSelector {
        /// Attribute name
        attr: String,
        /// Env or group name
        key: String,
    },

    /// Write attempted on a frozen item
    #[error("attribute '{attr}' on {item} cannot be set, the item is frozen")]
    AttributeFrozen {
        /// Item path
        item: String,
        /// Attribute name
        attr: String,
    },

    /// Value rejected by type checking
    #[error("attribute '{attr}' on {item}: {message}")]
    TypeMismatch {
        /// Item path
        item: String,
        /// Attribute name
        attr: String,
        /// Message from the type checker
        message: String,
    },

    /// Required or pending attribute has no value for the env
    #[error("attribute '{attr}' on {item} has no value for env '{env}'")]
    MissingValue {
        /// Item path
        item: String,
        /// Attribute name
        attr: String,
        /// Env being built
        env: String,
    },

    /// Required child item absent for the env
    #[error("missing required item '{name}' in {item} for env '{env}'")]
    MissingRequiredItem {
        /// Item path
        item: String,
        /// Required child name
        name: String,
        /// Env being built
        env: String,
    },

    /// State transition not allowed by the lifecycle
    #[error("illegal state transition {from:?} -> {to:?} on {item}")]
    IllegalTransition {
        /// Item path
        item: String,
        /// Current state
        from: ItemState,
        /// Requested state
        to: ItemState,
    },

    /// Operation not allowed in the item's current state
    #[error("cannot {action} on {item} in state {state:?}")]
    IllegalState {
        /// Item path
        item: String,
        /// Attempted operation
        action: &'static str,
        /// Current state
        state: ItemState,
    },

    /// Invalid schema declaration
    #[error("invalid schema '{schema}': {reason}")]
    InvalidSchema {
        /// Schema name
        schema: String,
        /// What is wrong
        reason: String,
    },

    /// Two different shared items proxied into the same slot
    #[error("conflicting proxies for '{name}' in {item}")]
    ProxyConflict {
        /// Item path
        item: String,
        /// Child name
        name: String,
    },

    /// User hook reported a failure
    #[error("{hook} failed on {item}: {message}")]
    Hook {
        /// Item path
        item: String,
        /// Hook kind
        hook: &'static str,
        /// Failure message
        message: String,
    },

    /// Failure reported by user code, see [`ConfigError::invalid`]
    #[error("{0}")]
    Invalid(String),

    /// Item accumulated errors that were not propagated by its scope body
    #[error("{item} has {count} error(s)")]
    ItemFailed {
        /// Item path
        item: String,
        /// Number of recorded errors
        count: usize,
    },
}

/// Item or attribute does not exist for the requested env
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExcludedError {
    /// Item is not handled for the env
    #[error("{item} does not exist for env '{env}'")]
    Item {
        /// Item path
        item: String,
        /// Requested env
        env: String,
    },

    /// Child or repeatable key is not present for the env
    #[error("{item} has no item '{name}' for env '{env}'")]
    Child {
        /// Item path
        item: String,
        /// Child name or key
        name: String,
        /// Requested env
        env: String,
    },

    /// Attribute has no value for the env
    #[error("attribute '{attr}' on {item} has no value for env '{env}'")]
    Attribute {
        /// Item path
        item: String,
        /// Attribute name
        attr: String,
        /// Requested env
        env: String,
    },
}

/// Call not legal in the current phase
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiUsageError {
    /// Mutation after the configuration was loaded
    #[error("configuration is loaded, {item} cannot be modified")]
    MutationAfterLoad {
        /// Item path
        item: String,
    },

    /// Env-relative access with no env bound
    #[error("no current env while reading '{attr}' on {item}, use an explicit env")]
    NoCurrentEnv {
        /// Item path
        item: String,
        /// Attribute name
        attr: String,
    },

    /// Env was not part of the load
    #[error("env '{0}' is not loaded")]
    EnvNotLoaded(String),

    /// Env has deferred values that were not tolerated
    #[error("env '{env}' has {} unresolved todo value(s): {}", .attrs.len(), .attrs.join(", "))]
    OutstandingTodo {
        /// Env name
        env: String,
        /// Attribute paths holding todo values
        attrs: Vec<String>,
    },

    /// Reading a deferred value
    #[error("attribute '{attr}' on {item} is a todo value for env '{env}'")]
    TodoValue {
        /// Item path
        item: String,
        /// Attribute name
        attr: String,
        /// Requested env
        env: String,
    },

    /// Property not declared by the schema
    #[error("unknown property '{property}' on {item}")]
    UnknownProperty {
        /// Item path
        item: String,
        /// Property name
        property: String,
    },
}

/// Convenience alias used throughout the crate
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
