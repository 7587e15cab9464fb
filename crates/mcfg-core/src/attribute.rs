//! Per-env attribute values and conflict resolution
//!
//! An [`EnvValue`] holds one [`EnvSlot`] per env. Every write goes through
//! [`EnvValue::set`], which decides whether the incoming value replaces the
//! stored one based on the phase it was set in and the specificity of the
//! env or group it was selected by.

use crate::value::McValue;
use indexmap::IndexMap;
use mcfg_envs::{EnvError, EnvFactory, EnvId, EnvKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Phase in which a value was set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Where {
    /// Adopted from a shared default item
    DefaultItem,
    /// Set by a builder's deferred build
    McBuild,
    /// Set by an `mc_init` hook
    McInit,
    /// Init argument
    Init,
    /// Set inside the item's scope body
    With,
}

impl Where {
    /// Precedence rank, higher overrides lower
    #[inline]
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::DefaultItem => 0,
            Self::McBuild | Self::McInit => 1,
            Self::Init => 2,
            Self::With => 3,
        }
    }
}

/// Value stored for one env
#[derive(Debug, Clone, PartialEq)]
pub struct EnvSlot {
    value: McValue,
    where_from: Where,
    from_eg: EnvKey,
    forced: bool,
}

impl EnvSlot {
    /// Stored value or placeholder
    #[inline]
    #[must_use]
    pub fn value(&self) -> &McValue {
        &self.value
    }

    /// Phase the value was set in
    #[inline]
    #[must_use]
    pub fn where_from(&self) -> Where {
        self.where_from
    }

    /// Env or group that selected the value
    #[inline]
    #[must_use]
    pub fn from_eg(&self) -> EnvKey {
        self.from_eg
    }

    /// True if the value was set with force
    #[inline]
    #[must_use]
    pub fn forced(&self) -> bool {
        self.forced
    }
}

/// Value being written
#[derive(Debug, Clone)]
pub struct Incoming {
    /// Value or placeholder
    pub value: McValue,
    /// Phase of the write
    pub where_from: Where,
    /// Env or group that selected the value
    pub from_eg: EnvKey,
    /// Bypass precedence
    pub force: bool,
}

/// Outcome of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetDecision {
    /// Incoming value stored
    Accepted,
    /// Existing value kept, incoming silently discarded
    Kept,
    /// Same specificity in the same phase, reported as a redefinition
    Redefined,
}

/// Attribute values per env
#[derive(Debug, Clone, Default)]
pub struct EnvValue {
    slots: IndexMap<EnvId, EnvSlot>,
}

impl EnvValue {
    /// Slot for an env
    #[inline]
    #[must_use]
    pub fn get(&self, env: EnvId) -> Option<&EnvSlot> {
        self.slots.get(&env)
    }

    /// Value for an env
    #[must_use]
    pub fn value(&self, env: EnvId) -> Option<&McValue> {
        self.slots.get(&env).map(EnvSlot::value)
    }

    /// Envs with a stored slot
    pub fn envs(&self) -> impl Iterator<Item = EnvId> + '_ {
        self.slots.keys().copied()
    }

    /// True if no env has a slot
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Write a value for `env`, resolving conflicts with the stored slot
    ///
    /// # Errors
    /// Returns [`EnvError::Ambiguous`] if the stored and incoming selectors
    /// are different keys of equal order that both cover `env`
    pub fn set(&mut self, envs: &EnvFactory, env: EnvId, incoming: Incoming) -> Result<SetDecision, EnvError> {
        let decision = decide(envs, env, self.slots.get(&env), &incoming)?;
        if decision == SetDecision::Accepted {
            self.insert(env, incoming);
        }
        Ok(decision)
    }

    /// Store a value already accepted by [`decide`]
    pub(crate) fn insert(&mut self, env: EnvId, incoming: Incoming) {
        self.slots.insert(
            env,
            EnvSlot {
                value: incoming.value,
                where_from: incoming.where_from,
                from_eg: incoming.from_eg,
                forced: incoming.force,
            },
        );
    }

    pub(crate) fn clear_env(&mut self, env: EnvId) {
        self.slots.shift_remove(&env);
    }
}

/// Decide whether `incoming` replaces `existing`
///
/// Within one phase a value is replaced only by a selector covering a strict
/// subset of the stored one. Anything else is a redefinition inside a scope
/// body and is kept in the other phases.
///
/// # Errors
/// Returns [`EnvError::Ambiguous`] for unrelated selectors of equal order
pub fn decide(
    envs: &EnvFactory,
    env: EnvId,
    existing: Option<&EnvSlot>,
    incoming: &Incoming,
) -> Result<SetDecision, EnvError> {
    let Some(old) = existing else {
        return Ok(SetDecision::Accepted);
    };
    if old.value.is_placeholder() {
        return Ok(SetDecision::Accepted);
    }
    // A placeholder never hides a real value
    if incoming.value.is_placeholder() {
        return Ok(SetDecision::Kept);
    }
    if incoming.force {
        return Ok(SetDecision::Accepted);
    }
    if old.forced {
        return Ok(SetDecision::Kept);
    }

    match incoming.where_from.rank().cmp(&old.where_from.rank()) {
        Ordering::Greater => Ok(SetDecision::Accepted),
        Ordering::Less => Ok(SetDecision::Kept),
        Ordering::Equal => {
            let new_cover = envs.coverage(incoming.from_eg)?;
            let old_cover = envs.coverage(old.from_eg)?;
            if new_cover.is_strict_subset(&old_cover) {
                return Ok(SetDecision::Accepted);
            }
            if new_cover == old_cover {
                return Ok(SetDecision::Redefined);
            }
            if envs.order(incoming.from_eg)? == envs.order(old.from_eg)? {
                // Reports the ambiguity with both names
                envs.resolve_most_specific([old.from_eg, incoming.from_eg], env)?;
            }
            // A scope body may only refine what it already set
            if incoming.where_from == Where::With {
                Ok(SetDecision::Redefined)
            } else {
                Ok(SetDecision::Kept)
            }
        }
    }
}
