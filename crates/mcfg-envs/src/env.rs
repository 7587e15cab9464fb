//! Env and EnvGroup definitions
//!
//! Provides the leaf [`Env`], the composite [`EnvGroup`] and the [`EnvKey`]
//! selector used wherever either may be named.

use crate::mask::EnvMask;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identity of a leaf env: its bit position in the owning factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvId(pub(crate) usize);

impl EnvId {
    /// Bit position in env masks
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Identity of a group within the owning factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub(crate) usize);

/// Either an env or a group, as used in env-specific settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvKey {
    /// Leaf env
    Env(EnvId),
    /// Env group
    Group(GroupId),
}

impl From<EnvId> for EnvKey {
    fn from(id: EnvId) -> Self {
        Self::Env(id)
    }
}

impl From<GroupId> for EnvKey {
    fn from(id: GroupId) -> Self {
        Self::Group(id)
    }
}

/// Leaf deployment environment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Env {
    pub(crate) name: String,
    pub(crate) id: EnvId,
    pub(crate) allow_todo: bool,
}

impl Env {
    /// Env name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Env identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> EnvId {
        self.id
    }

    /// Whether deferred (todo) values are tolerated when this env is retrieved
    #[inline]
    #[must_use]
    pub fn allow_todo(&self) -> bool {
        self.allow_todo
    }

    /// Mask with only this env's bit set
    #[inline]
    #[must_use]
    pub fn mask(&self) -> EnvMask {
        EnvMask::bit(self.id.0)
    }
}

impl Display for Env {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Env('{}')", self.name)
    }
}

/// Named set of envs and groups
///
/// `mask` and `order` are filled in when the factory is sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvGroup {
    pub(crate) name: String,
    pub(crate) id: GroupId,
    pub(crate) members: Vec<EnvKey>,
    pub(crate) mask: EnvMask,
    pub(crate) order: usize,
}

impl EnvGroup {
    /// Group name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Direct members
    #[inline]
    #[must_use]
    pub fn members(&self) -> &[EnvKey] {
        &self.members
    }

    /// Union of all descendant env bits
    #[inline]
    #[must_use]
    pub fn mask(&self) -> &EnvMask {
        &self.mask
    }

    /// Specificity order: number of leaf envs covered, lower is more specific
    #[inline]
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }
}

impl Display for EnvGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EnvGroup('{}')", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_key_from_ids() {
        assert_eq!(EnvKey::from(EnvId(2)), EnvKey::Env(EnvId(2)));
        assert_eq!(EnvKey::from(GroupId(0)), EnvKey::Group(GroupId(0)));
    }

    #[test]
    fn env_display_and_mask() {
        let env = Env {
            name: "prod".into(),
            id: EnvId(3),
            allow_todo: false,
        };

        assert_eq!(env.to_string(), "Env('prod')");
        assert!(env.mask().contains(3));
        assert_eq!(env.mask().count(), 1);
    }
}
