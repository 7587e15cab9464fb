//! EnvFactory - owner of the env hierarchy
//!
//! Provides [`EnvFactory`] for defining envs and groups, computing group
//! specificity and resolving the most specific of a set of candidates.

use crate::env::{Env, EnvGroup, EnvId, EnvKey, GroupId};
use crate::mask::EnvMask;
use indexmap::IndexMap;

/// Name of the implicit group covering every env, added when sealing
pub const DEFAULT_GROUP: &str = "default";

/// Env hierarchy errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvError {
    /// Name already used by an env or group
    #[error("duplicate env or group name: '{0}'")]
    DuplicateName(String),

    /// Name is not an identifier
    #[error("invalid env or group name: '{0}'")]
    InvalidName(String),

    /// Group defined without members
    #[error("group '{0}' has no members")]
    EmptyGroup(String),

    /// Name not defined in this factory
    #[error("unknown env or group: '{0}'")]
    Unknown(String),

    /// Key does not belong to this factory
    #[error("env key {0:?} does not belong to this factory")]
    ForeignKey(EnvKey),

    /// Factory cannot be changed after sealing
    #[error("env factory is sealed, no more envs or groups can be defined")]
    Sealed,

    /// Specificity was requested before it was computed
    #[error("env factory is not sealed, specificity order is not computed yet")]
    NotSealed,

    /// Sealing a factory without envs
    #[error("env factory has no envs")]
    NoEnvs,

    /// Two or more equally specific candidates match the env
    #[error("ambiguous env specification for '{env}': {candidates:?} are equally specific")]
    Ambiguous {
        /// Env being resolved
        env: String,
        /// Names of the conflicting candidates
        candidates: Vec<String>,
    },
}

/// Owner of envs and groups
///
/// Envs get consecutive bit positions in definition order. Groups can only
/// reference already defined envs and groups, so the hierarchy is acyclic by
/// construction.
///
/// # Example
/// ```
/// use mcfg_envs::EnvFactory;
///
/// let mut factory = EnvFactory::new();
/// let dev = factory.env("dev").unwrap();
/// factory.seal().unwrap();
///
/// assert_eq!(factory.env_by_id(dev).unwrap().name(), "dev");
/// assert!(factory.lookup("default").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EnvFactory {
    envs: Vec<Env>,
    groups: Vec<EnvGroup>,
    names: IndexMap<String, EnvKey>,
    sealed: bool,
}

impl EnvFactory {
    /// Create empty factory
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define an env that does not tolerate todo values
    ///
    /// # Errors
    /// Returns error if the factory is sealed or the name is invalid or taken
    pub fn env(&mut self, name: &str) -> Result<EnvId, EnvError> {
        self.env_with_todo(name, false)
    }

    /// Define an env, choosing whether todo values are tolerated
    ///
    /// # Errors
    /// Returns error if the factory is sealed or the name is invalid or taken
    pub fn env_with_todo(&mut self, name: &str, allow_todo: bool) -> Result<EnvId, EnvError> {
        self.check_new_name(name)?;
        let id = EnvId(self.envs.len());
        self.envs.push(Env {
            name: name.to_string(),
            id,
            allow_todo,
        });
        self.names.insert(name.to_string(), EnvKey::Env(id));
        Ok(id)
    }

    /// Define a group of previously defined envs and groups
    ///
    /// # Errors
    /// Returns error if the factory is sealed, the name is invalid or taken,
    /// the member list is empty or a member is not from this factory
    pub fn group(&mut self, name: &str, members: &[EnvKey]) -> Result<GroupId, EnvError> {
        self.check_new_name(name)?;
        if members.is_empty() {
            return Err(EnvError::EmptyGroup(name.to_string()));
        }
        for member in members {
            self.check_key(*member)?;
        }

        let id = GroupId(self.groups.len());
        self.groups.push(EnvGroup {
            name: name.to_string(),
            id,
            members: members.to_vec(),
            mask: EnvMask::empty(),
            order: 0,
        });
        self.names.insert(name.to_string(), EnvKey::Group(id));
        Ok(id)
    }

    /// Compute group masks and specificity order, and add the default group
    ///
    /// # Errors
    /// Returns error if already sealed or no env was defined
    pub fn seal(&mut self) -> Result<(), EnvError> {
        if self.sealed {
            return Err(EnvError::Sealed);
        }
        if self.envs.is_empty() {
            return Err(EnvError::NoEnvs);
        }
        if self.names.contains_key(DEFAULT_GROUP) {
            return Err(EnvError::DuplicateName(DEFAULT_GROUP.to_string()));
        }

        // Members always have lower group ids, so one pass in id order suffices
        for i in 0..self.groups.len() {
            let mut mask = EnvMask::empty();
            for member in &self.groups[i].members {
                match member {
                    EnvKey::Env(env) => mask.set(env.0),
                    EnvKey::Group(group) => mask.union_with(&self.groups[group.0].mask),
                }
            }
            self.groups[i].order = mask.count();
            self.groups[i].mask = mask;
        }

        let id = GroupId(self.groups.len());
        let mask: EnvMask = self.envs.iter().map(|e| e.id.0).collect();
        self.groups.push(EnvGroup {
            name: DEFAULT_GROUP.to_string(),
            id,
            members: self.envs.iter().map(|e| EnvKey::Env(e.id)).collect(),
            order: mask.count(),
            mask,
        });
        self.names.insert(DEFAULT_GROUP.to_string(), EnvKey::Group(id));
        self.sealed = true;
        Ok(())
    }

    /// True once specificity has been computed
    #[inline]
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of envs
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.envs.len()
    }

    /// True if no env is defined
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    /// All envs in bit order
    pub fn envs(&self) -> impl Iterator<Item = &Env> {
        self.envs.iter()
    }

    /// All groups in definition order
    pub fn groups(&self) -> impl Iterator<Item = &EnvGroup> {
        self.groups.iter()
    }

    /// Look up an env or group by name
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<EnvKey> {
        self.names.get(name).copied()
    }

    /// Look up an env or group by name
    ///
    /// # Errors
    /// Returns [`EnvError::Unknown`] if no env or group has this name
    pub fn key(&self, name: &str) -> Result<EnvKey, EnvError> {
        self.lookup(name)
            .ok_or_else(|| EnvError::Unknown(name.to_string()))
    }

    /// Look up a leaf env by name
    ///
    /// # Errors
    /// Returns [`EnvError::Unknown`] if no env has this name
    pub fn env_named(&self, name: &str) -> Result<&Env, EnvError> {
        match self.lookup(name) {
            Some(EnvKey::Env(id)) => Ok(&self.envs[id.0]),
            _ => Err(EnvError::Unknown(name.to_string())),
        }
    }

    /// Env by identity
    #[must_use]
    pub fn env_by_id(&self, id: EnvId) -> Option<&Env> {
        self.envs.get(id.0)
    }

    /// Group by identity
    #[must_use]
    pub fn group_by_id(&self, id: GroupId) -> Option<&EnvGroup> {
        self.groups.get(id.0)
    }

    /// The implicit group covering every env
    ///
    /// # Errors
    /// Returns [`EnvError::NotSealed`] before sealing
    pub fn default_group(&self) -> Result<GroupId, EnvError> {
        match self.lookup(DEFAULT_GROUP) {
            Some(EnvKey::Group(id)) if self.sealed => Ok(id),
            _ => Err(EnvError::NotSealed),
        }
    }

    /// Name of an env or group
    ///
    /// # Errors
    /// Returns [`EnvError::ForeignKey`] if the key is not from this factory
    pub fn key_name(&self, key: EnvKey) -> Result<&str, EnvError> {
        let name = match key {
            EnvKey::Env(id) => self.envs.get(id.0).map(Env::name),
            EnvKey::Group(id) => self.groups.get(id.0).map(EnvGroup::name),
        };
        name.ok_or(EnvError::ForeignKey(key))
    }

    /// Envs covered by a key
    ///
    /// # Errors
    /// Returns error before sealing or for foreign keys
    pub fn coverage(&self, key: EnvKey) -> Result<EnvMask, EnvError> {
        self.require_sealed()?;
        self.check_key(key)?;
        Ok(match key {
            EnvKey::Env(id) => EnvMask::bit(id.0),
            EnvKey::Group(id) => self.groups[id.0].mask.clone(),
        })
    }

    /// Specificity order of a key, an env has order 1
    ///
    /// # Errors
    /// Returns error before sealing or for foreign keys
    pub fn order(&self, key: EnvKey) -> Result<usize, EnvError> {
        self.require_sealed()?;
        self.check_key(key)?;
        Ok(match key {
            EnvKey::Env(_) => 1,
            EnvKey::Group(id) => self.groups[id.0].order,
        })
    }

    /// True if `key` covers `env`
    ///
    /// # Errors
    /// Returns error before sealing or for foreign keys
    pub fn covers(&self, key: EnvKey, env: EnvId) -> Result<bool, EnvError> {
        self.require_sealed()?;
        self.check_key(key)?;
        Ok(match key {
            EnvKey::Env(id) => id == env,
            EnvKey::Group(id) => self.groups[id.0].mask.contains(env.0),
        })
    }

    /// True if `new` covers a strict subset of what `old` covers
    ///
    /// # Errors
    /// Returns error before sealing or for foreign keys
    pub fn is_more_specific(&self, new: EnvKey, old: EnvKey) -> Result<bool, EnvError> {
        Ok(self.coverage(new)?.is_strict_subset(&self.coverage(old)?))
    }

    /// Select the most specific candidate covering `env`
    ///
    /// Returns `Ok(None)` if no candidate covers the env.
    ///
    /// # Errors
    /// Returns [`EnvError::Ambiguous`] if several distinct candidates share
    /// the smallest order
    pub fn resolve_most_specific<I>(&self, candidates: I, env: EnvId) -> Result<Option<EnvKey>, EnvError>
    where
        I: IntoIterator<Item = EnvKey>,
    {
        let best = self.best_matches(candidates.into_iter().map(|key| (key, ())), env)?;
        if best.len() > 1 {
            return Err(self.ambiguous(env, best.iter().map(|(key, ())| *key)));
        }
        Ok(best.first().map(|(key, ())| *key))
    }

    /// Decide whether `env` is included given exclude and include lists
    ///
    /// The most specific entry covering the env across both lists decides.
    /// Without any covering entry the env is included unless an include list
    /// was given.
    ///
    /// # Errors
    /// Returns [`EnvError::Ambiguous`] if equally specific entries of both
    /// lists cover the env
    pub fn select_env_list(
        &self,
        env: EnvId,
        exclude: &[EnvKey],
        include: &[EnvKey],
    ) -> Result<bool, EnvError> {
        let tagged = exclude
            .iter()
            .map(|key| (*key, false))
            .chain(include.iter().map(|key| (*key, true)));
        let best = self.best_matches(tagged, env)?;

        match best.first() {
            None => Ok(include.is_empty()),
            Some((_, included)) => {
                if best.iter().any(|(_, other)| other != included) {
                    return Err(self.ambiguous(env, best.iter().map(|(key, _)| *key)));
                }
                Ok(*included)
            }
        }
    }

    /// Candidates covering `env` with the smallest order
    ///
    /// Candidates with the same tag covering exactly the same envs count as
    /// one match, so an env and a group holding only that env never conflict.
    fn best_matches<T, I>(&self, tagged: I, env: EnvId) -> Result<Vec<(EnvKey, T)>, EnvError>
    where
        T: Copy + PartialEq,
        I: IntoIterator<Item = (EnvKey, T)>,
    {
        self.require_sealed()?;
        let mut best: Vec<(EnvKey, T, EnvMask)> = Vec::new();
        let mut best_order = usize::MAX;

        for (key, tag) in tagged {
            if !self.covers(key, env)? {
                continue;
            }
            let order = self.order(key)?;
            if order < best_order {
                best_order = order;
                best.clear();
            }
            if order != best_order {
                continue;
            }
            let mask = self.coverage(key)?;
            if !best.iter().any(|(_, t, m)| *t == tag && *m == mask) {
                best.push((key, tag, mask));
            }
        }
        Ok(best.into_iter().map(|(key, tag, _)| (key, tag)).collect())
    }

    fn ambiguous(&self, env: EnvId, keys: impl Iterator<Item = EnvKey>) -> EnvError {
        let mut candidates: Vec<String> = Vec::new();
        for key in keys {
            let name = self.key_name(key).unwrap_or("?").to_string();
            if !candidates.contains(&name) {
                candidates.push(name);
            }
        }
        EnvError::Ambiguous {
            env: self.env_by_id(env).map_or_else(|| format!("{env:?}"), |e| e.name().to_string()),
            candidates,
        }
    }

    fn require_sealed(&self) -> Result<(), EnvError> {
        if self.sealed {
            Ok(())
        } else {
            Err(EnvError::NotSealed)
        }
    }

    fn check_key(&self, key: EnvKey) -> Result<(), EnvError> {
        let known = match key {
            EnvKey::Env(id) => id.0 < self.envs.len(),
            EnvKey::Group(id) => id.0 < self.groups.len(),
        };
        if known {
            Ok(())
        } else {
            Err(EnvError::ForeignKey(key))
        }
    }

    fn check_new_name(&self, name: &str) -> Result<(), EnvError> {
        if self.sealed {
            return Err(EnvError::Sealed);
        }
        if !is_identifier(name) {
            return Err(EnvError::InvalidName(name.to_string()));
        }
        if name == DEFAULT_GROUP || self.names.contains_key(name) {
            return Err(EnvError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Fixture {
        factory: EnvFactory,
        dev: EnvId,
        prod: EnvId,
        pp: EnvId,
        g_ppr: GroupId,
        g_all: GroupId,
    }

    fn fixture() -> Fixture {
        let mut factory = EnvFactory::new();
        let dev = factory.env("dev").unwrap();
        let prod = factory.env("prod").unwrap();
        let pp = factory.env("pp").unwrap();
        let g_ppr = factory.group("g_ppr", &[prod.into(), pp.into()]).unwrap();
        let g_all = factory.group("g_all", &[dev.into(), g_ppr.into()]).unwrap();
        factory.seal().unwrap();
        Fixture {
            factory,
            dev,
            prod,
            pp,
            g_ppr,
            g_all,
        }
    }

    #[test]
    fn envs_get_consecutive_bits() {
        let f = fixture();
        assert_eq!(f.dev.index(), 0);
        assert_eq!(f.prod.index(), 1);
        assert_eq!(f.pp.index(), 2);
        assert_eq!(f.factory.len(), 3);
    }

    #[test]
    fn seal_computes_order() {
        let f = fixture();
        assert_eq!(f.factory.order(f.prod.into()).unwrap(), 1);
        assert_eq!(f.factory.order(f.g_ppr.into()).unwrap(), 2);
        assert_eq!(f.factory.order(f.g_all.into()).unwrap(), 3);

        let default = f.factory.default_group().unwrap();
        assert_eq!(f.factory.order(default.into()).unwrap(), 3);
    }

    #[test]
    fn order_before_seal_fails() {
        let mut factory = EnvFactory::new();
        let dev = factory.env("dev").unwrap();
        assert_eq!(factory.order(dev.into()), Err(EnvError::NotSealed));
        assert_eq!(
            factory.resolve_most_specific([EnvKey::from(dev)], dev),
            Err(EnvError::NotSealed)
        );
    }

    #[test]
    fn define_after_seal_fails() {
        let mut f = fixture();
        assert_eq!(f.factory.env("late"), Err(EnvError::Sealed));
    }

    #[test]
    fn duplicate_and_invalid_names_rejected() {
        let mut factory = EnvFactory::new();
        factory.env("dev").unwrap();
        assert_eq!(factory.env("dev"), Err(EnvError::DuplicateName("dev".into())));
        assert_eq!(factory.env("default"), Err(EnvError::DuplicateName("default".into())));
        assert_eq!(factory.env("1st"), Err(EnvError::InvalidName("1st".into())));
        assert_eq!(factory.group("g", &[]), Err(EnvError::EmptyGroup("g".into())));
    }

    #[test]
    fn most_specific_group_wins() {
        let f = fixture();
        let candidates = [EnvKey::from(f.g_ppr), EnvKey::from(f.prod)];

        assert_eq!(
            f.factory.resolve_most_specific(candidates, f.prod).unwrap(),
            Some(f.prod.into())
        );
        assert_eq!(
            f.factory.resolve_most_specific(candidates, f.pp).unwrap(),
            Some(f.g_ppr.into())
        );
        assert_eq!(f.factory.resolve_most_specific(candidates, f.dev).unwrap(), None);
    }

    #[test]
    fn equally_specific_groups_are_ambiguous() {
        let mut factory = EnvFactory::new();
        let a = factory.env("a").unwrap();
        let b = factory.env("b").unwrap();
        let c = factory.env("c").unwrap();
        let g1 = factory.group("g1", &[a.into(), b.into()]).unwrap();
        let g2 = factory.group("g2", &[b.into(), c.into()]).unwrap();
        factory.seal().unwrap();

        let err = factory
            .resolve_most_specific([EnvKey::from(g1), EnvKey::from(g2)], b)
            .unwrap_err();
        assert_eq!(
            err,
            EnvError::Ambiguous {
                env: "b".into(),
                candidates: vec!["g1".into(), "g2".into()],
            }
        );

        // Only one of them covers a
        assert_eq!(
            factory.resolve_most_specific([EnvKey::from(g1), EnvKey::from(g2)], a).unwrap(),
            Some(g1.into())
        );
    }

    #[test]
    fn duplicate_candidate_is_not_ambiguous() {
        let f = fixture();
        let candidates = [EnvKey::from(f.g_ppr), EnvKey::from(f.g_ppr)];
        assert_eq!(
            f.factory.resolve_most_specific(candidates, f.pp).unwrap(),
            Some(f.g_ppr.into())
        );
    }

    #[test]
    fn select_env_list_most_specific_decides() {
        let f = fixture();

        // Exclude the group, include prod specifically
        let exclude = [EnvKey::from(f.g_ppr)];
        let include = [EnvKey::from(f.prod)];
        assert!(f.factory.select_env_list(f.prod, &exclude, &include).unwrap());
        assert!(!f.factory.select_env_list(f.pp, &exclude, &include).unwrap());
        assert!(!f.factory.select_env_list(f.dev, &exclude, &include).unwrap());

        // No lists: included
        assert!(f.factory.select_env_list(f.dev, &[], &[]).unwrap());

        // Only exclude list: unmatched env is included
        assert!(f.factory.select_env_list(f.dev, &exclude, &[]).unwrap());
    }

    #[test]
    fn select_env_list_same_key_in_both_is_ambiguous() {
        let f = fixture();
        let keys = [EnvKey::from(f.g_ppr)];
        assert!(matches!(
            f.factory.select_env_list(f.pp, &keys, &keys),
            Err(EnvError::Ambiguous { .. })
        ));
    }

    #[test]
    fn foreign_key_rejected() {
        let f = fixture();
        let foreign = EnvKey::Group(GroupId(99));
        assert_eq!(f.factory.order(foreign), Err(EnvError::ForeignKey(foreign)));
    }

    #[test]
    fn more_specific_is_strict() {
        let f = fixture();
        assert!(f.factory.is_more_specific(f.prod.into(), f.g_ppr.into()).unwrap());
        assert!(!f.factory.is_more_specific(f.g_ppr.into(), f.g_ppr.into()).unwrap());
        assert!(!f.factory.is_more_specific(f.g_ppr.into(), f.prod.into()).unwrap());
    }
}
