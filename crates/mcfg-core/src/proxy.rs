//! Child slots and parent proxies
//!
//! A child slot holds the real item stored under a name or key, and an
//! optional proxy: a shared item (from a builder body or a default items
//! container) exposed in this slot for a set of envs. Reads through a proxy
//! report the slot owner as the containing item.

use crate::item::ItemId;
use mcfg_envs::{EnvId, EnvMask};

/// Shared item exposed in a slot of another item
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParentProxy {
    pub(crate) target: ItemId,
    pub(crate) envs: EnvMask,
}

/// Outcome of installing a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProxyInstall {
    Installed,
    /// A real item already occupies the slot for the env
    Shadowed,
    /// A different target is already proxied in the slot
    Conflict,
}

/// Entry of a child collection
#[derive(Debug, Clone, Default)]
pub(crate) struct ChildSlot {
    pub(crate) item: Option<ItemId>,
    pub(crate) proxy: Option<ParentProxy>,
}

impl ChildSlot {
    /// Resolve the slot for `env`: a real item included for the env wins
    /// over the proxy. Returns the item and whether it came through a proxy.
    pub(crate) fn resolve(&self, env: EnvId, included: impl Fn(ItemId) -> bool) -> Option<(ItemId, bool)> {
        if let Some(id) = self.item.filter(|id| included(*id)) {
            return Some((id, false));
        }
        self.proxy
            .as_ref()
            .filter(|p| p.envs.contains(env.index()) && included(p.target))
            .map(|p| (p.target, true))
    }

    pub(crate) fn install_proxy(
        &mut self,
        target: ItemId,
        env: EnvId,
        real_included: bool,
    ) -> ProxyInstall {
        if real_included {
            return ProxyInstall::Shadowed;
        }
        match &mut self.proxy {
            Some(proxy) if proxy.target != target => ProxyInstall::Conflict,
            Some(proxy) => {
                proxy.envs.set(env.index());
                ProxyInstall::Installed
            }
            None => {
                self.proxy = Some(ParentProxy {
                    target,
                    envs: EnvMask::bit(env.index()),
                });
                ProxyInstall::Installed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcfg_envs::EnvFactory;

    fn two_envs() -> (EnvId, EnvId) {
        let mut f = EnvFactory::new();
        (f.env("a").unwrap(), f.env("b").unwrap())
    }

    #[test]
    fn real_item_wins_over_proxy() {
        let (a, _) = two_envs();
        let mut slot = ChildSlot {
            item: Some(ItemId(1)),
            proxy: None,
        };
        assert_eq!(slot.install_proxy(ItemId(2), a, false), ProxyInstall::Installed);
        assert_eq!(slot.resolve(a, |_| true), Some((ItemId(1), false)));
        // Real item excluded for the env, the proxy shows through
        assert_eq!(slot.resolve(a, |id| id != ItemId(1)), Some((ItemId(2), true)));
    }

    #[test]
    fn proxy_is_per_env() {
        let (a, b) = two_envs();
        let mut slot = ChildSlot::default();
        slot.install_proxy(ItemId(2), a, false);
        assert_eq!(slot.resolve(a, |_| true), Some((ItemId(2), true)));
        assert_eq!(slot.resolve(b, |_| true), None);
    }

    #[test]
    fn conflicting_target_detected() {
        let (a, b) = two_envs();
        let mut slot = ChildSlot::default();
        slot.install_proxy(ItemId(2), a, false);
        assert_eq!(slot.install_proxy(ItemId(3), b, false), ProxyInstall::Conflict);
        assert_eq!(slot.install_proxy(ItemId(2), b, true), ProxyInstall::Shadowed);
    }
}
