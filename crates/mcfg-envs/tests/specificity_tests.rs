use mcfg_envs::{EnvError, EnvFactory, EnvId, EnvKey, GroupId};
use proptest::prelude::*;

/// Factory with `n` envs, one group per consecutive pair and a nested group
/// containing the first pair group and the next env.
fn chain_factory(n: usize) -> (EnvFactory, Vec<EnvId>, Vec<GroupId>) {
    let mut factory = EnvFactory::new();
    let envs: Vec<EnvId> = (0..n).map(|i| factory.env(&format!("e{i}")).unwrap()).collect();
    let mut groups = Vec::new();
    for i in 0..n.saturating_sub(1) {
        let g = factory
            .group(&format!("pair{i}"), &[envs[i].into(), envs[i + 1].into()])
            .unwrap();
        groups.push(g);
    }
    if n >= 3 {
        let g = factory
            .group("outer", &[groups[0].into(), envs[2].into()])
            .unwrap();
        groups.push(g);
    }
    factory.seal().unwrap();
    (factory, envs, groups)
}

#[test]
fn nested_group_order_counts_leaf_envs() {
    let (factory, _envs, groups) = chain_factory(4);
    let outer = *groups.last().unwrap();
    assert_eq!(factory.order(outer.into()).unwrap(), 3);
}

#[test]
fn env_beats_every_group() {
    let (factory, envs, groups) = chain_factory(4);
    let mut candidates: Vec<EnvKey> = groups.iter().map(|g| EnvKey::from(*g)).collect();
    candidates.push(envs[1].into());
    candidates.push(factory.default_group().unwrap().into());

    assert_eq!(
        factory.resolve_most_specific(candidates, envs[1]).unwrap(),
        Some(envs[1].into())
    );
}

#[test]
fn overlapping_pairs_are_ambiguous_for_shared_env() {
    let (factory, envs, groups) = chain_factory(3);
    let err = factory
        .resolve_most_specific([groups[0].into(), groups[1].into()], envs[1])
        .unwrap_err();
    assert!(matches!(err, EnvError::Ambiguous { .. }));
}

#[test]
fn env_and_single_member_group_are_not_ambiguous() {
    let mut factory = EnvFactory::new();
    let prod = factory.env("prod").unwrap();
    factory.env("dev").unwrap();
    let only_prod = factory.group("g_prod", &[prod.into()]).unwrap();
    factory.seal().unwrap();

    let picked = factory
        .resolve_most_specific([EnvKey::from(prod), only_prod.into()], prod)
        .unwrap();
    assert_eq!(picked, Some(prod.into()));
}

#[test]
fn same_coverage_on_both_lists_is_still_ambiguous() {
    let mut factory = EnvFactory::new();
    let prod = factory.env("prod").unwrap();
    factory.env("dev").unwrap();
    let only_prod = factory.group("g_prod", &[prod.into()]).unwrap();
    factory.seal().unwrap();

    let err = factory
        .select_env_list(prod, &[only_prod.into()], &[prod.into()])
        .unwrap_err();
    assert!(matches!(err, EnvError::Ambiguous { .. }));
}

proptest! {
    #[test]
    fn prop_narrower_group_always_wins(n in 3usize..12, pick in 0usize..64) {
        let (factory, envs, groups) = chain_factory(n);
        let env = envs[pick % n];
        let default: EnvKey = factory.default_group().unwrap().into();

        // The default group and any single covering pair: the pair must win
        for group in groups.iter().take(n - 1) {
            if factory.covers((*group).into(), env).unwrap() {
                let best = factory.resolve_most_specific([default, (*group).into()], env).unwrap();
                prop_assert_eq!(best, Some((*group).into()));
            }
        }

        // The env itself beats the default group
        let best = factory.resolve_most_specific([default, env.into()], env).unwrap();
        prop_assert_eq!(best, Some(env.into()));
    }

    #[test]
    fn prop_resolution_result_covers_env(n in 3usize..12, pick in 0usize..64, mask in 0u32..1024) {
        let (factory, envs, groups) = chain_factory(n);
        let env = envs[pick % n];
        let candidates: Vec<EnvKey> = groups
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << (i % 10)) != 0)
            .map(|(_, g)| EnvKey::from(*g))
            .collect();

        match factory.resolve_most_specific(candidates.clone(), env) {
            Ok(Some(best)) => {
                prop_assert!(factory.covers(best, env).unwrap());
                let best_order = factory.order(best).unwrap();
                for c in &candidates {
                    if factory.covers(*c, env).unwrap() {
                        prop_assert!(factory.order(*c).unwrap() >= best_order);
                    }
                }
            }
            Ok(None) => {
                for c in &candidates {
                    prop_assert!(!factory.covers(*c, env).unwrap());
                }
            }
            Err(EnvError::Ambiguous { candidates: names, .. }) => {
                prop_assert!(names.len() >= 2);
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }
}
