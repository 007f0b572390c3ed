//! Subscription targets and upgrade paths.

mod common;

use catalog::{Gvk, Property};
use common::*;
use proptest::prelude::*;
use resolver::{ErrorKind, InstalledState, ResolutionError, Resolver, StepKind, StepReason};

#[test]
fn test_fresh_etcd_subscription_installs_only_the_head() {
    let catalog = model(vec![etcd()]);
    let sub = subscription("etcd", "etcd").on_channel("singlenamespace-alpha");

    let generation = Resolver::new(&catalog).resolve(&[sub], &InstalledState::new()).unwrap();

    assert_eq!(generation.steps.len(), 1);
    let step = &generation.steps[0];
    assert_eq!(step.bundle, "etcdoperator.v0.9.4");
    assert_eq!(step.package, "etcd");
    assert_eq!(step.channel, "singlenamespace-alpha");
    assert_eq!(step.version, "0.9.4");
    assert_eq!(step.target_namespace, NAMESPACE);
    assert_eq!(step.kind, StepKind::Install);
    assert_eq!(step.replaces, None);
    assert_eq!(
        step.reason,
        StepReason::Subscription {
            name: format!("{NAMESPACE}/etcd")
        }
    );
    assert_eq!(generation.resolved_bundle("etcd"), Some("etcdoperator.v0.9.4"));
}

#[test]
fn test_default_channel_is_used_when_none_is_named() {
    let catalog = model(vec![etcd()]);
    let generation = Resolver::new(&catalog)
        .resolve(&[subscription("etcd", "etcd")], &InstalledState::new())
        .unwrap();
    assert_eq!(generation.steps[0].channel, "singlenamespace-alpha");
}

#[test]
fn test_starting_csv_is_installed_instead_of_the_head() {
    let catalog = model(vec![etcd()]);
    let sub = subscription("etcd", "etcd").starting_at("etcdoperator.v0.9.0");

    let generation = Resolver::new(&catalog).resolve(&[sub], &InstalledState::new()).unwrap();
    assert_eq!(summary(&generation), [(StepKind::Install, "etcdoperator.v0.9.0".to_string(), None)]);
}

#[test]
fn test_replaces_chain_is_followed_one_hop_at_a_time() {
    let catalog = model(vec![package(
        "p",
        "stable",
        vec![
            bundle("a", "p", "1.0.0"),
            bundle("b", "p", "2.0.0").with_replaces("a"),
            bundle("c", "p", "3.0.0").with_replaces("b"),
        ],
    )]);
    let installed = InstalledState::new().with(installed("a", "p", "1.0.0"));

    let generation = Resolver::new(&catalog).resolve(&[subscription("p", "p")], &installed).unwrap();

    assert_eq!(
        summary(&generation),
        [
            (StepKind::Upgrade, "b".to_string(), Some("a".to_string())),
            (StepKind::Upgrade, "c".to_string(), Some("b".to_string())),
        ]
    );
}

#[test]
fn test_skip_edge_is_used_when_the_middle_bundle_is_missing() {
    let catalog = model(vec![package(
        "p",
        "stable",
        vec![
            bundle("a", "p", "1.0.0"),
            bundle("c", "p", "3.0.0").with_replaces("b").with_skip("a"),
        ],
    )]);
    let installed = InstalledState::new().with(installed("a", "p", "1.0.0"));

    let generation = Resolver::new(&catalog).resolve(&[subscription("p", "p")], &installed).unwrap();

    assert_eq!(
        summary(&generation),
        [(StepKind::Upgrade, "c".to_string(), Some("a".to_string()))]
    );
}

#[test]
fn test_missing_middle_bundle_without_skip_has_no_upgrade_path() {
    let catalog = model(vec![package(
        "p",
        "stable",
        vec![bundle("c", "p", "3.0.0").with_replaces("b")],
    )]);
    let installed = InstalledState::new().with(installed("a", "p", "1.0.0"));

    let err = Resolver::new(&catalog)
        .resolve(&[subscription("p", "p")], &installed)
        .unwrap_err();

    assert!(matches!(
        &err,
        ResolutionError::NoUpgradePath { installed, head, .. } if installed == "a" && head == "c"
    ));
    assert_eq!(err.kind(), ErrorKind::Unsatisfiable);
}

/// p: a -> b -> c by `replaces`; `b` is customised by `middle`.
fn chain_with_middle(middle: impl FnOnce(catalog::Bundle) -> catalog::Bundle, c_skips_a: bool) -> catalog::Package {
    let c = bundle("c", "p", "3.0.0").with_replaces("b");
    package(
        "p",
        "stable",
        vec![
            bundle("a", "p", "1.0.0"),
            middle(bundle("b", "p", "2.0.0").with_replaces("a")),
            if c_skips_a { c.with_skip("a") } else { c },
        ],
    )
}

#[test]
fn test_requirements_of_intermediate_hops_are_checked() {
    let catalog = model(vec![chain_with_middle(|b| requires(b, "missing.example.com", "Nope"), false)]);
    let installed = InstalledState::new().with(installed("a", "p", "1.0.0"));

    let err = Resolver::new(&catalog)
        .resolve(&[subscription("p", "p")], &installed)
        .unwrap_err();

    assert!(matches!(
        &err,
        ResolutionError::Unsatisfiable { required_by, requirement }
            if required_by == "b" && requirement.contains("Nope")
    ));
}

#[test]
fn test_api_provided_by_an_intermediate_hop_conflicts_with_another_package() {
    let catalog = model(vec![chain_with_middle(|b| provides(b, "shared.example.com", "Thing"), false)]);
    let thing = Gvk::new("shared.example.com", "v1", "Thing");
    let installed = InstalledState::new()
        .with(installed("a", "p", "1.0.0"))
        .with(installed("q.v1", "q", "1.0.0").with_property(Property::Gvk(thing.clone())));

    let err = Resolver::new(&catalog)
        .resolve(&[subscription("p", "p")], &installed)
        .unwrap_err();

    assert_eq!(
        err,
        ResolutionError::GvkConflict {
            gvk: thing,
            first: "q.v1".to_string(),
            second: "b".to_string(),
        }
    );
}

#[test]
fn test_unusable_replaces_chain_falls_back_to_skip_edge() {
    let catalog = model(vec![chain_with_middle(|b| requires(b, "missing.example.com", "Nope"), true)]);
    let installed = InstalledState::new().with(installed("a", "p", "1.0.0"));

    let generation = Resolver::new(&catalog).resolve(&[subscription("p", "p")], &installed).unwrap();

    assert_eq!(
        summary(&generation),
        [(StepKind::Upgrade, "c".to_string(), Some("a".to_string()))]
    );
}

#[test]
fn test_usable_replaces_chain_is_preferred_over_skip_edge() {
    let catalog = model(vec![chain_with_middle(|b| b, true)]);
    let installed = InstalledState::new().with(installed("a", "p", "1.0.0"));

    let generation = Resolver::new(&catalog).resolve(&[subscription("p", "p")], &installed).unwrap();

    assert_eq!(
        summary(&generation),
        [
            (StepKind::Upgrade, "b".to_string(), Some("a".to_string())),
            (StepKind::Upgrade, "c".to_string(), Some("b".to_string())),
        ]
    );
}

#[test]
fn test_installed_head_produces_no_steps() {
    let catalog = model(vec![etcd()]);
    let installed = InstalledState::new().with(installed("etcdoperator.v0.9.4", "etcd", "0.9.4"));

    let generation = Resolver::new(&catalog)
        .resolve(&[subscription("etcd", "etcd")], &installed)
        .unwrap();

    assert!(generation.is_empty());
    assert_eq!(generation.resolved_bundle("etcd"), Some("etcdoperator.v0.9.4"));
}

#[test]
fn test_malformed_channel_fails_before_search() {
    let broken = package(
        "broken",
        "stable",
        vec![bundle("x", "broken", "1.0.0"), bundle("y", "broken", "2.0.0")],
    );
    let catalog = model(vec![etcd(), broken]);

    // Only etcd is subscribed; the broken package still fails validation.
    let err = Resolver::new(&catalog)
        .resolve(&[subscription("etcd", "etcd")], &InstalledState::new())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedCatalog);
    assert!(err.to_string().contains("multiple heads"));
}

#[test]
fn test_unknown_package_channel_and_starting_csv() {
    let catalog = model(vec![etcd()]);
    let none = InstalledState::new();
    let resolver = Resolver::new(&catalog);

    assert!(matches!(
        resolver.resolve(&[subscription("s", "nope")], &none),
        Err(ResolutionError::UnknownPackage { .. })
    ));
    assert!(matches!(
        resolver.resolve(&[subscription("s", "etcd").on_channel("beta")], &none),
        Err(ResolutionError::UnknownChannel { .. })
    ));
    assert!(matches!(
        resolver.resolve(&[subscription("s", "etcd").starting_at("etcdoperator.v9")], &none),
        Err(ResolutionError::UnknownBundle { .. })
    ));
}

#[test]
fn test_two_subscriptions_for_one_package_conflict() {
    let catalog = model(vec![etcd()]);
    let err = Resolver::new(&catalog)
        .resolve(
            &[subscription("second", "etcd"), subscription("first", "etcd")],
            &InstalledState::new(),
        )
        .unwrap_err();

    assert_eq!(
        err,
        ResolutionError::SubscriptionConflict {
            package: "etcd".to_string(),
            first: format!("{NAMESPACE}/first"),
            second: format!("{NAMESPACE}/second"),
        }
    );
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

proptest! {
    #[test]
    fn test_upgrades_walk_the_remaining_chain(len in 1usize..8, start in 0usize..8) {
        let start = start % len;
        let bundles = (0..len)
            .map(|i| {
                let b = bundle(&format!("p.v{i}"), "p", &format!("{i}.0.0"));
                if i == 0 { b } else { b.with_replaces(format!("p.v{}", i - 1)) }
            })
            .collect();
        let catalog = model(vec![package("p", "stable", bundles)]);
        let resolver = Resolver::new(&catalog);

        let fresh = resolver.resolve(&[subscription("p", "p")], &InstalledState::new()).unwrap();
        prop_assert_eq!(fresh.steps.len(), 1);
        prop_assert_eq!(&fresh.steps[0].bundle, &format!("p.v{}", len - 1));

        let current = installed(&format!("p.v{start}"), "p", &format!("{start}.0.0"));
        let upgrade = resolver
            .resolve(&[subscription("p", "p")], &InstalledState::new().with(current))
            .unwrap();
        prop_assert_eq!(upgrade.steps.len(), len - 1 - start);
        for (offset, step) in upgrade.steps.iter().enumerate() {
            let hop = start + offset + 1;
            prop_assert_eq!(&step.bundle, &format!("p.v{hop}"));
            prop_assert_eq!(step.replaces.clone(), Some(format!("p.v{}", hop - 1)));
        }
    }
}
