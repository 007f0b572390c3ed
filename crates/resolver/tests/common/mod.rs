//! Catalog fixtures shared by the resolver scenarios.
#![allow(dead_code)]

use catalog::{Bundle, Channel, Gvk, Model, Package, Property};
use resolver::{InstalledBundle, SubscriptionRequest};
use semver::Version;

pub const NAMESPACE: &str = "operators";

/// Bundle `name` of `package` at `version`, channel stamped later.
pub fn bundle(name: &str, package: &str, version: &str) -> Bundle {
    Bundle::new(name, package, "", version).with_image(format!("quay.io/example/{name}:latest"))
}

pub fn provides(bundle: Bundle, group: &str, kind: &str) -> Bundle {
    bundle.with_property(Property::Gvk(Gvk::new(group, "v1", kind)))
}

pub fn requires(bundle: Bundle, group: &str, kind: &str) -> Bundle {
    bundle.with_property(Property::GvkRequired(Gvk::new(group, "v1", kind)))
}

/// Single-channel package.
pub fn package(name: &str, channel: &str, bundles: Vec<Bundle>) -> Package {
    let channel = bundles
        .into_iter()
        .fold(Channel::new(name, channel), Channel::with_bundle);
    Package::new(name, channel.name.clone()).with_channel(channel)
}

pub fn model(packages: Vec<Package>) -> Model {
    packages.into_iter().fold(Model::new(), Model::with_package)
}

pub fn subscription(name: &str, package: &str) -> SubscriptionRequest {
    SubscriptionRequest::new(NAMESPACE, name, package)
}

pub fn installed(name: &str, package: &str, version: &str) -> InstalledBundle {
    InstalledBundle::new(name, package, Version::parse(version).unwrap(), NAMESPACE)
}

/// The etcd operator catalog: head `etcdoperator.v0.9.4` replacing three
/// older versions in `singlenamespace-alpha`.
pub fn etcd() -> Package {
    let crd = |b: Bundle| provides(b, "etcd.database.coreos.com", "EtcdCluster");
    package(
        "etcd",
        "singlenamespace-alpha",
        vec![
            crd(bundle("etcdoperator.v0.6.1", "etcd", "0.6.1")),
            crd(bundle("etcdoperator.v0.9.0", "etcd", "0.9.0").with_replaces("etcdoperator.v0.6.1")),
            crd(bundle("etcdoperator.v0.9.2", "etcd", "0.9.2").with_replaces("etcdoperator.v0.9.0")),
            crd(bundle("etcdoperator.v0.9.4", "etcd", "0.9.4").with_replaces("etcdoperator.v0.9.2")),
        ],
    )
}

/// `(kind, bundle, replaces)` of every step, for compact assertions.
pub fn summary(generation: &resolver::Generation) -> Vec<(resolver::StepKind, String, Option<String>)> {
    generation
        .steps
        .iter()
        .map(|s| (s.kind, s.bundle.clone(), s.replaces.clone()))
        .collect()
}
