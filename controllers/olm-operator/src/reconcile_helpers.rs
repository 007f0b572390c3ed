//! Helper functions shared by the reconcilers
//!
//! Conversions between cluster objects and resolver inputs, and the status
//! transitions of a Subscription.

use catalog::{Gvk, Model, Property};
use chrono::{DateTime, Utc};
use crds::{
    ClusterServiceVersion, PlannedStep, Subscription, SubscriptionCondition, SubscriptionState, SubscriptionStatus,
    RESOLUTION_FAILED,
};
use kube::ResourceExt;
use resolver::{Generation, InstalledBundle, InstalledState, ResolutionError, SubscriptionRequest};
use semver::Version;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolver request for a subscription object.
pub fn subscription_request(sub: &Subscription) -> SubscriptionRequest {
    let mut request = SubscriptionRequest::new(sub.namespace().unwrap_or_default(), sub.name_any(), &sub.spec.package);
    if let Some(channel) = &sub.spec.channel {
        request = request.on_channel(channel);
    }
    if let Some(csv) = &sub.spec.starting_csv {
        request = request.starting_at(csv);
    }
    request
}

/// Installed bundles of `namespace`, from the CSVs in the cache.
///
/// Copied CSVs are skipped, as are CSVs whose package the catalog does not
/// know or whose version is not semver.
pub fn installed_state(csvs: &[Arc<ClusterServiceVersion>], model: &Model, namespace: &str) -> InstalledState {
    let mut state = InstalledState::new();
    for csv in csvs
        .iter()
        .filter(|c| c.namespace().as_deref() == Some(namespace) && c.copied_from().is_none())
    {
        let name = csv.name_any();
        let Some(bundle) = model.lookup_bundle(&name) else {
            debug!("CSV {}/{} is not in the catalog; ignoring", namespace, name);
            continue;
        };
        let version = match Version::parse(&csv.spec.version) {
            Ok(v) => v,
            Err(e) => {
                warn!("CSV {}/{} has invalid version {:?}: {}", namespace, name, csv.spec.version, e);
                continue;
            }
        };
        let mut installed = InstalledBundle::new(name, bundle.package.clone(), version, namespace);
        for api in &csv.spec.provided {
            installed = installed.with_property(Property::Gvk(Gvk::new(&api.group, &api.version, &api.kind)));
        }
        for api in &csv.spec.required {
            installed = installed.with_property(Property::GvkRequired(Gvk::new(&api.group, &api.version, &api.kind)));
        }
        for required in bundle.required_packages() {
            installed = installed.with_property(Property::PackageRequired(required.clone()));
        }
        state.insert(installed);
    }
    state
}

/// Status after a successful resolution.
pub fn resolved_status(
    existing: Option<&SubscriptionStatus>,
    package: &str,
    generation: &Generation,
    installed: &InstalledState,
    now: DateTime<Utc>,
) -> SubscriptionStatus {
    let planned_steps: Vec<PlannedStep> = generation
        .steps_for(package)
        .map(|step| PlannedStep {
            bundle: step.bundle.clone(),
            version: step.version.clone(),
            replaces: step.replaces.clone(),
            kind: format!("{:?}", step.kind),
        })
        .collect();

    let mut status = existing.cloned().unwrap_or_default();
    status.state = Some(if planned_steps.is_empty() {
        SubscriptionState::AtLatestKnown
    } else {
        SubscriptionState::UpgradePending
    });
    status.current_csv = generation.resolved_bundle(package).map(str::to_string);
    status.installed_csv = installed.get(package).map(|b| b.name.clone());
    status.planned_steps = planned_steps;
    status.set_condition(SubscriptionCondition::new(RESOLUTION_FAILED, false, now));
    status.last_updated = Some(now);
    status
}

/// Degraded status after a failed resolution.
pub fn failed_status(
    existing: Option<&SubscriptionStatus>,
    package: &str,
    error: &ResolutionError,
    installed: &InstalledState,
    now: DateTime<Utc>,
) -> SubscriptionStatus {
    let mut status = existing.cloned().unwrap_or_default();
    status.state = Some(SubscriptionState::Failed);
    status.installed_csv = installed.get(package).map(|b| b.name.clone());
    status.planned_steps.clear();
    status.set_condition(
        SubscriptionCondition::new(RESOLUTION_FAILED, true, now).with_reason(error.reason(), error.to_string()),
    );
    status.last_updated = Some(now);
    status
}

/// Whether writing `new` would change anything beyond timestamps.
pub fn status_changed(old: Option<&SubscriptionStatus>, new: &SubscriptionStatus) -> bool {
    let Some(old) = old else {
        return true;
    };
    let strip = |status: &SubscriptionStatus| {
        let mut status = status.clone();
        status.last_updated = None;
        for condition in &mut status.conditions {
            condition.last_transition_time = DateTime::<Utc>::default();
        }
        status
    };
    strip(old) != strip(new)
}
