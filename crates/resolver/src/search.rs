//! Backtracking search
//!
//! The search works on an explicit stack of [`SearchState`]s. A state holds
//! the bundles chosen so far (at most one per package), which package
//! provides each API, and the demands still to be met. Demands are met in
//! FIFO order: subscriptions first, then requirements of newly chosen
//! bundles, then requirements of installed bundles that are kept as-is.
//!
//! A demand with several candidate providers forks the state once per
//! candidate, and so does a subscription with more than one upgrade route.
//! Children are pushed so the most preferred one is explored first.
//! Candidates rejected outright keep their place on the stack, so failures
//! are recorded in preference order and the first one is reported if every
//! branch fails.

use crate::error::ResolutionError;
use crate::generation::{Generation, Step, StepKind, StepReason};
use crate::input::InstalledState;
use catalog::{Bundle, Gvk, Model, Package, VersionRange};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// One bundle an upgrade passes through.
#[derive(Debug, Clone)]
pub(crate) struct Hop {
    pub bundle: String,
    pub version: String,
}

impl Hop {
    pub(crate) fn of(bundle: &Bundle) -> Result<Self, ResolutionError> {
        Ok(Self {
            bundle: bundle.name.clone(),
            version: bundle.version()?.to_string(),
        })
    }
}

/// What happens to a chosen bundle.
#[derive(Debug, Clone)]
pub(crate) enum Action {
    /// Already installed, stays as it is
    Keep,
    /// Fresh install
    Install { reason: StepReason },
    /// Step from the installed bundle through `path`
    Upgrade {
        from: String,
        path: Vec<Hop>,
        reason: StepReason,
    },
}

/// A bundle chosen for a package.
#[derive(Debug)]
pub(crate) struct Selection {
    pub package: String,
    pub channel: String,
    pub bundle: String,
    pub version: Version,
    pub namespace: String,
    pub provides: Vec<Gvk>,
    /// APIs provided along the way by the bundles an upgrade passes through,
    /// with the bundle providing each
    pub transit: Vec<(Gvk, String)>,
    pub action: Action,
}

impl Selection {
    pub(crate) fn from_bundle(bundle: &Bundle, namespace: &str, action: Action) -> Result<Self, ResolutionError> {
        Ok(Self {
            package: bundle.package.clone(),
            channel: bundle.channel.clone(),
            bundle: bundle.name.clone(),
            version: bundle.version()?,
            namespace: namespace.to_string(),
            provides: bundle.provided_gvks().cloned().collect(),
            transit: Vec::new(),
            action,
        })
    }

    /// Every API this selection puts in the cluster at some point, with the
    /// bundle that provides it.
    fn claims(&self) -> impl Iterator<Item = (&Gvk, &str)> + '_ {
        self.provides
            .iter()
            .map(move |gvk| (gvk, self.bundle.as_str()))
            .chain(self.transit.iter().map(|(gvk, bundle)| (gvk, bundle.as_str())))
    }
}

/// One way of reaching a subscription's bundle.
#[derive(Debug)]
pub(crate) struct Route<'a> {
    /// Bundles installed in order, ending at the target; each must have
    /// its requirements met
    pub bundles: Vec<&'a Bundle>,
    pub selection: Arc<Selection>,
}

impl<'a> Route<'a> {
    /// Straight to `bundle`.
    pub(crate) fn direct(bundle: &'a Bundle, namespace: &str, action: Action) -> Result<Self, ResolutionError> {
        Self::through(bundle, vec![bundle], namespace, action)
    }

    /// To `target` by way of `bundles`, which ends at `target`.
    pub(crate) fn through(
        target: &'a Bundle,
        bundles: Vec<&'a Bundle>,
        namespace: &str,
        action: Action,
    ) -> Result<Self, ResolutionError> {
        let mut selection = Selection::from_bundle(target, namespace, action)?;
        selection.transit = bundles
            .iter()
            .filter(|b| b.name != target.name)
            .flat_map(|b| b.provided_gvks().map(move |gvk| (gvk.clone(), b.name.clone())))
            .collect();
        Ok(Self {
            bundles,
            selection: Arc::new(selection),
        })
    }
}

/// Resolved subscription: the bundle it ends at and the routes there, most
/// preferred first.
#[derive(Debug)]
pub(crate) struct Target<'a> {
    pub bundle: &'a Bundle,
    pub routes: Vec<Route<'a>>,
}

#[derive(Debug)]
struct Requirer {
    bundle: String,
    package: String,
    namespace: String,
}

#[derive(Debug)]
enum Demand {
    Subscription(usize),
    Api {
        gvk: Gvk,
        requirer: Arc<Requirer>,
    },
    Package {
        package: String,
        range: VersionRange,
        requirer: Arc<Requirer>,
    },
}

/// Package and bundle that put an API in the cluster.
#[derive(Debug, Clone)]
struct Claim {
    package: String,
    bundle: String,
}

#[derive(Debug, Clone, Default)]
struct SearchState {
    selected: BTreeMap<String, Arc<Selection>>,
    /// Final provider of each API
    providers: BTreeMap<Gvk, Arc<Selection>>,
    /// Every API provided at any point, including upgrade hops
    claims: BTreeMap<Gvk, Claim>,
    pending: VecDeque<Arc<Demand>>,
    deferred: Vec<Arc<Demand>>,
    /// (requiring package, providing package)
    edges: BTreeSet<(String, String)>,
}

impl SearchState {
    fn next_demand(&mut self) -> Option<Arc<Demand>> {
        if self.pending.is_empty() {
            self.pending.extend(self.deferred.drain(..));
        }
        self.pending.pop_front()
    }

    fn select(&mut self, selection: Arc<Selection>) -> Result<(), ResolutionError> {
        for (gvk, bundle) in selection.claims() {
            if let Some(existing) = self.claims.get(gvk)
                && existing.package != selection.package
            {
                return Err(ResolutionError::GvkConflict {
                    gvk: gvk.clone(),
                    first: existing.bundle.clone(),
                    second: bundle.to_string(),
                });
            }
        }
        self.claim(&selection);
        for gvk in &selection.provides {
            self.providers.insert(gvk.clone(), Arc::clone(&selection));
        }
        self.selected.insert(selection.package.clone(), selection);
        Ok(())
    }

    fn claim(&mut self, selection: &Selection) {
        for (gvk, bundle) in selection.claims() {
            self.claims.entry(gvk.clone()).or_insert_with(|| Claim {
                package: selection.package.clone(),
                bundle: bundle.to_string(),
            });
        }
    }

    /// Selects the route's bundle and queues the requirements of every
    /// bundle along it.
    fn follow(&mut self, route: &Route<'_>) -> Result<(), ResolutionError> {
        self.select(Arc::clone(&route.selection))?;
        for bundle in &route.bundles {
            self.pending
                .extend(catalog_requirements(bundle, &route.selection.namespace)?);
        }
        Ok(())
    }
}

enum Outcome {
    Solved,
    Branch(Vec<Result<SearchState, ResolutionError>>),
    Failed(ResolutionError),
}

fn catalog_requirements(bundle: &Bundle, namespace: &str) -> Result<Vec<Arc<Demand>>, ResolutionError> {
    let requirer = Arc::new(Requirer {
        bundle: bundle.name.clone(),
        package: bundle.package.clone(),
        namespace: namespace.to_string(),
    });
    let mut demands: Vec<Arc<Demand>> = bundle
        .required_gvks()
        .map(|gvk| {
            Arc::new(Demand::Api {
                gvk: gvk.clone(),
                requirer: Arc::clone(&requirer),
            })
        })
        .collect();
    for req in bundle.required_packages() {
        demands.push(Arc::new(Demand::Package {
            package: req.package_name.clone(),
            range: VersionRange::parse(&req.version_range)?,
            requirer: Arc::clone(&requirer),
        }));
    }
    Ok(demands)
}

/// Channels of `package`, default channel first.
fn channels_by_preference(package: &Package) -> impl Iterator<Item = &catalog::Channel> {
    package
        .default_channel()
        .into_iter()
        .chain(package.channels.values().filter(|c| c.name != package.default_channel))
}

/// Ordered package names, dependencies before dependents. Ties and cycles
/// fall back to name order.
fn dependency_order<'s>(packages: impl Iterator<Item = &'s str>, edges: &BTreeSet<(String, String)>) -> Vec<&'s str> {
    let mut remaining: BTreeSet<&str> = packages.collect();
    let mut order = Vec::with_capacity(remaining.len());
    while let Some(first) = remaining.first().copied() {
        let ready = remaining
            .iter()
            .copied()
            .find(|pkg| {
                edges
                    .iter()
                    .filter(|(requirer, provider)| requirer == pkg && provider != pkg)
                    .all(|(_, provider)| !remaining.contains(provider.as_str()))
            })
            .unwrap_or(first);
        remaining.remove(ready);
        order.push(ready);
    }
    order
}

pub(crate) struct Search<'a> {
    model: &'a Model,
    targets: Vec<Target<'a>>,
    limit: usize,
}

impl<'a> Search<'a> {
    pub(crate) fn new(model: &'a Model, targets: Vec<Target<'a>>, limit: usize) -> Self {
        Self { model, targets, limit }
    }

    fn initial_state(&self, installed: &InstalledState) -> Result<SearchState, ResolutionError> {
        let subscribed: BTreeSet<&str> = self.targets.iter().map(|t| t.bundle.package.as_str()).collect();
        let mut state = SearchState::default();

        for current in installed.iter().filter(|b| !subscribed.contains(b.package.as_str())) {
            let selection = Arc::new(Selection {
                package: current.package.clone(),
                channel: String::new(),
                bundle: current.name.clone(),
                version: current.version.clone(),
                namespace: current.namespace.clone(),
                provides: current.provided_gvks().cloned().collect(),
                transit: Vec::new(),
                action: Action::Keep,
            });
            state.claim(&selection);
            // Whatever is installed already coexists; first provider in package order wins.
            for gvk in &selection.provides {
                state
                    .providers
                    .entry(gvk.clone())
                    .or_insert_with(|| Arc::clone(&selection));
            }
            state.selected.insert(current.package.clone(), selection);

            let requirer = Arc::new(Requirer {
                bundle: current.name.clone(),
                package: current.package.clone(),
                namespace: current.namespace.clone(),
            });
            for gvk in current.required_gvks() {
                state.deferred.push(Arc::new(Demand::Api {
                    gvk: gvk.clone(),
                    requirer: Arc::clone(&requirer),
                }));
            }
            for req in current.required_packages() {
                let range = VersionRange::parse(&req.version_range).map_err(|e| ResolutionError::Unsatisfiable {
                    required_by: current.name.clone(),
                    requirement: format!("package {} ({})", req.package_name, e),
                })?;
                state.deferred.push(Arc::new(Demand::Package {
                    package: req.package_name.clone(),
                    range,
                    requirer: Arc::clone(&requirer),
                }));
            }
        }

        state.pending = (0..self.targets.len()).map(|i| Arc::new(Demand::Subscription(i))).collect();
        Ok(state)
    }

    pub(crate) fn run(&self, installed: &InstalledState) -> Result<Generation, ResolutionError> {
        let mut stack: Vec<Result<SearchState, ResolutionError>> = vec![Ok(self.initial_state(installed)?)];
        let mut explored = 0usize;
        let mut first_failure: Option<ResolutionError> = None;

        while let Some(entry) = stack.pop() {
            let mut state = match entry {
                Ok(state) => state,
                Err(e) => {
                    trace!("Candidate rejected: {}", e);
                    first_failure.get_or_insert(e);
                    continue;
                }
            };
            explored += 1;
            if explored > self.limit {
                return Err(ResolutionError::SearchLimitExceeded { limit: self.limit });
            }
            match self.advance(&mut state) {
                Outcome::Solved => {
                    debug!("Resolution succeeded after exploring {} state(s)", explored);
                    return Ok(self.generation(&state));
                }
                Outcome::Branch(children) => stack.extend(children.into_iter().rev()),
                Outcome::Failed(e) => {
                    trace!("Branch failed: {}", e);
                    first_failure.get_or_insert(e);
                }
            }
        }

        Err(first_failure.unwrap_or_else(|| ResolutionError::Unsatisfiable {
            required_by: "resolution".to_string(),
            requirement: "a consistent set of bundles".to_string(),
        }))
    }

    fn advance(&self, state: &mut SearchState) -> Outcome {
        while let Some(demand) = state.next_demand() {
            let result = match demand.as_ref() {
                Demand::Subscription(i) => self.meet_subscription(state, *i),
                Demand::Api { gvk, requirer } => self.meet_api(state, gvk, requirer),
                Demand::Package {
                    package,
                    range,
                    requirer,
                } => self.meet_package(state, package, range, requirer),
            };
            match result {
                Ok(None) => {}
                Ok(Some(children)) => return Outcome::Branch(children),
                Err(e) => return Outcome::Failed(e),
            }
        }
        Outcome::Solved
    }

    fn meet_subscription(
        &self,
        state: &mut SearchState,
        index: usize,
    ) -> Result<Option<Vec<Result<SearchState, ResolutionError>>>, ResolutionError> {
        let target = &self.targets[index];
        if let [route] = target.routes.as_slice() {
            state.follow(route)?;
            return Ok(None);
        }
        debug!("{} route(s) to {}", target.routes.len(), target.bundle.name);
        Ok(Some(
            target
                .routes
                .iter()
                .map(|route| {
                    let mut child = state.clone();
                    child.follow(route)?;
                    Ok(child)
                })
                .collect(),
        ))
    }

    fn meet_api(
        &self,
        state: &mut SearchState,
        gvk: &Gvk,
        requirer: &Requirer,
    ) -> Result<Option<Vec<Result<SearchState, ResolutionError>>>, ResolutionError> {
        if let Some(provider) = state.providers.get(gvk) {
            let provider = provider.package.clone();
            state.edges.insert((requirer.package.clone(), provider));
            return Ok(None);
        }

        let mut seen = BTreeSet::new();
        let mut candidates: Vec<(&Bundle, Version)> = Vec::new();
        for package in self.model.packages().filter(|p| !state.selected.contains_key(&p.name)) {
            for channel in channels_by_preference(package) {
                for bundle in channel.bundles.values() {
                    if bundle.provided_gvks().any(|g| g == gvk) && seen.insert(bundle.name.as_str()) {
                        candidates.push((bundle, bundle.version()?));
                    }
                }
            }
        }
        candidates.sort_by(|(a, av), (b, bv)| {
            bv.cmp(av)
                .then_with(|| a.package.cmp(&b.package))
                .then_with(|| a.name.cmp(&b.name))
        });

        let Some((_, best)) = candidates.first() else {
            return Err(ResolutionError::Unsatisfiable {
                required_by: requirer.bundle.clone(),
                requirement: format!("API {gvk}"),
            });
        };
        let tied: Vec<&Bundle> = candidates.iter().take_while(|(_, v)| v == best).map(|(b, _)| *b).collect();
        let tied_packages: BTreeSet<&str> = tied.iter().map(|b| b.package.as_str()).collect();
        if tied_packages.len() > 1 {
            let mut names: Vec<String> = tied.iter().map(|b| b.name.clone()).collect();
            names.sort();
            return Err(ResolutionError::AmbiguousProvider {
                required_by: requirer.bundle.clone(),
                requirement: format!("API {gvk}"),
                candidates: names,
            });
        }

        debug!(
            "{} candidate(s) for API {} required by {}",
            candidates.len(),
            gvk,
            requirer.bundle
        );
        Ok(Some(
            candidates
                .into_iter()
                .map(|(bundle, _)| self.child(state, bundle, requirer))
                .collect(),
        ))
    }

    fn meet_package(
        &self,
        state: &mut SearchState,
        package: &str,
        range: &VersionRange,
        requirer: &Requirer,
    ) -> Result<Option<Vec<Result<SearchState, ResolutionError>>>, ResolutionError> {
        let requirement = || format!("package {package} {range}");

        if let Some(selected) = state.selected.get(package) {
            if !range.matches(&selected.version) {
                return Err(ResolutionError::Unsatisfiable {
                    required_by: requirer.bundle.clone(),
                    requirement: format!("{} (selected {} is {})", requirement(), selected.bundle, selected.version),
                });
            }
            state.edges.insert((requirer.package.clone(), package.to_string()));
            return Ok(None);
        }

        let mut seen = BTreeSet::new();
        let mut candidates: Vec<(&Bundle, Version)> = Vec::new();
        if let Some(pkg) = self.model.package(package) {
            for channel in channels_by_preference(pkg) {
                for bundle in channel.bundles.values() {
                    let version = bundle.version()?;
                    if range.matches(&version) && seen.insert(bundle.name.as_str()) {
                        candidates.push((bundle, version));
                    }
                }
            }
        }
        if candidates.is_empty() {
            return Err(ResolutionError::Unsatisfiable {
                required_by: requirer.bundle.clone(),
                requirement: requirement(),
            });
        }
        candidates.sort_by(|(a, av), (b, bv)| bv.cmp(av).then_with(|| a.name.cmp(&b.name)));

        Ok(Some(
            candidates
                .into_iter()
                .map(|(bundle, _)| self.child(state, bundle, requirer))
                .collect(),
        ))
    }

    fn child(&self, state: &SearchState, bundle: &Bundle, requirer: &Requirer) -> Result<SearchState, ResolutionError> {
        let mut child = state.clone();
        let selection = Selection::from_bundle(
            bundle,
            &requirer.namespace,
            Action::Install {
                reason: StepReason::Dependency {
                    required_by: requirer.bundle.clone(),
                },
            },
        )?;
        child.select(Arc::new(selection))?;
        child
            .edges
            .insert((requirer.package.clone(), bundle.package.clone()));
        child
            .pending
            .extend(catalog_requirements(bundle, &requirer.namespace)?);
        Ok(child)
    }

    fn generation(&self, state: &SearchState) -> Generation {
        let order = dependency_order(state.selected.keys().map(String::as_str), &state.edges);
        let mut steps = Vec::new();
        for package in order {
            let Some(selection) = state.selected.get(package) else {
                continue;
            };
            match &selection.action {
                Action::Keep => {}
                Action::Install { reason } => steps.push(Step {
                    package: selection.package.clone(),
                    channel: selection.channel.clone(),
                    bundle: selection.bundle.clone(),
                    version: selection.version.to_string(),
                    replaces: None,
                    target_namespace: selection.namespace.clone(),
                    kind: StepKind::Install,
                    reason: reason.clone(),
                }),
                Action::Upgrade { from, path, reason } => {
                    let mut previous = from.clone();
                    for hop in path {
                        steps.push(Step {
                            package: selection.package.clone(),
                            channel: selection.channel.clone(),
                            bundle: hop.bundle.clone(),
                            version: hop.version.clone(),
                            replaces: Some(previous),
                            target_namespace: selection.namespace.clone(),
                            kind: StepKind::Upgrade,
                            reason: reason.clone(),
                        });
                        previous = hop.bundle.clone();
                    }
                }
            }
        }

        Generation {
            steps,
            resolved: state
                .selected
                .iter()
                .map(|(package, selection)| (package.clone(), selection.bundle.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_order_puts_providers_first() {
        let edges: BTreeSet<(String, String)> = [("app", "db"), ("db", "storage"), ("app", "app")]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let order = dependency_order(["app", "db", "storage", "zzz"].into_iter(), &edges);
        assert_eq!(order, ["storage", "db", "app", "zzz"]);
    }

    #[test]
    fn test_dependency_order_breaks_cycles_by_name() {
        let edges: BTreeSet<(String, String)> = [("a", "b"), ("b", "a")]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let order = dependency_order(["b", "a"].into_iter(), &edges);
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn test_deferred_demands_follow_pending_ones() {
        let requirer = Arc::new(Requirer {
            bundle: "x".to_string(),
            package: "x".to_string(),
            namespace: "ns".to_string(),
        });
        let mut state = SearchState::default();
        state.deferred.push(Arc::new(Demand::Api {
            gvk: Gvk::new("g", "v1", "Deferred"),
            requirer: Arc::clone(&requirer),
        }));
        state.pending.push_back(Arc::new(Demand::Subscription(0)));

        assert!(matches!(state.next_demand().as_deref(), Some(Demand::Subscription(0))));
        assert!(matches!(state.next_demand().as_deref(), Some(Demand::Api { .. })));
        assert!(state.next_demand().is_none());
    }
}
