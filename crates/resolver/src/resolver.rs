//! Resolver entry point

use crate::error::ResolutionError;
use crate::generation::{Generation, StepReason};
use crate::graph;
use crate::input::{InstalledState, SubscriptionRequest};
use crate::search::{Action, Hop, Route, Search, Target};
use catalog::Model;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Default cap on the number of search states explored.
pub const DEFAULT_SEARCH_LIMIT: usize = 100_000;

/// Resolves subscriptions against one catalog snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    model: &'a Model,
    limit: usize,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `model`.
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Caps the number of search states explored.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Computes the steps that bring every subscription to its channel head
    /// with all requirements met.
    ///
    /// The catalog is validated first; a malformed catalog fails before any
    /// search happens. Either a complete generation is returned or an error.
    pub fn resolve(
        &self,
        subscriptions: &[SubscriptionRequest],
        installed: &InstalledState,
    ) -> Result<Generation, ResolutionError> {
        self.model.validate()?;

        let mut ordered: Vec<&SubscriptionRequest> = subscriptions.iter().collect();
        ordered.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

        let mut by_package: BTreeMap<&str, &SubscriptionRequest> = BTreeMap::new();
        for sub in &ordered {
            if let Some(first) = by_package.get(sub.package.as_str()) {
                return Err(ResolutionError::SubscriptionConflict {
                    package: sub.package.clone(),
                    first: first.key(),
                    second: sub.key(),
                });
            }
            by_package.insert(&sub.package, sub);
        }

        let targets = ordered
            .iter()
            .map(|sub| self.target(sub, installed))
            .collect::<Result<Vec<_>, _>>()?;

        let generation = Search::new(self.model, targets, self.limit).run(installed)?;
        info!(
            "Resolved {} subscription(s) into {} step(s)",
            subscriptions.len(),
            generation.steps.len()
        );
        Ok(generation)
    }

    fn target(&self, sub: &SubscriptionRequest, installed: &InstalledState) -> Result<Target<'a>, ResolutionError> {
        let key = sub.key();
        let package = self
            .model
            .package(&sub.package)
            .ok_or_else(|| ResolutionError::UnknownPackage {
                subscription: key.clone(),
                package: sub.package.clone(),
            })?;
        let channel_name = sub
            .channel
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&package.default_channel);
        let channel = package
            .channel(channel_name)
            .ok_or_else(|| ResolutionError::UnknownChannel {
                subscription: key.clone(),
                package: sub.package.clone(),
                channel: channel_name.to_string(),
            })?;
        let head = channel.head()?;
        let reason = StepReason::Subscription { name: key.clone() };

        let (bundle, routes) = match installed.get(&sub.package) {
            Some(current) if current.name == head.name => {
                (head, vec![Route::direct(head, &sub.namespace, Action::Keep)?])
            }
            Some(current) => {
                let paths = graph::upgrade_paths(channel, &current.name, &current.version)?;
                if paths.is_empty() {
                    return Err(ResolutionError::NoUpgradePath {
                        package: sub.package.clone(),
                        channel: channel.name.clone(),
                        installed: current.name.clone(),
                        head: head.name.clone(),
                    });
                }
                let routes = paths
                    .into_iter()
                    .map(|path| {
                        let hops = path.iter().copied().map(Hop::of).collect::<Result<Vec<_>, _>>()?;
                        debug!("{}: upgrading {} in {} hop(s)", key, current.name, hops.len());
                        let action = Action::Upgrade {
                            from: current.name.clone(),
                            path: hops,
                            reason: reason.clone(),
                        };
                        Route::through(head, path, &sub.namespace, action)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                (head, routes)
            }
            None => {
                let bundle = match sub.starting_csv.as_deref().filter(|c| !c.is_empty()) {
                    Some(csv) => channel.bundle(csv).ok_or_else(|| ResolutionError::UnknownBundle {
                        subscription: key.clone(),
                        channel: channel.name.clone(),
                        bundle: csv.to_string(),
                    })?,
                    None => head,
                };
                (bundle, vec![Route::direct(bundle, &sub.namespace, Action::Install { reason })?])
            }
        };

        Ok(Target { bundle, routes })
    }
}
