//! Operator dependency resolution
//!
//! Given a validated catalog [`Model`](catalog::Model), the subscriptions of
//! a namespace and the bundles already installed there, the resolver
//! computes a [`Generation`]: the ordered install and upgrade steps that
//! bring every subscription to its channel head with every dependency
//! satisfied and no API provided by two different packages.
//!
//! Resolution is all-or-nothing and deterministic. Choices between
//! alternative providers are explored with an explicit backtracking
//! work-list over cloned search states.

pub mod error;
pub mod generation;
pub mod graph;
pub mod input;
pub mod resolver;
mod search;

pub use error::{ErrorKind, ResolutionError};
pub use generation::{Generation, Step, StepKind, StepReason};
pub use input::{InstalledBundle, InstalledState, SubscriptionRequest};
pub use resolver::{DEFAULT_SEARCH_LIMIT, Resolver};
