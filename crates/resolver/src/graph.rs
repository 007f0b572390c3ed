//! Upgrade graph within a channel
//!
//! Bundle `b` upgrades directly from `a` when `b` replaces `a`, skips `a`, or
//! has a skip range containing `a`'s version. Upgrade paths are shortest
//! paths over these edges, searched breadth-first in bundle name order so
//! that ties are broken deterministically.

use catalog::{Bundle, CatalogError, Channel, VersionRange};
use semver::Version;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Which edges a path may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edges {
    /// `replaces` only
    Replaces,
    /// `replaces`, `skips` and `skipRange`
    All,
}

/// Bundles in `channel` that upgrade directly from `name` at `version`.
pub fn successors<'a>(channel: &'a Channel, name: &str, version: Option<&Version>, edges: Edges) -> Vec<&'a Bundle> {
    channel
        .bundles
        .values()
        .filter(|b| b.name != name)
        .filter(|b| {
            if b.replaces.as_deref() == Some(name) {
                return true;
            }
            if edges == Edges::Replaces {
                return false;
            }
            if b.all_skips().contains(name) {
                return true;
            }
            match (b.skip_range(), version) {
                (Some(range), Some(version)) => match VersionRange::parse(range) {
                    Ok(range) => range.matches(version),
                    Err(e) => {
                        warn!("Ignoring skipRange of {}: {}", b.name, e);
                        false
                    }
                },
                _ => false,
            }
        })
        .collect()
}

fn shortest_path<'a>(channel: &'a Channel, from: &str, from_version: &Version, to: &str, edges: Edges) -> Option<Vec<&'a Bundle>> {
    let mut parents: BTreeMap<&str, Option<&'a Bundle>> = BTreeMap::new();
    let mut visited: HashSet<&str> = HashSet::from([from]);
    let mut queue: VecDeque<(&str, Option<Version>)> = VecDeque::from([(from, Some(from_version.clone()))]);
    let mut found: Option<&'a Bundle> = None;

    while let Some((name, version)) = queue.pop_front() {
        for next in successors(channel, name, version.as_ref(), edges) {
            if !visited.insert(next.name.as_str()) {
                continue;
            }
            parents.insert(next.name.as_str(), channel.bundle(name));
            if next.name == to {
                found = Some(next);
                break;
            }
            queue.push_back((next.name.as_str(), next.version().ok()));
        }
        if found.is_some() {
            break;
        }
    }

    let mut path = Vec::new();
    let mut current = found?;
    loop {
        path.push(current);
        match parents.get(current.name.as_str()) {
            Some(&Some(parent)) if parent.name != from => current = parent,
            _ => break,
        }
    }
    path.reverse();
    Some(path)
}

/// Candidate paths from the installed bundle to the channel head, most
/// preferred first. Each path lists the bundles to step through in order
/// and ends at the head; a single empty path means `installed` is the head.
/// No paths means the head cannot be reached.
///
/// The shortest contiguous `replaces` chain comes first. The shortest path
/// that may also use `skips` and `skipRange` edges follows when it differs,
/// so a caller can fall back to it when the chain is unusable.
pub fn upgrade_paths<'a>(
    channel: &'a Channel,
    installed: &str,
    installed_version: &Version,
) -> Result<Vec<Vec<&'a Bundle>>, CatalogError> {
    let head = channel.head()?;
    if head.name == installed {
        return Ok(vec![Vec::new()]);
    }
    let mut paths: Vec<Vec<&'a Bundle>> = Vec::new();
    for edges in [Edges::Replaces, Edges::All] {
        let Some(path) = shortest_path(channel, installed, installed_version, &head.name, edges) else {
            continue;
        };
        let same_as = |known: &Vec<&Bundle>| known.iter().map(|b| &b.name).eq(path.iter().map(|b| &b.name));
        if paths.iter().any(same_as) {
            continue;
        }
        debug!(
            "Upgrade path {} -> {} over {:?} edges: {}",
            installed,
            head.name,
            edges,
            path.iter().map(|b| b.name.as_str()).collect::<Vec<_>>().join(" -> ")
        );
        paths.push(path);
    }
    Ok(paths)
}
