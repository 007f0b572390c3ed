//! Version ranges
//!
//! Ranges use the syntax catalogs have always used for `skipRange` and
//! `olm.package.required`:
//!
//! - comparators `>`, `>=`, `<`, `<=`, `=`, `==`, `!=`, or a bare version
//! - whitespace-separated comparators must all hold (`>=1.0.0 <2.0.0`)
//! - `||` separates alternatives (`<1.0.0 || >=3.0.0`)
//! - `x`, `X` or `*` wildcards in place of a version component (`1.2.x`)

use crate::error::CatalogError;
use semver::Version;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn matches(&self, v: &Version) -> bool {
        let ord = cmp_precedence(v, &self.version);
        match self.op {
            Op::Eq => ord.is_eq(),
            Op::Ne => ord.is_ne(),
            Op::Gt => ord.is_gt(),
            Op::Ge => ord.is_ge(),
            Op::Lt => ord.is_lt(),
            Op::Le => ord.is_le(),
        }
    }
}

/// Semver precedence: build metadata does not take part in comparisons.
fn cmp_precedence(a: &Version, b: &Version) -> std::cmp::Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| match (a.pre.is_empty(), b.pre.is_empty()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => a.pre.cmp(&b.pre),
        })
}

/// A parsed version range: a disjunction of conjunctions of comparators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    source: String,
    alternatives: Vec<Vec<Comparator>>,
}

impl VersionRange {
    /// Parses `range`.
    pub fn parse(range: &str) -> Result<Self, CatalogError> {
        let invalid = |reason: &str| CatalogError::InvalidRange {
            range: range.to_string(),
            reason: reason.to_string(),
        };

        let mut alternatives = Vec::new();
        for alternative in range.split("||") {
            let tokens = join_operators(alternative.split_whitespace());
            if tokens.is_empty() {
                return Err(invalid("empty alternative"));
            }
            let mut comparators = Vec::new();
            for token in tokens {
                parse_comparator(&token, &mut comparators).map_err(|reason| invalid(&reason))?;
            }
            alternatives.push(comparators);
        }

        Ok(Self {
            source: range.trim().to_string(),
            alternatives,
        })
    }

    /// Whether `version` satisfies the range.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|all| all.iter().all(|c| c.matches(version)))
    }

    /// The range as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for VersionRange {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Glues a lone operator to the version that follows it (`>= 1.0.0`).
fn join_operators<'a>(tokens: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut pending: Option<&str> = None;
    for token in tokens {
        if let Some(op) = pending.take() {
            out.push(format!("{op}{token}"));
        } else if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '!')) {
            pending = Some(token);
        } else {
            out.push(token.to_string());
        }
    }
    if let Some(op) = pending {
        out.push(op.to_string());
    }
    out
}

fn split_op(token: &str) -> (Op, &str) {
    for (prefix, op) in [
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("!=", Op::Ne),
        ("==", Op::Eq),
        (">", Op::Gt),
        ("<", Op::Lt),
        ("=", Op::Eq),
    ] {
        if let Some(rest) = token.strip_prefix(prefix) {
            return (op, rest);
        }
    }
    (Op::Eq, token)
}

fn is_wildcard(part: &str) -> bool {
    matches!(part, "x" | "X" | "*")
}

fn parse_comparator(token: &str, out: &mut Vec<Comparator>) -> Result<(), String> {
    let (op, version) = split_op(token);
    if version.is_empty() {
        return Err(format!("missing version after operator in {token:?}"));
    }

    let parts: Vec<&str> = version.splitn(3, '.').collect();
    let wildcard_at = parts.iter().position(|p| is_wildcard(p));
    let Some(idx) = wildcard_at else {
        let version = Version::parse(version).map_err(|e| format!("{version:?}: {e}"))?;
        out.push(Comparator { op, version });
        return Ok(());
    };

    let numbers = parts[..idx]
        .iter()
        .map(|p| p.parse::<u64>().map_err(|e| format!("{version:?}: {e}")))
        .collect::<Result<Vec<u64>, String>>()?;
    if parts[idx + 1..].iter().any(|p| !is_wildcard(p)) {
        return Err(format!("{version:?}: components after a wildcard must be wildcards"));
    }

    // `*`, `x`: anything.
    if numbers.is_empty() {
        return match op {
            Op::Eq | Op::Ge | Op::Le => {
                out.push(Comparator {
                    op: Op::Ge,
                    version: Version::new(0, 0, 0),
                });
                Ok(())
            }
            _ => Err(format!("{token:?}: operator cannot be combined with a bare wildcard")),
        };
    }

    let lower = match numbers.as_slice() {
        [major] => Version::new(*major, 0, 0),
        [major, minor] => Version::new(*major, *minor, 0),
        _ => return Err(format!("{version:?}: unsupported wildcard position")),
    };
    let upper = match numbers.as_slice() {
        [major] => Version::new(major + 1, 0, 0),
        [major, minor] => Version::new(*major, minor + 1, 0),
        _ => return Err(format!("{version:?}: unsupported wildcard position")),
    };

    match op {
        Op::Eq => {
            out.push(Comparator { op: Op::Ge, version: lower });
            out.push(Comparator { op: Op::Lt, version: upper });
        }
        Op::Gt => out.push(Comparator { op: Op::Ge, version: upper }),
        Op::Ge => out.push(Comparator { op: Op::Ge, version: lower }),
        Op::Lt => out.push(Comparator { op: Op::Lt, version: lower }),
        Op::Le => out.push(Comparator { op: Op::Lt, version: upper }),
        Op::Ne => return Err(format!("{token:?}: != cannot be combined with a wildcard")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[test]
    fn test_simple_comparators() {
        assert!(range(">=1.0.0").matches(&v("1.0.0")));
        assert!(!range(">1.0.0").matches(&v("1.0.0")));
        assert!(range("<0.9.4").matches(&v("0.9.2")));
        assert!(!range("<0.9.4").matches(&v("0.9.4")));
        assert!(range("1.2.3").matches(&v("1.2.3")));
        assert!(range("==1.2.3").matches(&v("1.2.3")));
        assert!(range("!=1.2.3").matches(&v("1.2.4")));
    }

    #[test]
    fn test_and_or_composition() {
        let r = range(">=1.0.0 <2.0.0 || >=3.0.0");
        assert!(r.matches(&v("1.5.0")));
        assert!(!r.matches(&v("2.5.0")));
        assert!(r.matches(&v("3.1.0")));
        assert_eq!(r.to_string(), ">=1.0.0 <2.0.0 || >=3.0.0");
    }

    #[test]
    fn test_operator_separated_from_version() {
        let r = range(">= 1.0.0 < 2.0.0");
        assert!(r.matches(&v("1.9.9")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn test_wildcards() {
        assert!(range("1.x").matches(&v("1.9.0")));
        assert!(!range("1.x").matches(&v("2.0.0")));
        assert!(range("1.2.x").matches(&v("1.2.7")));
        assert!(!range("1.2.x").matches(&v("1.3.0")));
        assert!(range(">1.x").matches(&v("2.0.0")));
        assert!(!range(">1.x").matches(&v("1.9.0")));
        assert!(range("<=1.2.x").matches(&v("1.2.9")));
        assert!(range("*").matches(&v("0.0.1")));
    }

    #[test]
    fn test_prerelease_ordering() {
        assert!(range("<1.0.0").matches(&v("1.0.0-alpha")));
        assert!(range(">=1.0.0-alpha").matches(&v("1.0.0")));
        assert!(range("=1.0.0").matches(&v("1.0.0+build.5")));
    }

    #[test]
    fn test_invalid_ranges() {
        for bad in ["", ">=", "1.x.2", "abc", ">=1.0.0 ||", "!=1.x"] {
            assert!(VersionRange::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    proptest! {
        #[test]
        fn prop_bounded_range_matches_exactly_the_interval(
            lo in (0u64..5, 0u64..5, 0u64..5),
            hi in (0u64..5, 0u64..5, 0u64..5),
            probe in (0u64..6, 0u64..6, 0u64..6),
        ) {
            let lo = Version::new(lo.0, lo.1, lo.2);
            let hi = Version::new(hi.0, hi.1, hi.2);
            let probe = Version::new(probe.0, probe.1, probe.2);
            let r = VersionRange::parse(&format!(">={lo} <{hi}")).unwrap();
            prop_assert_eq!(r.matches(&probe), probe >= lo && probe < hi);
        }
    }
}
