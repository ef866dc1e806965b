//! Nearest-neighbour resolution of a probe descriptor against the enrolled
//! gallery.

use serde::{Serialize, Serializer};

use crate::types::{Descriptor, Identity};

/// Maximum Euclidean distance at which two descriptors are considered the
/// same person. Inclusive.
pub const MATCH_THRESHOLD: f64 = 0.6;

/// Result of resolving a probe against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched { identity: Identity, distance: f64 },
    /// `distance` is the nearest distance seen, or `+inf` for an empty
    /// gallery. Reported for calibration only.
    NoMatch { distance: f64 },
}

impl MatchOutcome {
    pub fn distance(&self) -> f64 {
        match self {
            MatchOutcome::Matched { distance, .. } | MatchOutcome::NoMatch { distance } => {
                *distance
            }
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            MatchOutcome::Matched { identity, .. } => Some(identity),
            MatchOutcome::NoMatch { .. } => None,
        }
    }
}

#[derive(Serialize)]
struct MatchJson<'a> {
    identity: Option<&'a Identity>,
    /// Infinite distances serialize as `null`.
    distance: f64,
}

impl Serialize for MatchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MatchJson {
            identity: self.identity(),
            distance: self.distance(),
        }
        .serialize(serializer)
    }
}

/// Strategy for comparing a probe descriptor against enrolled identities.
///
/// Implementations must be pure: the same probe and gallery always give
/// the same outcome, so resolution may run concurrently over a snapshot.
pub trait Matcher {
    fn resolve(&self, probe: &Descriptor, gallery: &[Identity], threshold: f64) -> MatchOutcome;
}

/// Exhaustive linear scan by Euclidean distance.
///
/// Identities without a descriptor are skipped. Ties keep the first
/// identity encountered.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn resolve(&self, probe: &Descriptor, gallery: &[Identity], threshold: f64) -> MatchOutcome {
        let mut best_dist = f64::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, identity) in gallery.iter().enumerate() {
            let Some(enrolled) = &identity.descriptor else {
                continue;
            };
            let dist = probe.euclidean_distance(enrolled);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= threshold => MatchOutcome::Matched {
                identity: gallery[idx].clone(),
                distance: best_dist,
            },
            _ => MatchOutcome::NoMatch {
                distance: best_dist,
            },
        }
    }
}
