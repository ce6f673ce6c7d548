//! Matching of calorimeter clusters with GEM 2-D clusters.
//!
//! The matcher runs once per event through a fixed cycle of states:
//!
//! ```text
//! Idle -> ClustersLoaded -> Matched -> Processed -> Idle
//! ```
//!
//! Every calorimeter cluster is projected onto the depth of each GEM cluster along the
//! ray from the target, and GEM clusters within the cut radius become candidates. Calling
//! a step out of order is a programming error and is reported as
//! [MatcherError::InvariantViolation]. An event with no match is a normal outcome.
use serde::{Deserialize, Serialize};

use super::cluster::GemCluster2D;
use super::config::{MatchConfig, MatchPolicy};
use super::error::MatcherError;
use super::event::{project, CaloCluster};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatcherState {
    #[default]
    Idle,
    ClustersLoaded,
    Matched,
    Processed,
}

/// Bit flags of a matched hit: one bit per detector with a match, plus the ambiguity and
/// overlap markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct MatchFlags(u32);

impl MatchFlags {
    /// More than one candidate in at least one detector
    pub const MULTI_MATCH: Self = Self(1 << 30);
    /// The matches of two detectors were merged into one position
    pub const OVERLAP_MATCH: Self = Self(1 << 31);
    /// Highest detector id that has its own bit
    pub const MAX_DETECTORS: usize = 30;

    pub fn detector(id: usize) -> Self {
        if id < Self::MAX_DETECTORS {
            Self(1 << id)
        } else {
            Self(0)
        }
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if any detector bit is set
    pub fn has_detector_match(&self) -> bool {
        self.0 & !(Self::MULTI_MATCH.0 | Self::OVERLAP_MATCH.0) != 0
    }
}

/// A calorimeter cluster and the GEM clusters matched to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedHit {
    pub calo: CaloCluster,
    /// Candidates per detector, closest first
    pub gem_matches: Vec<Vec<GemCluster2D>>,
    /// Best GEM position (x, y, z)
    pub gem_position: Option<(f32, f32, f32)>,
    /// GEM position scaled onto the calorimeter depth
    pub display_position: Option<(f32, f32)>,
    pub flags: MatchFlags,
}

impl MatchedHit {
    fn new(calo: CaloCluster, n_detectors: usize) -> Self {
        Self {
            calo,
            gem_matches: vec![Vec::new(); n_detectors],
            gem_position: None,
            display_position: None,
            flags: MatchFlags::default(),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.gem_matches.iter().any(|m| !m.is_empty())
    }
}

/// Scale GEM clusters onto another depth, typically the calorimeter face. Pure.
pub fn project_for_display(clusters: &[GemCluster2D], z_target: f32) -> Vec<GemCluster2D> {
    clusters.iter().map(|c| c.projected_to(z_target)).collect()
}

#[derive(Debug)]
pub struct CaloMatcher {
    params: MatchConfig,
    n_detectors: usize,
    state: MatcherState,
    calo: Vec<CaloCluster>,
    gem: Vec<Vec<GemCluster2D>>,
    hits: Vec<MatchedHit>,
}

impl CaloMatcher {
    pub fn new(params: &MatchConfig, n_detectors: usize) -> Self {
        if n_detectors > MatchFlags::MAX_DETECTORS {
            spdlog::warn!(
                "Matcher can flag at most {} detectors; matches of the others are kept without a flag bit",
                MatchFlags::MAX_DETECTORS
            );
        }
        Self {
            params: params.clone(),
            n_detectors,
            state: MatcherState::Idle,
            calo: Vec::new(),
            gem: Vec::new(),
            hits: Vec::new(),
        }
    }

    pub fn state(&self) -> MatcherState {
        self.state
    }

    pub fn hits(&self) -> &[MatchedHit] {
        &self.hits
    }

    fn expect_state(&self, expected: MatcherState, step: &str) -> Result<(), MatcherError> {
        if self.state != expected {
            return Err(MatcherError::InvariantViolation(format!(
                "{step} requires state {expected:?} but matcher is {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Load the clusters of one event, one GEM cluster list per detector
    pub fn load_clusters(
        &mut self,
        calo: &[CaloCluster],
        gem: Vec<Vec<GemCluster2D>>,
    ) -> Result<(), MatcherError> {
        self.expect_state(MatcherState::Idle, "load_clusters")?;
        if gem.len() != self.n_detectors {
            return Err(MatcherError::InvariantViolation(format!(
                "received {} GEM cluster lists for {} detectors",
                gem.len(),
                self.n_detectors
            )));
        }
        self.calo = calo.to_vec();
        self.gem = gem;
        self.state = MatcherState::ClustersLoaded;
        Ok(())
    }

    /// Calorimeter depth, falling back to the configured one for clusters without a z
    fn calo_z(&self, calo: &CaloCluster) -> f32 {
        if calo.z > 0.0 {
            calo.z
        } else {
            self.params.calorimeter_z
        }
    }

    /// Distance from a GEM cluster to the calorimeter cluster projected onto its depth
    fn calo_distance(&self, calo: &CaloCluster, cluster: &GemCluster2D) -> f32 {
        let (px, py) = project(calo.x, calo.y, self.calo_z(calo), cluster.z);
        cluster.distance_to(px, py)
    }

    /// Match every calorimeter cluster with the loaded GEM clusters
    pub fn match_clusters(&mut self) -> Result<&[MatchedHit], MatcherError> {
        self.expect_state(MatcherState::ClustersLoaded, "match_clusters")?;
        let mut hits = Vec::with_capacity(self.calo.len());
        for calo in self.calo.iter() {
            let mut hit = MatchedHit::new(*calo, self.n_detectors);
            for (det, clusters) in self.gem.iter().enumerate() {
                let mut candidates: Vec<(f32, GemCluster2D)> = clusters
                    .iter()
                    .map(|c| (self.calo_distance(calo, c), *c))
                    .filter(|(d, _)| *d < self.params.cut_distance)
                    .collect();
                if candidates.is_empty() {
                    continue;
                }
                if candidates.len() > 1 {
                    hit.flags.insert(MatchFlags::MULTI_MATCH);
                }
                candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
                if self.params.policy == MatchPolicy::Closest {
                    candidates.truncate(1);
                }
                hit.flags.insert(MatchFlags::detector(det));
                hit.gem_matches[det] = candidates.into_iter().map(|(_, c)| c).collect();
            }
            if self.params.policy == MatchPolicy::Closest {
                self.resolve_overlap(&mut hit);
            }
            if hit.gem_position.is_none() {
                hit.gem_position = self.best_position(&hit);
            }
            hits.push(hit);
        }
        spdlog::debug!(
            "Matched {} of {} calorimeter clusters",
            hits.iter().filter(|h| h.is_matched()).count(),
            hits.len()
        );
        self.hits = hits;
        self.state = MatcherState::Matched;
        Ok(&self.hits)
    }

    /// Closest candidate over every detector
    fn best_position(&self, hit: &MatchedHit) -> Option<(f32, f32, f32)> {
        hit.gem_matches
            .iter()
            .flatten()
            .map(|c| (self.calo_distance(&hit.calo, c), c))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, c)| (c.x, c.y, c.z))
    }

    /// With two detectors matched, either merge the matches or keep the better one.
    ///
    /// Both matches are compared at the depth of the second one. Within the overlap
    /// window the averaged position is kept; otherwise the match closer to the
    /// calorimeter projection survives and the other detector's match is cleared.
    fn resolve_overlap(&self, hit: &mut MatchedHit) {
        let matched: Vec<usize> = hit
            .gem_matches
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_empty())
            .map(|(det, _)| det)
            .collect();
        let &[first_det, second_det] = matched.as_slice() else {
            return;
        };
        let first = hit.gem_matches[first_det][0];
        let second = hit.gem_matches[second_det][0];
        let first_at_second = first.projected_to(second.z);
        let separation = first_at_second.distance_to(second.x, second.y);

        if separation <= self.params.overlap_factor * self.params.resolution {
            hit.flags.insert(MatchFlags::OVERLAP_MATCH);
            hit.gem_position = Some((
                0.5 * (first_at_second.x + second.x),
                0.5 * (first_at_second.y + second.y),
                second.z,
            ));
            return;
        }

        let loser = if self.calo_distance(&hit.calo, &first) <= self.calo_distance(&hit.calo, &second)
        {
            second_det
        } else {
            first_det
        };
        hit.gem_matches[loser].clear();
        hit.flags.remove(MatchFlags::detector(loser));
    }

    /// Project the matched positions onto the calorimeter depth and hand out the hits
    pub fn process(&mut self) -> Result<Vec<MatchedHit>, MatcherError> {
        self.expect_state(MatcherState::Matched, "process")?;
        for hit in self.hits.iter_mut() {
            let z_calo = if hit.calo.z > 0.0 {
                hit.calo.z
            } else {
                self.params.calorimeter_z
            };
            hit.display_position = hit
                .gem_position
                .map(|(x, y, z)| project(x, y, z, z_calo));
        }
        self.state = MatcherState::Processed;
        Ok(self.hits.clone())
    }

    /// Return to Idle, dropping the clusters and matches of the event
    pub fn clear(&mut self) {
        self.calo.clear();
        self.gem.clear();
        self.hits.clear();
        self.state = MatcherState::Idle;
    }

    /// Full cycle for one event
    pub fn match_event(
        &mut self,
        calo: &[CaloCluster],
        gem: Vec<Vec<GemCluster2D>>,
    ) -> Result<Vec<MatchedHit>, MatcherError> {
        self.load_clusters(calo, gem)?;
        self.match_clusters()?;
        let hits = self.process()?;
        self.clear();
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gem(x: f32, y: f32, z: f32, det_id: usize) -> GemCluster2D {
        GemCluster2D {
            x,
            y,
            z,
            det_id,
            ..Default::default()
        }
    }

    fn params(policy: MatchPolicy, cut: f32) -> MatchConfig {
        MatchConfig {
            policy,
            cut_distance: cut,
            ..Default::default()
        }
    }

    #[test]
    fn test_closest_match() {
        let calo = [CaloCluster::new(100.0, 50.0, 5817.0, 1100.0)];
        let mut matcher = CaloMatcher::new(&params(MatchPolicy::Closest, 60.0), 1);
        matcher
            .load_clusters(&calo, vec![vec![gem(91.1, 45.6, 5304.0, 0)]])
            .unwrap();
        let hits = matcher.match_clusters().unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].is_matched());
        assert!(hits[0].flags.contains(MatchFlags::detector(0)));
        assert!(!hits[0].flags.contains(MatchFlags::MULTI_MATCH));
        let (_, _, z) = hits[0].gem_position.unwrap();
        assert_relative_eq!(z, 5304.0);
    }

    #[test]
    fn test_no_match_is_normal() {
        let calo = [CaloCluster::new(100.0, 50.0, 5817.0, 1100.0)];
        let mut matcher = CaloMatcher::new(&MatchConfig::default(), 1);
        let hits = matcher
            .match_event(&calo, vec![vec![gem(-200.0, 0.0, 5304.0, 0)]])
            .unwrap();
        assert!(!hits[0].is_matched());
        assert!(hits[0].gem_position.is_none());
        assert_eq!(matcher.state(), MatcherState::Idle);
    }

    #[test]
    fn test_all_policy_keeps_every_candidate() {
        let calo = [CaloCluster::new(0.0, 0.0, 5817.0, 900.0)];
        let mut matcher = CaloMatcher::new(&params(MatchPolicy::All, 20.0), 1);
        let clusters = vec![
            gem(8.0, 0.0, 5304.0, 0),
            gem(2.0, 0.0, 5304.0, 0),
            gem(50.0, 0.0, 5304.0, 0),
        ];
        let hits = matcher.match_event(&calo, vec![clusters]).unwrap();
        assert_eq!(hits[0].gem_matches[0].len(), 2);
        assert_relative_eq!(hits[0].gem_matches[0][0].x, 2.0);
        assert!(hits[0].flags.contains(MatchFlags::MULTI_MATCH));
        assert_relative_eq!(hits[0].gem_position.unwrap().0, 2.0);
    }

    #[test]
    fn test_overlap_is_averaged() {
        let calo = [CaloCluster::new(0.0, 0.0, 5817.0, 900.0)];
        let mut matcher = CaloMatcher::new(&params(MatchPolicy::Closest, 15.0), 2);
        let gem_lists = vec![
            vec![gem(1.0, 0.0, 5264.0, 0)],
            vec![gem(1.5, 0.0, 5264.0, 1)],
        ];
        let hits = matcher.match_event(&calo, gem_lists).unwrap();
        assert!(hits[0].flags.contains(MatchFlags::OVERLAP_MATCH));
        let (x, _, z) = hits[0].gem_position.unwrap();
        assert_relative_eq!(x, 1.25);
        assert_relative_eq!(z, 5264.0);
    }

    #[test]
    fn test_zero_overlap_factor_keeps_closer_match() {
        let calo = [CaloCluster::new(0.0, 0.0, 5817.0, 900.0)];
        let params = MatchConfig {
            overlap_factor: 0.0,
            ..params(MatchPolicy::Closest, 15.0)
        };
        let mut matcher = CaloMatcher::new(&params, 2);
        let gem_lists = vec![
            vec![gem(1.0, 0.0, 5264.0, 0)],
            vec![gem(1.5, 0.0, 5264.0, 1)],
        ];
        let hits = matcher.match_event(&calo, gem_lists).unwrap();
        let hit = &hits[0];
        assert!(!hit.flags.contains(MatchFlags::OVERLAP_MATCH));
        assert!(hit.flags.contains(MatchFlags::detector(0)));
        assert!(hit.gem_matches[1].is_empty());
        assert_relative_eq!(hit.gem_position.unwrap().0, 1.0);
    }

    #[test]
    fn test_overlap_keeps_closer_match() {
        let calo = [CaloCluster::new(0.0, 0.0, 5817.0, 900.0)];
        let mut matcher = CaloMatcher::new(&params(MatchPolicy::Closest, 15.0), 2);
        let gem_lists = vec![
            vec![gem(9.0, 0.0, 5304.0, 0)],
            vec![gem(-2.0, 0.0, 5264.0, 1)],
        ];
        let hits = matcher.match_event(&calo, gem_lists).unwrap();
        let hit = &hits[0];
        assert!(!hit.flags.contains(MatchFlags::OVERLAP_MATCH));
        assert!(hit.gem_matches[0].is_empty());
        assert!(!hit.flags.contains(MatchFlags::detector(0)));
        assert!(hit.flags.contains(MatchFlags::detector(1)));
        assert_relative_eq!(hit.gem_position.unwrap().0, -2.0);
    }

    #[test]
    fn test_display_projection() {
        let calo = [CaloCluster::new(100.0, 50.0, 5817.0, 1100.0)];
        let mut matcher = CaloMatcher::new(&params(MatchPolicy::Closest, 60.0), 1);
        let hits = matcher
            .match_event(&calo, vec![vec![gem(91.1, 45.6, 5304.0, 0)]])
            .unwrap();
        let (x, y) = hits[0].display_position.unwrap();
        assert_relative_eq!(x, 91.1 * 5817.0 / 5304.0, max_relative = 1e-5);
        assert_relative_eq!(y, 45.6 * 5817.0 / 5304.0, max_relative = 1e-5);

        let shown = project_for_display(&[gem(10.0, 0.0, 5304.0, 0)], 5817.0);
        assert_relative_eq!(shown[0].z, 5817.0);
    }

    #[test]
    fn test_state_machine_violations() {
        let mut matcher = CaloMatcher::new(&MatchConfig::default(), 2);
        assert!(matcher.match_clusters().is_err());
        assert!(matches!(
            matcher.load_clusters(&[], vec![vec![]]),
            Err(MatcherError::InvariantViolation(_))
        ));
        matcher.load_clusters(&[], vec![vec![], vec![]]).unwrap();
        assert!(matcher.load_clusters(&[], vec![vec![], vec![]]).is_err());
        assert!(matcher.process().is_err());
        matcher.match_clusters().unwrap();
        matcher.process().unwrap();
        assert_eq!(matcher.state(), MatcherState::Processed);
        matcher.clear();
        assert_eq!(matcher.state(), MatcherState::Idle);
    }

    #[test]
    fn test_flags() {
        let mut flags = MatchFlags::default();
        flags.insert(MatchFlags::detector(1));
        flags.insert(MatchFlags::MULTI_MATCH);
        assert!(flags.has_detector_match());
        flags.remove(MatchFlags::detector(1));
        assert!(!flags.has_detector_match());
        assert!(!flags.is_empty());
        assert!(!flags.contains(MatchFlags::detector(40)));
    }
}
