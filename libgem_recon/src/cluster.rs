//! Strip clusters and the 1-D clustering steps.
//!
//! Clustering of a plane runs four steps every event: hits are grouped into runs of
//! consecutive strips, groups containing a charge valley are split, groups with an
//! implausible number of strips are dropped, and the survivors get their position and
//! charges computed.
use serde::{Deserialize, Serialize};

use super::config::{ChargeKind, ClusterConfig};

/// A strip that fired on a plane, with its peak charge over the time samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneHit {
    pub strip: i32,
    pub charge: f32,
}

impl PlaneHit {
    pub fn new(strip: i32, charge: f32) -> Self {
        Self { strip, charge }
    }
}

/// A group of neighbouring strips on one plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StripCluster {
    pub hits: Vec<PlaneHit>,
    /// Charge weighted position in mm
    pub position: f32,
    pub peak_charge: f32,
    pub total_charge: f32,
}

impl StripCluster {
    pub fn new(hits: Vec<PlaneHit>) -> Self {
        Self {
            hits,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn first_strip(&self) -> Option<i32> {
        self.hits.first().map(|h| h.strip)
    }

    pub fn last_strip(&self) -> Option<i32> {
        self.hits.last().map(|h| h.strip)
    }

    pub fn charge(&self, kind: ChargeKind) -> f32 {
        match kind {
            ChargeKind::Peak => self.peak_charge,
            ChargeKind::Integrated => self.total_charge,
        }
    }
}

/// A crossing point built from one X and one Y cluster of the same detector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GemCluster2D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub x_charge: f32,
    pub y_charge: f32,
    pub x_size: usize,
    pub y_size: usize,
    pub det_id: usize,
}

impl GemCluster2D {
    /// Transverse distance to a point
    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }

    /// Copy of the cluster scaled onto another depth
    pub fn projected_to(&self, z_target: f32) -> Self {
        let (x, y) = super::event::project(self.x, self.y, self.z, z_target);
        Self {
            x,
            y,
            z: z_target,
            ..*self
        }
    }
}

/// Runs the 1-D clustering steps with a fixed set of parameters
#[derive(Debug, Clone)]
pub struct StripClusterer {
    min_hits: usize,
    max_hits: usize,
    split_threshold: f32,
}

impl StripClusterer {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            min_hits: config.min_cluster_hits,
            max_hits: config.max_cluster_hits,
            split_threshold: config.split_threshold,
        }
    }

    /// Sort the hits and cut them into runs of consecutive strips
    pub fn group_hits(&self, hits: &mut [PlaneHit]) -> Vec<StripCluster> {
        hits.sort_by_key(|h| h.strip);
        let mut clusters: Vec<StripCluster> = Vec::new();
        let mut current: Vec<PlaneHit> = Vec::new();
        for hit in hits.iter() {
            if let Some(last) = current.last() {
                if hit.strip - last.strip > 1 {
                    clusters.push(StripCluster::new(std::mem::take(&mut current)));
                }
            }
            current.push(*hit);
        }
        if !current.is_empty() {
            clusters.push(StripCluster::new(current));
        }
        clusters
    }

    /// Index of the first valley in the charge profile.
    ///
    /// A valley needs a strip to strip drop larger than the threshold, followed by a
    /// strip to strip rise larger than the threshold. The valley is the lowest strip
    /// in between.
    fn find_valley(&self, hits: &[PlaneHit]) -> Option<usize> {
        if hits.len() < 3 {
            return None;
        }
        let mut descending = false;
        let mut minimum = 0;
        for i in 1..hits.len() {
            if descending {
                if hits[i].charge < hits[minimum].charge {
                    minimum = i;
                } else if hits[i].charge - hits[i - 1].charge > self.split_threshold {
                    return Some(minimum);
                }
            } else if hits[i - 1].charge - hits[i].charge > self.split_threshold {
                descending = true;
                minimum = i;
            }
        }
        None
    }

    /// Split every cluster at its valleys. The valley strip is shared by both halves
    /// with its charge halved.
    pub fn split_clusters(&self, clusters: Vec<StripCluster>) -> Vec<StripCluster> {
        let mut result = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let mut remaining = cluster.hits;
            while let Some(valley) = self.find_valley(&remaining) {
                remaining[valley].charge /= 2.0;
                let tail = remaining[valley..].to_vec();
                remaining.truncate(valley + 1);
                result.push(StripCluster::new(remaining));
                remaining = tail;
            }
            result.push(StripCluster::new(remaining));
        }
        result
    }

    pub fn filter_clusters(&self, clusters: &mut Vec<StripCluster>) {
        clusters.retain(|c| c.len() >= self.min_hits && c.len() <= self.max_hits);
    }

    /// Compute position and charges using the plane's strip position function
    pub fn reconstruct<F>(&self, clusters: &mut [StripCluster], strip_position: F)
    where
        F: Fn(i32) -> f32,
    {
        for cluster in clusters.iter_mut() {
            let mut weighted = 0.0;
            let mut total = 0.0;
            let mut peak = f32::MIN;
            for hit in cluster.hits.iter() {
                weighted += strip_position(hit.strip) * hit.charge;
                total += hit.charge;
                peak = peak.max(hit.charge);
            }
            cluster.total_charge = total;
            cluster.peak_charge = peak;
            cluster.position = if total != 0.0 {
                weighted / total
            } else {
                let n = cluster.len() as f32;
                cluster.hits.iter().map(|h| strip_position(h.strip)).sum::<f32>() / n
            };
        }
    }

    /// All four steps
    pub fn form_clusters<F>(&self, hits: &mut [PlaneHit], strip_position: F) -> Vec<StripCluster>
    where
        F: Fn(i32) -> f32,
    {
        let grouped = self.group_hits(hits);
        let mut clusters = self.split_clusters(grouped);
        self.filter_clusters(&mut clusters);
        self.reconstruct(&mut clusters, strip_position);
        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn clusterer() -> StripClusterer {
        StripClusterer::new(&ClusterConfig::default())
    }

    fn hits(list: &[(i32, f32)]) -> Vec<PlaneHit> {
        list.iter().map(|(s, q)| PlaneHit::new(*s, *q)).collect()
    }

    #[test]
    fn test_grouping() {
        let mut input = hits(&[(12, 5.0), (3, 1.0), (10, 4.0), (4, 2.0), (11, 3.0), (20, 9.0)]);
        let clusters = clusterer().group_hits(&mut input);
        let strips: Vec<Vec<i32>> = clusters
            .iter()
            .map(|c| c.hits.iter().map(|h| h.strip).collect())
            .collect();
        assert_eq!(strips, vec![vec![3, 4], vec![10, 11, 12], vec![20]]);
    }

    #[test]
    fn test_valley_split() {
        let mut input = hits(&[
            (10, 50.0),
            (11, 70.0),
            (12, 20.0),
            (13, 18.0),
            (14, 60.0),
            (15, 40.0),
        ]);
        let c = clusterer();
        let clusters = c.split_clusters(c.group_hits(&mut input));
        assert_eq!(clusters.len(), 2);
        assert_eq!(
            clusters[0].hits,
            hits(&[(10, 50.0), (11, 70.0), (12, 20.0), (13, 9.0)])
        );
        assert_eq!(clusters[1].hits, hits(&[(13, 9.0), (14, 60.0), (15, 40.0)]));
    }

    #[test]
    fn test_shallow_valley_not_split() {
        let mut input = hits(&[(1, 50.0), (2, 40.0), (3, 30.0), (4, 40.0), (5, 50.0)]);
        let c = clusterer();
        let clusters = c.split_clusters(c.group_hits(&mut input));
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn test_gradual_rise_not_split() {
        let mut input = hits(&[(1, 70.0), (2, 20.0), (3, 25.0), (4, 33.0), (5, 40.0)]);
        let c = clusterer();
        let clusters = c.split_clusters(c.group_hits(&mut input));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].hits, input);
    }

    #[test]
    fn test_split_threshold_is_configurable() {
        let config = ClusterConfig {
            split_threshold: 5.0,
            ..Default::default()
        };
        let c = StripClusterer::new(&config);
        let mut input = hits(&[(1, 50.0), (2, 40.0), (3, 30.0), (4, 40.0), (5, 50.0)]);
        let clusters = c.split_clusters(c.group_hits(&mut input));
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].hits, hits(&[(1, 50.0), (2, 40.0), (3, 15.0)]));
        assert_eq!(clusters[1].hits, hits(&[(3, 15.0), (4, 40.0), (5, 50.0)]));
    }

    #[test]
    fn test_double_valley() {
        let mut input = hits(&[
            (1, 80.0),
            (2, 10.0),
            (3, 80.0),
            (4, 10.0),
            (5, 80.0),
        ]);
        let c = clusterer();
        let clusters = c.split_clusters(c.group_hits(&mut input));
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[1].hits, hits(&[(2, 5.0), (3, 80.0), (4, 5.0)]));
    }

    #[test]
    fn test_filter_bounds() {
        let config = ClusterConfig {
            min_cluster_hits: 2,
            max_cluster_hits: 3,
            ..Default::default()
        };
        let c = StripClusterer::new(&config);
        let mut input = hits(&[(1, 1.0), (5, 1.0), (6, 1.0), (10, 1.0), (11, 1.0), (12, 1.0), (13, 1.0)]);
        let mut clusters = c.group_hits(&mut input);
        c.filter_clusters(&mut clusters);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].first_strip(), Some(5));
    }

    #[test]
    fn test_reconstruct() {
        let mut input = hits(&[(4, 10.0), (5, 30.0), (6, 20.0)]);
        let clusters = clusterer().form_clusters(&mut input, |s| s as f32 * 0.4);
        assert_eq!(clusters.len(), 1);
        assert_relative_eq!(clusters[0].total_charge, 60.0);
        assert_relative_eq!(clusters[0].peak_charge, 30.0);
        assert_relative_eq!(
            clusters[0].position,
            (1.6 * 10.0 + 2.0 * 30.0 + 2.4 * 20.0) / 60.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_regrouping_is_stable() {
        let mut input = hits(&[(30, 5.0), (31, 40.0), (32, 80.0), (33, 35.0), (34, 6.0)]);
        let c = clusterer();
        let clusters = c.form_clusters(&mut input, |s| s as f32);
        for cluster in clusters {
            let mut own = cluster.hits.clone();
            let regrouped = c.group_hits(&mut own);
            assert_eq!(regrouped.len(), 1);
            assert_eq!(regrouped[0].hits, cluster.hits);
        }
    }
}
