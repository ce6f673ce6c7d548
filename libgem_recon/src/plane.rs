use super::cluster::{PlaneHit, StripCluster, StripClusterer};
use super::config::{ChargeKind, PlaneConfig};
use super::constants::*;
use super::hardware_id::PlaneKind;

/// GemPlane is one readout plane (all the X strips or all the Y strips) of a detector.
///
/// APVs plugged into the plane add their hits here during an event. Once every hit is in,
/// the plane forms its 1-D clusters.
#[derive(Debug, Clone)]
pub struct GemPlane {
    name: String,
    kind: PlaneKind,
    size: f32,
    connectors: usize,
    orientation: i32,
    pitch: f32,
    hits: Vec<PlaneHit>,
    clusters: Vec<StripCluster>,
}

impl GemPlane {
    pub fn new(config: &PlaneConfig, kind: PlaneKind, pitch: f32) -> Self {
        Self {
            name: config.name.clone(),
            kind,
            size: config.size,
            connectors: config.connectors,
            orientation: config.orientation,
            pitch,
            hits: Vec::new(),
            clusters: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PlaneKind {
        self.kind
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn connectors(&self) -> usize {
        self.connectors
    }

    pub fn orientation(&self) -> i32 {
        self.orientation
    }

    /// Position of a strip centre along the plane axis in mm, relative to the plane centre
    pub fn strip_position(&self, plane_strip: i32) -> f32 {
        match self.kind {
            PlaneKind::X => {
                -0.5 * (self.size + X_PLANE_STRIP_OFFSET * self.pitch)
                    + self.pitch * plane_strip as f32
            }
            PlaneKind::Y => -0.5 * (self.size - self.pitch) + self.pitch * plane_strip as f32,
        }
    }

    /// Strips in the insensitive edge of the X plane never record hits
    fn is_sensitive(&self, plane_strip: i32) -> bool {
        match self.kind {
            PlaneKind::X => (X_PLANE_FIRST_STRIP..=X_PLANE_LAST_STRIP).contains(&plane_strip),
            PlaneKind::Y => true,
        }
    }

    /// Add a hit from its corrected time samples; the charge is the peak sample
    /// Returns false if the hit was dropped
    pub fn add_strip_hit(&mut self, plane_strip: i32, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return false;
        }
        let charge = samples.iter().copied().fold(f32::MIN, f32::max);
        self.add_hit(PlaneHit::new(plane_strip, charge))
    }

    /// Returns false for strips outside the sensitive area
    pub fn add_hit(&mut self, hit: PlaneHit) -> bool {
        if !self.is_sensitive(hit.strip) {
            return false;
        }
        self.hits.push(hit);
        true
    }

    pub fn hits(&self) -> &[PlaneHit] {
        &self.hits
    }

    pub fn clusters(&self) -> &[StripCluster] {
        &self.clusters
    }

    pub fn clear(&mut self) {
        self.hits.clear();
        self.clusters.clear();
    }

    /// Rebuild the clusters of this event from the collected hits
    pub fn form_clusters(&mut self, clusterer: &StripClusterer) {
        let mut hits = self.hits.clone();
        let clusters = clusterer.form_clusters(&mut hits, |s| self.strip_position(s));
        self.clusters = clusters;
    }

    /// Order the clusters by decreasing charge
    pub fn sort_clusters(&mut self, charge: ChargeKind) {
        self.clusters
            .sort_by(|a, b| b.charge(charge).total_cmp(&a.charge(charge)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use approx::assert_relative_eq;

    fn plane(kind: PlaneKind, size: f32) -> GemPlane {
        let config = PlaneConfig {
            name: format!("GEM1{kind}"),
            kind: kind.to_string(),
            size,
            connectors: 12,
            orientation: 0,
        };
        GemPlane::new(&config, kind, DEFAULT_STRIP_PITCH)
    }

    #[test]
    fn test_strip_positions_are_centred() {
        let x = plane(PlaneKind::X, 550.4);
        assert_relative_eq!(x.strip_position(X_PLANE_FIRST_STRIP), -275.0, epsilon = 1e-3);
        assert_relative_eq!(x.strip_position(X_PLANE_LAST_STRIP), 275.0, epsilon = 1e-3);

        let y = plane(PlaneKind::Y, 1228.8);
        let last = 3071; // 1228.8 mm of 0.4 mm strips
        assert_relative_eq!(
            y.strip_position(0),
            -y.strip_position(last),
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_x_edge_cut() {
        let mut x = plane(PlaneKind::X, 550.4);
        x.add_strip_hit(15, &[100.0]);
        x.add_strip_hit(16, &[100.0]);
        x.add_strip_hit(1391, &[100.0]);
        x.add_strip_hit(1392, &[100.0]);
        assert_eq!(x.hits().len(), 2);

        let mut y = plane(PlaneKind::Y, 1228.8);
        y.add_strip_hit(15, &[100.0]);
        y.add_strip_hit(2000, &[100.0]);
        assert_eq!(y.hits().len(), 2);
    }

    #[test]
    fn test_peak_charge_and_clear() {
        let mut y = plane(PlaneKind::Y, 1228.8);
        y.add_strip_hit(100, &[20.0, 75.0, 40.0]);
        y.add_strip_hit(101, &[]);
        assert_eq!(y.hits(), &[PlaneHit::new(100, 75.0)]);
        y.form_clusters(&StripClusterer::new(&ClusterConfig::default()));
        assert_eq!(y.clusters().len(), 1);
        y.clear();
        assert!(y.hits().is_empty());
        assert!(y.clusters().is_empty());
    }

    #[test]
    fn test_sort_clusters() {
        let mut y = plane(PlaneKind::Y, 1228.8);
        for (strip, charge) in [(10, 30.0), (20, 90.0), (30, 60.0)] {
            y.add_hit(PlaneHit::new(strip, charge));
        }
        y.form_clusters(&StripClusterer::new(&ClusterConfig::default()));
        y.sort_clusters(ChargeKind::Peak);
        let peaks: Vec<f32> = y.clusters().iter().map(|c| c.peak_charge).collect();
        assert_eq!(peaks, vec![90.0, 60.0, 30.0]);
    }
}
