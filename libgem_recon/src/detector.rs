use std::str::FromStr;

use super::cluster::{GemCluster2D, StripClusterer};
use super::config::{ChargeKind, DetectorConfig, MatchConfig, XYMatchMode};
use super::error::ConfigError;
use super::hardware_id::{PlaneKind, ReadoutStyle};
use super::plane::GemPlane;

/// GemDetector is a tracking module made of an X plane and a Y plane.
///
/// After both planes have clustered, the detector combines their clusters into 2-D
/// clusters according to the configured XY mode.
#[derive(Debug, Clone)]
pub struct GemDetector {
    id: usize,
    name: String,
    det_type: String,
    readout: ReadoutStyle,
    z: f32,
    x_offset: f32,
    y_offset: f32,
    planes: [GemPlane; 2],
    clusters: Vec<GemCluster2D>,
}

impl GemDetector {
    /// Build the detector and its planes from configuration
    pub fn new(id: usize, config: &DetectorConfig, pitch: f32) -> Result<Self, ConfigError> {
        let readout = ReadoutStyle::from_str(&config.readout)?;
        let mut x_plane: Option<GemPlane> = None;
        let mut y_plane: Option<GemPlane> = None;
        for plane_config in config.planes.iter() {
            let kind = PlaneKind::from_str(&plane_config.kind)?;
            let slot = match kind {
                PlaneKind::X => &mut x_plane,
                PlaneKind::Y => &mut y_plane,
            };
            if slot.is_some() {
                return Err(ConfigError::BadPlaneSet(config.name.clone()));
            }
            *slot = Some(GemPlane::new(plane_config, kind, pitch));
        }
        let (Some(x_plane), Some(y_plane)) = (x_plane, y_plane) else {
            return Err(ConfigError::BadPlaneSet(config.name.clone()));
        };

        Ok(Self {
            id,
            name: config.name.clone(),
            det_type: config.det_type.clone(),
            readout,
            z: config.z,
            x_offset: config.x_offset,
            y_offset: config.y_offset,
            planes: [x_plane, y_plane],
            clusters: Vec::new(),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn det_type(&self) -> &str {
        &self.det_type
    }

    pub fn readout(&self) -> ReadoutStyle {
        self.readout
    }

    pub fn z(&self) -> f32 {
        self.z
    }

    pub fn plane(&self, kind: PlaneKind) -> &GemPlane {
        &self.planes[kind.index()]
    }

    pub fn plane_mut(&mut self, kind: PlaneKind) -> &mut GemPlane {
        &mut self.planes[kind.index()]
    }

    pub fn planes(&self) -> &[GemPlane] {
        &self.planes
    }

    pub fn clusters(&self) -> &[GemCluster2D] {
        &self.clusters
    }

    /// Clear the hits and clusters of the previous event
    pub fn clear(&mut self) {
        for plane in self.planes.iter_mut() {
            plane.clear();
        }
        self.clusters.clear();
    }

    /// Run the 1-D clustering on both planes
    pub fn form_plane_clusters(&mut self, clusterer: &StripClusterer) {
        for plane in self.planes.iter_mut() {
            plane.form_clusters(clusterer);
        }
    }

    /// Combine the X and Y clusters into 2-D clusters.
    ///
    /// `projection_z`, when given, is the depth every cluster is scaled onto.
    pub fn form_2d_clusters(&mut self, params: &MatchConfig, projection_z: Option<f32>) {
        self.clusters.clear();
        let charge = params.charge;
        match self.readout {
            ReadoutStyle::Cartesian => match params.xy_mode {
                XYMatchMode::Plus => self.combine_all(charge),
                XYMatchMode::Normal => self.combine_ranked(charge),
            },
        }
        if let Some(z_target) = projection_z {
            for cluster in self.clusters.iter_mut() {
                *cluster = cluster.projected_to(z_target);
            }
        }
    }

    fn make_cluster(&self, x_idx: usize, y_idx: usize, charge: ChargeKind) -> GemCluster2D {
        let x = &self.planes[PlaneKind::X.index()].clusters()[x_idx];
        let y = &self.planes[PlaneKind::Y.index()].clusters()[y_idx];
        GemCluster2D {
            x: x.position + self.x_offset,
            y: y.position + self.y_offset,
            z: self.z,
            x_charge: x.charge(charge),
            y_charge: y.charge(charge),
            x_size: x.len(),
            y_size: y.len(),
            det_id: self.id,
        }
    }

    /// Every X cluster with every Y cluster
    fn combine_all(&mut self, charge: ChargeKind) {
        let n_x = self.plane(PlaneKind::X).clusters().len();
        let n_y = self.plane(PlaneKind::Y).clusters().len();
        let mut clusters = Vec::with_capacity(n_x * n_y);
        for i in 0..n_x {
            for j in 0..n_y {
                clusters.push(self.make_cluster(i, j, charge));
            }
        }
        self.clusters = clusters;
    }

    /// Pair clusters of equal charge rank. Assumes the charge ranking of the two planes
    /// agrees; surplus clusters on the busier plane are dropped.
    fn combine_ranked(&mut self, charge: ChargeKind) {
        for plane in self.planes.iter_mut() {
            plane.sort_clusters(charge);
        }
        let n_x = self.plane(PlaneKind::X).clusters().len();
        let n_y = self.plane(PlaneKind::Y).clusters().len();
        let clusters: Vec<GemCluster2D> = (0..n_x.min(n_y))
            .map(|i| self.make_cluster(i, i, charge))
            .collect();
        self.clusters = clusters;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::PlaneHit;
    use crate::config::{ClusterConfig, PlaneConfig};
    use approx::assert_relative_eq;

    fn detector_config(readout: &str) -> DetectorConfig {
        DetectorConfig {
            name: String::from("GEM1"),
            readout: readout.to_string(),
            det_type: String::from("PRADGEM"),
            z: 5304.0,
            x_offset: 0.0,
            y_offset: 0.0,
            planes: vec![
                PlaneConfig {
                    name: String::from("GEM1X"),
                    kind: String::from("X"),
                    size: 550.4,
                    connectors: 12,
                    orientation: 0,
                },
                PlaneConfig {
                    name: String::from("GEM1Y"),
                    kind: String::from("Y"),
                    size: 1228.8,
                    connectors: 24,
                    orientation: 0,
                },
            ],
        }
    }

    fn filled_detector() -> GemDetector {
        let mut det = GemDetector::new(0, &detector_config("Cartesian"), 0.4).unwrap();
        for (strip, charge) in [(100, 50.0), (200, 90.0)] {
            det.plane_mut(PlaneKind::X).add_hit(PlaneHit::new(strip, charge));
        }
        for (strip, charge) in [(1000, 40.0), (1500, 95.0), (2500, 10.0)] {
            det.plane_mut(PlaneKind::Y).add_hit(PlaneHit::new(strip, charge));
        }
        det.form_plane_clusters(&StripClusterer::new(&ClusterConfig::default()));
        det
    }

    #[test]
    fn test_rejects_unknown_readout() {
        assert!(matches!(
            GemDetector::new(0, &detector_config("Hexagonal"), 0.4),
            Err(ConfigError::BadReadoutStyle(_))
        ));
    }

    #[test]
    fn test_requires_both_planes() {
        let mut config = detector_config("Cartesian");
        config.planes[1].kind = String::from("X");
        assert!(matches!(
            GemDetector::new(0, &config, 0.4),
            Err(ConfigError::BadPlaneSet(_))
        ));
        config.planes.pop();
        config.planes[0].kind = String::from("Y");
        assert!(GemDetector::new(0, &config, 0.4).is_err());
    }

    #[test]
    fn test_plus_mode() {
        let mut det = filled_detector();
        let params = MatchConfig {
            xy_mode: XYMatchMode::Plus,
            ..Default::default()
        };
        det.form_2d_clusters(&params, None);
        assert_eq!(det.clusters().len(), 6);
        assert!(det.clusters().iter().all(|c| c.z == 5304.0 && c.det_id == 0));
    }

    #[test]
    fn test_normal_mode_pairs_by_rank() {
        let mut det = filled_detector();
        det.form_2d_clusters(&MatchConfig::default(), None);
        assert_eq!(det.clusters().len(), 2);
        let x_plane = det.plane(PlaneKind::X);
        let y_plane = det.plane(PlaneKind::Y);
        let first = det.clusters()[0];
        assert_relative_eq!(first.x_charge, 90.0);
        assert_relative_eq!(first.y_charge, 95.0);
        assert_relative_eq!(first.x, x_plane.strip_position(200));
        assert_relative_eq!(first.y, y_plane.strip_position(1500));
        assert_relative_eq!(det.clusters()[1].y_charge, 40.0);
    }

    #[test]
    fn test_projection() {
        let mut det = filled_detector();
        det.form_2d_clusters(&MatchConfig::default(), Some(5264.0));
        let first = det.clusters()[0];
        let x_plane = det.plane(PlaneKind::X);
        assert_relative_eq!(first.z, 5264.0);
        assert_relative_eq!(
            first.x,
            x_plane.strip_position(200) * 5264.0 / 5304.0,
            max_relative = 1e-5
        );
    }
}
