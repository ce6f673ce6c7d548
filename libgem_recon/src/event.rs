use serde::{Deserialize, Serialize};

/// Raw multiplexed words read out from one APV in one event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawApvData {
    pub fec_id: u32,
    pub adc_ch: u32,
    pub words: Vec<u32>,
}

/// A single strip that already passed zero suppression upstream (online or from an event container)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StripHitRecord {
    pub fec_id: u32,
    pub adc_ch: u32,
    pub channel: u32,
    pub samples: Vec<f32>,
}

/// A cluster from the calorimeter reconstruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CaloCluster {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub energy: f32,
    #[serde(default)]
    pub status: u32,
}

impl CaloCluster {
    pub fn new(x: f32, y: f32, z: f32, energy: f32) -> Self {
        Self {
            x,
            y,
            z,
            energy,
            status: 0,
        }
    }
}

/// Everything the external decoders hand over for one event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GemEvent {
    pub event_number: u64,
    #[serde(default)]
    pub raw: Vec<RawApvData>,
    #[serde(default)]
    pub zero_suppressed: Vec<StripHitRecord>,
    #[serde(default)]
    pub calorimeter: Vec<CaloCluster>,
}

/// Scale a transverse position from depth `z_source` to depth `z_target` along a ray from the target.
pub fn project(x: f32, y: f32, z_source: f32, z_target: f32) -> (f32, f32) {
    let scale = z_target / z_source;
    (x * scale, y * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_projection() {
        let (x, y) = project(100.0, 50.0, 5817.0, 5304.0);
        assert_relative_eq!(x, 100.0 * 5304.0 / 5817.0, max_relative = 1e-6);
        assert_relative_eq!(y, 50.0 * 5304.0 / 5817.0, max_relative = 1e-6);
    }

    #[test]
    fn test_event_yaml() {
        let yaml = r#"
event_number: 12
raw:
  - fec_id: 0
    adc_ch: 1
    words: [1, 2, 3]
calorimeter:
  - {x: 1.0, y: 2.0, z: 5817.0, energy: 1100.0}
"#;
        let event: GemEvent = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(event.event_number, 12);
        assert_eq!(event.raw[0].words.len(), 3);
        assert!(event.zero_suppressed.is_empty());
        assert_eq!(event.calorimeter[0].status, 0);
    }
}
