use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Which coordinate a plane measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaneKind {
    X,
    Y,
}

impl PlaneKind {
    pub fn index(&self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
        }
    }
}

impl FromStr for PlaneKind {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "X" || s == "x" {
            Ok(Self::X)
        } else if s == "Y" || s == "y" {
            Ok(Self::Y)
        } else {
            Err(ConfigError::BadPlaneKind(s.to_string()))
        }
    }
}

impl Display for PlaneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::Y => write!(f, "Y"),
        }
    }
}

/// Readout styles a detector can be built with. Only cartesian X/Y strips exist so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadoutStyle {
    Cartesian,
}

impl FromStr for ReadoutStyle {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("cartesian") {
            Ok(Self::Cartesian)
        } else {
            Err(ConfigError::BadReadoutStyle(s.to_string()))
        }
    }
}

/// Index of a plane inside the system registry: the owning detector and the plane kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneHandle {
    pub detector: usize,
    pub kind: PlaneKind,
}

/// ApvAddress is the hardware address of a single APV (FEC id and ADC channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ApvAddress {
    pub fec_id: u32,
    pub adc_ch: u32,
}

impl ApvAddress {
    pub fn new(fec_id: u32, adc_ch: u32) -> Self {
        Self { fec_id, adc_ch }
    }
}

impl Display for ApvAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FEC {} ADC {}", self.fec_id, self.adc_ch)
    }
}
