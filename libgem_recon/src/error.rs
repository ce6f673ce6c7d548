use std::path::PathBuf;
use thiserror::Error;

use super::hardware_id::ApvAddress;
use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Found invalid plane kind {0}; expected X or Y")]
    BadPlaneKind(String),
    #[error("Found unsupported detector readout style {0}")]
    BadReadoutStyle(String),
    #[error("Detector {0} must define exactly one X and one Y plane")]
    BadPlaneSet(String),
    #[error("Detector or plane name {0} is defined more than once")]
    DuplicateName(String),
    #[error("FEC {0} is defined more than once")]
    DuplicateFec(u32),
    #[error("APV at {0} is defined more than once")]
    DuplicateApv(ApvAddress),
    #[error("APV at {0} references FEC {1} which is not defined")]
    UndefinedFec(ApvAddress, u32),
    #[error("APV at {0} references plane {1} which is not defined in any detector")]
    UndefinedPlane(ApvAddress, String),
    #[error("Configuration parameter {0} is invalid: {1}")]
    BadParameter(&'static str, String),
    #[error("Config failed due to pedestal error: {0}")]
    PedestalError(#[from] PedestalError),
}

#[derive(Debug, Clone, Error)]
pub enum ApvError {
    #[error("APV at {addr} received {received} samples but the buffer holds only {capacity}")]
    BufferOverflow {
        addr: ApvAddress,
        received: usize,
        capacity: usize,
    },
    #[error("APV at {0} received a byte payload that is not a whole number of words")]
    BadPayloadLength(ApvAddress),
}

/// Non-fatal lookup failures. These are logged and the offending hit is dropped.
#[derive(Debug, Clone, Error)]
pub enum LookupMiss {
    #[error("No APV is registered at {0}")]
    UnknownApv(ApvAddress),
    #[error("APV at {0} is not connected to any plane")]
    Unconnected(ApvAddress),
    #[error("APV at {0} has channel {1} out of range")]
    BadChannel(ApvAddress, u32),
    #[error("APV at {addr} sits at plug {index} but plane {plane} has only {connectors} connectors")]
    NotEnoughConnectors {
        addr: ApvAddress,
        plane: String,
        index: usize,
        connectors: usize,
    },
}

#[derive(Debug, Error)]
pub enum PedestalError {
    #[error("Pedestal table failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Pedestal table failed to parse an integer: {0}")]
    IntParsingError(#[from] std::num::ParseIntError),
    #[error("Pedestal table failed to parse a float: {0}")]
    FloatParsingError(#[from] std::num::ParseFloatError),
    #[error("Pedestal table has an incorrect format on line {0}; most likely the number of columns is incorrect")]
    BadFileFormat(usize),
    #[error("Pedestal table has channel {0} out of range")]
    BadChannel(usize),
}

#[derive(Debug, Clone, Error)]
pub enum MatcherError {
    #[error("Matcher invariant violated: {0}")]
    InvariantViolation(String),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Matcher error: {0}")]
    MatcherError(#[from] MatcherError),
    #[error("Processor failed due to Pedestal error: {0}")]
    PedestalError(#[from] PedestalError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}
