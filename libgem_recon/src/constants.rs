// Electronics constants
pub const APV_STRIP_SIZE: usize = 128; // channels per APV
pub const APV_HALF_SIZE: usize = APV_STRIP_SIZE / 2; // split common mode partition
pub const APV_HEADER_WORDS: usize = 3; // below-threshold header samples
pub const APV_ADDRESS_WORDS: usize = 8; // pipeline address following the header
pub const APV_ERROR_WORDS: usize = 1;
pub const APV_HEADER_SIZE: usize = APV_HEADER_WORDS + APV_ADDRESS_WORDS + APV_ERROR_WORDS;
pub const TIME_SAMPLE_SIZE: usize = APV_STRIP_SIZE + APV_HEADER_SIZE; // samples per frame
pub const APV_BUFFER_SLACK: usize = 64; // leading samples before the first header
pub const DEFAULT_TIME_SAMPLES: usize = 3;
pub const DEFAULT_HEADER_LEVEL: f32 = 1500.0;

// Calibration constants
pub const UNCALIBRATED_NOISE: f32 = 5000.0; // suppresses every channel until fitted
pub const DEFAULT_COMMON_MODE_THRESHOLD: f32 = 20.0;
pub const DEFAULT_ZERO_SUPPRESSION_THRESHOLD: f32 = 5.0;
pub const MIN_PEDESTAL_ENTRIES: u64 = 1000;
pub const OFFSET_HIST_RANGE: (f32, f32) = (0.0, 4096.0);
pub const OFFSET_HIST_BINS: usize = 1024;
pub const NOISE_HIST_RANGE: (f32, f32) = (-200.0, 200.0);
pub const NOISE_HIST_BINS: usize = 800;

// Plane geometry constants
pub const X_PLANE_FIRST_STRIP: i32 = 16; // insensitive edge on the X plane
pub const X_PLANE_LAST_STRIP: i32 = 1391;
pub const X_PLANE_STRIP_OFFSET: f32 = 31.0; // strip count offset of the X position formula
pub const LAST_CONNECTOR_SHIFT: i32 = 16;
pub const CONNECTOR_FOLD_CENTER: i32 = 32;
pub const LAST_CONNECTOR_FOLD_CENTER: i32 = 48;
pub const DEFAULT_STRIP_PITCH: f32 = 0.4; // mm

// Clustering constants
pub const DEFAULT_MIN_CLUSTER_HITS: usize = 1;
pub const DEFAULT_MAX_CLUSTER_HITS: usize = 20;
pub const DEFAULT_SPLIT_THRESHOLD: f32 = 14.0;

// Matching constants
pub const DEFAULT_CALORIMETER_Z: f32 = 5817.0; // mm
pub const DEFAULT_MATCH_CUT: f32 = 15.0; // mm
pub const DEFAULT_GEM_RESOLUTION: f32 = 0.1; // mm
pub const DEFAULT_OVERLAP_FACTOR: f32 = 10.0;
