//! # gem_recon
//!
//! gem_recon is the GEM tracking detector reconstruction, written in Rust. It takes the raw
//! data of the APV25 readout chips (or strips already zero suppressed online), corrects and
//! zero suppresses it, forms clusters on every readout plane, combines the X and Y planes
//! of every detector into 2-D clusters, and matches those with the clusters of the
//! calorimeter behind the detectors.
//!
//! ## Building & Install
//!
//! To build and install the CLI use `cargo install --path ./gem_recon_cli` from the top
//! level gem_recon repository. To use the CLI see `gem_recon_cli --help`.
//!
//! ## Pipeline
//!
//! Hardware is described by a tree of detectors, each with an X and a Y plane, and of
//! FECs (front end cards), each reading out a set of APVs. Every APV is plugged into one
//! plane at a given connector index. For each event:
//!
//! 1. The raw words of every APV are unshuffled into 16-bit samples, the time samples are
//!    located after the APV header, and every channel is corrected for its pedestal and
//!    the common mode of the chip. Channels whose averaged signal exceeds the zero
//!    suppression threshold are hits. This step runs per FEC and can be parallel.
//! 2. Hits are mapped from APV channel to plane strip and added to their plane.
//! 3. Every plane groups its hits into clusters of consecutive strips, splits clusters at
//!    charge valleys, drops clusters with too few or too many strips, and computes the
//!    position and charge of the rest.
//! 4. Every detector combines X and Y clusters into 2-D clusters, either pairing them by
//!    charge rank (`Normal`) or pairing every X with every Y (`Plus`).
//! 5. Calorimeter clusters are projected back onto each detector and matched with the
//!    2-D clusters within the cut radius.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows (`gem_recon_cli new` writes a
//! template):
//!
//! ```yml
//! detectors:
//! - name: PRadGEM1
//!   readout: Cartesian
//!   type: PRADGEM
//!   z: 5304.0
//!   planes:
//!   - name: PRadGEM1X
//!     kind: X
//!     size: 550.4
//!     connectors: 12
//!     orientation: 0
//!   - name: PRadGEM1Y
//!     kind: Y
//!     size: 1228.8
//!     connectors: 24
//!     orientation: 0
//! fecs:
//! - id: 0
//!   ip: 10.0.0.2
//! apvs:
//! - fec: 0
//!   adc: 0
//!   plane: PRadGEM1X
//!   orientation: 0
//!   index: 0
//!   flags: []
//! pedestal_path: null
//! apv:
//!   time_samples: 3
//!   common_mode_threshold: 20.0
//!   zero_suppression_threshold: 5.0
//!   parallel: false
//! clustering:
//!   min_cluster_hits: 1
//!   max_cluster_hits: 20
//!   split_threshold: 14.0
//!   strip_pitch: 0.4
//! matching:
//!   xy_mode: Normal
//!   charge: Peak
//!   project_to_second: false
//!   cut_distance: 15.0
//!   policy: Closest
//!   resolution: 0.1
//!   overlap_factor: 10.0
//!   calorimeter_z: 5817.0
//! ```
//!
//! APV flags are `SplitReadout` (the common mode is computed separately for each half of
//! the chip) and `Masked` (the chip is never read). Every section but `detectors`, `fecs`,
//! and `apvs` can be left out to use the defaults shown above.
//!
//! ### Pedestal Format
//!
//! Pedestal tables are CSV files with one header line and one row per channel:
//!
//! ```csv
//! fec,adc,channel,offset,noise
//! ```
//!
//! Tables written by a pedestal run (`gem_recon_cli pedestal`) can be read back through
//! the `pedestal_path` of the configuration. Channels without a pedestal keep a noise so
//! large that they never fire.
//!
//! ## Output
//!
//! Reconstruction writes one YAML document per event with the 2-D clusters of every
//! detector and the matched calorimeter hits. A log file, `gem_recon.log`, contains the
//! detailed status of the run, including every dropped APV and hit.
pub mod apv;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod detector;
pub mod error;
pub mod event;
pub mod fec;
pub mod hardware_id;
pub mod matcher;
pub mod pedestal;
pub mod plane;
pub mod process;
pub mod system;
pub mod worker_status;
