//! radar-distance crate root: re-exports and module wiring.
//!
//! Distance detection for pulsed coherent radar sensors:
//! - `sensor`: subsweep, sensor and session configs; frame metadata and data
//! - `client`: the `Client` trait and a simulated radar
//! - `algo`: filtering, per-subsweep processing, aggregation and the detector
//! - `persistence`: JSON/YAML files for configs and calibration contexts
//! - `recording`: detector session recording and result tables
//! - `logging`: tracing subscriber setup
//! - `version`: build version derived from git tags

pub mod algo;
pub mod client;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod recording;
pub mod sensor;
pub mod version;

// Public re-exports for a compact external API
pub use algo::{
    get_detector_status, DetailedStatus, Detector, DetectorConfig, DetectorContext, DetectorResult, DetectorStatus,
    PeakSortingMethod, ThresholdMethod,
};
pub use client::{Client, Reflector, SimulatedClient, SimulatedClientConfig};
pub use error::{Error, Result};
pub use persistence::AlgoData;
pub use recording::{FileRecorder, Recorder, ResultTable};
pub use sensor::{Prf, Profile, SensorConfig, SessionConfig, SubsweepConfig};
