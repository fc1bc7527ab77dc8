//! Sensor side data model: configurations sent to the radar and the frames it
//! returns.
//!
//! - `config`: profiles, PRFs, subsweep/sensor/session configurations
//! - `result`: frame metadata and complex IQ frames

pub mod config;
pub mod result;

pub use config::{
    Prf, Profile, SensorConfig, SensorGroup, SensorId, SessionConfig, SubsweepConfig, MAX_HWAAS, MAX_NUM_POINTS,
    MAX_RECEIVER_GAIN, MAX_SUBSWEEPS,
};
pub use result::{ExtendedMetadata, ExtendedResult, FrameResult, Metadata};

/// Nominal distance between two adjacent sweep points at step length 1.
pub const APPROX_BASE_STEP_LENGTH_M: f64 = 2.5e-3;
