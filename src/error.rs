//! Error type shared by the whole crate.

/// Errors produced while configuring, calibrating or running the detector.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A sensor or subsweep configuration violates a hardware constraint.
    #[error("invalid sensor config: {0}")]
    InvalidSensorConfig(String),

    /// The group/sensor layout of a session is not valid.
    #[error("invalid session config: {0}")]
    InvalidSessionConfig(String),

    /// The processor cannot run on the given subsweeps or settings.
    #[error("invalid processor config: {0}")]
    InvalidProcessorConfig(String),

    /// The detector config is out of range or cannot be planned.
    #[error("invalid detector config: {0}")]
    InvalidDetectorConfig(String),

    #[error("detector already started")]
    AlreadyStarted,

    #[error("detector not started")]
    NotStarted,

    /// A calibration step required by the current config has not been run.
    #[error("detector not calibrated: {0}")]
    NotCalibrated(&'static str),

    /// The stored calibration was made with another session config.
    #[error("session config does not match the config used during calibration")]
    SessionConfigMismatch,

    /// Calibration data in the context is only partially present.
    #[error("inconsistent detector context: {0}")]
    InconsistentContext(&'static str),

    /// Frame data does not have the layout announced by the metadata.
    #[error("unexpected result layout: {0}")]
    ResultLayout(String),

    /// Too few points to run the zero-phase filter.
    #[error("sweep of {len} points is too short for filtering (need more than {required})")]
    SweepTooShort { len: usize, required: usize },

    /// Failure reported by a [`crate::client::Client`] implementation.
    #[error("client error: {0}")]
    Client(String),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[cfg(feature = "parquet")]
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[cfg(feature = "parquet")]
    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
