//! Signal processing for the distance detector.
//!
//! - `filter`: Butterworth low-pass and zero-phase filtering
//! - `processor`: per-subsweep distance estimation and calibration
//! - `aggregator`: runs the processors of a session and merges their peaks
//! - `detector`: plans sessions from a detector config and drives a client

pub mod aggregator;
pub mod detector;
pub mod filter;
pub mod processor;

pub use aggregator::{merge_peaks, Aggregator, AggregatorConfig, AggregatorResult, PeakSortingMethod, ProcessorSpec};
pub use detector::{
    get_detector_status, DetailedStatus, Detector, DetectorConfig, DetectorContext, DetectorResult, DetectorStatus,
    SubsweepGroupPlan,
};
pub use processor::{
    MeasurementType, Processor, ProcessorConfig, ProcessorContext, ProcessorExtraResult, ProcessorMode,
    ProcessorResult, ThresholdMethod,
};
