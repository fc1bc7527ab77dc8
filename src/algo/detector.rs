//! Distance detector: plans a session from a [`DetectorConfig`], runs the
//! calibrations it needs and produces merged distance estimates per frame.
//!
//! Typical use:
//!
//! 1. [`Detector::calibrate_close_range`] when the range starts close to the
//!    sensor,
//! 2. [`Detector::record_threshold`] for close range or recorded thresholds,
//! 3. [`Detector::start`], then [`Detector::get_next`] per frame and
//!    [`Detector::stop`].
//!
//! Calibration results live in a [`DetectorContext`] that can be stored and
//! reused as long as the planned session config does not change.

pub mod plan;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use plan::SubsweepGroupPlan;

use super::aggregator::{Aggregator, AggregatorConfig, AggregatorResult, PeakSortingMethod, ProcessorSpec};
use super::processor::{
    MeasurementType, ProcessorContext, ProcessorMode, ProcessorResult, ThresholdMethod,
    DEFAULT_CFAR_ONE_SIDED, DEFAULT_FIXED_THRESHOLD_VALUE, DEFAULT_THRESHOLD_SENSITIVITY,
};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::persistence::AlgoData;
use crate::recording::Recorder;
use crate::sensor::{ExtendedResult, Profile, SensorId, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailedStatus {
    Ok,
    CloseRangeCalibrationMissing,
    CloseRangeCalibrationConfigMismatch,
    RecordedThresholdMissing,
    RecordedThresholdConfigMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorStatus {
    pub detector_state: DetailedStatus,
    pub ready_to_calibrate_close_range: bool,
    pub ready_to_record_threshold: bool,
    pub ready_to_start: bool,
}

/// Calibration results, and the session configs they were made with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_leakage: Option<Vec<Complex64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_jitter_comp_reference: Option<f64>,
    /// One threshold per processor spec, in spec order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_thresholds: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_threshold_session_config_used: Option<SessionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_range_session_config_used: Option<SessionConfig>,
}

impl DetectorContext {
    /// Direct leakage and phase reference are stored together.
    pub fn close_range_calibrated(&self) -> Result<bool> {
        match (&self.direct_leakage, &self.phase_jitter_comp_reference) {
            (Some(_), Some(_)) => Ok(true),
            (None, None) => Ok(false),
            _ => Err(Error::InconsistentContext(
                "direct leakage and phase jitter reference must be set together",
            )),
        }
    }

    pub fn recorded_threshold_calibrated(&self) -> bool {
        self.recorded_thresholds.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    pub start_m: f64,
    pub end_m: f64,
    /// Upper bound on the step length, in base steps.
    pub max_step_length: Option<u32>,
    pub max_profile: Profile,
    /// Target signal quality in dB at the far end of each subsweep.
    pub signal_quality: f64,
    pub threshold_method: ThresholdMethod,
    pub peaksorting_method: PeakSortingMethod,
    pub num_frames_in_recorded_threshold: usize,
    pub fixed_threshold_value: f64,
    pub threshold_sensitivity: f64,
    pub cfar_one_sided: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            start_m: 0.2,
            end_m: 1.0,
            max_step_length: None,
            max_profile: Profile::Profile5,
            signal_quality: 18.0,
            threshold_method: ThresholdMethod::Cfar,
            peaksorting_method: PeakSortingMethod::Strongest,
            num_frames_in_recorded_threshold: 20,
            fixed_threshold_value: DEFAULT_FIXED_THRESHOLD_VALUE,
            threshold_sensitivity: DEFAULT_THRESHOLD_SENSITIVITY,
            cfar_one_sided: DEFAULT_CFAR_ONE_SIDED,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.start_m.is_finite() || !self.end_m.is_finite() {
            return Err(Error::InvalidDetectorConfig("range must be finite".into()));
        }
        if self.start_m < 0.0 {
            return Err(Error::InvalidDetectorConfig(format!(
                "start_m {} must not be negative",
                self.start_m
            )));
        }
        if self.start_m >= self.end_m {
            return Err(Error::InvalidDetectorConfig(format!(
                "start_m {} must be less than end_m {}",
                self.start_m, self.end_m
            )));
        }
        if self.max_step_length == Some(0) {
            return Err(Error::InvalidDetectorConfig("max_step_length must be > 0".into()));
        }
        if !self.signal_quality.is_finite() {
            return Err(Error::InvalidDetectorConfig("signal_quality must be finite".into()));
        }
        if self.num_frames_in_recorded_threshold < 2 {
            return Err(Error::InvalidDetectorConfig(
                "num_frames_in_recorded_threshold must be at least 2".into(),
            ));
        }
        if !self.fixed_threshold_value.is_finite() {
            return Err(Error::InvalidDetectorConfig("fixed_threshold_value must be finite".into()));
        }
        if !(self.threshold_sensitivity.is_finite() && self.threshold_sensitivity > 0.0) {
            return Err(Error::InvalidDetectorConfig("threshold_sensitivity must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorResult {
    /// Sorted according to the configured peak sorting method.
    pub distances: Vec<f64>,
    pub strengths: Vec<f64>,
    pub processor_results: Vec<ProcessorResult>,
    pub service_extended_result: ExtendedResult,
}

impl From<AggregatorResult> for DetectorResult {
    fn from(result: AggregatorResult) -> Self {
        Self {
            distances: result.estimated_distances,
            strengths: result.estimated_amplitudes,
            processor_results: result.processor_results,
            service_extended_result: result.service_extended_result,
        }
    }
}

pub struct Detector<C: Client> {
    client: C,
    sensor_id: SensorId,
    config: DetectorConfig,
    context: DetectorContext,
    session_config: SessionConfig,
    processor_specs: Vec<ProcessorSpec>,
    aggregator: Option<Aggregator>,
    recorder: Option<Box<dyn Recorder>>,
    started: bool,
    frame_index: u64,
}

impl<C: Client> Detector<C> {
    pub fn new(
        client: C,
        sensor_id: SensorId,
        config: DetectorConfig,
        context: Option<DetectorContext>,
    ) -> Result<Self> {
        config.validate()?;
        let (session_config, processor_specs) =
            plan::detector_to_session_config_and_processor_specs(&config, sensor_id)?;
        Ok(Self {
            client,
            sensor_id,
            config,
            context: context.unwrap_or_default(),
            session_config,
            processor_specs,
            aggregator: None,
            recorder: None,
            started: false,
            frame_index: 0,
        })
    }

    /// Measure the direct leakage and loopback phase of the close range
    /// group. Clears any recorded thresholds, as they depend on it.
    pub fn calibrate_close_range(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        let close_range_spec = self
            .processor_specs
            .iter()
            .filter(|spec| spec.processor_config.measurement_type == MeasurementType::CloseRange)
            .cloned()
            .collect::<Vec<_>>();
        if close_range_spec.len() != 1 {
            return Err(Error::InvalidDetectorConfig(
                "the configured range has no close range measurement".into(),
            ));
        }
        let specs = with_processor_mode(close_range_spec, ProcessorMode::LeakageCalibration);

        info!(sensor_id = self.sensor_id, "calibrating close range");
        let result = self.run_calibration_session(specs, 1)?;
        let processor_result = result
            .processor_results
            .into_iter()
            .next()
            .ok_or(Error::InconsistentContext("close range calibration produced no result"))?;
        let (Some(direct_leakage), Some(reference)) =
            (processor_result.direct_leakage, processor_result.phase_jitter_comp_reference)
        else {
            return Err(Error::InconsistentContext("close range calibration produced no leakage"));
        };

        self.context.direct_leakage = Some(direct_leakage);
        self.context.phase_jitter_comp_reference = Some(reference);
        self.context.close_range_session_config_used = Some(self.session_config.clone());
        self.context.recorded_thresholds = None;
        debug!(phase_jitter_comp_reference = reference, "close range calibrated");
        Ok(())
    }

    /// Record a background threshold for every processor over
    /// `num_frames_in_recorded_threshold` frames.
    pub fn record_threshold(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        let specs = with_processor_mode(
            self.processor_specs.clone(),
            ProcessorMode::RecordedThresholdCalibration,
        );
        let specs = self.add_context_to_processor_specs(specs)?;

        let num_frames = self.config.num_frames_in_recorded_threshold;
        info!(sensor_id = self.sensor_id, num_frames, "recording threshold");
        let result = self.run_calibration_session(specs, num_frames)?;

        let thresholds = result
            .processor_results
            .into_iter()
            .map(|r| {
                r.recorded_threshold
                    .ok_or(Error::NotCalibrated("threshold recording needs at least two frames"))
            })
            .collect::<Result<Vec<_>>>()?;
        self.context.recorded_thresholds = Some(thresholds);
        self.context.recorded_threshold_session_config_used = Some(self.session_config.clone());
        Ok(())
    }

    // Runs the current session for `num_frames` frames and keeps the last
    // aggregated result. The client session is stopped even on failure.
    fn run_calibration_session(&mut self, specs: Vec<ProcessorSpec>, num_frames: usize) -> Result<AggregatorResult> {
        let extended_metadata = self.client.setup_session(&self.session_config)?;
        let mut aggregator =
            Aggregator::new(&self.session_config, &extended_metadata, AggregatorConfig::default(), specs)?;

        self.client.start_session()?;
        let mut last = None;
        let mut outcome = Ok(());
        for _ in 0..num_frames {
            match self.client.get_next().and_then(|r| aggregator.process(r)) {
                Ok(result) => last = Some(result),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        let stopped = self.client.stop_session();
        outcome?;
        stopped?;
        last.ok_or(Error::NotCalibrated("no frames were processed"))
    }

    /// Status of this detector's config and context.
    pub fn status(&self) -> Result<DetectorStatus> {
        get_detector_status(&self.config, &self.context, self.sensor_id)
    }

    /// Start measuring. `recorder` receives the algo data now and every
    /// result from [`Detector::get_next`].
    pub fn start(&mut self, recorder: Option<Box<dyn Recorder>>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.ensure_detector_is_calibrated()?;
        self.ensure_matching_session_config()?;

        let specs = self.add_context_to_processor_specs(self.processor_specs.clone())?;
        let extended_metadata = self.client.setup_session(&self.session_config)?;
        let aggregator_config = AggregatorConfig {
            peak_sorting_method: self.config.peaksorting_method,
            ..AggregatorConfig::default()
        };
        let aggregator = Aggregator::new(&self.session_config, &extended_metadata, aggregator_config, specs)?;

        let mut recorder = recorder;
        if let Some(recorder) = recorder.as_mut() {
            recorder.record_algo_data(&AlgoData {
                sensor_id: self.sensor_id,
                detector_config: self.config.clone(),
                context: self.context.clone(),
            })?;
        }

        self.client.start_session()?;
        self.aggregator = Some(aggregator);
        self.recorder = recorder;
        self.started = true;
        self.frame_index = 0;
        info!(
            sensor_id = self.sensor_id,
            start_m = self.config.start_m,
            end_m = self.config.end_m,
            processors = self.processor_specs.len(),
            "detector started"
        );
        Ok(())
    }

    pub fn get_next(&mut self) -> Result<DetectorResult> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        let aggregator = self.aggregator.as_mut().ok_or(Error::NotStarted)?;

        let extended_result = self.client.get_next()?;
        let result = DetectorResult::from(aggregator.process(extended_result)?);
        debug!(frame = self.frame_index, distances = ?result.distances, "detector result");

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record_result(self.frame_index, &result)?;
        }
        self.frame_index += 1;
        Ok(result)
    }

    /// Stop the session and finish the recorder, if any.
    pub fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        self.started = false;
        self.aggregator = None;
        let stopped = self.client.stop_session();
        let finished = match self.recorder.take() {
            Some(mut recorder) => recorder.finish(),
            None => Ok(()),
        };
        info!(sensor_id = self.sensor_id, frames = self.frame_index, "detector stopped");
        stopped?;
        finished
    }

    /// Re-plan the session. Calibrations made with another session config
    /// are kept but no longer match.
    pub fn update_config(&mut self, config: DetectorConfig) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        config.validate()?;
        let (session_config, processor_specs) =
            plan::detector_to_session_config_and_processor_specs(&config, self.sensor_id)?;
        self.config = config;
        self.session_config = session_config;
        self.processor_specs = processor_specs;
        Ok(())
    }

    // Close range processors in distance estimation take everything from the
    // context; close range threshold recording takes the leakage; far range
    // processors take a recorded threshold when a matching one exists.
    fn add_context_to_processor_specs(&self, specs: Vec<ProcessorSpec>) -> Result<Vec<ProcessorSpec>> {
        const CLOSE_RANGE_MISSING: &str = "close range calibration not performed";
        const RECORDED_MISSING: &str = "recorded threshold calibration not performed";

        specs
            .into_iter()
            .enumerate()
            .map(|(idx, mut spec)| {
                let config = &spec.processor_config;
                match (config.measurement_type, config.processor_mode) {
                    (MeasurementType::CloseRange, ProcessorMode::DistanceEstimation) => {
                        if !self.context.close_range_calibrated()? {
                            return Err(Error::NotCalibrated(CLOSE_RANGE_MISSING));
                        }
                        let threshold = self
                            .context
                            .recorded_thresholds
                            .as_ref()
                            .and_then(|t| t.get(idx))
                            .ok_or(Error::NotCalibrated(RECORDED_MISSING))?;
                        spec.processor_context = Some(ProcessorContext {
                            recorded_threshold: Some(threshold.clone()),
                            abs_noise_std: None,
                            direct_leakage: self.context.direct_leakage.clone(),
                            phase_jitter_comp_ref: self.context.phase_jitter_comp_reference,
                        });
                    }
                    (MeasurementType::CloseRange, ProcessorMode::RecordedThresholdCalibration) => {
                        if !self.context.close_range_calibrated()? {
                            return Err(Error::NotCalibrated(CLOSE_RANGE_MISSING));
                        }
                        spec.processor_context = Some(ProcessorContext {
                            recorded_threshold: None,
                            abs_noise_std: None,
                            direct_leakage: self.context.direct_leakage.clone(),
                            phase_jitter_comp_ref: self.context.phase_jitter_comp_reference,
                        });
                    }
                    (MeasurementType::FarRange, _)
                        if config.threshold_method == ThresholdMethod::Recorded
                            && self.context.recorded_threshold_calibrated()
                            && self.context.recorded_threshold_session_config_used.as_ref()
                                == Some(&self.session_config) =>
                    {
                        let threshold = self
                            .context
                            .recorded_thresholds
                            .as_ref()
                            .and_then(|t| t.get(idx))
                            .ok_or(Error::NotCalibrated(RECORDED_MISSING))?;
                        spec.processor_context = Some(ProcessorContext {
                            recorded_threshold: Some(threshold.clone()),
                            ..ProcessorContext::default()
                        });
                    }
                    _ => {}
                }
                Ok(spec)
            })
            .collect()
    }

    fn ensure_detector_is_calibrated(&self) -> Result<()> {
        if has_close_range_measurement(&self.processor_specs)
            && !(self.context.close_range_calibrated()? && self.context.recorded_threshold_calibrated())
        {
            return Err(Error::NotCalibrated("close range needs leakage and threshold calibration"));
        }
        if has_recorded_threshold_mode(&self.processor_specs) && !self.context.recorded_threshold_calibrated() {
            return Err(Error::NotCalibrated("recorded threshold missing"));
        }
        Ok(())
    }

    fn ensure_matching_session_config(&self) -> Result<()> {
        if has_close_range_measurement(&self.processor_specs)
            && self.context.close_range_session_config_used.as_ref() != Some(&self.session_config)
        {
            return Err(Error::SessionConfigMismatch);
        }
        if has_recorded_threshold_mode(&self.processor_specs)
            && self.context.recorded_threshold_session_config_used.as_ref() != Some(&self.session_config)
        {
            return Err(Error::SessionConfigMismatch);
        }
        Ok(())
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn context(&self) -> &DetectorContext {
        &self.context
    }

    /// Replace the calibration context, e.g. with one loaded from disk.
    pub fn set_context(&mut self, context: DetectorContext) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.context = context;
        Ok(())
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    pub fn processor_specs(&self) -> &[ProcessorSpec] {
        &self.processor_specs
    }

    pub fn sensor_id(&self) -> SensorId {
        self.sensor_id
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn into_parts(self) -> (C, DetectorContext) {
        (self.client, self.context)
    }
}

/// Calibration state of `context` for the session `config` plans.
pub fn get_detector_status(
    config: &DetectorConfig,
    context: &DetectorContext,
    sensor_id: SensorId,
) -> Result<DetectorStatus> {
    let (session_config, specs) = plan::detector_to_session_config_and_processor_specs(config, sensor_id)?;
    let has_close_range = has_close_range_measurement(&specs);

    let mut ready_to_record_threshold = false;
    let detector_state = if has_close_range {
        if !context.close_range_calibrated()? {
            DetailedStatus::CloseRangeCalibrationMissing
        } else if context.close_range_session_config_used.as_ref() != Some(&session_config) {
            DetailedStatus::CloseRangeCalibrationConfigMismatch
        } else if !context.recorded_threshold_calibrated() {
            ready_to_record_threshold = true;
            DetailedStatus::RecordedThresholdMissing
        } else if context.recorded_threshold_session_config_used.as_ref() != Some(&session_config) {
            DetailedStatus::RecordedThresholdConfigMismatch
        } else {
            ready_to_record_threshold = true;
            DetailedStatus::Ok
        }
    } else if has_recorded_threshold_mode(&specs) {
        ready_to_record_threshold = true;
        if !context.recorded_threshold_calibrated() {
            DetailedStatus::RecordedThresholdMissing
        } else if context.recorded_threshold_session_config_used.as_ref() != Some(&session_config) {
            DetailedStatus::RecordedThresholdConfigMismatch
        } else {
            DetailedStatus::Ok
        }
    } else {
        DetailedStatus::Ok
    };

    Ok(DetectorStatus {
        detector_state,
        ready_to_calibrate_close_range: has_close_range,
        ready_to_record_threshold,
        ready_to_start: detector_state == DetailedStatus::Ok,
    })
}

fn with_processor_mode(specs: Vec<ProcessorSpec>, mode: ProcessorMode) -> Vec<ProcessorSpec> {
    specs
        .into_iter()
        .map(|mut spec| {
            spec.processor_config.processor_mode = mode;
            spec
        })
        .collect()
}

fn has_close_range_measurement(specs: &[ProcessorSpec]) -> bool {
    specs
        .iter()
        .any(|spec| spec.processor_config.measurement_type == MeasurementType::CloseRange)
}

fn has_recorded_threshold_mode(specs: &[ProcessorSpec]) -> bool {
    specs
        .iter()
        .any(|spec| spec.processor_config.threshold_method == ThresholdMethod::Recorded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        DetectorConfig::default().validate().unwrap();
    }

    #[test]
    fn reversed_range_rejected() {
        let config = DetectorConfig {
            start_m: 1.0,
            end_m: 0.5,
            ..DetectorConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidDetectorConfig(_))));
    }

    #[test]
    fn half_calibrated_context_is_inconsistent() {
        let context = DetectorContext {
            phase_jitter_comp_reference: Some(0.1),
            ..DetectorContext::default()
        };
        assert!(matches!(context.close_range_calibrated(), Err(Error::InconsistentContext(_))));
    }

    #[test]
    fn config_from_partial_yaml() {
        let config: DetectorConfig = serde_yaml::from_str("end_m: 2.5\nmax_profile: Profile3\n").unwrap();
        assert_eq!(config.end_m, 2.5);
        assert_eq!(config.max_profile, Profile::Profile3);
        assert_eq!(config.start_m, 0.2);
        assert!(serde_yaml::from_str::<DetectorConfig>("end: 2.5\n").is_err());
    }
}
