//! Distance processor.
//!
//! Turns the frames of a run of contiguous subsweeps into distance estimates:
//! average the sweeps of a frame, low-pass filter with zero phase, take the
//! magnitude, threshold it and interpolate every peak above the threshold.
//!
//! The same processor also runs the two calibrations the detector needs:
//! direct leakage (close range only) and the recorded background threshold.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::filter::{butter_lowpass2, filtfilt, BiquadParams, FILTFILT_PADLEN};
use crate::error::{Error, Result};
use crate::sensor::{FrameResult, Metadata, Profile, SensorConfig, SubsweepConfig, APPROX_BASE_STEP_LENGTH_M};

pub const DEFAULT_THRESHOLD_SENSITIVITY: f64 = 0.5;
pub const DEFAULT_FIXED_THRESHOLD_VALUE: f64 = 100.0;
pub const DEFAULT_CFAR_ONE_SIDED: bool = false;
pub const DEFAULT_SC_BG_NUM_STD_DEV: f64 = 3.0;

const CFAR_GUARD_LENGTH_ADJUSTMENT: f64 = 2.0;
const CFAR_WINDOW_LENGTH_ADJUSTMENT: f64 = 0.25;
pub const MIN_NUM_POINTS_CROPPED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessorMode {
    #[default]
    DistanceEstimation,
    LeakageCalibration,
    RecordedThresholdCalibration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdMethod {
    /// Constant false alarm rate: compare each point with the mean of its
    /// neighbourhood.
    #[default]
    Cfar,
    Fixed,
    /// Per-point threshold learned from background frames.
    Recorded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasurementType {
    /// Loopback + profile 1 subsweep, with leakage and phase jitter removal.
    CloseRange,
    #[default]
    FarRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub processor_mode: ProcessorMode,
    pub threshold_method: ThresholdMethod,
    pub measurement_type: MeasurementType,
    pub threshold_sensitivity: f64,
    pub fixed_threshold_value: f64,
    pub cfar_one_sided: bool,
    /// Full CFAR guard length in metres; derived from the profile when unset.
    pub cfar_guard_length_m: Option<f64>,
    /// CFAR window length in metres; derived from the profile when unset.
    pub cfar_window_length_m: Option<f64>,
    /// Standard deviations above the background mean for recorded thresholds.
    pub sc_bg_num_std_dev: f64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            processor_mode: ProcessorMode::default(),
            threshold_method: ThresholdMethod::default(),
            measurement_type: MeasurementType::default(),
            threshold_sensitivity: DEFAULT_THRESHOLD_SENSITIVITY,
            fixed_threshold_value: DEFAULT_FIXED_THRESHOLD_VALUE,
            cfar_one_sided: DEFAULT_CFAR_ONE_SIDED,
            cfar_guard_length_m: None,
            cfar_window_length_m: None,
            sc_bg_num_std_dev: DEFAULT_SC_BG_NUM_STD_DEV,
        }
    }
}

/// Calibration data a processor runs with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorContext {
    pub recorded_threshold: Option<Vec<f64>>,
    /// Noise level added to the CFAR threshold before sensitivity scaling.
    pub abs_noise_std: Option<f64>,
    pub direct_leakage: Option<Vec<Complex64>>,
    pub phase_jitter_comp_ref: Option<f64>,
}

/// Intermediate signals, for plotting and diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorExtraResult {
    pub abs_sweep: Vec<f64>,
    /// NaN where no threshold could be computed.
    pub used_threshold: Option<Vec<f64>>,
    pub distances_m: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorResult {
    pub estimated_distances: Vec<f64>,
    pub estimated_amplitudes: Vec<f64>,
    /// Set in recorded threshold calibration once two frames have been seen.
    pub recorded_threshold: Option<Vec<f64>>,
    pub direct_leakage: Option<Vec<Complex64>>,
    pub phase_jitter_comp_reference: Option<f64>,
    pub extra_result: ProcessorExtraResult,
}

/// Points cropped from each end of the filtered sweep, where the filter has
/// not settled.
pub fn distance_filter_edge_margin(profile: Profile, step_length: u32) -> usize {
    (profile.envelope_fwhm_m() / (APPROX_BASE_STEP_LENGTH_M * f64::from(step_length))).ceil() as usize
}

pub fn cfar_guard_half_length(profile: Profile, step_length: u32) -> usize {
    guard_half_length_points(profile.envelope_fwhm_m() * CFAR_GUARD_LENGTH_ADJUSTMENT, step_length)
}

pub fn cfar_window_length(profile: Profile, step_length: u32) -> usize {
    window_length_points(profile.envelope_fwhm_m() * CFAR_WINDOW_LENGTH_ADJUSTMENT, step_length)
}

fn guard_half_length_points(guard_length_m: f64, step_length: u32) -> usize {
    (guard_length_m / 2.0 / (APPROX_BASE_STEP_LENGTH_M * f64::from(step_length))).round() as usize
}

fn window_length_points(window_length_m: f64, step_length: u32) -> usize {
    ((window_length_m / (APPROX_BASE_STEP_LENGTH_M * f64::from(step_length))).round() as usize).max(1)
}

/// Points at each end of a sweep where a two-sided CFAR threshold is undefined.
pub fn calc_cfar_margin(profile: Profile, step_length: u32) -> usize {
    cfar_guard_half_length(profile, step_length) + cfar_window_length(profile, step_length)
}

/// Fewest points a processor accepts: enough for the zero-phase filter and
/// [`MIN_NUM_POINTS_CROPPED`] points left after cropping the filter margins.
pub fn min_num_points(profile: Profile, step_length: u32) -> usize {
    (2 * distance_filter_edge_margin(profile, step_length) + MIN_NUM_POINTS_CROPPED).max(FILTFILT_PADLEN + 1)
}

/// Low-pass cutoff matched to the envelope width, normalised to Nyquist.
pub fn distance_filter_cutoff(profile: Profile, step_length: u32) -> f64 {
    APPROX_BASE_STEP_LENGTH_M * f64::from(step_length) / profile.envelope_fwhm_m()
}

/// CFAR threshold: mean of the cells at `offsets` on both sides (or only the
/// near side when `one_sided`) plus `abs_noise_std`, divided by
/// `sensitivity`.
///
/// Cells whose window would fall outside the sweep get NaN.
pub fn calculate_cfar_threshold(
    abs_sweep: &[f64],
    offsets: &[usize],
    sensitivity: f64,
    one_sided: bool,
    abs_noise_std: f64,
) -> Vec<f64> {
    let n = abs_sweep.len();
    let mut threshold = vec![f64::NAN; n];
    let Some(&start) = offsets.iter().max() else {
        return threshold;
    };
    let end = if one_sided { n } else { n.saturating_sub(start) };
    let scale = 1.0 / (sensitivity + 1e-10);

    for idx in start..end {
        let mut sum: f64 = offsets.iter().map(|&k| abs_sweep[idx - k]).sum();
        let mut count = offsets.len();
        if !one_sided {
            sum += offsets.iter().map(|&k| abs_sweep[idx + k]).sum::<f64>();
            count *= 2;
        }
        threshold[idx] = (sum / count as f64 + abs_noise_std) * scale;
    }
    threshold
}

/// Indexes of local maxima above `threshold`.
///
/// A peak needs its left neighbour above threshold too. Plateaus report their
/// first point; a plateau that runs into a higher value, the threshold or the
/// end of the sweep is not a peak.
pub fn find_peaks(abs_sweep: &[f64], threshold: &[f64]) -> Vec<usize> {
    let n = abs_sweep.len().min(threshold.len());
    let mut peaks = Vec::new();
    let mut d = 1;
    while d + 1 < n {
        if threshold[d - 1].is_nan() {
            d += 1;
            continue;
        }
        if threshold[d + 1].is_nan() {
            break;
        }
        if abs_sweep[d] <= threshold[d] {
            d += 2;
            continue;
        }
        if abs_sweep[d - 1] <= threshold[d - 1] || abs_sweep[d - 1] >= abs_sweep[d] {
            d += 1;
            continue;
        }

        let mut upper = d + 1;
        loop {
            if upper >= n - 1 || threshold[upper].is_nan() || abs_sweep[upper] <= threshold[upper] {
                break;
            }
            if abs_sweep[upper] > abs_sweep[d] {
                break;
            }
            if abs_sweep[upper] < abs_sweep[d] {
                peaks.push(d + first_argmax(&abs_sweep[d..upper]));
                break;
            }
            upper += 1;
        }
        d = upper;
    }
    peaks
}

fn first_argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Fit a parabola through each peak and its neighbours.
///
/// Returns distances in metres and the amplitude at the vertex.
pub fn interpolate_peaks(
    abs_sweep: &[f64],
    peak_idxs: &[usize],
    start_point: i32,
    step_length: u32,
    base_step_length_m: f64,
) -> (Vec<f64>, Vec<f64>) {
    let mut distances = Vec::with_capacity(peak_idxs.len());
    let mut amplitudes = Vec::with_capacity(peak_idxs.len());
    for &p in peak_idxs {
        if p == 0 || p + 1 >= abs_sweep.len() {
            continue;
        }
        let (y0, y1, y2) = (abs_sweep[p - 1], abs_sweep[p], abs_sweep[p + 1]);
        let a = (y0 - 2.0 * y1 + y2) / 2.0;
        let b = (y2 - y0) / 2.0;
        let (offset, amplitude) = if a == 0.0 {
            (0.0, y1)
        } else {
            (-b / (2.0 * a), y1 - b * b / (4.0 * a))
        };
        let location = p as f64 + offset;
        distances.push((f64::from(start_point) + location * f64::from(step_length)) * base_step_length_m);
        amplitudes.push(amplitude);
    }
    (distances, amplitudes)
}

#[derive(Debug, Clone)]
struct ThresholdRecording {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    num_frames: usize,
    num_std_dev: f64,
}

impl ThresholdRecording {
    fn new(len: usize, num_std_dev: f64) -> Self {
        Self {
            sum: vec![0.0; len],
            sum_sq: vec![0.0; len],
            num_frames: 0,
            num_std_dev,
        }
    }

    /// Add a frame; the threshold is defined from the second frame on.
    fn update(&mut self, abs_sweep: &[f64]) -> Option<Vec<f64>> {
        for ((s, sq), &v) in self.sum.iter_mut().zip(self.sum_sq.iter_mut()).zip(abs_sweep) {
            *s += v;
            *sq += v * v;
        }
        self.num_frames += 1;
        if self.num_frames < 2 {
            return None;
        }
        let n = self.num_frames as f64;
        Some(
            self.sum
                .iter()
                .zip(&self.sum_sq)
                .map(|(&s, &sq)| {
                    let mean = s / n;
                    let std = ((sq / n - mean * mean).abs() * n / (n - 1.0)).sqrt();
                    mean + self.num_std_dev * std
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Processor {
    config: ProcessorConfig,
    context: ProcessorContext,
    subsweep_indexes: Vec<usize>,
    loopback_index: Option<usize>,
    measurement_indexes: Vec<usize>,
    profile: Profile,
    step_length: u32,
    num_points: usize,
    margin: usize,
    start_point_cropped: i32,
    num_points_cropped: usize,
    base_step_length_m: f64,
    distances_m: Vec<f64>,
    filter: BiquadParams,
    threshold: Option<Vec<f64>>,
    cfar_offsets: Vec<usize>,
    recording: Option<ThresholdRecording>,
}

impl Processor {
    /// Build a processor for `subsweep_indexes` (all subsweeps when `None`)
    /// of `sensor_config`.
    ///
    /// Measurement subsweeps must share profile and step length, follow each
    /// other without gaps and use phase enhancement. Close range processors
    /// take the loopback subsweep first.
    pub fn new(
        sensor_config: &SensorConfig,
        metadata: &Metadata,
        config: ProcessorConfig,
        subsweep_indexes: Option<Vec<usize>>,
        context: Option<ProcessorContext>,
    ) -> Result<Self> {
        let subsweep_indexes =
            subsweep_indexes.unwrap_or_else(|| (0..sensor_config.num_subsweeps()).collect());
        if subsweep_indexes.is_empty() {
            return Err(Error::InvalidProcessorConfig("no subsweeps selected".into()));
        }
        let subsweeps = subsweep_indexes
            .iter()
            .map(|&i| {
                sensor_config.subsweeps.get(i).ok_or_else(|| {
                    Error::InvalidProcessorConfig(format!(
                        "subsweep index {i} out of range ({} subsweeps)",
                        sensor_config.num_subsweeps()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (loopback_index, measurement_indexes, measurement) = match config.measurement_type {
            MeasurementType::CloseRange => {
                if subsweeps.len() < 2 || !subsweeps[0].enable_loopback {
                    return Err(Error::InvalidProcessorConfig(
                        "close range needs a loopback subsweep followed by measurement subsweeps".into(),
                    ));
                }
                (
                    Some(subsweep_indexes[0]),
                    subsweep_indexes[1..].to_vec(),
                    subsweeps[1..].to_vec(),
                )
            }
            MeasurementType::FarRange => (None, subsweep_indexes.clone(), subsweeps),
        };
        if measurement.iter().any(|s| s.enable_loopback) {
            return Err(Error::InvalidProcessorConfig(
                "loopback subsweeps cannot be used for distance measurement".into(),
            ));
        }
        if config.processor_mode == ProcessorMode::LeakageCalibration
            && config.measurement_type != MeasurementType::CloseRange
        {
            return Err(Error::InvalidProcessorConfig(
                "leakage calibration is only defined for close range".into(),
            ));
        }

        let (profile, step_length) = validate_measurement_subsweeps(&measurement)?;
        let start_point = measurement[0].start_point;
        let num_points: usize = measurement.iter().map(|s| s.num_points as usize).sum();

        let margin = distance_filter_edge_margin(profile, step_length);
        let min_points = min_num_points(profile, step_length);
        if num_points < min_points {
            return Err(Error::InvalidProcessorConfig(format!(
                "{num_points} points, need at least {min_points} to filter and crop {margin} margin points at each end"
            )));
        }
        let num_points_cropped = num_points - 2 * margin;
        let start_point_cropped = start_point + (margin as u32 * step_length) as i32;
        let base_step_length_m = metadata.base_step_length_m;
        let distances_m = (0..num_points_cropped)
            .map(|i| {
                (f64::from(start_point_cropped) + (i as f64) * f64::from(step_length)) * base_step_length_m
            })
            .collect();

        let filter = butter_lowpass2(distance_filter_cutoff(profile, step_length))?;

        let mut processor = Self {
            config,
            context: context.unwrap_or_default(),
            subsweep_indexes,
            loopback_index,
            measurement_indexes,
            profile,
            step_length,
            num_points,
            margin,
            start_point_cropped,
            num_points_cropped,
            base_step_length_m,
            distances_m,
            filter,
            threshold: None,
            cfar_offsets: Vec::new(),
            recording: None,
        };
        processor.init_mode()?;
        Ok(processor)
    }

    fn init_mode(&mut self) -> Result<()> {
        self.threshold = None;
        self.cfar_offsets.clear();
        self.recording = None;

        let close_range = self.config.measurement_type == MeasurementType::CloseRange;
        match self.config.processor_mode {
            ProcessorMode::LeakageCalibration => {}
            ProcessorMode::RecordedThresholdCalibration => {
                if close_range {
                    self.check_leakage_context()?;
                }
                self.recording = Some(ThresholdRecording::new(
                    self.num_points_cropped,
                    self.config.sc_bg_num_std_dev,
                ));
            }
            ProcessorMode::DistanceEstimation => {
                if close_range {
                    self.check_leakage_context()?;
                }
                match self.config.threshold_method {
                    ThresholdMethod::Fixed => {
                        self.threshold = Some(vec![self.config.fixed_threshold_value; self.num_points_cropped]);
                    }
                    ThresholdMethod::Recorded => {
                        let recorded = self.context.recorded_threshold.as_ref().ok_or_else(|| {
                            Error::InvalidProcessorConfig("missing recorded threshold in context".into())
                        })?;
                        if recorded.len() != self.num_points_cropped {
                            return Err(Error::InvalidProcessorConfig(format!(
                                "recorded threshold has {} points, sweep has {}",
                                recorded.len(),
                                self.num_points_cropped
                            )));
                        }
                        self.threshold = Some(recorded.clone());
                    }
                    ThresholdMethod::Cfar => {
                        let guard = match self.config.cfar_guard_length_m {
                            Some(m) if m.is_finite() && m >= 0.0 => guard_half_length_points(m, self.step_length),
                            Some(m) => {
                                return Err(Error::InvalidProcessorConfig(format!(
                                    "cfar_guard_length_m {m} must be >= 0"
                                )))
                            }
                            None => cfar_guard_half_length(self.profile, self.step_length),
                        };
                        let window = match self.config.cfar_window_length_m {
                            Some(m) if m.is_finite() && m > 0.0 => window_length_points(m, self.step_length),
                            Some(m) => {
                                return Err(Error::InvalidProcessorConfig(format!(
                                    "cfar_window_length_m {m} must be > 0"
                                )))
                            }
                            None => cfar_window_length(self.profile, self.step_length),
                        };
                        self.cfar_offsets = (guard..guard + window).collect();
                    }
                }
            }
        }
        Ok(())
    }

    fn check_leakage_context(&self) -> Result<()> {
        let leakage = self.context.direct_leakage.as_ref().ok_or_else(|| {
            Error::InvalidProcessorConfig("close range needs direct leakage in context".into())
        })?;
        if self.context.phase_jitter_comp_ref.is_none() {
            return Err(Error::InvalidProcessorConfig(
                "close range needs a phase jitter reference in context".into(),
            ));
        }
        if leakage.len() != self.num_points {
            return Err(Error::InvalidProcessorConfig(format!(
                "direct leakage has {} points, sweep has {}",
                leakage.len(),
                self.num_points
            )));
        }
        Ok(())
    }

    /// Change thresholding parameters. Mode and measurement type are fixed
    /// for the lifetime of a processor.
    pub fn update_config(&mut self, config: ProcessorConfig) -> Result<()> {
        if config.processor_mode != self.config.processor_mode
            || config.measurement_type != self.config.measurement_type
        {
            return Err(Error::InvalidProcessorConfig(
                "processor mode and measurement type cannot change".into(),
            ));
        }
        self.config = config;
        self.init_mode()
    }

    pub fn process(&mut self, result: &FrameResult) -> Result<ProcessorResult> {
        let mut sweeps = self.measurement_sweeps(result)?;

        let mut leakage_calibration = None;
        if let Some(loopback_index) = self.loopback_index {
            let loopback = result
                .subframe(loopback_index)?
                .into_iter()
                .map(|sweep| {
                    sweep
                        .first()
                        .copied()
                        .ok_or_else(|| Error::ResultLayout("empty loopback subsweep".into()))
                })
                .collect::<Result<Vec<_>>>()?;

            let reference = match self.config.processor_mode {
                ProcessorMode::LeakageCalibration => circular_mean_phase(&loopback),
                _ => self
                    .context
                    .phase_jitter_comp_ref
                    .ok_or(Error::InconsistentContext("phase jitter reference missing"))?,
            };
            for (sweep, lb) in sweeps.iter_mut().zip(&loopback) {
                let correction = Complex64::from_polar(1.0, reference - lb.arg());
                sweep.iter_mut().for_each(|v| *v *= correction);
            }

            if self.config.processor_mode == ProcessorMode::LeakageCalibration {
                leakage_calibration = Some((mean_sweep(&sweeps, self.num_points), reference));
            } else if let Some(leakage) = &self.context.direct_leakage {
                for sweep in sweeps.iter_mut() {
                    sweep.iter_mut().zip(leakage).for_each(|(v, l)| *v -= l);
                }
            }
        }

        let mean = mean_sweep(&sweeps, self.num_points);
        let filtered = filtfilt(&self.filter, &mean)?;
        let abs_sweep: Vec<f64> = filtered[self.margin..self.margin + self.num_points_cropped]
            .iter()
            .map(|v| v.norm())
            .collect();

        match self.config.processor_mode {
            ProcessorMode::DistanceEstimation => Ok(self.process_distance_estimation(abs_sweep)),
            ProcessorMode::LeakageCalibration => {
                let (direct_leakage, reference) = leakage_calibration
                    .ok_or(Error::InconsistentContext("leakage calibration without loopback"))?;
                Ok(ProcessorResult {
                    direct_leakage: Some(direct_leakage),
                    phase_jitter_comp_reference: Some(reference),
                    extra_result: self.extra(abs_sweep, None),
                    ..Default::default()
                })
            }
            ProcessorMode::RecordedThresholdCalibration => {
                let recorded_threshold = self
                    .recording
                    .as_mut()
                    .and_then(|recording| recording.update(&abs_sweep));
                Ok(ProcessorResult {
                    recorded_threshold,
                    extra_result: self.extra(abs_sweep, None),
                    ..Default::default()
                })
            }
        }
    }

    fn process_distance_estimation(&self, abs_sweep: Vec<f64>) -> ProcessorResult {
        let threshold = match &self.threshold {
            Some(t) => t.clone(),
            None => calculate_cfar_threshold(
                &abs_sweep,
                &self.cfar_offsets,
                self.config.threshold_sensitivity,
                self.config.cfar_one_sided,
                self.context.abs_noise_std.unwrap_or(0.0),
            ),
        };
        let peaks = find_peaks(&abs_sweep, &threshold);
        let (estimated_distances, estimated_amplitudes) = interpolate_peaks(
            &abs_sweep,
            &peaks,
            self.start_point_cropped,
            self.step_length,
            self.base_step_length_m,
        );
        ProcessorResult {
            estimated_distances,
            estimated_amplitudes,
            extra_result: self.extra(abs_sweep, Some(threshold)),
            ..Default::default()
        }
    }

    fn extra(&self, abs_sweep: Vec<f64>, used_threshold: Option<Vec<f64>>) -> ProcessorExtraResult {
        ProcessorExtraResult {
            abs_sweep,
            used_threshold,
            distances_m: self.distances_m.clone(),
        }
    }

    // Concatenated measurement subsweeps, one vector per sweep.
    fn measurement_sweeps(&self, result: &FrameResult) -> Result<Vec<Vec<Complex64>>> {
        let mut sweeps = vec![Vec::with_capacity(self.num_points); result.num_sweeps()];
        for &index in &self.measurement_indexes {
            for (sweep, part) in sweeps.iter_mut().zip(result.subframe(index)?) {
                sweep.extend_from_slice(part);
            }
        }
        if sweeps.is_empty() || sweeps.iter().any(|s| s.len() != self.num_points) {
            return Err(Error::ResultLayout(format!(
                "expected {} points per sweep from subsweeps {:?}",
                self.num_points, self.measurement_indexes
            )));
        }
        Ok(sweeps)
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn subsweep_indexes(&self) -> &[usize] {
        &self.subsweep_indexes
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn step_length(&self) -> u32 {
        self.step_length
    }

    /// Distance of every point of the cropped sweep.
    pub fn distances_m(&self) -> &[f64] {
        &self.distances_m
    }

    pub fn num_points_cropped(&self) -> usize {
        self.num_points_cropped
    }
}

fn validate_measurement_subsweeps(subsweeps: &[&SubsweepConfig]) -> Result<(Profile, u32)> {
    let first = subsweeps
        .first()
        .ok_or_else(|| Error::InvalidProcessorConfig("no measurement subsweeps".into()))?;
    if subsweeps.iter().any(|s| s.profile != first.profile) {
        return Err(Error::InvalidProcessorConfig("subsweeps use different profiles".into()));
    }
    if subsweeps.iter().any(|s| s.step_length != first.step_length) {
        return Err(Error::InvalidProcessorConfig("subsweeps use different step lengths".into()));
    }
    if subsweeps.iter().any(|s| !s.phase_enhancement) {
        return Err(Error::InvalidProcessorConfig("phase enhancement is required".into()));
    }
    for pair in subsweeps.windows(2) {
        if i64::from(pair[1].start_point) != pair[0].end_point() {
            return Err(Error::InvalidProcessorConfig(format!(
                "subsweep starting at {} does not continue the one ending at {}",
                pair[1].start_point,
                pair[0].end_point()
            )));
        }
    }
    Ok((first.profile, first.step_length))
}

fn mean_sweep(sweeps: &[Vec<Complex64>], num_points: usize) -> Vec<Complex64> {
    let mut mean = vec![Complex64::new(0.0, 0.0); num_points];
    for sweep in sweeps {
        mean.iter_mut().zip(sweep).for_each(|(m, v)| *m += v);
    }
    let n = sweeps.len().max(1) as f64;
    mean.iter_mut().for_each(|m| *m /= n);
    mean
}

fn circular_mean_phase(values: &[Complex64]) -> f64 {
    values
        .iter()
        .filter(|v| v.norm() > 0.0)
        .map(|v| v / v.norm())
        .sum::<Complex64>()
        .arg()
}
