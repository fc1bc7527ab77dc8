//! Translation of a [`DetectorConfig`] into a session and processor specs.
//!
//! The range is split at the shortest distance profile 1 can measure free of
//! direct leakage. Below it, a close range group measures with profile 1 and
//! a loopback reference. Above it, a far range group uses the longest profile
//! allowed at each distance, with an intermediate profile where `max_profile`
//! would still see leakage.

use serde::{Deserialize, Serialize};

use super::DetectorConfig;
use crate::algo::aggregator::ProcessorSpec;
use crate::algo::processor::{
    calc_cfar_margin, distance_filter_edge_margin, min_num_points, MeasurementType, Processor, ProcessorConfig,
    ProcessorMode, ThresholdMethod,
};
use crate::error::{Error, Result};
use crate::sensor::{
    Metadata, Prf, Profile, SensorConfig, SensorGroup, SensorId, SessionConfig, SubsweepConfig,
    APPROX_BASE_STEP_LENGTH_M, MAX_HWAAS,
};

/// Longest distance measurable at a PRF before the next pulse folds in.
pub const MAX_MEAS_DIST_M: [(Prf, f64); 4] = [
    (Prf::Prf19_5MHz, 3.1),
    (Prf::Prf13_0MHz, 7.0),
    (Prf::Prf8_7MHz, 12.7),
    (Prf::Prf6_5MHz, 18.5),
];

pub const MIN_HWAAS: u32 = 4;
pub const VALID_STEP_LENGTHS_IN_COARSE: [u32; 8] = [1, 2, 3, 4, 6, 8, 12, 24];
pub const NUM_POINTS_IN_COARSE: u32 = 24;
pub const NUM_SUBSWEEPS_IN_SENSOR_CONFIG: usize = 4;
const MIN_NUM_POINTS_IN_ENVELOPE_FWHM_SPAN: f64 = 4.0;

const CLOSE_RANGE_SWEEPS_PER_FRAME: u32 = 10;
const FAR_RANGE_SWEEPS_PER_FRAME: u32 = 1;
const LOOPBACK_RECEIVER_GAIN: u32 = 15;
const CLOSE_RANGE_RECEIVER_GAIN: u32 = 5;
const FAR_RANGE_RECEIVER_GAIN: u32 = 10;

/// Shortest distance measurable free of direct leakage.
pub fn min_dist_m(profile: Profile) -> f64 {
    match profile {
        Profile::Profile1 => 0.10,
        Profile::Profile2 => 0.28,
        Profile::Profile3 => 0.56,
        Profile::Profile4 => 0.76,
        Profile::Profile5 => 1.28,
    }
}

/// Radar loop gain gained per doubling of HWAAS, in dB.
fn rlg_per_hwaas(profile: Profile) -> f64 {
    match profile {
        Profile::Profile1 => 11.3,
        Profile::Profile2 => 13.7,
        Profile::Profile3 => 19.0,
        Profile::Profile4 => 20.5,
        Profile::Profile5 => 21.6,
    }
}

/// Subsweeps sharing profile and step length, split at `breakpoints`
/// (in base steps, including margins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsweepGroupPlan {
    pub step_length: u32,
    pub breakpoints: Vec<i32>,
    pub profile: Profile,
    pub hwaas: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub close_range: Option<SubsweepGroupPlan>,
    pub far_range: Vec<SubsweepGroupPlan>,
}

/// Longest step that still samples the envelope FWHM with four points,
/// rounded to a step length the sensor accepts.
pub fn limit_step_length(profile: Profile, user_limit: Option<u32>) -> u32 {
    let fwhm_p = profile.envelope_fwhm_m() / APPROX_BASE_STEP_LENGTH_M;
    let mut limit = (fwhm_p / MIN_NUM_POINTS_IN_ENVELOPE_FWHM_SPAN) as u32;
    if let Some(user_limit) = user_limit {
        limit = limit.min(user_limit);
    }

    if limit < NUM_POINTS_IN_COARSE {
        let mut best = VALID_STEP_LENGTHS_IN_COARSE[0];
        for &step in &VALID_STEP_LENGTHS_IN_COARSE {
            if step.abs_diff(limit) < best.abs_diff(limit) {
                best = step;
            }
        }
        best
    } else {
        (limit / NUM_POINTS_IN_COARSE) * NUM_POINTS_IN_COARSE
    }
}

/// [`min_dist_m`] for every profile, pushed out by the CFAR margin when CFAR
/// thresholds are used. Indexed like [`Profile::ALL`].
pub fn min_dists_m(config: &DetectorConfig) -> [f64; 5] {
    Profile::ALL.map(|profile| {
        let mut dist = min_dist_m(profile);
        if config.threshold_method == ThresholdMethod::Cfar {
            let step_length = limit_step_length(profile, config.max_step_length);
            dist += (calc_cfar_margin(profile, step_length) as u32 * step_length) as f64 * APPROX_BASE_STEP_LENGTH_M;
        }
        dist
    })
}

fn profile_index(profile: Profile) -> usize {
    usize::from(profile.number() - 1)
}

/// Convert distances to points, floored to multiples of `step_length`.
pub fn m_to_points(breakpoints_m: &[f64], step_length: u32) -> Vec<i32> {
    let Some(&first) = breakpoints_m.first() else {
        return Vec::new();
    };
    let start_point = (first / APPROX_BASE_STEP_LENGTH_M).trunc();
    let step = f64::from(step_length);
    breakpoints_m
        .iter()
        .map(|&m| {
            let point = (m - first) / APPROX_BASE_STEP_LENGTH_M + start_point;
            ((point / step).floor() * step) as i32
        })
        .collect()
}

/// Drop breakpoints that would create empty subsweeps and keep at least
/// `min_num_steps` steps between the first and the last, moving the last one
/// out if needed.
fn normalize_breakpoints(mut breakpoints: Vec<i32>, step_length: u32, min_num_steps: u32) -> Vec<i32> {
    breakpoints.dedup();
    let first = breakpoints.first().copied().unwrap_or(0);
    let min_last = first + (min_num_steps.max(1) * step_length) as i32;
    if breakpoints.len() < 2 {
        breakpoints = vec![first, min_last];
    } else if let Some(last) = breakpoints.last_mut() {
        *last = (*last).max(min_last);
    }
    breakpoints
}

/// Steps a group needs before margins are added, so that its processor gets
/// at least [`min_num_points`] points once the filter margins are on.
fn min_num_steps_in_group(profile: Profile, step_length: u32) -> u32 {
    let margins = 2 * distance_filter_edge_margin(profile, step_length);
    min_num_points(profile, step_length).saturating_sub(margins) as u32
}

/// HWAAS per subsweep, so that the far end of each reaches `signal_quality`.
pub fn calculate_hwaas(profile: Profile, breakpoints: &[i32], signal_quality: f64) -> Vec<u32> {
    breakpoints
        .windows(2)
        .map(|pair| {
            let end_m = APPROX_BASE_STEP_LENGTH_M * f64::from(pair[1]);
            if end_m <= 0.0 {
                return MIN_HWAAS;
            }
            let rlg = signal_quality + 40.0 * end_m.log10();
            let hwaas = 10f64.powf((rlg - rlg_per_hwaas(profile)) / 10.0).trunc();
            hwaas.clamp(f64::from(MIN_HWAAS), f64::from(MAX_HWAAS)) as u32
        })
        .collect()
}

/// Widen a group for filter settling, overlap with neighbouring groups and
/// the CFAR window.
pub fn add_margin_to_breakpoints(
    profile: Profile,
    step_length: u32,
    base_breakpoints: &[i32],
    has_neighbour: (bool, bool),
    threshold_method: ThresholdMethod,
) -> Vec<i32> {
    let margin_p = (distance_filter_edge_margin(profile, step_length) as u32 * step_length) as i32;
    let mut left_margin = margin_p;
    let mut right_margin = margin_p;
    if has_neighbour.0 {
        left_margin += margin_p;
    }
    if has_neighbour.1 {
        right_margin += margin_p;
    }
    if threshold_method == ThresholdMethod::Cfar {
        let cfar_margin = (calc_cfar_margin(profile, step_length) as u32 * step_length) as i32;
        left_margin += cfar_margin;
        right_margin += cfar_margin;
    }

    let mut breakpoints = base_breakpoints.to_vec();
    if let Some(first) = breakpoints.first_mut() {
        *first -= left_margin;
    }
    if let Some(last) = breakpoints.last_mut() {
        *last += right_margin;
    }
    breakpoints
}

/// Highest PRF whose unambiguous range covers `breakpoint`.
pub fn select_prf(breakpoint: i32, profile: Profile) -> Result<Prf> {
    let breakpoint_m = f64::from(breakpoint) * APPROX_BASE_STEP_LENGTH_M;
    MAX_MEAS_DIST_M
        .iter()
        .filter(|(prf, _)| {
            *prf != Prf::Prf19_5MHz || matches!(profile, Profile::Profile1 | Profile::Profile2)
        })
        .filter(|(_, max_dist_m)| breakpoint_m < *max_dist_m)
        .map(|(prf, _)| *prf)
        .max_by(|a, b| a.frequency_hz().total_cmp(&b.frequency_hz()))
        .ok_or_else(|| {
            Error::InvalidDetectorConfig(format!("no PRF can measure out to {breakpoint_m:.2} m"))
        })
}

fn group_plan(
    config: &DetectorConfig,
    profile: Profile,
    breakpoints_m: &[f64],
    has_neighbour: (bool, bool),
) -> SubsweepGroupPlan {
    let step_length = limit_step_length(profile, config.max_step_length);
    let breakpoints = normalize_breakpoints(
        m_to_points(breakpoints_m, step_length),
        step_length,
        min_num_steps_in_group(profile, step_length),
    );
    let hwaas = calculate_hwaas(profile, &breakpoints, config.signal_quality);
    let breakpoints =
        add_margin_to_breakpoints(profile, step_length, &breakpoints, has_neighbour, config.threshold_method);
    SubsweepGroupPlan {
        step_length,
        breakpoints,
        profile,
        hwaas,
    }
}

fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    if num < 2 {
        return vec![start];
    }
    let step = (end - start) / (num - 1) as f64;
    (0..num)
        .map(|i| if i == num - 1 { end } else { start + step * i as f64 })
        .collect()
}

pub fn create_group_plans(config: &DetectorConfig) -> Result<Plan> {
    let min_dists = min_dists_m(config);
    let transition_m = min_dists[0];
    let max_profile_min_dist_m = min_dists[profile_index(config.max_profile)];
    let mut plan = Plan::default();

    if config.start_m < transition_m {
        plan.close_range = Some(group_plan(
            config,
            Profile::Profile1,
            &[config.start_m, transition_m],
            (false, transition_m < config.end_m),
        ));
    }

    let far_start_m = config.start_m.max(transition_m);
    if config.max_profile != Profile::Profile1
        && far_start_m < config.end_m
        && far_start_m < max_profile_min_dist_m
    {
        let profile = Profile::ALL
            .iter()
            .zip(min_dists)
            .filter(|(_, dist)| *dist <= far_start_m)
            .map(|(profile, _)| *profile)
            .last()
            .unwrap_or(Profile::Profile1);
        let end_m = config.end_m.min(max_profile_min_dist_m);
        plan.far_range.push(group_plan(
            config,
            profile,
            &[far_start_m, end_m],
            (plan.close_range.is_some(), max_profile_min_dist_m < config.end_m),
        ));
    }

    if max_profile_min_dist_m < config.end_m {
        let start_m = max_profile_min_dist_m.max(far_start_m);
        let num_breakpoints = NUM_SUBSWEEPS_IN_SENSOR_CONFIG + 1 - plan.far_range.len();
        let has_left = plan.close_range.is_some() || !plan.far_range.is_empty();
        plan.far_range.push(group_plan(
            config,
            config.max_profile,
            &linspace(start_m, config.end_m, num_breakpoints),
            (has_left, false),
        ));
    }

    if plan.close_range.is_none() && plan.far_range.is_empty() {
        return Err(Error::InvalidDetectorConfig(format!(
            "nothing to measure between {} m and {} m",
            config.start_m, config.end_m
        )));
    }
    Ok(plan)
}

fn num_points_between(from: i32, to: i32, step_length: u32) -> u32 {
    (to - from).max(0) as u32 / step_length
}

/// Loopback reference followed by a single profile 1 subsweep.
pub fn close_range_sensor_config(plan: &SubsweepGroupPlan) -> Result<SensorConfig> {
    let (&start, &end) = match plan.breakpoints.as_slice() {
        [start, end] => (start, end),
        _ => {
            return Err(Error::InvalidDetectorConfig(
                "close range plan must have exactly one subsweep".into(),
            ))
        }
    };
    let hwaas = plan.hwaas.first().copied().unwrap_or(MIN_HWAAS);
    let loopback = SubsweepConfig {
        start_point: 0,
        num_points: 1,
        step_length: 1,
        profile: Profile::Profile4,
        hwaas,
        receiver_gain: LOOPBACK_RECEIVER_GAIN,
        phase_enhancement: true,
        enable_loopback: true,
        ..SubsweepConfig::default()
    };
    let measurement = SubsweepConfig {
        start_point: start,
        num_points: num_points_between(start, end, plan.step_length),
        step_length: plan.step_length,
        profile: plan.profile,
        hwaas,
        receiver_gain: CLOSE_RANGE_RECEIVER_GAIN,
        phase_enhancement: true,
        enable_loopback: false,
        prf: select_prf(end, plan.profile)?,
    };
    Ok(SensorConfig {
        subsweeps: vec![loopback, measurement],
        sweeps_per_frame: CLOSE_RANGE_SWEEPS_PER_FRAME,
    })
}

/// One subsweep per breakpoint pair; returns the subsweep indexes of each
/// group plan alongside the sensor config.
pub fn far_range_sensor_config(plans: &[SubsweepGroupPlan]) -> Result<(SensorConfig, Vec<Vec<usize>>)> {
    let mut subsweeps = Vec::new();
    let mut indexes = Vec::with_capacity(plans.len());
    for plan in plans {
        let mut plan_indexes = Vec::new();
        for (i, pair) in plan.breakpoints.windows(2).enumerate() {
            plan_indexes.push(subsweeps.len());
            subsweeps.push(SubsweepConfig {
                start_point: pair[0],
                num_points: num_points_between(pair[0], pair[1], plan.step_length),
                step_length: plan.step_length,
                profile: plan.profile,
                hwaas: plan.hwaas.get(i).copied().unwrap_or(MIN_HWAAS),
                receiver_gain: FAR_RANGE_RECEIVER_GAIN,
                phase_enhancement: true,
                enable_loopback: false,
                prf: select_prf(pair[1], plan.profile)?,
            });
        }
        indexes.push(plan_indexes);
    }
    Ok((
        SensorConfig {
            subsweeps,
            sweeps_per_frame: FAR_RANGE_SWEEPS_PER_FRAME,
        },
        indexes,
    ))
}

/// Extended session (close range group first) and one processor spec per
/// subsweep group plan.
pub fn detector_to_session_config_and_processor_specs(
    config: &DetectorConfig,
    sensor_id: SensorId,
) -> Result<(SessionConfig, Vec<ProcessorSpec>)> {
    let plan = create_group_plans(config)?;
    let mut groups = Vec::new();
    let mut specs = Vec::new();

    if let Some(close_plan) = &plan.close_range {
        groups.push(SensorGroup::from([(sensor_id, close_range_sensor_config(close_plan)?)]));
        specs.push(ProcessorSpec {
            processor_config: ProcessorConfig {
                threshold_method: ThresholdMethod::Recorded,
                measurement_type: MeasurementType::CloseRange,
                ..ProcessorConfig::default()
            },
            group_index: groups.len() - 1,
            sensor_id,
            subsweep_indexes: vec![0, 1],
            processor_context: None,
        });
    }

    if !plan.far_range.is_empty() {
        let (sensor_config, subsweep_indexes) = far_range_sensor_config(&plan.far_range)?;
        groups.push(SensorGroup::from([(sensor_id, sensor_config)]));
        let processor_config = ProcessorConfig {
            threshold_method: config.threshold_method,
            measurement_type: MeasurementType::FarRange,
            fixed_threshold_value: config.fixed_threshold_value,
            threshold_sensitivity: config.threshold_sensitivity,
            cfar_one_sided: config.cfar_one_sided,
            ..ProcessorConfig::default()
        };
        for indexes in subsweep_indexes {
            specs.push(ProcessorSpec {
                processor_config: processor_config.clone(),
                group_index: groups.len() - 1,
                sensor_id,
                subsweep_indexes: indexes,
                processor_context: None,
            });
        }
    }

    let session_config = SessionConfig::from_groups(groups, Some(true))?;
    session_config.validate()?;
    check_processor_layouts(&session_config, &specs)?;
    Ok((session_config, specs))
}

// Build every planned processor once without calibration data, so a plan that
// passes here cannot be rejected by the processors at start.
fn check_processor_layouts(session_config: &SessionConfig, specs: &[ProcessorSpec]) -> Result<()> {
    for spec in specs {
        let sensor_config = session_config
            .sensor_config(spec.group_index, spec.sensor_id)
            .ok_or_else(|| Error::InvalidDetectorConfig("processor spec outside the session".into()))?;
        let metadata = Metadata::for_sensor_config(sensor_config, APPROX_BASE_STEP_LENGTH_M);
        let processor_config = match spec.processor_config.measurement_type {
            MeasurementType::CloseRange => ProcessorConfig {
                processor_mode: ProcessorMode::LeakageCalibration,
                ..spec.processor_config.clone()
            },
            MeasurementType::FarRange => ProcessorConfig {
                threshold_method: ThresholdMethod::Fixed,
                ..spec.processor_config.clone()
            },
        };
        Processor::new(
            sensor_config,
            &metadata,
            processor_config,
            Some(spec.subsweep_indexes.clone()),
            None,
        )
        .map_err(|e| Error::InvalidDetectorConfig(format!("planned range cannot be processed: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_length_limits() {
        assert_eq!(limit_step_length(Profile::Profile1, None), 4);
        assert_eq!(limit_step_length(Profile::Profile2, None), 6);
        assert_eq!(limit_step_length(Profile::Profile3, None), 12);
        assert_eq!(limit_step_length(Profile::Profile4, None), 24);
        assert_eq!(limit_step_length(Profile::Profile5, None), 24);
        assert_eq!(limit_step_length(Profile::Profile5, Some(5)), 4);
        assert_eq!(limit_step_length(Profile::Profile5, Some(1)), 1);
    }

    #[test]
    fn points_are_floored_to_step() {
        assert_eq!(m_to_points(&[0.2, 1.0], 4), vec![80, 400]);
        assert_eq!(m_to_points(&[0.1, 0.5, 1.0], 24), vec![24, 192, 384]);
        assert_eq!(m_to_points(&[0.0, 0.2], 4), vec![0, 80]);
    }

    #[test]
    fn hwaas_is_clipped() {
        assert_eq!(calculate_hwaas(Profile::Profile1, &[80, 400], 18.0), vec![4]);
        assert_eq!(calculate_hwaas(Profile::Profile5, &[0, 6000], 60.0), vec![MAX_HWAAS]);
        assert_eq!(calculate_hwaas(Profile::Profile1, &[-20, 0], 18.0), vec![MIN_HWAAS]);
    }

    #[test]
    fn prf_selection() {
        assert_eq!(select_prf(400, Profile::Profile1).unwrap(), Prf::Prf19_5MHz);
        assert_eq!(select_prf(400, Profile::Profile3).unwrap(), Prf::Prf13_0MHz);
        assert_eq!(select_prf(2000, Profile::Profile1).unwrap(), Prf::Prf13_0MHz);
        assert_eq!(select_prf(4000, Profile::Profile1).unwrap(), Prf::Prf8_7MHz);
        assert!(select_prf(8000, Profile::Profile5).is_err());
    }

    #[test]
    fn margins_depend_on_neighbours_and_cfar() {
        let base = [80, 400];
        assert_eq!(
            add_margin_to_breakpoints(Profile::Profile1, 4, &base, (false, false), ThresholdMethod::Fixed),
            vec![64, 416]
        );
        assert_eq!(
            add_margin_to_breakpoints(Profile::Profile1, 4, &base, (true, false), ThresholdMethod::Cfar),
            vec![28, 436]
        );
    }

    #[test]
    fn default_config_uses_one_far_group() {
        let plan = create_group_plans(&DetectorConfig::default()).unwrap();
        assert!(plan.close_range.is_none());
        assert_eq!(plan.far_range.len(), 1);
        let group = &plan.far_range[0];
        assert_eq!(group.profile, Profile::Profile1);
        assert_eq!(group.breakpoints, vec![44, 436]);
        assert_eq!(group.hwaas, vec![4]);
    }

    #[test]
    fn long_range_splits_into_four_subsweeps() {
        let config = DetectorConfig {
            start_m: 0.0,
            end_m: 5.0,
            threshold_method: ThresholdMethod::Fixed,
            ..DetectorConfig::default()
        };
        let (session, specs) = detector_to_session_config_and_processor_specs(&config, 2).unwrap();
        assert!(session.extended());
        assert_eq!(session.groups().len(), 2);
        let close = session.sensor_config(0, 2).unwrap();
        assert!(close.subsweeps[0].enable_loopback);
        assert_eq!(close.sweeps_per_frame, 10);
        let far = session.sensor_config(1, 2).unwrap();
        assert_eq!(far.subsweeps.len(), 4);
        for pair in far.subsweeps.windows(2) {
            if pair[0].profile == pair[1].profile {
                assert_eq!(pair[0].end_point(), i64::from(pair[1].start_point));
            }
        }
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].processor_config.measurement_type, MeasurementType::CloseRange);
        assert_eq!(specs[2].processor_config.threshold_method, ThresholdMethod::Fixed);
    }

    #[test]
    fn narrow_range_is_widened_to_a_processable_group() {
        let config = DetectorConfig {
            start_m: 0.9,
            end_m: 1.0,
            max_profile: Profile::Profile4,
            threshold_method: ThresholdMethod::Fixed,
            ..DetectorConfig::default()
        };
        let plan = create_group_plans(&config).unwrap();
        assert!(plan.close_range.is_none());
        assert_eq!(plan.far_range.len(), 1);
        let group = &plan.far_range[0];
        assert_eq!(group.profile, Profile::Profile4);
        assert_eq!(group.step_length, 24);
        // [360, 384] on the grid, widened to three steps, then 4 margin steps each side.
        assert_eq!(group.breakpoints, vec![264, 528]);

        let (session, specs) = detector_to_session_config_and_processor_specs(&config, 1).unwrap();
        let far = session.sensor_config(specs[0].group_index, 1).unwrap();
        let num_points: u32 = far.subsweeps.iter().map(|s| s.num_points).sum();
        assert!(num_points as usize >= min_num_points(Profile::Profile4, 24));
    }

    #[test]
    fn breakpoints_keep_minimum_span() {
        assert_eq!(normalize_breakpoints(vec![360, 360, 384], 24, 3), vec![360, 432]);
        assert_eq!(normalize_breakpoints(vec![80, 200, 400], 4, 3), vec![80, 200, 400]);
        assert_eq!(normalize_breakpoints(vec![40], 4, 0), vec![40, 44]);
        assert_eq!(min_num_steps_in_group(Profile::Profile1, 4), 3);
        assert_eq!(min_num_steps_in_group(Profile::Profile1, 1), 3);
    }

    #[test]
    fn linspace_hits_both_ends() {
        let v = linspace(1.0, 2.0, 5);
        assert_eq!(v, vec![1.0, 1.25, 1.5, 1.75, 2.0]);
    }
}
