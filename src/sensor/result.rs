//! Frame metadata and IQ frames returned by a client.

use std::collections::BTreeMap;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::config::{SensorConfig, SensorId};
use crate::error::{Error, Result};

/// Layout of the frames produced by one sensor config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub frame_data_length: usize,
    pub sweep_data_length: usize,
    pub subsweep_data_offset: Vec<usize>,
    pub subsweep_data_length: Vec<usize>,
    /// Exact distance between points at step length 1 for this sensor.
    pub base_step_length_m: f64,
    pub calibration_temperature: i16,
}

impl Metadata {
    pub fn for_sensor_config(config: &SensorConfig, base_step_length_m: f64) -> Self {
        let mut offsets = Vec::with_capacity(config.num_subsweeps());
        let mut lengths = Vec::with_capacity(config.num_subsweeps());
        let mut offset = 0usize;
        for subsweep in &config.subsweeps {
            offsets.push(offset);
            lengths.push(subsweep.num_points as usize);
            offset += subsweep.num_points as usize;
        }
        Self {
            frame_data_length: offset * config.sweeps_per_frame as usize,
            sweep_data_length: offset,
            subsweep_data_offset: offsets,
            subsweep_data_length: lengths,
            base_step_length_m,
            calibration_temperature: 25,
        }
    }
}

/// One frame: `sweeps_per_frame` sweeps of complex samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    /// Indexed `[sweep][point]`.
    pub frame: Vec<Vec<Complex64>>,
    pub subsweep_data_offset: Vec<usize>,
    pub subsweep_data_length: Vec<usize>,
    pub tick: u32,
    pub data_saturated: bool,
    pub temperature: i16,
    pub calibration_needed: bool,
}

impl FrameResult {
    /// Empty frame shaped after `metadata`; filled by clients.
    pub fn zeroed(metadata: &Metadata, sweeps_per_frame: usize) -> Self {
        Self {
            frame: vec![vec![Complex64::new(0.0, 0.0); metadata.sweep_data_length]; sweeps_per_frame],
            subsweep_data_offset: metadata.subsweep_data_offset.clone(),
            subsweep_data_length: metadata.subsweep_data_length.clone(),
            tick: 0,
            data_saturated: false,
            temperature: metadata.calibration_temperature,
            calibration_needed: false,
        }
    }

    pub fn num_sweeps(&self) -> usize {
        self.frame.len()
    }

    /// The points of subsweep `index`, one slice per sweep.
    pub fn subframe(&self, index: usize) -> Result<Vec<&[Complex64]>> {
        let (offset, len) = match (
            self.subsweep_data_offset.get(index),
            self.subsweep_data_length.get(index),
        ) {
            (Some(&o), Some(&l)) => (o, l),
            _ => {
                return Err(Error::ResultLayout(format!(
                    "no subsweep {index} in frame with {} subsweeps",
                    self.subsweep_data_offset.len()
                )))
            }
        };
        self.frame
            .iter()
            .map(|sweep| {
                sweep.get(offset..offset + len).ok_or_else(|| {
                    Error::ResultLayout(format!(
                        "sweep of {} points has no room for subsweep {index} ({offset}..{})",
                        sweep.len(),
                        offset + len
                    ))
                })
            })
            .collect()
    }
}

/// Metadata per group, per sensor.
pub type ExtendedMetadata = Vec<BTreeMap<SensorId, Metadata>>;

/// Frames per group, per sensor.
pub type ExtendedResult = Vec<BTreeMap<SensorId, FrameResult>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::config::SubsweepConfig;

    fn two_subsweeps() -> SensorConfig {
        SensorConfig {
            subsweeps: vec![
                SubsweepConfig {
                    num_points: 1,
                    ..Default::default()
                },
                SubsweepConfig {
                    num_points: 3,
                    ..Default::default()
                },
            ],
            sweeps_per_frame: 2,
        }
    }

    #[test]
    fn metadata_layout() {
        let m = Metadata::for_sensor_config(&two_subsweeps(), 2.5e-3);
        assert_eq!(m.sweep_data_length, 4);
        assert_eq!(m.frame_data_length, 8);
        assert_eq!(m.subsweep_data_offset, vec![0, 1]);
        assert_eq!(m.subsweep_data_length, vec![1, 3]);
    }

    #[test]
    fn subframe_slices_each_sweep() {
        let m = Metadata::for_sensor_config(&two_subsweeps(), 2.5e-3);
        let mut r = FrameResult::zeroed(&m, 2);
        for (s, sweep) in r.frame.iter_mut().enumerate() {
            for (i, v) in sweep.iter_mut().enumerate() {
                *v = Complex64::new((s * 10 + i) as f64, 0.0);
            }
        }
        let sub = r.subframe(1).unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub[1].iter().map(|c| c.re).collect::<Vec<_>>(), vec![11.0, 12.0, 13.0]);
        assert!(r.subframe(2).is_err());
    }
}
