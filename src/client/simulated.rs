//! Synthetic radar client.
//!
//! Each reflector is rendered as a Gaussian envelope with the FWHM of the
//! subsweep's profile and a constant carrier phase. On top of that come a
//! direct leakage echo at 0 m, per-sweep phase jitter (seen in full on
//! loopback subsweeps) and complex Gaussian noise shrinking with HWAAS.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::Client;
use crate::error::{Error, Result};
use crate::sensor::{
    ExtendedMetadata, ExtendedResult, FrameResult, Metadata, SessionConfig, SubsweepConfig,
    APPROX_BASE_STEP_LENGTH_M,
};

/// Carrier wavelength at 60.5 GHz.
const WAVELENGTH_M: f64 = 299_792_458.0 / 60.5e9;
const LOOPBACK_AMPLITUDE: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reflector {
    pub distance_m: f64,
    pub amplitude: f64,
}

impl Reflector {
    pub fn new(distance_m: f64, amplitude: f64) -> Self {
        Self {
            distance_m,
            amplitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedClientConfig {
    pub reflectors: Vec<Reflector>,
    /// Standard deviation of each noise component at HWAAS 1.
    pub noise_std: f64,
    pub direct_leakage_amplitude: f64,
    pub phase_jitter_std_rad: f64,
    pub base_step_length_m: f64,
    pub seed: u64,
}

impl Default for SimulatedClientConfig {
    fn default() -> Self {
        Self {
            reflectors: vec![Reflector::new(0.5, 1000.0)],
            noise_std: 10.0,
            direct_leakage_amplitude: 2000.0,
            phase_jitter_std_rad: 0.05,
            base_step_length_m: APPROX_BASE_STEP_LENGTH_M,
            seed: 0,
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Ready {
        session: SessionConfig,
        metadata: ExtendedMetadata,
    },
    Running {
        session: SessionConfig,
        metadata: ExtendedMetadata,
    },
}

#[derive(Debug)]
pub struct SimulatedClient {
    config: SimulatedClientConfig,
    rng: StdRng,
    state: State,
    tick: u32,
    frames_delivered: u64,
}

impl SimulatedClient {
    pub fn new(config: SimulatedClientConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            state: State::Idle,
            tick: 0,
            frames_delivered: 0,
        }
    }

    pub fn config(&self) -> &SimulatedClientConfig {
        &self.config
    }

    /// Move the scene. Takes effect from the next frame.
    pub fn set_reflectors(&mut self, reflectors: Vec<Reflector>) {
        self.config.reflectors = reflectors;
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    fn gaussian(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    fn render_subsweep(
        &mut self,
        subsweep: &SubsweepConfig,
        jitter: Complex64,
        base_step_length_m: f64,
        out: &mut [Complex64],
    ) {
        if subsweep.enable_loopback {
            for v in out.iter_mut() {
                *v = Complex64::from_polar(LOOPBACK_AMPLITUDE, 0.3) * jitter;
            }
            return;
        }

        let fwhm = subsweep.profile.envelope_fwhm_m();
        let noise_std = self.config.noise_std / f64::from(subsweep.hwaas.max(1)).sqrt();
        let leakage = Reflector::new(0.0, self.config.direct_leakage_amplitude);

        for (i, v) in out.iter_mut().enumerate() {
            let point = subsweep.start_point + (i as u32 * subsweep.step_length) as i32;
            let r = f64::from(point) * base_step_length_m;

            let mut echo = Complex64::new(0.0, 0.0);
            for reflector in self.config.reflectors.iter().chain(std::iter::once(&leakage)) {
                let delta = (r - reflector.distance_m) / fwhm;
                let envelope = (-4.0 * std::f64::consts::LN_2 * delta * delta).exp();
                let phase = 4.0 * PI * reflector.distance_m / WAVELENGTH_M;
                echo += Complex64::from_polar(reflector.amplitude * envelope, phase);
            }

            let noise = Complex64::new(self.gaussian(), self.gaussian()) * noise_std;
            *v = echo * jitter + noise;
        }
    }
}

impl Default for SimulatedClient {
    fn default() -> Self {
        Self::new(SimulatedClientConfig::default())
    }
}

impl Client for SimulatedClient {
    fn setup_session(&mut self, session_config: &SessionConfig) -> Result<ExtendedMetadata> {
        if self.is_running() {
            return Err(Error::Client("session is running".into()));
        }
        session_config.validate()?;

        let metadata: ExtendedMetadata = session_config
            .groups()
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|(&id, cfg)| {
                        (id, Metadata::for_sensor_config(cfg, self.config.base_step_length_m))
                    })
                    .collect::<BTreeMap<_, _>>()
            })
            .collect();

        self.state = State::Ready {
            session: session_config.clone(),
            metadata: metadata.clone(),
        };
        Ok(metadata)
    }

    fn start_session(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Ready { session, metadata } => {
                self.state = State::Running { session, metadata };
                Ok(())
            }
            other => {
                self.state = other;
                Err(Error::Client("session not set up or already running".into()))
            }
        }
    }

    fn get_next(&mut self) -> Result<ExtendedResult> {
        let (session, metadata) = match &self.state {
            State::Running { session, metadata } => (session.clone(), metadata.clone()),
            _ => return Err(Error::Client("session not started".into())),
        };

        let base_step = self.config.base_step_length_m;
        let mut extended = ExtendedResult::with_capacity(session.groups().len());
        for (group, group_metadata) in session.groups().iter().zip(&metadata) {
            let mut results = BTreeMap::new();
            for (&id, sensor_config) in group {
                let meta = &group_metadata[&id];
                let mut result = FrameResult::zeroed(meta, sensor_config.sweeps_per_frame as usize);
                result.tick = self.tick;

                for sweep in result.frame.iter_mut() {
                    let jitter =
                        Complex64::from_polar(1.0, self.config.phase_jitter_std_rad * self.gaussian());
                    for (k, subsweep) in sensor_config.subsweeps.iter().enumerate() {
                        let offset = meta.subsweep_data_offset[k];
                        let len = meta.subsweep_data_length[k];
                        self.render_subsweep(subsweep, jitter, base_step, &mut sweep[offset..offset + len]);
                    }
                }
                results.insert(id, result);
            }
            extended.push(results);
            self.tick = self.tick.wrapping_add(1000);
        }

        self.frames_delivered += 1;
        Ok(extended)
    }

    fn stop_session(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Running { session, metadata } => {
                self.state = State::Ready { session, metadata };
                Ok(())
            }
            other => {
                self.state = other;
                Err(Error::Client("session not running".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorConfig;

    fn session() -> SessionConfig {
        SessionConfig::new(SensorConfig {
            subsweeps: vec![SubsweepConfig {
                start_point: 100,
                num_points: 200,
                step_length: 2,
                hwaas: 16,
                ..Default::default()
            }],
            sweeps_per_frame: 4,
        })
    }

    #[test]
    fn session_state_machine() {
        let mut c = SimulatedClient::default();
        assert!(c.start_session().is_err());
        assert!(c.get_next().is_err());

        c.setup_session(&session()).unwrap();
        assert!(c.get_next().is_err());
        c.start_session().unwrap();
        assert!(c.start_session().is_err());
        assert!(c.setup_session(&session()).is_err());

        let r = c.get_next().unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r[0][&1].frame.len(), 4);
        assert_eq!(r[0][&1].frame[0].len(), 200);

        c.stop_session().unwrap();
        assert!(c.stop_session().is_err());
        assert_eq!(c.frames_delivered(), 1);
    }

    #[test]
    fn echo_peaks_at_reflector() {
        let mut c = SimulatedClient::new(SimulatedClientConfig {
            reflectors: vec![Reflector::new(0.6, 1000.0)],
            noise_std: 0.0,
            phase_jitter_std_rad: 0.0,
            ..Default::default()
        });
        c.setup_session(&session()).unwrap();
        c.start_session().unwrap();
        let r = c.get_next().unwrap();
        let sweep = &r[0][&1].frame[0];
        let (argmax, _) = sweep
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .unwrap();
        // point 100 + 2 * i at 2.5 mm is 0.6 m for i = 70
        assert_eq!(argmax, 70);
    }

    #[test]
    fn noise_is_standard_normal() {
        let mut c = SimulatedClient::default();
        let samples: Vec<f64> = (0..20_000).map(|_| c.gaussian()).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }

    #[test]
    fn same_seed_same_frames() {
        let mut a = SimulatedClient::default();
        let mut b = SimulatedClient::default();
        for c in [&mut a, &mut b] {
            c.setup_session(&session()).unwrap();
            c.start_session().unwrap();
        }
        assert_eq!(a.get_next().unwrap(), b.get_next().unwrap());
    }
}
