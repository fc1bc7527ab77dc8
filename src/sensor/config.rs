//! Sensor, subsweep and session configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pulse profile. Higher profiles emit longer pulses: more energy and a wider
/// envelope, so worse close-in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Profile {
    Profile1,
    Profile2,
    Profile3,
    Profile4,
    Profile5,
}

impl Profile {
    /// All profiles, shortest pulse first.
    pub const ALL: [Profile; 5] = [
        Profile::Profile1,
        Profile::Profile2,
        Profile::Profile3,
        Profile::Profile4,
        Profile::Profile5,
    ];

    /// Full width at half maximum of the envelope, in metres.
    pub fn envelope_fwhm_m(self) -> f64 {
        match self {
            Profile::Profile1 => 0.04,
            Profile::Profile2 => 0.07,
            Profile::Profile3 => 0.14,
            Profile::Profile4 => 0.19,
            Profile::Profile5 => 0.32,
        }
    }

    /// 1-based profile number.
    pub fn number(self) -> u8 {
        match self {
            Profile::Profile1 => 1,
            Profile::Profile2 => 2,
            Profile::Profile3 => 3,
            Profile::Profile4 => 4,
            Profile::Profile5 => 5,
        }
    }
}

impl TryFrom<u8> for Profile {
    type Error = Error;

    fn try_from(n: u8) -> Result<Self> {
        Profile::ALL
            .iter()
            .copied()
            .find(|p| p.number() == n)
            .ok_or_else(|| Error::InvalidSensorConfig(format!("no profile {n}")))
    }
}

impl FromStr for Profile {
    type Err = Error;

    /// Accepts `3`, `p3` or `profile3` (case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let digits = lower
            .strip_prefix("profile")
            .or_else(|| lower.strip_prefix('p'))
            .unwrap_or(&lower)
            .trim_start_matches('_');
        let n: u8 = digits
            .parse()
            .map_err(|_| Error::InvalidSensorConfig(format!("unknown profile '{s}'")))?;
        Profile::try_from(n)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "profile {}", self.number())
    }
}

/// Pulse repetition frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prf {
    Prf19_5MHz,
    Prf15_6MHz,
    Prf13_0MHz,
    Prf8_7MHz,
    Prf6_5MHz,
    Prf5_2MHz,
}

impl Prf {
    pub const ALL: [Prf; 6] = [
        Prf::Prf19_5MHz,
        Prf::Prf15_6MHz,
        Prf::Prf13_0MHz,
        Prf::Prf8_7MHz,
        Prf::Prf6_5MHz,
        Prf::Prf5_2MHz,
    ];

    pub fn frequency_hz(self) -> f64 {
        match self {
            Prf::Prf19_5MHz => 19.5e6,
            Prf::Prf15_6MHz => 15.6e6,
            Prf::Prf13_0MHz => 13.0e6,
            Prf::Prf8_7MHz => 8.7e6,
            Prf::Prf6_5MHz => 6.5e6,
            Prf::Prf5_2MHz => 5.2e6,
        }
    }
}

pub const MAX_HWAAS: u32 = 511;
pub const MAX_RECEIVER_GAIN: u32 = 23;
pub const MAX_SUBSWEEPS: usize = 4;
pub const MAX_NUM_POINTS: u32 = 4095;
const COARSE_STEP: u32 = 24;

/// One contiguous range of sweep points measured with a single setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsweepConfig {
    /// First point, in base steps from the sensor. May be negative.
    pub start_point: i32,
    pub num_points: u32,
    pub step_length: u32,
    pub profile: Profile,
    /// Hardware accelerated average samples.
    pub hwaas: u32,
    pub receiver_gain: u32,
    pub phase_enhancement: bool,
    pub enable_loopback: bool,
    pub prf: Prf,
}

impl Default for SubsweepConfig {
    fn default() -> Self {
        Self {
            start_point: 80,
            num_points: 160,
            step_length: 1,
            profile: Profile::Profile3,
            hwaas: 8,
            receiver_gain: 16,
            phase_enhancement: false,
            enable_loopback: false,
            prf: Prf::Prf15_6MHz,
        }
    }
}

impl SubsweepConfig {
    /// Point right after the last one measured by this subsweep.
    pub fn end_point(&self) -> i64 {
        i64::from(self.start_point) + i64::from(self.num_points) * i64::from(self.step_length)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_points == 0 || self.num_points > MAX_NUM_POINTS {
            return Err(Error::InvalidSensorConfig(format!(
                "num_points {} outside 1..={MAX_NUM_POINTS}",
                self.num_points
            )));
        }
        if !is_valid_step_length(self.step_length) {
            return Err(Error::InvalidSensorConfig(format!(
                "step_length {} must divide {COARSE_STEP} or be a multiple of it",
                self.step_length
            )));
        }
        if self.hwaas == 0 || self.hwaas > MAX_HWAAS {
            return Err(Error::InvalidSensorConfig(format!(
                "hwaas {} outside 1..={MAX_HWAAS}",
                self.hwaas
            )));
        }
        if self.receiver_gain > MAX_RECEIVER_GAIN {
            return Err(Error::InvalidSensorConfig(format!(
                "receiver_gain {} outside 0..={MAX_RECEIVER_GAIN}",
                self.receiver_gain
            )));
        }
        if self.prf == Prf::Prf19_5MHz
            && !matches!(self.profile, Profile::Profile1 | Profile::Profile2)
        {
            return Err(Error::InvalidSensorConfig(format!(
                "19.5 MHz PRF is not supported with {}",
                self.profile
            )));
        }
        Ok(())
    }
}

/// Step lengths the sensor accepts: divisors of 24 and multiples of 24.
pub fn is_valid_step_length(step_length: u32) -> bool {
    step_length != 0 && (COARSE_STEP % step_length == 0 || step_length % COARSE_STEP == 0)
}

/// Configuration of one sensor: up to four subsweeps, repeated
/// `sweeps_per_frame` times per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub subsweeps: Vec<SubsweepConfig>,
    pub sweeps_per_frame: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            subsweeps: vec![SubsweepConfig::default()],
            sweeps_per_frame: 1,
        }
    }
}

impl SensorConfig {
    pub fn num_subsweeps(&self) -> usize {
        self.subsweeps.len()
    }

    /// Number of complex points in one sweep (all subsweeps).
    pub fn sweep_data_length(&self) -> usize {
        self.subsweeps.iter().map(|s| s.num_points as usize).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.subsweeps.is_empty() || self.subsweeps.len() > MAX_SUBSWEEPS {
            return Err(Error::InvalidSensorConfig(format!(
                "{} subsweeps, expected 1..={MAX_SUBSWEEPS}",
                self.subsweeps.len()
            )));
        }
        if self.sweeps_per_frame == 0 {
            return Err(Error::InvalidSensorConfig("sweeps_per_frame must be > 0".into()));
        }
        self.subsweeps.iter().try_for_each(SubsweepConfig::validate)
    }
}

pub type SensorId = u32;

/// Sensors measured simultaneously.
pub type SensorGroup = BTreeMap<SensorId, SensorConfig>;

/// What a client is asked to run: groups measured one after another, each
/// with one or more sensors.
///
/// A session with several groups, or several sensors in a group, is
/// *extended*: its metadata and results keep the group/sensor structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSessionConfig", into = "RawSessionConfig")]
pub struct SessionConfig {
    groups: Vec<SensorGroup>,
    extended: bool,
    update_rate: Option<f64>,
}

#[derive(Serialize, Deserialize)]
struct RawSessionConfig {
    groups: Vec<SensorGroup>,
    extended: bool,
    #[serde(default)]
    update_rate: Option<f64>,
}

impl TryFrom<RawSessionConfig> for SessionConfig {
    type Error = Error;

    fn try_from(raw: RawSessionConfig) -> Result<Self> {
        SessionConfig::from_groups(raw.groups, Some(raw.extended))?.with_update_rate(raw.update_rate)
    }
}

impl From<SessionConfig> for RawSessionConfig {
    fn from(s: SessionConfig) -> Self {
        Self {
            groups: s.groups,
            extended: s.extended,
            update_rate: s.update_rate,
        }
    }
}

impl SessionConfig {
    /// Default sensor id used for single-config sessions.
    pub const DEFAULT_SENSOR_ID: SensorId = 1;

    /// Session with a single sensor (id 1) in a single group. Not extended.
    pub fn new(sensor_config: SensorConfig) -> Self {
        Self {
            groups: vec![SensorGroup::from([(Self::DEFAULT_SENSOR_ID, sensor_config)])],
            extended: false,
            update_rate: None,
        }
    }

    /// Session from a single group. See [`SessionConfig::from_groups`].
    pub fn from_group(group: SensorGroup, extended: Option<bool>) -> Result<Self> {
        Self::from_groups(vec![group], extended)
    }

    /// Session from explicit groups.
    ///
    /// `extended = None` derives the flag from the structure. `Some(false)`
    /// is rejected when the structure needs the extended layout.
    pub fn from_groups(groups: Vec<SensorGroup>, extended: Option<bool>) -> Result<Self> {
        if groups.is_empty() {
            return Err(Error::InvalidSessionConfig("no groups".into()));
        }
        if groups.iter().any(BTreeMap::is_empty) {
            return Err(Error::InvalidSessionConfig("empty group".into()));
        }
        if groups.iter().flat_map(|g| g.keys()).any(|&id| id == 0) {
            return Err(Error::InvalidSessionConfig("sensor ids start at 1".into()));
        }

        let structurally_extended = groups.len() > 1 || groups.iter().any(|g| g.len() > 1);
        let extended = match extended {
            None => structurally_extended,
            Some(false) if structurally_extended => {
                return Err(Error::InvalidSessionConfig(
                    "multiple groups or sensors require an extended session".into(),
                ))
            }
            Some(flag) => flag,
        };

        Ok(Self {
            groups,
            extended,
            update_rate: None,
        })
    }

    pub fn with_update_rate(mut self, update_rate: Option<f64>) -> Result<Self> {
        self.set_update_rate(update_rate)?;
        Ok(self)
    }

    /// Set or clear the frame rate limit. Must be positive when set.
    pub fn set_update_rate(&mut self, update_rate: Option<f64>) -> Result<()> {
        if let Some(rate) = update_rate {
            if !(rate > 0.0) {
                return Err(Error::InvalidSessionConfig(format!(
                    "update rate must be positive, got {rate}"
                )));
            }
        }
        self.update_rate = update_rate;
        Ok(())
    }

    pub fn groups(&self) -> &[SensorGroup] {
        &self.groups
    }

    pub fn extended(&self) -> bool {
        self.extended
    }

    pub fn update_rate(&self) -> Option<f64> {
        self.update_rate
    }

    pub fn sensor_config(&self, group_index: usize, sensor_id: SensorId) -> Option<&SensorConfig> {
        self.groups.get(group_index)?.get(&sensor_id)
    }

    pub fn validate(&self) -> Result<()> {
        self.groups
            .iter()
            .flat_map(|g| g.values())
            .try_for_each(SensorConfig::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parsing() {
        assert_eq!("3".parse::<Profile>().unwrap(), Profile::Profile3);
        assert_eq!("P5".parse::<Profile>().unwrap(), Profile::Profile5);
        assert_eq!("profile_1".parse::<Profile>().unwrap(), Profile::Profile1);
        assert!("6".parse::<Profile>().is_err());
        assert!("fast".parse::<Profile>().is_err());
    }

    #[test]
    fn step_lengths() {
        for s in [1, 2, 3, 4, 6, 8, 12, 24, 48, 72] {
            assert!(is_valid_step_length(s), "{s}");
        }
        for s in [0, 5, 7, 25, 30] {
            assert!(!is_valid_step_length(s), "{s}");
        }
    }

    #[test]
    fn subsweep_validation() {
        assert!(SubsweepConfig::default().validate().is_ok());

        let bad = SubsweepConfig {
            prf: Prf::Prf19_5MHz,
            profile: Profile::Profile3,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = SubsweepConfig {
            hwaas: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = SubsweepConfig {
            num_points: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = SubsweepConfig {
            num_points: MAX_NUM_POINTS + 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn end_point_accounts_for_step_length() {
        let s = SubsweepConfig {
            start_point: -12,
            num_points: 10,
            step_length: 3,
            ..Default::default()
        };
        assert_eq!(s.end_point(), 18);
    }

    #[test]
    fn end_point_does_not_overflow() {
        let s = SubsweepConfig {
            start_point: i32::MAX,
            num_points: u32::MAX,
            step_length: 48,
            ..Default::default()
        };
        assert_eq!(
            s.end_point(),
            i64::from(i32::MAX) + i64::from(u32::MAX) * 48
        );
        assert!(s.validate().is_err());
    }
}
