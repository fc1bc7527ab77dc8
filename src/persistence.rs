//! Detector persistence: save and load detector configs, calibration
//! contexts and the algo data stored next to a recording, as JSON files.
//!
//! Detector configs may also be written in YAML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algo::detector::{DetectorConfig, DetectorContext};
use crate::error::Result;
use crate::sensor::SensorId;

/// Everything needed to rerun a recorded detector session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlgoData {
    pub sensor_id: SensorId,
    pub detector_config: DetectorConfig,
    pub context: DetectorContext,
}

// ---------- Algo data ----------

/// Serialize algo data as pretty JSON.
pub fn algo_data_to_json(data: &AlgoData) -> Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Deserialize algo data from JSON. Unknown context fields are rejected.
pub fn algo_data_from_json(json: &str) -> Result<AlgoData> {
    Ok(serde_json::from_str(json)?)
}

pub fn save_algo_data_to_path(data: &AlgoData, path: &Path) -> Result<()> {
    let txt = algo_data_to_json(data)?;
    std::fs::write(path, txt)?;
    Ok(())
}

pub fn load_algo_data_from_path(path: &Path) -> Result<AlgoData> {
    let txt = std::fs::read_to_string(path)?;
    algo_data_from_json(&txt)
}

// ---------- Context ----------

pub fn save_context_to_path(context: &DetectorContext, path: &Path) -> Result<()> {
    let txt = serde_json::to_string_pretty(context)?;
    std::fs::write(path, txt)?;
    Ok(())
}

pub fn load_context_from_path(path: &Path) -> Result<DetectorContext> {
    let txt = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&txt)?)
}

// ---------- Detector config ----------

/// Load a detector config; `.json` files are read as JSON, anything else
/// as YAML. Missing fields take their defaults.
pub fn load_detector_config_from_path(path: &Path) -> Result<DetectorConfig> {
    let txt = std::fs::read_to_string(path)?;
    let config: DetectorConfig = if is_json(path) {
        serde_json::from_str(&txt)?
    } else {
        serde_yaml::from_str(&txt)?
    };
    config.validate()?;
    Ok(config)
}

pub fn save_detector_config_to_path(config: &DetectorConfig, path: &Path) -> Result<()> {
    let txt = if is_json(path) {
        serde_json::to_string_pretty(config)?
    } else {
        serde_yaml::to_string(config)?
    };
    std::fs::write(path, txt)?;
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}
