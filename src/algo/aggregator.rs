//! Runs one processor per subsweep run and combines their peaks.

use serde::{Deserialize, Serialize};

use super::processor::{Processor, ProcessorConfig, ProcessorContext, ProcessorResult};
use crate::error::{Error, Result};
use crate::sensor::{ExtendedMetadata, ExtendedResult, SensorId, SessionConfig};

/// Which processor handles which part of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    pub processor_config: ProcessorConfig,
    pub group_index: usize,
    pub sensor_id: SensorId,
    pub subsweep_indexes: Vec<usize>,
    #[serde(default)]
    pub processor_context: Option<ProcessorContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PeakSortingMethod {
    Closest,
    #[default]
    Strongest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub peak_sorting_method: PeakSortingMethod,
    /// Peaks closer than this are merged. Defaults to the narrowest envelope
    /// width among the processors.
    pub min_peak_to_peak_dist_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorResult {
    pub estimated_distances: Vec<f64>,
    pub estimated_amplitudes: Vec<f64>,
    pub processor_results: Vec<ProcessorResult>,
    pub service_extended_result: ExtendedResult,
}

#[derive(Debug)]
pub struct Aggregator {
    config: AggregatorConfig,
    specs: Vec<ProcessorSpec>,
    processors: Vec<Processor>,
    min_peak_to_peak_dist_m: f64,
}

impl Aggregator {
    pub fn new(
        session_config: &SessionConfig,
        extended_metadata: &ExtendedMetadata,
        config: AggregatorConfig,
        specs: Vec<ProcessorSpec>,
    ) -> Result<Self> {
        let processors = specs
            .iter()
            .map(|spec| {
                let sensor_config = session_config
                    .sensor_config(spec.group_index, spec.sensor_id)
                    .ok_or_else(|| {
                        Error::InvalidProcessorConfig(format!(
                            "no sensor {} in group {}",
                            spec.sensor_id, spec.group_index
                        ))
                    })?;
                let metadata = extended_metadata
                    .get(spec.group_index)
                    .and_then(|group| group.get(&spec.sensor_id))
                    .ok_or_else(|| {
                        Error::ResultLayout(format!(
                            "no metadata for sensor {} in group {}",
                            spec.sensor_id, spec.group_index
                        ))
                    })?;
                Processor::new(
                    sensor_config,
                    metadata,
                    spec.processor_config.clone(),
                    Some(spec.subsweep_indexes.clone()),
                    spec.processor_context.clone(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let min_peak_to_peak_dist_m = match config.min_peak_to_peak_dist_m {
            Some(d) => d,
            None => processors
                .iter()
                .map(|p| p.profile().envelope_fwhm_m())
                .fold(f64::INFINITY, f64::min),
        };

        Ok(Self {
            config,
            specs,
            processors,
            min_peak_to_peak_dist_m,
        })
    }

    pub fn process(&mut self, extended_result: ExtendedResult) -> Result<AggregatorResult> {
        let mut processor_results = Vec::with_capacity(self.processors.len());
        let mut dists = Vec::new();
        let mut ampls = Vec::new();

        for (spec, processor) in self.specs.iter().zip(self.processors.iter_mut()) {
            let result = extended_result
                .get(spec.group_index)
                .and_then(|group| group.get(&spec.sensor_id))
                .ok_or_else(|| {
                    Error::ResultLayout(format!(
                        "no result for sensor {} in group {}",
                        spec.sensor_id, spec.group_index
                    ))
                })?;
            let processor_result = processor.process(result)?;
            dists.extend_from_slice(&processor_result.estimated_distances);
            ampls.extend_from_slice(&processor_result.estimated_amplitudes);
            processor_results.push(processor_result);
        }

        let (mut estimated_distances, mut estimated_amplitudes) =
            merge_peaks(self.min_peak_to_peak_dist_m, &dists, &ampls);
        if self.config.peak_sorting_method == PeakSortingMethod::Strongest {
            let mut order: Vec<usize> = (0..estimated_distances.len()).collect();
            order.sort_by(|&a, &b| estimated_amplitudes[b].total_cmp(&estimated_amplitudes[a]));
            estimated_distances = order.iter().map(|&i| estimated_distances[i]).collect();
            estimated_amplitudes = order.iter().map(|&i| estimated_amplitudes[i]).collect();
        }

        Ok(AggregatorResult {
            estimated_distances,
            estimated_amplitudes,
            processor_results,
            service_extended_result: extended_result,
        })
    }

    pub fn specs(&self) -> &[ProcessorSpec] {
        &self.specs
    }

    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    pub fn min_peak_to_peak_dist_m(&self) -> f64 {
        self.min_peak_to_peak_dist_m
    }
}

/// Merge peaks lying within `min_peak_to_peak_dist` of the previous peak.
///
/// Peaks are sorted by distance first; every cluster is replaced by its mean
/// distance and mean amplitude. The output is sorted by distance.
pub fn merge_peaks(min_peak_to_peak_dist: f64, dists: &[f64], ampls: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut peaks: Vec<(f64, f64)> = dists.iter().copied().zip(ampls.iter().copied()).collect();
    peaks.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged_dists = Vec::new();
    let mut merged_ampls = Vec::new();
    let mut cluster: Vec<(f64, f64)> = Vec::new();
    let flush = |cluster: &mut Vec<(f64, f64)>, d: &mut Vec<f64>, a: &mut Vec<f64>| {
        if cluster.is_empty() {
            return;
        }
        let n = cluster.len() as f64;
        d.push(cluster.iter().map(|p| p.0).sum::<f64>() / n);
        a.push(cluster.iter().map(|p| p.1).sum::<f64>() / n);
        cluster.clear();
    };

    for peak in peaks {
        if let Some(last) = cluster.last() {
            if peak.0 - last.0 > min_peak_to_peak_dist {
                flush(&mut cluster, &mut merged_dists, &mut merged_ampls);
            }
        }
        cluster.push(peak);
    }
    flush(&mut cluster, &mut merged_dists, &mut merged_ampls);

    (merged_dists, merged_ampls)
}
