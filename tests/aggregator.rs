use proptest::prelude::*;
use radar_distance::algo::aggregator::*;
use radar_distance::algo::processor::{find_peaks, ProcessorConfig};
use radar_distance::client::{Client, Reflector, SimulatedClient, SimulatedClientConfig};
use radar_distance::sensor::{Profile, SensorConfig, SessionConfig, SubsweepConfig};

#[test]
fn merges_close_peaks() {
    let (dists, ampls) = merge_peaks(1.0, &[0.0, 2.0, 4.0, 5.0], &[1.0, 1.0, 1.0, 2.0]);
    assert_eq!(dists.len(), 3);
    assert!((dists[0] - 0.0).abs() < 1e-12);
    assert!((dists[1] - 2.0).abs() < 1e-12);
    assert!((dists[2] - 4.5).abs() < 1e-12);
    assert!((ampls[0] - 1.0).abs() < 1e-12);
    assert!((ampls[1] - 1.0).abs() < 1e-12);
    assert!((ampls[2] - 1.5).abs() < 1e-12);
}

fn two_reflector_session() -> (SessionConfig, SimulatedClient) {
    let subsweep = SubsweepConfig {
        start_point: 60,
        num_points: 120,
        step_length: 4,
        profile: Profile::Profile1,
        hwaas: 16,
        phase_enhancement: true,
        ..SubsweepConfig::default()
    };
    let session = SessionConfig::new(SensorConfig {
        subsweeps: vec![subsweep],
        sweeps_per_frame: 1,
    });
    let client = SimulatedClient::new(SimulatedClientConfig {
        reflectors: vec![Reflector::new(0.4, 500.0), Reflector::new(0.7, 1500.0)],
        ..SimulatedClientConfig::default()
    });
    (session, client)
}

fn run(sorting: PeakSortingMethod) -> AggregatorResult {
    let (session, mut client) = two_reflector_session();
    let metadata = client.setup_session(&session).unwrap();
    let spec = ProcessorSpec {
        processor_config: ProcessorConfig::default(),
        group_index: 0,
        sensor_id: SessionConfig::DEFAULT_SENSOR_ID,
        subsweep_indexes: vec![0],
        processor_context: None,
    };
    let config = AggregatorConfig {
        peak_sorting_method: sorting,
        min_peak_to_peak_dist_m: None,
    };
    let mut aggregator = Aggregator::new(&session, &metadata, config, vec![spec]).unwrap();
    assert!((aggregator.min_peak_to_peak_dist_m() - Profile::Profile1.envelope_fwhm_m()).abs() < 1e-12);

    client.start_session().unwrap();
    let result = aggregator.process(client.get_next().unwrap()).unwrap();
    client.stop_session().unwrap();
    result
}

#[test]
fn strongest_first() {
    let result = run(PeakSortingMethod::Strongest);
    assert!((result.estimated_distances[0] - 0.7).abs() < 0.01);
    assert!(result
        .estimated_amplitudes
        .windows(2)
        .all(|w| w[0] >= w[1]));
    assert_eq!(result.processor_results.len(), 1);
    assert_eq!(result.service_extended_result.len(), 1);
}

#[test]
fn closest_first() {
    let result = run(PeakSortingMethod::Closest);
    assert!(result.estimated_distances.windows(2).all(|w| w[0] <= w[1]));
    assert!(result.estimated_distances.iter().any(|d| (d - 0.4).abs() < 0.01));
    assert!(result.estimated_distances.iter().any(|d| (d - 0.7).abs() < 0.01));
}

#[test]
fn unknown_sensor_rejected() {
    let (session, mut client) = two_reflector_session();
    let metadata = client.setup_session(&session).unwrap();
    let spec = ProcessorSpec {
        processor_config: ProcessorConfig::default(),
        group_index: 0,
        sensor_id: 9,
        subsweep_indexes: vec![0],
        processor_context: None,
    };
    assert!(Aggregator::new(&session, &metadata, AggregatorConfig::default(), vec![spec]).is_err());
}

proptest! {
    #[test]
    fn merged_peaks_are_sorted_and_separated(
        peaks in prop::collection::vec((0.0f64..10.0, 0.0f64..1000.0), 0..40),
        min_dist in 0.0f64..1.0,
    ) {
        let dists: Vec<f64> = peaks.iter().map(|p| p.0).collect();
        let ampls: Vec<f64> = peaks.iter().map(|p| p.1).collect();
        let (merged, merged_ampls) = merge_peaks(min_dist, &dists, &ampls);
        prop_assert_eq!(merged.len(), merged_ampls.len());
        prop_assert!(merged.len() <= dists.len());
        prop_assert_eq!(merged.is_empty(), dists.is_empty());
        for w in merged.windows(2) {
            prop_assert!(w[1] - w[0] > min_dist);
        }
    }

    #[test]
    fn peaks_are_local_maxima_above_threshold(
        values in prop::collection::vec(0.0f64..100.0, 0..64),
        threshold in 0.0f64..100.0,
    ) {
        let thresholds = vec![threshold; values.len()];
        for p in find_peaks(&values, &thresholds) {
            prop_assert!(p >= 1 && p + 1 < values.len());
            prop_assert!(values[p] > threshold);
            prop_assert!(values[p - 1] > threshold);
            prop_assert!(values[p - 1] < values[p]);
            prop_assert!(values[p + 1] <= values[p]);
        }
    }
}
