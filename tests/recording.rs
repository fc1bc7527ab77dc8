use radar_distance::algo::{Detector, DetectorConfig};
use radar_distance::persistence::load_algo_data_from_path;
use radar_distance::recording::{FileRecorder, ALGO_DATA_FILE_NAME, RESULTS_CSV_FILE_NAME};
use radar_distance::{Reflector, SimulatedClient, SimulatedClientConfig};

#[test]
fn file_recorder_writes_algo_data_and_results() {
    let dir = tempfile::tempdir().unwrap();
    let recording_dir = dir.path().join("session");

    let client = SimulatedClient::new(SimulatedClientConfig {
        reflectors: vec![Reflector::new(0.5, 1000.0)],
        seed: 3,
        ..SimulatedClientConfig::default()
    });
    let mut detector = Detector::new(client, 3, DetectorConfig::default(), None).unwrap();

    let recorder = FileRecorder::new(&recording_dir).unwrap();
    detector.start(Some(Box::new(recorder))).unwrap();

    let algo_data = load_algo_data_from_path(&recording_dir.join(ALGO_DATA_FILE_NAME)).unwrap();
    assert_eq!(algo_data.sensor_id, 3);
    assert_eq!(algo_data.detector_config, DetectorConfig::default());

    let mut peaks = 0;
    for _ in 0..4 {
        peaks += detector.get_next().unwrap().distances.len();
    }
    assert!(!recording_dir.join(RESULTS_CSV_FILE_NAME).exists());
    detector.stop().unwrap();

    let csv = std::fs::read_to_string(recording_dir.join(RESULTS_CSV_FILE_NAME)).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "frame_index,timestamp,rank,distance_m,strength");
    assert_eq!(lines.len(), peaks + 1);
    assert!(lines[1].starts_with("0,"));
    assert!(lines.last().unwrap().starts_with("3,"));
}
