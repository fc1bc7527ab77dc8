use radar_distance::sensor::{SensorConfig, SensorGroup, SessionConfig};
use radar_distance::Error;

fn group(ids: &[u32]) -> SensorGroup {
    ids.iter().map(|&id| (id, SensorConfig::default())).collect()
}

#[test]
fn extended() {
    assert!(!SessionConfig::new(SensorConfig::default()).extended());
    assert!(!SessionConfig::from_group(group(&[1]), None).unwrap().extended());
    assert!(!SessionConfig::from_groups(vec![group(&[1])], None).unwrap().extended());
    assert!(!SessionConfig::from_group(group(&[1]), Some(false)).unwrap().extended());
    assert!(SessionConfig::from_group(group(&[1]), Some(true)).unwrap().extended());

    let extended_group = group(&[2, 3]);
    assert!(SessionConfig::from_group(extended_group.clone(), None).unwrap().extended());
    assert!(SessionConfig::from_groups(vec![extended_group.clone()], None).unwrap().extended());
    assert!(SessionConfig::from_group(extended_group.clone(), Some(true)).unwrap().extended());
    assert!(matches!(
        SessionConfig::from_group(extended_group, Some(false)),
        Err(Error::InvalidSessionConfig(_))
    ));

    assert!(SessionConfig::from_groups(vec![group(&[1]), group(&[1])], None).unwrap().extended());
}

#[test]
fn update_rate() {
    let mut session_config = SessionConfig::new(SensorConfig::default());
    assert_eq!(session_config.update_rate(), None);

    session_config.set_update_rate(Some(1.0)).unwrap();
    assert_eq!(session_config.update_rate(), Some(1.0));

    session_config.set_update_rate(None).unwrap();
    assert_eq!(session_config.update_rate(), None);

    assert!(session_config.set_update_rate(Some(-1.0)).is_err());
    assert!(session_config.set_update_rate(Some(0.0)).is_err());

    let session_config = SessionConfig::new(SensorConfig::default()).with_update_rate(Some(2.0)).unwrap();
    assert_eq!(session_config.update_rate(), Some(2.0));

    assert!(SessionConfig::new(SensorConfig::default()).with_update_rate(Some(-1.0)).is_err());
}

#[test]
fn input_checking() {
    assert!(SessionConfig::from_group(SensorGroup::new(), None).is_err());
    assert!(SessionConfig::from_groups(vec![], None).is_err());
    assert!(SessionConfig::from_groups(vec![SensorGroup::new()], None).is_err());
    assert!(SessionConfig::from_groups(vec![group(&[1]), SensorGroup::new()], None).is_err());
    assert!(SessionConfig::from_group(group(&[0]), None).is_err());
}

#[test]
fn json_keeps_layout() {
    let session_config = SessionConfig::from_groups(vec![group(&[1]), group(&[2, 3])], None)
        .unwrap()
        .with_update_rate(Some(10.0))
        .unwrap();
    let json = serde_json::to_string(&session_config).unwrap();
    let back: SessionConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, session_config);

    let forced_plain = json.replace("\"extended\":true", "\"extended\":false");
    assert!(serde_json::from_str::<SessionConfig>(&forced_plain).is_err());
}

#[test]
fn sensor_validation_runs_for_every_sensor() {
    let mut bad = SensorConfig::default();
    bad.subsweeps[0].hwaas = 0;
    let session_config = SessionConfig::from_groups(
        vec![group(&[1]), [(2, bad)].into_iter().collect()],
        None,
    )
    .unwrap();
    assert!(matches!(session_config.validate(), Err(Error::InvalidSensorConfig(_))));
}
