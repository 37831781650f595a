use serde_json::json;
use tempfile::tempdir;

use snapline::config::{AcquisitionConfig, ChannelSpec};
use snapline::core::ValueKind;

fn reference_config() -> AcquisitionConfig {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/cu_inj.json");
    AcquisitionConfig::load(path).unwrap()
}

#[test]
fn test_reference_config_loads() {
    let config = reference_config();
    assert_eq!(config.channels.len(), 19);

    let frame = config.frame.as_ref().unwrap();
    assert_eq!(frame.array, "CAMR:IN20:186:IMAGE");
    assert_eq!(config.channel(&frame.array).unwrap().kind, Some(ValueKind::Waveform));
    assert_eq!(config.channel("BPMS:IN20:221:TMIT").unwrap().input_name(), "total_charge");
    assert!(config.static_fields.contains_key("impact_settings"));
    assert_eq!(config.queue_capacity, 256);
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("acquisition.json");

    let mut config = AcquisitionConfig::with_channels(["A", "B"]);
    config.channels.push(ChannelSpec::new("C").with_input("c_input").with_kind(ValueKind::Scalar));
    config.scale_factors.insert("c_input".to_string(), 1e-3);
    config.isolation.median_radius = 3;

    config.save(&path).unwrap();
    let loaded = AcquisitionConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_defaults_applied() {
    let config = AcquisitionConfig::from_json(json!({
        "channels": [{"name": "A"}]
    }))
    .unwrap();

    assert_eq!(config.isolation.clip_fraction, 0.08);
    assert_eq!(config.isolation.median_radius, 2);
    assert_eq!(config.isolation.low_marker, 0.1);
    assert_eq!(config.isolation.high_marker, 0.2);
    assert_eq!(config.queue_capacity, 256);
    assert!(config.frame.is_none());
}

#[test]
fn test_invalid_configs_rejected() {
    // untracked frame field
    assert!(AcquisitionConfig::from_json(json!({
        "channels": [{"name": "IMG"}],
        "frame": {"array": "IMG", "resolution": "RES", "resolution_units": "EGU"}
    }))
    .is_err());

    // duplicate channel
    assert!(AcquisitionConfig::from_json(json!({
        "channels": [{"name": "A"}, {"name": "A"}]
    }))
    .is_err());

    // marker levels out of order
    assert!(AcquisitionConfig::from_json(json!({
        "channels": [{"name": "A"}],
        "isolation": {"low_marker": 0.5, "high_marker": 0.2}
    }))
    .is_err());

    let missing = std::path::Path::new("/nonexistent/acquisition.json");
    assert!(AcquisitionConfig::load(missing).is_err());
}
