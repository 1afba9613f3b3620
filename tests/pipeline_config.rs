use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use zone_counter::detect::DetectorKind;
use zone_counter::PipelineConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ZONE_COUNTER_CONFIG",
        "ZONE_COUNTER_SOURCE",
        "ZONE_COUNTER_ZONES",
        "ZONE_COUNTER_CSV",
        "ZONE_COUNTER_OSC",
        "ZONE_COUNTER_DETECTOR",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load(None).expect("load config");
    assert_eq!(cfg.source, "stub://camera");
    assert_eq!(cfg.zones_path, PathBuf::from("zones.json"));
    assert_eq!(cfg.csv_path, None);
    assert_eq!(cfg.scale, 1.0);
    assert_eq!(cfg.motion.history, 300);
    assert_eq!(cfg.motion.motion_threshold, 25);
    assert_eq!(cfg.motion.var_threshold, 16.0);
    assert_eq!(cfg.detector.kind, DetectorKind::Hog);
    assert_eq!(cfg.detector.model_path, PathBuf::from("yolov8n.onnx"));
    assert_eq!(cfg.detector.confidence, 0.25);
    assert_eq!(cfg.detector.input_size, 640);
    assert!(!cfg.osc.enabled);
    assert_eq!(cfg.osc.host, "127.0.0.1");
    assert_eq!(cfg.osc.port, 9000);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "source": "stub://lobby?frames=10",
            "scale": 0.5,
            "zones_path": "lobby_zones.json",
            "csv_path": "lobby.csv",
            "motion": {"history": 500, "threshold": 40},
            "detector": {"kind": "yolo", "model": "people.onnx", "confidence": 0.4, "input_size": 320},
            "osc": {"enabled": true, "host": "10.0.0.2", "port": 7000},
            "snapshots": {"dir": "snaps", "every": 5}
        }"#,
    );

    std::env::set_var("ZONE_COUNTER_CONFIG", file.path());
    std::env::set_var("ZONE_COUNTER_CSV", "override.csv");
    std::env::set_var("ZONE_COUNTER_OSC", "192.168.1.20:57120");
    std::env::set_var("ZONE_COUNTER_DETECTOR", "replay");

    let cfg = PipelineConfig::load(None).expect("load config");

    assert_eq!(cfg.source, "stub://lobby?frames=10");
    assert_eq!(cfg.scale, 0.5);
    assert_eq!(cfg.zones_path, PathBuf::from("lobby_zones.json"));
    assert_eq!(cfg.csv_path, Some(PathBuf::from("override.csv")));
    assert_eq!(cfg.motion.history, 500);
    assert_eq!(cfg.motion.motion_threshold, 40);
    assert_eq!(cfg.detector.kind, DetectorKind::Replay);
    assert_eq!(cfg.detector.model_path, PathBuf::from("people.onnx"));
    assert_eq!(cfg.detector.input_size, 320);
    assert!(cfg.osc.enabled);
    assert_eq!(cfg.osc.host, "192.168.1.20");
    assert_eq!(cfg.osc.port, 57120);
    let snapshots = cfg.snapshots.expect("snapshots");
    assert_eq!(snapshots.dir, PathBuf::from("snaps"));
    assert_eq!(snapshots.every, 5);

    clear_env();
}

#[test]
fn explicit_path_wins_over_env_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let from_env = write_config(r#"{"source": "stub://env"}"#);
    let explicit = write_config(r#"{"source": "stub://explicit"}"#);
    std::env::set_var("ZONE_COUNTER_CONFIG", from_env.path());

    let cfg = PipelineConfig::load(Some(explicit.path())).expect("load config");
    assert_eq!(cfg.source, "stub://explicit");

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for json in [
        r#"{"scale": 0}"#,
        r#"{"scale": -1.5}"#,
        r#"{"motion": {"history": 0}}"#,
        r#"{"detector": {"confidence": 1.2}}"#,
        r#"{"osc": {"port": 0}}"#,
        r#"{"detector": {"kind": "ssd"}}"#,
        r#"not json"#,
    ] {
        let file = write_config(json);
        assert!(
            PipelineConfig::load(Some(file.path())).is_err(),
            "accepted {}",
            json
        );
    }

    std::env::set_var("ZONE_COUNTER_OSC", "no-port");
    assert!(PipelineConfig::load(None).is_err());
    clear_env();

    std::env::set_var("ZONE_COUNTER_DETECTOR", "ssd");
    assert!(PipelineConfig::load(None).is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    let err = PipelineConfig::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}
