//! Config integration tests: YAML config file → ParseOptions → compiler behaviour.

use assert_approx_eq::assert_approx_eq;
use tdl::config::TdlConfig;
use tdl::Compiler;

fn write_config(dir: &tempfile::TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn config_controls_default_tempo() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "default_bpm: 120\n");
    let config = TdlConfig::load_from(&path).unwrap();

    let tl = Compiler::with_options(config.parse_options())
        .compile("bar 2*4/4")
        .unwrap();
    assert_approx_eq!(tl.find_bar_time(1, 0, 0.0).unwrap(), 2000.0);
}

#[test]
fn config_controls_frame_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "smpte_fps: 50\n");
    let config = TdlConfig::load_from(&path).unwrap();
    let compiler = Compiler::with_options(config.parse_options());

    let tl = compiler.compile("00:00:00.25 !out").unwrap();
    assert_approx_eq!(tl.events()[0].time_ms, 500.0);
    assert!(Compiler::new().compile("00:00:00.25 !out").is_err());
}

#[test]
fn config_controls_strictness() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "strict: false\nlog_level: warn\n");
    let config = TdlConfig::load_from(&path).unwrap();

    let tl = Compiler::with_options(config.parse_options())
        .compile("bar 4/4\n#9 !out 1\n0 !out 2")
        .unwrap();
    assert_eq!(tl.events().len(), 1);
}
