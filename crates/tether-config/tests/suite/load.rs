use std::io::Write;

use pretty_assertions::assert_eq;
use tether_config::{ConfigError, DebuggerConfig, LoggingConfig, TetherConfig};

#[test]
fn empty_file_uses_defaults() {
    let config = TetherConfig::load_from_str("").unwrap();
    assert_eq!(config, TetherConfig::default());
    assert!(config.debugger.hide_system_threads);
    assert!(!config.debugger.break_on_uncaught);
    assert_eq!(config.debugger.wait_timeout().as_millis(), 5_000);
    assert_eq!(config.logging.level, "info");
    assert!(config.logging.stderr);
}

#[test]
fn loads_both_tables_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[logging]
level = "tether.debug=trace"
json = true
stderr = false

[debugger]
hide_system_threads = false
break_on_uncaught = true
system_threads = ["Watchdog", "Timer"]
wait_timeout_ms = 250
"#
    )
    .unwrap();

    let config = TetherConfig::load_from_path(file.path()).unwrap();
    assert_eq!(
        config.logging,
        LoggingConfig {
            level: "tether.debug=trace".to_string(),
            json: true,
            stderr: false,
            file: None,
        }
    );
    assert_eq!(
        config.debugger,
        DebuggerConfig {
            hide_system_threads: false,
            break_on_uncaught: true,
            system_threads: vec!["Watchdog".to_string(), "Timer".to_string()],
            wait_timeout_ms: 250,
        }
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let err = TetherConfig::load_from_str("[debugger]\nhide_sytem_threads = true\n").unwrap_err();
    match err {
        ConfigError::Toml(message) => assert!(message.contains("hide_sytem_threads"), "{message}"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn missing_file_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = TetherConfig::load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn explicit_path_wins_over_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[debugger]\nwait_timeout_ms = 10").unwrap();
    let config = TetherConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.debugger.wait_timeout_ms, 10);
}
