use super::*;

use std::{collections::HashMap, io::Write};

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings_from(&dir.path().join("absent.toml"), no_env).expect("settings");
    assert_eq!(settings, ClientSettings::default());
    assert_eq!(settings.history_poll_interval(), Duration::from_secs(30));
    assert_eq!(settings.request_timeout(), None);
}

#[test]
fn file_values_override_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(
        file,
        "api_base_url = \"https://api.example\"\nhistory_poll_interval_secs = 5\nrequest_timeout_ms = 1500"
    )
    .expect("write");

    let settings = load_settings_from(file.path(), no_env).expect("settings");
    assert_eq!(settings.api_base_url, "https://api.example");
    assert_eq!(settings.history_poll_interval_secs, 5);
    assert_eq!(settings.request_timeout(), Some(Duration::from_millis(1500)));
}

#[test]
fn env_overrides_file_and_ignores_unparsable_numbers() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "api_base_url = \"https://file.example\"").expect("write");

    let env: HashMap<&str, &str> = HashMap::from([
        ("APP__API_BASE_URL", "https://env.example"),
        ("APP__HISTORY_POLL_SECS", "soon"),
        ("APP__EXPLORER_TX_URL", "https://scan.example/tx/{tx}"),
    ]);
    let settings =
        load_settings_from(file.path(), |key| env.get(key).map(|v| v.to_string())).expect("settings");

    assert_eq!(settings.api_base_url, "https://env.example");
    assert_eq!(settings.history_poll_interval_secs, 30);
    assert_eq!(
        settings.explorer_tx_url.as_deref(),
        Some("https://scan.example/tx/{tx}")
    );
}

#[test]
fn malformed_file_is_reported() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "history_poll_interval_secs = \"often\"").expect("write");
    let err = load_settings_from(file.path(), no_env).expect_err("parse error");
    assert!(err.to_string().contains("failed to parse settings file"));
}

#[test]
fn zero_poll_interval_is_clamped() {
    let settings = ClientSettings {
        history_poll_interval_secs: 0,
        ..ClientSettings::default()
    };
    assert_eq!(settings.history_poll_interval(), Duration::from_secs(1));
}
