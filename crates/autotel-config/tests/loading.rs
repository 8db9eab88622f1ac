use std::io::Write;
use std::time::Duration;

use autotel_config::{load, ApiAuth, LogFormat};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn load_full_config() {
    let file = write_config(
        r#"
license_key: abc123
service:
  name: payments-host
  environment: staging
  tags:
    team: sre
auto_config:
  enabled: true
  scan_interval: 120
api:
  listen_addr: "127.0.0.1:9999"
  auth:
    mode: bearer
    token: sekrit
logging:
  level: debug
  format: json
data_dir: /tmp/autotel-test
collector:
  health_port: 14000
remote:
  enabled: true
  endpoint: "https://config.example.test"
"#,
    );

    let config = load(file.path()).unwrap();
    assert_eq!(config.license_key, "abc123");
    assert_eq!(config.service.name, "payments-host");
    assert_eq!(config.service.tags.get("team").unwrap(), "sre");
    assert_eq!(config.auto_config.scan_interval, Duration::from_secs(120));
    assert_eq!(config.api.listen_addr, "127.0.0.1:9999");
    assert_eq!(config.api.auth, ApiAuth::Bearer { token: "sekrit".into() });
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.collector.health_port, 14000);
    assert!(config.remote.enabled);
}

#[test]
fn minimal_config_uses_defaults() {
    let file = write_config("license_key: abc\n");
    let config = load(file.path()).unwrap();
    assert_eq!(config.api.listen_addr, "127.0.0.1:4320");
    assert_eq!(config.api.auth, ApiAuth::Disabled);
    assert!(config.auto_config.enabled);
    assert_eq!(config.auto_config.scan_interval, Duration::from_secs(300));
    assert_eq!(config.collector.max_restarts, 10);
}

#[test]
fn unknown_top_level_key_is_rejected() {
    let file = write_config("license_key: abc\nnot_a_real_section: {}\n");
    assert!(load(file.path()).is_err());
}

#[test]
fn bearer_auth_without_token_is_rejected() {
    let file = write_config("api:\n  auth:\n    mode: bearer\n");
    assert!(load(file.path()).is_err());
}

#[test]
fn zero_scan_interval_is_rejected() {
    let file = write_config("auto_config:\n  scan_interval: 0\n");
    assert!(load(file.path()).is_err());
}

#[test]
fn missing_file_returns_io_error() {
    assert!(load(std::path::Path::new("/nonexistent/autotel.yaml")).is_err());
}
