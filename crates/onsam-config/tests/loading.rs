use std::io::Write;
use std::path::Path;

use onsam_config::load_config;

fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("onsam.yml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
fn load_minimal_config_applies_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
opennaas:
  server_address: 10.0.0.5
  server_port: 8888
  db_dir: /var/lib/onsam
"#,
    );

    let cfg = load_config(&path).expect("should load without error");
    assert_eq!(cfg.server_address, "10.0.0.5");
    assert_eq!(cfg.server_port, 8888);
    assert_eq!(cfg.controller_base_url(), "http://10.0.0.5:8888/opennaas/");
    assert_eq!(cfg.reservation_timeout, 60);
    assert_eq!(cfg.update_step, 100);
    assert!(!cfg.check_credentials);
}

#[test]
fn load_full_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
opennaas:
  server_address: roadm-ctl.example.net
  server_port: 8888
  user: admin
  password: "123456"
  db_dir: /tmp/onsam
  reservation_timeout: 15
  update_timeout: 10
  update_step: 25
  check_expire_timeout: 30
  check_credentials: true
  request_timeout: 5
  api_address: 0.0.0.0
  api_port: 9000
  api_token: sekrit
"#,
    );

    let cfg = load_config(&path).expect("should load without error");
    assert_eq!(cfg.user, "admin");
    assert_eq!(cfg.reservation_timeout, 15);
    assert_eq!(cfg.update_step, 25);
    assert!(cfg.check_credentials);
    assert_eq!(cfg.api_token, "sekrit");
}

#[test]
fn zero_update_step_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
opennaas:
  server_address: 10.0.0.5
  server_port: 8888
  db_dir: /var/lib/onsam
  update_step: 0
"#,
    );
    assert!(load_config(&path).is_err());
}

#[test]
fn credentials_check_without_token_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
opennaas:
  server_address: 10.0.0.5
  server_port: 8888
  db_dir: /var/lib/onsam
  check_credentials: true
"#,
    );
    assert!(load_config(&path).is_err());
}

#[test]
fn missing_file_returns_error() {
    assert!(load_config(Path::new("/nonexistent/onsam.yml")).is_err());
}
