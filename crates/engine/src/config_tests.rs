// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
fn defaults_cover_a_rails_project() {
    let config = EngineConfig::new("/project");
    assert_eq!(config.harden_sidecar, ".harden");
    assert_eq!(config.enhance_sidecar, ".enhance");
    assert_eq!(config.discovery_glob, "app/**/*.rb");
    assert!(config
        .enhance_allowlist
        .contains(&PathBuf::from("app/controllers")));
    assert!(config.api_key.is_none());
}

#[test]
fn load_without_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::load(dir.path()).unwrap();
    assert_eq!(config.agent_bin, "claude");
}

#[test]
#[serial]
fn load_reads_temper_toml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("temper.toml"),
        r#"
agent_bin = "claudeless"
discovery_glob = "app/services/**/*.rb"
discovery_excludes = ["base_service"]
enhance_allowlist = ["app/services", "test"]

[[ci_commands]]
name = "rubocop"
command = ["bundle", "exec", "rubocop", "--no-color"]
"#,
    )
    .unwrap();

    let config = EngineConfig::load(dir.path()).unwrap();
    assert_eq!(config.agent_bin, "claudeless");
    assert_eq!(config.discovery_glob, "app/services/**/*.rb");
    assert_eq!(config.ci_commands.len(), 1);
    assert_eq!(config.ci_commands[0].name, "rubocop");
    assert_eq!(config.enhance_allowlist.len(), 2);
}

#[test]
#[serial]
fn malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("temper.toml"), "agent_bin = [not toml").unwrap();
    assert!(EngineConfig::load(dir.path()).is_err());
}

#[test]
#[serial]
fn env_overrides_win() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("TEMPER_AGENT_BIN", "claude-canary");
    std::env::set_var("TEMPER_API_KEY", "sk-test");
    let config = EngineConfig::load(dir.path()).unwrap();
    std::env::remove_var("TEMPER_AGENT_BIN");
    std::env::remove_var("TEMPER_API_KEY");
    assert_eq!(config.agent_bin, "claude-canary");
    assert_eq!(config.api_key.as_deref(), Some("sk-test"));
}

#[test]
fn rails_test_path_convention() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("app/models")).unwrap();
    std::fs::create_dir_all(dir.path().join("test/models")).unwrap();
    std::fs::write(dir.path().join("test/models/user_test.rb"), "").unwrap();

    let config = EngineConfig::new(dir.path());
    let resolved = config.resolve_test_path(&dir.path().join("app/models/user.rb"));
    assert_eq!(resolved, Some(dir.path().join("test/models/user_test.rb")));

    // No matching test file: fall back to the full suite.
    let missing = config.resolve_test_path(&dir.path().join("app/models/account.rb"));
    assert_eq!(missing, None);
}

#[test]
fn custom_resolver_is_preferred() {
    let mut config = EngineConfig::new("/project");
    config.test_path_resolver = Some(Arc::new(|_source: &Path| {
        Some(PathBuf::from("/project/spec/custom_spec.rb"))
    }));
    let resolved = config.resolve_test_path(Path::new("/project/app/models/user.rb"));
    assert_eq!(resolved, Some(PathBuf::from("/project/spec/custom_spec.rb")));
}
