use std::{env, fs};

use tenant_cache::{ConfigError, WritePolicy, loader::load_config};

#[test]
fn config_file_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("tenant-cache.toml");

    let toml_content = r#"
[cache]
default_ttl_secs = 120
write_policy = "evict"

[cache.namespace_ttl_secs]
"locations" = 3600

[redis]
enabled = false

[invalidation]
channel = "acme:invalidate"

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) File values are read
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.cache.default_ttl_secs, 120);
    assert_eq!(cfg.cache.write_policy, WritePolicy::Evict);
    assert_eq!(cfg.cache.namespace_ttl_secs.get("locations"), Some(&3600));
    assert_eq!(cfg.invalidation.channel, "acme:invalidate");
    assert_eq!(cfg.logging.level, "debug");

    // 2) Env override wins over the file
    unsafe {
        env::set_var("TENANT_CACHE__CACHE__DEFAULT_TTL_SECS", "45");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.cache.default_ttl_secs, 45);
    unsafe {
        env::remove_var("TENANT_CACHE__CACHE__DEFAULT_TTL_SECS");
    }

    // 3) Invalid values are rejected at load time
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[cache]
operation_timeout_ms = 6000
store_timeout_ms = 5000
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(matches!(err, ConfigError::Validation(_)));
}
