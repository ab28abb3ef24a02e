use std::env;
use std::sync::{Mutex, OnceLock};

use claimflow_cli::commands::{config, doctor, migrate, seed};
use serde_json::Value;

const MEMORY_DB: &[(&str, &str)] =
    &[("CLAIMFLOW_DATABASE_URL", "sqlite::memory:"), ("CLAIMFLOW_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(MEMORY_DB, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("CLAIMFLOW_DATABASE_URL", "postgres://localhost/claims")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_reports_demo_directory_summary() {
    with_env(MEMORY_DB, || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["employees_saved"], 7);
        assert_eq!(payload["data"]["workflows_created"].as_array().map(Vec::len), Some(2));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("claims.db").display());

    with_env(&[("CLAIMFLOW_DATABASE_URL", url.as_str())], || {
        let first = parse_payload(&seed::run().output);
        assert_eq!(first["status"], "ok");
        assert_eq!(first["data"]["workflows_created"].as_array().map(Vec::len), Some(2));

        let second = parse_payload(&seed::run().output);
        assert_eq!(second["status"], "ok");
        assert_eq!(second["data"]["workflows_created"].as_array().map(Vec::len), Some(0));
        assert_eq!(second["data"]["workflows_existing"].as_array().map(Vec::len), Some(2));
    });
}

#[test]
fn doctor_passes_after_migrate() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("claims.db").display());

    with_env(&[("CLAIMFLOW_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected passing doctor report");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn doctor_fails_when_config_invalid() {
    with_env(&[("CLAIMFLOW_SERVER_PORT", "not-a-port")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn config_attributes_env_sources() {
    with_env(&[("CLAIMFLOW_SERVER_PORT", "9191")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let entries = payload["data"].as_array().cloned().unwrap_or_default();
        let port = entries
            .iter()
            .find(|entry| entry["key"] == "server.port")
            .expect("server.port entry");
        assert_eq!(port["value"], "9191");
        assert_eq!(port["source"], "env (CLAIMFLOW_SERVER_PORT)");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CLAIMFLOW_DATABASE_URL",
        "CLAIMFLOW_DATABASE_MAX_CONNECTIONS",
        "CLAIMFLOW_DATABASE_TIMEOUT_SECS",
        "CLAIMFLOW_SERVER_BIND_ADDRESS",
        "CLAIMFLOW_SERVER_PORT",
        "CLAIMFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CLAIMFLOW_LOGGING_LEVEL",
        "CLAIMFLOW_LOGGING_FORMAT",
        "CLAIMFLOW_LOG_LEVEL",
        "CLAIMFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
