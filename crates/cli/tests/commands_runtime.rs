use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use assetflow_cli::commands::requests::{ListArgs, RequestCommand};
use assetflow_cli::commands::{config, doctor, migrate, requests, seed};
use assetflow_core::{ItemFulfillment, RequestStatus};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_file_store() {
    with_store(|_| {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_unsupported_url() {
    with_env(&[("ASSETFLOW_STORE_URL", "postgres://elsewhere/db")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_store(|_| {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "first seed failed: {}", first.output);
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "second seed failed: {}", second.output);

        assert_eq!(parse_payload(&first.output)["data"], parse_payload(&second.output)["data"]);
        let listed = requests::run("cli-test", RequestCommand::List(list_args()));
        assert_eq!(parse_payload(&listed.output)["data"].as_array().map(Vec::len), Some(5));
    });
}

#[test]
fn requests_flow_through_approval_and_fulfilment() {
    with_store(|_| {
        assert_eq!(seed::run().exit_code, 0);

        let pending = requests::run(
            "cli-test",
            RequestCommand::List(ListArgs { status: vec![RequestStatus::Pending], ..list_args() }),
        );
        let payload = parse_payload(&pending.output);
        assert_eq!(payload["data"][0]["id"], "seed-canonical-pending");

        let approved =
            requests::run("admin-root", RequestCommand::Approve { id: "seed-canonical-pending".into() });
        assert_eq!(parse_payload(&approved.output)["data"]["status"], "approved");

        let fulfilled = requests::run(
            "fac-dee",
            RequestCommand::Fulfill {
                id: "seed-canonical-pending".into(),
                items: vec![item("0", 2), item("1", 1)],
                notes: Some("first delivery".into()),
                scope: vec!["loc-hq".into()],
            },
        );
        assert_eq!(fulfilled.exit_code, 0, "fulfil failed: {}", fulfilled.output);
        let request = &parse_payload(&fulfilled.output)["data"];
        assert_eq!(request["status"], "partially_fulfilled");
        assert_eq!(request["items"][0]["itemStatus"], "fulfilled");
        assert_eq!(request["items"][1]["itemStatus"], "partial");
    });
}

#[test]
fn requests_report_lifecycle_error_classes() {
    with_store(|_| {
        assert_eq!(seed::run().exit_code, 0);

        let missing = requests::run("admin-root", RequestCommand::Approve { id: "nope".into() });
        assert_eq!(missing.exit_code, 7);
        assert_eq!(parse_payload(&missing.output)["error_class"], "not_found");

        let blank = requests::run(
            "admin-root",
            RequestCommand::Reject { id: "seed-canonical-pending".into(), reason: "  ".into() },
        );
        assert_eq!(blank.exit_code, 8);
        assert_eq!(parse_payload(&blank.output)["error_class"], "validation");

        let outside = requests::run(
            "fac-dee",
            RequestCommand::Show { id: "seed-canonical-pending".into(), scope: vec!["loc-annex".into()] },
        );
        assert_eq!(parse_payload(&outside.output)["error_class"], "not_found");

        let bad_patch = requests::run(
            "admin-root",
            RequestCommand::Update {
                id: "seed-canonical-pending".into(),
                patch: "{not json".into(),
                scope: Vec::new(),
            },
        );
        assert_eq!(bad_patch.exit_code, 2);
        assert_eq!(parse_payload(&bad_patch.output)["error_class"], "invalid_input");
    });
}

#[test]
fn config_attributes_env_sources() {
    with_store(|url| {
        let result = config::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let entries = payload["data"].as_array().cloned().unwrap_or_default();
        let store_url = entries.iter().find(|entry| entry["key"] == "store.url").expect("store.url");
        assert_eq!(store_url["value"], url);
        assert_eq!(store_url["source"], "env (ASSETFLOW_STORE_URL)");

        let collection =
            entries.iter().find(|entry| entry["key"] == "store.collection").expect("collection");
        assert_eq!(collection["source"], "default");
    });
}

#[test]
fn doctor_passes_against_a_fresh_file_store() {
    with_store(|_| {
        let result = doctor::run(true);
        let report = parse_payload(&result.output);
        assert_eq!(result.exit_code, 0, "doctor failed: {}", result.output);
        assert_eq!(report["overall_status"], "pass");
        assert_eq!(report["checks"].as_array().map(Vec::len), Some(4));
    });
}

#[test]
fn doctor_skips_store_checks_when_config_is_invalid() {
    with_env(&[("ASSETFLOW_STORE_URL", "postgres://elsewhere/db")], || {
        let result = doctor::run(true);
        let report = parse_payload(&result.output);
        assert_eq!(result.exit_code, 1);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
    });
}

fn list_args() -> ListArgs {
    ListArgs {
        status: Vec::new(),
        priority: Vec::new(),
        location: None,
        department: None,
        requester: None,
        search: None,
        from: None,
        to: None,
        scope: Vec::new(),
    }
}

fn item(item_id: &str, quantity: u32) -> ItemFulfillment {
    ItemFulfillment { item_id: item_id.to_string(), fulfilled_quantity: quantity, notes: None }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

/// Runs against a throwaway SQLite file; each command opens its own pool.
fn with_store(test_fn: impl FnOnce(&str)) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(&dir.path().join("assetflow.db"));
    with_env(&[("ASSETFLOW_STORE_URL", url.as_str())], || test_fn(&url));
}

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "ASSETFLOW_STORE_URL",
        "ASSETFLOW_STORE_MAX_CONNECTIONS",
        "ASSETFLOW_STORE_TIMEOUT_SECS",
        "ASSETFLOW_STORE_COLLECTION",
        "ASSETFLOW_LIFECYCLE_OPTIMISTIC_CONCURRENCY",
        "ASSETFLOW_LOGGING_LEVEL",
        "ASSETFLOW_LOGGING_FORMAT",
        "ASSETFLOW_LOG_LEVEL",
        "ASSETFLOW_LOG_FORMAT",
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
