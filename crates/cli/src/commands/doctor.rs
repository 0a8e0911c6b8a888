use assetflow_core::config::{AppConfig, LoadOptions};
use assetflow_db::{connect_with_config, migrations, SqlDocumentStore};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(check_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["store_connectivity", "schema_migrations", "collection_readable"] {
                checks.push(skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, reason: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
}

/// Connectivity, then schema, then a count against the configured collection. Each
/// later check is skipped once an earlier one fails.
fn check_store(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "store_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                skipped("schema_migrations", "the runtime did not start"),
                skipped("collection_readable", "the runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let mut checks = Vec::new();
        let pool = match connect_with_config(&config.store).await {
            Ok(pool) => pool,
            Err(error) => {
                checks.push(DoctorCheck {
                    name: "store_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to store: {error}"),
                });
                checks.push(skipped("schema_migrations", "the store is unreachable"));
                checks.push(skipped("collection_readable", "the store is unreachable"));
                return checks;
            }
        };
        checks.push(DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.store.url),
        });

        if let Err(error) = migrations::run_pending(&pool).await {
            checks.push(DoctorCheck {
                name: "schema_migrations",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("collection_readable", "the schema is not current"));
            pool.close().await;
            return checks;
        }
        let expected = migrations::known_count();
        checks.push(match migrations::applied_count(&pool).await {
            Ok(applied) if applied >= expected => DoctorCheck {
                name: "schema_migrations",
                status: CheckStatus::Pass,
                details: format!("{applied} migrations applied"),
            },
            Ok(applied) => DoctorCheck {
                name: "schema_migrations",
                status: CheckStatus::Fail,
                details: format!("{applied} of {expected} migrations applied"),
            },
            Err(error) => DoctorCheck {
                name: "schema_migrations",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        });

        let store = SqlDocumentStore::new(pool.clone());
        checks.push(match store.count(&config.store.collection).await {
            Ok(count) => DoctorCheck {
                name: "collection_readable",
                status: CheckStatus::Pass,
                details: format!("`{}` holds {count} documents", config.store.collection),
            },
            Err(error) => DoctorCheck {
                name: "collection_readable",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        });

        pool.close().await;
        checks
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
