use serde::Serialize;

use chatty_core::config::{AppConfig, LoadOptions, StorageBackend};
use chatty_db::{connect_with_settings, migrations, DbPool};

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

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };
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
            checks.extend(database_checks(&config));
            checks.push(check_provider_key(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["database_connectivity", "migration_freshness", "provider_key"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    // Skipped checks do not fail the run; only explicit failures do.
    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    if config.storage.backend == StorageBackend::Memory {
        return vec![
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "storage backend is `memory`; no database to check".to_string(),
            },
            DoctorCheck {
                name: "migration_freshness",
                status: CheckStatus::Skipped,
                details: "storage backend is `memory`; no migrations apply".to_string(),
            },
        ];
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: details.clone(),
                },
                DoctorCheck {
                    name: "migration_freshness",
                    status: CheckStatus::Skipped,
                    details,
                },
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "migration_freshness",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database was unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };
        let freshness = check_migration_freshness(&pool).await;
        pool.close().await;

        vec![connectivity, freshness]
    })
}

async fn check_migration_freshness(pool: &DbPool) -> DoctorCheck {
    let expected = migrations::MIGRATOR.migrations.len();
    let applied: Result<i64, sqlx::Error> =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations").fetch_one(pool).await;

    match applied {
        Ok(applied) if applied as usize >= expected => DoctorCheck {
            name: "migration_freshness",
            status: CheckStatus::Pass,
            details: format!("{applied} of {expected} migrations applied"),
        },
        Ok(applied) => DoctorCheck {
            name: "migration_freshness",
            status: CheckStatus::Fail,
            details: format!(
                "{applied} of {expected} migrations applied; run `chatty migrate`"
            ),
        },
        Err(_) => DoctorCheck {
            name: "migration_freshness",
            status: CheckStatus::Fail,
            details: "migration ledger not found; run `chatty migrate`".to_string(),
        },
    }
}

/// The relay can run without a key (it falls back), so an absent key is a
/// skip, not a failure. An explicitly configured key passes outright; it is
/// probed against the provider at server startup.
fn check_provider_key(config: &AppConfig) -> DoctorCheck {
    if config.openai.api_key.is_some() {
        return DoctorCheck {
            name: "provider_key",
            status: CheckStatus::Pass,
            details: "provider key configured; validated at server startup".to_string(),
        };
    }

    if config.storage.backend == StorageBackend::Memory {
        return DoctorCheck {
            name: "provider_key",
            status: CheckStatus::Skipped,
            details: "no provider key configured; store one via the admin API".to_string(),
        };
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "provider_key",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(_) => {
                return DoctorCheck {
                    name: "provider_key",
                    status: CheckStatus::Skipped,
                    details: "skipped because the database was unreachable".to_string(),
                };
            }
        };

        let stored: Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT is_valid FROM api_key LIMIT 1").fetch_optional(&pool).await;
        pool.close().await;

        match stored {
            Ok(Some(1)) => DoctorCheck {
                name: "provider_key",
                status: CheckStatus::Pass,
                details: "stored provider key is marked valid".to_string(),
            },
            Ok(Some(_)) => DoctorCheck {
                name: "provider_key",
                status: CheckStatus::Fail,
                details: "stored provider key failed its last validation".to_string(),
            },
            Ok(None) => DoctorCheck {
                name: "provider_key",
                status: CheckStatus::Skipped,
                details: "no provider key stored; set one via the admin API".to_string(),
            },
            Err(_) => DoctorCheck {
                name: "provider_key",
                status: CheckStatus::Skipped,
                details: "api_key table not found; run `chatty migrate`".to_string(),
            },
        }
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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
