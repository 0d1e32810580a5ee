use kommo_sync_core::auth::TokenPhase;
use kommo_sync_core::config::AppConfig;
use kommo_sync_db::{connect_with_config, migrations, DbPool};
use kommo_sync_kommo::{KommoRuntime, TokenStatus};
use serde::Serialize;

use crate::commands::{load_config, CommandResult};

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

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const CHECKS_AFTER_CONFIG: [&str; 4] =
    ["database_connectivity", "database_schema", "kommo_credentials", "kommo_token"];

/// Read-only readiness report. Exits 1 when any check fails.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

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

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match load_config() {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.extend(runtime_checks(&config));
        }
        Err((_, message, _)) => {
            checks.push(DoctorCheck::fail("config_validation", message));
            for name in CHECKS_AFTER_CONFIG {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
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

fn runtime_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail(
                "database_connectivity",
                format!("failed to initialize async runtime: {error}"),
            )];
            for name in &CHECKS_AFTER_CONFIG[1..] {
                checks.push(DoctorCheck::skipped(*name, "the async runtime did not start"));
            }
            return checks;
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                let mut checks = vec![DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to connect to database: {error}"),
                )];
                for name in &CHECKS_AFTER_CONFIG[1..] {
                    checks.push(DoctorCheck::skipped(*name, "the database is unreachable"));
                }
                return checks;
            }
        };

        let mut checks = vec![DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        )];
        let schema = schema_check(&pool).await;
        let schema_ready = schema.status == CheckStatus::Pass;
        checks.push(schema);

        if schema_ready {
            checks.extend(kommo_checks(config, pool.clone()).await);
        } else {
            for name in &CHECKS_AFTER_CONFIG[2..] {
                checks.push(DoctorCheck::skipped(*name, "the schema is not migrated"));
            }
        }

        pool.close().await;
        checks
    })
}

async fn schema_check(pool: &DbPool) -> DoctorCheck {
    let expected = migrations::MIGRATOR
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .count();
    match migrations::applied_versions(pool).await {
        Ok(applied) if applied.len() >= expected => {
            DoctorCheck::pass("database_schema", format!("{} migrations applied", applied.len()))
        }
        Ok(applied) => DoctorCheck::fail(
            "database_schema",
            format!(
                "{} of {expected} migrations applied; run `kommo-sync migrate`",
                applied.len()
            ),
        ),
        Err(error) => {
            DoctorCheck::fail("database_schema", format!("could not read migrations: {error}"))
        }
    }
}

async fn kommo_checks(config: &AppConfig, pool: DbPool) -> Vec<DoctorCheck> {
    let runtime = match KommoRuntime::from_pool(&config.kommo, pool) {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail("kommo_credentials", error.to_string()),
                DoctorCheck::skipped("kommo_token", "the kommo client could not be built"),
            ];
        }
    };

    match runtime.tokens.status().await {
        Ok(status) => vec![credentials_check(&status), token_check(&status)],
        Err(error) => vec![
            DoctorCheck::fail("kommo_credentials", format!("could not read settings: {error}")),
            DoctorCheck::skipped("kommo_token", "settings could not be read"),
        ],
    }
}

fn credentials_check(status: &TokenStatus) -> DoctorCheck {
    if status.missing_settings.is_empty() {
        DoctorCheck::pass("kommo_credentials", "subdomain, client id/secret and redirect uri set")
    } else {
        DoctorCheck::fail(
            "kommo_credentials",
            format!(
                "missing {}; set them with `kommo-sync settings set`",
                status.missing_settings.join(", ")
            ),
        )
    }
}

fn token_check(status: &TokenStatus) -> DoctorCheck {
    match status.phase {
        TokenPhase::Valid => DoctorCheck::pass(
            "kommo_token",
            format!("access token valid until {}", status.expires_at.unwrap_or_default()),
        ),
        TokenPhase::NeedsRefresh => {
            DoctorCheck::pass("kommo_token", "access token expired; refresh token stored")
        }
        TokenPhase::NeedsReauthorization => DoctorCheck::fail(
            "kommo_token",
            "no usable tokens; run `kommo-sync authorize` to exchange the stored code",
        ),
        TokenPhase::Unauthenticated => DoctorCheck::fail(
            "kommo_token",
            "no tokens and no authorization code; run `kommo-sync authorize --code <code>`",
        ),
    }
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
