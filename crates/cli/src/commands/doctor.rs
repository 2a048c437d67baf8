use std::path::Path;

use curhat_agent::chain::ProviderChain;
use curhat_core::config::AppConfig;
use curhat_db::{connect_with_settings, DbPool};
use serde::Serialize;

use crate::commands::{current_thread_runtime, escape_json, load_options, CommandResult};

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

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(config_path: Option<&Path>, json_output: bool) -> CommandResult {
    let report = build_report(config_path);
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

fn build_report(config_path: Option<&Path>) -> DoctorReport {
    let checks = match AppConfig::load(load_options(config_path)) {
        Ok(config) => vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            check_provider_chain(&config),
            check_store(&config),
        ],
        Err(error) => vec![
            DoctorCheck::fail("config_validation", error.to_string()),
            DoctorCheck::skipped("provider_chain"),
            DoctorCheck::skipped("store_connectivity"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Builds the chain without calling any provider.
fn check_provider_chain(config: &AppConfig) -> DoctorCheck {
    let client = match reqwest::Client::builder().build() {
        Ok(client) => client,
        Err(error) => {
            return DoctorCheck::fail(
                "provider_chain",
                format!("http client setup failed: {error}"),
            );
        }
    };

    match ProviderChain::from_config(client, &config.providers) {
        Ok(chain) if chain.provider_names().is_empty() => {
            DoctorCheck::pass("provider_chain", "no providers configured; offline responder only")
        }
        Ok(chain) => DoctorCheck::pass(
            "provider_chain",
            format!("providers in order: {}", chain.provider_names().join(" -> ")),
        ),
        Err(error) => DoctorCheck::fail("provider_chain", error.to_string()),
    }
}

fn check_store(config: &AppConfig) -> DoctorCheck {
    if config.store.url.trim() == "memory" {
        return DoctorCheck::pass(
            "store_connectivity",
            "in-memory store; history does not survive restarts",
        );
    }

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "store_connectivity",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.store.url,
            config.store.max_connections,
            config.store.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to store: {error}"))?;

        let ping = sqlx_ping(&pool).await;
        pool.close().await;
        ping
    });

    match result {
        Ok(()) => DoctorCheck::pass(
            "store_connectivity",
            format!("connected using `{}`", config.store.url),
        ),
        Err(error) => DoctorCheck::fail("store_connectivity", error),
    }
}

async fn sqlx_ping(pool: &DbPool) -> Result<(), String> {
    pool.acquire().await.map(drop).map_err(|error| format!("store ping failed: {error}"))
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

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
