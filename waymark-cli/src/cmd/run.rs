use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use waymark_core::{detect_format, parse_playbook_str, Validate};
use waymark_exec::{
    CheckpointManager, Engine, EngineConfig, FinalStatus, HttpClient, NoopObserver, Observer,
    ReqwestHttpClient, RunOptions, StdoutObserver,
};
use waymark_store::make_store;

use crate::exit_codes;
use crate::output::{print_error, print_result, OutputFormat};
use crate::utils::redact_url_password;
use crate::OutputArgs;

#[derive(Serialize)]
struct RunResult {
    run_id: String,
    status: String,
    phases_run: usize,
    steps_run: usize,
    failures_ignored: usize,
    duration_ms: u64,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_cmd(
    path: &Path,
    no_resume: bool,
    checkpoint: &str,
    events: &str,
    max_parallel: Option<usize>,
    vars: &[String],
    run_id: Option<&str>,
    output: OutputArgs,
) -> i32 {
    let content = match std::fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) => {
            print_error(
                output.format,
                output.quiet,
                &format!("failed to read {}: {e}", path.display()),
            );
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let playbook = match parse_playbook_str(&content, detect_format(path)) {
        Ok(p) => p,
        Err(e) => {
            print_error(output.format, output.quiet, &format!("{e}"));
            return exit_codes::VALIDATION_FAILED;
        }
    };

    if let Err(err) = playbook.validate() {
        let detail = err
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.path, v.message))
            .collect::<Vec<_>>()
            .join("; ");
        print_error(
            output.format,
            output.quiet,
            &format!("playbook validation failed: {detail}"),
        );
        return exit_codes::VALIDATION_FAILED;
    }

    let variables = match parse_var_pairs(vars) {
        Ok(v) => v,
        Err(msg) => {
            print_error(output.format, output.quiet, &msg);
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let run_uuid = match run_id {
        Some(id) => match Uuid::parse_str(id) {
            Ok(u) => Some(u),
            Err(_) => {
                print_error(
                    output.format,
                    output.quiet,
                    &format!("invalid run id: {id}"),
                );
                return exit_codes::RUNTIME_ERROR;
            }
        },
        None => None,
    };

    let store = match make_store(checkpoint).await {
        Ok(s) => s,
        Err(e) => {
            let safe_spec = redact_url_password(checkpoint);
            print_error(
                output.format,
                output.quiet,
                &format!("checkpoint store {safe_spec}: {e}"),
            );
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let observer: Arc<dyn Observer> = match events {
        "stdout" => Arc::new(StdoutObserver),
        "none" => Arc::new(NoopObserver),
        _ => {
            print_error(
                output.format,
                output.quiet,
                &format!("unknown event sink: {events}"),
            );
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let mut config = EngineConfig::default();
    if let Some(n) = max_parallel {
        config.max_parallel = n;
    }

    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::default());
    let checkpoints = CheckpointManager::for_playbook_path(store, path);
    let engine = Engine::new(http, observer, checkpoints, config);

    // First ctrl-c stops the run cooperatively: no new requests, in-flight
    // work drains, the last checkpoint stays for a resume.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupt received, stopping after in-flight requests");
                cancel.cancel();
            }
        });
    }

    let opts = RunOptions {
        resume: !no_resume,
        run_id: run_uuid,
        variables,
        cancel,
    };

    match engine.run(&playbook, opts).await {
        Ok(report) => {
            let res = RunResult {
                run_id: report.run_id.to_string(),
                status: report.status.as_str().to_string(),
                phases_run: report.phases_run,
                steps_run: report.steps_run,
                failures_ignored: report.failures_ignored,
                duration_ms: report.duration.as_millis() as u64,
            };
            if output.format == OutputFormat::Text && !output.quiet {
                match report.status {
                    FinalStatus::Success => {
                        println!("Run {} succeeded", report.run_id);
                        println!("  Phases run: {}", res.phases_run);
                        println!("  Steps run: {}", res.steps_run);
                    }
                    FinalStatus::PartialFailure { ignored_failures } => {
                        println!(
                            "Run {} succeeded with {} ignored failure(s)",
                            report.run_id, ignored_failures
                        );
                        println!("  Phases run: {}", res.phases_run);
                        println!("  Steps run: {}", res.steps_run);
                    }
                    FinalStatus::Aborted => {
                        eprintln!(
                            "Run {} aborted after {} step(s)",
                            report.run_id, res.steps_run
                        );
                    }
                }
            } else {
                print_result(output.format, output.quiet, &res);
            }
            match report.status {
                FinalStatus::Success => exit_codes::SUCCESS,
                FinalStatus::PartialFailure { .. } | FinalStatus::Aborted => exit_codes::RUN_FAILED,
            }
        }
        Err(e) => {
            print_error(output.format, output.quiet, &format!("{e}"));
            exit_codes::RUNTIME_ERROR
        }
    }
}

/// Split `KEY=VALUE` seed pairs. Values that parse as JSON become that JSON
/// value, anything else stays a string, so `--var n=3` seeds a number and
/// `--var name=bob` a string.
fn parse_var_pairs(pairs: &[String]) -> Result<BTreeMap<String, Value>, String> {
    let mut vars = BTreeMap::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(format!("invalid --var '{pair}' (expected KEY=VALUE)"));
        };
        if key.is_empty() {
            return Err(format!("invalid --var '{pair}' (empty key)"));
        }
        let value =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::parse_var_pairs;
    use serde_json::json;

    #[test]
    fn var_values_parse_as_json_else_string() {
        let vars = parse_var_pairs(&[
            "count=3".to_string(),
            "name=bob".to_string(),
            "tags=[1,2]".to_string(),
            "empty=".to_string(),
        ])
        .unwrap();
        assert_eq!(vars["count"], json!(3));
        assert_eq!(vars["name"], json!("bob"));
        assert_eq!(vars["tags"], json!([1, 2]));
        assert_eq!(vars["empty"], json!(""));
    }

    #[test]
    fn var_without_equals_is_rejected() {
        let err = parse_var_pairs(&["oops".to_string()]).unwrap_err();
        assert!(err.contains("KEY=VALUE"));
    }
}
