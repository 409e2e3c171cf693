//! Stagegen command-line entry point.
//!
//! Exit codes: 0 when every stage succeeded and was saved, 1 when a stage
//! failed or the run was cancelled, 2 for configuration and planning errors,
//! 3 when generation completed but an artifact or `run.json` was not saved.

mod cli;

use anyhow::{Context, Result};
use cli::{Cli, Command, RunArgs};
use stagegen::cancellation::CancellationToken;
use stagegen::config::{load_credential, GeneratorConfig};
use stagegen::events::LoggingEventSink;
use stagegen::llm::{ClientConfig, OpenAiCompatibleClient};
use stagegen::observability::{init_tracing, LogFormat};
use stagegen::output::{atomic_write, FsOutputWriter};
use stagegen::pipeline::{Orchestrator, RunOutcome};
use stagegen::plans;
use stagegen::prompt::{load_template, substitutions_from_pairs};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

const EXIT_COMPLETE: u8 = 0;
const EXIT_INCOMPLETE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_UNSAVED: u8 = 3;

/// Substitution key the resolved prompt file is exposed under.
const BASE_PROMPT_KEY: &str = "base_prompt";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    if let Err(err) = init_tracing(format, cli.verbose) {
        eprintln!("Warning: logging not initialized: {err}");
    }

    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Plans => list_plans(),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn load_config(args: &RunArgs) -> Result<GeneratorConfig> {
    let mut config = match &args.config {
        Some(path) => GeneratorConfig::load(path)?,
        None => GeneratorConfig::default(),
    };

    if let Some(model) = &args.model {
        config.model.clone_from(model);
    }
    if let Some(temperature) = args.temperature {
        config.temperature = temperature;
    }
    if let Some(max_tokens) = args.max_tokens {
        config.max_tokens = max_tokens;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.retry.max_attempts = max_attempts;
    }

    config.validate()?;
    Ok(config)
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let config = load_config(&args)?;

    let mut plan = plans::resolve_plan(&args.plan)?;
    if !args.stages.is_empty() {
        plan = plan.select(&args.stages)?;
    }

    let mut substitutions = substitutions_from_pairs(&args.vars)?;
    let base_prompt = load_template(&args.prompt)?.resolve(&substitutions)?;
    substitutions.insert(BASE_PROMPT_KEY.to_string(), base_prompt.into_string());

    let api_key = load_credential(&config)?;
    let client = OpenAiCompatibleClient::new(ClientConfig::from_generator(&config, api_key))?;
    let writer = FsOutputWriter::new(&args.out).with_file_name(config.artifact_file_name.clone());

    let cancel = Arc::new(CancellationToken::new());
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping after the current stage");
                cancel.cancel("interrupted");
            }
        });
    }

    info!(
        plan = plan.name(),
        stages = ?plan.stage_names(),
        out = %args.out.display(),
        "Generating"
    );

    let state = Orchestrator::new(Arc::new(client), Arc::new(writer), config)
        .with_substitutions(substitutions)
        .with_events(Arc::new(LoggingEventSink::debug()))
        .with_cancellation(cancel)
        .run(&plan)
        .await?;

    let report_path = args.out.join("run.json");
    let report = state.to_json().context("failed to serialize run report")?;
    let report_saved = match atomic_write(&report_path, report.as_bytes()) {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %report_path.display(), error = %err, "Failed to write run report");
            eprintln!("Run report not saved to {}: {err}", report_path.display());
            false
        }
    };

    println!("{}", state.summary());
    for result in state.results() {
        match (&result.artifact, &result.persistence_error) {
            (Some(artifact), _) => println!("{}: saved to {}", result.stage_name, artifact.location),
            (None, Some(err)) => println!("{}: not saved ({})", result.stage_name, err.message),
            (None, None) => {}
        }
    }

    match state.outcome() {
        RunOutcome::Completed => println!("Run {} complete.", state.run_id()),
        RunOutcome::Cancelled { next_stage, reason } => {
            eprintln!("Run cancelled before stage '{next_stage}': {reason}");
        }
        RunOutcome::Halted { stage, error } | RunOutcome::Aborted { stage, error } => {
            eprintln!("Stage '{stage}' failed: {error}");
            let skipped = state.not_attempted();
            if !skipped.is_empty() {
                eprintln!("Not attempted: {}", skipped.join(", "));
            }
        }
        RunOutcome::Running => {}
    }
    let unsaved = state.unsaved_stages();
    if !unsaved.is_empty() {
        eprintln!("Generated but not saved: {}", unsaved.join(", "));
    }

    Ok(ExitCode::from(exit_code(
        state.outcome(),
        unsaved.is_empty() && report_saved,
    )))
}

/// Maps a finished run to the process exit code. A failed or cancelled run
/// reports that first; a completed run only succeeds if everything was saved.
fn exit_code(outcome: &RunOutcome, all_saved: bool) -> u8 {
    match outcome {
        RunOutcome::Completed if all_saved => EXIT_COMPLETE,
        RunOutcome::Completed => EXIT_UNSAVED,
        _ => EXIT_INCOMPLETE,
    }
}

fn list_plans() -> Result<ExitCode> {
    for name in plans::BUILTIN_PLANS {
        let plan = plans::resolve_plan(name)?;
        println!("{}", plan.name());
        for stage in plan.stages() {
            if stage.depends_on.is_empty() {
                println!("  {}", stage.name);
            } else {
                println!("  {} (after {})", stage.name, stage.depends_on.join(", "));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagegen::errors::{ErrorInfo, ErrorKind};

    #[test]
    fn test_exit_code_complete_and_saved() {
        assert_eq!(exit_code(&RunOutcome::Completed, true), 0);
    }

    #[test]
    fn test_exit_code_complete_but_unsaved() {
        assert_eq!(exit_code(&RunOutcome::Completed, false), EXIT_UNSAVED);
    }

    #[test]
    fn test_exit_code_incomplete_runs() {
        let halted = RunOutcome::Halted {
            stage: "code".into(),
            error: ErrorInfo::new(ErrorKind::InvalidRequestError, "bad"),
        };
        let cancelled = RunOutcome::Cancelled {
            next_stage: "code".into(),
            reason: "interrupted".into(),
        };

        assert_eq!(exit_code(&halted, true), EXIT_INCOMPLETE);
        assert_eq!(exit_code(&halted, false), EXIT_INCOMPLETE);
        assert_eq!(exit_code(&cancelled, true), EXIT_INCOMPLETE);
    }
}
