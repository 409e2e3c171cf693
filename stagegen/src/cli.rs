//! CLI argument parsing for stagegen.
//!
//! Uses clap derive macros; the command implementations live in `main.rs`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Stagegen: staged, multi-turn code generation against LLM chat-completion APIs.
///
/// A prompt file describing the application is split into ordered stages.
/// Each stage's output is written to its own directory as soon as it is
/// generated.
#[derive(Parser, Debug)]
#[command(name = "stagegen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Log debug output from stagegen.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a stage plan against a completion endpoint.
    Run(RunArgs),

    /// List the built-in stage plans.
    Plans,
}

/// Arguments for `stagegen run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Built-in plan name (`staged`, `single`) or path to a TOML plan file.
    #[arg(long, default_value = "staged")]
    pub plan: String,

    /// Prompt template file; its resolved text becomes `{base_prompt}`.
    #[arg(long)]
    pub prompt: PathBuf,

    /// Directory generated artifacts are written to.
    #[arg(long, default_value = "generated")]
    pub out: PathBuf,

    /// Substitution for a template placeholder, as KEY=VALUE. Repeatable.
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// TOML configuration file.
    #[arg(long, env = "STAGEGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Model identifier.
    #[arg(long)]
    pub model: Option<String>,

    /// Sampling temperature in [0, 2].
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum tokens per completion.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Attempts per stage, retries included.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Run only these stages (comma-separated). Their dependencies must be
    /// selected too.
    #[arg(long, value_delimiter = ',')]
    pub stages: Vec<String>,
}

impl Cli {
    /// Parses the process arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "stagegen",
            "run",
            "--prompt",
            "prompt.md",
            "--var",
            "app=notes",
            "--var",
            "lang=rust",
            "--stages",
            "frontend_components,backend_api",
            "--temperature",
            "0.2",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.plan, "staged");
        assert_eq!(args.vars, vec!["app=notes", "lang=rust"]);
        assert_eq!(args.stages, vec!["frontend_components", "backend_api"]);
        assert_eq!(args.temperature, Some(0.2));
        assert!(!cli.log_json);
    }

    #[test]
    fn test_prompt_is_required() {
        assert!(Cli::try_parse_from(["stagegen", "run"]).is_err());
    }

    #[test]
    fn test_parse_plans_with_global_flag() {
        let cli = Cli::try_parse_from(["stagegen", "plans", "--log-json"]).unwrap();
        assert!(matches!(cli.command, Command::Plans));
        assert!(cli.log_json);
    }
}
