//! # toolgate CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use toolgate_cli::diff::{run_diff, DiffArgs};
use toolgate_cli::evaluate::{run_evaluate, EvaluateArgs};
use toolgate_cli::hash::{run_hash, HashArgs};
use toolgate_cli::load_config;
use toolgate_cli::validate::{run_validate, ValidateArgs};

/// toolgate: policy tooling for agent tool invocations.
///
/// Validates and diffs policy documents, evaluates decisions offline, and
/// computes audit content hashes.
#[derive(Parser, Debug)]
#[command(name = "toolgate", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to a YAML or JSON engine configuration file. Defaults to
    /// `TOOLGATE_*` environment variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check policy documents for schema and rule errors.
    Validate(ValidateArgs),

    /// Shallow diff of two policy documents.
    Diff(DiffArgs),

    /// Evaluate a request against a policy document.
    Evaluate(EvaluateArgs),

    /// Compute an audit content hash.
    Hash(HashArgs),
}

fn init_tracing(verbose: u8, json: bool) {
    // RUST_LOG wins over -v when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "toolgate CLI starting");

    let result = match cli.command {
        Commands::Validate(args) => run_validate(&args),
        Commands::Diff(args) => run_diff(&args),
        Commands::Evaluate(args) => {
            load_config(cli.config.as_deref()).and_then(|config| run_evaluate(&args, config))
        }
        Commands::Hash(args) => run_hash(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parse_validate_paths() {
        let cli = Cli::try_parse_from(["toolgate", "validate", "a.json", "b.yaml"]).unwrap();
        if let Commands::Validate(args) = cli.command {
            assert_eq!(args.paths.len(), 2);
        } else {
            panic!("expected validate");
        }
    }

    #[test]
    fn cli_validate_requires_a_path() {
        assert!(Cli::try_parse_from(["toolgate", "validate"]).is_err());
    }

    #[test]
    fn cli_parse_evaluate() {
        let cli = Cli::try_parse_from([
            "toolgate",
            "-vv",
            "evaluate",
            "--policy",
            "p.json",
            "--tool",
            "posts.create",
            "--fields",
            r#"{"title":"x"}"#,
            "--ip",
            "10.0.0.1",
            "--admin",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        if let Commands::Evaluate(args) = cli.command {
            assert_eq!(args.tool, "posts.create");
            assert_eq!(args.actor, "cli");
            assert_eq!(args.ip.as_deref(), Some("10.0.0.1"));
            assert!(args.admin);
            assert_eq!(args.repeat, 1);
        } else {
            panic!("expected evaluate");
        }
    }

    #[test]
    fn cli_entity_type_requires_entity_id() {
        let r = Cli::try_parse_from([
            "toolgate",
            "evaluate",
            "--policy",
            "p.json",
            "--tool",
            "posts.update",
            "--entity-type",
            "post",
        ]);
        assert!(r.is_err());
    }

    #[test]
    fn cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "toolgate",
            "diff",
            "a.json",
            "b.json",
            "--log-json",
            "--config",
            "c.yaml",
        ])
        .unwrap();
        assert!(cli.log_json);
        assert_eq!(cli.config, Some(PathBuf::from("c.yaml")));
    }
}
