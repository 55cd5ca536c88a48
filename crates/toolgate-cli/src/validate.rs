//! # Validate Subcommand
//!
//! Checks policy documents: schema conformance (unknown keys, condition
//! types) and load-time rules (hour and day bounds, `HH:MM` times, regex
//! syntax, workflow shape).

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use toolgate_policy::PolicyDocument;

use crate::read_structured;

/// Arguments for the `toolgate validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Policy documents to check.
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,
}

/// Execute the validate subcommand.
///
/// Returns exit code: 0 if every document is valid, 1 otherwise.
pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let mut failed = 0usize;
    for path in &args.paths {
        match check(path) {
            Ok(()) => println!("OK: {}", path.display()),
            Err(problems) => {
                failed += 1;
                println!("FAIL: {}", path.display());
                for p in problems {
                    println!("  - {p}");
                }
            }
        }
    }
    println!("{}/{} documents valid", args.paths.len() - failed, args.paths.len());
    tracing::info!(total = args.paths.len(), failed, "validation finished");
    Ok(u8::from(failed > 0))
}

fn check(path: &Path) -> std::result::Result<(), Vec<String>> {
    let value: serde_json::Value = read_structured(path).map_err(|e| vec![format!("{e:#}")])?;
    let doc: PolicyDocument =
        serde_json::from_value(value).map_err(|e| vec![format!("schema: {e}")])?;
    doc.validate()
        .map_err(|invalid| invalid.errors.iter().map(ToString::to_string).collect())
}
