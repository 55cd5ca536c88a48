//! # Diff Subcommand
//!
//! Shallow, top-level diff of two policy documents, printed as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use toolgate_policy::PolicyDiffer;

use crate::read_structured;

/// Arguments for the `toolgate diff` subcommand.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// The older document.
    #[arg(value_name = "FROM")]
    pub from: PathBuf,

    /// The newer document.
    #[arg(value_name = "TO")]
    pub to: PathBuf,

    /// Exit with status 1 when the documents differ.
    #[arg(long)]
    pub exit_code: bool,
}

/// Execute the diff subcommand.
pub fn run_diff(args: &DiffArgs) -> Result<u8> {
    let a: Value = read_structured(&args.from)?;
    let b: Value = read_structured(&args.to)?;
    let diff = PolicyDiffer::diff(&a, &b);

    let rendered = serde_json::to_string_pretty(&diff).context("failed to render diff")?;
    println!("{rendered}");
    tracing::debug!(
        added = diff.added.len(),
        removed = diff.removed.len(),
        modified = diff.modified.len(),
        "diff computed"
    );

    Ok(u8::from(args.exit_code && !diff.is_empty()))
}
