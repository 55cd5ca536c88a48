//! # Hash Subcommand
//!
//! Prints the audit content hash of an entity's fields, or with
//! `--current` the hash of the proposed fields merged over the current
//! state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use toolgate_audit::{content_hash, proposed_after_hash};

use crate::read_structured;

/// Arguments for the `toolgate hash` subcommand.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// JSON or YAML file with the entity fields (the proposed fields when
    /// `--current` is given).
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Current entity state to merge the proposed fields over.
    #[arg(long, value_name = "PATH")]
    pub current: Option<PathBuf>,
}

/// Compute the hash described by `args`.
pub fn compute_hash(args: &HashArgs) -> Result<String> {
    let fields: Value = read_structured(&args.path)?;
    let hash = match &args.current {
        Some(current) => {
            let current: Value = read_structured(current)?;
            proposed_after_hash(&current, &fields)
        }
        None => content_hash(&fields),
    };
    hash.context("failed to canonicalize fields")
}

/// Execute the hash subcommand.
pub fn run_hash(args: &HashArgs) -> Result<u8> {
    println!("{}", compute_hash(args)?);
    Ok(0)
}
