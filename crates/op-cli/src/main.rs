// SPDX-License-Identifier: MIT OR Apache-2.0
//! `originproof verify` — the CLI entry point for layout verification.

mod keys;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use op_config::{LinkDisagreementPolicy, SystemClock, VerifyPolicy};
use op_verify::VerifyRequest;

#[derive(Parser)]
#[command(name = "originproof", version, about = "Verify a software supply-chain layout")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter, e.g. `info`, `originproof=debug`.
    #[arg(long, global = true, default_value = "info")]
    log: String,
}

#[derive(Subcommand)]
enum Command {
    /// Verify a signed layout against a directory of signed links.
    Verify {
        /// Path to the signed layout file.
        #[arg(long)]
        layout: PathBuf,

        /// A trusted layout verification key: either a path to a
        /// JSON-encoded public key file, or the key JSON inline. May be
        /// repeated; every supplied key must verify the layout.
        #[arg(long = "layout-key", required = true)]
        layout_keys: Vec<String>,

        /// Directory holding `<step>.link` files. Defaults to the
        /// current directory.
        #[arg(long, default_value = ".")]
        link_dir: PathBuf,

        /// Working directory inspections run in. Defaults to the
        /// current directory.
        #[arg(long, default_value = ".")]
        workdir: PathBuf,

        /// Optional `originproof.toml` policy file (disagreement
        /// handling, inspection timeout).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Require majority-vote agreement instead of strict agreement
        /// across a step's multiple signed links, overriding any policy
        /// file setting.
        #[arg(long)]
        majority_vote: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_new(&cli.log)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Verify {
            layout,
            layout_keys,
            link_dir,
            workdir,
            config,
            majority_vote,
        } => run_verify(layout, layout_keys, link_dir, workdir, config, majority_vote),
    }
}

fn run_verify(
    layout_path: PathBuf,
    layout_key_args: Vec<String>,
    link_dir: PathBuf,
    workdir: PathBuf,
    config: Option<PathBuf>,
    majority_vote: bool,
) -> Result<()> {
    let layout_keys = layout_key_args
        .iter()
        .map(|arg| keys::resolve_layout_key(arg))
        .collect::<Result<Vec<_>>>()
        .context("resolving --layout-key arguments")?;

    let mut policy: VerifyPolicy = op_config::load_policy(config.as_deref())
        .context("loading originproof.toml")?;
    policy.link_dir = link_dir.clone();
    if majority_vote {
        policy.link_disagreement = LinkDisagreementPolicy::MajorityVote;
    }

    let request = VerifyRequest {
        layout_path: &layout_path,
        layout_keys,
        link_dir: &link_dir,
        workdir: &workdir,
        policy,
    };

    op_verify::verify(request, &SystemClock).context("verification failed")?;

    tracing::info!("verification passed");
    Ok(())
}
