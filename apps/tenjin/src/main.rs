#![warn(clippy::pedantic)]

//! # Tenjin toolchain launcher (tenjin)
//!
//! The `tenjin` command provisions the hermetic toolchain Tenjin builds with
//! (Clang/LLVM with a pinned sysroot, CMake, opam, OCaml, Dune, and a bundle
//! of build helpers) into a local directory, and runs tools inside it.
//!
//! ## Subcommands
//!
//! - `provision` - Install or update every tool
//! - `status` - Show desired and installed versions
//! - `opam`, `dune`, `cargo` - Run a tool with the curated environment
//! - `cache-key ocaml` - Print the CI cache key for the OCaml toolchain
//!
//! ## Examples
//!
//! Provision everything (only outdated tools are touched):
//! ```bash
//! tenjin provision
//! ```
//!
//! Build the OCaml side with the local Dune:
//! ```bash
//! tenjin dune build
//! ```

mod commands;
mod errors;
mod toolchain;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cache_key, passthrough, provision, status};
use errors::{TenjinError, find_in_chain};
use tracing_subscriber::EnvFilter;

/// Hermetic toolchain provisioning for Tenjin.
#[derive(Parser)]
#[command(
    name = "tenjin",
    author,
    version,
    about = "Provision and run Tenjin's hermetic toolchain",
    after_help = "\
LOCAL ROOT:
    Tools are installed under <repo root>/_local, where the repo root is the
    nearest ancestor of the current directory containing cli/sh/provision.sh.

ENVIRONMENT VARIABLES:
    TENJIN_LOCALDIR         Local installation root (overrides <repo root>/_local)
    RUST_LOG                Log filter for diagnostics (default: warn)"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the tenjin CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Install or update every tool.
    ///
    /// Tools whose installed version already satisfies the desired version
    /// are left alone; the rest are downloaded and installed in order. The
    /// build-deps bundle is only available for Linux x86_64 and is skipped
    /// on other platforms.
    Provision,

    /// Show desired and installed tool versions.
    Status,

    /// Run opam against the local root.
    Opam(passthrough::PassthroughArgs),

    /// Run dune from the local OCaml switch.
    Dune(passthrough::PassthroughArgs),

    /// Run cargo with the local Clang/LLVM as the C toolchain.
    Cargo(passthrough::PassthroughArgs),

    /// Print a cache key describing a provisioned toolchain.
    CacheKey(cache_key::CacheKeyArgs),
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Maps an error to tenjin's exit code.
///
/// A passthrough tool's own failure exits with the tool's code and prints
/// nothing more; anything else is reported with its cause chain.
fn handle_error(e: &anyhow::Error) -> i32 {
    if let Some(TenjinError::ProcessExitCode { code }) = find_in_chain(e) {
        return *code;
    }
    eprintln!("Error: {e:?}");
    1
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Provision => provision::execute().await,
        Commands::Status => status::execute(),
        Commands::Opam(args) => passthrough::execute(passthrough::Launch::Opam, &args).await,
        Commands::Dune(args) => passthrough::execute(passthrough::Launch::Dune, &args).await,
        Commands::Cargo(args) => passthrough::execute(passthrough::Launch::Cargo, &args).await,
        Commands::CacheKey(args) => cache_key::execute(&args),
    }
}
