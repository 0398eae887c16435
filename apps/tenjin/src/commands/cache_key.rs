//! Cache key command for the tenjin CLI.
//!
//! CI caches expensive toolchain builds (the OCaml switch takes minutes to
//! compile) under a key that changes whenever the platform or a relevant
//! desired version changes.
//!
//! ```bash
//! tenjin cache-key ocaml   # Linux;x86_64;ocaml-5.2.0;opam-2.3.0;dune-3.18.0
//! ```

use anyhow::Result;
use clap::{Args, ValueEnum};

use crate::toolchain::manifest::ocaml_cache_key;
use crate::toolchain::{DesiredVersionManifest, Platform};

/// Arguments for the cache-key command.
#[derive(Args)]
pub struct CacheKeyArgs {
    /// The toolchain to describe.
    #[clap(value_enum)]
    pub toolchain: CachedToolchain,
}

/// Toolchains with a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CachedToolchain {
    /// opam, OCaml, and Dune.
    Ocaml,
}

/// Executes the cache-key command.
///
/// # Errors
///
/// Returns an error if the platform is not supported.
pub fn execute(args: &CacheKeyArgs) -> Result<()> {
    let platform = Platform::detect()?;
    let manifest = DesiredVersionManifest::builtin();
    let key = match args.toolchain {
        CachedToolchain::Ocaml => ocaml_cache_key(&manifest, platform)?,
    };
    println!("{key}");
    Ok(())
}
