//! Provision command for the tenjin CLI.
//!
//! Brings every tool in the local root up to its desired version. Tools that
//! are already recorded at a satisfying version are skipped without touching
//! the network, so running this repeatedly is cheap. The build-deps bundle
//! only exists for Linux `x86_64` and is skipped elsewhere.
//!
//! ```bash
//! tenjin provision
//! ```

use anyhow::Result;

use crate::toolchain::hermetic::say;
use crate::toolchain::{
    DesiredVersionManifest, EnsureOutcome, InstalledVersionStore, LocalPaths, Platform,
    ProvisioningEngine, Routines,
};

const CTX: &str = "overall-provisioning";

/// Executes the provision command.
///
/// # Errors
///
/// Returns an error if:
/// - The platform is not supported
/// - The local root cannot be located
/// - Any tool fails to provision (earlier tools stay recorded)
pub async fn execute() -> Result<()> {
    let platform = Platform::detect()?;
    let paths = LocalPaths::discover()?;
    let manifest = DesiredVersionManifest::builtin();
    let mut store = InstalledVersionStore::load(paths.store_file());

    say(
        CTX,
        format!("Provisioning local directory {}...", paths.root.display()),
    );
    say(CTX, "This may involve downloading and extracting a few large tarballs:");
    say(
        CTX,
        "    Clang+LLVM, opam/OCaml, a sysroot, and misc build tools like CMake.",
    );

    let routines = Routines::standard(platform);
    let mut engine = ProvisioningEngine::new(&paths.root, &manifest, &mut store);
    let outcomes = engine.ensure_all(&routines).await?;

    println!();
    for (tool, outcome) in outcomes {
        match outcome {
            EnsureOutcome::AlreadySatisfied => {
                println!("  {:<12} up to date ({})", tool, manifest.desired_for(tool)?);
            }
            EnsureOutcome::Provisioned { installed } => {
                println!("  {tool:<12} installed {installed}");
            }
            EnsureOutcome::Skipped => {
                println!("  {tool:<12} not used on {platform}");
            }
        }
    }
    Ok(())
}
