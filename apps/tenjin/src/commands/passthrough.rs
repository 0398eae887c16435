//! Tool passthrough commands for the tenjin CLI.
//!
//! `tenjin opam`, `tenjin dune`, and `tenjin cargo` make sure the tools they
//! need are provisioned, then run the tool with the remaining arguments in
//! the curated environment. The tool's exit code becomes tenjin's.
//!
//! ```bash
//! tenjin opam switch list
//! tenjin dune build @install
//! tenjin cargo build --release
//! ```

use std::process::Stdio;

use anyhow::{Context, Result};
use clap::Args;
use tokio::process::Command;

use crate::errors::TenjinError;
use crate::toolchain::hermetic::{Opam, current_environment, hermetic_command, tenjin_environment};
use crate::toolchain::{
    DesiredVersionManifest, InstalledVersionStore, LocalPaths, Platform, ProvisioningEngine,
    Routines, Tool,
};

/// Arguments passed through to the tool.
#[derive(Args)]
pub struct PassthroughArgs {
    /// Arguments for the tool, passed through unchanged.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// A tool that can be launched through tenjin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    Opam,
    Dune,
    Cargo,
}

impl Launch {
    /// Tools that must be provisioned before launching.
    #[must_use]
    pub fn requires(self) -> &'static [Tool] {
        match self {
            Self::Opam => &[Tool::Opam],
            Self::Dune => &[Tool::Dune],
            Self::Cargo => &[Tool::BuildDeps, Tool::Llvm],
        }
    }
}

/// Executes a passthrough command.
///
/// # Errors
///
/// Returns an error if provisioning fails or the tool cannot be started, and
/// [`TenjinError::ProcessExitCode`] if the tool exits unsuccessfully.
pub async fn execute(launch: Launch, args: &PassthroughArgs) -> Result<()> {
    let platform = Platform::detect()?;
    let paths = LocalPaths::discover()?;
    let manifest = DesiredVersionManifest::builtin();
    let mut store = InstalledVersionStore::load(paths.store_file());

    let routines = Routines::standard(platform);
    let mut engine = ProvisioningEngine::new(&paths.root, &manifest, &mut store);
    for &tool in launch.requires() {
        engine.ensure_tool(tool, &routines).await?;
    }

    let cmd = build_command(launch, &paths, platform, &args.args)?;
    run_to_completion(cmd).await
}

fn build_command(
    launch: Launch,
    paths: &LocalPaths,
    platform: Platform,
    args: &[String],
) -> Result<Command> {
    let env = tenjin_environment(paths, platform, &current_environment())?;
    let cmd = match launch {
        // OPAMROOT and OPAMSWITCH in the environment select the local root.
        Launch::Opam => {
            let mut cmd = hermetic_command(paths.opam(), &env);
            cmd.args(args);
            cmd
        }
        Launch::Dune => {
            let dune = std::iter::once("dune").chain(args.iter().map(String::as_str));
            Opam::new(paths, platform)?.exec(dune)
        }
        Launch::Cargo => {
            let mut cmd = hermetic_command("cargo", &env);
            cmd.args(args);
            cmd
        }
    };
    Ok(cmd)
}

async fn run_to_completion(mut cmd: Command) -> Result<()> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let status = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to execute {program}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(TenjinError::process_exit_code(status.code().unwrap_or(1)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn argv(cmd: &Command) -> Vec<String> {
        let cmd = cmd.as_std();
        std::iter::once(cmd.get_program())
            .chain(cmd.get_args())
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn cargo_needs_the_c_toolchain() {
        assert_eq!(Launch::Cargo.requires(), [Tool::BuildDeps, Tool::Llvm]);
        assert_eq!(Launch::Dune.requires(), [Tool::Dune]);
    }

    #[test]
    fn opam_runs_the_local_binary_with_user_args() {
        let paths = LocalPaths::with_root(PathBuf::from("/r/_local"));
        let cmd = build_command(
            Launch::Opam,
            &paths,
            Platform::LinuxX64,
            &["switch".to_string(), "list".to_string()],
        )
        .unwrap();
        assert_eq!(argv(&cmd), ["/r/_local/opam", "switch", "list"]);
    }

    #[test]
    fn dune_runs_inside_the_switch() {
        let paths = LocalPaths::with_root(PathBuf::from("/r/_local"));
        let cmd = build_command(
            Launch::Dune,
            &paths,
            Platform::LinuxX64,
            &["build".to_string(), "--root".to_string(), ".".to_string()],
        )
        .unwrap();
        assert_eq!(
            argv(&cmd),
            [
                "/r/_local/opam",
                "exec",
                "--cli=2.3",
                "--root",
                "/r/_local/opamroot",
                "--switch",
                "tenjin",
                "--",
                "dune",
                "build",
                "--root",
                "."
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn child_exit_code_is_propagated() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 7"]);
        let err = run_to_completion(cmd).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TenjinError>(),
            Some(TenjinError::ProcessExitCode { code: 7 })
        ));
    }
}
