//! The opam binary and its isolated root.
//!
//! Re-initializing the root throws away every switch in it, which is why this
//! routine invalidates the OCaml and Dune records.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::debug;

use super::{artifact_name, local_paths, remove_dir_if_exists, remove_file_if_exists, symlink};
use crate::toolchain::Platform;
use crate::toolchain::download::download_file;
use crate::toolchain::engine::{Acquire, parse_version};
use crate::toolchain::hermetic::{Opam, capture_stdout, probe_sandbox, run_checked, say};
use crate::toolchain::paths::LocalPaths;

/// Acquires opam and initializes `opamroot/`.
pub struct AcquireOpam {
    platform: Platform,
}

impl AcquireOpam {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    async fn install(&self, localdir: &Path, version: &str) -> Result<()> {
        let paths = local_paths(localdir);
        self.install_binary(&paths, version).await?;

        remove_dir_if_exists(&paths.opamroot())?;
        let init_args = init_args(probe_sandbox(&paths, self.platform).await);

        say("opam", "Initializing opam; this will take about half a minute...");
        say("opam", "      (subsequent output comes from `opam init --bare`)");
        let opam = Opam::new(&paths, self.platform)?;
        run_checked(opam.command(&init_args), "opam").await
    }

    /// Puts an opam of at least `version` at `<local>/opam`.
    async fn install_binary(&self, paths: &LocalPaths, version: &str) -> Result<()> {
        let dest = paths.opam();
        remove_file_if_exists(&dest)?;
        std::fs::create_dir_all(&paths.root)
            .with_context(|| format!("Failed to create directory: {}", paths.root.display()))?;

        if let Some(system) = suitable_system_opam(version).await {
            say(
                "opam",
                format!("Symlinking to a suitable version of opam at {}", system.display()),
            );
            return symlink(&system, &dest);
        }

        say("opam", "Downloading a local copy of opam...");
        let url = opam_url(self.platform, version);
        let download = paths.download_path(&artifact_name(&url)?);
        download_file(&url, &download).await?;
        std::fs::rename(&download, &dest).with_context(|| {
            format!("Failed to move {} to {}", download.display(), dest.display())
        })?;
        #[cfg(unix)]
        crate::toolchain::archive::set_executable(&dest)?;
        Ok(())
    }
}

impl Acquire for AcquireOpam {
    fn acquire<'a>(&'a self, localdir: &'a Path, desired: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.install(localdir, desired))
    }

    fn installed_specifier<'a>(
        &'a self,
        localdir: &'a Path,
        _desired: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut cmd = Command::new(local_paths(localdir).opam());
            cmd.arg("--version");
            capture_stdout(cmd).await
        })
    }

    fn invalidates(&self) -> &'static [&'static str] {
        &["10j-ocaml", "10j-dune"]
    }
}

/// Arguments for `opam init`, followed by the sandbox flags for this machine.
fn init_args(sandbox_flags: Vec<String>) -> Vec<String> {
    ["init", "--bare", "--no-setup", "--disable-completion"]
        .into_iter()
        .map(str::to_string)
        .chain(sandbox_flags)
        .collect()
}

/// An `opam` on the user's `PATH` that is at least `version`, if any.
async fn suitable_system_opam(version: &str) -> Option<PathBuf> {
    let system = which::which("opam").ok()?;
    let mut cmd = Command::new(&system);
    cmd.arg("--version");
    let found = capture_stdout(cmd).await.ok()?;
    debug!("system opam {} reports {found}", system.display());

    match (parse_version(&found), parse_version(version)) {
        (Some(found), Some(wanted)) if found >= wanted => Some(system),
        _ => None,
    }
}

fn opam_url(platform: Platform, v: &str) -> String {
    let (arch, os) = match platform {
        Platform::LinuxX64 => ("x86_64", "linux"),
        Platform::LinuxArm64 => ("arm64", "linux"),
        Platform::MacosX64 => ("x86_64", "macos"),
        Platform::MacosArm64 => ("arm64", "macos"),
    };
    format!("https://github.com/ocaml/opam/releases/download/{v}/opam-{v}-{arch}-{os}")
}
