//! Dune, installed into the `tenjin` switch.

use std::path::Path;

use anyhow::Result;
use futures_util::future::BoxFuture;
use tokio::process::Command;

use super::local_paths;
use crate::toolchain::Platform;
use crate::toolchain::engine::Acquire;
use crate::toolchain::hermetic::{Opam, capture_stdout, run_checked, say};

pub struct AcquireDune {
    platform: Platform,
}

impl AcquireDune {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    async fn install(&self, localdir: &Path, version: &str) -> Result<()> {
        let opam = Opam::new(&local_paths(localdir), self.platform)?;
        say("dune", format!("Installing dune {version}..."));
        run_checked(install_command(&opam, version), "dune").await
    }

    async fn dune_version(&self, localdir: &Path) -> Result<String> {
        let opam = Opam::new(&local_paths(localdir), self.platform)?;
        capture_stdout(opam.exec(["dune", "--version"])).await
    }
}

impl Acquire for AcquireDune {
    fn acquire<'a>(&'a self, localdir: &'a Path, desired: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.install(localdir, desired))
    }

    fn installed_specifier<'a>(
        &'a self,
        localdir: &'a Path,
        _desired: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.dune_version(localdir))
    }
}

/// `opam install dune.<version> --yes`, inside the `tenjin` switch.
fn install_command(opam: &Opam, version: &str) -> Command {
    let package = format!("dune.{version}");
    opam.switch_command(["install", package.as_str(), "--yes"])
}
