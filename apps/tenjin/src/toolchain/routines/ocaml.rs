//! The OCaml compiler, as the `tenjin` opam switch.
//!
//! The switch itself is the source of truth for which compiler is present: an
//! existing switch whose live `ocaml -vnum` matches the desired version is
//! reused as-is, even if the version record was lost.

use std::path::Path;

use anyhow::Result;
use futures_util::future::BoxFuture;

use super::local_paths;
use crate::toolchain::Platform;
use crate::toolchain::engine::Acquire;
use crate::toolchain::hermetic::{Opam, capture_stdout, run_checked, say};
use crate::toolchain::paths::OPAM_SWITCH;

/// Acquires OCaml by (re)creating the `tenjin` switch.
pub struct AcquireOcaml {
    platform: Platform,
}

impl AcquireOcaml {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn opam(&self, localdir: &Path) -> Result<Opam> {
        Opam::new(&local_paths(localdir), self.platform)
    }

    async fn install(&self, localdir: &Path, version: &str) -> Result<()> {
        let opam = self.opam(localdir)?;

        if switch_exists(&opam).await? {
            match live_version(&opam).await {
                Ok(live) if live == version => {
                    say("ocaml", format!("Reusing existing switch with OCaml {live}"));
                    return Ok(());
                }
                _ => {
                    say("ocaml", format!("Removing outdated switch `{OPAM_SWITCH}`..."));
                    run_checked(opam.command(["switch", "remove", OPAM_SWITCH, "--yes"]), "ocaml")
                        .await?;
                }
            }
        }

        say("ocaml", "Installing OCaml; this will take a few minutes to compile...");
        say("ocaml", "      (subsequent output comes from `opam switch create`)");
        run_checked(
            opam.command(["switch", "create", OPAM_SWITCH, version, "--no-switch", "--yes"]),
            "ocaml",
        )
        .await
    }
}

impl Acquire for AcquireOcaml {
    fn acquire<'a>(&'a self, localdir: &'a Path, desired: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.install(localdir, desired))
    }

    fn installed_specifier<'a>(
        &'a self,
        localdir: &'a Path,
        _desired: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { live_version(&self.opam(localdir)?).await })
    }

    fn invalidates(&self) -> &'static [&'static str] {
        &["10j-dune"]
    }
}

async fn switch_exists(opam: &Opam) -> Result<bool> {
    let switches = capture_stdout(opam.command(["switch", "list", "--short"])).await?;
    Ok(lists_switch(&switches))
}

fn lists_switch(output: &str) -> bool {
    output.lines().any(|line| line.trim() == OPAM_SWITCH)
}

async fn live_version(opam: &Opam) -> Result<String> {
    capture_stdout(opam.exec(["ocaml", "-vnum"])).await
}
