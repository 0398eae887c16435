//! Acquisition routines for each provisioned tool.
//!
//! Each routine replaces its target directory wholesale: whatever was there
//! before is removed first, so a retry after a failed run starts clean.

mod build_deps;
mod cmake;
mod dune;
mod llvm;
mod ocaml;
mod opam;

pub use build_deps::AcquireBuildDeps;
pub use cmake::AcquireCmake;
pub use dune::AcquireDune;
pub use llvm::AcquireLlvm;
pub use ocaml::AcquireOcaml;
pub use opam::AcquireOpam;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::Platform;
use super::archive::extract_archive;
use super::download::download_file;
use super::engine::Routines;
use super::hermetic::say;
use super::manifest::Tool;
use super::paths::LocalPaths;
use super::verify::verify_checksum;
use crate::errors::TenjinError;

impl Routines {
    /// The real acquisition routines for `platform`.
    #[must_use]
    pub fn standard(platform: Platform) -> Self {
        Self::new()
            .with(Tool::BuildDeps, AcquireBuildDeps::new(platform))
            .with(Tool::Llvm, AcquireLlvm::new(platform))
            .with(Tool::Cmake, AcquireCmake::new(platform))
            .with(Tool::Opam, AcquireOpam::new(platform))
            .with(Tool::Ocaml, AcquireOcaml::new(platform))
            .with(Tool::Dune, AcquireDune::new(platform))
    }
}

fn local_paths(localdir: &Path) -> LocalPaths {
    LocalPaths::with_root(localdir.to_path_buf())
}

/// The last path segment of a URL.
fn artifact_name(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("URL has no file name: {url}"))
}

/// Removes a directory tree, treating a missing directory as already removed.
fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result.with_context(|| format!("Failed to remove {}", dir.display())),
    }
}

/// Removes a file or symlink, treating a missing one as already removed.
fn remove_file_if_exists(file: &Path) -> Result<()> {
    match std::fs::remove_file(file) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result.with_context(|| format!("Failed to remove {}", file.display())),
    }
}

/// Downloads a tarball as `file_name`, optionally verifies it, and unpacks it
/// into a freshly emptied `target`. The tarball is deleted afterwards.
async fn fetch_and_extract(
    paths: &LocalPaths,
    tool: &str,
    url: &str,
    file_name: &str,
    target: &Path,
    sha256: Option<&str>,
) -> Result<PathBuf> {
    let archive = paths.download_path(file_name);

    say(tool, format!("Downloading {url}..."));
    download_file(url, &archive).await?;

    if let Some(expected) = sha256 {
        say(tool, "Verifying checksum...");
        verify_checksum(&archive, expected)?;
    }

    remove_dir_if_exists(target)?;
    say(tool, format!("Extracting to {}...", target.display()));
    let extracted = extract_archive(&archive, target);
    remove_file_if_exists(&archive)?;
    extracted
}

/// Finds the version token following `marker` in a tool's output,
/// e.g. `18.1.8` in `clang version 18.1.8 (https://...)`.
fn version_after(output: &str, marker: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once(marker)?;
        rest.split_whitespace().next().map(str::to_string)
    })
}

fn require_version(key: &str, output: &str, marker: &str) -> Result<String> {
    version_after(output, marker).ok_or_else(|| {
        TenjinError::acquisition(key, format!("no `{marker}` in tool output: {output:?}")).into()
    })
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(original, link).with_context(|| {
        format!(
            "Failed to link {} -> {}",
            link.display(),
            original.display()
        )
    })
}

#[cfg(not(unix))]
fn symlink(_original: &Path, link: &Path) -> Result<()> {
    anyhow::bail!("cannot create {}: symlinks need a Unix host", link.display())
}
