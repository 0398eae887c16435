//! Path management for the local installation root.
//!
//! The local root is `<repo root>/_local`, which can be overridden by setting
//! the `TENJIN_LOCALDIR` environment variable. The repo root is the nearest
//! ancestor of the working directory that contains `cli/sh/provision.sh`.
//!
//! ## Directory Structure
//!
//! ```text
//! _local/                          # Local root (or TENJIN_LOCALDIR)
//!   installed-versions.v1.json     # Installed version store
//!   opam                           # opam binary (or symlink to a system opam)
//!   opamroot/                      # Isolated opam root
//!     tenjin/                      # The `tenjin` switch
//!   xj-llvm/                       # Clang + LLVM
//!     bin/{clang,cc,ld,...,clang.cfg}
//!     sysroot/                     # Debian bullseye sysroot (Linux)
//!   xj-build-deps/                 # Misc prebuilt build dependencies
//!   cmake/                         # CMake release
//!   downloads/                     # In-flight downloads
//! ```
//!
//! Only one provisioning process may operate on a local root at a time; no
//! locking is performed.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::Platform;
use crate::errors::TenjinError;

/// Environment variable to override the local installation root.
pub const TENJIN_LOCALDIR_ENV: &str = "TENJIN_LOCALDIR";

/// File that marks the root of the Tenjin repository.
const REPO_ROOT_MARKER: [&str; 3] = ["cli", "sh", "provision.sh"];

/// Name of the installed version store file.
const STORE_FILE: &str = "installed-versions.v1.json";

/// Name of the opam switch Tenjin creates.
pub const OPAM_SWITCH: &str = "tenjin";

/// Paths inside a local installation root.
#[derive(Debug, Clone)]
pub struct LocalPaths {
    /// The local installation root.
    pub root: PathBuf,
    /// Directory for in-flight downloads.
    pub downloads: PathBuf,
}

impl LocalPaths {
    /// Resolves the local root from `TENJIN_LOCALDIR` or the enclosing repo.
    ///
    /// # Errors
    ///
    /// Returns [`TenjinError::RepoRootNotFound`] if the variable is unset and no
    /// ancestor of the current directory is a Tenjin checkout.
    pub fn discover() -> Result<Self> {
        if let Some(dir) = std::env::var_os(TENJIN_LOCALDIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(dir)));
        }
        let cwd = std::env::current_dir()?;
        let repo_root = find_repo_root(&cwd)?;
        Ok(Self::with_root(repo_root.join("_local")))
    }

    /// Creates a new `LocalPaths` with a specific root directory.
    #[must_use = "returns new paths instance without side effects"]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            downloads: root.join("downloads"),
            root,
        }
    }

    /// Path to the installed version store.
    #[must_use = "returns the path without side effects"]
    pub fn store_file(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    /// Clang + LLVM installation directory.
    #[must_use = "returns the path without side effects"]
    pub fn llvm_root(&self) -> PathBuf {
        self.root.join("xj-llvm")
    }

    /// Directory holding the LLVM binaries and their config files.
    #[must_use = "returns the path without side effects"]
    pub fn llvm_bin(&self) -> PathBuf {
        self.llvm_root().join("bin")
    }

    /// Prebuilt build-dependency bundle directory.
    #[must_use = "returns the path without side effects"]
    pub fn build_deps(&self) -> PathBuf {
        self.root.join("xj-build-deps")
    }

    /// CMake installation directory.
    #[must_use = "returns the path without side effects"]
    pub fn cmake_root(&self) -> PathBuf {
        self.root.join("cmake")
    }

    /// Directory containing the `cmake` executable for a platform.
    ///
    /// macOS releases ship as an application bundle.
    #[must_use = "returns the path without side effects"]
    pub fn cmake_bin(&self, platform: Platform) -> PathBuf {
        if platform.is_linux() {
            self.cmake_root().join("bin")
        } else {
            self.cmake_root().join("CMake.app/Contents/bin")
        }
    }

    /// The local opam binary (possibly a symlink to a system opam).
    #[must_use = "returns the path without side effects"]
    pub fn opam(&self) -> PathBuf {
        self.root.join("opam")
    }

    /// The isolated opam root.
    #[must_use = "returns the path without side effects"]
    pub fn opamroot(&self) -> PathBuf {
        self.root.join("opamroot")
    }

    /// Binaries installed into the Tenjin opam switch.
    #[must_use = "returns the path without side effects"]
    pub fn switch_bin(&self) -> PathBuf {
        self.opamroot().join(OPAM_SWITCH).join("bin")
    }

    /// Returns the path for a downloaded file.
    #[must_use = "returns the path without side effects"]
    pub fn download_path(&self, filename: &str) -> PathBuf {
        self.downloads.join(filename)
    }
}

/// Walks up from `start` to the nearest directory containing `cli/sh/provision.sh`.
///
/// # Errors
///
/// Returns [`TenjinError::RepoRootNotFound`] when the filesystem root is reached.
pub fn find_repo_root(start: &Path) -> Result<PathBuf> {
    let marker: PathBuf = REPO_ROOT_MARKER.iter().collect();
    start
        .ancestors()
        .find(|dir| dir.join(&marker).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            TenjinError::RepoRootNotFound {
                start: start.to_path_buf(),
            }
            .into()
        })
}
