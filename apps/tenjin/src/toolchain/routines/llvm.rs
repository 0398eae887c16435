//! Clang + LLVM, with a pinned Debian bullseye sysroot on Linux.
//!
//! After unpacking, `bin/` gains `<tool>.cfg` files pointing clang at the
//! sysroot, and binutils-style names (`ar`, `nm`, `ld`, ...) for the LLVM
//! equivalents.

use std::path::Path;

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::debug;

use super::{artifact_name, fetch_and_extract, local_paths, require_version, symlink};
use crate::toolchain::Platform;
use crate::toolchain::engine::Acquire;
use crate::toolchain::hermetic::{capture_stdout, say};
use crate::toolchain::manifest::{SYSROOT_NAME, sysroot_sha256};

const KEY: &str = "10j-llvm";

const SYSROOT_MIRROR: &str = "https://commondatastorage.googleapis.com/chrome-linux-sysroot";

/// Drivers that read a `<name>.cfg` next to themselves.
const CONFIGURED_DRIVERS: [&str; 4] = ["clang", "clang++", "cc", "c++"];

/// Binutils names provided as `llvm-<name>`. LLVM has no `ranlib` or `size`.
const BINUTILS: [&str; 8] = [
    "ar", "as", "nm", "objcopy", "objdump", "readelf", "strings", "strip",
];

/// `(target, alias)` pairs for the compiler and linker.
const ALIASES: [(&str, &str); 3] = [("clang", "cc"), ("clang++", "c++"), ("lld", "ld")];

/// Acquires Clang + LLVM into `xj-llvm/`.
pub struct AcquireLlvm {
    platform: Platform,
}

impl AcquireLlvm {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    async fn install(&self, localdir: &Path, version: &str) -> Result<()> {
        let url = llvm_url(self.platform, version)?;
        let paths = local_paths(localdir);
        let root = paths.llvm_root();
        let bin = paths.llvm_bin();

        say("llvm", "This will take a minute...");
        fetch_and_extract(&paths, "llvm", &url, &artifact_name(&url)?, &root, None).await?;

        if let Some(arch) = sysroot_arch(self.platform) {
            let sha256 = sysroot_sha256(arch)
                .ok_or_else(|| self.platform.unsupported("the bullseye sysroot"))?;
            say("sysroot", "Downloading and unpacking sysroot tarball...");
            fetch_and_extract(
                &paths,
                "sysroot",
                &format!("{SYSROOT_MIRROR}/{sha256}"),
                "tenjin-sysroot.tar.xz",
                &root.join(SYSROOT_NAME),
                Some(sha256),
            )
            .await?;
            write_driver_configs(&bin)?;
        }

        link_tool_aliases(&bin)?;
        Ok(())
    }

    async fn clang_version(localdir: &Path) -> Result<String> {
        let clang = local_paths(localdir).llvm_bin().join("clang");
        let mut cmd = Command::new(clang);
        cmd.arg("--version");
        let output = capture_stdout(cmd).await?;
        require_version(KEY, &output, "clang version")
    }
}

impl Acquire for AcquireLlvm {
    fn acquire<'a>(&'a self, localdir: &'a Path, desired: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.install(localdir, desired))
    }

    fn installed_specifier<'a>(
        &'a self,
        localdir: &'a Path,
        _desired: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(Self::clang_version(localdir))
    }
}

fn llvm_url(platform: Platform, v: &str) -> Result<String> {
    let releases = format!("https://github.com/llvm/llvm-project/releases/download/llvmorg-{v}");
    match platform {
        Platform::LinuxX64 => Ok(format!(
            "https://images.aarno-labs.com/amp/ben/LLVM-{v}-Linux-x86_64.tar.xz"
        )),
        Platform::LinuxArm64 => Ok(format!(
            "{releases}/clang+llvm-{v}-aarch64-linux-gnu.tar.xz"
        )),
        Platform::MacosArm64 => Ok(format!(
            "{releases}/clang+llvm-{v}-arm64-apple-macos11.tar.xz"
        )),
        Platform::MacosX64 => Err(platform.unsupported("llvm").into()),
    }
}

/// Sysroot architecture name, for platforms that use one.
fn sysroot_arch(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::LinuxX64 => Some("x86_64"),
        Platform::LinuxArm64 => Some("arm64"),
        Platform::MacosX64 | Platform::MacosArm64 => None,
    }
}

fn write_driver_configs(bin: &Path) -> Result<()> {
    for driver in CONFIGURED_DRIVERS {
        let cfg = bin.join(format!("{driver}.cfg"));
        std::fs::write(&cfg, format!("--sysroot <CFGDIR>/../{SYSROOT_NAME}\n"))
            .with_context(|| format!("Failed to write {}", cfg.display()))?;
    }
    Ok(())
}

/// Creates relative symlinks for binutils names and compiler aliases,
/// leaving any existing file of that name alone.
fn link_tool_aliases(bin: &Path) -> Result<()> {
    let binutils = BINUTILS.map(|name| (format!("llvm-{name}"), name.to_string()));
    let aliases = ALIASES.map(|(target, alias)| (target.to_string(), alias.to_string()));

    for (target, alias) in binutils.into_iter().chain(aliases) {
        let link = bin.join(&alias);
        if link.symlink_metadata().is_ok() {
            debug!("keeping existing {}", link.display());
            continue;
        }
        symlink(Path::new(&target), &link)?;
    }
    Ok(())
}
