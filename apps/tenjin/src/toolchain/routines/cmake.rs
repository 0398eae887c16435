//! CMake from the Kitware release binaries.

use std::path::Path;

use anyhow::Result;
use futures_util::future::BoxFuture;
use tokio::process::Command;

use super::{artifact_name, fetch_and_extract, local_paths, require_version};
use crate::toolchain::Platform;
use crate::toolchain::engine::Acquire;
use crate::toolchain::hermetic::{capture_stdout, say};

const KEY: &str = "10j-cmake";

/// Acquires CMake into `cmake/`.
pub struct AcquireCmake {
    platform: Platform,
}

impl AcquireCmake {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    async fn install(&self, localdir: &Path, version: &str) -> Result<()> {
        let url = cmake_url(self.platform, version);
        let paths = local_paths(localdir);
        say("cmake", "This will take a minute...");
        fetch_and_extract(
            &paths,
            "cmake",
            &url,
            &artifact_name(&url)?,
            &paths.cmake_root(),
            None,
        )
        .await?;
        Ok(())
    }

    async fn cmake_version(&self, localdir: &Path) -> Result<String> {
        let cmake = local_paths(localdir).cmake_bin(self.platform).join("cmake");
        let mut cmd = Command::new(cmake);
        cmd.arg("--version");
        let output = capture_stdout(cmd).await?;
        require_version(KEY, &output, "cmake version")
    }
}

impl Acquire for AcquireCmake {
    fn acquire<'a>(&'a self, localdir: &'a Path, desired: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.install(localdir, desired))
    }

    fn installed_specifier<'a>(
        &'a self,
        localdir: &'a Path,
        _desired: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.cmake_version(localdir))
    }
}

fn cmake_url(platform: Platform, v: &str) -> String {
    let tag = match platform {
        Platform::LinuxX64 => "linux-x86_64",
        Platform::LinuxArm64 => "linux-aarch64",
        Platform::MacosX64 | Platform::MacosArm64 => "macos-universal",
    };
    format!("https://github.com/Kitware/CMake/releases/download/v{v}/cmake-{v}-{tag}.tar.gz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_per_platform() {
        let base = "https://github.com/Kitware/CMake/releases/download/v3.31.7";
        assert_eq!(
            cmake_url(Platform::LinuxX64, "3.31.7"),
            format!("{base}/cmake-3.31.7-linux-x86_64.tar.gz")
        );
        assert_eq!(
            cmake_url(Platform::LinuxArm64, "3.31.7"),
            format!("{base}/cmake-3.31.7-linux-aarch64.tar.gz")
        );
        for mac in [Platform::MacosX64, Platform::MacosArm64] {
            assert_eq!(
                cmake_url(mac, "3.31.7"),
                format!("{base}/cmake-3.31.7-macos-universal.tar.gz")
            );
        }
    }

    #[tokio::test]
    async fn missing_cmake_has_no_version() {
        let temp = assert_fs::TempDir::new().unwrap();
        let routine = AcquireCmake::new(Platform::LinuxX64);
        assert!(
            routine
                .installed_specifier(temp.path(), "3.31.7")
                .await
                .is_err()
        );
    }
}
