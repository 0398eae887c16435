//! Platform detection for provisioning.
//!
//! Every acquisition routine selects its download by matching on [`Platform`].
//! Each routine keeps its own table and fails with
//! [`TenjinError::UnsupportedPlatform`] for combinations it has no artifact
//! for, so a wrong binary is never silently accepted.
//!
//! ## Supported Platforms
//!
//! - Linux `x86_64` (`linux-x86_64`)
//! - Linux `aarch64` (`linux-arm64`)
//! - macOS `x86_64` (`macos-x86_64`)
//! - macOS ARM64 (`macos-arm64`)

use anyhow::Result;
use std::fmt;

use crate::errors::TenjinError;

/// A supported operating system and architecture combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Linux on `x86_64`
    LinuxX64,
    /// Linux on `aarch64`
    LinuxArm64,
    /// macOS on `x86_64`
    MacosX64,
    /// macOS on Apple Silicon
    MacosArm64,
}

impl Platform {
    /// Detects the platform the binary is running on.
    ///
    /// # Errors
    ///
    /// Returns [`TenjinError::UnsupportedPlatform`] if the current OS/architecture
    /// combination is not one of the supported variants.
    pub fn detect() -> Result<Self> {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Maps Rust's `target_os`/`target_arch` names to a platform.
    ///
    /// # Errors
    ///
    /// Returns [`TenjinError::UnsupportedPlatform`] for unknown combinations.
    pub fn from_parts(os: &str, arch: &str) -> Result<Self> {
        match (os, arch) {
            ("linux", "x86_64") => Ok(Self::LinuxX64),
            ("linux", "aarch64") => Ok(Self::LinuxArm64),
            ("macos", "x86_64") => Ok(Self::MacosX64),
            ("macos", "aarch64") => Ok(Self::MacosArm64),
            _ => Err(TenjinError::unsupported_platform("tenjin", os, arch).into()),
        }
    }

    /// Returns the platform identifier used in log messages.
    #[must_use = "returns the platform string without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinuxX64 => "linux-x86_64",
            Self::LinuxArm64 => "linux-arm64",
            Self::MacosX64 => "macos-x86_64",
            Self::MacosArm64 => "macos-arm64",
        }
    }

    /// Returns the OS name as reported by `uname -s`.
    #[must_use = "returns the OS string without side effects"]
    pub fn system(self) -> &'static str {
        match self {
            Self::LinuxX64 | Self::LinuxArm64 => "Linux",
            Self::MacosX64 | Self::MacosArm64 => "Darwin",
        }
    }

    /// Returns the machine name as reported by `uname -m`.
    #[must_use = "returns the machine string without side effects"]
    pub fn machine(self) -> &'static str {
        match self {
            Self::LinuxX64 | Self::MacosX64 => "x86_64",
            Self::LinuxArm64 => "aarch64",
            Self::MacosArm64 => "arm64",
        }
    }

    /// Returns whether this platform is Linux.
    #[must_use = "returns platform check result without side effects"]
    pub fn is_linux(self) -> bool {
        matches!(self, Self::LinuxX64 | Self::LinuxArm64)
    }

    /// Builds the `UnsupportedPlatform` error for a tool that has no artifact here.
    #[must_use]
    pub fn unsupported(self, tool: &str) -> TenjinError {
        TenjinError::unsupported_platform(tool, self.system(), self.machine())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
