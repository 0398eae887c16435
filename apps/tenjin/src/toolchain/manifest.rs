//! Desired tool versions.
//!
//! The keys of the manifest are not command names or file names, just labels
//! for the things being tracked. Bumping a value here makes the next
//! provisioning run re-acquire that tool.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;

use super::engine::ComparisonRule;
use crate::errors::TenjinError;

/// Compiled-in desired specifiers, keyed by tool key.
const WANT: [(&str, &str); 6] = [
    ("10j-build-deps", "rev-03d4672c4"),
    ("10j-cmake", "3.31.7"),
    ("10j-dune", "3.18.0"),
    ("10j-llvm", "18.1.8"),
    ("10j-ocaml", "5.2.0"),
    ("10j-opam", "2.3.0"),
];

/// A published build-deps bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildDepsBundle {
    /// The revision label recorded for the bundle.
    pub revision: &'static str,
    /// The only platform the bundle is built for.
    pub platform: super::Platform,
    /// Where the tarball is downloaded from.
    pub url: &'static str,
    /// SHA256 of the tarball, for mirrors that publish one.
    pub sha256: Option<&'static str>,
}

/// Build-deps bundles by revision. The `10j-build-deps` specifier must name
/// one of these.
// TODO: pin the sha256 of rev-03d4672c4 once the mirror publishes a digest.
pub const BUILD_DEPS_BUNDLES: [BuildDepsBundle; 1] = [BuildDepsBundle {
    revision: "rev-03d4672c4",
    platform: super::Platform::LinuxX64,
    url: "https://images.aarno-labs.com/amp/ben/xj-build-deps_linux-x86_64.tar.xz",
    sha256: None,
}];

/// Subdirectory of the LLVM root that holds the sysroot.
pub const SYSROOT_NAME: &str = "sysroot";

/// SHA256 of the Debian bullseye sysroot tarball, per sysroot architecture.
///
/// The hash doubles as the object name on the mirror.
pub const BULLSEYE_SYSROOT_SHA256: [(&str, &str); 3] = [
    (
        "x86_64",
        "36a164623d03f525e3dfb783a5e9b8a00e98e1ddd2b5cff4e449bd016dd27e50",
    ),
    (
        "arm64",
        "2f915d821eec27515c0c6d21b69898e23762908d8d7ccc1aa2a8f5f25e8b7e18",
    ),
    (
        "armhf",
        "47b3a0b161ca011b2b33d4fc1ef6ef269b8208a0b7e4c900700c345acdfd1814",
    ),
];

/// Looks up the sysroot tarball hash for an architecture.
#[must_use]
pub fn sysroot_sha256(arch: &str) -> Option<&'static str> {
    BULLSEYE_SYSROOT_SHA256
        .iter()
        .find(|(a, _)| *a == arch)
        .map(|(_, sha)| *sha)
}

/// A provisionable tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    /// Prebuilt bundle of miscellaneous build dependencies.
    BuildDeps,
    /// Clang + LLVM with a pinned sysroot.
    Llvm,
    /// CMake.
    Cmake,
    /// The opam package manager and its isolated root.
    Opam,
    /// The OCaml compiler, as an opam switch.
    Ocaml,
    /// Dune, installed into the switch.
    Dune,
}

impl Tool {
    /// Provisioning order used by `ensure_all`.
    pub const PROVISION_ORDER: [Tool; 6] = [
        Tool::BuildDeps,
        Tool::Llvm,
        Tool::Cmake,
        Tool::Opam,
        Tool::Ocaml,
        Tool::Dune,
    ];

    /// The key under which this tool is tracked.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::BuildDeps => "10j-build-deps",
            Self::Llvm => "10j-llvm",
            Self::Cmake => "10j-cmake",
            Self::Opam => "10j-opam",
            Self::Ocaml => "10j-ocaml",
            Self::Dune => "10j-dune",
        }
    }

    /// How an installed specifier is judged against the desired one.
    ///
    /// The build-deps bundle is a specific verified artifact; there is no
    /// meaningful "newer" bundle.
    #[must_use]
    pub fn rule(self) -> ComparisonRule {
        match self {
            Self::BuildDeps => ComparisonRule::ContentHash,
            Self::Llvm | Self::Cmake | Self::Opam | Self::Ocaml | Self::Dune => {
                ComparisonRule::Version
            }
        }
    }

    /// Tools that must be provisioned before this one, in order.
    #[must_use]
    pub fn prerequisites(self) -> &'static [Tool] {
        match self {
            Self::Ocaml => &[Tool::Opam],
            Self::Dune => &[Tool::Opam, Tool::Ocaml],
            Self::BuildDeps | Self::Llvm | Self::Cmake | Self::Opam => &[],
        }
    }

    /// Short human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::BuildDeps => "build-deps",
            Self::Llvm => "llvm",
            Self::Cmake => "cmake",
            Self::Opam => "opam",
            Self::Ocaml => "ocaml",
            Self::Dune => "dune",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable mapping from tool key to desired specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredVersionManifest {
    wants: BTreeMap<String, String>,
}

impl DesiredVersionManifest {
    /// The manifest compiled into this binary.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_pairs(WANT)
    }

    /// Builds a manifest from `(key, specifier)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            wants: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The desired specifier for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TenjinError::UnknownKey`] if the manifest has no such key.
    pub fn desired(&self, key: &str) -> Result<&str> {
        self.wants
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| TenjinError::unknown_key(key).into())
    }

    /// The desired specifier for a tool.
    ///
    /// # Errors
    ///
    /// Returns [`TenjinError::UnknownKey`] if the manifest does not track the tool.
    pub fn desired_for(&self, tool: Tool) -> Result<&str> {
        self.desired(tool.key())
    }
}

/// The cache key for the OCaml toolchain: `<System>;<machine>;ocaml-X;opam-Y;dune-Z`.
///
/// CI caches the opam root under this key.
///
/// # Errors
///
/// Returns an error if the manifest lacks one of the OCaml tools.
pub fn ocaml_cache_key(
    manifest: &DesiredVersionManifest,
    platform: super::Platform,
) -> Result<String> {
    let mut parts = vec![platform.system().to_string(), platform.machine().to_string()];
    for tool in [Tool::Ocaml, Tool::Opam, Tool::Dune] {
        parts.push(format!("{}-{}", tool.name(), manifest.desired_for(tool)?));
    }
    Ok(parts.join(";"))
}
