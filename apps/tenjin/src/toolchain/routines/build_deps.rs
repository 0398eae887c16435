//! The prebuilt build-dependency bundle (bubblewrap, pkg-config, and friends).

use std::path::Path;

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use tracing::debug;

use super::{artifact_name, fetch_and_extract, local_paths};
use crate::errors::TenjinError;
use crate::toolchain::Platform;
use crate::toolchain::engine::Acquire;
use crate::toolchain::hermetic::say;
use crate::toolchain::manifest::{BUILD_DEPS_BUNDLES, BuildDepsBundle};

const KEY: &str = "10j-build-deps";

/// Written into the bundle directory once a revision is fully installed.
const REVISION_MARKER: &str = ".tenjin-revision";

/// Install prefix the bundle was built with. It is padded so that any
/// realistic install location fits in its place.
const BUILD_PREFIX: &str = "/opt/xj-build-deps/________________________________________________________________________________________________________________";

/// Acquires the build-deps bundle for the requested revision.
pub struct AcquireBuildDeps {
    platform: Platform,
    bundles: Vec<BuildDepsBundle>,
}

impl AcquireBuildDeps {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self::with_bundles(platform, BUILD_DEPS_BUNDLES.to_vec())
    }

    #[must_use]
    pub fn with_bundles(platform: Platform, bundles: Vec<BuildDepsBundle>) -> Self {
        Self { platform, bundles }
    }

    fn bundle(&self, revision: &str) -> Result<&BuildDepsBundle> {
        if !self.supported() {
            return Err(self.platform.unsupported("build-deps").into());
        }
        self.bundles
            .iter()
            .find(|b| b.revision == revision && b.platform == self.platform)
            .ok_or_else(|| {
                TenjinError::acquisition(KEY, format!("no bundle is published for {revision}"))
                    .into()
            })
    }

    async fn install(&self, localdir: &Path, revision: &str) -> Result<()> {
        let bundle = self.bundle(revision)?;
        let paths = local_paths(localdir);
        let target = paths.build_deps();

        say("builddeps", "This will take a jiffy...");
        fetch_and_extract(
            &paths,
            "builddeps",
            bundle.url,
            &artifact_name(bundle.url)?,
            &target,
            bundle.sha256,
        )
        .await?;

        patch_pkg_config(&target)?;
        let marker = target.join(REVISION_MARKER);
        std::fs::write(&marker, format!("{revision}\n"))
            .with_context(|| format!("Failed to write {}", marker.display()))?;
        say("builddeps", "Build dependencies are in place.");
        Ok(())
    }
}

impl Acquire for AcquireBuildDeps {
    fn acquire<'a>(&'a self, localdir: &'a Path, desired: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.install(localdir, desired))
    }

    fn installed_specifier<'a>(
        &'a self,
        localdir: &'a Path,
        _desired: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { installed_revision(&local_paths(localdir).build_deps()) })
    }

    fn supported(&self) -> bool {
        self.bundles.iter().any(|b| b.platform == self.platform)
    }
}

/// The revision recorded in an installed bundle.
fn installed_revision(bundle: &Path) -> Result<String> {
    let marker = bundle.join(REVISION_MARKER);
    match std::fs::read_to_string(&marker) {
        Ok(revision) if !revision.trim().is_empty() => Ok(revision.trim().to_string()),
        Ok(_) => {
            Err(TenjinError::acquisition(KEY, format!("{} is empty", marker.display())).into())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TenjinError::acquisition(
            KEY,
            format!("no installed revision in {}", bundle.display()),
        )
        .into()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", marker.display())),
    }
}

/// Points the bundled pkg-config at the directory it was unpacked into.
fn patch_pkg_config(bundle: &Path) -> Result<()> {
    let pkg_config = bundle.join("bin").join("pkg-config");
    if !pkg_config.is_file() {
        debug!("no pkg-config in {}", bundle.display());
        return Ok(());
    }

    let mut bytes = std::fs::read(&pkg_config)
        .with_context(|| format!("Failed to read {}", pkg_config.display()))?;
    let new_prefix = bundle.to_string_lossy();
    let patched = patch_embedded_prefix(&mut bytes, BUILD_PREFIX.as_bytes(), new_prefix.as_bytes())?;
    if patched > 0 {
        std::fs::write(&pkg_config, &bytes)
            .with_context(|| format!("Failed to write {}", pkg_config.display()))?;
        debug!("patched {patched} prefix occurrences in {}", pkg_config.display());
    }
    Ok(())
}

/// Replaces every occurrence of `old` in `data` with `new`, left-padded with
/// `/` to the same length so offsets in the binary stay valid.
///
/// Returns the number of occurrences replaced; zero is not an error.
///
/// # Errors
///
/// Returns [`TenjinError::Acquisition`] if `new` is longer than `old`.
pub fn patch_embedded_prefix(data: &mut [u8], old: &[u8], new: &[u8]) -> Result<usize> {
    if new.len() > old.len() {
        return Err(TenjinError::acquisition(
            KEY,
            format!(
                "install path {} is longer than the {}-byte build prefix",
                String::from_utf8_lossy(new),
                old.len()
            ),
        )
        .into());
    }
    if old.is_empty() {
        return Ok(0);
    }

    let mut replacement = vec![b'/'; old.len() - new.len()];
    replacement.extend_from_slice(new);

    let mut count = 0;
    let mut i = 0;
    while i + old.len() <= data.len() {
        if &data[i..i + old.len()] == old {
            data[i..i + old.len()].copy_from_slice(&replacement);
            count += 1;
            i += old.len();
        } else {
            i += 1;
        }
    }
    Ok(count)
}
