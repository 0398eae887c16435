//! Archive extraction for provisioned tarballs.
//!
//! Only compressed tarballs are supported (`.tar.gz`, `.tgz`, `.tar.xz`,
//! `.txz`, `.tar.bz2`). The extraction target is chosen as follows:
//!
//! - a missing or empty target directory receives the contents directly;
//! - a non-empty target receives them in a fresh `<basename>/` subdirectory,
//!   so pre-existing files are never mixed with the archive's contents.
//!
//! Archives conventionally wrap everything in one top-level folder named
//! after the archive. When the extraction directory ends up containing only
//! that folder, its contents are moved up one level (exactly once).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;
use xz2::read::XzDecoder;

use crate::errors::TenjinError;

/// Compression applied to a tarball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// gzip (`.tar.gz`, `.tgz`)
    Gzip,
    /// xz (`.tar.xz`, `.txz`)
    Xz,
    /// bzip2 (`.tar.bz2`)
    Bzip2,
}

/// Recognized suffixes, longest first.
const SUFFIXES: [(&str, Compression); 5] = [
    (".tar.bz2", Compression::Bzip2),
    (".tar.gz", Compression::Gzip),
    (".tar.xz", Compression::Xz),
    (".tgz", Compression::Gzip),
    (".txz", Compression::Xz),
];

/// Splits an archive file name into its base name and compression.
///
/// `LLVM-18.1.8-Linux-x86_64.tar.xz` becomes `("LLVM-18.1.8-Linux-x86_64", Xz)`.
///
/// # Errors
///
/// Returns [`TenjinError::UnknownArchiveFormat`] for any other suffix.
pub fn classify(archive_path: &Path) -> Result<(String, Compression)> {
    let name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TenjinError::unknown_archive_format(archive_path))?;

    SUFFIXES
        .iter()
        .find_map(|(suffix, compression)| {
            name.strip_suffix(suffix)
                .filter(|base| !base.is_empty())
                .map(|base| (base.to_string(), *compression))
        })
        .ok_or_else(|| TenjinError::unknown_archive_format(archive_path).into())
}

/// Extracts a compressed tarball into (or within) `target_dir`.
///
/// Returns the directory that holds the unpacked contents: `target_dir`
/// itself, or `target_dir/<basename>` if `target_dir` was not empty.
///
/// # Errors
///
/// Returns an error if:
/// - The suffix is not a supported compressed-tar suffix
/// - The archive cannot be opened or decoded
/// - An entry has an absolute path or a `..` component
/// - Directory creation, unpacking, or flattening fails
pub fn extract_archive(archive_path: &Path, target_dir: &Path) -> Result<PathBuf> {
    let (basename, compression) = classify(archive_path)?;

    let final_dir = if is_non_empty_dir(target_dir)? {
        target_dir.join(&basename)
    } else {
        target_dir.to_path_buf()
    };

    std::fs::create_dir_all(&final_dir)
        .with_context(|| format!("Failed to create directory: {}", final_dir.display()))?;

    debug!(
        "extracting {} into {}",
        archive_path.display(),
        final_dir.display()
    );

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let reader = BufReader::new(file);
    let decoder: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(reader)),
        Compression::Xz => Box::new(XzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
    };
    unpack_tar(Archive::new(decoder), archive_path, &final_dir)?;

    flatten_single_root(&final_dir, &basename)?;

    Ok(final_dir)
}

fn unpack_tar<R: Read>(mut archive: Archive<R>, archive_path: &Path, dest_dir: &Path) -> Result<()> {
    for entry in archive
        .entries()
        .with_context(|| format!("Failed to read tar entries: {}", archive_path.display()))?
    {
        let mut entry = entry
            .with_context(|| format!("Failed to read tar entry: {}", archive_path.display()))?;

        let entry_path = entry
            .path()
            .with_context(|| "Failed to get entry path")?
            .into_owned();

        if entry_path.is_absolute()
            || entry_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            bail!(
                "Refusing to extract path with parent directory or absolute reference: {}",
                entry_path.display()
            );
        }

        entry
            .unpack_in(dest_dir)
            .with_context(|| format!("Failed to extract: {}", entry_path.display()))?;
    }

    Ok(())
}

/// Moves the contents of `dir/<basename>/` up into `dir` when that folder is
/// the only entry of `dir`.
fn flatten_single_root(dir: &Path, basename: &str) -> Result<()> {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let [only] = entries.as_slice() else {
        return Ok(());
    };
    if only.file_name() != basename || !only.file_type()?.is_dir() {
        return Ok(());
    }

    // Park the wrapper under a different name first: it may itself contain an
    // entry called `<basename>`.
    let parked = dir.join(format!(".{basename}.flatten"));
    std::fs::rename(only.path(), &parked)
        .with_context(|| format!("Failed to rename {}", only.path().display()))?;

    for child in std::fs::read_dir(&parked)
        .with_context(|| format!("Failed to read directory: {}", parked.display()))?
    {
        let child = child?;
        let dest = dir.join(child.file_name());
        std::fs::rename(child.path(), &dest).with_context(|| {
            format!(
                "Failed to move {} to {}",
                child.path().display(),
                dest.display()
            )
        })?;
    }

    std::fs::remove_dir(&parked)
        .with_context(|| format!("Failed to remove directory: {}", parked.display()))?;
    debug!("flattened {basename}/ into {}", dir.display());
    Ok(())
}

fn is_non_empty_dir(path: &Path) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    let mut entries = std::fs::read_dir(path)
        .with_context(|| format!("Failed to read directory: {}", path.display()))?;
    Ok(entries.next().is_some())
}

/// Sets executable permission bits (0o755) on a file.
///
/// # Errors
///
/// Returns an error if the metadata cannot be read or permissions cannot be set.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .with_context(|| format!("Failed to get metadata: {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to set permissions: {}", path.display()))
}
