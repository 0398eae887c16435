//! Persisted record of installed tool versions.
//!
//! The record is a flat JSON object from tool key to installed specifier
//! (a version string or a content hash), pretty-printed with sorted keys so
//! it diffs cleanly. It is loaded once per process and written back
//! synchronously after every change. The in-memory map is only updated once
//! the new contents are on disk, so the store never reports something the
//! file does not.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::engine::{ComparisonRule, InstallationState, parse_version};
use super::manifest::{DesiredVersionManifest, Tool};
use crate::errors::TenjinError;

/// Installed tool versions, backed by a JSON file.
#[derive(Debug)]
pub struct InstalledVersionStore {
    path: PathBuf,
    records: BTreeMap<String, String>,
}

impl InstalledVersionStore {
    /// Loads the store from `path`.
    ///
    /// A missing file means nothing is installed yet. An unreadable or
    /// malformed file is treated the same way (everything is re-provisioned).
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(records) => records,
                Err(e) => {
                    warn!(
                        "ignoring malformed version record {}: {e}",
                        path.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("ignoring unreadable version record {}: {e}", path.display());
                BTreeMap::new()
            }
        };
        debug!("loaded {} version records from {}", records.len(), path.display());
        Self { path, records }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the installed specifier for `key`, if any.
    #[must_use]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }

    /// All records, sorted by key.
    #[must_use]
    pub fn records(&self) -> &BTreeMap<String, String> {
        &self.records
    }

    /// Records that `key` is installed at the given version or hash.
    ///
    /// Exactly one of `version` and `hash` must be provided. The file is
    /// rewritten only when the value actually changes. Returns whether a write
    /// happened.
    ///
    /// # Errors
    ///
    /// Returns [`TenjinError::InvalidRecord`] if both or neither of `version`
    /// and `hash` are given, if `version` does not parse, or if `hash` is
    /// empty; returns an I/O error if the file cannot be written.
    pub fn note(&mut self, key: &str, version: Option<&str>, hash: Option<&str>) -> Result<bool> {
        let value = match (version, hash) {
            (Some(v), None) => {
                if parse_version(v).is_none() {
                    return Err(
                        TenjinError::invalid_record(key, format!("not a version: {v:?}")).into(),
                    );
                }
                v
            }
            (None, Some(h)) => {
                if h.trim().is_empty() {
                    return Err(TenjinError::invalid_record(key, "empty hash").into());
                }
                h
            }
            (Some(_), Some(_)) => {
                return Err(
                    TenjinError::invalid_record(key, "both a version and a hash given").into(),
                );
            }
            (None, None) => {
                return Err(
                    TenjinError::invalid_record(key, "neither a version nor a hash given").into(),
                );
            }
        };

        if self.query(key) == Some(value) {
            return Ok(false);
        }

        let mut updated = self.records.clone();
        updated.insert(key.to_string(), value.to_string());
        self.replace(updated)?;
        debug!("noted {key} = {value}");
        Ok(true)
    }

    /// Records an installed version.
    ///
    /// # Errors
    ///
    /// See [`InstalledVersionStore::note`].
    pub fn note_version(&mut self, key: &str, version: &str) -> Result<bool> {
        self.note(key, Some(version), None)
    }

    /// Records an installed content hash.
    ///
    /// # Errors
    ///
    /// See [`InstalledVersionStore::note`].
    pub fn note_hash(&mut self, key: &str, hash: &str) -> Result<bool> {
        self.note(key, None, Some(hash))
    }

    /// Drops the record for `key`, persisting if it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn forget(&mut self, key: &str) -> Result<bool> {
        if !self.records.contains_key(key) {
            return Ok(false);
        }
        let mut updated = self.records.clone();
        updated.remove(key);
        self.replace(updated)?;
        debug!("forgot {key}");
        Ok(true)
    }

    /// Judges the installed state of `key` against the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`TenjinError::UnknownKey`] if the manifest does not define
    /// `key`, and [`TenjinError::InvalidRecord`] if the manifest's specifier
    /// is not a version under the `Version` rule.
    pub fn compatible(
        &self,
        manifest: &DesiredVersionManifest,
        key: &str,
        rule: ComparisonRule,
    ) -> Result<InstallationState> {
        let desired = manifest.desired(key)?;
        if rule == ComparisonRule::Version && parse_version(desired).is_none() {
            return Err(TenjinError::invalid_record(
                key,
                format!("desired specifier {desired:?} is not a version"),
            )
            .into());
        }

        Ok(match self.query(key) {
            None => InstallationState::NotInstalled,
            Some(installed) if rule.satisfied(installed, desired) => InstallationState::VersionOk,
            Some(installed) => InstallationState::Mismatched {
                installed: installed.to_string(),
            },
        })
    }

    /// The installation state of every tool, in provisioning order.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest lacks a tool.
    pub fn states(
        &self,
        manifest: &DesiredVersionManifest,
    ) -> Result<Vec<(Tool, InstallationState)>> {
        Tool::PROVISION_ORDER
            .into_iter()
            .map(|tool| {
                self.compatible(manifest, tool.key(), tool.rule())
                    .map(|state| (tool, state))
            })
            .collect()
    }

    /// Persists `records` and adopts them once the write succeeded.
    fn replace(&mut self, records: BTreeMap<String, String>) -> Result<()> {
        write_records(&self.path, &records)?;
        self.records = records;
        Ok(())
    }
}

/// Writes the records atomically: to a sibling temporary file, then renamed.
fn write_records(path: &Path, records: &BTreeMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut content =
        serde_json::to_string_pretty(records).context("Failed to serialize version records")?;
    content.push('\n');

    let temp = path.with_extension("json.tmp");
    std::fs::write(&temp, content)
        .with_context(|| format!("Failed to write {}", temp.display()))?;
    std::fs::rename(&temp, path)
        .with_context(|| format!("Failed to rename {} to {}", temp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;

    fn store_in(temp: &TempDir) -> InstalledVersionStore {
        InstalledVersionStore::load(temp.path().join("installed-versions.v1.json"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        assert!(store.records().is_empty());
        assert_eq!(store.query("10j-llvm"), None);
    }

    #[test]
    fn malformed_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("installed-versions.v1.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = InstalledVersionStore::load(&path);
        assert!(store.records().is_empty());
    }

    #[test]
    fn note_persists_sorted_pretty_json() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        assert!(store.note_version("10j-opam", "2.3.0").unwrap());
        assert!(store.note_hash("10j-build-deps", "rev-03d4672c4").unwrap());

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            content,
            "{\n  \"10j-build-deps\": \"rev-03d4672c4\",\n  \"10j-opam\": \"2.3.0\"\n}\n"
        );

        let reloaded = InstalledVersionStore::load(store.path());
        assert_eq!(reloaded.query("10j-opam"), Some("2.3.0"));
        assert_eq!(reloaded.records(), store.records());
    }

    #[test]
    fn note_requires_exactly_one_of_version_or_hash() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);

        for (version, hash) in [(Some("1.0.0"), Some("abc")), (None, None)] {
            let err = store.note("tool-x", version, hash).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<TenjinError>(),
                Some(TenjinError::InvalidRecord { .. })
            ));
        }
        assert!(!store.path().exists());
    }

    #[test]
    fn note_rejects_unparseable_version() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);
        assert!(store.note_version("tool-x", "not-a-version").is_err());
        assert_eq!(store.query("tool-x"), None);
    }

    #[test]
    fn unchanged_note_does_not_rewrite() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);
        store.note_version("10j-cmake", "3.31.7").unwrap();
        std::fs::remove_file(store.path()).unwrap();

        assert!(!store.note_version("10j-cmake", "3.31.7").unwrap());
        assert!(!store.path().exists(), "no-op note must not write");
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let temp = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = temp.path().join("installed-versions.v1.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), b"").unwrap();
        let mut store = InstalledVersionStore::load(&path);

        assert!(store.note_version("10j-llvm", "18.1.8").is_err());
        assert_eq!(store.query("10j-llvm"), None);
    }

    #[test]
    fn forget_removes_and_persists() {
        let temp = TempDir::new().unwrap();
        let mut store = store_in(&temp);
        store.note_version("10j-ocaml", "5.2.0").unwrap();
        store.note_version("10j-dune", "3.18.0").unwrap();

        assert!(store.forget("10j-dune").unwrap());
        assert!(!store.forget("10j-dune").unwrap());

        let reloaded = InstalledVersionStore::load(store.path());
        assert_eq!(reloaded.query("10j-dune"), None);
        assert_eq!(reloaded.query("10j-ocaml"), Some("5.2.0"));
    }

    #[test]
    fn compatible_under_version_rule() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("tool-x", "2.0.0")]);
        let mut store = store_in(&temp);

        assert_eq!(
            store
                .compatible(&manifest, "tool-x", ComparisonRule::Version)
                .unwrap(),
            InstallationState::NotInstalled
        );

        store.note_version("tool-x", "1.5.0").unwrap();
        assert_eq!(
            store
                .compatible(&manifest, "tool-x", ComparisonRule::Version)
                .unwrap(),
            InstallationState::Mismatched {
                installed: "1.5.0".to_string()
            }
        );

        for newer_or_equal in ["2.0.0", "2.0", "2.1.3", "10.0.0"] {
            store.note_version("tool-x", newer_or_equal).unwrap();
            assert_eq!(
                store
                    .compatible(&manifest, "tool-x", ComparisonRule::Version)
                    .unwrap(),
                InstallationState::VersionOk,
                "{newer_or_equal} should satisfy 2.0.0"
            );
        }
    }

    #[test]
    fn compatible_under_content_hash_rule_is_exact() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("bundle", "rev-03d4672c4")]);
        let mut store = store_in(&temp);

        store.note_hash("bundle", "rev-03d4672c5").unwrap();
        assert!(matches!(
            store
                .compatible(&manifest, "bundle", ComparisonRule::ContentHash)
                .unwrap(),
            InstallationState::Mismatched { .. }
        ));

        store.note_hash("bundle", "rev-03d4672c4").unwrap();
        assert_eq!(
            store
                .compatible(&manifest, "bundle", ComparisonRule::ContentHash)
                .unwrap(),
            InstallationState::VersionOk
        );
    }

    #[test]
    fn content_hash_rule_ignores_version_ordering() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("bundle", "1.0.0")]);
        let mut store = store_in(&temp);
        store.note_hash("bundle", "2.0.0").unwrap();

        assert!(matches!(
            store
                .compatible(&manifest, "bundle", ComparisonRule::ContentHash)
                .unwrap(),
            InstallationState::Mismatched { .. }
        ));
    }

    #[test]
    fn compatible_rejects_keys_outside_the_manifest() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("tool-x", "2.0.0")]);
        let mut store = store_in(&temp);
        store.note_version("tool-y", "1.0.0").unwrap();

        let err = store
            .compatible(&manifest, "tool-y", ComparisonRule::Version)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TenjinError>(),
            Some(TenjinError::UnknownKey { .. })
        ));
    }

    #[test]
    fn states_judge_every_tool_without_writing() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::builtin();
        let mut store = store_in(&temp);
        store.note_version("10j-cmake", "3.31.7").unwrap();
        store.note_version("10j-opam", "2.2.0").unwrap();
        let written = std::fs::read_to_string(store.path()).unwrap();

        let states = store.states(&manifest).unwrap();

        assert_eq!(
            states.iter().map(|(tool, _)| *tool).collect::<Vec<_>>(),
            Tool::PROVISION_ORDER
        );
        assert_eq!(states[0].1, InstallationState::NotInstalled);
        assert_eq!(states[2].1, InstallationState::VersionOk);
        assert_eq!(
            states[3].1,
            InstallationState::Mismatched {
                installed: "2.2.0".to_string()
            }
        );
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), written);
    }
}
