//! Idempotent tool provisioning.
//!
//! For each tool the engine checks the installed record against the desired
//! specifier, runs the tool's acquisition routine only when they disagree,
//! confirms the routine actually produced something acceptable, and records
//! the outcome. A record is only written after a successful acquisition, so an
//! interrupted or failed run leaves the store as it was and the next run
//! retries.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Result, anyhow};
use futures_util::future::BoxFuture;
use semver::Version;
use tracing::{debug, info};

use super::manifest::{DesiredVersionManifest, Tool};
use super::store::InstalledVersionStore;
use crate::errors::TenjinError;

/// How an installed specifier is compared with the desired one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonRule {
    /// Installed satisfies desired when it is the same or a newer version.
    Version,
    /// Installed satisfies desired only when the strings are identical.
    ContentHash,
}

impl ComparisonRule {
    /// Whether `installed` satisfies `desired` under this rule.
    ///
    /// Under [`ComparisonRule::Version`] an unparseable specifier never
    /// satisfies anything.
    #[must_use]
    pub fn satisfied(self, installed: &str, desired: &str) -> bool {
        match self {
            Self::ContentHash => installed == desired,
            Self::Version => match (parse_version(installed), parse_version(desired)) {
                (Some(installed), Some(desired)) => installed >= desired,
                _ => false,
            },
        }
    }
}

/// Result of comparing the installed record with the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationState {
    /// No record for the key.
    NotInstalled,
    /// The record satisfies the desired specifier.
    VersionOk,
    /// The record exists but does not satisfy the desired specifier.
    Mismatched {
        /// The recorded specifier.
        installed: String,
    },
}

/// What `ensure` had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The installed version already satisfied the manifest.
    AlreadySatisfied,
    /// The acquisition routine ran and recorded `installed`.
    Provisioned {
        /// The specifier the routine reported after installing.
        installed: String,
    },
    /// The tool is not used on this platform; nothing was done.
    Skipped,
}

/// Parses a tool's version string leniently.
///
/// Accepts a leading `v`, missing minor or patch components (`3.18` is
/// `3.18.0`), and opam-style `~` pre-releases (`2.3.0~beta1` sorts before
/// `2.3.0`). Build metadata such as `5.2.0+options` is kept and ignored by
/// ordering.
#[must_use]
pub fn parse_version(s: &str) -> Option<Version> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (numeric, rest) = s.split_at(split);

    let mut parts: Vec<&str> = numeric.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    let rest = rest.replacen('~', "-", 1);
    Version::parse(&format!("{}{rest}", parts.join("."))).ok()
}

/// A tool's acquisition routine.
///
/// Implementations install the desired version under the local root and
/// report what actually got installed. They may leave partial state behind on
/// failure; the engine simply retries on the next run.
pub trait Acquire: Send + Sync {
    /// Installs the tool at `desired` under `localdir`.
    fn acquire<'a>(&'a self, localdir: &'a Path, desired: &'a str) -> BoxFuture<'a, Result<()>>;

    /// The specifier that is installed now, as reported by the tool itself
    /// when possible.
    fn installed_specifier<'a>(
        &'a self,
        localdir: &'a Path,
        desired: &'a str,
    ) -> BoxFuture<'a, Result<String>>;

    /// Keys whose records become stale once this routine runs.
    fn invalidates(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the tool is used at all on the platform this routine targets.
    fn supported(&self) -> bool {
        true
    }
}

/// Acquisition routines, one per tool.
#[derive(Default)]
pub struct Routines {
    routines: BTreeMap<Tool, Box<dyn Acquire>>,
}

impl Routines {
    /// An empty routine set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the routine for `tool`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, tool: Tool, routine: impl Acquire + 'static) -> Self {
        self.routines.insert(tool, Box::new(routine));
        self
    }

    /// The routine for `tool`.
    ///
    /// # Errors
    ///
    /// Returns an error if no routine was registered for the tool.
    pub fn get(&self, tool: Tool) -> Result<&dyn Acquire> {
        self.routines
            .get(&tool)
            .map(AsRef::as_ref)
            .ok_or_else(|| anyhow!("no acquisition routine registered for {tool}"))
    }
}

/// Drives acquisition routines against the store and manifest.
pub struct ProvisioningEngine<'a> {
    localdir: &'a Path,
    manifest: &'a DesiredVersionManifest,
    store: &'a mut InstalledVersionStore,
}

impl<'a> ProvisioningEngine<'a> {
    #[must_use]
    pub fn new(
        localdir: &'a Path,
        manifest: &'a DesiredVersionManifest,
        store: &'a mut InstalledVersionStore,
    ) -> Self {
        Self {
            localdir,
            manifest,
            store,
        }
    }

    /// Makes sure `key` is installed at a version acceptable under `rule`.
    ///
    /// Runs `routine` only when the record is missing or mismatched. After the
    /// routine returns, the specifier it reports must itself satisfy the
    /// manifest; only then is it recorded. Keys the routine invalidates are
    /// forgotten before it runs. A routine that is not supported on this
    /// platform is skipped and its record left alone.
    ///
    /// # Errors
    ///
    /// Returns [`TenjinError::UnknownKey`] if the manifest lacks `key`, and
    /// [`TenjinError::Provisioning`] wrapping the cause if the routine fails or
    /// installs something unacceptable. The record for `key` is unchanged in
    /// either case.
    pub async fn ensure(
        &mut self,
        key: &str,
        rule: ComparisonRule,
        routine: &dyn Acquire,
    ) -> Result<EnsureOutcome> {
        let manifest = self.manifest;
        let state = self.store.compatible(manifest, key, rule)?;
        let desired = manifest.desired(key)?;

        if !routine.supported() {
            debug!("{key} is not used on this platform");
            return Ok(EnsureOutcome::Skipped);
        }

        match &state {
            InstallationState::VersionOk => {
                debug!("{key} already satisfies {desired}");
                return Ok(EnsureOutcome::AlreadySatisfied);
            }
            InstallationState::NotInstalled => info!("{key}: installing {desired}"),
            InstallationState::Mismatched { installed } => {
                info!("{key}: replacing {installed} with {desired}");
            }
        }

        let installed = self
            .acquire(key, rule, desired, routine)
            .await
            .map_err(|e| TenjinError::provisioning(key, e))?;

        Ok(EnsureOutcome::Provisioned { installed })
    }

    async fn acquire(
        &mut self,
        key: &str,
        rule: ComparisonRule,
        desired: &str,
        routine: &dyn Acquire,
    ) -> Result<String> {
        for stale in routine.invalidates() {
            if self.store.forget(stale)? {
                debug!("{key}: forgot dependent record {stale}");
            }
        }

        routine.acquire(self.localdir, desired).await?;
        let installed = routine.installed_specifier(self.localdir, desired).await?;

        if !rule.satisfied(&installed, desired) {
            return Err(TenjinError::acquisition(
                key,
                format!("installed {installed} does not satisfy desired {desired}"),
            )
            .into());
        }

        match rule {
            ComparisonRule::Version => self.store.note_version(key, &installed)?,
            ComparisonRule::ContentHash => self.store.note_hash(key, &installed)?,
        };
        Ok(installed)
    }

    /// Ensures `tool` and, first, each of its prerequisites.
    ///
    /// # Errors
    ///
    /// Stops at the first failing tool; see [`ProvisioningEngine::ensure`].
    pub async fn ensure_tool(&mut self, tool: Tool, routines: &Routines) -> Result<EnsureOutcome> {
        for &prereq in tool.prerequisites() {
            self.ensure(prereq.key(), prereq.rule(), routines.get(prereq)?)
                .await?;
        }
        self.ensure(tool.key(), tool.rule(), routines.get(tool)?)
            .await
    }

    /// Ensures every tool in provisioning order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing tool; tools already provisioned stay
    /// recorded.
    pub async fn ensure_all(&mut self, routines: &Routines) -> Result<Vec<(Tool, EnsureOutcome)>> {
        let mut outcomes = Vec::with_capacity(Tool::PROVISION_ORDER.len());
        for tool in Tool::PROVISION_ORDER {
            let outcome = self
                .ensure(tool.key(), tool.rule(), routines.get(tool)?)
                .await?;
            outcomes.push((tool, outcome));
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::find_in_chain;
    use assert_fs::TempDir;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// A routine that records its invocations and reports a fixed result.
    #[derive(Clone)]
    struct Fake {
        name: &'static str,
        reports: Option<&'static str>,
        fail: bool,
        unsupported: bool,
        invalidates: &'static [&'static str],
        calls: Arc<AtomicUsize>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Fake {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                name,
                reports: None,
                fail: false,
                unsupported: false,
                invalidates: &[],
                calls: Arc::new(AtomicUsize::new(0)),
                log: Arc::clone(log),
            }
        }

        fn reporting(mut self, installed: &'static str) -> Self {
            self.reports = Some(installed);
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn unsupported(mut self) -> Self {
            self.unsupported = true;
            self
        }

        fn invalidating(mut self, keys: &'static [&'static str]) -> Self {
            self.invalidates = keys;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Acquire for Fake {
        fn acquire<'a>(&'a self, _: &'a Path, _: &'a str) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.log.lock().unwrap().push(self.name);
                if self.fail {
                    anyhow::bail!("{} exploded", self.name);
                }
                Ok(())
            })
        }

        fn installed_specifier<'a>(
            &'a self,
            _: &'a Path,
            desired: &'a str,
        ) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move { Ok(self.reports.unwrap_or(desired).to_string()) })
        }

        fn invalidates(&self) -> &'static [&'static str] {
            self.invalidates
        }

        fn supported(&self) -> bool {
            !self.unsupported
        }
    }

    fn new_log() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn store_in(temp: &TempDir) -> InstalledVersionStore {
        InstalledVersionStore::load(temp.path().join("installed-versions.v1.json"))
    }

    fn fake_routines(log: &Arc<Mutex<Vec<&'static str>>>) -> (Routines, Vec<Fake>) {
        let fakes: Vec<Fake> = Tool::PROVISION_ORDER
            .iter()
            .map(|tool| {
                let fake = Fake::new(tool.name(), log);
                match tool {
                    Tool::Opam => fake.invalidating(&["10j-ocaml", "10j-dune"]),
                    Tool::Ocaml => fake.invalidating(&["10j-dune"]),
                    _ => fake,
                }
            })
            .collect();
        let routines = Tool::PROVISION_ORDER
            .iter()
            .zip(&fakes)
            .fold(Routines::new(), |r, (tool, fake)| r.with(*tool, fake.clone()));
        (routines, fakes)
    }

    #[test]
    fn version_rule_orders_versions() {
        let rule = ComparisonRule::Version;
        assert!(rule.satisfied("2.0.0", "2.0.0"));
        assert!(rule.satisfied("2.1.3", "2.0.0"));
        assert!(rule.satisfied("10.0.0", "9.9.9"));
        assert!(!rule.satisfied("1.5.0", "2.0.0"));
        assert!(!rule.satisfied("2.3.0~beta1", "2.3.0"));
        assert!(!rule.satisfied("garbage", "2.0.0"));
    }

    #[test]
    fn content_hash_rule_is_exact() {
        let rule = ComparisonRule::ContentHash;
        assert!(rule.satisfied("rev-03d4672c4", "rev-03d4672c4"));
        assert!(!rule.satisfied("rev-03d4672c5", "rev-03d4672c4"));
        assert!(!rule.satisfied("2.0.0", "1.0.0"));
    }

    #[test]
    fn parse_version_is_lenient() {
        assert_eq!(parse_version("3.18"), Some(Version::new(3, 18, 0)));
        assert_eq!(parse_version("v18.1.8"), Some(Version::new(18, 1, 8)));
        assert_eq!(parse_version(" 5.2.0\n"), Some(Version::new(5, 2, 0)));
        assert!(parse_version("5.2.0+options").is_some());
        assert!(parse_version("2.3.0~rc1").unwrap().pre.as_str() == "rc1");
        assert_eq!(parse_version(""), None);
        assert_eq!(parse_version("1.2.3.4"), None);
        assert_eq!(parse_version("rev-03d4672c4"), None);
    }

    #[tokio::test]
    async fn satisfied_version_skips_acquisition() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("tool-x", "2.0.0")]);
        let mut store = store_in(&temp);
        store.note_version("tool-x", "2.1.3").unwrap();
        let fake = Fake::new("tool-x", &new_log());

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        let outcome = engine
            .ensure("tool-x", ComparisonRule::Version, &fake)
            .await
            .unwrap();

        assert_eq!(outcome, EnsureOutcome::AlreadySatisfied);
        assert_eq!(fake.calls(), 0);
        assert_eq!(store.query("tool-x"), Some("2.1.3"));
    }

    #[tokio::test]
    async fn outdated_version_is_acquired_exactly_once() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("tool-x", "2.0.0")]);
        let mut store = store_in(&temp);
        store.note_version("tool-x", "1.5.0").unwrap();
        let fake = Fake::new("tool-x", &new_log());

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        let first = engine
            .ensure("tool-x", ComparisonRule::Version, &fake)
            .await
            .unwrap();
        let second = engine
            .ensure("tool-x", ComparisonRule::Version, &fake)
            .await
            .unwrap();

        assert_eq!(
            first,
            EnsureOutcome::Provisioned {
                installed: "2.0.0".to_string()
            }
        );
        assert_eq!(second, EnsureOutcome::AlreadySatisfied);
        assert_eq!(fake.calls(), 1);
        assert_eq!(store.query("tool-x"), Some("2.0.0"));
    }

    #[tokio::test]
    async fn content_hash_mismatch_is_reacquired() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("bundle", "rev-03d4672c4")]);
        let mut store = store_in(&temp);
        store.note_hash("bundle", "rev-00000000").unwrap();
        let fake = Fake::new("bundle", &new_log());

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        engine
            .ensure("bundle", ComparisonRule::ContentHash, &fake)
            .await
            .unwrap();

        assert_eq!(fake.calls(), 1);
        assert_eq!(store.query("bundle"), Some("rev-03d4672c4"));
    }

    #[tokio::test]
    async fn failing_routine_leaves_store_unchanged() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("tool-x", "2.0.0")]);
        let mut store = store_in(&temp);
        store.note_version("tool-x", "1.5.0").unwrap();
        let fake = Fake::new("tool-x", &new_log()).failing();

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        let err = engine
            .ensure("tool-x", ComparisonRule::Version, &fake)
            .await
            .unwrap_err();

        assert!(matches!(
            find_in_chain(&err),
            Some(TenjinError::Provisioning { key, .. }) if key == "tool-x"
        ));
        assert!(format!("{err:#}").contains("tool-x exploded"));
        assert_eq!(store.query("tool-x"), Some("1.5.0"));
        let reloaded = InstalledVersionStore::load(store.path());
        assert_eq!(reloaded.query("tool-x"), Some("1.5.0"));
    }

    #[tokio::test]
    async fn insufficient_installed_version_is_not_recorded() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("tool-x", "2.0.0")]);
        let mut store = store_in(&temp);
        let fake = Fake::new("tool-x", &new_log()).reporting("1.9.9");

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        let err = engine
            .ensure("tool-x", ComparisonRule::Version, &fake)
            .await
            .unwrap_err();

        assert!(matches!(
            find_in_chain(&err),
            Some(TenjinError::Provisioning { .. })
        ));
        assert!(format!("{err:#}").contains("1.9.9"));
        assert_eq!(store.query("tool-x"), None);
    }

    #[tokio::test]
    async fn newer_installed_version_is_recorded_as_reported() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("tool-x", "2.0.0")]);
        let mut store = store_in(&temp);
        let fake = Fake::new("tool-x", &new_log()).reporting("2.4.1");

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        engine
            .ensure("tool-x", ComparisonRule::Version, &fake)
            .await
            .unwrap();

        assert_eq!(store.query("tool-x"), Some("2.4.1"));
    }

    #[tokio::test]
    async fn unknown_key_never_runs_the_routine() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("tool-x", "2.0.0")]);
        let mut store = store_in(&temp);
        let fake = Fake::new("tool-y", &new_log());

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        let err = engine
            .ensure("tool-y", ComparisonRule::Version, &fake)
            .await
            .unwrap_err();

        assert!(matches!(
            find_in_chain(&err),
            Some(TenjinError::UnknownKey { .. })
        ));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn ensure_all_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::builtin();
        let mut store = store_in(&temp);
        let log = new_log();
        let (routines, fakes) = fake_routines(&log);

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        let first = engine.ensure_all(&routines).await.unwrap();
        let second = engine.ensure_all(&routines).await.unwrap();

        assert!(
            first
                .iter()
                .all(|(_, o)| matches!(o, EnsureOutcome::Provisioned { .. }))
        );
        assert!(
            second
                .iter()
                .all(|(_, o)| *o == EnsureOutcome::AlreadySatisfied)
        );
        assert!(fakes.iter().all(|f| f.calls() == 1));
        assert_eq!(
            *log.lock().unwrap(),
            ["build-deps", "llvm", "cmake", "opam", "ocaml", "dune"]
        );

        let states = store.states(&manifest).unwrap();
        assert!(
            states
                .iter()
                .all(|(_, s)| *s == InstallationState::VersionOk)
        );
    }

    #[tokio::test]
    async fn ensure_tool_provisions_prerequisites_first() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::builtin();
        let mut store = store_in(&temp);
        let log = new_log();
        let (routines, _) = fake_routines(&log);

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        engine.ensure_tool(Tool::Dune, &routines).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["opam", "ocaml", "dune"]);
        assert_eq!(store.query("10j-llvm"), None);
        assert_eq!(store.query("10j-dune"), Some("3.18.0"));
    }

    #[tokio::test]
    async fn reacquiring_opam_invalidates_the_switch() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::builtin();
        let mut store = store_in(&temp);
        store.note_version("10j-opam", "2.2.0").unwrap();
        store.note_version("10j-ocaml", "5.2.0").unwrap();
        store.note_version("10j-dune", "3.18.0").unwrap();
        let log = new_log();
        let (routines, _) = fake_routines(&log);

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        engine.ensure_tool(Tool::Dune, &routines).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["opam", "ocaml", "dune"]);
        assert_eq!(store.query("10j-opam"), Some("2.3.0"));
    }

    #[tokio::test]
    async fn failed_opam_still_forgets_dependents() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::builtin();
        let mut store = store_in(&temp);
        store.note_version("10j-opam", "2.2.0").unwrap();
        store.note_version("10j-ocaml", "5.2.0").unwrap();
        let opam = Fake::new("opam", &new_log())
            .failing()
            .invalidating(&["10j-ocaml", "10j-dune"]);

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        assert!(
            engine
                .ensure("10j-opam", ComparisonRule::Version, &opam)
                .await
                .is_err()
        );

        assert_eq!(store.query("10j-opam"), Some("2.2.0"));
        assert_eq!(store.query("10j-ocaml"), None);
    }

    #[tokio::test]
    async fn ensure_all_stops_at_first_failure() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::builtin();
        let mut store = store_in(&temp);
        let log = new_log();
        let (routines, _) = fake_routines(&log);
        let routines = routines.with(Tool::Cmake, Fake::new("cmake", &log).failing());

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        let err = engine.ensure_all(&routines).await.unwrap_err();

        assert!(matches!(
            find_in_chain(&err),
            Some(TenjinError::Provisioning { key, .. }) if key == "10j-cmake"
        ));
        assert_eq!(*log.lock().unwrap(), ["build-deps", "llvm", "cmake"]);
        assert_eq!(store.query("10j-llvm"), Some("18.1.8"));
        assert_eq!(store.query("10j-cmake"), None);
    }

    #[tokio::test]
    async fn unsupported_tool_is_skipped_and_the_rest_provisioned() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::builtin();
        let mut store = store_in(&temp);
        let log = new_log();
        let (routines, _) = fake_routines(&log);
        let build_deps = Fake::new("build-deps", &log).unsupported();
        let routines = routines.with(Tool::BuildDeps, build_deps.clone());

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        let outcomes = engine.ensure_all(&routines).await.unwrap();

        assert_eq!(outcomes[0], (Tool::BuildDeps, EnsureOutcome::Skipped));
        assert_eq!(build_deps.calls(), 0);
        assert_eq!(
            *log.lock().unwrap(),
            ["llvm", "cmake", "opam", "ocaml", "dune"]
        );
        assert_eq!(store.query("10j-build-deps"), None);
        assert_eq!(store.query("10j-dune"), Some("3.18.0"));
    }

    #[tokio::test]
    async fn unsupported_tool_keeps_an_existing_record() {
        let temp = TempDir::new().unwrap();
        let manifest = DesiredVersionManifest::from_pairs([("bundle", "rev-2")]);
        let mut store = store_in(&temp);
        store.note_hash("bundle", "rev-1").unwrap();
        let fake = Fake::new("bundle", &new_log()).unsupported();

        let mut engine = ProvisioningEngine::new(temp.path(), &manifest, &mut store);
        let outcome = engine
            .ensure("bundle", ComparisonRule::ContentHash, &fake)
            .await
            .unwrap();

        assert_eq!(outcome, EnsureOutcome::Skipped);
        assert_eq!(store.query("bundle"), Some("rev-1"));
    }

    #[test]
    fn missing_routine_is_an_error() {
        assert!(Routines::new().get(Tool::Llvm).is_err());
    }
}
