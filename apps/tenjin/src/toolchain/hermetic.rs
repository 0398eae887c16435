//! The curated environment Tenjin runs tools in.
//!
//! Tools are launched with an explicit environment: the caller's variables,
//! with the local toolchain directories put first on `PATH` and the opam and
//! compiler variables pinned to the local installation. Nothing is read from
//! or written to the user's shell profile.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt::Display;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

use super::Platform;
use super::paths::{LocalPaths, OPAM_SWITCH};
use crate::errors::TenjinError;

/// opam CLI version Tenjin speaks.
const OPAM_CLI: &str = "--cli=2.3";

/// Interval between "still running" markers for long subprocesses.
const HEARTBEAT: Duration = Duration::from_secs(30);

/// Prints a user-facing progress line attributed to `tool`.
pub fn say(tool: &str, msg: impl Display) {
    println!("TENJIN SEZ: ({tool}) {msg}");
}

/// The current process environment, skipping non-UTF-8 entries.
#[must_use]
pub fn current_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Derives an environment from `base`.
///
/// `extra_dirs` are put at the front of `PATH` in the given order; any later
/// occurrence of a directory (including ones already on `base`'s `PATH`) is
/// dropped. `overrides` are then inserted, replacing existing values.
///
/// # Errors
///
/// Returns an error if a directory cannot be represented in `PATH` (for
/// example because it contains the separator).
pub fn compose_environment(
    base: &BTreeMap<String, String>,
    extra_dirs: &[PathBuf],
    overrides: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let existing = base
        .get("PATH")
        .map(|p| std::env::split_paths(p).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut dirs: Vec<PathBuf> = Vec::with_capacity(extra_dirs.len() + existing.len());
    for dir in extra_dirs.iter().cloned().chain(existing) {
        if !dir.as_os_str().is_empty() && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    let path = std::env::join_paths(&dirs)
        .context("Failed to compose PATH")?
        .into_string()
        .map_err(|p| anyhow::anyhow!("PATH is not valid UTF-8: {}", p.to_string_lossy()))?;

    let mut env = base.clone();
    env.insert("PATH".to_string(), path);
    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(env)
}

/// The environment Tenjin-managed tools run in.
///
/// # Errors
///
/// See [`compose_environment`].
pub fn tenjin_environment(
    paths: &LocalPaths,
    platform: Platform,
    base: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let extra_dirs = [
        paths.llvm_bin(),
        paths.build_deps().join("bin"),
        paths.cmake_bin(platform),
        paths.root.clone(),
        paths.switch_bin(),
    ];
    let overrides = BTreeMap::from([
        (
            "OPAMROOT".to_string(),
            paths.opamroot().to_string_lossy().into_owned(),
        ),
        ("OPAMSWITCH".to_string(), OPAM_SWITCH.to_string()),
        ("OPAMNOENVNOTICE".to_string(), "1".to_string()),
        ("CC".to_string(), "clang".to_string()),
        ("CXX".to_string(), "clang++".to_string()),
        ("AR".to_string(), "llvm-ar".to_string()),
    ]);
    compose_environment(base, &extra_dirs, &overrides)
}

/// A command that sees exactly `env`.
pub fn hermetic_command(program: impl AsRef<OsStr>, env: &BTreeMap<String, String>) -> Command {
    let mut cmd = Command::new(program);
    cmd.env_clear().envs(env);
    cmd
}

/// Builds invocations of the local opam against the isolated root.
#[derive(Debug, Clone)]
pub struct Opam {
    exe: PathBuf,
    root: PathBuf,
    env: BTreeMap<String, String>,
}

impl Opam {
    /// # Errors
    ///
    /// Returns an error if the curated environment cannot be composed.
    pub fn new(paths: &LocalPaths, platform: Platform) -> Result<Self> {
        Ok(Self {
            exe: paths.opam(),
            root: paths.opamroot(),
            env: tenjin_environment(paths, platform, &current_environment())?,
        })
    }

    /// `opam <args> --cli=2.3 --root <root>`, outside of any switch.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = hermetic_command(&self.exe, &self.env);
        cmd.env_remove("OPAMSWITCH")
            .args(args)
            .arg(OPAM_CLI)
            .arg("--root")
            .arg(&self.root);
        cmd
    }

    /// `opam <args> --cli=2.3 --root <root> --switch tenjin`.
    pub fn switch_command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(args);
        cmd.arg("--switch").arg(OPAM_SWITCH);
        cmd
    }

    /// `opam exec --cli=2.3 --root <root> --switch tenjin -- <program_args>`.
    pub fn exec<I, S>(&self, program_args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.switch_command(["exec"]);
        cmd.arg("--").args(program_args);
        cmd
    }
}

/// Extra `opam init` flags for this machine.
///
/// On Linux opam sandboxes builds with the bubblewrap from the build-deps
/// bundle. Bubblewrap does not work in most containers, so it is probed with
/// a trivial command first and sandboxing is disabled if that fails.
pub async fn probe_sandbox(paths: &LocalPaths, platform: Platform) -> Vec<String> {
    if !platform.is_linux() {
        return Vec::new();
    }

    let bwrap = paths.build_deps().join("bin").join("bwrap");
    let works = bwrap.is_file()
        && Command::new(&bwrap)
            .args(["--", "true"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|s| s.success());

    if works {
        Vec::new()
    } else {
        say("opam", "No working bubblewrap (in a container?); disabling opam sandboxing.");
        vec!["--disable-sandboxing".to_string()]
    }
}

/// Renders a command line for messages.
pub(crate) fn describe(cmd: &Command) -> String {
    let cmd = cmd.as_std();
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Runs `cmd` with inherited stdio and waits for it.
///
/// Prints a marker every 30 seconds while the command is still running.
///
/// # Errors
///
/// Returns [`TenjinError::ToolFailed`] if the command exits unsuccessfully,
/// or an I/O error if it cannot be started.
pub async fn run_checked(mut cmd: Command, label: &str) -> Result<()> {
    let description = describe(&cmd);
    debug!("running {description}");

    let mut child = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("Failed to start {description}"))?;

    let started = Instant::now();
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + HEARTBEAT, HEARTBEAT);
    let status = loop {
        tokio::select! {
            status = child.wait() => {
                break status.with_context(|| format!("Failed to wait for {description}"))?;
            }
            _ = heartbeat.tick() => {
                say(label, format!("... still running ({}s)", started.elapsed().as_secs()));
            }
        }
    };

    if !status.success() {
        return Err(TenjinError::tool_failed(description, exit_code(status)).into());
    }
    Ok(())
}

/// Runs `cmd` and returns its trimmed standard output.
///
/// # Errors
///
/// Returns [`TenjinError::ToolFailed`] if the command exits unsuccessfully,
/// or an I/O error if it cannot be started.
pub async fn capture_stdout(mut cmd: Command) -> Result<String> {
    let description = describe(&cmd);
    debug!("capturing {description}");

    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .await
        .with_context(|| format!("Failed to run {description}"))?;

    if !output.status.success() {
        return Err(TenjinError::tool_failed(description, exit_code(output.status)).into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
