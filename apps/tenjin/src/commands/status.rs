//! Status command for the tenjin CLI.
//!
//! Prints the local root, the detected platform, and for every tool its key,
//! desired version, recorded version, and whether it needs provisioning.
//! Tools that are not used on this platform are marked as such. Nothing is
//! installed or modified.

use anyhow::Result;

use crate::toolchain::{
    DesiredVersionManifest, InstallationState, InstalledVersionStore, LocalPaths, Platform,
    Routines, Tool,
};

/// Executes the status command.
///
/// # Errors
///
/// Returns an error if the local root cannot be located or the platform is
/// not supported.
pub fn execute() -> Result<()> {
    let platform = Platform::detect()?;
    let paths = LocalPaths::discover()?;
    let manifest = DesiredVersionManifest::builtin();
    let store = InstalledVersionStore::load(paths.store_file());
    let states = store.states(&manifest)?;
    let routines = Routines::standard(platform);

    println!("Local root: {}", paths.root.display());
    println!("Platform:   {platform}");
    println!("Record:     {}", store.path().display());
    println!();
    println!(
        "{:<12} {:<16} {:<16} {:<16} STATE",
        "TOOL", "KEY", "DESIRED", "INSTALLED"
    );

    for (tool, state) in states {
        let installed = store.query(tool.key()).unwrap_or("-");
        println!(
            "{:<12} {:<16} {:<16} {:<16} {}",
            tool.name(),
            tool.key(),
            manifest.desired_for(tool)?,
            installed,
            state_label(&state, routines.get(tool)?.supported())
        );
    }

    let stale: Vec<_> = store
        .records()
        .iter()
        .filter(|(key, _)| !Tool::PROVISION_ORDER.iter().any(|t| t.key() == key.as_str()))
        .collect();
    if !stale.is_empty() {
        println!();
        println!("Records for tools no longer tracked:");
        for (key, value) in stale {
            println!("  {key} = {value}");
        }
    }
    Ok(())
}

fn state_label(state: &InstallationState, supported: bool) -> &'static str {
    if !supported {
        return "unused here";
    }
    match state {
        InstallationState::NotInstalled => "not installed",
        InstallationState::VersionOk => "ok",
        InstallationState::Mismatched { .. } => "outdated",
    }
}
