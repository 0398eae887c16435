//! Hermetic toolchain provisioning.
//!
//! Tools are installed under a single local root and tracked in a small JSON
//! record so that repeated runs only do work when a desired version changes.
//!
//! ## Module Structure
//!
//! - [`manifest`] - Desired versions and the set of provisioned tools
//! - [`store`] - Persisted record of installed versions
//! - [`engine`] - Compares, acquires, and records tools
//! - [`routines`] - Per-tool acquisition
//! - [`hermetic`] - Curated environment and subprocess helpers
//! - [`platform`] - OS and architecture detection
//! - [`paths`] - Local root layout
//! - [`download`] - HTTP download with retries and progress
//! - [`verify`] - SHA256 checksum verification
//! - [`archive`] - Compressed tarball extraction

pub mod archive;
pub mod download;
pub mod engine;
pub mod hermetic;
pub mod manifest;
pub mod paths;
pub mod platform;
pub mod routines;
pub mod store;
pub mod verify;

pub use engine::{EnsureOutcome, InstallationState, ProvisioningEngine, Routines};
pub use manifest::{DesiredVersionManifest, Tool};
pub use paths::LocalPaths;
pub use platform::Platform;
pub use store::InstalledVersionStore;
