//! Command modules for the tenjin CLI.
//!
//! - [`provision`] - Install or update every tool
//! - [`status`] - Show desired and installed versions
//! - [`passthrough`] - Run opam, dune, or cargo in the curated environment
//! - [`cache_key`] - Print CI cache keys

pub mod cache_key;
pub mod passthrough;
pub mod provision;
pub mod status;
