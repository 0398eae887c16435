//! Error types for the tenjin CLI.
//!
//! Operations throughout the crate return `anyhow::Result`. The variants of
//! [`TenjinError`] are the typed failures callers care about; they are created
//! at the point of failure and travel inside the `anyhow` chain, where they can
//! be recovered with `downcast_ref` on the links of `Error::chain()`.
//! They are never attached with `.context()`, since context layers do not
//! downcast from inside a chain.

use std::path::PathBuf;
use thiserror::Error;

/// Consolidated error type for provisioning and tool invocation.
#[derive(Debug, Error)]
pub enum TenjinError {
    /// A tool key was consulted that the desired-version manifest does not define.
    #[error("unknown tool key: {key}")]
    UnknownKey {
        /// The key that was looked up.
        key: String,
    },

    /// A record passed to the installed-version store was malformed.
    #[error("invalid record for {key}: {message}")]
    InvalidRecord {
        /// The tool key being recorded.
        key: String,
        /// What was wrong with the record.
        message: String,
    },

    /// No acquisition path exists for this OS/architecture combination.
    #[error("unsupported platform: {tool} is not available for {os} on {arch}")]
    UnsupportedPlatform {
        /// The tool (or component) being acquired.
        tool: String,
        /// Operating system name.
        os: String,
        /// Architecture name.
        arch: String,
    },

    /// A downloaded artifact did not hash to the expected value.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        /// The (already deleted) artifact path.
        path: PathBuf,
        /// The expected checksum.
        expected: String,
        /// The actual checksum.
        actual: String,
    },

    /// Extraction was requested for a file whose suffix is not a supported archive.
    #[error("unknown archive format: {}", path.display())]
    UnknownArchiveFormat {
        /// The archive path.
        path: PathBuf,
    },

    /// An acquisition routine failed for a reason not covered by another variant.
    #[error("acquisition of {tool} failed: {message}")]
    Acquisition {
        /// The tool key being acquired.
        tool: String,
        /// Description of the failure.
        message: String,
    },

    /// Provisioning of a tool did not complete.
    #[error("provisioning of {key} failed")]
    Provisioning {
        /// The tool key being provisioned.
        key: String,
        /// The underlying failure; its error object is the next link of the chain.
        #[source]
        source: anyhow::Error,
    },

    /// An external tool exited unsuccessfully.
    #[error("`{command}` failed with exit code {code}")]
    ToolFailed {
        /// The command line that was run.
        command: String,
        /// The exit code, or -1 when terminated by a signal.
        code: i32,
    },

    /// No repository root was found above the current directory.
    #[error("could not find the repo root directory above {}", start.display())]
    RepoRootNotFound {
        /// Where the upward search started.
        start: PathBuf,
    },

    /// Subprocess exited with non-zero code.
    ///
    /// Used by the passthrough commands: the exit code is propagated to the
    /// parent process without printing an additional error message.
    #[error("process exited with code {code}")]
    ProcessExitCode {
        /// The exit code from the subprocess.
        code: i32,
    },
}

impl TenjinError {
    /// Creates a new `UnknownKey` error.
    #[must_use]
    pub fn unknown_key(key: impl Into<String>) -> Self {
        Self::UnknownKey { key: key.into() }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedPlatform` error.
    #[must_use]
    pub fn unsupported_platform(
        tool: impl Into<String>,
        os: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self::UnsupportedPlatform {
            tool: tool.into(),
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Creates a new `ChecksumMismatch` error.
    #[must_use]
    pub fn checksum_mismatch(
        path: impl Into<PathBuf>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `UnknownArchiveFormat` error.
    #[must_use]
    pub fn unknown_archive_format(path: impl Into<PathBuf>) -> Self {
        Self::UnknownArchiveFormat { path: path.into() }
    }

    /// Creates a new `Acquisition` error.
    #[must_use]
    pub fn acquisition(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Acquisition {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Provisioning` error wrapping the routine's failure.
    #[must_use]
    pub fn provisioning(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Provisioning {
            key: key.into(),
            source,
        }
    }

    /// Creates a new `ToolFailed` error.
    #[must_use]
    pub fn tool_failed(command: impl Into<String>, code: i32) -> Self {
        Self::ToolFailed {
            command: command.into(),
            code,
        }
    }

    /// Creates a new `ProcessExitCode` error.
    #[must_use]
    pub const fn process_exit_code(code: i32) -> Self {
        Self::ProcessExitCode { code }
    }
}

/// Returns the first [`TenjinError`] found in an error chain.
#[must_use]
pub fn find_in_chain(err: &anyhow::Error) -> Option<&TenjinError> {
    err.chain().find_map(|e| e.downcast_ref::<TenjinError>())
}

/// Returns every [`TenjinError`] in an error chain, outermost first.
#[cfg(test)]
pub fn all_in_chain(err: &anyhow::Error) -> Vec<&TenjinError> {
    err.chain()
        .filter_map(|e| e.downcast_ref::<TenjinError>())
        .collect()
}
