//! Error types for install scheduling.
//!
//! Errors are categorized so the scheduler can decide whether a failed
//! action is worth retrying and so the final report can tell users what
//! went wrong per unit without aborting unrelated work.

use thiserror::Error;

/// Categories of scheduling/action errors for retry logic.
///
/// Transient categories are retried with backoff; permanent ones fail the
/// unit immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable)
    Network,
    /// Action did not finish within its timeout (transient, retryable)
    Timeout,
    /// A resource (lock file, package database) was temporarily busy
    ResourceBusy,
    /// Unit specification is malformed
    InvalidSpec,
    /// The requested package/tool does not exist
    NotFound,
    /// Permission denied
    Permission,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::ResourceBusy)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Timeout => "Operation timed out",
            Self::ResourceBusy => "Resource temporarily unavailable",
            Self::InvalidSpec => "Invalid unit specification",
            Self::NotFound => "Package not found",
            Self::Permission => "Permission denied",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur while resolving or executing an install plan.
#[derive(Debug, Error)]
pub enum Error {
    /// The plan contains a dependency cycle and cannot be ordered.
    ///
    /// `members` lists every unit that could not be placed into a wave,
    /// i.e. the full set of units involved in (or downstream of) the cycle.
    #[error("dependency cycle involving: {}", members.join(", "))]
    Cycle {
        /// Ids of all units left unplaced by the wave resolution
        members: Vec<String>,
    },

    /// Two units in the plan share the same id.
    #[error("duplicate unit id '{id}'")]
    DuplicateUnit {
        /// The id that appears more than once
        id: String,
    },

    /// A unit declares a dependency on an id not present in the plan.
    #[error("unit '{unit}' depends on unknown unit '{dependency}'")]
    UnknownDependency {
        /// Unit declaring the dependency
        unit: String,
        /// The missing dependency id
        dependency: String,
    },

    /// Network-related error (connection, timeout, DNS, etc.)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message from the failed network operation
        message: String,
    },

    /// Action did not complete within its configured timeout
    #[error("timed out after {seconds}s")]
    Timeout {
        /// Timeout that was exceeded, in seconds
        seconds: u64,
    },

    /// A shared resource was busy (e.g. another package manager instance)
    #[error("resource busy: {message}")]
    ResourceBusy {
        /// Details about what was busy
        message: String,
    },

    /// Unit specification is malformed
    #[error("invalid spec: {message}")]
    InvalidSpec {
        /// Description of what is wrong with the spec
        message: String,
    },

    /// Package or tool not found
    #[error("not found: {name}")]
    NotFound {
        /// Name of the package that could not be found
        name: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// Command execution failed without a more specific category
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// A cache entry could not be read or parsed.
    ///
    /// Scoped to a single fingerprint; the cache treats it as a miss.
    #[error("corrupt cache entry {fingerprint}: {message}")]
    CacheCorrupt {
        /// Fingerprint of the unreadable entry
        fingerprint: String,
        /// What went wrong while reading it
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::ResourceBusy { .. } => ErrorCategory::ResourceBusy,
            Error::InvalidSpec { .. } => ErrorCategory::InvalidSpec,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Permission { .. } => ErrorCategory::Permission,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        self.category().is_transient()
    }

    /// Create an error from a failed install command's stderr.
    ///
    /// Analyzes the output to categorize the failure, so the retry policy
    /// can distinguish a flaky download from a typo in a package name.
    pub fn from_command_output(stderr: &str, unit_name: Option<&str>) -> Self {
        let stderr_lower = stderr.to_lowercase();

        // Network errors
        if stderr_lower.contains("curl")
            || stderr_lower.contains("could not resolve")
            || stderr_lower.contains("connection refused")
            || stderr_lower.contains("connection reset")
            || stderr_lower.contains("timed out")
            || stderr_lower.contains("network")
            || stderr_lower.contains("ssl")
            || stderr_lower.contains("certificate")
            || stderr_lower.contains("failed to download")
            || stderr_lower.contains("temporary failure in name resolution")
        {
            return Error::Network {
                message: stderr.trim().to_string(),
            };
        }

        // Another instance holding a lock, dpkg frontend lock, etc.
        if stderr_lower.contains("could not get lock")
            || stderr_lower.contains("resource temporarily unavailable")
            || stderr_lower.contains("is another process using it")
            || stderr_lower.contains("database is locked")
        {
            return Error::ResourceBusy {
                message: stderr.trim().to_string(),
            };
        }

        // Not found errors
        if stderr_lower.contains("unable to locate package")
            || stderr_lower.contains("no available formula")
            || stderr_lower.contains("no match for")
            || stderr_lower.contains("not found")
            || stderr_lower.contains("couldn't find")
        {
            return Error::NotFound {
                name: unit_name.unwrap_or("unknown").to_string(),
            };
        }

        // Permission errors
        if stderr_lower.contains("permission denied")
            || stderr_lower.contains("operation not permitted")
            || stderr_lower.contains("are you root")
            || stderr_lower.contains("sudo")
        {
            return Error::Permission {
                message: stderr.trim().to_string(),
            };
        }

        // Malformed input reported by the package manager itself
        if stderr_lower.contains("invalid") && stderr_lower.contains("version")
            || stderr_lower.contains("malformed")
            || stderr_lower.contains("unknown option")
        {
            return Error::InvalidSpec {
                message: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            message: format!(
                "install command failed{}",
                unit_name.map(|n| format!(" for {n}")).unwrap_or_default()
            ),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Result type for scheduling operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_transient() {
        assert!(ErrorCategory::Network.is_transient());
        assert!(ErrorCategory::Timeout.is_transient());
        assert!(ErrorCategory::ResourceBusy.is_transient());
        assert!(!ErrorCategory::NotFound.is_transient());
        assert!(!ErrorCategory::InvalidSpec.is_transient());
        assert!(!ErrorCategory::Permission.is_transient());
    }

    #[test]
    fn test_from_output_network() {
        let err = Error::from_command_output("curl: (6) Could not resolve host", Some("ripgrep"));
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_transient());
    }

    #[test]
    fn test_from_output_lock_held() {
        let err = Error::from_command_output(
            "E: Could not get lock /var/lib/dpkg/lock-frontend",
            Some("git"),
        );
        assert_eq!(err.category(), ErrorCategory::ResourceBusy);
        assert!(err.is_transient());
    }

    #[test]
    fn test_from_output_not_found() {
        let err = Error::from_command_output("E: Unable to locate package gitt", Some("gitt"));
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "not found: gitt");
    }

    #[test]
    fn test_from_output_permission() {
        let err = Error::from_command_output("are you root?", Some("htop"));
        assert_eq!(err.category(), ErrorCategory::Permission);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_from_output_fallback() {
        let err = Error::from_command_output("segmentation fault", Some("node"));
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_cycle_display_names_all_members() {
        let err = Error::Cycle {
            members: vec!["a".into(), "b".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains('a'));
        assert!(msg.contains('b'));
    }
}
