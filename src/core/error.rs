use nix::errno::Errno;
use thiserror::Error;

use crate::core::control::ControlOp;

/// Core error types for fwchains
#[derive(Debug, Error)]
pub enum Error {
    /// A kernel resource (control socket, rule table) could not be opened, read or closed
    #[error("Cannot access {resource}: {source}")]
    Resource {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    /// The kernel refused an add/delete request
    #[error("Kernel rejected {op} request: {errno}")]
    ControlRejected { op: ControlOp, errno: Errno },

    /// Rule failed validation before reaching the kernel
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Settings file could not be parsed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn resource(resource: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resource {
            resource: resource.into(),
            source,
        }
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Returns the underlying system error code, if the failure came from the OS.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Resource { source, .. } => source.raw_os_error().map(Errno::from_raw),
            Error::ControlRejected { errno, .. } => Some(*errno),
            Error::Validation { .. } | Error::Serialization(_) => None,
        }
    }

    /// Translates this error into a user-facing message with hints.
    pub fn translate(&self) -> ErrorTranslation {
        match self.errno() {
            Some(errno) => KernelErrorPattern::match_errno(errno, self),
            None => ErrorTranslation::new(self.to_string()),
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Known kernel errno values for the ipchains interface and their translations
pub struct KernelErrorPattern;

impl KernelErrorPattern {
    /// Maps an errno raised by a firewall call to a user-friendly translation.
    pub fn match_errno(errno: Errno, error: &Error) -> ErrorTranslation {
        match errno {
            Errno::EPERM | Errno::EACCES => {
                ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                    .with_suggestion("Run as root or grant CAP_NET_ADMIN and CAP_NET_RAW")
            }
            Errno::ENOPROTOOPT => {
                ErrorTranslation::new("Kernel does not support the ipchains interface")
                    .with_suggestion("Load the ipchains module: modprobe ipchains")
                    .with_suggestion("Kernels with iptables loaded cannot use ipchains at the same time")
            }
            Errno::ENOENT => match error {
                Error::ControlRejected { .. } => {
                    ErrorTranslation::new("No matching rule or chain in the kernel")
                        .with_suggestion("Delete with the exact rule value that was added")
                }
                _ => ErrorTranslation::new("Firewall rule table not found")
                    .with_suggestion("Check that /proc is mounted and ipchains is loaded"),
            },
            Errno::EINVAL => ErrorTranslation::new("Kernel rejected the rule as malformed")
                .with_suggestion("Check that prefix lengths are between 0 and 32")
                .with_suggestion("Check that port ranges start at or below their end"),
            Errno::EEXIST => ErrorTranslation::new("Conflicting firewall rule or chain")
                .with_suggestion("A matching rule already exists"),
            _ => ErrorTranslation::new(format!("Firewall error: {error}"))
                .with_suggestion("Check the detailed error message for more information"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
