//! Create and destroy orchestration.
//!
//! [`LinodeDriver`] owns the collaborators (provider API, transport, log
//! sink, sleeper and entropy source) and drives the two lifecycle operations
//! against a caller-owned [`InstanceState`](crate::state::InstanceState).
//! The host persists that state after every call, successful or not.

use thiserror::Error;

use crate::backoff::{Entropy, Sleeper};
use crate::failure::{ApiFailure, FailureKind, FieldError};
use crate::linode::LinodeApi;
use crate::log_sink::LogSink;
use crate::transport::{Transport, TransportError};

mod create;
mod destroy;
mod retry;

/// The two outcomes a host distinguishes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    /// The operator's input is wrong; retrying cannot help.
    UserError,
    /// The action failed and may succeed on a later run.
    ActionFailed,
}

/// Errors raised by the orchestrators.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A symbolic name did not match any catalogue entry.
    #[error("{field} '{name}' does not match any available {field}")]
    Unresolved {
        /// Spec field that failed to resolve.
        field: &'static str,
        /// Value that was looked up.
        name: String,
    },
    /// Every label suffix for the prefix is taken.
    #[error("unable to generate a unique label with prefix {prefix}")]
    LabelExhausted {
        /// Exhausted prefix.
        prefix: String,
    },
    /// The provider rejected the create request.
    #[error("Bad request when creating server.")]
    BadRequest {
        /// Field errors reported by the provider.
        errors: Vec<FieldError>,
    },
    /// Instance creation did not succeed within the attempt budget, or
    /// failed with an unrecoverable provider error.
    #[error("failed to create server after {attempts} attempt(s) [{kind}]: {source}")]
    CreationFailed {
        /// Submission attempts made.
        attempts: u32,
        /// Classification of the last failure.
        kind: FailureKind,
        /// Last raw failure.
        #[source]
        source: ApiFailure,
    },
    /// A supporting provider call failed.
    #[error("{operation} failed after {attempts} attempt(s) [{kind}]: {source}")]
    Api {
        /// Operation that failed.
        operation: &'static str,
        /// Attempts made.
        attempts: u32,
        /// Classification of the last failure.
        kind: FailureKind,
        /// Last raw failure.
        #[source]
        source: ApiFailure,
    },
    /// The instance never reported `running`.
    #[error("linode {id} did not reach running after {polls} status checks")]
    BootTimeout {
        /// Instance id.
        id: u64,
        /// Status checks made.
        polls: u32,
    },
    /// The instance disappeared while waiting for it to boot.
    #[error("linode {id} disappeared while waiting for it to boot")]
    Vanished {
        /// Instance id.
        id: u64,
    },
    /// The running instance reports no IPv4 address.
    #[error("linode {id} has no IPv4 address")]
    MissingAddress {
        /// Instance id.
        id: u64,
    },
    /// The control channel could not be established or a command failed to
    /// start.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

impl DriverError {
    /// Host-visible category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Unresolved { .. } | Self::LabelExhausted { .. } | Self::BadRequest { .. } => {
                ErrorCategory::UserError
            }
            _ => ErrorCategory::ActionFailed,
        }
    }

    const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Api {
                kind: FailureKind::NotFound,
                ..
            }
        )
    }
}

/// Orchestrates instance creation and destruction.
#[derive(Debug)]
pub struct LinodeDriver<A, T, L, S> {
    api: A,
    transport: T,
    log: L,
    sleeper: S,
    entropy: Entropy,
}

impl<A, T, L, S> LinodeDriver<A, T, L, S>
where
    A: LinodeApi,
    T: Transport,
    L: LogSink,
    S: Sleeper,
{
    /// Creates a driver from its collaborators.
    #[must_use]
    pub const fn new(api: A, transport: T, log: L, sleeper: S, entropy: Entropy) -> Self {
        Self {
            api,
            transport,
            log,
            sleeper,
            entropy,
        }
    }
}

#[cfg(test)]
mod tests;
