//! Core library for the `kitchen-linode` test-kitchen driver.
//!
//! The crate creates and destroys disposable Linode instances for
//! infrastructure test runs: it picks collision-free labels, retries
//! transient provider failures with backoff, waits for the instance to boot
//! and accept SSH, and applies a short post-boot setup sequence. The
//! orchestrators live in [`driver`]; everything they talk to sits behind a
//! trait so hosts and tests can swap implementations.

pub mod backoff;
pub mod config;
pub mod driver;
pub mod failure;
pub mod label;
pub mod linode;
pub mod log_sink;
pub mod provision;
pub mod setup;
pub mod state;
#[cfg(test)]
pub mod test_helpers;
pub mod test_support;
pub mod transport;

pub use backoff::{Entropy, RetryContext, RetryPolicy, Sleeper, TokioSleeper};
pub use config::{ConfigError, HostIdentity, LinodeConfig};
pub use driver::{DriverError, ErrorCategory, LinodeDriver};
pub use failure::{ApiFailure, FailureKind, FieldError, classify};
pub use label::{LabelError, LabelGenerator};
pub use linode::{HttpLinodeApi, LinodeApi};
pub use log_sink::{LogSink, TracingLogSink};
pub use provision::{ProvisionSpec, ProvisionSpecBuilder, SpecError};
pub use state::{InstanceState, StateError, StateFile};
pub use transport::{SshTransport, Transport, TransportError};
