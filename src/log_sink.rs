//! Progress reporting capability used by the orchestrators.

/// Destination for human-readable progress lines. Emission is infallible so
/// logging can never abort an operation.
pub trait LogSink {
    /// Reports normal progress.
    fn info(&self, message: &str);
    /// Reports a degraded but recoverable condition.
    fn warn(&self, message: &str);
    /// Reports a failure the operator must act on.
    fn error(&self, message: &str);
}

/// Forwards progress lines to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn info(&self, message: &str) {
        tracing::info!(target: "kitchen_linode", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "kitchen_linode", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "kitchen_linode", "{message}");
    }
}
