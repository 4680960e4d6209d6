//! Bounded retry of supporting provider calls.

use crate::backoff::{RetryContext, RetryPolicy, Sleeper};
use crate::failure::{FailureKind, classify};
use crate::linode::{ApiFuture, LinodeApi};
use crate::log_sink::LogSink;
use crate::transport::Transport;

use super::{DriverError, LinodeDriver};

impl<A, T, L, S> LinodeDriver<A, T, L, S>
where
    A: LinodeApi,
    T: Transport,
    L: LogSink,
    S: Sleeper,
{
    /// Runs `call` until it succeeds, fails with a non-retryable kind, or the
    /// policy's attempt budget is spent.
    pub(super) async fn call_with_retry<'a, V, F>(
        &'a self,
        operation: &'static str,
        policy: RetryPolicy,
        mut call: F,
    ) -> Result<V, DriverError>
    where
        F: FnMut() -> ApiFuture<'a, V>,
    {
        let mut context = RetryContext::new(policy);
        loop {
            let attempt = context.begin_attempt();
            let failure = match call().await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };
            let kind = classify(&failure);
            context.record_failure(kind.clone());
            if !kind.is_retryable() || context.exhausted() {
                return Err(DriverError::Api {
                    operation,
                    attempts: attempt,
                    kind,
                    source: failure,
                });
            }
            self.back_off(&mut context, &kind).await;
        }
    }

    /// Logs the retry and sleeps for the delay the policy assigns to `kind`.
    pub(super) async fn back_off(&self, context: &mut RetryContext, kind: &FailureKind) {
        let delay = context.backoff(kind, &self.entropy);
        if matches!(kind, FailureKind::RateLimited { .. }) {
            self.log.warn(&format!(
                "Rate limit encountered, sleeping {} seconds for it to expire.",
                delay.as_secs()
            ));
        }
        self.log.warn(&format!(
            "[Attempt #{}] Retrying because [{kind}]",
            context.attempts()
        ));
        if !delay.is_zero() {
            self.sleeper.sleep(delay).await;
        }
    }
}
