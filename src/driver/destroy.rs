//! Instance destruction.

use crate::backoff::{RetryPolicy, Sleeper};
use crate::linode::LinodeApi;
use crate::log_sink::LogSink;
use crate::state::InstanceState;
use crate::transport::Transport;

use super::{DriverError, LinodeDriver};

impl<A, T, L, S> LinodeDriver<A, T, L, S>
where
    A: LinodeApi,
    T: Transport,
    L: LogSink,
    S: Sleeper,
{
    /// Deletes the instance recorded in `state` and clears every field.
    ///
    /// Safe to call repeatedly: an empty state makes no provider call, and
    /// an instance that is already gone counts as destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Api`] when the lookup or the delete fails for
    /// any reason other than the instance being absent. `state` is left
    /// untouched in that case.
    pub async fn destroy(
        &self,
        policy: RetryPolicy,
        state: &mut InstanceState,
    ) -> Result<(), DriverError> {
        let Some(id) = state.linode_id else {
            return Ok(());
        };
        let description = state.describe();

        match self
            .call_with_retry("instance lookup", policy, || self.api.get_instance(id))
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                self.log
                    .info(&format!("Linode {description} not found."));
                state.clear();
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        match self
            .call_with_retry("instance delete", policy, || self.api.delete_instance(id))
            .await
        {
            Ok(()) => self
                .log
                .info(&format!("Linode {description} destroyed.")),
            Err(err) if err.is_not_found() => self
                .log
                .info(&format!("Linode {description} not found.")),
            Err(err) => return Err(err),
        }
        state.clear();
        Ok(())
    }
}
