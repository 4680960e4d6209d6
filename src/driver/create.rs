//! Instance creation.
//!
//! The flow is resolve, label, submit, record, poll, wait for SSH, set up.
//! State is written as soon as the provider confirms the instance so that a
//! later failure still leaves the host something to destroy.

use std::collections::HashSet;

use uuid::Uuid;

use crate::backoff::{RetryContext, RetryPolicy, Sleeper};
use crate::failure::{ApiFailure, FailureKind, FieldError, classify};
use crate::label::{LabelError, LabelGenerator};
use crate::linode::{CatalogueKind, CreateInstanceRequest, Instance, LinodeApi};
use crate::log_sink::LogSink;
use crate::provision::{ProvisionSpec, ResolvedIds};
use crate::setup::setup_steps;
use crate::state::InstanceState;
use crate::transport::Transport;

use super::{DriverError, LinodeDriver};

const CLAIM_TAG_PREFIX: &str = "kitchen-claim-";

impl<A, T, L, S> LinodeDriver<A, T, L, S>
where
    A: LinodeApi,
    T: Transport,
    L: LogSink,
    S: Sleeper,
{
    /// Creates an instance for `spec` and records it in `state`.
    ///
    /// Does nothing when `state` already holds an instance id. Otherwise the
    /// instance id, label, address and credentials are written to `state`
    /// immediately after the provider confirms the create, before waiting
    /// for boot.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] whose [`category`](DriverError::category) is
    /// `UserError` for bad input and `ActionFailed` for everything else.
    pub async fn create(
        &self,
        spec: &ProvisionSpec,
        state: &mut InstanceState,
    ) -> Result<(), DriverError> {
        if let Some(id) = state.linode_id {
            self.log
                .info(&format!("Linode <{id}> already exists, skipping create."));
            return Ok(());
        }

        let ids = self.resolve(spec).await?;
        let instance = self.submit(spec, &ids).await?;
        self.record(spec, &instance, state);
        self.log
            .info(&format!("Linode {} created.", state.describe()));

        self.log.info("Waiting for linode to boot...");
        let running = self.wait_for_running(spec, instance.id).await?;
        if state.hostname.is_none() {
            state.hostname = running.first_ipv4().map(str::to_owned);
        }
        if state.hostname.is_none() {
            return Err(DriverError::MissingAddress { id: instance.id });
        }

        self.transport.wait_until_ready(state).await?;
        self.log
            .info(&format!("Linode {} ready for SSH.", state.describe()));

        if spec.bourne_shell {
            self.set_up(spec, state).await?;
        }
        Ok(())
    }

    async fn resolve(&self, spec: &ProvisionSpec) -> Result<ResolvedIds, DriverError> {
        self.log.info(&format!(
            "Resolving region {}, type {} and image {}...",
            spec.region, spec.instance_type, spec.image
        ));
        let kernel = match &spec.kernel {
            Some(kernel) => Some(self.lookup(spec.retry, CatalogueKind::Kernel, kernel).await?),
            None => None,
        };
        Ok(ResolvedIds {
            region: self
                .lookup(spec.retry, CatalogueKind::Region, &spec.region)
                .await?,
            instance_type: self
                .lookup(spec.retry, CatalogueKind::Type, &spec.instance_type)
                .await?,
            image: self
                .lookup(spec.retry, CatalogueKind::Image, &spec.image)
                .await?,
            kernel,
        })
    }

    async fn lookup(
        &self,
        policy: RetryPolicy,
        kind: CatalogueKind,
        name: &str,
    ) -> Result<String, DriverError> {
        let entries = self
            .call_with_retry("catalogue lookup", policy, || self.api.list_catalogue(kind))
            .await?;
        entries
            .into_iter()
            .find(|entry| entry.matches(name))
            .map(|entry| entry.id)
            .ok_or_else(|| DriverError::Unresolved {
                field: kind.field(),
                name: name.to_owned(),
            })
    }

    /// Submits the create request under one shared attempt budget.
    ///
    /// Label conflicts regenerate the label and retry at once; timeouts and
    /// rate limits back off and resubmit the same label. Every request
    /// carries a claim tag unique to this call, so an instance created by a
    /// request whose response was lost is found and adopted instead of
    /// duplicated. A dropped connection or an unreadable success body ends
    /// the loop, but only after the claim tag has been looked up.
    async fn submit(&self, spec: &ProvisionSpec, ids: &ResolvedIds) -> Result<Instance, DriverError> {
        let generator = LabelGenerator::new(&spec.label_prefix);
        let claim_tag = format!("{CLAIM_TAG_PREFIX}{}", Uuid::new_v4().simple());
        let mut context = RetryContext::new(spec.retry);
        let mut label: Option<String> = None;
        let mut lost_response = false;

        loop {
            if lost_response && let Some(instance) = self.find_claimed(spec, &claim_tag).await? {
                return Ok(instance);
            }

            let attempt = context.begin_attempt();
            let current = match label.take() {
                Some(current) => current,
                None => self.generate_label(spec, &generator).await?,
            };
            let request = spec.create_request(ids, &current, &claim_tag);
            self.log_request(&request);

            let failure = match self.api.create_instance(&request).await {
                Ok(instance) => return Ok(instance),
                Err(failure) => failure,
            };
            let kind = classify(&failure);
            context.record_failure(kind.clone());

            match &kind {
                FailureKind::LabelConflict => {
                    self.log.info(
                        "Got [LabelConflict] due to non-unique label when creating server.",
                    );
                    self.log.info("Will try again with a new label if we can.");
                }
                FailureKind::UserError {
                    errors: Some(errors),
                } => {
                    self.report_field_errors(errors);
                    return Err(DriverError::BadRequest {
                        errors: errors.clone(),
                    });
                }
                retryable if retryable.is_retryable() => {
                    lost_response |= matches!(retryable, FailureKind::Transient);
                    label = Some(current);
                }
                _ => {
                    if may_have_created(&failure)
                        && let Some(instance) = self.find_claimed(spec, &claim_tag).await?
                    {
                        return Ok(instance);
                    }
                    self.log.error(&format!("Failed to create server: {failure}"));
                    return Err(DriverError::CreationFailed {
                        attempts: attempt,
                        kind,
                        source: failure,
                    });
                }
            }

            if context.exhausted() {
                if lost_response
                    && let Some(instance) = self.find_claimed(spec, &claim_tag).await?
                {
                    return Ok(instance);
                }
                self.log.error(&format!(
                    "Failed to create server after {attempt} attempt(s): {failure}"
                ));
                return Err(DriverError::CreationFailed {
                    attempts: attempt,
                    kind,
                    source: failure,
                });
            }
            if kind.is_retryable() {
                self.back_off(&mut context, &kind).await;
            } else {
                self.log
                    .warn(&format!("[Attempt #{attempt}] Retrying because [{kind}]"));
            }
        }
    }

    async fn generate_label(
        &self,
        spec: &ProvisionSpec,
        generator: &LabelGenerator,
    ) -> Result<String, DriverError> {
        self.log.info(&format!(
            "Generating label with prefix {}...",
            generator.prefix()
        ));
        generator
            .generate(&self.entropy, || self.existing_labels(spec.retry))
            .await
            .map_err(|err| match err {
                LabelError::Exhausted { prefix } => {
                    self.log.error(&format!(
                        "Unable to generate a unique label with prefix {prefix}."
                    ));
                    self.log.error("Might need to cleanup your account.");
                    DriverError::LabelExhausted { prefix }
                }
                LabelError::Listing(err) => err,
            })
    }

    async fn existing_labels(&self, policy: RetryPolicy) -> Result<HashSet<String>, DriverError> {
        let instances = self
            .call_with_retry("instance listing", policy, || self.api.list_instances())
            .await?;
        Ok(instances.into_iter().map(|instance| instance.label).collect())
    }

    async fn find_claimed(
        &self,
        spec: &ProvisionSpec,
        claim_tag: &str,
    ) -> Result<Option<Instance>, DriverError> {
        let instances = self
            .call_with_retry("instance listing", spec.retry, || self.api.list_instances())
            .await?;
        let claimed = instances
            .into_iter()
            .find(|instance| instance.has_tag(claim_tag));
        if let Some(instance) = &claimed {
            self.log.info(&format!(
                "Linode <{}, {}> was created by an earlier attempt.",
                instance.id, instance.label
            ));
        }
        Ok(claimed)
    }

    fn log_request(&self, request: &CreateInstanceRequest) {
        let mut lines = vec![
            String::from("Creating Linode:"),
            format!("  label:  {}", request.label),
            format!("  region: {}", request.region),
            format!("  image:  {}", request.image),
            format!("  type:   {}", request.instance_type),
            format!("  tags:   {}", request.tags.join(", ")),
        ];
        if let Some(kernel) = &request.kernel {
            lines.push(format!("  kernel: {kernel}"));
        }
        if let Some(swap_size) = request.swap_size {
            lines.push(format!("  swap_size: {swap_size}"));
        }
        if request.private_ip {
            lines.push(String::from("  private_ip: true"));
        }
        if let Some(stackscript_id) = request.stackscript_id {
            lines.push(format!("  stackscript_id: {stackscript_id}"));
        }
        for line in lines {
            self.log.info(&line);
        }
    }

    fn report_field_errors(&self, errors: &[FieldError]) {
        for error in errors {
            self.log.error("error:");
            if let Some(field) = &error.field {
                self.log.error(&format!("  field:  {field}"));
            }
            self.log.error(&format!("  reason: {}", error.reason));
        }
    }

    fn record(&self, spec: &ProvisionSpec, instance: &Instance, state: &mut InstanceState) {
        state.linode_id = Some(instance.id);
        state.linode_label = Some(instance.label.clone());
        state.hostname = instance.first_ipv4().map(str::to_owned);
        if spec.has_key_pair() {
            state.ssh_key.clone_from(&spec.private_key_path);
            state.password = None;
        } else {
            self.log
                .warn("Using SSH password auth, some things may not work.");
            state.ssh_key = None;
            state.password = Some(spec.root_password.clone());
        }
    }

    async fn wait_for_running(&self, spec: &ProvisionSpec, id: u64) -> Result<Instance, DriverError> {
        for _ in 0..spec.boot_poll_limit {
            let instance = self
                .call_with_retry("status check", spec.retry, || self.api.get_instance(id))
                .await
                .map_err(|err| {
                    if err.is_not_found() {
                        DriverError::Vanished { id }
                    } else {
                        err
                    }
                })?;
            if instance.is_running() {
                return Ok(instance);
            }
            self.sleeper.sleep(spec.poll_interval).await;
        }
        Err(DriverError::BootTimeout {
            id,
            polls: spec.boot_poll_limit,
        })
    }

    async fn set_up(&self, spec: &ProvisionSpec, state: &InstanceState) -> Result<(), DriverError> {
        for step in setup_steps(&spec.hostname, spec.disables_password_auth()) {
            self.log.info(step.description);
            let output = self.transport.execute(state, &step.command).await?;
            if !output.is_success() {
                self.log.warn(&format!(
                    "{} exited with status {}: {}",
                    step.description.trim_end_matches('.'),
                    output.status_label(),
                    output.stderr.trim()
                ));
            }
        }
        self.log.info("Done setting up server.");
        Ok(())
    }
}

/// The request may have reached the provider even though no usable reply
/// came back.
const fn may_have_created(failure: &ApiFailure) -> bool {
    matches!(
        failure,
        ApiFailure::Transport { .. } | ApiFailure::Decode { .. }
    )
}
