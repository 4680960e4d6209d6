//! Immutable description of the instance to create.
//!
//! A [`ProvisionSpec`] is produced once per `create` call after the host has
//! applied its defaults (see [`crate::config`]); the orchestrators never read
//! configuration directly.

use std::collections::BTreeMap;
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::backoff::RetryPolicy;
use crate::linode::CreateInstanceRequest;

/// Default interval between instance status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of status checks before giving up on boot.
pub const DEFAULT_BOOT_POLL_LIMIT: u32 = 120;

/// Errors raised when a spec is incomplete.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// A required field is empty.
    #[error("missing or empty field: {0}")]
    MissingField(String),
}

/// StackScript deployment parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackScript {
    /// StackScript id.
    pub id: u64,
    /// User-defined field values.
    pub data: BTreeMap<String, String>,
}

/// Provider ids the symbolic spec names resolved to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedIds {
    /// Region id.
    pub region: String,
    /// Instance type id.
    pub instance_type: String,
    /// Image id.
    pub image: String,
    /// Kernel id, when one was requested.
    pub kernel: Option<String>,
}

/// Everything the create orchestrator needs to know.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionSpec {
    /// Region id or label.
    pub region: String,
    /// Instance type id or label.
    pub instance_type: String,
    /// Image id or label.
    pub image: String,
    /// Optional kernel id or label.
    pub kernel: Option<String>,
    /// Prefix for generated labels, already normalised.
    pub label_prefix: String,
    /// Host name configured on the instance after boot.
    pub hostname: String,
    /// Tags applied to the instance.
    pub tags: Vec<String>,
    /// Public key authorised for root.
    pub authorized_key: Option<String>,
    /// Account users whose keys are authorised for root.
    pub authorized_users: Vec<String>,
    /// Root password.
    pub root_password: String,
    /// Swap size in MB.
    pub swap_size: Option<u32>,
    /// Whether to allocate a private IPv4 address.
    pub private_ip: bool,
    /// Optional StackScript deployment.
    pub stackscript: Option<StackScript>,
    /// Private half of the key pair used for SSH.
    pub private_key_path: Option<Utf8PathBuf>,
    /// Whether to disable SSH password logins after boot.
    pub disable_ssh_password: bool,
    /// Whether the target speaks a Bourne-compatible shell.
    pub bourne_shell: bool,
    /// Attempt budget and backoff schedule for provider calls.
    pub retry: RetryPolicy,
    /// Interval between status checks while waiting for boot.
    pub poll_interval: Duration,
    /// Number of status checks before giving up on boot.
    pub boot_poll_limit: u32,
}

impl ProvisionSpec {
    /// Starts a builder for a [`ProvisionSpec`].
    #[must_use]
    pub fn builder() -> ProvisionSpecBuilder {
        ProvisionSpecBuilder::new()
    }

    /// Validates that every required field is present.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::MissingField`] naming the first empty field.
    pub fn validate(&self) -> Result<(), SpecError> {
        let required = [
            ("region", &self.region),
            ("type", &self.instance_type),
            ("image", &self.image),
            ("label", &self.label_prefix),
            ("hostname", &self.hostname),
            ("password", &self.root_password),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(SpecError::MissingField(field.to_owned()));
            }
        }
        Ok(())
    }

    /// Returns `true` when both halves of an SSH key pair are configured.
    #[must_use]
    pub const fn has_key_pair(&self) -> bool {
        self.private_key_path.is_some() && self.authorized_key.is_some()
    }

    /// Returns `true` when password logins should be disabled after boot.
    #[must_use]
    pub const fn disables_password_auth(&self) -> bool {
        self.has_key_pair() && self.disable_ssh_password
    }

    /// Renders the create payload for `label`. `claim_tag` marks the
    /// instance as belonging to this create call.
    #[must_use]
    pub fn create_request(
        &self,
        ids: &ResolvedIds,
        label: &str,
        claim_tag: &str,
    ) -> CreateInstanceRequest {
        let mut tags = self.tags.clone();
        tags.push(claim_tag.to_owned());
        CreateInstanceRequest {
            region: ids.region.clone(),
            instance_type: ids.instance_type.clone(),
            image: ids.image.clone(),
            label: label.to_owned(),
            tags,
            kernel: ids.kernel.clone(),
            stackscript_id: self.stackscript.as_ref().map(|script| script.id),
            stackscript_data: self.stackscript.as_ref().map(|script| script.data.clone()),
            swap_size: self.swap_size,
            private_ip: self.private_ip,
            root_pass: self.root_password.clone(),
            authorized_keys: self.authorized_key.iter().cloned().collect(),
            authorized_users: self.authorized_users.clone(),
        }
    }
}

/// Builder for [`ProvisionSpec`] that trims inputs and validates on build.
#[derive(Clone, Debug)]
pub struct ProvisionSpecBuilder {
    spec: ProvisionSpec,
}

impl Default for ProvisionSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisionSpecBuilder {
    /// Creates a builder with the ambient defaults filled in.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: ProvisionSpec {
                region: String::new(),
                instance_type: String::new(),
                image: String::new(),
                kernel: None,
                label_prefix: String::new(),
                hostname: String::new(),
                tags: Vec::new(),
                authorized_key: None,
                authorized_users: Vec::new(),
                root_password: String::new(),
                swap_size: None,
                private_ip: false,
                stackscript: None,
                private_key_path: None,
                disable_ssh_password: true,
                bourne_shell: true,
                retry: RetryPolicy::default(),
                poll_interval: DEFAULT_POLL_INTERVAL,
                boot_poll_limit: DEFAULT_BOOT_POLL_LIMIT,
            },
        }
    }

    /// Sets the region.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.spec.region = value.into();
        self
    }

    /// Sets the instance type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.spec.instance_type = value.into();
        self
    }

    /// Sets the image.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.spec.image = value.into();
        self
    }

    /// Sets the optional kernel.
    #[must_use]
    pub fn kernel(mut self, value: Option<String>) -> Self {
        self.spec.kernel = value;
        self
    }

    /// Sets the label prefix.
    #[must_use]
    pub fn label_prefix(mut self, value: impl Into<String>) -> Self {
        self.spec.label_prefix = value.into();
        self
    }

    /// Sets the host name.
    #[must_use]
    pub fn hostname(mut self, value: impl Into<String>) -> Self {
        self.spec.hostname = value.into();
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn tags(mut self, value: Vec<String>) -> Self {
        self.spec.tags = value;
        self
    }

    /// Sets the authorised public key.
    #[must_use]
    pub fn authorized_key(mut self, value: Option<String>) -> Self {
        self.spec.authorized_key = value;
        self
    }

    /// Sets the authorised account users.
    #[must_use]
    pub fn authorized_users(mut self, value: Vec<String>) -> Self {
        self.spec.authorized_users = value;
        self
    }

    /// Sets the root password.
    #[must_use]
    pub fn root_password(mut self, value: impl Into<String>) -> Self {
        self.spec.root_password = value.into();
        self
    }

    /// Sets the swap size in MB.
    #[must_use]
    pub const fn swap_size(mut self, value: Option<u32>) -> Self {
        self.spec.swap_size = value;
        self
    }

    /// Sets the private networking flag.
    #[must_use]
    pub const fn private_ip(mut self, value: bool) -> Self {
        self.spec.private_ip = value;
        self
    }

    /// Sets the StackScript deployment.
    #[must_use]
    pub fn stackscript(mut self, value: Option<StackScript>) -> Self {
        self.spec.stackscript = value;
        self
    }

    /// Sets the private key path.
    #[must_use]
    pub fn private_key_path(mut self, value: Option<Utf8PathBuf>) -> Self {
        self.spec.private_key_path = value;
        self
    }

    /// Sets whether password logins are disabled after boot.
    #[must_use]
    pub const fn disable_ssh_password(mut self, value: bool) -> Self {
        self.spec.disable_ssh_password = value;
        self
    }

    /// Sets whether the target speaks a Bourne-compatible shell.
    #[must_use]
    pub const fn bourne_shell(mut self, value: bool) -> Self {
        self.spec.bourne_shell = value;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry(mut self, value: RetryPolicy) -> Self {
        self.spec.retry = value;
        self
    }

    /// Sets the boot polling cadence and budget.
    #[must_use]
    pub const fn boot_polling(mut self, interval: Duration, limit: u32) -> Self {
        self.spec.poll_interval = interval;
        self.spec.boot_poll_limit = limit;
        self
    }

    /// Builds and validates the [`ProvisionSpec`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::MissingField`] when a required field is empty.
    pub fn build(self) -> Result<ProvisionSpec, SpecError> {
        let mut spec = self.spec;
        for value in [
            &mut spec.region,
            &mut spec.instance_type,
            &mut spec.image,
            &mut spec.label_prefix,
            &mut spec.hostname,
        ] {
            *value = value.trim().to_owned();
        }
        spec.kernel = spec
            .kernel
            .map(|kernel| kernel.trim().to_owned())
            .filter(|kernel| !kernel.is_empty());
        spec.authorized_key = spec
            .authorized_key
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty());
        spec.validate()?;
        Ok(spec)
    }
}
