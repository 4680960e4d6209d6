//! Configuration loading via `ortho-config`.
//!
//! [`LinodeConfig`] merges defaults, `kitchen-linode.toml` and `LINODE_*`
//! environment variables. [`LinodeConfig::to_spec`] applies the host-side
//! defaults and produces the immutable [`ProvisionSpec`] the create
//! orchestrator consumes.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::io;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::backoff::RetryPolicy;
use crate::label::{default_prefix, normalise_prefix};
use crate::linode::DEFAULT_API_BASE_URL;
use crate::provision::{ProvisionSpec, StackScript};

/// Private keys probed, in order, when none is configured.
pub const DEFAULT_PRIVATE_KEYS: [&str; 4] = [
    "~/.ssh/id_rsa",
    "~/.ssh/id_dsa",
    "~/.ssh/identity",
    "~/.ssh/id_ecdsa",
];

const FALLBACK_JOB_NAME: &str = "job";

/// Linode driver settings derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "LINODE",
    discovery(
        app_name = "kitchen-linode",
        env_var = "KITCHEN_LINODE_CONFIG_PATH",
        config_file_name = "kitchen-linode.toml",
        dotfile_name = ".kitchen-linode.toml",
        project_file_name = "kitchen-linode.toml"
    )
)]
pub struct LinodeConfig {
    /// Personal access token used for every API call. This value is required.
    pub token: String,
    /// Root password. A random UUID is generated when absent.
    pub password: Option<String>,
    /// Label prefix. Defaults to `kitchen-{job}-{instance}`.
    pub label: Option<String>,
    /// Comma separated tags.
    #[ortho_config(default = "kitchen".to_owned())]
    pub tags: String,
    /// Host name set on the instance. Defaults to the label, then the
    /// instance name.
    pub hostname: Option<String>,
    /// Image id or label. Defaults to the platform name.
    pub image: Option<String>,
    /// Region id or label.
    #[ortho_config(default = "us-east".to_owned())]
    pub region: String,
    /// Instance type id or label.
    #[ortho_config(default = "g6-nanode-1".to_owned())]
    pub instance_type: String,
    /// Kernel id or label.
    pub kernel: Option<String>,
    /// StackScript to deploy.
    pub stackscript_id: Option<u64>,
    /// StackScript user-defined fields as a JSON object of strings.
    pub stackscript_data: Option<String>,
    /// Swap size in MB.
    pub swap_size: Option<u32>,
    /// Whether to allocate a private IPv4 address.
    #[ortho_config(default = false)]
    pub private_ip: bool,
    /// Comma separated account users whose keys are authorised for root.
    pub auth_users: Option<String>,
    /// Private key used to reach the instance. Supports `~/` expansion.
    pub private_key: Option<String>,
    /// Public key installed for root. Defaults to `<private_key>.pub`.
    pub public_key: Option<String>,
    /// Whether to disable SSH password logins once a key pair is installed.
    #[ortho_config(default = true)]
    pub disable_ssh_password: bool,
    /// Attempt budget for provider calls.
    #[ortho_config(default = 5)]
    pub api_retries: u32,
    /// Upper bound on exponential backoff delays, in seconds.
    pub max_backoff_secs: Option<u64>,
    /// Seconds between status checks while waiting for boot.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Number of status checks before giving up on boot.
    #[ortho_config(default = 120)]
    pub boot_poll_limit: u32,
    /// API endpoint, overridable for testing against a local server.
    #[ortho_config(default = DEFAULT_API_BASE_URL.to_owned())]
    pub api_base_url: String,
}

/// Identity of the test-kitchen instance being provisioned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostIdentity {
    /// Kitchen instance name (for example `default-debian-12`).
    pub instance_name: String,
    /// Platform name, used as the image when none is configured.
    pub platform_name: String,
    /// Root of the kitchen project.
    pub kitchen_root: Option<Utf8PathBuf>,
    /// CI job name.
    pub job_name: Option<String>,
    /// Whether the platform uses a Bourne-compatible shell.
    pub bourne_shell: bool,
}

impl HostIdentity {
    /// Creates an identity for a Bourne-shell platform.
    #[must_use]
    pub fn new(instance_name: impl Into<String>, platform_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            platform_name: platform_name.into(),
            kitchen_root: None,
            job_name: None,
            bourne_shell: true,
        }
    }

    /// Sets the kitchen root.
    #[must_use]
    pub fn with_kitchen_root(mut self, root: Option<Utf8PathBuf>) -> Self {
        self.kitchen_root = root;
        self
    }

    /// Sets the CI job name.
    #[must_use]
    pub fn with_job_name(mut self, job_name: Option<String>) -> Self {
        self.job_name = job_name.filter(|name| !name.trim().is_empty());
        self
    }

    /// Sets whether the platform uses a Bourne-compatible shell.
    #[must_use]
    pub const fn with_bourne_shell(mut self, bourne_shell: bool) -> Self {
        self.bourne_shell = bourne_shell;
        self
    }

    /// Job component of the default label: the CI job name, else the
    /// kitchen root's directory name, else `job`.
    #[must_use]
    pub fn job(&self) -> &str {
        self.job_name
            .as_deref()
            .or_else(|| self.kitchen_root.as_deref().and_then(Utf8Path::file_name))
            .unwrap_or(FALLBACK_JOB_NAME)
    }
}

/// Reads the CI job name from `JOB_NAME` (Jenkins) or `GITHUB_JOB`.
#[must_use]
pub fn job_name_from_env() -> Option<String> {
    ["JOB_NAME", "GITHUB_JOB"]
        .into_iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl LinodeConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to kitchen-linode.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("kitchen-linode")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages name
    /// the environment variable and configuration key that supply the value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when the retry budget or the boot poll
    /// limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.token,
            &FieldMetadata::new("Linode API token", "LINODE_TOKEN", "token"),
        )?;
        Self::require_field(
            &self.region,
            &FieldMetadata::new("region", "LINODE_REGION", "region"),
        )?;
        Self::require_field(
            &self.instance_type,
            &FieldMetadata::new("instance type", "LINODE_INSTANCE_TYPE", "instance_type"),
        )?;
        Self::require_field(
            &self.api_base_url,
            &FieldMetadata::new("API base URL", "LINODE_API_BASE_URL", "api_base_url"),
        )?;
        if self.api_retries == 0 {
            return Err(ConfigError::Invalid(String::from(
                "api_retries must be at least 1 (LINODE_API_RETRIES)",
            )));
        }
        if self.boot_poll_limit == 0 {
            return Err(ConfigError::Invalid(String::from(
                "boot_poll_limit must be at least 1 (LINODE_BOOT_POLL_LIMIT)",
            )));
        }
        Ok(())
    }

    /// Retry policy described by `api_retries` and `max_backoff_secs`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.api_retries);
        match self.max_backoff_secs {
            Some(secs) => policy.with_ceiling(Duration::from_secs(secs)),
            None => policy,
        }
    }

    /// Applies the host defaults and builds the spec for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails, the StackScript data is
    /// not a JSON object of strings, or the public key cannot be read.
    pub fn to_spec(&self, identity: &HostIdentity) -> Result<ProvisionSpec, ConfigError> {
        self.validate()?;

        let configured_label = non_blank(self.label.as_deref());
        let label_prefix = normalise_prefix(
            &configured_label
                .map_or_else(|| default_prefix(identity.job(), &identity.instance_name), str::to_owned),
        );
        let hostname = non_blank(self.hostname.as_deref())
            .or(configured_label)
            .unwrap_or(&identity.instance_name)
            .to_owned();
        let image = non_blank(self.image.as_deref())
            .unwrap_or(&identity.platform_name)
            .to_owned();
        let root_password = non_blank(self.password.as_deref())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

        let private_key_path = self.private_key_path()?;
        let authorized_key = self.authorized_key(private_key_path.as_deref())?;

        ProvisionSpec::builder()
            .region(&self.region)
            .instance_type(&self.instance_type)
            .image(image)
            .kernel(non_blank(self.kernel.as_deref()).map(str::to_owned))
            .label_prefix(label_prefix)
            .hostname(hostname)
            .tags(split_list(&self.tags))
            .authorized_key(authorized_key)
            .authorized_users(self.auth_users.as_deref().map(split_list).unwrap_or_default())
            .root_password(root_password)
            .swap_size(self.swap_size)
            .private_ip(self.private_ip)
            .stackscript(self.stackscript()?)
            .private_key_path(private_key_path)
            .disable_ssh_password(self.disable_ssh_password)
            .bourne_shell(identity.bourne_shell)
            .retry(self.retry_policy())
            .boot_polling(Duration::from_secs(self.poll_interval_secs), self.boot_poll_limit)
            .build()
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    fn private_key_path(&self) -> Result<Option<Utf8PathBuf>, ConfigError> {
        if let Some(configured) = non_blank(self.private_key.as_deref()) {
            return Ok(Some(Utf8PathBuf::from(expand_tilde(configured))));
        }
        for candidate in DEFAULT_PRIVATE_KEYS {
            let path = Utf8PathBuf::from(expand_tilde(candidate));
            if path_exists(&path)? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    fn authorized_key(&self, private_key: Option<&Utf8Path>) -> Result<Option<String>, ConfigError> {
        let path = match non_blank(self.public_key.as_deref()) {
            Some(configured) => Utf8PathBuf::from(expand_tilde(configured)),
            None => {
                let Some(private_key) = private_key else {
                    return Ok(None);
                };
                let candidate = Utf8PathBuf::from(format!("{private_key}.pub"));
                if !path_exists(&candidate)? {
                    return Ok(None);
                }
                candidate
            }
        };
        let contents = read_file(&path)?;
        Ok(non_blank(Some(contents.as_str())).map(str::to_owned))
    }

    fn stackscript(&self) -> Result<Option<StackScript>, ConfigError> {
        let Some(id) = self.stackscript_id else {
            return Ok(None);
        };
        let data = match non_blank(self.stackscript_data.as_deref()) {
            Some(raw) => serde_json::from_str::<BTreeMap<String, String>>(raw).map_err(|err| {
                ConfigError::Invalid(format!(
                    "stackscript_data must be a JSON object of strings: {err}"
                ))
            })?,
            None => BTreeMap::new(),
        };
        Ok(Some(StackScript { id, data }))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If `HOME` is not set the input is returned unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), ConfigError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| ConfigError::Io {
        path: path.to_path_buf(),
        message: String::from("path is missing a file name"),
    })?;
    Ok((parent, file_name))
}

fn path_exists(path: &Utf8Path) -> Result<bool, ConfigError> {
    let (parent, file_name) = split_path(path)?;
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir.try_exists(file_name).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(ConfigError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn read_file(path: &Utf8Path) -> Result<String, ConfigError> {
    let (parent, file_name) = split_path(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ConfigError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;
    dir.read_to_string(file_name).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A referenced file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Error reported by the filesystem.
        message: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
