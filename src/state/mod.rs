//! Persisted instance handle shared between `create` and `destroy`.
//!
//! The host owns the state between invocations and may write it to disk; the
//! orchestrators only fill it after a confirmed create and clear it as a
//! whole on destroy.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Durable record of a created instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstanceState {
    /// Provider id; set only after the create call was confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linode_id: Option<u64>,
    /// Label the provider stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linode_label: Option<String>,
    /// First public IPv4 address, used as the SSH host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Private key used for key-based SSH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<Utf8PathBuf>,
    /// Root password, recorded only when no key pair is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl InstanceState {
    /// Returns `true` when no instance is recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.linode_id.is_none()
    }

    /// Drops every handle field at once.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// `id, label` pair used in progress messages.
    #[must_use]
    pub fn describe(&self) -> String {
        let id = self
            .linode_id
            .map_or_else(|| String::from("?"), |id| id.to_string());
        let label = self.linode_label.as_deref().unwrap_or("?");
        format!("<{id}, {label}>")
    }
}

/// Errors raised while reading or writing the state file.
#[derive(Debug, Error)]
pub enum StateError {
    /// File system access failed.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// The file did not contain a valid state record.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// JSON file holding one [`InstanceState`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateFile {
    path: Utf8PathBuf,
}

impl StateFile {
    /// Wraps `path` without touching the file system.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Reads the state, treating a missing file as empty state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the file exists but cannot be read or
    /// parsed.
    pub fn load(&self) -> Result<InstanceState, StateError> {
        let (parent, file_name) = self.split()?;
        let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(InstanceState::default());
            }
            Err(err) => return Err(self.io_error(&err)),
        };

        let contents = match dir.read_to_string(file_name) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(InstanceState::default());
            }
            Err(err) => return Err(self.io_error(&err)),
        };

        if contents.trim().is_empty() {
            return Ok(InstanceState::default());
        }

        serde_json::from_str(&contents).map_err(|err| StateError::Parse {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    /// Writes `state`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] when the file cannot be written.
    pub fn save(&self, state: &InstanceState) -> Result<(), StateError> {
        let (parent, file_name) = self.split()?;
        Dir::create_ambient_dir_all(parent, ambient_authority())
            .map_err(|err| self.io_error(&err))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| self.io_error(&err))?;
        let rendered = serde_json::to_string_pretty(state).map_err(|err| StateError::Parse {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        dir.write(file_name, rendered)
            .map_err(|err| self.io_error(&err))
    }

    fn split(&self) -> Result<(&Utf8Path, &str), StateError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        let file_name = self.path.file_name().ok_or_else(|| StateError::Io {
            path: self.path.clone(),
            message: String::from("state file path is missing a filename"),
        })?;
        Ok((parent, file_name))
    }

    fn io_error(&self, err: &io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}
