//! Remote command transport for created instances.
//!
//! The orchestrators use [`Transport`] to wait for the control channel and to
//! run the post-boot commands. [`SshTransport`] drives the system `ssh`
//! client through a [`CommandRunner`] so tests can script the outcomes.
//! Key logins run `ssh` in batch mode; password logins run it under
//! `sshpass -e` with the password in `SSHPASS`.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::state::InstanceState;

mod types;

pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, RemoteInvocation};

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_SSH_USER: &str = "root";
const SSHPASS_BIN: &str = "sshpass";
const SSHPASS_ENV: &str = "SSHPASS";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const READY_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors raised by a transport.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// The command could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Error reported by the operating system.
        message: String,
    },
    /// The state does not record an address to connect to.
    #[error("instance state has no hostname to connect to")]
    MissingHost,
    /// The state records neither a private key nor a password.
    #[error("instance state has no SSH key or password to log in with")]
    MissingCredentials,
    /// The control channel never became reachable.
    #[error("timed out waiting for {host}:{port} to accept connections")]
    Timeout {
        /// Host that was polled.
        host: String,
        /// Port that was polled.
        port: u16,
    },
}

/// Future returned by transport operations.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Connection to a created instance.
pub trait Transport {
    /// Blocks until the instance accepts control connections.
    fn wait_until_ready<'a>(&'a self, state: &'a InstanceState) -> TransportFuture<'a, ()>;

    /// Runs `command` on the instance.
    fn execute<'a>(
        &'a self,
        state: &'a InstanceState,
        command: &'a str,
    ) -> TransportFuture<'a, CommandOutput>;
}

/// Transport that shells out to the system `ssh` client.
#[derive(Clone, Debug)]
pub struct SshTransport<R: CommandRunner> {
    runner: R,
    ssh_bin: String,
    user: String,
    port: u16,
    poll_interval: Duration,
    ready_timeout: Duration,
}

impl SshTransport<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub fn with_process_runner() -> Self {
        Self::new(ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshTransport<R> {
    /// Creates a transport connecting as `root` on port 22.
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            ssh_bin: String::from("ssh"),
            user: DEFAULT_SSH_USER.to_owned(),
            port: DEFAULT_SSH_PORT,
            poll_interval: POLL_INTERVAL,
            ready_timeout: READY_TIMEOUT,
        }
    }

    /// Overrides the remote user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Overrides the SSH port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the readiness polling cadence and deadline.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_readiness(mut self, poll_interval: Duration, ready_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.ready_timeout = ready_timeout;
        self
    }

    fn build_invocation(
        &self,
        host: &str,
        state: &InstanceState,
        command: &str,
    ) -> Result<RemoteInvocation, TransportError> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.port.to_string()),
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=no"),
            OsString::from("-o"),
            OsString::from("UserKnownHostsFile=/dev/null"),
        ];
        let login = OsString::from(format!("{}@{host}", self.user));

        if let Some(key) = &state.ssh_key {
            args.extend(
                ["-i", key.as_str(), "-o", "BatchMode=yes"]
                    .into_iter()
                    .map(OsString::from),
            );
            args.push(login);
            args.push(OsString::from(command));
            return Ok(RemoteInvocation::new(self.ssh_bin.clone(), args));
        }

        let password = state
            .password
            .as_deref()
            .ok_or(TransportError::MissingCredentials)?;
        args.extend(
            [
                "-o",
                "PreferredAuthentications=password",
                "-o",
                "PubkeyAuthentication=no",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(login);
        args.push(OsString::from(command));
        let mut wrapped = vec![OsString::from("-e"), OsString::from(&self.ssh_bin)];
        wrapped.extend(args);
        Ok(RemoteInvocation::new(SSHPASS_BIN, wrapped).with_env(SSHPASS_ENV, password))
    }
}

impl<R> Transport for SshTransport<R>
where
    R: CommandRunner + Sync,
{
    fn wait_until_ready<'a>(&'a self, state: &'a InstanceState) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let host = state.hostname.as_deref().ok_or(TransportError::MissingHost)?;
            let deadline = Instant::now() + self.ready_timeout;
            while Instant::now() <= deadline {
                let connect = timeout(CONNECT_TIMEOUT, TcpStream::connect((host, self.port))).await;
                if matches!(connect, Ok(Ok(_))) {
                    return Ok(());
                }
                sleep(self.poll_interval).await;
            }

            Err(TransportError::Timeout {
                host: host.to_owned(),
                port: self.port,
            })
        })
    }

    fn execute<'a>(
        &'a self,
        state: &'a InstanceState,
        command: &'a str,
    ) -> TransportFuture<'a, CommandOutput> {
        Box::pin(async move {
            let host = state.hostname.as_deref().ok_or(TransportError::MissingHost)?;
            let invocation = self.build_invocation(host, state, command)?;
            self.runner.run(&invocation)
        })
    }
}
