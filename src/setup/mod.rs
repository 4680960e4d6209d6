//! Shell commands run on a freshly booted instance.
//!
//! Commands are plain strings handed to the transport. The target OS family
//! is unknown ahead of time, so each step chains the known mechanisms with
//! `||` and stops at the first that succeeds.

use shell_escape::unix::escape;

const HOSTS_FILE: &str = "/etc/hosts";
const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

/// SSH daemon restart commands, tried in order.
pub const SSHD_RESTART_COMMANDS: [&str; 5] = [
    // Debian, Ubuntu and most systemd distributions
    "systemctl restart ssh",
    // RHEL family
    "systemctl restart sshd",
    // OpenRC and sysvinit
    "/etc/init.d/sshd restart",
    "/etc/init.d/ssh restart",
    // Slackware
    "/etc/rc.d/rc.sshd restart",
];

/// One remote command plus the progress line announcing it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SetupStep {
    /// Message logged before the command runs.
    pub description: &'static str,
    /// Command passed to the transport.
    pub command: String,
}

/// Short host name: everything before the first dot.
#[must_use]
pub fn short_hostname(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}

/// Rewrites `/etc/hosts` for `hostname` and sets the system host name.
#[must_use]
pub fn hostname_command(hostname: &str) -> String {
    let short = short_hostname(hostname);
    let ipv4 = escape(format!("127.0.0.1 {hostname} {short} localhost").into());
    let ipv6 = escape(format!("::1 {hostname} {short} localhost").into());
    let name = escape(hostname.into());
    format!(
        "printf '%s\\n' {ipv4} {ipv6} > {HOSTS_FILE} && \
         {{ hostnamectl set-hostname {name} > /dev/null 2>&1 || hostname {name} > /dev/null 2>&1; }}"
    )
}

/// Turns off SSH password logins and restarts the daemon with whichever
/// mechanism the distribution provides.
#[must_use]
pub fn disable_password_command() -> String {
    let restart = SSHD_RESTART_COMMANDS
        .iter()
        .map(|command| format!("{command} > /dev/null 2>&1"))
        .collect::<Vec<_>>()
        .join(" || ");
    // rc.sshd on Slackware returns before the daemon is listening again.
    format!(
        "sed -ri 's/^#?PasswordAuthentication .*$/PasswordAuthentication no/' {SSHD_CONFIG} && \
         {{ {restart}; }} && sleep 1"
    )
}

/// Builds the post-boot sequence. The password step is included only when
/// the instance was given a key pair and password logins should be disabled.
#[must_use]
pub fn setup_steps(hostname: &str, disable_password_auth: bool) -> Vec<SetupStep> {
    let mut steps = vec![SetupStep {
        description: "Setting hostname...",
        command: hostname_command(hostname),
    }];
    if disable_password_auth {
        steps.push(SetupStep {
            description: "Disabling SSH password login...",
            command: disable_password_command(),
        });
    }
    steps
}
