//! Test support utilities shared across unit and integration tests.
//!
//! Every double records what it was asked to do behind an `Arc<Mutex<_>>`
//! so clones handed to the driver and clones kept by the test observe the
//! same script.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backoff::{SleepFuture, Sleeper};
use crate::failure::ApiFailure;
use crate::linode::{
    ApiFuture, CatalogueEntry, CatalogueKind, CreateInstanceRequest, Instance, LinodeApi,
    STATUS_RUNNING,
};
use crate::log_sink::LogSink;
use crate::state::InstanceState;
use crate::transport::{
    CommandOutput, CommandRunner, RemoteInvocation, Transport, TransportError, TransportFuture,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds an instance record for scripted responses.
#[must_use]
pub fn instance(id: u64, label: &str, status: &str, ipv4: &[&str]) -> Instance {
    Instance {
        id,
        label: label.to_owned(),
        status: status.to_owned(),
        ipv4: ipv4.iter().map(|address| (*address).to_owned()).collect(),
        tags: Vec::new(),
    }
}

/// Builds a running instance with one public address.
#[must_use]
pub fn running_instance(id: u64, label: &str) -> Instance {
    instance(id, label, STATUS_RUNNING, &["192.0.2.10"])
}

/// Builds a client-side timeout failure.
#[must_use]
pub fn timeout_failure() -> ApiFailure {
    ApiFailure::Timeout {
        message: String::from("operation timed out"),
    }
}

/// Builds an HTTP failure with the given status, `Retry-After` hint and body.
#[must_use]
pub fn http_failure(status: u16, retry_after: Option<u64>, body: &str) -> ApiFailure {
    ApiFailure::Http {
        status,
        retry_after,
        body: body.to_owned(),
    }
}

/// Builds the provider's duplicate-label rejection.
#[must_use]
pub fn label_conflict_failure() -> ApiFailure {
    http_failure(
        400,
        None,
        r#"{"errors":[{"field":"label","reason":"Label must be unique among your Linodes"}]}"#,
    )
}

/// One call observed by [`ScriptedApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApiCall {
    /// `list_instances`.
    ListInstances,
    /// `create_instance` with the submitted payload.
    Create(CreateInstanceRequest),
    /// `get_instance` for the id.
    Get(u64),
    /// `delete_instance` for the id.
    Delete(u64),
    /// `list_catalogue` for the kind.
    Catalogue(CatalogueKind),
}

#[derive(Debug)]
enum CreateResponse {
    Reply(Result<Instance, ApiFailure>),
    LostReply { id: u64, failure: ApiFailure },
    LabelTaken(u64),
}

#[derive(Debug, Default)]
struct ApiScript {
    listing: Vec<Instance>,
    list_responses: VecDeque<Result<Vec<Instance>, ApiFailure>>,
    create_responses: VecDeque<CreateResponse>,
    get_responses: VecDeque<Result<Instance, ApiFailure>>,
    delete_responses: VecDeque<Result<(), ApiFailure>>,
    catalogues: Vec<(CatalogueKind, Vec<CatalogueEntry>)>,
    calls: Vec<ApiCall>,
}

/// Scripted provider that replays queued responses in FIFO order.
///
/// When a queue runs dry the double falls back to a benign answer: the
/// standing listing for `list_instances`, success for `delete_instance`, and
/// a transport failure for `create_instance` and `get_instance`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedApi {
    script: Arc<Mutex<ApiScript>>,
}

impl ScriptedApi {
    /// Creates a provider with an empty account and no catalogues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider whose catalogues contain the usual test entries:
    /// `us-east`, `g6-nanode-1`, `linode/debian12` and `linode/grub2`.
    #[must_use]
    pub fn with_standard_catalogues() -> Self {
        let api = Self::new();
        api.set_catalogue(CatalogueKind::Region, &[("us-east", "Newark, NJ")]);
        api.set_catalogue(CatalogueKind::Type, &[("g6-nanode-1", "Nanode 1GB")]);
        api.set_catalogue(CatalogueKind::Image, &[("linode/debian12", "Debian 12")]);
        api.set_catalogue(CatalogueKind::Kernel, &[("linode/grub2", "GRUB 2")]);
        api
    }

    /// Replaces the entries of one catalogue.
    pub fn set_catalogue(&self, kind: CatalogueKind, entries: &[(&str, &str)]) {
        let entries = entries
            .iter()
            .map(|(id, label)| CatalogueEntry {
                id: (*id).to_owned(),
                label: (*label).to_owned(),
            })
            .collect();
        let mut script = lock(&self.script);
        script.catalogues.retain(|(existing, _)| *existing != kind);
        script.catalogues.push((kind, entries));
    }

    /// Sets the standing account listing returned when no listing response
    /// is queued.
    pub fn set_listing(&self, instances: Vec<Instance>) {
        lock(&self.script).listing = instances;
    }

    /// Sets the standing listing to instances carrying `labels`.
    pub fn set_existing_labels<I, S>(&self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let listing = labels
            .into_iter()
            .zip(1_u64..)
            .map(|(label, id)| instance(id + 10_000, &label.into(), STATUS_RUNNING, &[]))
            .collect();
        self.set_listing(listing);
    }

    /// Queues a listing response.
    pub fn push_list(&self, response: Result<Vec<Instance>, ApiFailure>) {
        lock(&self.script).list_responses.push_back(response);
    }

    /// Queues a create response.
    pub fn push_create(&self, response: Result<Instance, ApiFailure>) {
        lock(&self.script)
            .create_responses
            .push_back(CreateResponse::Reply(response));
    }

    /// Queues a create that succeeds on the provider side but whose response
    /// is lost: the instance joins the standing listing with id `id` and the
    /// submitted label and tags, and the caller sees a timeout.
    pub fn push_lost_create(&self, id: u64) {
        self.push_lost_create_with(id, timeout_failure());
    }

    /// Like [`Self::push_lost_create`], but the caller sees `failure`
    /// instead of a timeout; a [`ApiFailure::Transport`] models a connection
    /// dropped after the request was sent.
    pub fn push_lost_create_with(&self, id: u64, failure: ApiFailure) {
        lock(&self.script)
            .create_responses
            .push_back(CreateResponse::LostReply { id, failure });
    }

    /// Queues a create that loses a race for its label: an instance with id
    /// `id` and the submitted label joins the standing listing, and the
    /// caller sees the provider's label conflict error.
    pub fn push_label_race(&self, id: u64) {
        lock(&self.script)
            .create_responses
            .push_back(CreateResponse::LabelTaken(id));
    }

    /// Queues a get response.
    pub fn push_get(&self, response: Result<Instance, ApiFailure>) {
        lock(&self.script).get_responses.push_back(response);
    }

    /// Queues a delete response.
    pub fn push_delete(&self, response: Result<(), ApiFailure>) {
        lock(&self.script).delete_responses.push_back(response);
    }

    /// Returns every call observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.script).calls.clone()
    }

    /// Returns the payloads of every create call.
    #[must_use]
    pub fn create_requests(&self) -> Vec<CreateInstanceRequest> {
        lock(&self.script)
            .calls
            .iter()
            .filter_map(|call| match call {
                ApiCall::Create(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Counts calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        lock(&self.script)
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    fn record(&self, call: ApiCall) -> MutexGuard<'_, ApiScript> {
        let mut script = lock(&self.script);
        script.calls.push(call);
        script
    }
}

fn unscripted(operation: &str) -> ApiFailure {
    ApiFailure::Transport {
        message: format!("no scripted response for {operation}"),
    }
}

impl LinodeApi for ScriptedApi {
    fn list_instances(&self) -> ApiFuture<'_, Vec<Instance>> {
        let mut script = self.record(ApiCall::ListInstances);
        let response = script
            .list_responses
            .pop_front()
            .unwrap_or_else(|| Ok(script.listing.clone()));
        Box::pin(async move { response })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> ApiFuture<'a, Instance> {
        let mut script = self.record(ApiCall::Create(request.clone()));
        let response = match script.create_responses.pop_front() {
            Some(CreateResponse::Reply(response)) => response,
            Some(CreateResponse::LostReply { id, failure }) => {
                let mut created = instance(id, &request.label, "provisioning", &["192.0.2.10"]);
                created.tags.clone_from(&request.tags);
                script.listing.push(created);
                Err(failure)
            }
            Some(CreateResponse::LabelTaken(id)) => {
                script.listing.push(running_instance(id, &request.label));
                Err(label_conflict_failure())
            }
            None => Err(unscripted("create_instance")),
        };
        Box::pin(async move { response })
    }

    fn get_instance(&self, id: u64) -> ApiFuture<'_, Instance> {
        let mut script = self.record(ApiCall::Get(id));
        let response = script
            .get_responses
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("get_instance")));
        Box::pin(async move { response })
    }

    fn delete_instance(&self, id: u64) -> ApiFuture<'_, ()> {
        let mut script = self.record(ApiCall::Delete(id));
        let response = script.delete_responses.pop_front().unwrap_or(Ok(()));
        Box::pin(async move { response })
    }

    fn list_catalogue(&self, kind: CatalogueKind) -> ApiFuture<'_, Vec<CatalogueEntry>> {
        let script = self.record(ApiCall::Catalogue(kind));
        let entries = script
            .catalogues
            .iter()
            .find(|(existing, _)| *existing == kind)
            .map(|(_, entries)| entries.clone())
            .unwrap_or_default();
        Box::pin(async move { Ok(entries) })
    }
}

/// Severity of a line captured by [`RecordingLogSink`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    /// Progress.
    Info,
    /// Degraded condition.
    Warn,
    /// Failure.
    Error,
}

/// Log sink that keeps every line in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingLogSink {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl RecordingLogSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every captured line with its level.
    #[must_use]
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        lock(&self.lines).clone()
    }

    /// Returns the captured messages at `level`.
    #[must_use]
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        lock(&self.lines)
            .iter()
            .filter(|(captured, _)| *captured == level)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Returns `true` when any line contains `fragment`.
    #[must_use]
    pub fn contains(&self, fragment: &str) -> bool {
        lock(&self.lines)
            .iter()
            .any(|(_, message)| message.contains(fragment))
    }

    fn push(&self, level: LogLevel, message: &str) {
        lock(&self.lines).push((level, message.to_owned()));
    }
}

impl LogSink for RecordingLogSink {
    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }
}

/// Sleeper that records requested durations and returns immediately.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with no recorded sleeps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every requested duration in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        lock(&self.sleeps).push(duration);
        Box::pin(async {})
    }
}

#[derive(Debug, Default)]
struct TransportScript {
    ready: VecDeque<Result<(), TransportError>>,
    outputs: VecDeque<Result<CommandOutput, TransportError>>,
    ready_checks: Vec<InstanceState>,
    commands: Vec<String>,
}

/// Transport that records commands and replays scripted results.
///
/// Unscripted readiness checks succeed and unscripted commands exit zero.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<TransportScript>>,
}

impl ScriptedTransport {
    /// Creates a transport that is always ready.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a readiness result.
    pub fn push_ready(&self, result: Result<(), TransportError>) {
        lock(&self.script).ready.push_back(result);
    }

    /// Queues a command result.
    pub fn push_output(&self, result: Result<CommandOutput, TransportError>) {
        lock(&self.script).outputs.push_back(result);
    }

    /// Returns every command executed so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        lock(&self.script).commands.clone()
    }

    /// Returns the state snapshots readiness was checked against.
    #[must_use]
    pub fn ready_checks(&self) -> Vec<InstanceState> {
        lock(&self.script).ready_checks.clone()
    }
}

impl Transport for ScriptedTransport {
    fn wait_until_ready<'a>(&'a self, state: &'a InstanceState) -> TransportFuture<'a, ()> {
        let mut script = lock(&self.script);
        script.ready_checks.push(state.clone());
        let result = script.ready.pop_front().unwrap_or(Ok(()));
        Box::pin(async move { result })
    }

    fn execute<'a>(
        &'a self,
        _state: &'a InstanceState,
        command: &'a str,
    ) -> TransportFuture<'a, CommandOutput> {
        let mut script = lock(&self.script);
        script.commands.push(command.to_owned());
        let result = script
            .outputs
            .pop_front()
            .unwrap_or_else(|| Ok(exit_output(0)));
        Box::pin(async move { result })
    }
}

/// Builds a command output with the given exit code and no captured text.
#[must_use]
pub const fn exit_output(code: i32) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: String::new(),
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<RemoteInvocation>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<RemoteInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        lock(&self.responses).push_back(exit_output(code));
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &RemoteInvocation) -> Result<CommandOutput, TransportError> {
        lock(&self.invocations).push(invocation.clone());
        Ok(lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| exit_output(0)))
    }
}
