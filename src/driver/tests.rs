//! Tests for the create and destroy orchestrators.

use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};

use super::*;
use crate::backoff::RetryPolicy;
use crate::label::{LabelGenerator, SUFFIX_SPACE};
use crate::linode::CatalogueKind;
use crate::provision::ProvisionSpec;
use crate::setup::{disable_password_command, hostname_command};
use crate::state::InstanceState;
use crate::test_support::{
    ApiCall, LogLevel, RecordingLogSink, RecordingSleeper, ScriptedApi, ScriptedTransport,
    exit_output, http_failure, instance, label_conflict_failure, running_instance,
    timeout_failure,
};

const PREFIX: &str = "kitchen-ci-default";

type TestDriver = LinodeDriver<ScriptedApi, ScriptedTransport, RecordingLogSink, RecordingSleeper>;

struct Harness {
    api: ScriptedApi,
    transport: ScriptedTransport,
    log: RecordingLogSink,
    sleeper: RecordingSleeper,
}

impl Harness {
    fn driver(&self) -> TestDriver {
        LinodeDriver::new(
            self.api.clone(),
            self.transport.clone(),
            self.log.clone(),
            self.sleeper.clone(),
            Entropy::seeded(7),
        )
    }

    fn creates(&self) -> usize {
        self.api
            .count(|call| matches!(call, ApiCall::Create(_)))
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        api: ScriptedApi::with_standard_catalogues(),
        transport: ScriptedTransport::new(),
        log: RecordingLogSink::new(),
        sleeper: RecordingSleeper::new(),
    }
}

fn spec_builder() -> crate::provision::ProvisionSpecBuilder {
    ProvisionSpec::builder()
        .region("us-east")
        .instance_type("Nanode 1GB")
        .image("linode/debian12")
        .label_prefix(PREFIX)
        .hostname("default-debian")
        .tags(vec![String::from("kitchen")])
        .root_password("hunter2")
        .retry(RetryPolicy::new(5))
}

#[fixture]
fn spec() -> ProvisionSpec {
    spec_builder()
        .build()
        .unwrap_or_else(|err| panic!("spec: {err}"))
}

fn key_pair_spec() -> ProvisionSpec {
    spec_builder()
        .private_key_path(Some(Utf8PathBuf::from("/home/ci/.ssh/id_rsa")))
        .authorized_key(Some(String::from("ssh-rsa AAAA ci@example")))
        .build()
        .unwrap_or_else(|err| panic!("spec: {err}"))
}

fn full_state() -> InstanceState {
    InstanceState {
        linode_id: Some(42),
        linode_label: Some(format!("{PREFIX}_042")),
        hostname: Some(String::from("192.0.2.10")),
        ssh_key: Some(Utf8PathBuf::from("/home/ci/.ssh/id_rsa")),
        password: Some(String::from("hunter2")),
    }
}

fn expect_err(result: Result<(), DriverError>) -> DriverError {
    match result {
        Ok(()) => panic!("expected create to fail"),
        Err(err) => err,
    }
}

#[rstest]
#[tokio::test]
async fn create_with_recorded_id_is_a_no_op(harness: Harness, spec: ProvisionSpec) {
    let mut state = full_state();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert!(harness.api.calls().is_empty());
    assert_eq!(state, full_state());
    assert!(harness.transport.commands().is_empty());
}

#[rstest]
#[tokio::test]
async fn create_records_state_and_sets_the_hostname(harness: Harness, spec: ProvisionSpec) {
    harness
        .api
        .push_create(Ok(instance(42, "kitchen-ci-default_042", "provisioning", &["192.0.2.10"])));
    harness
        .api
        .push_get(Ok(instance(42, "kitchen-ci-default_042", "booting", &["192.0.2.10"])));
    harness
        .api
        .push_get(Ok(running_instance(42, "kitchen-ci-default_042")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(state.linode_id, Some(42));
    assert_eq!(state.linode_label.as_deref(), Some("kitchen-ci-default_042"));
    assert_eq!(state.hostname.as_deref(), Some("192.0.2.10"));
    assert_eq!(state.password.as_deref(), Some("hunter2"));
    assert_eq!(state.ssh_key, None);

    let request = &harness.api.create_requests()[0];
    assert_eq!(request.instance_type, "g6-nanode-1");
    assert!(request.label.starts_with("kitchen-ci-default_"));
    assert!(request.tags.iter().any(|tag| tag == "kitchen"));

    assert_eq!(harness.sleeper.sleeps(), vec![spec.poll_interval]);
    assert_eq!(harness.transport.ready_checks().len(), 1);
    assert_eq!(
        harness.transport.commands(),
        vec![hostname_command("default-debian")]
    );
    assert!(
        harness
            .log
            .messages(LogLevel::Warn)
            .contains(&String::from("Using SSH password auth, some things may not work."))
    );
    assert!(harness.log.contains("Creating Linode:"));
    assert!(harness.log.contains("Done setting up server."));
}

#[rstest]
#[tokio::test]
async fn create_logs_each_step_in_order(harness: Harness, spec: ProvisionSpec) {
    harness.api.push_create(Ok(running_instance(42, "kitchen-ci-default_042")));
    harness.api.push_get(Ok(running_instance(42, "kitchen-ci-default_042")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    let info = harness.log.messages(LogLevel::Info);
    let position = |needle: &str| {
        info.iter()
            .position(|line| line.contains(needle))
            .unwrap_or_else(|| panic!("no log line containing {needle:?} in {info:?}"))
    };
    let steps = [
        position("Resolving region us-east, type Nanode 1GB and image linode/debian12..."),
        position("Generating label with prefix kitchen-ci-default..."),
        position("Creating Linode:"),
        position("Linode <42, kitchen-ci-default_042> created."),
        position("Waiting for linode to boot..."),
        position("ready for SSH."),
        position("Done setting up server."),
    ];
    assert!(steps.windows(2).all(|pair| pair[0] < pair[1]), "{info:?}");
}

#[rstest]
#[tokio::test]
async fn key_pair_records_the_key_and_disables_passwords(harness: Harness) {
    let spec = key_pair_spec();
    harness.api.push_create(Ok(running_instance(8, "kitchen-ci-default_008")));
    harness.api.push_get(Ok(running_instance(8, "kitchen-ci-default_008")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(state.ssh_key, spec.private_key_path);
    assert_eq!(state.password, None);
    assert_eq!(
        harness.api.create_requests()[0].authorized_keys,
        vec![String::from("ssh-rsa AAAA ci@example")]
    );
    assert_eq!(
        harness.transport.commands(),
        vec![hostname_command("default-debian"), disable_password_command()]
    );
}

#[rstest]
#[tokio::test]
async fn non_bourne_platforms_skip_setup(harness: Harness) {
    let spec = spec_builder()
        .bourne_shell(false)
        .build()
        .unwrap_or_else(|err| panic!("spec: {err}"));
    harness.api.push_create(Ok(running_instance(8, "kitchen-ci-default_008")));
    harness.api.push_get(Ok(running_instance(8, "kitchen-ci-default_008")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert!(harness.transport.commands().is_empty());
    assert_eq!(harness.transport.ready_checks().len(), 1);
}

#[rstest]
#[tokio::test]
async fn failing_setup_commands_are_logged_not_fatal(harness: Harness, spec: ProvisionSpec) {
    harness.api.push_create(Ok(running_instance(8, "kitchen-ci-default_008")));
    harness.api.push_get(Ok(running_instance(8, "kitchen-ci-default_008")));
    harness.transport.push_output(Ok(exit_output(1)));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert!(harness.log.contains("Setting hostname exited with status 1"));
}

#[rstest]
#[tokio::test]
async fn transient_failures_back_off_then_succeed(harness: Harness, spec: ProvisionSpec) {
    harness.api.push_create(Err(timeout_failure()));
    harness.api.push_create(Err(timeout_failure()));
    harness.api.push_create(Err(http_failure(429, Some(3), "")));
    harness.api.push_create(Err(http_failure(429, Some(3), "")));
    harness.api.push_create(Ok(running_instance(77, "kitchen-ci-default_077")));
    harness.api.push_get(Ok(running_instance(77, "kitchen-ci-default_077")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(harness.creates(), 5);
    assert_eq!(state.linode_id, Some(77));

    let sleeps = harness.sleeper.sleeps();
    assert_eq!(sleeps.len(), 4);
    assert_eq!(sleeps[0], Duration::from_secs(1));
    assert_eq!(sleeps[1], Duration::from_secs(2));
    assert!((9..=27).contains(&sleeps[2].as_secs()), "{sleeps:?}");
    assert!((13..=31).contains(&sleeps[3].as_secs()), "{sleeps:?}");

    let requests = harness.api.create_requests();
    assert!(requests.iter().all(|request| request.label == requests[0].label));
    assert!(harness.log.contains("[Attempt #1] Retrying because [Transient]"));
    assert!(harness.log.contains("[Attempt #3] Retrying because [RateLimited]"));
    assert!(harness.log.contains("Rate limit encountered, sleeping"));
}

#[rstest]
#[tokio::test]
async fn exhausted_budget_fails_without_recording_state(harness: Harness, spec: ProvisionSpec) {
    for _ in 0..5 {
        harness.api.push_create(Err(timeout_failure()));
    }
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(
        matches!(
            err,
            DriverError::CreationFailed {
                attempts: 5,
                kind: FailureKind::Transient,
                ..
            }
        ),
        "{err:?}"
    );
    assert_eq!(err.category(), ErrorCategory::ActionFailed);
    assert_eq!(harness.creates(), 5);
    assert!(state.is_empty());
    assert_eq!(harness.sleeper.sleeps().len(), 4);
}

#[rstest]
#[tokio::test]
async fn bad_request_is_reported_and_not_retried(harness: Harness, spec: ProvisionSpec) {
    harness.api.push_create(Err(http_failure(
        400,
        None,
        r#"{"errors":[{"field":"region","reason":"region is not valid"},{"reason":"too many instances"}]}"#,
    )));
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(matches!(err, DriverError::BadRequest { ref errors } if errors.len() == 2));
    assert_eq!(err.category(), ErrorCategory::UserError);
    assert_eq!(err.to_string(), "Bad request when creating server.");
    assert_eq!(harness.creates(), 1);
    assert!(harness.sleeper.sleeps().is_empty());
    assert!(state.is_empty());
    assert_eq!(
        harness.log.messages(LogLevel::Error),
        vec![
            String::from("error:"),
            String::from("  field:  region"),
            String::from("  reason: region is not valid"),
            String::from("error:"),
            String::from("  reason: too many instances"),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn undecodable_bad_request_surfaces_the_raw_failure(harness: Harness, spec: ProvisionSpec) {
    harness
        .api
        .push_create(Err(http_failure(400, None, "<html>bad gateway</html>")));
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(
        matches!(
            err,
            DriverError::CreationFailed {
                attempts: 1,
                kind: FailureKind::UserError { errors: None },
                ..
            }
        ),
        "{err:?}"
    );
    assert!(err.to_string().contains("<html>bad gateway</html>"));
}

#[rstest]
#[tokio::test]
async fn label_conflict_regenerates_the_label_without_sleeping(
    harness: Harness,
    spec: ProvisionSpec,
) {
    harness.api.push_create(Err(label_conflict_failure()));
    harness.api.push_create(Ok(running_instance(5, "kitchen-ci-default_005")));
    harness.api.push_get(Ok(running_instance(5, "kitchen-ci-default_005")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    let requests = harness.api.create_requests();
    assert_eq!(requests.len(), 2);
    assert_ne!(requests[0].label, requests[1].label);
    assert!(harness.sleeper.sleeps().is_empty());
    assert!(harness.log.contains("Will try again with a new label if we can."));
    assert_eq!(state.linode_id, Some(5));
}

#[rstest]
#[tokio::test]
async fn label_conflicts_share_the_attempt_budget(harness: Harness) {
    let spec = spec_builder()
        .retry(RetryPolicy::new(4))
        .build()
        .unwrap_or_else(|err| panic!("spec: {err}"));
    for id in 1..=4 {
        harness.api.push_label_race(id);
    }
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(
        matches!(
            err,
            DriverError::CreationFailed {
                attempts: 4,
                kind: FailureKind::LabelConflict,
                ..
            }
        ),
        "{err:?}"
    );
    let mut labels: Vec<String> = harness
        .api
        .create_requests()
        .into_iter()
        .map(|request| request.label)
        .collect();
    assert_eq!(labels.len(), 4);
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), 4);
    assert!(state.is_empty());
    assert!(harness.sleeper.sleeps().is_empty());
    assert!(harness.log.contains("Failed to create server after 4 attempt(s)"));
}

#[rstest]
#[tokio::test]
async fn generated_labels_avoid_existing_instances(harness: Harness, spec: ProvisionSpec) {
    let generator = LabelGenerator::new(PREFIX);
    // Leave exactly one suffix free.
    harness
        .api
        .set_existing_labels((0..SUFFIX_SPACE).filter(|n| *n != 502).map(|n| generator.candidate(n)));
    harness.api.push_create(Ok(running_instance(5, "kitchen-ci-default_502")));
    harness.api.push_get(Ok(running_instance(5, "kitchen-ci-default_502")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(harness.api.create_requests()[0].label, "kitchen-ci-default_502");
}

#[rstest]
#[tokio::test]
async fn exhausted_label_space_fails_before_submitting(harness: Harness, spec: ProvisionSpec) {
    let generator = LabelGenerator::new(PREFIX);
    harness
        .api
        .set_existing_labels((0..SUFFIX_SPACE).map(|n| generator.candidate(n)));
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(matches!(err, DriverError::LabelExhausted { ref prefix } if prefix == PREFIX));
    assert_eq!(err.category(), ErrorCategory::UserError);
    assert_eq!(harness.creates(), 0);
    assert!(harness.log.contains("Might need to cleanup your account."));
}

#[rstest]
#[tokio::test]
async fn unknown_catalogue_names_fail_naming_the_field(harness: Harness) {
    let spec = spec_builder()
        .region("mars-1")
        .build()
        .unwrap_or_else(|err| panic!("spec: {err}"));
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(
        matches!(err, DriverError::Unresolved { field: "region", ref name } if name == "mars-1"),
        "{err:?}"
    );
    assert_eq!(err.category(), ErrorCategory::UserError);
    assert_eq!(harness.creates(), 0);
}

#[rstest]
#[tokio::test]
async fn kernel_is_resolved_only_when_requested(harness: Harness) {
    let spec = spec_builder()
        .kernel(Some(String::from("GRUB 2")))
        .build()
        .unwrap_or_else(|err| panic!("spec: {err}"));
    harness.api.push_create(Ok(running_instance(5, "kitchen-ci-default_005")));
    harness.api.push_get(Ok(running_instance(5, "kitchen-ci-default_005")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(
        harness.api.create_requests()[0].kernel.as_deref(),
        Some("linode/grub2")
    );
    assert_eq!(
        harness
            .api
            .count(|call| *call == ApiCall::Catalogue(CatalogueKind::Kernel)),
        1
    );
}

#[rstest]
#[tokio::test]
async fn lost_create_response_adopts_the_tagged_instance(harness: Harness, spec: ProvisionSpec) {
    harness.api.push_lost_create(90);
    harness.api.push_get(Ok(running_instance(90, "kitchen-ci-default_090")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(harness.creates(), 1);
    assert_eq!(state.linode_id, Some(90));
    assert!(harness.log.contains("was created by an earlier attempt"));
}

#[rstest]
#[tokio::test]
async fn dropped_connection_on_create_adopts_the_tagged_instance(
    harness: Harness,
    spec: ProvisionSpec,
) {
    harness.api.push_lost_create_with(
        91,
        ApiFailure::Transport {
            message: String::from("connection reset by peer"),
        },
    );
    harness.api.push_get(Ok(running_instance(91, "kitchen-ci-default_091")));
    let mut state = InstanceState::default();

    harness
        .driver()
        .create(&spec, &mut state)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(harness.creates(), 1);
    assert_eq!(state.linode_id, Some(91));
    assert!(harness.sleeper.sleeps().is_empty());
    assert!(harness.log.contains("was created by an earlier attempt"));
}

#[rstest]
#[tokio::test]
async fn dropped_connection_without_an_instance_fails_after_checking(
    harness: Harness,
    spec: ProvisionSpec,
) {
    harness.api.push_create(Err(ApiFailure::Transport {
        message: String::from("connection reset by peer"),
    }));
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(
        matches!(
            err,
            DriverError::CreationFailed {
                attempts: 1,
                kind: FailureKind::Unknown,
                ..
            }
        ),
        "{err:?}"
    );
    let calls = harness.api.calls();
    let create_at = calls
        .iter()
        .position(|call| matches!(call, ApiCall::Create(_)))
        .unwrap_or_else(|| panic!("no create call in {calls:?}"));
    assert_eq!(calls.get(create_at + 1), Some(&ApiCall::ListInstances));
    assert!(state.is_empty());
}

#[rstest]
#[tokio::test]
async fn boot_timeout_keeps_the_recorded_instance(harness: Harness) {
    let spec = spec_builder()
        .boot_polling(Duration::from_secs(5), 3)
        .build()
        .unwrap_or_else(|err| panic!("spec: {err}"));
    harness
        .api
        .push_create(Ok(instance(12, "kitchen-ci-default_012", "provisioning", &["192.0.2.12"])));
    for _ in 0..3 {
        harness
            .api
            .push_get(Ok(instance(12, "kitchen-ci-default_012", "booting", &["192.0.2.12"])));
    }
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(matches!(err, DriverError::BootTimeout { id: 12, polls: 3 }), "{err:?}");
    assert_eq!(state.linode_id, Some(12));
    assert_eq!(harness.sleeper.sleeps(), vec![Duration::from_secs(5); 3]);
}

#[rstest]
#[tokio::test]
async fn instance_vanishing_during_boot_is_fatal(harness: Harness, spec: ProvisionSpec) {
    harness.api.push_create(Ok(running_instance(12, "kitchen-ci-default_012")));
    harness.api.push_get(Err(http_failure(404, None, "")));
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(matches!(err, DriverError::Vanished { id: 12 }));
    assert_eq!(state.linode_id, Some(12));
}

#[rstest]
#[tokio::test]
async fn unreachable_ssh_is_reported_with_state_kept(harness: Harness, spec: ProvisionSpec) {
    harness.api.push_create(Ok(running_instance(12, "kitchen-ci-default_012")));
    harness.api.push_get(Ok(running_instance(12, "kitchen-ci-default_012")));
    harness.transport.push_ready(Err(TransportError::Timeout {
        host: String::from("192.0.2.10"),
        port: 22,
    }));
    let mut state = InstanceState::default();

    let err = expect_err(harness.driver().create(&spec, &mut state).await);

    assert!(matches!(err, DriverError::Transport(_)));
    assert_eq!(state.hostname.as_deref(), Some("192.0.2.10"));
    assert!(harness.transport.commands().is_empty());
}

#[rstest]
#[tokio::test]
async fn destroy_without_an_id_makes_no_calls(harness: Harness) {
    let mut state = InstanceState::default();

    harness
        .driver()
        .destroy(RetryPolicy::default(), &mut state)
        .await
        .unwrap_or_else(|err| panic!("destroy: {err}"));

    assert!(harness.api.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn destroy_treats_missing_instances_as_destroyed(harness: Harness) {
    harness.api.push_get(Err(http_failure(404, None, "")));
    let mut state = full_state();

    harness
        .driver()
        .destroy(RetryPolicy::default(), &mut state)
        .await
        .unwrap_or_else(|err| panic!("destroy: {err}"));

    assert_eq!(state, InstanceState::default());
    assert_eq!(harness.api.calls(), vec![ApiCall::Get(42)]);
    assert!(harness.log.contains("not found"));
}

#[rstest]
#[tokio::test]
async fn destroy_tolerates_a_delete_that_finds_nothing(harness: Harness) {
    harness.api.push_get(Ok(running_instance(42, "kitchen-ci-default_042")));
    harness.api.push_delete(Err(http_failure(404, None, "")));
    let mut state = full_state();

    harness
        .driver()
        .destroy(RetryPolicy::default(), &mut state)
        .await
        .unwrap_or_else(|err| panic!("destroy: {err}"));

    assert_eq!(state, InstanceState::default());
    assert_eq!(harness.api.calls(), vec![ApiCall::Get(42), ApiCall::Delete(42)]);
    assert!(harness.log.contains("not found"));
    assert!(!harness.log.contains("destroyed"));
}

#[rstest]
#[tokio::test]
async fn destroy_clears_every_field_after_deleting(harness: Harness) {
    harness.api.push_get(Err(timeout_failure()));
    harness.api.push_get(Ok(running_instance(42, "kitchen-ci-default_042")));
    let mut state = full_state();

    harness
        .driver()
        .destroy(RetryPolicy::default(), &mut state)
        .await
        .unwrap_or_else(|err| panic!("destroy: {err}"));

    assert_eq!(state, InstanceState::default());
    assert_eq!(harness.sleeper.sleeps(), vec![Duration::from_secs(1)]);
    assert_eq!(
        harness.api.calls(),
        vec![ApiCall::Get(42), ApiCall::Get(42), ApiCall::Delete(42)]
    );
    assert!(harness.log.contains("destroyed"));
}

#[rstest]
#[tokio::test]
async fn destroy_failure_leaves_state_intact(harness: Harness) {
    harness.api.push_get(Ok(running_instance(42, "kitchen-ci-default_042")));
    harness
        .api
        .push_delete(Err(http_failure(500, None, "internal error")));
    let mut state = full_state();

    let err = harness
        .driver()
        .destroy(RetryPolicy::default(), &mut state)
        .await
        .expect_err("delete should fail");

    assert!(matches!(
        err,
        DriverError::Api {
            kind: FailureKind::Unknown,
            attempts: 1,
            ..
        }
    ));
    assert_eq!(state, full_state());
}
