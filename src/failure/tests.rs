//! Unit tests for failure classification.

use super::*;
use rstest::rstest;

fn http(status: u16, retry_after: Option<u64>, body: &str) -> ApiFailure {
    ApiFailure::Http {
        status,
        retry_after,
        body: body.to_owned(),
    }
}

#[rstest]
#[case(ApiFailure::Timeout { message: String::from("deadline") })]
#[case(http(408, None, ""))]
fn timeouts_are_transient(#[case] failure: ApiFailure) {
    assert_eq!(classify(&failure), FailureKind::Transient);
}

#[rstest]
#[case(Some(7), Duration::from_secs(7))]
#[case(None, Duration::ZERO)]
fn rate_limits_carry_retry_after(#[case] header: Option<u64>, #[case] expected: Duration) {
    assert_eq!(
        classify(&http(429, header, "")),
        FailureKind::RateLimited {
            retry_after: expected
        }
    );
}

#[rstest]
fn duplicate_label_is_a_conflict_not_a_user_error() {
    let body = r#"{"errors":[{"field":"label","reason":"Label must be unique among your Linodes"}]}"#;
    assert_eq!(classify(&http(400, None, body)), FailureKind::LabelConflict);
}

#[rstest]
fn other_bad_requests_decode_field_errors() {
    let body = r#"{"errors":[{"field":"region","reason":"region is not valid"},{"reason":"bad"}]}"#;
    let kind = classify(&http(400, None, body));
    let FailureKind::UserError {
        errors: Some(errors),
    } = kind
    else {
        panic!("expected decoded user error, got {kind:?}");
    };
    assert_eq!(
        errors,
        vec![
            FieldError {
                field: Some(String::from("region")),
                reason: String::from("region is not valid"),
            },
            FieldError {
                field: None,
                reason: String::from("bad"),
            },
        ]
    );
}

#[rstest]
fn undecodable_bad_request_keeps_user_error_without_details() {
    assert_eq!(
        classify(&http(400, None, "<html>bad gateway</html>")),
        FailureKind::UserError { errors: None }
    );
}

#[rstest]
fn not_found_is_classified() {
    assert_eq!(classify(&http(404, None, "")), FailureKind::NotFound);
}

#[rstest]
#[case(http(500, None, "oops"))]
#[case(http(401, None, "unauthorised"))]
#[case(ApiFailure::Transport { message: String::from("connection refused") })]
#[case(ApiFailure::Decode { message: String::from("missing field id") })]
fn everything_else_is_unknown(#[case] failure: ApiFailure) {
    let kind = classify(&failure);
    assert_eq!(kind, FailureKind::Unknown);
    assert!(!kind.is_retryable());
}

#[rstest]
fn only_transient_and_rate_limited_are_retryable() {
    assert!(FailureKind::Transient.is_retryable());
    assert!(
        FailureKind::RateLimited {
            retry_after: Duration::ZERO
        }
        .is_retryable()
    );
    assert!(!FailureKind::LabelConflict.is_retryable());
    assert!(!FailureKind::NotFound.is_retryable());
}
