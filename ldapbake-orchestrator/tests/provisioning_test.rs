// Provisioner and imager polling behaviour against the mock provider.

mod common;

use common::test_config;
use ldapbake_common::{BakeError, ImageState, InstanceState};
use ldapbake_orchestrator::{imager, provisioner};
use ldapbake_providers::mock::{MockProvider, ProviderCall};
use std::time::Duration;
use tokio::time::Instant;

fn describe_instance_calls(p: &MockProvider) -> usize {
    p.calls()
        .iter()
        .filter(|c| matches!(c, ProviderCall::DescribeInstance { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_launch_polls_twice_for_pending_pending_running() {
    let provider = MockProvider::new().with_instance_states([
        InstanceState::Pending,
        InstanceState::Pending,
        InstanceState::Running,
    ]);
    let config = test_config();

    let start = Instant::now();
    let instance = provisioner::launch_instance(&provider, &config).await.unwrap();

    assert_eq!(instance.state, InstanceState::Running);
    assert_eq!(instance.id, provider.instance_id());
    assert_eq!(describe_instance_calls(&provider), 2);
    assert_eq!(start.elapsed(), Duration::from_secs(20));
    assert!(matches!(provider.calls()[0], ProviderCall::RunInstance { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_launch_running_immediately_does_not_poll() {
    let provider = MockProvider::new().with_instance_states([InstanceState::Running]);
    let start = Instant::now();
    provisioner::launch_instance(&provider, &test_config())
        .await
        .unwrap();
    assert_eq!(describe_instance_calls(&provider), 0);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_launch_one_refetch_per_non_running_observation() {
    for pending in 0..6usize {
        let mut states = vec![InstanceState::Pending; pending];
        states.push(InstanceState::Running);
        let provider = MockProvider::new().with_instance_states(states);
        provisioner::launch_instance(&provider, &test_config())
            .await
            .unwrap();
        assert_eq!(describe_instance_calls(&provider), pending);
    }
}

#[tokio::test(start_paused = true)]
async fn test_launch_times_out_when_bounded() {
    let provider = MockProvider::new().with_instance_states([InstanceState::Pending]);
    let mut config = test_config();
    config.instance_poll.max_attempts = Some(3);

    let err = provisioner::launch_instance(&provider, &config)
        .await
        .unwrap_err();
    match err.downcast_ref::<BakeError>() {
        Some(BakeError::TimedOut { attempts, .. }) => assert_eq!(*attempts, 3),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(describe_instance_calls(&provider), 3);
}

#[tokio::test(start_paused = true)]
async fn test_bundle_terminates_only_after_image_available() {
    let provider = MockProvider::new().with_image_states([
        ImageState::Pending,
        ImageState::Pending,
        ImageState::Available,
    ]);
    let config = test_config();

    let start = Instant::now();
    let outcome = imager::bundle_instance(
        &provider,
        provider.instance_id(),
        "spring-ldap-openldap",
        "desc",
        &config,
    )
    .await
    .unwrap();

    assert_eq!(outcome.image.state, ImageState::Available);
    assert!(outcome.instance_terminated);
    // one initial fetch + two 20s re-fetches
    assert_eq!(start.elapsed(), Duration::from_secs(40));

    let calls = provider.calls();
    let image_id = provider.image_id().to_string();
    let instance_id = provider.instance_id().to_string();
    assert_eq!(
        calls,
        vec![
            ProviderCall::CreateImage {
                instance_id: instance_id.clone(),
                name: "spring-ldap-openldap".to_string()
            },
            ProviderCall::DescribeImage {
                image_id: image_id.clone()
            },
            ProviderCall::DescribeImage {
                image_id: image_id.clone()
            },
            ProviderCall::DescribeImage {
                image_id: image_id.clone()
            },
            ProviderCall::TagResource {
                resource_id: image_id.clone(),
                key: "Name".to_string(),
                value: "spring-ldap-openldap".to_string()
            },
            ProviderCall::TerminateInstance { instance_id },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_bundle_never_terminates_before_image_leaves_pending() {
    for pending in 0..8usize {
        let mut states = vec![ImageState::Pending; pending];
        states.push(ImageState::Available);
        let provider = MockProvider::new().with_image_states(states);
        imager::bundle_instance(&provider, provider.instance_id(), "n", "d", &test_config())
            .await
            .unwrap();

        let calls = provider.calls();
        let terminate_at = calls
            .iter()
            .position(|c| matches!(c, ProviderCall::TerminateInstance { .. }))
            .unwrap();
        let last_describe = calls
            .iter()
            .rposition(|c| matches!(c, ProviderCall::DescribeImage { .. }))
            .unwrap();
        assert!(last_describe < terminate_at);
        assert_eq!(last_describe, pending + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_bundle_image_stuck_pending_times_out_without_terminating() {
    let provider = MockProvider::new().with_image_states([ImageState::Pending]);
    let mut config = test_config();
    config.image_poll.max_attempts = Some(5);

    let err = imager::bundle_instance(&provider, provider.instance_id(), "n", "d", &config)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BakeError>(),
        Some(BakeError::TimedOut { attempts: 5, .. })
    ));
    assert!(!provider.is_terminated());
    assert!(!provider
        .calls()
        .iter()
        .any(|c| matches!(c, ProviderCall::TagResource { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_bundle_failed_image_still_tags_and_terminates() {
    let provider = MockProvider::new().with_image_states([ImageState::Pending, ImageState::Failed]);
    let outcome = imager::bundle_instance(&provider, provider.instance_id(), "n", "d", &test_config())
        .await
        .unwrap();
    assert_eq!(outcome.image.state, ImageState::Failed);
    assert!(provider.is_terminated());
}
