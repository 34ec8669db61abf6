mod common;

use cert_deploy_rs::{
    DeployError, Deployer, DeploymentOrchestrator, MemoryLogger, OrchestratorConfig, Outcome,
    ResourceDescriptor, ResourceSelector,
};
use common::{pem_pair, RecordingProvider, NEW_CERT};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn lb(provider: RecordingProvider) -> DeploymentOrchestrator<RecordingProvider> {
    DeploymentOrchestrator::new("test-lb", provider, ResourceSelector::load_balancer("lb-1"))
        .with_protocols(["https"])
}

// ═══════════════════════════════════════════════════════════════════
// LOAD BALANCER FAN-OUT
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_all_resources_succeed() {
    let logger = Arc::new(MemoryLogger::new());
    let orchestrator = lb(RecordingProvider::new().with_listeners("https", 5)).with_logger(logger.clone());
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Success);
    assert!(result.failures.is_empty());
    assert!(result.overall_error.is_none());
    assert_eq!(result.updated.len(), 5);
    assert_eq!(result.upload.as_ref().map(|u| u.cert_id.as_str()), Some(NEW_CERT));

    let tags = logger.tags();
    assert_eq!(tags.first().map(String::as_str), Some("certificate uploaded"));
    assert_eq!(tags.iter().filter(|t| *t == "resource bound").count(), 5);
    assert_eq!(orchestrator.log_entries(), result.log_entries);
}

#[tokio::test]
async fn test_partial_failure_names_exactly_the_failing_resources() {
    let provider = RecordingProvider::new()
        .with_listeners("https", 5)
        .failing_on(["https-1", "https-3"]);
    let orchestrator = lb(provider);
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::PartialFailure);
    assert_eq!(result.failures.resource_ids(), vec!["https-1", "https-3"]);
    assert_eq!(result.updated, vec!["https-0", "https-2", "https-4"]);
    let errors = result.per_resource_errors();
    assert!(errors["https-1"].to_string().contains("https-1 is locked"));

    match &result.overall_error {
        Some(DeployError::Binding(failures)) => assert_eq!(failures.len(), 2),
        other => panic!("expected binding error, got {:?}", other),
    }
    let bound = result
        .log_entries
        .iter()
        .filter(|e| e.tag == "resource bound")
        .count();
    assert_eq!(bound, 3);

    // Failures never stop the run.
    assert_eq!(orchestrator.provider().calls_to("update:").len(), 5);
}

#[tokio::test]
async fn test_all_resources_fail() {
    let provider = RecordingProvider::new()
        .with_listeners("https", 2)
        .failing_on(["https-0", "https-1"]);
    let (cert, key) = pem_pair("example.com");

    let result = lb(provider)
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Failure);
    assert!(result.updated.is_empty());
    assert!(result.into_result().is_err());
}

#[tokio::test]
async fn test_pagination_collects_every_page() {
    let orchestrator = lb(RecordingProvider::new().with_listeners("https", 237));
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.discovered.len(), 237);
    assert_eq!(result.updated.len(), 237);
    assert_eq!(
        orchestrator.provider().calls_to("list:"),
        vec!["list:lb-1:https:", "list:lb-1:https:100", "list:lb-1:https:200"]
    );
}

#[tokio::test]
async fn test_protocol_listings_are_unioned() {
    let provider = RecordingProvider::new()
        .with_listeners("HTTPS", 2)
        .with_listeners("QUIC", 1);
    let orchestrator = DeploymentOrchestrator::new("alb", provider, ResourceSelector::load_balancer("alb-1"))
        .with_protocols(["HTTPS", "QUIC"]);
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.discovered, vec!["HTTPS-0", "HTTPS-1", "QUIC-0"]);
}

#[tokio::test]
async fn test_empty_listing_is_resource_not_found() {
    let orchestrator = lb(RecordingProvider::new());
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Failure);
    assert!(matches!(result.overall_error, Some(DeployError::ResourceNotFound(_))));
    assert!(orchestrator.provider().calls_to("update").is_empty());
}

#[tokio::test]
async fn test_listing_failure_is_reported_not_raised() {
    let provider = RecordingProvider {
        fail_list: true,
        ..RecordingProvider::new().with_listeners("https", 3)
    };
    let orchestrator = lb(provider);
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Failure);
    assert_eq!(result.upload.as_ref().map(|u| u.cert_id.as_str()), Some(NEW_CERT));
    match &result.overall_error {
        Some(DeployError::Enumeration { operation, message }) => {
            assert_eq!(operation, "slb.DescribeLoadBalancerListeners");
            assert_eq!(message, "Throttling.User");
        }
        other => panic!("expected enumeration error, got {:?}", other),
    }
    assert!(result.discovered.is_empty());
    assert!(result.updated.is_empty());
    assert!(result.failures.is_empty());
    assert_eq!(
        orchestrator.provider().calls(),
        vec!["upload:example.com", "list:lb-1:https:"]
    );
}

// ═══════════════════════════════════════════════════════════════════
// VALIDATION AND UPLOAD
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_missing_loadbalancer_id_makes_no_calls() {
    let orchestrator = DeploymentOrchestrator::new(
        "test-lb",
        RecordingProvider::new(),
        ResourceSelector::load_balancer(""),
    )
    .with_protocols(["https"]);
    let (cert, key) = pem_pair("example.com");

    let err = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Configuration(ref m) if m.contains("loadbalancerId")));
    assert!(orchestrator.provider().calls().is_empty());
}

#[tokio::test]
async fn test_upload_failure_binds_nothing() {
    let provider = RecordingProvider {
        fail_upload: true,
        ..RecordingProvider::new().with_listeners("https", 3)
    };
    let orchestrator = lb(provider);
    let (cert, key) = pem_pair("example.com");

    let err = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Upload { .. }));
    assert!(err.is_recoverable());
    assert_eq!(orchestrator.provider().calls(), vec!["upload:example.com"]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_upload_is_an_upload_failure() {
    let provider = RecordingProvider {
        upload_delay: Some(Duration::from_secs(120)),
        ..RecordingProvider::new().with_listeners("https", 2)
    };
    let config = OrchestratorConfig {
        call_timeout: Duration::from_secs(5),
        ..OrchestratorConfig::default()
    };
    let orchestrator = lb(provider).with_config(config);
    let (cert, key) = pem_pair("example.com");

    let err = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap_err();

    match err {
        DeployError::Upload { ref message, .. } => assert!(message.contains("timed out after 5s")),
        other => panic!("expected upload error, got {:?}", other),
    }
    assert_eq!(orchestrator.provider().calls(), vec!["upload:example.com"]);
}

#[tokio::test]
async fn test_unreadable_certificate_makes_no_calls() {
    let orchestrator = lb(RecordingProvider::new().with_listeners("https", 1));

    let err = orchestrator
        .deploy(&CancellationToken::new(), "not a pem", "not a key")
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Certificate(_)));
    assert!(orchestrator.provider().calls().is_empty());
}

// ═══════════════════════════════════════════════════════════════════
// WILDCARD RESOLUTION
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_wildcard_binds_only_pending_domains() {
    let provider = RecordingProvider {
        discovery: Some((
            vec!["a.example.com".into(), "b.example.com".into(), "c.example.com".into()],
            vec!["a.example.com".into(), "b.example.com".into()],
        )),
        ..RecordingProvider::new()
    };
    let orchestrator =
        DeploymentOrchestrator::new("cdn", provider, ResourceSelector::wildcard("*.example.com"));
    let (cert, key) = pem_pair("*.example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.discovered, vec!["c.example.com"]);
    assert_eq!(
        orchestrator.provider().calls_to("update"),
        vec![format!("update:c.example.com:{}", NEW_CERT)]
    );
}

#[tokio::test]
async fn test_wildcard_fully_bound_is_success_without_updates() {
    let provider = RecordingProvider {
        discovery: Some((vec!["a.example.com".into()], vec!["a.example.com".into()])),
        ..RecordingProvider::new()
    };
    let orchestrator =
        DeploymentOrchestrator::new("cdn", provider, ResourceSelector::wildcard("*.example.com"));
    let (cert, key) = pem_pair("*.example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Success);
    assert!(result.discovered.is_empty());
    assert!(orchestrator.provider().calls_to("update").is_empty());
    assert!(result
        .log_entries
        .iter()
        .any(|e| e.tag == "certificate already deployed"));
}

#[tokio::test]
async fn test_wildcard_without_discovery_targets_bare_domain() {
    let orchestrator = DeploymentOrchestrator::new(
        "cdn",
        RecordingProvider::new(),
        ResourceSelector::wildcard("*.example.com"),
    );
    let (cert, key) = pem_pair("*.example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.updated, vec!["example.com"]);
    assert_eq!(
        orchestrator.provider().calls_to("describe"),
        vec!["describe:example.com"]
    );
}

// ═══════════════════════════════════════════════════════════════════
// REBIND ORDERING
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_extensions_update_before_parent() {
    let mut provider = RecordingProvider::new();
    provider.current.insert("lb-1:443".into(), "cert-old".into());
    provider.extensions.insert(
        "lb-1:443".into(),
        vec![
            ResourceDescriptor::new("ext-a", "https").with_cert("cert-old"),
            ResourceDescriptor::new("ext-b", "https").with_cert("cert-other"),
            ResourceDescriptor::new("ext-c", "https").with_cert("cert-old"),
        ],
    );
    let orchestrator =
        DeploymentOrchestrator::new("clb", provider, ResourceSelector::single("lb-1:443"));
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Success);
    let calls = orchestrator.provider().calls();
    assert_eq!(
        &calls[1..],
        &[
            "describe:lb-1:443".to_string(),
            "list_extensions:lb-1:443".to_string(),
            format!("update_extension:lb-1:443:ext-a:{}", NEW_CERT),
            format!("update_extension:lb-1:443:ext-c:{}", NEW_CERT),
            format!("update:lb-1:443:{}", NEW_CERT),
        ]
    );
}

#[tokio::test]
async fn test_already_bound_resource_is_not_updated() {
    let mut provider = RecordingProvider::new().with_listeners("https", 2);
    provider.current.insert("https-0".into(), NEW_CERT.into());
    let orchestrator = lb(provider);
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.updated, vec!["https-0", "https-1"]);
    assert_eq!(
        orchestrator.provider().calls_to("update:"),
        vec![format!("update:https-1:{}", NEW_CERT)]
    );
}

// ═══════════════════════════════════════════════════════════════════
// CANCELLATION AND TIMEOUTS
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_cancellation_between_resources() {
    let cancel = CancellationToken::new();
    let provider = RecordingProvider {
        cancel_after: Some((2, cancel.clone())),
        ..RecordingProvider::new().with_listeners("https", 5)
    };
    let orchestrator = lb(provider);
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator.deploy(&cancel, &cert, &key).await.unwrap();

    assert_eq!(result.outcome, Outcome::Cancelled);
    assert_eq!(result.overall_error, Some(DeployError::Cancelled));
    assert_eq!(result.updated, vec!["https-0", "https-1"]);
    assert_eq!(result.discovered.len(), 5);
    assert_eq!(orchestrator.provider().calls_to("update:").len(), 2);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let orchestrator = lb(RecordingProvider::new().with_listeners("https", 1));
    let (cert, key) = pem_pair("example.com");

    let err = orchestrator.deploy(&cancel, &cert, &key).await.unwrap_err();

    assert_eq!(err, DeployError::Cancelled);
    assert!(orchestrator.provider().calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_update_times_out_per_resource() {
    let provider = RecordingProvider {
        update_delay: Some(Duration::from_secs(120)),
        ..RecordingProvider::new().with_listeners("https", 1)
    };
    let config = OrchestratorConfig {
        call_timeout: Duration::from_secs(5),
        ..OrchestratorConfig::default()
    };
    let orchestrator = lb(provider).with_config(config);
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Failure);
    let errors = result.per_resource_errors();
    assert!(matches!(errors["https-0"], DeployError::Timeout { .. }));
}

#[tokio::test]
async fn test_concurrent_binding_keeps_discovery_order() {
    let provider = RecordingProvider::new()
        .with_listeners("https", 6)
        .failing_on(["https-4"]);
    let config = OrchestratorConfig {
        binding_concurrency: 3,
        ..OrchestratorConfig::default()
    };
    let orchestrator = lb(provider).with_config(config);
    let (cert, key) = pem_pair("example.com");

    let result = orchestrator
        .deploy(&CancellationToken::new(), &cert, &key)
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::PartialFailure);
    assert_eq!(result.updated, vec!["https-0", "https-1", "https-2", "https-3", "https-5"]);
    assert_eq!(result.failures.resource_ids(), vec!["https-4"]);
}
