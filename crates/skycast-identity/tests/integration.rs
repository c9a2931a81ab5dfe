//! Integration tests for credential resolution

use chrono::Utc;
use proptest::prelude::*;
use secrecy::ExposeSecret;
use skycast_identity::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const IMDS_PATH: &str = "/metadata/identity/oauth2/token";

fn imds_options(server: &MockServer) -> ManagedIdentityOptions {
    ManagedIdentityOptions::default().with_endpoint(ManagedIdentityEndpoint::Imds {
        endpoint: format!("{}{}", server.uri(), IMDS_PATH),
    })
}

fn offline_resolver() -> CredentialResolver {
    CredentialResolver::managed_identity(ManagedIdentityOptions::default())
}

fn token_body(token: &str, expires_in_secs: i64) -> serde_json::Value {
    serde_json::json!({
        "access_token": token,
        "expires_on": (Utc::now().timestamp() + expires_in_secs).to_string(),
        "resource": "https://vault.azure.net",
        "token_type": "Bearer",
    })
}

#[test]
fn test_scenario_default_only_ambient() {
    let configs = vec![IdentityConfig::ambient("default")];

    let registry = offline_resolver().resolve(&configs);
    assert_eq!(registry.names(), vec!["default"]);
    assert_eq!(registry.scope("default"), Some(&CredentialScope::Ambient));

    let described = CredentialResolver::describe(&configs);
    assert_eq!(
        described,
        vec![ResolutionResult {
            name: "default".into(),
            client_id: "Not configured".into(),
            is_configured: false,
        }]
    );
}

#[test]
fn test_scenario_default_scoped_external_empty() {
    let configs = vec![
        IdentityConfig::scoped("default", "abc-123"),
        IdentityConfig::scoped("external", ""),
    ];

    let registry = offline_resolver().resolve(&configs);
    assert_eq!(registry.names(), vec!["default"]);
    assert_eq!(
        registry.scope("default"),
        Some(&CredentialScope::ClientId("abc-123".into()))
    );
    assert!(registry.get("external").is_none());

    let described = CredentialResolver::describe(&configs);
    assert!(described[0].is_configured);
    assert_eq!(described[0].client_id, "abc-123");
    assert_eq!(
        described[1],
        ResolutionResult {
            name: "external".into(),
            client_id: "Not configured".into(),
            is_configured: false,
        }
    );
}

#[test]
fn test_scenario_default_ambient_external_scoped() {
    let configs = vec![
        IdentityConfig::ambient("default"),
        IdentityConfig::scoped("external", "ext-999"),
    ];

    let registry = offline_resolver().resolve(&configs);
    assert_eq!(registry.names(), vec!["default", "external"]);

    let default = registry.get("default").unwrap();
    assert!(default.scope().is_ambient());

    let external = registry.get("external").unwrap();
    assert_eq!(external.scope().client_id(), Some("ext-999"));
    assert_eq!(registry.default_credential().name(), "default");
}

#[test]
fn test_sources_feed_resolver() {
    let sources = IdentitySources::default()
        .with_source(IdentitySource::parse("reporting=REPORTING_CLIENT_ID").unwrap());

    let configs = sources.load_with(|var| match var {
        "AZURE_CLIENT_ID" => Some("abc-123".into()),
        "EXTERNAL_IDENTITY_CLIENT_ID" => Some(String::new()),
        "REPORTING_CLIENT_ID" => Some("rep-1".into()),
        _ => None,
    });

    let registry = offline_resolver().resolve(&configs);
    assert_eq!(registry.names(), vec!["default", "reporting"]);
    assert!(registry.is_configured("default"));
}

fn arb_configs() -> impl Strategy<Value = Vec<IdentityConfig>> {
    let default = proptest::option::of("[a-z0-9-]{0,8}");
    let named = proptest::collection::btree_map(
        "[a-z]{1,8}",
        proptest::option::of("[a-z0-9-]{0,8}"),
        0..6,
    );

    (default, named).prop_map(|(default, named): (Option<String>, BTreeMap<String, Option<String>>)| {
        let scoped = |name: &str, raw: Option<String>| {
            raw.map(|r| if r.is_empty() { r } else { format!("{}-{}", name, r) })
        };

        let mut configs = vec![IdentityConfig::new("default", scoped("default", default))];
        for (name, raw) in named.into_iter().filter(|(name, _)| name != "default") {
            let client_id = scoped(&name, raw);
            configs.push(IdentityConfig::new(name, client_id));
        }
        configs
    })
}

proptest! {
    #[test]
    fn prop_default_always_present(configs in arb_configs()) {
        let registry = offline_resolver().resolve(&configs);
        prop_assert!(registry.contains("default"));
    }

    #[test]
    fn prop_named_entries_follow_client_id(configs in arb_configs()) {
        let registry = offline_resolver().resolve(&configs);

        for config in configs.iter().filter(|c| !c.is_default()) {
            match config.client_id() {
                None => prop_assert!(!registry.contains(&config.name)),
                Some(id) => {
                    let expected = CredentialScope::ClientId(id.to_string());
                    prop_assert_eq!(registry.scope(&config.name), Some(&expected));

                    let sharing = registry
                        .names()
                        .into_iter()
                        .filter(|n| registry.scope(n) == Some(&expected))
                        .count();
                    prop_assert_eq!(sharing, 1);
                }
            }
        }
    }

    #[test]
    fn prop_describe_agrees_with_resolve(configs in arb_configs()) {
        let registry = offline_resolver().resolve(&configs);

        for result in CredentialResolver::describe(&configs) {
            prop_assert_eq!(result.is_configured, registry.is_configured(&result.name));
        }
    }

    #[test]
    fn prop_resolve_is_idempotent(configs in arb_configs()) {
        let resolver = offline_resolver();
        let first = resolver.resolve(&configs);
        let second = resolver.resolve(&configs);

        prop_assert_eq!(first.names(), second.names());
        for name in first.names() {
            prop_assert_eq!(first.is_configured(name), second.is_configured(name));
            prop_assert_eq!(first.scope(name), second.scope(name));
        }
    }
}

#[tokio::test]
async fn test_imds_token_for_scoped_identity_is_cached() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(IMDS_PATH))
        .and(header("Metadata", "true"))
        .and(query_param("api-version", "2018-02-01"))
        .and(query_param("resource", "https://vault.azure.net"))
        .and(query_param("client_id", "ext-999"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ext-token", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = CredentialResolver::managed_identity(imds_options(&server));
    let registry = resolver.resolve(&[
        IdentityConfig::ambient("default"),
        IdentityConfig::scoped("external", "ext-999"),
    ]);

    let credential = registry.get("external").unwrap();
    let first = credential.get_token(&[VAULT_SCOPE]).await.unwrap();
    let second = credential.get_token(&[VAULT_SCOPE]).await.unwrap();

    assert_eq!(first.token.expose_secret(), "ext-token");
    assert_eq!(second.token.expose_secret(), "ext-token");
}

#[tokio::test]
async fn test_ambient_identity_sends_no_client_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(IMDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ambient-token", 3600)))
        .mount(&server)
        .await;

    let resolver = CredentialResolver::managed_identity(imds_options(&server));
    let registry = resolver.resolve(&[IdentityConfig::ambient("default")]);

    let token = registry
        .default_credential()
        .get_token(&[VAULT_SCOPE])
        .await
        .unwrap();
    assert_eq!(token.token.expose_secret(), "ambient-token");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.query_pairs().all(|(k, _)| k != "client_id"));
}

#[tokio::test]
async fn test_expiring_token_is_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(IMDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("short-lived", 60)))
        .expect(2)
        .mount(&server)
        .await;

    let credential = ManagedIdentityCredential::new(
        "default",
        CredentialScope::Ambient,
        imds_options(&server),
    );

    credential.get_token(&[VAULT_SCOPE]).await.unwrap();
    credential.get_token(&[VAULT_SCOPE]).await.unwrap();
}

#[tokio::test]
async fn test_app_service_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/msi/token"))
        .and(header("X-IDENTITY-HEADER", "header-secret"))
        .and(query_param("api-version", "2019-08-01"))
        .and(query_param("client_id", "abc-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "app-service-token",
            "expires_on": Utc::now().timestamp() + 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = ManagedIdentityOptions::default().with_endpoint(ManagedIdentityEndpoint::AppService {
        endpoint: format!("{}/msi/token", server.uri()),
        header: "header-secret".into(),
    });

    let registry = CredentialResolver::managed_identity(options)
        .resolve(&[IdentityConfig::scoped("default", "abc-123")]);

    let token = registry
        .default_credential()
        .get_token(&["https://management.azure.com/.default"])
        .await
        .unwrap();
    assert_eq!(token.token.expose_secret(), "app-service-token");
}

#[tokio::test]
async fn test_token_failure_propagates_to_caller() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(IMDS_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("Identity not found"))
        .mount(&server)
        .await;

    let registry = CredentialResolver::managed_identity(imds_options(&server))
        .resolve(&[IdentityConfig::scoped("external", "missing-id")]);

    let err = registry
        .get("external")
        .unwrap()
        .get_token(&[VAULT_SCOPE])
        .await
        .unwrap_err();

    match err {
        CredentialError::AuthenticationFailed { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("Identity not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The registry is unaffected by the failure
    assert!(registry.contains("external"));
}

#[tokio::test]
async fn test_malformed_token_response() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(IMDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "unexpected": true })))
        .mount(&server)
        .await;

    let credential = ManagedIdentityCredential::new(
        "default",
        CredentialScope::Ambient,
        imds_options(&server),
    );

    let err = credential.get_token(&[VAULT_SCOPE]).await.unwrap_err();
    assert!(matches!(err, CredentialError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_out_of_range_expiry_is_rejected_on_every_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(IMDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "t",
            "expires_on": chrono::DateTime::<Utc>::MIN_UTC.timestamp().to_string(),
        })))
        .expect(2)
        .mount(&server)
        .await;

    let credential = ManagedIdentityCredential::new(
        "default",
        CredentialScope::Ambient,
        imds_options(&server),
    );

    for _ in 0..2 {
        let err = credential.get_token(&[VAULT_SCOPE]).await.unwrap_err();
        assert!(matches!(err, CredentialError::InvalidResponse(_)));
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_unavailable() {
    let options = ManagedIdentityOptions::default()
        .with_endpoint(ManagedIdentityEndpoint::Imds {
            endpoint: "http://127.0.0.1:9/metadata/identity/oauth2/token".into(),
        })
        .with_timeout(std::time::Duration::from_millis(500));

    let credential = ManagedIdentityCredential::new("default", CredentialScope::Ambient, options);
    let err = credential.get_token(&[VAULT_SCOPE]).await.unwrap_err();

    assert!(matches!(
        err,
        CredentialError::Unavailable(_) | CredentialError::Timeout(_)
    ));
}

#[test]
fn test_registry_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CredentialRegistry>();

    let registry = Arc::new(offline_resolver().resolve(&[IdentityConfig::scoped("external", "ext")]));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.get("external").map(|c| c.name().to_string()))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().as_deref(), Some("external"));
    }
}
