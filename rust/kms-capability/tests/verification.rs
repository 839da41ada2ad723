//! End-to-end checks of HTTP-signed capability invocations against stored
//! capability chains, using real Ed25519 keys.

use std::sync::Arc;

use anyhow::Result;
use ed25519_dalek::SigningKey;
use hyper::{Request, http::request::Parts};
use kms_capability::{
    Action, Authorized, Capability, CapabilityStore, DidKey, DidKeyResolver, HttpSignatureVerifier,
    InvocationExpectations, InvocationVerifier, VerificationError, httpsig::sign_invocation,
    keystore_location,
};
use kms_storage::MemoryStorageBackend;

const HOST: &str = "example.com";
const KEYSTORE: &str = "ks-1";

/// Create a test signing key from a seed byte (for deterministic tests).
fn test_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn did(key: &SigningKey) -> String {
    DidKey(key.verifying_key()).to_string()
}

fn sign_request_parts() -> Parts {
    let (parts, _) = Request::post(format!("/keystores/{KEYSTORE}/keys/k-1/sign"))
        .header("host", HOST)
        .body(())
        .expect("valid request")
        .into_parts();
    parts
}

struct Fixture {
    store: CapabilityStore<MemoryStorageBackend<String, Vec<u8>>>,
    verifier: HttpSignatureVerifier,
    controller: SigningKey,
    resource: String,
}

async fn fixture() -> Result<Fixture> {
    let controller = test_key(1);
    let resource = keystore_location(HOST, KEYSTORE);
    let store = CapabilityStore::new(MemoryStorageBackend::default());
    store
        .put(&Capability::root(resource.clone(), did(&controller)))
        .await?;

    let verifier = HttpSignatureVerifier::new(Arc::new(store.clone()), Arc::new(DidKeyResolver));

    Ok(Fixture {
        store,
        verifier,
        controller,
        resource,
    })
}

fn delegate(id: &str, parent: &str, invoker: &SigningKey, target: &str, actions: Vec<Action>) -> Capability {
    Capability {
        id: id.to_string(),
        parent_capability: Some(parent.to_string()),
        controller: None,
        invoker: Some(did(invoker)),
        invocation_target: target.to_string(),
        allowed_action: actions,
    }
}

#[tokio::test]
async fn the_controller_can_invoke_the_root_capability() -> Result<()> {
    let fixture = fixture().await?;
    let mut parts = sign_request_parts();
    sign_invocation(&mut parts, &fixture.controller, &fixture.resource, "sign")?;

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let authorized = fixture.verifier.verify(&parts, &expectations).await?;

    assert_eq!(
        authorized,
        Authorized {
            invoker: did(&fixture.controller),
            capability: fixture.resource,
        }
    );

    Ok(())
}

#[tokio::test]
async fn a_delegate_can_invoke_a_two_link_chain() -> Result<()> {
    let fixture = fixture().await?;
    let operator = test_key(2);
    let service = test_key(3);

    fixture
        .store
        .put(&delegate(
            "urn:zcap:operator",
            &fixture.resource,
            &operator,
            &fixture.resource,
            vec![Action::Sign, Action::Verify],
        ))
        .await?;
    fixture
        .store
        .put(&delegate(
            "urn:zcap:service",
            "urn:zcap:operator",
            &service,
            &fixture.resource,
            vec![Action::Sign],
        ))
        .await?;

    let mut parts = sign_request_parts();
    sign_invocation(&mut parts, &service, "urn:zcap:service", "sign")?;

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let authorized = fixture.verifier.verify(&parts, &expectations).await?;

    assert_eq!(authorized.invoker, did(&service));
    assert_eq!(authorized.capability, "urn:zcap:service");

    Ok(())
}

#[tokio::test]
async fn a_delegate_cannot_exceed_the_delegated_actions() -> Result<()> {
    let fixture = fixture().await?;
    let operator = test_key(2);
    fixture
        .store
        .put(&delegate(
            "urn:zcap:operator",
            &fixture.resource,
            &operator,
            &fixture.resource,
            vec![Action::Verify],
        ))
        .await?;

    let mut parts = sign_request_parts();
    sign_invocation(&mut parts, &operator, "urn:zcap:operator", "sign")?;

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let result = fixture.verifier.verify(&parts, &expectations).await;

    assert_eq!(
        result,
        Err(VerificationError::ActionNotAllowed {
            capability: "urn:zcap:operator".into(),
            action: Action::Sign,
        })
    );

    Ok(())
}

#[tokio::test]
async fn a_stranger_cannot_invoke_the_root_capability() -> Result<()> {
    let fixture = fixture().await?;
    let stranger = test_key(9);

    let mut parts = sign_request_parts();
    sign_invocation(&mut parts, &stranger, &fixture.resource, "sign")?;

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let result = fixture.verifier.verify(&parts, &expectations).await;

    assert!(matches!(result, Err(VerificationError::InvokerMismatch { .. })));

    Ok(())
}

#[tokio::test]
async fn capabilities_for_another_keystore_are_rejected() -> Result<()> {
    let fixture = fixture().await?;
    let other_resource = keystore_location(HOST, "ks-2");
    let other_controller = test_key(4);
    fixture
        .store
        .put(&Capability::root(other_resource.clone(), did(&other_controller)))
        .await?;

    let mut parts = sign_request_parts();
    sign_invocation(&mut parts, &other_controller, &other_resource, "sign")?;

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let result = fixture.verifier.verify(&parts, &expectations).await;

    assert!(matches!(result, Err(VerificationError::TargetMismatch { .. })));

    Ok(())
}

#[tokio::test]
async fn the_invoked_action_must_match_the_endpoint() -> Result<()> {
    let fixture = fixture().await?;
    let mut parts = sign_request_parts();
    sign_invocation(&mut parts, &fixture.controller, &fixture.resource, "decrypt")?;

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let result = fixture.verifier.verify(&parts, &expectations).await;

    assert_eq!(
        result,
        Err(VerificationError::ActionMismatch {
            expected: Action::Sign,
            found: "decrypt".into(),
        })
    );

    Ok(())
}

#[tokio::test]
async fn tampering_with_the_request_target_breaks_the_signature() -> Result<()> {
    let fixture = fixture().await?;
    let mut parts = sign_request_parts();
    sign_invocation(&mut parts, &fixture.controller, &fixture.resource, "sign")?;
    parts.uri = format!("/keystores/{KEYSTORE}/keys/k-2/sign").parse()?;

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let result = fixture.verifier.verify(&parts, &expectations).await;

    assert_eq!(result, Err(VerificationError::InvalidSignature));

    Ok(())
}

#[tokio::test]
async fn unsigned_requests_are_rejected() -> Result<()> {
    let fixture = fixture().await?;
    let parts = sign_request_parts();

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let result = fixture.verifier.verify(&parts, &expectations).await;

    assert_eq!(
        result,
        Err(VerificationError::MissingHeader("capability-invocation"))
    );

    Ok(())
}

#[tokio::test]
async fn unknown_capabilities_are_rejected() -> Result<()> {
    let fixture = fixture().await?;
    let mut parts = sign_request_parts();
    sign_invocation(&mut parts, &fixture.controller, "urn:zcap:nowhere", "sign")?;

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let result = fixture.verifier.verify(&parts, &expectations).await;

    assert_eq!(
        result,
        Err(VerificationError::CapabilityNotFound("urn:zcap:nowhere".into()))
    );

    Ok(())
}

#[tokio::test]
async fn cyclic_chains_are_cut_off() -> Result<()> {
    let fixture = fixture().await?;
    let operator = test_key(2);
    fixture
        .store
        .put(&delegate(
            "urn:zcap:a",
            "urn:zcap:b",
            &operator,
            &fixture.resource,
            vec![],
        ))
        .await?;
    fixture
        .store
        .put(&delegate(
            "urn:zcap:b",
            "urn:zcap:a",
            &operator,
            &fixture.resource,
            vec![],
        ))
        .await?;

    let mut parts = sign_request_parts();
    sign_invocation(&mut parts, &operator, "urn:zcap:a", "sign")?;

    let expectations = InvocationExpectations::new(fixture.resource.clone(), Action::Sign);
    let result = fixture.verifier.verify(&parts, &expectations).await;

    assert!(matches!(result, Err(VerificationError::ChainTooLong(_))));

    Ok(())
}
