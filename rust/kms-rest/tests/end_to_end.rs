//! Keystore and key operations through the bootstrapped service, with
//! invocations signed by real `did:key` principals.

use anyhow::{Result, anyhow};
use bytes::Bytes;
use ed25519_dalek::SigningKey;
use http_body_util::{BodyExt, Full};
use hyper::{Request, StatusCode, header::LOCATION};
use kms_capability::{Action, Capability, DidKey, httpsig::sign_invocation, keystore_location};
use kms_keystore::Keystore;
use kms_rest::{KmsService, bootstrap, models::*};
use kms_storage::{MemoryStorageBackend, MemoryStorageProvider};
use pretty_assertions::assert_eq;
use serde::{Serialize, de::DeserializeOwned};
use tower::ServiceExt;

const HOST: &str = "example.com";

type Service = KmsService<MemoryStorageBackend<String, Vec<u8>>>;

fn test_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn did(key: &SigningKey) -> String {
    DidKey(key.verifying_key()).to_string()
}

struct Reply {
    status: StatusCode,
    location: Option<String>,
    body: Bytes,
}

impl Reply {
    fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Send a request, signing it as an invocation of `capability` when an
/// invoker is given.
async fn send(
    service: &Service,
    method: &str,
    path: &str,
    body: Option<&impl Serialize>,
    invocation: Option<(&SigningKey, &str, &str)>,
) -> Result<Reply> {
    let body = match body {
        Some(body) => Bytes::from(serde_json::to_vec(body)?),
        None => Bytes::new(),
    };
    let (mut parts, body) = Request::builder()
        .method(method)
        .uri(path)
        .header("host", HOST)
        .body(Full::new(body))?
        .into_parts();
    if let Some((key, capability, action)) = invocation {
        sign_invocation(&mut parts, key, capability, action)?;
    }

    let response = service
        .clone()
        .oneshot(Request::from_parts(parts, body))
        .await?;
    let status = response.status();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|location| location.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await?.to_bytes();

    Ok(Reply {
        status,
        location,
        body,
    })
}

struct Fixture {
    service: Service,
    controller: SigningKey,
    keystore_id: String,
    resource: String,
}

impl Fixture {
    async fn new() -> Result<Self> {
        let service = bootstrap(&MemoryStorageProvider::default()).await?;
        let controller = test_key(1);

        let reply = send(
            &service,
            "POST",
            "/keystores",
            Some(&CreateKeystoreRequest {
                controller: did(&controller),
                delegate_key_type: None,
                recipient_key_type: None,
                mac_key_type: None,
                operational_vault_id: None,
            }),
            None,
        )
        .await?;
        assert_eq!(reply.status, StatusCode::CREATED);

        let keystore: Keystore = reply.json()?;
        let resource = keystore_location(HOST, &keystore.id);
        assert_eq!(reply.location.as_deref(), Some(resource.as_str()));

        Ok(Self {
            service,
            controller,
            keystore_id: keystore.id,
            resource,
        })
    }

    /// Invoke `action` on `path` (relative to the keystore) as the controller.
    async fn invoke(
        &self,
        method: &str,
        path: &str,
        body: Option<&impl Serialize>,
        action: &str,
    ) -> Result<Reply> {
        send(
            &self.service,
            method,
            &format!("/keystores/{}{path}", self.keystore_id),
            body,
            Some((&self.controller, &self.resource, action)),
        )
        .await
    }

    /// A capability over this keystore delegated to `invoker`.
    fn delegation(
        &self,
        id: &str,
        parent: &str,
        invoker: &SigningKey,
        actions: Vec<Action>,
    ) -> Capability {
        Capability {
            id: id.into(),
            parent_capability: Some(parent.into()),
            controller: None,
            invoker: Some(did(invoker)),
            invocation_target: self.resource.clone(),
            allowed_action: actions,
        }
    }

    /// Store `capability` as `invoker`, invoking `through`.
    async fn store_as(
        &self,
        invoker: &SigningKey,
        through: &str,
        capability: &Capability,
    ) -> Result<Reply> {
        send(
            &self.service,
            "POST",
            &format!("/keystores/{}/capability", self.keystore_id),
            Some(capability),
            Some((invoker, through, "storeCapability")),
        )
        .await
    }

    async fn create_key(&self, key_type: kms_keystore::KeyType) -> Result<String> {
        let reply = self
            .invoke("POST", "/keys", Some(&CreateKeyRequest { key_type }), "createKey")
            .await?;
        assert_eq!(reply.status, StatusCode::CREATED);

        let location = reply
            .location
            .ok_or_else(|| anyhow!("key creation returned no location"))?;
        let prefix = format!("{}/keys/", self.resource);
        location
            .strip_prefix(&prefix)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("unexpected key location {location}"))
    }
}

const NO_BODY: Option<&()> = None;

#[tokio::test]
async fn the_controller_can_sign_and_verify() -> Result<()> {
    let fixture = Fixture::new().await?;
    let key_id = fixture.create_key(kms_keystore::KeyType::Ed25519).await?;

    let message = b"attack at dawn".to_vec();
    let reply = fixture
        .invoke(
            "POST",
            &format!("/keys/{key_id}/sign"),
            Some(&SignRequest {
                message: message.clone(),
            }),
            "sign",
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    let SignResponse { signature } = reply.json()?;

    let verified = fixture
        .invoke(
            "POST",
            &format!("/keys/{key_id}/verify"),
            Some(&VerifyRequest {
                signature: signature.clone(),
                message,
            }),
            "verify",
        )
        .await?;
    assert_eq!(verified.status, StatusCode::OK);

    let rejected = fixture
        .invoke(
            "POST",
            &format!("/keys/{key_id}/verify"),
            Some(&VerifyRequest {
                signature,
                message: b"retreat at dusk".to_vec(),
            }),
            "verify",
        )
        .await?;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);

    let exported = fixture
        .invoke("GET", &format!("/keys/{key_id}/export"), NO_BODY, "exportKey")
        .await?;
    assert_eq!(exported.status, StatusCode::OK);
    assert_eq!(exported.json::<ExportKeyResponse>()?.public_key.len(), 32);

    Ok(())
}

#[tokio::test]
async fn encryption_mac_and_wrapping_round_trip() -> Result<()> {
    let fixture = Fixture::new().await?;
    let aead_key = fixture
        .create_key(kms_keystore::KeyType::ChaCha20Poly1305)
        .await?;
    let mac_key = fixture.create_key(kms_keystore::KeyType::HmacSha256).await?;

    let encrypted: EncryptResponse = fixture
        .invoke(
            "POST",
            &format!("/keys/{aead_key}/encrypt"),
            Some(&EncryptRequest {
                message: b"secret".to_vec(),
                aad: b"header".to_vec(),
            }),
            "encrypt",
        )
        .await?
        .json()?;
    let decrypted: DecryptResponse = fixture
        .invoke(
            "POST",
            &format!("/keys/{aead_key}/decrypt"),
            Some(&DecryptRequest {
                cipher_text: encrypted.cipher_text,
                aad: b"header".to_vec(),
                nonce: encrypted.nonce,
            }),
            "decrypt",
        )
        .await?
        .json()?;
    assert_eq!(decrypted.plain_text, b"secret".to_vec());

    let ComputeMacResponse { mac } = fixture
        .invoke(
            "POST",
            &format!("/keys/{mac_key}/computemac"),
            Some(&ComputeMacRequest {
                data: b"data".to_vec(),
            }),
            "computeMAC",
        )
        .await?
        .json()?;
    let checked = fixture
        .invoke(
            "POST",
            &format!("/keys/{mac_key}/verifymac"),
            Some(&VerifyMacRequest {
                mac,
                data: b"other data".to_vec(),
            }),
            "verifyMAC",
        )
        .await?;
    assert_eq!(checked.status, StatusCode::BAD_REQUEST);

    let wrapped: WrapResponse = fixture
        .invoke(
            "POST",
            &format!("/keys/{aead_key}/wrap"),
            Some(&WrapRequest { cek: vec![7; 32] }),
            "wrap",
        )
        .await?
        .json()?;
    let unwrapped: UnwrapResponse = fixture
        .invoke(
            "POST",
            &format!("/keys/{aead_key}/unwrap"),
            Some(&UnwrapRequest {
                wrapped_key: wrapped.wrapped_key,
                nonce: wrapped.nonce,
            }),
            "unwrap",
        )
        .await?
        .json()?;
    assert_eq!(unwrapped.key, vec![7; 32]);

    Ok(())
}

#[tokio::test]
async fn unsigned_and_mismatched_invocations_are_unauthorized() -> Result<()> {
    let fixture = Fixture::new().await?;
    let key_id = fixture.create_key(kms_keystore::KeyType::Ed25519).await?;
    let path = format!("/keystores/{}/keys/{key_id}/sign", fixture.keystore_id);
    let body = SignRequest {
        message: b"hi".to_vec(),
    };

    let unsigned = send(&fixture.service, "POST", &path, Some(&body), None).await?;
    assert_eq!(unsigned.status, StatusCode::UNAUTHORIZED);

    let wrong_action = fixture
        .invoke("POST", &format!("/keys/{key_id}/sign"), Some(&body), "verify")
        .await?;
    assert_eq!(wrong_action.status, StatusCode::UNAUTHORIZED);

    let stranger = send(
        &fixture.service,
        "POST",
        &path,
        Some(&body),
        Some((&test_key(9), &fixture.resource, "sign")),
    )
    .await?;
    assert_eq!(stranger.status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn delegated_capabilities_grant_only_their_actions() -> Result<()> {
    let fixture = Fixture::new().await?;
    let key_id = fixture.create_key(kms_keystore::KeyType::Ed25519).await?;
    let delegate = test_key(2);

    let capability = Capability {
        id: "urn:zcap:signer".into(),
        parent_capability: Some(fixture.resource.clone()),
        controller: None,
        invoker: Some(did(&delegate)),
        invocation_target: fixture.resource.clone(),
        allowed_action: vec![Action::Sign],
    };
    let stored = fixture
        .invoke("POST", "/capability", Some(&capability), "storeCapability")
        .await?;
    assert_eq!(stored.status, StatusCode::OK);

    let path = format!("/keystores/{}/keys/{key_id}", fixture.keystore_id);
    let signed = send(
        &fixture.service,
        "POST",
        &format!("{path}/sign"),
        Some(&SignRequest {
            message: b"hi".to_vec(),
        }),
        Some((&delegate, "urn:zcap:signer", "sign")),
    )
    .await?;
    assert_eq!(signed.status, StatusCode::OK);

    let exported = send(
        &fixture.service,
        "GET",
        &format!("{path}/export"),
        NO_BODY,
        Some((&delegate, "urn:zcap:signer", "exportKey")),
    )
    .await?;
    assert_eq!(exported.status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn capabilities_for_other_keystores_cannot_be_stored() -> Result<()> {
    let fixture = Fixture::new().await?;
    let capability = Capability {
        id: "urn:zcap:elsewhere".into(),
        parent_capability: Some(fixture.resource.clone()),
        controller: None,
        invoker: Some(did(&test_key(2))),
        invocation_target: keystore_location(HOST, "someone-else"),
        allowed_action: vec![],
    };

    let reply = fixture
        .invoke("POST", "/capability", Some(&capability), "storeCapability")
        .await?;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn a_delegate_cannot_store_capabilities_wider_than_its_own() -> Result<()> {
    let fixture = Fixture::new().await?;
    let key_id = fixture.create_key(kms_keystore::KeyType::Ed25519).await?;
    let eve = test_key(5);

    let store_only = fixture.delegation(
        "urn:zcap:store-only",
        &fixture.resource,
        &eve,
        vec![Action::StoreCapability],
    );
    let stored = fixture
        .invoke("POST", "/capability", Some(&store_only), "storeCapability")
        .await?;
    assert_eq!(stored.status, StatusCode::OK);

    let unrestricted = fixture.delegation("urn:zcap:eve-all", &fixture.resource, &eve, vec![]);
    let reply = fixture
        .store_as(&eve, "urn:zcap:store-only", &unrestricted)
        .await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let export = fixture.delegation(
        "urn:zcap:eve-export",
        "urn:zcap:store-only",
        &eve,
        vec![Action::ExportKey],
    );
    let reply = fixture
        .store_as(&eve, "urn:zcap:store-only", &export)
        .await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let signer = fixture.delegation(
        "urn:zcap:signer",
        &fixture.resource,
        &test_key(6),
        vec![Action::Sign],
    );
    fixture
        .invoke("POST", "/capability", Some(&signer), "storeCapability")
        .await?;
    let sideways = fixture.delegation(
        "urn:zcap:eve-sign",
        "urn:zcap:signer",
        &eve,
        vec![Action::Sign],
    );
    let reply = fixture
        .store_as(&eve, "urn:zcap:store-only", &sideways)
        .await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let exported = send(
        &fixture.service,
        "GET",
        &format!("/keystores/{}/keys/{key_id}/export", fixture.keystore_id),
        NO_BODY,
        Some((&eve, "urn:zcap:eve-all", "exportKey")),
    )
    .await?;
    assert_eq!(exported.status, StatusCode::UNAUTHORIZED);

    let narrower = fixture.delegation(
        "urn:zcap:eve-helper",
        "urn:zcap:store-only",
        &test_key(6),
        vec![Action::StoreCapability],
    );
    let reply = fixture
        .store_as(&eve, "urn:zcap:store-only", &narrower)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn stored_capabilities_are_never_replaced() -> Result<()> {
    let fixture = Fixture::new().await?;
    let key_id = fixture.create_key(kms_keystore::KeyType::Ed25519).await?;
    let eve = test_key(5);

    let store_only = fixture.delegation(
        "urn:zcap:store-only",
        &fixture.resource,
        &eve,
        vec![Action::StoreCapability],
    );
    let stored = fixture
        .invoke("POST", "/capability", Some(&store_only), "storeCapability")
        .await?;
    assert_eq!(stored.status, StatusCode::OK);

    let hijack_root = fixture.delegation(
        &fixture.resource,
        "urn:zcap:store-only",
        &eve,
        vec![Action::StoreCapability],
    );
    let reply = fixture
        .store_as(&eve, "urn:zcap:store-only", &hijack_root)
        .await?;
    assert_eq!(reply.status, StatusCode::CONFLICT);

    let mut replacement = store_only.clone();
    replacement.invoker = Some(did(&test_key(7)));
    let reply = fixture
        .invoke("POST", "/capability", Some(&replacement), "storeCapability")
        .await?;
    assert_eq!(reply.status, StatusCode::CONFLICT);

    let exported = fixture
        .invoke("GET", &format!("/keys/{key_id}/export"), NO_BODY, "exportKey")
        .await?;
    assert_eq!(exported.status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn malformed_bodies_and_unknown_keys_are_client_errors() -> Result<()> {
    let fixture = Fixture::new().await?;
    let key_id = fixture.create_key(kms_keystore::KeyType::HmacSha256).await?;

    let malformed = fixture
        .invoke(
            "POST",
            &format!("/keys/{key_id}/computemac"),
            Some(&serde_json::json!({ "data": "%%%" })),
            "computeMAC",
        )
        .await?;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let unknown = fixture
        .invoke(
            "POST",
            "/keys/01ARZ3NDEKTSV4RRFFQ69G5FAV/computemac",
            Some(&ComputeMacRequest {
                data: b"data".to_vec(),
            }),
            "computeMAC",
        )
        .await?;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let wrong_type = fixture
        .invoke(
            "POST",
            &format!("/keys/{key_id}/sign"),
            Some(&SignRequest {
                message: b"hi".to_vec(),
            }),
            "sign",
        )
        .await?;
    assert_eq!(wrong_type.status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn keystores_require_a_controller() -> Result<()> {
    let service = bootstrap(&MemoryStorageProvider::default()).await?;

    let reply = send(
        &service,
        "POST",
        "/keystores",
        Some(&serde_json::json!({ "controller": "" })),
        None,
    )
    .await?;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    Ok(())
}
