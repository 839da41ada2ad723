//! Request handlers behind the authorization middleware.

use std::{
    convert::Infallible,
    fmt::Display,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::{
    Request, Response, StatusCode,
    body::Body,
    header::{CONTENT_TYPE, HeaderValue, LOCATION},
};
use kms_capability::{
    Authorized, CAPABILITY_STORE_NAME, Capability, CapabilityStore, DelegationError, RouteName,
    keystore_location,
};
use kms_keystore::{
    KEYSTORE_STORE_NAME, KMS_STORE_NAME, KeystoreError, KeystoreOptions, KeystoreRepository,
    KmsError, KmsProvider, LocalKms, MasterKeyReader,
};
use kms_storage::{KmsStorageError, StorageBackend, StorageProvider};
use serde::{Serialize, de::DeserializeOwned};
use tower::Service;
use tracing::error;

use crate::{KEY_ID_VAR, KEYSTORE_ID_VAR, MatchedRoute, models::*, request_host, text_response};

/// The stores every handler works against.
pub struct KmsState<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    keystores: KeystoreRepository<Backend>,
    capabilities: CapabilityStore<Backend>,
    kms: KmsProvider<Backend>,
}

impl<Backend> KmsState<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    /// Open the keystore, capability and key stores of `provider`.
    pub async fn open<Provider>(
        provider: &Provider,
        master_key: &MasterKeyReader,
    ) -> Result<Self, KmsStorageError>
    where
        Provider: StorageProvider<Backend = Backend>,
    {
        Ok(Self {
            keystores: KeystoreRepository::new(provider.open_store(KEYSTORE_STORE_NAME).await?),
            capabilities: CapabilityStore::new(provider.open_store(CAPABILITY_STORE_NAME).await?),
            kms: KmsProvider::new(provider.open_store(KMS_STORE_NAME).await?, master_key),
        })
    }

    /// The capability store, which also backs invocation verification.
    pub fn capabilities(&self) -> &CapabilityStore<Backend> {
        &self.capabilities
    }
}

/// A request that could not be served, with the status to answer it with.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(error: impl Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    /// The HTTP status this error is answered with.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        }
        text_response(self.status, &self.message)
    }
}

impl From<KmsStorageError> for ApiError {
    fn from(error: KmsStorageError) -> Self {
        ApiError::internal(error)
    }
}

impl From<KmsError> for ApiError {
    fn from(error: KmsError) -> Self {
        let status = match &error {
            KmsError::KeyNotFound(_) => StatusCode::NOT_FOUND,
            KmsError::UnsupportedOperation { .. }
            | KmsError::InvalidSignature
            | KmsError::InvalidMac
            | KmsError::DecryptionFailed
            | KmsError::InvalidNonce(_) => StatusCode::BAD_REQUEST,
            KmsError::Storage(_)
            | KmsError::Rng(_)
            | KmsError::CorruptKey(_)
            | KmsError::EncryptionFailed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, error.to_string())
    }
}

impl From<DelegationError> for ApiError {
    fn from(error: DelegationError) -> Self {
        let status = match &error {
            DelegationError::MissingParent(_) | DelegationError::TargetMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            DelegationError::ParentNotHeld { .. } | DelegationError::Escalation(_) => {
                StatusCode::FORBIDDEN
            }
            DelegationError::AlreadyExists(_) => StatusCode::CONFLICT,
            DelegationError::Chain(_) | DelegationError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, error.to_string())
    }
}

impl From<KeystoreError> for ApiError {
    fn from(error: KeystoreError) -> Self {
        match error {
            KeystoreError::Kms(error) => error.into(),
            KeystoreError::MissingController => ApiError::bad_request(error.to_string()),
            KeystoreError::AlreadyExists(_) => ApiError::new(StatusCode::CONFLICT, error.to_string()),
            KeystoreError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, error.to_string()),
            KeystoreError::Storage(_) => ApiError::internal(error),
        }
    }
}

/// The innermost service: dispatches a routed request to its handler.
pub struct KmsApi<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    state: Arc<KmsState<Backend>>,
}

impl<Backend> KmsApi<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    /// Serve requests against `state`.
    pub fn new(state: KmsState<Backend>) -> Self {
        Self {
            state: Arc::new(state),
        }
    }
}

impl<Backend> Clone for KmsApi<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<Backend, B> Service<Request<B>> for KmsApi<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError> + 'static,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Display,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let state = self.state.clone();
        Box::pin(async move {
            Ok(handle(&state, request)
                .await
                .unwrap_or_else(ApiError::into_response))
        })
    }
}

async fn handle<Backend, B>(
    state: &KmsState<Backend>,
    request: Request<B>,
) -> Result<Response<Full<Bytes>>, ApiError>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
    B: Body,
    B::Error: Display,
{
    let route = request
        .extensions()
        .get::<MatchedRoute>()
        .cloned()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "404 page not found"))?;
    let host = request_host(&request).to_string();
    let authorized = request.extensions().get::<Authorized>().cloned();
    let body = request
        .into_body()
        .collect()
        .await
        .map_err(|error| ApiError::bad_request(format!("failed to read request body: {error}")))?
        .to_bytes();

    if route.name == RouteName::Keystores {
        return create_keystore(state, &host, &body).await;
    }

    let keystore_id = path_var(&route, KEYSTORE_ID_VAR)?;
    state
        .keystores
        .get(keystore_id)
        .await?
        .ok_or_else(|| ApiError::from(KeystoreError::NotFound(keystore_id.to_string())))?;
    let kms = state.kms.kms(keystore_id);

    match route.name {
        RouteName::Keys => create_key(state, &kms, &host, &body).await,
        RouteName::Capability => store_capability(state, authorized.as_ref(), &body).await,
        RouteName::Export => {
            let public_key = kms.export_public_key(path_var(&route, KEY_ID_VAR)?).await?;
            json_response(StatusCode::OK, &ExportKeyResponse { public_key })
        }
        RouteName::Sign => {
            let request: SignRequest = parse(&body)?;
            let signature = kms.sign(path_var(&route, KEY_ID_VAR)?, &request.message).await?;
            json_response(StatusCode::OK, &SignResponse { signature })
        }
        RouteName::Verify => {
            let request: VerifyRequest = parse(&body)?;
            kms.verify(path_var(&route, KEY_ID_VAR)?, &request.signature, &request.message)
                .await?;
            Ok(empty_response(StatusCode::OK))
        }
        RouteName::Encrypt => {
            let request: EncryptRequest = parse(&body)?;
            let sealed = kms
                .encrypt(path_var(&route, KEY_ID_VAR)?, &request.message, &request.aad)
                .await?;
            json_response(
                StatusCode::OK,
                &EncryptResponse {
                    cipher_text: sealed.ciphertext,
                    nonce: sealed.nonce,
                },
            )
        }
        RouteName::Decrypt => {
            let request: DecryptRequest = parse(&body)?;
            let plain_text = kms
                .decrypt(
                    path_var(&route, KEY_ID_VAR)?,
                    &request.cipher_text,
                    &request.aad,
                    &request.nonce,
                )
                .await?;
            json_response(StatusCode::OK, &DecryptResponse { plain_text })
        }
        RouteName::ComputeMac => {
            let request: ComputeMacRequest = parse(&body)?;
            let mac = kms.compute_mac(path_var(&route, KEY_ID_VAR)?, &request.data).await?;
            json_response(StatusCode::OK, &ComputeMacResponse { mac })
        }
        RouteName::VerifyMac => {
            let request: VerifyMacRequest = parse(&body)?;
            kms.verify_mac(path_var(&route, KEY_ID_VAR)?, &request.mac, &request.data)
                .await?;
            Ok(empty_response(StatusCode::OK))
        }
        RouteName::Wrap => {
            let request: WrapRequest = parse(&body)?;
            let sealed = kms.wrap_key(path_var(&route, KEY_ID_VAR)?, &request.cek).await?;
            json_response(
                StatusCode::OK,
                &WrapResponse {
                    wrapped_key: sealed.ciphertext,
                    nonce: sealed.nonce,
                },
            )
        }
        RouteName::Unwrap => {
            let request: UnwrapRequest = parse(&body)?;
            let key = kms
                .unwrap_key(path_var(&route, KEY_ID_VAR)?, &request.wrapped_key, &request.nonce)
                .await?;
            json_response(StatusCode::OK, &UnwrapResponse { key: key.to_vec() })
        }
        RouteName::Health | RouteName::Keystores => Ok(text_response(StatusCode::OK, "ok")),
    }
}

async fn create_keystore<Backend>(
    state: &KmsState<Backend>,
    host: &str,
    body: &[u8],
) -> Result<Response<Full<Bytes>>, ApiError>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    let request: CreateKeystoreRequest = parse(body)?;

    let mut options = KeystoreOptions::new(request.controller);
    if let Some(key_type) = request.delegate_key_type {
        options = options.with_delegate_key_type(key_type);
    }
    if let Some(key_type) = request.recipient_key_type {
        options = options.with_recipient_key_type(key_type);
    }
    if let Some(key_type) = request.mac_key_type {
        options = options.with_mac_key_type(key_type);
    }
    if let Some(vault_id) = request.operational_vault_id {
        options = options.with_operational_vault_id(vault_id);
    }

    let keystore = state
        .keystores
        .create(options, |id| state.kms.kms(id))
        .await?;

    let location = keystore_location(host, &keystore.id);
    state
        .capabilities
        .put(&Capability::root(location.clone(), keystore.controller.clone()))
        .await?;

    let mut response = json_response(StatusCode::CREATED, &keystore)?;
    set_location(&mut response, &location)?;
    Ok(response)
}

async fn create_key<Backend>(
    state: &KmsState<Backend>,
    kms: &LocalKms<Backend>,
    host: &str,
    body: &[u8],
) -> Result<Response<Full<Bytes>>, ApiError>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    let request: CreateKeyRequest = parse(body)?;
    let key_id = kms.create_key(request.key_type).await?;
    state
        .keystores
        .add_operational_key(kms.keystore_id(), &key_id)
        .await?;

    let mut response = empty_response(StatusCode::CREATED);
    set_location(
        &mut response,
        &format!("{}/keys/{key_id}", keystore_location(host, kms.keystore_id())),
    )?;
    Ok(response)
}

async fn store_capability<Backend>(
    state: &KmsState<Backend>,
    authorized: Option<&Authorized>,
    body: &[u8],
) -> Result<Response<Full<Bytes>>, ApiError>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    let Some(authorized) = authorized else {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized"));
    };
    let capability: Capability = parse(body)?;

    state
        .capabilities
        .delegate(&authorized.capability, &capability)
        .await?;
    Ok(empty_response(StatusCode::OK))
}

fn path_var<'a>(route: &'a MatchedRoute, name: &str) -> Result<&'a str, ApiError> {
    route
        .var(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("missing path variable {name}")))
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|error| ApiError::bad_request(format!("failed to decode request: {error}")))
}

fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Full<Bytes>>, ApiError> {
    let body = serde_json::to_vec(value).map_err(ApiError::internal)?;
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn set_location(response: &mut Response<Full<Bytes>>, location: &str) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(location).map_err(ApiError::internal)?;
    response.headers_mut().insert(LOCATION, value);
    Ok(())
}
