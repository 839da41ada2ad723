#![warn(missing_docs)]

//! HTTP front end of the key-management service.
//!
//! Requests flow through three layers:
//!
//! 1. [`Routing`] binds the request to a [`RouteName`](kms_capability::RouteName)
//!    and answers health checks, unknown paths and wrong methods itself.
//! 2. [`Authorization`] checks the capability invocation carried by the
//!    request, except for keystore creation.
//! 3. [`KmsApi`] performs the keystore or key operation.
//!
//! [`bootstrap`] provisions the master key and assembles the stack over any
//! [`StorageProvider`]; [`serve`] runs it on a listener.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Request, Response, StatusCode,
    header::{CONTENT_TYPE, HOST, HeaderValue, X_CONTENT_TYPE_OPTIONS},
};
use kms_capability::{DidKeyResolver, HttpSignatureVerifier, InvocationVerifier};
use kms_keystore::{MasterKeyError, provision_master_key};
use kms_storage::{KmsStorageError, StorageProvider};
use tower::ServiceBuilder;
use tracing::info;

mod config;
pub use config::*;

mod router;
pub use router::*;

mod middleware;
pub use middleware::*;

pub mod models;

mod handlers;
pub use handlers::*;

mod server;
pub use server::*;

/// The full request-handling stack over stores of type `Backend`.
pub type KmsService<Backend> = Routing<Authorization<KmsApi<Backend>>>;

/// Errors assembling the service at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The master key could not be provisioned
    #[error(transparent)]
    MasterKey(#[from] MasterKeyError),

    /// A store could not be opened
    #[error(transparent)]
    Storage(#[from] KmsStorageError),
}

/// Assemble the request-handling stack around `verifier`.
pub fn kms_service<Backend>(
    state: KmsState<Backend>,
    verifier: Arc<dyn InvocationVerifier>,
) -> KmsService<Backend>
where
    Backend: kms_storage::StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    ServiceBuilder::new()
        .layer(RoutingLayer)
        .layer(AuthorizationLayer::new(verifier))
        .service(KmsApi::new(state))
}

/// Provision the master key and assemble the service over `provider`,
/// verifying invocations against the stored capabilities and `did:key`
/// signers.
pub async fn bootstrap<Provider>(
    provider: &Provider,
) -> Result<KmsService<Provider::Backend>, StartupError>
where
    Provider: StorageProvider,
{
    let master_key = provision_master_key(provider).await?;
    let state = KmsState::open(provider, &master_key).await?;
    let verifier = HttpSignatureVerifier::new(
        Arc::new(state.capabilities().clone()),
        Arc::new(DidKeyResolver),
    );

    info!("key-management service ready");
    Ok(kms_service(state, Arc::new(verifier)))
}

/// The host a request was addressed to: the `Host` header, else the URI
/// authority, else empty.
pub fn request_host<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))
        .unwrap_or_default()
}

/// A plain-text response, newline terminated.
pub(crate) fn text_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(format!("{message}\n"))));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}
