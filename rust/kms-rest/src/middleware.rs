//! Capability-invocation authorization of KMS requests.

use std::{
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};
use kms_capability::{
    InvocationExpectations, InvocationVerifier, VerificationError, expected_action,
    keystore_location,
};
use tower::{Layer, Service};
use tracing::{debug, error};

use crate::{KEYSTORE_ID_VAR, MatchedRoute, request_host, text_response};

/// Called with the reason whenever an invocation fails verification.
pub type ErrorCallback = Arc<dyn Fn(&VerificationError) + Send + Sync>;

/// Body of the response to requests that cannot be authorized at all.
pub const BAD_REQUEST: &str = "bad request";
/// Body of the response to requests whose invocation fails verification.
pub const UNAUTHORIZED: &str = "unauthorized";

/// [`Layer`] producing [`Authorization`] services.
#[derive(Clone)]
pub struct AuthorizationLayer {
    verifier: Arc<dyn InvocationVerifier>,
    on_error: ErrorCallback,
}

impl AuthorizationLayer {
    /// Authorize requests with `verifier`, logging failures at error level.
    pub fn new(verifier: Arc<dyn InvocationVerifier>) -> Self {
        Self {
            verifier,
            on_error: Arc::new(log_verification_error),
        }
    }

    /// Report verification failures to `on_error` instead of the log.
    pub fn with_error_callback(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = on_error;
        self
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = Authorization<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Authorization {
            inner,
            verifier: self.verifier.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

/// Requires a valid capability invocation on every request that reaches it,
/// except keystore creation.
///
/// For a request bound to a KMS route, the invocation target and the root
/// capability are the keystore's resource URI (built from the `Host` header
/// and the `keystoreID` path variable), and the action is the one mapped to
/// the route. A request whose route has no action, or that names no
/// keystore, is answered with 400 `bad request` without consulting the
/// verifier. A failed verification is answered with 401 `unauthorized`. A
/// verified request is forwarded with the [`kms_capability::Authorized`]
/// outcome attached as an extension.
#[derive(Clone)]
pub struct Authorization<S> {
    inner: S,
    verifier: Arc<dyn InvocationVerifier>,
    on_error: ErrorCallback,
}

impl<S, B> Service<Request<B>> for Authorization<S>
where
    S: Service<Request<B>, Response = Response<Full<Bytes>>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
    B: Send + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        // Take the service that was polled ready and leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let verifier = self.verifier.clone();
        let on_error = self.on_error.clone();

        Box::pin(async move {
            let method = request.method().clone();
            let uri = request.uri().clone();
            debug!(%method, %uri, "handling request");

            let response = match authorize(verifier.as_ref(), on_error.as_ref(), request).await {
                Ok(request) => inner.call(request).await?,
                Err(response) => response,
            };

            debug!(%method, %uri, status = %response.status(), "finished handling request");
            Ok(response)
        })
    }
}

async fn authorize<B>(
    verifier: &dyn InvocationVerifier,
    on_error: &(dyn Fn(&VerificationError) + Send + Sync),
    request: Request<B>,
) -> Result<Request<B>, Response<Full<Bytes>>> {
    let Some(route) = request.extensions().get::<MatchedRoute>() else {
        error!("request reached authorization without a matched route");
        return Err(text_response(StatusCode::BAD_REQUEST, BAD_REQUEST));
    };

    if route.name.bypasses_authorization() {
        return Ok(request);
    }

    let keystore_id = match route.var(KEYSTORE_ID_VAR) {
        Some(keystore_id) if !keystore_id.is_empty() => keystore_id,
        _ => {
            error!(route = %route.name, "request names no keystore");
            return Err(text_response(StatusCode::BAD_REQUEST, BAD_REQUEST));
        }
    };

    let action = match expected_action(route.name) {
        Ok(action) => action,
        Err(error) => {
            error!("{error}");
            return Err(text_response(StatusCode::BAD_REQUEST, BAD_REQUEST));
        }
    };

    let host = request_host(&request);
    let expectations = InvocationExpectations::new(keystore_location(host, keystore_id), action);

    let (mut parts, body) = request.into_parts();
    match verifier.verify(&parts, &expectations).await {
        Ok(authorized) => {
            debug!(
                invoker = %authorized.invoker,
                capability = %authorized.capability,
                %action,
                "authorized capability invocation"
            );
            parts.extensions.insert(authorized);
            Ok(Request::from_parts(parts, body))
        }
        Err(verification_error) => {
            on_error(&verification_error);
            Err(text_response(StatusCode::UNAUTHORIZED, UNAUTHORIZED))
        }
    }
}

fn log_verification_error(error: &VerificationError) {
    error!("unauthorized capability invocation: {error}");
}
