//! Binds request paths to [`RouteName`]s.
//!
//! [`Routing`] is the outermost service. It answers health checks itself,
//! rejects unknown paths and methods, and tags every other request with a
//! [`MatchedRoute`] extension before passing it on.

use std::{
    collections::HashMap,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::Full;
use hyper::{Method, Request, Response, StatusCode};
use kms_capability::RouteName;
use tower::{Layer, Service};

use crate::text_response;

/// Path variable holding the keystore id.
pub const KEYSTORE_ID_VAR: &str = "keystoreID";
/// Path variable holding the key id.
pub const KEY_ID_VAR: &str = "keyID";

/// The route a request was bound to, with its path variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute {
    /// The route the request was bound to
    pub name: RouteName,
    /// Path variables by name, e.g. [KEYSTORE_ID_VAR]
    pub vars: HashMap<String, String>,
}

impl MatchedRoute {
    /// The value of path variable `name`, if bound.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// Why a request could not be bound to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// No route matches the path
    #[error("404 page not found")]
    NotFound,
    /// The path matches a route served under another method
    #[error("method not allowed")]
    MethodNotAllowed,
}

/// Match `method` and `path` against the route table.
pub fn match_route(method: &Method, path: &str) -> Result<MatchedRoute, RouteError> {
    let segments: Vec<&str> = path
        .strip_prefix('/')
        .ok_or(RouteError::NotFound)?
        .split('/')
        .collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(RouteError::NotFound);
    }

    let (name, allowed, vars) = match segments.as_slice() {
        ["healthcheck"] => (RouteName::Health, Method::GET, vec![]),
        ["keystores"] => (RouteName::Keystores, Method::POST, vec![]),
        ["keystores", keystore_id, "keys"] => (
            RouteName::Keys,
            Method::POST,
            vec![(KEYSTORE_ID_VAR, *keystore_id)],
        ),
        ["keystores", keystore_id, "capability"] => (
            RouteName::Capability,
            Method::POST,
            vec![(KEYSTORE_ID_VAR, *keystore_id)],
        ),
        ["keystores", keystore_id, "keys", key_id, operation] => {
            let (name, allowed) = match *operation {
                "export" => (RouteName::Export, Method::GET),
                "sign" => (RouteName::Sign, Method::POST),
                "verify" => (RouteName::Verify, Method::POST),
                "encrypt" => (RouteName::Encrypt, Method::POST),
                "decrypt" => (RouteName::Decrypt, Method::POST),
                "computemac" => (RouteName::ComputeMac, Method::POST),
                "verifymac" => (RouteName::VerifyMac, Method::POST),
                "wrap" => (RouteName::Wrap, Method::POST),
                "unwrap" => (RouteName::Unwrap, Method::POST),
                _ => return Err(RouteError::NotFound),
            };
            (
                name,
                allowed,
                vec![(KEYSTORE_ID_VAR, *keystore_id), (KEY_ID_VAR, *key_id)],
            )
        }
        _ => return Err(RouteError::NotFound),
    };

    if *method != allowed {
        return Err(RouteError::MethodNotAllowed);
    }

    Ok(MatchedRoute {
        name,
        vars: vars
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    })
}

/// [`Layer`] producing [`Routing`] services.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingLayer;

impl<S> Layer<S> for RoutingLayer {
    type Service = Routing<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Routing { inner }
    }
}

/// See the [module documentation](self).
#[derive(Debug, Clone)]
pub struct Routing<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for Routing<S>
where
    S: Service<Request<B>, Response = Response<Full<Bytes>>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        match match_route(request.method(), request.uri().path()) {
            Ok(route) if route.name == RouteName::Health => {
                Box::pin(async { Ok(text_response(StatusCode::OK, "ok")) })
            }
            Ok(route) => {
                request.extensions_mut().insert(route);
                Box::pin(self.inner.call(request))
            }
            Err(error) => {
                let status = match error {
                    RouteError::NotFound => StatusCode::NOT_FOUND,
                    RouteError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
                };
                Box::pin(async move { Ok(text_response(status, &error.to_string())) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn it_binds_every_kms_route() {
        let cases = [
            (Method::POST, "/keystores", RouteName::Keystores),
            (Method::POST, "/keystores/ks-1/keys", RouteName::Keys),
            (Method::POST, "/keystores/ks-1/capability", RouteName::Capability),
            (Method::GET, "/keystores/ks-1/keys/k-1/export", RouteName::Export),
            (Method::POST, "/keystores/ks-1/keys/k-1/sign", RouteName::Sign),
            (Method::POST, "/keystores/ks-1/keys/k-1/verify", RouteName::Verify),
            (Method::POST, "/keystores/ks-1/keys/k-1/encrypt", RouteName::Encrypt),
            (Method::POST, "/keystores/ks-1/keys/k-1/decrypt", RouteName::Decrypt),
            (Method::POST, "/keystores/ks-1/keys/k-1/computemac", RouteName::ComputeMac),
            (Method::POST, "/keystores/ks-1/keys/k-1/verifymac", RouteName::VerifyMac),
            (Method::POST, "/keystores/ks-1/keys/k-1/wrap", RouteName::Wrap),
            (Method::POST, "/keystores/ks-1/keys/k-1/unwrap", RouteName::Unwrap),
            (Method::GET, "/healthcheck", RouteName::Health),
        ];

        for (method, path, name) in cases {
            assert_eq!(match_route(&method, path).map(|route| route.name), Ok(name), "{path}");
        }
    }

    #[test]
    fn it_extracts_path_variables() -> Result<(), RouteError> {
        let route = match_route(&Method::POST, "/keystores/ks-1/keys/k-1/sign")?;

        assert_eq!(route.var(KEYSTORE_ID_VAR), Some("ks-1"));
        assert_eq!(route.var(KEY_ID_VAR), Some("k-1"));

        let route = match_route(&Method::POST, "/keystores")?;
        assert_eq!(route.var(KEYSTORE_ID_VAR), None);

        Ok(())
    }

    #[test]
    fn it_rejects_unknown_paths_and_methods() {
        assert_eq!(
            match_route(&Method::GET, "/keystores/ks-1/keys/k-1/rotate"),
            Err(RouteError::NotFound)
        );
        assert_eq!(
            match_route(&Method::POST, "/keystores//keys"),
            Err(RouteError::NotFound)
        );
        assert_eq!(match_route(&Method::GET, "/"), Err(RouteError::NotFound));
        assert_eq!(
            match_route(&Method::GET, "/keystores/ks-1/keys/k-1/sign"),
            Err(RouteError::MethodNotAllowed)
        );
        assert_eq!(
            match_route(&Method::POST, "/keystores/ks-1/keys/k-1/export"),
            Err(RouteError::MethodNotAllowed)
        );
    }
}
