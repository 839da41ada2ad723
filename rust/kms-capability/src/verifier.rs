use async_trait::async_trait;
use hyper::http::request::Parts;

use crate::{InvocationExpectations, VerificationError};

/// The outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    /// DID of the principal that invoked the capability
    pub invoker: String,
    /// Id of the capability that was invoked
    pub capability: String,
}

/// Decides whether a request carries a valid capability invocation meeting
/// the given expectations.
///
/// The verifier is the only authority on cryptographic validity. Callers
/// forward the request on `Ok` and reject it on `Err`, without second
/// guessing the verdict.
#[async_trait]
pub trait InvocationVerifier: Send + Sync {
    /// Verify the invocation carried by `request` against `expectations`.
    async fn verify(
        &self,
        request: &Parts,
        expectations: &InvocationExpectations,
    ) -> Result<Authorized, VerificationError>;
}
