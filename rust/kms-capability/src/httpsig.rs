//! Capability invocations carried in HTTP signatures.
//!
//! An invocation is expressed with two request headers:
//!
//! ```text
//! Capability-Invocation: zcap id="<capability id>",action="<action>"
//! Signature: keyId="<did:key>",algorithm="ed25519",headers="(request-target) host capability-invocation",signature="<base64>"
//! ```
//!
//! The signature covers a signing string built from the listed headers, one
//! `name: value` line per header, where the `(request-target)` pseudo header
//! is the lower-cased method followed by the path and query. The listed
//! headers must include `(request-target)` and `capability-invocation`, which
//! binds the signature to both the endpoint and the invoked capability.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey};
use hyper::http::{HeaderValue, request::Parts};
use tracing::debug;

use crate::{
    Authorized, Capability, CapabilityResolver, DidKey, InvocationExpectations,
    InvocationVerifier, KeyResolver, SignatureSuite, VerificationError,
};

/// Header carrying the invoked capability and action.
pub const CAPABILITY_INVOCATION_HEADER: &str = "capability-invocation";

/// Header carrying the HTTP signature.
pub const SIGNATURE_HEADER: &str = "signature";

/// Pseudo header naming the method and path of the request.
pub const REQUEST_TARGET: &str = "(request-target)";

/// Longest delegation chain accepted, root included.
pub const MAX_CHAIN_LENGTH: usize = 10;

/// The headers signed by [`sign_invocation`].
const SIGNED_HEADERS: [&str; 3] = [REQUEST_TARGET, "host", CAPABILITY_INVOCATION_HEADER];

/// The parsed `Capability-Invocation` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityInvocation {
    /// Id of the invoked capability
    pub capability: String,
    /// The action being invoked
    pub action: String,
}

impl CapabilityInvocation {
    /// Parse the value of a `Capability-Invocation` header.
    pub fn parse(value: &str) -> Result<Self, VerificationError> {
        let malformed = |reason: &str| VerificationError::MalformedHeader {
            header: CAPABILITY_INVOCATION_HEADER,
            reason: reason.to_string(),
        };

        let (scheme, params) = value
            .trim()
            .split_once(' ')
            .ok_or_else(|| malformed("expected 'zcap' followed by parameters"))?;
        if !scheme.eq_ignore_ascii_case("zcap") {
            return Err(malformed("unsupported invocation scheme"));
        }

        let mut params = parse_params(params).map_err(|reason| malformed(&reason))?;
        let capability = params
            .remove("id")
            .ok_or_else(|| malformed("missing 'id' parameter"))?;
        let action = params
            .remove("action")
            .ok_or_else(|| malformed("missing 'action' parameter"))?;

        Ok(Self { capability, action })
    }

    /// Render as a header value.
    pub fn to_header_value(&self) -> String {
        format!("zcap id=\"{}\",action=\"{}\"", self.capability, self.action)
    }
}

/// The parsed `Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSignature {
    /// Id of the signing key
    pub key_id: String,
    /// Signature algorithm, if stated
    pub algorithm: Option<String>,
    /// Lower-cased names of the signed headers, in signing order
    pub headers: Vec<String>,
    /// Base64 encoded signature
    pub signature: String,
}

impl HttpSignature {
    /// Parse the value of a `Signature` header.
    pub fn parse(value: &str) -> Result<Self, VerificationError> {
        let malformed = |reason: &str| VerificationError::MalformedHeader {
            header: SIGNATURE_HEADER,
            reason: reason.to_string(),
        };

        let mut params = parse_params(value).map_err(|reason| malformed(&reason))?;
        let key_id = params
            .remove("keyid")
            .ok_or_else(|| malformed("missing 'keyId' parameter"))?;
        let signature = params
            .remove("signature")
            .ok_or_else(|| malformed("missing 'signature' parameter"))?;
        let headers = params
            .remove("headers")
            .ok_or_else(|| malformed("missing 'headers' parameter"))?
            .split_ascii_whitespace()
            .map(|name| name.to_ascii_lowercase())
            .collect();

        Ok(Self {
            key_id,
            algorithm: params.remove("algorithm"),
            headers,
            signature,
        })
    }

    /// Render as a header value.
    pub fn to_header_value(&self) -> String {
        let mut value = format!("keyId=\"{}\"", self.key_id);
        if let Some(algorithm) = &self.algorithm {
            value.push_str(&format!(",algorithm=\"{algorithm}\""));
        }
        value.push_str(&format!(
            ",headers=\"{}\",signature=\"{}\"",
            self.headers.join(" "),
            self.signature
        ));
        value
    }
}

/// Parse `name="value",name=value` parameter lists. Names are lower-cased.
fn parse_params(input: &str) -> Result<BTreeMap<String, String>, String> {
    let mut params = BTreeMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let (name, after) = rest
            .split_once('=')
            .ok_or_else(|| format!("expected name=value in '{rest}'"))?;
        let after = after.trim_start();

        let (value, remainder) = match after.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted
                    .find('"')
                    .ok_or_else(|| "unterminated quoted value".to_string())?;
                (&quoted[..end], &quoted[end + 1..])
            }
            None => match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            },
        };

        params.insert(name.trim().to_ascii_lowercase(), value.to_string());

        let remainder = remainder.trim_start();
        rest = match remainder.strip_prefix(',') {
            Some(next) => next.trim_start(),
            None if remainder.is_empty() => remainder,
            None => return Err(format!("unexpected '{remainder}' after parameter")),
        };
    }

    Ok(params)
}

/// Build the string covered by the signature for the given header names.
pub fn signing_string(request: &Parts, headers: &[String]) -> Result<String, VerificationError> {
    let mut lines = Vec::with_capacity(headers.len());

    for name in headers {
        if name == REQUEST_TARGET {
            let target = request
                .uri
                .path_and_query()
                .map(|path| path.as_str())
                .unwrap_or("/");
            lines.push(format!(
                "{REQUEST_TARGET}: {} {target}",
                request.method.as_str().to_ascii_lowercase()
            ));
            continue;
        }

        let value = request
            .headers
            .get(name.as_str())
            .ok_or_else(|| VerificationError::UnsignedHeader(name.clone()))?
            .to_str()
            .map_err(|_| VerificationError::UnsignedHeader(name.clone()))?;
        lines.push(format!("{name}: {}", value.trim()));
    }

    Ok(lines.join("\n"))
}

/// Attach a signed capability invocation to `request`.
///
/// The request must already carry a `host` header. The signature is made
/// with `key`, identified by its `did:key` verification method.
pub fn sign_invocation(
    request: &mut Parts,
    key: &SigningKey,
    capability: &str,
    action: &str,
) -> Result<(), VerificationError> {
    let invocation = CapabilityInvocation {
        capability: capability.to_string(),
        action: action.to_string(),
    };
    request.headers.insert(
        CAPABILITY_INVOCATION_HEADER,
        header_value(CAPABILITY_INVOCATION_HEADER, invocation.to_header_value())?,
    );

    let headers: Vec<String> = SIGNED_HEADERS.iter().map(|name| name.to_string()).collect();
    let message = signing_string(request, &headers)?;
    let signature = HttpSignature {
        key_id: DidKey(key.verifying_key()).key_id(),
        algorithm: Some(SignatureSuite::Ed25519Signature2018.algorithm().to_string()),
        headers,
        signature: STANDARD.encode(key.sign(message.as_bytes()).to_bytes()),
    };
    request.headers.insert(
        SIGNATURE_HEADER,
        header_value(SIGNATURE_HEADER, signature.to_header_value())?,
    );

    Ok(())
}

fn header_value(header: &'static str, value: String) -> Result<HeaderValue, VerificationError> {
    HeaderValue::from_str(&value).map_err(|error| VerificationError::MalformedHeader {
        header,
        reason: error.to_string(),
    })
}

fn required_header<'a>(
    request: &'a Parts,
    header: &'static str,
) -> Result<&'a str, VerificationError> {
    request
        .headers
        .get(header)
        .ok_or(VerificationError::MissingHeader(header))?
        .to_str()
        .map_err(|error| VerificationError::MalformedHeader {
            header,
            reason: error.to_string(),
        })
}

/// An [InvocationVerifier] that checks HTTP-signed capability invocations.
///
/// Verification resolves the signing key, checks the signature with one of
/// the configured suites, then walks the capability chain from the invoked
/// capability up to the expected root.
#[derive(Clone)]
pub struct HttpSignatureVerifier {
    capabilities: Arc<dyn CapabilityResolver>,
    keys: Arc<dyn KeyResolver>,
    suites: Vec<SignatureSuite>,
}

impl HttpSignatureVerifier {
    /// A verifier accepting Ed25519 signatures.
    pub fn new(capabilities: Arc<dyn CapabilityResolver>, keys: Arc<dyn KeyResolver>) -> Self {
        Self {
            capabilities,
            keys,
            suites: vec![SignatureSuite::Ed25519Signature2018],
        }
    }

    /// Replace the accepted signature suites.
    pub fn with_signature_suites(mut self, suites: Vec<SignatureSuite>) -> Self {
        self.suites = suites;
        self
    }

    fn suite_for(&self, algorithm: Option<&str>) -> Result<SignatureSuite, VerificationError> {
        match algorithm {
            Some(algorithm) => self
                .suites
                .iter()
                .find(|suite| suite.algorithm().eq_ignore_ascii_case(algorithm))
                .copied()
                .ok_or_else(|| VerificationError::UnsupportedAlgorithm(algorithm.to_string())),
            None => self
                .suites
                .first()
                .copied()
                .ok_or_else(|| VerificationError::UnsupportedAlgorithm("none".to_string())),
        }
    }

    async fn check_chain(
        &self,
        invoked: &str,
        signer: &str,
        expectations: &InvocationExpectations,
    ) -> Result<(), VerificationError> {
        let action = expectations.action();
        let mut capability: Capability = self.capabilities.resolve(invoked).await?;

        if capability.invoker() != Some(signer) {
            return Err(VerificationError::InvokerMismatch {
                capability: capability.id,
                signer: signer.to_string(),
            });
        }

        for _ in 0..MAX_CHAIN_LENGTH {
            if capability.invocation_target != expectations.target() {
                return Err(VerificationError::TargetMismatch {
                    expected: expectations.target().to_string(),
                    found: capability.invocation_target,
                    capability: capability.id,
                });
            }
            if !capability.allows(action) {
                return Err(VerificationError::ActionNotAllowed {
                    capability: capability.id,
                    action,
                });
            }

            match capability.parent_capability.take() {
                Some(parent) => capability = self.capabilities.resolve(&parent).await?,
                None if capability.id == expectations.root_capability() => return Ok(()),
                None => {
                    return Err(VerificationError::RootMismatch {
                        expected: expectations.root_capability().to_string(),
                        found: capability.id,
                    });
                }
            }
        }

        Err(VerificationError::ChainTooLong(MAX_CHAIN_LENGTH))
    }
}

#[async_trait]
impl InvocationVerifier for HttpSignatureVerifier {
    async fn verify(
        &self,
        request: &Parts,
        expectations: &InvocationExpectations,
    ) -> Result<Authorized, VerificationError> {
        let invocation =
            CapabilityInvocation::parse(required_header(request, CAPABILITY_INVOCATION_HEADER)?)?;
        if invocation.action != expectations.action().as_str() {
            return Err(VerificationError::ActionMismatch {
                expected: expectations.action(),
                found: invocation.action,
            });
        }

        let signature = HttpSignature::parse(required_header(request, SIGNATURE_HEADER)?)?;
        for required in [REQUEST_TARGET, CAPABILITY_INVOCATION_HEADER] {
            if !signature.headers.iter().any(|name| name == required) {
                return Err(VerificationError::UnsignedHeader(required.to_string()));
            }
        }

        let suite = self.suite_for(signature.algorithm.as_deref())?;
        let key = self.keys.resolve(&signature.key_id).await?;
        let message = signing_string(request, &signature.headers)?;
        suite.verify(&key.public_key, message.as_bytes(), &signature.signature)?;

        self.check_chain(&invocation.capability, &key.controller, expectations)
            .await?;

        debug!(
            invoker = %key.controller,
            capability = %invocation.capability,
            action = %expectations.action(),
            "capability invocation verified"
        );

        Ok(Authorized {
            invoker: key.controller,
            capability: invocation.capability,
        })
    }
}
