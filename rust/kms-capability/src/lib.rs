#![warn(missing_docs)]

//! Capability-invocation authorization for keystore resources.
//!
//! Every request against a keystore is authorized by checking a signed
//! capability invocation against three expectations: the resource being acted
//! upon, the root capability anchoring the delegation chain, and the action
//! being performed.
//!
//! ```rust
//! use kms_capability::{Action, InvocationExpectations, RouteName, expected_action, keystore_location};
//!
//! let resource = keystore_location("example.com", "ks-1");
//! let action = expected_action(RouteName::Sign).unwrap();
//! let expectations = InvocationExpectations::new(resource, action);
//!
//! assert_eq!(expectations.target(), "https://example.com/keystores/ks-1");
//! assert_eq!(expectations.root_capability(), expectations.target());
//! assert_eq!(expectations.action(), Action::Sign);
//! ```
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`RouteName`] | Logical endpoint matched by the router |
//! | [`Action`] | Authorization action required by an endpoint |
//! | [`InvocationExpectations`] | What a valid invocation must prove |
//! | [`InvocationVerifier`] | Decides whether a request meets its expectations |
//! | [`HttpSignatureVerifier`] | HTTP-signature based [`InvocationVerifier`] |
//! | [`Capability`] | A (root or delegated) capability record |
//! | [`DidKeyResolver`] | Resolves `did:key` key ids to Ed25519 keys |

mod error;
pub use error::*;

mod route;
pub use route::*;

mod action;
pub use action::*;

mod resource;
pub use resource::*;

mod expectations;
pub use expectations::*;

mod capability;
pub use capability::*;

mod did;
pub use did::*;

mod suite;
pub use suite::*;

mod verifier;
pub use verifier::*;

pub mod httpsig;
pub use httpsig::HttpSignatureVerifier;
