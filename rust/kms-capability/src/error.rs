use kms_storage::KmsStorageError;

use crate::{Action, RouteName};

/// Errors raised while working out what a request must be authorized for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KmsCapabilityError {
    /// The matched endpoint has no authorization action.
    #[error("unsupported endpoint: {0}")]
    UnsupportedEndpoint(RouteName),
}

/// Reasons a capability invocation fails verification.
///
/// These carry verifier diagnostics for logging. They are never sent back to
/// the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// A header the invocation needs is absent.
    #[error("missing '{0}' header")]
    MissingHeader(&'static str),

    /// A header is present but cannot be parsed.
    #[error("malformed '{header}' header: {reason}")]
    MalformedHeader {
        /// The offending header
        header: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// A header required to be covered by the signature is not signed.
    #[error("header '{0}' is not covered by the signature")]
    UnsignedHeader(String),

    /// The invoked action is not the one the endpoint requires.
    #[error("expected action '{expected}', invocation requested '{found}'")]
    ActionMismatch {
        /// The action the endpoint requires
        expected: Action,
        /// The action named by the invocation
        found: String,
    },

    /// No configured signature suite handles the algorithm.
    #[error("unsupported signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// The key id could not be resolved to a verification key.
    #[error("cannot resolve key '{key_id}': {reason}")]
    KeyResolution {
        /// The key id from the signature
        key_id: String,
        /// Why resolution failed
        reason: String,
    },

    /// The signature does not verify against the resolved key.
    #[error("invalid signature")]
    InvalidSignature,

    /// A capability in the chain does not exist.
    #[error("capability '{0}' not found")]
    CapabilityNotFound(String),

    /// A capability could not be loaded.
    #[error("cannot resolve capability '{id}': {reason}")]
    CapabilityResolution {
        /// The capability id
        id: String,
        /// Why it could not be loaded
        reason: String,
    },

    /// A capability in the chain targets another resource.
    #[error("capability '{capability}' targets '{found}', expected '{expected}'")]
    TargetMismatch {
        /// The capability id
        capability: String,
        /// The expected invocation target
        expected: String,
        /// The target named by the capability
        found: String,
    },

    /// A capability in the chain does not allow the action.
    #[error("capability '{capability}' does not allow action '{action}'")]
    ActionNotAllowed {
        /// The capability id
        capability: String,
        /// The action requested
        action: Action,
    },

    /// The signer is not the invoker of the capability.
    #[error("'{signer}' may not invoke capability '{capability}'")]
    InvokerMismatch {
        /// The capability id
        capability: String,
        /// The DID that signed the request
        signer: String,
    },

    /// The chain ends at a root other than the expected one.
    #[error("capability chain is rooted at '{found}', expected '{expected}'")]
    RootMismatch {
        /// The expected root capability
        expected: String,
        /// The root actually reached
        found: String,
    },

    /// The delegation chain is longer than allowed.
    #[error("capability chain exceeds {0} links")]
    ChainTooLong(usize),
}

/// Reasons a delegated capability is refused for storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DelegationError {
    /// Only delegated capabilities can be stored; roots are created with
    /// their keystore.
    #[error("capability '{0}' has no parent")]
    MissingParent(String),

    /// The capability targets another resource than the delegator's chain.
    #[error("capability targets '{found}', expected '{expected}'")]
    TargetMismatch {
        /// The resource of the delegator's chain
        expected: String,
        /// The target named by the capability
        found: String,
    },

    /// The parent is not part of the chain the delegator invoked.
    #[error("parent '{parent}' is not held by the delegator of '{invoked}'")]
    ParentNotHeld {
        /// The parent named by the capability
        parent: String,
        /// The capability the delegator invoked
        invoked: String,
    },

    /// The capability grants more than the delegator holds.
    #[error("capability grants '{0}', which the delegator does not hold")]
    Escalation(String),

    /// A capability with the same id is already stored.
    #[error("capability '{0}' already exists")]
    AlreadyExists(String),

    /// The delegator's chain could not be resolved.
    #[error(transparent)]
    Chain(#[from] VerificationError),

    /// The capability store failed.
    #[error(transparent)]
    Storage(#[from] KmsStorageError),
}
