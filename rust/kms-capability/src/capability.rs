use async_trait::async_trait;
use kms_storage::{KmsStorageError, StorageBackend};
use serde::{Deserialize, Serialize};

use tracing::debug;

use crate::{Action, DelegationError, VerificationError, httpsig::MAX_CHAIN_LENGTH};

/// The name of the store capabilities are kept in.
pub const CAPABILITY_STORE_NAME: &str = "capability";

/// A capability over a keystore.
///
/// A root capability has no parent; its id is the keystore URI and its
/// controller owns the keystore. A delegated capability points at its parent
/// and names the invoker it was delegated to. An empty `allowed_action` list
/// places no restriction beyond the parent's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    /// Identifier of this capability
    pub id: String,
    /// Identifier of the capability this one was delegated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_capability: Option<String>,
    /// DID of the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    /// DID allowed to invoke this capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoker: Option<String>,
    /// The resource this capability can be invoked against
    pub invocation_target: String,
    /// Actions this capability permits
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_action: Vec<Action>,
}

impl Capability {
    /// The root capability of a keystore.
    pub fn root(resource: String, controller: String) -> Self {
        Self {
            id: resource.clone(),
            parent_capability: None,
            controller: Some(controller),
            invoker: None,
            invocation_target: resource,
            allowed_action: Vec::new(),
        }
    }

    /// The DID allowed to invoke this capability: the explicit invoker if
    /// any, the controller otherwise.
    pub fn invoker(&self) -> Option<&str> {
        self.invoker.as_deref().or(self.controller.as_deref())
    }

    /// Whether this capability permits `action`.
    pub fn allows(&self, action: Action) -> bool {
        self.allowed_action.is_empty() || self.allowed_action.contains(&action)
    }
}

/// What the chain above an invoked capability grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Capability ids from the invoked capability up to the root
    pub chain: Vec<String>,
    /// Actions every link allows, or `None` when no link restricts them
    pub actions: Option<Vec<Action>>,
    /// The resource the root capability targets
    pub target: String,
}

impl Grant {
    /// Whether every link of the chain permits `action`.
    pub fn allows(&self, action: Action) -> bool {
        match &self.actions {
            Some(actions) => actions.contains(&action),
            None => true,
        }
    }

    /// Whether `id` is the invoked capability or one of its ancestors.
    pub fn holds(&self, id: &str) -> bool {
        self.chain.iter().any(|held| held == id)
    }
}

/// Looks up capabilities by id while verifying a delegation chain.
#[async_trait]
pub trait CapabilityResolver: Send + Sync {
    /// Resolve the capability with the given id.
    async fn resolve(&self, id: &str) -> Result<Capability, VerificationError>;
}

/// Capabilities persisted in a [StorageBackend], keyed by capability id.
#[derive(Clone)]
pub struct CapabilityStore<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    backend: Backend,
}

impl<Backend> CapabilityStore<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    /// Wrap an opened capability store.
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Persist `capability` under its id, replacing any previous version.
    ///
    /// Only for root capabilities written when their keystore is created.
    /// Capabilities received from clients go through
    /// [`CapabilityStore::delegate`].
    pub async fn put(&self, capability: &Capability) -> Result<(), KmsStorageError> {
        let mut backend = self.backend.clone();
        backend.set(capability.id.clone(), encode(capability)?).await
    }

    /// Walk from `invoked` up to its root, collecting what the chain grants.
    pub async fn grant(&self, invoked: &str) -> Result<Grant, VerificationError> {
        let mut chain = Vec::new();
        let mut actions: Option<Vec<Action>> = None;
        let mut target = String::new();
        let mut next = Some(invoked.to_string());

        while let Some(id) = next {
            if chain.len() == MAX_CHAIN_LENGTH {
                return Err(VerificationError::ChainTooLong(MAX_CHAIN_LENGTH));
            }
            let capability = self.resolve(&id).await?;
            if !capability.allowed_action.is_empty() {
                actions = Some(match actions {
                    Some(held) => held
                        .into_iter()
                        .filter(|action| capability.allowed_action.contains(action))
                        .collect(),
                    None => capability.allowed_action.clone(),
                });
            }
            next = capability.parent_capability;
            target = capability.invocation_target;
            chain.push(capability.id);
        }

        Ok(Grant {
            chain,
            actions,
            target,
        })
    }

    /// Store `capability` on behalf of the holder of `invoked`.
    ///
    /// The parent must be `invoked` or one of its ancestors, the target must
    /// be the chain's resource, and the allowed actions must not exceed what
    /// the chain grants. An existing capability is never replaced.
    pub async fn delegate(
        &self,
        invoked: &str,
        capability: &Capability,
    ) -> Result<(), DelegationError> {
        let Some(parent) = capability.parent_capability.as_deref() else {
            return Err(DelegationError::MissingParent(capability.id.clone()));
        };

        let grant = self.grant(invoked).await?;
        if capability.invocation_target != grant.target {
            return Err(DelegationError::TargetMismatch {
                expected: grant.target,
                found: capability.invocation_target.clone(),
            });
        }
        if !grant.holds(parent) {
            return Err(DelegationError::ParentNotHeld {
                parent: parent.to_string(),
                invoked: invoked.to_string(),
            });
        }
        if grant.actions.is_some() {
            if capability.allowed_action.is_empty() {
                return Err(DelegationError::Escalation("every action".to_string()));
            }
            if let Some(action) = capability
                .allowed_action
                .iter()
                .find(|action| !grant.allows(**action))
            {
                return Err(DelegationError::Escalation(action.to_string()));
            }
        }

        let mut backend = self.backend.clone();
        if backend
            .set_if_absent(capability.id.clone(), encode(capability)?)
            .await?
            .is_some()
        {
            return Err(DelegationError::AlreadyExists(capability.id.clone()));
        }

        debug!(capability = %capability.id, %parent, "stored delegated capability");
        Ok(())
    }

    /// Load the capability with the given id, if any.
    pub async fn get(&self, id: &str) -> Result<Option<Capability>, KmsStorageError> {
        match self.backend.get(&id.to_string()).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|error| KmsStorageError::DecodeFailed(error.to_string())),
            None => Ok(None),
        }
    }
}

fn encode(capability: &Capability) -> Result<Vec<u8>, KmsStorageError> {
    serde_json::to_vec(capability).map_err(|error| KmsStorageError::EncodeFailed(error.to_string()))
}

#[async_trait]
impl<Backend> CapabilityResolver for CapabilityStore<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    async fn resolve(&self, id: &str) -> Result<Capability, VerificationError> {
        self.get(id)
            .await
            .map_err(|error| VerificationError::CapabilityResolution {
                id: id.to_string(),
                reason: error.to_string(),
            })?
            .ok_or_else(|| VerificationError::CapabilityNotFound(id.to_string()))
    }
}
