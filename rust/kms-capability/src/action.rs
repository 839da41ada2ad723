use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{KmsCapabilityError, RouteName};

/// An action a capability can authorize against a keystore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Create a key
    #[serde(rename = "createKey")]
    CreateKey,
    /// Store a delegated capability
    #[serde(rename = "storeCapability")]
    StoreCapability,
    /// Export a public key
    #[serde(rename = "exportKey")]
    ExportKey,
    /// Sign a message
    #[serde(rename = "sign")]
    Sign,
    /// Verify a signature
    #[serde(rename = "verify")]
    Verify,
    /// Encrypt a message
    #[serde(rename = "encrypt")]
    Encrypt,
    /// Decrypt a message
    #[serde(rename = "decrypt")]
    Decrypt,
    /// Compute a MAC
    #[serde(rename = "computeMAC")]
    ComputeMac,
    /// Verify a MAC
    #[serde(rename = "verifyMAC")]
    VerifyMac,
    /// Wrap a key
    #[serde(rename = "wrap")]
    Wrap,
    /// Unwrap a key
    #[serde(rename = "unwrap")]
    Unwrap,
}

impl Action {
    /// The label used for this action on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateKey => "createKey",
            Action::StoreCapability => "storeCapability",
            Action::ExportKey => "exportKey",
            Action::Sign => "sign",
            Action::Verify => "verify",
            Action::Encrypt => "encrypt",
            Action::Decrypt => "decrypt",
            Action::ComputeMac => "computeMAC",
            Action::VerifyMac => "verifyMAC",
            Action::Wrap => "wrap",
            Action::Unwrap => "unwrap",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the action a request to `route` must be authorized for.
///
/// Routes without an action fail with
/// [`KmsCapabilityError::UnsupportedEndpoint`]. A new endpoint stays
/// unreachable through the authorization layer until it is mapped here.
pub fn expected_action(route: RouteName) -> Result<Action, KmsCapabilityError> {
    let action = match route {
        RouteName::Keys => Action::CreateKey,
        RouteName::Capability => Action::StoreCapability,
        RouteName::Export => Action::ExportKey,
        RouteName::Sign => Action::Sign,
        RouteName::Verify => Action::Verify,
        RouteName::Encrypt => Action::Encrypt,
        RouteName::Decrypt => Action::Decrypt,
        RouteName::ComputeMac => Action::ComputeMac,
        RouteName::VerifyMac => Action::VerifyMac,
        RouteName::Wrap => Action::Wrap,
        RouteName::Unwrap => Action::Unwrap,
        RouteName::Health | RouteName::Keystores => {
            return Err(KmsCapabilityError::UnsupportedEndpoint(route));
        }
    };

    Ok(action)
}

impl TryFrom<RouteName> for Action {
    type Error = KmsCapabilityError;

    fn try_from(route: RouteName) -> Result<Self, Self::Error> {
        expected_action(route)
    }
}
