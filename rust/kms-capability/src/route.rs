use std::fmt::{Display, Formatter};

/// The logical endpoint a request was matched to.
///
/// Route names are produced by the router binding and are independent of the
/// literal request path, which carries variable keystore and key ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteName {
    /// Liveness check
    Health,
    /// Keystore creation
    Keystores,
    /// Key creation within a keystore
    Keys,
    /// Storing a delegated capability for a keystore
    Capability,
    /// Exporting a public key
    Export,
    /// Signing a message
    Sign,
    /// Verifying a signature
    Verify,
    /// Encrypting a message
    Encrypt,
    /// Decrypting a message
    Decrypt,
    /// Computing a MAC
    ComputeMac,
    /// Verifying a MAC
    VerifyMac,
    /// Wrapping a content encryption key
    Wrap,
    /// Unwrapping a content encryption key
    Unwrap,
}

impl RouteName {
    /// Every route name, in declaration order.
    pub const ALL: [RouteName; 13] = [
        RouteName::Health,
        RouteName::Keystores,
        RouteName::Keys,
        RouteName::Capability,
        RouteName::Export,
        RouteName::Sign,
        RouteName::Verify,
        RouteName::Encrypt,
        RouteName::Decrypt,
        RouteName::ComputeMac,
        RouteName::VerifyMac,
        RouteName::Wrap,
        RouteName::Unwrap,
    ];

    /// The stable name of the route.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteName::Health => "healthCheck",
            RouteName::Keystores => "keystores",
            RouteName::Keys => "keys",
            RouteName::Capability => "capability",
            RouteName::Export => "export",
            RouteName::Sign => "sign",
            RouteName::Verify => "verify",
            RouteName::Encrypt => "encrypt",
            RouteName::Decrypt => "decrypt",
            RouteName::ComputeMac => "computeMAC",
            RouteName::VerifyMac => "verifyMAC",
            RouteName::Wrap => "wrap",
            RouteName::Unwrap => "unwrap",
        }
    }

    /// Whether the route skips capability authorization.
    ///
    /// Keystore creation has no capability to check against yet; it is
    /// protected by a separate mechanism in front of the service.
    pub fn bypasses_authorization(&self) -> bool {
        matches!(self, RouteName::Keystores)
    }
}

impl Display for RouteName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
