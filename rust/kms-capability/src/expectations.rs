use crate::Action;

/// What a capability invocation must prove for a single request.
///
/// Built fresh for every request, since the host and keystore vary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationExpectations {
    target: String,
    root_capability: String,
    action: Action,
}

impl InvocationExpectations {
    /// Expect `action` on `resource`, with `resource` also serving as the
    /// root of the capability chain.
    pub fn new(resource: String, action: Action) -> Self {
        Self {
            root_capability: resource.clone(),
            target: resource,
            action,
        }
    }

    /// The resource being acted upon.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The capability that must anchor the delegation chain.
    pub fn root_capability(&self) -> &str {
        &self.root_capability
    }

    /// The action being performed.
    pub fn action(&self) -> Action {
        self.action
    }
}
