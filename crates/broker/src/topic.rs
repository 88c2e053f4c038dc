use std::fmt;

/// Tenant the campaign service publishes under.
pub const DEFAULT_TENANT: &str = "campaign-management";

/// Namespace for domain event topics.
pub const DEFAULT_NAMESPACE: &str = "events";

/// Topic carrying campaign lifecycle events.
pub const CAMPAIGN_EVENTS: &str = "campaign-events";

/// Topic read by the content service.
pub const CONTENT_EVENTS: &str = "content-events";

/// A durable topic scoped under a tenant and namespace.
///
/// Renders as `persistent://{tenant}/{namespace}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    tenant: String,
    namespace: String,
    name: String,
}

impl Topic {
    pub fn new(
        tenant: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// A topic under the default tenant and namespace.
    pub fn scoped(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_TENANT, DEFAULT_NAMESPACE, name)
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "persistent://{}/{}/{}",
            self.tenant, self.namespace, self.name
        )
    }
}
