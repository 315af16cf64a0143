//! Deployment identity attached to every log line.
//!
//! When the exporter runs as part of a network-function deployment, the
//! orchestrator injects the identifiers of the function, its component and
//! the network service as environment variables.

/// Environment variable holding the network-function component UUID.
pub const CNFC_UUID_VAR: &str = "CNFC_UUID";
/// Environment variable holding the network-function UUID.
pub const CNF_UUID_VAR: &str = "CNF_UUID";
/// Environment variable holding the network-service UUID.
pub const NS_UUID_VAR: &str = "NS_UUID";

/// Identifiers of the deployment this process belongs to.
///
/// Missing variables are kept as empty strings so that log records always
/// carry the same set of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentIdentity {
    pub cnfc_uuid: String,
    pub cnf_uuid: String,
    pub ns_uuid: String,
}

impl DeploymentIdentity {
    /// Read the identity from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the identity through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            cnfc_uuid: lookup(CNFC_UUID_VAR).unwrap_or_default(),
            cnf_uuid: lookup(CNF_UUID_VAR).unwrap_or_default(),
            ns_uuid: lookup(NS_UUID_VAR).unwrap_or_default(),
        }
    }

    /// Build the root span that annotates every record logged inside it.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "core_sbc",
            cnfc_uuid = %self.cnfc_uuid,
            cnf_uuid = %self.cnf_uuid,
            ns_uuid = %self.ns_uuid
        )
    }
}
