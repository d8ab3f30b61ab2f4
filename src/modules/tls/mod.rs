//! Certificate verification policy for outbound clients.
//!
//! The policy is attached to a single client when it is built. Nothing here
//! touches process-wide TLS defaults, so relaxing it for the direct path does
//! not weaken the scraping service client or any other traffic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsPolicy {
    pub accept_invalid_certs: bool,
    pub accept_invalid_hostnames: bool,
}

impl TlsPolicy {
    /// Full certificate and hostname verification.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Accept self-signed, expired, or otherwise untrusted certificates.
    ///
    /// Several listing sites serve broken chains; the direct path uses this by
    /// default.
    pub fn relaxed() -> Self {
        Self {
            accept_invalid_certs: true,
            accept_invalid_hostnames: true,
        }
    }

    pub fn is_relaxed(&self) -> bool {
        self.accept_invalid_certs || self.accept_invalid_hostnames
    }

    /// Apply the policy to a client under construction.
    pub fn apply(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        if self.is_relaxed() {
            log::warn!(
                "building http client with relaxed tls verification (invalid_certs={}, invalid_hostnames={})",
                self.accept_invalid_certs,
                self.accept_invalid_hostnames
            );
        }

        builder
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .danger_accept_invalid_hostnames(self.accept_invalid_hostnames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_is_default() {
        assert_eq!(TlsPolicy::default(), TlsPolicy::strict());
        assert!(!TlsPolicy::strict().is_relaxed());
        assert!(TlsPolicy::relaxed().is_relaxed());
    }

    #[test]
    fn partial_json_keeps_other_flag_strict() {
        let policy: TlsPolicy = serde_json::from_str(r#"{"accept_invalid_certs": true}"#).unwrap();
        assert!(policy.accept_invalid_certs);
        assert!(!policy.accept_invalid_hostnames);
    }

    #[test]
    fn relaxed_policy_builds_client() {
        let builder = TlsPolicy::relaxed().apply(reqwest::Client::builder());
        assert!(builder.build().is_ok());
    }
}
