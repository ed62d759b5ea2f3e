use thiserror::Error;

/// Failure of a single upstream poll attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("HomeWizard unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("HomeWizard answered with HTTP {0}")]
    UpstreamBadStatus(u16),

    #[error("HomeWizard payload malformed: {0}")]
    UpstreamMalformed(String),
}

impl FetchError {
    /// Short label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::UpstreamUnreachable(_) => "upstream_unreachable",
            FetchError::UpstreamBadStatus(_) => "upstream_bad_status",
            FetchError::UpstreamMalformed(_) => "upstream_malformed",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            FetchError::UpstreamBadStatus(status.as_u16())
        } else if err.is_decode() {
            FetchError::UpstreamMalformed(err.to_string())
        } else {
            FetchError::UpstreamUnreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::UpstreamMalformed(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    #[error("service registration failed: {0}")]
    RegistrationFailed(String),

    #[error("announce send failed: {0}")]
    AnnounceSendFailed(String),
}

impl DiscoveryError {
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryError::RegistrationFailed(_) => "discovery_registration_failed",
            DiscoveryError::AnnounceSendFailed(_) => "announce_send_failed",
        }
    }
}

impl From<mdns_sd::Error> for DiscoveryError {
    fn from(err: mdns_sd::Error) -> Self {
        DiscoveryError::RegistrationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_distinct() {
        let kinds = [
            FetchError::UpstreamUnreachable("x".into()).kind(),
            FetchError::UpstreamBadStatus(500).kind(),
            FetchError::UpstreamMalformed("x".into()).kind(),
            DiscoveryError::RegistrationFailed("x".into()).kind(),
            DiscoveryError::AnnounceSendFailed("x".into()).kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err: FetchError = serde_json::from_str::<serde_json::Value>("{nope")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "upstream_malformed");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            FetchError::UpstreamBadStatus(503).to_string(),
            "HomeWizard answered with HTTP 503"
        );
    }
}
