//! Shared User-Agent string for all pipeline HTTP traffic.
//!
//! Journal sites and registries see one consistent, identifiable client
//! (good citizenship; RFC 9308). Crossref additionally gets the polite-pool
//! mailto as a query parameter, handled by the registry client.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/caltechlibrary/pubarchiver";

/// Default User-Agent sent with every request.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("pubarchiver/{version} (journal-archiving-tool; +{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version_and_project_url() {
        let ua = default_user_agent();
        assert!(ua.contains(PROJECT_UA_URL));
        assert_eq!(
            ua.strip_prefix("pubarchiver/")
                .and_then(|s| s.split(' ').next()),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }
}
