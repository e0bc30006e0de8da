//! User-Agent string for requests to the local services.

/// Project identifier sent with every request.
const PROJECT_UA_TAG: &str = "listing-harvester";

/// User-Agent for ledger and existence-check requests.
#[must_use]
pub(crate) fn default_service_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("harvester/{version} ({PROJECT_UA_TAG})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ua_carries_crate_version() {
        let ua = default_service_user_agent();
        let version = ua
            .strip_prefix("harvester/")
            .and_then(|s| s.split(' ').next());
        assert_eq!(version, Some(env!("CARGO_PKG_VERSION")));
        assert!(ua.contains(PROJECT_UA_TAG), "UA must carry project tag: {ua}");
    }
}
