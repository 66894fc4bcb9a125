//! Candidate endpoint construction.

use crate::types::{Delivery, ModelConfig};

/// Ordered streaming endpoints for a model: primary first, then each
/// non-empty backup in declared order. Never empty.
pub fn build_endpoints(config: &ModelConfig) -> Vec<String> {
    build_endpoints_for(config, Delivery::Stream)
}

/// Same as [`build_endpoints`] for an explicit delivery mode.
///
/// Base URLs are not validated; a malformed one fails at request time.
pub fn build_endpoints_for(config: &ModelConfig, delivery: Delivery) -> Vec<String> {
    let protocol = config.provider.protocol();

    let primary = if config.base_url.trim().is_empty() {
        protocol.default_base_url()
    } else {
        config.base_url.as_str()
    };

    let backups = config
        .backup_urls
        .iter()
        .map(String::as_str)
        .filter(|url| !url.trim().is_empty());

    std::iter::once(primary)
        .chain(backups)
        .map(|base| protocol.endpoint_url(normalize_base(base), config, delivery))
        .collect()
}

/// Strip a single trailing `/`.
fn normalize_base(base: &str) -> &str {
    base.strip_suffix('/').unwrap_or(base)
}

/// Hide the credential in Gemini-style `key=` query strings for logging.
pub fn redact_url(url: &str) -> String {
    match url.find("key=") {
        Some(pos) => {
            let value_start = pos + "key=".len();
            let value_end = url[value_start..]
                .find('&')
                .map(|i| value_start + i)
                .unwrap_or(url.len());
            format!("{}***{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}
